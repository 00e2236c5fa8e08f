use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::auth::AdmissionController;
use crate::delivery::DeliveryPipeline;
use crate::registry::SessionRegistry;
use crate::ws::ConnectionTable;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Connections held by this process, keyed by connection ID
    pub connections: ConnectionTable,
    /// Shared identity -> connection IDs mapping
    pub registry: SessionRegistry,
    /// Handshake credential check
    pub admission: Arc<AdmissionController>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(registry: SessionRegistry, admission: AdmissionController) -> Self {
        Self {
            connections: ConnectionTable::new(),
            registry,
            admission: Arc::new(admission),
            started_at: Utc::now(),
        }
    }

    /// Delivery pipeline over this process's registry and connection table.
    pub fn pipeline(&self) -> DeliveryPipeline {
        DeliveryPipeline::new(self.registry.clone(), self.connections.clone())
    }
}
