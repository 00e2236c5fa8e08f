//! gRPC ingress: `DeliverNotification` and `DeliverMessage`.
//!
//! Each call returns exactly one acknowledgment. `DELIVERED` means the request
//! was carried through resolution and dispatch, not that any client received it.

use std::future::Future;
use std::net::SocketAddr;

use tonic::{Request, Response, Status};

use crate::delivery::{DeliveryPipeline, DeliveryRequest, DispatchReport, Event};
use crate::error::DeliveryError;
use crate::proto::delivery::delivery_service_server::{DeliveryService, DeliveryServiceServer};
use crate::proto::delivery::{Acknowledgment, DeliveryResponse, MessageRequest, NotificationRequest};

#[derive(Clone)]
pub struct DeliveryIngress {
    pipeline: DeliveryPipeline,
}

impl DeliveryIngress {
    pub fn new(pipeline: DeliveryPipeline) -> Self {
        Self { pipeline }
    }

    /// Run one request through the pipeline on its own task, so a panic while
    /// delivering is reported to the caller instead of tearing down the RPC.
    async fn acknowledge(
        &self,
        rpc: &'static str,
        request: Result<DeliveryRequest, DeliveryError>,
    ) -> Acknowledgment {
        let outcome = match request {
            Ok(request) => {
                let pipeline = self.pipeline.clone();
                match tokio::spawn(async move { pipeline.deliver(request).await }).await {
                    Ok(result) => result,
                    Err(e) => Err(DeliveryError::Task(e.to_string())),
                }
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(DispatchReport {
                sent,
                missed,
                failed,
            }) => {
                tracing::info!(rpc, sent, missed, failed, "Delivery acknowledged");
                Acknowledgment::Delivered
            }
            Err(e) => {
                tracing::error!(rpc, error = %e, "Unable to deliver");
                Acknowledgment::UnableToDeliver
            }
        }
    }
}

fn respond(acknowledgment: Acknowledgment) -> Response<DeliveryResponse> {
    Response::new(DeliveryResponse {
        acknowledgment: acknowledgment as i32,
    })
}

#[tonic::async_trait]
impl DeliveryService for DeliveryIngress {
    async fn deliver_notification(
        &self,
        request: Request<NotificationRequest>,
    ) -> Result<Response<DeliveryResponse>, Status> {
        let notification = request.into_inner();
        tracing::debug!(
            notification_id = %notification.notification_id,
            recipient = %notification.recipient_profile_id,
            listed = notification.receipt_profile_ids.len(),
            "DeliverNotification received"
        );

        let request = DeliveryRequest::new(
            Event::Notification,
            &notification,
            &notification.recipient_profile_id,
            &notification.receipt_profile_ids,
        );
        Ok(respond(self.acknowledge("DeliverNotification", request).await))
    }

    async fn deliver_message(
        &self,
        request: Request<MessageRequest>,
    ) -> Result<Response<DeliveryResponse>, Status> {
        let message = request.into_inner();
        tracing::debug!(
            message_id = %message.message_id,
            group_id = %message.group_id,
            recipient = %message.recipient_profile_id,
            listed = message.receipt_profile_ids.len(),
            "DeliverMessage received"
        );

        let request = DeliveryRequest::new(
            Event::Message,
            &message,
            &message.recipient_profile_id,
            &message.receipt_profile_ids,
        );
        Ok(respond(self.acknowledge("DeliverMessage", request).await))
    }
}

/// Serve the ingress until `shutdown` resolves.
pub async fn serve<F>(
    addr: SocketAddr,
    ingress: DeliveryIngress,
    shutdown: F,
) -> Result<(), tonic::transport::Error>
where
    F: Future<Output = ()> + Send,
{
    tracing::info!("Delivery ingress listening on {}", addr);
    tonic::transport::Server::builder()
        .add_service(DeliveryServiceServer::new(ingress))
        .serve_with_shutdown(addr, shutdown)
        .await
}
