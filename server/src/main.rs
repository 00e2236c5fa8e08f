use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use relay_server::auth::{AdmissionController, GrpcSessionValidator};
use relay_server::config::{generate_config_template, Config, RegistryBackend};
use relay_server::error::RegistryError;
use relay_server::ingress::{self, DeliveryIngress};
use relay_server::registry::{MemoryStore, RedisStore, RegistryStore, SessionRegistry};
use relay_server::routes;
use relay_server::shutdown::{self, ShutdownSignal};
use relay_server::state::AppState;

/// How long the listeners get to stop before they are aborted.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("relay_server=info"))
    };
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter())
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(env_filter())
            .init();
    }

    tracing::info!("Relay server v{} starting", env!("CARGO_PKG_VERSION"));

    // Registry store: connecting is bounded, failure here is fatal
    let (store, supervisor) = open_store(&config).await?;
    let registry = SessionRegistry::new(store, &config.registry_key_prefix);

    // Handle --clear-registry: wipe the namespace and exit
    if config.clear_registry {
        let deleted = registry.clear().await?;
        println!("Cleared {} registry keys", deleted);
        if let Some(supervisor) = supervisor {
            supervisor.abort();
        }
        return Ok(());
    }

    // Authentication collaborator, dialed lazily on first admission
    let validator = GrpcSessionValidator::connect_lazy(&config.auth_grpc_url)?;
    let admission = AdmissionController::new(Arc::new(validator), config.auth_timeout());

    let app_state = AppState::new(registry.clone(), admission);
    let app = routes::build_router(app_state.clone());

    let signal = ShutdownSignal::new();

    // WebSocket listener
    let ws_addr = config.ws_addr();
    let listener = TcpListener::bind(&ws_addr).await?;
    tracing::info!("WebSocket listener on {}", ws_addr);
    let ws_stop = signal.wait();
    let mut ws_server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(ws_stop)
            .await
        {
            tracing::error!(error = %e, "WebSocket listener failed");
        }
    });

    // gRPC delivery ingress
    let grpc_addr = config.grpc_addr()?;
    let ingress = DeliveryIngress::new(app_state.pipeline());
    let grpc_stop = signal.wait();
    let mut grpc_server = tokio::spawn(async move {
        if let Err(e) = ingress::serve(grpc_addr, ingress, grpc_stop).await {
            tracing::error!(error = %e, "Delivery ingress failed");
        }
    });

    tokio::select! {
        err = registry_lost(supervisor) => {
            tracing::error!(error = %err, "Registry store lost for good, exiting");
            return Err(err.into());
        }
        _ = shutdown_signal() => {}
        _ = &mut ws_server => {
            tracing::error!("WebSocket listener stopped unexpectedly");
        }
        _ = &mut grpc_server => {
            tracing::error!("Delivery ingress stopped unexpectedly");
        }
    }

    // Controlled shutdown: stop listeners, evict clients, then clear the registry
    let mut listeners = [ws_server, grpc_server];
    shutdown::wind_down(&app_state, &signal, &mut listeners, DRAIN_TIMEOUT).await;

    if config.clear_registry_on_shutdown {
        match registry.clear().await {
            Ok(deleted) => tracing::info!(deleted, "Registry cleared on shutdown"),
            Err(e) => tracing::error!(error = %e, "Failed to clear registry on shutdown"),
        }
    }

    tracing::info!("Relay server stopped");
    Ok(())
}

/// Open the configured backing store. For Redis the first connection is made
/// here and a supervisor task is spawned to keep it alive.
async fn open_store(
    config: &Config,
) -> Result<(Arc<dyn RegistryStore>, Option<JoinHandle<RegistryError>>), RegistryError> {
    match config.registry_backend {
        RegistryBackend::Memory => {
            tracing::warn!("Using the in-memory registry: delivery only reaches this process");
            Ok((Arc::new(MemoryStore::new()) as Arc<dyn RegistryStore>, None))
        }
        RegistryBackend::Redis => {
            let password = config.redis_password.clone().filter(|p| !p.is_empty());
            let store = Arc::new(RedisStore::new(
                &config.redis_host,
                config.redis_port,
                password,
                config.store_timeout(),
            )?);

            let policy = config.reconnect_policy();
            store.connect(&policy).await?;
            let supervisor = tokio::spawn(store.clone().supervise(policy));

            Ok((store as Arc<dyn RegistryStore>, Some(supervisor)))
        }
    }
}

/// Resolves only if the registry supervisor gives up.
async fn registry_lost(supervisor: Option<JoinHandle<RegistryError>>) -> RegistryError {
    match supervisor {
        Some(handle) => match handle.await {
            Ok(err) => err,
            Err(e) => {
                tracing::error!(error = %e, "Registry supervisor task failed");
                RegistryError::Disconnected
            }
        },
        None => std::future::pending().await,
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT, shutting down"),
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Received Ctrl-C, shutting down");
}
