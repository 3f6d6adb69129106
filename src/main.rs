use mimalloc::MiMalloc;
use openmolar_provision::{
    Config, ProvisioningService, Provisioner,
    router::{ProvisionState, provision_router},
    service::provisioning_actor,
};
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = Config::load()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        host = %cfg.database.host,
        port = cfg.database.port,
        service_account = %cfg.database.service_account,
        control_database = %cfg.database.control_database,
        base_schema = %cfg.schema.base_schema_path.display(),
        rollback_on_schema_failure = cfg.provisioning.rollback_on_schema_failure,
        loglevel = %cfg.loglevel,
    );

    let service: Arc<dyn Provisioner> = Arc::new(ProvisioningService::connect(&cfg)?);
    let managed = service.list_managed_databases().await;
    if managed.is_empty() {
        warn!("no managed databases visible; is the cluster reachable?");
    } else {
        info!(count = managed.len(), "managed databases discovered");
    }

    let handle = provisioning_actor::spawn(service).await?;
    let state = ProvisionState::new(handle, cfg.admin_key.clone());
    let app = provision_router(state);

    let listener = TcpListener::bind((cfg.listen_addr, cfg.listen_port)).await?;
    info!("HTTP server listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server has shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
