use std::net::SocketAddr;
use std::sync::Arc;

use fireworks_inventory::config::{Config, StoreBackend};
use fireworks_inventory::proto::health::health_server::HealthServer;
use fireworks_inventory::proto::inventory::inventory_service_server::InventoryServiceServer;
use fireworks_inventory::services::{HealthServiceImpl, InventoryServiceImpl};
use fireworks_inventory::session::SessionRegistry;
use fireworks_inventory::sheets::{
    ConnectionCache, MemoryConnector, MemoryTable, SheetsConnector, StoreConnector,
};
use fireworks_inventory::sync::SyncEngine;

use tonic::transport::Server;
use tonic_reflection::server::Builder as ReflectionBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Include file descriptor for gRPC reflection
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("inventory_descriptor");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fireworks_inventory=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting fireworks-inventory gRPC server...");

    let connector: Arc<dyn StoreConnector> = match config.store_backend {
        StoreBackend::Sheets => {
            let connector = SheetsConnector::new(&config.sheets, config.http_timeout)?;
            match connector.configuration_problem() {
                Some(problem) => tracing::error!(
                    "{}; inventory data is unavailable until the environment is fixed",
                    problem
                ),
                None => tracing::info!(
                    "Google Sheets store enabled: worksheet={}",
                    config.sheets.worksheet
                ),
            }
            Arc::new(connector)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, data is lost on restart");
            Arc::new(MemoryConnector::new(Arc::new(MemoryTable::new(
                config.sheets.worksheet.clone(),
            ))))
        }
    };

    let engine = Arc::new(SyncEngine::new(ConnectionCache::new(
        connector,
        config.connection_ttl,
    )));
    let sessions = Arc::new(SessionRegistry::new());

    // Create services
    let inventory_service = InventoryServiceImpl::new(engine.clone(), sessions);
    let health_service = HealthServiceImpl::new(engine);

    // CORS layer for gRPC-Web
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any)
        .expose_headers(Any);

    // Build reflection service
    let reflection_service = ReflectionBuilder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    // Parse server address
    let addr: SocketAddr = config.server_addr().parse()?;
    tracing::info!("Listening on {}", addr);

    // Build and run server with gRPC-Web support
    Server::builder()
        .accept_http1(true) // Required for gRPC-Web
        .layer(cors)
        .layer(tonic_web::GrpcWebLayer::new()) // Enable gRPC-Web
        .add_service(reflection_service)
        .add_service(InventoryServiceServer::new(inventory_service))
        .add_service(HealthServer::new(health_service))
        .serve(addr)
        .await?;

    Ok(())
}
