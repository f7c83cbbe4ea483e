use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use dotenv::dotenv;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use route_optimizer::cache::{db_connection, MatrixCache};
use route_optimizer::config::Settings;
use route_optimizer::http::{router, AppState};
use route_optimizer::services::optimization::OptimizationService;
use route_optimizer::services::rerouting::ReroutingService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env()) // Reads RUST_LOG
        .with(fmt::layer())
        .init();

    dotenv().ok();
    let settings = Settings::from_env();

    let pool = db_connection(&settings.database_url).await?;
    let matrix_cache = MatrixCache::new(pool);

    let optimization = Arc::new(OptimizationService::new(
        settings.clone(),
        Some(matrix_cache),
    ));
    let rerouting = Arc::new(ReroutingService::new(optimization.clone()));

    let app = router(AppState {
        optimization,
        rerouting,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.service_port));
    info!("Route optimizer listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
