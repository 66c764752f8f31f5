use actix_web::{middleware, web, App, HttpServer};
use api_gateway::{handlers, AppContext, GatewayConfig};
use distribution_core::Config;
use dotenv::dotenv;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize tracing
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .json()
        .init();

    info!("Starting API gateway...");

    // Load configuration
    let core_config = Config::from_env()?;
    let gateway_config = GatewayConfig::from_env()?;

    info!(
        data_dir = %core_config.data_dir.display(),
        routes = core_config.routes.len(),
        "Configuration loaded"
    );

    // Wire the core and start delivery workers
    let (context, dispatcher) = AppContext::build(&core_config)?;
    let dispatcher_handle = dispatcher.spawn();

    info!(
        workers = core_config.dispatcher.workers,
        "Dispatcher workers started"
    );

    // Start HTTP server
    let context_data = web::Data::new(context);

    info!(
        "Starting HTTP server on {}:{}",
        gateway_config.host, gateway_config.port
    );

    HttpServer::new(move || {
        App::new()
            .app_data(context_data.clone())
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(handlers::configure_routes)
            .default_service(web::route().to(handlers::not_found))
    })
    .workers(gateway_config.workers)
    .bind((gateway_config.host.clone(), gateway_config.port))?
    .run()
    .await?;

    // Drain delivery workers before exit
    info!("HTTP server stopped, draining dispatcher...");
    dispatcher_handle.shutdown().await?;
    info!("Shutdown complete");

    Ok(())
}
