use market_intel::config::Config;
use market_intel::kernel::ServiceKernel;
use market_intel::services::price_monitor;

const SERVICE_NAME: &str = "price-monitor";
const DEFAULT_PORT: u16 = 8083;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    let port: u16 = std::env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(DEFAULT_PORT);

    let kernel = std::sync::Arc::new(ServiceKernel::bootstrap(SERVICE_NAME, port, config).await?);
    kernel.set_dependency("event_bus", true);
    kernel.set_dependency("document_store", true);

    let _http = kernel.spawn_http_surface(port);
    let _heartbeat = kernel.spawn_heartbeat();
    let shutdown = kernel.spawn_shutdown_handler();

    price_monitor::run(kernel).await?;
    let _ = shutdown.await;
    Ok(())
}
