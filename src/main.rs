//! `marketpulsed` — the MarketPulse service binary.

use marketpulse::api::App;
use marketpulse::config::Config;
use marketpulse::server::Server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    let (app, _worker) = App::bootstrap(&config);

    let server = Server::bind(&config.bind_addr).await?;
    server.serve(app.router()).await?;
    Ok(())
}
