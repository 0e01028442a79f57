mod error;
mod handlers;
mod setup;
mod state;
mod telemetry;

use keepsake_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    telemetry::init_telemetry()?;

    let (state, router) = setup::initialize_app(config.clone()).await?;

    setup::server::start_server(&config, router).await?;

    // Stop taking new enrichment jobs; in-flight workers finish on their own.
    state.enrichment_queue.shutdown().await;

    Ok(())
}
