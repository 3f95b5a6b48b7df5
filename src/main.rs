use hemmer_provider_fastly::{init_logging, serve, FastlyProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Fastly provider");
    serve(FastlyProvider::new()).await
}
