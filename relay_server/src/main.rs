#[tokio::main]
async fn main() {
    // Delegate to the server framework entry point.
    if let Err(e) = relay_server::run_with_config().await {
        tracing::error!(error = %e, "relay server exited");
        std::process::exit(1);
    }
}
