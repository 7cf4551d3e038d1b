#[tokio::main]
async fn main() {
    // Delegate to the client framework entry point.
    if let Err(e) = scan_client::run_with_config().await {
        tracing::error!(error = %e, "scan client exited");
        std::process::exit(1);
    }
}
