/// Entry point for the Fleet Steward node service.
///
/// This binary recovers node-managed containers after a reboot, samples the
/// resource usage of every installed workload, and serves the monitoring API.
///
/// # Errors
///
/// Returns an error if initialization fails (e.g., an invalid configuration
/// file) or the API listener cannot be served.
///
/// # Examples
///
/// ```bash
/// STEWARD_CONFIG=./config.toml RUST_LOG=info cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    fleet_steward::run().await
}
