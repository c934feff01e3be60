//! cupolad - dome supervisor daemon

use cupolad::{CommandServer, Config, DomeSupervisor, Error, Result};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("cupolad v0.4.1 starting...");

    // Get config path from args or default
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/cupolad.json".to_string());

    log::info!("Using config: {}", config_path);
    let config = Config::load(&config_path)?;

    let supervisor = Arc::new(DomeSupervisor::from_config(&config));
    supervisor.start()?;

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);

    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    log::info!("cupolad running. Press Ctrl-C to stop.");

    let server = CommandServer::new(Arc::clone(&supervisor), config);
    server.run(running)?;

    // Shutdown
    log::info!("Shutting down...");
    supervisor.shutdown();

    log::info!("cupolad stopped");
    Ok(())
}
