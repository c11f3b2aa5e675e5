use std::sync::Arc;

use log::{error, info};
use tokio::io::{AsyncBufReadExt, BufReader};

use portlogger::configuration::Config;
use portlogger::network::RelayServer;
use portlogger::session_management::Session;

#[tokio::main]
async fn main() {
    // Example how to log
    // https://docs.rs/env_logger/latest/env_logger/
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    let config = Config::from_args();
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let session = match Session::create(&config.destination_folder) {
        Ok(session) => Arc::new(session),
        Err(e) => {
            error!("Unable to create the session directory: {}", e);
            std::process::exit(1);
        }
    };

    let server = match RelayServer::bind(&config, Arc::clone(&session)).await {
        Ok(server) => server,
        Err(e) => {
            error!("Unable to start the relay: {}", e);
            std::process::exit(1);
        }
    };

    let handle = server.start();

    println!("Press enter to stop.");
    let mut line = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        _ = stdin.read_line(&mut line) => info!("Stop requested from console"),
        _ = tokio::signal::ctrl_c() => info!("Stop requested by signal"),
    }

    handle.shutdown().await;
}
