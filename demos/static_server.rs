//! A static file server with the login and register pages wired up.
//!
//! Usage: `cargo run --example static_server [config.json]`
//!
//! Without a config file the server listens on 127.0.0.1:9006 and serves
//! `./root` with edge-triggered reads.

use std::env;

use log::info;
use tinyweb::{HttpServer, ServerConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize the logger
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from {path}");
            ServerConfig::from_json_file(path)?
        }
        None => ServerConfig::default(),
    };

    info!("Try these pages:");
    info!("  GET  /            -> index.html");
    info!("  GET  /0           -> register.html");
    info!("  GET  /1           -> log.html");
    info!("  POST /login       user=...&password=...");
    info!("  POST /register    user=...&password=...");

    let server = HttpServer::new(config)?;
    server.start()?;

    Ok(())
}
