//! Helpdesk server command (`panichd serve`).

use anyhow::Result;
use std::path::{Path, PathBuf};

use panichd::helpdesk::server::{ServerConfig, start_server};
use panichd::logging::init_logging;

pub async fn cmd_serve(
    config_path: &Path,
    port: Option<u16>,
    db_path: Option<PathBuf>,
    dev: bool,
) -> Result<()> {
    let mut config = super::load_config(config_path)?;
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(db_path) = db_path {
        config.server.db_path = db_path;
    }

    // Held until the server returns so the file writer flushes.
    let _guard = init_logging(&config.logging);

    let server = ServerConfig {
        port: config.server.port,
        db_path: config.server.db_path.clone(),
        dev_mode: dev,
    };
    start_server(server, config).await
}
