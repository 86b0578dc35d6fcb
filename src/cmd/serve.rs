//! Board server command: `claimboard serve`.

use anyhow::Result;
use claimboard::logging::init_logging;
use claimboard::server::start_server;
use std::path::{Path, PathBuf};

pub async fn cmd_serve(
    config_path: &Path,
    verbose: bool,
    port: Option<u16>,
    db_path: Option<PathBuf>,
    dev: bool,
) -> Result<()> {
    let mut toml = super::load_effective(config_path)?;
    if verbose {
        toml.logging.level = "debug".to_string();
    }
    let _guard = init_logging(&toml.logging)?;

    for warning in toml.validate() {
        tracing::warn!(config = %config_path.display(), "{}", warning);
    }

    // CLI flags win over file and environment
    if let Some(port) = port {
        toml.server.port = port;
    }
    if let Some(db_path) = db_path {
        toml.store.db_path = db_path;
    }
    if dev {
        toml.server.dev_mode = true;
    }

    start_server(toml.server_config()).await
}
