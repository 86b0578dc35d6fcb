//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `serve`  | `Serve`          |
//! | `init`   | `Init`           |
//! | `config` | `Config`         |
//! | `lane`   | `Lane`           |

pub mod config;
pub mod init;
pub mod lane;
pub mod serve;

pub use config::cmd_config;
pub use init::cmd_init;
pub use lane::cmd_lane;
pub use serve::cmd_serve;

use anyhow::Result;
use claimboard::config::ClaimboardToml;
use std::path::Path;

/// File config with `CLAIMBOARD_*` overrides applied. Unusable override
/// values are reported on stderr and skipped.
pub(crate) fn load_effective(config_path: &Path) -> Result<ClaimboardToml> {
    let mut toml = ClaimboardToml::load_or_default(config_path)?;
    for warning in toml.apply_env() {
        eprintln!("warning: {}", warning);
    }
    Ok(toml)
}
