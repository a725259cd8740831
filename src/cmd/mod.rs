//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `serve`  | `Serve`          |
//! | `init`   | `Init`           |
//! | `config` | `Config`         |

pub mod config;
pub mod init;
pub mod serve;

pub use config::cmd_config;
pub use init::cmd_init;
pub use serve::cmd_serve;

use anyhow::Result;
use std::path::Path;

use panichd::config::HelpdeskToml;

/// Load `panichd.toml` (or defaults) with `PANICHD_*` overrides applied.
pub fn load_config(path: &Path) -> Result<HelpdeskToml> {
    let mut config = HelpdeskToml::load_or_default(path)?;
    config.apply_env();
    Ok(config)
}
