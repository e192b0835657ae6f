//! CLI command implementations.
//!
//! | Module   | Commands handled    |
//! |----------|---------------------|
//! | `create` | `Create`, `Watch`   |
//! | `status` | `Status`            |
//! | `config` | `Config`            |

pub mod config;
pub mod create;
pub mod status;

pub use config::cmd_config;
pub use create::{cmd_create, cmd_watch};
pub use status::cmd_status;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use streamwatch::api::HttpStreamApi;
use streamwatch::config::Config;

use super::Cli;

/// Resolve configuration: file, then environment, then flags.
pub fn load_config(cli: &Cli, working_dir: &Path) -> Result<Config> {
    let mut config = Config::discover(cli.config.as_deref(), working_dir)?;
    config.apply_env()?;
    let config = config.with_cli_args(cli.api_url.clone());
    config.validate()?;
    Ok(config)
}

pub fn build_api(config: &Config) -> Result<Arc<HttpStreamApi>> {
    let api = HttpStreamApi::new(config.api.base_url.clone(), config.request_timeout())?;
    tracing::debug!(base_url = api.base_url(), "Using backend");
    Ok(Arc::new(api))
}
