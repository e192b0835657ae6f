//! Configuration view: `streamwatch config`.

use anyhow::Result;
use std::path::Path;

use streamwatch::config::Config;

pub fn cmd_config(config: &Config, explicit: Option<&Path>, working_dir: &Path) -> Result<()> {
    let source = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => Config::search_paths(working_dir)
            .into_iter()
            .find(|p| p.exists()),
    };

    match source {
        Some(path) => println!("# Config file: {}", path.display()),
        None => println!("# No config file found, using defaults"),
    }
    println!("# Effective values (with env/CLI overrides)");
    println!();
    print!("{}", config.to_toml()?);
    Ok(())
}
