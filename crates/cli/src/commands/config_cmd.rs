//! `cortex config` — Configuration helpers.

use cortex_config::AppConfig;
use std::path::Path;

pub fn show() {
    print!("{}", AppConfig::default_toml());
}

pub fn path(config_path: Option<&Path>) {
    match config_path {
        Some(path) => println!("{}", path.display()),
        None => println!("{}", AppConfig::config_dir().join("config.toml").display()),
    }
}
