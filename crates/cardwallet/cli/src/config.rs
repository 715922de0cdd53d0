//! Layered CLI configuration

use std::path::Path;

use cardwallet::Config;
use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};

/// Session config from defaults overlaid with an optional TOML file
pub(crate) fn load_config(path: Option<&Path>) -> eyre::Result<Config> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    if let Some(path) = path {
        if !path.exists() {
            eyre::bail!("config file {} not found", path.display());
        }
        figment = figment.merge(Toml::file(path));
    }
    Ok(figment.extract()?)
}
