mod app;
mod capture;
mod config;
mod decode;
mod error;
mod export;
mod logger;
mod notify;
mod overlay;
mod scanner;
mod store;

use log::{error, warn};

use crate::config::Config;

fn main() -> anyhow::Result<()> {
    let (config, config_err) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    logger::init_logger(config.log_level);
    if let Some(e) = config_err {
        warn!("using default settings: {e}");
    }

    if let Err(e) = app::run(config) {
        error!("{e:#}");
        return Err(e);
    }
    Ok(())
}
