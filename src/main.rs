use anyhow::{Context, Result};
use env_logger::{Builder, Env};

use strata::{AppConfig, METHOD_ENV};

const USAGE: &str =
    "usage: strata [alpha|kbuffer2|kbuffer4] [--capacity N] [--size WxH] [--no-vsync]";

fn main() -> Result<()> {
    Builder::from_env(Env::default().default_filter_or("info"))
        .filter_module("wgpu_hal", log::LevelFilter::Error)
        .filter_module("wgpu_core", log::LevelFilter::Warn)
        .init();

    let env_method = std::env::var(METHOD_ENV).ok();
    let config =
        AppConfig::from_args(std::env::args().skip(1), env_method.as_deref()).context(USAGE)?;

    strata::run(config)?;
    Ok(())
}
