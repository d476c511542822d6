// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The `sonde` collector binary.

mod app;
mod cli;
mod config;

use anyhow::{bail, Result};
use clap::Parser;
use cli::Cli;
use config::SondeConfig;

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    let cli = Cli::parse();

    let mut logger = Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(filter) = &cli.log_level {
        logger.parse_filters(filter);
    }
    logger.init();

    let mut config = SondeConfig::load(cli.config.as_deref())?;
    config.apply(&cli);
    config.validate()?;
    log::debug!("Effective configuration: {config:?}");

    let summary = app::run(&config)?;
    log::info!(
        "Sampled {} cpus and {} gpus{}",
        summary.cpus,
        summary.gpus,
        if summary.processes { " and processes" } else { "" }
    );

    if !summary.faults.is_empty() {
        for fault in &summary.faults {
            log::error!("{}", fault);
        }
        bail!("{} monitors ended with a fault", summary.faults.len());
    }
    Ok(())
}
