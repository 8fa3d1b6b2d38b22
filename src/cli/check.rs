//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了配置校验命令。

use crate::cli::CheckArgs;
use crate::config::Config;
use anyhow::{anyhow, Context, Result};

pub fn execute(args: &CheckArgs) -> Result<()> {
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;

    println!("✅ Configuration is valid");
    println!(
        "Global lock timeout: {} ms, minimal puts: {}",
        config.global.lock_timeout_ms, config.global.minimal_puts
    );

    let mut names: Vec<&String> = config.regions.keys().collect();
    names.sort();
    for name in names {
        let region = &config.regions[name];
        println!(
            "  - {:<32} backend={:?} lock_timeout={:?}",
            name,
            region.backend,
            region.lock_timeout(&config.global)
        );
    }
    Ok(())
}
