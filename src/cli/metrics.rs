//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了指标输出命令。

use crate::metrics::get_metrics_string;
use anyhow::Result;

pub fn execute() -> Result<()> {
    let text = get_metrics_string();
    if text.is_empty() {
        println!("No metrics recorded in this process.");
    } else {
        print!("{}", text);
    }
    Ok(())
}
