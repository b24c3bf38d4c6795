//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `convert`: CrystFEL .geom → dxtbx .expt
//! - `panelize`: 由缝隙掩膜生成 Eiger 16M 多面板模型
//! - `simulate`: 多面板衍射图像模拟
//! - `inspect`: 查看 .expt / .h5 中的几何
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: convert, panelize, simulate, inspect

pub mod convert;
pub mod inspect;
pub mod panelize;
pub mod simulate;

use clap::{ArgAction, Parser, Subcommand};

/// panelsim - 多面板 XFEL 探测器图像模拟工具箱
#[derive(Parser)]
#[command(name = "panelsim")]
#[command(author = "Changjiang Wu")]
#[command(version)]
#[command(about = "Multi-panel XFEL detector geometry and image simulation toolkit", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// `RUST_LOG` 未设置时使用的日志级别
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Convert CrystFEL .geom files to dxtbx experiment lists (.expt)
    Convert(convert::ConvertArgs),

    /// Build a multi-panel Eiger 16M model from a gap mask
    Panelize(panelize::PanelizeArgs),

    /// Simulate diffraction images on a multi-panel detector
    Simulate(simulate::SimulateArgs),

    /// Show the detector and beam stored in an .expt or .h5 file
    Inspect(inspect::InspectArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_levels() {
        let cli = Cli::parse_from(["panelsim", "-vv", "inspect", "det.expt"]);
        assert_eq!(cli.log_filter(), "debug");
        let cli = Cli::parse_from(["panelsim", "inspect", "det.expt"]);
        assert_eq!(cli.log_filter(), "warn");
    }
}
