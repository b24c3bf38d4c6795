//! # panelize 子命令 CLI 定义
//!
//! 由 Eiger 16M 缝隙掩膜生成多面板（或单片）探测器模型。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/panelize.rs`

use clap::Args;
use std::path::PathBuf;

/// panelize 子命令参数
#[derive(Args, Debug)]
pub struct PanelizeArgs {
    /// HDF5 file holding the gap mask
    #[arg(short, long, default_value = "eiger_gaps.h5")]
    pub gaps: PathBuf,

    /// Dataset name of the gap mask
    #[arg(long, default_value = "is_a_gap")]
    pub dataset: String,

    /// Detector distance in mm
    #[arg(short, long, default_value_t = 200.0)]
    pub detdist: f64,

    /// Pixel size in mm
    #[arg(long, default_value_t = 0.075)]
    pub pixel_size: f64,

    /// Keep the whole mask as one monolithic panel
    #[arg(long, default_value_t = false)]
    pub single_panel: bool,

    /// Smallest accepted panel, exclusive (pixels)
    #[arg(long, default_value_t = 200_000)]
    pub min_pixels: usize,

    /// Largest accepted panel, exclusive (pixels)
    #[arg(long, default_value_t = 530_000)]
    pub max_pixels: usize,

    /// Output .expt file
    #[arg(short, long, default_value = "eiger16M.expt")]
    pub output: PathBuf,
}
