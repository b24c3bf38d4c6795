//! # convert 子命令 CLI 定义
//!
//! CrystFEL 几何文件 (.geom) 转 dxtbx 实验列表 (.expt)，支持单文件或目录批量转换。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/convert.rs`

use clap::Args;
use std::path::PathBuf;

/// convert 子命令参数
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Input .geom file or directory of .geom files
    pub input: PathBuf,

    /// Output .expt file (single input) or directory (batch); defaults to alongside the input
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Override the detector distance in mm
    #[arg(short, long)]
    pub detdist: Option<f64>,

    /// Glob pattern for input files (comma separated)
    #[arg(short, long, default_value = "*.geom")]
    pub pattern: String,

    /// Recurse into subdirectories
    #[arg(short, long, default_value_t = false)]
    pub recursive: bool,

    /// Overwrite existing output files
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,
}
