//! # inspect 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/inspect.rs`

use clap::Args;
use std::path::PathBuf;

/// inspect 子命令参数
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// .expt or .h5 file to inspect
    pub input: PathBuf,

    /// Experiment index inside an .expt file
    #[arg(short, long, default_value_t = 0)]
    pub experiment: usize,
}
