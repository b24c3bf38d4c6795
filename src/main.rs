//! # panelsim - XFEL 多面板探测器几何与衍射图像模拟工具
//!
//! 把 CrystFEL 几何转换为 dxtbx 模型，从缝隙掩膜构建 Eiger 16M，
//! 并驱动外部布拉格衍射引擎逐面板模拟图像。
//!
//! ## 子命令
//! - `convert`  - CrystFEL .geom 转换为 dxtbx .expt
//! - `panelize` - 按缝隙掩膜拆分 Eiger 16M 面板
//! - `simulate` - 在 Jungfrau 16M / Eiger 16M 上模拟衍射图像
//! - `inspect`  - 查看 .expt 或模拟输出中的几何
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/        (命令行参数定义)
//!   ├── commands/   (命令执行逻辑)
//!   │     ├── geometry/  (几何转换与面板拆分)
//!   │     ├── sim/       (模拟流程与引擎适配)
//!   │     ├── io/        (HDF5 读写)
//!   │     ├── parsers/   (.geom / .hkl 解析)
//!   │     └── models/    (dxtbx 数据模型)
//!   ├── config.rs   (TOML 模拟配置)
//!   ├── utils/      (输出与进度条)
//!   └── error.rs    (错误处理)
//! ```

mod batch;
mod cli;
mod commands;
mod config;
mod error;
mod geometry;
mod io;
mod models;
mod parsers;
mod sim;
mod utils;

use clap::Parser;
use cli::Cli;
use env_logger::{Builder, Env};

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();

    Builder::from_env(Env::default().default_filter_or(cli.log_filter()))
        .format_timestamp_millis()
        .init();

    if let Err(e) = commands::run(cli.command) {
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}
