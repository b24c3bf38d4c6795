//! # 模拟模块
//!
//! 驱动外部布拉格衍射引擎逐面板模拟图像，并在本地完成强度标度、
//! 背景叠加与读出噪声。
//!
//! ## 子模块
//! - `params`: 衍射斑、背景与噪声参数
//! - `spectrum`: 多波长能谱
//! - `scale`: 镶嵌块标度
//! - `engine`: 引擎接口
//! - `command`: nanoBragg 外部进程适配
//! - `noise`: 读出噪声模型
//! - `pipeline`: 完整模拟流程
//!
//! ## 依赖关系
//! - 被 `commands/simulate.rs` 使用
//! - 使用 `models/`, `parsers/hkl.rs`

pub mod command;
pub mod engine;
pub mod noise;
pub mod params;
pub mod pipeline;
pub mod scale;
pub mod spectrum;

pub use command::{NanoBraggEngine, NanoBraggSettings};
pub use params::{BackgroundParams, Profile, SpotParams};
pub use pipeline::{run_simulation, SimulationJob};
pub use spectrum::Spectrum;
