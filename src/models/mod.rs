//! # 数据模型模块
//!
//! 定义探测器、光束、晶体与实验列表模型（dxtbx 约定）。
//!
//! ## 依赖关系
//! - 被 `parsers/`, `geometry/`, `sim/`, `io/`, `commands/` 使用
//! - 子模块: linalg, detector, beam, crystal, experiment

pub mod beam;
pub mod crystal;
pub mod detector;
pub mod experiment;
pub mod linalg;

pub use beam::Beam;
pub use crystal::{Crystal, Lattice};
pub use detector::{Detector, Panel};
pub use experiment::ExperimentList;
