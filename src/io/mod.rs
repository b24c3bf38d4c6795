//! # HDF5 读写模块
//!
//! 模拟图像的 HDF5 输出，以及缝隙掩膜的读取。
//!
//! ## 依赖关系
//! - 被 `sim/pipeline.rs`, `commands/` 使用
//! - 使用 `hdf5` (metno), `ndarray`, `serde_json`
//! - 子模块: writer, mask

pub mod mask;
pub mod writer;

pub use mask::read_gap_mask;
pub use writer::{GeomImageReader, GeomImageWriter, StorageType, WriterOptions};
