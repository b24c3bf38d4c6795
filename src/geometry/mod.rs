//! # 探测器几何模块
//!
//! 构建 dxtbx 探测器模型：由 CrystFEL 几何文件转换，或由缝隙掩膜合成。
//!
//! ## 子模块
//! - `convert`: CrystFEL .geom → dxtbx 面板
//! - `panelize`: 连通区域标记与面板提取
//! - `eiger`: Eiger 16M 合成模型
//!
//! ## 依赖关系
//! - 被 `commands/` 使用
//! - 使用 `parsers/`, `models/`

pub mod convert;
pub mod eiger;
pub mod panelize;

pub use convert::convert_crystfel_to_dxtbx;
pub use eiger::{get_multi_panel_eiger, EigerOptions};
pub use panelize::PixelCountWindow;
