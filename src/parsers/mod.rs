//! # 解析器模块
//!
//! 提供探测器几何文件与结构因子表的文本解析器。
//!
//! ## 依赖关系
//! - 被 `geometry/`, `commands/` 使用
//! - 使用 `models/` 数据模型
//! - 子模块: geom, hkl

pub mod geom;
pub mod hkl;
