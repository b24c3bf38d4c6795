//! # 衍射引擎接口
//!
//! 布拉格衍射与非晶背景的物理计算由外部引擎完成，本模块只定义
//! 单面板请求和返回的像素数组 (slow, fast)，单位为光子数。
//!
//! ## 依赖关系
//! - 被 `sim/pipeline.rs`, `sim/command.rs` 使用
//! - 使用 `models/`, `parsers/hkl.rs`

use crate::error::Result;
use crate::models::{Beam, Panel};
use crate::parsers::hkl::StructureFactors;
use crate::sim::params::{BackgroundParams, SpotParams};

use ndarray::Array2;

/// 单面板背景模拟请求
#[derive(Debug, Clone, Copy)]
pub struct BackgroundRequest<'a> {
    pub panel_index: usize,
    pub panel: &'a Panel,
    pub beam: &'a Beam,
    /// 每个波长一束，通量已按权重分配
    pub xray_beams: &'a [Beam],
    pub total_flux: f64,
    pub params: &'a BackgroundParams,
}

/// 单面板衍射斑模拟请求
#[derive(Debug, Clone, Copy)]
pub struct SpotRequest<'a> {
    pub panel_index: usize,
    pub panel: &'a Panel,
    pub beam: &'a Beam,
    pub xray_beams: &'a [Beam],
    pub total_flux: f64,
    /// 行主序展开的 Aᵀ，行依次为 a*, b*, c* (Å⁻¹)
    pub a_matrix: [f64; 9],
    /// 每个镶嵌块沿 a, b, c 的晶胞数
    pub ncells: [usize; 3],
    pub spot_scale: f64,
    pub structure_factors: Option<&'a StructureFactors>,
    /// 光束与面板交点 (mm)，仅在重新定位时给出
    pub beam_center_mm: Option<(f64, f64)>,
    pub params: &'a SpotParams,
    pub use_gpu: bool,
}

/// 外部衍射模拟引擎
pub trait DiffractionEngine: Sync {
    fn name(&self) -> &str;

    fn simulate_background(&self, request: &BackgroundRequest<'_>) -> Result<Array2<f64>>;

    /// 返回各波长结果之和
    fn simulate_spots(&self, request: &SpotRequest<'_>) -> Result<Array2<f64>>;
}
