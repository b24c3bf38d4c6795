//! # 入射 X 射线束模型
//!
//! 单色束描述，序列化为 dxtbx beam 字典。
//!
//! ## 依赖关系
//! - 被 `sim/`, `io/`, `commands/` 使用
//! - 使用 `models/linalg.rs`

use crate::models::linalg::{self, Vec3};

use serde::{Deserialize, Serialize};

/// 单色 X 射线束
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beam {
    #[serde(rename = "__id__", default = "default_beam_id")]
    pub id: String,
    /// 由样品指向光源的单位向量
    pub direction: Vec3,
    /// 波长 (Å)
    pub wavelength: f64,
    #[serde(default)]
    pub divergence: f64,
    #[serde(default)]
    pub sigma_divergence: f64,
    #[serde(default = "default_polarization_normal")]
    pub polarization_normal: Vec3,
    #[serde(default = "default_polarization_fraction")]
    pub polarization_fraction: f64,
    /// 每脉冲光子数
    #[serde(default)]
    pub flux: f64,
    #[serde(default = "default_transmission")]
    pub transmission: f64,
}

fn default_beam_id() -> String {
    "monochromatic".to_string()
}

fn default_polarization_normal() -> Vec3 {
    [0.0, 1.0, 0.0]
}

fn default_polarization_fraction() -> f64 {
    0.999
}

fn default_transmission() -> f64 {
    1.0
}

impl Beam {
    /// `sample_to_source` 会被单位化
    pub fn new(sample_to_source: Vec3, wavelength: f64) -> Self {
        Beam {
            id: default_beam_id(),
            direction: linalg::normalize(sample_to_source),
            wavelength,
            divergence: 0.0,
            sigma_divergence: 0.0,
            polarization_normal: default_polarization_normal(),
            polarization_fraction: default_polarization_fraction(),
            flux: 0.0,
            transmission: default_transmission(),
        }
    }

    /// 入射波矢 s0 = -direction / λ (Å⁻¹)
    pub fn s0(&self) -> Vec3 {
        linalg::scale(self.direction, -1.0 / self.wavelength)
    }

    /// 沿光子传播方向的单位向量
    pub fn unit_s0(&self) -> Vec3 {
        linalg::scale(self.direction, -1.0)
    }

    /// 复制方向、偏振与发散度，替换波长与通量
    pub fn with_wavelength_and_flux(&self, wavelength: f64, flux: f64) -> Self {
        Beam {
            wavelength,
            flux,
            ..self.clone()
        }
    }
}
