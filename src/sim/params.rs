//! # 模拟参数
//!
//! 布拉格衍射、非晶背景和读出噪声的参数，均可由 TOML 配置反序列化，
//! 缺省字段取下列默认值。
//!
//! ## 依赖关系
//! - 被 `sim/`, `config.rs` 使用
//! - 使用 `serde`

use serde::{Deserialize, Serialize};

/// 倒易格点形状
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Square,
    Round,
    Gauss,
    Tophat,
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Profile::Square => write!(f, "square"),
            Profile::Round => write!(f, "round"),
            Profile::Gauss => write!(f, "gauss"),
            Profile::Tophat => write!(f, "tophat"),
        }
    }
}

/// 未指定型号时的读出噪声 (ADU)
pub const DEFAULT_READOUT_NOISE_ADU: f64 = 3.0;

/// 读出噪声模型参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseParams {
    /// ADC 偏置 (ADU)
    pub adc_offset_adu: f64,
    /// 高斯读出噪声 (ADU)，缺省时 `simulate` 按探测器型号选择
    pub readout_noise_adu: Option<f64>,
    /// 每个光子对应的 ADU
    pub quantum_gain: f64,
    /// 逐像素增益标定误差（百分比）
    pub calibration_noise_pct: f64,
    pub noise_seed: Option<u64>,
    /// 标定误差使用独立种子，使同一探测器的增益图案在各图像间保持不变
    pub calib_seed: Option<u64>,
}

impl Default for NoiseParams {
    fn default() -> Self {
        NoiseParams {
            adc_offset_adu: 10.0,
            readout_noise_adu: None,
            quantum_gain: 1.0,
            calibration_noise_pct: 3.0,
            noise_seed: None,
            calib_seed: None,
        }
    }
}

/// 布拉格衍射斑参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotParams {
    /// 像素过采样倍数，0 表示由引擎自动决定
    pub oversample: u32,
    /// 镶嵌块体积 (Å³)
    pub mosaic_vol_a3: f64,
    pub mosaic_domains: u32,
    /// 镶嵌展宽 (度)
    pub mosaic_spread_deg: f64,
    pub profile: Profile,
    /// 晶体直径 (mm)
    pub crystal_size_mm: f64,
    /// 光斑直径 (mm)
    pub beam_size_mm: f64,
    pub device_id: u32,
    /// 结构因子表中缺失反射的振幅
    pub default_f: f64,
    pub interpolate: bool,
    pub mosaic_seed: Option<u64>,
    /// 按光束中心重新定位面板
    pub recenter: bool,
    pub spot_scale_override: Option<f64>,
    pub add_noise: bool,
    pub background_scale: f64,
    pub noise: NoiseParams,
}

impl Default for SpotParams {
    fn default() -> Self {
        SpotParams {
            oversample: 0,
            mosaic_vol_a3: 3000f64.powi(3),
            mosaic_domains: 1,
            mosaic_spread_deg: 0.0,
            profile: Profile::Square,
            crystal_size_mm: 0.01,
            beam_size_mm: 0.001,
            device_id: 0,
            default_f: 0.0,
            interpolate: false,
            mosaic_seed: None,
            recenter: true,
            spot_scale_override: None,
            add_noise: true,
            background_scale: 1.0,
            noise: NoiseParams::default(),
        }
    }
}

impl SpotParams {
    pub fn spot_scale(&self) -> f64 {
        self.spot_scale_override.unwrap_or_else(|| {
            super::scale::determine_spot_scale(
                self.beam_size_mm,
                self.crystal_size_mm,
                self.mosaic_vol_a3,
            )
        })
    }
}

/// 水的背景散射因子随 sin(θ)/λ 的变化，每项为 (stol, Fbg)
pub const WATER_FBG_VS_STOL: [(f64, f64); 14] = [
    (0.0, 2.57),
    (0.0365, 2.58),
    (0.07, 2.8),
    (0.12, 5.0),
    (0.162, 8.0),
    (0.2, 6.75),
    (0.18, 7.32),
    (0.216, 6.75),
    (0.236, 6.5),
    (0.28, 4.5),
    (0.3, 4.3),
    (0.345, 4.36),
    (0.436, 3.77),
    (0.5, 3.17),
];

/// 非晶背景（溶剂）参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundParams {
    pub beam_size_mm: f64,
    /// 光束穿过的样品厚度 (mm)
    pub sample_thick_mm: f64,
    pub density_gcm3: f64,
    /// 分子量 (Da)
    pub molecular_weight: f64,
    pub fbg_vs_stol: Vec<(f64, f64)>,
}

impl Default for BackgroundParams {
    fn default() -> Self {
        BackgroundParams {
            beam_size_mm: 0.001,
            sample_thick_mm: 100.0,
            density_gcm3: 1.0,
            molecular_weight: 18.0,
            fbg_vs_stol: WATER_FBG_VS_STOL.to_vec(),
        }
    }
}
