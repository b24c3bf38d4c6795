//! # 探测器读出噪声
//!
//! 把期望光子数图像转换为带噪声的 ADU 图像：
//! 1. 泊松光子统计
//! 2. 逐像素增益标定误差（独立种子）
//! 3. 量子增益与 ADC 偏置
//! 4. 高斯读出噪声
//!
//! ## 依赖关系
//! - 被 `sim/pipeline.rs` 使用
//! - 使用 `rand`, `rand_distr`, `ndarray`

use crate::error::{PanelsimError, Result};
use crate::sim::params::{NoiseParams, DEFAULT_READOUT_NOISE_ADU};

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{thread_rng, RngCore, SeedableRng};
use rand_distr::{Distribution, Normal, Poisson};

/// 对期望光子数图像施加噪声，返回 ADU
pub fn apply_detector_noise(expected_photons: &Array2<f64>, params: &NoiseParams) -> Result<Array2<f64>> {
    let noise_seed = params.noise_seed.unwrap_or_else(|| thread_rng().next_u64());
    let calib_seed = params.calib_seed.unwrap_or_else(|| thread_rng().next_u64());
    let mut rng = StdRng::seed_from_u64(noise_seed);
    let mut calib_rng = StdRng::seed_from_u64(calib_seed);

    let calib_dist = normal(1.0, params.calibration_noise_pct / 100.0)?;
    let readout_dist = normal(
        0.0,
        params.readout_noise_adu.unwrap_or(DEFAULT_READOUT_NOISE_ADU),
    )?;

    let mut adu = expected_photons.clone();
    adu.mapv_inplace(|expected| {
        let photons = sample_photons(expected, &mut rng);
        let calibrated = photons * calib_dist.sample(&mut calib_rng);
        let signal = calibrated * params.quantum_gain + params.adc_offset_adu;
        signal + readout_dist.sample(&mut rng)
    });

    Ok(adu)
}

fn normal(mean: f64, sigma: f64) -> Result<Normal<f64>> {
    Normal::new(mean, sigma.max(0.0)).map_err(|e| {
        PanelsimError::InvalidArgument(format!("Invalid noise width {}: {}", sigma, e))
    })
}

fn sample_photons(expected: f64, rng: &mut StdRng) -> f64 {
    if expected.is_nan() || expected <= 0.0 {
        return 0.0;
    }
    match Poisson::new(expected) {
        Ok(dist) => dist.sample(rng),
        Err(_) => expected,
    }
}
