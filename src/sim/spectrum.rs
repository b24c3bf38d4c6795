//! # 入射能谱
//!
//! 多波长（粉色光）模拟的波长与权重。权重归一化后乘以总通量，
//! 每个波长派生出一束继承原光束方向、偏振与发散度的 X 射线。
//!
//! ## 依赖关系
//! - 被 `sim/pipeline.rs` 使用
//! - 使用 `models/beam.rs`

use crate::error::{PanelsimError, Result};
use crate::models::Beam;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    /// 波长 (Å)
    pub wavelengths: Vec<f64>,
    pub weights: Vec<f64>,
}

impl Spectrum {
    pub fn new(wavelengths: Vec<f64>, weights: Vec<f64>) -> Result<Self> {
        let spectrum = Spectrum {
            wavelengths,
            weights,
        };
        spectrum.validate()?;
        Ok(spectrum)
    }

    pub fn monochromatic(wavelength: f64) -> Self {
        Spectrum {
            wavelengths: vec![wavelength],
            weights: vec![1.0],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.wavelengths.len() != self.weights.len() {
            return Err(PanelsimError::InvalidArgument(format!(
                "Spectrum has {} wavelengths but {} weights",
                self.wavelengths.len(),
                self.weights.len()
            )));
        }
        if self.wavelengths.is_empty() {
            return Err(PanelsimError::InvalidArgument(
                "Spectrum needs at least one wavelength".to_string(),
            ));
        }
        if self.wavelengths.iter().any(|&w| w <= 0.0) {
            return Err(PanelsimError::InvalidArgument(
                "Wavelengths must be positive".to_string(),
            ));
        }
        let sum: f64 = self.weights.iter().sum();
        if self.weights.iter().any(|&w| w < 0.0) || sum <= 0.0 {
            return Err(PanelsimError::InvalidArgument(
                "Spectrum weights must be non-negative with a positive sum".to_string(),
            ));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.wavelengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelengths.is_empty()
    }

    /// 每个波长的通量，总和等于 `total_flux`
    pub fn fluxes(&self, total_flux: f64) -> Vec<f64> {
        let sum: f64 = self.weights.iter().sum();
        self.weights.iter().map(|w| w / sum * total_flux).collect()
    }

    /// 每个波长一束光
    pub fn xray_beams(&self, originator: &Beam, total_flux: f64) -> Vec<Beam> {
        self.wavelengths
            .iter()
            .zip(self.fluxes(total_flux))
            .map(|(&wavelength, flux)| originator.with_wavelength_and_flux(wavelength, flux))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fluxes_are_normalised() {
        let spectrum = Spectrum::new(vec![1.29, 1.3, 1.31], vec![1.0, 2.0, 1.0]).unwrap();
        let fluxes = spectrum.fluxes(1e12);
        assert!((fluxes.iter().sum::<f64>() - 1e12).abs() < 1.0);
        assert!((fluxes[1] - 5e11).abs() < 1.0);
    }

    #[test]
    fn test_beams_inherit_direction() {
        let mut beam = Beam::new([0.0, 0.1, 1.0], 1.3);
        beam.divergence = 1e-4;
        let spectrum = Spectrum::new(vec![1.2, 1.4], vec![3.0, 1.0]).unwrap();
        let beams = spectrum.xray_beams(&beam, 4.0);
        assert_eq!(beams.len(), 2);
        assert_eq!(beams[0].direction, beam.direction);
        assert_eq!(beams[1].divergence, 1e-4);
        assert_eq!(beams[0].wavelength, 1.2);
        assert!((beams[0].flux - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(Spectrum::new(vec![1.0, 1.1], vec![1.0]).is_err());
        assert!(Spectrum::new(vec![1.0], vec![0.0]).is_err());
    }
}
