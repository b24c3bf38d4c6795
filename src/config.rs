//! # 模拟配置
//!
//! `simulate` 子命令的 TOML 配置。缺省的表使用示例场景的取值
//! （溶菌酶晶体、1.3 Å、1e12 光子/脉冲），命令行参数覆盖配置文件。
//! `[spots]` 与 `[background]` 只写部分键时，其余键仍取示例场景的值。
//!
//! ```toml
//! num_images = 2
//! rotation_seed = 8675309
//!
//! [beam]
//! wavelength = 1.3
//! direction = [0.0, 0.0, 1.0]
//! total_flux = 1e12
//!
//! [crystal]
//! space_group = "P43212"
//! real_a = [79.0, 0.0, 0.0]
//! real_b = [0.0, 79.0, 0.0]
//! real_c = [0.0, 0.0, 38.0]
//! ```
//!
//! ## 依赖关系
//! - 被 `commands/simulate.rs` 使用
//! - 使用 `serde`, `toml`

use crate::error::{PanelsimError, Result};
use crate::io::WriterOptions;
use crate::models::linalg::Vec3;
use crate::models::{Beam, Crystal, Lattice};
use crate::sim::{BackgroundParams, NanoBraggSettings, Profile, Spectrum, SpotParams};

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeamConfig {
    /// 波长 (Å)
    pub wavelength: f64,
    /// 由样品指向光源
    pub direction: Vec3,
    /// 每脉冲总光子数
    pub total_flux: f64,
    /// 多波长能谱，缺省为单色
    pub spectrum: Option<Spectrum>,
}

impl Default for BeamConfig {
    fn default() -> Self {
        BeamConfig {
            wavelength: 1.3,
            direction: [0.0, 0.0, 1.0],
            total_flux: 1e12,
            spectrum: None,
        }
    }
}

impl BeamConfig {
    pub fn beam(&self) -> Beam {
        Beam::new(self.direction, self.wavelength)
    }

    pub fn spectrum(&self) -> Result<Spectrum> {
        match &self.spectrum {
            Some(s) => Spectrum::new(s.wavelengths.clone(), s.weights.clone()),
            None => Ok(Spectrum::monochromatic(self.wavelength)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrystalConfig {
    pub space_group: String,
    /// 实空间基矢 (Å)
    pub real_a: Vec3,
    pub real_b: Vec3,
    pub real_c: Vec3,
    /// (a, b, c, α, β, γ)，设置后取代 real_a/b/c，a 沿 x 轴
    pub unit_cell: Option<[f64; 6]>,
}

impl Default for CrystalConfig {
    fn default() -> Self {
        CrystalConfig {
            space_group: "P43212".to_string(),
            real_a: [79.0, 0.0, 0.0],
            real_b: [0.0, 79.0, 0.0],
            real_c: [0.0, 0.0, 38.0],
            unit_cell: None,
        }
    }
}

impl CrystalConfig {
    pub fn crystal(&self) -> Crystal {
        match self.unit_cell {
            Some([a, b, c, alpha, beta, gamma]) => Crystal {
                lattice: Lattice::from_parameters(a, b, c, alpha, beta, gamma),
                space_group: self.space_group.clone(),
            },
            None => Crystal::new(self.real_a, self.real_b, self.real_c, self.space_group.clone()),
        }
    }
}

/// `simulate` 的完整配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub num_images: usize,
    pub rotation_seed: u64,
    pub beam: BeamConfig,
    pub crystal: CrystalConfig,
    #[serde(deserialize_with = "spots_over_example")]
    pub spots: SpotParams,
    #[serde(deserialize_with = "background_over_example")]
    pub background: BackgroundParams,
    pub engine: NanoBraggSettings,
    pub output: WriterOptions,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            num_images: 2,
            rotation_seed: 8675309,
            beam: BeamConfig::default(),
            crystal: CrystalConfig::default(),
            spots: example_spots(),
            background: example_background(),
            engine: NanoBraggSettings::default(),
            output: WriterOptions::default(),
        }
    }
}

fn example_spots() -> SpotParams {
    SpotParams {
        crystal_size_mm: 0.050,
        beam_size_mm: 0.001,
        mosaic_vol_a3: 2000f64.powi(3),
        profile: Profile::Gauss,
        ..SpotParams::default()
    }
}

fn example_background() -> BackgroundParams {
    BackgroundParams {
        sample_thick_mm: 0.200,
        ..BackgroundParams::default()
    }
}

fn spots_over_example<'de, D>(deserializer: D) -> std::result::Result<SpotParams, D::Error>
where
    D: Deserializer<'de>,
{
    overlay(deserializer, example_spots())
}

fn background_over_example<'de, D>(
    deserializer: D,
) -> std::result::Result<BackgroundParams, D::Error>
where
    D: Deserializer<'de>,
{
    overlay(deserializer, example_background())
}

/// 把文件中给出的键逐层覆盖到 `base` 上
fn overlay<'de, D, T>(deserializer: D, base: T) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Serialize + DeserializeOwned,
{
    let given = toml::Value::deserialize(deserializer)?;
    let mut merged = toml::Value::try_from(base).map_err(de::Error::custom)?;
    merge_tables(&mut merged, given);
    merged.try_into().map_err(de::Error::custom)
}

fn merge_tables(base: &mut toml::Value, given: toml::Value) {
    match (base, given) {
        (toml::Value::Table(base), toml::Value::Table(given)) => {
            for (key, value) in given {
                match base.get_mut(&key) {
                    Some(slot) => merge_tables(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

impl SimulationConfig {
    /// 从 TOML 文件读取
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| PanelsimError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: SimulationConfig =
            toml::from_str(&content).map_err(|e| PanelsimError::ConfigError {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        config.validate().map_err(|e| PanelsimError::ConfigError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    /// 写出 TOML 文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let body = toml::to_string_pretty(self).map_err(|e| PanelsimError::ConfigError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        fs::write(path, format!("# panelsim simulation config\n\n{}", body)).map_err(|e| {
            PanelsimError::FileWriteError {
                path: path.display().to_string(),
                source: e,
            }
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_images == 0 {
            return Err(PanelsimError::InvalidArgument(
                "num_images must be at least 1".to_string(),
            ));
        }
        if self.beam.wavelength <= 0.0 || self.beam.total_flux < 0.0 {
            return Err(PanelsimError::InvalidArgument(
                "Beam wavelength must be positive and total_flux non-negative".to_string(),
            ));
        }
        if self.crystal.crystal().unit_cell_volume() <= 1e-6 {
            return Err(PanelsimError::InvalidCrystal(
                "Unit cell volume must be positive".to_string(),
            ));
        }
        if self.spots.mosaic_vol_a3 <= 0.0 || self.spots.crystal_size_mm <= 0.0 {
            return Err(PanelsimError::InvalidArgument(
                "Mosaic volume and crystal size must be positive".to_string(),
            ));
        }
        if let Some(level) = self.output.compression {
            if level > 9 {
                return Err(PanelsimError::InvalidArgument(format!(
                    "Deflate level {} is out of range 0-9",
                    level
                )));
            }
        }
        self.beam.spectrum()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::StorageType;

    #[test]
    fn test_defaults_match_example_scene() {
        let c = SimulationConfig::default();
        assert_eq!(c.num_images, 2);
        assert_eq!(c.rotation_seed, 8675309);
        assert_eq!(c.spots.profile, Profile::Gauss);
        assert_eq!(c.spots.mosaic_vol_a3, 8e9);
        assert_eq!(c.background.sample_thick_mm, 0.2);
        assert_eq!(c.crystal.crystal().space_group, "P43212");
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.toml");
        fs::write(
            &path,
            "num_images = 5\n[beam]\nwavelength = 1.0\n[output]\nstorage = \"f32\"\ncompression = 4\n",
        )
        .unwrap();

        let c = SimulationConfig::load(&path).unwrap();
        assert_eq!(c.num_images, 5);
        assert_eq!(c.beam.wavelength, 1.0);
        assert_eq!(c.beam.total_flux, 1e12);
        assert_eq!(c.output.storage, StorageType::F32);
        assert_eq!(c.output.compression, Some(4));
        assert_eq!(c.spots.profile, Profile::Gauss);
    }

    #[test]
    fn test_partial_spots_table_keeps_example_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.toml");
        fs::write(
            &path,
            "[spots]\nadd_noise = false\n[spots.noise]\nnoise_seed = 7\n[background]\ndensity_gcm3 = 1.1\n",
        )
        .unwrap();

        let c = SimulationConfig::load(&path).unwrap();
        assert!(!c.spots.add_noise);
        assert_eq!(c.spots.noise.noise_seed, Some(7));
        assert_eq!(c.spots.noise.adc_offset_adu, 10.0);
        assert_eq!(c.spots.crystal_size_mm, 0.05);
        assert_eq!(c.spots.beam_size_mm, 0.001);
        assert_eq!(c.spots.mosaic_vol_a3, 8e9);
        assert_eq!(c.spots.profile, Profile::Gauss);
        assert_eq!(c.background.sample_thick_mm, 0.2);
        assert_eq!(c.background.density_gcm3, 1.1);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = SimulationConfig::default();
        config.beam.spectrum = Some(Spectrum::new(vec![1.29, 1.31], vec![1.0, 2.0]).unwrap());
        config.spots.noise.noise_seed = Some(42);
        config.save(&path).unwrap();

        let loaded = SimulationConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_unit_cell_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cell.toml");
        fs::write(
            &path,
            "[crystal]\nspace_group = \"P6122\"\nunit_cell = [40.0, 40.0, 100.0, 90.0, 90.0, 120.0]\n",
        )
        .unwrap();

        let c = SimulationConfig::load(&path).unwrap();
        let (a, _, cc, _, _, gamma) = c.crystal.crystal().lattice.parameters();
        assert!((a - 40.0).abs() < 1e-9);
        assert!((cc - 100.0).abs() < 1e-9);
        assert!((gamma - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "num_images = 0\n").unwrap();
        assert!(matches!(
            SimulationConfig::load(&path),
            Err(PanelsimError::ConfigError { .. })
        ));

        fs::write(&path, "[spots]\nprofile = \"lorentz\"\n").unwrap();
        assert!(SimulationConfig::load(&path).is_err());
    }
}
