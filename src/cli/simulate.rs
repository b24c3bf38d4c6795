//! # simulate 子命令 CLI 定义
//!
//! 在 Jungfrau 16M 或 Eiger 16M 几何上模拟衍射图像，写出带几何属性的 HDF5。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/simulate.rs`

use crate::sim::params::DEFAULT_READOUT_NOISE_ADU;

use clap::{Args, ValueEnum};
use std::path::PathBuf;

/// 探测器型号
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum DetectorModel {
    /// Jungfrau 16M from a CrystFEL geometry file
    Jungfrau,
    /// Eiger 16M split into panels along the gap mask
    Eiger,
    /// Eiger 16M as a single panel with gap pixels set to -1
    Eigermono,
}

impl DetectorModel {
    pub fn is_eiger(&self) -> bool {
        matches!(self, DetectorModel::Eiger | DetectorModel::Eigermono)
    }

    /// 型号对应的默认读出噪声 (ADU)
    pub fn default_readout_noise_adu(&self) -> f64 {
        if self.is_eiger() {
            0.0
        } else {
            DEFAULT_READOUT_NOISE_ADU
        }
    }
}

impl std::fmt::Display for DetectorModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectorModel::Jungfrau => write!(f, "jungfrau"),
            DetectorModel::Eiger => write!(f, "eiger"),
            DetectorModel::Eigermono => write!(f, "eigermono"),
        }
    }
}

/// simulate 子命令参数
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Detector model
    #[arg(short, long, value_enum, default_value_t = DetectorModel::Jungfrau)]
    pub model: DetectorModel,

    /// Run the GPU build of the engine
    #[arg(long, default_value_t = false)]
    pub cuda: bool,

    /// CrystFEL geometry for the jungfrau model
    #[arg(long, default_value = "Jungfrau16M_swissFEL.geom")]
    pub geom: PathBuf,

    /// Detector distance override in mm (jungfrau default 250)
    #[arg(short, long)]
    pub detdist: Option<f64>,

    /// Gap mask for the eiger models
    #[arg(long, default_value = "eiger_gaps.h5")]
    pub gaps: PathBuf,

    /// Dataset name of the gap mask
    #[arg(long, default_value = "is_a_gap")]
    pub gap_dataset: String,

    /// TOML simulation config
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the effective config to this file and continue
    #[arg(long)]
    pub save_config: Option<PathBuf>,

    /// Structure factor table (h k l F)
    #[arg(long)]
    pub hkl: Option<PathBuf>,

    /// Number of images (overrides the config)
    #[arg(short, long)]
    pub num_images: Option<usize>,

    /// Seed for the random crystal orientations (overrides the config)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output HDF5 file (default: {model}_images.h5)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Engine executable (overrides the config)
    #[arg(long)]
    pub engine: Option<String>,

    /// Number of parallel panel jobs (0 = auto)
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,
}

impl SimulateArgs {
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}_images.h5", self.model)))
    }
}
