//! # dxtbx 实验列表 (.expt)
//!
//! 仅处理本工具需要的部分：写入含单个探测器的实验列表，
//! 以及按实验序号读回探测器。其他模型列表原样保留为 JSON 值。
//!
//! ## 依赖关系
//! - 被 `geometry/convert.rs`, `commands/` 使用
//! - 使用 `models/detector.rs`, `models/beam.rs`
//! - 使用 `serde_json`

use crate::error::{PanelsimError, Result};
use crate::models::{Beam, Detector};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// 单个实验，模型以列表下标引用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    #[serde(rename = "__id__", default = "experiment_id")]
    pub id: String,
    #[serde(default)]
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beam: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector: Option<usize>,
}

fn experiment_id() -> String {
    "Experiment".to_string()
}

fn experiment_list_id() -> String {
    "ExperimentList".to_string()
}

/// 实验列表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentList {
    #[serde(rename = "__id__", default = "experiment_list_id")]
    pub id: String,
    #[serde(default)]
    pub experiment: Vec<Experiment>,
    #[serde(default)]
    pub imageset: Vec<Value>,
    #[serde(default)]
    pub beam: Vec<Beam>,
    #[serde(default)]
    pub detector: Vec<Detector>,
    #[serde(default)]
    pub goniometer: Vec<Value>,
    #[serde(default)]
    pub scan: Vec<Value>,
    #[serde(default)]
    pub crystal: Vec<Value>,
    #[serde(default)]
    pub profile: Vec<Value>,
    #[serde(default)]
    pub scaling_model: Vec<Value>,
}

impl ExperimentList {
    /// 只含一个探测器（可选光束）的实验列表
    pub fn from_detector(detector: Detector, beam: Option<Beam>) -> Self {
        let beam_ref = beam.as_ref().map(|_| 0);
        ExperimentList {
            id: experiment_list_id(),
            experiment: vec![Experiment {
                id: experiment_id(),
                identifier: String::new(),
                beam: beam_ref,
                detector: Some(0),
            }],
            imageset: Vec::new(),
            beam: beam.into_iter().collect(),
            detector: vec![detector],
            goniometer: Vec::new(),
            scan: Vec::new(),
            crystal: Vec::new(),
            profile: Vec::new(),
            scaling_model: Vec::new(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| PanelsimError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| PanelsimError::FileWriteError {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// 第 `exp_id` 个实验引用的探测器
    pub fn detector_for(&self, exp_id: usize) -> Result<&Detector> {
        let exp = self.experiment.get(exp_id).ok_or_else(|| {
            PanelsimError::InvalidArgument(format!(
                "Experiment {} requested but the list holds {}",
                exp_id,
                self.experiment.len()
            ))
        })?;
        let det_idx = exp.detector.ok_or_else(|| {
            PanelsimError::InvalidDetector(format!("Experiment {} has no detector", exp_id))
        })?;
        self.detector.get(det_idx).ok_or_else(|| {
            PanelsimError::InvalidDetector(format!(
                "Experiment {} references missing detector {}",
                exp_id, det_idx
            ))
        })
    }

    /// 第 `exp_id` 个实验引用的光束（若有）
    pub fn beam_for(&self, exp_id: usize) -> Option<&Beam> {
        self.experiment
            .get(exp_id)
            .and_then(|e| e.beam)
            .and_then(|i| self.beam.get(i))
    }
}

/// 从 .expt 文件读取探测器
pub fn load_detector_from_expt(path: &Path, exp_id: usize) -> Result<Detector> {
    let list = ExperimentList::from_file(path)?;
    list.detector_for(exp_id).cloned()
}
