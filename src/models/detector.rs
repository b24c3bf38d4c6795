//! # 探测器数据模型
//!
//! 多面板平面探测器的几何描述，字段与序列化格式遵循 dxtbx 的字典约定，
//! 因而可以直接写入 `.expt` 文件或 HDF5 属性供 DIALS 读取。
//!
//! ## 坐标约定
//! - 晶体位于原点，+z 由样品指向光源，面板原点通常位于 -z
//! - `origin` 为内存中第一个像素外角的位置（mm）
//! - `image_size` 为 (fast, slow) 像素数
//!
//! ## 依赖关系
//! - 被 `geometry/`, `io/`, `sim/` 使用
//! - 使用 `models/linalg.rs`

use crate::error::{PanelsimError, Result};
use crate::models::linalg::{self, Vec3};

use serde::{Deserialize, Serialize};

/// 像素/毫米换算策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PxMmStrategy {
    #[serde(rename = "type")]
    pub strategy: String,
}

impl Default for PxMmStrategy {
    fn default() -> Self {
        PxMmStrategy {
            strategy: "SimplePxMmStrategy".to_string(),
        }
    }
}

/// 单个传感器面板
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default = "default_panel_type")]
    pub panel_type: String,
    pub fast_axis: Vec3,
    pub slow_axis: Vec3,
    pub origin: Vec3,
    #[serde(default)]
    pub raw_image_offset: [i64; 2],
    pub image_size: [usize; 2],
    pub pixel_size: [f64; 2],
    pub trusted_range: [f64; 2],
    #[serde(default)]
    pub thickness: f64,
    #[serde(default)]
    pub material: String,
    #[serde(default)]
    pub mu: f64,
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub mask: Vec<[i64; 4]>,
    #[serde(default = "default_gain")]
    pub gain: f64,
    #[serde(default)]
    pub pedestal: f64,
    #[serde(default)]
    pub px_mm_strategy: PxMmStrategy,
}

fn default_panel_type() -> String {
    "SENSOR_PAD".to_string()
}

fn default_gain() -> f64 {
    1.0
}

impl Panel {
    /// 创建硅像素面板，其余字段取常用默认值
    pub fn new(
        name: impl Into<String>,
        fast_axis: Vec3,
        slow_axis: Vec3,
        origin: Vec3,
        pixel_size_mm: f64,
        image_size: [usize; 2],
    ) -> Self {
        Panel {
            name: name.into(),
            panel_type: default_panel_type(),
            fast_axis,
            slow_axis,
            origin,
            raw_image_offset: [0, 0],
            image_size,
            pixel_size: [pixel_size_mm, pixel_size_mm],
            trusted_range: [-1.0, 1e6],
            thickness: 0.0,
            material: "Si".to_string(),
            mu: 0.0,
            identifier: String::new(),
            mask: Vec::new(),
            gain: 1.0,
            pedestal: 0.0,
            px_mm_strategy: PxMmStrategy::default(),
        }
    }

    /// 面板法向量 (fast × slow)
    pub fn normal(&self) -> Vec3 {
        linalg::normalize(linalg::cross(self.fast_axis, self.slow_axis))
    }

    /// 像素坐标 (fast, slow) 转实验室坐标 (mm)
    pub fn pixel_to_lab(&self, fast: f64, slow: f64) -> Vec3 {
        let f = linalg::scale(self.fast_axis, fast * self.pixel_size[0]);
        let s = linalg::scale(self.slow_axis, slow * self.pixel_size[1]);
        linalg::add(self.origin, linalg::add(f, s))
    }

    /// 四个外角的实验室坐标
    pub fn corners(&self) -> [Vec3; 4] {
        let nf = self.image_size[0] as f64;
        let ns = self.image_size[1] as f64;
        [
            self.pixel_to_lab(0.0, 0.0),
            self.pixel_to_lab(nf, 0.0),
            self.pixel_to_lab(0.0, ns),
            self.pixel_to_lab(nf, ns),
        ]
    }

    /// 入射束在面板平面上的交点，返回相对面板原点的 (fast, slow) 毫米坐标
    pub fn beam_centre_mm(&self, s0: Vec3) -> Result<(f64, f64)> {
        // origin + x*f + y*s = t*s0
        let m = linalg::from_columns(self.fast_axis, self.slow_axis, linalg::scale(s0, -1.0));
        let inv = linalg::inverse(&m).ok_or_else(|| {
            PanelsimError::InvalidDetector(format!(
                "Beam is parallel to panel '{}'",
                self.name
            ))
        })?;
        let sol = linalg::mat_vec(&inv, linalg::scale(self.origin, -1.0));

        if sol[2] <= 0.0 {
            return Err(PanelsimError::InvalidDetector(format!(
                "Beam does not intersect panel '{}'",
                self.name
            )));
        }

        Ok((sol[0], sol[1]))
    }

    /// 面板四角处可达到的最高分辨率 d (Å)
    pub fn max_resolution_at_corners(&self, s0: Vec3) -> f64 {
        let wavelength = 1.0 / linalg::norm(s0);

        self.corners()
            .iter()
            .map(|corner| {
                let two_theta = linalg::angle(s0, *corner);
                let sin_theta = (two_theta / 2.0).sin();
                if sin_theta <= 0.0 {
                    f64::INFINITY
                } else {
                    wavelength / (2.0 * sin_theta)
                }
            })
            .fold(f64::INFINITY, f64::min)
    }

    /// 像素总数
    pub fn num_pixels(&self) -> usize {
        self.image_size[0] * self.image_size[1]
    }
}

/// 多面板探测器
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(into = "DetectorDict", try_from = "DetectorDict")]
pub struct Detector {
    panels: Vec<Panel>,
}

impl Detector {
    pub fn new() -> Self {
        Detector { panels: Vec::new() }
    }

    pub fn from_panels(panels: Vec<Panel>) -> Self {
        Detector { panels }
    }

    pub fn add_panel(&mut self, panel: Panel) {
        self.panels.push(panel);
    }

    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    pub fn panel(&self, idx: usize) -> Option<&Panel> {
        self.panels.get(idx)
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Panel> {
        self.panels.iter()
    }

    /// 所有面板共享的 (fast, slow) 尺寸
    pub fn uniform_image_size(&self) -> Result<[usize; 2]> {
        let first = self
            .panels
            .first()
            .ok_or_else(|| PanelsimError::InvalidDetector("Detector has no panels".to_string()))?
            .image_size;

        if let Some(p) = self.panels.iter().find(|p| p.image_size != first) {
            return Err(PanelsimError::InvalidDetector(format!(
                "Panel '{}' has size {:?}, expected {:?}",
                p.name, p.image_size, first
            )));
        }

        Ok(first)
    }

    /// 所有面板中最高的角分辨率
    pub fn max_resolution_at_corners(&self, s0: Vec3) -> f64 {
        self.panels
            .iter()
            .map(|p| p.max_resolution_at_corners(s0))
            .fold(f64::INFINITY, f64::min)
    }
}

impl<'a> IntoIterator for &'a Detector {
    type Item = &'a Panel;
    type IntoIter = std::slice::Iter<'a, Panel>;

    fn into_iter(self) -> Self::IntoIter {
        self.panels.iter()
    }
}

// ─────────────────────────────────────────────────────────────
// dxtbx 字典格式
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DetectorDict {
    panels: Vec<Panel>,
    #[serde(default)]
    hierarchy: Option<HierarchyNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum HierarchyChild {
    Panel { panel: usize },
    Group(Box<HierarchyNode>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HierarchyNode {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    node_type: String,
    #[serde(default = "x_axis")]
    fast_axis: Vec3,
    #[serde(default = "y_axis")]
    slow_axis: Vec3,
    #[serde(default)]
    origin: Vec3,
    #[serde(default)]
    raw_image_offset: [i64; 2],
    #[serde(default)]
    image_size: [usize; 2],
    #[serde(default)]
    pixel_size: [f64; 2],
    #[serde(default)]
    trusted_range: [f64; 2],
    #[serde(default)]
    thickness: f64,
    #[serde(default)]
    material: String,
    #[serde(default)]
    mu: f64,
    #[serde(default)]
    identifier: String,
    #[serde(default)]
    mask: Vec<[i64; 4]>,
    #[serde(default = "default_gain")]
    gain: f64,
    #[serde(default)]
    pedestal: f64,
    #[serde(default)]
    px_mm_strategy: PxMmStrategy,
    #[serde(default)]
    children: Vec<HierarchyChild>,
}

fn x_axis() -> Vec3 {
    [1.0, 0.0, 0.0]
}

fn y_axis() -> Vec3 {
    [0.0, 1.0, 0.0]
}

impl HierarchyNode {
    fn flat_root(n_panels: usize) -> Self {
        HierarchyNode {
            name: String::new(),
            node_type: String::new(),
            fast_axis: x_axis(),
            slow_axis: y_axis(),
            origin: [0.0; 3],
            raw_image_offset: [0, 0],
            image_size: [0, 0],
            pixel_size: [0.0, 0.0],
            trusted_range: [0.0, 0.0],
            thickness: 0.0,
            material: String::new(),
            mu: 0.0,
            identifier: String::new(),
            mask: Vec::new(),
            gain: 1.0,
            pedestal: 0.0,
            px_mm_strategy: PxMmStrategy::default(),
            children: (0..n_panels)
                .map(|panel| HierarchyChild::Panel { panel })
                .collect(),
        }
    }

    fn panel_indices(&self, out: &mut Vec<usize>) {
        for child in &self.children {
            match child {
                HierarchyChild::Panel { panel } => out.push(*panel),
                HierarchyChild::Group(node) => node.panel_indices(out),
            }
        }
    }
}

impl From<Detector> for DetectorDict {
    fn from(det: Detector) -> Self {
        let hierarchy = HierarchyNode::flat_root(det.panels.len());
        DetectorDict {
            panels: det.panels,
            hierarchy: Some(hierarchy),
        }
    }
}

impl TryFrom<DetectorDict> for Detector {
    type Error = String;

    fn try_from(dict: DetectorDict) -> std::result::Result<Self, Self::Error> {
        if let Some(ref root) = dict.hierarchy {
            let mut indices = Vec::new();
            root.panel_indices(&mut indices);
            if let Some(bad) = indices.iter().find(|&&i| i >= dict.panels.len()) {
                return Err(format!(
                    "hierarchy references panel {} but only {} panels exist",
                    bad,
                    dict.panels.len()
                ));
            }
        }
        Ok(Detector {
            panels: dict.panels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_panel() -> Panel {
        Panel::new(
            "p0",
            [1.0, 0.0, 0.0],
            [0.0, -1.0, 0.0],
            [-50.0, 50.0, -100.0],
            0.1,
            [1000, 1000],
        )
    }

    #[test]
    fn test_pixel_to_lab() {
        let p = test_panel();
        let lab = p.pixel_to_lab(500.0, 500.0);
        assert!((lab[0] - 0.0).abs() < 1e-9);
        assert!((lab[1] - 0.0).abs() < 1e-9);
        assert!((lab[2] + 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_beam_centre_on_axis() {
        let p = test_panel();
        let s0 = [0.0, 0.0, -1.0 / 1.3];
        let (x, y) = p.beam_centre_mm(s0).unwrap();
        assert!((x - 50.0).abs() < 1e-9);
        assert!((y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_beam_centre_behind_panel() {
        let p = test_panel();
        let s0 = [0.0, 0.0, 1.0 / 1.3];
        assert!(p.beam_centre_mm(s0).is_err());
    }

    #[test]
    fn test_max_resolution_at_corners() {
        let p = test_panel();
        let wavelength = 1.3;
        let s0 = [0.0, 0.0, -1.0 / wavelength];
        let d = p.max_resolution_at_corners(s0);

        // 角点距束心 50*sqrt(2) mm，距样品 100 mm
        let two_theta = (50.0_f64 * 2.0_f64.sqrt() / 100.0).atan();
        let expected = wavelength / (2.0 * (two_theta / 2.0).sin());
        assert!((d - expected).abs() < 1e-9);
    }

    #[test]
    fn test_uniform_image_size() {
        let mut det = Detector::new();
        det.add_panel(test_panel());
        det.add_panel(test_panel());
        assert_eq!(det.uniform_image_size().unwrap(), [1000, 1000]);

        let mut odd = test_panel();
        odd.image_size = [10, 10];
        det.add_panel(odd);
        assert!(det.uniform_image_size().is_err());
    }

    #[test]
    fn test_dxtbx_dict_layout() {
        let det = Detector::from_panels(vec![test_panel(), test_panel()]);
        let value = serde_json::to_value(&det).unwrap();

        assert_eq!(value["panels"].as_array().unwrap().len(), 2);
        assert_eq!(value["panels"][0]["type"], "SENSOR_PAD");
        assert_eq!(
            value["panels"][0]["px_mm_strategy"]["type"],
            "SimplePxMmStrategy"
        );
        assert_eq!(value["hierarchy"]["children"][1]["panel"], 1);

        let back: Detector = serde_json::from_value(value).unwrap();
        assert_eq!(back, det);
    }

    #[test]
    fn test_rejects_dangling_hierarchy() {
        let json = serde_json::json!({
            "panels": [],
            "hierarchy": {"children": [{"panel": 3}]}
        });
        assert!(serde_json::from_value::<Detector>(json).is_err());
    }
}
