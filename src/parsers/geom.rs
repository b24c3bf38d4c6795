//! # CrystFEL .geom 格式解析器
//!
//! 解析 CrystFEL 探测器几何描述文件。
//!
//! ## .geom 格式说明
//! ```text
//! ; 注释
//! clen = 0.250            ; 全局默认值，作用于其后首次出现的面板
//! res = 13333.3
//! p0a0/min_fs = 0
//! p0a0/max_fs = 193
//! p0a0/fs = +0.0044x -0.9999y
//! p0a0/corner_x = 443.4
//! bad_gap/min_x = -10
//! rigid_group_q0 = p0a0,p0a1
//! rigid_group_collection_quadrants = q0,q1
//! ```
//!
//! ## 依赖关系
//! - 被 `geometry/convert.rs` 使用
//! - 使用 `regex` 解析方向表达式

use crate::error::{PanelsimError, Result};
use crate::models::linalg::Vec3;

use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

static DIRECTION_TERM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([+-]?(?:[0-9]+\.?[0-9]*|\.[0-9]+)?(?:[eE][+-]?[0-9]+)?)([xyz])").unwrap()
});

/// 探测器距离：数值（米）或 HDF5 路径
#[derive(Debug, Clone, PartialEq)]
pub enum Clen {
    Meters(f64),
    Path(String),
}

/// 单个面板的几何属性
#[derive(Debug, Clone, PartialEq)]
pub struct GeomPanel {
    pub name: String,
    pub min_fs: Option<i64>,
    pub max_fs: Option<i64>,
    pub min_ss: Option<i64>,
    pub max_ss: Option<i64>,
    /// 第一个像素外角位置（像素单位）
    pub corner_x: f64,
    pub corner_y: f64,
    pub fs: Vec3,
    pub ss: Vec3,
    /// 每米像素数
    pub res: Option<f64>,
    pub clen: Option<Clen>,
    /// 相对 clen 的附加偏移（米）
    pub coffset: f64,
    pub data: Option<String>,
    pub mask: Option<String>,
    pub adu_per_ev: Option<f64>,
    pub adu_per_photon: Option<f64>,
    pub max_adu: Option<f64>,
    pub photon_energy: Option<String>,
    pub no_index: bool,
    /// 未识别的键值
    pub extras: BTreeMap<String, String>,
}

impl GeomPanel {
    fn with_defaults(name: &str, defaults: &GeomPanel) -> Self {
        GeomPanel {
            name: name.to_string(),
            ..defaults.clone()
        }
    }
}

impl Default for GeomPanel {
    fn default() -> Self {
        GeomPanel {
            name: String::new(),
            min_fs: None,
            max_fs: None,
            min_ss: None,
            max_ss: None,
            corner_x: 0.0,
            corner_y: 0.0,
            fs: [1.0, 0.0, 0.0],
            ss: [0.0, 1.0, 0.0],
            res: None,
            clen: None,
            coffset: 0.0,
            data: None,
            mask: None,
            adu_per_ev: None,
            adu_per_photon: None,
            max_adu: None,
            photon_energy: None,
            no_index: false,
            extras: BTreeMap::new(),
        }
    }
}

/// 坏像素区域
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BadRegion {
    pub name: String,
    pub properties: BTreeMap<String, String>,
}

/// 解析后的几何文件
#[derive(Debug, Clone, Default)]
pub struct GeomFile {
    /// 按首次出现顺序排列
    pub panels: Vec<GeomPanel>,
    pub bad_regions: Vec<BadRegion>,
    pub rigid_groups: BTreeMap<String, Vec<String>>,
    pub rigid_group_collections: BTreeMap<String, Vec<String>>,
}

impl GeomFile {
    pub fn panel(&self, name: &str) -> Option<&GeomPanel> {
        self.panels.iter().find(|p| p.name == name)
    }
}

/// 解析 .geom 文件
pub fn parse_geom_file(path: &Path) -> Result<GeomFile> {
    let content = fs::read_to_string(path).map_err(|e| PanelsimError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_geom_content(&content, &path.display().to_string())
}

/// 从字符串内容解析 .geom 格式
pub fn parse_geom_content(content: &str, source_name: &str) -> Result<GeomFile> {
    let mut geom = GeomFile::default();
    let mut defaults = GeomPanel::default();

    let err = |line: usize, reason: String| PanelsimError::ParseError {
        format: "geom".to_string(),
        path: source_name.to_string(),
        line,
        reason,
    };

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.split(';').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .map(|(k, v)| (k.trim(), v.trim()))
            .ok_or_else(|| err(line_no, format!("Expected 'key = value', got '{}'", line)))?;

        if key.is_empty() {
            return Err(err(line_no, "Empty key".to_string()));
        }

        if let Some(group) = key.strip_prefix("rigid_group_collection_") {
            geom.rigid_group_collections
                .insert(group.to_string(), split_list(value));
            continue;
        }
        if let Some(group) = key.strip_prefix("rigid_group_") {
            geom.rigid_groups.insert(group.to_string(), split_list(value));
            continue;
        }

        match key.split_once('/') {
            Some((owner, prop)) if owner.starts_with("bad_") => {
                let name = &owner["bad_".len()..];
                let pos = match geom.bad_regions.iter().position(|r| r.name == name) {
                    Some(pos) => pos,
                    None => {
                        geom.bad_regions.push(BadRegion {
                            name: name.to_string(),
                            properties: BTreeMap::new(),
                        });
                        geom.bad_regions.len() - 1
                    }
                };
                geom.bad_regions[pos]
                    .properties
                    .insert(prop.trim().to_string(), value.to_string());
            }
            Some((owner, prop)) => {
                let pos = match geom.panels.iter().position(|p| p.name == owner) {
                    Some(pos) => pos,
                    None => {
                        geom.panels.push(GeomPanel::with_defaults(owner, &defaults));
                        geom.panels.len() - 1
                    }
                };
                set_property(&mut geom.panels[pos], prop.trim(), value)
                    .map_err(|reason| err(line_no, reason))?;
            }
            None => {
                set_property(&mut defaults, key, value).map_err(|reason| err(line_no, reason))?;
            }
        }
    }

    Ok(geom)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn set_property(panel: &mut GeomPanel, key: &str, value: &str) -> std::result::Result<(), String> {
    match key {
        "min_fs" => panel.min_fs = Some(parse_int(key, value)?),
        "max_fs" => panel.max_fs = Some(parse_int(key, value)?),
        "min_ss" => panel.min_ss = Some(parse_int(key, value)?),
        "max_ss" => panel.max_ss = Some(parse_int(key, value)?),
        "corner_x" => panel.corner_x = parse_float(key, value)?,
        "corner_y" => panel.corner_y = parse_float(key, value)?,
        "fs" => panel.fs = parse_direction(value)?,
        "ss" => panel.ss = parse_direction(value)?,
        "res" => panel.res = Some(parse_float(key, value)?),
        "clen" => {
            panel.clen = Some(match value.parse::<f64>() {
                Ok(v) => Clen::Meters(v),
                Err(_) => Clen::Path(value.to_string()),
            })
        }
        "coffset" => panel.coffset = parse_float(key, value)?,
        "data" => panel.data = Some(value.to_string()),
        "mask" => panel.mask = Some(value.to_string()),
        "adu_per_eV" => panel.adu_per_ev = Some(parse_float(key, value)?),
        "adu_per_photon" => panel.adu_per_photon = Some(parse_float(key, value)?),
        "max_adu" => panel.max_adu = Some(parse_float(key, value)?),
        "photon_energy" => panel.photon_energy = Some(value.to_string()),
        "no_index" => panel.no_index = parse_bool(value),
        _ => {
            panel.extras.insert(key.to_string(), value.to_string());
        }
    }
    Ok(())
}

fn parse_int(key: &str, value: &str) -> std::result::Result<i64, String> {
    value
        .parse::<i64>()
        .or_else(|_| {
            // 某些文件写成 "193.0"
            value
                .parse::<f64>()
                .ok()
                .filter(|v| v.fract() == 0.0)
                .map(|v| v as i64)
                .ok_or(())
        })
        .map_err(|_| format!("Invalid integer for '{}': '{}'", key, value))
}

fn parse_float(key: &str, value: &str) -> std::result::Result<f64, String> {
    value
        .parse::<f64>()
        .map_err(|_| format!("Invalid number for '{}': '{}'", key, value))
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes")
}

/// 解析方向表达式，如 "+0.0044x -0.9999y" 或 "-y"
pub fn parse_direction(value: &str) -> std::result::Result<Vec3, String> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err("Empty direction".to_string());
    }

    let mut dir = [0.0; 3];
    let mut consumed = 0;

    for cap in DIRECTION_TERM.captures_iter(&compact) {
        let Some(whole) = cap.get(0) else {
            continue;
        };
        if whole.start() != consumed {
            return Err(format!("Invalid direction '{}'", value));
        }
        consumed = whole.end();

        let coeff = match &cap[1] {
            "" | "+" => 1.0,
            "-" => -1.0,
            s => s
                .parse::<f64>()
                .map_err(|_| format!("Invalid coefficient '{}' in '{}'", s, value))?,
        };
        let axis = match &cap[2] {
            "x" => 0,
            "y" => 1,
            _ => 2,
        };
        dir[axis] += coeff;
    }

    if consumed != compact.len() {
        return Err(format!("Invalid direction '{}'", value));
    }

    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
; Jungfrau-like test geometry
clen = 0.120
coffset = 0.0
res = 13333.3
adu_per_eV = 0.00105
photon_energy = /entry/instrument/photon_energy

p0/min_fs = 0
p0/max_fs = 1029
p0/min_ss = 0
p0/max_ss = 513
p0/corner_x = -1048.5
p0/corner_y = 530.2
p0/fs = +0.9999x +0.0044y
p0/ss = -0.0044x +0.9999y

clen = 0.200

p1/min_fs = 0
p1/max_fs = 1029
p1/min_ss = 514
p1/max_ss = 1027
p1/corner_x = 10.0
p1/corner_y = -20.0
p1/fs = x
p1/ss = -y
p1/coffset = 0.001
p1/custom_key = 7

bad_beamstop/min_x = -10
bad_beamstop/max_x = 10
rigid_group_m0 = p0
rigid_group_m1 = p1
rigid_group_collection_modules = m0,m1
"#;

    #[test]
    fn test_parse_panels_in_order() {
        let geom = parse_geom_content(SAMPLE, "test.geom").unwrap();
        assert_eq!(geom.panels.len(), 2);
        assert_eq!(geom.panels[0].name, "p0");
        assert_eq!(geom.panels[1].name, "p1");

        let p0 = &geom.panels[0];
        assert_eq!(p0.max_fs, Some(1029));
        assert!((p0.corner_x + 1048.5).abs() < 1e-12);
        assert!((p0.fs[0] - 0.9999).abs() < 1e-12);
        assert!((p0.fs[1] - 0.0044).abs() < 1e-12);
        assert_eq!(p0.res, Some(13333.3));
    }

    #[test]
    fn test_defaults_apply_to_later_panels_only() {
        let geom = parse_geom_content(SAMPLE, "test.geom").unwrap();
        assert_eq!(geom.panels[0].clen, Some(Clen::Meters(0.120)));
        assert_eq!(geom.panels[1].clen, Some(Clen::Meters(0.200)));
        assert!((geom.panels[1].coffset - 0.001).abs() < 1e-15);
        assert_eq!(
            geom.panels[1].extras.get("custom_key").map(String::as_str),
            Some("7")
        );
        assert_eq!(
            geom.panels[0].photon_energy.as_deref(),
            Some("/entry/instrument/photon_energy")
        );
    }

    #[test]
    fn test_bad_regions_and_rigid_groups() {
        let geom = parse_geom_content(SAMPLE, "test.geom").unwrap();
        assert_eq!(geom.bad_regions.len(), 1);
        assert_eq!(geom.bad_regions[0].name, "beamstop");
        assert_eq!(geom.bad_regions[0].properties.len(), 2);
        assert_eq!(geom.rigid_groups["m1"], vec!["p1".to_string()]);
        assert_eq!(geom.rigid_group_collections["modules"].len(), 2);
    }

    #[test]
    fn test_clen_as_hdf5_path() {
        let geom = parse_geom_content("clen = /LCLS/detector_1/EncoderValue\nq/res = 1\n", "x").unwrap();
        assert_eq!(
            geom.panels[0].clen,
            Some(Clen::Path("/LCLS/detector_1/EncoderValue".to_string()))
        );
    }

    #[test]
    fn test_parse_direction_forms() {
        assert_eq!(parse_direction("x").unwrap(), [1.0, 0.0, 0.0]);
        assert_eq!(parse_direction("-y").unwrap(), [0.0, -1.0, 0.0]);
        assert_eq!(parse_direction("+0.5x - 0.5y").unwrap(), [0.5, -0.5, 0.0]);
        assert_eq!(parse_direction("1e-3z").unwrap(), [0.0, 0.0, 1e-3]);
        assert!(parse_direction("0.5q").is_err());
        assert!(parse_direction("").is_err());
    }

    #[test]
    fn test_reports_line_number() {
        let err = parse_geom_content("res = 1\np0/min_fs = abc\n", "bad.geom").unwrap_err();
        match err {
            PanelsimError::ParseError { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
