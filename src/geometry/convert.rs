//! # CrystFEL → dxtbx 几何转换
//!
//! 将 CrystFEL 面板描述逐字段转换为 dxtbx 面板。
//!
//! ## 换算
//! - 像素尺寸 (mm) = 1000 / res
//! - 探测器距离 (mm) = 1000 · (clen + coffset)，可被覆盖
//! - 原点 = (corner_x · px, corner_y · px, -distance)；两种约定都以
//!   内存中第一个像素的外角为面板原点
//! - 图像尺寸 = (max_fs - min_fs + 1, max_ss - min_ss + 1)
//!
//! ## 依赖关系
//! - 被 `commands/convert.rs`, `commands/simulate.rs` 调用
//! - 使用 `parsers/geom.rs`, `models/`

use crate::error::{PanelsimError, Result};
use crate::models::experiment::ExperimentList;
use crate::models::linalg;
use crate::models::{Detector, Panel};
use crate::parsers::geom::{self, Clen, GeomFile, GeomPanel};

use std::path::Path;

/// 由已解析的几何文件构建探测器
pub fn crystfel_to_detector(geom: &GeomFile, detdist_override_mm: Option<f64>) -> Result<Detector> {
    if geom.panels.is_empty() {
        return Err(PanelsimError::InvalidDetector(
            "Geometry file defines no panels".to_string(),
        ));
    }

    for (group, members) in &geom.rigid_groups {
        for m in members.iter().filter(|m| geom.panel(m).is_none()) {
            log::warn!("Rigid group '{}' refers to unknown panel '{}'", group, m);
        }
    }
    log::debug!(
        "{} bad regions, {} rigid groups, {} rigid group collections",
        geom.bad_regions.len(),
        geom.rigid_groups.len(),
        geom.rigid_group_collections.len()
    );

    let panels = geom
        .panels
        .iter()
        .map(|p| convert_panel(p, detdist_override_mm))
        .collect::<Result<Vec<_>>>()?;

    Ok(Detector::from_panels(panels))
}

fn convert_panel(p: &GeomPanel, detdist_override_mm: Option<f64>) -> Result<Panel> {
    let fail = |reason: String| PanelsimError::ConversionError {
        panel: p.name.clone(),
        reason,
    };
    if !p.extras.is_empty() {
        log::debug!(
            "Panel '{}' ignores keys: {}",
            p.name,
            p.extras.keys().cloned().collect::<Vec<_>>().join(", ")
        );
    }

    let res = p.res.ok_or_else(|| fail("missing 'res'".to_string()))?;
    if res <= 0.0 {
        return Err(fail(format!("'res' must be positive, got {}", res)));
    }
    let pixel_size_mm = 1000.0 / res;

    let distance_mm = match (detdist_override_mm, &p.clen) {
        (Some(d), _) => d,
        (None, Some(Clen::Meters(clen))) => (clen + p.coffset) * 1000.0,
        (None, Some(Clen::Path(path))) => {
            return Err(fail(format!(
                "clen refers to '{}'; pass a detector distance override",
                path
            )))
        }
        (None, None) => return Err(fail("missing 'clen'".to_string())),
    };

    let (min_fs, max_fs, min_ss, max_ss) = match (p.min_fs, p.max_fs, p.min_ss, p.max_ss) {
        (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
        _ => return Err(fail("missing min_fs/max_fs/min_ss/max_ss".to_string())),
    };
    if max_fs < min_fs || max_ss < min_ss {
        return Err(fail("pixel range is empty".to_string()));
    }
    let image_size = [(max_fs - min_fs + 1) as usize, (max_ss - min_ss + 1) as usize];

    let fast = linalg::normalize(p.fs);
    let slow = linalg::normalize(p.ss);
    if linalg::norm(linalg::cross(fast, slow)) < 1e-6 {
        return Err(fail("fs and ss directions are parallel".to_string()));
    }

    let origin = [
        p.corner_x * pixel_size_mm,
        p.corner_y * pixel_size_mm,
        -distance_mm,
    ];

    Ok(Panel::new(
        p.name.clone(),
        fast,
        slow,
        origin,
        pixel_size_mm,
        image_size,
    ))
}

/// 读取 .geom 文件并写出只含探测器的 .expt 文件
pub fn convert_crystfel_to_dxtbx(
    geom_path: &Path,
    output_path: &Path,
    detdist_override_mm: Option<f64>,
) -> Result<Detector> {
    let parsed = geom::parse_geom_file(geom_path)?;
    let detector = crystfel_to_detector(&parsed, detdist_override_mm)?;

    ExperimentList::from_detector(detector.clone(), None).to_file(output_path)?;
    log::debug!(
        "Wrote {} panels from '{}' to '{}'",
        detector.len(),
        geom_path.display(),
        output_path.display()
    );

    Ok(detector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::experiment::load_detector_from_expt;
    use crate::parsers::geom::parse_geom_content;

    const GEOM: &str = r#"
clen = 0.120
coffset = 0.005
res = 13333.3333
a/min_fs = 0
a/max_fs = 1029
a/min_ss = 0
a/max_ss = 513
a/corner_x = -100
a/corner_y = 50
a/fs = x
a/ss = -y
b/min_fs = 0
b/max_fs = 1029
b/min_ss = 514
b/max_ss = 1027
b/corner_x = 20
b/corner_y = -40
b/fs = -y
b/ss = -x
"#;

    #[test]
    fn test_field_conversion() {
        let geom = parse_geom_content(GEOM, "t.geom").unwrap();
        let det = crystfel_to_detector(&geom, None).unwrap();
        assert_eq!(det.len(), 2);

        let a = det.panel(0).unwrap();
        assert_eq!(a.name, "a");
        assert_eq!(a.image_size, [1030, 514]);
        assert!((a.pixel_size[0] - 0.075).abs() < 1e-9);
        assert!((a.origin[0] + 7.5).abs() < 1e-6);
        assert!((a.origin[1] - 3.75).abs() < 1e-6);
        assert!((a.origin[2] + 125.0).abs() < 1e-9);
        assert_eq!(a.slow_axis, [0.0, -1.0, 0.0]);
        assert_eq!(a.material, "Si");
        assert_eq!(a.trusted_range, [-1.0, 1e6]);
    }

    #[test]
    fn test_distance_override() {
        let geom = parse_geom_content(GEOM, "t.geom").unwrap();
        let det = crystfel_to_detector(&geom, Some(250.0)).unwrap();
        assert!(det.iter().all(|p| (p.origin[2] + 250.0).abs() < 1e-12));
    }

    #[test]
    fn test_missing_res_names_panel() {
        let geom = parse_geom_content(
            "clen = 0.1\nq/min_fs = 0\nq/max_fs = 1\nq/min_ss = 0\nq/max_ss = 1\n",
            "t",
        )
        .unwrap();
        match crystfel_to_detector(&geom, None) {
            Err(PanelsimError::ConversionError { panel, .. }) => assert_eq!(panel, "q"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_path_clen_requires_override() {
        let content = GEOM.replace("clen = 0.120", "clen = /detector/clen");
        let geom = parse_geom_content(&content, "t").unwrap();
        assert!(crystfel_to_detector(&geom, None).is_err());
        assert!(crystfel_to_detector(&geom, Some(200.0)).is_ok());
    }

    #[test]
    fn test_convert_writes_expt() {
        let dir = tempfile::tempdir().unwrap();
        let geom_path = dir.path().join("det.geom");
        let expt_path = dir.path().join("det.expt");
        std::fs::write(&geom_path, GEOM).unwrap();

        let det = convert_crystfel_to_dxtbx(&geom_path, &expt_path, Some(250.0)).unwrap();
        let loaded = load_detector_from_expt(&expt_path, 0).unwrap();
        assert_eq!(loaded, det);
    }
}
