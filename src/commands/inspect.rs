//! # inspect 命令实现
//!
//! 打印 .expt 或模拟输出 .h5 中的探测器与光束模型。
//!
//! ## 依赖关系
//! - 使用 `cli/inspect.rs` 定义的参数
//! - 使用 `models/experiment.rs`, `io/writer.rs`
//! - 使用 `tabled` 打印表格

use crate::cli::inspect::InspectArgs;
use crate::error::{PanelsimError, Result};
use crate::io::GeomImageReader;
use crate::models::linalg::Vec3;
use crate::models::{Beam, Detector, ExperimentList};
use crate::sim::pipeline::GAP_VALUE;
use crate::utils::output;

use ndarray::Array3;
use tabled::{Table, Tabled};

#[derive(Debug, Clone, Tabled)]
struct PanelRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Size (f x s)")]
    size: String,
    #[tabled(rename = "Pixel (mm)")]
    pixel: String,
    #[tabled(rename = "Origin (mm)")]
    origin: String,
    #[tabled(rename = "Fast")]
    fast: String,
    #[tabled(rename = "Slow")]
    slow: String,
}

#[derive(Debug, Clone, Tabled)]
struct ImageRow {
    #[tabled(rename = "Image")]
    index: usize,
    #[tabled(rename = "Min")]
    min: String,
    #[tabled(rename = "Max")]
    max: String,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "Gap pixels")]
    gaps: usize,
}

fn image_row(index: usize, image: &Array3<f64>) -> ImageRow {
    let min = image.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = image.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    ImageRow {
        index,
        min: format!("{:.2}", min),
        max: format!("{:.2}", max),
        mean: format!("{:.3}", image.mean().unwrap_or(0.0)),
        gaps: image.iter().filter(|&&v| v == GAP_VALUE).count(),
    }
}

fn fmt_vec(v: Vec3) -> String {
    format!("({:.3}, {:.3}, {:.3})", v[0], v[1], v[2])
}

fn panel_rows(detector: &Detector) -> Vec<PanelRow> {
    detector
        .iter()
        .enumerate()
        .map(|(index, p)| PanelRow {
            index,
            name: p.name.clone(),
            size: format!("{} x {}", p.image_size[0], p.image_size[1]),
            pixel: format!("{:.4}", p.pixel_size[0]),
            origin: fmt_vec(p.origin),
            fast: fmt_vec(p.fast_axis),
            slow: fmt_vec(p.slow_axis),
        })
        .collect()
}

/// 执行 inspect 命令
pub fn execute(args: InspectArgs) -> Result<()> {
    if !args.input.exists() {
        return Err(PanelsimError::FileNotFound {
            path: args.input.display().to_string(),
        });
    }

    let ext = args
        .input
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("h5") | Some("hdf5") => inspect_images(&args),
        _ => inspect_expt(&args),
    }
}

fn inspect_expt(args: &InspectArgs) -> Result<()> {
    output::print_header(&format!("Experiment list: {}", args.input.display()));

    let list = ExperimentList::from_file(&args.input)?;
    let detector = list.detector_for(args.experiment)?;
    output::print_field("Experiments", &list.experiment.len().to_string());
    print_detector(detector);

    match list.beam_for(args.experiment) {
        Some(beam) => print_beam(beam, Some(detector)),
        None => output::print_info("No beam model stored"),
    }
    Ok(())
}

fn inspect_images(args: &InspectArgs) -> Result<()> {
    output::print_header(&format!("Simulated images: {}", args.input.display()));

    let reader = GeomImageReader::open(&args.input)?;
    output::print_field("Images", &reader.num_images().to_string());
    output::print_field(
        "Image shape",
        &format!("{:?} (panels, slow, fast)", reader.image_shape()),
    );

    let detector = reader.detector()?;
    print_detector(&detector);
    print_beam(&reader.beam()?, Some(&detector));

    let rows = (0..reader.num_images())
        .map(|i| reader.read_image(i).map(|img| image_row(i, &img)))
        .collect::<Result<Vec<_>>>()?;
    if !rows.is_empty() {
        println!("\n{}\n", Table::new(rows));
    }
    Ok(())
}

fn print_detector(detector: &Detector) {
    output::print_field("Panels", &detector.len().to_string());
    println!("\n{}\n", Table::new(panel_rows(detector)));
}

fn print_beam(beam: &Beam, detector: Option<&Detector>) {
    output::print_field("Wavelength (A)", &format!("{:.4}", beam.wavelength));
    output::print_field("Direction", &fmt_vec(beam.direction));
    output::print_field("Flux", &format!("{:.3e}", beam.flux));
    output::print_field(
        "Polarization",
        &format!(
            "{} (fraction {:.3})",
            fmt_vec(beam.polarization_normal),
            beam.polarization_fraction
        ),
    );
    if let Some(det) = detector {
        output::print_field(
            "Corner resolution (A)",
            &format!("{:.3}", det.max_resolution_at_corners(beam.s0())),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Panel;
    use std::path::PathBuf;

    #[test]
    fn test_panel_rows() {
        let det = Detector::from_panels(vec![Panel::new(
            "p0",
            [1.0, 0.0, 0.0],
            [0.0, -1.0, 0.0],
            [-1.5, 2.0, -250.0],
            0.075,
            [1030, 514],
        )]);
        let rows = panel_rows(&det);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].size, "1030 x 514");
        assert_eq!(rows[0].origin, "(-1.500, 2.000, -250.000)");
    }

    #[test]
    fn test_image_row() {
        let mut img = Array3::<f64>::from_elem((1, 2, 2), 2.0);
        img[[0, 0, 0]] = GAP_VALUE;
        let row = image_row(3, &img);
        assert_eq!(row.index, 3);
        assert_eq!(row.min, "-1.00");
        assert_eq!(row.max, "2.00");
        assert_eq!(row.mean, "1.250");
        assert_eq!(row.gaps, 1);
    }

    #[test]
    fn test_inspect_expt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("det.expt");
        let det = Detector::from_panels(vec![Panel::new(
            "p0",
            [1.0, 0.0, 0.0],
            [0.0, -1.0, 0.0],
            [-1.5, 2.0, -250.0],
            0.075,
            [40, 30],
        )]);
        ExperimentList::from_detector(det, Some(Beam::new([0.0, 0.0, 1.0], 1.3)))
            .to_file(&path)
            .unwrap();

        execute(InspectArgs {
            input: path,
            experiment: 0,
        })
        .unwrap();
        assert!(execute(InspectArgs {
            input: PathBuf::from("/nonexistent.expt"),
            experiment: 0,
        })
        .is_err());
    }
}
