//! # simulate 命令实现
//!
//! ## 流程
//! 1. 读取 TOML 配置（缺省用示例场景），应用命令行覆盖
//! 2. 按型号构建探测器：
//!    - jungfrau：.geom 转换为同名 .expt 后读回
//!    - eiger：按缝隙掩膜拆分面板
//!    - eigermono：单片面板，缝隙像素写为 -1
//! 3. 构建光束、晶体、能谱，读取并截断结构因子
//! 4. 逐图像模拟，写入 HDF5
//!
//! ## 依赖关系
//! - 使用 `cli/simulate.rs` 定义的参数
//! - 使用 `config.rs`, `geometry/`, `io/`, `sim/`, `parsers/hkl.rs`

use crate::cli::simulate::{DetectorModel, SimulateArgs};
use crate::config::SimulationConfig;
use crate::error::Result;
use crate::geometry::{convert_crystfel_to_dxtbx, get_multi_panel_eiger, EigerOptions};
use crate::io::{read_gap_mask, GeomImageWriter};
use crate::models::experiment::load_detector_from_expt;
use crate::models::{Crystal, Detector};
use crate::parsers::hkl::{parse_hkl_file, StructureFactors};
use crate::sim::{run_simulation, NanoBraggEngine, SimulationJob};
use crate::utils::{output, progress};

use ndarray::Array2;

/// Jungfrau 16M 的默认探测器距离 (mm)
pub const JUNGFRAU_DETDIST_MM: f64 = 250.0;

/// 执行 simulate 命令
pub fn execute(args: SimulateArgs) -> Result<()> {
    output::print_header(&format!("Simulating {} images", args.model));

    let config = effective_config(&args)?;
    if let Some(path) = &args.save_config {
        config.save(path)?;
        output::print_info(&format!("Saved config to {}", path.display()));
    }

    let (detector, gap_mask) = build_detector(&args)?;
    let [fast, slow] = detector.uniform_image_size()?;
    output::print_field("Model", &args.model.to_string());
    output::print_detector_summary(&detector);

    let mut beam = config.beam.beam();
    beam.flux = config.beam.total_flux;
    let spectrum = config.beam.spectrum()?;
    let crystal = config.crystal.crystal();
    let (a, b, c, alpha, beta, gamma) = crystal.lattice.parameters();
    output::print_field(
        "Unit cell",
        &format!(
            "{:.2} {:.2} {:.2} {:.2} {:.2} {:.2} ({})",
            a, b, c, alpha, beta, gamma, crystal.space_group
        ),
    );
    output::print_field("Wavelengths", &spectrum.len().to_string());

    let structure_factors = load_structure_factors(&args, &config, &detector, &crystal)?;
    if structure_factors.is_none() && config.spots.default_f == 0.0 {
        output::print_warning(
            "No --hkl given and default_f is 0: only background will be simulated",
        );
    }

    let engine = NanoBraggEngine::new(config.engine.clone());
    let use_gpu = args.cuda && engine.has_gpu();
    if args.cuda && !use_gpu {
        output::print_warning(
            "--cuda requested but no gpu_executable is configured; using the CPU build",
        );
    }

    let output_path = args.output_path();
    let mut writer = GeomImageWriter::create(
        &output_path,
        [detector.len(), slow, fast],
        config.num_images,
        &detector,
        &beam,
        config.output.clone(),
    )?;

    let job = SimulationJob {
        detector: &detector,
        beam: &beam,
        crystal: &crystal,
        structure_factors: structure_factors.as_ref(),
        spectrum: &spectrum,
        total_flux: config.beam.total_flux,
        spots: &config.spots,
        background: &config.background,
        num_images: config.num_images,
        rotation_seed: config.rotation_seed,
        gap_mask: gap_mask.as_ref(),
        use_gpu,
        jobs: args.jobs,
    };

    let pb = progress::create_progress_bar(config.num_images as u64, "Simulating");
    let summary = run_simulation(&engine, &job, |i_img, image| {
        writer.add_image(&image)?;
        pb.inc(1);
        log::info!("Wrote image {} to {}", i_img, output_path.display());
        Ok(())
    });
    pb.finish_and_clear();
    let summary = summary?;
    log::debug!("{} image(s) in {}", writer.images_written(), writer.path().display());
    writer.close()?;

    output::print_done(&format!(
        "Wrote {} image(s) x {} panel(s) to {} in {:.1} s",
        summary.images,
        summary.panels,
        output_path.display(),
        summary.elapsed.as_secs_f64()
    ));
    Ok(())
}

/// 配置文件与命令行覆盖合并后的配置
fn effective_config(args: &SimulateArgs) -> Result<SimulationConfig> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };

    if let Some(n) = args.num_images {
        config.num_images = n;
    }
    if let Some(seed) = args.seed {
        config.rotation_seed = seed;
    }
    if let Some(exe) = &args.engine {
        config.engine.executable = exe.clone();
    }
    config
        .spots
        .noise
        .readout_noise_adu
        .get_or_insert_with(|| args.model.default_readout_noise_adu());

    config.validate()?;
    Ok(config)
}

/// 按型号构建探测器；eigermono 额外返回缝隙掩膜
fn build_detector(args: &SimulateArgs) -> Result<(Detector, Option<Array2<bool>>)> {
    match args.model {
        DetectorModel::Jungfrau => {
            let expt = args.geom.with_extension("expt");
            let detdist = args.detdist.unwrap_or(JUNGFRAU_DETDIST_MM);
            convert_crystfel_to_dxtbx(&args.geom, &expt, Some(detdist))?;
            output::print_conversion(
                &args.geom.display().to_string(),
                &expt.display().to_string(),
            );
            Ok((load_detector_from_expt(&expt, 0)?, None))
        }
        DetectorModel::Eiger | DetectorModel::Eigermono => {
            let mask = read_gap_mask(&args.gaps, &args.gap_dataset)?;
            let single = args.model == DetectorModel::Eigermono;
            let mut opts = EigerOptions {
                as_single_panel: single,
                ..EigerOptions::default()
            };
            if let Some(d) = args.detdist {
                opts.detdist_mm = d;
            }
            let detector = get_multi_panel_eiger(&mask.view(), &opts)?;
            Ok((detector, if single { Some(mask) } else { None }))
        }
    }
}

/// 读取结构因子并截断到探测器角落的分辨率
fn load_structure_factors(
    args: &SimulateArgs,
    config: &SimulationConfig,
    detector: &Detector,
    crystal: &Crystal,
) -> Result<Option<StructureFactors>> {
    let Some(path) = &args.hkl else {
        return Ok(None);
    };

    let all = parse_hkl_file(path)?;
    let d_min = detector.max_resolution_at_corners(config.beam.beam().s0());
    let kept = all.truncate_to_resolution(d_min, crystal)?;
    output::print_info(&format!(
        "Kept {} of {} reflections to {:.2} A",
        kept.len(),
        all.len(),
        d_min
    ));
    Ok(Some(kept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn args(model: DetectorModel) -> SimulateArgs {
        SimulateArgs {
            model,
            cuda: false,
            geom: PathBuf::from("missing.geom"),
            detdist: None,
            gaps: PathBuf::from("missing.h5"),
            gap_dataset: "is_a_gap".to_string(),
            config: None,
            save_config: None,
            hkl: None,
            num_images: None,
            seed: None,
            output: None,
            engine: None,
            jobs: 1,
        }
    }

    #[test]
    fn test_readout_noise_follows_model() {
        let c = effective_config(&args(DetectorModel::Eiger)).unwrap();
        assert_eq!(c.spots.noise.readout_noise_adu, Some(0.0));
        let c = effective_config(&args(DetectorModel::Jungfrau)).unwrap();
        assert_eq!(c.spots.noise.readout_noise_adu, Some(3.0));
    }

    #[test]
    fn test_cli_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.toml");
        fs::write(
            &path,
            "num_images = 7\nrotation_seed = 1\n[engine]\nexecutable = \"nb\"\n",
        )
        .unwrap();

        let mut a = args(DetectorModel::Eiger);
        a.config = Some(path);
        a.num_images = Some(3);
        a.engine = Some("/opt/nanoBragg".to_string());
        let c = effective_config(&a).unwrap();
        assert_eq!(c.num_images, 3);
        assert_eq!(c.rotation_seed, 1);
        assert_eq!(c.engine.executable, "/opt/nanoBragg");
    }

    #[test]
    fn test_config_readout_noise_wins_over_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.toml");
        fs::write(&path, "[spots.noise]\nreadout_noise_adu = 5.0\n").unwrap();

        let mut a = args(DetectorModel::Eiger);
        a.config = Some(path);
        let c = effective_config(&a).unwrap();
        assert_eq!(c.spots.noise.readout_noise_adu, Some(5.0));
    }

    #[test]
    fn test_build_jungfrau_detector() {
        let dir = tempfile::tempdir().unwrap();
        let geom = dir.path().join("jf.geom");
        fs::write(
            &geom,
            "clen = 0.1\nres = 10000\np0/min_fs = 0\np0/max_fs = 9\np0/min_ss = 0\np0/max_ss = 4\np0/corner_x = -5\np0/corner_y = -5\np0/fs = x\np0/ss = y\n",
        )
        .unwrap();

        let mut a = args(DetectorModel::Jungfrau);
        a.geom = geom;
        let (det, mask) = build_detector(&a).unwrap();
        assert!(mask.is_none());
        assert!(dir.path().join("jf.expt").exists());
        assert_eq!(det.len(), 1);
        assert_eq!(det.panels()[0].image_size, [10, 5]);
        assert!((det.panels()[0].origin[2] + 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_build_detector_missing_mask() {
        assert!(build_detector(&args(DetectorModel::Eigermono)).is_err());
    }
}
