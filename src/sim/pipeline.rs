//! # 多面板模拟流程
//!
//! 1. 每个面板只计算一次非晶背景
//! 2. 每张图像随机旋转晶体，逐面板调用引擎计算衍射斑
//! 3. 衍射斑除以波长数，叠加背景，施加读出噪声
//! 4. 单片探测器可把缝隙像素置为 -1
//! 5. 按 (panels, slow, fast) 组装图像交给调用方写出
//!
//! 面板之间相互独立，在 `rayon` 线程池中并行计算。
//!
//! ## 依赖关系
//! - 被 `commands/simulate.rs` 调用
//! - 使用 `sim/engine.rs`, `sim/noise.rs`, `sim/scale.rs`, `models/`

use crate::batch::build_pool;
use crate::error::{PanelsimError, Result};
use crate::models::crystal::random_rotations;
use crate::models::{Beam, Crystal, Detector};
use crate::parsers::hkl::StructureFactors;
use crate::sim::engine::{BackgroundRequest, DiffractionEngine, SpotRequest};
use crate::sim::noise;
use crate::sim::params::{BackgroundParams, NoiseParams, SpotParams};
use crate::sim::scale;
use crate::sim::spectrum::Spectrum;

use ndarray::{Array2, Array3, Axis};
use rayon::prelude::*;
use std::time::{Duration, Instant};

/// 缝隙像素的填充值
pub const GAP_VALUE: f64 = -1.0;

/// 一次模拟运行的全部输入
#[derive(Debug, Clone, Copy)]
pub struct SimulationJob<'a> {
    pub detector: &'a Detector,
    pub beam: &'a Beam,
    pub crystal: &'a Crystal,
    pub structure_factors: Option<&'a StructureFactors>,
    pub spectrum: &'a Spectrum,
    pub total_flux: f64,
    pub spots: &'a SpotParams,
    pub background: &'a BackgroundParams,
    pub num_images: usize,
    pub rotation_seed: u64,
    /// 单片探测器的缝隙掩膜 (slow, fast)
    pub gap_mask: Option<&'a Array2<bool>>,
    pub use_gpu: bool,
    /// 0 表示使用全部 CPU
    pub jobs: usize,
}

#[derive(Debug, Clone)]
pub struct SimulationSummary {
    pub images: usize,
    pub panels: usize,
    pub elapsed: Duration,
}

/// 衍射斑后处理：除以波长数，叠加背景，可选噪声
pub fn finish_panel(
    raw_spots: Array2<f64>,
    n_wavelengths: usize,
    background: Option<&Array2<f64>>,
    background_scale: f64,
    noise_params: Option<&NoiseParams>,
) -> Result<Array2<f64>> {
    let mut pixels = raw_spots / n_wavelengths.max(1) as f64;

    if let Some(bg) = background {
        if bg.dim() != pixels.dim() {
            let (s, f) = pixels.dim();
            let (bs, bf) = bg.dim();
            return Err(PanelsimError::ShapeMismatch {
                expected: vec![s, f],
                actual: vec![bs, bf],
            });
        }
        pixels.scaled_add(background_scale, bg);
    }

    match noise_params {
        Some(params) => noise::apply_detector_noise(&pixels, params),
        None => Ok(pixels),
    }
}

/// 每个面板的非晶背景
pub fn simulate_backgrounds(
    engine: &dyn DiffractionEngine,
    job: &SimulationJob<'_>,
) -> Result<Vec<Array2<f64>>> {
    let xray_beams = job.spectrum.xray_beams(job.beam, job.total_flux);
    let pool = build_pool(job.jobs)?;

    pool.install(|| {
        job.detector
            .panels()
            .par_iter()
            .enumerate()
            .map(|(pidx, panel)| {
                log::debug!("Doing background panel {}", pidx);
                engine.simulate_background(&BackgroundRequest {
                    panel_index: pidx,
                    panel,
                    beam: job.beam,
                    xray_beams: &xray_beams,
                    total_flux: job.total_flux,
                    params: job.background,
                })
            })
            .collect()
    })
}

/// 单面板衍射斑（含背景与噪声）
pub fn simulate_panel(
    engine: &dyn DiffractionEngine,
    job: &SimulationJob<'_>,
    pidx: usize,
    crystal: &Crystal,
    xray_beams: &[Beam],
    background: Option<&Array2<f64>>,
) -> Result<Array2<f64>> {
    let panel = job.detector.panel(pidx).ok_or_else(|| {
        PanelsimError::InvalidArgument(format!(
            "Panel {} requested but the detector has {}",
            pidx,
            job.detector.len()
        ))
    })?;
    let params = job.spots;
    let start = Instant::now();

    let n = scale::ncells(params.mosaic_vol_a3, crystal.unit_cell_volume());
    let beam_center_mm = if params.recenter {
        match panel.beam_centre_mm(job.beam.s0()) {
            Ok(centre) => Some(centre),
            Err(e) => {
                log::warn!("{}; keeping the panel origin", e);
                None
            }
        }
    } else {
        None
    };

    let request = SpotRequest {
        panel_index: pidx,
        panel,
        beam: job.beam,
        xray_beams,
        total_flux: job.total_flux,
        a_matrix: crystal.a_matrix_for_engine()?,
        ncells: [n, n, n],
        spot_scale: params.spot_scale(),
        structure_factors: job.structure_factors,
        beam_center_mm,
        params,
        use_gpu: job.use_gpu,
    };

    if pidx == 0 {
        log::debug!(
            "Ncells {:?}, mosaic domain volume {:.7e} A^3, spot scale {:.7e}, profile {}",
            request.ncells,
            params.mosaic_vol_a3,
            request.spot_scale,
            params.profile
        );
    }

    let raw = engine.simulate_spots(&request)?;
    let noise_params = params.add_noise.then_some(&params.noise);
    let pixels = finish_panel(
        raw,
        xray_beams.len(),
        background,
        params.background_scale,
        noise_params,
    )?;

    log::info!(
        "Panel {} took {:.4} seconds",
        pidx,
        start.elapsed().as_secs_f64()
    );
    Ok(pixels)
}

/// 运行完整模拟，每完成一张图像调用一次 `sink(index, image)`
pub fn run_simulation<F>(
    engine: &dyn DiffractionEngine,
    job: &SimulationJob<'_>,
    mut sink: F,
) -> Result<SimulationSummary>
where
    F: FnMut(usize, Array3<f64>) -> Result<()>,
{
    let start = Instant::now();
    let [fast, slow] = job.detector.uniform_image_size()?;
    let n_panels = job.detector.len();

    job.spectrum.validate()?;
    if let Some(mask) = job.gap_mask {
        if mask.dim() != (slow, fast) {
            let (ms, mf) = mask.dim();
            return Err(PanelsimError::ShapeMismatch {
                expected: vec![slow, fast],
                actual: vec![ms, mf],
            });
        }
    }

    log::info!(
        "Simulating {} image(s) on {} panel(s) with {}",
        job.num_images,
        n_panels,
        engine.name()
    );
    let backgrounds = simulate_backgrounds(engine, job)?;
    let xray_beams = job.spectrum.xray_beams(job.beam, job.total_flux);
    let rotations = random_rotations(job.num_images, job.rotation_seed);
    let pool = build_pool(job.jobs)?;

    for (i_img, rotation) in rotations.iter().enumerate() {
        let crystal = job.crystal.rotated(rotation);

        let panels: Vec<Array2<f64>> = pool.install(|| {
            (0..n_panels)
                .into_par_iter()
                .map(|pidx| {
                    simulate_panel(
                        engine,
                        job,
                        pidx,
                        &crystal,
                        &xray_beams,
                        backgrounds.get(pidx),
                    )
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let mut image = Array3::<f64>::zeros((n_panels, slow, fast));
        for (pidx, mut pixels) in panels.into_iter().enumerate() {
            if let Some(mask) = job.gap_mask {
                ndarray::Zip::from(&mut pixels)
                    .and(mask)
                    .for_each(|v, &gap| {
                        if gap {
                            *v = GAP_VALUE;
                        }
                    });
            }
            image.index_axis_mut(Axis(0), pidx).assign(&pixels);
        }

        sink(i_img, image)?;
    }

    Ok(SimulationSummary {
        images: job.num_images,
        panels: n_panels,
        elapsed: start.elapsed(),
    })
}
