//! # nanoBragg 外部引擎
//!
//! 每个面板、每个波长调用一次 `nanoBragg` 可执行文件：把 A 矩阵、结构因子表和
//! `Fbg_vs_stol` 表写入临时目录，以 `-floatfile` 读回 32 位浮点原始图像。
//!
//! ## 命令行约定
//! - 面板几何：`-fdet_vector/-sdet_vector/-odet_vector`，以及
//!   `-pix0_vector_mm` 或 `-distance` + `-Fbeam/-Sbeam`（重新定位时）
//! - 光源：`-beam_vector -lambda -flux -beamsize`
//! - 晶体：`-mat`（MOSFLM 格式，乘以波长）`-hkl -default_F -Na -Nb -Nc`
//! - 背景：`-stol -water`（厚度单位 µm）
//!
//! ## 依赖关系
//! - 实现 `sim/engine.rs` 的 `DiffractionEngine`
//! - 使用 `tempfile` 管理临时目录

use crate::error::{PanelsimError, Result};
use crate::models::linalg;
use crate::models::{Beam, Panel};
use crate::parsers::hkl;
use crate::sim::engine::{BackgroundRequest, DiffractionEngine, SpotRequest};
use crate::sim::params::Profile;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// 引擎配置（TOML `[engine]` 表）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NanoBraggSettings {
    pub executable: String,
    /// CUDA 版本的可执行文件
    pub gpu_executable: Option<String>,
    /// 临时文件目录，缺省为系统临时目录
    pub scratch_dir: Option<PathBuf>,
    pub keep_scratch: bool,
}

impl Default for NanoBraggSettings {
    fn default() -> Self {
        NanoBraggSettings {
            executable: "nanoBragg".to_string(),
            gpu_executable: None,
            scratch_dir: None,
            keep_scratch: false,
        }
    }
}

/// 调用外部 nanoBragg 的引擎
pub struct NanoBraggEngine {
    settings: NanoBraggSettings,
}

impl NanoBraggEngine {
    pub fn new(settings: NanoBraggSettings) -> Self {
        NanoBraggEngine { settings }
    }

    /// 是否配置了 GPU 版本
    pub fn has_gpu(&self) -> bool {
        self.settings.gpu_executable.is_some()
    }

    fn scratch(&self) -> Result<tempfile::TempDir> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("panelsim-");
            b
        };
        let dir = match &self.settings.scratch_dir {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        dir.map_err(|e| PanelsimError::FileWriteError {
            path: self
                .settings
                .scratch_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| std::env::temp_dir().display().to_string()),
            source: e,
        })
    }

    fn finish_scratch(&self, dir: tempfile::TempDir) {
        if self.settings.keep_scratch {
            let kept = dir.into_path();
            log::debug!("Keeping scratch directory '{}'", kept.display());
        }
    }

    fn run(&self, args: &[String], use_gpu: bool, device_id: u32) -> Result<()> {
        let program = match (&self.settings.gpu_executable, use_gpu) {
            (Some(gpu), true) => gpu.as_str(),
            _ => self.settings.executable.as_str(),
        };

        let mut cmd = Command::new(program);
        cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
        if use_gpu {
            cmd.env("CUDA_VISIBLE_DEVICES", device_id.to_string());
        }

        log::trace!("{} {}", program, args.join(" "));

        let output = cmd.output().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PanelsimError::CommandNotFound {
                command: program.to_string(),
            },
            _ => PanelsimError::CommandFailed {
                command: program.to_string(),
                stderr: e.to_string(),
            },
        })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(PanelsimError::CommandFailed {
                command: program.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }

    /// 在临时目录中逐波长计算背景并求和（未乘分子数比例）
    fn background_in(&self, request: &BackgroundRequest<'_>, dir: &Path) -> Result<Array2<f64>> {
        let panel = request.panel;
        let params = request.params;

        let stol_path = dir.join("Fbg_vs_stol.txt");
        let stol: String = params
            .fbg_vs_stol
            .iter()
            .map(|(stol, fbg)| format!("{} {}\n", stol, fbg))
            .collect();
        write_scratch(&stol_path, &stol)?;

        let [fast, slow] = panel.image_size;
        let mut total = Array2::<f64>::zeros((slow, fast));

        for (k, beam) in request.xray_beams.iter().enumerate() {
            let image_path = dir.join(format!("background_{}.bin", k));
            let mut args = geometry_args(panel, None);
            args.extend(source_args(beam, params.beam_size_mm));
            args.extend(strings([
                "-N", "0", "-default_F", "0", "-stol",
            ]));
            args.push(path_arg(&stol_path));
            args.push("-water".to_string());
            args.push((params.sample_thick_mm * 1000.0).to_string());
            args.extend(output_args(&image_path));

            self.run(&args, false, 0)?;
            total += &read_float_image(&image_path, fast, slow)?;
        }
        Ok(total)
    }

    /// 在临时目录中逐波长计算衍射斑并求和（未乘 spot scale）
    fn spots_in(&self, request: &SpotRequest<'_>, dir: &Path) -> Result<Array2<f64>> {
        let panel = request.panel;
        let params = request.params;

        let hkl_path = match request.structure_factors {
            Some(sf) => {
                let path = dir.join("Fhkl.hkl");
                write_scratch(&path, &hkl::to_hkl_string(sf))?;
                Some(path)
            }
            None => None,
        };

        let [fast, slow] = panel.image_size;
        let mut total = Array2::<f64>::zeros((slow, fast));

        for (k, beam) in request.xray_beams.iter().enumerate() {
            let mat_path = dir.join(format!("A_{}.mat", k));
            write_scratch(&mat_path, &mosflm_matrix(&request.a_matrix, beam.wavelength))?;

            let image_path = dir.join(format!("spots_{}.bin", k));
            let mut args = geometry_args(panel, request.beam_center_mm);
            args.extend(source_args(beam, params.beam_size_mm));

            args.push("-mat".to_string());
            args.push(path_arg(&mat_path));
            if let Some(path) = &hkl_path {
                args.push("-hkl".to_string());
                args.push(path_arg(path));
            }
            args.push("-default_F".to_string());
            args.push(params.default_f.to_string());

            let [na, nb, nc] = request.ncells;
            for (flag, n) in [("-Na", na), ("-Nb", nb), ("-Nc", nc)] {
                args.push(flag.to_string());
                args.push(n.to_string());
            }

            args.push("-xtalsize".to_string());
            args.push(params.crystal_size_mm.to_string());
            args.push("-mosaic".to_string());
            args.push(params.mosaic_spread_deg.to_string());
            args.push("-mosaic_domains".to_string());
            args.push(params.mosaic_domains.to_string());
            if let Some(seed) = params.mosaic_seed {
                args.push("-mosaic_seed".to_string());
                args.push(seed.to_string());
            }

            args.push(profile_flag(params.profile).to_string());
            if params.oversample > 0 {
                args.push("-oversample".to_string());
                args.push(params.oversample.to_string());
            }
            args.push(if params.interpolate { "-interpolate" } else { "-nointerpolate" }.to_string());
            args.extend(output_args(&image_path));

            self.run(&args, request.use_gpu, params.device_id)?;
            total += &read_float_image(&image_path, fast, slow)?;
        }
        Ok(total)
    }
}

impl DiffractionEngine for NanoBraggEngine {
    fn name(&self) -> &str {
        "nanoBragg"
    }

    fn simulate_background(&self, request: &BackgroundRequest<'_>) -> Result<Array2<f64>> {
        let params = request.params;
        // nanoBragg 的 -water 按水 (1 g/cm³, 18 Da) 计算分子数
        let molecule_ratio = params.density_gcm3 / params.molecular_weight * 18.0;

        let dir = self.scratch()?;
        let result = self.background_in(request, dir.path());
        self.finish_scratch(dir);

        let mut total = result?;
        total.mapv_inplace(|v| v * molecule_ratio);
        Ok(total)
    }

    fn simulate_spots(&self, request: &SpotRequest<'_>) -> Result<Array2<f64>> {
        let dir = self.scratch()?;
        let result = self.spots_in(request, dir.path());
        self.finish_scratch(dir);

        let mut total = result?;
        total.mapv_inplace(|v| v * request.spot_scale);
        Ok(total)
    }
}

fn strings<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn vec_args(flag: &str, v: [f64; 3]) -> Vec<String> {
    vec![
        flag.to_string(),
        v[0].to_string(),
        v[1].to_string(),
        v[2].to_string(),
    ]
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

/// 面板几何参数。给出光束中心时让引擎按距离和中心重建 pix0
fn geometry_args(panel: &Panel, beam_center_mm: Option<(f64, f64)>) -> Vec<String> {
    let [fast, slow] = panel.image_size;
    let normal = panel.normal();

    let mut args = vec![
        "-detpixels_f".to_string(),
        fast.to_string(),
        "-detpixels_s".to_string(),
        slow.to_string(),
        "-pixel".to_string(),
        panel.pixel_size[0].to_string(),
    ];
    args.extend(vec_args("-fdet_vector", panel.fast_axis));
    args.extend(vec_args("-sdet_vector", panel.slow_axis));
    args.extend(vec_args("-odet_vector", normal));

    match beam_center_mm {
        Some((x, y)) => {
            let distance = linalg::dot(panel.origin, normal).abs();
            args.extend([
                "-distance".to_string(),
                distance.to_string(),
                "-Fbeam".to_string(),
                x.to_string(),
                "-Sbeam".to_string(),
                y.to_string(),
            ]);
        }
        None => args.extend(vec_args("-pix0_vector_mm", panel.origin)),
    }
    args
}

fn source_args(beam: &Beam, beam_size_mm: f64) -> Vec<String> {
    let mut args = vec_args("-beam_vector", beam.unit_s0());
    args.extend([
        "-lambda".to_string(),
        beam.wavelength.to_string(),
        "-flux".to_string(),
        beam.flux.to_string(),
        "-beamsize".to_string(),
        beam_size_mm.to_string(),
        "-polar".to_string(),
        beam.polarization_fraction.to_string(),
    ]);
    if beam.divergence > 0.0 {
        // dxtbx 使用弧度，nanoBragg 使用 mrad
        args.push("-divergence".to_string());
        args.push((beam.divergence * 1000.0).to_string());
    }
    args
}

fn output_args(image_path: &Path) -> Vec<String> {
    vec![
        "-nonoise".to_string(),
        "-nopgm".to_string(),
        "-floatfile".to_string(),
        path_arg(image_path),
    ]
}

fn profile_flag(profile: Profile) -> &'static str {
    match profile {
        Profile::Square => "-square_xtal",
        Profile::Round => "-round_xtal",
        Profile::Gauss => "-gauss_xtal",
        Profile::Tophat => "-binary_spots",
    }
}

/// MOSFLM 取向矩阵：第 i 行为 (a*_i, b*_i, c*_i)·λ
fn mosflm_matrix(a_matrix: &[f64; 9], wavelength: f64) -> String {
    (0..3)
        .map(|i| {
            format!(
                "{:.12} {:.12} {:.12}\n",
                a_matrix[i] * wavelength,
                a_matrix[3 + i] * wavelength,
                a_matrix[6 + i] * wavelength
            )
        })
        .collect()
}

fn write_scratch(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|e| PanelsimError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })
}

/// 读取 nanoBragg 的 `-floatfile` 输出（本机字节序 f32，fast 优先）
fn read_float_image(path: &Path, fast: usize, slow: usize) -> Result<Array2<f64>> {
    let bytes = fs::read(path).map_err(|e| PanelsimError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    let expected = fast * slow * 4;
    if bytes.len() != expected {
        return Err(PanelsimError::ShapeMismatch {
            expected: vec![expected],
            actual: vec![bytes.len()],
        });
    }

    let values: Vec<f64> = bytes
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]) as f64)
        .collect();

    Array2::from_shape_vec((slow, fast), values)
        .map_err(|e| PanelsimError::Other(format!("Bad image layout: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mosflm_matrix_layout() {
        // Aᵀ 行为 a*, b*, c*
        let a = [0.1, 0.0, 0.0, 0.0, 0.2, 0.0, 0.0, 0.0, 0.5];
        let text = mosflm_matrix(&a, 2.0);
        let rows: Vec<Vec<f64>> = text
            .lines()
            .map(|l| l.split_whitespace().map(|v| v.parse().unwrap()).collect())
            .collect();
        assert_eq!(rows[0], vec![0.2, 0.0, 0.0]);
        assert_eq!(rows[1], vec![0.0, 0.4, 0.0]);
        assert_eq!(rows[2], vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_read_float_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.bin");
        let values: Vec<f32> = (0..6).map(|v| v as f32 * 0.5).collect();
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        fs::write(&path, bytes).unwrap();

        let img = read_float_image(&path, 3, 2).unwrap();
        assert_eq!(img.dim(), (2, 3));
        assert_eq!(img[[1, 0]], 1.5);
        assert!(read_float_image(&path, 4, 2).is_err());
    }

    #[test]
    fn test_geometry_args_modes() {
        let panel = Panel::new("p", [1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [-5.0, 5.0, -100.0], 0.1, [100, 100]);
        let fixed = geometry_args(&panel, None);
        assert!(fixed.iter().any(|a| a == "-pix0_vector_mm"));

        let centred = geometry_args(&panel, Some((5.0, 5.0)));
        let i = centred.iter().position(|a| a == "-distance").unwrap();
        assert_eq!(centred[i + 1], "100");
        assert!(!centred.iter().any(|a| a == "-pix0_vector_mm"));
    }

    #[test]
    fn test_missing_executable() {
        let engine = NanoBraggEngine::new(NanoBraggSettings {
            executable: "panelsim-no-such-engine".to_string(),
            ..Default::default()
        });
        assert!(matches!(
            engine.run(&[], false, 0),
            Err(PanelsimError::CommandNotFound { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_unlaunchable_executable_is_not_missing() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("nanoBragg");
        fs::write(&exe, "not a program").unwrap();

        let engine = NanoBraggEngine::new(NanoBraggSettings {
            executable: exe.display().to_string(),
            ..Default::default()
        });
        match engine.run(&[], false, 0) {
            Err(PanelsimError::CommandFailed { command, stderr }) => {
                assert_eq!(command, exe.display().to_string());
                assert!(!stderr.is_empty());
            }
            other => panic!("expected CommandFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_failed_run_keeps_scratch_when_asked() {
        let root = tempfile::tempdir().unwrap();
        let panel = Panel::new("p", [1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [-0.2, 0.15, -100.0], 0.1, [4, 3]);
        let beam = Beam::new([0.0, 0.0, 1.0], 1.3);
        let params = crate::sim::BackgroundParams::default();
        let request = BackgroundRequest {
            panel_index: 0,
            panel: &panel,
            beam: &beam,
            xray_beams: std::slice::from_ref(&beam),
            total_flux: 1.0,
            params: &params,
        };

        let scratch_entries = |keep: bool| {
            let engine = NanoBraggEngine::new(NanoBraggSettings {
                executable: "panelsim-no-such-engine".to_string(),
                scratch_dir: Some(root.path().to_path_buf()),
                keep_scratch: keep,
                ..Default::default()
            });
            assert!(engine.simulate_background(&request).is_err());
            fs::read_dir(root.path()).unwrap().count()
        };

        assert_eq!(scratch_entries(false), 0);
        assert_eq!(scratch_entries(true), 1);
        let kept = fs::read_dir(root.path()).unwrap().next().unwrap().unwrap().path();
        assert!(kept.join("Fbg_vs_stol.txt").exists());
    }
}
