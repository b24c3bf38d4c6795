//! # convert 命令实现
//!
//! CrystFEL 几何文件批量转换为 dxtbx 实验列表。
//!
//! ## 功能
//! - 单文件：输出到 `-o` 指定的文件，缺省为同名 .expt
//! - 目录：收集匹配文件，并行转换到 `-o` 目录（缺省为各自所在目录）
//! - 已存在的输出默认跳过
//!
//! ## 依赖关系
//! - 使用 `cli/convert.rs` 定义的参数
//! - 使用 `geometry/convert.rs`, `batch/`
//! - 使用 `utils/output.rs`

use crate::batch::{BatchRunner, FileCollector, ProcessResult};
use crate::cli::convert::ConvertArgs;
use crate::error::{PanelsimError, Result};
use crate::geometry::convert_crystfel_to_dxtbx;
use crate::utils::output;

use std::fs;
use std::path::{Path, PathBuf};

/// 执行 convert 命令
pub fn execute(args: ConvertArgs) -> Result<()> {
    output::print_header("Converting CrystFEL geometry to dxtbx");

    if !args.input.exists() {
        return Err(PanelsimError::FileNotFound {
            path: args.input.display().to_string(),
        });
    }

    let collector = FileCollector::new(args.input.clone())
        .with_pattern(&args.pattern)?
        .recursive(args.recursive);

    if collector.is_single_file() {
        let out = args
            .output
            .clone()
            .unwrap_or_else(|| args.input.with_extension("expt"));
        return convert_single(&args.input, &out, args.detdist, args.overwrite);
    }

    let files = collector.collect();
    if files.is_empty() {
        output::print_warning(&format!(
            "No files matched '{}' under {}",
            args.pattern,
            args.input.display()
        ));
        return Ok(());
    }

    if let Some(dir) = &args.output {
        fs::create_dir_all(dir).map_err(|e| PanelsimError::FileWriteError {
            path: dir.display().to_string(),
            source: e,
        })?;
    }

    output::print_info(&format!("Found {} geometry files", files.len()));

    let summary = BatchRunner::new(args.jobs, "Converting").run(&files, |geom| {
        let out = batch_output_path(geom, args.output.as_deref());
        if out.exists() && !args.overwrite {
            return ProcessResult::Skipped(out);
        }
        match convert_crystfel_to_dxtbx(geom, &out, args.detdist) {
            Ok(det) => ProcessResult::Converted {
                output: out,
                panels: det.len(),
            },
            Err(e) => ProcessResult::Failed {
                input: geom.to_path_buf(),
                reason: e.to_string(),
            },
        }
    })?;

    for out in &summary.skipped {
        output::print_skip(&format!("{} exists", out.display()));
    }
    for (path, err) in &summary.failures {
        output::print_error(&format!("{}: {}", path.display(), err));
    }

    output::print_done(&format!(
        "Converted {} of {} file(s) ({} panels), {} skipped, {} failed",
        summary.converted,
        summary.total(),
        summary.panels,
        summary.skipped.len(),
        summary.failures.len()
    ));

    Ok(())
}

fn convert_single(input: &Path, out: &Path, detdist: Option<f64>, overwrite: bool) -> Result<()> {
    if out.exists() && !overwrite {
        output::print_skip(&format!(
            "{} exists (use --overwrite to replace it)",
            out.display()
        ));
        return Ok(());
    }

    let detector = convert_crystfel_to_dxtbx(input, out, detdist)?;
    output::print_conversion(&input.display().to_string(), &out.display().to_string());
    output::print_info(&format!("{} panels", detector.len()));
    Ok(())
}

/// 批量模式的输出路径：`<dir>/<stem>.expt`
fn batch_output_path(geom: &Path, output_dir: Option<&Path>) -> PathBuf {
    let stem = geom
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("detector");
    match output_dir {
        Some(dir) => dir.join(format!("{}.expt", stem)),
        None => geom.with_extension("expt"),
    }
}
