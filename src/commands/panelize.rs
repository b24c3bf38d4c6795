//! # panelize 命令实现
//!
//! 读取 Eiger 16M 缝隙掩膜，生成多面板（或单片）探测器并写出 .expt。
//!
//! ## 依赖关系
//! - 使用 `cli/panelize.rs` 定义的参数
//! - 使用 `io/mask.rs`, `geometry/eiger.rs`, `models/experiment.rs`

use crate::cli::panelize::PanelizeArgs;
use crate::error::{PanelsimError, Result};
use crate::geometry::{get_multi_panel_eiger, EigerOptions, PixelCountWindow};
use crate::io::read_gap_mask;
use crate::models::ExperimentList;
use crate::utils::{output, progress};

/// 执行 panelize 命令
pub fn execute(args: PanelizeArgs) -> Result<()> {
    output::print_header("Building Eiger 16M detector model");

    if args.min_pixels >= args.max_pixels {
        return Err(PanelsimError::InvalidArgument(format!(
            "--min-pixels ({}) must be below --max-pixels ({})",
            args.min_pixels, args.max_pixels
        )));
    }

    let mask = read_gap_mask(&args.gaps, &args.dataset)?;
    let (ydim, xdim) = mask.dim();
    let n_gaps = mask.iter().filter(|&&g| g).count();
    output::print_info(&format!(
        "Gap mask {}x{} with {} gap pixels",
        ydim, xdim, n_gaps
    ));

    let opts = EigerOptions {
        detdist_mm: args.detdist,
        pixel_size_mm: args.pixel_size,
        as_single_panel: args.single_panel,
        window: PixelCountWindow {
            min_exclusive: args.min_pixels,
            max_exclusive: args.max_pixels,
        },
    };

    let spinner = progress::create_spinner("Labelling connected regions");
    let detector = get_multi_panel_eiger(&mask.view(), &opts);
    spinner.finish_and_clear();
    let detector = detector?;

    ExperimentList::from_detector(detector.clone(), None).to_file(&args.output)?;

    output::print_detector_summary(&detector);
    output::print_done(&format!("Wrote {}", args.output.display()));

    Ok(())
}
