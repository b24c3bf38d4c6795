//! # Eiger 16M 合成几何
//!
//! 以缝隙掩膜的形状构造一整片的 Eiger 主面板，再按需拆分成多面板。
//!
//! ## 依赖关系
//! - 被 `commands/panelize.rs`, `commands/simulate.rs` 调用
//! - 使用 `geometry/panelize.rs`

use crate::error::Result;
use crate::geometry::panelize::{self, PixelCountWindow};
use crate::models::{Detector, Panel};

use ndarray::ArrayView2;

pub const EIGER_PIXEL_SIZE_MM: f64 = 0.075;
pub const EIGER_DETDIST_MM: f64 = 200.0;
pub const EIGER_THICKNESS_MM: f64 = 0.45;
pub const EIGER_MU: f64 = 3.969545947994824;

/// Eiger 构建参数
#[derive(Debug, Clone, Copy)]
pub struct EigerOptions {
    pub detdist_mm: f64,
    pub pixel_size_mm: f64,
    pub as_single_panel: bool,
    pub window: PixelCountWindow,
}

impl Default for EigerOptions {
    fn default() -> Self {
        EigerOptions {
            detdist_mm: EIGER_DETDIST_MM,
            pixel_size_mm: EIGER_PIXEL_SIZE_MM,
            as_single_panel: false,
            window: PixelCountWindow::default(),
        }
    }
}

/// 覆盖整个掩膜的单面板，束心位于图像中心
pub fn master_panel(mask_shape: (usize, usize), detdist_mm: f64, pixel_size_mm: f64) -> Panel {
    let (ydim, xdim) = mask_shape;
    let center_x = xdim as f64 / 2.0 * pixel_size_mm;
    let center_y = ydim as f64 / 2.0 * pixel_size_mm;

    let mut panel = Panel::new(
        "eiger16M",
        [1.0, 0.0, 0.0],
        [0.0, -1.0, 0.0],
        [-center_x, center_y, -detdist_mm],
        pixel_size_mm,
        [xdim, ydim],
    );
    panel.trusted_range = [-1.0, 65535.0];
    panel.thickness = EIGER_THICKNESS_MM;
    panel.mu = EIGER_MU;
    panel
}

/// 由缝隙掩膜构造 Eiger 16M 探测器
pub fn get_multi_panel_eiger(is_a_gap: &ArrayView2<bool>, opts: &EigerOptions) -> Result<Detector> {
    let master = master_panel(is_a_gap.dim(), opts.detdist_mm, opts.pixel_size_mm);

    if opts.as_single_panel {
        return Ok(Detector::from_panels(vec![master]));
    }

    panelize::panelize(&master, is_a_gap, opts.window)
}
