//! # 由缝隙掩膜提取面板
//!
//! 把整片探测器的缝隙掩膜拆分成独立面板：对非缝隙像素做 4 连通标记，
//! 按像素数窗口过滤掉坏区等碎片，再由每个区域的外接矩形生成面板。
//!
//! ## 算法
//! 1. 第一遍扫描：分配临时标签并用并查集记录等价关系
//! 2. 压缩并查集，按首像素的光栅顺序重新编号
//! 3. 第二遍扫描：统计每个标签的像素数和外接矩形
//!
//! ## 依赖关系
//! - 被 `geometry/eiger.rs`, `commands/panelize.rs` 调用
//! - 使用 `ndarray`

use crate::error::{PanelsimError, Result};
use crate::models::linalg;
use crate::models::{Detector, Panel};

use ndarray::{Array2, ArrayView2};

/// 面板像素数窗口（开区间）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelCountWindow {
    pub min_exclusive: usize,
    pub max_exclusive: usize,
}

impl Default for PixelCountWindow {
    /// Eiger 16M 单个模块约 529420 像素
    fn default() -> Self {
        PixelCountWindow {
            min_exclusive: 200_000,
            max_exclusive: 530_000,
        }
    }
}

impl PixelCountWindow {
    pub fn contains(&self, count: usize) -> bool {
        self.min_exclusive < count && count < self.max_exclusive
    }
}

/// 连通区域统计
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub label: u32,
    pub num_pixels: usize,
    /// 行范围 (slow)，闭区间
    pub row_min: usize,
    pub row_max: usize,
    /// 列范围 (fast)，闭区间
    pub col_min: usize,
    pub col_max: usize,
}

impl Region {
    pub fn width(&self) -> usize {
        self.col_max - self.col_min + 1
    }

    pub fn height(&self) -> usize {
        self.row_max - self.row_min + 1
    }
}

fn find_root(parents: &mut [u32], label: u32) -> u32 {
    let mut current = label;
    while current != parents[current as usize] {
        parents[current as usize] = parents[parents[current as usize] as usize];
        current = parents[current as usize];
    }
    current
}

fn union_labels(parents: &mut [u32], a: u32, b: u32) {
    let ra = find_root(parents, a);
    let rb = find_root(parents, b);
    if ra < rb {
        parents[rb as usize] = ra;
    } else if rb < ra {
        parents[ra as usize] = rb;
    }
}

/// 4 连通标记。背景为 0，前景区域从 1 开始按首像素的光栅顺序编号
pub fn label_regions(foreground: &ArrayView2<bool>) -> (Array2<u32>, usize) {
    let (height, width) = foreground.dim();
    let mut labels = Array2::<u32>::zeros((height, width));
    let mut parents: Vec<u32> = vec![0];

    for i in 0..height {
        for j in 0..width {
            if !foreground[[i, j]] {
                continue;
            }
            let up = if i > 0 { labels[[i - 1, j]] } else { 0 };
            let left = if j > 0 { labels[[i, j - 1]] } else { 0 };

            labels[[i, j]] = match (up, left) {
                (0, 0) => {
                    let next = parents.len() as u32;
                    parents.push(next);
                    next
                }
                (u, 0) => u,
                (0, l) => l,
                (u, l) => {
                    if u != l {
                        union_labels(&mut parents, u, l);
                    }
                    u.min(l)
                }
            };
        }
    }

    let mut relabel = vec![0u32; parents.len()];
    let mut next = 0u32;
    for i in 1..parents.len() {
        let root = find_root(&mut parents, i as u32) as usize;
        if relabel[root] == 0 {
            next += 1;
            relabel[root] = next;
        }
        relabel[i] = relabel[root];
    }

    labels.mapv_inplace(|l| relabel[l as usize]);
    (labels, next as usize)
}

/// 统计各标签的像素数与外接矩形，按标签升序返回
pub fn region_stats(labels: &ArrayView2<u32>, num_labels: usize) -> Vec<Region> {
    let mut regions: Vec<Region> = (1..=num_labels)
        .map(|l| Region {
            label: l as u32,
            num_pixels: 0,
            row_min: usize::MAX,
            row_max: 0,
            col_min: usize::MAX,
            col_max: 0,
        })
        .collect();

    for ((i, j), &l) in labels.indexed_iter() {
        if l == 0 {
            continue;
        }
        let r = &mut regions[l as usize - 1];
        r.num_pixels += 1;
        r.row_min = r.row_min.min(i);
        r.row_max = r.row_max.max(i);
        r.col_min = r.col_min.min(j);
        r.col_max = r.col_max.max(j);
    }

    regions
}

/// 把单面板探测器按缝隙掩膜拆成多面板。
///
/// `is_a_gap` 的形状为 (slow, fast)，必须与主面板尺寸一致。新面板共享主面板的
/// fast/slow 方向与其它属性，只改变原点和尺寸。
pub fn panelize(
    master: &Panel,
    is_a_gap: &ArrayView2<bool>,
    window: PixelCountWindow,
) -> Result<Detector> {
    let (ydim, xdim) = is_a_gap.dim();
    if master.image_size != [xdim, ydim] {
        return Err(PanelsimError::ShapeMismatch {
            expected: vec![master.image_size[1], master.image_size[0]],
            actual: vec![ydim, xdim],
        });
    }

    let is_a_panel = is_a_gap.mapv(|gap| !gap);
    let (labels, n_labels) = label_regions(&is_a_panel.view());
    let regions = region_stats(&labels.view(), n_labels);

    let pixel_size = master.pixel_size[0];
    let mut detector = Detector::new();

    for region in regions.iter().filter(|r| window.contains(r.num_pixels)) {
        let offset = linalg::add(
            linalg::scale(master.fast_axis, region.col_min as f64 * pixel_size),
            linalg::scale(master.slow_axis, region.row_min as f64 * pixel_size),
        );

        let mut panel = master.clone();
        panel.origin = linalg::add(master.origin, offset);
        panel.image_size = [region.width(), region.height()];
        panel.name = format!("panel{}", detector.len());
        detector.add_panel(panel);
    }

    log::debug!(
        "Found {} connected regions, kept {} panels",
        n_labels,
        detector.len()
    );

    if detector.is_empty() {
        return Err(PanelsimError::InvalidDetector(format!(
            "No region in the gap mask has between {} and {} pixels",
            window.min_exclusive, window.max_exclusive
        )));
    }

    Ok(detector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_label_regions_four_connectivity() {
        let fg = array![
            [true, true, false, true],
            [false, true, false, true],
            [true, false, false, false],
        ];
        let (labels, n) = label_regions(&fg.view());
        assert_eq!(n, 3);
        assert_eq!(labels[[0, 0]], 1);
        assert_eq!(labels[[1, 1]], 1);
        assert_eq!(labels[[0, 3]], 2);
        // 对角相邻不连通
        assert_eq!(labels[[2, 0]], 3);
    }

    #[test]
    fn test_label_regions_merges_u_shape() {
        let fg = array![
            [true, false, true],
            [true, false, true],
            [true, true, true],
        ];
        let (labels, n) = label_regions(&fg.view());
        assert_eq!(n, 1);
        assert!(labels.iter().filter(|&&l| l > 0).all(|&l| l == 1));
    }

    #[test]
    fn test_region_stats_bounding_box() {
        let fg = array![
            [false, false, false, false],
            [false, true, true, false],
            [false, true, true, false],
        ];
        let (labels, n) = label_regions(&fg.view());
        let regions = region_stats(&labels.view(), n);
        assert_eq!(regions.len(), 1);
        let r = &regions[0];
        assert_eq!(r.num_pixels, 4);
        assert_eq!((r.row_min, r.row_max, r.col_min, r.col_max), (1, 2, 1, 2));
        assert_eq!((r.width(), r.height()), (2, 2));
    }

    fn two_tile_mask() -> Array2<bool> {
        // 10 x 21：两个 10x10 模块，中间一列缝隙，模块内各有少量缝隙像素
        let mut gap = Array2::from_elem((10, 21), false);
        for i in 0..10 {
            gap[[i, 10]] = true;
        }
        gap[[0, 0]] = true;
        gap[[1, 0]] = true;
        gap[[0, 1]] = true;
        gap[[5, 15]] = true;
        gap[[4, 15]] = true;
        gap[[6, 15]] = true;
        gap[[5, 14]] = true;
        gap[[5, 16]] = true;
        gap
    }

    #[test]
    fn test_panelize_origins_and_sizes() {
        let gap = two_tile_mask();
        let master = Panel::new(
            "eiger",
            [1.0, 0.0, 0.0],
            [0.0, -1.0, 0.0],
            [-10.0, 5.0, -200.0],
            0.5,
            [21, 10],
        );
        let window = PixelCountWindow {
            min_exclusive: 50,
            max_exclusive: 101,
        };
        let det = panelize(&master, &gap.view(), window).unwrap();
        assert_eq!(det.len(), 2);

        let p0 = det.panel(0).unwrap();
        assert_eq!(p0.image_size, [10, 10]);
        assert_eq!(p0.origin, [-10.0, 5.0, -200.0]);

        let p1 = det.panel(1).unwrap();
        assert_eq!(p1.image_size, [10, 10]);
        assert_eq!(p1.origin, [-10.0 + 11.0 * 0.5, 5.0, -200.0]);
        assert_eq!(p1.fast_axis, master.fast_axis);
    }

    #[test]
    fn test_panelize_shape_mismatch() {
        let gap = Array2::from_elem((4, 4), false);
        let master = Panel::new("m", [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0; 3], 0.1, [5, 4]);
        assert!(matches!(
            panelize(&master, &gap.view(), PixelCountWindow::default()),
            Err(PanelsimError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_panelize_nothing_in_window() {
        let gap = Array2::from_elem((4, 4), false);
        let master = Panel::new("m", [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0; 3], 0.1, [4, 4]);
        assert!(panelize(&master, &gap.view(), PixelCountWindow::default()).is_err());
    }
}
