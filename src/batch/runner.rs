//! # 批量执行器
//!
//! 在 rayon 线程池中逐个处理几何文件，进度条上实时显示失败数，
//! 结束后按输入顺序汇总每个文件的结果。
//!
//! ## 依赖关系
//! - 被 `commands/convert.rs` 调用
//! - `build_pool` 同时被 `sim/pipeline.rs` 使用
//! - 使用 `utils/progress.rs`, `rayon`, `num_cpus`

use crate::error::{PanelsimError, Result};
use crate::utils::progress;

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// 单个输入文件的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessResult {
    Converted { output: PathBuf, panels: usize },
    /// 输出已存在
    Skipped(PathBuf),
    Failed { input: PathBuf, reason: String },
}

/// 批量处理汇总
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub converted: usize,
    /// 所有成功文件的面板总数
    pub panels: usize,
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, String)>,
}

impl BatchSummary {
    fn record(&mut self, result: ProcessResult) {
        match result {
            ProcessResult::Converted { panels, .. } => {
                self.converted += 1;
                self.panels += panels;
            }
            ProcessResult::Skipped(out) => self.skipped.push(out),
            ProcessResult::Failed { input, reason } => self.failures.push((input, reason)),
        }
    }

    pub fn total(&self) -> usize {
        self.converted + self.skipped.len() + self.failures.len()
    }
}

/// 按 `jobs` 建立线程池，0 表示使用全部 CPU
pub fn build_pool(jobs: usize) -> Result<rayon::ThreadPool> {
    let threads = if jobs == 0 { num_cpus::get() } else { jobs };
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| PanelsimError::Other(format!("Cannot build thread pool: {}", e)))
}

pub struct BatchRunner {
    jobs: usize,
    label: String,
}

impl BatchRunner {
    pub fn new(jobs: usize, label: &str) -> Self {
        Self {
            jobs,
            label: label.to_string(),
        }
    }

    /// 并行处理 `files`，结果顺序与输入一致
    pub fn run<F>(&self, files: &[PathBuf], processor: F) -> Result<BatchSummary>
    where
        F: Fn(&Path) -> ProcessResult + Sync + Send,
    {
        let pool = build_pool(self.jobs)?;
        let pb = progress::create_progress_bar(files.len() as u64, &self.label);
        let n_failed = AtomicUsize::new(0);

        let results: Vec<ProcessResult> = pool.install(|| {
            files
                .par_iter()
                .map(|file| {
                    let result = processor(file);
                    if let ProcessResult::Failed { input, reason } = &result {
                        log::debug!("{}: {}", input.display(), reason);
                        let n = n_failed.fetch_add(1, Ordering::Relaxed) + 1;
                        pb.set_message(format!("{} ({} failed)", self.label, n));
                    }
                    pb.inc(1);
                    result
                })
                .collect()
        });
        pb.finish_and_clear();

        let mut summary = BatchSummary::default();
        results.into_iter().for_each(|r| summary.record(r));
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_collects_outcomes() {
        let files: Vec<PathBuf> = ["a.geom", "b.geom", "c.geom", "d.geom"]
            .iter()
            .map(PathBuf::from)
            .collect();

        let summary = BatchRunner::new(2, "Converting")
            .run(&files, |f| match f.to_str() {
                Some("a.geom") | Some("d.geom") => ProcessResult::Converted {
                    output: f.with_extension("expt"),
                    panels: 32,
                },
                Some("b.geom") => ProcessResult::Skipped(PathBuf::from("b.expt")),
                _ => ProcessResult::Failed {
                    input: f.to_path_buf(),
                    reason: "missing 'res'".to_string(),
                },
            })
            .unwrap();

        assert_eq!(summary.converted, 2);
        assert_eq!(summary.panels, 64);
        assert_eq!(summary.skipped, vec![PathBuf::from("b.expt")]);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].0, PathBuf::from("c.geom"));
        assert_eq!(summary.total(), 4);
    }

    #[test]
    fn test_build_pool_sizes() {
        assert_eq!(build_pool(3).unwrap().current_num_threads(), 3);
        assert_eq!(build_pool(0).unwrap().current_num_threads(), num_cpus::get());
    }
}
