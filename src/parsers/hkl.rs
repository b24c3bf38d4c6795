//! # HKL 结构因子表解析器
//!
//! 读写模拟引擎使用的纯文本结构因子表，每行 `h k l F`。
//!
//! ## 依赖关系
//! - 被 `sim/` 与 `commands/simulate.rs` 使用
//! - 使用 `models/crystal.rs` 计算 d 间距

use crate::error::{PanelsimError, Result};
use crate::models::linalg;
use crate::models::Crystal;

use std::fs;
use std::path::Path;

/// 结构因子振幅表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructureFactors {
    pub entries: Vec<([i32; 3], f64)>,
}

impl StructureFactors {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 只保留 d >= d_min 的衍射点
    pub fn truncate_to_resolution(&self, d_min: f64, crystal: &Crystal) -> Result<Self> {
        let a = crystal.a_matrix()?;
        let entries = self
            .entries
            .iter()
            .filter(|(hkl, _)| {
                let q = linalg::mat_vec(&a, [hkl[0] as f64, hkl[1] as f64, hkl[2] as f64]);
                let q_len = linalg::norm(q);
                q_len > 0.0 && 1.0 / q_len >= d_min
            })
            .cloned()
            .collect();

        Ok(StructureFactors { entries })
    }
}

/// 解析 .hkl 文件
pub fn parse_hkl_file(path: &Path) -> Result<StructureFactors> {
    let content = fs::read_to_string(path).map_err(|e| PanelsimError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_hkl_content(&content, &path.display().to_string())
}

/// 从字符串内容解析 `h k l F`
pub fn parse_hkl_content(content: &str, source_name: &str) -> Result<StructureFactors> {
    let mut entries = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let parsed = if parts.len() >= 4 {
            match (
                parts[0].parse::<i32>(),
                parts[1].parse::<i32>(),
                parts[2].parse::<i32>(),
                parts[3].parse::<f64>(),
            ) {
                (Ok(h), Ok(k), Ok(l), Ok(f)) => Some(([h, k, l], f)),
                _ => None,
            }
        } else {
            None
        };

        match parsed {
            Some(entry) => entries.push(entry),
            None => {
                return Err(PanelsimError::ParseError {
                    format: "hkl".to_string(),
                    path: source_name.to_string(),
                    line: idx + 1,
                    reason: format!("Expected 'h k l F', got '{}'", line),
                })
            }
        }
    }

    Ok(StructureFactors { entries })
}

/// 转为 .hkl 文本
pub fn to_hkl_string(sf: &StructureFactors) -> String {
    let mut result = String::new();
    for (hkl, f) in &sf.entries {
        result.push_str(&format!("{:4} {:4} {:4} {:12.4}\n", hkl[0], hkl[1], hkl[2], f));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hkl() {
        let content = "# lysozyme subset\n1 0 0 12.5\n 0 2 -1  30\n\n";
        let sf = parse_hkl_content(content, "t.hkl").unwrap();
        assert_eq!(sf.len(), 2);
        assert_eq!(sf.entries[1], ([0, 2, -1], 30.0));

        let reparsed = parse_hkl_content(&to_hkl_string(&sf), "again").unwrap();
        assert_eq!(reparsed, sf);
    }

    #[test]
    fn test_parse_hkl_rejects_garbage() {
        assert!(parse_hkl_content("1 0 0\n", "t.hkl").is_err());
        assert!(parse_hkl_content("a b c d\n", "t.hkl").is_err());
    }

    #[test]
    fn test_truncate_to_resolution() {
        let crystal = Crystal::new([10.0, 0.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 10.0], "P1");
        let sf = StructureFactors {
            entries: vec![
                ([1, 0, 0], 1.0), // d = 10
                ([2, 0, 0], 1.0), // d = 5
                ([5, 0, 0], 1.0), // d = 2
                ([0, 0, 0], 1.0),
            ],
        };
        let kept = sf.truncate_to_resolution(4.0, &crystal).unwrap();
        assert_eq!(kept.len(), 2);
        assert!(kept.entries.iter().all(|(hkl, _)| hkl[0] <= 2));
    }
}
