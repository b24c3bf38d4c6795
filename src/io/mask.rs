//! # 缝隙掩膜读取
//!
//! 从 HDF5 读取二维掩膜，`true` 表示缝隙像素。兼容 h5py 写出的布尔
//! 枚举类型和整数编码（非零即缝隙）。
//!
//! ## 依赖关系
//! - 被 `commands/panelize.rs`, `commands/simulate.rs` 使用
//! - 使用 `hdf5`, `ndarray`

use crate::error::{PanelsimError, Result};

use hdf5::types::TypeDescriptor;
use hdf5::File;
use ndarray::Array2;
use std::path::Path;

pub const DEFAULT_GAP_DATASET: &str = "is_a_gap";

pub fn read_gap_mask(path: &Path, dataset: &str) -> Result<Array2<bool>> {
    if !path.exists() {
        return Err(PanelsimError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let file = File::open(path)?;
    let ds = file.dataset(dataset)?;

    let ndim = ds.ndim();
    if ndim != 2 {
        return Err(PanelsimError::InvalidArgument(format!(
            "Dataset '{}' in {} is {}-dimensional; a 2-D gap mask is required",
            dataset,
            path.display(),
            ndim
        )));
    }

    if let Ok(TypeDescriptor::Boolean) = ds.dtype()?.to_descriptor() {
        return Ok(ds.read_2d::<bool>()?);
    }

    // 整数编码
    let values = ds.read_2d::<i64>()?;
    Ok(values.mapv(|v| v != 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_read_bool_mask() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gaps.h5");
        let mask = array![[true, false, false], [false, false, true]];
        {
            let file = File::create(&path).unwrap();
            file.new_dataset_builder()
                .with_data(&mask)
                .create(DEFAULT_GAP_DATASET)
                .unwrap();
        }
        assert_eq!(read_gap_mask(&path, DEFAULT_GAP_DATASET).unwrap(), mask);
    }

    #[test]
    fn test_read_integer_mask() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gaps_u8.h5");
        let raw: Array2<u8> = array![[0, 2], [1, 0]];
        {
            let file = File::create(&path).unwrap();
            file.new_dataset_builder()
                .with_data(&raw)
                .create("mask")
                .unwrap();
        }
        let mask = read_gap_mask(&path, "mask").unwrap();
        assert_eq!(mask, array![[false, true], [true, false]]);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            read_gap_mask(Path::new("/nonexistent/gaps.h5"), DEFAULT_GAP_DATASET),
            Err(PanelsimError::FileNotFound { .. })
        ));
    }
}
