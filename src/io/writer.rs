//! # 带几何信息的图像写入器
//!
//! 写出形状为 (n_images, panels, slow, fast) 的 `images` 数据集，并把探测器
//! 与光束模型以 dxtbx JSON 字符串存为该数据集的属性，dxtbx 据此重建几何。
//!
//! ## 依赖关系
//! - 被 `sim/pipeline.rs`, `commands/inspect.rs` 使用
//! - 使用 `hdf5`, `ndarray`, `serde_json`

use crate::error::{PanelsimError, Result};
use crate::models::{Beam, Detector};

use hdf5::types::VarLenUnicode;
use hdf5::{Dataset, File};
use ndarray::{s, Array3};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const IMAGES_DATASET: &str = "images";
pub const BEAM_ATTR: &str = "dxtbx_beam_string";
pub const DETECTOR_ATTR: &str = "dxtbx_detector_string";

/// 图像数据的存储精度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    F64,
    F32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterOptions {
    pub storage: StorageType,
    /// deflate 压缩等级 (0-9)
    pub compression: Option<u8>,
}

/// 逐张追加图像的 HDF5 写入器。drop 时文件随之关闭
pub struct GeomImageWriter {
    file: File,
    images: Dataset,
    path: PathBuf,
    image_shape: [usize; 3],
    n_images: usize,
    next_index: usize,
    storage: StorageType,
}

impl GeomImageWriter {
    /// 创建文件、`images` 数据集与几何属性
    pub fn create(
        path: &Path,
        image_shape: [usize; 3],
        n_images: usize,
        detector: &Detector,
        beam: &Beam,
        options: WriterOptions,
    ) -> Result<Self> {
        if detector.len() != image_shape[0] {
            return Err(PanelsimError::ShapeMismatch {
                expected: vec![detector.len()],
                actual: vec![image_shape[0]],
            });
        }

        let file = File::create(path)?;
        let [n_panels, slow, fast] = image_shape;
        let shape = (n_images, n_panels, slow, fast);
        let chunk = (1, n_panels, slow, fast);

        let images = match options.storage {
            StorageType::F64 => {
                let mut builder = file.new_dataset::<f64>().shape(shape).chunk(chunk);
                if let Some(level) = options.compression {
                    builder = builder.deflate(level);
                }
                builder.create(IMAGES_DATASET)?
            }
            StorageType::F32 => {
                let mut builder = file.new_dataset::<f32>().shape(shape).chunk(chunk);
                if let Some(level) = options.compression {
                    builder = builder.deflate(level);
                }
                builder.create(IMAGES_DATASET)?
            }
        };

        set_attr_str(&images, BEAM_ATTR, &serde_json::to_string(beam)?)?;
        set_attr_str(&images, DETECTOR_ATTR, &serde_json::to_string(detector)?)?;

        log::debug!(
            "Created '{}' for {} images of shape {:?}",
            path.display(),
            n_images,
            image_shape
        );

        Ok(GeomImageWriter {
            file,
            images,
            path: path.to_path_buf(),
            image_shape,
            n_images,
            next_index: 0,
            storage: options.storage,
        })
    }

    /// 追加一张 (panels, slow, fast) 图像
    pub fn add_image(&mut self, image: &Array3<f64>) -> Result<()> {
        if self.next_index >= self.n_images {
            return Err(PanelsimError::ImageIndexOutOfBounds { max: self.n_images });
        }
        let (p, s, f) = image.dim();
        if [p, s, f] != self.image_shape {
            return Err(PanelsimError::ShapeMismatch {
                expected: self.image_shape.to_vec(),
                actual: vec![p, s, f],
            });
        }

        let i = self.next_index;
        match self.storage {
            StorageType::F64 => self.images.write_slice(image, s![i, .., .., ..])?,
            StorageType::F32 => {
                let narrowed = image.mapv(|v| v as f32);
                self.images.write_slice(&narrowed, s![i, .., .., ..])?
            }
        }
        self.next_index += 1;
        Ok(())
    }

    pub fn images_written(&self) -> usize {
        self.next_index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 刷新并关闭文件
    pub fn close(self) -> Result<()> {
        if self.next_index < self.n_images {
            log::warn!(
                "Closing '{}' with {} of {} images written",
                self.path.display(),
                self.next_index,
                self.n_images
            );
        }
        self.file.flush()?;
        Ok(())
    }
}

/// 读回写入器产生的文件
pub struct GeomImageReader {
    /// 数据集句柄存活期间文件须保持打开
    _file: File,
    images: Dataset,
}

impl GeomImageReader {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PanelsimError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let file = File::open(path)?;
        let images = file.dataset(IMAGES_DATASET)?;
        Ok(GeomImageReader {
            _file: file,
            images,
        })
    }

    pub fn detector(&self) -> Result<Detector> {
        let json = read_attr_str(&self.images, DETECTOR_ATTR)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn beam(&self) -> Result<Beam> {
        let json = read_attr_str(&self.images, BEAM_ATTR)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn num_images(&self) -> usize {
        self.images.shape().first().copied().unwrap_or(0)
    }

    /// (panels, slow, fast)
    pub fn image_shape(&self) -> Vec<usize> {
        self.images.shape().into_iter().skip(1).collect()
    }

    pub fn read_image(&self, index: usize) -> Result<Array3<f64>> {
        let n = self.num_images();
        if index >= n {
            return Err(PanelsimError::ImageIndexOutOfBounds { max: n });
        }
        Ok(self.images.read_slice::<f64, _, _>(s![index, .., .., ..])?)
    }
}

fn set_attr_str(images: &Dataset, name: &str, value: &str) -> Result<()> {
    let value = VarLenUnicode::from_str(value)
        .map_err(|e| PanelsimError::Other(format!("Invalid attribute string '{}': {}", name, e)))?;
    images
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn read_attr_str(images: &Dataset, name: &str) -> Result<String> {
    let value: VarLenUnicode = images.attr(name)?.read_scalar()?;
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Panel;

    fn two_panel_detector() -> Detector {
        let a = Panel::new("a", [1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [-1.0, 1.0, -100.0], 0.1, [4, 3]);
        let mut b = a.clone();
        b.name = "b".to_string();
        b.origin = [0.5, 1.0, -100.0];
        Detector::from_panels(vec![a, b])
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("images.h5");
        let det = two_panel_detector();
        let beam = Beam::new([0.0, 0.0, 1.0], 1.3);

        let mut writer =
            GeomImageWriter::create(&path, [2, 3, 4], 2, &det, &beam, WriterOptions::default())
                .unwrap();
        let img0 = Array3::from_elem((2, 3, 4), 1.5);
        let img1 = Array3::from_shape_fn((2, 3, 4), |(p, s, f)| (p * 100 + s * 10 + f) as f64);
        writer.add_image(&img0).unwrap();
        writer.add_image(&img1).unwrap();
        assert_eq!(writer.images_written(), 2);
        writer.close().unwrap();

        let reader = GeomImageReader::open(&path).unwrap();
        assert_eq!(reader.num_images(), 2);
        assert_eq!(reader.image_shape(), vec![2, 3, 4]);
        assert_eq!(reader.detector().unwrap(), det);
        assert_eq!(reader.beam().unwrap(), beam);
        assert_eq!(reader.read_image(1).unwrap(), img1);
    }

    #[test]
    fn test_geometry_attributes_live_on_images_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attrs.h5");
        let det = two_panel_detector();
        let beam = Beam::new([0.0, 0.0, 1.0], 1.3);
        GeomImageWriter::create(&path, [2, 3, 4], 1, &det, &beam, WriterOptions::default())
            .unwrap()
            .close()
            .unwrap();

        let file = File::open(&path).unwrap();
        let images = file.dataset(IMAGES_DATASET).unwrap();
        let mut names = images.attr_names().unwrap();
        names.sort();
        assert_eq!(names, vec![BEAM_ATTR.to_string(), DETECTOR_ATTR.to_string()]);
        assert!(file.attr_names().unwrap().is_empty());

        let json: VarLenUnicode = images.attr(DETECTOR_ATTR).unwrap().read_scalar().unwrap();
        let parsed: Detector = serde_json::from_str(json.as_str()).unwrap();
        assert_eq!(parsed, det);
    }

    #[test]
    fn test_too_many_images() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.h5");
        let det = two_panel_detector();
        let beam = Beam::new([0.0, 0.0, 1.0], 1.3);
        let options = WriterOptions {
            storage: StorageType::F32,
            compression: Some(4),
        };

        let mut writer = GeomImageWriter::create(&path, [2, 3, 4], 1, &det, &beam, options).unwrap();
        let img = Array3::zeros((2, 3, 4));
        writer.add_image(&img).unwrap();
        match writer.add_image(&img) {
            Err(PanelsimError::ImageIndexOutOfBounds { max }) => assert_eq!(max, 1),
            other => panic!("unexpected: {:?}", other.err()),
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.h5");
        let det = two_panel_detector();
        let beam = Beam::new([0.0, 0.0, 1.0], 1.3);

        let mut writer =
            GeomImageWriter::create(&path, [2, 3, 4], 1, &det, &beam, WriterOptions::default())
                .unwrap();
        assert!(matches!(
            writer.add_image(&Array3::zeros((2, 4, 3))),
            Err(PanelsimError::ShapeMismatch { .. })
        ));
        assert!(GeomImageWriter::create(&path, [3, 3, 4], 1, &det, &beam, WriterOptions::default())
            .is_err());
    }
}
