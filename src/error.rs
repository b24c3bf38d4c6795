//! # 统一错误处理模块
//!
//! 定义 panelsim 的所有错误类型，使用 `thiserror` 派生。
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 包装 `hdf5`, `serde_json`, `toml` 的错误

use thiserror::Error;

/// panelsim 统一错误类型
#[derive(Error, Debug)]
pub enum PanelsimError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // 解析错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to parse {format} file: {path} (line {line})\nReason: {reason}")]
    ParseError {
        format: String,
        path: String,
        line: usize,
        reason: String,
    },

    #[error("Invalid config file: {path}\nReason: {reason}")]
    ConfigError { path: String, reason: String },

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // 几何 / 模型错误
    // ─────────────────────────────────────────────────────────────
    #[error("Geometry conversion failed for panel '{panel}': {reason}")]
    ConversionError { panel: String, reason: String },

    #[error("Invalid detector model: {0}")]
    InvalidDetector(String),

    #[error("Invalid crystal model: {0}")]
    InvalidCrystal(String),

    // ─────────────────────────────────────────────────────────────
    // HDF5 错误
    // ─────────────────────────────────────────────────────────────
    #[error("HDF5 error: {0}")]
    Hdf5Error(#[from] hdf5::Error),

    #[error("Maximum number of images is {max}")]
    ImageIndexOutOfBounds { max: usize },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    // ─────────────────────────────────────────────────────────────
    // 外部命令错误
    // ─────────────────────────────────────────────────────────────
    #[error("External command '{command}' not found in PATH")]
    CommandNotFound { command: String },

    #[error("External command failed: {command}\n{stderr}")]
    CommandFailed { command: String, stderr: String },

    // ─────────────────────────────────────────────────────────────
    // 参数错误
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ─────────────────────────────────────────────────────────────
    // 其他
    // ─────────────────────────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, PanelsimError>;
