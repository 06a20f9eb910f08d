//! # Koch Tools - 动作程序模型
//!
//! **依赖原则**: 只依赖 `koch-protocol`，不接触总线
//!
//! ## 包含模块
//!
//! - `pose` - 姿态库、基准位置、姿态解析
//! - `sequence` - 动作序列及校验
//! - `choreography` - 编舞文件（TOML）和内置编舞
//! - `safety` - 安全配置（只读结构）

pub mod choreography;
pub mod pose;
pub mod safety;
pub mod sequence;

use thiserror::Error;

// 重新导出常用类型
pub use choreography::Choreography;
pub use pose::{BasePosition, PoseLibrary, Resolution, ValidationWarning};
pub use safety::{ConfirmationSettings, SafetyConfig, VoltageSettings};
pub use sequence::{Sequence, SequenceStep, ValidationReport, Violation};

/// 编舞/配置文件错误
#[derive(Error, Debug)]
pub enum ChoreographyError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Unknown sequence '{name}'. Available: {available}")]
    UnknownSequence { name: String, available: String },

    #[error("Sequence '{name}' is invalid: {details}")]
    InvalidSequence { name: String, details: String },
}
