//! # Koch Protocol
//!
//! Koch 机械臂的关节与寄存器定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `joint`: 关节枚举和关节向量
//! - `register`: 控制表寄存器、关节选择器、寄存器值
//!
//! ## 单位
//!
//! 位置使用电机原始刻度（XL330/XL430 为 0-4095 一圈），
//! 电压使用 0.1V 为单位的整数（110 = 11.0V）。

pub mod joint;
pub mod register;

pub use joint::*;
pub use register::*;

use thiserror::Error;

/// 输入电压告警阈值（0.1V 单位，110 = 11.0V）
pub const LOW_VOLTAGE_THRESHOLD_DECIVOLTS: i32 = 110;

/// 协议层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown joint name: {0}")]
    UnknownJoint(String),

    #[error("Unknown register name: {0}")]
    UnknownRegister(String),

    #[error("Invalid operating mode value: {0}")]
    InvalidOperatingMode(i32),

    #[error("Joint vector length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Register value shape mismatch: expected {expected}")]
    ShapeMismatch { expected: &'static str },
}

/// 把 0.1V 单位的原始读数转换为伏特
#[inline]
pub fn decivolts_to_volts(raw: i32) -> f64 {
    raw as f64 / 10.0
}
