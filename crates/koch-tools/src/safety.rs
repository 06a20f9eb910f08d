//! # 安全配置
//!
//! 力矩使能前的操作员确认，以及电压告警阈值

use crate::ChoreographyError;
use koch_protocol::LOW_VOLTAGE_THRESHOLD_DECIVOLTS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 安全配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// 确认设置
    pub confirmation: ConfirmationSettings,

    /// 电压设置
    pub voltage: VoltageSettings,
}

impl SafetyConfig {
    /// 从 TOML 文件加载配置
    ///
    /// 配置文件路径：
    /// - Linux/macOS: `~/.config/koch/safety.toml`
    /// - Windows: `%APPDATA%\koch\safety.toml`
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ChoreographyError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ChoreographyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// 保存配置到 TOML 文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ChoreographyError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ChoreographyError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// 输入电压是否低于告警阈值（0.1V 单位）
    pub fn is_low_voltage(&self, decivolts: i32) -> bool {
        decivolts < self.voltage.low_threshold_decivolts
    }
}

/// 确认设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationSettings {
    /// 启用确认（关闭后跳过所有提示，仅用于仿真）
    pub enabled: bool,

    /// 使能力矩前需要输入的确认词
    pub phrase: String,
}

impl Default for ConfirmationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            phrase: "yes".to_string(),
        }
    }
}

impl ConfirmationSettings {
    /// 输入是否与确认词一致（忽略首尾空白和大小写）
    pub fn accepts(&self, input: &str) -> bool {
        input.trim().eq_ignore_ascii_case(self.phrase.trim())
    }
}

/// 电压设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoltageSettings {
    /// 告警阈值（0.1V 单位，110 = 11.0V）
    pub low_threshold_decivolts: i32,
}

impl Default for VoltageSettings {
    fn default() -> Self {
        Self {
            low_threshold_decivolts: LOW_VOLTAGE_THRESHOLD_DECIVOLTS,
        }
    }
}
