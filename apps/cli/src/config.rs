//! CLI 配置
//!
//! 配置文件路径：
//! - Linux: `~/.config/koch/config.toml`
//! - macOS: `~/Library/Application Support/koch/config.toml`
//! - Windows: `%APPDATA%\koch\config.toml`
//!
//! 文件不存在时使用默认配置（仿真后端 + Koch v1.1 电机表）。

use koch_bus::SimConfig;
use koch_client::ArmConfig;
use koch_protocol::JointVector;
use koch_tools::{Choreography, SafetyConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot determine the user config directory")]
    NoConfigDir,

    #[error("Failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    #[error("Unknown config key '{0}'")]
    UnknownKey(String),

    #[error("Config file already exists: {0} (use --force to overwrite)")]
    AlreadyExists(String),
}

/// 总线后端
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// 内存仿真控制表
    #[default]
    Sim,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Sim => f.write_str("sim"),
        }
    }
}

/// 仿真后端的初始状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    pub leader_positions: JointVector,
    pub follower_positions: JointVector,
    /// 输入电压（0.1V 单位）
    pub input_voltage: JointVector,
}

impl Default for SimSettings {
    fn default() -> Self {
        let follower = SimConfig::default();
        Self {
            leader_positions: follower.initial_positions,
            follower_positions: follower.initial_positions,
            input_voltage: follower.input_voltage,
        }
    }
}

/// 遥操作设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeleopSettings {
    pub frequency_hz: f64,
    pub duration_secs: f64,
    pub profile_velocity: i32,
}

impl Default for TeleopSettings {
    fn default() -> Self {
        Self {
            frequency_hz: 100.0,
            duration_secs: 30.0,
            profile_velocity: 20,
        }
    }
}

/// 回放设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub profile_velocity: i32,
    /// 开始前先回到基准位置
    pub home_first: bool,
    pub settle_secs: f64,
    /// 回到基准位置后、失能之前的等待时间
    pub return_settle_secs: f64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            profile_velocity: 15,
            home_first: true,
            settle_secs: 2.0,
            return_settle_secs: 2.0,
        }
    }
}

/// 单步模式设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepSettings {
    pub step: i32,
    pub delta: i32,
    pub min_step: i32,
    /// 初始读取失败时使用的目标
    pub fallback_target: JointVector,
}

impl Default for StepSettings {
    fn default() -> Self {
        Self {
            step: 100,
            delta: 50,
            min_step: 50,
            fallback_target: JointVector::new([2000, 1609, 3300, 3148, 1009, 2507]),
        }
    }
}

/// CLI 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub backend: Backend,
    /// 自定义编舞文件；未设置时使用内置编舞
    pub choreography: Option<PathBuf>,
    pub leader: ArmConfig,
    pub follower: ArmConfig,
    pub sim: SimSettings,
    pub teleop: TeleopSettings,
    pub playback: PlaybackSettings,
    pub step: StepSettings,
    pub safety: SafetyConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sim,
            choreography: None,
            leader: ArmConfig::koch_leader("sim://leader"),
            follower: ArmConfig::koch_follower("sim://follower"),
            sim: SimSettings::default(),
            teleop: TeleopSettings::default(),
            playback: PlaybackSettings::default(),
            step: StepSettings::default(),
            safety: SafetyConfig::default(),
        }
    }
}

impl CliConfig {
    /// 默认配置文件路径
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push("koch");
        path.push("config.toml");
        Ok(path)
    }

    /// 加载配置（文件不存在时返回默认配置）
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let content = format!("# Koch CLI configuration\n\n{}", toml::to_string_pretty(self)?);
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// 加载编舞（自定义文件或内置）
    pub fn choreography(&self) -> Result<Choreography, koch_tools::ChoreographyError> {
        match &self.choreography {
            Some(path) => Choreography::load(path),
            None => Ok(Choreography::builtin()),
        }
    }

    /// 读取单个配置项（以 TOML 形式输出）
    pub fn get(&self, key: &str) -> Result<String, ConfigError> {
        let value = toml::Value::try_from(self)?;
        let mut current = &value;
        for part in key.split('.') {
            current = current
                .get(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Ok(match current {
            toml::Value::String(s) => s.clone(),
            toml::Value::Table(_) => toml::to_string_pretty(current)?,
            other => other.to_string(),
        })
    }

    /// 检查配置，返回发现的问题
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for arm in [&self.leader, &self.follower] {
            if let Err(err) = arm.validate() {
                problems.push(err.to_string());
            }
        }
        if self.leader.port == self.follower.port {
            problems.push(format!(
                "leader and follower share the same port '{}'",
                self.leader.port
            ));
        }
        if !self.teleop.frequency_hz.is_finite() || self.teleop.frequency_hz <= 0.0 {
            problems.push(format!(
                "teleop.frequency_hz must be > 0, got {}",
                self.teleop.frequency_hz
            ));
        }
        if !self.teleop.duration_secs.is_finite() || self.teleop.duration_secs < 0.0 {
            problems.push(format!(
                "teleop.duration_secs must be >= 0, got {}",
                self.teleop.duration_secs
            ));
        }
        for (name, secs) in [
            ("playback.settle_secs", self.playback.settle_secs),
            ("playback.return_settle_secs", self.playback.return_settle_secs),
        ] {
            if !secs.is_finite() || secs < 0.0 {
                problems.push(format!("{} must be >= 0, got {}", name, secs));
            }
        }
        for (name, velocity) in [
            ("teleop.profile_velocity", self.teleop.profile_velocity),
            ("playback.profile_velocity", self.playback.profile_velocity),
        ] {
            if velocity < 0 {
                problems.push(format!("{} must be >= 0, got {}", name, velocity));
            }
        }
        if self.step.min_step < 1 || self.step.step < self.step.min_step {
            problems.push(format!(
                "step.step ({}) must be >= step.min_step ({}) >= 1",
                self.step.step, self.step.min_step
            ));
        }
        if self.safety.confirmation.enabled && self.safety.confirmation.phrase.trim().is_empty() {
            problems.push("safety.confirmation.phrase must not be empty".to_string());
        }
        if let Err(err) = self.choreography() {
            problems.push(err.to_string());
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_clean() {
        assert!(CliConfig::default().problems().is_empty());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = CliConfig::load(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = CliConfig::default();
        config.teleop.frequency_hz = 200.0;
        config.follower.port = "sim://other".to_string();
        config.save(&path).unwrap();

        assert_eq!(CliConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[teleop]\nduration_secs = 5.0\n").unwrap();

        let config = CliConfig::load(&path).unwrap();
        assert_eq!(config.teleop.duration_secs, 5.0);
        assert_eq!(config.teleop.frequency_hz, 100.0);
        assert_eq!(config.follower, ArmConfig::koch_follower("sim://follower"));
    }

    #[test]
    fn test_get_nested_key() {
        let config = CliConfig::default();
        assert_eq!(config.get("backend").unwrap(), "sim");
        assert_eq!(config.get("teleop.profile_velocity").unwrap(), "20");
        assert_eq!(config.get("follower.port").unwrap(), "sim://follower");
        assert!(matches!(config.get("nope"), Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn test_problems_reported() {
        let mut config = CliConfig::default();
        config.leader.port = config.follower.port.clone();
        config.teleop.frequency_hz = 0.0;
        config.step.min_step = 0;

        let problems = config.problems();
        assert_eq!(problems.len(), 3);
        assert!(problems[0].contains("same port"));
    }
}
