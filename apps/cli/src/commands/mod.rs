//! 命令定义和实现

pub mod check;
pub mod config;
pub mod diagnose;
pub mod play;
pub mod sequences;
pub mod step;
pub mod teleop;

pub use check::CheckCommand;
pub use config::ConfigCommand;
pub use diagnose::{BlinkCommand, PositionCommand, ProbeCommand, VoltageCommand};
pub use play::PlayCommand;
pub use sequences::{SequencesCommand, ValidateCommand};
pub use step::StepCommand;
pub use teleop::TeleopCommand;

use crate::config::CliConfig;
use anyhow::{Context, Result};
use clap::ValueEnum;
use koch_tools::Choreography;
use std::path::{Path, PathBuf};

/// 命令执行上下文
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: CliConfig,
    pub config_path: PathBuf,
    /// 跳过所有确认提示
    pub assume_yes: bool,
}

impl AppContext {
    /// 加载编舞：命令行指定的文件优先，其次是配置，最后是内置编舞
    pub fn choreography(&self, path: Option<&Path>) -> Result<Choreography> {
        let choreography = match path {
            Some(path) => Choreography::load(path),
            None => self.config.choreography(),
        };
        choreography.context("无法加载编舞文件")
    }
}

/// 选择机械臂
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ArmSelect {
    Leader,
    Follower,
}

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}
