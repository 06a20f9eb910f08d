//! # Koch CLI
//!
//! Koch 主从机械臂命令行工具。
//!
//! 所有会使能力矩的命令都遵循同一个生命周期：
//! 连接 → 确认 → 使能 → 执行 → 失能 → 断开。
//! 无论正常结束、Ctrl+C 还是出错，退出前都会失能。
//!
//! ```bash
//! # 写入默认配置
//! koch-cli config init
//!
//! # 只读检查
//! koch-cli check
//! koch-cli voltage --arm follower
//!
//! # 遥操作 / 回放 / 单步
//! koch-cli teleop --duration 30
//! koch-cli play wave
//! koch-cli step
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;
mod console;
mod runtime;
mod safety;

use commands::{
    AppContext, BlinkCommand, CheckCommand, ConfigCommand, PlayCommand, PositionCommand,
    ProbeCommand, SequencesCommand, StepCommand, TeleopCommand, ValidateCommand, VoltageCommand,
};
use config::CliConfig;

/// Koch CLI - 主从机械臂命令行工具
#[derive(Parser, Debug)]
#[command(name = "koch-cli")]
#[command(about = "Command-line interface for Koch leader/follower arms", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 ~/.config/koch/config.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 跳过所有确认提示
    #[arg(short = 'y', long = "yes", global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 连接检查（只读）
    Check(CheckCommand),

    /// 遥操作：从动臂跟随主动臂
    Teleop(TeleopCommand),

    /// 回放命名序列
    Play(PlayCommand),

    /// 列出可用序列
    Sequences(SequencesCommand),

    /// 校验编舞文件
    Validate(ValidateCommand),

    /// 交互式单步控制
    Step(StepCommand),

    /// 检查输入电压
    Voltage(VoltageCommand),

    /// 查询当前关节位置
    Position(PositionCommand),

    /// 单关节运动探测
    Probe(ProbeCommand),

    /// 闪烁关节 LED
    Blink(BlinkCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    let directive = "koch_cli=info"
        .parse::<tracing_subscriber::filter::Directive>()
        .context("无效的日志过滤指令")?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => CliConfig::default_path()?,
    };
    // init/path 不依赖现有文件的内容
    let config = match &cli.command {
        Commands::Config(ConfigCommand::Init { .. } | ConfigCommand::Path) => CliConfig::default(),
        _ => CliConfig::load(&config_path)?,
    };
    let ctx = AppContext {
        config,
        config_path,
        assume_yes: cli.yes,
    };

    match cli.command {
        Commands::Config(cmd) => cmd.execute(&ctx),
        Commands::Check(cmd) => cmd.execute(&ctx),
        Commands::Teleop(cmd) => cmd.execute(&ctx).await,
        Commands::Play(cmd) => cmd.execute(&ctx).await,
        Commands::Sequences(cmd) => cmd.execute(&ctx),
        Commands::Validate(cmd) => cmd.execute(&ctx),
        Commands::Step(cmd) => cmd.execute(&ctx).await,
        Commands::Voltage(cmd) => cmd.execute(&ctx),
        Commands::Position(cmd) => cmd.execute(&ctx),
        Commands::Probe(cmd) => cmd.execute(&ctx),
        Commands::Blink(cmd) => cmd.execute(&ctx),
    }
}
