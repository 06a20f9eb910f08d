//! 配置管理命令

use super::AppContext;
use crate::config::{CliConfig, ConfigError};
use anyhow::{Result, bail};
use clap::Subcommand;

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 写入默认配置文件
    Init {
        /// 覆盖已存在的文件
        #[arg(long)]
        force: bool,
    },

    /// 获取配置项（点号分隔，如 teleop.frequency_hz）
    Get {
        /// 配置项名称
        #[arg(default_value = "all")]
        key: String,
    },

    /// 检查配置
    Check,

    /// 显示配置文件路径
    Path,
}

impl ConfigCommand {
    pub fn execute(self, ctx: &AppContext) -> Result<()> {
        match self {
            ConfigCommand::Init { force } => {
                if ctx.config_path.exists() && !force {
                    return Err(
                        ConfigError::AlreadyExists(ctx.config_path.display().to_string()).into(),
                    );
                }
                CliConfig::default().save(&ctx.config_path)?;
                println!("✅ 已写入默认配置: {}", ctx.config_path.display());
            },

            ConfigCommand::Get { key } => {
                if key == "all" {
                    print!("{}", toml::to_string_pretty(&ctx.config)?);
                } else {
                    println!("{}", ctx.config.get(&key)?);
                }
            },

            ConfigCommand::Check => {
                let source = if ctx.config_path.exists() {
                    ctx.config_path.display().to_string()
                } else {
                    format!("{} (不存在，使用默认配置)", ctx.config_path.display())
                };
                println!("配置文件: {}", source);
                println!("  后端: {}", ctx.config.backend);
                println!("  主动臂: {}", ctx.config.leader.port);
                println!("  从动臂: {}", ctx.config.follower.port);

                let problems = ctx.config.problems();
                if !problems.is_empty() {
                    for problem in &problems {
                        eprintln!("❌ {}", problem);
                    }
                    bail!("配置检查失败（{} 个问题）", problems.len());
                }
                println!("✅ 配置有效");
            },

            ConfigCommand::Path => {
                println!("{}", ctx.config_path.display());
            },
        }

        Ok(())
    }
}
