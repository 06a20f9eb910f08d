//! 连接检查
//!
//! 连接 → 读取位置 → 断开，不使能力矩。

use super::diagnose::print_positions;
use super::{AppContext, ArmSelect, OutputFormat};
use crate::runtime;
use anyhow::{Context, Result};
use clap::Args;
use koch_client::diagnostics;
use koch_client::supervise;

/// 连接检查命令参数
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// 只检查一只机械臂（默认两只都检查）
    #[arg(short, long, value_enum)]
    pub arm: Option<ArmSelect>,
}

impl CheckCommand {
    pub fn execute(&self, ctx: &AppContext) -> Result<()> {
        let arms = match self.arm {
            Some(arm) => vec![arm],
            None => vec![ArmSelect::Leader, ArmSelect::Follower],
        };

        for arm in arms {
            let mut session = match arm {
                ArmSelect::Leader => runtime::leader_session(&ctx.config)?,
                ArmSelect::Follower => runtime::follower_session(&ctx.config, None)?,
            };

            println!("🔌 连接 {} ({})...", session.name(), session.config().arm.port);
            session
                .connect()
                .with_context(|| format!("连接 {} 失败", session.name()))?;
            println!("✅ 连接成功");

            let supervised = supervise(&mut session, diagnostics::position_report);
            let report = supervised.result.context("读取位置失败")?;
            print_positions(&report, OutputFormat::Table)?;

            if supervised.teardown.is_clean() {
                println!("✅ 已断开");
            } else {
                anyhow::bail!("断开连接失败: {}", supervised.teardown);
            }
        }

        Ok(())
    }
}
