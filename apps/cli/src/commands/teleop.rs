//! 遥操作命令
//!
//! 从动臂以固定频率跟随主动臂。主动臂只读，从不使能力矩。

use super::diagnose::print_positions;
use super::{AppContext, OutputFormat};
use crate::config::CliConfig;
use crate::runtime;
use crate::safety::{Confirmation, TorqueGate};
use anyhow::{Context, Result};
use clap::Args;
use koch_client::control::{CancelToken, MirrorConfig, MirrorReport, SpinPacer, run_mirror};
use koch_client::diagnostics::position_report;
use koch_client::{Outcome, supervise};
use std::time::Duration;

/// 遥操作命令参数
#[derive(Args, Debug, Clone)]
pub struct TeleopCommand {
    /// 命令频率（Hz，覆盖配置）
    #[arg(short, long)]
    pub frequency: Option<f64>,

    /// 运行时长（秒，覆盖配置）
    #[arg(short, long, conflicts_with = "forever")]
    pub duration: Option<f64>,

    /// 一直运行直到 Ctrl+C
    #[arg(long)]
    pub forever: bool,
}

impl TeleopCommand {
    fn mirror_config(&self, config: &CliConfig) -> Result<MirrorConfig> {
        let frequency_hz = self.frequency.unwrap_or(config.teleop.frequency_hz);
        let duration = if self.forever {
            None
        } else {
            let secs = self.duration.unwrap_or(config.teleop.duration_secs);
            Some(Duration::try_from_secs_f64(secs).context("无效的运行时长")?)
        };
        let mirror = MirrorConfig {
            frequency_hz,
            duration,
        };
        mirror.validate()?;
        Ok(mirror)
    }

    pub async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let mirror = self.mirror_config(&ctx.config)?;
        let cancel = runtime::cancel_on_ctrl_c();
        let ctx = ctx.clone();

        println!("💡 提示: 按 Ctrl+C 可随时停止");
        runtime::run_blocking(move || Self::teleop_sync(&ctx, mirror, cancel)).await
    }

    fn teleop_sync(ctx: &AppContext, mirror: MirrorConfig, cancel: CancelToken) -> Result<()> {
        let config = &ctx.config;
        let mut pair = runtime::arm_pair(config, Some(config.teleop.profile_velocity))?;

        println!(
            "🔌 连接主动臂 ({}) 和从动臂 ({})...",
            config.leader.port, config.follower.port
        );
        pair.connect().context("连接失败")?;
        println!("✅ 连接成功");

        // 只读快照，失败不影响后续步骤
        for report in [position_report(pair.leader_mut()), position_report(pair.follower_mut())] {
            match report {
                Ok(report) => print_positions(&report, OutputFormat::Table)?,
                Err(err) => eprintln!("⚠️  无法读取初始位置: {}", err),
            }
        }

        let gate = TorqueGate::new(config.safety.confirmation.clone(), ctx.assume_yes);
        let action = match mirror.duration {
            Some(duration) => format!(
                "从动臂以 {} Hz 跟随主动臂 {:.1} 秒",
                mirror.frequency_hz,
                duration.as_secs_f64()
            ),
            None => format!("从动臂以 {} Hz 跟随主动臂，直到 Ctrl+C", mirror.frequency_hz),
        };
        let confirmation = gate.confirm("请将主动臂摆放到与从动臂相近的姿态", &action)?;

        let report_every = mirror.frequency_hz.ceil().max(1.0) as u64;
        let supervised = supervise(&mut pair, |pair| {
            if confirmation == Confirmation::Declined {
                return Ok(Outcome::Declined);
            }

            let (leader, follower) = pair.split_mut();
            follower.enable()?;
            println!("🤖 遥操作中...");

            run_mirror(
                leader,
                follower,
                &mirror,
                &mut SpinPacer::new(),
                &cancel,
                |progress| {
                    if progress.iteration % report_every == 0 {
                        match progress.planned {
                            Some(planned) => {
                                println!("  ⏱ {}/{}  {}", progress.iteration, planned, progress.position)
                            },
                            None => println!("  ⏱ {}  {}", progress.iteration, progress.position),
                        }
                    }
                },
            )
        });

        runtime::finish(supervised, print_report)
    }
}

fn print_report(report: &MirrorReport) {
    println!(
        "📈 迭代 {} 次，用时 {:.1} 秒，超时 {} 次",
        report.iterations,
        report.elapsed.as_secs_f64(),
        report.overruns
    );
}
