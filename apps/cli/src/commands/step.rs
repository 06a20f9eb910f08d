//! 交互式单步命令
//!
//! 每行一个按键命令，一次只移动一个关节。

use super::AppContext;
use crate::console::{self, StepConsole};
use crate::runtime;
use crate::safety::{Confirmation, TorqueGate};
use anyhow::{Context, Result, bail};
use clap::Args;
use koch_client::control::{CancelToken, SpinPacer, StepConfig, StepEvent, StepReport, StepSize, run_step_mode};
use koch_client::{Outcome, Verdict, supervise};
use koch_protocol::decivolts_to_volts;

/// 单步命令参数
#[derive(Args, Debug, Clone)]
pub struct StepCommand {
    /// 初始步长（覆盖配置）
    #[arg(short, long)]
    pub step: Option<i32>,
}

impl StepCommand {
    fn step_config(&self, ctx: &AppContext) -> Result<StepConfig> {
        let settings = &ctx.config.step;
        let value = self.step.unwrap_or(settings.step);
        if value < settings.min_step || settings.delta <= 0 || settings.min_step <= 0 {
            bail!(
                "无效的步长设置: step={} delta={} min_step={}",
                value,
                settings.delta,
                settings.min_step
            );
        }
        Ok(StepConfig {
            step: StepSize::new(value, settings.delta, settings.min_step),
            fallback_target: settings.fallback_target,
            low_voltage_threshold: ctx.config.safety.voltage.low_threshold_decivolts,
            ..Default::default()
        })
    }

    pub async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let step = self.step_config(ctx)?;
        let cancel = runtime::cancel_on_ctrl_c();
        let ctx = ctx.clone();

        runtime::run_blocking(move || Self::step_sync(&ctx, step, cancel)).await
    }

    fn step_sync(ctx: &AppContext, step: StepConfig, cancel: CancelToken) -> Result<()> {
        let config = &ctx.config;
        let mut session = runtime::follower_session(config, None)?;
        println!("🔌 连接从动臂 ({})...", config.follower.port);
        session.connect().context("连接从动臂失败")?;

        let gate = TorqueGate::new(config.safety.confirmation.clone(), ctx.assume_yes);
        let confirmation = gate.confirm(
            "确认 12V 电源已连接，机械臂周围没有障碍物",
            &format!("单步控制，初始步长 {}", step.step.value()),
        )?;

        let supervised = supervise(&mut session, |session| {
            if confirmation == Confirmation::Declined {
                return Ok(Outcome::Declined);
            }
            session.enable()?;

            let history = console::history_path(&ctx.config_path);
            let mut input = StepConsole::spawn(&step.bindings, history, cancel.clone());
            run_step_mode(session, &mut input, &step, &mut SpinPacer::new(), &cancel, print_event)
        });

        runtime::finish(supervised, print_report)
    }
}

fn print_event(event: &StepEvent) {
    match event {
        StepEvent::SeedFallback { error, target } => {
            println!("⚠️  无法读取当前位置（{}），使用后备目标 {}", error, target)
        },
        StepEvent::Seeded { target } => println!("📍 当前位置: {}", target),
        StepEvent::Moved { joint, target } => println!("  {} → {}", joint, target),
        StepEvent::StepChanged { value } => println!("  步长: {}", value),
        StepEvent::StepAtMinimum { min } => println!("  步长已是最小值 {}", min),
        StepEvent::HomeReached { target } => println!("🏠 已回到 home: {}", target),
        StepEvent::Positions(positions) => println!("📊 位置: {}", positions),
        StepEvent::PositionsFailed(error) => println!("❌ 读取位置失败: {}", error),
        StepEvent::Voltage(report) => {
            for (joint, value) in report.readings.joints() {
                println!("  {:<14} {:>5.1} V", joint, decivolts_to_volts(value));
            }
            if report.verdict == Verdict::Warn {
                println!("⚠️  电压偏低，请检查 12V 电源");
            }
        },
        StepEvent::VoltageFailed(error) => println!("❌ 读取电压失败: {}", error),
        StepEvent::Unknown { token, keys } => println!("未知命令 '{}'，可用: {}", token, keys),
    }
}

fn print_report(report: &StepReport) {
    println!(
        "📈 {} 条命令，{} 次写入，最终步长 {}",
        report.commands, report.writes, report.final_step
    );
    println!("📍 最终目标: {}", report.final_target);
}
