//! 诊断命令：位置、电压、单关节探测、LED

use super::{AppContext, ArmSelect, OutputFormat};
use crate::runtime::{self, CliBus};
use crate::safety::{Confirmation, TorqueGate};
use anyhow::{Context, Result, bail};
use clap::Args;
use koch_client::control::SpinPacer;
use koch_client::diagnostics::{self, PositionReport, ProbeReport, VoltageReport};
use koch_client::{ArmSession, Outcome, ProbeConfig, RobotError, Verdict, supervise};
use koch_protocol::{Joint, OperatingMode, decivolts_to_volts};
use std::time::Duration;

fn open(ctx: &AppContext, arm: ArmSelect) -> Result<ArmSession<CliBus>> {
    match arm {
        ArmSelect::Leader => runtime::leader_session(&ctx.config),
        ArmSelect::Follower => runtime::follower_session(&ctx.config, None),
    }
}

/// 连接 → 执行只读检查 → teardown
///
/// 诊断失败只报告，不会升级为故障处理之外的动作。
fn inspect<T>(
    session: &mut ArmSession<CliBus>,
    body: impl FnOnce(&mut ArmSession<CliBus>) -> Result<T, RobotError>,
) -> Result<T> {
    session
        .connect()
        .with_context(|| format!("连接 {} 失败", session.name()))?;
    let supervised = supervise(session, body);
    if !supervised.teardown.is_clean() {
        eprintln!("⚠️  断开连接未完全成功: {}", supervised.teardown);
    }
    Ok(supervised.result?)
}

pub fn print_positions(report: &PositionReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Table => {
            println!("📊 {} 关节位置:", report.arm);
            for (joint, value) in report.positions.joints() {
                println!("  {:<14} {:>6}", joint, value);
            }
        },
    }
    Ok(())
}

fn print_voltage(arm: &str, report: &VoltageReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Table => {
            println!("🔋 {} 输入电压:", arm);
            for (joint, value) in report.readings.joints() {
                let mark = if report.low_joints.contains(&joint) { "⚠️" } else { "✅" };
                println!("  {:<14} {:>5.1} V  {}", joint, decivolts_to_volts(value), mark);
            }
            match report.verdict {
                Verdict::Ok => println!("结论: OK"),
                Verdict::Warn => println!(
                    "结论: WARN（低于 {:.1} V: {}）",
                    decivolts_to_volts(report.threshold),
                    report
                        .low_joints
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            }
        },
    }
    Ok(())
}

/// 位置查询命令参数
#[derive(Args, Debug)]
pub struct PositionCommand {
    /// 机械臂
    #[arg(short, long, value_enum, default_value_t = ArmSelect::Follower)]
    pub arm: ArmSelect,

    /// 输出格式
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

impl PositionCommand {
    pub fn execute(&self, ctx: &AppContext) -> Result<()> {
        let mut session = open(ctx, self.arm)?;
        let report = inspect(&mut session, diagnostics::position_report)?;
        print_positions(&report, self.format)
    }
}

/// 电压检查命令参数
#[derive(Args, Debug)]
pub struct VoltageCommand {
    /// 机械臂
    #[arg(short, long, value_enum, default_value_t = ArmSelect::Follower)]
    pub arm: ArmSelect,

    /// 输出格式
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

impl VoltageCommand {
    pub fn execute(&self, ctx: &AppContext) -> Result<()> {
        let threshold = ctx.config.safety.voltage.low_threshold_decivolts;
        let mut session = open(ctx, self.arm)?;
        let name = session.name().to_string();
        let report = inspect(&mut session, |s| diagnostics::check_voltage_with(s, threshold))?;
        print_voltage(&name, &report, self.format)
    }
}

/// 单关节探测命令参数
#[derive(Args, Debug)]
pub struct ProbeCommand {
    /// 关节名称（如 elbow_flex）
    #[arg(short, long, default_value = "elbow_flex")]
    pub joint: Joint,

    /// 每个方向的偏移量
    #[arg(short, long, default_value_t = 500)]
    pub delta: i32,

    /// 通过阈值
    #[arg(short, long, default_value_t = 50)]
    pub tolerance: i32,

    /// 每次移动后的等待时间（秒，回到起点后同样等待）
    #[arg(long, default_value_t = 5.0)]
    pub settle: f64,

    /// 探测前把该关节切换到位置控制模式
    #[arg(long)]
    pub position_mode: bool,
}

impl ProbeCommand {
    pub fn execute(&self, ctx: &AppContext) -> Result<()> {
        if self.delta <= 0 || self.tolerance <= 0 {
            bail!("delta 和 tolerance 必须为正数");
        }
        let settle = Duration::try_from_secs_f64(self.settle).context("无效的等待时间")?;
        let probe = ProbeConfig {
            delta: self.delta,
            tolerance: self.tolerance,
            settle,
            return_settle: settle,
        };

        let mut session = runtime::follower_session(&ctx.config, None)?;
        println!("🔌 连接从动臂 ({})...", ctx.config.follower.port);
        session.connect().context("连接从动臂失败")?;

        let gate = TorqueGate::new(ctx.config.safety.confirmation.clone(), ctx.assume_yes);
        let confirmation = gate.confirm(
            "确认 12V 电源已连接，机械臂周围没有障碍物",
            &format!("{} 将移动 ±{}", self.joint, self.delta),
        )?;

        let joint = self.joint;
        let position_mode = self.position_mode;
        let supervised = supervise(&mut session, |session| {
            if confirmation == Confirmation::Declined {
                return Ok(Outcome::Declined);
            }
            session.enable()?;
            if position_mode {
                session.reconfigure_operating_mode(joint, OperatingMode::Position)?;
            }
            diagnostics::probe_joint(session, joint, &probe, &mut SpinPacer::new())
                .map(Outcome::Completed)
        });

        let passed = supervised
            .result
            .as_ref()
            .ok()
            .and_then(|outcome| outcome.value())
            .map(ProbeReport::passed);
        runtime::finish(supervised, print_probe)?;

        if passed == Some(false) {
            bail!("{} 未到达目标位置", joint);
        }
        Ok(())
    }
}

fn print_probe(report: &ProbeReport) {
    println!("🔍 {} 起始位置 {}", report.joint, report.start);
    for leg in &report.legs {
        match leg.actual {
            Some(actual) => println!(
                "  目标 {:>6}  实际 {:>6}  {}",
                leg.target,
                actual,
                if leg.passed { "✅" } else { "❌" }
            ),
            None => println!("  目标 {:>6}  读取失败  ❌", leg.target),
        }
    }
}

/// LED 闪烁命令参数
#[derive(Args, Debug)]
pub struct BlinkCommand {
    /// 关节名称
    #[arg(short, long, default_value = "elbow_flex")]
    pub joint: Joint,

    /// 机械臂
    #[arg(short, long, value_enum, default_value_t = ArmSelect::Follower)]
    pub arm: ArmSelect,

    /// 点亮时长（秒）
    #[arg(long, default_value_t = 1.0)]
    pub hold: f64,
}

impl BlinkCommand {
    pub fn execute(&self, ctx: &AppContext) -> Result<()> {
        let hold = Duration::try_from_secs_f64(self.hold).context("无效的点亮时长")?;
        let mut session = open(ctx, self.arm)?;
        let joint = self.joint;
        inspect(&mut session, |s| {
            diagnostics::blink_led(s, joint, hold, &mut SpinPacer::new())
        })?;
        println!("✅ {} LED 控制正常", joint);
        Ok(())
    }
}
