//! 诊断
//!
//! 只读检查（位置、电压）给操作员提供参考，控制循环本身不使用这些结果。
//! 失败以 `Err` 返回给调用方报告，不会升级为 teardown。
//!
//! `probe_joint` / `blink_led` 来自单关节排障流程，会写入寄存器，需要会话已使能。

use crate::control::pacer::Pacer;
use crate::RobotError;
use crate::session::ArmSession;
use koch_bus::ActuatorBus;
use koch_protocol::{
    Joint, JointVector, LOW_VOLTAGE_THRESHOLD_DECIVOLTS, Register, decivolts_to_volts,
};
use std::time::Duration;
use tracing::{info, warn};

/// 检查结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Verdict {
    Ok,
    Warn,
}

/// 电压检查报告
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct VoltageReport {
    /// 每个关节的读数（0.1V 单位）
    pub readings: JointVector,
    pub threshold: i32,
    pub verdict: Verdict,
    /// 低于阈值的关节
    pub low_joints: Vec<Joint>,
}

impl VoltageReport {
    pub fn from_readings(readings: JointVector, threshold: i32) -> Self {
        let low_joints: Vec<Joint> = readings
            .joints()
            .filter(|(_, value)| *value < threshold)
            .map(|(joint, _)| joint)
            .collect();
        let verdict = if low_joints.is_empty() {
            Verdict::Ok
        } else {
            Verdict::Warn
        };
        Self {
            readings,
            threshold,
            verdict,
            low_joints,
        }
    }

    pub fn volts(&self, joint: Joint) -> f64 {
        decivolts_to_volts(self.readings[joint])
    }

    pub fn min_volts(&self) -> f64 {
        decivolts_to_volts(self.readings.iter().copied().min().unwrap_or_default())
    }
}

/// 检查所有关节的输入电压（阈值 11.0V）
pub fn check_voltage<B: ActuatorBus>(
    session: &mut ArmSession<B>,
) -> Result<VoltageReport, RobotError> {
    check_voltage_with(session, LOW_VOLTAGE_THRESHOLD_DECIVOLTS)
}

pub fn check_voltage_with<B: ActuatorBus>(
    session: &mut ArmSession<B>,
    threshold: i32,
) -> Result<VoltageReport, RobotError> {
    let readings = session.read_voltages()?;
    let report = VoltageReport::from_readings(readings, threshold);
    if report.verdict == Verdict::Warn {
        warn!(arm = session.name(), low = ?report.low_joints, %readings, "Low input voltage");
    }
    Ok(report)
}

/// 位置快照
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PositionReport {
    pub arm: String,
    pub positions: JointVector,
}

pub fn position_report<B: ActuatorBus>(
    session: &mut ArmSession<B>,
) -> Result<PositionReport, RobotError> {
    let positions = session.read_positions()?;
    Ok(PositionReport {
        arm: session.name().to_string(),
        positions,
    })
}

/// 单关节运动探测配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// 每个方向的偏移量
    pub delta: i32,
    /// |实际 - 目标| 小于该值即通过
    pub tolerance: i32,
    /// 每次移动后的等待时间
    pub settle: Duration,
    /// 回到起点后的等待时间
    pub return_settle: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            delta: 500,
            tolerance: 50,
            settle: Duration::from_secs(5),
            return_settle: Duration::from_secs(3),
        }
    }
}

/// 探测的一段移动
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ProbeLeg {
    pub target: i32,
    /// 读回失败时为 `None`
    pub actual: Option<i32>,
    pub passed: bool,
}

/// 单关节探测报告
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ProbeReport {
    pub joint: Joint,
    pub start: i32,
    pub legs: Vec<ProbeLeg>,
}

impl ProbeReport {
    pub fn passed(&self) -> bool {
        !self.legs.is_empty() && self.legs.iter().all(|leg| leg.passed)
    }
}

/// 单关节运动探测：+delta → 读回 → -delta → 读回 → 回到起点
///
/// 目标位置写入失败是致命错误；读回失败只记为该段未通过。
pub fn probe_joint<B: ActuatorBus, P: Pacer>(
    session: &mut ArmSession<B>,
    joint: Joint,
    config: &ProbeConfig,
    pacer: &mut P,
) -> Result<ProbeReport, RobotError> {
    let start = session.read_joint(Register::PresentPosition, joint)?;
    let mut legs = Vec::with_capacity(2);

    for target in [start.saturating_add(config.delta), start.saturating_sub(config.delta)] {
        session.command_joint(joint, target)?;
        pacer.sleep(config.settle);

        let actual = match session.read_joint(Register::PresentPosition, joint) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(%joint, error = %err, "Probe readback failed");
                None
            },
        };
        let passed =
            actual.is_some_and(|value| value.abs_diff(target) < config.tolerance.unsigned_abs());
        info!(%joint, target, ?actual, passed, "Probe leg");
        legs.push(ProbeLeg {
            target,
            actual,
            passed,
        });
    }

    session.command_joint(joint, start)?;
    pacer.sleep(config.return_settle);

    Ok(ProbeReport { joint, start, legs })
}

/// 点亮 LED，保持 `hold` 后熄灭
pub fn blink_led<B: ActuatorBus, P: Pacer>(
    session: &mut ArmSession<B>,
    joint: Joint,
    hold: Duration,
    pacer: &mut P,
) -> Result<(), RobotError> {
    session.set_led(joint, true)?;
    pacer.sleep(hold);
    session.set_led(joint, false)?;
    pacer.sleep(hold);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voltage_warn_lists_low_joints() {
        let readings = JointVector::new([120, 105, 130, 140, 115, 125]);
        let report = VoltageReport::from_readings(readings, 110);
        assert_eq!(report.verdict, Verdict::Warn);
        assert_eq!(report.low_joints, vec![Joint::ShoulderLift]);
        assert_eq!(report.min_volts(), 10.5);
    }

    #[test]
    fn test_voltage_ok_at_threshold() {
        let report = VoltageReport::from_readings(JointVector::splat(110), 110);
        assert_eq!(report.verdict, Verdict::Ok);
        assert!(report.low_joints.is_empty());
        assert_eq!(report.volts(Joint::Gripper), 11.0);
    }

    #[test]
    fn test_probe_report_passed() {
        let leg = |passed| ProbeLeg {
            target: 0,
            actual: Some(0),
            passed,
        };
        let report = ProbeReport {
            joint: Joint::ElbowFlex,
            start: 0,
            legs: vec![leg(true), leg(false)],
        };
        assert!(!report.passed());

        let report = ProbeReport {
            legs: vec![leg(true), leg(true)],
            ..report
        };
        assert!(report.passed());
    }
}
