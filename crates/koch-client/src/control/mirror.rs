//! 镜像循环（遥操作）
//!
//! 每次迭代：读取主动臂当前位置 → 原样写入从动臂目标位置 → 等待下一个节拍。
//!
//! # 定时策略
//!
//! 固定周期、尽力而为：某次迭代的读写超过周期时立即进入下一次迭代，
//! 并把节拍计划重置为"现在"，不会为了追赶而连续突发（漂移可以容忍，超时不会累积）。
//!
//! # 取消与故障
//!
//! - 取消信号在每次读取主动臂之前检查；已经读取的迭代会完成它的写入
//! - 读或写失败立即中止循环，不重试，错误交给 teardown

use super::cancel::CancelToken;
use super::pacer::Pacer;
use crate::RobotError;
use crate::session::{ArmSession, Outcome};
use koch_bus::ActuatorBus;
use koch_protocol::JointVector;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// 镜像循环配置
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorConfig {
    /// 命令频率（Hz）
    pub frequency_hz: f64,
    /// 总时长；`None` 表示一直运行到取消
    pub duration: Option<Duration>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 100.0,
            duration: Some(Duration::from_secs(30)),
        }
    }
}

/// 最低命令频率（周期 100 秒）
pub const MIN_FREQUENCY_HZ: f64 = 0.01;

impl MirrorConfig {
    /// 计划迭代次数 `ceil(T·F)`；无限运行时返回 `None`
    ///
    /// 整数频率按纳秒精确计算；其他频率在取整前去掉浮点误差。
    pub fn planned_iterations(&self) -> Option<u64> {
        self.duration.map(|t| {
            let nanos = t.as_nanos();
            let hz = self.frequency_hz;
            if hz.fract() == 0.0 && hz >= 1.0 && hz <= f64::from(u32::MAX) {
                let iterations = (nanos * hz as u128).div_ceil(1_000_000_000);
                u64::try_from(iterations).unwrap_or(u64::MAX)
            } else {
                let exact = nanos as f64 * hz / 1e9;
                (exact - exact.abs() * 1e-12).ceil() as u64
            }
        })
    }

    /// 节拍周期；频率需先通过 [`MirrorConfig::validate`]
    pub fn period(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.frequency_hz).unwrap_or(Duration::MAX)
    }

    pub fn validate(&self) -> Result<(), RobotError> {
        if !self.frequency_hz.is_finite() || self.frequency_hz < MIN_FREQUENCY_HZ {
            return Err(RobotError::Config(format!(
                "Invalid frequency_hz: {} (must be >= {})",
                self.frequency_hz, MIN_FREQUENCY_HZ
            )));
        }
        if self.frequency_hz > 1000.0 {
            warn!(
                "Very high mirror frequency: {} Hz. The bus may not keep up.",
                self.frequency_hz
            );
        }
        Ok(())
    }
}

/// 进度（每次迭代写入完成后回调）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorProgress {
    /// 已完成的迭代数（从 1 开始）
    pub iteration: u64,
    pub planned: Option<u64>,
    /// 本次迭代写入的位置
    pub position: JointVector,
}

/// 镜像循环报告
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorReport {
    pub iterations: u64,
    pub planned: Option<u64>,
    /// 读写耗时超过周期的次数
    pub overruns: u64,
    pub elapsed: Duration,
}

/// 运行镜像循环
///
/// 主动臂只需处于 Connected；从动臂必须已使能力矩。
pub fn run_mirror<L, F, P, C>(
    leader: &mut ArmSession<L>,
    follower: &mut ArmSession<F>,
    config: &MirrorConfig,
    pacer: &mut P,
    cancel: &CancelToken,
    mut on_progress: C,
) -> Result<Outcome<MirrorReport>, RobotError>
where
    L: ActuatorBus,
    F: ActuatorBus,
    P: Pacer,
    C: FnMut(&MirrorProgress),
{
    config.validate()?;

    let planned = config.planned_iterations();
    let period = config.period();
    let start = pacer.now();
    let mut next_tick = start;
    let mut iterations = 0u64;
    let mut overruns = 0u64;
    let mut cancelled = false;

    info!(
        frequency_hz = config.frequency_hz,
        planned = ?planned,
        "Mirror loop started"
    );

    loop {
        if let Some(max) = planned
            && iterations >= max
        {
            break;
        }
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        let position = leader.read_positions()?;
        follower.command_positions(&position)?;
        iterations += 1;
        trace!(iteration = iterations, %position, "mirror");

        on_progress(&MirrorProgress {
            iteration: iterations,
            planned,
            position,
        });

        next_tick = next_tick.checked_add(period).ok_or_else(|| {
            RobotError::Config(format!("Mirror period {:?} overflows the clock", period))
        })?;
        let now = pacer.now();
        if now > next_tick {
            overruns += 1;
            debug!(
                iteration = iterations,
                late_us = (now - next_tick).as_micros() as u64,
                "Mirror iteration overran its period"
            );
            next_tick = now;
        } else {
            pacer.sleep_until(next_tick);
        }
    }

    let report = MirrorReport {
        iterations,
        planned,
        overruns,
        elapsed: pacer.now() - start,
    };

    if overruns > 0 {
        warn!(overruns, iterations, "Mirror loop overran some periods");
    }

    if cancelled {
        info!(iterations, "Mirror loop cancelled");
        Ok(Outcome::Cancelled(report))
    } else {
        info!(iterations, "Mirror loop completed");
        Ok(Outcome::Completed(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planned_iterations_ceil() {
        let config = MirrorConfig {
            frequency_hz: 200.0,
            duration: Some(Duration::from_secs(30)),
        };
        assert_eq!(config.planned_iterations(), Some(6000));

        let config = MirrorConfig {
            frequency_hz: 3.0,
            duration: Some(Duration::from_millis(1100)),
        };
        assert_eq!(config.planned_iterations(), Some(4));

        let config = MirrorConfig {
            frequency_hz: 100.0,
            duration: None,
        };
        assert_eq!(config.planned_iterations(), None);
    }

    #[test]
    fn test_planned_iterations_exact_for_decimal_durations() {
        for (hz, millis, expected) in [
            (50.0, 140, 7),
            (30.0, 8300, 249),
            (100.0, 100, 10),
            (200.0, 1, 1),
            (2.5, 4000, 10),
            (0.5, 3000, 2),
        ] {
            let config = MirrorConfig {
                frequency_hz: hz,
                duration: Some(Duration::from_millis(millis)),
            };
            assert_eq!(config.planned_iterations(), Some(expected), "{hz} Hz for {millis} ms");
        }
    }

    #[test]
    fn test_default_matches_teleop() {
        let config = MirrorConfig::default();
        assert_eq!(config.planned_iterations(), Some(3000));
        assert_eq!(config.period(), Duration::from_millis(10));
    }

    #[test]
    fn test_invalid_frequency() {
        let config = MirrorConfig {
            frequency_hz: 0.0,
            duration: None,
        };
        assert!(matches!(config.validate(), Err(RobotError::Config(_))));
    }

    #[test]
    fn test_tiny_frequency_rejected() {
        for hz in [1e-30, 1e-5, f64::NAN, f64::INFINITY] {
            let config = MirrorConfig {
                frequency_hz: hz,
                duration: None,
            };
            assert!(matches!(config.validate(), Err(RobotError::Config(_))), "{hz}");
        }

        let slowest = MirrorConfig {
            frequency_hz: MIN_FREQUENCY_HZ,
            duration: None,
        };
        assert!(slowest.validate().is_ok());
        assert_eq!(slowest.period(), Duration::from_secs(100));
    }
}
