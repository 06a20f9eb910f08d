//! 序列回放
//!
//! 对每一步：解析绝对目标位置 → 一次全向量目标位置写入 → 保持 `duration`。
//! 关节如何在两次写入之间运动由舵机自身的轮廓速度决定，这里不插值。
//!
//! 完成或取消后写回基准位置并等待 `return_settle`，再交给 teardown 失能。
//! 写入失败时中止剩余步骤，仍尽力写回基准位置，然后把原始错误交给 teardown。

use super::cancel::CancelToken;
use super::pacer::Pacer;
use crate::RobotError;
use crate::session::{ArmSession, Outcome};
use koch_bus::ActuatorBus;
use koch_protocol::JointVector;
use koch_tools::{BasePosition, PoseLibrary, Sequence, ValidationWarning};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 回放配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackConfig {
    /// 开始前先写入基准位置并等待 `settle`
    pub home_first: bool,
    pub settle: Duration,
    /// 写回基准位置后、失能之前的等待时间（不可取消）
    pub return_settle: Duration,
    /// 保持期间检查取消的间隔
    pub hold_slice: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            home_first: false,
            settle: Duration::from_secs(2),
            return_settle: Duration::from_secs(2),
            hold_slice: Duration::from_millis(50),
        }
    }
}

/// 进度（每一步写入后回调）
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackProgress<'a> {
    /// 当前步骤（从 1 开始）
    pub step: usize,
    pub total: usize,
    pub pose: &'a str,
    pub target: JointVector,
    pub hold: Duration,
}

/// 回放报告
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackReport {
    pub steps_executed: usize,
    pub steps_total: usize,
    pub warnings: Vec<ValidationWarning>,
    /// 各步骤实际保持时间之和（不含 settle）
    pub held: Duration,
    pub returned_to_base: bool,
}

/// 回放序列
///
/// 序列有违规（非正时长等）时在任何总线操作之前拒绝。
#[allow(clippy::too_many_arguments)]
pub fn play_sequence<B, P, C>(
    session: &mut ArmSession<B>,
    library: &PoseLibrary,
    base: &BasePosition,
    sequence: &Sequence,
    config: &PlaybackConfig,
    pacer: &mut P,
    cancel: &CancelToken,
    mut on_progress: C,
) -> Result<Outcome<PlaybackReport>, RobotError>
where
    B: ActuatorBus,
    P: Pacer,
    C: FnMut(&PlaybackProgress<'_>),
{
    let validation = sequence.validate(library);
    if !validation.is_ok() {
        return Err(RobotError::InvalidSequence {
            details: validation
                .violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        });
    }

    let mut report = PlaybackReport {
        steps_total: sequence.len(),
        ..Default::default()
    };
    let mut last_target: Option<JointVector> = None;

    info!(steps = sequence.len(), base = %base, "Sequence playback started");

    let run = run_steps(
        session,
        library,
        base,
        sequence,
        config,
        pacer,
        cancel,
        &mut on_progress,
        &mut report,
        &mut last_target,
    );

    match run {
        Ok(cancelled) => {
            // 最后一次写入已经是基准位置且完整保持过时不再重复写入
            if last_target.as_ref() != Some(base.vector()) {
                session.command_positions(base.vector())?;
                settle_at_base(pacer, config.return_settle);
            } else if cancelled {
                debug!("Last target already equals base position");
                settle_at_base(pacer, config.return_settle);
            } else {
                debug!("Last target already equals base position");
            }
            report.returned_to_base = true;

            if cancelled {
                info!(steps = report.steps_executed, "Sequence playback cancelled");
                Ok(Outcome::Cancelled(report))
            } else {
                info!(steps = report.steps_executed, held = ?report.held, "Sequence playback completed");
                Ok(Outcome::Completed(report))
            }
        },
        Err(err) => {
            if err.is_fatal() {
                match session.command_positions(base.vector()) {
                    Ok(()) => {
                        warn!("Returned to base position after fault");
                        settle_at_base(pacer, config.return_settle);
                    },
                    Err(return_err) => {
                        error!(error = %return_err, "Best-effort return to base failed")
                    },
                }
            }
            Err(err)
        },
    }
}

/// 依次执行各步骤，返回是否被取消
#[allow(clippy::too_many_arguments)]
fn run_steps<B, P, C>(
    session: &mut ArmSession<B>,
    library: &PoseLibrary,
    base: &BasePosition,
    sequence: &Sequence,
    config: &PlaybackConfig,
    pacer: &mut P,
    cancel: &CancelToken,
    on_progress: &mut C,
    report: &mut PlaybackReport,
    last_target: &mut Option<JointVector>,
) -> Result<bool, RobotError>
where
    B: ActuatorBus,
    P: Pacer,
    C: FnMut(&PlaybackProgress<'_>),
{
    if config.home_first {
        session.command_positions(base.vector())?;
        *last_target = Some(*base.vector());
        debug!(settle = ?config.settle, "Moved to base position, settling");
        if hold(pacer, cancel, config.settle, config.hold_slice).1 {
            return Ok(true);
        }
    }

    let total = sequence.len();
    for (index, step) in sequence.steps().iter().enumerate() {
        if cancel.is_cancelled() {
            return Ok(true);
        }

        let resolution = library.resolve(&step.pose, base);
        if let Some(warning) = resolution.warning
            && !report.warnings.contains(&warning)
        {
            report.warnings.push(warning);
        }

        // 校验已保证时长有效
        let duration = step.duration().unwrap_or_default();

        session.command_positions(&resolution.position)?;
        *last_target = Some(resolution.position);
        report.steps_executed += 1;

        on_progress(&PlaybackProgress {
            step: index + 1,
            total,
            pose: &step.pose,
            target: resolution.position,
            hold: duration,
        });

        let (held, cancelled) = hold(pacer, cancel, duration, config.hold_slice);
        report.held += held;
        if cancelled {
            return Ok(true);
        }
    }

    Ok(false)
}

/// 等待关节以轮廓速度回到基准位置，之后才允许失能
fn settle_at_base<P: Pacer>(pacer: &mut P, settle: Duration) {
    if !settle.is_zero() {
        debug!(?settle, "Settling at base position before torque off");
        pacer.sleep(settle);
    }
}

/// 分片保持，返回 (实际保持时间, 是否被取消)
fn hold<P: Pacer>(
    pacer: &mut P,
    cancel: &CancelToken,
    duration: Duration,
    slice: Duration,
) -> (Duration, bool) {
    let slice = if slice.is_zero() { duration } else { slice };
    let mut held = Duration::ZERO;
    while held < duration {
        if cancel.is_cancelled() {
            return (held, true);
        }
        let chunk = slice.min(duration - held);
        pacer.sleep(chunk);
        held += chunk;
    }
    (held, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::pacer::VirtualPacer;

    #[test]
    fn test_hold_exact_duration() {
        let mut pacer = VirtualPacer::new();
        let cancel = CancelToken::new();
        let (held, cancelled) = hold(
            &mut pacer,
            &cancel,
            Duration::from_millis(1500),
            Duration::from_millis(400),
        );
        assert_eq!(held, Duration::from_millis(1500));
        assert!(!cancelled);
        assert_eq!(pacer.elapsed(), Duration::from_millis(1500));
    }

    #[test]
    fn test_hold_observes_cancel() {
        let mut pacer = VirtualPacer::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let (held, cancelled) = hold(
            &mut pacer,
            &cancel,
            Duration::from_secs(3),
            Duration::from_millis(50),
        );
        assert_eq!(held, Duration::ZERO);
        assert!(cancelled);
    }

    #[test]
    fn test_zero_slice_holds_in_one_piece() {
        let mut pacer = VirtualPacer::new();
        let cancel = CancelToken::new();
        let (held, _) = hold(&mut pacer, &cancel, Duration::from_secs(2), Duration::ZERO);
        assert_eq!(held, Duration::from_secs(2));
    }
}
