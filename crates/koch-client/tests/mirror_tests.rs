//! 镜像循环测试

mod common;

use common::*;
use koch_bus::BusOp;
use koch_client::control::{CancelToken, MirrorConfig, VirtualPacer, run_mirror};
use koch_client::{Outcome, RobotError, supervise};
use koch_protocol::{JointVector, Register};
use std::time::Duration;

fn connected_pair() -> (
    koch_client::ArmSession<koch_bus::MockBus>,
    koch_bus::MockHandle,
    koch_client::ArmSession<koch_bus::MockBus>,
    koch_bus::MockHandle,
) {
    let (mut leader, leader_handle) = leader();
    let (mut follower, follower_handle) = follower();
    leader.connect().unwrap();
    follower.connect().unwrap();
    follower.enable().unwrap();
    follower_handle.clear_ops();
    (leader, leader_handle, follower, follower_handle)
}

#[test]
fn test_follower_receives_leader_readings_in_order() {
    let (mut leader, leader_handle, mut follower, follower_handle) = connected_pair();
    let readings = [
        JointVector::new([2000, 1600, 3100, 3100, 1000, 2500]),
        JointVector::new([2010, 1610, 3110, 3110, 1010, 2510]),
        JointVector::new([2020, 1620, 3120, 3120, 1020, 2520]),
    ];
    leader_handle.push_positions(readings);

    let config = MirrorConfig {
        frequency_hz: 1.0,
        duration: Some(Duration::from_secs(3)),
    };
    let outcome = run_mirror(
        &mut leader,
        &mut follower,
        &config,
        &mut VirtualPacer::new(),
        &CancelToken::new(),
        |_| {},
    )
    .unwrap();

    assert_eq!(outcome.value().map(|r| r.iterations), Some(3));
    assert_eq!(goal_vectors(&follower_handle), readings.to_vec());
    // 主动臂从不被写入
    assert!(leader_handle.writes().is_empty());
}

#[test]
fn test_planned_iteration_count() {
    let (mut leader, leader_handle, mut follower, follower_handle) = connected_pair();
    let config = MirrorConfig {
        frequency_hz: 200.0,
        duration: Some(Duration::from_secs(30)),
    };
    let mut pacer = VirtualPacer::new();

    let outcome = run_mirror(
        &mut leader,
        &mut follower,
        &config,
        &mut pacer,
        &CancelToken::new(),
        |_| {},
    )
    .unwrap();

    let report = match outcome {
        Outcome::Completed(report) => report,
        other => panic!("unexpected outcome {other:?}"),
    };
    assert_eq!(report.iterations, 6000);
    assert_eq!(report.overruns, 0);
    assert_eq!(leader_handle.count_reads(Register::PresentPosition), 6000);
    assert_eq!(follower_handle.count_writes(Register::GoalPosition), 6000);
    assert_eq!(pacer.elapsed(), Duration::from_secs(30));
}

#[test]
fn test_cancel_stops_leader_reads() {
    let (mut leader, leader_handle, mut follower, follower_handle) = connected_pair();
    let config = MirrorConfig {
        frequency_hz: 200.0,
        duration: Some(Duration::from_secs(30)),
    };
    let cancel = CancelToken::new();
    let remote = cancel.clone();

    let outcome = run_mirror(
        &mut leader,
        &mut follower,
        &config,
        &mut VirtualPacer::new(),
        &cancel,
        |progress| {
            if progress.iteration == 3000 {
                remote.cancel();
            }
        },
    )
    .unwrap();

    assert!(matches!(outcome, Outcome::Cancelled(ref r) if r.iterations == 3000));
    assert_eq!(leader_handle.count_reads(Register::PresentPosition), 3000);
    assert_eq!(follower_handle.count_writes(Register::GoalPosition), 3000);
}

#[test]
fn test_unbounded_runs_until_cancel() {
    let (mut leader, _leader_handle, mut follower, _follower_handle) = connected_pair();
    let config = MirrorConfig {
        frequency_hz: 50.0,
        duration: None,
    };
    let cancel = CancelToken::new();
    let remote = cancel.clone();

    let outcome = run_mirror(
        &mut leader,
        &mut follower,
        &config,
        &mut VirtualPacer::new(),
        &cancel,
        |progress| {
            assert_eq!(progress.planned, None);
            if progress.iteration == 10 {
                remote.cancel();
            }
        },
    )
    .unwrap();

    assert_eq!(outcome.value().map(|r| r.iterations), Some(10));
}

#[test]
fn test_leader_read_fault_aborts_and_tears_down() {
    let (mut leader, leader_handle, mut follower, follower_handle) = connected_pair();
    leader_handle.fail_read_from(Register::PresentPosition, 5);
    let config = MirrorConfig::default();

    let supervised = supervise(&mut follower, |follower| {
        run_mirror(
            &mut leader,
            follower,
            &config,
            &mut VirtualPacer::new(),
            &CancelToken::new(),
            |_| {},
        )
    });

    assert!(matches!(supervised.result, Err(RobotError::IoFault { ref arm, .. }) if arm == "leader"));
    // 无重试：第 5 次读取失败后不再读取
    assert_eq!(leader_handle.count_reads(Register::PresentPosition), 5);
    assert_eq!(follower_handle.count_writes(Register::GoalPosition), 4);
    assert_torque_off_before_disconnect(&follower_handle);
}

#[test]
fn test_follower_write_fault_aborts() {
    let (mut leader, leader_handle, mut follower, follower_handle) = connected_pair();
    follower_handle.fail_write_from(Register::GoalPosition, 3);

    let result = run_mirror(
        &mut leader,
        &mut follower,
        &MirrorConfig::default(),
        &mut VirtualPacer::new(),
        &CancelToken::new(),
        |_| {},
    );

    assert!(matches!(result, Err(RobotError::IoFault { ref arm, .. }) if arm == "follower"));
    assert_eq!(leader_handle.count_reads(Register::PresentPosition), 3);
}

#[test]
fn test_overrun_does_not_burst() {
    let (mut leader, _leader_handle, mut follower, follower_handle) = connected_pair();
    let mut pacer = VirtualPacer::new();

    // 每次写入耗时 15ms，超过 10ms 周期
    let clock = pacer.clone();
    follower_handle.on_op(move |op| {
        if op.is_write_to(Register::GoalPosition) {
            clock.advance(Duration::from_millis(15));
        }
    });

    let config = MirrorConfig {
        frequency_hz: 100.0,
        duration: Some(Duration::from_millis(100)),
    };
    let outcome = run_mirror(
        &mut leader,
        &mut follower,
        &config,
        &mut pacer,
        &CancelToken::new(),
        |_| {},
    )
    .unwrap();

    let report = outcome.value().copied().unwrap();
    assert_eq!(report.iterations, 10);
    assert_eq!(report.overruns, 10);
    // 没有额外等待，也没有为追赶而跳过迭代
    assert_eq!(pacer.elapsed(), Duration::from_millis(150));
}

#[test]
fn test_follower_must_be_enabled() {
    let (mut leader, _) = leader();
    let (mut follower, follower_handle) = follower();
    leader.connect().unwrap();
    follower.connect().unwrap();

    let result = run_mirror(
        &mut leader,
        &mut follower,
        &MirrorConfig::default(),
        &mut VirtualPacer::new(),
        &CancelToken::new(),
        |_| {},
    );

    assert!(matches!(result, Err(RobotError::InvalidTransition { .. })));
    assert!(
        !follower_handle
            .ops()
            .iter()
            .any(|op| matches!(op, BusOp::Write { register: Register::GoalPosition, .. }))
    );
}

#[test]
fn test_fractional_duration_runs_exact_iteration_count() {
    let (mut leader, leader_handle, mut follower, _) = connected_pair();
    let config = MirrorConfig {
        frequency_hz: 50.0,
        duration: Some(Duration::from_millis(140)),
    };
    let mut pacer = VirtualPacer::new();

    let outcome = run_mirror(
        &mut leader,
        &mut follower,
        &config,
        &mut pacer,
        &CancelToken::new(),
        |_| {},
    )
    .unwrap();

    assert_eq!(outcome.value().map(|r| r.iterations), Some(7));
    assert_eq!(leader_handle.count_reads(Register::PresentPosition), 7);
    assert_eq!(pacer.elapsed(), Duration::from_millis(140));
}

#[test]
fn test_unusable_frequency_is_a_config_error() {
    let (mut leader, leader_handle, mut follower, follower_handle) = connected_pair();
    let config = MirrorConfig {
        frequency_hz: 1e-30,
        duration: None,
    };

    let supervised = supervise(&mut follower, |follower| {
        run_mirror(
            &mut leader,
            follower,
            &config,
            &mut VirtualPacer::new(),
            &CancelToken::new(),
            |_| {},
        )
    });

    assert!(matches!(supervised.result, Err(RobotError::Config(_))));
    assert_eq!(leader_handle.count_reads(Register::PresentPosition), 0);
    assert_torque_off_before_disconnect(&follower_handle);
}
