//! 安全生命周期测试：teardown 保证、幂等性、故障路径

mod common;

use common::*;
use koch_bus::BusOp;
use koch_client::{ArmPair, LifecycleState, RobotError, TeardownStage, TorqueState, supervise};
use koch_protocol::{Joint, JointVector, OperatingMode, Register, RegisterValue};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};

#[test]
fn test_connect_enable_teardown() {
    let (mut session, handle) = follower();
    session.connect().unwrap();
    assert_eq!(session.state(), LifecycleState::Connected(TorqueState::Disabled));

    session.enable().unwrap();
    assert_eq!(session.torque_state(), Some(TorqueState::Enabled));
    assert!(handle.torque_enabled());

    let report = session.teardown();
    assert!(report.is_clean());
    assert_eq!(session.state(), LifecycleState::Idle);
    assert_torque_off_before_disconnect(&handle);
}

#[test]
fn test_teardown_forces_disable_even_if_never_enabled() {
    let (mut session, handle) = follower();
    session.connect().unwrap();
    session.teardown();

    assert_eq!(
        handle.written_values(Register::TorqueEnable),
        vec![(RegisterValue::Scalar(0), koch_protocol::JointSelector::All)]
    );
    assert_torque_off_before_disconnect(&handle);
}

#[test]
fn test_teardown_is_idempotent() {
    let (mut session, handle) = follower();
    session.connect().unwrap();
    session.enable().unwrap();

    assert!(session.teardown().is_clean());
    let ops_after_first = handle.ops().len();

    let second = session.teardown();
    assert!(second.is_clean());
    assert_eq!(handle.ops().len(), ops_after_first);
    assert_eq!(session.state(), LifecycleState::Idle);
}

#[test]
fn test_failed_connect_creates_no_obligation() {
    let (mut session, handle) = follower();
    handle.fail_connect("port busy");

    let err = session.connect().unwrap_err();
    assert!(matches!(err, RobotError::ConnectionFault { .. }));
    assert_eq!(session.state(), LifecycleState::Idle);

    assert!(session.teardown().is_clean());
    assert_eq!(handle.ops(), vec![BusOp::Connect]);
}

#[test]
fn test_teardown_faults_are_reported_not_raised() {
    let (mut session, handle) = follower();
    session.connect().unwrap();
    session.enable().unwrap();
    handle.fail_write_from(Register::TorqueEnable, 2);
    handle.fail_disconnect();

    let report = session.teardown();
    let stages: Vec<_> = report.faults().iter().map(|f| f.stage).collect();
    assert_eq!(stages, vec![TeardownStage::DisableTorque, TeardownStage::Disconnect]);
    assert!(report.torque_may_be_enabled());

    // 即使失败，会话也回到 Idle，且断开仍被尝试
    assert_eq!(session.state(), LifecycleState::Idle);
    assert_eq!(handle.ops().last(), Some(&BusOp::Disconnect));
}

#[test]
fn test_profile_velocity_reset_on_teardown() {
    let (mut session, handle) = follower();
    session.connect().unwrap();
    session.set_profile_velocity(15).unwrap();
    session.teardown();

    let values: Vec<_> = handle
        .written_values(Register::ProfileVelocity)
        .into_iter()
        .map(|(v, _)| v)
        .collect();
    assert_eq!(values, vec![RegisterValue::Scalar(15), RegisterValue::Scalar(0)]);
}

#[test]
fn test_configured_profile_velocity_written_after_enable() {
    let bus = koch_bus::MockBus::new("mock");
    let handle = bus.handle();
    let config = koch_client::SessionConfig::new(koch_client::ArmConfig::koch_follower("mock"))
        .with_profile_velocity(20);
    let mut session = koch_client::ArmSession::new(bus, config);
    session.connect().unwrap();
    session.enable().unwrap();

    let writes = handle.writes();
    assert!(writes[0].is_write_to(Register::TorqueEnable));
    assert!(writes[1].is_write_to(Register::ProfileVelocity));
}

#[test]
fn test_drop_tears_down() {
    let (mut session, handle) = follower();
    session.connect().unwrap();
    session.enable().unwrap();
    drop(session);

    assert_torque_off_before_disconnect(&handle);
}

#[test]
fn test_supervise_tears_down_after_io_fault() {
    let (mut session, handle) = follower();
    session.connect().unwrap();
    handle.fail_write_from(Register::GoalPosition, 1);

    let supervised = supervise(&mut session, |s| {
        s.enable()?;
        s.command_positions(&BASE)
    });

    assert!(matches!(supervised.result, Err(RobotError::IoFault { .. })));
    assert!(supervised.teardown.is_clean());
    assert_eq!(session.state(), LifecycleState::Idle);
    assert_torque_off_before_disconnect(&handle);
}

#[test]
fn test_supervise_tears_down_on_panic() {
    let (mut session, handle) = follower();
    session.connect().unwrap();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        supervise(&mut session, |s| -> Result<(), RobotError> {
            s.enable()?;
            panic!("operator code panicked");
        })
    }));

    assert!(result.is_err());
    assert_torque_off_before_disconnect(&handle);
}

#[test]
fn test_pair_follower_connect_failure_tears_down_leader() {
    let (leader, leader_handle) = leader();
    let (follower, follower_handle) = follower();
    follower_handle.fail_connect("no such device");

    let mut pair = ArmPair::new(leader, follower);
    assert!(matches!(
        pair.connect(),
        Err(RobotError::ConnectionFault { .. })
    ));
    assert!(!leader_handle.is_connected());
    assert_eq!(leader_handle.ops().last(), Some(&BusOp::Disconnect));
}

#[test]
fn test_pair_teardown_follower_first() {
    let (leader, leader_handle) = leader();
    let (follower, follower_handle) = follower();
    let mut pair = ArmPair::new(leader, follower);
    pair.connect().unwrap();
    pair.follower_mut().enable().unwrap();

    // 记录断开顺序
    let order = Arc::new(Mutex::new(Vec::new()));
    for (handle, name) in [(&leader_handle, "leader"), (&follower_handle, "follower")] {
        let order = Arc::clone(&order);
        handle.on_op(move |op| {
            if *op == BusOp::Disconnect {
                order.lock().unwrap().push(name);
            }
        });
    }

    assert!(pair.teardown().is_clean());
    assert_eq!(*order.lock().unwrap(), vec!["follower", "leader"]);
    assert_torque_off_before_disconnect(&follower_handle);
    assert_torque_off_before_disconnect(&leader_handle);
}

#[test]
fn test_reconfigure_operating_mode() {
    let (mut session, handle) = enabled_follower();
    session
        .reconfigure_operating_mode(Joint::ElbowFlex, OperatingMode::Position)
        .unwrap();

    let writes = handle.writes();
    assert_eq!(writes.len(), 3);
    assert!(writes[0].is_write_to(Register::TorqueEnable));
    assert!(writes[1].is_write_to(Register::OperatingMode));
    assert!(writes[2].is_write_to(Register::TorqueEnable));
    assert_eq!(handle.register(Register::OperatingMode)[Joint::ElbowFlex], 3);
    assert!(handle.torque_enabled());
}

#[derive(Debug, Clone)]
enum Action {
    Enable,
    Disable,
    Command,
    ReadPositions,
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        Just(Action::Enable),
        Just(Action::Disable),
        Just(Action::Command),
        Just(Action::ReadPositions),
    ]
}

proptest! {
    /// 任意操作序列、任意写故障点之后 teardown，力矩必定失能且连接断开
    #[test]
    fn prop_teardown_always_disables(
        actions in prop::collection::vec(action(), 0..12),
        goal_fault_at in prop::option::of(1usize..6),
    ) {
        let (mut session, handle) = follower();
        session.connect().unwrap();
        if let Some(nth) = goal_fault_at {
            handle.fail_write_from(Register::GoalPosition, nth);
        }

        let supervised = supervise(&mut session, |s| {
            for action in &actions {
                match action {
                    Action::Enable => s.enable()?,
                    Action::Disable => s.disable()?,
                    Action::Command => {
                        if s.torque_state() == Some(TorqueState::Enabled) {
                            s.command_positions(&JointVector::splat(2048))?;
                        }
                    },
                    Action::ReadPositions => {
                        s.read_positions()?;
                    },
                }
            }
            Ok(())
        });

        prop_assert!(supervised.teardown.is_clean());
        prop_assert_eq!(session.state(), LifecycleState::Idle);
        prop_assert!(!handle.torque_enabled());
        prop_assert!(!handle.is_connected());
    }
}
