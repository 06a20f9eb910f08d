//! 集成测试公共工具

#![allow(dead_code)]

use koch_bus::{BusOp, MockBus, MockHandle};
use koch_client::{ArmConfig, ArmSession, SessionConfig};
use koch_protocol::{JointVector, Register, RegisterValue};
use koch_tools::{BasePosition, Choreography, PoseLibrary};

pub const BASE: JointVector = JointVector::new([2028, 1609, 3139, 3148, 1009, 2507]);

pub fn follower() -> (ArmSession<MockBus>, MockHandle) {
    let bus = MockBus::with_positions("mock://follower", BASE);
    let handle = bus.handle();
    let config = SessionConfig::new(ArmConfig::koch_follower("mock://follower"));
    (ArmSession::new(bus, config), handle)
}

pub fn leader() -> (ArmSession<MockBus>, MockHandle) {
    let bus = MockBus::with_positions("mock://leader", BASE);
    let handle = bus.handle();
    let config = SessionConfig::new(ArmConfig::koch_leader("mock://leader"));
    (ArmSession::new(bus, config), handle)
}

pub fn base() -> BasePosition {
    BasePosition::new(BASE)
}

pub fn library() -> PoseLibrary {
    Choreography::builtin().poses
}

/// 已连接并使能的从动臂
pub fn enabled_follower() -> (ArmSession<MockBus>, MockHandle) {
    let (mut session, handle) = follower();
    session.connect().unwrap();
    session.enable().unwrap();
    handle.clear_ops();
    (session, handle)
}

/// 所有全向量目标位置写入
pub fn goal_vectors(handle: &MockHandle) -> Vec<JointVector> {
    handle
        .written_values(Register::GoalPosition)
        .into_iter()
        .filter_map(|(value, _)| match value {
            RegisterValue::Vector(v) => Some(v),
            RegisterValue::Scalar(_) => None,
        })
        .collect()
}

/// 断言 teardown 结果：最后一次力矩写入为失能，且在断开之前
pub fn assert_torque_off_before_disconnect(handle: &MockHandle) {
    let ops = handle.ops();
    let last_torque = ops
        .iter()
        .rposition(|op| op.is_write_to(Register::TorqueEnable))
        .expect("no Torque_Enable write recorded");
    let disconnect = ops
        .iter()
        .rposition(|op| *op == BusOp::Disconnect)
        .expect("no disconnect recorded");

    assert!(last_torque < disconnect, "torque disabled after disconnect");
    match &ops[last_torque] {
        BusOp::Write { value, .. } => assert_eq!(*value, RegisterValue::Scalar(0)),
        other => panic!("unexpected op {other:?}"),
    }
    assert!(!handle.torque_enabled());
    assert!(!handle.is_connected());
}
