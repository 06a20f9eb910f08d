//! Mock 总线（仅用于测试）
//!
//! 记录每一次总线操作，支持预置位置序列和故障注入。
//! `MockBus` 被会话独占，测试代码通过可克隆的 [`MockHandle`] 观察和操纵同一份状态。
//!
//! ```rust
//! use koch_bus::{ActuatorBus, BusOp, MockBus};
//! use koch_protocol::{JointVector, Register};
//!
//! let mut bus = MockBus::new("mock://follower");
//! let handle = bus.handle();
//!
//! bus.connect().unwrap();
//! bus.write_vector(Register::GoalPosition, &JointVector::splat(2048)).unwrap();
//!
//! assert_eq!(handle.count_writes(Register::GoalPosition), 1);
//! assert_eq!(handle.ops()[0], BusOp::Connect);
//! ```

use crate::{ActuatorBus, BusError};
use koch_protocol::{
    Joint, JointSelector, JointVector, OperatingMode, Register, RegisterValue, TorqueMode,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// 一次总线操作（按发生顺序记录，失败的操作也会记录）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    Connect,
    Disconnect,
    Read {
        register: Register,
        selector: JointSelector,
    },
    Write {
        register: Register,
        value: RegisterValue,
        selector: JointSelector,
    },
}

impl BusOp {
    pub fn is_write_to(&self, register: Register) -> bool {
        matches!(self, BusOp::Write { register: r, .. } if *r == register)
    }

    pub fn is_read_of(&self, register: Register) -> bool {
        matches!(self, BusOp::Read { register: r, .. } if *r == register)
    }
}

type OpHook = Arc<dyn Fn(&BusOp) + Send + Sync>;

struct MockState {
    connected: bool,
    ops: Vec<BusOp>,
    table: HashMap<Register, JointVector>,
    scripted_positions: VecDeque<JointVector>,
    /// 力矩使能时目标位置是否立即变为当前位置
    track_goal: bool,
    fail_connect: Option<String>,
    fail_disconnect: bool,
    /// (寄存器, 从第 n 次起失败)
    read_faults: Vec<(Register, usize)>,
    write_faults: Vec<(Register, usize)>,
    read_counts: HashMap<Register, usize>,
    write_counts: HashMap<Register, usize>,
    hook: Option<OpHook>,
}

impl MockState {
    fn new() -> Self {
        let mut table = HashMap::new();
        for register in Register::ALL {
            table.insert(register, JointVector::ZERO);
        }
        table.insert(Register::PresentPosition, JointVector::splat(2048));
        table.insert(Register::GoalPosition, JointVector::splat(2048));
        table.insert(Register::PresentInputVoltage, JointVector::splat(120));
        table.insert(
            Register::OperatingMode,
            JointVector::splat(OperatingMode::ExtendedPosition.into()),
        );

        Self {
            connected: false,
            ops: Vec::new(),
            table,
            scripted_positions: VecDeque::new(),
            track_goal: true,
            fail_connect: None,
            fail_disconnect: false,
            read_faults: Vec::new(),
            write_faults: Vec::new(),
            read_counts: HashMap::new(),
            write_counts: HashMap::new(),
            hook: None,
        }
    }

    fn vector(&self, register: Register) -> JointVector {
        self.table.get(&register).copied().unwrap_or_default()
    }

    fn set(&mut self, register: Register, joint: Joint, value: i32) {
        let mut current = self.vector(register);
        current[joint] = value;
        self.table.insert(register, current);

        if register == Register::GoalPosition
            && self.track_goal
            && self.vector(Register::TorqueEnable)[joint] == i32::from(TorqueMode::Enabled)
        {
            let mut present = self.vector(Register::PresentPosition);
            present[joint] = value;
            self.table.insert(Register::PresentPosition, present);
        }
    }

    fn faulted(faults: &[(Register, usize)], register: Register, count: usize) -> bool {
        faults.iter().any(|(r, from)| *r == register && count >= *from)
    }
}

/// Mock 状态句柄（可克隆，与 [`MockBus`] 共享状态）
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// 全部操作记录
    pub fn ops(&self) -> Vec<BusOp> {
        self.state.lock().ops.clone()
    }

    /// 写操作记录
    pub fn writes(&self) -> Vec<BusOp> {
        self.state
            .lock()
            .ops
            .iter()
            .filter(|op| matches!(op, BusOp::Write { .. }))
            .cloned()
            .collect()
    }

    /// 指定寄存器的写入值（按顺序）
    pub fn written_values(&self, register: Register) -> Vec<(RegisterValue, JointSelector)> {
        self.state
            .lock()
            .ops
            .iter()
            .filter_map(|op| match op {
                BusOp::Write {
                    register: r,
                    value,
                    selector,
                } if *r == register => Some((*value, *selector)),
                _ => None,
            })
            .collect()
    }

    pub fn count_reads(&self, register: Register) -> usize {
        self.state.lock().ops.iter().filter(|op| op.is_read_of(register)).count()
    }

    pub fn count_writes(&self, register: Register) -> usize {
        self.state.lock().ops.iter().filter(|op| op.is_write_to(register)).count()
    }

    pub fn clear_ops(&self) {
        self.state.lock().ops.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// 是否有任意关节处于力矩使能状态
    pub fn torque_enabled(&self) -> bool {
        self.state
            .lock()
            .vector(Register::TorqueEnable)
            .iter()
            .any(|v| *v == i32::from(TorqueMode::Enabled))
    }

    pub fn register(&self, register: Register) -> JointVector {
        self.state.lock().vector(register)
    }

    pub fn set_positions(&self, positions: JointVector) {
        self.state.lock().table.insert(Register::PresentPosition, positions);
    }

    /// 预置后续 `Present_Position` 读取结果（依次弹出，用完后返回最后的位置）
    pub fn push_positions<I: IntoIterator<Item = JointVector>>(&self, positions: I) {
        self.state.lock().scripted_positions.extend(positions);
    }

    pub fn set_voltages(&self, voltages: JointVector) {
        self.state
            .lock()
            .table
            .insert(Register::PresentInputVoltage, voltages);
    }

    /// 关闭后，目标位置写入不会改变当前位置
    pub fn set_track_goal(&self, track: bool) {
        self.state.lock().track_goal = track;
    }

    pub fn fail_connect(&self, message: impl Into<String>) {
        self.state.lock().fail_connect = Some(message.into());
    }

    pub fn fail_disconnect(&self) {
        self.state.lock().fail_disconnect = true;
    }

    /// 该寄存器从第 `nth` 次读取（从 1 开始计数）起全部失败
    pub fn fail_read_from(&self, register: Register, nth: usize) {
        self.state.lock().read_faults.push((register, nth.max(1)));
    }

    /// 该寄存器从第 `nth` 次写入（从 1 开始计数）起全部失败
    pub fn fail_write_from(&self, register: Register, nth: usize) {
        self.state.lock().write_faults.push((register, nth.max(1)));
    }

    pub fn clear_faults(&self) {
        let mut state = self.state.lock();
        state.read_faults.clear();
        state.write_faults.clear();
        state.fail_connect = None;
        state.fail_disconnect = false;
    }

    /// 每次操作记录后调用（在锁外执行，可以安全地访问句柄）
    pub fn on_op<F>(&self, hook: F)
    where
        F: Fn(&BusOp) + Send + Sync + 'static,
    {
        self.state.lock().hook = Some(Arc::new(hook));
    }
}

/// Mock 总线
pub struct MockBus {
    port: String,
    state: Arc<Mutex<MockState>>,
}

impl MockBus {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            state: Arc::new(Mutex::new(MockState::new())),
        }
    }

    pub fn with_positions(port: impl Into<String>, positions: JointVector) -> Self {
        let bus = Self::new(port);
        bus.handle().set_positions(positions);
        bus
    }

    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn record(&self, op: BusOp) {
        let hook = {
            let mut state = self.state.lock();
            state.ops.push(op.clone());
            state.hook.clone()
        };
        if let Some(hook) = hook {
            hook(&op);
        }
    }
}

impl ActuatorBus for MockBus {
    fn port(&self) -> &str {
        &self.port
    }

    fn connect(&mut self) -> Result<(), BusError> {
        self.record(BusOp::Connect);
        let mut state = self.state.lock();
        if let Some(message) = state.fail_connect.clone() {
            return Err(BusError::Connection {
                port: self.port.clone(),
                message,
            });
        }
        state.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BusError> {
        self.record(BusOp::Disconnect);
        let mut state = self.state.lock();
        state.connected = false;
        if state.fail_disconnect {
            return Err(BusError::Disconnect {
                port: self.port.clone(),
                message: "injected fault".to_string(),
            });
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn read(
        &mut self,
        register: Register,
        selector: JointSelector,
    ) -> Result<RegisterValue, BusError> {
        self.record(BusOp::Read { register, selector });
        let mut state = self.state.lock();
        if !state.connected {
            return Err(BusError::NotConnected);
        }

        let count = {
            let count = state.read_counts.entry(register).or_insert(0);
            *count += 1;
            *count
        };
        if MockState::faulted(&state.read_faults, register, count) {
            return Err(BusError::Read {
                register,
                selector,
                message: "injected fault".to_string(),
            });
        }

        if register == Register::PresentPosition
            && let Some(next) = state.scripted_positions.pop_front()
        {
            state.table.insert(Register::PresentPosition, next);
        }

        let values = state.vector(register);
        Ok(match selector {
            JointSelector::All => RegisterValue::Vector(values),
            JointSelector::One(joint) => RegisterValue::Scalar(values[joint]),
        })
    }

    fn write(
        &mut self,
        register: Register,
        value: RegisterValue,
        selector: JointSelector,
    ) -> Result<(), BusError> {
        self.record(BusOp::Write {
            register,
            value,
            selector,
        });
        let mut state = self.state.lock();
        if !state.connected {
            return Err(BusError::NotConnected);
        }
        if !register.is_writable() {
            return Err(BusError::ReadOnly(register));
        }

        let count = {
            let count = state.write_counts.entry(register).or_insert(0);
            *count += 1;
            *count
        };
        if MockState::faulted(&state.write_faults, register, count) {
            return Err(BusError::Write {
                register,
                selector,
                message: "injected fault".to_string(),
            });
        }

        match (selector, value) {
            (JointSelector::All, RegisterValue::Vector(values)) => {
                for (joint, v) in values.joints() {
                    state.set(register, joint, v);
                }
            },
            (JointSelector::All, RegisterValue::Scalar(v)) => {
                for joint in Joint::ALL {
                    state.set(register, joint, v);
                }
            },
            (JointSelector::One(joint), RegisterValue::Scalar(v)) => state.set(register, joint, v),
            (JointSelector::One(_), RegisterValue::Vector(_)) => {
                return Err(
                    koch_protocol::ProtocolError::ShapeMismatch { expected: "scalar" }.into(),
                );
            },
        }
        Ok(())
    }
}
