//! 仿真总线
//!
//! 内存中的控制表，模拟一条挂着 6 个舵机的总线：
//! - 力矩使能的关节收到目标位置后立即到达（理想舵机）
//! - 力矩失能的关节保持当前位置（可用 [`SimulatedBus::set_present_positions`] 模拟手动拖动）

use crate::{ActuatorBus, BusError};
use koch_protocol::{
    JOINT_COUNT, Joint, JointSelector, JointVector, OperatingMode, Register, RegisterValue,
    TorqueMode,
};
use tracing::{debug, trace};

/// 仿真配置
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// 端口名称（仅用于日志）
    pub port: String,
    /// 上电时的关节位置
    pub initial_positions: JointVector,
    /// 每个电机的输入电压（0.1V 单位）
    pub input_voltage: JointVector,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            port: "sim://follower".to_string(),
            initial_positions: JointVector::new([2028, 1609, 3139, 3148, 1009, 2507]),
            input_voltage: JointVector::splat(120),
        }
    }
}

/// 仿真控制表
#[derive(Debug, Clone)]
struct ControlTable {
    present: JointVector,
    goal: JointVector,
    torque: [bool; JOINT_COUNT],
    led: [bool; JOINT_COUNT],
    profile_velocity: JointVector,
    operating_mode: JointVector,
    voltage: JointVector,
}

impl ControlTable {
    fn new(config: &SimConfig) -> Self {
        Self {
            present: config.initial_positions,
            goal: config.initial_positions,
            torque: [false; JOINT_COUNT],
            led: [false; JOINT_COUNT],
            profile_velocity: JointVector::ZERO,
            operating_mode: JointVector::splat(OperatingMode::ExtendedPosition.into()),
            voltage: config.input_voltage,
        }
    }

    fn get(&self, register: Register, joint: Joint) -> i32 {
        let i = joint.index();
        match register {
            Register::OperatingMode => self.operating_mode[joint],
            Register::TorqueEnable => self.torque[i] as i32,
            Register::Led => self.led[i] as i32,
            Register::ProfileVelocity => self.profile_velocity[joint],
            Register::GoalPosition => self.goal[joint],
            Register::PresentPosition => self.present[joint],
            Register::PresentInputVoltage => self.voltage[joint],
        }
    }

    fn set(&mut self, register: Register, joint: Joint, value: i32) {
        let i = joint.index();
        match register {
            Register::OperatingMode => self.operating_mode[joint] = value,
            Register::TorqueEnable => {
                self.torque[i] = value == i32::from(TorqueMode::Enabled);
            },
            Register::Led => self.led[i] = value != 0,
            Register::ProfileVelocity => self.profile_velocity[joint] = value,
            Register::GoalPosition => {
                self.goal[joint] = value;
                if self.torque[i] {
                    self.present[joint] = value;
                }
            },
            // 只读寄存器在 write() 中已被拒绝
            Register::PresentPosition | Register::PresentInputVoltage => {},
        }
    }
}

/// 仿真总线
pub struct SimulatedBus {
    config: SimConfig,
    connected: bool,
    table: ControlTable,
}

impl SimulatedBus {
    pub fn new(config: SimConfig) -> Self {
        let table = ControlTable::new(&config);
        Self {
            config,
            connected: false,
            table,
        }
    }

    /// 模拟手动拖动（例如主动臂被操作员移动）
    pub fn set_present_positions(&mut self, positions: JointVector) {
        self.table.present = positions;
    }

    pub fn present_positions(&self) -> JointVector {
        self.table.present
    }

    pub fn torque_enabled(&self, joint: Joint) -> bool {
        self.table.torque[joint.index()]
    }

    pub fn any_torque_enabled(&self) -> bool {
        self.table.torque.iter().any(|t| *t)
    }

    pub fn led_on(&self, joint: Joint) -> bool {
        self.table.led[joint.index()]
    }

    pub fn set_input_voltage(&mut self, voltage: JointVector) {
        self.table.voltage = voltage;
    }

    fn ensure_connected(&self) -> Result<(), BusError> {
        if self.connected {
            Ok(())
        } else {
            Err(BusError::NotConnected)
        }
    }
}

impl ActuatorBus for SimulatedBus {
    fn port(&self) -> &str {
        &self.config.port
    }

    fn connect(&mut self) -> Result<(), BusError> {
        debug!(port = %self.config.port, "Simulated bus connected");
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BusError> {
        debug!(port = %self.config.port, "Simulated bus disconnected");
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn read(
        &mut self,
        register: Register,
        selector: JointSelector,
    ) -> Result<RegisterValue, BusError> {
        self.ensure_connected()?;
        trace!(%register, %selector, "sim read");

        Ok(match selector {
            JointSelector::All => {
                let mut out = JointVector::ZERO;
                for joint in Joint::ALL {
                    out[joint] = self.table.get(register, joint);
                }
                RegisterValue::Vector(out)
            },
            JointSelector::One(joint) => RegisterValue::Scalar(self.table.get(register, joint)),
        })
    }

    fn write(
        &mut self,
        register: Register,
        value: RegisterValue,
        selector: JointSelector,
    ) -> Result<(), BusError> {
        self.ensure_connected()?;
        if !register.is_writable() {
            return Err(BusError::ReadOnly(register));
        }
        trace!(%register, %selector, ?value, "sim write");

        match (selector, value) {
            (JointSelector::All, RegisterValue::Vector(values)) => {
                for (joint, v) in values.joints() {
                    self.table.set(register, joint, v);
                }
            },
            (JointSelector::All, RegisterValue::Scalar(v)) => {
                for joint in Joint::ALL {
                    self.table.set(register, joint, v);
                }
            },
            (JointSelector::One(joint), RegisterValue::Scalar(v)) => {
                self.table.set(register, joint, v);
            },
            (JointSelector::One(_), RegisterValue::Vector(_)) => {
                return Err(koch_protocol::ProtocolError::ShapeMismatch {
                    expected: "scalar",
                }
                .into());
            },
        }
        Ok(())
    }
}
