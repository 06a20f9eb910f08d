//! # Koch Actuator Bus Layer
//!
//! 执行器总线抽象层，提供统一的寄存器读写接口。
//!
//! 串口传输、握手和重试策略都属于具体后端，本层之上的代码只通过
//! [`ActuatorBus`] trait 访问电机。
//!
//! ## 后端
//!
//! - [`SimulatedBus`]: 内存中的控制表（理想舵机，目标位置立即到达）
//! - `MockBus`（`mock` feature）：记录每一次操作并支持故障注入，用于测试

use koch_protocol::{Joint, JointSelector, JointVector, ProtocolError, Register, RegisterValue};
use thiserror::Error;

pub mod sim;

#[cfg(feature = "mock")]
pub mod mock;

pub use sim::{SimConfig, SimulatedBus};

#[cfg(feature = "mock")]
pub use mock::{BusOp, MockBus, MockHandle};

/// 总线层统一错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// 端口打开或握手失败
    #[error("Failed to connect to {port}: {message}")]
    Connection { port: String, message: String },

    /// 未连接时访问总线
    #[error("Bus not connected")]
    NotConnected,

    #[error("Read of {register} ({selector}) failed: {message}")]
    Read {
        register: Register,
        selector: JointSelector,
        message: String,
    },

    #[error("Write of {register} ({selector}) failed: {message}")]
    Write {
        register: Register,
        selector: JointSelector,
        message: String,
    },

    #[error("Register {0} is read-only")]
    ReadOnly(Register),

    #[error("Failed to disconnect from {port}: {message}")]
    Disconnect { port: String, message: String },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// 执行器总线
///
/// `selector` 为 `All` 时是向量读写，为 `One(joint)` 时是单关节标量读写。
/// 实现者不应在内部重试失败的读写。
pub trait ActuatorBus {
    /// 端口名称（仅用于日志和错误信息）
    fn port(&self) -> &str;

    fn connect(&mut self) -> Result<(), BusError>;

    fn disconnect(&mut self) -> Result<(), BusError>;

    fn is_connected(&self) -> bool;

    fn read(
        &mut self,
        register: Register,
        selector: JointSelector,
    ) -> Result<RegisterValue, BusError>;

    fn write(
        &mut self,
        register: Register,
        value: RegisterValue,
        selector: JointSelector,
    ) -> Result<(), BusError>;

    /// 读取所有关节
    fn read_vector(&mut self, register: Register) -> Result<JointVector, BusError> {
        Ok(self.read(register, JointSelector::All)?.into_vector()?)
    }

    /// 读取单个关节
    fn read_joint(&mut self, register: Register, joint: Joint) -> Result<i32, BusError> {
        Ok(self.read(register, JointSelector::One(joint))?.into_scalar()?)
    }

    /// 写入所有关节（每个关节各自的值）
    fn write_vector(&mut self, register: Register, values: &JointVector) -> Result<(), BusError> {
        self.write(register, RegisterValue::Vector(*values), JointSelector::All)
    }

    /// 向所有关节广播同一个值
    fn write_all(&mut self, register: Register, value: i32) -> Result<(), BusError> {
        self.write(register, RegisterValue::Scalar(value), JointSelector::All)
    }

    /// 写入单个关节
    fn write_joint(&mut self, register: Register, joint: Joint, value: i32) -> Result<(), BusError> {
        self.write(register, RegisterValue::Scalar(value), JointSelector::One(joint))
    }
}

impl<B: ActuatorBus + ?Sized> ActuatorBus for Box<B> {
    fn port(&self) -> &str {
        (**self).port()
    }

    fn connect(&mut self) -> Result<(), BusError> {
        (**self).connect()
    }

    fn disconnect(&mut self) -> Result<(), BusError> {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn read(
        &mut self,
        register: Register,
        selector: JointSelector,
    ) -> Result<RegisterValue, BusError> {
        (**self).read(register, selector)
    }

    fn write(
        &mut self,
        register: Register,
        value: RegisterValue,
        selector: JointSelector,
    ) -> Result<(), BusError> {
        (**self).write(register, value, selector)
    }
}
