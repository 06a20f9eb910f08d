//! 控制表寄存器定义
//!
//! 地址和字节宽度对应 Dynamixel X 系列（XL330 / XL430）控制表。
//! 本层只描述寄存器，不负责串口读写。

use crate::ProtocolError;
use crate::joint::{Joint, JointVector};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;
use std::str::FromStr;

/// 命名寄存器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// 运行模式（修改前必须先失能该关节）
    OperatingMode,
    /// 力矩使能（布尔值）
    TorqueEnable,
    /// 状态 LED（布尔值）
    Led,
    /// 轮廓速度（0 = 不限速）
    ProfileVelocity,
    /// 目标位置
    GoalPosition,
    /// 当前位置（只读）
    PresentPosition,
    /// 输入电压（只读，单位 0.1V）
    PresentInputVoltage,
}

impl Register {
    pub const ALL: [Register; 7] = [
        Register::OperatingMode,
        Register::TorqueEnable,
        Register::Led,
        Register::ProfileVelocity,
        Register::GoalPosition,
        Register::PresentPosition,
        Register::PresentInputVoltage,
    ];

    /// 控制表中的名称
    pub const fn name(self) -> &'static str {
        match self {
            Register::OperatingMode => "Operating_Mode",
            Register::TorqueEnable => "Torque_Enable",
            Register::Led => "LED",
            Register::ProfileVelocity => "Profile_Velocity",
            Register::GoalPosition => "Goal_Position",
            Register::PresentPosition => "Present_Position",
            Register::PresentInputVoltage => "Present_Input_Voltage",
        }
    }

    /// 控制表地址
    pub const fn address(self) -> u16 {
        match self {
            Register::OperatingMode => 11,
            Register::TorqueEnable => 64,
            Register::Led => 65,
            Register::ProfileVelocity => 112,
            Register::GoalPosition => 116,
            Register::PresentPosition => 132,
            Register::PresentInputVoltage => 144,
        }
    }

    /// 数据宽度（字节）
    pub const fn size(self) -> u8 {
        match self {
            Register::OperatingMode | Register::TorqueEnable | Register::Led => 1,
            Register::PresentInputVoltage => 2,
            Register::ProfileVelocity | Register::GoalPosition | Register::PresentPosition => 4,
        }
    }

    pub const fn is_writable(self) -> bool {
        !matches!(
            self,
            Register::PresentPosition | Register::PresentInputVoltage
        )
    }

    /// 写入该寄存器是否会让关节运动
    pub const fn commands_motion(self) -> bool {
        matches!(self, Register::GoalPosition)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Register {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Register::ALL
            .iter()
            .copied()
            .find(|reg| reg.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProtocolError::UnknownRegister(s.trim().to_string()))
    }
}

/// 力矩模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum TorqueMode {
    Disabled = 0,
    Enabled = 1,
}

/// 运行模式（Operating_Mode 寄存器取值）
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum OperatingMode {
    Current = 0,
    Velocity = 1,
    Position = 3,
    ExtendedPosition = 4,
    CurrentBasedPosition = 5,
    Pwm = 16,
}

impl OperatingMode {
    pub fn from_raw(raw: i32) -> Result<Self, ProtocolError> {
        Self::try_from(raw).map_err(|_| ProtocolError::InvalidOperatingMode(raw))
    }
}

/// 关节选择器
///
/// `All` 对应向量读写，`One` 对应单关节标量读写。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JointSelector {
    #[default]
    All,
    One(Joint),
}

impl From<Joint> for JointSelector {
    fn from(joint: Joint) -> Self {
        JointSelector::One(joint)
    }
}

impl fmt::Display for JointSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JointSelector::All => f.write_str("all joints"),
            JointSelector::One(joint) => write!(f, "{}", joint),
        }
    }
}

/// 寄存器值
///
/// 对 `JointSelector::All` 写入 `Scalar` 表示广播同一个值（如力矩使能）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterValue {
    Vector(JointVector),
    Scalar(i32),
}

impl RegisterValue {
    pub fn into_vector(self) -> Result<JointVector, ProtocolError> {
        match self {
            RegisterValue::Vector(v) => Ok(v),
            RegisterValue::Scalar(_) => Err(ProtocolError::ShapeMismatch {
                expected: "vector",
            }),
        }
    }

    pub fn into_scalar(self) -> Result<i32, ProtocolError> {
        match self {
            RegisterValue::Scalar(v) => Ok(v),
            RegisterValue::Vector(_) => Err(ProtocolError::ShapeMismatch {
                expected: "scalar",
            }),
        }
    }
}

impl From<JointVector> for RegisterValue {
    fn from(v: JointVector) -> Self {
        RegisterValue::Vector(v)
    }
}

impl From<i32> for RegisterValue {
    fn from(v: i32) -> Self {
        RegisterValue::Scalar(v)
    }
}

impl From<TorqueMode> for RegisterValue {
    fn from(mode: TorqueMode) -> Self {
        RegisterValue::Scalar(mode.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_names_roundtrip() {
        for reg in Register::ALL {
            assert_eq!(reg.name().parse::<Register>().unwrap(), reg);
        }
        assert!("Goal_Velocity".parse::<Register>().is_err());
    }

    #[test]
    fn test_read_only_registers() {
        assert!(!Register::PresentPosition.is_writable());
        assert!(!Register::PresentInputVoltage.is_writable());
        assert!(Register::GoalPosition.is_writable());
        assert!(Register::GoalPosition.commands_motion());
        assert!(!Register::TorqueEnable.commands_motion());
    }

    #[test]
    fn test_operating_mode_from_raw() {
        assert_eq!(OperatingMode::from_raw(3).unwrap(), OperatingMode::Position);
        assert!(matches!(
            OperatingMode::from_raw(2),
            Err(ProtocolError::InvalidOperatingMode(2))
        ));
    }

    #[test]
    fn test_torque_mode_value() {
        assert_eq!(RegisterValue::from(TorqueMode::Enabled), RegisterValue::Scalar(1));
        assert_eq!(i32::from(TorqueMode::Disabled), 0);
    }

    #[test]
    fn test_register_value_shape() {
        let v = RegisterValue::from(JointVector::splat(3));
        assert!(v.into_scalar().is_err());
        assert_eq!(v.into_vector().unwrap(), JointVector::splat(3));
        assert_eq!(RegisterValue::Scalar(7).into_scalar().unwrap(), 7);
    }
}
