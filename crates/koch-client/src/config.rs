//! 机械臂和会话配置
//!
//! 所有端口和电机表都通过配置结构显式传入，没有全局状态。

use crate::RobotError;
use koch_protocol::{JOINT_COUNT, Joint};
use std::fmt;

/// 舵机型号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MotorModel {
    #[cfg_attr(feature = "serde", serde(rename = "xl330-m077"))]
    Xl330M077,
    #[cfg_attr(feature = "serde", serde(rename = "xl330-m288"))]
    Xl330M288,
    #[cfg_attr(feature = "serde", serde(rename = "xl430-w250"))]
    Xl430W250,
}

impl fmt::Display for MotorModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MotorModel::Xl330M077 => "xl330-m077",
            MotorModel::Xl330M288 => "xl330-m288",
            MotorModel::Xl430W250 => "xl430-w250",
        })
    }
}

/// 单个电机
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotorConfig {
    pub joint: Joint,
    /// 总线 ID（1-253）
    pub id: u8,
    pub model: MotorModel,
}

/// 机械臂配置
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArmConfig {
    /// 名称（用于日志和错误信息，如 "leader" / "follower"）
    pub name: String,
    /// 串口路径
    pub port: String,
    pub motors: Vec<MotorConfig>,
}

impl ArmConfig {
    /// Koch v1.1 主动臂（6 × XL330-M077）
    pub fn koch_leader(port: impl Into<String>) -> Self {
        Self {
            name: "leader".to_string(),
            port: port.into(),
            motors: Joint::ALL
                .iter()
                .map(|&joint| MotorConfig {
                    joint,
                    id: joint.index() as u8 + 1,
                    model: MotorModel::Xl330M077,
                })
                .collect(),
        }
    }

    /// Koch v1.1 从动臂（肩部 2 × XL430-W250，其余 XL330-M288）
    pub fn koch_follower(port: impl Into<String>) -> Self {
        Self {
            name: "follower".to_string(),
            port: port.into(),
            motors: Joint::ALL
                .iter()
                .map(|&joint| MotorConfig {
                    joint,
                    id: joint.index() as u8 + 1,
                    model: match joint {
                        Joint::ShoulderPan | Joint::ShoulderLift => MotorModel::Xl430W250,
                        _ => MotorModel::Xl330M288,
                    },
                })
                .collect(),
        }
    }

    /// 检查电机表：每个关节恰好一个电机，ID 非零且不重复
    pub fn validate(&self) -> Result<(), RobotError> {
        if self.port.trim().is_empty() {
            return Err(RobotError::Config(format!("{} arm has an empty port", self.name)));
        }
        if self.motors.len() != JOINT_COUNT {
            return Err(RobotError::Config(format!(
                "{} arm must have {} motors, found {}",
                self.name,
                JOINT_COUNT,
                self.motors.len()
            )));
        }

        let mut seen_joints = [false; JOINT_COUNT];
        let mut seen_ids = Vec::with_capacity(JOINT_COUNT);
        for motor in &self.motors {
            if motor.id == 0 {
                return Err(RobotError::Config(format!(
                    "{} arm: motor for {} has id 0",
                    self.name, motor.joint
                )));
            }
            if std::mem::replace(&mut seen_joints[motor.joint.index()], true) {
                return Err(RobotError::Config(format!(
                    "{} arm: joint {} configured twice",
                    self.name, motor.joint
                )));
            }
            if seen_ids.contains(&motor.id) {
                return Err(RobotError::Config(format!(
                    "{} arm: motor id {} used twice",
                    self.name, motor.id
                )));
            }
            seen_ids.push(motor.id);
        }
        Ok(())
    }

    pub fn motor(&self, joint: Joint) -> Option<&MotorConfig> {
        self.motors.iter().find(|m| m.joint == joint)
    }
}

/// 会话配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub arm: ArmConfig,
    /// 使能力矩后写入的轮廓速度；`None` 表示不修改
    pub profile_velocity: Option<i32>,
}

impl SessionConfig {
    pub fn new(arm: ArmConfig) -> Self {
        Self {
            arm,
            profile_velocity: None,
        }
    }

    pub fn with_profile_velocity(mut self, velocity: i32) -> Self {
        self.profile_velocity = Some(velocity);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_koch_defaults_are_valid() {
        let leader = ArmConfig::koch_leader("/dev/ttyACM0");
        let follower = ArmConfig::koch_follower("/dev/ttyACM1");
        leader.validate().unwrap();
        follower.validate().unwrap();

        assert_eq!(leader.motor(Joint::Gripper).map(|m| m.id), Some(6));
        assert_eq!(
            follower.motor(Joint::ShoulderLift).map(|m| m.model),
            Some(MotorModel::Xl430W250)
        );
        assert_eq!(
            follower.motor(Joint::ElbowFlex).map(|m| m.model),
            Some(MotorModel::Xl330M288)
        );
    }

    #[test]
    fn test_duplicate_joint_rejected() {
        let mut arm = ArmConfig::koch_follower("/dev/ttyACM1");
        arm.motors[5].joint = Joint::ElbowFlex;
        let err = arm.validate().unwrap_err();
        assert!(err.to_string().contains("configured twice"));
    }

    #[test]
    fn test_missing_motor_rejected() {
        let mut arm = ArmConfig::koch_leader("/dev/ttyACM0");
        arm.motors.pop();
        assert!(matches!(arm.validate(), Err(RobotError::Config(_))));
    }

    #[test]
    fn test_session_config_builder() {
        let config = SessionConfig::new(ArmConfig::koch_follower("sim")).with_profile_velocity(15);
        assert_eq!(config.profile_velocity, Some(15));
    }
}
