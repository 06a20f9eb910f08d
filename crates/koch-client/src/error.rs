//! 错误类型体系
//!
//! 区分致命错误（连接失败、总线读写失败，立即终止执行并进入 teardown）
//! 和使用错误（非法状态转换、配置错误）。
//!
//! teardown 过程中的失败不会作为错误抛出，而是收集到 [`TeardownReport`] 中。

use koch_bus::BusError;
use koch_tools::ChoreographyError;
use std::fmt;
use thiserror::Error;

/// 机器人错误类型
#[derive(Debug, Error)]
pub enum RobotError {
    // ==================== Fatal Errors ====================
    /// 连接失败（不产生 teardown 义务）
    #[error("Failed to connect {arm} arm: {source}")]
    ConnectionFault {
        arm: String,
        #[source]
        source: BusError,
    },

    /// 连接建立后的单次读写失败（不重试）
    #[error("I/O fault on {arm} arm during {operation}: {source}")]
    IoFault {
        arm: String,
        operation: String,
        #[source]
        source: BusError,
    },

    // ==================== Usage Errors ====================
    /// 无效的状态转换
    #[error("Invalid state transition on {arm} arm: {from} -> {to}")]
    InvalidTransition {
        arm: String,
        from: String,
        to: String,
    },

    /// 序列校验失败（执行前拒绝，不产生总线操作）
    #[error("Invalid sequence: {details}")]
    InvalidSequence { details: String },

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Choreography(#[from] ChoreographyError),
}

impl RobotError {
    /// 是否为致命错误（总线故障）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RobotError::ConnectionFault { .. } | RobotError::IoFault { .. }
        )
    }

    pub fn bus_error(&self) -> Option<&BusError> {
        match self {
            RobotError::ConnectionFault { source, .. } | RobotError::IoFault { source, .. } => {
                Some(source)
            },
            _ => None,
        }
    }
}

/// teardown 阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStage {
    ResetProfileVelocity,
    DisableTorque,
    Disconnect,
}

impl fmt::Display for TeardownStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TeardownStage::ResetProfileVelocity => "reset profile velocity",
            TeardownStage::DisableTorque => "disable torque",
            TeardownStage::Disconnect => "disconnect",
        })
    }
}

/// teardown 失败（只报告，不抛出）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Teardown of {arm} arm failed to {stage}: {source}")]
pub struct TeardownFault {
    pub arm: String,
    pub stage: TeardownStage,
    #[source]
    pub source: BusError,
}

/// teardown 报告
///
/// 空报告表示 teardown 完全成功，或会话本来就处于 Idle。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    faults: Vec<TeardownFault>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }

    pub fn faults(&self) -> &[TeardownFault] {
        &self.faults
    }

    pub fn push(&mut self, fault: TeardownFault) {
        self.faults.push(fault);
    }

    pub fn merge(&mut self, other: TeardownReport) {
        self.faults.extend(other.faults);
    }

    /// 是否有力矩失能失败（机械臂可能仍带力矩）
    pub fn torque_may_be_enabled(&self) -> bool {
        self.faults
            .iter()
            .any(|f| f.stage == TeardownStage::DisableTorque)
    }
}

impl fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.faults.is_empty() {
            return f.write_str("teardown clean");
        }
        for (i, fault) in self.faults.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", fault)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use koch_protocol::{JointSelector, Register};

    fn write_fault() -> BusError {
        BusError::Write {
            register: Register::TorqueEnable,
            selector: JointSelector::All,
            message: "timeout".to_string(),
        }
    }

    #[test]
    fn test_is_fatal() {
        let io = RobotError::IoFault {
            arm: "follower".to_string(),
            operation: "write Goal_Position".to_string(),
            source: write_fault(),
        };
        assert!(io.is_fatal());
        assert!(io.bus_error().is_some());

        let transition = RobotError::InvalidTransition {
            arm: "follower".to_string(),
            from: "Idle".to_string(),
            to: "Enabled".to_string(),
        };
        assert!(!transition.is_fatal());
        assert_eq!(
            transition.to_string(),
            "Invalid state transition on follower arm: Idle -> Enabled"
        );
    }

    #[test]
    fn test_teardown_report() {
        let mut report = TeardownReport::default();
        assert!(report.is_clean());
        assert_eq!(report.to_string(), "teardown clean");

        report.push(TeardownFault {
            arm: "follower".to_string(),
            stage: TeardownStage::DisableTorque,
            source: write_fault(),
        });
        assert!(!report.is_clean());
        assert!(report.torque_may_be_enabled());
        assert_eq!(
            report.to_string(),
            "Teardown of follower arm failed to disable torque: \
             Write of Torque_Enable (all joints) failed: timeout"
        );
    }
}
