//! 执行环境
//!
//! - 按配置创建会话（总线后端 + 电机表）
//! - Ctrl+C → 取消令牌
//! - 阻塞执行放到 `spawn_blocking`，不阻塞 tokio worker
//! - 统一输出执行结果和 teardown 报告

use crate::config::{Backend, CliConfig};
use anyhow::{Context, Result, anyhow};
use koch_bus::{ActuatorBus, SimConfig, SimulatedBus};
use koch_client::control::CancelToken;
use koch_client::{ArmConfig, ArmPair, ArmSession, Outcome, SessionConfig, Supervised};
use koch_protocol::JointVector;

/// CLI 使用的总线类型
pub type CliBus = Box<dyn ActuatorBus + Send>;

fn open_bus(config: &CliConfig, arm: &ArmConfig, positions: JointVector) -> CliBus {
    match config.backend {
        Backend::Sim => Box::new(SimulatedBus::new(SimConfig {
            port: arm.port.clone(),
            initial_positions: positions,
            input_voltage: config.sim.input_voltage,
        })),
    }
}

/// 从动臂会话（未连接）
pub fn follower_session(config: &CliConfig, profile_velocity: Option<i32>) -> Result<ArmSession<CliBus>> {
    config.follower.validate().context("从动臂配置无效")?;
    let bus = open_bus(config, &config.follower, config.sim.follower_positions);
    let mut session_config = SessionConfig::new(config.follower.clone());
    session_config.profile_velocity = profile_velocity;
    Ok(ArmSession::new(bus, session_config))
}

/// 主动臂会话（未连接，只读）
pub fn leader_session(config: &CliConfig) -> Result<ArmSession<CliBus>> {
    config.leader.validate().context("主动臂配置无效")?;
    let bus = open_bus(config, &config.leader, config.sim.leader_positions);
    Ok(ArmSession::new(bus, SessionConfig::new(config.leader.clone())))
}

/// 主从臂会话对（未连接）
pub fn arm_pair(config: &CliConfig, follower_velocity: Option<i32>) -> Result<ArmPair<CliBus, CliBus>> {
    Ok(ArmPair::new(
        leader_session(config)?,
        follower_session(config, follower_velocity)?,
    ))
}

/// 注册 Ctrl+C 处理器，返回对应的取消令牌
pub fn cancel_on_ctrl_c() -> CancelToken {
    let cancel = CancelToken::new();
    let remote = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!();
            println!("🛑 收到停止信号，正在停止机械臂...");
            remote.cancel();
        }
    });
    cancel
}

/// 在专用 OS 线程中执行阻塞任务
pub async fn run_blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| anyhow!("任务执行失败: {}", e))?
}

/// 输出受监督执行的结果
///
/// teardown 失败总是打印；执行错误转为 `anyhow::Error`（非零退出码）。
pub fn finish<T>(supervised: Supervised<Outcome<T>>, summary: impl FnOnce(&T)) -> Result<()> {
    let Supervised { result, teardown } = supervised;

    if !teardown.is_clean() {
        eprintln!("⚠️  安全停止未完全成功: {}", teardown);
        if teardown.torque_may_be_enabled() {
            eprintln!("⚠️  力矩可能仍然使能，请手动断开电源！");
        }
    }

    match result.context("执行失败")? {
        Outcome::Completed(value) => {
            summary(&value);
            println!("✅ 完成，力矩已失能");
        },
        Outcome::Cancelled(value) => {
            summary(&value);
            println!("⚠️ 被用户中断，力矩已失能");
        },
        Outcome::Declined => {
            println!("❌ 操作已取消（力矩未使能）");
        },
    }

    if teardown.is_clean() {
        Ok(())
    } else {
        Err(anyhow!("安全停止失败: {}", teardown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use koch_client::TeardownReport;

    #[test]
    fn test_sessions_start_idle() {
        let config = CliConfig::default();
        let pair = arm_pair(&config, Some(20)).unwrap();
        assert!(!pair.leader().is_connected());
        assert_eq!(pair.follower().config().profile_velocity, Some(20));
        assert_eq!(pair.leader().name(), "leader");
    }

    #[test]
    fn test_invalid_motor_table_rejected() {
        let mut config = CliConfig::default();
        config.follower.motors.pop();
        assert!(follower_session(&config, None).is_err());
    }

    #[test]
    fn test_finish_declined_is_success() {
        let supervised: Supervised<Outcome<()>> = Supervised {
            result: Ok(Outcome::Declined),
            teardown: TeardownReport::default(),
        };
        assert!(finish(supervised, |_| {}).is_ok());
    }

    #[test]
    fn test_finish_error_is_failure() {
        let supervised: Supervised<Outcome<()>> = Supervised {
            result: Err(koch_client::RobotError::Config("bad".to_string())),
            teardown: TeardownReport::default(),
        };
        assert!(finish(supervised, |_| {}).is_err());
    }
}
