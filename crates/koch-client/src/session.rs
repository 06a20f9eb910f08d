//! 安全生命周期控制器
//!
//! ```text
//! Idle ──connect()──▶ Connected(Disabled) ──enable()──▶ Connected(Enabled)
//!  ▲                        ▲    │                          │
//!  │                        └────┼───────disable()──────────┘
//!  └────────teardown()───────────┘ (从任意 Connected 状态)
//! ```
//!
//! - `teardown()` 先强制失能（即使已经失能）再断开连接，是离开 Connected 的唯一路径
//! - `teardown()` 幂等：Idle 上调用直接返回空报告
//! - `teardown()` 从不抛出错误，失败收集在 [`TeardownReport`] 中
//! - `Drop` 时自动 teardown，panic 路径同样覆盖
//! - `connect()` 失败时保持 Idle，不产生 teardown 义务

use crate::config::SessionConfig;
use crate::error::{RobotError, TeardownFault, TeardownReport, TeardownStage};
use koch_bus::ActuatorBus;
use koch_protocol::{Joint, JointSelector, JointVector, OperatingMode, Register, TorqueMode};
use std::fmt;
use tracing::{debug, error, info, warn};

/// 力矩状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorqueState {
    Disabled,
    Enabled,
}

/// 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Connected(TorqueState),
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Idle => f.write_str("Idle"),
            LifecycleState::Connected(TorqueState::Disabled) => f.write_str("Connected(Disabled)"),
            LifecycleState::Connected(TorqueState::Enabled) => f.write_str("Connected(Enabled)"),
        }
    }
}

/// 单臂会话
///
/// 独占一条总线连接和该臂的力矩状态。
pub struct ArmSession<B: ActuatorBus> {
    bus: B,
    config: SessionConfig,
    state: LifecycleState,
    /// 本次会话是否修改过 Profile_Velocity（teardown 时需要复位）
    profile_velocity_dirty: bool,
}

impl<B: ActuatorBus> ArmSession<B> {
    pub fn new(bus: B, config: SessionConfig) -> Self {
        Self {
            bus,
            config,
            state: LifecycleState::Idle,
            profile_velocity_dirty: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.arm.name
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, LifecycleState::Connected(_))
    }

    pub fn torque_state(&self) -> Option<TorqueState> {
        match self.state {
            LifecycleState::Idle => None,
            LifecycleState::Connected(torque) => Some(torque),
        }
    }

    /// 底层总线（只读访问，用于仿真和测试观察）
    pub fn bus(&self) -> &B {
        &self.bus
    }

    // ==================== 状态转换 ====================

    /// Idle → Connected(Disabled)
    pub fn connect(&mut self) -> Result<(), RobotError> {
        if self.state != LifecycleState::Idle {
            return Err(self.invalid_transition("Connected"));
        }

        debug!(arm = self.name(), port = self.bus.port(), "Connecting");
        self.bus.connect().map_err(|source| RobotError::ConnectionFault {
            arm: self.config.arm.name.clone(),
            source,
        })?;

        self.state = LifecycleState::Connected(TorqueState::Disabled);
        info!(arm = self.name(), port = self.bus.port(), "Arm connected");
        Ok(())
    }

    /// Connected(Disabled) → Connected(Enabled)
    ///
    /// 配置了轮廓速度时，使能后立即写入。
    pub fn enable(&mut self) -> Result<(), RobotError> {
        match self.state {
            LifecycleState::Idle => return Err(self.invalid_transition("Connected(Enabled)")),
            LifecycleState::Connected(TorqueState::Enabled) => return Ok(()),
            LifecycleState::Connected(TorqueState::Disabled) => {},
        }

        self.bus
            .write_all(Register::TorqueEnable, TorqueMode::Enabled.into())
            .map_err(|source| self.io_fault("enable torque", source))?;
        self.state = LifecycleState::Connected(TorqueState::Enabled);
        info!(arm = self.name(), "Torque enabled");

        if let Some(velocity) = self.config.profile_velocity {
            self.set_profile_velocity(velocity)?;
        }
        Ok(())
    }

    /// Connected(*) → Connected(Disabled)
    pub fn disable(&mut self) -> Result<(), RobotError> {
        if self.state == LifecycleState::Idle {
            return Err(self.invalid_transition("Connected(Disabled)"));
        }

        self.bus
            .write_all(Register::TorqueEnable, TorqueMode::Disabled.into())
            .map_err(|source| self.io_fault("disable torque", source))?;
        self.state = LifecycleState::Connected(TorqueState::Disabled);
        info!(arm = self.name(), "Torque disabled");
        Ok(())
    }

    /// Connected(*) → Idle
    ///
    /// 依次：复位轮廓速度（如修改过）、强制失能、断开连接。
    /// 每一步的失败都只记录，后续步骤照常执行。
    pub fn teardown(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        if self.state == LifecycleState::Idle {
            return report;
        }

        info!(arm = self.name(), state = %self.state, "Tearing down");

        if self.profile_velocity_dirty {
            if let Err(source) = self.bus.write_all(Register::ProfileVelocity, 0) {
                report.push(self.teardown_fault(TeardownStage::ResetProfileVelocity, source));
            }
            self.profile_velocity_dirty = false;
        }

        match self
            .bus
            .write_all(Register::TorqueEnable, TorqueMode::Disabled.into())
        {
            Ok(()) => info!(arm = self.name(), "Torque disabled"),
            Err(source) => report.push(self.teardown_fault(TeardownStage::DisableTorque, source)),
        }

        if let Err(source) = self.bus.disconnect() {
            report.push(self.teardown_fault(TeardownStage::Disconnect, source));
        }

        self.state = LifecycleState::Idle;
        if report.is_clean() {
            info!(arm = self.name(), "Disconnected");
        }
        report
    }

    // ==================== 命令 ====================

    /// 读取所有关节当前位置
    pub fn read_positions(&mut self) -> Result<JointVector, RobotError> {
        self.read_vector(Register::PresentPosition)
    }

    /// 读取所有关节输入电压（0.1V 单位）
    pub fn read_voltages(&mut self) -> Result<JointVector, RobotError> {
        self.read_vector(Register::PresentInputVoltage)
    }

    pub fn read_vector(&mut self, register: Register) -> Result<JointVector, RobotError> {
        self.require_connected(register.name())?;
        self.bus
            .read_vector(register)
            .map_err(|source| self.io_fault(format!("read {}", register), source))
    }

    pub fn read_joint(&mut self, register: Register, joint: Joint) -> Result<i32, RobotError> {
        self.require_connected(register.name())?;
        self.bus
            .read_joint(register, joint)
            .map_err(|source| self.io_fault(format!("read {} ({})", register, joint), source))
    }

    /// 全向量目标位置写入（需要力矩使能）
    pub fn command_positions(&mut self, target: &JointVector) -> Result<(), RobotError> {
        self.require_enabled()?;
        self.bus
            .write_vector(Register::GoalPosition, target)
            .map_err(|source| self.io_fault("write Goal_Position", source))
    }

    /// 单关节目标位置写入（需要力矩使能）
    pub fn command_joint(&mut self, joint: Joint, position: i32) -> Result<(), RobotError> {
        self.require_enabled()?;
        self.bus
            .write_joint(Register::GoalPosition, joint, position)
            .map_err(|source| self.io_fault(format!("write Goal_Position ({})", joint), source))
    }

    /// 写入轮廓速度（0 = 不限速）
    pub fn set_profile_velocity(&mut self, velocity: i32) -> Result<(), RobotError> {
        self.require_connected("Profile_Velocity")?;
        if velocity < 0 {
            return Err(RobotError::Config(format!(
                "Profile velocity must be non-negative, got {}",
                velocity
            )));
        }

        self.profile_velocity_dirty = true;
        self.bus
            .write_all(Register::ProfileVelocity, velocity)
            .map_err(|source| self.io_fault("write Profile_Velocity", source))?;
        debug!(arm = self.name(), velocity, "Profile velocity set");
        Ok(())
    }

    pub fn set_led(&mut self, joint: Joint, on: bool) -> Result<(), RobotError> {
        self.require_connected("LED")?;
        self.bus
            .write_joint(Register::Led, joint, on as i32)
            .map_err(|source| self.io_fault(format!("write LED ({})", joint), source))
    }

    /// 修改单个关节的运行模式：失能该关节 → 写 Operating_Mode → 重新使能
    pub fn reconfigure_operating_mode(
        &mut self,
        joint: Joint,
        mode: OperatingMode,
    ) -> Result<(), RobotError> {
        self.require_enabled()?;
        let selector = JointSelector::One(joint);

        self.bus
            .write_joint(Register::TorqueEnable, joint, TorqueMode::Disabled.into())
            .map_err(|source| self.io_fault(format!("disable torque ({})", selector), source))?;
        self.bus
            .write_joint(Register::OperatingMode, joint, mode.into())
            .map_err(|source| self.io_fault(format!("write Operating_Mode ({})", selector), source))?;
        self.bus
            .write_joint(Register::TorqueEnable, joint, TorqueMode::Enabled.into())
            .map_err(|source| self.io_fault(format!("enable torque ({})", selector), source))?;

        info!(arm = self.name(), %joint, ?mode, "Operating mode reconfigured");
        Ok(())
    }

    // ==================== 内部辅助 ====================

    fn require_connected(&self, what: &str) -> Result<(), RobotError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(self.invalid_transition(what))
        }
    }

    fn require_enabled(&self) -> Result<(), RobotError> {
        if self.state == LifecycleState::Connected(TorqueState::Enabled) {
            Ok(())
        } else {
            Err(self.invalid_transition("motion command"))
        }
    }

    fn invalid_transition(&self, to: &str) -> RobotError {
        RobotError::InvalidTransition {
            arm: self.config.arm.name.clone(),
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }

    fn io_fault(&self, operation: impl Into<String>, source: koch_bus::BusError) -> RobotError {
        let operation = operation.into();
        warn!(arm = self.name(), %operation, error = %source, "Bus I/O fault");
        RobotError::IoFault {
            arm: self.config.arm.name.clone(),
            operation,
            source,
        }
    }

    fn teardown_fault(&self, stage: TeardownStage, source: koch_bus::BusError) -> TeardownFault {
        let fault = TeardownFault {
            arm: self.config.arm.name.clone(),
            stage,
            source,
        };
        error!("{}", fault);
        fault
    }
}

impl<B: ActuatorBus> Drop for ArmSession<B> {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!(arm = self.name(), "Session dropped while connected, tearing down");
            // 失败已在 teardown 内部记录
            let _ = self.teardown();
        }
    }
}

/// 主从臂会话对
///
/// 主动臂只读（不使能力矩），从动臂执行运动。
pub struct ArmPair<L: ActuatorBus, F: ActuatorBus> {
    leader: ArmSession<L>,
    follower: ArmSession<F>,
}

impl<L: ActuatorBus, F: ActuatorBus> ArmPair<L, F> {
    pub fn new(leader: ArmSession<L>, follower: ArmSession<F>) -> Self {
        Self { leader, follower }
    }

    /// 先连接主动臂，再连接从动臂；从动臂失败时拆除已连接的主动臂
    pub fn connect(&mut self) -> Result<(), RobotError> {
        self.leader.connect()?;
        if let Err(err) = self.follower.connect() {
            let report = self.leader.teardown();
            if !report.is_clean() {
                warn!(%report, "Leader teardown after follower connect failure was not clean");
            }
            return Err(err);
        }
        Ok(())
    }

    pub fn leader(&self) -> &ArmSession<L> {
        &self.leader
    }

    pub fn follower(&self) -> &ArmSession<F> {
        &self.follower
    }

    pub fn leader_mut(&mut self) -> &mut ArmSession<L> {
        &mut self.leader
    }

    pub fn follower_mut(&mut self) -> &mut ArmSession<F> {
        &mut self.follower
    }

    /// 同时借用两个会话（用于镜像循环）
    pub fn split_mut(&mut self) -> (&mut ArmSession<L>, &mut ArmSession<F>) {
        (&mut self.leader, &mut self.follower)
    }

    /// 先拆除从动臂，再拆除主动臂；两者都一定执行
    pub fn teardown(&mut self) -> TeardownReport {
        let mut report = self.follower.teardown();
        report.merge(self.leader.teardown());
        report
    }
}

/// 可拆除的生命周期资源
pub trait Lifecycle {
    fn teardown(&mut self) -> TeardownReport;

    fn is_idle(&self) -> bool;
}

impl<B: ActuatorBus> Lifecycle for ArmSession<B> {
    fn teardown(&mut self) -> TeardownReport {
        ArmSession::teardown(self)
    }

    fn is_idle(&self) -> bool {
        self.state == LifecycleState::Idle
    }
}

impl<L: ActuatorBus, F: ActuatorBus> Lifecycle for ArmPair<L, F> {
    fn teardown(&mut self) -> TeardownReport {
        ArmPair::teardown(self)
    }

    fn is_idle(&self) -> bool {
        self.leader.is_idle() && self.follower.is_idle()
    }
}

/// 执行结果
///
/// `Declined` 表示操作员拒绝确认：不是错误，力矩从未使能。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed(T),
    Cancelled(T),
    Declined,
}

impl<T> Outcome<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Completed(v) | Outcome::Cancelled(v) => Some(v),
            Outcome::Declined => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Completed(v) => Outcome::Completed(f(v)),
            Outcome::Cancelled(v) => Outcome::Cancelled(f(v)),
            Outcome::Declined => Outcome::Declined,
        }
    }
}

/// 受监督执行的结果：执行体的结果 + teardown 报告
#[derive(Debug)]
pub struct Supervised<T> {
    pub result: Result<T, RobotError>,
    pub teardown: TeardownReport,
}

impl<T> Supervised<T> {
    /// 执行体成功且 teardown 干净
    pub fn is_clean(&self) -> bool {
        self.result.is_ok() && self.teardown.is_clean()
    }
}

/// panic 时仍执行 teardown
struct TeardownGuard<'a, L: Lifecycle> {
    lifecycle: &'a mut L,
    armed: bool,
}

impl<L: Lifecycle> Drop for TeardownGuard<'_, L> {
    fn drop(&mut self) {
        if self.armed {
            error!("Supervised body panicked, tearing down");
            let _ = self.lifecycle.teardown();
        }
    }
}

/// 在 teardown 保护下运行 `body`
///
/// 无论 `body` 成功、返回错误还是 panic，`lifecycle` 都会被拆除。
/// teardown 失败不会覆盖 `body` 的结果。
pub fn supervise<L, T, F>(lifecycle: &mut L, body: F) -> Supervised<T>
where
    L: Lifecycle,
    F: FnOnce(&mut L) -> Result<T, RobotError>,
{
    let mut guard = TeardownGuard {
        lifecycle,
        armed: true,
    };
    let result = body(&mut *guard.lifecycle);
    guard.armed = false;

    if let Err(err) = &result {
        error!(error = %err, "Execution aborted");
    }
    let teardown = guard.lifecycle.teardown();
    Supervised { result, teardown }
}
