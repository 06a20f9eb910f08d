//! 交互式单步模式
//!
//! 维护一个从初始读取得到的实时目标向量，逐条处理操作员命令：
//! - 单关节 ± 步长（恰好一次单关节目标位置写入，不广播整个向量）
//! - 步长 ± 增量（不低于最小值）
//! - 回到固定的 home 位置（逐关节写入）
//! - 位置报告 / 电压诊断（只读，失败时报告并继续）
//! - 退出
//!
//! 关节写入失败结束本模式并把错误交给 teardown。

use super::cancel::CancelToken;
use super::pacer::Pacer;
use crate::RobotError;
use crate::diagnostics::{self, VoltageReport};
use crate::session::{ArmSession, Outcome};
use koch_bus::ActuatorBus;
use koch_protocol::{Joint, JointVector, LOW_VOLTAGE_THRESHOLD_DECIVOLTS};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 单步命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepCommand {
    /// 关节目标 + 步长
    Increase(Joint),
    /// 关节目标 - 步长
    Decrease(Joint),
    IncreaseStep,
    DecreaseStep,
    Home,
    Report,
    Voltage,
    Quit,
}

impl fmt::Display for StepCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepCommand::Increase(joint) => write!(f, "{} +step", joint),
            StepCommand::Decrease(joint) => write!(f, "{} -step", joint),
            StepCommand::IncreaseStep => f.write_str("increase step size"),
            StepCommand::DecreaseStep => f.write_str("decrease step size"),
            StepCommand::Home => f.write_str("go to home position"),
            StepCommand::Report => f.write_str("report positions"),
            StepCommand::Voltage => f.write_str("check voltage"),
            StepCommand::Quit => f.write_str("quit"),
        }
    }
}

/// 按键绑定（单字符命令，忽略大小写和首尾空白）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBindings {
    keys: BTreeMap<String, StepCommand>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::from_pairs([
            ("w", StepCommand::Increase(Joint::ElbowFlex)),
            ("s", StepCommand::Decrease(Joint::ElbowFlex)),
            ("a", StepCommand::Increase(Joint::ShoulderPan)),
            ("d", StepCommand::Decrease(Joint::ShoulderPan)),
            ("+", StepCommand::IncreaseStep),
            ("-", StepCommand::DecreaseStep),
            ("h", StepCommand::Home),
            ("r", StepCommand::Report),
            ("v", StepCommand::Voltage),
            ("q", StepCommand::Quit),
        ])
    }
}

impl KeyBindings {
    pub fn from_pairs<S: Into<String>>(pairs: impl IntoIterator<Item = (S, StepCommand)>) -> Self {
        Self {
            keys: pairs
                .into_iter()
                .map(|(key, cmd)| (key.into().trim().to_lowercase(), cmd))
                .collect(),
        }
    }

    pub fn bind(&mut self, key: impl Into<String>, command: StepCommand) {
        self.keys.insert(key.into().trim().to_lowercase(), command);
    }

    pub fn parse(&self, token: &str) -> Option<StepCommand> {
        self.keys.get(&token.trim().to_lowercase()).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, StepCommand)> {
        self.keys.iter().map(|(key, cmd)| (key.as_str(), *cmd))
    }

    /// 所有按键，如 "+/-/a/d/h/q/r/s/v/w"
    pub fn key_list(&self) -> String {
        self.keys.keys().map(String::as_str).collect::<Vec<_>>().join("/")
    }
}

/// 步长（带下限）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSize {
    value: i32,
    delta: i32,
    min: i32,
}

impl Default for StepSize {
    fn default() -> Self {
        Self {
            value: 100,
            delta: 50,
            min: 50,
        }
    }
}

impl StepSize {
    /// `min` 至少为 1，初始值不低于 `min`
    pub fn new(value: i32, delta: i32, min: i32) -> Self {
        let min = min.max(1);
        Self {
            value: value.max(min),
            delta: delta.max(1),
            min,
        }
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn increase(&mut self) {
        self.value = self.value.saturating_add(self.delta);
    }

    /// 减小步长；已在下限时返回 `false`
    pub fn decrease(&mut self) -> bool {
        if self.value <= self.min {
            return false;
        }
        self.value = (self.value - self.delta).max(self.min);
        true
    }
}

/// 单步模式配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepConfig {
    pub step: StepSize,
    pub bindings: KeyBindings,
    /// home 位置（按顺序逐关节写入）
    pub home: Vec<(Joint, i32)>,
    /// 初始读取失败时使用的目标
    pub fallback_target: JointVector,
    pub nudge_settle: Duration,
    pub home_settle: Duration,
    pub low_voltage_threshold: i32,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            step: StepSize::default(),
            bindings: KeyBindings::default(),
            home: vec![(Joint::ShoulderPan, 2000), (Joint::ElbowFlex, 3200)],
            fallback_target: JointVector::new([2000, 1609, 3300, 3148, 1009, 2507]),
            nudge_settle: Duration::from_millis(200),
            home_settle: Duration::from_millis(500),
            low_voltage_threshold: LOW_VOLTAGE_THRESHOLD_DECIVOLTS,
        }
    }
}

/// 单步模式事件（由控制台渲染）
#[derive(Debug, Clone, PartialEq)]
pub enum StepEvent {
    /// 初始读取失败，使用后备目标
    SeedFallback { error: String, target: JointVector },
    Seeded { target: JointVector },
    Moved { joint: Joint, target: i32 },
    StepChanged { value: i32 },
    StepAtMinimum { min: i32 },
    HomeReached { target: JointVector },
    Positions(JointVector),
    PositionsFailed(String),
    Voltage(VoltageReport),
    VoltageFailed(String),
    Unknown { token: String, keys: String },
}

/// 命令来源（控制台、脚本、测试）
pub trait CommandSource {
    /// 下一行输入；`None` 表示输入结束
    fn next_line(&mut self) -> Option<String>;
}

impl<I: Iterator<Item = String>> CommandSource for I {
    fn next_line(&mut self) -> Option<String> {
        self.next()
    }
}

/// 单步控制器（纯状态，不接触总线）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepController {
    target: JointVector,
    step: StepSize,
}

impl StepController {
    pub fn new(target: JointVector, step: StepSize) -> Self {
        Self { target, step }
    }

    pub fn target(&self) -> &JointVector {
        &self.target
    }

    pub fn step(&self) -> &StepSize {
        &self.step
    }

    /// 单关节偏移，返回新的目标值
    pub fn nudge(&mut self, joint: Joint, sign: i32) -> i32 {
        let value = self.target[joint].saturating_add(sign * self.step.value());
        self.target[joint] = value;
        value
    }

    pub fn set_joint(&mut self, joint: Joint, value: i32) {
        self.target[joint] = value;
    }

    pub fn step_mut(&mut self) -> &mut StepSize {
        &mut self.step
    }
}

/// 单步模式报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub commands: usize,
    pub writes: usize,
    pub final_target: JointVector,
    pub final_step: i32,
}

/// 运行单步模式
///
/// 会话必须已使能力矩。`q`、输入结束或取消都正常结束（取消返回 `Cancelled`）。
pub fn run_step_mode<B, S, P, E>(
    session: &mut ArmSession<B>,
    source: &mut S,
    config: &StepConfig,
    pacer: &mut P,
    cancel: &CancelToken,
    mut on_event: E,
) -> Result<Outcome<StepReport>, RobotError>
where
    B: ActuatorBus,
    S: CommandSource + ?Sized,
    P: Pacer,
    E: FnMut(&StepEvent),
{
    let seed = match session.read_positions() {
        Ok(positions) => {
            on_event(&StepEvent::Seeded { target: positions });
            positions
        },
        Err(err) => {
            warn!(error = %err, "Could not read initial positions, using fallback target");
            on_event(&StepEvent::SeedFallback {
                error: err.to_string(),
                target: config.fallback_target,
            });
            config.fallback_target
        },
    };

    let mut controller = StepController::new(seed, config.step);
    let mut commands = 0usize;
    let mut writes = 0usize;
    let mut cancelled = false;

    info!(target = %seed, step = controller.step().value(), "Step mode started");

    loop {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        let Some(line) = source.next_line() else {
            // 控制台在取消时会关闭输入
            cancelled = cancel.is_cancelled();
            debug!(cancelled, "Command source exhausted");
            break;
        };
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        let token = line.trim();
        if token.is_empty() {
            continue;
        }

        let Some(command) = config.bindings.parse(token) else {
            on_event(&StepEvent::Unknown {
                token: token.to_string(),
                keys: config.bindings.key_list(),
            });
            continue;
        };
        commands += 1;
        debug!(%command, "Step command");

        match command {
            StepCommand::Increase(joint) | StepCommand::Decrease(joint) => {
                let sign = if matches!(command, StepCommand::Increase(_)) { 1 } else { -1 };
                let target = controller.nudge(joint, sign);
                session.command_joint(joint, target)?;
                writes += 1;
                on_event(&StepEvent::Moved { joint, target });
                pacer.sleep(config.nudge_settle);
            },
            StepCommand::IncreaseStep => {
                controller.step_mut().increase();
                on_event(&StepEvent::StepChanged {
                    value: controller.step().value(),
                });
            },
            StepCommand::DecreaseStep => {
                if controller.step_mut().decrease() {
                    on_event(&StepEvent::StepChanged {
                        value: controller.step().value(),
                    });
                } else {
                    on_event(&StepEvent::StepAtMinimum {
                        min: controller.step().min(),
                    });
                }
            },
            StepCommand::Home => {
                for &(joint, value) in &config.home {
                    controller.set_joint(joint, value);
                    session.command_joint(joint, value)?;
                    writes += 1;
                    pacer.sleep(config.home_settle);
                }
                on_event(&StepEvent::HomeReached {
                    target: *controller.target(),
                });
            },
            StepCommand::Report => match session.read_positions() {
                Ok(positions) => on_event(&StepEvent::Positions(positions)),
                Err(err) => on_event(&StepEvent::PositionsFailed(err.to_string())),
            },
            StepCommand::Voltage => {
                match diagnostics::check_voltage_with(session, config.low_voltage_threshold) {
                    Ok(report) => on_event(&StepEvent::Voltage(report)),
                    Err(err) => on_event(&StepEvent::VoltageFailed(err.to_string())),
                }
            },
            StepCommand::Quit => break,
        }
    }

    let report = StepReport {
        commands,
        writes,
        final_target: *controller.target(),
        final_step: controller.step().value(),
    };
    info!(commands, writes, "Step mode finished");

    Ok(if cancelled {
        Outcome::Cancelled(report)
    } else {
        Outcome::Completed(report)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bindings() {
        let bindings = KeyBindings::default();
        assert_eq!(bindings.parse("w"), Some(StepCommand::Increase(Joint::ElbowFlex)));
        assert_eq!(bindings.parse(" D "), Some(StepCommand::Decrease(Joint::ShoulderPan)));
        assert_eq!(bindings.parse("x"), None);
        assert_eq!(bindings.key_list(), "+/-/a/d/h/q/r/s/v/w");
    }

    #[test]
    fn test_rebind() {
        let mut bindings = KeyBindings::default();
        bindings.bind("G", StepCommand::Increase(Joint::Gripper));
        assert_eq!(bindings.parse("g"), Some(StepCommand::Increase(Joint::Gripper)));
    }

    #[test]
    fn test_step_size_floor() {
        let mut step = StepSize::default();
        assert!(step.decrease());
        assert_eq!(step.value(), 50);
        assert!(!step.decrease());
        assert_eq!(step.value(), 50);

        step.increase();
        step.increase();
        assert_eq!(step.value(), 150);
    }

    #[test]
    fn test_step_size_clamps_to_min() {
        let mut step = StepSize::new(70, 50, 50);
        assert!(step.decrease());
        assert_eq!(step.value(), 50);

        let step = StepSize::new(10, 0, 0);
        assert_eq!(step.min(), 1);
        assert_eq!(step.value(), 10);
    }

    #[test]
    fn test_controller_nudge() {
        let mut controller = StepController::new(JointVector::splat(1000), StepSize::default());
        assert_eq!(controller.nudge(Joint::ElbowFlex, 1), 1100);
        assert_eq!(controller.nudge(Joint::ShoulderPan, -1), 900);
        assert_eq!(controller.target()[Joint::Gripper], 1000);
    }
}
