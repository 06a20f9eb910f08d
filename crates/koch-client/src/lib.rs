//! # Koch Client
//!
//! 机械臂运动执行与安全生命周期层：
//! - 安全生命周期控制器（连接 → 使能 → 运行 → 失能 → 断开，所有退出路径都会失能）
//! - 执行引擎（镜像循环、序列回放、交互式单步）
//! - 诊断（电压、位置、单关节探测）
//!
//! # 使用示例
//!
//! ```rust
//! use koch_bus::{SimConfig, SimulatedBus};
//! use koch_client::control::{CancelToken, PlaybackConfig, VirtualPacer, play_sequence};
//! use koch_client::{ArmConfig, ArmSession, SessionConfig, supervise};
//! use koch_tools::{BasePosition, Choreography};
//!
//! let bus = SimulatedBus::new(SimConfig::default());
//! let config = SessionConfig::new(ArmConfig::koch_follower("sim://follower"))
//!     .with_profile_velocity(15);
//! let mut session = ArmSession::new(bus, config);
//! session.connect().unwrap();
//!
//! let choreography = Choreography::builtin();
//! let supervised = supervise(&mut session, |session| {
//!     session.enable()?;
//!     let base = BasePosition::new(session.read_positions()?);
//!     let sequence = choreography.sequence("wave")?;
//!     play_sequence(
//!         session,
//!         &choreography.poses,
//!         &base,
//!         sequence,
//!         &PlaybackConfig::default(),
//!         &mut VirtualPacer::new(),
//!         &CancelToken::new(),
//!         |_| {},
//!     )
//! });
//!
//! assert!(supervised.is_clean());
//! assert!(!session.is_connected());
//! ```

pub mod config;
pub mod control;
pub mod diagnostics;
pub mod error;
pub mod session;

// 重新导出常用类型
pub use config::{ArmConfig, MotorConfig, MotorModel, SessionConfig};
pub use diagnostics::{
    PositionReport, ProbeConfig, ProbeLeg, ProbeReport, Verdict, VoltageReport,
};
pub use error::{RobotError, TeardownFault, TeardownReport, TeardownStage};
pub use session::{
    ArmPair, ArmSession, Lifecycle, LifecycleState, Outcome, Supervised, TorqueState, supervise,
};
