//! 执行引擎
//!
//! - `mirror` - 固定频率镜像循环（遥操作）
//! - `playback` - 序列回放
//! - `step` - 交互式单步模式
//! - `pacer` - 节拍器（真实时间 / 虚拟时间）
//! - `cancel` - 协作式取消令牌

pub mod cancel;
pub mod mirror;
pub mod pacer;
pub mod playback;
pub mod step;

// 重新导出常用类型
pub use cancel::CancelToken;
pub use mirror::{MirrorConfig, MirrorProgress, MirrorReport, run_mirror};
pub use pacer::{Pacer, SpinPacer, VirtualPacer};
pub use playback::{PlaybackConfig, PlaybackProgress, PlaybackReport, play_sequence};
pub use step::{
    CommandSource, KeyBindings, StepCommand, StepConfig, StepController, StepEvent, StepReport,
    StepSize, run_step_mode,
};
