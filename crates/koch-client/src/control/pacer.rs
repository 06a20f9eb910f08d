//! 节拍器
//!
//! 执行引擎只在这里挂起（循环节拍、姿态保持）。
//! - [`SpinPacer`]: 真实时间，使用 `spin_sleep` 实现低抖动延时
//! - [`VirtualPacer`]: 虚拟时间，`sleep` 只推进时钟，用于仿真和测试

use spin_sleep::SpinSleeper;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 时间源 + 挂起点
pub trait Pacer {
    fn now(&self) -> Instant;

    fn sleep(&mut self, duration: Duration);

    /// 挂起到指定时刻（已过期则立即返回）
    fn sleep_until(&mut self, deadline: Instant) {
        let now = self.now();
        if deadline > now {
            self.sleep(deadline - now);
        }
    }
}

impl<P: Pacer + ?Sized> Pacer for &mut P {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&mut self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// 真实时间节拍器
pub struct SpinPacer {
    sleeper: SpinSleeper,
}

impl SpinPacer {
    pub fn new() -> Self {
        Self {
            sleeper: SpinSleeper::default(),
        }
    }
}

impl Default for SpinPacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Pacer for SpinPacer {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&mut self, duration: Duration) {
        self.sleeper.sleep(duration);
    }
}

/// 虚拟时间节拍器
///
/// 克隆共享同一个时钟，测试可以在总线钩子里调用 [`VirtualPacer::advance`] 模拟慢操作。
#[derive(Debug, Clone)]
pub struct VirtualPacer {
    origin: Instant,
    elapsed_nanos: Arc<AtomicU64>,
}

impl VirtualPacer {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed_nanos: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 推进虚拟时钟（不挂起）
    pub fn advance(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.elapsed_nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    /// 自创建以来的虚拟时间
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_nanos.load(Ordering::SeqCst))
    }
}

impl Default for VirtualPacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Pacer for VirtualPacer {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&mut self, duration: Duration) {
        self.advance(duration);
    }
}
