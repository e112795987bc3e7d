//! 软件定时器
//!
//! 定时器本身只是一个锁存状态: `Dormant` / `Armed { deadline }` / `Fired`。
//! 中断里调用 [`SoftTimer::on_edge`] 只改写截止时间并踢醒服务，回调
//! 总是在定时器服务上下文中执行 (不在中断中)，且不得阻塞。
//!
//! 去抖语义 (单次定时器):
//!
//! ```text
//!   edge   |  |   |                          |
//!   armed  [--50ms--> 重新开始 --50ms-->     [--50ms-->
//!   fire                           ^ last+50ms         ^
//! ```
//!
//! 一串抖动最多触发一次，时间为最后一个边沿之后 `period`。服务被饿死时
//! 触发会推迟而不会丢失。

use core::cell::Cell;

use embassy_futures::select::select;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Instant, Timer};
use embedded_hal_async::digital::Wait;

use crate::sync::{with_critical_section, CriticalSignal};
use crate::util::log::*;

/// 定时器模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerMode {
    /// 单次 (去抖)
    OneShot,
    /// 自动重装
    AutoReload,
}

/// 定时器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// 未启动
    Dormant,
    /// 已布防，到期时间
    Armed { deadline: Instant },
    /// 单次定时器已触发
    Fired,
}

/// 软件定时器
///
/// # Type Parameters
/// * `C` - 回调上下文 (通常是原语注册表)
pub struct SoftTimer<C: 'static> {
    name: &'static str,
    id: u32,
    period: Duration,
    mode: TimerMode,
    callback: fn(&C),
    state: Mutex<CriticalSectionRawMutex, Cell<TimerState>>,
    kick: CriticalSignal<()>,
}

impl<C: 'static> SoftTimer<C> {
    /// 创建未启动的定时器
    pub const fn new(name: &'static str, period: Duration, mode: TimerMode, id: u32, callback: fn(&C)) -> Self {
        Self {
            name,
            id,
            period,
            mode,
            callback,
            state: Mutex::new(Cell::new(TimerState::Dormant)),
            kick: CriticalSignal::new(),
        }
    }

    /// 名称
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 定时器 id
    pub fn id(&self) -> u32 {
        self.id
    }

    /// 周期
    pub fn period(&self) -> Duration {
        self.period
    }

    /// 边沿中断入口 (中断安全)
    pub fn on_edge(&self, now: Instant) {
        self.reset(now);
    }

    /// 启动或重新开始计时窗口
    ///
    /// # Returns
    /// 是否取消了一个尚未到期的触发
    pub fn reset(&self, now: Instant) -> bool {
        let deadline = now + self.period;
        let restarted = with_critical_section(|cs| {
            let state = self.state.borrow(cs);
            let was_armed = matches!(state.get(), TimerState::Armed { .. });
            state.set(TimerState::Armed { deadline });
            was_armed
        });
        self.kick.signal(());
        restarted
    }

    /// 停止
    pub fn stop(&self) {
        self.state.lock(|s| s.set(TimerState::Dormant));
        self.kick.signal(());
    }

    /// 当前状态
    pub fn state(&self) -> TimerState {
        self.state.lock(|s| s.get())
    }

    /// 到期时间 (仅在布防时)
    pub fn deadline(&self) -> Option<Instant> {
        match self.state() {
            TimerState::Armed { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// 检查是否到期，到期则推进状态
    ///
    /// # Returns
    /// 到期时返回本次触发的时间 (截止时间，而不是检查时间)
    pub fn poll_expired(&self, now: Instant) -> Option<Instant> {
        self.state.lock(|s| match s.get() {
            TimerState::Armed { deadline } if now >= deadline => {
                let next = match self.mode {
                    TimerMode::OneShot => TimerState::Fired,
                    TimerMode::AutoReload => TimerState::Armed {
                        deadline: deadline + self.period,
                    },
                };
                s.set(next);
                Some(deadline)
            }
            _ => None,
        })
    }

    /// 到期则在当前上下文执行回调
    pub fn fire_if_due(&self, ctx: &C, now: Instant) -> bool {
        match self.poll_expired(now) {
            Some(at) => {
                log_debug!("{} fired at {}ms", self.name, at.as_millis());
                (self.callback)(ctx);
                true
            }
            None => false,
        }
    }

    /// 定时器服务循环
    ///
    /// 在定时器服务任务中运行 (`TIMER_TASK_PRIORITY`)。
    pub async fn service(&self, ctx: &C) -> ! {
        loop {
            self.fire_if_due(ctx, Instant::now());
            match self.deadline() {
                Some(deadline) => {
                    select(Timer::at(deadline), self.kick.wait()).await;
                }
                None => self.kick.wait().await,
            }
        }
    }
}

/// 把按键引脚的下降沿转发给定时器
///
/// 引脚错误只记录，不中断循环。
pub async fn watch_edges<W: Wait, C: 'static>(pin: &mut W, timer: &SoftTimer<C>) -> ! {
    loop {
        match pin.wait_for_falling_edge().await {
            Ok(()) => timer.on_edge(Instant::now()),
            Err(_) => {
                log_warn!("{}: edge wait failed", timer.name());
                Timer::after_millis(1).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};
    use embassy_futures::select::Either;

    struct Counter {
        fired: AtomicU32,
    }

    fn bump(ctx: &Counter) {
        ctx.fired.fetch_add(1, Ordering::SeqCst);
    }

    fn debounce() -> SoftTimer<Counter> {
        SoftTimer::new("Debounce Timer", Duration::from_millis(50), TimerMode::OneShot, 0, bump)
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn test_bounce_burst_fires_once_after_last_edge() {
        let timer = debounce();
        assert!(!timer.reset(at(0)));
        assert!(timer.reset(at(10)));
        assert!(timer.reset(at(30)));

        assert_eq!(timer.poll_expired(at(60)), None);
        assert_eq!(timer.poll_expired(at(79)), None);
        assert_eq!(timer.poll_expired(at(80)), Some(at(80)));
        assert_eq!(timer.state(), TimerState::Fired);
        assert_eq!(timer.poll_expired(at(500)), None);
    }

    #[test]
    fn test_separated_edges_each_fire() {
        let timer = debounce();
        let ctx = Counter { fired: AtomicU32::new(0) };

        timer.on_edge(at(0));
        assert!(timer.fire_if_due(&ctx, at(50)));
        timer.on_edge(at(100));
        assert!(!timer.fire_if_due(&ctx, at(149)));
        assert!(timer.fire_if_due(&ctx, at(150)));
        assert_eq!(ctx.fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_starved_service_fires_late_not_never() {
        let timer = debounce();
        timer.on_edge(at(0));
        // 服务 1 秒后才运行
        assert_eq!(timer.poll_expired(at(1_000)), Some(at(50)));
    }

    #[test]
    fn test_auto_reload_rearms() {
        let timer: SoftTimer<Counter> =
            SoftTimer::new("Report Timer", Duration::from_millis(100), TimerMode::AutoReload, 1, bump);
        timer.reset(at(0));
        assert_eq!(timer.poll_expired(at(100)), Some(at(100)));
        assert_eq!(timer.deadline(), Some(at(200)));
        timer.stop();
        assert_eq!(timer.state(), TimerState::Dormant);
        assert_eq!(timer.poll_expired(at(300)), None);
    }

    #[test]
    fn test_service_runs_callback() {
        let timer: SoftTimer<Counter> =
            SoftTimer::new("Debounce Timer", Duration::from_millis(10), TimerMode::OneShot, 0, bump);
        let ctx = Counter { fired: AtomicU32::new(0) };

        timer.on_edge(Instant::now());
        let res = embassy_futures::block_on(select(timer.service(&ctx), Timer::after_millis(60)));
        assert!(matches!(res, Either::Second(())));
        assert_eq!(ctx.fired.load(Ordering::SeqCst), 1);
    }

    struct BouncyButton {
        edges: u8,
    }

    impl embedded_hal::digital::ErrorType for BouncyButton {
        type Error = core::convert::Infallible;
    }

    impl Wait for BouncyButton {
        async fn wait_for_high(&mut self) -> Result<(), Self::Error> {
            core::future::pending().await
        }

        async fn wait_for_low(&mut self) -> Result<(), Self::Error> {
            core::future::pending().await
        }

        async fn wait_for_rising_edge(&mut self) -> Result<(), Self::Error> {
            core::future::pending().await
        }

        async fn wait_for_falling_edge(&mut self) -> Result<(), Self::Error> {
            if self.edges == 0 {
                core::future::pending::<()>().await;
            }
            self.edges -= 1;
            Ok(())
        }

        async fn wait_for_any_edge(&mut self) -> Result<(), Self::Error> {
            self.wait_for_falling_edge().await
        }
    }

    #[test]
    fn test_watch_edges_arms_timer() {
        let timer = debounce();
        let mut pin = BouncyButton { edges: 3 };
        let res = embassy_futures::block_on(select(watch_edges(&mut pin, &timer), core::future::ready(())));
        assert!(matches!(res, Either::Second(())));
        assert_eq!(pin.edges, 0);
        assert!(timer.deadline().is_some());
    }
}
