//! 任务切换钩子
//!
//! 调度器在每次切换时调用 [`SwitchHooks`]。统计子系统只是钩子的使用者，
//! 不嵌入调度器内部。
//!
//! [`SwitchTracker`] 面向基于 async 执行器的移植层: 每次 poll 就是一次
//! 切入，poll 返回就是一次切出。高优先级中断执行器抢占正在 poll 的低
//! 优先级任务时，被抢占的任务先切出，高优先级任务返回后再切回:
//!
//! ```text
//!   LOW  ──in────────out         in──────out
//!   HIGH              in──────out
//! ```
//!
//! 所有钩子调用都在临界区内执行，切换本身不可被再次抢占。

use core::cell::RefCell;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

use crate::config::SWITCH_DEPTH;
use crate::fault::{fatal, Fault};
use crate::kernel::TaskTag;
use crate::util::log::*;

/// 切换钩子
///
/// 由调度器在切换点同步调用，实现必须短小且不可阻塞。
pub trait SwitchHooks: Sync {
    /// 任务被切入
    fn task_switched_in(&self, tag: TaskTag);

    /// 任务被切出
    fn task_switched_out(&self, tag: TaskTag);
}

struct TrackerState {
    hooks: Option<&'static dyn SwitchHooks>,
    running: Vec<TaskTag, SWITCH_DEPTH>,
}

/// 嵌套切换跟踪器
pub struct SwitchTracker {
    state: Mutex<CriticalSectionRawMutex, RefCell<TrackerState>>,
}

impl SwitchTracker {
    /// 创建未注册钩子的跟踪器
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(TrackerState {
                hooks: None,
                running: Vec::new(),
            })),
        }
    }

    /// 注册钩子 (调度器启动前)
    pub fn install(&self, hooks: &'static dyn SwitchHooks) {
        self.state.lock(|s| s.borrow_mut().hooks = Some(hooks));
    }

    /// 当前正在运行的任务
    pub fn current(&self) -> Option<TaskTag> {
        self.state.lock(|s| s.borrow().running.last().copied())
    }

    /// 当前嵌套深度
    pub fn depth(&self) -> usize {
        self.state.lock(|s| s.borrow().running.len())
    }

    /// 切入 `tag`，如有正在运行的任务则先将其切出
    pub fn enter(&self, tag: TaskTag) {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            if let Some(hooks) = s.hooks {
                if let Some(&preempted) = s.running.last() {
                    hooks.task_switched_out(preempted);
                }
                hooks.task_switched_in(tag);
            }
            if s.running.push(tag).is_err() {
                fatal(Fault::SwitchStackOverflow);
            }
        });
        log_trace!("switch in {}", tag.raw());
    }

    /// 切出 `tag`，如有被抢占的任务则将其切回
    pub fn leave(&self, tag: TaskTag) {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            let top = s.running.last().copied();
            if top != Some(tag) {
                fatal(Fault::SwitchOrder { expected: top, found: tag });
            }
            s.running.pop();
            if let Some(hooks) = s.hooks {
                hooks.task_switched_out(tag);
                if let Some(&resumed) = s.running.last() {
                    hooks.task_switched_in(resumed);
                }
            }
        });
        log_trace!("switch out {}", tag.raw());
    }

    /// 用切换钩子包装一个任务 future
    pub fn instrument<F: Future>(&self, tag: TaskTag, inner: F) -> Instrumented<'_, F> {
        Instrumented {
            tracker: self,
            tag,
            inner,
        }
    }
}

impl Default for SwitchTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// 每次 poll 前后调用切换钩子的 future
pub struct Instrumented<'a, F> {
    tracker: &'a SwitchTracker,
    tag: TaskTag,
    inner: F,
}

impl<F: Future> Future for Instrumented<'_, F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: `inner` 只以 Pin 形式访问，从不被移出
        let this = unsafe { self.get_unchecked_mut() };
        let inner = unsafe { Pin::new_unchecked(&mut this.inner) };

        this.tracker.enter(this.tag);
        let out = inner.poll(cx);
        this.tracker.leave(this.tag);
        out
    }
}
