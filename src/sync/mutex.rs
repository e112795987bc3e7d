//! 优先级继承互斥锁
//!
//! 保护串口。持有者只在输出一条消息期间持锁。高优先级任务在锁上
//! 等待时，持有者的有效优先级被抬高到等待者中的最高值，释放时恢复
//! 为基础优先级，并唤醒有效优先级最高的等待者。
//!
//! 启动阶段调度器尚未运行，诊断输出以 [`Owner::Boot`] 身份持锁，
//! 不参与优先级继承。
//!
//! 执行器层级不能随继承的优先级迁移，任务代码经 [`PiMutex::lock_with`]
//! 访问: 获取、访问、释放在同一个临界区内完成 (立即天花板)，持有者
//! 在持锁期间不会被任何执行器抢占。

use core::cell::{RefCell, UnsafeCell};
use core::future::Future;
use core::ops::{Deref, DerefMut};
use core::pin::Pin;
use core::task::{Context, Poll, Waker};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::config::TASK_COUNT;
use crate::fault::{fatal, Fault};
use crate::kernel::{PriorityTable, TaskTag};
use crate::sync::with_critical_section;
use crate::util::log::*;

/// 锁的持有者
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Owner {
    /// 空闲
    Free,
    /// 启动代码 (调度器启动前)
    Boot,
    /// 任务
    Task(TaskTag),
}

struct LockState {
    owner: Owner,
    /// 等待者位图 (以任务标签为位)
    waiting: u32,
    wakers: [Option<Waker>; TASK_COUNT],
}

fn waiter_bit(who: TaskTag) -> u32 {
    if who.index() >= TASK_COUNT {
        fatal(Fault::UnknownTag(who));
    }
    1u32 << who.index()
}

impl LockState {
    fn waiters(&self) -> impl Iterator<Item = TaskTag> + '_ {
        (0..TASK_COUNT as u8)
            .filter(move |bit| self.waiting & (1u32 << *bit) != 0)
            .map(TaskTag::new)
    }
}

/// 优先级继承互斥锁
pub struct PiMutex<T> {
    state: Mutex<CriticalSectionRawMutex, RefCell<LockState>>,
    priorities: &'static PriorityTable,
    value: UnsafeCell<T>,
}

// Safety: 对 value 的访问只经过 PiGuard，而 PiGuard 的存在由 owner 保证唯一
unsafe impl<T: Send> Sync for PiMutex<T> {}

impl<T> PiMutex<T> {
    /// 创建互斥锁
    pub const fn new(value: T, priorities: &'static PriorityTable) -> Self {
        Self {
            state: Mutex::new(RefCell::new(LockState {
                owner: Owner::Free,
                waiting: 0,
                wakers: [const { None }; TASK_COUNT],
            })),
            priorities,
            value: UnsafeCell::new(value),
        }
    }

    /// 以任务身份加锁
    pub fn lock(&self, who: TaskTag) -> LockFuture<'_, T> {
        LockFuture { mutex: self, who }
    }

    /// 等待加锁，并在获取锁的同一临界区内执行 `f` 后立即释放
    ///
    /// `f` 运行时中断被屏蔽，不能阻塞。
    pub fn lock_with<F, R>(&self, who: TaskTag, f: F) -> LockWith<'_, T, F>
    where
        F: FnOnce(&mut T) -> R,
    {
        LockWith {
            mutex: self,
            who,
            f: Some(f),
        }
    }

    /// 非阻塞加锁
    pub fn try_lock(&self, who: TaskTag) -> Option<PiGuard<'_, T>> {
        self.acquire(Owner::Task(who))
    }

    /// 启动阶段加锁，不参与优先级继承
    pub fn try_lock_unowned(&self) -> Option<PiGuard<'_, T>> {
        self.acquire(Owner::Boot)
    }

    /// 当前持有者
    pub fn holder(&self) -> Owner {
        self.state.lock(|s| s.borrow().owner)
    }

    /// 独占访问 (无需加锁)
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    fn acquire(&self, owner: Owner) -> Option<PiGuard<'_, T>> {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            if s.owner != Owner::Free {
                return None;
            }
            s.owner = owner;
            Some(PiGuard { mutex: self })
        })
    }

    fn poll_lock(&self, who: TaskTag, cx: &mut Context<'_>) -> Poll<PiGuard<'_, T>> {
        let bit = waiter_bit(who);
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            let owner = s.owner;
            match owner {
                Owner::Free => {
                    s.owner = Owner::Task(who);
                    s.waiting &= !bit;
                    if let Some(slot) = s.wakers.get_mut(who.index()) {
                        *slot = None;
                    }
                    // 仍有等待者: 新持有者立即继承
                    let ceiling = s.waiters().map(|t| self.priorities.effective(t)).max();
                    if let Some(ceiling) = ceiling {
                        self.priorities.inherit(who, ceiling);
                    }
                    Poll::Ready(PiGuard { mutex: self })
                }
                _ => {
                    s.waiting |= bit;
                    if let Some(slot) = s.wakers.get_mut(who.index()) {
                        let stale = slot.as_ref().map_or(true, |w| !w.will_wake(cx.waker()));
                        if stale {
                            *slot = Some(cx.waker().clone());
                        }
                    }
                    if let Owner::Task(holder) = owner {
                        if holder != who && self.priorities.inherit(holder, self.priorities.effective(who)) {
                            log_debug!(
                                "Priority inheritance: tag {} -> {}",
                                holder.raw(),
                                self.priorities.effective(holder)
                            );
                        }
                    }
                    Poll::Pending
                }
            }
        })
    }

    fn release(&self) {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            if let Owner::Task(holder) = s.owner {
                self.priorities.restore(holder);
            }
            s.owner = Owner::Free;
            self.wake_highest(&mut s);
        });
    }

    fn wake_highest(&self, s: &mut LockState) {
        let next = s
            .waiters()
            .max_by_key(|t| (self.priorities.effective(*t), core::cmp::Reverse(t.raw())));
        if let Some(next) = next {
            if let Some(waker) = s.wakers.get_mut(next.index()).and_then(Option::take) {
                waker.wake();
            }
        }
    }

    fn cancel(&self, who: TaskTag) {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            let bit = waiter_bit(who);
            if s.waiting & bit == 0 {
                return;
            }
            s.waiting &= !bit;
            let taken = s.wakers.get_mut(who.index()).and_then(Option::take);
            // 被放弃的等待可能已经收到了唤醒，转交给下一个
            if taken.is_none() && s.owner == Owner::Free {
                self.wake_highest(&mut s);
            }
        });
    }
}

/// `lock` 返回的 future，被丢弃时撤销等待
pub struct LockFuture<'a, T> {
    mutex: &'a PiMutex<T>,
    who: TaskTag,
}

impl<'a, T> Future for LockFuture<'a, T> {
    type Output = PiGuard<'a, T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.mutex.poll_lock(self.who, cx)
    }
}

impl<T> Drop for LockFuture<'_, T> {
    fn drop(&mut self) {
        self.mutex.cancel(self.who);
    }
}

/// `lock_with` 返回的 future，被丢弃时撤销等待
pub struct LockWith<'a, T, F> {
    mutex: &'a PiMutex<T>,
    who: TaskTag,
    f: Option<F>,
}

// 没有结构性固定的字段
impl<T, F> Unpin for LockWith<'_, T, F> {}

impl<T, F, R> Future for LockWith<'_, T, F>
where
    F: FnOnce(&mut T) -> R,
{
    type Output = R;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<R> {
        let this = self.get_mut();
        let Some(f) = this.f.take() else {
            fatal(Fault::PolledAfterCompletion)
        };
        with_critical_section(|_| match this.mutex.poll_lock(this.who, cx) {
            // 守卫在临界区结束前释放
            Poll::Ready(mut guard) => Poll::Ready(f(&mut *guard)),
            Poll::Pending => {
                this.f = Some(f);
                Poll::Pending
            }
        })
    }
}

impl<T, F> Drop for LockWith<'_, T, F> {
    fn drop(&mut self) {
        if self.f.is_some() {
            self.mutex.cancel(self.who);
        }
    }
}

/// 锁守卫，离开作用域时释放
pub struct PiGuard<'a, T> {
    mutex: &'a PiMutex<T>,
}

impl<T> Deref for PiGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: 守卫存在期间独占
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T> DerefMut for PiGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: 守卫存在期间独占
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T> Drop for PiGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.release();
    }
}
