//! 运行时统计
//!
//! 每次任务切换时记录:
//! - 切入: `time_in[tag] = now()`
//! - 切出: `time_out[tag] = now()`，`last_slice[tag] = time_out - time_in`，
//!   `total[tag] += last_slice`
//!
//! 表只由切换钩子写入 (钩子在临界区内执行)，只由最低优先级的报告任务
//! 读取。读取不加锁，可以看到稍旧的值。
//!
//! # 计数器回绕
//!
//! 切片按计数器声明的位宽做模减法，一个切片内回绕一次可以被纠正;
//! 长于计数器完整周期的切片无法表示。

use embassy_time::Instant;
use portable_atomic::{AtomicU64, Ordering};

use crate::config::TASK_COUNT;
use crate::fault::{fatal, Fault};
use crate::kernel::{SwitchHooks, TaskTag};

/// 单调计数器 (只读)
pub trait CycleCounter: Sync {
    /// 计数器有效位宽，超过该位宽的值会回绕
    const WIDTH_BITS: u32;

    /// 当前计数
    fn now(&self) -> u64;
}

/// Embassy 时间基准 (1 MHz，64 位)
pub struct EmbassyClock;

impl CycleCounter for EmbassyClock {
    const WIDTH_BITS: u32 = 64;

    #[inline(always)]
    fn now(&self) -> u64 {
        Instant::now().as_ticks()
    }
}

#[allow(clippy::declare_interior_mutable_const)]
const ZERO: AtomicU64 = AtomicU64::new(0);

/// 按标签索引的统计表
pub struct RuntimeAccounting<C: CycleCounter> {
    clock: C,
    time_in: [AtomicU64; TASK_COUNT],
    time_out: [AtomicU64; TASK_COUNT],
    last_slice: [AtomicU64; TASK_COUNT],
    total: [AtomicU64; TASK_COUNT],
}

impl<C: CycleCounter> RuntimeAccounting<C> {
    /// 创建全 0 的统计表
    pub const fn new(clock: C) -> Self {
        Self {
            clock,
            time_in: [ZERO; TASK_COUNT],
            time_out: [ZERO; TASK_COUNT],
            last_slice: [ZERO; TASK_COUNT],
            total: [ZERO; TASK_COUNT],
        }
    }

    #[inline(always)]
    const fn mask() -> u64 {
        if C::WIDTH_BITS >= 64 {
            u64::MAX
        } else {
            (1u64 << C::WIDTH_BITS) - 1
        }
    }

    #[inline]
    fn slot(tag: TaskTag) -> usize {
        if tag.index() >= TASK_COUNT {
            fatal(Fault::UnknownTag(tag));
        }
        tag.index()
    }

    /// 记录切入
    pub fn record_in_at(&self, tag: TaskTag, now: u64) {
        let i = Self::slot(tag);
        self.time_in[i].store(now, Ordering::Relaxed);
    }

    /// 记录切出，返回本次切片
    pub fn record_out_at(&self, tag: TaskTag, now: u64) -> u64 {
        let i = Self::slot(tag);
        self.time_out[i].store(now, Ordering::Relaxed);
        let slice = now.wrapping_sub(self.time_in[i].load(Ordering::Relaxed)) & Self::mask();
        self.last_slice[i].store(slice, Ordering::Relaxed);
        let total = self.total[i].load(Ordering::Relaxed).wrapping_add(slice);
        self.total[i].store(total, Ordering::Relaxed);
        slice
    }

    /// 最近一次切入时间
    pub fn time_in(&self, tag: TaskTag) -> u64 {
        self.time_in[Self::slot(tag)].load(Ordering::Relaxed)
    }

    /// 最近一次切出时间
    pub fn time_out(&self, tag: TaskTag) -> u64 {
        self.time_out[Self::slot(tag)].load(Ordering::Relaxed)
    }

    /// 最近一次切片
    pub fn last_slice(&self, tag: TaskTag) -> u64 {
        self.last_slice[Self::slot(tag)].load(Ordering::Relaxed)
    }

    /// 累计执行时间
    pub fn total(&self, tag: TaskTag) -> u64 {
        self.total[Self::slot(tag)].load(Ordering::Relaxed)
    }

    /// 读取所有任务的累计时间
    pub fn snapshot(&self) -> RuntimeSnapshot {
        let mut totals = [0u64; TASK_COUNT];
        for (out, total) in totals.iter_mut().zip(self.total.iter()) {
            *out = total.load(Ordering::Relaxed);
        }
        RuntimeSnapshot { totals }
    }

    /// 计数器
    pub fn clock(&self) -> &C {
        &self.clock
    }
}

impl<C: CycleCounter> SwitchHooks for RuntimeAccounting<C> {
    fn task_switched_in(&self, tag: TaskTag) {
        self.record_in_at(tag, self.clock.now());
    }

    fn task_switched_out(&self, tag: TaskTag) {
        self.record_out_at(tag, self.clock.now());
    }
}

/// 某一时刻的累计时间快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeSnapshot {
    totals: [u64; TASK_COUNT],
}

impl RuntimeSnapshot {
    /// 所有任务累计时间之和
    pub fn grand_total(&self) -> u64 {
        self.totals.iter().fold(0u64, |acc, t| acc.saturating_add(*t))
    }

    /// 单个任务累计时间
    pub fn total(&self, tag: TaskTag) -> u64 {
        self.totals.get(tag.index()).copied().unwrap_or(0)
    }

    /// CPU 占比 (千分比)，总时间为 0 时返回 0
    pub fn share_permille(&self, tag: TaskTag) -> u32 {
        let grand = self.grand_total();
        if grand == 0 {
            return 0;
        }
        ((u128::from(self.total(tag)) * 1000) / u128::from(grand)) as u32
    }
}

/// 按脚本返回计数的测试时钟
#[cfg(test)]
pub(crate) struct ScriptedClock<const BITS: u32> {
    ticks: std::sync::Mutex<std::vec::Vec<u64>>,
}

#[cfg(test)]
impl<const BITS: u32> ScriptedClock<BITS> {
    pub(crate) fn new(mut ticks: std::vec::Vec<u64>) -> Self {
        ticks.reverse();
        Self {
            ticks: std::sync::Mutex::new(ticks),
        }
    }
}

#[cfg(test)]
impl<const BITS: u32> CycleCounter for ScriptedClock<BITS> {
    const WIDTH_BITS: u32 = BITS;

    fn now(&self) -> u64 {
        self.ticks.lock().unwrap().pop().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_and_total() {
        let acc = RuntimeAccounting::new(ScriptedClock::<64>::new(vec![100, 250, 400, 420]));
        let tag = TaskTag::new(2);

        acc.task_switched_in(tag);
        acc.task_switched_out(tag);
        assert_eq!(acc.time_in(tag), 100);
        assert_eq!(acc.time_out(tag), 250);
        assert_eq!(acc.last_slice(tag), 150);

        acc.task_switched_in(tag);
        acc.task_switched_out(tag);
        assert_eq!(acc.last_slice(tag), 20);
        assert_eq!(acc.total(tag), 170);
    }

    #[test]
    fn test_total_is_sum_of_slices() {
        let acc = RuntimeAccounting::new(EmbassyClock);
        let tag = TaskTag::new(0);
        let mut sum = 0;
        let mut now = 0;
        for slice in [3u64, 17, 1, 0, 250] {
            acc.record_in_at(tag, now);
            now += slice;
            sum += acc.record_out_at(tag, now);
            now += 5;
        }
        assert_eq!(sum, 271);
        assert_eq!(acc.total(tag), 271);
    }

    #[test]
    fn test_wraparound_of_32_bit_counter() {
        let acc = RuntimeAccounting::new(ScriptedClock::<32>::new(vec![0xFFFF_FFF0, 0x10]));
        let tag = TaskTag::new(6);
        acc.task_switched_in(tag);
        acc.task_switched_out(tag);
        assert_eq!(acc.last_slice(tag), 0x20);
        assert_eq!(acc.total(tag), 0x20);
    }

    #[test]
    #[should_panic(expected = "fatal fault")]
    fn test_unknown_tag_is_fatal() {
        let acc = RuntimeAccounting::new(EmbassyClock);
        acc.record_in_at(TaskTag::new(7), 0);
    }

    #[test]
    fn test_snapshot_shares() {
        let acc = RuntimeAccounting::new(EmbassyClock);
        acc.record_in_at(TaskTag::new(0), 0);
        acc.record_out_at(TaskTag::new(0), 300);
        acc.record_in_at(TaskTag::new(6), 300);
        acc.record_out_at(TaskTag::new(6), 1000);

        let snap = acc.snapshot();
        assert_eq!(snap.grand_total(), 1000);
        assert_eq!(snap.share_permille(TaskTag::new(0)), 300);
        assert_eq!(snap.share_permille(TaskTag::new(6)), 700);
        assert_eq!(snap.share_permille(TaskTag::new(3)), 0);
    }
}
