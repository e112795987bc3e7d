//! 有效优先级表
//!
//! 基础优先级在任务创建时写入; 有效优先级可以被互斥锁的优先级继承
//! 临时抬高，释放锁时恢复。调度器选择下一个任务时读取有效优先级。

use portable_atomic::{AtomicU8, Ordering};

use crate::config::TASK_COUNT;
use crate::kernel::{Priority, TaskTag};

#[allow(clippy::declare_interior_mutable_const)]
const ZERO: AtomicU8 = AtomicU8::new(0);

/// 以任务标签为下标的优先级表
pub struct PriorityTable {
    base: [AtomicU8; TASK_COUNT],
    effective: [AtomicU8; TASK_COUNT],
}

impl PriorityTable {
    /// 创建全 0 的优先级表
    pub const fn new() -> Self {
        Self {
            base: [ZERO; TASK_COUNT],
            effective: [ZERO; TASK_COUNT],
        }
    }

    /// 设置基础优先级 (任务创建时)，同时重置有效优先级
    pub fn set_base(&self, tag: TaskTag, priority: Priority) {
        if let (Some(base), Some(effective)) = (self.base.get(tag.index()), self.effective.get(tag.index())) {
            base.store(priority, Ordering::Release);
            effective.store(priority, Ordering::Release);
        }
    }

    /// 基础优先级
    pub fn base(&self, tag: TaskTag) -> Priority {
        self.base
            .get(tag.index())
            .map_or(0, |p| p.load(Ordering::Acquire))
    }

    /// 当前有效优先级
    pub fn effective(&self, tag: TaskTag) -> Priority {
        self.effective
            .get(tag.index())
            .map_or(0, |p| p.load(Ordering::Acquire))
    }

    /// 继承优先级: 只升不降
    ///
    /// # Returns
    /// 是否发生了提升
    pub fn inherit(&self, tag: TaskTag, priority: Priority) -> bool {
        match self.effective.get(tag.index()) {
            Some(effective) => effective.fetch_max(priority, Ordering::AcqRel) < priority,
            None => false,
        }
    }

    /// 恢复为基础优先级
    pub fn restore(&self, tag: TaskTag) {
        if let Some(effective) = self.effective.get(tag.index()) {
            effective.store(self.base(tag), Ordering::Release);
        }
    }

    /// 是否处于继承提升状态
    pub fn is_boosted(&self, tag: TaskTag) -> bool {
        self.effective(tag) > self.base(tag)
    }
}

impl Default for PriorityTable {
    fn default() -> Self {
        Self::new()
    }
}
