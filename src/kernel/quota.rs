//! 内核对象配额
//!
//! 所有原语都在启动时一次性创建，之后不再分配。每次创建按对象的估算
//! 占用扣减配额; 配额耗尽意味着镜像配置错误，而不是运行时可恢复的
//! 状况，调用方记录失败后继续启动。

use core::fmt;

use crate::kernel::KernelError;
use crate::util::log::*;

/// 队列控制块估算大小 (字节)，二值信号量与互斥锁都是无存储区的队列
pub const QUEUE_OBJECT_SIZE: usize = 80;

/// 事件组估算大小 (字节)
pub const EVENT_GROUP_SIZE: usize = 32;

/// 软件定时器估算大小 (字节)
pub const TIMER_OBJECT_SIZE: usize = 44;

/// 任务控制块估算大小 (字节)
pub const TCB_SIZE: usize = 96;

/// 栈字宽 (字节)
pub const STACK_WORD_SIZE: usize = 4;

/// 队列集每个通知槽 (一个成员句柄) 的大小
pub const SET_SLOT_SIZE: usize = 4;

/// 内核对象种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ObjectKind {
    /// 二值信号量
    BinarySemaphore,
    /// 互斥锁
    Mutex,
    /// 定长队列
    Queue { length: usize, item_size: usize },
    /// 队列集
    QueueSet { length: usize },
    /// 事件组
    EventGroup,
    /// 软件定时器
    Timer,
    /// 任务 (TCB + 栈)
    Task { stack_words: usize },
}

impl ObjectKind {
    /// 估算占用 (字节)
    pub const fn footprint(&self) -> usize {
        match *self {
            ObjectKind::BinarySemaphore | ObjectKind::Mutex => QUEUE_OBJECT_SIZE,
            ObjectKind::Queue { length, item_size } => QUEUE_OBJECT_SIZE + length * item_size,
            ObjectKind::QueueSet { length } => QUEUE_OBJECT_SIZE + length * SET_SLOT_SIZE,
            ObjectKind::EventGroup => EVENT_GROUP_SIZE,
            ObjectKind::Timer => TIMER_OBJECT_SIZE,
            ObjectKind::Task { stack_words } => TCB_SIZE + stack_words * STACK_WORD_SIZE,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BinarySemaphore => write!(f, "binary semaphore"),
            Self::Mutex => write!(f, "mutex"),
            Self::Queue { length, item_size } => write!(f, "queue {}x{}", length, item_size),
            Self::QueueSet { length } => write!(f, "queue set {}", length),
            Self::EventGroup => write!(f, "event group"),
            Self::Timer => write!(f, "timer"),
            Self::Task { stack_words } => write!(f, "task ({} words)", stack_words),
        }
    }
}

/// 配额计数器
#[derive(Debug)]
pub struct Quota {
    capacity: usize,
    used: usize,
    failures: u8,
}

impl Quota {
    /// 创建指定容量的配额
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: 0,
            failures: 0,
        }
    }

    /// 按对象种类扣减配额
    pub fn charge(&mut self, kind: ObjectKind) -> Result<(), KernelError> {
        let cost = kind.footprint();
        if cost > self.remaining() {
            self.failures = self.failures.saturating_add(1);
            log_warn!("Quota exhausted: {} needs {} bytes, {} left", kind, cost, self.remaining());
            return Err(KernelError::ResourceExhausted(kind));
        }
        self.used += cost;
        Ok(())
    }

    /// 总容量
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// 已使用
    pub const fn used(&self) -> usize {
        self.used
    }

    /// 剩余
    pub const fn remaining(&self) -> usize {
        self.capacity - self.used
    }

    /// 失败次数
    pub const fn failures(&self) -> u8 {
        self.failures
    }
}

impl Default for Quota {
    fn default() -> Self {
        Self::new(crate::config::TOTAL_HEAP_SIZE)
    }
}
