//! 调度器接口
//!
//! 本库不实现调度器，只描述应用层需要从调度器获得的能力:
//! - 任务创建 (入口、名称、栈大小、优先级)
//! - 任务标签 (只用于统计表索引，不影响调度)
//! - 切换钩子注册 (`task_switched_in` / `task_switched_out`)
//! - 启动 (正常情况下不返回)
//!
//! 另外提供调度器需要参考的有效优先级表 ([`PriorityTable`])，
//! 由串口互斥锁的优先级继承写入。
//!
//! # 优先级
//!
//! 数值越大优先级越高，范围 `0..MAX_PRIORITIES`:
//!
//! ```text
//!   4  故障处理
//!   3  LED / 传感器
//!   2  按键 / 温度
//!   1  串口诊断
//!   0  运行时统计报告 (最低，永远不抢占控制任务)
//! ```

use core::fmt;

use crate::tasks::TaskSpec;

pub mod priority;
pub mod quota;
pub mod switch;

#[cfg(test)]
pub(crate) mod model;

pub use priority::PriorityTable;
pub use quota::{ObjectKind, Quota};
pub use switch::{Instrumented, SwitchHooks, SwitchTracker};

/// 任务优先级，数值越大越优先
pub type Priority = u8;

/// 任务标签
///
/// 不透明的小整数，只作为统计表的下标。创建后、调度器启动前设置一次。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskTag(u8);

impl TaskTag {
    /// 从原始值创建
    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    /// 原始值
    #[inline(always)]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// 统计表下标
    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// 内核错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KernelError {
    /// 内核对象配额耗尽
    ResourceExhausted(ObjectKind),
    /// 调度器拒绝创建任务
    TaskCreateFailed,
    /// 任务已设置过标签
    AlreadyTagged,
    /// 调度器已启动，不能再修改任务拓扑
    SchedulerRunning,
    /// 无效的任务句柄
    InvalidHandle,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceExhausted(kind) => write!(f, "Resource exhausted: {}", kind),
            Self::TaskCreateFailed => write!(f, "Task creation failed"),
            Self::AlreadyTagged => write!(f, "Task already tagged"),
            Self::SchedulerRunning => write!(f, "Scheduler already running"),
            Self::InvalidHandle => write!(f, "Invalid task handle"),
        }
    }
}

/// 应用层使用的调度器契约
///
/// 实现者负责真正的上下文切换。每次切换时必须在切换本身不可被抢占的
/// 前提下调用已注册的 [`SwitchHooks`]，统计表依赖这一点而不额外加锁。
pub trait Scheduler {
    /// 任务句柄
    type Handle: Copy;

    /// 创建任务
    ///
    /// 失败时返回 `KernelError`，调用方记录后继续启动 (降级模式)。
    fn create_task(&mut self, spec: &TaskSpec) -> Result<Self::Handle, KernelError>;

    /// 设置任务标签，每个任务只能设置一次
    fn set_application_tag(&mut self, handle: Self::Handle, tag: TaskTag)
        -> Result<(), KernelError>;

    /// 注册切换钩子
    fn register_switch_hooks(&mut self, hooks: &'static dyn SwitchHooks);

    /// 启动调度器
    ///
    /// 原生调度器不返回。基于 async 执行器的移植层把任务交给执行器后返回，
    /// 之后由执行器驱动。
    fn start(&mut self);
}
