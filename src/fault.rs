//! 致命故障
//!
//! 系统依赖的不变量被破坏时 (句柄缺失、切换栈错乱、队列集溢出等)，
//! 继续运行控制系统比停机更危险。`fatal` 记录原因后 panic，
//! 固件的 panic handler 关闭中断并停机。

use core::fmt;

use crate::kernel::TaskTag;
use crate::util::log::*;

/// 不变量破坏原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// 启动时创建失败的原语在运行时被使用
    MissingHandle(&'static str),
    /// 统计表中不存在的任务标签
    UnknownTag(TaskTag),
    /// 嵌套切换超过 `SWITCH_DEPTH`
    SwitchStackOverflow,
    /// 切出的任务不是当前运行的任务
    SwitchOrder {
        expected: Option<TaskTag>,
        found: TaskTag,
    },
    /// 队列集就绪通知超过其容量
    QueueSetOverflow,
    /// 已完成的 future 被再次轮询
    PolledAfterCompletion,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingHandle(name) => write!(f, "missing handle: {}", name),
            Self::UnknownTag(tag) => write!(f, "unknown task tag {}", tag.raw()),
            Self::SwitchStackOverflow => write!(f, "switch stack overflow"),
            Self::SwitchOrder { expected, found } => match expected {
                Some(tag) => write!(f, "switched out tag {} while tag {} runs", found.raw(), tag.raw()),
                None => write!(f, "switched out tag {} while idle", found.raw()),
            },
            Self::QueueSetOverflow => write!(f, "queue set overflow"),
            Self::PolledAfterCompletion => write!(f, "future polled after completion"),
        }
    }
}

/// 不可恢复故障: 记录后停机
#[cold]
#[inline(never)]
pub fn fatal(fault: Fault) -> ! {
    log_error!("FATAL: {}", fault);
    panic!("fatal fault: {}", fault)
}

/// 固件 panic handler 调用: 关闭中断并永久停机
pub fn halt() -> ! {
    // SAFETY: 临界区永不释放，中断保持关闭
    let _state = unsafe { critical_section::acquire() };
    loop {
        core::hint::spin_loop();
    }
}
