//! 同步原语模块
//!
//! 所有原语统一使用 CriticalSectionRawMutex 保护内部状态，非阻塞形式
//! 可以在中断中调用，阻塞形式都是 `async`:
//! - `BinarySignal`: 二值信号量 (give 幂等)
//! - `BoundedQueue`: 定长 FIFO 队列
//! - `QueueSet`: 队列集，汇聚多个成员的就绪事件
//! - `PiMutex`: 优先级继承互斥锁
//! - `EventGroup`: 事件标志组
//! - `CriticalSignal`: 最新值通知 (定时器服务内部使用)

pub mod event_group;
pub mod mutex;
pub mod primitives;
pub mod queue;
pub mod queue_set;
pub mod signal;

pub use event_group::EventGroup;
pub use mutex::{Owner, PiGuard, PiMutex};
pub use primitives::{with_critical_section, CriticalSignal};
pub use queue::{BoundedQueue, QueueError};
pub use queue_set::{MemberId, QueueSet, SetError, SetLink, SetMember};
pub use signal::BinarySignal;
