//! 队列集 (事件多路复用)
//!
//! 一个等待点汇聚多个成员 (定长队列、二值信号)。成员每产生一个就绪
//! 事件 (队列入队一个元素、信号从空变为有信号)，就向所属队列集投递
//! 自己的 [`MemberId`]。`select` 每次只取出一个投递，调用方随后对该
//! 成员做一次非阻塞的接收/获取。
//!
//! # 约束
//! - 成员只能属于一个队列集，加入时必须为空
//! - 队列集容量 >= 所有成员容量之和，投递永不丢失
//! - 同一成员内保持 FIFO，不同成员之间没有顺序保证
//! - 不防护的误用: 同一成员既经队列集消费又被其他任务直接消费
//!
//! # Example
//! ```ignore
//! let id = SET.add_member(&LEVEL_QUEUE)?;
//! if let Some(ready) = SET.select_timeout(Duration::from_millis(1000)).await {
//!     if ready == id {
//!         let level = LEVEL_QUEUE.try_receive();
//!     }
//! }
//! ```

use core::cell::RefCell;
use core::fmt;
use core::future::poll_fn;
use core::task::Poll;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::waitqueue::WakerRegistration;
use embassy_time::{with_timeout, Duration};
use heapless::Deque;

use crate::config::{QUEUE_SET_MAX_EVENTS, QUEUE_SET_MAX_MEMBERS};
use crate::fault::{fatal, Fault};
use crate::kernel::{KernelError, ObjectKind, Quota};
use crate::util::log::*;

/// 成员在队列集中的编号，按加入顺序分配
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MemberId(u8);

impl MemberId {
    /// 原始值
    pub const fn raw(self) -> u8 {
        self.0
    }
}

/// 队列集配置错误 (只在启动阶段出现)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SetError {
    /// 成员已属于某个队列集
    AlreadyMember,
    /// 成员加入时不为空
    MemberNotEmpty,
    /// 成员容量超出队列集剩余通知预算
    CapacityExceeded,
    /// 成员数量超过上限
    TooManyMembers,
}

impl fmt::Display for SetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyMember => write!(f, "already a member of a queue set"),
            Self::MemberNotEmpty => write!(f, "member not empty"),
            Self::CapacityExceeded => write!(f, "queue set capacity exceeded"),
            Self::TooManyMembers => write!(f, "too many queue set members"),
        }
    }
}

/// 成员到队列集的反向链接
#[derive(Clone, Copy)]
pub struct SetLink {
    set: &'static QueueSet,
    id: MemberId,
}

impl SetLink {
    /// 投递一次就绪事件
    ///
    /// 必须在成员自身的临界区内调用，保证投递与入队原子。
    #[inline]
    pub(crate) fn notify(&self) {
        self.set.notify(self.id);
    }

    /// 成员编号
    pub fn id(&self) -> MemberId {
        self.id
    }
}

/// 可加入队列集的成员
pub trait SetMember: Sync {
    /// 绑定到队列集，已绑定时返回 `AlreadyMember`
    fn attach(&self, link: SetLink) -> Result<(), SetError>;

    /// 成员最多能积累的就绪事件数
    fn capacity(&self) -> usize;

    /// 当前是否为空
    fn is_empty(&self) -> bool;

    /// 是否已属于某个队列集
    fn is_member(&self) -> bool;
}

struct SetState {
    pending: Deque<MemberId, QUEUE_SET_MAX_EVENTS>,
    reserved: usize,
    members: u8,
    waker: WakerRegistration,
}

/// 队列集
pub struct QueueSet {
    length: usize,
    state: Mutex<CriticalSectionRawMutex, RefCell<SetState>>,
}

impl QueueSet {
    /// 创建可同时容纳 `max_events` 个就绪事件的队列集
    ///
    /// 超过静态上限或配额不足时失败。
    pub fn create(quota: &mut Quota, max_events: usize) -> Result<Self, KernelError> {
        let kind = ObjectKind::QueueSet { length: max_events };
        if max_events == 0 || max_events > QUEUE_SET_MAX_EVENTS {
            log_warn!("Queue set length {} out of range", max_events);
            return Err(KernelError::ResourceExhausted(kind));
        }
        quota.charge(kind)?;
        Ok(Self {
            length: max_events,
            state: Mutex::new(RefCell::new(SetState {
                pending: Deque::new(),
                reserved: 0,
                members: 0,
                waker: WakerRegistration::new(),
            })),
        })
    }

    /// 加入成员 (仅启动阶段)
    pub fn add_member<M: SetMember>(&'static self, member: &'static M) -> Result<MemberId, SetError> {
        if member.is_member() {
            return Err(SetError::AlreadyMember);
        }
        if !member.is_empty() {
            return Err(SetError::MemberNotEmpty);
        }

        let id = self.state.lock(|s| {
            let s = s.borrow();
            if usize::from(s.members) >= QUEUE_SET_MAX_MEMBERS {
                return Err(SetError::TooManyMembers);
            }
            if s.reserved + member.capacity() > self.length {
                return Err(SetError::CapacityExceeded);
            }
            Ok(MemberId(s.members))
        })?;

        member.attach(SetLink { set: self, id })?;

        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            s.reserved += member.capacity();
            s.members += 1;
        });
        log_debug!("Queue set member {} added", id.raw());
        Ok(id)
    }

    fn notify(&self, id: MemberId) {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            if s.pending.len() >= self.length || s.pending.push_back(id).is_err() {
                fatal(Fault::QueueSetOverflow);
            }
            s.waker.wake();
        });
    }

    /// 非阻塞选择
    pub fn try_select(&self) -> Option<MemberId> {
        self.state.lock(|s| s.borrow_mut().pending.pop_front())
    }

    /// 等待任一成员就绪
    ///
    /// 只支持一个等待者 (故障处理任务)。
    pub async fn select(&self) -> MemberId {
        poll_fn(|cx| {
            self.state.lock(|s| {
                let mut s = s.borrow_mut();
                match s.pending.pop_front() {
                    Some(id) => Poll::Ready(id),
                    None => {
                        s.waker.register(cx.waker());
                        Poll::Pending
                    }
                }
            })
        })
        .await
    }

    /// 带超时的选择，超时返回 `None`
    pub async fn select_timeout(&self, timeout: Duration) -> Option<MemberId> {
        with_timeout(timeout, self.select()).await.ok()
    }

    /// 尚未被取走的就绪事件数
    pub fn pending(&self) -> usize {
        self.state.lock(|s| s.borrow().pending.len())
    }

    /// 队列集容量
    pub const fn length(&self) -> usize {
        self.length
    }

    /// 已预留的成员容量
    pub fn reserved(&self) -> usize {
        self.state.lock(|s| s.borrow().reserved)
    }
}
