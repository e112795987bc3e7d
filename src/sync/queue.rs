//! 定长队列
//!
//! FIFO，固定容量，元素按值整体拷贝 (`T: Copy`)。入队与出队在同一个
//! 临界区内完成，不会出现半个元素。
//!
//! 满队列策略:
//! - `try_send`: 立即拒绝并把值还给调用方 (中断安全)
//! - `send`: 等待空位
//! - `send_timeout`: 最多等待给定时间

use core::cell::RefCell;
use core::fmt;
use core::future::poll_fn;
use core::task::Poll;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::waitqueue::WakerRegistration;
use embassy_time::{with_timeout, Duration};
use heapless::Deque;

use super::queue_set::{SetError, SetLink, SetMember};

/// 队列操作错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QueueError {
    /// 队列已满
    Full,
    /// 等待超时
    Timeout,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "queue full"),
            Self::Timeout => write!(f, "queue timeout"),
        }
    }
}

struct QueueState<T, const N: usize> {
    buf: Deque<T, N>,
    rx_waker: WakerRegistration,
    tx_waker: WakerRegistration,
    link: Option<SetLink>,
}

/// 定长队列
///
/// # Type Parameters
/// * `T` - 元素类型 (按值拷贝)
/// * `N` - 容量
pub struct BoundedQueue<T: Copy, const N: usize> {
    state: Mutex<CriticalSectionRawMutex, RefCell<QueueState<T, N>>>,
}

impl<T: Copy, const N: usize> BoundedQueue<T, N> {
    /// 创建空队列
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(QueueState {
                buf: Deque::new(),
                rx_waker: WakerRegistration::new(),
                tx_waker: WakerRegistration::new(),
                link: None,
            })),
        }
    }

    /// 非阻塞发送，队列满时把值还给调用方
    pub fn try_send(&self, value: T) -> Result<(), T> {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            s.buf.push_back(value)?;
            if let Some(link) = s.link {
                link.notify();
            }
            s.rx_waker.wake();
            Ok(())
        })
    }

    /// 发送，队列满时等待
    pub async fn send(&self, value: T) {
        poll_fn(|cx| {
            self.state.lock(|s| {
                let mut s = s.borrow_mut();
                if s.buf.is_full() {
                    s.tx_waker.register(cx.waker());
                    return Poll::Pending;
                }
                if s.buf.push_back(value).is_ok() {
                    if let Some(link) = s.link {
                        link.notify();
                    }
                    s.rx_waker.wake();
                }
                Poll::Ready(())
            })
        })
        .await
    }

    /// 带超时发送
    pub async fn send_timeout(&self, value: T, timeout: Duration) -> Result<(), QueueError> {
        with_timeout(timeout, self.send(value))
            .await
            .map_err(|_| QueueError::Timeout)
    }

    /// 非阻塞接收
    pub fn try_receive(&self) -> Option<T> {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            let value = s.buf.pop_front();
            if value.is_some() {
                s.tx_waker.wake();
            }
            value
        })
    }

    /// 接收，队列空时等待
    pub async fn receive(&self) -> T {
        poll_fn(|cx| {
            self.state.lock(|s| {
                let mut s = s.borrow_mut();
                match s.buf.pop_front() {
                    Some(value) => {
                        s.tx_waker.wake();
                        Poll::Ready(value)
                    }
                    None => {
                        s.rx_waker.register(cx.waker());
                        Poll::Pending
                    }
                }
            })
        })
        .await
    }

    /// 带超时接收，超时返回 `None`
    pub async fn receive_timeout(&self, timeout: Duration) -> Option<T> {
        with_timeout(timeout, self.receive()).await.ok()
    }

    /// 当前元素数量
    pub fn len(&self) -> usize {
        self.state.lock(|s| s.borrow().buf.len())
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 是否已满
    pub fn is_full(&self) -> bool {
        self.state.lock(|s| s.borrow().buf.is_full())
    }

    /// 容量
    #[inline(always)]
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<T: Copy, const N: usize> Default for BoundedQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Send, const N: usize> SetMember for BoundedQueue<T, N> {
    fn attach(&self, link: SetLink) -> Result<(), SetError> {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            if s.link.is_some() {
                return Err(SetError::AlreadyMember);
            }
            s.link = Some(link);
            Ok(())
        })
    }

    fn capacity(&self) -> usize {
        N
    }

    fn is_empty(&self) -> bool {
        BoundedQueue::is_empty(self)
    }

    fn is_member(&self) -> bool {
        self.state.lock(|s| s.borrow().link.is_some())
    }
}
