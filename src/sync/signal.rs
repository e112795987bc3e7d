//! 二值信号量
//!
//! 两个状态: 空 / 有信号。创建时为空。对已有信号的信号量再次 `give`
//! 是幂等的 (返回 `false`，不计数)，因此作为队列集成员时最多积累一个
//! 就绪事件。`give` 可以在中断中调用。

use core::cell::RefCell;
use core::future::poll_fn;
use core::task::Poll;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::waitqueue::WakerRegistration;
use embassy_time::{with_timeout, Duration};

use super::queue_set::{SetError, SetLink, SetMember};

struct SignalState {
    signaled: bool,
    waker: WakerRegistration,
    link: Option<SetLink>,
}

/// 二值信号量
pub struct BinarySignal {
    state: Mutex<CriticalSectionRawMutex, RefCell<SignalState>>,
}

impl BinarySignal {
    /// 创建空信号量
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(SignalState {
                signaled: false,
                waker: WakerRegistration::new(),
                link: None,
            })),
        }
    }

    /// 释放信号量 (中断安全)
    ///
    /// # Returns
    /// 状态是否由空变为有信号
    pub fn give(&self) -> bool {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            if s.signaled {
                return false;
            }
            s.signaled = true;
            if let Some(link) = s.link {
                link.notify();
            }
            s.waker.wake();
            true
        })
    }

    /// 非阻塞获取
    pub fn try_take(&self) -> bool {
        self.state.lock(|s| core::mem::replace(&mut s.borrow_mut().signaled, false))
    }

    /// 等待信号
    pub async fn take(&self) {
        poll_fn(|cx| {
            self.state.lock(|s| {
                let mut s = s.borrow_mut();
                if s.signaled {
                    s.signaled = false;
                    Poll::Ready(())
                } else {
                    s.waker.register(cx.waker());
                    Poll::Pending
                }
            })
        })
        .await
    }

    /// 带超时等待，超时返回 `false`
    pub async fn take_timeout(&self, timeout: Duration) -> bool {
        with_timeout(timeout, self.take()).await.is_ok()
    }

    /// 当前是否有信号 (不消费)
    pub fn is_signaled(&self) -> bool {
        self.state.lock(|s| s.borrow().signaled)
    }
}

impl Default for BinarySignal {
    fn default() -> Self {
        Self::new()
    }
}

impl SetMember for BinarySignal {
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
        1
    }

    fn is_empty(&self) -> bool {
        !self.is_signaled()
    }

    fn is_member(&self) -> bool {
        self.state.lock(|s| s.borrow().link.is_some())
    }
}
