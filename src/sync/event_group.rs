//! 事件组
//!
//! 32 位事件标志。`set_bits` 可在中断或定时器服务中调用;
//! 等待者等待任一位被置位，可选择退出时清除。

use core::cell::RefCell;
use core::future::poll_fn;
use core::task::Poll;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::waitqueue::MultiWakerRegistration;
use embassy_time::{with_timeout, Duration};

/// 按键去抖完成
pub const BUTTON_PRESSED: u32 = 1 << 0;

/// 故障处于激活状态
pub const FAILURE_ACTIVE: u32 = 1 << 1;

/// 最多同时等待的任务数
const MAX_WAITERS: usize = 4;

struct GroupState {
    bits: u32,
    wakers: MultiWakerRegistration<MAX_WAITERS>,
}

/// 事件组
pub struct EventGroup {
    state: Mutex<CriticalSectionRawMutex, RefCell<GroupState>>,
}

impl EventGroup {
    /// 创建全 0 的事件组
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(GroupState {
                bits: 0,
                wakers: MultiWakerRegistration::new(),
            })),
        }
    }

    /// 置位，返回置位后的值
    pub fn set_bits(&self, mask: u32) -> u32 {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            s.bits |= mask;
            s.wakers.wake();
            s.bits
        })
    }

    /// 清除，返回清除前的值
    pub fn clear_bits(&self, mask: u32) -> u32 {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            let before = s.bits;
            s.bits &= !mask;
            before
        })
    }

    /// 当前值
    pub fn get(&self) -> u32 {
        self.state.lock(|s| s.borrow().bits)
    }

    /// 等待 `mask` 中任一位被置位
    ///
    /// 返回满足条件时的值 (清除之前)。
    pub async fn wait_any(&self, mask: u32, clear_on_exit: bool) -> u32 {
        poll_fn(|cx| {
            self.state.lock(|s| {
                let mut s = s.borrow_mut();
                let bits = s.bits;
                if bits & mask != 0 {
                    if clear_on_exit {
                        s.bits &= !mask;
                    }
                    Poll::Ready(bits)
                } else {
                    s.wakers.register(cx.waker());
                    Poll::Pending
                }
            })
        })
        .await
    }

    /// 带超时等待，超时返回 `None`
    pub async fn wait_any_timeout(&self, mask: u32, clear_on_exit: bool, timeout: Duration) -> Option<u32> {
        with_timeout(timeout, self.wait_any(mask, clear_on_exit)).await.ok()
    }
}

impl Default for EventGroup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let group = EventGroup::new();
        assert_eq!(group.set_bits(BUTTON_PRESSED), BUTTON_PRESSED);
        assert_eq!(group.set_bits(FAILURE_ACTIVE), BUTTON_PRESSED | FAILURE_ACTIVE);
        assert_eq!(group.clear_bits(BUTTON_PRESSED), BUTTON_PRESSED | FAILURE_ACTIVE);
        assert_eq!(group.get(), FAILURE_ACTIVE);
    }

    #[test]
    fn test_wait_any_clears_on_exit() {
        let group = EventGroup::new();
        group.set_bits(BUTTON_PRESSED | FAILURE_ACTIVE);

        let bits = embassy_futures::block_on(group.wait_any(BUTTON_PRESSED, true));
        assert_eq!(bits, BUTTON_PRESSED | FAILURE_ACTIVE);
        // 只清除等待的位
        assert_eq!(group.get(), FAILURE_ACTIVE);
    }

    #[test]
    fn test_wait_any_timeout() {
        let group = EventGroup::new();
        group.set_bits(FAILURE_ACTIVE);
        let res = embassy_futures::block_on(group.wait_any_timeout(BUTTON_PRESSED, true, Duration::from_millis(5)));
        assert_eq!(res, None);
    }
}
