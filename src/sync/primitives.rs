//! embassy-sync 封装
//!
//! 统一使用 CriticalSectionRawMutex，单核/双核 ESP32-S3 与主机测试
//! (critical-section std 实现) 行为一致。

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, signal::Signal};

/// 临界区信号 - 只保留最后一个值
///
/// 定时器服务用它接收"重新布防"通知: 多次布防只需唤醒一次。
///
/// # Example
/// ```ignore
/// static KICK: CriticalSignal<()> = CriticalSignal::new();
///
/// // 中断中
/// KICK.signal(());
///
/// // 服务任务中
/// KICK.wait().await;
/// ```
pub type CriticalSignal<T> = Signal<CriticalSectionRawMutex, T>;

/// 在临界区中执行闭包
///
/// 禁用中断确保原子性，适用于非常短的操作
///
/// # Warning
/// 临界区内不能执行任何异步操作或长时间计算
#[inline]
pub fn with_critical_section<R, F>(f: F) -> R
where
    F: FnOnce(critical_section::CriticalSection) -> R,
{
    critical_section::with(f)
}
