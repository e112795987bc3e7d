//! 条件编译日志系统
//!
//! 根据 feature 选择不同的日志后端:
//! - `log-defmt`: 使用 defmt (高效二进制日志)
//! - `dev` / `log-println`: 使用 esp-println (文本日志)
//! - 默认 (主机测试 / release): 完全禁用日志 (零开销)
//!
//! 日志只面向开发者。面向用户的诊断输出 (对象创建结果、运行时报告)
//! 走串口互斥锁，见 [`crate::hw::SerialPort`]。
//!
//! # 日志级别
//! - `log_error!`: 错误信息
//! - `log_warn!`: 警告信息 (资源创建失败、队列满)
//! - `log_info!`: 一般信息
//! - `log_debug!`: 调试信息
//! - `log_trace!`: 详细跟踪 (任务切换)

// ===================================================================
// defmt 后端 (feature = "log-defmt")
// ===================================================================
#[cfg(feature = "log-defmt")]
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { defmt::info!($($arg)*) };
}

#[cfg(feature = "log-defmt")]
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => { defmt::debug!($($arg)*) };
}

#[cfg(feature = "log-defmt")]
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => { defmt::warn!($($arg)*) };
}

#[cfg(feature = "log-defmt")]
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { defmt::error!($($arg)*) };
}

#[cfg(feature = "log-defmt")]
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => { defmt::trace!($($arg)*) };
}

// ===================================================================
// esp-println 后端 (feature = "dev" 或 "log-println")
// ===================================================================
#[cfg(all(any(feature = "dev", feature = "log-println"), not(feature = "log-defmt")))]
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { esp_println::println!("[INFO] {}", format_args!($($arg)*)) };
}

#[cfg(all(any(feature = "dev", feature = "log-println"), not(feature = "log-defmt")))]
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => { esp_println::println!("[DEBUG] {}", format_args!($($arg)*)) };
}

#[cfg(all(any(feature = "dev", feature = "log-println"), not(feature = "log-defmt")))]
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => { esp_println::println!("[WARN] {}", format_args!($($arg)*)) };
}

#[cfg(all(any(feature = "dev", feature = "log-println"), not(feature = "log-defmt")))]
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { esp_println::println!("[ERROR] {}", format_args!($($arg)*)) };
}

#[cfg(all(any(feature = "dev", feature = "log-println"), not(feature = "log-defmt")))]
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => { esp_println::println!("[TRACE] {}", format_args!($($arg)*)) };
}

// ===================================================================
// 空实现 (无日志 feature)
// 参数仍被求值为引用，避免调用处出现未使用变量告警
// ===================================================================
#[cfg(not(any(feature = "dev", feature = "log-defmt", feature = "log-println")))]
#[macro_export]
macro_rules! log_info {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {{ let _ = ($fmt, $(&$arg),*); }};
}

#[cfg(not(any(feature = "dev", feature = "log-defmt", feature = "log-println")))]
#[macro_export]
macro_rules! log_debug {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {{ let _ = ($fmt, $(&$arg),*); }};
}

#[cfg(not(any(feature = "dev", feature = "log-defmt", feature = "log-println")))]
#[macro_export]
macro_rules! log_warn {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {{ let _ = ($fmt, $(&$arg),*); }};
}

#[cfg(not(any(feature = "dev", feature = "log-defmt", feature = "log-println")))]
#[macro_export]
macro_rules! log_error {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {{ let _ = ($fmt, $(&$arg),*); }};
}

#[cfg(not(any(feature = "dev", feature = "log-defmt", feature = "log-println")))]
#[macro_export]
macro_rules! log_trace {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {{ let _ = ($fmt, $(&$arg),*); }};
}

// ===================================================================
// 便捷重导出
// ===================================================================
pub use crate::{log_debug, log_error, log_info, log_trace, log_warn};

// ===================================================================
// 性能计时宏 (仅在有日志后端时有效)
// ===================================================================

/// 测量代码块执行时间
///
/// # Example
/// ```ignore
/// let report = timed!("runtime report", {
///     build_report(&snapshot)
/// });
/// // 输出: [TIME] runtime report: 120μs
/// ```
#[cfg(any(feature = "dev", feature = "log-defmt", feature = "log-println"))]
#[macro_export]
macro_rules! timed {
    ($name:expr, $block:expr) => {{
        let start = embassy_time::Instant::now();
        let result = $block;
        let elapsed = start.elapsed().as_micros();
        $crate::log_debug!("[TIME] {}: {}μs", $name, elapsed);
        result
    }};
}

#[cfg(not(any(feature = "dev", feature = "log-defmt", feature = "log-println")))]
#[macro_export]
macro_rules! timed {
    ($name:expr, $block:expr) => {
        $block
    };
}

pub use crate::timed;
