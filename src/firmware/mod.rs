//! ESP32-S3 移植层 (`firmware` feature)
//!
//! 把调度器契约映射到 esp-rtos 的中断执行器上:
//!
//! ```text
//!   任务优先级 4    -> InterruptExecutor (Priority3)
//!   任务优先级 3    -> InterruptExecutor (Priority2)
//!   任务优先级 2    -> InterruptExecutor (Priority1)
//!   任务优先级 0, 1 -> 线程模式执行器 (main)
//! ```
//!
//! 每个执行器是一个中断级别，高级别执行器可以抢占低级别任务的 poll，
//! 切换钩子由 [`crate::kernel::SwitchTracker`] 按嵌套顺序调用。

pub mod board;
pub mod port;

pub use board::{Board, EspSerial, FirmwareHeater, FirmwareIndicator, FirmwareRegistry};
pub use port::{EmbassyPort, Tiers};
