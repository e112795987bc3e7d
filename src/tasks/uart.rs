//! 串口诊断任务: 每个加热等级输出一行

use core::fmt::Write;

use heapless::String;

use crate::hw::SerialPort;
use crate::registry::Registry;
use crate::tasks::tags::UART_CONTROLLER_TAG;
use crate::tasks::HeatingLevel;
use crate::util::log::*;

pub async fn step<P: SerialPort + Send + 'static>(registry: &Registry<P>) -> HeatingLevel {
    let level = registry.uart_level_queue().receive().await;

    let mut line: String<32> = String::new();
    if write!(line, "Heating level: {}\r\n", level).is_err() {
        log_warn!("Uart line truncated");
    }

    registry
        .uart()
        .lock_with(UART_CONTROLLER_TAG, |uart| uart.send_str(&line))
        .await;
    level
}

/// 任务入口
pub async fn run<P: SerialPort + Send + 'static>(registry: &'static Registry<P>) -> ! {
    log_info!("Uart task started");
    loop {
        step(registry).await;
    }
}
