//! 温度任务
//!
//! 温度信号到达后取出队列中最新的采样，按目标档位计算加热等级，
//! 发往等级队列 (队列集成员) 与诊断等级队列。

use crate::hw::SerialPort;
use crate::registry::Registry;
use crate::tasks::{HeatingLevel, HeatingPolicy};
use crate::util::log::*;

/// 处理一次温度信号，队列为空时返回 `None`
pub async fn step<P, H>(registry: &Registry<P>, policy: &H) -> Option<HeatingLevel>
where
    P: SerialPort + Send + 'static,
    H: HeatingPolicy,
{
    registry.temperature_signal().take().await;

    let mut latest = None;
    while let Some(celsius) = registry.temperature_queue().try_receive() {
        latest = Some(celsius);
    }
    let current = latest?;

    let level = policy.level_for(registry.setpoint().get(), current);
    log_debug!("Temperature {}C -> level {}", current, level as u8);

    registry.level_queue().send(level).await;
    if registry.uart_level_queue().try_send(level).is_err() {
        log_warn!("Uart level queue full");
    }
    Some(level)
}

/// 任务入口
pub async fn run<P, H>(registry: &'static Registry<P>, policy: H) -> !
where
    P: SerialPort + Send + 'static,
    H: HeatingPolicy,
{
    log_info!("Temperature task started");
    loop {
        step(registry, &policy).await;
    }
}
