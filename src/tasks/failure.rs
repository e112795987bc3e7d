//! 故障处理任务
//!
//! 系统中唯一的多路复用等待点: 在队列集上等待等级队列、故障信号、
//! 关闭信号三者之一就绪，再对该成员做一次非阻塞接收/获取。
//!
//! - 等级: 驱动加热器，熄灭故障指示，状态发往 LED
//! - 故障: 置位 `FAILURE_ACTIVE`，关断加热器，点亮故障指示，串口报告，触发一次运行时报告
//! - 关闭: 关断加热器
//!
//! 等待超时后什么也不做，下一轮重新等待。

use embassy_time::Duration;

use crate::config::FAILURE_SELECT_TIMEOUT_MS;
use crate::hw::{HeaterOutput, SerialPort};
use crate::registry::Registry;
use crate::sync::event_group::FAILURE_ACTIVE;
use crate::tasks::tags::FAILURE_HANDLING_TAG;
use crate::tasks::{HeatingLevel, HeatingState};
use crate::util::log::*;

/// 一次分发的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// 应用了新的加热等级
    Level(HeatingLevel),
    /// 处理了一次故障
    Failure,
    /// 关闭加热
    Off,
    /// 超时或就绪成员已被消费
    Idle,
}

fn publish_state<P: SerialPort + Send + 'static>(registry: &Registry<P>, state: HeatingState) {
    if registry.state_queue().try_send(state).is_err() {
        log_warn!("State queue full");
    }
}

/// 等待并处理一个就绪事件
pub async fn step<P, H>(registry: &Registry<P>, heater: &mut H) -> Dispatch
where
    P: SerialPort + Send + 'static,
    H: HeaterOutput,
{
    let members = registry.set_members();
    let timeout = Duration::from_millis(FAILURE_SELECT_TIMEOUT_MS);
    let Some(ready) = registry.level_and_failure_set().select_timeout(timeout).await else {
        return Dispatch::Idle;
    };

    if Some(ready) == members.level {
        let Some(level) = registry.level_queue().try_receive() else {
            return Dispatch::Idle;
        };
        heater.set_failure_indicator(false);
        heater.set_level(level);
        publish_state(registry, level.into());
        Dispatch::Level(level)
    } else if Some(ready) == members.failure {
        if !registry.failure_signal().try_take() {
            return Dispatch::Idle;
        }
        registry.event_group().set_bits(FAILURE_ACTIVE);
        heater.set_level(HeatingLevel::Off);
        heater.set_failure_indicator(true);
        publish_state(registry, HeatingState::Fault);
        registry
            .uart()
            .lock_with(FAILURE_HANDLING_TAG, |uart| {
                uart.send_str("Failure: temperature out of range\r\n")
            })
            .await;
        registry.reporting_signal().give();
        Dispatch::Failure
    } else if Some(ready) == members.off_state {
        if !registry.off_state_signal().try_take() {
            return Dispatch::Idle;
        }
        heater.set_level(HeatingLevel::Off);
        publish_state(registry, HeatingState::Off);
        Dispatch::Off
    } else {
        log_warn!("Unknown queue set member {}", ready.raw());
        Dispatch::Idle
    }
}

/// 任务入口
pub async fn run<P, H>(registry: &'static Registry<P>, mut heater: H) -> !
where
    P: SerialPort + Send + 'static,
    H: HeaterOutput,
{
    log_info!("Failure handling task started");
    loop {
        step(registry, &mut heater).await;
    }
}
