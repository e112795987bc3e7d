//! 传感器任务
//!
//! 每 `SENSOR_PERIOD_MS` 采样一次，或被按键任务通过传感器信号提前唤醒。
//! 读数在有效量程内: 入温度队列并释放温度信号; 越界或读取失败:
//! 释放故障信号并置位 `FAILURE_ACTIVE`。

use embassy_time::Duration;

use crate::config::SENSOR_PERIOD_MS;
use crate::hw::{SerialPort, TemperatureSensor};
use crate::registry::Registry;
use crate::sync::event_group::FAILURE_ACTIVE;
use crate::tasks::SENSOR_VALID_RANGE;
use crate::util::log::*;

/// 一次采样的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    /// 有效温度 (°C)
    Sample(u8),
    /// 越界 (`Some`) 或读取失败 (`None`)
    OutOfRange(Option<u8>),
}

/// 采样并分发
pub fn sample<P, S>(registry: &Registry<P>, sensor: &mut S) -> Reading
where
    P: SerialPort + Send + 'static,
    S: TemperatureSensor,
{
    match sensor.read_celsius() {
        Some(celsius) if SENSOR_VALID_RANGE.contains(&celsius) => {
            if registry.temperature_queue().try_send(celsius).is_err() {
                log_warn!("Temperature queue full, sample {} dropped", celsius);
            }
            registry.event_group().clear_bits(FAILURE_ACTIVE);
            registry.temperature_signal().give();
            Reading::Sample(celsius)
        }
        other => {
            log_warn!("Sensor reading out of range");
            registry.event_group().set_bits(FAILURE_ACTIVE);
            registry.failure_signal().give();
            Reading::OutOfRange(other)
        }
    }
}

/// 等待下一个采样时刻后采样
pub async fn step<P, S>(registry: &Registry<P>, sensor: &mut S) -> Reading
where
    P: SerialPort + Send + 'static,
    S: TemperatureSensor,
{
    // 超时即周期采样，信号即按需采样
    registry
        .sensor_signal()
        .take_timeout(Duration::from_millis(SENSOR_PERIOD_MS))
        .await;
    sample(registry, sensor)
}

/// 任务入口
pub async fn run<P, S>(registry: &'static Registry<P>, mut sensor: S) -> !
where
    P: SerialPort + Send + 'static,
    S: TemperatureSensor,
{
    log_info!("Sensor task started");
    loop {
        step(registry, &mut sensor).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::full_registry;

    struct Scripted(std::vec::Vec<Option<u8>>);

    impl TemperatureSensor for Scripted {
        fn read_celsius(&mut self) -> Option<u8> {
            if self.0.is_empty() {
                None
            } else {
                self.0.remove(0)
            }
        }
    }

    #[test]
    fn test_valid_sample_is_queued() {
        let registry = full_registry();
        let mut sensor = Scripted(vec![Some(21)]);

        assert_eq!(sample(registry, &mut sensor), Reading::Sample(21));
        assert_eq!(registry.temperature_queue().try_receive(), Some(21));
        assert!(registry.temperature_signal().try_take());
        assert!(!registry.failure_signal().is_signaled());
    }

    #[test]
    fn test_out_of_range_raises_failure() {
        let registry = full_registry();
        let mut sensor = Scripted(vec![Some(45), None, Some(20)]);

        assert_eq!(sample(registry, &mut sensor), Reading::OutOfRange(Some(45)));
        assert!(registry.temperature_queue().is_empty());
        assert_eq!(registry.event_group().get() & FAILURE_ACTIVE, FAILURE_ACTIVE);

        // 读取失败同样视为故障，信号幂等: 仍只有一个就绪事件
        assert_eq!(sample(registry, &mut sensor), Reading::OutOfRange(None));
        assert_eq!(registry.level_and_failure_set().pending(), 1);
        assert_eq!(
            registry.level_and_failure_set().try_select(),
            registry.set_members().failure
        );

        // 恢复后清除故障位
        assert_eq!(sample(registry, &mut sensor), Reading::Sample(20));
        assert_eq!(registry.event_group().get() & FAILURE_ACTIVE, 0);
    }

    #[test]
    fn test_step_samples_on_demand() {
        let registry = full_registry();
        let mut sensor = Scripted(vec![Some(30)]);
        registry.sensor_signal().give();
        assert_eq!(embassy_futures::block_on(step(registry, &mut sensor)), Reading::Sample(30));
    }
}
