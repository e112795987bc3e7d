//! 按键任务
//!
//! 等待去抖定时器置位 `BUTTON_PRESSED`，切换目标档位:
//! 切到关闭时释放关闭信号 (经队列集通知故障处理任务关断加热器)，
//! 否则释放传感器信号，立即触发一次采样。
//!
//! `FAILURE_ACTIVE` 置位期间按键被忽略，目标档位保持不变。

use crate::hw::SerialPort;
use crate::registry::Registry;
use crate::sync::event_group::{BUTTON_PRESSED, FAILURE_ACTIVE};
use crate::tasks::HeatingLevel;
use crate::util::log::*;

/// 处理一次按键事件，返回新的目标档位; 故障期间返回 `None`
pub async fn step<P: SerialPort + Send + 'static>(registry: &Registry<P>) -> Option<HeatingLevel> {
    let bits = registry.event_group().wait_any(BUTTON_PRESSED, true).await;

    if bits & FAILURE_ACTIVE != 0 {
        log_warn!("Button: failure active, press ignored");
        return None;
    }

    let desired = registry.setpoint().advance();
    log_info!("Button: desired level {}", desired as u8);

    if desired == HeatingLevel::Off {
        registry.off_state_signal().give();
    } else {
        registry.sensor_signal().give();
    }
    Some(desired)
}

/// 任务入口
pub async fn run<P: SerialPort + Send + 'static>(registry: &'static Registry<P>) -> ! {
    log_info!("Button task started");
    loop {
        step(registry).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::full_registry;

    #[test]
    fn test_press_cycles_and_signals() {
        let registry = full_registry();

        registry.event_group().set_bits(BUTTON_PRESSED);
        assert_eq!(embassy_futures::block_on(step(registry)), Some(HeatingLevel::Low));
        assert!(registry.sensor_signal().try_take());
        // 事件位在退出时清除
        assert_eq!(registry.event_group().get() & BUTTON_PRESSED, 0);

        for expected in [HeatingLevel::Medium, HeatingLevel::High] {
            registry.event_group().set_bits(BUTTON_PRESSED);
            assert_eq!(embassy_futures::block_on(step(registry)), Some(expected));
        }

        registry.event_group().set_bits(BUTTON_PRESSED);
        assert_eq!(embassy_futures::block_on(step(registry)), Some(HeatingLevel::Off));
        assert!(registry.off_state_signal().is_signaled());
        // 关闭信号经队列集可见
        assert_eq!(
            registry.level_and_failure_set().try_select(),
            registry.set_members().off_state
        );
    }

    #[test]
    fn test_press_ignored_while_failure_active() {
        let registry = full_registry();
        registry.event_group().set_bits(FAILURE_ACTIVE | BUTTON_PRESSED);

        assert_eq!(embassy_futures::block_on(step(registry)), None);
        assert!(!registry.sensor_signal().is_signaled());
        assert!(!registry.off_state_signal().is_signaled());
        assert_eq!(registry.event_group().get() & BUTTON_PRESSED, 0);

        // 故障清除后按键恢复
        registry.event_group().clear_bits(FAILURE_ACTIVE);
        registry.event_group().set_bits(BUTTON_PRESSED);
        assert_eq!(embassy_futures::block_on(step(registry)), Some(HeatingLevel::Low));
    }
}
