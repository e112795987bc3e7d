//! 运行时统计报告任务
//!
//! 最低优先级。每 `RUNTIME_REPORT_PERIOD_MS`，或在报告信号到达时，
//! 读取累计执行时间并逐任务输出 CPU 占比。每行单独持锁。

use core::fmt::Write;

use embassy_futures::select::select;
use embassy_time::Timer;
use heapless::String;

use crate::accounting::{CycleCounter, RuntimeAccounting};
use crate::config::RUNTIME_REPORT_PERIOD_MS;
use crate::hw::SerialPort;
use crate::registry::Registry;
use crate::tasks::tags::RUNTIME_CONTROLLER_TAG;
use crate::tasks::TASK_SET;
use crate::util::log::*;

/// 输出一次报告
pub async fn report<P, C>(registry: &Registry<P>, accounting: &RuntimeAccounting<C>)
where
    P: SerialPort + Send + 'static,
    C: CycleCounter,
{
    let snapshot = timed!("runtime snapshot", accounting.snapshot());

    for spec in TASK_SET.iter() {
        let tag = spec.kind.tag();
        let permille = snapshot.share_permille(tag);

        let mut line: String<64> = String::new();
        let res = write!(
            line,
            "{}: {} ticks, {}.{}%\r\n",
            spec.name,
            snapshot.total(tag),
            permille / 10,
            permille % 10
        );
        if res.is_err() {
            log_warn!("Runtime line truncated");
        }

        registry
            .uart()
            .lock_with(RUNTIME_CONTROLLER_TAG, |uart| uart.send_str(&line))
            .await;
    }
}

/// 等待周期或报告信号，然后输出报告
pub async fn step<P, C>(registry: &Registry<P>, accounting: &RuntimeAccounting<C>)
where
    P: SerialPort + Send + 'static,
    C: CycleCounter,
{
    select(
        Timer::after_millis(RUNTIME_REPORT_PERIOD_MS),
        registry.reporting_signal().take(),
    )
    .await;
    report(registry, accounting).await;
}

/// 任务入口
pub async fn run<P, C>(registry: &'static Registry<P>, accounting: &'static RuntimeAccounting<C>) -> !
where
    P: SerialPort + Send + 'static,
    C: CycleCounter,
{
    log_info!("Run-time measurements task started");
    loop {
        step(registry, accounting).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::EmbassyClock;
    use crate::registry::tests::{drain_serial, full_registry};
    use crate::tasks::TaskKind;

    #[test]
    fn test_report_on_signal() {
        let registry = full_registry();
        drain_serial(registry);

        let accounting = RuntimeAccounting::new(EmbassyClock);
        accounting.record_in_at(TaskKind::Sensor.tag(), 0);
        accounting.record_out_at(TaskKind::Sensor.tag(), 250);
        accounting.record_in_at(TaskKind::Runtime.tag(), 250);
        accounting.record_out_at(TaskKind::Runtime.tag(), 1000);

        registry.reporting_signal().give();
        embassy_futures::block_on(step(registry, &accounting));

        let out = drain_serial(registry);
        let lines: std::vec::Vec<&str> = out.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "Button Task: 0 ticks, 0.0%");
        assert_eq!(lines[3], "Sensor Task: 250 ticks, 25.0%");
        assert_eq!(lines[6], "Run-Time Measurements Task: 750 ticks, 75.0%");
    }
}
