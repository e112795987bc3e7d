//! 启动流程
//!
//! 1. [`provision`]: 创建原语注册表并绑定队列集成员
//! 2. [`launch`]: 按 [`TASK_SET`] 顺序创建任务 -> 设置标签 -> 注册切换钩子 -> 启动调度器
//!
//! 任一对象或任务创建失败都只在串口报告，启动继续 (降级模式)。

use static_cell::StaticCell;

use crate::hw::SerialPort;
use crate::kernel::{PriorityTable, Quota, Scheduler, SwitchHooks};
use crate::registry::Registry;
use crate::tasks::TASK_SET;
use crate::util::log::*;

/// 启动结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootReport {
    /// 创建失败的原语数
    pub object_failures: u8,
    /// 创建或设置标签失败的任务数
    pub task_failures: u8,
    /// 调度器已启动
    pub started: bool,
}

/// 创建注册表并放入静态存储
///
/// # Panics
/// 同一个 `cell` 初始化两次
pub fn provision<P: SerialPort + Send + 'static>(
    cell: &'static StaticCell<Registry<P>>,
    quota: &mut Quota,
    priorities: &'static PriorityTable,
    serial: P,
) -> &'static Registry<P> {
    let registry: &'static Registry<P> = cell.init(Registry::create(quota, priorities, serial));
    registry.attach_queue_set_members();
    registry
}

/// 创建全部任务并启动调度器
pub fn launch<S, P>(scheduler: &mut S, registry: &'static Registry<P>, hooks: &'static dyn SwitchHooks) -> BootReport
where
    S: Scheduler,
    P: SerialPort + Send + 'static,
{
    let mut task_failures = 0u8;
    let mut handles: [Option<S::Handle>; TASK_SET.len()] = [None; TASK_SET.len()];

    for (slot, spec) in handles.iter_mut().zip(TASK_SET.iter()) {
        match scheduler.create_task(spec) {
            Ok(handle) => {
                *slot = Some(handle);
                registry.boot_print(&[spec.kind.label(), " Created\r\n"]);
            }
            Err(e) => {
                task_failures += 1;
                log_warn!("{}: {}", spec.name, e);
                registry.boot_print(&[spec.kind.label(), " Failed\r\n"]);
            }
        }
    }

    // 标签在创建之后、启动之前设置一次
    for (handle, spec) in handles.iter().zip(TASK_SET.iter()) {
        let Some(handle) = *handle else { continue };
        let tag = spec.kind.tag();
        match scheduler.set_application_tag(handle, tag) {
            Ok(()) => registry.priorities().set_base(tag, spec.priority),
            Err(e) => {
                task_failures += 1;
                log_warn!("{}: tag {} rejected: {}", spec.name, tag.raw(), e);
            }
        }
    }

    scheduler.register_switch_hooks(hooks);
    log_info!(
        "Starting scheduler: {} objects failed, {} tasks failed",
        registry.failures(),
        task_failures
    );
    scheduler.start();

    BootReport {
        object_failures: registry.failures(),
        task_failures,
        started: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::{EmbassyClock, RuntimeAccounting};
    use crate::hw::MemorySerial;
    use crate::kernel::model::ModelScheduler;
    use crate::kernel::quota::QUEUE_OBJECT_SIZE;
    use crate::kernel::TaskTag;
    use crate::registry::tests::drain_serial;
    use crate::tasks::TaskKind;

    fn leak<T>(value: T) -> &'static T {
        Box::leak(Box::new(value))
    }

    fn hooks() -> &'static RuntimeAccounting<EmbassyClock> {
        leak(RuntimeAccounting::new(EmbassyClock))
    }

    #[test]
    fn test_full_boot() {
        let priorities: &'static PriorityTable = leak(PriorityTable::new());
        let cell: &'static StaticCell<Registry<MemorySerial>> = leak(StaticCell::new());
        let mut quota = Quota::default();
        let registry = provision(cell, &mut quota, priorities, MemorySerial::default());

        let mut model = ModelScheduler::new(priorities, quota);
        let report = launch(&mut model, registry, hooks());

        assert_eq!(
            report,
            BootReport {
                object_failures: 0,
                task_failures: 0,
                started: true
            }
        );
        assert!(model.is_started());
        assert!(model.has_hooks());
        assert_eq!(model.task_count(), 7);
        for (i, spec) in TASK_SET.iter().enumerate() {
            assert_eq!(model.tag_of(i), Some(spec.kind.tag()));
            assert_eq!(model.spec_of(i).map(|s| s.priority), Some(spec.priority));
            assert_eq!(priorities.base(spec.kind.tag()), spec.priority);
        }

        let out = drain_serial(registry);
        assert!(out.contains("Debounce Timer Created\r\nButton controller task Created\r\n"));
        assert!(out.ends_with("Run-Time Measurements Task Created\r\n"));
    }

    #[test]
    fn test_failed_queue_still_starts() {
        // 信号、互斥锁、温度队列之后配额耗尽
        let budget = 6 * QUEUE_OBJECT_SIZE + QUEUE_OBJECT_SIZE + 5;
        let priorities: &'static PriorityTable = leak(PriorityTable::new());
        let cell: &'static StaticCell<Registry<MemorySerial>> = leak(StaticCell::new());
        let mut quota = Quota::new(budget);
        let registry = provision(cell, &mut quota, priorities, MemorySerial::default());

        // 任务配额独立于对象配额
        let mut model = ModelScheduler::new(priorities, Quota::default());
        let report = launch(&mut model, registry, hooks());

        assert!(report.started);
        assert!(report.object_failures > 0);
        assert_eq!(report.task_failures, 0);
        assert!(model.is_started());

        let out = drain_serial(registry);
        assert!(out.contains("Level of heating queue Failed\r\n"));
        assert!(out.contains("Failure task Created\r\n"));
    }

    #[test]
    fn test_failed_task_is_reported() {
        let priorities: &'static PriorityTable = leak(PriorityTable::new());
        let cell: &'static StaticCell<Registry<MemorySerial>> = leak(StaticCell::new());
        let mut quota = Quota::default();
        let registry = provision(cell, &mut quota, priorities, MemorySerial::default());

        let mut model = ModelScheduler::new(priorities, Quota::default()).rejecting(TaskKind::Led);
        let report = launch(&mut model, registry, hooks());

        assert_eq!(report.task_failures, 1);
        assert!(report.started);
        assert_eq!(model.task_count(), 6);
        assert_eq!(priorities.base(TaskKind::Led.tag()), 0);
        assert_eq!(priorities.base(TaskTag::new(4)), 4);

        let out = drain_serial(registry);
        assert!(out.contains("Led task Failed\r\n"));
        assert!(out.contains("Sensor task Created\r\n"));
    }

    #[test]
    fn test_failed_mutex_still_reports_tasks() {
        // 信号之后配额耗尽: 互斥锁及其后所有对象失败
        let priorities: &'static PriorityTable = leak(PriorityTable::new());
        let cell: &'static StaticCell<Registry<MemorySerial>> = leak(StaticCell::new());
        let mut quota = Quota::new(5 * QUEUE_OBJECT_SIZE + 10);
        let registry = provision(cell, &mut quota, priorities, MemorySerial::default());

        let mut model = ModelScheduler::new(priorities, Quota::default()).rejecting(TaskKind::Led);
        let report = launch(&mut model, registry, hooks());

        assert_eq!(report.task_failures, 1);
        assert!(report.started);

        let out = drain_serial(registry);
        assert!(out.contains("Uart Mutex Failed\r\n"));
        assert!(out.contains("Debounce Timer Failed\r\nButton controller task Created\r\n"));
        assert!(out.contains("Led task Failed\r\n"));
        assert!(out.ends_with("Run-Time Measurements Task Created\r\n"));
    }

    #[test]
    fn test_shared_quota_exhaustion_is_reported() {
        // 与固件相同: 一个配额先后用于原语和任务
        let budget = 6 * QUEUE_OBJECT_SIZE + QUEUE_OBJECT_SIZE + 5;
        let priorities: &'static PriorityTable = leak(PriorityTable::new());
        let cell: &'static StaticCell<Registry<MemorySerial>> = leak(StaticCell::new());
        let mut quota = Quota::new(budget);
        let registry = provision(cell, &mut quota, priorities, MemorySerial::default());

        let mut model = ModelScheduler::new(priorities, quota);
        let report = launch(&mut model, registry, hooks());

        assert!(report.started);
        assert!(model.is_started());
        assert!(report.object_failures > 0);
        assert_eq!(report.task_failures as usize, TASK_SET.len());
        assert_eq!(model.task_count(), 0);

        let out = drain_serial(registry);
        assert!(out.contains("Level of heating queue Failed\r\n"));
        for spec in TASK_SET.iter() {
            let line = std::format!("{} Failed\r\n", spec.kind.label());
            assert!(out.contains(&line), "missing {:?}", line);
        }
    }

    #[test]
    fn test_default_quota_fits_objects_and_tasks() {
        let priorities: &'static PriorityTable = leak(PriorityTable::new());
        let cell: &'static StaticCell<Registry<MemorySerial>> = leak(StaticCell::new());
        let mut quota = Quota::default();
        let registry = provision(cell, &mut quota, priorities, MemorySerial::default());

        let mut model = ModelScheduler::new(priorities, quota);
        let report = launch(&mut model, registry, hooks());

        assert_eq!(report.object_failures, 0);
        assert_eq!(report.task_failures, 0);
        assert_eq!(model.task_count(), TASK_SET.len());
    }

    #[test]
    fn test_hooks_drive_accounting() {
        let priorities: &'static PriorityTable = leak(PriorityTable::new());
        let cell: &'static StaticCell<Registry<MemorySerial>> = leak(StaticCell::new());
        let mut quota = Quota::default();
        let registry = provision(cell, &mut quota, priorities, MemorySerial::default());
        let accounting = hooks();

        let mut model = ModelScheduler::new(priorities, Quota::default());
        launch(&mut model, registry, accounting);

        let failure = TaskKind::Failure.tag();
        model.tick();
        std::thread::sleep(std::time::Duration::from_millis(2));
        model.set_ready(failure, false);
        model.tick();

        assert!(accounting.last_slice(failure) >= 2_000);
        assert_eq!(accounting.total(failure), accounting.last_slice(failure));
        assert_eq!(
            accounting.last_slice(failure),
            accounting.time_out(failure) - accounting.time_in(failure)
        );
    }
}
