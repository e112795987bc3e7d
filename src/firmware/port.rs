//! 基于 embassy 执行器的调度器移植
//!
//! `create_task` 只登记任务和扣减配额，`start` 时把任务包装成
//! `#[embassy_executor::task]` 并按优先级派发到对应的执行器。

use embassy_executor::{SendSpawner, SpawnError, Spawner};
use esp_hal::gpio::Input;
use heapless::Vec;

use crate::accounting::{EmbassyClock, RuntimeAccounting};
use crate::config::{TASK_COUNT, TIMER_TASK_PRIORITY};
use crate::firmware::board::{Board, FirmwareHeater, FirmwareIndicator, FirmwareRegistry};
use crate::hw::SimulatedSensor;
use crate::kernel::{
    KernelError, ObjectKind, Priority, Quota, Scheduler, SwitchHooks, SwitchTracker, TaskTag,
};
use crate::tasks::{self, TaskKind, TaskSpec, ThresholdPolicy};
use crate::timer::{watch_edges, SoftTimer};
use crate::util::log::*;

/// 各优先级执行器的派发器
pub struct Tiers {
    pub high: SendSpawner,
    pub mid: SendSpawner,
    pub low: SendSpawner,
    pub thread: Spawner,
}

enum Tier<'a> {
    Interrupt(&'a SendSpawner),
    Thread(&'a Spawner),
}

impl Tiers {
    fn for_priority(&self, priority: Priority) -> Tier<'_> {
        match priority {
            4.. => Tier::Interrupt(&self.high),
            3 => Tier::Interrupt(&self.mid),
            2 => Tier::Interrupt(&self.low),
            _ => Tier::Thread(&self.thread),
        }
    }
}

/// 派发到指定执行器，任务池已满时返回 `SpawnError`
macro_rules! spawn_on {
    ($tier:expr, $token:expr) => {
        match $tier {
            Tier::Interrupt(spawner) => spawner.spawn($token?),
            Tier::Thread(spawner) => spawner.spawn($token?),
        }
    };
}

struct PortTask {
    kind: TaskKind,
    priority: Priority,
    tag: Option<TaskTag>,
}

/// Embassy 移植层
pub struct EmbassyPort {
    tiers: Tiers,
    tracker: &'static SwitchTracker,
    registry: &'static FirmwareRegistry,
    accounting: &'static RuntimeAccounting<EmbassyClock>,
    quota: Quota,
    board: Option<Board>,
    tasks: Vec<PortTask, TASK_COUNT>,
    running: bool,
}

impl EmbassyPort {
    pub fn new(
        tiers: Tiers,
        tracker: &'static SwitchTracker,
        registry: &'static FirmwareRegistry,
        accounting: &'static RuntimeAccounting<EmbassyClock>,
        quota: Quota,
        board: Board,
    ) -> Self {
        Self {
            tiers,
            tracker,
            registry,
            accounting,
            quota,
            board: Some(board),
            tasks: Vec::new(),
            running: false,
        }
    }

    /// 定时器服务与按键边沿转发 (不参与统计)
    fn spawn_timer_service(&self, button: Input<'static>) -> Result<(), SpawnError> {
        let timer = self.registry.debounce_timer();
        spawn_on!(
            self.tiers.for_priority(TIMER_TASK_PRIORITY),
            timer_service_task(timer, self.registry)
        );
        spawn_on!(
            self.tiers.for_priority(TIMER_TASK_PRIORITY),
            button_edge_task(button, timer)
        );
        Ok(())
    }

    fn spawn_task(&self, task: &PortTask, parts: &mut Parts) -> Result<(), SpawnError> {
        // 启动前未设置标签的任务使用拓扑中的默认标签
        let tag = task.tag.unwrap_or(task.kind.tag());
        let (tracker, registry) = (self.tracker, self.registry);
        let tier = self.tiers.for_priority(task.priority);

        match task.kind {
            TaskKind::Button => spawn_on!(tier, button_task(tracker, registry, tag)),
            TaskKind::Temperature => spawn_on!(tier, temperature_task(tracker, registry, tag)),
            TaskKind::Led => {
                let Some(indicator) = parts.indicator.take() else { return Ok(()) };
                spawn_on!(tier, led_task(tracker, registry, tag, indicator))
            }
            TaskKind::Sensor => {
                let Some(sensor) = parts.sensor.take() else { return Ok(()) };
                spawn_on!(tier, sensor_task(tracker, registry, tag, sensor))
            }
            TaskKind::Failure => {
                let Some(heater) = parts.heater.take() else { return Ok(()) };
                spawn_on!(tier, failure_task(tracker, registry, tag, heater))
            }
            TaskKind::Uart => spawn_on!(tier, uart_task(tracker, registry, tag)),
            TaskKind::Runtime => {
                spawn_on!(tier, runtime_task(tracker, registry, tag, self.accounting))
            }
        }
        Ok(())
    }
}

struct Parts {
    sensor: Option<SimulatedSensor>,
    heater: Option<FirmwareHeater>,
    indicator: Option<FirmwareIndicator>,
}

impl Scheduler for EmbassyPort {
    type Handle = usize;

    fn create_task(&mut self, spec: &TaskSpec) -> Result<usize, KernelError> {
        if self.running {
            return Err(KernelError::SchedulerRunning);
        }
        // 每个任务函数只有一个任务池槽位
        if self.tasks.iter().any(|t| t.kind == spec.kind) {
            return Err(KernelError::TaskCreateFailed);
        }
        self.quota.charge(ObjectKind::Task {
            stack_words: spec.stack_words,
        })?;
        self.tasks
            .push(PortTask {
                kind: spec.kind,
                priority: spec.priority,
                tag: None,
            })
            .map_err(|_| KernelError::TaskCreateFailed)?;
        Ok(self.tasks.len() - 1)
    }

    fn set_application_tag(&mut self, handle: usize, tag: TaskTag) -> Result<(), KernelError> {
        if self.running {
            return Err(KernelError::SchedulerRunning);
        }
        let task = self.tasks.get_mut(handle).ok_or(KernelError::InvalidHandle)?;
        if task.tag.is_some() {
            return Err(KernelError::AlreadyTagged);
        }
        task.tag = Some(tag);
        Ok(())
    }

    fn register_switch_hooks(&mut self, hooks: &'static dyn SwitchHooks) {
        self.tracker.install(hooks);
    }

    fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;

        let Some(board) = self.board.take() else {
            log_error!("Board already consumed");
            return;
        };

        if self.spawn_timer_service(board.button).is_err() {
            log_error!("Timer service spawn failed");
        }

        let mut parts = Parts {
            sensor: Some(board.sensor),
            heater: Some(board.heater),
            indicator: Some(board.indicator),
        };
        for task in self.tasks.iter() {
            match self.spawn_task(task, &mut parts) {
                Ok(()) => log_info!("{} spawned at priority {}", task.kind.label(), task.priority),
                Err(_) => log_error!("{} spawn failed", task.kind.label()),
            }
        }
    }
}

// ===== 执行器任务包装 =====

#[embassy_executor::task]
async fn timer_service_task(timer: &'static SoftTimer<FirmwareRegistry>, registry: &'static FirmwareRegistry) {
    timer.service(registry).await
}

#[embassy_executor::task]
async fn button_edge_task(mut button: Input<'static>, timer: &'static SoftTimer<FirmwareRegistry>) {
    watch_edges(&mut button, timer).await
}

#[embassy_executor::task]
async fn button_task(tracker: &'static SwitchTracker, registry: &'static FirmwareRegistry, tag: TaskTag) {
    tracker.instrument(tag, tasks::button::run(registry)).await
}

#[embassy_executor::task]
async fn temperature_task(tracker: &'static SwitchTracker, registry: &'static FirmwareRegistry, tag: TaskTag) {
    tracker
        .instrument(tag, tasks::temperature::run(registry, ThresholdPolicy))
        .await
}

#[embassy_executor::task]
async fn led_task(
    tracker: &'static SwitchTracker,
    registry: &'static FirmwareRegistry,
    tag: TaskTag,
    indicator: FirmwareIndicator,
) {
    tracker.instrument(tag, tasks::led::run(registry, indicator)).await
}

#[embassy_executor::task]
async fn sensor_task(
    tracker: &'static SwitchTracker,
    registry: &'static FirmwareRegistry,
    tag: TaskTag,
    sensor: SimulatedSensor,
) {
    tracker.instrument(tag, tasks::sensor::run(registry, sensor)).await
}

#[embassy_executor::task]
async fn failure_task(
    tracker: &'static SwitchTracker,
    registry: &'static FirmwareRegistry,
    tag: TaskTag,
    heater: FirmwareHeater,
) {
    tracker.instrument(tag, tasks::failure::run(registry, heater)).await
}

#[embassy_executor::task]
async fn uart_task(tracker: &'static SwitchTracker, registry: &'static FirmwareRegistry, tag: TaskTag) {
    tracker.instrument(tag, tasks::uart::run(registry)).await
}

#[embassy_executor::task]
async fn runtime_task(
    tracker: &'static SwitchTracker,
    registry: &'static FirmwareRegistry,
    tag: TaskTag,
    accounting: &'static RuntimeAccounting<EmbassyClock>,
) {
    tracker.instrument(tag, tasks::runtime::run(registry, accounting)).await
}
