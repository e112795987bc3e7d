//! 同步原语注册表
//!
//! 启动时按固定顺序一次性创建所有原语，每次创建都扣减内核对象配额。
//! 失败时在串口输出 `"<name> Failed\r\n"` 并继续启动 (降级模式)，
//! 成功输出 `"<name> Created\r\n"`。句柄在进程生命周期内有效，从不销毁。
//!
//! 创建顺序:
//!
//! ```text
//!   Temp / Sensor / Failure / RUN TIME / OFF STATE 信号
//!   -> Uart 互斥锁
//!   -> 温度 / 等级 / 状态 / 诊断等级 队列
//!   -> 队列集 (成员: 等级队列、故障信号、关闭信号)
//!   -> 事件组 -> 去抖定时器
//! ```
//!
//! 降级模式下使用创建失败的原语是致命错误 ([`Fault::MissingHandle`])。

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::once_lock::OnceLock;
use embassy_time::Duration;
use portable_atomic::{AtomicU8, Ordering};

use crate::config::{
    DEBOUNCE_DELAY_MS, SIZE_LEVEL_OF_HEATING_AND_FAILURE_QUEUE_SET, SIZE_LEVEL_OF_HEATING_QUEUE,
    SIZE_LEVEL_OF_HEATING_UART_QUEUE, SIZE_STATE_OF_HEATING_QUEUE, SIZE_TEMPERATURE_QUEUE,
};
use crate::fault::{fatal, Fault};
use crate::hw::SerialPort;
use crate::kernel::{ObjectKind, PriorityTable, Quota};
use crate::sync::event_group::BUTTON_PRESSED;
use crate::sync::{BinarySignal, BoundedQueue, EventGroup, MemberId, PiMutex, QueueSet};
use crate::tasks::{HeatingLevel, HeatingState, Setpoint};
use crate::timer::{SoftTimer, TimerMode};
use crate::util::log::*;

pub type TemperatureQueue = BoundedQueue<u8, SIZE_TEMPERATURE_QUEUE>;
pub type LevelQueue = BoundedQueue<HeatingLevel, SIZE_LEVEL_OF_HEATING_QUEUE>;
pub type StateQueue = BoundedQueue<HeatingState, SIZE_STATE_OF_HEATING_QUEUE>;
pub type UartLevelQueue = BoundedQueue<HeatingLevel, SIZE_LEVEL_OF_HEATING_UART_QUEUE>;

const TEMP_SIGNAL: &str = "Temp Semphr";
const SENSOR_SIGNAL: &str = "Sensor Semphr";
const FAILURE_SIGNAL: &str = "Failure Semphr";
const REPORT_SIGNAL: &str = "RUN TIME Semphr";
const OFF_STATE_SIGNAL: &str = "OFF STATE Semphr";
const UART_MUTEX: &str = "Uart Mutex";
const TEMPERATURE_QUEUE: &str = "Temperature queue";
const LEVEL_QUEUE: &str = "Level of heating queue";
const STATE_QUEUE: &str = "State of heating queue";
const UART_LEVEL_QUEUE: &str = "Level of heating for uart queue";
const LEVEL_AND_FAILURE_SET: &str = "Level and failure queue set";
const EVENT_GROUP: &str = "Event group";
const DEBOUNCE_TIMER: &str = "Debounce Timer";

/// 队列集成员编号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetMembers {
    pub level: Option<MemberId>,
    pub failure: Option<MemberId>,
    pub off_state: Option<MemberId>,
}

/// 原语注册表
pub struct Registry<P: SerialPort + Send + 'static> {
    temperature_signal: Option<BinarySignal>,
    sensor_signal: Option<BinarySignal>,
    failure_signal: Option<BinarySignal>,
    reporting_signal: Option<BinarySignal>,
    off_state_signal: Option<BinarySignal>,
    uart: Option<PiMutex<P>>,
    /// 互斥锁创建失败时串口留在这里，仅供启动诊断使用
    boot_serial: Mutex<CriticalSectionRawMutex, RefCell<Option<P>>>,
    temperature_queue: Option<TemperatureQueue>,
    level_queue: Option<LevelQueue>,
    state_queue: Option<StateQueue>,
    uart_level_queue: Option<UartLevelQueue>,
    level_and_failure_set: Option<QueueSet>,
    members: OnceLock<SetMembers>,
    event_group: Option<EventGroup>,
    debounce_timer: Option<SoftTimer<Registry<P>>>,
    setpoint: Setpoint,
    priorities: &'static PriorityTable,
    failures: AtomicU8,
}

/// 输出一行创建结果
fn report<P: SerialPort>(serial: &mut P, name: &str, ok: bool) {
    serial.send_str(name);
    serial.send_str(if ok { " Created\r\n" } else { " Failed\r\n" });
}

/// 扣减配额并创建对象
fn create<P: SerialPort, T>(
    quota: &mut Quota,
    serial: &mut P,
    failures: &mut u8,
    name: &str,
    kind: ObjectKind,
    build: impl FnOnce() -> T,
) -> Option<T> {
    let created = quota.charge(kind).ok().map(|()| build());
    if created.is_none() {
        *failures += 1;
    }
    report(serial, name, created.is_some());
    created
}

/// 去抖定时器到期: 置位按键事件 (定时器服务上下文)
fn debounce_expired<P: SerialPort + Send + 'static>(registry: &Registry<P>) {
    registry.event_group().set_bits(BUTTON_PRESSED);
}

impl<P: SerialPort + Send + 'static> Registry<P> {
    /// 按固定顺序创建所有原语
    ///
    /// 串口在诊断输出结束后移入互斥锁; 互斥锁创建失败时串口保留为
    /// 启动诊断通道，任务创建结果仍能输出。
    pub fn create(quota: &mut Quota, priorities: &'static PriorityTable, mut serial: P) -> Self {
        let s = &mut serial;
        let mut failures = 0u8;
        let f = &mut failures;

        let binary = ObjectKind::BinarySemaphore;
        let temperature_signal = create(quota, s, f, TEMP_SIGNAL, binary, BinarySignal::new);
        let sensor_signal = create(quota, s, f, SENSOR_SIGNAL, binary, BinarySignal::new);
        let failure_signal = create(quota, s, f, FAILURE_SIGNAL, binary, BinarySignal::new);
        let reporting_signal = create(quota, s, f, REPORT_SIGNAL, binary, BinarySignal::new);
        let off_state_signal = create(quota, s, f, OFF_STATE_SIGNAL, binary, BinarySignal::new);
        let uart_ok = create(quota, s, f, UART_MUTEX, ObjectKind::Mutex, || ()).is_some();

        let temperature_queue = create(
            quota,
            s,
            f,
            TEMPERATURE_QUEUE,
            ObjectKind::Queue { length: SIZE_TEMPERATURE_QUEUE, item_size: 1 },
            TemperatureQueue::new,
        );
        let level_queue = create(
            quota,
            s,
            f,
            LEVEL_QUEUE,
            ObjectKind::Queue { length: SIZE_LEVEL_OF_HEATING_QUEUE, item_size: 1 },
            LevelQueue::new,
        );
        let state_queue = create(
            quota,
            s,
            f,
            STATE_QUEUE,
            ObjectKind::Queue { length: SIZE_STATE_OF_HEATING_QUEUE, item_size: 1 },
            StateQueue::new,
        );
        let uart_level_queue = create(
            quota,
            s,
            f,
            UART_LEVEL_QUEUE,
            ObjectKind::Queue { length: SIZE_LEVEL_OF_HEATING_UART_QUEUE, item_size: 1 },
            UartLevelQueue::new,
        );

        let level_and_failure_set = QueueSet::create(quota, SIZE_LEVEL_OF_HEATING_AND_FAILURE_QUEUE_SET).ok();
        if level_and_failure_set.is_none() {
            *f += 1;
        }
        report(s, LEVEL_AND_FAILURE_SET, level_and_failure_set.is_some());

        let event_group = create(quota, s, f, EVENT_GROUP, ObjectKind::EventGroup, EventGroup::new);
        let debounce_timer = create(quota, s, f, DEBOUNCE_TIMER, ObjectKind::Timer, || {
            SoftTimer::new(
                DEBOUNCE_TIMER,
                Duration::from_millis(DEBOUNCE_DELAY_MS),
                TimerMode::OneShot,
                0,
                debounce_expired::<P>,
            )
        });

        let (uart, boot_serial) = if uart_ok {
            (Some(PiMutex::new(serial, priorities)), None)
        } else {
            (None, Some(serial))
        };

        if failures > 0 {
            log_warn!("Registry degraded: {} objects failed", failures);
        } else {
            log_info!("Registry ready, {} bytes left", quota.remaining());
        }

        Self {
            temperature_signal,
            sensor_signal,
            failure_signal,
            reporting_signal,
            off_state_signal,
            uart,
            boot_serial: Mutex::new(RefCell::new(boot_serial)),
            temperature_queue,
            level_queue,
            state_queue,
            uart_level_queue,
            level_and_failure_set,
            members: OnceLock::new(),
            event_group,
            debounce_timer,
            setpoint: Setpoint::new(),
            priorities,
            failures: AtomicU8::new(failures),
        }
    }

    /// 把等级队列、故障信号、关闭信号加入队列集 (仅启动阶段调用一次)
    ///
    /// 缺失的集合或成员被跳过; 加入失败计入降级。
    pub fn attach_queue_set_members(&'static self) -> SetMembers {
        let mut members = SetMembers {
            level: None,
            failure: None,
            off_state: None,
        };
        if let Some(set) = &self.level_and_failure_set {
            members.level = self.level_queue.as_ref().and_then(|m| self.join(set, m, LEVEL_QUEUE));
            members.failure = self.failure_signal.as_ref().and_then(|m| self.join(set, m, FAILURE_SIGNAL));
            members.off_state = self.off_state_signal.as_ref().and_then(|m| self.join(set, m, OFF_STATE_SIGNAL));
        }
        if self.members.init(members).is_err() {
            log_warn!("Queue set members already attached");
        }
        self.set_members()
    }

    fn join<M: crate::sync::SetMember>(&self, set: &'static QueueSet, member: &'static M, name: &str) -> Option<MemberId> {
        match set.add_member(member) {
            Ok(id) => Some(id),
            Err(e) => {
                log_warn!("{} not added to queue set: {}", name, e);
                self.failures.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// 队列集成员编号 (未绑定时全部为 `None`)
    pub fn set_members(&self) -> SetMembers {
        self.members.try_get().copied().unwrap_or(SetMembers {
            level: None,
            failure: None,
            off_state: None,
        })
    }

    /// 创建失败的对象数量
    pub fn failures(&self) -> u8 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn temperature_signal(&self) -> &BinarySignal {
        require(self.temperature_signal.as_ref(), TEMP_SIGNAL)
    }

    pub fn sensor_signal(&self) -> &BinarySignal {
        require(self.sensor_signal.as_ref(), SENSOR_SIGNAL)
    }

    pub fn failure_signal(&self) -> &BinarySignal {
        require(self.failure_signal.as_ref(), FAILURE_SIGNAL)
    }

    pub fn reporting_signal(&self) -> &BinarySignal {
        require(self.reporting_signal.as_ref(), REPORT_SIGNAL)
    }

    pub fn off_state_signal(&self) -> &BinarySignal {
        require(self.off_state_signal.as_ref(), OFF_STATE_SIGNAL)
    }

    /// 串口互斥锁
    pub fn uart(&self) -> &PiMutex<P> {
        require(self.uart.as_ref(), UART_MUTEX)
    }

    /// 串口互斥锁 (降级模式下可能不存在)
    pub fn try_uart(&self) -> Option<&PiMutex<P>> {
        self.uart.as_ref()
    }

    /// 启动阶段诊断输出
    ///
    /// 优先经过串口互斥锁; 互斥锁缺失时直接使用保留的串口。
    /// 互斥锁被占用时丢弃。
    pub fn boot_print(&self, parts: &[&str]) {
        fn emit<P: SerialPort>(serial: &mut P, parts: &[&str]) {
            for part in parts {
                serial.send_str(part);
            }
        }

        match self.try_uart() {
            Some(uart) => {
                if let Some(mut serial) = uart.try_lock_unowned() {
                    emit(&mut *serial, parts);
                }
            }
            None => self.boot_serial.lock(|s| {
                if let Some(serial) = s.borrow_mut().as_mut() {
                    emit(serial, parts);
                }
            }),
        }
    }

    pub fn temperature_queue(&self) -> &TemperatureQueue {
        require(self.temperature_queue.as_ref(), TEMPERATURE_QUEUE)
    }

    pub fn level_queue(&self) -> &LevelQueue {
        require(self.level_queue.as_ref(), LEVEL_QUEUE)
    }

    pub fn state_queue(&self) -> &StateQueue {
        require(self.state_queue.as_ref(), STATE_QUEUE)
    }

    pub fn uart_level_queue(&self) -> &UartLevelQueue {
        require(self.uart_level_queue.as_ref(), UART_LEVEL_QUEUE)
    }

    pub fn level_and_failure_set(&self) -> &QueueSet {
        require(self.level_and_failure_set.as_ref(), LEVEL_AND_FAILURE_SET)
    }

    pub fn event_group(&self) -> &EventGroup {
        require(self.event_group.as_ref(), EVENT_GROUP)
    }

    pub fn debounce_timer(&self) -> &SoftTimer<Registry<P>> {
        require(self.debounce_timer.as_ref(), DEBOUNCE_TIMER)
    }

    /// 用户目标档位
    pub fn setpoint(&self) -> &Setpoint {
        &self.setpoint
    }

    /// 有效优先级表
    pub fn priorities(&self) -> &'static PriorityTable {
        self.priorities
    }
}

#[inline]
fn require<'a, T>(handle: Option<&'a T>, name: &'static str) -> &'a T {
    match handle {
        Some(h) => h,
        None => fatal(Fault::MissingHandle(name)),
    }
}
