//! 任务模块
//!
//! 七个静态任务，创建一次、永不销毁:
//!
//! | 任务 | 优先级 | 标签 |
//! |---|---|---|
//! | `button`: 按键 (去抖后切换目标档位) | 2 | 0 |
//! | `temperature`: 计算加热等级 | 2 | 1 |
//! | `led`: 加热状态指示 | 3 | 2 |
//! | `sensor`: 温度采样与越界检测 | 3 | 3 |
//! | `failure`: 队列集多路复用 (等级 / 故障 / 关闭) | 4 | 4 |
//! | `uart`: 串口诊断输出 | 1 | 5 |
//! | `runtime`: 运行时统计报告 | 0 | 6 |
//!
//! 每个任务体拆成可单独测试的 `step` 和永不返回的 `run`。

use core::fmt;

use portable_atomic::{AtomicU8, Ordering};

use crate::config::{TASK_COUNT, TASK_STACK_WORDS};
use crate::kernel::{Priority, TaskTag};

pub mod button;
pub mod failure;
pub mod led;
pub mod runtime;
pub mod sensor;
pub mod temperature;
pub mod uart;

/// 任务标签常量
pub mod tags {
    use crate::kernel::TaskTag;

    pub const BUTTON_CONTROLLER_TAG: TaskTag = TaskTag::new(0);
    pub const TEMPERATURE_CONTROLLER_TAG: TaskTag = TaskTag::new(1);
    pub const LED_CONTROLLER_TAG: TaskTag = TaskTag::new(2);
    pub const SENSOR_CONTROLLER_TAG: TaskTag = TaskTag::new(3);
    pub const FAILURE_HANDLING_TAG: TaskTag = TaskTag::new(4);
    pub const UART_CONTROLLER_TAG: TaskTag = TaskTag::new(5);
    pub const RUNTIME_CONTROLLER_TAG: TaskTag = TaskTag::new(6);
}

/// 任务种类 (入口标识)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskKind {
    Button,
    Temperature,
    Led,
    Sensor,
    Failure,
    Uart,
    Runtime,
}

impl TaskKind {
    /// 统计标签
    pub const fn tag(self) -> TaskTag {
        match self {
            Self::Button => tags::BUTTON_CONTROLLER_TAG,
            Self::Temperature => tags::TEMPERATURE_CONTROLLER_TAG,
            Self::Led => tags::LED_CONTROLLER_TAG,
            Self::Sensor => tags::SENSOR_CONTROLLER_TAG,
            Self::Failure => tags::FAILURE_HANDLING_TAG,
            Self::Uart => tags::UART_CONTROLLER_TAG,
            Self::Runtime => tags::RUNTIME_CONTROLLER_TAG,
        }
    }

    /// 启动诊断中使用的名称
    pub const fn label(self) -> &'static str {
        match self {
            Self::Button => "Button controller task",
            Self::Temperature => "Temperature task",
            Self::Led => "Led task",
            Self::Sensor => "Sensor task",
            Self::Failure => "Failure task",
            Self::Uart => "UART task",
            Self::Runtime => "Run-Time Measurements Task",
        }
    }
}

/// 任务创建参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    pub kind: TaskKind,
    pub name: &'static str,
    pub stack_words: usize,
    pub priority: Priority,
}

impl TaskSpec {
    const fn new(kind: TaskKind, name: &'static str, priority: Priority) -> Self {
        Self {
            kind,
            name,
            stack_words: TASK_STACK_WORDS,
            priority,
        }
    }
}

/// 创建顺序即本表顺序
pub const TASK_SET: [TaskSpec; TASK_COUNT] = [
    TaskSpec::new(TaskKind::Button, "Button Task", 2),
    TaskSpec::new(TaskKind::Temperature, "Temperature Task", 2),
    TaskSpec::new(TaskKind::Led, "Led Task", 3),
    TaskSpec::new(TaskKind::Sensor, "Sensor Task", 3),
    TaskSpec::new(TaskKind::Failure, "Failure Handling Task", 4),
    TaskSpec::new(TaskKind::Uart, "Uart Task", 1),
    TaskSpec::new(TaskKind::Runtime, "Run-Time Measurements Task", 0),
];

// ===== 加热领域类型 =====

/// 加热等级 (单字节队列负载)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum HeatingLevel {
    Off = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

impl HeatingLevel {
    /// 从原始值转换，越界视为关闭
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Low,
            2 => Self::Medium,
            3 => Self::High,
            _ => Self::Off,
        }
    }

    /// 按键循环: Off -> Low -> Medium -> High -> Off
    pub const fn next(self) -> Self {
        match self {
            Self::Off => Self::Low,
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High => Self::Off,
        }
    }

    /// 目标温度 (°C)，关闭时为 `None`
    pub const fn target_celsius(self) -> Option<u8> {
        match self {
            Self::Off => None,
            Self::Low => Some(25),
            Self::Medium => Some(30),
            Self::High => Some(37),
        }
    }
}

impl fmt::Display for HeatingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "Off"),
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
        }
    }
}

/// 加热状态 (指示灯显示)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum HeatingState {
    Off = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    Fault = 4,
}

impl From<HeatingLevel> for HeatingState {
    fn from(level: HeatingLevel) -> Self {
        match level {
            HeatingLevel::Off => Self::Off,
            HeatingLevel::Low => Self::Low,
            HeatingLevel::Medium => Self::Medium,
            HeatingLevel::High => Self::High,
        }
    }
}

/// 传感器有效量程 (°C)
pub const SENSOR_VALID_RANGE: core::ops::RangeInclusive<u8> = 5..=40;

/// 用户选择的目标档位
pub struct Setpoint {
    desired: AtomicU8,
}

impl Setpoint {
    /// 初始为关闭
    pub const fn new() -> Self {
        Self {
            desired: AtomicU8::new(HeatingLevel::Off as u8),
        }
    }

    /// 当前档位
    pub fn get(&self) -> HeatingLevel {
        HeatingLevel::from_raw(self.desired.load(Ordering::Acquire))
    }

    /// 切换到下一档，返回新档位
    pub fn advance(&self) -> HeatingLevel {
        let next = self.get().next();
        self.desired.store(next as u8, Ordering::Release);
        next
    }
}

impl Default for Setpoint {
    fn default() -> Self {
        Self::new()
    }
}

/// 加热等级策略
///
/// 数值控制逻辑可替换; 默认实现按目标温差分档。
pub trait HeatingPolicy {
    /// 根据目标档位与当前温度计算加热等级
    fn level_for(&self, desired: HeatingLevel, current_celsius: u8) -> HeatingLevel {
        let Some(target) = desired.target_celsius() else {
            return HeatingLevel::Off;
        };
        match target.saturating_sub(current_celsius) {
            10.. => HeatingLevel::High,
            5..=9 => HeatingLevel::Medium,
            2..=4 => HeatingLevel::Low,
            _ => HeatingLevel::Off,
        }
    }
}

/// 默认分档策略
pub struct ThresholdPolicy;

impl HeatingPolicy for ThresholdPolicy {}
