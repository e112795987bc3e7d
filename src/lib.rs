//! heater-rtos - 座椅加热控制器任务协调层
//!
//! 本库提供以下核心功能:
//! - 事件多路复用 (队列集): 一个等待点汇聚数据队列与两个二值信号
//! - 去抖定时器: 把抖动的边沿中断变成单个逻辑事件
//! - 运行时统计: 每次任务切换时记录执行时间
//! - 同步原语注册表与七任务拓扑
//! - 条件编译日志系统
//!
//! 调度器本身不在本库中实现，只通过 [`kernel::Scheduler`] 描述所需接口。

#![cfg_attr(not(test), no_std)]

pub mod accounting;
pub mod boot;
pub mod fault;
#[cfg(feature = "firmware")]
pub mod firmware;
pub mod hw;
pub mod kernel;
pub mod registry;
pub mod sync;
pub mod tasks;
pub mod timer;
pub mod util;

// ===== 重导出常用类型 =====
pub use accounting::{CycleCounter, RuntimeAccounting};
pub use kernel::{Scheduler, SwitchHooks, TaskTag};
pub use registry::Registry;
pub use sync::{BinarySignal, BoundedQueue, EventGroup, PiMutex, QueueSet};
pub use timer::SoftTimer;

// ===== 版本信息 =====
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// 系统配置常量
pub mod config {
    /// 原始控制板 CPU 频率 (Hz)
    pub const CPU_CLOCK_HZ: u32 = 16_000_000;

    /// ESP32-S3 目标 CPU 频率 (Hz)
    pub const CPU_FREQ_HZ: u32 = 240_000_000;

    /// 调度器 Tick 频率 (Hz)
    pub const TICK_RATE_HZ: u32 = 100;

    /// Embassy 时间基准 (Hz) - 运行时统计使用该计数器
    pub const TICK_FREQ_HZ: u32 = 1_000_000;

    /// 任务优先级数量 (0 ~ MAX_PRIORITIES-1)
    pub const MAX_PRIORITIES: u8 = 5;

    /// 最小任务栈 (字)
    pub const MINIMAL_STACK_WORDS: usize = 128;

    /// 应用任务栈 (字)
    pub const TASK_STACK_WORDS: usize = 256;

    /// 应用任务数量，同时也是统计表的长度
    pub const TASK_COUNT: usize = 7;

    /// 内核对象配额 (字节)，对应原固件的堆大小
    pub const TOTAL_HEAP_SIZE: usize = 16 * 1024;

    /// 温度采样队列长度
    pub const SIZE_TEMPERATURE_QUEUE: usize = 5;

    /// 加热等级队列长度 (队列集成员)
    pub const SIZE_LEVEL_OF_HEATING_QUEUE: usize = 5;

    /// 加热状态队列长度
    pub const SIZE_STATE_OF_HEATING_QUEUE: usize = 5;

    /// 诊断用加热等级队列长度
    pub const SIZE_LEVEL_OF_HEATING_UART_QUEUE: usize = 5;

    /// 加热等级 + 故障队列集容量: 等级队列 + 两个二值信号
    pub const SIZE_LEVEL_OF_HEATING_AND_FAILURE_QUEUE_SET: usize =
        SIZE_LEVEL_OF_HEATING_QUEUE + 1 + 1;

    /// 队列集静态上限
    pub const QUEUE_SET_MAX_EVENTS: usize = 16;

    /// 单个队列集最多成员数
    pub const QUEUE_SET_MAX_MEMBERS: usize = 8;

    /// 按键去抖延时 (ms)
    pub const DEBOUNCE_DELAY_MS: u64 = 50;

    /// 定时器服务优先级
    pub const TIMER_TASK_PRIORITY: u8 = MAX_PRIORITIES - 1;

    /// 传感器周期采样间隔 (ms)
    pub const SENSOR_PERIOD_MS: u64 = 500;

    /// 故障处理任务在队列集上的最长等待 (ms)
    pub const FAILURE_SELECT_TIMEOUT_MS: u64 = 1_000;

    /// 运行时统计报告周期 (ms)
    pub const RUNTIME_REPORT_PERIOD_MS: u64 = 5_000;

    /// 嵌套切换深度: 每个优先级最多一个被抢占的任务
    pub const SWITCH_DEPTH: usize = MAX_PRIORITIES as usize + 1;
}
