//! heater-rtos - ESP32-S3 座椅加热控制器固件
//!
//! 基于 esp-rtos + Embassy，四级执行器对应五级任务优先级:
//! - 三个 InterruptExecutor 承载优先级 4 / 3 / 2 的控制任务
//! - 线程模式执行器承载串口诊断与运行时统计报告
//!
//! 硬件目标: ESP32-S3-N16R8 (双核 Xtensa LX7 @ 240MHz)
//!
//! # 引脚
//! - GPIO0: 按键 (上拉，下降沿)
//! - GPIO4: 加热使能
//! - GPIO5: 故障指示
//! - GPIO6 / GPIO7 / GPIO15: 红 / 绿 / 蓝状态灯

#![no_std]
#![no_main]

use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use esp_hal::{
    gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull},
    interrupt::{software::SoftwareInterruptControl, Priority},
    timer::timg::TimerGroup,
};
use esp_rtos::embassy::InterruptExecutor;
use static_cell::StaticCell;

use heater_rtos::accounting::{EmbassyClock, RuntimeAccounting};
use heater_rtos::boot;
use heater_rtos::firmware::{Board, EmbassyPort, EspSerial, FirmwareRegistry, Tiers};
use heater_rtos::hw::{LedBar, SimulatedSensor, SwitchedHeater};
use heater_rtos::kernel::{PriorityTable, Quota, SwitchTracker};

// ===== 条件编译日志 =====
#[allow(unused_imports)]
use heater_rtos::util::log::*;

esp_bootloader_esp_idf::esp_app_desc!();

// ===== Panic Handler =====
#[cfg(any(feature = "dev", feature = "log-println"))]
use esp_backtrace as _;

#[cfg(not(any(feature = "dev", feature = "log-println")))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    heater_rtos::fault::halt()
}

// ===== 静态分配 =====
/// 优先级 4 (故障处理、定时器服务)
static HIGH_PRIO_EXECUTOR: StaticCell<InterruptExecutor<3>> = StaticCell::new();

/// 优先级 3 (LED、传感器)
static MID_PRIO_EXECUTOR: StaticCell<InterruptExecutor<2>> = StaticCell::new();

/// 优先级 2 (按键、温度)
static LOW_PRIO_EXECUTOR: StaticCell<InterruptExecutor<1>> = StaticCell::new();

static REGISTRY: StaticCell<FirmwareRegistry> = StaticCell::new();
static PRIORITIES: PriorityTable = PriorityTable::new();
static TRACKER: SwitchTracker = SwitchTracker::new();
static ACCOUNTING: RuntimeAccounting<EmbassyClock> = RuntimeAccounting::new(EmbassyClock);

/// 传感器模拟种子
const SENSOR_SEED: u32 = 12345;

// ===== 主入口点 =====
#[esp_rtos::main]
async fn main(spawner: Spawner) {
    // ========================================
    // 1. 硬件初始化
    // ========================================
    let peripherals = esp_hal::init(esp_hal::Config::default());

    log_info!("{} v{} starting on ESP32-S3", heater_rtos::NAME, heater_rtos::VERSION);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_ints = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_ints.software_interrupt0);

    log_info!("esp-rtos started");

    // ========================================
    // 2. 外设
    // ========================================
    let board = Board {
        sensor: SimulatedSensor::new(SENSOR_SEED),
        heater: SwitchedHeater::new(
            Output::new(peripherals.GPIO4, Level::Low, OutputConfig::default()),
            Output::new(peripherals.GPIO5, Level::Low, OutputConfig::default()),
        ),
        indicator: LedBar::new(
            Output::new(peripherals.GPIO6, Level::Low, OutputConfig::default()),
            Output::new(peripherals.GPIO7, Level::Low, OutputConfig::default()),
            Output::new(peripherals.GPIO15, Level::Low, OutputConfig::default()),
        ),
        button: Input::new(peripherals.GPIO0, InputConfig::default().with_pull(Pull::Up)),
    };

    // ========================================
    // 3. 同步原语 (创建结果输出到控制台)
    // ========================================
    let mut quota = Quota::default();
    let registry = boot::provision(&REGISTRY, &mut quota, &PRIORITIES, EspSerial);

    // ========================================
    // 4. 执行器
    // ========================================
    let high = HIGH_PRIO_EXECUTOR
        .init(InterruptExecutor::new(sw_ints.software_interrupt3))
        .start(Priority::Priority3);
    let mid = MID_PRIO_EXECUTOR
        .init(InterruptExecutor::new(sw_ints.software_interrupt2))
        .start(Priority::Priority2);
    let low = LOW_PRIO_EXECUTOR
        .init(InterruptExecutor::new(sw_ints.software_interrupt1))
        .start(Priority::Priority1);

    log_info!("Interrupt executors started (Priority3/2/1)");

    // ========================================
    // 5. 任务创建 -> 标签 -> 钩子 -> 启动
    // ========================================
    let tiers = Tiers {
        high,
        mid,
        low,
        thread: spawner,
    };
    let mut port = EmbassyPort::new(tiers, &TRACKER, registry, &ACCOUNTING, quota, board);
    let report = boot::launch(&mut port, registry, &ACCOUNTING);

    log_info!(
        "Boot finished: {} objects failed, {} tasks failed",
        report.object_failures,
        report.task_failures
    );

    // 线程模式执行器继续驱动优先级 0 / 1 的任务
    loop {
        Timer::after(Duration::from_secs(60)).await;
    }
}
