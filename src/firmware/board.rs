//! 开发板外设

use esp_hal::gpio::{Input, Output};

use crate::hw::{LedBar, SerialPort, SimulatedSensor, SwitchedHeater};
use crate::registry::Registry;

/// 控制台串口 (esp-println 后端: USB-Serial-JTAG / UART0)
pub struct EspSerial;

impl SerialPort for EspSerial {
    #[inline]
    fn send_str(&mut self, s: &str) {
        esp_println::print!("{}", s);
    }
}

pub type FirmwareRegistry = Registry<EspSerial>;

/// 加热使能 + 故障指示
pub type FirmwareHeater = SwitchedHeater<Output<'static>, Output<'static>>;

/// 红 / 绿 / 蓝状态灯
pub type FirmwareIndicator = LedBar<Output<'static>, Output<'static>, Output<'static>>;

/// 任务独占的外设，启动时移入各自的任务
pub struct Board {
    pub sensor: SimulatedSensor,
    pub heater: FirmwareHeater,
    pub indicator: FirmwareIndicator,
    pub button: Input<'static>,
}
