//! 硬件接口
//!
//! 任务只依赖这里的 trait，具体驱动由固件 (`firmware` feature) 或测试提供。

use embedded_hal::digital::OutputPin;

use crate::tasks::{HeatingLevel, HeatingState};
use crate::util::log::*;

/// 串口 (不可重入，经互斥锁访问)
pub trait SerialPort {
    /// 发送字符串
    fn send_str(&mut self, s: &str);
}

/// 温度传感器
pub trait TemperatureSensor {
    /// 读取温度 (°C)，读取失败返回 `None`
    fn read_celsius(&mut self) -> Option<u8>;
}

/// 加热器输出
pub trait HeaterOutput {
    /// 设置加热强度
    fn set_level(&mut self, level: HeatingLevel);

    /// 故障指示
    fn set_failure_indicator(&mut self, active: bool);
}

/// 加热状态指示
pub trait HeatingIndicator {
    /// 显示状态
    fn show(&mut self, state: HeatingState);
}

/// 三色 LED 指示
///
/// ```text
///   Off    全灭
///   Low    绿
///   Medium 蓝
///   High   绿 + 蓝
///   Fault  红
/// ```
pub struct LedBar<R, G, B> {
    red: R,
    green: G,
    blue: B,
}

impl<R: OutputPin, G: OutputPin, B: OutputPin> LedBar<R, G, B> {
    /// 创建并熄灭全部 LED
    pub fn new(red: R, green: G, blue: B) -> Self {
        let mut bar = Self { red, green, blue };
        bar.apply(false, false, false);
        bar
    }

    fn apply(&mut self, red: bool, green: bool, blue: bool) {
        let ok = drive(&mut self.red, red) && drive(&mut self.green, green) && drive(&mut self.blue, blue);
        if !ok {
            log_warn!("LED pin write failed");
        }
    }
}

fn drive<P: OutputPin>(pin: &mut P, on: bool) -> bool {
    let res = if on { pin.set_high() } else { pin.set_low() };
    res.is_ok()
}

impl<R: OutputPin, G: OutputPin, B: OutputPin> HeatingIndicator for LedBar<R, G, B> {
    fn show(&mut self, state: HeatingState) {
        match state {
            HeatingState::Off => self.apply(false, false, false),
            HeatingState::Low => self.apply(false, true, false),
            HeatingState::Medium => self.apply(false, false, true),
            HeatingState::High => self.apply(false, true, true),
            HeatingState::Fault => self.apply(true, false, false),
        }
    }
}

/// 开关式加热器: 一个加热使能引脚 + 一个故障指示引脚
///
/// 等级只区分开/关，强度调节留给具体的功率驱动。
pub struct SwitchedHeater<H, F> {
    enable: H,
    failure: F,
    level: HeatingLevel,
}

impl<H: OutputPin, F: OutputPin> SwitchedHeater<H, F> {
    /// 创建并关断
    pub fn new(enable: H, failure: F) -> Self {
        let mut heater = Self {
            enable,
            failure,
            level: HeatingLevel::Off,
        };
        heater.set_level(HeatingLevel::Off);
        heater.set_failure_indicator(false);
        heater
    }

    /// 最近一次设置的等级
    pub fn level(&self) -> HeatingLevel {
        self.level
    }
}

impl<H: OutputPin, F: OutputPin> HeaterOutput for SwitchedHeater<H, F> {
    fn set_level(&mut self, level: HeatingLevel) {
        self.level = level;
        if !drive(&mut self.enable, level != HeatingLevel::Off) {
            log_warn!("Heater pin write failed");
        }
    }

    fn set_failure_indicator(&mut self, active: bool) {
        if !drive(&mut self.failure, active) {
            log_warn!("Failure pin write failed");
        }
    }
}

/// 模拟温度传感器
///
/// 线性同余随机游走，约每 256 次采样注入一次越界读数 (45°C)，
/// 用于在没有真实探头的开发板上驱动完整的故障路径。
pub struct SimulatedSensor {
    seed: u32,
    celsius: u8,
}

impl SimulatedSensor {
    /// 游走下界 (°C)
    pub const FLOOR: u8 = 15;
    /// 游走上界 (°C)
    pub const CEILING: u8 = 35;
    /// 注入的越界读数 (°C)
    pub const FAULT_READING: u8 = 45;

    pub const fn new(seed: u32) -> Self {
        Self { seed, celsius: 22 }
    }

    #[inline(always)]
    fn next_random(&mut self) -> u32 {
        self.seed = self.seed.wrapping_mul(1103515245).wrapping_add(12345);
        self.seed >> 16
    }
}

impl TemperatureSensor for SimulatedSensor {
    fn read_celsius(&mut self) -> Option<u8> {
        let r = self.next_random();
        if r & 0xFF == 0 {
            return Some(Self::FAULT_READING);
        }
        // -2 ..= +2
        let delta = ((r >> 8) % 5) as i16 - 2;
        let next = (i16::from(self.celsius) + delta).clamp(i16::from(Self::FLOOR), i16::from(Self::CEILING));
        self.celsius = next as u8;
        Some(self.celsius)
    }
}

/// 测试用内存串口
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemorySerial {
    pub(crate) out: std::string::String,
}

#[cfg(test)]
impl SerialPort for MemorySerial {
    fn send_str(&mut self, s: &str) {
        self.out.push_str(s);
    }
}
