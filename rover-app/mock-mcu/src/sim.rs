//! Simulated rover peripherals.
//!
//! The pins and PWM channels only log what they are driven to. The PCA9685
//! keeps a register file so that the init sequence and the block writes behave
//! as on the device: the prescaler latches only while asleep and block writes
//! advance the register pointer only with auto-increment enabled.

use std::convert::Infallible;

use embedded_hal::{
    digital::{self, OutputPin},
    i2c::{self, ErrorKind, NoAcknowledgeSource, Operation},
    pwm::{self, SetDutyCycle},
};
use rover_core::utils::controllers::servo::{
    LED0_ON_L, MODE1, MODE1_AI, MODE1_SLEEP, PRESCALE, SERVO_CHANNELS,
};
use tracing::{debug, info, warn};

/// Output pin identified by its GPIO number.
pub struct SimPin {
    gpio: u8,
}

impl SimPin {
    pub fn new(gpio: u8) -> Self {
        SimPin { gpio }
    }
}

impl digital::ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        debug!("GPIO{} low", self.gpio);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        debug!("GPIO{} high", self.gpio);
        Ok(())
    }
}

/// LEDC channel at a fixed resolution.
pub struct SimPwm {
    channel: u8,
    gpio: u8,
    max_duty: u16,
}

impl SimPwm {
    pub fn new(
        channel: u8,
        gpio: u8,
        max_duty: u16,
    ) -> Self {
        SimPwm {
            channel,
            gpio,
            max_duty,
        }
    }
}

impl pwm::ErrorType for SimPwm {
    type Error = Infallible;
}

impl SetDutyCycle for SimPwm {
    fn max_duty_cycle(&self) -> u16 {
        self.max_duty
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Self::Error> {
        info!("LEDC ch{} (GPIO{}) duty {}", self.channel, self.gpio, duty);
        Ok(())
    }
}

/// PCA9685 register file behind a one-device I2C bus.
pub struct SimPca9685 {
    address: u8,
    regs: [u8; 256],
    pointer: u8,
}

impl SimPca9685 {
    /// Power-on state: asleep, ALLCALL enabled, default prescale.
    pub fn new(address: u8) -> Self {
        let mut regs = [0u8; 256];
        regs[MODE1 as usize] = MODE1_SLEEP | 0x01;
        regs[PRESCALE as usize] = 0x1E;
        SimPca9685 {
            address,
            regs,
            pointer: 0,
        }
    }

    fn auto_increment(&self) -> bool {
        self.regs[MODE1 as usize] & MODE1_AI != 0
    }

    fn store(
        &mut self,
        reg: u8,
        value: u8,
    ) {
        if reg == PRESCALE && self.regs[MODE1 as usize] & MODE1_SLEEP == 0 {
            warn!("PCA9685: prescale write ignored while awake");
            return;
        }
        // RESTART is write-one-to-clear and never reads back set.
        let value = if reg == MODE1 { value & 0x7F } else { value };
        self.regs[reg as usize] = value;
    }

    fn write_bytes(
        &mut self,
        bytes: &[u8],
    ) {
        let Some((&reg, data)) = bytes.split_first() else {
            return;
        };
        self.pointer = reg;
        for &value in data {
            self.store(self.pointer, value);
            if self.auto_increment() {
                self.pointer = self.pointer.wrapping_add(1);
            }
        }
        self.report_channel(reg, data.len());
    }

    fn read_into(
        &mut self,
        buf: &mut [u8],
    ) {
        for byte in buf.iter_mut() {
            *byte = self.regs[self.pointer as usize];
            if self.auto_increment() {
                self.pointer = self.pointer.wrapping_add(1);
            }
        }
    }

    fn report_channel(
        &self,
        start: u8,
        len: usize,
    ) {
        let last = LED0_ON_L + 4 * SERVO_CHANNELS;
        if len != 4 || start < LED0_ON_L || start >= last || (start - LED0_ON_L) % 4 != 0 {
            return;
        }
        let base = start as usize;
        let off = u16::from_le_bytes([self.regs[base + 2], self.regs[base + 3]]);
        debug!("PCA9685 ch{} OFF at {} counts", (start - LED0_ON_L) / 4, off);
    }
}

impl i2c::ErrorType for SimPca9685 {
    type Error = ErrorKind;
}

impl i2c::I2c for SimPca9685 {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != self.address {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for op in operations {
            match op {
                Operation::Write(bytes) => self.write_bytes(bytes),
                Operation::Read(buf) => self.read_into(buf),
            }
        }
        Ok(())
    }
}
