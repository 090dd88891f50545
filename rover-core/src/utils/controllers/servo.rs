//! PCA9685 servo driver on the shared I2C bus.
//!
//! The controller runs a 50 Hz carrier. Every channel starts its pulse at
//! count 0 and the OFF count encodes the pulse width, so a servo update is a
//! single 4-register block write.

use core::cell::RefCell;

use embedded_hal::{delay::DelayNs, i2c::I2c};

use super::{
    bus::RegisterBus,
    config::SERVO_FREQUENCY_HZ,
    error::{ActuatorError, BusFault, InitError, InitStep},
};
use crate::utils::math::pulse::{angle_to_pulse, prescale_for, PCA9685_OSC_HZ};

pub const MODE1: u8 = 0x00;
pub const PRESCALE: u8 = 0xFE;
/// LED0_ON_L; channel `n` starts at `LED0_ON_L + 4 * n`.
pub const LED0_ON_L: u8 = 0x06;

pub const MODE1_ALLCALL: u8 = 0x01;
pub const MODE1_SLEEP: u8 = 0x10;
pub const MODE1_AI: u8 = 0x20;
pub const MODE1_RESTART: u8 = 0x80;

/// Servo channels wired on the rover.
pub const SERVO_CHANNELS: u8 = 6;
/// OFF count that keeps a channel high for the whole period.
pub const FULL_ON: u16 = 0x0FFF;
/// Oscillator restart time after a MODE1 change (ms).
pub const SETTLE_MS: u32 = 10;

fn step_failed(step: InitStep) -> impl Fn(BusFault) -> InitError {
    move |fault| InitError::Servo {
        step,
        fault: Some(fault),
    }
}

/// Six-channel servo driver.
pub struct ServoController<'a, I2C: 'static> {
    bus: RegisterBus<'a, I2C>,
    prescale: u8,
}

impl<'a, I2C> ServoController<'a, I2C>
where
    I2C: I2c + 'static,
{
    pub fn new(
        i2c_bus: &'a RefCell<I2C>,
        address: u8,
    ) -> Self {
        ServoController {
            bus: RegisterBus::new(i2c_bus, address),
            prescale: prescale_for(PCA9685_OSC_HZ, SERVO_FREQUENCY_HZ),
        }
    }

    /// Prescale value written during [`init`](Self::init).
    pub fn prescale(&self) -> u8 {
        self.prescale
    }

    /// Program the 50 Hz carrier and wake the device with auto-increment on.
    ///
    /// The prescaler only latches while the oscillator is stopped, so the
    /// device is put to sleep first and the sleep bit is checked before the
    /// prescale write.
    pub fn init<D: DelayNs>(
        &mut self,
        delay: &mut D,
    ) -> Result<(), InitError> {
        self.bus
            .write_register(MODE1, MODE1_SLEEP)
            .map_err(step_failed(InitStep::Sleep))?;
        delay.delay_ms(SETTLE_MS);

        let mode1 = self
            .bus
            .read_register(MODE1)
            .map_err(step_failed(InitStep::VerifySleep))?;
        tracing::debug!("MODE1 after sleep: 0x{:02X}", mode1);
        if mode1 & MODE1_SLEEP == 0 {
            return Err(InitError::Servo {
                step: InitStep::VerifySleep,
                fault: None,
            });
        }

        self.bus
            .write_register(PRESCALE, self.prescale)
            .map_err(step_failed(InitStep::Prescale))?;

        self.bus
            .write_register(MODE1, MODE1_RESTART | MODE1_AI | MODE1_ALLCALL)
            .map_err(step_failed(InitStep::Wake))?;
        delay.delay_ms(SETTLE_MS);

        tracing::info!(
            addr = self.bus.address(),
            prescale = self.prescale,
            "PCA9685 initialized"
        );
        Ok(())
    }

    /// Current MODE1 register value.
    pub fn read_mode1(&mut self) -> Result<u8, BusFault> {
        self.bus.read_register(MODE1)
    }

    /// Clear the sleep bit in place if it is set, leaving the prescaler alone.
    ///
    /// Returns `true` when the device was asleep and has been woken.
    pub fn force_wake<D: DelayNs>(
        &mut self,
        delay: &mut D,
    ) -> Result<bool, BusFault> {
        let woke = self.bus.update_register(MODE1, MODE1_SLEEP, 0)?;
        if woke {
            delay.delay_ms(SETTLE_MS);
            tracing::warn!("PCA9685 was asleep, woken in place");
        }
        Ok(woke)
    }

    /// Move `channel` to `angle` degrees.
    pub fn set_servo_angle(
        &mut self,
        channel: u8,
        angle: f32,
    ) -> Result<(), ActuatorError> {
        let pulse = angle_to_pulse(angle);
        tracing::debug!(channel, angle, pulse, "set servo");
        self.write_off(channel, pulse)
    }

    /// Hold `channel` high for the whole period.
    pub fn set_full_on(
        &mut self,
        channel: u8,
    ) -> Result<(), ActuatorError> {
        self.write_off(channel, FULL_ON)
    }

    fn write_off(
        &mut self,
        channel: u8,
        off: u16,
    ) -> Result<(), ActuatorError> {
        if channel >= SERVO_CHANNELS {
            return Err(ActuatorError::InvalidArgument);
        }
        let [lo, hi] = off.to_le_bytes();
        self.bus
            .write_block(LED0_ON_L + 4 * channel, &[0x00, 0x00, lo, hi])
            .map_err(|fault| {
                tracing::error!(channel, %fault, "servo write failed");
                ActuatorError::BusWriteFailure(fault)
            })
    }
}
