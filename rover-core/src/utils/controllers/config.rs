//! Static wiring and timing configuration.
//!
//! The pin table maps each of the three L298N boards to its direction pins,
//! enable pin and LEDC channel. It is loaded once at startup, validated, and
//! never changed afterwards.

use serde::{Deserialize, Serialize};

use super::error::InitError;

/// Number of L298N boards on the rover.
pub const BOARD_COUNT: usize = 3;
/// Motors driven by each board (A and B).
pub const MOTORS_PER_BOARD: usize = 2;
/// LEDC channels available for motor enables.
pub const LEDC_CHANNELS: u8 = 8;

/// 7-bit address of the PCA9685 servo driver.
pub const PCA9685_ADDRESS: u8 = 0x40;
/// GPIOs of the servo I2C bus (SDA, SCL). Motor wiring may not use them.
pub const SERVO_BUS_GPIOS: [u8; 2] = [18, 17];
/// Servo PWM carrier (Hz).
pub const SERVO_FREQUENCY_HZ: u32 = 50;
/// UDP port the command listener binds.
pub const LISTEN_PORT: u16 = 8080;

/// Pins and PWM channel for one motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorPins {
    pub forward: u8,
    pub reverse: u8,
    pub enable: u8,
    pub pwm_channel: u8,
}

/// Both motors on one L298N board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardPins {
    pub a: MotorPins,
    pub b: MotorPins,
}

/// Shared timer settings for every motor enable channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PwmTimerConfig {
    pub frequency_hz: u32,
    pub resolution_bits: u8,
}

impl PwmTimerConfig {
    /// Largest duty value at this resolution.
    pub const fn max_duty(&self) -> u16 {
        ((1u32 << self.resolution_bits) - 1) as u16
    }
}

/// 5 kHz, 8-bit: duty values 0..=255.
pub const PWM_TIMER: PwmTimerConfig = PwmTimerConfig {
    frequency_hz: 5000,
    resolution_bits: 8,
};

const fn motor(
    forward: u8,
    reverse: u8,
    enable: u8,
    pwm_channel: u8,
) -> MotorPins {
    MotorPins {
        forward,
        reverse,
        enable,
        pwm_channel,
    }
}

/// Board → motor → pin assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinTable {
    pub boards: [BoardPins; BOARD_COUNT],
}

impl PinTable {
    /// Wiring of the ESP32-S3 rover.
    pub const DEFAULT: PinTable = PinTable {
        boards: [
            BoardPins {
                a: motor(4, 5, 6, 0),
                b: motor(7, 15, 16, 1),
            },
            BoardPins {
                a: motor(9, 10, 11, 2),
                b: motor(12, 13, 14, 3),
            },
            BoardPins {
                a: motor(1, 2, 42, 4),
                b: motor(41, 40, 39, 5),
            },
        ],
    };

    /// Iterate `(board, motor, pins)` in board-major order.
    pub fn motors(&self) -> impl Iterator<Item = (usize, usize, &MotorPins)> {
        self.boards
            .iter()
            .enumerate()
            .flat_map(|(b, board)| [(b, 0, &board.a), (b, 1, &board.b)])
    }

    /// Reject tables that reuse a GPIO or a PWM channel.
    ///
    /// The servo bus pins count as already taken.
    pub fn validate(&self) -> Result<(), InitError> {
        const RESERVED: usize = SERVO_BUS_GPIOS.len();
        const PINS: usize = RESERVED + BOARD_COUNT * MOTORS_PER_BOARD * 3;
        let mut gpios = [0u8; PINS];
        gpios[..RESERVED].copy_from_slice(&SERVO_BUS_GPIOS);
        let mut used = RESERVED;
        let mut channels = 0u8;

        for (_, _, pins) in self.motors() {
            if pins.pwm_channel >= LEDC_CHANNELS || channels & (1 << pins.pwm_channel) != 0 {
                return Err(InitError::InvalidPwmChannel(pins.pwm_channel));
            }
            channels |= 1 << pins.pwm_channel;

            for gpio in [pins.forward, pins.reverse, pins.enable] {
                if gpios[..used].contains(&gpio) {
                    return Err(InitError::DuplicatePin(gpio));
                }
                gpios[used] = gpio;
                used += 1;
            }
        }
        Ok(())
    }
}

impl Default for PinTable {
    fn default() -> Self {
        PinTable::DEFAULT
    }
}
