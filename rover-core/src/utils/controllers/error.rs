//! Error taxonomy shared by the actuators, the dispatcher and startup.
//!
//! Peripheral errors are reduced to their embedded-hal `ErrorKind` so that the
//! types crossing the dispatcher seam stay free of driver generics.

use core::fmt;

use embedded_hal::{digital, i2c, pwm};

/// The peripheral that rejected an operation, with its embedded-hal error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusFault {
    I2c(i2c::ErrorKind),
    Pwm(pwm::ErrorKind),
    Pin(digital::ErrorKind),
}

impl BusFault {
    pub fn i2c<E: i2c::Error>(e: E) -> Self {
        BusFault::I2c(e.kind())
    }

    pub fn pwm<E: pwm::Error>(e: E) -> Self {
        BusFault::Pwm(e.kind())
    }

    pub fn pin<E: digital::Error>(e: E) -> Self {
        BusFault::Pin(e.kind())
    }
}

impl fmt::Display for BusFault {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            BusFault::I2c(kind) => write!(f, "i2c: {kind}"),
            BusFault::Pwm(kind) => write!(f, "pwm: {kind}"),
            BusFault::Pin(kind) => write!(f, "gpio: {kind}"),
        }
    }
}

/// Errors returned by `set_motor` and `set_servo_angle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// Board, motor or servo channel index out of range. Never retried.
    InvalidArgument,
    /// The peripheral write failed. Reported upward, not retried.
    BusWriteFailure(BusFault),
}

impl From<BusFault> for ActuatorError {
    fn from(fault: BusFault) -> Self {
        ActuatorError::BusWriteFailure(fault)
    }
}

impl fmt::Display for ActuatorError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ActuatorError::InvalidArgument => f.write_str("invalid argument"),
            ActuatorError::BusWriteFailure(fault) => write!(f, "bus write failure ({fault})"),
        }
    }
}

/// Servo controller start-up step, used to name the step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStep {
    Sleep,
    VerifySleep,
    Prescale,
    Wake,
}

/// Fatal start-up errors. Commands must not be accepted after one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// A GPIO number appears more than once in the pin table.
    DuplicatePin(u8),
    /// A PWM channel id is reused or outside the LEDC range.
    InvalidPwmChannel(u8),
    /// A motor's PWM channel does not have the configured resolution.
    DutyResolution {
        board: usize,
        motor: usize,
        expected: u16,
        found: u16,
    },
    /// Driving a motor to its stopped state failed.
    Motor {
        board: usize,
        motor: usize,
        fault: BusFault,
    },
    /// The servo controller did not complete a start-up step.
    Servo { step: InitStep, fault: Option<BusFault> },
}

impl fmt::Display for InitError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            InitError::DuplicatePin(gpio) => write!(f, "GPIO{gpio} assigned twice"),
            InitError::InvalidPwmChannel(ch) => write!(f, "PWM channel {ch} reused or out of range"),
            InitError::DutyResolution {
                board,
                motor,
                expected,
                found,
            } => write!(
                f,
                "board {board} motor {motor}: max duty {found}, expected {expected}"
            ),
            InitError::Motor {
                board,
                motor,
                fault,
            } => write!(f, "board {board} motor {motor}: {fault}"),
            InitError::Servo {
                step,
                fault: Some(fault),
            } => write!(f, "servo controller {step:?} failed: {fault}"),
            InitError::Servo { step, fault: None } => {
                write!(f, "servo controller {step:?} failed")
            }
        }
    }
}
