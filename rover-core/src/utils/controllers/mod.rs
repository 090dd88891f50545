//! Module Exports
//!
//! This file exports the actuator modules and the command dispatcher.
//!
//! - `bus`: register-level access to the shared I2C bus.
//! - `config`: pin table and PWM timer configuration.
//! - `motor`: L298N motor boards on GPIO + LEDC.
//! - `servo`: PCA9685 servo driver.

pub mod bus;
pub mod config;
pub mod error;
pub mod motor;
pub mod servo;

use core::fmt;

use embedded_hal::{digital::OutputPin, i2c::I2c, pwm::SetDutyCycle};

pub use error::{ActuatorError, BusFault, InitError, InitStep};
pub use motor::{Direction, MotorCommand, MotorController};
pub use servo::ServoController;

use crate::utils::connection::command::{self, FrameError, RoverCommand};

/// Motor side of the dispatcher.
pub trait MotorActuator {
    fn board_count(&self) -> usize;

    fn set_motor(
        &mut self,
        board: usize,
        motor: usize,
        direction: Direction,
        speed: i32,
    ) -> Result<(), ActuatorError>;
}

/// Servo side of the dispatcher.
pub trait ServoActuator {
    fn set_servo_angle(
        &mut self,
        channel: u8,
        angle: f32,
    ) -> Result<(), ActuatorError>;
}

impl<P, D> MotorActuator for MotorController<P, D>
where
    P: OutputPin,
    D: SetDutyCycle,
{
    fn board_count(&self) -> usize {
        MotorController::board_count(self)
    }

    fn set_motor(
        &mut self,
        board: usize,
        motor: usize,
        direction: Direction,
        speed: i32,
    ) -> Result<(), ActuatorError> {
        MotorController::set_motor(self, board, motor, direction, speed)
    }
}

impl<I2C> ServoActuator for ServoController<'_, I2C>
where
    I2C: I2c + 'static,
{
    fn set_servo_angle(
        &mut self,
        channel: u8,
        angle: f32,
    ) -> Result<(), ActuatorError> {
        ServoController::set_servo_angle(self, channel, angle)
    }
}

/// Why a frame produced no (or only partial) actuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    /// Rejected before any actuation.
    Frame(FrameError),
    /// First actuator failure; the remaining targets were still driven.
    Actuator(ActuatorError),
}

impl From<FrameError> for DispatchError {
    fn from(e: FrameError) -> Self {
        DispatchError::Frame(e)
    }
}

impl From<ActuatorError> for DispatchError {
    fn from(e: ActuatorError) -> Self {
        DispatchError::Actuator(e)
    }
}

impl fmt::Display for DispatchError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            DispatchError::Frame(e) => e.fmt(f),
            DispatchError::Actuator(e) => e.fmt(f),
        }
    }
}

/// Owns the actuators and routes parsed commands to them.
pub struct RoverController<M, S> {
    motors: M,
    servos: S,
}

impl<M, S> RoverController<M, S>
where
    M: MotorActuator,
    S: ServoActuator,
{
    pub fn new(
        motors: M,
        servos: S,
    ) -> Self {
        RoverController { motors, servos }
    }

    pub fn motors(&self) -> &M {
        &self.motors
    }

    pub fn servos(&self) -> &S {
        &self.servos
    }

    /// Parse one datagram and apply it.
    ///
    /// Returns the command that was applied. Malformed and unknown frames
    /// never reach the actuators.
    pub fn handle_frame(
        &mut self,
        raw: &[u8],
    ) -> Result<RoverCommand, DispatchError> {
        let command = command::parse_frame(raw)?;
        self.execute(command)?;
        Ok(command)
    }

    /// Apply a parsed command.
    ///
    /// Every target is attempted; the first failure is returned.
    pub fn execute(
        &mut self,
        command: RoverCommand,
    ) -> Result<(), ActuatorError> {
        let mut first_err = None;

        match command {
            RoverCommand::Servo(set) => {
                for (channel, &angle) in set.angles.iter().enumerate() {
                    if let Err(e) = self.servos.set_servo_angle(channel as u8, angle as f32) {
                        first_err.get_or_insert(e);
                    }
                }
            }
            RoverCommand::Motor(MotorCommand { direction, speed }) => {
                for board in 0..self.motors.board_count() {
                    for motor in 0..config::MOTORS_PER_BOARD {
                        if let Err(e) = self
                            .motors
                            .set_motor(board, motor, direction, speed as i32)
                        {
                            first_err.get_or_insert(e);
                        }
                    }
                }
            }
        }

        first_err.map_or(Ok(()), Err)
    }
}
