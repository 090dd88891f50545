//! L298N dual H-bridge motor boards.
//!
//! Each motor has two direction pins and one PWM enable channel. All enable
//! channels share a single timer configuration, which the HAL sets up once
//! before the channels are handed to [`MotorController::init`].

use embedded_hal::{
    digital::{OutputPin, PinState},
    pwm::SetDutyCycle,
};

use super::{
    config::{MotorPins, PinTable, PwmTimerConfig, BOARD_COUNT},
    error::{ActuatorError, BusFault, InitError},
};
use crate::utils::math::pulse::speed_to_duty;

/// Drive mode of one H-bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Stop,
    Forward,
    Reverse,
    Brake,
}

impl Direction {
    /// `(forward, reverse)` pin levels for this mode.
    pub const fn levels(self) -> (PinState, PinState) {
        match self {
            Direction::Forward => (PinState::High, PinState::Low),
            Direction::Reverse => (PinState::Low, PinState::High),
            Direction::Brake => (PinState::High, PinState::High),
            Direction::Stop => (PinState::Low, PinState::Low),
        }
    }
}

/// Direction plus clamped 8-bit speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorCommand {
    pub direction: Direction,
    pub speed: u8,
}

impl MotorCommand {
    pub fn new(
        direction: Direction,
        speed: i32,
    ) -> Self {
        MotorCommand {
            direction,
            speed: speed_to_duty(speed),
        }
    }

    /// Derive direction from the sign of `speed` and clamp its magnitude.
    ///
    /// Positive is forward, negative is reverse, zero is stop.
    pub fn from_signed(speed: i32) -> Self {
        let direction = match speed {
            s if s > 0 => Direction::Forward,
            s if s < 0 => Direction::Reverse,
            _ => Direction::Stop,
        };
        MotorCommand::new(direction, speed.saturating_abs())
    }
}

/// One motor: direction pin pair plus its enable channel.
pub struct MotorChannel<P, D> {
    forward: P,
    reverse: P,
    enable: D,
    pwm_channel: u8,
}

impl<P, D> MotorChannel<P, D>
where
    P: OutputPin,
    D: SetDutyCycle,
{
    pub fn new(
        forward: P,
        reverse: P,
        enable: D,
        pwm_channel: u8,
    ) -> Self {
        MotorChannel {
            forward,
            reverse,
            enable,
            pwm_channel,
        }
    }

    pub fn pwm_channel(&self) -> u8 {
        self.pwm_channel
    }

    /// Set the direction pins, then the duty.
    ///
    /// A failed duty write leaves the pins at their new levels.
    fn apply(
        &mut self,
        command: MotorCommand,
    ) -> Result<(), BusFault> {
        let (fwd, rev) = command.direction.levels();
        self.forward.set_state(fwd).map_err(BusFault::pin)?;
        self.reverse.set_state(rev).map_err(BusFault::pin)?;
        self.enable
            .set_duty_cycle(command.speed as u16)
            .map_err(BusFault::pwm)
    }
}

/// One L298N board driving motors A (index 0) and B (index 1).
pub struct MotorBoard<P, D> {
    a: MotorChannel<P, D>,
    b: MotorChannel<P, D>,
}

impl<P, D> MotorBoard<P, D>
where
    P: OutputPin,
    D: SetDutyCycle,
{
    pub fn new(
        a: MotorChannel<P, D>,
        b: MotorChannel<P, D>,
    ) -> Self {
        MotorBoard { a, b }
    }

    fn channel_mut(
        &mut self,
        motor: usize,
    ) -> Option<&mut MotorChannel<P, D>> {
        match motor {
            0 => Some(&mut self.a),
            1 => Some(&mut self.b),
            _ => None,
        }
    }

    /// Apply `direction` and `speed` to one motor on this board.
    pub fn set_motor(
        &mut self,
        motor: usize,
        direction: Direction,
        speed: i32,
    ) -> Result<(), ActuatorError> {
        let channel = self
            .channel_mut(motor)
            .ok_or(ActuatorError::InvalidArgument)?;
        let command = MotorCommand::new(direction, speed);
        tracing::debug!(
            motor,
            ?direction,
            duty = command.speed,
            ch = channel.pwm_channel(),
            "set motor"
        );
        channel.apply(command).map_err(|fault| {
            tracing::error!(motor, %fault, "motor write failed");
            ActuatorError::BusWriteFailure(fault)
        })
    }
}

/// All motor boards on the rover, indexed `0..BOARD_COUNT`.
pub struct MotorController<P, D> {
    boards: [MotorBoard<P, D>; BOARD_COUNT],
}

impl<P, D> MotorController<P, D>
where
    P: OutputPin,
    D: SetDutyCycle,
{
    /// Verify each enable channel's resolution and drive every motor to a stop.
    ///
    /// The shared timer must already be configured; a channel whose maximum
    /// duty differs from `timer.max_duty()` is rejected.
    pub fn init(
        mut boards: [MotorBoard<P, D>; BOARD_COUNT],
        timer: &PwmTimerConfig,
    ) -> Result<Self, InitError> {
        let expected = timer.max_duty();
        for (board, dev) in boards.iter_mut().enumerate() {
            for (motor, channel) in [&mut dev.a, &mut dev.b].into_iter().enumerate() {
                let found = channel.enable.max_duty_cycle();
                if found != expected {
                    return Err(InitError::DutyResolution {
                        board,
                        motor,
                        expected,
                        found,
                    });
                }
                channel
                    .apply(MotorCommand::new(Direction::Stop, 0))
                    .map_err(|fault| InitError::Motor {
                        board,
                        motor,
                        fault,
                    })?;
            }
        }
        tracing::info!(
            boards = BOARD_COUNT,
            freq = timer.frequency_hz,
            bits = timer.resolution_bits,
            "motor controller initialized"
        );
        Ok(MotorController { boards })
    }

    /// Validate `table`, build each motor with `make`, then [`init`](Self::init).
    ///
    /// `make` receives `(board, motor, pins)` in board-major order and returns
    /// `(forward, reverse, enable)`.
    pub fn from_table<F>(
        table: &PinTable,
        timer: &PwmTimerConfig,
        mut make: F,
    ) -> Result<Self, InitError>
    where
        F: FnMut(usize, usize, &MotorPins) -> (P, P, D),
    {
        table.validate()?;
        let boards = core::array::from_fn(|b| {
            let pins = &table.boards[b];
            let (fa, ra, ea) = make(b, 0, &pins.a);
            let (fb, rb, eb) = make(b, 1, &pins.b);
            MotorBoard::new(
                MotorChannel::new(fa, ra, ea, pins.a.pwm_channel),
                MotorChannel::new(fb, rb, eb, pins.b.pwm_channel),
            )
        });
        Self::init(boards, timer)
    }

    /// Apply `direction` and `speed` (clamped to 255) to one motor.
    pub fn set_motor(
        &mut self,
        board: usize,
        motor: usize,
        direction: Direction,
        speed: i32,
    ) -> Result<(), ActuatorError> {
        self.boards
            .get_mut(board)
            .ok_or(ActuatorError::InvalidArgument)?
            .set_motor(motor, direction, speed)
    }

    pub fn board_count(&self) -> usize {
        self.boards.len()
    }
}
