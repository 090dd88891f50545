use core::cell::RefCell;
use std::rc::Rc;

use embassy_net::{IpAddress, IpEndpoint};
use embedded_hal::{digital, pwm};
use embedded_hal_mock::eh1::digital::{Mock as PinMock, State as PinState, Transaction as PinTrans};
use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTrans};
use rover_core::utils::connection::command::{FrameError, ParseError, RoverCommand};
use rover_core::utils::connection::listener::serve_datagram;
use rover_core::utils::controllers::config::{PinTable, PwmTimerConfig, PWM_TIMER};
use rover_core::utils::controllers::motor::{MotorBoard, MotorChannel};
use rover_core::utils::controllers::{
    ActuatorError, BusFault, Direction, DispatchError, InitError, MotorActuator, MotorController,
    RoverController, ServoActuator, ServoController,
};

const PWM_ADDRESS: u8 = 0x40;

// ------------------------------------------------------------------------------------------------
// Recording peripherals
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum Event {
    Pin(u8, bool),
    Duty(u8, u16),
}

type Log = Rc<RefCell<Vec<Event>>>;

#[derive(Clone)]
struct RecPin {
    gpio: u8,
    log: Log,
}

impl digital::ErrorType for RecPin {
    type Error = core::convert::Infallible;
}

impl digital::OutputPin for RecPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.log.borrow_mut().push(Event::Pin(self.gpio, false));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.log.borrow_mut().push(Event::Pin(self.gpio, true));
        Ok(())
    }
}

#[derive(Clone)]
struct RecPwm {
    channel: u8,
    max: u16,
    fail: bool,
    log: Log,
}

impl pwm::ErrorType for RecPwm {
    type Error = pwm::ErrorKind;
}

impl pwm::SetDutyCycle for RecPwm {
    fn max_duty_cycle(&self) -> u16 {
        self.max
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Self::Error> {
        if self.fail {
            return Err(pwm::ErrorKind::Other);
        }
        self.log.borrow_mut().push(Event::Duty(self.channel, duty));
        Ok(())
    }
}

fn recording_motors(log: &Log) -> MotorController<RecPin, RecPwm> {
    MotorController::from_table(&PinTable::DEFAULT, &PWM_TIMER, |_, _, pins| {
        (
            RecPin {
                gpio: pins.forward,
                log: log.clone(),
            },
            RecPin {
                gpio: pins.reverse,
                log: log.clone(),
            },
            RecPwm {
                channel: pins.pwm_channel,
                max: 255,
                fail: false,
                log: log.clone(),
            },
        )
    })
    .unwrap()
}

#[derive(Default)]
struct FakeMotors {
    calls: Vec<(usize, usize, Direction, i32)>,
    fail_on: Option<(usize, usize)>,
}

impl MotorActuator for FakeMotors {
    fn board_count(&self) -> usize {
        3
    }

    fn set_motor(
        &mut self,
        board: usize,
        motor: usize,
        direction: Direction,
        speed: i32,
    ) -> Result<(), ActuatorError> {
        self.calls.push((board, motor, direction, speed));
        if self.fail_on == Some((board, motor)) {
            return Err(ActuatorError::BusWriteFailure(BusFault::Pwm(
                pwm::ErrorKind::Other,
            )));
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeServos {
    calls: Vec<(u8, f32)>,
    fail_on: Option<u8>,
}

impl ServoActuator for FakeServos {
    fn set_servo_angle(
        &mut self,
        channel: u8,
        angle: f32,
    ) -> Result<(), ActuatorError> {
        self.calls.push((channel, angle));
        if self.fail_on == Some(channel) {
            return Err(ActuatorError::InvalidArgument);
        }
        Ok(())
    }
}

fn fake_rover() -> RoverController<FakeMotors, FakeServos> {
    RoverController::new(FakeMotors::default(), FakeServos::default())
}

// ------------------------------------------------------------------------------------------------
// Motor boards
// ------------------------------------------------------------------------------------------------

#[test]
fn test_direction_table_on_pins() {
    let mut fwd = PinMock::new(&[
        PinTrans::set(PinState::High),
        PinTrans::set(PinState::Low),
        PinTrans::set(PinState::High),
        PinTrans::set(PinState::Low),
    ]);
    let mut rev = PinMock::new(&[
        PinTrans::set(PinState::Low),
        PinTrans::set(PinState::High),
        PinTrans::set(PinState::High),
        PinTrans::set(PinState::Low),
    ]);
    let mut unused = PinMock::new(&[]);
    let log = Log::default();
    let pwm = RecPwm {
        channel: 0,
        max: 255,
        fail: false,
        log: log.clone(),
    };

    let mut board = MotorBoard::new(
        MotorChannel::new(fwd.clone(), rev.clone(), pwm.clone(), 0),
        MotorChannel::new(unused.clone(), unused.clone(), pwm, 1),
    );
    board.set_motor(0, Direction::Forward, 100).unwrap();
    board.set_motor(0, Direction::Reverse, 1000).unwrap();
    board.set_motor(0, Direction::Brake, 10).unwrap();
    board.set_motor(0, Direction::Stop, 77).unwrap();

    assert_eq!(
        *log.borrow(),
        vec![
            Event::Duty(0, 100),
            Event::Duty(0, 255),
            Event::Duty(0, 10),
            Event::Duty(0, 77)
        ]
    );
    fwd.done();
    rev.done();
    unused.done();
}

#[test]
fn test_invalid_motor_index_has_no_side_effect() {
    let mut pin = PinMock::new(&[]);
    let log = Log::default();
    let pwm = RecPwm {
        channel: 0,
        max: 255,
        fail: false,
        log: log.clone(),
    };
    let mut board = MotorBoard::new(
        MotorChannel::new(pin.clone(), pin.clone(), pwm.clone(), 0),
        MotorChannel::new(pin.clone(), pin.clone(), pwm, 1),
    );
    assert_eq!(
        board.set_motor(2, Direction::Forward, 100),
        Err(ActuatorError::InvalidArgument)
    );
    assert!(log.borrow().is_empty());
    pin.done();
}

#[test]
fn test_duty_failure_keeps_direction_pins() {
    let mut fwd = PinMock::new(&[PinTrans::set(PinState::High)]);
    let mut rev = PinMock::new(&[PinTrans::set(PinState::Low)]);
    let log = Log::default();
    let broken = RecPwm {
        channel: 0,
        max: 255,
        fail: true,
        log: log.clone(),
    };
    let mut board = MotorBoard::new(
        MotorChannel::new(fwd.clone(), rev.clone(), broken.clone(), 0),
        MotorChannel::new(fwd.clone(), rev.clone(), broken, 1),
    );
    assert_eq!(
        board.set_motor(0, Direction::Forward, 50),
        Err(ActuatorError::BusWriteFailure(BusFault::Pwm(
            pwm::ErrorKind::Other
        )))
    );
    fwd.done();
    rev.done();
}

#[test]
fn test_controller_init_stops_every_motor() {
    let log = Log::default();
    let motors = recording_motors(&log);
    assert_eq!(motors.board_count(), 3);

    let mut expected = Vec::new();
    for (_, _, pins) in PinTable::DEFAULT.motors() {
        expected.push(Event::Pin(pins.forward, false));
        expected.push(Event::Pin(pins.reverse, false));
        expected.push(Event::Duty(pins.pwm_channel, 0));
    }
    assert_eq!(*log.borrow(), expected);
}

#[test]
fn test_controller_init_rejects_wrong_resolution() {
    let log = Log::default();
    let ten_bit = PwmTimerConfig {
        frequency_hz: 5000,
        resolution_bits: 10,
    };
    let result = MotorController::from_table(&PinTable::DEFAULT, &ten_bit, |_, _, pins| {
        (
            RecPin {
                gpio: pins.forward,
                log: log.clone(),
            },
            RecPin {
                gpio: pins.reverse,
                log: log.clone(),
            },
            RecPwm {
                channel: pins.pwm_channel,
                max: 255,
                fail: false,
                log: log.clone(),
            },
        )
    });
    assert!(matches!(
        result,
        Err(InitError::DutyResolution {
            board: 0,
            motor: 0,
            expected: 1023,
            found: 255
        })
    ));
    assert!(log.borrow().is_empty());
}

#[test]
fn test_controller_init_reports_failed_stop() {
    let log = Log::default();
    let result = MotorController::from_table(&PinTable::DEFAULT, &PWM_TIMER, |board, motor, pins| {
        (
            RecPin {
                gpio: pins.forward,
                log: log.clone(),
            },
            RecPin {
                gpio: pins.reverse,
                log: log.clone(),
            },
            RecPwm {
                channel: pins.pwm_channel,
                max: 255,
                fail: (board, motor) == (1, 1),
                log: log.clone(),
            },
        )
    });
    assert!(matches!(
        result,
        Err(InitError::Motor {
            board: 1,
            motor: 1,
            fault: BusFault::Pwm(pwm::ErrorKind::Other)
        })
    ));

    // Earlier motors were stopped; the failing one got its pins but no duty.
    let mut expected = Vec::new();
    for (_, _, pins) in PinTable::DEFAULT.motors().take(3) {
        expected.push(Event::Pin(pins.forward, false));
        expected.push(Event::Pin(pins.reverse, false));
        expected.push(Event::Duty(pins.pwm_channel, 0));
    }
    let failing = PinTable::DEFAULT.boards[1].b;
    expected.push(Event::Pin(failing.forward, false));
    expected.push(Event::Pin(failing.reverse, false));
    assert_eq!(*log.borrow(), expected);
}

#[test]
fn test_controller_rejects_bad_table_before_hardware() {
    let log = Log::default();
    let mut table = PinTable::DEFAULT;
    table.boards[1].b.enable = table.boards[0].a.forward;
    let mut built = 0;
    let result = MotorController::from_table(&table, &PWM_TIMER, |_, _, pins| {
        built += 1;
        (
            RecPin {
                gpio: pins.forward,
                log: log.clone(),
            },
            RecPin {
                gpio: pins.reverse,
                log: log.clone(),
            },
            RecPwm {
                channel: pins.pwm_channel,
                max: 255,
                fail: false,
                log: log.clone(),
            },
        )
    });
    assert!(matches!(result, Err(InitError::DuplicatePin(4))));
    assert_eq!(built, 0);
}

#[test]
fn test_controller_invalid_board() {
    let log = Log::default();
    let mut motors = recording_motors(&log);
    log.borrow_mut().clear();
    assert_eq!(
        motors.set_motor(3, 0, Direction::Forward, 10),
        Err(ActuatorError::InvalidArgument)
    );
    assert!(log.borrow().is_empty());
}

#[test]
fn test_stop_and_brake_levels_on_every_board() {
    let log = Log::default();
    let mut motors = recording_motors(&log);

    for (board, motor, pins) in PinTable::DEFAULT.motors() {
        log.borrow_mut().clear();
        motors.set_motor(board, motor, Direction::Brake, 200).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                Event::Pin(pins.forward, true),
                Event::Pin(pins.reverse, true),
                Event::Duty(pins.pwm_channel, 200)
            ]
        );

        log.borrow_mut().clear();
        motors.set_motor(board, motor, Direction::Stop, 200).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                Event::Pin(pins.forward, false),
                Event::Pin(pins.reverse, false),
                Event::Duty(pins.pwm_channel, 200)
            ]
        );
    }
}

// ------------------------------------------------------------------------------------------------
// Dispatcher
// ------------------------------------------------------------------------------------------------

#[test]
fn test_dispatch_motor_forward() {
    let mut rover = fake_rover();
    rover.handle_frame(b"M,200").unwrap();

    let expected: Vec<_> = (0..3)
        .flat_map(|b| (0..2).map(move |m| (b, m, Direction::Forward, 200)))
        .collect();
    assert_eq!(rover.motors().calls, expected);
    assert!(rover.servos().calls.is_empty());
}

#[test]
fn test_dispatch_motor_reverse_clamped() {
    let mut rover = fake_rover();
    rover.handle_frame(b"M,-300").unwrap();

    assert_eq!(rover.motors().calls.len(), 6);
    assert!(rover
        .motors()
        .calls
        .iter()
        .all(|&(_, _, d, s)| d == Direction::Reverse && s == 255));
}

#[test]
fn test_dispatch_servo_angles_in_order() {
    let mut rover = fake_rover();
    rover.handle_frame(b"S,0,30,60,90,120,150").unwrap();

    assert_eq!(
        rover.servos().calls,
        vec![
            (0, 0.0),
            (1, 30.0),
            (2, 60.0),
            (3, 90.0),
            (4, 120.0),
            (5, 150.0)
        ]
    );
    assert!(rover.motors().calls.is_empty());
}

#[test]
fn test_dispatch_wrong_field_count_no_actuation() {
    let mut rover = fake_rover();
    assert_eq!(
        rover.handle_frame(b"S,1,2,3"),
        Err(DispatchError::Frame(FrameError::Malformed(
            ParseError::FieldCount {
                expected: 6,
                found: 3
            }
        )))
    );
    assert!(rover.servos().calls.is_empty());
    assert!(rover.motors().calls.is_empty());
}

#[test]
fn test_dispatch_unknown_command_no_actuation() {
    let mut rover = fake_rover();
    assert_eq!(
        rover.handle_frame(b"X,hello"),
        Err(DispatchError::Frame(FrameError::UnknownCommand))
    );
    assert!(rover.servos().calls.is_empty());
    assert!(rover.motors().calls.is_empty());
}

#[test]
fn test_dispatch_continues_after_actuator_failure() {
    let mut servos = FakeServos::default();
    servos.fail_on = Some(2);
    let mut motors = FakeMotors::default();
    motors.fail_on = Some((1, 0));
    let mut rover = RoverController::new(motors, servos);

    assert_eq!(
        rover.handle_frame(b"S,10,10,10,10,10,10"),
        Err(DispatchError::Actuator(ActuatorError::InvalidArgument))
    );
    assert_eq!(rover.servos().calls.len(), 6);

    assert_eq!(
        rover.handle_frame(b"M,-1"),
        Err(DispatchError::Actuator(ActuatorError::BusWriteFailure(
            BusFault::Pwm(pwm::ErrorKind::Other)
        )))
    );
    assert_eq!(rover.motors().calls.len(), 6);
}

#[test]
fn test_dispatch_is_idempotent_on_hardware() {
    let log = Log::default();
    let motors = recording_motors(&log);

    // S,0,30,60,90,120,150 -> 100, 166, 233, 300, 366, 433 counts
    let servo_frame = [
        I2cTrans::write(PWM_ADDRESS, vec![0x06, 0x00, 0x00, 0x64, 0x00]),
        I2cTrans::write(PWM_ADDRESS, vec![0x0A, 0x00, 0x00, 0xA6, 0x00]),
        I2cTrans::write(PWM_ADDRESS, vec![0x0E, 0x00, 0x00, 0xE9, 0x00]),
        I2cTrans::write(PWM_ADDRESS, vec![0x12, 0x00, 0x00, 0x2C, 0x01]),
        I2cTrans::write(PWM_ADDRESS, vec![0x16, 0x00, 0x00, 0x6E, 0x01]),
        I2cTrans::write(PWM_ADDRESS, vec![0x1A, 0x00, 0x00, 0xB1, 0x01]),
    ];
    let expectations: Vec<_> = servo_frame.iter().chain(servo_frame.iter()).cloned().collect();
    let i2c_bus = RefCell::new(I2cMock::new(&expectations));
    let servos = ServoController::new(&i2c_bus, PWM_ADDRESS);
    let mut rover = RoverController::new(motors, servos);

    rover.handle_frame(b"S,0,30,60,90,120,150").unwrap();
    rover.handle_frame(b"S,0,30,60,90,120,150").unwrap();

    log.borrow_mut().clear();
    rover.handle_frame(b"M,-128\n").unwrap();
    let first = log.borrow().clone();
    log.borrow_mut().clear();
    rover.handle_frame(b"M,-128\n").unwrap();
    assert_eq!(*log.borrow(), first);
    assert_eq!(first.len(), 18);

    i2c_bus.borrow_mut().done();
}

#[test]
fn test_serve_datagram_reports_outcome() {
    let mut rover = fake_rover();
    let peer = IpEndpoint::new(IpAddress::v4(192, 168, 4, 2), 50000);

    assert_eq!(serve_datagram(&mut rover, b"M,5\0", peer), Ok(()));
    assert_eq!(
        serve_datagram(&mut rover, b"", peer),
        Err(DispatchError::Frame(FrameError::Malformed(ParseError::Empty)))
    );
    assert_eq!(rover.motors().calls.len(), 6);

    assert!(matches!(
        rover.handle_frame(b"S,1,2,3,4,5,6"),
        Ok(RoverCommand::Servo(_))
    ));
}
