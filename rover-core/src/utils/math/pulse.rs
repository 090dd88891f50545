//! Conversions from logical actuator commands to register values.
//!
//! Motor speeds map onto the 8-bit LEDC duty used by the L298N enable pins,
//! servo angles map onto PCA9685 OFF counts, and the PCA9685 prescaler is
//! derived from its reference oscillator.
//!
//! # Example
//! ```rust
//! use rover_core::utils::math::pulse::{angle_to_pulse, speed_to_duty, SERVO_MAX, SERVO_MIN};
//! assert_eq!(speed_to_duty(300), 255);
//! assert_eq!(angle_to_pulse(0.0), SERVO_MIN);
//! assert_eq!(angle_to_pulse(180.0), SERVO_MAX);
//! ```
use core::f32::consts::PI;
use libm;

/// Full-scale duty for an 8-bit PWM channel.
pub const MAX_DUTY: u8 = u8::MAX;

/// OFF count for 0°, found experimentally on the steering servos.
pub const SERVO_MIN: u16 = 100;
/// OFF count for 180°.
pub const SERVO_MAX: u16 = 500;
/// Upper edge of the logical servo domain (degrees).
pub const SERVO_MAX_ANGLE: f32 = 180.0;

/// PCA9685 internal oscillator (Hz).
pub const PCA9685_OSC_HZ: u32 = 25_000_000;
/// Counter steps per PWM period on the PCA9685.
pub const PCA9685_STEPS: u32 = 4096;
/// Smallest prescale value the PCA9685 accepts.
pub const PRESCALE_MIN: u8 = 3;

/// Period of the bench sweep waveform (ms).
pub const SWEEP_PERIOD_MS: u64 = 5000;
/// Phase offset between neighbouring channels in the sweep (degrees).
pub const SWEEP_PHASE_DEG: f32 = 30.0;

/// Clamp a speed to `[0, 255]` and return it as an 8-bit duty value.
pub fn speed_to_duty(speed: i32) -> u8 {
    speed.clamp(0, MAX_DUTY as i32) as u8
}

/// Map an angle in degrees onto the calibrated `[SERVO_MIN, SERVO_MAX]` OFF count.
///
/// The angle is clamped to `[0, 180]` first, so the result never leaves the
/// calibrated window. `NaN` is treated as 0°.
pub fn angle_to_pulse(angle: f32) -> u16 {
    let angle = if angle.is_nan() {
        0.0
    } else {
        angle.clamp(0.0, SERVO_MAX_ANGLE)
    };
    let span = (SERVO_MAX - SERVO_MIN) as f32;
    (SERVO_MIN as f32 + (angle / SERVO_MAX_ANGLE) * span) as u16
}

/// Compute the PCA9685 prescale register value for a target PWM frequency.
///
/// `round(reference_hz / (4096 * target_hz) - 1)`, saturated to `[3, 255]`.
pub fn prescale_for(
    reference_hz: u32,
    target_hz: u32,
) -> u8 {
    if target_hz == 0 {
        return u8::MAX;
    }
    let raw = libm::roundf(
        reference_hz as f32 / (PCA9685_STEPS as f32 * target_hz as f32) - 1.0,
    );
    raw.clamp(PRESCALE_MIN as f32, u8::MAX as f32) as u8
}

/// Angle of `channel` in the bench sweep after `elapsed_ms`.
///
/// A sine across the full servo range, each channel lagging the previous one
/// by [`SWEEP_PHASE_DEG`].
pub fn sweep_angle(
    elapsed_ms: u64,
    channel: u8,
) -> f32 {
    let amplitude = SERVO_MAX_ANGLE / 2.0;
    let midpoint = SERVO_MAX_ANGLE / 2.0;
    let omega = 2.0 * PI / (SWEEP_PERIOD_MS as f32 / 1000.0);
    let t = (elapsed_ms % SWEEP_PERIOD_MS) as f32 / 1000.0;
    let phase = channel as f32 * SWEEP_PHASE_DEG * (PI / 180.0);
    midpoint + amplitude * libm::sinf(omega * t + phase)
}
