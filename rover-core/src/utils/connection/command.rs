//! Text command frames.
//!
//! One UDP datagram carries one ASCII command:
//!
//! - `S,<a0>,<a1>,<a2>,<a3>,<a4>,<a5>`: servo angles in degrees, channels 0..5
//! - `M,<speed>`: signed speed in `[-255, 255]`, applied to every motor
//!
//! A frame is parsed completely before anything is actuated.

use core::{fmt, str::Split};

use crate::utils::controllers::motor::MotorCommand;

/// Longest accepted frame (bytes, excluding the terminator).
pub const MAX_FRAME_LEN: usize = 127;
/// Angles carried by an `S` frame.
pub const SERVO_COUNT: usize = 6;

/// Six servo angles, applied in channel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoAngleSet {
    pub angles: [i32; SERVO_COUNT],
}

/// A parsed command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoverCommand {
    Servo(ServoAngleSet),
    Motor(MotorCommand),
}

/// Why a frame was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    FrameTooLong(usize),
    NotUtf8,
    FieldCount { expected: usize, found: usize },
    /// Field `field` (1-based, after the command token) is not an integer.
    InvalidNumber { field: usize },
}

impl fmt::Display for ParseError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ParseError::Empty => f.write_str("empty frame"),
            ParseError::FrameTooLong(len) => {
                write!(f, "frame of {len} bytes exceeds {MAX_FRAME_LEN}")
            }
            ParseError::NotUtf8 => f.write_str("frame is not valid text"),
            ParseError::FieldCount { expected, found } => {
                write!(f, "expected {expected} fields, found {found}")
            }
            ParseError::InvalidNumber { field } => write!(f, "field {field} is not an integer"),
        }
    }
}

/// Result of [`parse_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    Malformed(ParseError),
    /// The leading token names no known command.
    UnknownCommand,
}

impl From<ParseError> for FrameError {
    fn from(e: ParseError) -> Self {
        FrameError::Malformed(e)
    }
}

impl fmt::Display for FrameError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            FrameError::Malformed(e) => write!(f, "parse error: {e}"),
            FrameError::UnknownCommand => f.write_str("unknown command"),
        }
    }
}

/// Strip the NUL terminator and surrounding whitespace from a raw datagram.
pub fn frame_text(raw: &[u8]) -> Result<&str, ParseError> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let raw = &raw[..end];
    if raw.len() > MAX_FRAME_LEN {
        return Err(ParseError::FrameTooLong(raw.len()));
    }
    let text = core::str::from_utf8(raw)
        .map_err(|_| ParseError::NotUtf8)?
        .trim();
    if text.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(text)
}

/// Parse a decimal integer, saturating at the `i32` bounds.
///
/// Values past the range still carry their sign, so an oversized speed
/// clamps to full scale instead of being rejected.
fn parse_saturating(field: &str) -> Option<i32> {
    let field = field.trim();
    let (negative, digits) = match field.as_bytes().first() {
        Some(b'-') => (true, &field[1..]),
        Some(b'+') => (false, &field[1..]),
        _ => (false, field),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let magnitude = digits.bytes().fold(0i64, |acc, b| {
        acc.saturating_mul(10).saturating_add(i64::from(b - b'0'))
    });
    let value = if negative { -magnitude } else { magnitude };
    Some(value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
}

/// Parse exactly `N` comma-separated integers.
fn parse_fields<const N: usize>(fields: Split<'_, char>) -> Result<[i32; N], ParseError> {
    let mut out = [0i32; N];
    let mut found = 0;
    for field in fields {
        if found < N {
            out[found] = parse_saturating(field)
                .ok_or(ParseError::InvalidNumber { field: found + 1 })?;
        }
        found += 1;
    }
    if found != N {
        return Err(ParseError::FieldCount { expected: N, found });
    }
    Ok(out)
}

/// Parse one datagram into a [`RoverCommand`].
pub fn parse_frame(raw: &[u8]) -> Result<RoverCommand, FrameError> {
    let text = frame_text(raw)?;
    let mut fields = text.split(',');
    let token = fields.next().unwrap_or_default().trim();

    match token {
        "S" => {
            let angles = parse_fields::<SERVO_COUNT>(fields)?;
            Ok(RoverCommand::Servo(ServoAngleSet { angles }))
        }
        "M" => {
            let [speed] = parse_fields::<1>(fields)?;
            Ok(RoverCommand::Motor(MotorCommand::from_signed(speed)))
        }
        _ => Err(FrameError::UnknownCommand),
    }
}
