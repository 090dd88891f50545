//! Math utilities for the Mini-Rover.
//!
//! This module provides the pure duty, pulse and prescaler conversions used by
//! the motor and servo actuators.

pub mod pulse;
