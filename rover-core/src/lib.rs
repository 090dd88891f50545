//! Actuation core for the Mini-Rover on no-std embedded platforms.
//!
//! Text commands arrive over UDP and drive three L298N motor boards and a
//! PCA9685 servo driver. For a host run against simulated peripherals, see
//! `rover-app/mock-mcu`.
#![no_std]

pub mod utils;
