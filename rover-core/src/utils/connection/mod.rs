//! Module Exports
//!
//! This file exports the command channel of the rover.
//!
//! # Modules
//! - `command`: text frame format and parsing.
//! - `listener`: UDP socket loop that feeds frames to the dispatcher.

pub mod command;
pub mod listener;
