//! Utility re-exports and helper macros for the Mini-Rover.
//!
//! This module re-exports the actuation components, timing, and the command
//! listener:
//!
//! - `connection`: UDP command frames and the listener loop
//! - `controllers`: motor boards, servo driver and the command dispatcher
//! - `math`: duty, pulse and prescaler conversions
//!
//! The `mk_static!` macro simplifies static initialization in no-std contexts.

pub mod connection;
pub mod controllers;
pub mod math;

pub use connection::listener::run as udp;
pub use controllers::RoverController;
pub use embassy_time::*;

#[doc(hidden)]
pub use static_cell as __static_cell;

#[macro_export]
/// Initialize a no-std static cell and write the given value into it.
///
/// This macro creates a `static_cell::StaticCell` for type `$t` and initializes
/// it with `$val`, returning a mutable reference to the stored value.
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: $crate::utils::__static_cell::StaticCell<$t> =
            $crate::utils::__static_cell::StaticCell::new();
        STATIC_CELL.uninit().write($val)
    }};
}
