//! Register-level transport over the shared I2C bus.
//!
//! Every transaction goes through a `RefCellDevice`, which borrows the bus for
//! exactly one transaction, so only one transaction is outstanding at a time.

use core::cell::RefCell;

use embedded_hal::i2c::I2c;
use embedded_hal_bus::i2c::RefCellDevice;

use super::error::BusFault;

/// Number of data bytes in one block write (one PWM channel's ON/OFF registers).
pub const BLOCK_LEN: usize = 4;

/// Fixed-address register reader/writer for a single device on a shared bus.
pub struct RegisterBus<'a, I2C: 'static> {
    dev: RefCellDevice<'a, I2C>,
    address: u8,
}

impl<'a, I2C> RegisterBus<'a, I2C>
where
    I2C: I2c + 'static,
{
    pub fn new(
        i2c_bus: &'a RefCell<I2C>,
        address: u8,
    ) -> Self {
        RegisterBus {
            dev: RefCellDevice::new(i2c_bus),
            address,
        }
    }

    /// 7-bit device address.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Write one register: `[reg, value]`.
    pub fn write_register(
        &mut self,
        reg: u8,
        value: u8,
    ) -> Result<(), BusFault> {
        self.dev
            .write(self.address, &[reg, value])
            .map_err(BusFault::i2c)
    }

    /// Write [`BLOCK_LEN`] consecutive registers starting at `start` in a single
    /// transaction. Requires auto-increment to be enabled on the device.
    pub fn write_block(
        &mut self,
        start: u8,
        values: &[u8; BLOCK_LEN],
    ) -> Result<(), BusFault> {
        let mut frame = [0u8; BLOCK_LEN + 1];
        frame[0] = start;
        frame[1..].copy_from_slice(values);
        self.dev.write(self.address, &frame).map_err(BusFault::i2c)
    }

    /// Read one register with a repeated-start write/read.
    pub fn read_register(
        &mut self,
        reg: u8,
    ) -> Result<u8, BusFault> {
        let mut value = [0u8; 1];
        self.dev
            .write_read(self.address, &[reg], &mut value)
            .map_err(BusFault::i2c)?;
        Ok(value[0])
    }

    /// Read-modify-write: clear `clear` bits, then set `set` bits.
    ///
    /// The write is skipped when the register already holds the result.
    /// Returns whether a write was issued.
    pub fn update_register(
        &mut self,
        reg: u8,
        clear: u8,
        set: u8,
    ) -> Result<bool, BusFault> {
        let current = self.read_register(reg)?;
        let next = (current & !clear) | set;
        if next == current {
            return Ok(false);
        }
        self.write_register(reg, next)?;
        Ok(true)
    }
}
