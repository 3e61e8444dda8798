//! Core traits for the single-board computer emulator.
//!
//! The CPU talks to the machine only through the [`Bus`] trait; the bus
//! routes I/O ports to [`Device`] implementations. Keeping the traits in
//! their own crate lets tests substitute minimal buses without pulling in
//! the full machine.

mod bus;
mod device;

pub use bus::{Access, Bus, BusFault};
pub use device::Device;
