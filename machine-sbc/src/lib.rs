//! A minimal Z80 single-board computer: paged memory bus, a serial
//! console and a dummy latch device.

mod bus;
mod console;
mod dummy;

pub use bus::{ConfigError, DeviceDecl, DeviceKind, SystemBus, MEMORY_MAX, PAGE_SIZE};
pub use console::{Console, ConsoleInput};
pub use dummy::Dummy;
