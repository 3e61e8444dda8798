//! One-byte latch device, used as a test fixture.

use sbc_core::Device;

/// Returns the last byte written to it; `0xff` before any write.
pub struct Dummy {
    last: u8,
}

impl Dummy {
    #[must_use]
    pub fn new() -> Self {
        Self { last: 0xff }
    }

    /// The latched byte, for test assertions.
    #[must_use]
    pub fn last(&self) -> u8 {
        self.last
    }
}

impl Default for Dummy {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for Dummy {
    fn read(&mut self, _offset: u8) -> u8 {
        self.last
    }

    fn write(&mut self, _offset: u8, value: u8) {
        self.last = value;
    }

    fn shutdown(&mut self) {}
}
