/// A byte-addressed I/O device.
///
/// Devices see port numbers relative to their base: a console mapped at
/// ports 2–3 receives offsets 0 (data) and 1 (status).
pub trait Device {
    /// Read a byte from the device register at `offset`.
    fn read(&mut self, offset: u8) -> u8;

    /// Write a byte to the device register at `offset`.
    fn write(&mut self, offset: u8, value: u8);

    /// Release any external resources. Must be idempotent; the bus calls
    /// this for every device on shutdown regardless of who initiated it.
    fn shutdown(&mut self);
}
