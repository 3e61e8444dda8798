//! i8251-style USART serial console.
//!
//! Two registers: data at offset 0, status at offset 1. Out of cold
//! boot the device waits for a mode byte on the status port (baud,
//! parity and framing, captured but not interpreted); every later
//! status write is a command byte. Received bytes arrive asynchronously from a
//! terminal front-end through a single-slot ring buffer, which is all
//! the depth needed because the emulated software polls RXRDY before
//! touching the data port.

use std::io::Write;
use std::sync::mpsc;

use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};
use sbc_core::Device;

// Status register bits.
const STATUS_TXRDY: u8 = 0x01;
const STATUS_RXRDY: u8 = 0x02;

// Command register bits.
const CMD_TXEN: u8 = 0x01;
const CMD_RXEN: u8 = 0x04;
const CMD_ERROR_RESET: u8 = 0x10;

/// The console device, owned by the bus.
pub struct Console {
    /// Mode byte received on the first status write after reset.
    mode: u8,
    cold: bool,
    error_flag: bool,
    tx_enable: bool,
    rx_enable: bool,

    input: HeapCons<u8>,
    /// Byte popped from the ring on a status read, awaiting a data read.
    pending: Option<u8>,

    output: Box<dyn Write + Send>,
    been_shutdown: bool,
}

/// Producer half handed to the terminal front-end thread.
pub struct ConsoleInput {
    producer: HeapProd<u8>,
    shutdown: mpsc::Sender<String>,
}

impl ConsoleInput {
    /// Hand one received byte to the CPU's read path. Returns false if
    /// the previous byte has not been consumed yet.
    pub fn push(&mut self, byte: u8) -> bool {
        self.producer.try_push(byte).is_ok()
    }

    /// Request machine termination (front-end closed, read error).
    pub fn request_shutdown(&self, reason: &str) {
        let _ = self.shutdown.send(reason.to_string());
    }
}

impl Console {
    /// Create a console writing transmitted bytes to `output`. The
    /// returned [`ConsoleInput`] feeds received bytes in.
    pub fn new(
        shutdown: mpsc::Sender<String>,
        output: Box<dyn Write + Send>,
    ) -> (Console, ConsoleInput) {
        let (producer, consumer) = HeapRb::<u8>::new(1).split();
        let console = Console {
            mode: 0,
            cold: true,
            error_flag: true,
            tx_enable: false,
            rx_enable: false,
            input: consumer,
            pending: None,
            output,
            been_shutdown: false,
        };
        let input = ConsoleInput {
            producer,
            shutdown,
        };
        (console, input)
    }

    /// The captured mode byte (zero until configured).
    #[must_use]
    pub fn mode(&self) -> u8 {
        self.mode
    }

    fn gated(&self) -> bool {
        self.cold || self.error_flag || !self.rx_enable
    }
}

impl Device for Console {
    fn read(&mut self, offset: u8) -> u8 {
        if self.gated() {
            return 0xff;
        }

        match offset {
            0 => self.pending.take().unwrap_or(0xff),
            1 => {
                if self.pending.is_none() {
                    self.pending = self.input.try_pop();
                }
                if self.pending.is_some() {
                    STATUS_TXRDY | STATUS_RXRDY
                } else {
                    STATUS_TXRDY
                }
            }
            _ => 0xff,
        }
    }

    fn write(&mut self, offset: u8, value: u8) {
        match offset {
            0 => {
                if self.cold || self.error_flag || !self.tx_enable {
                    return;
                }
                let _ = self.output.write_all(&[value]);
                let _ = self.output.flush();
            }
            1 => {
                if self.cold {
                    self.mode = value;
                    self.cold = false;
                    return;
                }
                self.tx_enable = value & CMD_TXEN != 0;
                self.rx_enable = value & CMD_RXEN != 0;
                if value & CMD_ERROR_RESET != 0 {
                    self.error_flag = false;
                }
            }
            _ => {}
        }
    }

    fn shutdown(&mut self) {
        if self.been_shutdown {
            return;
        }
        self.been_shutdown = true;
        let _ = self.output.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn console() -> (Console, ConsoleInput, SharedSink) {
        let sink = SharedSink::default();
        let (tx, _rx) = mpsc::channel();
        let (console, input) = Console::new(tx, Box::new(sink.clone()));
        (console, input, sink)
    }

    /// Mode byte, then command enabling both directions and clearing
    /// the error latch.
    fn boot(console: &mut Console) {
        console.write(1, 0x4e);
        console.write(1, CMD_TXEN | CMD_RXEN | CMD_ERROR_RESET);
    }

    #[test]
    fn cold_boot_takes_mode_byte() {
        let (mut console, _input, _sink) = console();
        assert_eq!(console.read(1), 0xff, "gated while cold");

        console.write(1, 0x4e);
        assert_eq!(console.mode(), 0x4e);

        // Still gated: error latch set, rx disabled.
        assert_eq!(console.read(1), 0xff);

        console.write(1, CMD_TXEN | CMD_RXEN | CMD_ERROR_RESET);
        assert_eq!(console.read(1), STATUS_TXRDY);
    }

    #[test]
    fn transmit_when_enabled() {
        let (mut console, _input, sink) = console();
        console.write(0, b'x'); // cold: dropped
        boot(&mut console);
        console.write(0, b'A');
        console.write(0, b'B');
        assert_eq!(*sink.0.lock().unwrap(), b"AB");
    }

    #[test]
    fn receive_status_then_data() {
        let (mut console, mut input, _sink) = console();
        boot(&mut console);

        assert_eq!(console.read(1), STATUS_TXRDY);
        assert!(input.push(0x42));
        assert!(!input.push(0x43), "single byte of depth");

        assert_eq!(console.read(1), STATUS_TXRDY | STATUS_RXRDY);
        assert_eq!(console.read(0), 0x42);
        assert_eq!(console.read(0), 0xff, "drained");
        assert_eq!(console.read(1), STATUS_TXRDY);
    }

    #[test]
    fn input_survives_status_poll() {
        let (mut console, mut input, _sink) = console();
        boot(&mut console);
        input.push(0x55);
        // Several polls before the data read must not lose the byte.
        console.read(1);
        console.read(1);
        assert_eq!(console.read(0), 0x55);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (mut console, input, _sink) = console();
        console.shutdown();
        console.shutdown();
        input.request_shutdown("front-end closed");
    }
}
