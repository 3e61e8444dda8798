//! System bus: a flat 64 KiB address space with per-page read/write
//! attributes at 1 KiB granularity, and a 256-port I/O space routed to
//! devices through a base-offset translation.

use std::fmt;
use std::io;
use std::sync::mpsc;

use sbc_core::{Access, Bus, BusFault, Device};

use crate::console::{Console, ConsoleInput};
use crate::dummy::Dummy;

/// Size of the memory address space.
pub const MEMORY_MAX: usize = 65536;

/// Page-attribute granularity.
pub const PAGE_SIZE: usize = 1024;

const PAGE_SHIFT: usize = 10;
const PAGE_COUNT: usize = MEMORY_MAX / PAGE_SIZE;
const IO_PORTS: usize = 256;

const FLAG_READ: u8 = 1 << 1;
const FLAG_WRITE: u8 = 1 << 2;

/// Kind of a declared device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Rom,
    Ram,
    Console,
    Dummy,
}

/// One device declaration, as produced by the launcher.
#[derive(Debug, Clone)]
pub struct DeviceDecl {
    pub name: String,
    pub start: u16,
    pub size: usize,
    pub kind: DeviceKind,
    pub image: Option<Vec<u8>>,
}

/// Construction-time validation failures. These never occur during
/// execution; a bus that constructs is a bus that runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Memory region size is not a multiple of the page size.
    UnalignedSize { name: String, size: usize },
    /// Region or port range extends past the address space.
    OutOfRange { name: String },
    /// Image larger than its declared region, or written past the end
    /// of memory.
    ImageTooLarge { name: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnalignedSize { name, size } => {
                write!(f, "{name}: size {size:#x} not a multiple of {PAGE_SIZE:#x}")
            }
            ConfigError::OutOfRange { name } => {
                write!(f, "{name}: region out of range")
            }
            ConfigError::ImageTooLarge { name } => {
                write!(f, "{name}: image does not fit")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Clone, Copy)]
struct IoSlot {
    device: usize,
    base: u8,
}

/// The system bus.
///
/// Overlapping memory regions are not rejected: the attribute vector is
/// last-writer-wins, matching how the launcher layers RAM under ROM.
pub struct SystemBus {
    memory: Box<[u8; MEMORY_MAX]>,
    page_flags: [u8; PAGE_COUNT],
    devices: Vec<Box<dyn Device>>,
    io: [Option<IoSlot>; IO_PORTS],
}

impl SystemBus {
    /// An empty bus: every page unmapped, every port floating.
    #[must_use]
    pub fn new() -> Self {
        Self {
            memory: vec![0u8; MEMORY_MAX].into_boxed_slice().try_into().unwrap(),
            page_flags: [0; PAGE_COUNT],
            devices: Vec::new(),
            io: [None; IO_PORTS],
        }
    }

    /// Build a bus from launcher declarations. Consoles write to stdout;
    /// their input handles are returned for the front-end to feed.
    ///
    /// # Errors
    ///
    /// Any declaration failing validation aborts construction.
    pub fn from_decls(
        decls: &[DeviceDecl],
        shutdown: &mpsc::Sender<String>,
    ) -> Result<(Self, Vec<ConsoleInput>), ConfigError> {
        let mut bus = Self::new();
        let mut inputs = Vec::new();

        for d in decls {
            if matches!(d.kind, DeviceKind::Console | DeviceKind::Dummy) && d.start > 0xff {
                return Err(ConfigError::OutOfRange {
                    name: d.name.clone(),
                });
            }
            match d.kind {
                DeviceKind::Rom => bus.add_rom(&d.name, d.start, d.size, d.image.as_deref())?,
                DeviceKind::Ram => bus.add_ram(&d.name, d.start, d.size, d.image.as_deref())?,
                DeviceKind::Console => {
                    let input = bus.attach_console(
                        &d.name,
                        d.start as u8,
                        shutdown.clone(),
                        Box::new(io::stdout()),
                    )?;
                    inputs.push(input);
                }
                DeviceKind::Dummy => {
                    bus.attach_device(&d.name, d.start as u8, 1, Box::new(Dummy::new()))?;
                }
            }
        }

        Ok((bus, inputs))
    }

    /// Map a read-only region, optionally filled from an image.
    ///
    /// # Errors
    ///
    /// See [`ConfigError`].
    pub fn add_rom(
        &mut self,
        name: &str,
        start: u16,
        size: usize,
        image: Option<&[u8]>,
    ) -> Result<(), ConfigError> {
        self.add_region(name, start, size, FLAG_READ, image)
    }

    /// Map a read-write region, optionally filled from an image.
    ///
    /// # Errors
    ///
    /// See [`ConfigError`].
    pub fn add_ram(
        &mut self,
        name: &str,
        start: u16,
        size: usize,
        image: Option<&[u8]>,
    ) -> Result<(), ConfigError> {
        self.add_region(name, start, size, FLAG_READ | FLAG_WRITE, image)
    }

    fn add_region(
        &mut self,
        name: &str,
        start: u16,
        size: usize,
        flags: u8,
        image: Option<&[u8]>,
    ) -> Result<(), ConfigError> {
        if size % PAGE_SIZE != 0 {
            return Err(ConfigError::UnalignedSize {
                name: name.into(),
                size,
            });
        }
        if usize::from(start) + size > MEMORY_MAX {
            return Err(ConfigError::OutOfRange { name: name.into() });
        }
        if let Some(image) = image {
            if image.len() > size {
                return Err(ConfigError::ImageTooLarge { name: name.into() });
            }
        }

        let first = usize::from(start) >> PAGE_SHIFT;
        for page in first..first + size / PAGE_SIZE {
            self.page_flags[page] = flags;
        }
        if let Some(image) = image {
            let start = usize::from(start);
            self.memory[start..start + image.len()].copy_from_slice(image);
        }
        Ok(())
    }

    /// Route `ports` consecutive ports starting at `base` to a device.
    ///
    /// # Errors
    ///
    /// Fails when the range runs past the I/O space.
    pub fn attach_device(
        &mut self,
        name: &str,
        base: u8,
        ports: usize,
        device: Box<dyn Device>,
    ) -> Result<(), ConfigError> {
        if usize::from(base) + ports > IO_PORTS {
            return Err(ConfigError::OutOfRange { name: name.into() });
        }
        let index = self.devices.len();
        self.devices.push(device);
        for offset in 0..ports {
            self.io[usize::from(base) + offset] = Some(IoSlot {
                device: index,
                base,
            });
        }
        Ok(())
    }

    /// Attach a serial console on two ports (data at `base`, status at
    /// `base + 1`), returning the input handle for the front-end thread.
    ///
    /// # Errors
    ///
    /// Fails when the port pair runs past the I/O space.
    pub fn attach_console(
        &mut self,
        name: &str,
        base: u8,
        shutdown: mpsc::Sender<String>,
        output: Box<dyn io::Write + Send>,
    ) -> Result<ConsoleInput, ConfigError> {
        let (console, input) = Console::new(shutdown, output);
        self.attach_device(name, base, 2, Box::new(console))?;
        Ok(input)
    }

    /// Bulk-copy an image into memory, bypassing page attributes. Used
    /// by the launcher after construction.
    ///
    /// # Errors
    ///
    /// Fails when the image would run off the end of memory.
    pub fn load(&mut self, addr: u16, bytes: &[u8]) -> Result<(), ConfigError> {
        let start = usize::from(addr);
        if start + bytes.len() > MEMORY_MAX {
            return Err(ConfigError::ImageTooLarge {
                name: format!("load @ {addr:#06x}"),
            });
        }
        self.memory[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Bulk-copy memory out for the disassembler and debugger, ignoring
    /// page attributes. Wraps at the top of the address space.
    #[must_use]
    pub fn dump(&self, addr: u16, count: u16) -> Vec<u8> {
        (0..count)
            .map(|i| self.memory[usize::from(addr.wrapping_add(i))])
            .collect()
    }

    /// Shut down every attached device. Safe to call more than once.
    pub fn shutdown(&mut self) {
        for device in &mut self.devices {
            device.shutdown();
        }
    }

    fn page_allows(&self, addr: u16, flag: u8) -> bool {
        self.page_flags[usize::from(addr) >> PAGE_SHIFT] & flag != 0
    }
}

impl Default for SystemBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for SystemBus {
    fn read(&mut self, addr: u16) -> Result<u8, BusFault> {
        self.peek(addr)
    }

    fn write(&mut self, addr: u16, value: u8) -> Result<(), BusFault> {
        if !self.page_allows(addr, FLAG_WRITE) {
            return Err(BusFault {
                addr,
                access: Access::Write,
            });
        }
        self.memory[usize::from(addr)] = value;
        Ok(())
    }

    fn peek(&self, addr: u16) -> Result<u8, BusFault> {
        if !self.page_allows(addr, FLAG_READ) {
            return Err(BusFault {
                addr,
                access: Access::Read,
            });
        }
        Ok(self.memory[usize::from(addr)])
    }

    fn io_read(&mut self, port: u8) -> u8 {
        match self.io[usize::from(port)] {
            Some(slot) => self.devices[slot.device].read(port - slot.base),
            None => 0xff, // floating bus
        }
    }

    fn io_write(&mut self, port: u8, value: u8) {
        if let Some(slot) = self.io[usize::from(port)] {
            self.devices[slot.device].write(port - slot.base, value);
        }
    }
}
