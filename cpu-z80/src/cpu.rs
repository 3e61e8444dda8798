//! CPU state, the structured step conditions, and debugger hooks.

use std::collections::HashMap;
use std::fmt;

use sbc_core::{Bus, BusFault};

use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
use crate::registers::Registers;

/// Which instruction-set spelling the disassembler uses.
///
/// Execution semantics are identical in both modes; emulated 8080 software
/// is a subset of the Z80 ISA by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuMode {
    Z80,
    I8080,
}

impl CpuMode {
    /// Column index into the dual-spelling metadata fields.
    pub(crate) const fn column(self) -> usize {
        match self {
            CpuMode::Z80 => 0,
            CpuMode::I8080 => 1,
        }
    }
}

/// Optional per-breakpoint callback, invoked at the driver's discretion
/// after [`Condition::Breakpoint`] is reported.
///
/// Hooks receive a copy of the register file and the bus so they can
/// inspect machine state; they are never called from inside `step`.
pub type BreakpointHook = Box<dyn FnMut(Registers, &mut dyn Bus) -> Result<(), String>>;

/// Conditions surfaced by [`Z80::step`], in decreasing severity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// A memory access hit an unmapped or write-protected page.
    BadAccess { pc: u16, fault: BusFault },
    /// An undefined opcode was fetched. `bytes` holds the opcode bytes
    /// (one for primary, two for prefixed encodings).
    InvalidInstruction { pc: u16, bytes: Vec<u8> },
    /// A `halt` instruction executed; PC still points at it.
    Halt { pc: u16 },
    /// The post-step PC matched a breakpoint.
    Breakpoint { pc: u16 },
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::BadAccess { pc, fault } => {
                write!(f, "{fault} @ ${pc:04x}")
            }
            Condition::InvalidInstruction { pc, bytes } => {
                write!(f, "invalid instruction:")?;
                for b in bytes {
                    write!(f, " ${b:02x}")?;
                }
                write!(f, " @ ${pc:04x}")
            }
            Condition::Halt { pc } => write!(f, "halt: ${pc:04x}"),
            Condition::Breakpoint { pc } => write!(f, "breakpoint: ${pc:04x}"),
        }
    }
}

impl std::error::Error for Condition {}

/// A Z80/8080 CPU.
///
/// The CPU does not own the bus; callers pass it into each `step`. All
/// registers are zero on construction (cold reset: `PC = 0`, interrupts
/// disabled).
pub struct Z80 {
    /// Register file, public for drivers and test harnesses.
    pub regs: Registers,
    mode: CpuMode,
    total_cycles: u64,
    debug: bool,
    breakpoints: HashMap<u16, Option<BreakpointHook>>,
}

impl Z80 {
    /// Create a cold-reset CPU.
    #[must_use]
    pub fn new(mode: CpuMode) -> Self {
        Self {
            regs: Registers::default(),
            mode,
            total_cycles: 0,
            debug: false,
            breakpoints: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn mode(&self) -> CpuMode {
        self.mode
    }

    /// Total cycles consumed since construction or the last reset.
    #[must_use]
    pub const fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    #[must_use]
    pub const fn pc(&self) -> u16 {
        self.regs.pc
    }

    pub fn set_pc(&mut self, address: u16) {
        self.regs.pc = address;
    }

    /// Cold reset: registers zeroed, interrupts disabled, cycle counter
    /// cleared. Memory belongs to the bus and is left alone.
    pub fn reset(&mut self) {
        self.regs = Registers::default();
        self.total_cycles = 0;
    }

    pub(crate) fn add_cycles(&mut self, cycles: u32) {
        self.total_cycles += u64::from(cycles);
    }

    /// Execute the instruction at PC, then report a breakpoint if the new
    /// PC matches one.
    ///
    /// # Errors
    ///
    /// Returns a [`Condition`] for halt, breakpoint, undefined opcodes and
    /// faulting memory accesses. Halt and breakpoint are resumable;
    /// whether the others are fatal is driver policy.
    pub fn step<B: Bus>(&mut self, bus: &mut B) -> Result<(), Condition> {
        self.execute(bus)?;

        if self.debug && self.breakpoints.contains_key(&self.regs.pc) {
            return Err(Condition::Breakpoint { pc: self.regs.pc });
        }

        Ok(())
    }

    /// Insert a breakpoint, with an optional callback for the driver to
    /// run when it fires. Enables debug mode.
    pub fn set_breakpoint(&mut self, address: u16, hook: Option<BreakpointHook>) {
        self.breakpoints.insert(address, hook);
        self.debug = true;
    }

    /// Remove a breakpoint. Debug mode switches off with the last one.
    pub fn delete_breakpoint(&mut self, address: u16) {
        self.breakpoints.remove(&address);
        if self.breakpoints.is_empty() {
            self.debug = false;
        }
    }

    /// Addresses of all current breakpoints.
    #[must_use]
    pub fn breakpoints(&self) -> Vec<u16> {
        self.breakpoints.keys().copied().collect()
    }

    /// Borrow the callback registered at `address`, if any.
    pub fn breakpoint_hook(&mut self, address: u16) -> Option<&mut BreakpointHook> {
        self.breakpoints.get_mut(&address).and_then(Option::as_mut)
    }

    /// Render all registers plus a flag string on one line, for traces
    /// and the debugger's `registers` command.
    #[must_use]
    pub fn dump_registers(&self) -> String {
        let f = self.regs.f();
        let mut flags = String::with_capacity(8);
        flags.push(if f & SF != 0 { 'S' } else { '-' });
        flags.push(if f & ZF != 0 { 'Z' } else { '-' });
        flags.push(if f & YF != 0 { '1' } else { '0' });
        flags.push(if f & HF != 0 { 'H' } else { '-' });
        flags.push(if f & XF != 0 { '1' } else { '0' });
        flags.push(if f & PF != 0 { 'P' } else { '-' });
        flags.push(if f & NF != 0 { 'N' } else { '-' });
        flags.push(if f & CF != 0 { 'C' } else { '-' });

        format!(
            "af ${:04x} bc ${:04x} de ${:04x} hl ${:04x} ix ${:04x} iy ${:04x} \
             pc ${:04x} sp ${:04x} f {}",
            self.regs.af,
            self.regs.bc,
            self.regs.de,
            self.regs.hl,
            self.regs.ix,
            self.regs.iy,
            self.regs.pc,
            self.regs.sp,
            flags
        )
    }
}

// Instruction execution split into a separate file for readability.
mod execute;
