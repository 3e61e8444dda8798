//! Disassembler.
//!
//! A read-only pass over the bus, consulting the same metadata tables as
//! the executor so the two always agree on instruction lengths. The CPU
//! mode picks the Z80 or 8080 spelling; register values never matter.

use sbc_core::{Bus, BusFault};

use crate::cpu::{CpuMode, Z80};
use crate::opcodes::{Mode, BITS, CB, DD, ED, FD, PRIMARY, R8, ROT};

/// Components of one disassembled instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disassembly {
    pub mnemonic: String,
    pub dst: String,
    pub src: String,
    /// Raw opcode bytes as space-separated hex.
    pub bytes: String,
    /// Instruction length in bytes; matches the executor's PC advance.
    pub len: u16,
    /// False when the bytes decode to no defined instruction (length is
    /// then 1 for primary, 2 for prefixed encodings).
    pub valid: bool,
}

impl Disassembly {
    /// `dst,src` with the comma only when both are present.
    #[must_use]
    pub fn operands(&self) -> String {
        if !self.dst.is_empty() && !self.src.is_empty() {
            format!("{},{}", self.dst, self.src)
        } else if self.dst.is_empty() {
            self.src.clone()
        } else {
            self.dst.clone()
        }
    }

    /// `mnemonic operands`.
    #[must_use]
    pub fn line(&self) -> String {
        format!("{:<6}{:<4}", self.mnemonic, self.operands())
    }

    /// `bytes mnemonic operands`, for trace output.
    #[must_use]
    pub fn loud_line(&self) -> String {
        format!("{:<12}{:<6}{:<4}", self.bytes, self.mnemonic, self.operands())
    }
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Bytes an operand rendering consumes, for placing the second operand.
fn operand_width(mode: Mode) -> usize {
    match mode {
        Mode::Immediate | Mode::Indirect | Mode::Relative | Mode::Indexed => 1,
        Mode::ImmediateExtended | Mode::Extended => 2,
        _ => 0,
    }
}

impl Z80 {
    /// Disassemble the instruction at `address`.
    ///
    /// # Errors
    ///
    /// Fails only when an opcode or operand byte lies on an unreadable
    /// page.
    pub fn disassemble<B: Bus>(&self, bus: &B, address: u16) -> Result<Disassembly, BusFault> {
        let column = self.mode().column();
        let b0 = bus.peek(address)?;
        let mut bytes = vec![b0];
        let mut entry = &PRIMARY[usize::from(b0)];
        let mut operand_at = 1usize;

        if entry.prefix {
            let b1 = bus.peek(address.wrapping_add(1))?;
            bytes.push(b1);
            let table = match b0 {
                0xcb => &CB,
                0xdd => &DD,
                0xed => &ED,
                _ => &FD,
            };
            entry = &table[usize::from(b1)];
            operand_at = 2;

            if entry.prefix {
                // dd cb / fd cb: fully decoded from the 4th byte.
                return self.disassemble_index_cb(bus, address, b0);
            }
        }

        if !entry.defined() {
            return Ok(Disassembly {
                mnemonic: "INVALID".into(),
                dst: String::new(),
                src: String::new(),
                bytes: hex_bytes(&bytes),
                len: operand_at as u16,
                valid: false,
            });
        }

        for i in bytes.len()..usize::from(entry.bytes) {
            bytes.push(bus.peek(address.wrapping_add(i as u16))?);
        }

        let mode_8080 = self.mode() == CpuMode::I8080;
        let dst = render_operand(
            entry.dst,
            entry.dst_text[column],
            &bytes,
            operand_at,
            address,
            entry.bytes,
            mode_8080,
        );
        let src = render_operand(
            entry.src,
            entry.src_text[column],
            &bytes,
            operand_at + operand_width(entry.dst),
            address,
            entry.bytes,
            mode_8080,
        );

        Ok(Disassembly {
            mnemonic: entry.mnemonic[column].into(),
            dst,
            src,
            bytes: hex_bytes(&bytes),
            len: entry.bytes,
            valid: true,
        })
    }

    /// Disassemble at the current program counter.
    ///
    /// # Errors
    ///
    /// See [`Z80::disassemble`].
    pub fn disassemble_pc<B: Bus>(&self, bus: &B) -> Result<Disassembly, BusFault> {
        self.disassemble(bus, self.regs.pc)
    }

    fn disassemble_index_cb<B: Bus>(
        &self,
        bus: &B,
        address: u16,
        prefix: u8,
    ) -> Result<Disassembly, BusFault> {
        let d = bus.peek(address.wrapping_add(2))?;
        let sub = bus.peek(address.wrapping_add(3))?;
        let raw = [prefix, 0xcb, d, sub];

        let pair = if prefix == 0xdd { "ix" } else { "iy" };
        let indexed = format!("({pair}+${d:02x})");
        let y = usize::from((sub >> 3) & 7);
        let z = usize::from(sub & 7);

        // The undocumented register copy (z != 6) keeps the documented
        // spelling; rotates show the copy target as a second operand.
        let (mnemonic, dst, src) = match sub >> 6 {
            0 => {
                let copy = if z == 6 { String::new() } else { R8[z].into() };
                (ROT[y], indexed, copy)
            }
            1 => ("bit", BITS[y].into(), indexed),
            2 => ("res", BITS[y].into(), indexed),
            _ => ("set", BITS[y].into(), indexed),
        };

        Ok(Disassembly {
            mnemonic: mnemonic.into(),
            dst,
            src,
            bytes: hex_bytes(&raw),
            len: 4,
            valid: true,
        })
    }
}

#[allow(clippy::cast_possible_wrap)] // Displacement bytes are signed by definition.
fn render_operand(
    mode: Mode,
    text: &str,
    bytes: &[u8],
    at: usize,
    address: u16,
    len: u16,
    mode_8080: bool,
) -> String {
    let imm8 = || bytes.get(at).copied().unwrap_or(0);
    let imm16 = || {
        let lo = bytes.get(at).copied().unwrap_or(0);
        let hi = bytes.get(at + 1).copied().unwrap_or(0);
        u16::from(lo) | u16::from(hi) << 8
    };

    match mode {
        Mode::None => String::new(),
        Mode::Immediate => format!("${:02x}", imm8()),
        Mode::ImmediateExtended => format!("${:04x}", imm16()),
        Mode::Extended => format!("(${:04x})", imm16()),
        Mode::Indirect => format!("(${:02x})", imm8()),
        Mode::Relative => {
            let target = address
                .wrapping_add(len)
                .wrapping_add_signed(i16::from(imm8() as i8));
            format!("${target:04x}")
        }
        Mode::Indexed => format!("({text}+${:02x})", imm8()),
        Mode::RegisterIndirect => {
            if mode_8080 {
                text.into()
            } else {
                format!("({text})")
            }
        }
        Mode::Register | Mode::Implied | Mode::Bit | Mode::Condition => text.into(),
    }
}
