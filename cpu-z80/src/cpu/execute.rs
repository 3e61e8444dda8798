//! Instruction execution.
//!
//! One `execute` call runs exactly one instruction. The default epilogue
//! advances PC by the table length and charges the table cycle cost;
//! paths with their own timing (taken branches, halt, repeating block
//! ops) account for PC and cycles themselves and return early.

#![allow(clippy::cast_possible_truncation)] // Intentional truncation for low byte extraction.
#![allow(clippy::cast_possible_wrap)] // Displacement bytes are signed by definition.

use sbc_core::Bus;

use crate::cpu::{Condition, Z80};
use crate::flags::{flag_if, CF, HALFCARRY_SUB, HF, NF, PF, SF, XF, YF, ZF};
use crate::opcodes::{Opcode, CB, DD, ED, FD, PRIMARY};

// Taken-path cycle costs for the conditional transfers; the tables carry
// the not-taken cost.
const JR_TAKEN: u32 = 12;
const DJNZ_TAKEN: u32 = 13;
const RET_TAKEN: u32 = 11;
const CALL_TAKEN: u32 = 17;

/// One repeat iteration of ldir/lddr/cpir/cpdr.
const BLOCK_REPEAT: u32 = 21;

// The doubly prefixed DD CB / FD CB space is decoded directly and not
// table-driven, so its costs live here.
const DDCB_BYTES: u16 = 4;
const DDCB_BIT: u32 = 20;
const DDCB_RW: u32 = 23;

/// Which index register a `DD`/`FD` prefix selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexReg {
    Ix,
    Iy,
}

impl Z80 {
    fn mem_read<B: Bus>(&self, bus: &mut B, addr: u16) -> Result<u8, Condition> {
        bus.read(addr).map_err(|fault| Condition::BadAccess {
            pc: self.regs.pc,
            fault,
        })
    }

    fn mem_write<B: Bus>(&self, bus: &mut B, addr: u16, value: u8) -> Result<(), Condition> {
        bus.write(addr, value).map_err(|fault| Condition::BadAccess {
            pc: self.regs.pc,
            fault,
        })
    }

    fn mem_read16<B: Bus>(&self, bus: &mut B, addr: u16) -> Result<u16, Condition> {
        let lo = self.mem_read(bus, addr)?;
        let hi = self.mem_read(bus, addr.wrapping_add(1))?;
        Ok(u16::from(lo) | u16::from(hi) << 8)
    }

    /// 16-bit store, low byte first per the reference ordering.
    fn mem_write16<B: Bus>(&self, bus: &mut B, addr: u16, value: u16) -> Result<(), Condition> {
        self.mem_write(bus, addr, value as u8)?;
        self.mem_write(bus, addr.wrapping_add(1), (value >> 8) as u8)
    }

    /// Push: high byte to SP-1, low byte to SP-2.
    fn push16<B: Bus>(&mut self, bus: &mut B, value: u16) -> Result<(), Condition> {
        self.mem_write(bus, self.regs.sp.wrapping_sub(1), (value >> 8) as u8)?;
        self.mem_write(bus, self.regs.sp.wrapping_sub(2), value as u8)?;
        self.regs.sp = self.regs.sp.wrapping_sub(2);
        Ok(())
    }

    fn pop16<B: Bus>(&mut self, bus: &mut B) -> Result<u16, Condition> {
        let value = self.mem_read16(bus, self.regs.sp)?;
        self.regs.sp = self.regs.sp.wrapping_add(2);
        Ok(value)
    }

    /// Register by 3-bit field; 6 reads `(hl)`.
    fn read_r<B: Bus>(&mut self, bus: &mut B, r: u8) -> Result<u8, Condition> {
        Ok(match r & 7 {
            0 => self.regs.b(),
            1 => self.regs.c(),
            2 => self.regs.d(),
            3 => self.regs.e(),
            4 => self.regs.h(),
            5 => self.regs.l(),
            6 => self.mem_read(bus, self.regs.hl)?,
            _ => self.regs.a(),
        })
    }

    fn write_r<B: Bus>(&mut self, bus: &mut B, r: u8, value: u8) -> Result<(), Condition> {
        match r & 7 {
            0 => self.regs.set_b(value),
            1 => self.regs.set_c(value),
            2 => self.regs.set_d(value),
            3 => self.regs.set_e(value),
            4 => self.regs.set_h(value),
            5 => self.regs.set_l(value),
            6 => self.mem_write(bus, self.regs.hl, value)?,
            _ => self.regs.set_a(value),
        }
        Ok(())
    }

    /// Plain register by field, no `(hl)` slot. Used where the encoding
    /// guarantees `r != 6`.
    fn read_plain(&self, r: u8) -> u8 {
        match r & 7 {
            0 => self.regs.b(),
            1 => self.regs.c(),
            2 => self.regs.d(),
            3 => self.regs.e(),
            4 => self.regs.h(),
            5 => self.regs.l(),
            6 => unreachable!("(hl) has no plain register slot"),
            _ => self.regs.a(),
        }
    }

    fn write_plain(&mut self, r: u8, value: u8) {
        match r & 7 {
            0 => self.regs.set_b(value),
            1 => self.regs.set_c(value),
            2 => self.regs.set_d(value),
            3 => self.regs.set_e(value),
            4 => self.regs.set_h(value),
            5 => self.regs.set_l(value),
            6 => unreachable!("(hl) has no plain register slot"),
            _ => self.regs.set_a(value),
        }
    }

    /// Register pair by 2-bit field: bc, de, hl, sp.
    fn rp(&self, p: u8) -> u16 {
        match p & 3 {
            0 => self.regs.bc,
            1 => self.regs.de,
            2 => self.regs.hl,
            _ => self.regs.sp,
        }
    }

    fn set_rp(&mut self, p: u8, value: u16) {
        match p & 3 {
            0 => self.regs.bc = value,
            1 => self.regs.de = value,
            2 => self.regs.hl = value,
            _ => self.regs.sp = value,
        }
    }

    /// Pair selection for push/pop: af instead of sp.
    fn rp_push(&self, p: u8) -> u16 {
        match p & 3 {
            0 => self.regs.bc,
            1 => self.regs.de,
            2 => self.regs.hl,
            _ => self.regs.af,
        }
    }

    fn set_rp_push(&mut self, p: u8, value: u16) {
        match p & 3 {
            0 => self.regs.bc = value,
            1 => self.regs.de = value,
            2 => self.regs.hl = value,
            _ => self.regs.af = value,
        }
    }

    /// Branch condition by 3-bit field: nz, z, nc, c, po, pe, p, m.
    fn condition(&self, cc: u8) -> bool {
        let f = self.regs.f();
        match cc & 7 {
            0 => f & ZF == 0,
            1 => f & ZF != 0,
            2 => f & CF == 0,
            3 => f & CF != 0,
            4 => f & PF == 0,
            5 => f & PF != 0,
            6 => f & SF == 0,
            _ => f & SF != 0,
        }
    }

    fn alu_dispatch(&mut self, y: u8, value: u8) {
        match y & 7 {
            0 => self.add8(value),
            1 => self.adc8(value),
            2 => self.sub8(value),
            3 => self.sbc8(value),
            4 => self.and8(value),
            5 => self.xor8(value),
            6 => self.or8(value),
            _ => self.cp8(value),
        }
    }

    fn rotate_dispatch(&mut self, y: u8, value: u8) -> u8 {
        match y & 7 {
            0 => self.rlc8(value),
            1 => self.rrc8(value),
            2 => self.rl8(value),
            3 => self.rr8(value),
            4 => self.sla8(value),
            5 => self.sra8(value),
            6 => self.sll8(value),
            _ => self.srl8(value),
        }
    }

    fn index(&self, idx: IndexReg) -> u16 {
        match idx {
            IndexReg::Ix => self.regs.ix,
            IndexReg::Iy => self.regs.iy,
        }
    }

    fn set_index(&mut self, idx: IndexReg, value: u16) {
        match idx {
            IndexReg::Ix => self.regs.ix = value,
            IndexReg::Iy => self.regs.iy = value,
        }
    }

    /// Half of an index register by 3-bit field: b, c, d, e, ixh, ixl, a.
    fn read_ir(&self, idx: IndexReg, r: u8) -> u8 {
        match r & 7 {
            4 => (self.index(idx) >> 8) as u8,
            5 => self.index(idx) as u8,
            6 => unreachable!("displaced operand handled separately"),
            r => self.read_plain(r),
        }
    }

    fn write_ir(&mut self, idx: IndexReg, r: u8, value: u8) {
        match r & 7 {
            4 => {
                let v = (self.index(idx) & 0x00ff) | u16::from(value) << 8;
                self.set_index(idx, v);
            }
            5 => {
                let v = (self.index(idx) & 0xff00) | u16::from(value);
                self.set_index(idx, v);
            }
            6 => unreachable!("displaced operand handled separately"),
            r => self.write_plain(r, value),
        }
    }

    /// Effective address of `(ix+d)` / `(iy+d)`; the displacement byte
    /// sits at PC+2 and is signed.
    fn index_addr<B: Bus>(&self, bus: &mut B, idx: IndexReg) -> Result<u16, Condition> {
        let d = self.mem_read(bus, self.regs.pc.wrapping_add(2))? as i8;
        Ok(self.index(idx).wrapping_add_signed(i16::from(d)))
    }

    /// Relative branch target: PC + 2 + signed displacement at PC+1.
    fn relative_target<B: Bus>(&self, bus: &mut B) -> Result<u16, Condition> {
        let d = self.mem_read(bus, self.regs.pc.wrapping_add(1))? as i8;
        Ok(self.regs.pc.wrapping_add(2).wrapping_add_signed(i16::from(d)))
    }

    /// Default epilogue: table-driven PC advance and cycle cost.
    fn finish(&mut self, entry: &Opcode) -> Result<(), Condition> {
        self.regs.pc = self.regs.pc.wrapping_add(entry.bytes);
        self.add_cycles(entry.cycles);
        Ok(())
    }

    pub(crate) fn execute<B: Bus>(&mut self, bus: &mut B) -> Result<(), Condition> {
        let pc = self.regs.pc;
        let opc = self.mem_read(bus, pc)?;
        let entry = &PRIMARY[usize::from(opc)];

        match opc {
            0x00 => {} // nop

            // 16-bit loads and arithmetic
            0x01 | 0x11 | 0x21 | 0x31 => {
                let nn = self.mem_read16(bus, pc.wrapping_add(1))?;
                self.set_rp(opc >> 4, nn);
            }
            0x03 | 0x13 | 0x23 | 0x33 => {
                let p = opc >> 4;
                self.set_rp(p, self.rp(p).wrapping_add(1));
            }
            0x0b | 0x1b | 0x2b | 0x3b => {
                let p = opc >> 4;
                self.set_rp(p, self.rp(p).wrapping_sub(1));
            }
            0x09 | 0x19 | 0x29 | 0x39 => {
                let r = self.add16(self.regs.hl, self.rp(opc >> 4));
                self.regs.hl = r;
            }

            // Accumulator through pointers and absolute addresses
            0x02 => self.mem_write(bus, self.regs.bc, self.regs.a())?,
            0x12 => self.mem_write(bus, self.regs.de, self.regs.a())?,
            0x0a => {
                let v = self.mem_read(bus, self.regs.bc)?;
                self.regs.set_a(v);
            }
            0x1a => {
                let v = self.mem_read(bus, self.regs.de)?;
                self.regs.set_a(v);
            }
            0x22 => {
                let addr = self.mem_read16(bus, pc.wrapping_add(1))?;
                self.mem_write16(bus, addr, self.regs.hl)?;
            }
            0x2a => {
                let addr = self.mem_read16(bus, pc.wrapping_add(1))?;
                self.regs.hl = self.mem_read16(bus, addr)?;
            }
            0x32 => {
                let addr = self.mem_read16(bus, pc.wrapping_add(1))?;
                self.mem_write(bus, addr, self.regs.a())?;
            }
            0x3a => {
                let addr = self.mem_read16(bus, pc.wrapping_add(1))?;
                let v = self.mem_read(bus, addr)?;
                self.regs.set_a(v);
            }

            // inc r / dec r / ld r,n
            0x04 | 0x0c | 0x14 | 0x1c | 0x24 | 0x2c | 0x34 | 0x3c => {
                let y = (opc >> 3) & 7;
                let v = self.read_r(bus, y)?;
                let r = self.inc8(v);
                self.write_r(bus, y, r)?;
            }
            0x05 | 0x0d | 0x15 | 0x1d | 0x25 | 0x2d | 0x35 | 0x3d => {
                let y = (opc >> 3) & 7;
                let v = self.read_r(bus, y)?;
                let r = self.dec8(v);
                self.write_r(bus, y, r)?;
            }
            0x06 | 0x0e | 0x16 | 0x1e | 0x26 | 0x2e | 0x36 | 0x3e => {
                let n = self.mem_read(bus, pc.wrapping_add(1))?;
                self.write_r(bus, (opc >> 3) & 7, n)?;
            }

            // Accumulator rotates and flag ops
            0x07 => self.rlca(),
            0x0f => self.rrca(),
            0x17 => self.rla(),
            0x1f => self.rra(),
            0x27 => self.daa(),
            0x2f => self.cpl(),
            0x37 => self.scf(),
            0x3f => self.ccf(),

            0x08 => std::mem::swap(&mut self.regs.af, &mut self.regs.af_alt),

            // Relative jumps
            0x10 => {
                let b = self.regs.b().wrapping_sub(1);
                self.regs.set_b(b);
                if b != 0 {
                    self.regs.pc = self.relative_target(bus)?;
                    self.add_cycles(DJNZ_TAKEN);
                    return Ok(());
                }
            }
            0x18 => {
                self.regs.pc = self.relative_target(bus)?;
                self.add_cycles(entry.cycles);
                return Ok(());
            }
            0x20 | 0x28 | 0x30 | 0x38 => {
                if self.condition((opc >> 3) & 3) {
                    self.regs.pc = self.relative_target(bus)?;
                    self.add_cycles(JR_TAKEN);
                    return Ok(());
                }
            }

            0x76 => {
                self.add_cycles(entry.cycles);
                return Err(Condition::Halt { pc });
            }

            // ld r,r'
            0x40..=0x7f => {
                let v = self.read_r(bus, opc & 7)?;
                self.write_r(bus, (opc >> 3) & 7, v)?;
            }

            // ALU against registers and (hl)
            0x80..=0xbf => {
                let v = self.read_r(bus, opc & 7)?;
                self.alu_dispatch((opc >> 3) & 7, v);
            }

            // Conditional and plain control transfers
            0xc0 | 0xc8 | 0xd0 | 0xd8 | 0xe0 | 0xe8 | 0xf0 | 0xf8 => {
                if self.condition((opc >> 3) & 7) {
                    self.regs.pc = self.pop16(bus)?;
                    self.add_cycles(RET_TAKEN);
                    return Ok(());
                }
            }
            0xc9 => {
                self.regs.pc = self.pop16(bus)?;
                self.add_cycles(entry.cycles);
                return Ok(());
            }
            0xc2 | 0xca | 0xd2 | 0xda | 0xe2 | 0xea | 0xf2 | 0xfa => {
                if self.condition((opc >> 3) & 7) {
                    self.regs.pc = self.mem_read16(bus, pc.wrapping_add(1))?;
                    self.add_cycles(entry.cycles);
                    return Ok(());
                }
            }
            0xc3 => {
                self.regs.pc = self.mem_read16(bus, pc.wrapping_add(1))?;
                self.add_cycles(entry.cycles);
                return Ok(());
            }
            0xc4 | 0xcc | 0xd4 | 0xdc | 0xe4 | 0xec | 0xf4 | 0xfc => {
                if self.condition((opc >> 3) & 7) {
                    let target = self.mem_read16(bus, pc.wrapping_add(1))?;
                    self.push16(bus, pc.wrapping_add(entry.bytes))?;
                    self.regs.pc = target;
                    self.add_cycles(CALL_TAKEN);
                    return Ok(());
                }
            }
            0xcd => {
                let target = self.mem_read16(bus, pc.wrapping_add(1))?;
                self.push16(bus, pc.wrapping_add(entry.bytes))?;
                self.regs.pc = target;
                self.add_cycles(entry.cycles);
                return Ok(());
            }
            0xc7 | 0xcf | 0xd7 | 0xdf | 0xe7 | 0xef | 0xf7 | 0xff => {
                self.push16(bus, pc.wrapping_add(entry.bytes))?;
                self.regs.pc = u16::from(opc & 0x38);
                self.add_cycles(entry.cycles);
                return Ok(());
            }
            0xe9 => {
                // No dereference despite the (hl) spelling.
                self.regs.pc = self.regs.hl;
                self.add_cycles(entry.cycles);
                return Ok(());
            }

            // Stack
            0xc1 | 0xd1 | 0xe1 | 0xf1 => {
                let v = self.pop16(bus)?;
                self.set_rp_push((opc >> 4) & 3, v);
            }
            0xc5 | 0xd5 | 0xe5 | 0xf5 => {
                self.push16(bus, self.rp_push((opc >> 4) & 3))?;
            }
            0xe3 => {
                let sp = self.regs.sp;
                let v = self.mem_read16(bus, sp)?;
                self.mem_write16(bus, sp, self.regs.hl)?;
                self.regs.hl = v;
            }

            // ALU against immediates
            0xc6 | 0xce | 0xd6 | 0xde | 0xe6 | 0xee | 0xf6 | 0xfe => {
                let n = self.mem_read(bus, pc.wrapping_add(1))?;
                self.alu_dispatch((opc >> 3) & 7, n);
            }

            // I/O
            0xd3 => {
                let port = self.mem_read(bus, pc.wrapping_add(1))?;
                bus.io_write(port, self.regs.a());
            }
            0xdb => {
                let port = self.mem_read(bus, pc.wrapping_add(1))?;
                let v = bus.io_read(port);
                self.regs.set_a(v);
            }

            // Exchanges and the rest
            0xd9 => {
                std::mem::swap(&mut self.regs.bc, &mut self.regs.bc_alt);
                std::mem::swap(&mut self.regs.de, &mut self.regs.de_alt);
                std::mem::swap(&mut self.regs.hl, &mut self.regs.hl_alt);
            }
            0xeb => std::mem::swap(&mut self.regs.de, &mut self.regs.hl),
            0xf9 => self.regs.sp = self.regs.hl,
            0xf3 => {
                self.regs.iff1 = false;
                self.regs.iff2 = false;
            }
            0xfb => {
                self.regs.iff1 = true;
                self.regs.iff2 = true;
            }

            // Prefixes
            0xcb => return self.execute_cb(bus),
            0xdd => return self.execute_index(bus, IndexReg::Ix),
            0xed => return self.execute_ed(bus),
            0xfd => return self.execute_index(bus, IndexReg::Iy),
        }

        self.finish(entry)
    }

    /// The `CB` space: rotate/shift, bit, res, set by field decode.
    fn execute_cb<B: Bus>(&mut self, bus: &mut B) -> Result<(), Condition> {
        let pc = self.regs.pc;
        let opc = self.mem_read(bus, pc.wrapping_add(1))?;
        let entry = &CB[usize::from(opc)];
        let y = (opc >> 3) & 7;
        let z = opc & 7;

        match opc >> 6 {
            0 => {
                let v = self.read_r(bus, z)?;
                let r = self.rotate_dispatch(y, v);
                self.write_r(bus, z, r)?;
            }
            1 => {
                let v = self.read_r(bus, z)?;
                self.bit8(y, v);
            }
            2 => {
                let v = self.read_r(bus, z)?;
                self.write_r(bus, z, Z80::res8(y, v))?;
            }
            _ => {
                let v = self.read_r(bus, z)?;
                self.write_r(bus, z, Z80::set8(y, v))?;
            }
        }

        self.finish(entry)
    }

    fn execute_ed<B: Bus>(&mut self, bus: &mut B) -> Result<(), Condition> {
        let pc = self.regs.pc;
        let opc = self.mem_read(bus, pc.wrapping_add(1))?;
        let entry = &ED[usize::from(opc)];

        match opc {
            0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x78 => {
                let v = bus.io_read(self.regs.c());
                self.write_r(bus, (opc >> 3) & 7, v)?;
                self.in_flags(v);
            }
            0x41 | 0x49 | 0x51 | 0x59 | 0x61 | 0x69 | 0x79 => {
                let v = self.read_r(bus, (opc >> 3) & 7)?;
                bus.io_write(self.regs.c(), v);
            }

            0x42 | 0x52 | 0x62 | 0x72 => self.sbc16(self.rp((opc >> 4) & 3)),
            0x4a | 0x5a | 0x6a | 0x7a => self.adc16(self.rp((opc >> 4) & 3)),
            0x43 | 0x53 | 0x63 | 0x73 => {
                let addr = self.mem_read16(bus, pc.wrapping_add(2))?;
                self.mem_write16(bus, addr, self.rp((opc >> 4) & 3))?;
            }
            0x4b | 0x5b | 0x6b | 0x7b => {
                let addr = self.mem_read16(bus, pc.wrapping_add(2))?;
                let v = self.mem_read16(bus, addr)?;
                self.set_rp((opc >> 4) & 3, v);
            }

            0x44 => self.neg8(),
            0x45 => {
                // retn
                self.regs.pc = self.pop16(bus)?;
                self.add_cycles(entry.cycles);
                return Ok(());
            }
            0x4d => {
                // reti restores the pre-interrupt enable state
                self.regs.iff1 = self.regs.iff2;
                self.regs.pc = self.pop16(bus)?;
                self.add_cycles(entry.cycles);
                return Ok(());
            }

            0x67 => {
                // rrd: low nibbles rotate right through A and (hl)
                let hl = self.regs.hl;
                let v = self.mem_read(bus, hl)?;
                let a = self.regs.a();
                self.mem_write(bus, hl, (a << 4) | (v >> 4))?;
                let a = (a & 0xf0) | (v & 0x0f);
                self.regs.set_a(a);
                self.in_flags(a);
            }
            0x6f => {
                // rld: low nibbles rotate left through A and (hl)
                let hl = self.regs.hl;
                let v = self.mem_read(bus, hl)?;
                let a = self.regs.a();
                self.mem_write(bus, hl, (v << 4) | (a & 0x0f))?;
                let a = (a & 0xf0) | (v >> 4);
                self.regs.set_a(a);
                self.in_flags(a);
            }

            0xa0 => return self.block_transfer(bus, 1, false, entry),
            0xa8 => return self.block_transfer(bus, -1, false, entry),
            0xb0 => return self.block_transfer(bus, 1, true, entry),
            0xb8 => return self.block_transfer(bus, -1, true, entry),
            0xa1 => return self.block_compare(bus, 1, false, entry),
            0xa9 => return self.block_compare(bus, -1, false, entry),
            0xb1 => return self.block_compare(bus, 1, true, entry),
            0xb9 => return self.block_compare(bus, -1, true, entry),

            _ => {
                return Err(Condition::InvalidInstruction {
                    pc,
                    bytes: vec![0xed, opc],
                })
            }
        }

        self.finish(entry)
    }

    /// One step of ldi/ldd and their repeating forms. A repeating form
    /// that continues leaves PC on the opcode so the next `step`
    /// re-enters it.
    fn block_transfer<B: Bus>(
        &mut self,
        bus: &mut B,
        delta: i16,
        repeat: bool,
        entry: &Opcode,
    ) -> Result<(), Condition> {
        let v = self.mem_read(bus, self.regs.hl)?;
        self.mem_write(bus, self.regs.de, v)?;
        self.regs.bc = self.regs.bc.wrapping_sub(1);
        self.regs.hl = self.regs.hl.wrapping_add_signed(delta);
        self.regs.de = self.regs.de.wrapping_add_signed(delta);

        // X/Y come from A + the transferred byte: X its bit 3, Y its bit 1.
        let n = v.wrapping_add(self.regs.a());
        let f = (self.regs.f() & (CF | ZF | SF))
            | flag_if(self.regs.bc != 0, PF)
            | (n & XF)
            | flag_if(n & 0x02 != 0, YF);
        self.regs.set_f(f);

        if repeat && self.regs.bc != 0 {
            self.add_cycles(BLOCK_REPEAT);
            return Ok(());
        }
        self.finish(entry)
    }

    /// One step of cpi/cpd and their repeating forms. The repeat
    /// continues while BC is nonzero and the comparison missed.
    fn block_compare<B: Bus>(
        &mut self,
        bus: &mut B,
        delta: i16,
        repeat: bool,
        entry: &Opcode,
    ) -> Result<(), Condition> {
        let a = self.regs.a();
        let v = self.mem_read(bus, self.regs.hl)?;
        let mut n = a.wrapping_sub(v);
        let lookup = ((a & 0x08) >> 3) | ((v & 0x08) >> 2) | ((n & 0x08) >> 1);
        self.regs.bc = self.regs.bc.wrapping_sub(1);
        self.regs.hl = self.regs.hl.wrapping_add_signed(delta);

        let mut f = (self.regs.f() & CF)
            | NF
            | flag_if(self.regs.bc != 0, PF)
            | HALFCARRY_SUB[usize::from(lookup)]
            | flag_if(n == 0, ZF)
            | (n & SF);
        // X/Y come from A - (hl) - H: borrow the half-carry back out.
        if f & HF != 0 {
            n = n.wrapping_sub(1);
        }
        f |= (n & XF) | flag_if(n & 0x02 != 0, YF);
        self.regs.set_f(f);

        if repeat && f & (PF | ZF) == PF {
            self.add_cycles(BLOCK_REPEAT);
            return Ok(());
        }
        self.finish(entry)
    }

    /// The `DD` and `FD` spaces, parameterized by index register.
    fn execute_index<B: Bus>(&mut self, bus: &mut B, idx: IndexReg) -> Result<(), Condition> {
        let pc = self.regs.pc;
        let prefix: u8 = match idx {
            IndexReg::Ix => 0xdd,
            IndexReg::Iy => 0xfd,
        };
        let opc = self.mem_read(bus, pc.wrapping_add(1))?;
        let table = match idx {
            IndexReg::Ix => &DD,
            IndexReg::Iy => &FD,
        };
        let entry = &table[usize::from(opc)];

        match opc {
            0x09 | 0x19 | 0x29 | 0x39 => {
                let p = (opc >> 4) & 3;
                let rr = if p == 2 { self.index(idx) } else { self.rp(p) };
                let r = self.add16(self.index(idx), rr);
                self.set_index(idx, r);
            }
            0x21 => {
                let nn = self.mem_read16(bus, pc.wrapping_add(2))?;
                self.set_index(idx, nn);
            }
            0x22 => {
                let addr = self.mem_read16(bus, pc.wrapping_add(2))?;
                self.mem_write16(bus, addr, self.index(idx))?;
            }
            0x2a => {
                let addr = self.mem_read16(bus, pc.wrapping_add(2))?;
                let v = self.mem_read16(bus, addr)?;
                self.set_index(idx, v);
            }
            0x23 => self.set_index(idx, self.index(idx).wrapping_add(1)),
            0x2b => self.set_index(idx, self.index(idx).wrapping_sub(1)),

            // Undocumented half-register forms
            0x24 | 0x25 | 0x2c | 0x2d => {
                let r = if opc & 0x08 == 0 { 4 } else { 5 };
                let v = self.read_ir(idx, r);
                let v = if opc & 1 == 0 {
                    self.inc8(v)
                } else {
                    self.dec8(v)
                };
                self.write_ir(idx, r, v);
            }
            0x26 | 0x2e => {
                let n = self.mem_read(bus, pc.wrapping_add(2))?;
                self.write_ir(idx, if opc == 0x26 { 4 } else { 5 }, n);
            }

            0x34 => {
                let addr = self.index_addr(bus, idx)?;
                let v = self.mem_read(bus, addr)?;
                let r = self.inc8(v);
                self.mem_write(bus, addr, r)?;
            }
            0x35 => {
                let addr = self.index_addr(bus, idx)?;
                let v = self.mem_read(bus, addr)?;
                let r = self.dec8(v);
                self.mem_write(bus, addr, r)?;
            }
            0x36 => {
                let addr = self.index_addr(bus, idx)?;
                let n = self.mem_read(bus, pc.wrapping_add(3))?;
                self.mem_write(bus, addr, n)?;
            }

            // Displaced loads use the real register set
            0x70..=0x75 | 0x77 => {
                let addr = self.index_addr(bus, idx)?;
                let v = self.read_plain(opc & 7);
                self.mem_write(bus, addr, v)?;
            }
            0x46 | 0x4e | 0x56 | 0x5e | 0x66 | 0x6e | 0x7e => {
                let addr = self.index_addr(bus, idx)?;
                let v = self.mem_read(bus, addr)?;
                self.write_plain((opc >> 3) & 7, v);
            }

            // Undocumented half-register loads
            0x40..=0x7f => {
                if !entry.defined() {
                    return Err(Condition::InvalidInstruction {
                        pc,
                        bytes: vec![prefix, opc],
                    });
                }
                let v = self.read_ir(idx, opc & 7);
                self.write_ir(idx, (opc >> 3) & 7, v);
            }

            // ALU against the displaced operand
            0x86 | 0x8e | 0x96 | 0x9e | 0xa6 | 0xae | 0xb6 | 0xbe => {
                let addr = self.index_addr(bus, idx)?;
                let v = self.mem_read(bus, addr)?;
                self.alu_dispatch((opc >> 3) & 7, v);
            }
            // ALU against the index halves
            0x80..=0xbf => {
                if !entry.defined() {
                    return Err(Condition::InvalidInstruction {
                        pc,
                        bytes: vec![prefix, opc],
                    });
                }
                let v = self.read_ir(idx, opc & 7);
                self.alu_dispatch((opc >> 3) & 7, v);
            }

            0xcb => return self.execute_index_cb(bus, idx),

            0xe1 => {
                let v = self.pop16(bus)?;
                self.set_index(idx, v);
            }
            0xe3 => {
                let sp = self.regs.sp;
                let v = self.mem_read16(bus, sp)?;
                self.mem_write16(bus, sp, self.index(idx))?;
                self.set_index(idx, v);
            }
            0xe5 => self.push16(bus, self.index(idx))?,
            0xe9 => {
                self.regs.pc = self.index(idx);
                self.add_cycles(entry.cycles);
                return Ok(());
            }
            0xf9 => self.regs.sp = self.index(idx),

            _ => {
                return Err(Condition::InvalidInstruction {
                    pc,
                    bytes: vec![prefix, opc],
                })
            }
        }

        self.finish(entry)
    }

    /// The doubly prefixed `DD CB` / `FD CB` space. The displacement is
    /// the 3rd byte, the sub-opcode the 4th; its `xx yyy zzz` fields
    /// select the family, bit/rotate kind and an undocumented register
    /// copy target.
    fn execute_index_cb<B: Bus>(&mut self, bus: &mut B, idx: IndexReg) -> Result<(), Condition> {
        let pc = self.regs.pc;
        let addr = self.index_addr(bus, idx)?;
        let sub = self.mem_read(bus, pc.wrapping_add(3))?;
        let y = (sub >> 3) & 7;
        let z = sub & 7;

        match sub >> 6 {
            0 => {
                let v = self.mem_read(bus, addr)?;
                let r = self.rotate_dispatch(y, v);
                self.mem_write(bus, addr, r)?;
                if z != 6 {
                    self.write_plain(z, r);
                }
                self.add_cycles(DDCB_RW);
            }
            1 => {
                let v = self.mem_read(bus, addr)?;
                self.bit8(y, v);
                self.add_cycles(DDCB_BIT);
            }
            2 => {
                let v = self.mem_read(bus, addr)?;
                let r = Z80::res8(y, v);
                self.mem_write(bus, addr, r)?;
                if z != 6 {
                    self.write_plain(z, r);
                }
                self.add_cycles(DDCB_RW);
            }
            _ => {
                let v = self.mem_read(bus, addr)?;
                let r = Z80::set8(y, v);
                self.mem_write(bus, addr, r)?;
                if z != 6 {
                    self.write_plain(z, r);
                }
                self.add_cycles(DDCB_RW);
            }
        }

        self.regs.pc = pc.wrapping_add(DDCB_BYTES);
        Ok(())
    }
}
