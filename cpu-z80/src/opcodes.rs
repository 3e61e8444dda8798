//! Opcode metadata tables, shared by the executor and the disassembler.
//!
//! Five parallel 256-entry tables: primary plus the `CB`, `DD`, `ED` and
//! `FD` prefix spaces. Each record carries the documented cycle cost,
//! instruction length, both mnemonic spellings and the operand addressing
//! modes. The tables are derived mechanically from the Zilog UM0080
//! reference; regular families (the `ld r,r'` block, the ALU block, the
//! whole `CB` space, the indexed spaces) are generated by field decode so
//! a single rule cannot drift between family members.
//!
//! Conditional control transfers store the not-taken cycle count; the
//! executor charges the documented taken count itself. `DD CB`/`FD CB`
//! share a single prefix sentinel and are decoded from the 4th byte.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Operand addressing mode, driving disassembly rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// No operand.
    #[default]
    None,
    /// 8-bit immediate, rendered `$xx`.
    Immediate,
    /// 16-bit immediate, rendered `$xxxx`.
    ImmediateExtended,
    /// Absolute address, rendered `($xxxx)`.
    Extended,
    /// 8-bit port, rendered `($xx)`.
    Indirect,
    /// PC-relative signed displacement, rendered as the resolved target.
    Relative,
    /// Index register plus displacement, rendered `(ix+$xx)`.
    Indexed,
    /// Named register, rendered as-is.
    Register,
    /// Register-held address, rendered `(hl)` (bare in 8080 mode).
    RegisterIndirect,
    /// Fixed operand text, rendered as-is.
    Implied,
    /// Bit number of the bit/res/set families.
    Bit,
    /// Branch condition code.
    Condition,
}

/// One table entry. Empty mnemonics mark an undefined slot.
#[derive(Debug, Clone, Copy)]
pub struct Opcode {
    /// Cycle cost (not-taken cost for conditional transfers).
    pub cycles: u32,
    /// Instruction length in bytes, prefix included.
    pub bytes: u16,
    /// Mnemonic spellings, indexed by CPU mode: `[z80, 8080]`.
    pub mnemonic: [&'static str; 2],
    pub dst: Mode,
    pub dst_text: [&'static str; 2],
    pub src: Mode,
    pub src_text: [&'static str; 2],
    /// Consult the next table (`CB`/`DD`/`ED`/`FD`, or the directly
    /// decoded `DD CB`/`FD CB` space).
    pub prefix: bool,
}

impl Opcode {
    pub const UNDEFINED: Opcode = Opcode {
        cycles: 0,
        bytes: 0,
        mnemonic: ["", ""],
        dst: Mode::None,
        dst_text: ["", ""],
        src: Mode::None,
        src_text: ["", ""],
        prefix: false,
    };

    const fn prefix_sentinel() -> Opcode {
        Opcode {
            prefix: true,
            ..Opcode::UNDEFINED
        }
    }

    /// Whether this slot holds a real instruction.
    #[must_use]
    pub fn defined(&self) -> bool {
        !self.mnemonic[0].is_empty()
    }

    const fn dst(mut self, mode: Mode) -> Self {
        self.dst = mode;
        self
    }

    const fn dst_r(mut self, mode: Mode, z80: &'static str, i8080: &'static str) -> Self {
        self.dst = mode;
        self.dst_text = [z80, i8080];
        self
    }

    const fn src(mut self, mode: Mode) -> Self {
        self.src = mode;
        self
    }

    const fn src_r(mut self, mode: Mode, z80: &'static str, i8080: &'static str) -> Self {
        self.src = mode;
        self.src_text = [z80, i8080];
        self
    }
}

const fn op(z80: &'static str, i8080: &'static str, bytes: u16, cycles: u32) -> Opcode {
    Opcode {
        cycles,
        bytes,
        mnemonic: [z80, i8080],
        dst: Mode::None,
        dst_text: ["", ""],
        src: Mode::None,
        src_text: ["", ""],
        prefix: false,
    }
}

pub(crate) static PRIMARY: Lazy<[Opcode; 256]> = Lazy::new(primary_table);
pub(crate) static CB: Lazy<[Opcode; 256]> = Lazy::new(cb_table);
pub(crate) static DD: Lazy<[Opcode; 256]> = Lazy::new(|| index_table(IX_NAMES));
pub(crate) static ED: Lazy<[Opcode; 256]> = Lazy::new(ed_table);
pub(crate) static FD: Lazy<[Opcode; 256]> = Lazy::new(|| index_table(IY_NAMES));

// Operand name sets, indexed by the 3-bit register field.
pub(crate) const R8: [&'static str; 8] = ["b", "c", "d", "e", "h", "l", "hl", "a"];
const R8_8080: [&'static str; 8] = ["b", "c", "d", "e", "h", "l", "m", "a"];
const RP: [&'static str; 4] = ["bc", "de", "hl", "sp"];
const RP_8080: [&'static str; 4] = ["b", "d", "h", "sp"];
const RP_PUSH: [&'static str; 4] = ["bc", "de", "hl", "af"];
const RP_PUSH_8080: [&'static str; 4] = ["b", "d", "h", "psw"];
const COND: [&'static str; 8] = ["nz", "z", "nc", "c", "po", "pe", "p", "m"];
pub(crate) const BITS: [&'static str; 8] = ["0", "1", "2", "3", "4", "5", "6", "7"];
pub(crate) const ROT: [&'static str; 8] = ["rlc", "rrc", "rl", "rr", "sla", "sra", "sll", "srl"];
const ALU: [&'static str; 8] = ["add", "adc", "sub", "sbc", "and", "xor", "or", "cp"];
const ALU_8080: [&'static str; 8] = ["add", "adc", "sub", "sbb", "ana", "xra", "ora", "cmp"];
const ALU_IMM_8080: [&'static str; 8] = ["adi", "aci", "sui", "sbi", "ani", "xri", "ori", "cpi"];
const JP_8080: [&'static str; 8] = ["jnz", "jz", "jnc", "jc", "jpo", "jpe", "jp", "jm"];
const RET_8080: [&'static str; 8] = ["rnz", "rz", "rnc", "rc", "rpo", "rpe", "rp", "rm"];
const CALL_8080: [&'static str; 8] = ["cnz", "cz", "cnc", "cc", "cpo", "cpe", "cp", "cm"];
const RST: [&'static str; 8] = ["$00", "$08", "$10", "$18", "$20", "$28", "$30", "$38"];
const RST_8080: [&'static str; 8] = ["0", "1", "2", "3", "4", "5", "6", "7"];

fn reg_mode(r: usize) -> Mode {
    if r == 6 {
        Mode::RegisterIndirect
    } else {
        Mode::Register
    }
}

/// `add`/`adc`/`sbc` spell the accumulator destination; the other five
/// ALU mnemonics take a single operand.
fn alu_entry(y: usize, entry: Opcode, src_mode: Mode, z80: &'static str, i8080: &'static str) -> Opcode {
    if matches!(y, 0 | 1 | 3) {
        entry.dst_r(Mode::Register, "a", "").src_r(src_mode, z80, i8080)
    } else {
        entry.dst_r(src_mode, z80, i8080)
    }
}

#[allow(clippy::too_many_lines)] // One entry per opcode; splitting would obscure the layout.
fn primary_table() -> [Opcode; 256] {
    use Mode::{
        Condition, Extended, Immediate, ImmediateExtended, Implied, Indirect, Register,
        RegisterIndirect, Relative,
    };

    let mut t = [Opcode::UNDEFINED; 256];

    t[0x00] = op("nop", "nop", 1, 4);

    // 16-bit load/arithmetic families, by register pair field.
    for p in 0..4 {
        t[0x01 | p << 4] = op("ld", "lxi", 3, 10)
            .dst_r(Register, RP[p], RP_8080[p])
            .src(ImmediateExtended);
        t[0x03 | p << 4] = op("inc", "inx", 1, 6).dst_r(Register, RP[p], RP_8080[p]);
        t[0x09 | p << 4] = op("add", "dad", 1, 11)
            .dst_r(Register, "hl", "")
            .src_r(Register, RP[p], RP_8080[p]);
        t[0x0b | p << 4] = op("dec", "dcx", 1, 6).dst_r(Register, RP[p], RP_8080[p]);
        t[0xc1 | p << 4] = op("pop", "pop", 1, 10).dst_r(Register, RP_PUSH[p], RP_PUSH_8080[p]);
        t[0xc5 | p << 4] = op("push", "push", 1, 11).dst_r(Register, RP_PUSH[p], RP_PUSH_8080[p]);
    }

    // inc r / dec r / ld r,n, by register field.
    for y in 0..8 {
        let m = reg_mode(y);
        let (rw, ld) = if y == 6 { (11, 10) } else { (4, 7) };
        t[0x04 | y << 3] = op("inc", "inr", 1, rw).dst_r(m, R8[y], R8_8080[y]);
        t[0x05 | y << 3] = op("dec", "dcr", 1, rw).dst_r(m, R8[y], R8_8080[y]);
        t[0x06 | y << 3] = op("ld", "mvi", 2, ld)
            .dst_r(m, R8[y], R8_8080[y])
            .src(Immediate);
    }

    // ld r,r' block.
    for y in 0..8 {
        for z in 0..8 {
            if y == 6 && z == 6 {
                continue; // halt
            }
            let cycles = if y == 6 || z == 6 { 7 } else { 4 };
            t[0x40 | y << 3 | z] = op("ld", "mov", 1, cycles)
                .dst_r(reg_mode(y), R8[y], R8_8080[y])
                .src_r(reg_mode(z), R8[z], R8_8080[z]);
        }
    }
    t[0x76] = op("halt", "hlt", 1, 4);

    // ALU register block and the immediate forms.
    for y in 0..8 {
        for z in 0..8 {
            let cycles = if z == 6 { 7 } else { 4 };
            t[0x80 | y << 3 | z] = alu_entry(
                y,
                op(ALU[y], ALU_8080[y], 1, cycles),
                reg_mode(z),
                R8[z],
                R8_8080[z],
            );
        }
        t[0xc6 | y << 3] = alu_entry(y, op(ALU[y], ALU_IMM_8080[y], 2, 7), Immediate, "", "");
    }

    // Conditional control transfers and rst, by condition field.
    for y in 0..8 {
        t[0xc0 | y << 3] = op("ret", RET_8080[y], 1, 5).dst_r(Condition, COND[y], "");
        t[0xc2 | y << 3] = op("jp", JP_8080[y], 3, 10)
            .dst_r(Condition, COND[y], "")
            .src(ImmediateExtended);
        t[0xc4 | y << 3] = op("call", CALL_8080[y], 3, 10)
            .dst_r(Condition, COND[y], "")
            .src(ImmediateExtended);
        t[0xc7 | y << 3] = op("rst", "rst", 1, 11).dst_r(Implied, RST[y], RST_8080[y]);
    }

    // Relative jumps (Z80 only). jr cc stores the not-taken cost.
    t[0x10] = op("djnz", "", 2, 8).dst(Relative);
    t[0x18] = op("jr", "", 2, 12).dst(Relative);
    for y in 0..4 {
        t[0x20 | y << 3] = op("jr", "", 2, 7)
            .dst_r(Condition, COND[y], "")
            .src(Relative);
    }

    // Accumulator loads through pointers and absolute addresses.
    t[0x02] = op("ld", "stax", 1, 7)
        .dst_r(RegisterIndirect, "bc", "b")
        .src_r(Register, "a", "");
    t[0x0a] = op("ld", "ldax", 1, 7)
        .dst_r(Register, "a", "")
        .src_r(RegisterIndirect, "bc", "b");
    t[0x12] = op("ld", "stax", 1, 7)
        .dst_r(RegisterIndirect, "de", "d")
        .src_r(Register, "a", "");
    t[0x1a] = op("ld", "ldax", 1, 7)
        .dst_r(Register, "a", "")
        .src_r(RegisterIndirect, "de", "d");
    t[0x22] = op("ld", "shld", 3, 16).dst(Extended).src_r(Register, "hl", "");
    t[0x2a] = op("ld", "lhld", 3, 16).dst_r(Register, "hl", "").src(Extended);
    t[0x32] = op("ld", "sta", 3, 13).dst(Extended).src_r(Register, "a", "");
    t[0x3a] = op("ld", "lda", 3, 13).dst_r(Register, "a", "").src(Extended);

    // Accumulator rotates and flag ops.
    t[0x07] = op("rlca", "rlc", 1, 4);
    t[0x0f] = op("rrca", "rrc", 1, 4);
    t[0x17] = op("rla", "ral", 1, 4);
    t[0x1f] = op("rra", "rar", 1, 4);
    t[0x27] = op("daa", "daa", 1, 4);
    t[0x2f] = op("cpl", "cma", 1, 4);
    t[0x37] = op("scf", "stc", 1, 4);
    t[0x3f] = op("ccf", "cmc", 1, 4);

    // Exchanges, jumps, stack and I/O odds and ends.
    t[0x08] = op("ex", "", 1, 4)
        .dst_r(Register, "af", "")
        .src_r(Register, "af'", "");
    t[0xc3] = op("jp", "jmp", 3, 10).dst(ImmediateExtended);
    t[0xc9] = op("ret", "ret", 1, 10);
    t[0xcd] = op("call", "call", 3, 17).dst(ImmediateExtended);
    t[0xd3] = op("out", "out", 2, 11).dst(Indirect).src_r(Register, "a", "");
    t[0xd9] = op("exx", "", 1, 4);
    t[0xdb] = op("in", "in", 2, 11).dst_r(Register, "a", "").src(Indirect);
    t[0xe3] = op("ex", "xthl", 1, 19)
        .dst_r(RegisterIndirect, "sp", "")
        .src_r(Register, "hl", "");
    t[0xe9] = op("jp", "pchl", 1, 4).dst_r(RegisterIndirect, "hl", "");
    t[0xeb] = op("ex", "xchg", 1, 4)
        .dst_r(Register, "de", "")
        .src_r(Register, "hl", "");
    t[0xf3] = op("di", "di", 1, 4);
    t[0xf9] = op("ld", "sphl", 1, 6)
        .dst_r(Register, "sp", "")
        .src_r(Register, "hl", "");
    t[0xfb] = op("ei", "ei", 1, 4);

    // Prefix bytes select the secondary tables.
    t[0xcb] = Opcode::prefix_sentinel();
    t[0xdd] = Opcode::prefix_sentinel();
    t[0xed] = Opcode::prefix_sentinel();
    t[0xfd] = Opcode::prefix_sentinel();

    t
}

/// The `CB` space is perfectly regular: `xx` selects the family, `yyy`
/// the rotate kind or bit number, `zzz` the operand register.
fn cb_table() -> [Opcode; 256] {
    use Mode::Bit;

    let mut t = [Opcode::UNDEFINED; 256];
    for i in 0..256 {
        let y = (i >> 3) & 0x07;
        let z = i & 0x07;
        let m = reg_mode(z);
        let rw = if z == 6 { 15 } else { 8 };
        t[i] = match i >> 6 {
            0 => op(ROT[y], "", 2, rw).dst_r(m, R8[z], ""),
            1 => op("bit", "", 2, if z == 6 { 12 } else { 8 })
                .dst_r(Bit, BITS[y], "")
                .src_r(m, R8[z], ""),
            2 => op("res", "", 2, rw)
                .dst_r(Bit, BITS[y], "")
                .src_r(m, R8[z], ""),
            _ => op("set", "", 2, rw)
                .dst_r(Bit, BITS[y], "")
                .src_r(m, R8[z], ""),
        };
    }
    t
}

fn ed_table() -> [Opcode; 256] {
    use Mode::{Extended, Register, RegisterIndirect};

    let mut t = [Opcode::UNDEFINED; 256];

    // Register I/O and the 16-bit arithmetic/load quads.
    for y in 0..8 {
        if y == 6 {
            continue;
        }
        t[0x40 | y << 3] = op("in", "", 2, 12)
            .dst_r(Register, R8[y], "")
            .src_r(RegisterIndirect, "c", "");
        t[0x41 | y << 3] = op("out", "", 2, 12)
            .dst_r(RegisterIndirect, "c", "")
            .src_r(Register, R8[y], "");
    }
    for p in 0..4 {
        t[0x42 | p << 4] = op("sbc", "", 2, 15)
            .dst_r(Register, "hl", "")
            .src_r(Register, RP[p], "");
        t[0x4a | p << 4] = op("adc", "", 2, 15)
            .dst_r(Register, "hl", "")
            .src_r(Register, RP[p], "");
        t[0x43 | p << 4] = op("ld", "", 4, 20).dst(Extended).src_r(Register, RP[p], "");
        t[0x4b | p << 4] = op("ld", "", 4, 20).dst_r(Register, RP[p], "").src(Extended);
    }

    t[0x44] = op("neg", "", 2, 8);
    t[0x45] = op("retn", "", 2, 14);
    t[0x4d] = op("reti", "", 2, 14);
    t[0x67] = op("rrd", "", 2, 18);
    t[0x6f] = op("rld", "", 2, 18);

    // Block transfers and compares. The repeating forms store the
    // terminating cost; a repeat iteration costs 21.
    t[0xa0] = op("ldi", "", 2, 16);
    t[0xa1] = op("cpi", "", 2, 16);
    t[0xa8] = op("ldd", "", 2, 16);
    t[0xa9] = op("cpd", "", 2, 16);
    t[0xb0] = op("ldir", "", 2, 16);
    t[0xb1] = op("cpir", "", 2, 16);
    t[0xb8] = op("lddr", "", 2, 16);
    t[0xb9] = op("cpdr", "", 2, 16);

    t
}

/// Register names for one of the two index spaces.
struct IndexNames {
    pair: &'static str,
    hi: &'static str,
    lo: &'static str,
}

const IX_NAMES: IndexNames = IndexNames {
    pair: "ix",
    hi: "ixh",
    lo: "ixl",
};

const IY_NAMES: IndexNames = IndexNames {
    pair: "iy",
    hi: "iyh",
    lo: "iyl",
};

/// The `DD` and `FD` spaces differ only in register names; one builder
/// serves both. Slots left undefined here (prefix chains, opcodes that
/// never touch H, L or `(hl)`) report as invalid instructions.
fn index_table(names: IndexNames) -> [Opcode; 256] {
    use Mode::{Immediate, ImmediateExtended, Indexed, Register, RegisterIndirect};

    // h, l and (hl) replaced by their index equivalents.
    let ir8: [&'static str; 8] = ["b", "c", "d", "e", names.hi, names.lo, names.pair, "a"];

    let mut t = [Opcode::UNDEFINED; 256];

    for p in 0..4 {
        let rr = if p == 2 { names.pair } else { RP[p] };
        t[0x09 | p << 4] = op("add", "", 2, 15)
            .dst_r(Register, names.pair, "")
            .src_r(Register, rr, "");
    }

    t[0x21] = op("ld", "", 4, 14)
        .dst_r(Register, names.pair, "")
        .src(ImmediateExtended);
    t[0x22] = op("ld", "", 4, 20)
        .dst(Mode::Extended)
        .src_r(Register, names.pair, "");
    t[0x2a] = op("ld", "", 4, 20)
        .dst_r(Register, names.pair, "")
        .src(Mode::Extended);
    t[0x23] = op("inc", "", 2, 10).dst_r(Register, names.pair, "");
    t[0x2b] = op("dec", "", 2, 10).dst_r(Register, names.pair, "");

    // Undocumented half-register forms.
    t[0x24] = op("inc", "", 2, 8).dst_r(Register, names.hi, "");
    t[0x25] = op("dec", "", 2, 8).dst_r(Register, names.hi, "");
    t[0x26] = op("ld", "", 3, 11).dst_r(Register, names.hi, "").src(Immediate);
    t[0x2c] = op("inc", "", 2, 8).dst_r(Register, names.lo, "");
    t[0x2d] = op("dec", "", 2, 8).dst_r(Register, names.lo, "");
    t[0x2e] = op("ld", "", 3, 11).dst_r(Register, names.lo, "").src(Immediate);

    t[0x34] = op("inc", "", 3, 23).dst_r(Indexed, names.pair, "");
    t[0x35] = op("dec", "", 3, 23).dst_r(Indexed, names.pair, "");
    t[0x36] = op("ld", "", 4, 19).dst_r(Indexed, names.pair, "").src(Immediate);

    // Load block: displaced forms use the real register set, plain forms
    // substitute the index halves and exist only when one is involved.
    for y in 0..8 {
        for z in 0..8 {
            if y == 6 && z == 6 {
                continue;
            }
            let opc = 0x40 | y << 3 | z;
            if y == 6 {
                t[opc] = op("ld", "", 3, 19)
                    .dst_r(Indexed, names.pair, "")
                    .src_r(Register, R8[z], "");
            } else if z == 6 {
                t[opc] = op("ld", "", 3, 19)
                    .dst_r(Register, R8[y], "")
                    .src_r(Indexed, names.pair, "");
            } else if matches!(y, 4 | 5) || matches!(z, 4 | 5) {
                t[opc] = op("ld", "", 2, 8)
                    .dst_r(Register, ir8[y], "")
                    .src_r(Register, ir8[z], "");
            }
        }
    }

    // ALU block against the index halves and displaced operand.
    for y in 0..8 {
        t[0x80 | y << 3 | 4] = alu_entry(y, op(ALU[y], "", 2, 8), Register, names.hi, "");
        t[0x80 | y << 3 | 5] = alu_entry(y, op(ALU[y], "", 2, 8), Register, names.lo, "");
        t[0x80 | y << 3 | 6] = alu_entry(y, op(ALU[y], "", 3, 19), Indexed, names.pair, "");
    }

    t[0xcb] = Opcode::prefix_sentinel();
    t[0xe1] = op("pop", "", 2, 14).dst_r(Register, names.pair, "");
    t[0xe3] = op("ex", "", 2, 23)
        .dst_r(RegisterIndirect, "sp", "")
        .src_r(Register, names.pair, "");
    t[0xe5] = op("push", "", 2, 15).dst_r(Register, names.pair, "");
    t[0xe9] = op("jp", "", 2, 8).dst_r(RegisterIndirect, names.pair, "");
    t[0xf9] = op("ld", "", 2, 10)
        .dst_r(Register, "sp", "")
        .src_r(Register, names.pair, "");

    t
}

/// Summary of one primary-table instruction, keyed for [`opcode_map`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeEntry {
    pub opcode: u8,
    pub cycles: u32,
    pub bytes: u16,
}

fn operand_key(mode: Mode, text: &str) -> Option<String> {
    match mode {
        Mode::None => None,
        Mode::Immediate => Some("n".into()),
        Mode::ImmediateExtended => Some("nn".into()),
        Mode::Extended => Some("(nn)".into()),
        Mode::Indirect => Some("(n)".into()),
        Mode::Relative => Some("d".into()),
        Mode::Indexed => Some(format!("({text}+d)")),
        Mode::RegisterIndirect => Some(format!("({text})")),
        Mode::Register | Mode::Implied | Mode::Bit | Mode::Condition => Some(text.into()),
    }
}

/// Map of `mnemonic dst,src` keys (Z80 spellings, value operands as
/// placeholders) to primary-table facts. Duplicate keys would mean two
/// table slots claim the same instruction, so they panic.
#[must_use]
pub fn opcode_map() -> HashMap<String, OpcodeEntry> {
    let mut map = HashMap::new();
    for (i, o) in PRIMARY.iter().enumerate() {
        if !o.defined() {
            continue;
        }
        let mut key = o.mnemonic[0].to_string();
        let dst = operand_key(o.dst, o.dst_text[0]);
        let src = operand_key(o.src, o.src_text[0]);
        if let Some(dst) = dst {
            key.push(' ');
            key.push_str(&dst);
        }
        if let Some(src) = src {
            key.push(',');
            key.push_str(&src);
        }
        let entry = OpcodeEntry {
            opcode: i as u8,
            cycles: o.cycles,
            bytes: o.bytes,
        };
        assert!(
            map.insert(key.clone(), entry).is_none(),
            "duplicate opcode key: {key}"
        );
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defined_count(table: &[Opcode; 256]) -> usize {
        table.iter().filter(|o| o.defined()).count()
    }

    #[test]
    fn every_defined_entry_has_length_and_cycles() {
        for (name, table) in [
            ("primary", &*PRIMARY),
            ("cb", &*CB),
            ("dd", &*DD),
            ("ed", &*ED),
            ("fd", &*FD),
        ] {
            for (i, o) in table.iter().enumerate() {
                if o.defined() {
                    assert!(o.bytes >= 1, "{name}[{i:#04x}] has no length");
                    assert!(o.cycles >= 4, "{name}[{i:#04x}] has no cycle cost");
                    assert!(!o.prefix, "{name}[{i:#04x}] both defined and prefix");
                }
            }
        }
    }

    #[test]
    fn primary_is_fully_populated() {
        // Every primary byte is either a documented instruction or one of
        // the four prefixes.
        for (i, o) in PRIMARY.iter().enumerate() {
            assert!(
                o.defined() || o.prefix,
                "primary[{i:#04x}] neither defined nor prefix"
            );
        }
        assert_eq!(defined_count(&PRIMARY), 252);
    }

    #[test]
    fn prefix_sentinels() {
        for i in [0xcb, 0xdd, 0xed, 0xfd] {
            assert!(PRIMARY[i].prefix);
        }
        assert!(DD[0xcb].prefix);
        assert!(FD[0xcb].prefix);
    }

    #[test]
    fn cb_space_is_complete() {
        assert_eq!(defined_count(&CB), 256);
        assert_eq!(CB[0x06].mnemonic[0], "rlc");
        assert_eq!(CB[0x06].cycles, 15);
        assert_eq!(CB[0x46].mnemonic[0], "bit");
        assert_eq!(CB[0x46].cycles, 12);
        assert_eq!(CB[0xff].mnemonic[0], "set");
        assert_eq!(CB[0xff].dst_text[0], "7");
        assert_eq!(CB[0xff].src_text[0], "a");
    }

    #[test]
    fn table_spot_checks() {
        assert_eq!(PRIMARY[0x00].bytes, 1);
        assert_eq!(PRIMARY[0x00].cycles, 4);
        assert_eq!(PRIMARY[0x3e].bytes, 2);
        assert_eq!(PRIMARY[0x3e].cycles, 7);
        assert_eq!(PRIMARY[0xc3].bytes, 3);
        assert_eq!(PRIMARY[0xc3].cycles, 10);
        assert_eq!(PRIMARY[0x10].cycles, 8, "djnz stores the not-taken cost");

        assert_eq!(DD[0x36].bytes, 4);
        assert_eq!(DD[0x36].cycles, 19);
        assert_eq!(DD[0x66].mnemonic[0], "ld");
        assert_eq!(DD[0x66].dst_text[0], "h", "displaced load keeps real h");
        assert_eq!(DD[0x65].dst_text[0], "ixh");
        assert_eq!(DD[0x65].src_text[0], "ixl");
        assert_eq!(FD[0x65].dst_text[0], "iyh");

        assert_eq!(ED[0xb0].mnemonic[0], "ldir");
        assert_eq!(ED[0xb0].bytes, 2);
        assert_eq!(ED[0x43].bytes, 4);
        assert!(!ED[0x70].defined(), "in (c) stays undefined");
        assert!(!ED[0x00].defined());
    }

    #[test]
    fn dd_plain_loads_without_index_halves_are_undefined() {
        assert!(!DD[0x40].defined()); // ld b,b
        assert!(!DD[0x41].defined()); // ld b,c
        assert!(!DD[0x47].defined()); // ld b,a
        assert!(!DD[0x76].defined()); // halt
        assert!(DD[0x44].defined()); // ld b,ixh
        assert!(DD[0x7e].defined()); // ld a,(ix+d)
    }

    #[test]
    fn i8080_spellings() {
        assert_eq!(PRIMARY[0x01].mnemonic[1], "lxi");
        assert_eq!(PRIMARY[0x76].mnemonic[1], "hlt");
        assert_eq!(PRIMARY[0x98].mnemonic[1], "sbb");
        assert_eq!(PRIMARY[0xf1].dst_text[1], "psw");
        assert_eq!(PRIMARY[0x18].mnemonic[1], "", "jr has no 8080 spelling");
        assert_eq!(PRIMARY[0xd9].mnemonic[1], "", "exx has no 8080 spelling");
    }

    #[test]
    fn opcode_map_spot_checks() {
        let map = opcode_map();
        assert_eq!(map["nop"].opcode, 0x00);
        assert_eq!(map["ld a,n"].opcode, 0x3e);
        assert_eq!(map["ld (hl),n"].opcode, 0x36);
        assert_eq!(map["jp nz,nn"].opcode, 0xc2);
        assert_eq!(map["call nn"].opcode, 0xcd);
        assert_eq!(map["rst $38"].opcode, 0xff);
        assert_eq!(map["halt"].cycles, 4);
        assert_eq!(map["ld bc,nn"].bytes, 3);
    }
}
