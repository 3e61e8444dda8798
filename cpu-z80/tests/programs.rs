//! Multi-instruction programs: boot sequences, loops, block transfers
//! and the stack/exchange round-trip laws.

use cpu_z80::{Condition, CpuMode, Z80, CF, HF, NF, PF, SF, ZF};
use machine_sbc::{Dummy, SystemBus, MEMORY_MAX};
use sbc_core::Bus;

fn machine() -> (Z80, SystemBus) {
    let mut bus = SystemBus::new();
    bus.add_ram("ram", 0x0000, MEMORY_MAX, None).unwrap();
    (Z80::new(CpuMode::Z80), bus)
}

/// Step until the CPU halts, with a step budget against runaways.
fn run_to_halt(cpu: &mut Z80, bus: &mut SystemBus, max_steps: u32) -> u16 {
    for _ in 0..max_steps {
        match cpu.step(bus) {
            Ok(()) => {}
            Err(Condition::Halt { pc }) => return pc,
            Err(err) => panic!("unexpected condition: {err}"),
        }
    }
    panic!("no halt within {max_steps} steps");
}

#[test]
fn minimal_boot() {
    let (mut cpu, mut bus) = machine();
    // ld sp,$f000; jp $1000
    bus.load(0x0000, &[0x31, 0x00, 0xf0, 0xc3, 0x00, 0x10]).unwrap();
    bus.load(0x1000, &[0x76]).unwrap(); // halt

    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    let halt = cpu.step(&mut bus);

    assert!(matches!(halt, Err(Condition::Halt { pc: 0x1000 })));
    assert_eq!(cpu.regs.sp, 0xf000);
    assert_eq!(cpu.pc(), 0x1000, "halt leaves pc on the instruction");
}

#[test]
fn output_a_character() {
    let (mut cpu, mut bus) = machine();
    bus.attach_device("dummy", 0x01, 1, Box::new(Dummy::new()))
        .unwrap();
    // ld a,$41; out ($01),a; halt
    bus.load(0x0000, &[0x3e, 0x41, 0xd3, 0x01, 0x76]).unwrap();

    let halt_pc = run_to_halt(&mut cpu, &mut bus, 10);

    assert_eq!(halt_pc, 0x0004);
    assert_eq!(bus.io_read(0x01), 0x41);
    assert_eq!(cpu.regs.a(), 0x41);
    assert_eq!(cpu.pc(), 0x0004);
}

#[test]
fn djnz_loop_timing() {
    let (mut cpu, mut bus) = machine();
    // ld b,$03; loop: nop; djnz loop; halt
    bus.load(0x0000, &[0x06, 0x03, 0x00, 0x10, 0xfd, 0x76]).unwrap();

    run_to_halt(&mut cpu, &mut bus, 20);

    assert_eq!(cpu.regs.b(), 0x00);
    // ld b,n + 3x(nop) + 2 taken djnz + 1 fall-through + halt
    assert_eq!(cpu.total_cycles(), 7 + (4 + 13) + (4 + 13) + (4 + 8) + 4);
}

#[test]
fn stack_round_trip() {
    let (mut cpu, mut bus) = machine();
    // push hl; ld hl,$0000; pop hl
    bus.load(0x0000, &[0xe5, 0x21, 0x00, 0x00, 0xe1]).unwrap();
    cpu.regs.sp = 0x2000;
    cpu.regs.hl = 0x1234;

    for _ in 0..3 {
        cpu.step(&mut bus).unwrap();
    }

    assert_eq!(cpu.regs.hl, 0x1234);
    assert_eq!(cpu.regs.sp, 0x2000);
}

#[test]
fn sub_flag_correctness() {
    let (mut cpu, mut bus) = machine();
    bus.load(0x0000, &[0x90]).unwrap(); // sub b
    cpu.regs.af = 0x8000;
    cpu.regs.bc = 0x8000;

    cpu.step(&mut bus).unwrap();

    assert_eq!(cpu.regs.a(), 0x00);
    let f = cpu.regs.f();
    assert_ne!(f & ZF, 0);
    assert_eq!(f & CF, 0);
    assert_ne!(f & PF, 0);
    assert_ne!(f & NF, 0);
    assert_eq!(f & HF, 0);
    assert_eq!(f & SF, 0);
}

#[test]
fn push_pop_af_round_trips_flags() {
    let (mut cpu, mut bus) = machine();
    // push af; pop af, with every flag bit set including X and Y
    bus.load(0x0000, &[0xf5, 0xf1]).unwrap();
    cpu.regs.sp = 0x8000;
    cpu.regs.af = 0x5aff;

    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();

    assert_eq!(cpu.regs.af, 0x5aff);
    assert_eq!(cpu.regs.sp, 0x8000);
}

#[test]
fn exchange_round_trips() {
    let (mut cpu, mut bus) = machine();
    // ex de,hl; ex de,hl; ex af,af'; ex af,af'
    bus.load(0x0000, &[0xeb, 0xeb, 0x08, 0x08]).unwrap();
    cpu.regs.de = 0x1111;
    cpu.regs.hl = 0x2222;
    cpu.regs.af = 0x3333;
    cpu.regs.af_alt = 0x4444;

    for _ in 0..4 {
        cpu.step(&mut bus).unwrap();
    }

    assert_eq!(cpu.regs.de, 0x1111);
    assert_eq!(cpu.regs.hl, 0x2222);
    assert_eq!(cpu.regs.af, 0x3333);
    assert_eq!(cpu.regs.af_alt, 0x4444);
}

/// Drive one repeating block instruction to completion.
fn run_block(cpu: &mut Z80, bus: &mut SystemBus, opcode_addr: u16) {
    loop {
        cpu.step(bus).unwrap();
        if cpu.pc() != opcode_addr {
            break;
        }
    }
}

#[test]
fn ldir_copies_forward() {
    let (mut cpu, mut bus) = machine();
    let pattern: Vec<u8> = (0u8..16).map(|i| i * 3 + 1).collect();
    bus.load(0x4000, &pattern).unwrap();
    bus.load(0x0000, &[0xed, 0xb0]).unwrap();

    cpu.regs.hl = 0x4000;
    cpu.regs.de = 0x5000;
    cpu.regs.bc = pattern.len() as u16;

    run_block(&mut cpu, &mut bus, 0x0000);

    assert_eq!(bus.dump(0x5000, 16), pattern);
    assert_eq!(cpu.regs.bc, 0x0000);
    assert_eq!(cpu.regs.hl, 0x4010);
    assert_eq!(cpu.regs.de, 0x5010);
    assert_eq!(cpu.regs.f() & PF, 0, "P/V clear once BC reaches zero");
    assert_eq!(cpu.pc(), 0x0002);
}

#[test]
fn ldir_then_lddr_restores_memory() {
    let (mut cpu, mut bus) = machine();
    let pattern: Vec<u8> = (0u8..32).map(|i| 0xff - i).collect();
    bus.load(0x4000, &pattern).unwrap();
    bus.load(0x0000, &[0xed, 0xb0]).unwrap(); // ldir
    bus.load(0x0002, &[0xed, 0xb8]).unwrap(); // lddr

    cpu.regs.hl = 0x4000;
    cpu.regs.de = 0x5000;
    cpu.regs.bc = 32;
    run_block(&mut cpu, &mut bus, 0x0000);

    // Copy back from the top, highest address first.
    cpu.regs.hl = 0x501f;
    cpu.regs.de = 0x401f;
    cpu.regs.bc = 32;
    run_block(&mut cpu, &mut bus, 0x0002);

    assert_eq!(bus.dump(0x4000, 32), pattern);
    assert_eq!(bus.dump(0x5000, 32), pattern);
}

#[test]
fn ldir_cycle_accounting() {
    let (mut cpu, mut bus) = machine();
    bus.load(0x4000, &[1, 2, 3]).unwrap();
    bus.load(0x0000, &[0xed, 0xb0]).unwrap();
    cpu.regs.hl = 0x4000;
    cpu.regs.de = 0x5000;
    cpu.regs.bc = 3;

    run_block(&mut cpu, &mut bus, 0x0000);

    // Two repeat iterations plus the terminating one.
    assert_eq!(cpu.total_cycles(), 21 + 21 + 16);
}

#[test]
fn cpir_stops_on_match() {
    let (mut cpu, mut bus) = machine();
    bus.load(0x4000, &[0x10, 0x20, 0x30, 0x40]).unwrap();
    bus.load(0x0000, &[0xed, 0xb1]).unwrap();
    cpu.regs.af = 0x3000;
    cpu.regs.hl = 0x4000;
    cpu.regs.bc = 0x0004;

    run_block(&mut cpu, &mut bus, 0x0000);

    assert_eq!(cpu.regs.hl, 0x4003, "stopped one past the match");
    assert_eq!(cpu.regs.bc, 0x0001);
    let f = cpu.regs.f();
    assert_ne!(f & ZF, 0, "match found");
    assert_ne!(f & PF, 0, "BC still nonzero");
}

#[test]
fn cpdr_exhausts_without_match() {
    let (mut cpu, mut bus) = machine();
    bus.load(0x4000, &[0x10, 0x20, 0x30]).unwrap();
    bus.load(0x0000, &[0xed, 0xb9]).unwrap();
    cpu.regs.af = 0x9900;
    cpu.regs.hl = 0x4002;
    cpu.regs.bc = 0x0003;

    run_block(&mut cpu, &mut bus, 0x0000);

    assert_eq!(cpu.regs.bc, 0x0000);
    assert_eq!(cpu.regs.hl, 0x3fff);
    let f = cpu.regs.f();
    assert_eq!(f & ZF, 0, "no match");
    assert_eq!(f & PF, 0, "BC exhausted");
}

#[test]
fn call_and_ret_nest() {
    let (mut cpu, mut bus) = machine();
    // call $2000; halt ... $2000: ld a,$7f; ret
    bus.load(0x0000, &[0xcd, 0x00, 0x20, 0x76]).unwrap();
    bus.load(0x2000, &[0x3e, 0x7f, 0xc9]).unwrap();
    cpu.regs.sp = 0x8000;

    let halt_pc = run_to_halt(&mut cpu, &mut bus, 10);

    assert_eq!(halt_pc, 0x0003);
    assert_eq!(cpu.regs.a(), 0x7f);
    assert_eq!(cpu.regs.sp, 0x8000);
}

#[test]
fn trace_line_renders() {
    let (mut cpu, mut bus) = machine();
    bus.load(0x0000, &[0x3e, 0x41]).unwrap();

    let d = cpu.disassemble_pc(&bus).unwrap();
    assert_eq!(d.line().trim_end(), "ld    a,$41");
    assert!(d.loud_line().starts_with("3e 41"));

    cpu.step(&mut bus).unwrap();
    let dump = cpu.dump_registers();
    assert!(dump.starts_with("af $41"), "dump: {dump}");
    assert!(dump.contains("pc $0002"));
}
