//! CP/M harness for the zexdoc/zexall conformance suites.
//!
//! Memory layout:
//! - 0x0000: warm boot, patched to `halt` so the suite's exit is visible
//! - 0x0005: BDOS entry, patched to `ret`; a breakpoint callback
//!   implements functions 2 (print char in E) and 9 (print `$`-terminated
//!   string at DE)
//! - 0x0100: program load address
//!
//! The suite images are public domain but not vendored; drop
//! `zexdoc.com`/`zexall.com` into `tests/data/` and run with
//! `--ignored`.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use cpu_z80::{Condition, CpuMode, Z80};
use machine_sbc::{SystemBus, MEMORY_MAX};
use sbc_core::Bus;

fn run_zex(image: &[u8]) -> String {
    let mut bus = SystemBus::new();
    bus.add_ram("ram", 0x0000, MEMORY_MAX, None).unwrap();
    bus.load(0x0100, image).unwrap();
    bus.load(0x0000, &[0x76]).unwrap(); // halt on warm boot
    bus.load(0x0005, &[0xc9]).unwrap(); // bdos returns to caller
    bus.load(0x0006, &[0x00, 0xfe]).unwrap(); // top of TPA for stack init

    let output = Rc::new(RefCell::new(String::new()));
    let sink = Rc::clone(&output);

    let mut cpu = Z80::new(CpuMode::Z80);
    cpu.set_pc(0x0100);
    cpu.set_breakpoint(
        0x0005,
        Some(Box::new(move |regs, bus| {
            match regs.c() {
                2 => sink.borrow_mut().push(regs.e() as char),
                9 => {
                    let mut addr = regs.de;
                    loop {
                        let ch = bus.peek(addr).map_err(|e| e.to_string())?;
                        if ch == b'$' {
                            break;
                        }
                        sink.borrow_mut().push(ch as char);
                        addr = addr.wrapping_add(1);
                    }
                }
                other => return Err(format!("unknown bdos function {other}")),
            }
            Ok(())
        })),
    );

    loop {
        match cpu.step(&mut bus) {
            Ok(()) => {}
            Err(Condition::Breakpoint { pc }) => {
                let regs = cpu.regs;
                let hook = cpu.breakpoint_hook(pc).expect("bdos hook");
                hook(regs, &mut bus).expect("bdos call");
            }
            Err(Condition::Halt { .. }) => break,
            Err(err) => panic!("{err}\n{}", cpu.dump_registers()),
        }
    }

    let result = output.borrow().clone();
    eprintln!("{result}");
    result
}

fn zex_path(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data").join(name)
}

#[test]
#[ignore = "requires tests/data/zexdoc.com — run with --ignored"]
fn zexdoc() {
    let image = std::fs::read(zex_path("zexdoc.com")).expect("tests/data/zexdoc.com not found");
    let output = run_zex(&image);
    assert!(!output.contains("ERROR"), "zexdoc reported failures");
}

#[test]
#[ignore = "requires tests/data/zexall.com — run with --ignored"]
fn zexall() {
    let image = std::fs::read(zex_path("zexall.com")).expect("tests/data/zexall.com not found");
    let output = run_zex(&image);
    assert!(!output.contains("ERROR"), "zexall reported failures");
}
