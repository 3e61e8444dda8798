//! Batch launcher for the Z80 single-board computer.
//!
//! Declares memory regions and devices from the command line, loads
//! images, then drives the CPU until it halts, faults or a device
//! requests shutdown. Keyboard input reaches the serial console through
//! a reader thread; console output goes to stdout.

use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use cpu_z80::{Condition, CpuMode, Z80};
use machine_sbc::{ConsoleInput, DeviceDecl, DeviceKind, SystemBus};

// ---------------------------------------------------------------------------
// CLI argument parsing
// ---------------------------------------------------------------------------

struct CliArgs {
    devices: Vec<DeviceDecl>,
    loads: Vec<(u16, PathBuf)>,
    trace: bool,
    log_path: Option<PathBuf>,
}

fn usage() {
    eprintln!(
        "usage: sbc [-trace] [-log=FILE] device={{rom|ram|console|dummy}},ORIGIN-SIZE[,IMAGE] \
         [load=ORIGIN,IMAGE]..."
    );
    eprintln!("example: sbc device=rom,0x0000-0x1000,boot.rom device=ram,$1000-$f000 device=console,2-2");
    eprintln!("numbers take $ or 0x prefixes for hex");
}

/// Accept `$` as an oldskool alias for `0x`.
fn parse_number(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (digits, radix) = if let Some(hex) = s.strip_prefix('$') {
        (hex, 16)
    } else if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else {
        (s, 10)
    };
    u64::from_str_radix(digits, radix).map_err(|e| format!("invalid number {s}: {e}"))
}

/// `ORIGIN-SIZE`, both numeric.
fn parse_span(s: &str) -> Result<(u16, usize), String> {
    let (origin, size) = s
        .split_once('-')
        .ok_or_else(|| format!("expected origin-size: {s}"))?;
    let origin = parse_number(origin)?;
    let size = parse_number(size)?;
    if origin > 0xffff {
        return Err(format!("origin out of range: {s}"));
    }
    Ok((origin as u16, size as usize))
}

fn parse_device(spec: &str) -> Result<DeviceDecl, String> {
    let fields: Vec<&str> = spec.split(',').collect();
    if fields.len() < 2 || fields.len() > 3 {
        return Err(format!("expected kind,origin-size[,image]: {spec}"));
    }

    let kind = match fields[0] {
        "rom" => DeviceKind::Rom,
        "ram" => DeviceKind::Ram,
        "console" => DeviceKind::Console,
        "dummy" => DeviceKind::Dummy,
        other => return Err(format!("invalid device type: {other}")),
    };
    let (start, size) = parse_span(fields[1])?;

    let image = if let Some(path) = fields.get(2) {
        Some(fs::read(path).map_err(|e| format!("{path}: {e}"))?)
    } else {
        if kind == DeviceKind::Rom {
            eprintln!("warning: rom @ {start:#06x} does not have an image");
        }
        None
    };

    Ok(DeviceDecl {
        name: fields[0].to_string(),
        start,
        size,
        kind,
        image,
    })
}

fn parse_args() -> Result<CliArgs, String> {
    let mut cli = CliArgs {
        devices: Vec::new(),
        loads: Vec::new(),
        trace: false,
        log_path: None,
    };

    for arg in std::env::args().skip(1) {
        if arg == "-trace" {
            cli.trace = true;
            continue;
        }
        if let Some(path) = arg.strip_prefix("-log=") {
            cli.log_path = Some(PathBuf::from(path));
            continue;
        }

        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| format!("expected key=value: {arg}"))?;
        match key {
            "device" => cli.devices.push(parse_device(value)?),
            "load" => {
                let (origin, path) = value
                    .split_once(',')
                    .ok_or_else(|| format!("expected load=origin,image: {value}"))?;
                let origin = parse_number(origin)?;
                if origin > 0xffff {
                    return Err(format!("load origin out of range: {value}"));
                }
                cli.loads.push((origin as u16, PathBuf::from(path)));
            }
            other => return Err(format!("invalid argument: {other}")),
        }
    }

    Ok(cli)
}

// ---------------------------------------------------------------------------
// Console front-end
// ---------------------------------------------------------------------------

/// Feed stdin bytes to the console until EOF, then request shutdown.
fn spawn_stdin_reader(mut input: ConsoleInput) {
    thread::spawn(move || {
        for byte in std::io::stdin().lock().bytes() {
            let Ok(byte) = byte else {
                break;
            };
            // Single-slot handoff: wait for the CPU to drain the
            // previous byte.
            while !input.push(byte) {
                thread::sleep(Duration::from_millis(1));
            }
        }
        input.request_shutdown("console: stdin closed");
    });
}

// ---------------------------------------------------------------------------
// Main loop
// ---------------------------------------------------------------------------

fn run() -> Result<(), String> {
    let cli = parse_args()?;
    if cli.devices.is_empty() {
        usage();
        return Ok(());
    }

    let mut log: Box<dyn Write> = match &cli.log_path {
        Some(path) => Box::new(fs::File::create(path).map_err(|e| format!("{}: {e}", path.display()))?),
        None => Box::new(std::io::stderr()),
    };

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<String>();
    let (mut bus, console_inputs) =
        SystemBus::from_decls(&cli.devices, &shutdown_tx).map_err(|e| e.to_string())?;

    for (origin, path) in &cli.loads {
        let image = fs::read(path).map_err(|e| format!("{}: {e}", path.display()))?;
        bus.load(*origin, &image).map_err(|e| e.to_string())?;
    }

    for input in console_inputs {
        spawn_stdin_reader(input);
    }

    let mut cpu = Z80::new(CpuMode::Z80);

    loop {
        if let Ok(reason) = shutdown_rx.try_recv() {
            eprintln!("shutdown requested: {reason}");
            bus.shutdown();
            return Ok(());
        }

        let prefix = if cli.trace {
            match cpu.disassemble_pc(&bus) {
                Ok(d) => Some(format!("{:04x}: {}", cpu.pc(), d.loud_line())),
                Err(fault) => return Err(fault.to_string()),
            }
        } else {
            None
        };

        let result = cpu.step(&mut bus);

        if let Some(prefix) = prefix {
            writeln!(log, "{:<55}{}", prefix, cpu.dump_registers())
                .map_err(|e| e.to_string())?;
        }

        match result {
            Ok(()) => {}
            Err(Condition::Halt { .. }) => {
                eprintln!("CPU halted");
                eprintln!("{}", cpu.dump_registers());
                bus.shutdown();
                return Ok(());
            }
            Err(Condition::Breakpoint { pc }) => {
                // The batch runner sets no breakpoints itself; honor any
                // hook and continue.
                let regs = cpu.regs;
                if let Some(hook) = cpu.breakpoint_hook(pc) {
                    hook(regs, &mut bus)?;
                }
            }
            Err(err) => {
                bus.shutdown();
                return Err(format!("CPU error: {err}"));
            }
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        process::exit(1);
    }
}
