use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    time::Duration,
};

use anyhow::Context;
use clap::Parser;
use ihtr_protocol::DEVICE_DEFAULT_PATH;
use ihtr_session::{
    BtsSession, DeviceChannel, DisplayOrder, LbrSession, NoSymbols, render_bts_trace,
    render_lbr_trace,
};

/// Interactive branch-trace console over the libiht trace device.
///
/// Reads commands from stdin; `help` lists them. Set `RUST_LOG=debug`
/// for control-operation logging.
#[derive(Parser)]
struct Cmdline {
    /// Path of the trace device
    #[arg(short, long, default_value = DEVICE_DEFAULT_PATH)]
    device: PathBuf,
    /// Target process id; defaults to this process
    #[arg(short, long)]
    pid: Option<u32>,
    /// Bound on each control request, in seconds
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,
    /// Print dumped traces newest branch first
    #[arg(long)]
    newest_first: bool,
}

struct Shell {
    lbr: LbrSession<DeviceChannel>,
    bts: BtsSession<DeviceChannel>,
    pid: u32,
    order: DisplayOrder,
}

type Handler = fn(&mut Shell, &str) -> anyhow::Result<()>;

/// One row per user command; no shared behavior beyond invocation, so a
/// plain table instead of command objects.
const COMMANDS: &[(&str, &str, Handler)] = &[
    ("enable_lbr", "start LBR tracing of the target pid", |shell, args| {
        let select = parse_word(args, 0)?;
        shell.lbr.enable(shell.pid, select)?;
        println!("LBR tracing enabled for pid {}", shell.pid);
        Ok(())
    }),
    ("disable_lbr", "stop LBR tracing", |shell, _| {
        shell.lbr.disable()?;
        println!("LBR tracing disabled");
        Ok(())
    }),
    ("dump_lbr", "print the current LBR ring, oldest branch first", |shell, _| {
        let trace = shell.lbr.dump()?;
        render_lbr_trace(&mut io::stdout().lock(), &trace, &mut NoSymbols, shell.order)?;
        Ok(())
    }),
    ("configure_lbr", "set the LBR filter word (hex arg, e.g. 0x1)", |shell, args| {
        let select = parse_word(args, 0)?;
        shell.lbr.configure(select)?;
        println!("LBR filter word set to {select:#x}");
        Ok(())
    }),
    ("enable_bts", "start BTS tracing of the target pid", |shell, args| {
        let control = parse_word(args, 0)?;
        shell.bts.enable(shell.pid, control)?;
        println!("BTS tracing enabled for pid {}", shell.pid);
        Ok(())
    }),
    ("disable_bts", "stop BTS tracing", |shell, _| {
        shell.bts.disable()?;
        println!("BTS tracing disabled");
        Ok(())
    }),
    ("dump_bts", "print the current BTS buffer, oldest branch first", |shell, _| {
        let trace = shell.bts.dump()?;
        render_bts_trace(&mut io::stdout().lock(), &trace, &mut NoSymbols, shell.order)?;
        Ok(())
    }),
    ("configure_bts", "set the BTS control word (hex arg, e.g. 0xc0)", |shell, args| {
        let control = parse_word(args, 0)?;
        shell.bts.configure(control)?;
        println!("BTS control word set to {control:#x}");
        Ok(())
    }),
];

/// Parse an optional numeric word (hex with `0x` prefix, else decimal),
/// defaulting to `fallback` when absent.
fn parse_word(args: &str, fallback: u64) -> anyhow::Result<u64> {
    let word = args.split_whitespace().next();
    let Some(word) = word else {
        return Ok(fallback);
    };
    let parsed = if let Some(hex) = word.strip_prefix("0x") {
        u64::from_str_radix(hex, 16)
    } else {
        word.parse()
    };
    parsed.with_context(|| format!("invalid numeric argument {word:?}"))
}

fn print_help() {
    println!("commands:");
    for (name, describe, _) in COMMANDS {
        println!("  {name:<16} {describe}");
    }
    println!("  {:<16} show this list", "help");
    println!("  {:<16} leave the console", "quit");
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let Cmdline {
        device,
        pid,
        timeout,
        newest_first,
    } = Cmdline::parse();
    let timeout = Duration::from_secs(timeout);
    // Pid 0 also means "this process", matching the device library.
    let pid = match pid {
        None | Some(0) => std::process::id(),
        Some(pid) => pid,
    };
    let order = if newest_first {
        DisplayOrder::NewestFirst
    } else {
        DisplayOrder::OldestFirst
    };

    // One device fd per trace mode, like the reference library.
    let lbr_channel = DeviceChannel::open(&device)
        .with_context(|| format!("failed to open trace device {}", device.display()))?;
    let bts_channel = DeviceChannel::open(&device)
        .with_context(|| format!("failed to open trace device {}", device.display()))?;
    let mut shell = Shell {
        lbr: LbrSession::new(lbr_channel, timeout),
        bts: BtsSession::new(bts_channel, timeout),
        pid,
        order,
    };

    println!("tracing pid {pid}; type `help` for commands");
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("ihtr> ");
        io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        let (name, args) = input.split_once(char::is_whitespace).unwrap_or((input, ""));
        match name {
            "" => {}
            "help" => print_help(),
            "quit" | "exit" => break,
            _ => {
                let Some((_, _, handler)) = COMMANDS.iter().find(|(cmd, ..)| *cmd == name) else {
                    println!("unknown command {name:?}; type `help`");
                    continue;
                };
                // A failed operation reports and returns to the prompt;
                // it never tears the console down.
                if let Err(err) = handler(&mut shell, args) {
                    eprintln!("error: {err:#}");
                }
            }
        }
    }

    // Best-effort teardown of whatever is still enabled.
    if shell.lbr.is_enabled() {
        if let Err(err) = shell.lbr.disable() {
            log::warn!("failed to disable LBR trace on exit: {err}");
        }
    }
    if shell.bts.is_enabled() {
        if let Err(err) = shell.bts.disable() {
            log::warn!("failed to disable BTS trace on exit: {err}");
        }
    }

    Ok(())
}
