use std::{io, path::PathBuf, time::Duration};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use ihtr_protocol::DEVICE_DEFAULT_PATH;
use ihtr_session::{
    BtsSession, DeviceChannel, DisplayOrder, LbrSession, NoSymbols, render_bts_trace,
    render_lbr_trace,
};

/// Trace this process through a branchy work loop and print the result.
#[derive(Parser)]
struct Cmdline {
    /// Path of the trace device
    #[arg(short, long, default_value = DEVICE_DEFAULT_PATH)]
    device: PathBuf,
    /// Trace mode to exercise
    #[arg(short, long, value_enum, default_value_t = Mode::Lbr)]
    mode: Mode,
    /// Work loop iterations between enable and dump
    #[arg(short, long, default_value_t = 100_000)]
    iters: u64,
    /// Bound on each control request, in seconds
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,
}

#[derive(ValueEnum, Clone, Copy)]
enum Mode {
    Lbr,
    Bts,
    Both,
}

/// A loop with data-dependent branches for the hardware to record.
#[inline(never)]
fn work_loop(iters: u64) -> u64 {
    let mut res = 0u64;
    for i in 0..iters {
        if i % 3 == 0 {
            res = res.wrapping_add(i);
        } else {
            res = res.wrapping_mul(3).wrapping_add(1);
        }
    }
    std::hint::black_box(res)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let Cmdline {
        device,
        mode,
        iters,
        timeout,
    } = Cmdline::parse();
    let timeout = Duration::from_secs(timeout);
    let pid = std::process::id();
    let mut out = io::stdout().lock();

    if matches!(mode, Mode::Lbr | Mode::Both) {
        let channel = DeviceChannel::open(&device)
            .with_context(|| format!("failed to open trace device {}", device.display()))?;
        let mut session = LbrSession::new(channel, timeout);
        session.enable(pid, 0).context("failed to enable LBR")?;
        work_loop(iters);
        let trace = session.dump().context("failed to dump LBR")?;
        render_lbr_trace(&mut out, &trace, &mut NoSymbols, DisplayOrder::OldestFirst)?;
        session.disable().context("failed to disable LBR")?;
    }

    if matches!(mode, Mode::Bts | Mode::Both) {
        let channel = DeviceChannel::open(&device)
            .with_context(|| format!("failed to open trace device {}", device.display()))?;
        let mut session = BtsSession::new(channel, timeout);
        session.enable(pid, 0).context("failed to enable BTS")?;
        work_loop(iters);
        let trace = session.dump().context("failed to dump BTS")?;
        render_bts_trace(&mut out, &trace, &mut NoSymbols, DisplayOrder::OldestFirst)?;
        session.disable().context("failed to disable BTS")?;
    }

    Ok(())
}
