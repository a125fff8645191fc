// src/main.rs
mod args;
#[cfg(feature = "hardware")]
mod board;
mod config;
mod drivers;
mod engine;
mod recorder;
mod telemetry;
mod types;

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};

use crate::args::BandArgs;
use crate::config::Config;
use crate::drivers::{AcquisitionBoard, SimulatedBoard};
use crate::engine::{RunSummary, Session};
use crate::recorder::PowerRecorder;
use crate::telemetry::{Dispatcher, PlotSink, SnapshotSink, TelemetrySink, UdpSink};
use crate::types::SourceKind;

// 按配置组装输出端；单个输出端失败只记日志
fn build_sinks(config: &Config) -> Vec<Box<dyn TelemetrySink>> {
    let telemetry = &config.telemetry;
    let mut sinks: Vec<Box<dyn TelemetrySink>> = Vec::new();
    if let Some(target) = &telemetry.udp_target {
        match UdpSink::connect(target) {
            Ok(sink) => {
                info!("UDP telemetry to {}", sink.target());
                sinks.push(Box::new(sink));
            }
            Err(e) => warn!("UDP telemetry disabled: {e}"),
        }
    }
    if let Some(path) = &telemetry.snapshot_path {
        info!("snapshot file {}", path.display());
        sinks.push(Box::new(SnapshotSink::new(path)));
    }
    if let Some(path) = &telemetry.history_path {
        match PowerRecorder::create(path) {
            Ok(recorder) => sinks.push(Box::new(recorder)),
            Err(e) => warn!("power history disabled: {e}"),
        }
    }
    if let Some(dir) = &telemetry.plot_dir {
        match PlotSink::create(dir) {
            Ok(sink) => sinks.push(Box::new(sink)),
            Err(e) => warn!("plots disabled: {e}"),
        }
    }
    sinks
}

fn open_board(config: &Config) -> Result<Box<dyn AcquisitionBoard>> {
    let acq = &config.acquisition;
    match acq.source {
        SourceKind::Simulated => Ok(Box::new(SimulatedBoard::new(
            acq.devices,
            acq.sample_rate_hz,
            acq.simulation.clone(),
        ))),
        #[cfg(feature = "hardware")]
        SourceKind::Hardware => {
            let board = board::PiEegBoard::connect(acq).context("failed to bring up the PiEEG")?;
            Ok(Box::new(board))
        }
        #[cfg(not(feature = "hardware"))]
        SourceKind::Hardware => {
            anyhow::bail!("hardware support not compiled in; rebuild with --features hardware")
        }
    }
}

fn run(args: BandArgs) -> Result<RunSummary> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?,
        None => Config::default(),
    };
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;
    if args.print_config {
        println!("{}", config.to_json()?);
        return Ok(RunSummary::default());
    }

    let stop = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&stop);
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::Relaxed))
        .context("failed to install the Ctrl-C handler")?;

    let board = open_board(&config)?;
    let dispatcher = Dispatcher::spawn(build_sinks(&config))?;
    let mut session = Session::new(board, &config, Some(dispatcher))?;
    let outcome = session.run(&stop, args.cycles);
    // 无论成功与否都先收尾输出线程
    let summary = session.finish();
    outcome.context("acquisition aborted")?;
    Ok(summary)
}

// 入口函数
fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = BandArgs::parse();
    match run(args) {
        Ok(summary) => {
            info!(
                "stopped: {} ticks, {} skipped, {} cycles, {} dropped reports, {} sink failures",
                summary.ticks, summary.skipped, summary.cycles, summary.dropped, summary.sink_failures
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
