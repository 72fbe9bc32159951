// src/main.rs
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crossbeam_channel::{bounded, RecvTimeoutError};
use log::{error, info, warn};

use myostream::config::{Settings, TransportSettings};
use myostream::controller::{CliOperator, ModeController};
use myostream::drivers::{spawn_receiver, Communicator, PacketDecoder, SerialSource, UdpSource};
use myostream::ml::{ExperimentStore, GaussianNb, Trainer};

// 传输层读取超时，决定停止标志的响应速度
const SOURCE_TIMEOUT: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const PACKET_QUEUE: usize = 1024;

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    load: Option<PathBuf>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut parsed = Args::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--load" => {
                    let path = args.next().context("--load needs a trainer.json or experiment directory")?;
                    parsed.load = Some(PathBuf::from(path));
                }
                flag if flag.starts_with("--") => bail!("unknown option {flag}"),
                path if parsed.config.is_none() => parsed.config = Some(PathBuf::from(path)),
                other => bail!("unexpected argument {other}"),
            }
        }
        Ok(parsed)
    }
}

fn build_trainer(settings: &Settings, load: Option<&PathBuf>) -> Result<Trainer<GaussianNb>> {
    let processor = settings.build_processor()?;
    let options = settings.trainer_options()?;
    match load {
        Some(path) => {
            let snapshot = ExperimentStore::load::<GaussianNb>(path)
                .with_context(|| format!("failed to load trainer from {}", path.display()))?;
            Ok(Trainer::from_snapshot(snapshot, processor, options)?)
        }
        None => Ok(Trainer::new(
            settings.window_spec()?,
            processor,
            settings.classifier(),
            options,
        )),
    }
}

fn main() -> Result<()> {
    let args = Args::parse(env::args().skip(1))?;
    let settings = match &args.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(settings.log_level.as_str()))
        .init();
    settings.validate().context("invalid settings")?;

    let trainer = build_trainer(&settings, args.load.as_ref())?;
    let communicator = settings
        .communicator()
        .map(|communicator| Box::new(communicator) as Box<dyn Communicator>);
    let controller = Arc::new(ModeController::new(
        trainer,
        communicator,
        CliOperator::stdio(),
        settings.show_probs,
    ));

    let decoder = PacketDecoder::new(settings.n_channels)?;
    let stop = Arc::new(AtomicBool::new(false));
    let (packet_tx, packet_rx) = bounded(PACKET_QUEUE);
    let receiver = match &settings.transport {
        TransportSettings::Udp => {
            let source = UdpSource::bind(&settings.udp_ip, settings.udp_port, SOURCE_TIMEOUT)
                .context("failed to bind UDP socket")?;
            spawn_receiver(source, packet_tx, Arc::clone(&stop))
        }
        TransportSettings::Serial { port, baud_rate } => {
            let frame_bytes = 8 * settings.n_channels;
            let source = SerialSource::open(port, *baud_rate, frame_bytes, SOURCE_TIMEOUT)
                .with_context(|| format!("failed to open serial source {port}"))?;
            spawn_receiver(source, packet_tx, Arc::clone(&stop))
        }
    };

    controller.start();

    // 输入线程：每行一条命令，EOF 或 quit 结束
    let input = {
        let controller = Arc::clone(&controller);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            loop {
                match controller.operator().read_line() {
                    Ok(Some(line)) => {
                        let command = line.trim();
                        if command.eq_ignore_ascii_case("quit") {
                            break;
                        }
                        if !command.is_empty() {
                            controller.execute_command(command);
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        error!("Failed to read command: {err}");
                        break;
                    }
                }
            }
            stop.store(true, Ordering::Relaxed);
        })
    };

    // 主线程：解码并分发数据
    while !stop.load(Ordering::Relaxed) {
        let packet = match packet_rx.recv_timeout(POLL_INTERVAL) {
            Ok(packet) => packet,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                error!("Receiver stopped; shutting down");
                break;
            }
        };
        let rows = match decoder.decode(&packet) {
            Ok(rows) => rows,
            Err(err) => {
                warn!("Dropping packet: {err}");
                continue;
            }
        };
        if rows.nrows() == 0 {
            continue;
        }
        if let Err(err) = controller.update(rows.view()) {
            warn!("Update failed: {err}");
        }
    }

    stop.store(true, Ordering::Relaxed);
    if receiver.join().is_err() {
        error!("Receiver thread panicked");
    }
    // 输入线程阻塞在 stdin 上时无法 join，随进程退出
    if input.is_finished() && input.join().is_err() {
        error!("Input thread panicked");
    }
    info!("Shutdown complete");
    Ok(())
}
