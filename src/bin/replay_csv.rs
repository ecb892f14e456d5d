use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tracing_subscriber::EnvFilter;

use mirada::config::EngineConfig;
use mirada::controller::Controller;
use mirada::dispatcher::{DispatchOutcome, LogSink};
use mirada::frame_source::load_frames_from_csv;
use mirada::mapping::ModeRegistry;
use mirada::pipeline::{FrameOutcome, GesturePipeline, SkipReason};
use mirada::types::GestureKind;

const USAGE: &str = "Uso: replay_csv [--config <archivo.json>] [--profiles <archivo.json>] \
[--mode <modo>] [--status-json] <sesion.csv>";

struct ReplayOptions {
    config: Option<PathBuf>,
    profiles: Option<PathBuf>,
    mode: Option<String>,
    status_json: bool,
}

fn parse_args() -> Result<(PathBuf, ReplayOptions)> {
    let mut opts = ReplayOptions {
        config: None,
        profiles: None,
        mode: None,
        status_json: false,
    };
    let mut csv_path: Option<PathBuf> = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => opts.config = Some(value(&mut args, &arg)?.into()),
            "--profiles" => opts.profiles = Some(value(&mut args, &arg)?.into()),
            "--mode" => opts.mode = Some(value(&mut args, &arg)?),
            "--status-json" => opts.status_json = true,
            _ => {
                if csv_path.is_some() {
                    bail!(USAGE);
                }
                csv_path = Some(PathBuf::from(arg));
            }
        }
    }

    let csv_path = csv_path.ok_or_else(|| anyhow!("Debes especificar un archivo CSV\n{}", USAGE))?;
    Ok((csv_path, opts))
}

fn value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next().ok_or_else(|| anyhow!("{} necesita un valor", flag))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mirada=warn")),
        )
        .init();

    let (csv_path, opts) = parse_args()?;
    println!("Reproduciendo sesión desde {:?}", csv_path);

    let config = match &opts.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("Configuración {:?}", path))?,
        None => EngineConfig::default(),
    };
    let registry = match &opts.profiles {
        Some(path) => ModeRegistry::load(path).with_context(|| format!("Perfiles {:?}", path))?,
        None => ModeRegistry::builtin(),
    };
    let mode = opts.mode.as_deref().unwrap_or(config.initial_mode.as_str());
    let controller = Arc::new(Controller::new(registry, mode, config.sensitivity)?);

    let frames = load_frames_from_csv(&csv_path)?;
    println!("{} frames, modo {}\n", frames.len(), controller.snapshot().mode);

    let mut pipeline = GesturePipeline::with_sink(&config, Arc::clone(&controller), Arc::new(LogSink));
    let mut per_kind: BTreeMap<GestureKind, usize> = BTreeMap::new();
    let mut skipped: BTreeMap<String, usize> = BTreeMap::new();

    for frame in &frames {
        match pipeline.process(frame.as_ref()) {
            FrameOutcome::Skipped(reason) => {
                *skipped.entry(skip_label(reason).to_string()).or_default() += 1;
            }
            FrameOutcome::Processed(dispatched) => {
                for d in dispatched {
                    *per_kind.entry(d.event.kind).or_default() += 1;
                    let action = match d.outcome {
                        DispatchOutcome::Queued(action) => action.to_string(),
                        DispatchOutcome::QueueFull(action) => format!("{} (descartada)", action),
                        DispatchOutcome::Unmapped => "-".to_string(),
                        DispatchOutcome::Disabled => "(deshabilitado)".to_string(),
                    };
                    println!(
                        "  {:>8.3}s  {:<16} {}",
                        d.event.timestamp_s,
                        d.event.kind.as_str(),
                        action
                    );
                }
            }
        }
    }

    let status = controller.get_status();
    let (stats, dispatch) = pipeline.shutdown();

    println!("\nGestos despachados:");
    for (kind, count) in &per_kind {
        println!("  {:<16} {:>4}", kind.as_str(), count);
    }
    println!(
        "\nFrames: {} procesados, {} omitidos {:?}, {} reinicios de reloj",
        stats.frames_processed, stats.frames_skipped, skipped, stats.clock_resets
    );
    println!(
        "Gestos: {} emitidos, {} en cooldown | acciones: {} ejecutadas, {} fallidas",
        stats.events_emitted, stats.events_debounced, dispatch.executed, dispatch.failed
    );

    if opts.status_json {
        println!("\n{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("\n{}", status.summary());
    }

    Ok(())
}

fn skip_label(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::NoFace => "sin_cara",
        SkipReason::Malformed => "invalido",
        SkipReason::LowConfidence => "baja_confianza",
        SkipReason::Stale => "desordenado",
        SkipReason::RateLimited => "limite_fps",
    }
}
