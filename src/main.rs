/*
mirada - control por gestos faciales y oculares

El proveedor de landmarks escribe un FeatureFrame JSON por línea en stdin
(`null` cuando no detecta cara). Cada gesto reconocido se traduce, según el
modo activo, en teclas, clicks o movimientos de ratón vía /dev/uinput.

Ejemplo:
    landmarks --json | ./target/release/mirada --profiles perfiles.json

Controles por teclado (--keyboard-controls, necesita acceso a /dev/input):
    1-5  fps / racing / strategy / platformer / adventure
    g    activar/desactivar gestos
    s    mostrar estado
    q    salir

Logs: RUST_LOG=mirada=debug
*/

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{bounded, select, tick, unbounded, Sender};
use std::env;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mirada::config::EngineConfig;
use mirada::controller::Controller;
use mirada::dispatcher::{InputSink, LogSink};
use mirada::frame_source::spawn_jsonl_reader;
use mirada::hid::HidOutput;
use mirada::mapping::{Mode, ModeRegistry};
use mirada::pipeline::GesturePipeline;
use mirada::types::FeatureFrame;

const USAGE: &str = "Uso: mirada [--config <archivo.json>] [--profiles <archivo.json>] \
[--mode <modo>] [--preset <preset>] [--keyboard-controls] [--dry-run]";

const STATUS_INTERVAL: Duration = Duration::from_secs(30);

struct Options {
    config: Option<PathBuf>,
    profiles: Option<PathBuf>,
    mode: Option<String>,
    preset: Option<String>,
    keyboard_controls: bool,
    dry_run: bool,
}

/// Órdenes del control por teclado hacia el bucle principal
#[derive(Debug, Clone)]
enum ControlCommand {
    SetMode(Mode),
    Toggle,
    ShowStatus,
    Quit,
}

fn parse_args() -> Result<Options> {
    let mut opts = Options {
        config: None,
        profiles: None,
        mode: None,
        preset: None,
        keyboard_controls: false,
        dry_run: false,
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => opts.config = Some(next_value(&mut args, "--config")?.into()),
            "--profiles" => opts.profiles = Some(next_value(&mut args, "--profiles")?.into()),
            "--mode" => opts.mode = Some(next_value(&mut args, "--mode")?),
            "--preset" => opts.preset = Some(next_value(&mut args, "--preset")?),
            "--keyboard-controls" => opts.keyboard_controls = true,
            "--dry-run" => opts.dry_run = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other => bail!("Argumento desconocido: {}\n{}", other, USAGE),
        }
    }
    Ok(opts)
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .ok_or_else(|| anyhow!("{} necesita un valor\n{}", flag, USAGE))
}

fn build_sink(dry_run: bool) -> Arc<dyn InputSink> {
    if dry_run {
        info!("Modo simulación: las acciones solo se registran");
        return Arc::new(LogSink);
    }
    match HidOutput::new() {
        Ok(hid) => {
            info!("HID inicializado (/dev/uinput)");
            Arc::new(hid)
        }
        Err(e) => {
            error!("No se pudo inicializar HID: {}. Se usará modo simulación", e);
            Arc::new(LogSink)
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mirada=info")),
        )
        .with_writer(io::stderr)
        .init();

    let opts = parse_args()?;

    let config = match &opts.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("No se pudo cargar la configuración {:?}", path))?,
        None => EngineConfig::default(),
    };
    let registry = match &opts.profiles {
        Some(path) => ModeRegistry::load(path)
            .with_context(|| format!("No se pudieron cargar los perfiles {:?}", path))?,
        None => ModeRegistry::builtin(),
    };

    let initial_mode = opts.mode.as_deref().unwrap_or(config.initial_mode.as_str());
    let controller = Arc::new(Controller::new(registry, initial_mode, config.sensitivity)?);
    if let Some(preset) = &opts.preset {
        controller.apply_preset(preset)?;
    }
    info!(
        "Modos disponibles: {}",
        controller
            .modes()
            .iter()
            .map(Mode::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let sink = build_sink(opts.dry_run);
    let mut pipeline = GesturePipeline::with_sink(&config, Arc::clone(&controller), sink);

    // Frames desde stdin en segundo plano
    let (tx_frames, rx_frames) = bounded::<Option<FeatureFrame>>(100);
    let reader = spawn_jsonl_reader(BufReader::new(io::stdin()), tx_frames);

    // El bucle conserva un emisor para que el canal nunca quede desconectado
    let (tx_control, rx_control) = unbounded::<ControlCommand>();
    if opts.keyboard_controls {
        let tx_keyboard = tx_control.clone();
        std::thread::spawn(move || {
            if let Err(e) = keyboard_controls(tx_keyboard) {
                error!("Control por teclado desactivado: {}", e);
            }
        });
    }

    let status_tick = tick(STATUS_INTERVAL);
    info!("Esperando frames en stdin...");

    loop {
        select! {
            recv(rx_frames) -> msg => {
                match msg {
                    Ok(frame) => {
                        pipeline.process(frame.as_ref());
                    }
                    Err(_) => {
                        info!("Entrada cerrada");
                        break;
                    }
                }
            }
            recv(rx_control) -> msg => {
                let Ok(command) = msg else { continue };
                match command {
                    ControlCommand::SetMode(mode) => {
                        if let Err(e) = controller.set_mode(mode.as_str()) {
                            warn!("{}", e);
                        }
                    }
                    ControlCommand::Toggle => {
                        controller.toggle_gestures();
                    }
                    ControlCommand::ShowStatus => {
                        info!("{}", controller.get_status().summary());
                    }
                    ControlCommand::Quit => {
                        info!("Saliendo...");
                        break;
                    }
                }
            }
            recv(status_tick) -> _ => {
                let dispatch = pipeline.dispatch_stats();
                info!(
                    "{} | acciones: {} ejecutadas, {} fallidas, {} descartadas",
                    controller.get_status().summary(),
                    dispatch.executed,
                    dispatch.failed,
                    dispatch.dropped_full
                );
            }
        }
    }

    drop(tx_control);
    let (frames, dispatch) = pipeline.shutdown();
    info!(
        "Frames: {} procesados, {} omitidos, {} reinicios de reloj | gestos: {} emitidos, {} en cooldown",
        frames.frames_processed,
        frames.frames_skipped,
        frames.clock_resets,
        frames.events_emitted,
        frames.events_debounced
    );
    info!(
        "Acciones: {} encoladas, {} ejecutadas, {} fallidas, {} descartadas por cola llena",
        dispatch.queued, dispatch.executed, dispatch.failed, dispatch.dropped_full
    );

    if reader.is_finished() && reader.join().is_err() {
        error!("El lector de frames terminó con pánico");
    }
    Ok(())
}

/// Busca un teclado en /dev/input
fn find_keyboard() -> Result<evdev::Device> {
    use evdev::Device;
    use std::fs;

    for entry in fs::read_dir("/dev/input")?.flatten() {
        let path = entry.path();
        let is_event = path
            .file_name()
            .map(|name| name.to_string_lossy().starts_with("event"))
            .unwrap_or(false);
        if !is_event {
            continue;
        }
        let Ok(device) = Device::open(&path) else { continue };
        let Some(name) = device.name().map(str::to_lowercase) else { continue };
        if name.contains("keyboard") || name.contains("at translated") {
            info!("Teclado encontrado: {} ({})", name, path.display());
            return Ok(device);
        }
    }
    bail!("No se encontró ningún dispositivo de teclado en /dev/input")
}

/// Traduce teclas globales a órdenes para el bucle principal
fn keyboard_controls(tx: Sender<ControlCommand>) -> Result<()> {
    use evdev::{InputEventKind, Key};

    let mut device = find_keyboard()?;
    info!("Control por teclado: 1-5 modo, g gestos, s estado, q salir");

    let mode_keys = [Key::KEY_1, Key::KEY_2, Key::KEY_3, Key::KEY_4, Key::KEY_5];

    loop {
        for ev in device.fetch_events()? {
            let InputEventKind::Key(key) = ev.kind() else { continue };
            if ev.value() != 1 {
                continue;
            }

            let command = if let Some(idx) = mode_keys.iter().position(|k| *k == key) {
                ControlCommand::SetMode(Mode::BUILTIN[idx].clone())
            } else if key == Key::KEY_G {
                ControlCommand::Toggle
            } else if key == Key::KEY_S {
                ControlCommand::ShowStatus
            } else if key == Key::KEY_Q {
                ControlCommand::Quit
            } else {
                continue;
            };

            let quit = matches!(command, ControlCommand::Quit);
            if tx.send(command).is_err() || quit {
                return Ok(());
            }
        }
    }
}
