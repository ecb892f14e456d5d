//! Despacho de acciones sin bloquear el bucle de clasificación.
//!
//! Cada gesto admitido se resuelve contra la tabla del modo activo y se encola
//! en una cola acotada que consumen unos pocos hilos. Si la cola está llena la
//! acción se descarta; los fallos de inyección se registran y se olvidan.

use crate::controller::Controller;
use crate::mapping::{Action, KeySym, Modifier, Mode, MouseButton};
use crate::types::GestureEvent;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum InjectError {
    #[error("uinput error: {0}")]
    Uinput(#[from] uinput::Error),

    #[error("Input rejected: {0}")]
    Rejected(String),

    #[error("Injection panicked")]
    Panicked,
}

/// Tecla a pulsar y soltar: símbolo normal o modificador
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Key(KeySym),
    Modifier(Modifier),
}

/// Colaborador externo que inyecta la entrada en el sistema
pub trait InputSink: Send + Sync {
    fn press_and_release(&self, key: KeyInput) -> Result<(), InjectError>;
    fn click(&self, button: MouseButton) -> Result<(), InjectError>;
    fn move_cursor(&self, dx: i32, dy: i32) -> Result<(), InjectError>;
}

/// Ejecuta una acción con las tres primitivas del sink
pub fn execute(sink: &dyn InputSink, action: Action) -> Result<(), InjectError> {
    match action {
        Action::Key(key) => sink.press_and_release(KeyInput::Key(key)),
        Action::Modifier(m) => sink.press_and_release(KeyInput::Modifier(m)),
        Action::Click(button) => sink.click(button),
        Action::MoveCursor { dx, dy } => sink.move_cursor(dx, dy),
    }
}

/// Sink que solo registra las acciones (modo simulación)
#[derive(Debug, Default)]
pub struct LogSink;

impl InputSink for LogSink {
    fn press_and_release(&self, key: KeyInput) -> Result<(), InjectError> {
        info!("[simulación] tecla {:?}", key);
        Ok(())
    }

    fn click(&self, button: MouseButton) -> Result<(), InjectError> {
        info!("[simulación] click {:?}", button);
        Ok(())
    }

    fn move_cursor(&self, dx: i32, dy: i32) -> Result<(), InjectError> {
        info!("[simulación] cursor ({}, {})", dx, dy);
        Ok(())
    }
}

/// Resultado inmediato de `dispatch` (la ejecución ocurre después)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Queued(Action),
    Disabled,
    Unmapped,
    QueueFull(Action),
}

#[derive(Debug, Default)]
struct DispatchStats {
    queued: AtomicU64,
    executed: AtomicU64,
    failed: AtomicU64,
    dropped_full: AtomicU64,
    suppressed: AtomicU64,
    unmapped: AtomicU64,
}

/// Contadores de despacho para telemetría
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStatsSnapshot {
    pub queued: u64,
    pub executed: u64,
    pub failed: u64,
    pub dropped_full: u64,
    pub suppressed: u64,
    pub unmapped: u64,
}

struct Job {
    event: GestureEvent,
    action: Action,
    mode: Mode,
}

pub struct Dispatcher {
    controller: Arc<Controller>,
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    pub fn new(
        controller: Arc<Controller>,
        sink: Arc<dyn InputSink>,
        workers: usize,
        queue_capacity: usize,
    ) -> Self {
        let (tx, rx) = bounded::<Job>(queue_capacity.max(1));
        let stats = Arc::new(DispatchStats::default());

        let workers = (0..workers.max(1))
            .map(|id| {
                let rx = rx.clone();
                let sink = Arc::clone(&sink);
                let stats = Arc::clone(&stats);
                thread::spawn(move || worker_loop(id, rx, sink, stats))
            })
            .collect();

        Self {
            controller,
            tx: Some(tx),
            workers,
            stats,
        }
    }

    /// Resuelve el gesto con el modo vigente y lo encola sin bloquear
    pub fn dispatch(&self, event: &GestureEvent) -> DispatchOutcome {
        let state = self.controller.snapshot();
        if !state.enabled {
            self.stats.suppressed.fetch_add(1, Ordering::Relaxed);
            return DispatchOutcome::Disabled;
        }

        let Some(action) = state.table.get(event.kind) else {
            self.stats.unmapped.fetch_add(1, Ordering::Relaxed);
            debug!("{} sin acción en modo {}", event.kind, state.mode);
            return DispatchOutcome::Unmapped;
        };

        let Some(tx) = self.tx.as_ref() else {
            return DispatchOutcome::QueueFull(action);
        };

        let job = Job {
            event: *event,
            action,
            mode: state.mode,
        };
        match tx.try_send(job) {
            Ok(()) => {
                self.stats.queued.fetch_add(1, Ordering::Relaxed);
                DispatchOutcome::Queued(action)
            }
            Err(TrySendError::Full(job)) | Err(TrySendError::Disconnected(job)) => {
                self.stats.dropped_full.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Cola de despacho llena: {} -> {} descartado",
                    job.event.kind, job.action
                );
                DispatchOutcome::QueueFull(action)
            }
        }
    }

    pub fn stats(&self) -> DispatchStatsSnapshot {
        let s = &self.stats;
        DispatchStatsSnapshot {
            queued: s.queued.load(Ordering::Relaxed),
            executed: s.executed.load(Ordering::Relaxed),
            failed: s.failed.load(Ordering::Relaxed),
            dropped_full: s.dropped_full.load(Ordering::Relaxed),
            suppressed: s.suppressed.load(Ordering::Relaxed),
            unmapped: s.unmapped.load(Ordering::Relaxed),
        }
    }

    /// Cierra la cola y espera a que los hilos terminen lo pendiente
    pub fn shutdown(mut self) -> DispatchStatsSnapshot {
        self.close();
        self.stats()
    }

    fn close(&mut self) {
        self.tx.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("Hilo de despacho terminó con pánico");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_loop(id: usize, rx: Receiver<Job>, sink: Arc<dyn InputSink>, stats: Arc<DispatchStats>) {
    while let Ok(job) = rx.recv() {
        let result = panic::catch_unwind(AssertUnwindSafe(|| execute(sink.as_ref(), job.action)))
            .unwrap_or(Err(InjectError::Panicked));

        match result {
            Ok(()) => {
                stats.executed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "[hilo {}] {} -> {} ({})",
                    id, job.event.kind, job.action, job.mode
                );
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "[hilo {}] Acción descartada {} -> {}: {}",
                    id, job.event.kind, job.action, e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensitivityConfig;
    use crate::mapping::ModeRegistry;
    use crate::types::GestureKind;
    use crossbeam_channel::{unbounded, Sender as TestSender};
    use std::sync::Mutex;
    use std::time::Duration;

    struct ChannelSink {
        tx: Mutex<TestSender<Action>>,
    }

    impl ChannelSink {
        fn push(&self, action: Action) -> Result<(), InjectError> {
            self.tx
                .lock()
                .unwrap()
                .send(action)
                .map_err(|e| InjectError::Rejected(e.to_string()))
        }
    }

    impl InputSink for ChannelSink {
        fn press_and_release(&self, key: KeyInput) -> Result<(), InjectError> {
            match key {
                KeyInput::Key(k) => self.push(Action::Key(k)),
                KeyInput::Modifier(m) => self.push(Action::Modifier(m)),
            }
        }

        fn click(&self, button: MouseButton) -> Result<(), InjectError> {
            self.push(Action::Click(button))
        }

        fn move_cursor(&self, dx: i32, dy: i32) -> Result<(), InjectError> {
            self.push(Action::MoveCursor { dx, dy })
        }
    }

    struct FailingSink;

    impl InputSink for FailingSink {
        fn press_and_release(&self, _key: KeyInput) -> Result<(), InjectError> {
            Err(InjectError::Rejected("sin dispositivo".to_string()))
        }

        fn click(&self, _button: MouseButton) -> Result<(), InjectError> {
            panic!("driver roto");
        }

        fn move_cursor(&self, _dx: i32, _dy: i32) -> Result<(), InjectError> {
            Ok(())
        }
    }

    fn controller(mode: &str) -> Arc<Controller> {
        Arc::new(Controller::new(ModeRegistry::builtin(), mode, SensitivityConfig::default()).unwrap())
    }

    #[test]
    fn queued_action_reaches_sink() {
        let (tx, rx) = unbounded();
        let sink = Arc::new(ChannelSink { tx: Mutex::new(tx) });
        let dispatcher = Dispatcher::new(controller("fps"), sink, 1, 8);

        let outcome = dispatcher.dispatch(&GestureEvent::new(GestureKind::SingleBlink, 0.0));
        assert_eq!(outcome, DispatchOutcome::Queued(Action::Key(KeySym::Space)));
        let received = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(received, Action::Key(KeySym::Space));

        let stats = dispatcher.shutdown();
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.executed, 1);
    }

    #[test]
    fn disabled_and_unmapped_are_noops() {
        let controller = controller("fps");
        let dispatcher = Dispatcher::new(Arc::clone(&controller), Arc::new(LogSink), 1, 8);

        assert_eq!(
            dispatcher.dispatch(&GestureEvent::new(GestureKind::HeadNodUp, 0.0)),
            DispatchOutcome::Unmapped
        );
        controller.toggle_gestures();
        assert_eq!(
            dispatcher.dispatch(&GestureEvent::new(GestureKind::SingleBlink, 0.0)),
            DispatchOutcome::Disabled
        );

        let stats = dispatcher.shutdown();
        assert_eq!(stats.unmapped, 1);
        assert_eq!(stats.suppressed, 1);
        assert_eq!(stats.queued, 0);
    }

    #[test]
    fn failures_and_panics_are_contained() {
        let dispatcher = Dispatcher::new(controller("strategy"), Arc::new(FailingSink), 1, 8);

        // double_blink -> delete (rechazado), single_blink -> click derecho (pánico)
        dispatcher.dispatch(&GestureEvent::new(GestureKind::DoubleBlink, 0.0));
        dispatcher.dispatch(&GestureEvent::new(GestureKind::SingleBlink, 0.1));
        // gaze_left -> move_cursor, debe seguir funcionando tras el pánico
        dispatcher.dispatch(&GestureEvent::new(GestureKind::GazeLeft, 0.2));

        let stats = dispatcher.shutdown();
        assert_eq!(stats.queued, 3);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.executed, 1);
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        struct SlowSink;
        impl InputSink for SlowSink {
            fn press_and_release(&self, _key: KeyInput) -> Result<(), InjectError> {
                thread::sleep(Duration::from_millis(200));
                Ok(())
            }
            fn click(&self, _button: MouseButton) -> Result<(), InjectError> {
                Ok(())
            }
            fn move_cursor(&self, _dx: i32, _dy: i32) -> Result<(), InjectError> {
                Ok(())
            }
        }

        let dispatcher = Dispatcher::new(controller("fps"), Arc::new(SlowSink), 1, 1);
        let outcomes: Vec<_> = (0..10)
            .map(|i| dispatcher.dispatch(&GestureEvent::new(GestureKind::GazeLeft, i as f64)))
            .collect();
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, DispatchOutcome::QueueFull(_))));

        let stats = dispatcher.shutdown();
        assert_eq!(stats.queued + stats.dropped_full, 10);
        assert_eq!(stats.executed, stats.queued);
    }

    #[test]
    fn execute_maps_actions_to_primitives() {
        let (tx, rx) = unbounded();
        let sink = ChannelSink { tx: Mutex::new(tx) };
        execute(&sink, Action::Modifier(Modifier::Shift)).unwrap();
        execute(&sink, Action::MoveCursor { dx: 3, dy: -4 }).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Action::Modifier(Modifier::Shift));
        assert_eq!(rx.try_recv().unwrap(), Action::MoveCursor { dx: 3, dy: -4 });
    }
}
