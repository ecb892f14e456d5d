//! Bucle principal de clasificación: un frame entra, los cuatro clasificadores
//! proponen gestos, la compuerta anti-rebote filtra y el despachador encola.
//!
//! Todo es síncrono salvo la inyección de entrada, que ocurre en los hilos del
//! despachador. Ningún error de un frame interrumpe el bucle.

use crate::blink_classifier::BlinkClassifier;
use crate::config::EngineConfig;
use crate::controller::Controller;
use crate::cooldown::CooldownGate;
use crate::dispatcher::{DispatchOutcome, DispatchStatsSnapshot, Dispatcher, InputSink};
use crate::facial_classifier::FacialClassifier;
use crate::gaze_classifier::GazeClassifier;
use crate::head_classifier::HeadClassifier;
use crate::status::LiveReadings;
use crate::types::{FeatureFrame, GestureEvent};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Margen para fuentes que entregan exactamente a `max_fps`
const FRAME_INTERVAL_SLACK_S: f64 = 1e-3;

/// Motivo por el que un frame no llega a los clasificadores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoFace,
    Malformed,
    LowConfidence,
    /// Marca de tiempo no posterior al último frame procesado, con un retroceso
    /// menor que `blink_window_s`. Un retroceso mayor reinicia la base de tiempo.
    Stale,
    RateLimited,
}

/// Un gesto que pasó la compuerta y lo que hizo el despachador con él
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dispatched {
    pub event: GestureEvent,
    pub outcome: DispatchOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Skipped(SkipReason),
    Processed(Vec<Dispatched>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub events_emitted: u64,
    pub events_debounced: u64,
    pub clock_resets: u64,
}

pub struct GesturePipeline {
    controller: Arc<Controller>,
    blink: BlinkClassifier,
    gaze: GazeClassifier,
    head: HeadClassifier,
    facial: FacialClassifier,
    gate: CooldownGate,
    dispatcher: Dispatcher,
    min_frame_interval_s: f64,
    confidence_threshold: f32,
    smoothing_frames: usize,
    /// Retroceso de reloj a partir del cual se asume un nuevo origen de tiempo
    clock_reset_s: f64,
    last_processed_s: Option<f64>,
    candidates: Vec<GestureEvent>,
    stats: PipelineStats,
}

impl GesturePipeline {
    pub fn new(config: &EngineConfig, controller: Arc<Controller>, dispatcher: Dispatcher) -> Self {
        let thresholds = config.thresholds;
        let performance = config.performance;
        Self {
            controller,
            blink: BlinkClassifier::new(thresholds),
            gaze: GazeClassifier::new(thresholds),
            head: HeadClassifier::new(thresholds),
            facial: FacialClassifier::new(thresholds),
            gate: CooldownGate::new(performance.gesture_cooldown_s),
            dispatcher,
            min_frame_interval_s: 1.0 / performance.max_fps,
            confidence_threshold: performance.confidence_threshold,
            smoothing_frames: performance.smoothing_frames,
            clock_reset_s: thresholds.blink_window_s,
            last_processed_s: None,
            candidates: Vec::with_capacity(8),
            stats: PipelineStats::default(),
        }
    }

    /// Construye el despachador con los ajustes de rendimiento de `config`
    pub fn with_sink(
        config: &EngineConfig,
        controller: Arc<Controller>,
        sink: Arc<dyn InputSink>,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            Arc::clone(&controller),
            sink,
            config.performance.dispatch_workers,
            config.performance.dispatch_queue,
        );
        Self::new(config, controller, dispatcher)
    }

    /// Procesa un frame; `None` significa que no se detectó cara
    pub fn process(&mut self, frame: Option<&FeatureFrame>) -> FrameOutcome {
        if let (Some(frame), Some(last)) = (frame, self.last_processed_s) {
            if frame.is_well_formed() && last - frame.timestamp_s > self.clock_reset_s {
                warn!(
                    "El reloj de frames retrocedió de {:.3}s a {:.3}s; se reinicia el estado",
                    last, frame.timestamp_s
                );
                self.reset_time_base();
            }
        }

        let frame = match self.admit_frame(frame) {
            Ok(frame) => frame,
            Err(reason) => {
                self.stats.frames_skipped += 1;
                trace!("Frame omitido: {:?}", reason);
                return FrameOutcome::Skipped(reason);
            }
        };
        let now = frame.timestamp_s;
        self.last_processed_s = Some(now);
        self.stats.frames_processed += 1;

        // Una sola lectura del estado por frame: la sensibilidad no cambia a mitad
        let sensitivity = self.controller.snapshot().sensitivity;

        self.candidates.clear();
        self.blink.update(frame, &sensitivity, &mut self.candidates);
        self.gaze.update(frame, &sensitivity, &mut self.candidates);
        self.head.update(frame, &sensitivity, &mut self.candidates);
        self.facial.update(frame, &sensitivity, &mut self.candidates);
        self.stats.events_emitted += self.candidates.len() as u64;

        let mut dispatched = Vec::with_capacity(self.candidates.len());
        for event in self.candidates.drain(..) {
            if !self.gate.admit(&event) {
                self.stats.events_debounced += 1;
                trace!("{} en cooldown", event.kind);
                continue;
            }
            let outcome = self.dispatcher.dispatch(&event);
            debug!("{} @ {:.3}s -> {:?}", event.kind, event.timestamp_s, outcome);
            dispatched.push(Dispatched { event, outcome });
        }

        self.controller.publish_readings(LiveReadings {
            gaze_position: self.gaze.position(),
            head_tilt: self.head.smoothed_tilt(self.smoothing_frames),
            pending_blink_count: self.blink.pending_count(),
            last_frame_s: Some(now),
        });

        FrameOutcome::Processed(dispatched)
    }

    /// Descarta todo el estado que depende de marcas de tiempo anteriores
    fn reset_time_base(&mut self) {
        self.last_processed_s = None;
        self.blink.reset();
        self.gaze.reset();
        self.head.reset();
        self.facial.reset();
        self.gate.reset();
        self.stats.clock_resets += 1;
    }

    fn admit_frame<'a>(&self, frame: Option<&'a FeatureFrame>) -> Result<&'a FeatureFrame, SkipReason> {
        let frame = frame.ok_or(SkipReason::NoFace)?;
        if !frame.is_well_formed() {
            return Err(SkipReason::Malformed);
        }
        if frame.confidence < self.confidence_threshold {
            return Err(SkipReason::LowConfidence);
        }
        if let Some(last) = self.last_processed_s {
            let elapsed = frame.timestamp_s - last;
            if elapsed <= 0.0 {
                return Err(SkipReason::Stale);
            }
            if elapsed + FRAME_INTERVAL_SLACK_S < self.min_frame_interval_s {
                return Err(SkipReason::RateLimited);
            }
        }
        Ok(frame)
    }

    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn dispatch_stats(&self) -> DispatchStatsSnapshot {
        self.dispatcher.stats()
    }

    /// Espera a que terminen las acciones en cola
    pub fn shutdown(self) -> (PipelineStats, DispatchStatsSnapshot) {
        (self.stats, self.dispatcher.shutdown())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::LogSink;
    use crate::mapping::ModeRegistry;
    use crate::types::GestureKind;

    fn pipeline() -> GesturePipeline {
        let config = EngineConfig::default();
        let controller = Arc::new(
            Controller::new(ModeRegistry::builtin(), &config.initial_mode, config.sensitivity).unwrap(),
        );
        GesturePipeline::with_sink(&config, controller, Arc::new(LogSink))
    }

    fn frame_at(t: f64) -> FeatureFrame {
        FeatureFrame {
            timestamp_s: t,
            ..FeatureFrame::default()
        }
    }

    #[test]
    fn absent_and_bad_frames_are_skipped() {
        let mut pipeline = pipeline();
        assert_eq!(pipeline.process(None), FrameOutcome::Skipped(SkipReason::NoFace));

        let mut nan = frame_at(0.0);
        nan.left_ear = f32::NAN;
        assert_eq!(pipeline.process(Some(&nan)), FrameOutcome::Skipped(SkipReason::Malformed));

        let mut zero_width = frame_at(0.0);
        zero_width.frame_width = 0.0;
        assert_eq!(
            pipeline.process(Some(&zero_width)),
            FrameOutcome::Skipped(SkipReason::Malformed)
        );

        let mut blurry = frame_at(0.0);
        blurry.confidence = 0.5;
        assert_eq!(
            pipeline.process(Some(&blurry)),
            FrameOutcome::Skipped(SkipReason::LowConfidence)
        );

        let stats = pipeline.stats();
        assert_eq!(stats.frames_skipped, 4);
        assert_eq!(stats.frames_processed, 0);
        assert_eq!(pipeline.controller().get_status().last_frame_s, None);
    }

    #[test]
    fn frames_faster_than_max_fps_are_skipped() {
        let mut pipeline = pipeline();
        assert!(matches!(pipeline.process(Some(&frame_at(0.0))), FrameOutcome::Processed(_)));
        assert_eq!(
            pipeline.process(Some(&frame_at(0.01))),
            FrameOutcome::Skipped(SkipReason::RateLimited)
        );
        assert_eq!(
            pipeline.process(Some(&frame_at(0.0))),
            FrameOutcome::Skipped(SkipReason::Stale)
        );
        // Exactamente a 30 Hz no se pierde ninguno
        for i in 1..30 {
            let outcome = pipeline.process(Some(&frame_at(i as f64 / 30.0)));
            assert!(matches!(outcome, FrameOutcome::Processed(_)), "frame {}", i);
        }
    }

    #[test]
    fn neutral_face_emits_nothing_and_publishes_readings() {
        let mut pipeline = pipeline();
        for i in 0..10 {
            match pipeline.process(Some(&frame_at(i as f64 / 30.0))) {
                FrameOutcome::Processed(events) => assert!(events.is_empty()),
                other => panic!("inesperado: {:?}", other),
            }
        }
        let status = pipeline.controller().get_status();
        let gaze = status.gaze_position.unwrap();
        assert!((gaze.x - 0.5).abs() < 1e-6);
        assert!(status.head_tilt.unwrap().abs() < 1e-3);
        assert_eq!(status.pending_blink_count, 0);
    }

    #[test]
    fn held_tilt_is_rate_limited_by_gate() {
        let mut pipeline = pipeline();
        let mut dispatched = Vec::new();
        for i in 0..30 {
            let mut frame = frame_at(i as f64 / 30.0);
            frame.head.left_face_edge.y = 0.40;
            frame.head.right_face_edge.y = 0.60;
            if let FrameOutcome::Processed(events) = pipeline.process(Some(&frame)) {
                dispatched.extend(
                    events
                        .into_iter()
                        .filter(|d| d.event.kind == GestureKind::HeadTiltRight),
                );
            }
        }
        assert!(!dispatched.is_empty());
        assert!(dispatched
            .windows(2)
            .all(|w| w[1].event.timestamp_s - w[0].event.timestamp_s >= 0.1));
        assert!(pipeline.stats().events_debounced > 0);
    }

    #[test]
    fn clock_jump_backwards_resets_time_base() {
        let mut pipeline = pipeline();
        assert!(matches!(pipeline.process(Some(&frame_at(1000.0))), FrameOutcome::Processed(_)));
        // Pequeño desorden: se descarta sin reiniciar
        assert_eq!(
            pipeline.process(Some(&frame_at(999.5))),
            FrameOutcome::Skipped(SkipReason::Stale)
        );
        assert_eq!(pipeline.stats().clock_resets, 0);

        // El proveedor reinicia su reloj en cero
        for i in 0..300 {
            let outcome = pipeline.process(Some(&frame_at(i as f64 / 30.0)));
            assert!(matches!(outcome, FrameOutcome::Processed(_)), "frame {}", i);
        }
        let stats = pipeline.stats();
        assert_eq!(stats.clock_resets, 1);
        assert_eq!(stats.frames_processed, 301);
        let last = pipeline.controller().get_status().last_frame_s.unwrap();
        assert!((last - 299.0 / 30.0).abs() < 1e-9);
    }
}
