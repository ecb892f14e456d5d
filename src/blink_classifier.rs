//! Clasificador de patrones de parpadeo: simple, doble y guiños.
//!
//! Un parpadeo se registra en el flanco abierto→cerrado del EAR medio, siempre
//! que haya pasado el periodo refractario desde el anterior. Un frame de guiño
//! nunca cuenta como parpadeo. El parpadeo simple se confirma cuando expira la
//! ventana de doble parpadeo sin un segundo parpadeo, de modo que un doble
//! nunca se reporta además como dos simples. El evento simple lleva la marca
//! de tiempo del parpadeo y, como magnitud, el retraso de la confirmación.

use crate::config::{SensitivityConfig, Thresholds};
use crate::types::{FeatureFrame, GestureEvent, GestureKind};
use tracing::debug;

#[derive(Debug)]
pub struct BlinkClassifier {
    thresholds: Thresholds,
    /// Inicios de parpadeo sin resolver (como máximo dos), estrictamente crecientes
    sequence: Vec<f64>,
    /// Inicio del último parpadeo registrado, para el periodo refractario
    last_blink_start: Option<f64>,
    /// EAR medio por debajo del umbral (sin guiño) en el frame anterior
    eyes_closed: bool,
}

impl BlinkClassifier {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            sequence: Vec::with_capacity(2),
            last_blink_start: None,
            eyes_closed: false,
        }
    }

    /// Procesa un frame y añade a `out` los gestos detectados
    pub fn update(
        &mut self,
        frame: &FeatureFrame,
        sensitivity: &SensitivityConfig,
        out: &mut Vec<GestureEvent>,
    ) {
        let now = frame.timestamp_s;
        let threshold = self.thresholds.blink_ear * sensitivity.blink;

        self.resolve_expired(now, out);

        // Guiños: independientes de la secuencia de parpadeos
        let open_threshold = threshold + self.thresholds.wink_margin;
        let wink = if frame.left_ear < threshold && frame.right_ear > open_threshold {
            Some(GestureKind::LeftWink)
        } else if frame.right_ear < threshold && frame.left_ear > open_threshold {
            Some(GestureKind::RightWink)
        } else {
            None
        };

        let avg_ear = (frame.left_ear + frame.right_ear) / 2.0;
        let closed = wink.is_none() && avg_ear < threshold;
        if closed && !self.eyes_closed && self.refractory_elapsed(now) {
            self.record_blink(now, out);
        }
        self.eyes_closed = closed;

        if let Some(kind) = wink {
            out.push(GestureEvent::new(kind, now));
        }
    }

    /// Parpadeos pendientes de resolver
    pub fn pending_count(&self) -> usize {
        self.sequence.len()
    }

    /// Olvida parpadeos pendientes y el periodo refractario
    pub fn reset(&mut self) {
        self.sequence.clear();
        self.last_blink_start = None;
        self.eyes_closed = false;
    }

    fn refractory_elapsed(&self, now: f64) -> bool {
        match self.last_blink_start {
            Some(last) => now - last > self.thresholds.blink_refractory_s,
            None => true,
        }
    }

    /// Confirma como simple un candidato cuya ventana de doble parpadeo expiró
    fn resolve_expired(&mut self, now: f64, out: &mut Vec<GestureEvent>) {
        if let Some(&first) = self.sequence.first() {
            if now - first >= self.thresholds.double_blink_window_s {
                debug!("Parpadeo simple confirmado ({:.3}s)", first);
                out.push(single_blink(first, now));
                self.sequence.clear();
            }
        }
    }

    fn record_blink(&mut self, now: f64, out: &mut Vec<GestureEvent>) {
        let window = self.thresholds.blink_window_s;
        self.sequence.retain(|&t| now - t < window);
        self.sequence.push(now);
        self.last_blink_start = Some(now);

        if self.sequence.len() < 2 {
            return;
        }

        // Evaluación por parejas sobre los dos más antiguos
        let gap = self.sequence[1] - self.sequence[0];
        if gap < self.thresholds.double_blink_window_s {
            debug!("Doble parpadeo: separación {:.3}s", gap);
            out.push(GestureEvent::new(GestureKind::DoubleBlink, now).with_magnitude(gap as f32));
            self.sequence.clear();
        } else {
            // El más antiguo queda como simple; el reciente pasa a ser candidato
            out.push(single_blink(self.sequence[0], now));
            self.sequence.remove(0);
        }
    }
}

/// Simple fechado en el parpadeo; la magnitud es el retraso de confirmación
fn single_blink(blink_s: f64, resolved_s: f64) -> GestureEvent {
    GestureEvent::new(GestureKind::SingleBlink, blink_s).with_magnitude((resolved_s - blink_s) as f32)
}
