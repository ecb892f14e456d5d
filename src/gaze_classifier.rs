//! Dirección de mirada y dwell (mirada sostenida sobre un punto).

use crate::config::{SensitivityConfig, Thresholds};
use crate::gesture_buffer::SampleRing;
use crate::types::{FeatureFrame, GestureEvent, GestureKind, Point, GAZE_HISTORY_SIZE, GAZE_MEAN_WINDOW};
use tracing::debug;

/// Máquina de estados del dwell
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DwellState {
    Idle,
    Dwelling { anchor: Point, since_s: f64 },
}

#[derive(Debug)]
pub struct GazeClassifier {
    thresholds: Thresholds,
    history: SampleRing<Point>,
    dwell: DwellState,
}

impl GazeClassifier {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            history: SampleRing::new(GAZE_HISTORY_SIZE),
            dwell: DwellState::Idle,
        }
    }

    pub fn update(
        &mut self,
        frame: &FeatureFrame,
        sensitivity: &SensitivityConfig,
        out: &mut Vec<GestureEvent>,
    ) {
        let now = frame.timestamp_s;
        let gaze = Self::normalized_center(frame);
        self.history.push(gaze);

        if self.history.has_at_least(GAZE_MEAN_WINDOW) {
            self.detect_direction(now, sensitivity, out);
        }
        self.detect_dwell(gaze, now, sensitivity, out);
    }

    /// Punto medio de los dos centros de ojo, normalizado por el tamaño del frame
    pub fn normalized_center(frame: &FeatureFrame) -> Point {
        let x = (frame.left_eye_center.x + frame.right_eye_center.x) / 2.0;
        let y = (frame.left_eye_center.y + frame.right_eye_center.y) / 2.0;
        Point::new(x / frame.frame_width, y / frame.frame_height)
    }

    /// Última posición de mirada normalizada
    pub fn position(&self) -> Option<Point> {
        self.history.last()
    }

    pub fn dwell_state(&self) -> DwellState {
        self.dwell
    }

    /// Vacía el historial y abandona cualquier dwell en curso
    pub fn reset(&mut self) {
        self.history.clear();
        self.dwell = DwellState::Idle;
    }

    fn detect_direction(&self, now: f64, sensitivity: &SensitivityConfig, out: &mut Vec<GestureEvent>) {
        let (sum_x, sum_y, n) = self
            .history
            .latest(GAZE_MEAN_WINDOW)
            .fold((0.0f32, 0.0f32, 0usize), |(sx, sy, n), p| (sx + p.x, sy + p.y, n + 1));
        let mean_x = sum_x / n as f32;
        let mean_y = sum_y / n as f32;

        // Distancia desde el centro que delimita cada dirección
        let reach = (0.5 - self.thresholds.gaze_boundary) / sensitivity.gaze;
        let low = 0.5 - reach;
        let high = 0.5 + reach;

        if mean_x < low {
            out.push(GestureEvent::new(GestureKind::GazeLeft, now).with_magnitude(low - mean_x));
        } else if mean_x > high {
            out.push(GestureEvent::new(GestureKind::GazeRight, now).with_magnitude(mean_x - high));
        }

        if mean_y < low {
            out.push(GestureEvent::new(GestureKind::GazeUp, now).with_magnitude(low - mean_y));
        } else if mean_y > high {
            out.push(GestureEvent::new(GestureKind::GazeDown, now).with_magnitude(mean_y - high));
        }
    }

    fn detect_dwell(
        &mut self,
        gaze: Point,
        now: f64,
        sensitivity: &SensitivityConfig,
        out: &mut Vec<GestureEvent>,
    ) {
        match self.dwell {
            DwellState::Idle => {
                self.dwell = DwellState::Dwelling {
                    anchor: gaze,
                    since_s: now,
                };
            }
            DwellState::Dwelling { anchor, since_s } => {
                if gaze.distance(anchor) < self.thresholds.dwell_radius {
                    let elapsed = now - since_s;
                    let required = self.thresholds.dwell_seconds * sensitivity.dwell as f64;
                    if elapsed >= required {
                        debug!("Dwell en ({:.2}, {:.2}) tras {:.2}s", anchor.x, anchor.y, elapsed);
                        out.push(GestureEvent::new(GestureKind::Dwell, now).with_magnitude(elapsed as f32));
                        self.dwell = DwellState::Idle;
                    }
                } else {
                    // Se movió: nuevo ancla y reinicio del temporizador
                    self.dwell = DwellState::Dwelling {
                        anchor: gaze,
                        since_s: now,
                    };
                }
            }
        }
    }
}
