//! Inclinación lateral (roll) y cabeceo (pitch aproximado) de la cabeza.
//!
//! Disparo por nivel: cada frame que supera el umbral emite el gesto; la única
//! limitación de frecuencia la aplica el `CooldownGate`.

use crate::config::{SensitivityConfig, Thresholds};
use crate::gesture_buffer::SampleRing;
use crate::types::{FeatureFrame, GestureEvent, GestureKind, HeadLandmarks, HEAD_HISTORY_SIZE};

/// Pose estimada en un frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeadPose {
    /// Grados; positivo = inclinación a la derecha
    pub tilt_deg: f32,
    /// Posición relativa de la nariz entre frente (0) y barbilla (1)
    pub nod_ratio: f32,
}

#[derive(Debug)]
pub struct HeadClassifier {
    thresholds: Thresholds,
    history: SampleRing<HeadPose>,
}

impl HeadClassifier {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            history: SampleRing::new(HEAD_HISTORY_SIZE),
        }
    }

    pub fn update(
        &mut self,
        frame: &FeatureFrame,
        sensitivity: &SensitivityConfig,
        out: &mut Vec<GestureEvent>,
    ) {
        let Some(pose) = estimate_pose(&frame.head, frame.frame_width, frame.frame_height) else {
            return;
        };
        self.history.push(pose);
        let now = frame.timestamp_s;

        let tilt_limit = self.thresholds.head_tilt_angle / sensitivity.head;
        if pose.tilt_deg > tilt_limit {
            out.push(GestureEvent::new(GestureKind::HeadTiltRight, now).with_magnitude(pose.tilt_deg));
        } else if pose.tilt_deg < -tilt_limit {
            out.push(GestureEvent::new(GestureKind::HeadTiltLeft, now).with_magnitude(pose.tilt_deg));
        }

        // Banda neutra centrada entre los umbrales, estrechada por la sensibilidad
        let centre = (self.thresholds.nod_down_ratio + self.thresholds.nod_up_ratio) / 2.0;
        let half_band = (self.thresholds.nod_down_ratio - self.thresholds.nod_up_ratio) / 2.0 / sensitivity.head;
        if pose.nod_ratio > centre + half_band {
            out.push(GestureEvent::new(GestureKind::HeadNodDown, now).with_magnitude(pose.nod_ratio));
        } else if pose.nod_ratio < centre - half_band {
            out.push(GestureEvent::new(GestureKind::HeadNodUp, now).with_magnitude(pose.nod_ratio));
        }
    }

    /// Última pose calculada
    pub fn pose(&self) -> Option<HeadPose> {
        self.history.last()
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Media de la inclinación sobre las últimas `n` poses
    pub fn smoothed_tilt(&self, n: usize) -> Option<f32> {
        let (sum, count) = self
            .history
            .latest(n)
            .fold((0.0f32, 0usize), |(s, c), p| (s + p.tilt_deg, c + 1));
        (count > 0).then(|| sum / count as f32)
    }
}

/// Calcula la pose a partir de landmarks normalizados. `None` si la geometría
/// es degenerada (frente y barbilla a la misma altura).
pub fn estimate_pose(head: &HeadLandmarks, frame_width: f32, frame_height: f32) -> Option<HeadPose> {
    let dy = (head.right_face_edge.y - head.left_face_edge.y) * frame_height;
    let dx = (head.right_face_edge.x - head.left_face_edge.x) * frame_width;
    let tilt_deg = dy.atan2(dx).to_degrees();

    let span = head.chin.y - head.forehead.y;
    if span.abs() < 1e-6 {
        return None;
    }
    let nod_ratio = (head.nose_tip.y - head.forehead.y) / span;

    Some(HeadPose { tilt_deg, nod_ratio })
}
