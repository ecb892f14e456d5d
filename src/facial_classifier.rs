//! Expresiones faciales: boca abierta, sonrisa y cejas levantadas.
//!
//! Cada expresión mantiene un latch que solo cambia en flancos, así una misma
//! expresión sostenida dispara una sola vez.

use crate::config::{SensitivityConfig, Thresholds};
use crate::types::{FeatureFrame, GestureEvent, GestureKind};
use tracing::debug;

#[derive(Debug)]
pub struct FacialClassifier {
    thresholds: Thresholds,
    mouth_open: bool,
    smiling: bool,
    brow_raised: bool,
}

impl FacialClassifier {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            mouth_open: false,
            smiling: false,
            brow_raised: false,
        }
    }

    pub fn update(
        &mut self,
        frame: &FeatureFrame,
        sensitivity: &SensitivityConfig,
        out: &mut Vec<GestureEvent>,
    ) {
        let now = frame.timestamp_s;
        let mouth = &frame.mouth;

        let height = mouth.height();
        let open = height > self.thresholds.mouth_open_threshold / sensitivity.facial;
        if rising_edge(&mut self.mouth_open, open) {
            debug!("Boca abierta: altura {:.3}", height);
            out.push(GestureEvent::new(GestureKind::MouthOpen, now).with_magnitude(height));
        }

        let width = mouth.width();
        let corners_up = mouth.left.y < mouth.top.y && mouth.right.y < mouth.top.y;
        let smiling = corners_up && width > self.thresholds.smile_width_threshold / sensitivity.facial;
        if rising_edge(&mut self.smiling, smiling) {
            debug!("Sonrisa: anchura {:.3}", width);
            out.push(GestureEvent::new(GestureKind::Smile, now).with_magnitude(width));
        }

        if rising_edge(&mut self.brow_raised, frame.brow_raised) {
            out.push(GestureEvent::new(GestureKind::EyebrowRaise, now));
        }
    }

    pub fn is_mouth_open(&self) -> bool {
        self.mouth_open
    }

    pub fn is_smiling(&self) -> bool {
        self.smiling
    }

    pub fn reset(&mut self) {
        self.mouth_open = false;
        self.smiling = false;
        self.brow_raised = false;
    }
}

/// Actualiza el latch y devuelve true solo en la transición falso→verdadero
fn rising_edge(latch: &mut bool, active: bool) -> bool {
    let fired = active && !*latch;
    *latch = active;
    fired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point;

    fn mouth_frame(t: f64, height: f32, corners_y: f32, brow: bool) -> FeatureFrame {
        let mut frame = FeatureFrame {
            timestamp_s: t,
            brow_raised: brow,
            ..FeatureFrame::default()
        };
        frame.mouth.top = Point::new(0.5, 0.70);
        frame.mouth.bottom = Point::new(0.5, 0.70 + height);
        frame.mouth.left = Point::new(0.46, corners_y);
        frame.mouth.right = Point::new(0.54, corners_y);
        frame
    }

    fn run(frames: &[FeatureFrame]) -> Vec<GestureKind> {
        let mut classifier = FacialClassifier::new(Thresholds::default());
        let mut out = Vec::new();
        for frame in frames {
            classifier.update(frame, &SensitivityConfig::default(), &mut out);
        }
        out.into_iter().map(|e| e.kind).collect()
    }

    #[test]
    fn held_mouth_open_fires_once() {
        let frames: Vec<_> = (0..10).map(|i| mouth_frame(i as f64 * 0.03, 0.05, 0.71, false)).collect();
        assert_eq!(run(&frames), vec![GestureKind::MouthOpen]);
    }

    #[test]
    fn reopening_fires_again() {
        let frames = vec![
            mouth_frame(0.0, 0.05, 0.71, false),
            mouth_frame(0.1, 0.005, 0.71, false),
            mouth_frame(0.2, 0.05, 0.71, false),
        ];
        assert_eq!(run(&frames), vec![GestureKind::MouthOpen, GestureKind::MouthOpen]);
    }

    #[test]
    fn smile_needs_both_corners_up_and_width() {
        // Comisuras por encima del labio superior, boca cerrada
        let frames: Vec<_> = (0..5).map(|i| mouth_frame(i as f64 * 0.03, 0.005, 0.68, false)).collect();
        assert_eq!(run(&frames), vec![GestureKind::Smile]);

        let mut narrow = mouth_frame(0.0, 0.005, 0.68, false);
        narrow.mouth.left.x = 0.49;
        narrow.mouth.right.x = 0.51;
        assert!(run(&[narrow]).is_empty());

        let mut one_corner = mouth_frame(0.0, 0.005, 0.68, false);
        one_corner.mouth.right.y = 0.72;
        assert!(run(&[one_corner]).is_empty());
    }

    #[test]
    fn eyebrow_raise_is_edge_triggered() {
        let frames = vec![
            mouth_frame(0.0, 0.005, 0.71, true),
            mouth_frame(0.1, 0.005, 0.71, true),
            mouth_frame(0.2, 0.005, 0.71, false),
            mouth_frame(0.3, 0.005, 0.71, true),
        ];
        assert_eq!(
            run(&frames),
            vec![GestureKind::EyebrowRaise, GestureKind::EyebrowRaise]
        );
    }

    #[test]
    fn facial_sensitivity_lowers_mouth_threshold() {
        let mut classifier = FacialClassifier::new(Thresholds::default());
        let mut out = Vec::new();
        let frame = mouth_frame(0.0, 0.015, 0.71, false);
        classifier.update(&frame, &SensitivityConfig::default(), &mut out);
        assert!(out.is_empty());
        assert!(!classifier.is_mouth_open());

        let sensitivity = SensitivityConfig {
            facial: 2.0,
            ..SensitivityConfig::default()
        };
        classifier.update(&frame, &sensitivity, &mut out);
        assert_eq!(out.len(), 1);
        assert!(classifier.is_mouth_open());
        assert!(!classifier.is_smiling());
    }
}
