use serde::{Deserialize, Serialize};
use std::fmt;

/// Punto 2D. Coordenadas normalizadas [0,1] salvo los centros de ojo (píxeles).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Self) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Landmarks de pose de cabeza (normalizados)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadLandmarks {
    pub nose_tip: Point,
    pub left_face_edge: Point,
    pub right_face_edge: Point,
    pub forehead: Point,
    pub chin: Point,
}

/// Landmarks de boca (normalizados)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MouthLandmarks {
    pub top: Point,
    pub bottom: Point,
    pub left: Point,
    pub right: Point,
}

impl MouthLandmarks {
    pub fn height(&self) -> f32 {
        (self.top.y - self.bottom.y).abs()
    }

    pub fn width(&self) -> f32 {
        (self.left.x - self.right.x).abs()
    }
}

/// Una instantánea de geometría facial, producida por el proveedor de landmarks
/// una vez por frame de vídeo procesado.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureFrame {
    /// Segundos desde un origen arbitrario pero monótono
    pub timestamp_s: f64,
    /// Confianza de detección de cara (0.0–1.0)
    #[serde(default = "full_confidence")]
    pub confidence: f32,
    pub frame_width: f32,
    pub frame_height: f32,
    /// Eye Aspect Ratio de cada ojo
    pub left_ear: f32,
    pub right_ear: f32,
    /// Centros de ojo en píxeles del frame
    pub left_eye_center: Point,
    pub right_eye_center: Point,
    pub head: HeadLandmarks,
    pub mouth: MouthLandmarks,
    #[serde(default)]
    pub brow_raised: bool,
}

fn full_confidence() -> f32 {
    1.0
}

impl FeatureFrame {
    /// Un frame es utilizable si todas sus medidas son finitas y el tamaño de
    /// frame es positivo. Los frames inválidos se descartan sin error.
    pub fn is_well_formed(&self) -> bool {
        let head = &self.head;
        let mouth = &self.mouth;
        self.timestamp_s.is_finite()
            && self.confidence.is_finite()
            && self.frame_width > 0.0
            && self.frame_height > 0.0
            && self.left_ear.is_finite()
            && self.right_ear.is_finite()
            && self.left_eye_center.is_finite()
            && self.right_eye_center.is_finite()
            && head.nose_tip.is_finite()
            && head.left_face_edge.is_finite()
            && head.right_face_edge.is_finite()
            && head.forehead.is_finite()
            && head.chin.is_finite()
            && mouth.top.is_finite()
            && mouth.bottom.is_finite()
            && mouth.left.is_finite()
            && mouth.right.is_finite()
    }
}

impl Default for FeatureFrame {
    fn default() -> Self {
        Self {
            timestamp_s: 0.0,
            confidence: 1.0,
            frame_width: DEFAULT_FRAME_WIDTH,
            frame_height: DEFAULT_FRAME_HEIGHT,
            left_ear: 0.3,
            right_ear: 0.3,
            left_eye_center: Point::new(DEFAULT_FRAME_WIDTH / 2.0, DEFAULT_FRAME_HEIGHT / 2.0),
            right_eye_center: Point::new(DEFAULT_FRAME_WIDTH / 2.0, DEFAULT_FRAME_HEIGHT / 2.0),
            head: HeadLandmarks {
                nose_tip: Point::new(0.5, 0.5),
                left_face_edge: Point::new(0.3, 0.5),
                right_face_edge: Point::new(0.7, 0.5),
                forehead: Point::new(0.5, 0.2),
                chin: Point::new(0.5, 0.8),
            },
            mouth: MouthLandmarks {
                top: Point::new(0.5, 0.70),
                bottom: Point::new(0.5, 0.71),
                left: Point::new(0.47, 0.705),
                right: Point::new(0.53, 0.705),
            },
            brow_raised: false,
        }
    }
}

/// Conjunto cerrado de gestos reconocibles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    SingleBlink,
    DoubleBlink,
    LeftWink,
    RightWink,
    GazeLeft,
    GazeRight,
    GazeUp,
    GazeDown,
    Dwell,
    HeadTiltLeft,
    HeadTiltRight,
    HeadNodUp,
    HeadNodDown,
    MouthOpen,
    Smile,
    EyebrowRaise,
}

impl GestureKind {
    pub const COUNT: usize = 16;

    pub const ALL: [GestureKind; Self::COUNT] = [
        GestureKind::SingleBlink,
        GestureKind::DoubleBlink,
        GestureKind::LeftWink,
        GestureKind::RightWink,
        GestureKind::GazeLeft,
        GestureKind::GazeRight,
        GestureKind::GazeUp,
        GestureKind::GazeDown,
        GestureKind::Dwell,
        GestureKind::HeadTiltLeft,
        GestureKind::HeadTiltRight,
        GestureKind::HeadNodUp,
        GestureKind::HeadNodDown,
        GestureKind::MouthOpen,
        GestureKind::Smile,
        GestureKind::EyebrowRaise,
    ];

    /// Índice estable para tablas de tamaño fijo
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleBlink => "single_blink",
            Self::DoubleBlink => "double_blink",
            Self::LeftWink => "left_wink",
            Self::RightWink => "right_wink",
            Self::GazeLeft => "gaze_left",
            Self::GazeRight => "gaze_right",
            Self::GazeUp => "gaze_up",
            Self::GazeDown => "gaze_down",
            Self::Dwell => "dwell",
            Self::HeadTiltLeft => "head_tilt_left",
            Self::HeadTiltRight => "head_tilt_right",
            Self::HeadNodUp => "head_nod_up",
            Self::HeadNodDown => "head_nod_down",
            Self::MouthOpen => "mouth_open",
            Self::Smile => "smile",
            Self::EyebrowRaise => "eyebrow_raise",
        }
    }
}

impl fmt::Display for GestureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evento transitorio emitido por un clasificador
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureEvent {
    pub kind: GestureKind,
    pub timestamp_s: f64,
    /// Magnitud opcional (ángulo, desplazamiento, segundos de dwell...)
    pub magnitude: Option<f32>,
}

impl GestureEvent {
    pub fn new(kind: GestureKind, timestamp_s: f64) -> Self {
        Self {
            kind,
            timestamp_s,
            magnitude: None,
        }
    }

    pub fn with_magnitude(mut self, magnitude: f32) -> Self {
        self.magnitude = Some(magnitude);
        self
    }
}

/// Constantes del sistema
pub const DEFAULT_FRAME_WIDTH: f32 = 640.0;
pub const DEFAULT_FRAME_HEIGHT: f32 = 480.0;
pub const GAZE_HISTORY_SIZE: usize = 10;
pub const GAZE_MEAN_WINDOW: usize = 5;
pub const HEAD_HISTORY_SIZE: usize = 10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gesture_index_matches_all_order() {
        for (i, kind) in GestureKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn gesture_kind_serde_uses_snake_case() {
        let json = serde_json::to_string(&GestureKind::HeadTiltLeft).unwrap();
        assert_eq!(json, "\"head_tilt_left\"");
        let back: GestureKind = serde_json::from_str("\"eyebrow_raise\"").unwrap();
        assert_eq!(back, GestureKind::EyebrowRaise);
        assert_eq!(back.as_str(), "eyebrow_raise");
    }

    #[test]
    fn non_finite_frame_is_malformed() {
        let mut frame = FeatureFrame::default();
        assert!(frame.is_well_formed());
        frame.left_ear = f32::NAN;
        assert!(!frame.is_well_formed());

        let mut frame = FeatureFrame::default();
        frame.frame_width = 0.0;
        assert!(!frame.is_well_formed());
    }
}
