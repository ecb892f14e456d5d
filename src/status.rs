use crate::mapping::Mode;
use crate::types::Point;
use serde::{Serialize, Serializer};

/// Lecturas del bucle principal publicadas tras cada frame procesado
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LiveReadings {
    pub gaze_position: Option<Point>,
    pub head_tilt: Option<f32>,
    pub pending_blink_count: usize,
    pub last_frame_s: Option<f64>,
}

/// Instantánea de solo lectura para mostrar fuera del núcleo
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub mode: Mode,
    pub enabled: bool,
    pub gaze_position: Option<Point>,
    pub head_tilt: Option<f32>,
    pub pending_blink_count: usize,
    pub last_frame_s: Option<f64>,
}

impl Serialize for Mode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl Status {
    /// Línea compacta para logs
    pub fn summary(&self) -> String {
        let gaze = self
            .gaze_position
            .map(|p| format!("({:.2}, {:.2})", p.x, p.y))
            .unwrap_or_else(|| "-".to_string());
        let tilt = self
            .head_tilt
            .map(|t| format!("{:.1}°", t))
            .unwrap_or_else(|| "-".to_string());
        format!(
            "modo={} gestos={} mirada={} inclinación={} parpadeos_pendientes={}",
            self.mode,
            if self.enabled { "on" } else { "off" },
            gaze,
            tilt,
            self.pending_blink_count
        )
    }
}
