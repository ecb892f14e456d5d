//! Configuración del motor: sensibilidad por canal, umbrales de detección y
//! ajustes de rendimiento. Se carga desde un JSON; todo campo ausente toma su
//! valor por defecto.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {value}")]
    Invalid { field: &'static str, value: f64 },
}

/// Canal de sensibilidad calibrable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Gaze,
    Blink,
    Head,
    Dwell,
    Facial,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gaze => "gaze",
            Self::Blink => "blink",
            Self::Head => "head",
            Self::Dwell => "dwell",
            Self::Facial => "facial",
        }
    }
}

impl FromStr for Channel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gaze" => Ok(Self::Gaze),
            "blink" => Ok(Self::Blink),
            "head" => Ok(Self::Head),
            "dwell" => Ok(Self::Dwell),
            "facial" => Ok(Self::Facial),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Multiplicadores de sensibilidad. Un valor mayor facilita el disparo en
/// todos los canales salvo `dwell`, que escala la duración requerida.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitivityConfig {
    pub gaze: f32,
    pub blink: f32,
    pub head: f32,
    pub dwell: f32,
    pub facial: f32,
}

impl Default for SensitivityConfig {
    fn default() -> Self {
        Self {
            gaze: 1.0,
            blink: 1.0,
            head: 1.0,
            dwell: 1.0,
            facial: 1.0,
        }
    }
}

impl SensitivityConfig {
    pub fn get(&self, channel: Channel) -> f32 {
        match channel {
            Channel::Gaze => self.gaze,
            Channel::Blink => self.blink,
            Channel::Head => self.head,
            Channel::Dwell => self.dwell,
            Channel::Facial => self.facial,
        }
    }

    pub fn set(&mut self, channel: Channel, value: f32) {
        match channel {
            Channel::Gaze => self.gaze = value,
            Channel::Blink => self.blink = value,
            Channel::Head => self.head = value,
            Channel::Dwell => self.dwell = value,
            Channel::Facial => self.facial = value,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for channel in [
            Channel::Gaze,
            Channel::Blink,
            Channel::Head,
            Channel::Dwell,
            Channel::Facial,
        ] {
            let value = self.get(channel);
            if !is_valid_multiplier(value) {
                return Err(ConfigError::Invalid {
                    field: channel_field(channel),
                    value: value as f64,
                });
            }
        }
        Ok(())
    }
}

fn channel_field(channel: Channel) -> &'static str {
    match channel {
        Channel::Gaze => "sensitivity.gaze",
        Channel::Blink => "sensitivity.blink",
        Channel::Head => "sensitivity.head",
        Channel::Dwell => "sensitivity.dwell",
        Channel::Facial => "sensitivity.facial",
    }
}

pub fn is_valid_multiplier(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

/// Presets de accesibilidad
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensitivityPreset {
    /// Para usuarios con movilidad limitada
    HighSensitivity,
    /// Para gestos más deliberados
    LowSensitivity,
    BlinkOnly,
    HeadOnly,
}

impl SensitivityPreset {
    pub const ALL: [SensitivityPreset; 4] = [
        SensitivityPreset::HighSensitivity,
        SensitivityPreset::LowSensitivity,
        SensitivityPreset::BlinkOnly,
        SensitivityPreset::HeadOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighSensitivity => "high_sensitivity",
            Self::LowSensitivity => "low_sensitivity",
            Self::BlinkOnly => "blink_only",
            Self::HeadOnly => "head_only",
        }
    }

    // dwell expresado relativo a la duración base de 1.5 s
    pub fn sensitivity(&self) -> SensitivityConfig {
        match self {
            Self::HighSensitivity => SensitivityConfig {
                gaze: 1.5,
                blink: 0.8,
                head: 1.5,
                dwell: 1.0 / 1.5,
                facial: 1.2,
            },
            Self::LowSensitivity => SensitivityConfig {
                gaze: 0.7,
                blink: 1.2,
                head: 0.8,
                dwell: 2.0 / 1.5,
                facial: 0.8,
            },
            Self::BlinkOnly => SensitivityConfig {
                gaze: 0.3,
                blink: 1.5,
                head: 0.2,
                dwell: 3.0 / 1.5,
                facial: 0.5,
            },
            Self::HeadOnly => SensitivityConfig {
                gaze: 0.2,
                blink: 0.5,
                head: 1.8,
                dwell: 2.5 / 1.5,
                facial: 0.3,
            },
        }
    }
}

impl FromStr for SensitivityPreset {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s.trim())
            .ok_or(())
    }
}

/// Umbrales de detección a sensibilidad 1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// EAR medio por debajo del cual el ojo se considera cerrado
    pub blink_ear: f32,
    /// Margen sobre `blink_ear` que debe superar el ojo abierto en un guiño
    pub wink_margin: f32,
    /// Tiempo mínimo entre inicios de parpadeo (s)
    pub blink_refractory_s: f64,
    /// Ventana de retención de parpadeos (s)
    pub blink_window_s: f64,
    /// Separación máxima para doble parpadeo (s)
    pub double_blink_window_s: f64,
    /// Duración base del dwell (s)
    pub dwell_seconds: f64,
    /// Radio normalizado dentro del cual la mirada sigue en dwell
    pub dwell_radius: f32,
    /// Frontera de mirada direccional (izquierda/arriba < b, derecha/abajo > 1-b)
    pub gaze_boundary: f32,
    /// Inclinación mínima de cabeza (grados)
    pub head_tilt_angle: f32,
    pub nod_down_ratio: f32,
    pub nod_up_ratio: f32,
    pub mouth_open_threshold: f32,
    pub smile_width_threshold: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            blink_ear: 0.25,
            wink_margin: 0.1,
            blink_refractory_s: 0.3,
            blink_window_s: 2.0,
            double_blink_window_s: 0.8,
            dwell_seconds: 1.5,
            dwell_radius: 0.1,
            gaze_boundary: 0.3,
            head_tilt_angle: 15.0,
            nod_down_ratio: 0.6,
            nod_up_ratio: 0.4,
            mouth_open_threshold: 0.02,
            smile_width_threshold: 0.05,
        }
    }
}

impl Thresholds {
    fn validate(&self) -> Result<(), ConfigError> {
        let positive: [(&'static str, f64); 10] = [
            ("thresholds.blink_ear", self.blink_ear as f64),
            ("thresholds.blink_refractory_s", self.blink_refractory_s),
            ("thresholds.blink_window_s", self.blink_window_s),
            ("thresholds.double_blink_window_s", self.double_blink_window_s),
            ("thresholds.dwell_seconds", self.dwell_seconds),
            ("thresholds.dwell_radius", self.dwell_radius as f64),
            ("thresholds.gaze_boundary", self.gaze_boundary as f64),
            ("thresholds.head_tilt_angle", self.head_tilt_angle as f64),
            ("thresholds.mouth_open_threshold", self.mouth_open_threshold as f64),
            ("thresholds.smile_width_threshold", self.smile_width_threshold as f64),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid { field, value });
            }
        }
        if !self.wink_margin.is_finite() || self.wink_margin < 0.0 {
            return Err(ConfigError::Invalid {
                field: "thresholds.wink_margin",
                value: self.wink_margin as f64,
            });
        }
        if self.gaze_boundary >= 0.5 {
            return Err(ConfigError::Invalid {
                field: "thresholds.gaze_boundary",
                value: self.gaze_boundary as f64,
            });
        }
        if !(self.nod_up_ratio < self.nod_down_ratio) {
            return Err(ConfigError::Invalid {
                field: "thresholds.nod_up_ratio",
                value: self.nod_up_ratio as f64,
            });
        }
        if self.double_blink_window_s > self.blink_window_s {
            return Err(ConfigError::Invalid {
                field: "thresholds.double_blink_window_s",
                value: self.double_blink_window_s,
            });
        }
        Ok(())
    }
}

/// Ajustes de rendimiento del bucle y del despacho
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Tiempo mínimo entre dos disparos del mismo gesto (s)
    pub gesture_cooldown_s: f64,
    /// FPS máximos procesados
    pub max_fps: f64,
    /// Confianza mínima de cara para procesar un frame
    pub confidence_threshold: f32,
    /// Hilos que ejecutan las acciones de entrada
    pub dispatch_workers: usize,
    /// Capacidad de la cola de acciones pendientes
    pub dispatch_queue: usize,
    /// Frames promediados para la inclinación mostrada en el estado
    pub smoothing_frames: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            gesture_cooldown_s: 0.1,
            max_fps: 30.0,
            confidence_threshold: 0.7,
            dispatch_workers: 2,
            dispatch_queue: 64,
            smoothing_frames: 3,
        }
    }
}

impl PerformanceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.gesture_cooldown_s.is_finite() || self.gesture_cooldown_s < 0.0 {
            return Err(ConfigError::Invalid {
                field: "performance.gesture_cooldown_s",
                value: self.gesture_cooldown_s,
            });
        }
        if !self.max_fps.is_finite() || self.max_fps <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "performance.max_fps",
                value: self.max_fps,
            });
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid {
                field: "performance.confidence_threshold",
                value: self.confidence_threshold as f64,
            });
        }
        if self.dispatch_workers == 0 {
            return Err(ConfigError::Invalid {
                field: "performance.dispatch_workers",
                value: 0.0,
            });
        }
        if self.dispatch_queue == 0 {
            return Err(ConfigError::Invalid {
                field: "performance.dispatch_queue",
                value: 0.0,
            });
        }
        if self.smoothing_frames == 0 {
            return Err(ConfigError::Invalid {
                field: "performance.smoothing_frames",
                value: 0.0,
            });
        }
        Ok(())
    }
}

/// Configuración completa del motor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sensitivity: SensitivityConfig,
    pub thresholds: Thresholds,
    pub performance: PerformanceConfig,
    /// Modo activo al arrancar
    pub initial_mode: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sensitivity: SensitivityConfig::default(),
            thresholds: Thresholds::default(),
            performance: PerformanceConfig::default(),
            initial_mode: "fps".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sensitivity.validate()?;
        self.thresholds.validate()?;
        self.performance.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_thresholds() {
        let config = EngineConfig::default();
        assert_eq!(config.thresholds.blink_ear, 0.25);
        assert_eq!(config.thresholds.double_blink_window_s, 0.8);
        assert_eq!(config.thresholds.head_tilt_angle, 15.0);
        assert_eq!(config.performance.gesture_cooldown_s, 0.1);
        assert_eq!(config.performance.max_fps, 30.0);
        assert_eq!(config.initial_mode, "fps");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(
            r#"{ "sensitivity": { "dwell": 2.0 }, "performance": { "gesture_cooldown_s": 0.25 } }"#,
        )
        .unwrap();
        assert_eq!(config.sensitivity.dwell, 2.0);
        assert_eq!(config.sensitivity.gaze, 1.0);
        assert_eq!(config.performance.gesture_cooldown_s, 0.25);
        assert_eq!(config.thresholds, Thresholds::default());
    }

    #[test]
    fn rejects_non_positive_sensitivity() {
        let err = EngineConfig::from_json(r#"{ "sensitivity": { "head": 0.0 } }"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "sensitivity.head",
                ..
            }
        ));
    }

    #[test]
    fn rejects_inverted_nod_band() {
        let err = EngineConfig::from_json(
            r#"{ "thresholds": { "nod_up_ratio": 0.7, "nod_down_ratio": 0.6 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirada.json");
        fs::write(&path, r#"{ "initial_mode": "racing" }"#).unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.initial_mode, "racing");
    }

    #[test]
    fn channel_and_preset_parsing() {
        assert_eq!("Dwell".parse::<Channel>(), Ok(Channel::Dwell));
        assert!("volume".parse::<Channel>().is_err());
        assert_eq!(
            "blink_only".parse::<SensitivityPreset>(),
            Ok(SensitivityPreset::BlinkOnly)
        );
        let high = SensitivityPreset::HighSensitivity.sensitivity();
        assert!((high.dwell * 1.5 - 1.0).abs() < 1e-6);
    }
}
