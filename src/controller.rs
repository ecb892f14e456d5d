//! Estado compartido del controlador: modo activo con su tabla, habilitación
//! global y sensibilidad. Es el único estado que comparten el bucle de
//! clasificación y los hilos de despacho; se lee mucho más de lo que se
//! escribe, así que vive detrás de un `RwLock` que nunca se mantiene durante
//! una inyección de entrada.

use crate::config::{is_valid_multiplier, Channel, SensitivityConfig, SensitivityPreset};
use crate::mapping::{MappingTable, Mode, ModeRegistry};
use crate::status::{LiveReadings, Status};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    #[error("Unknown mode: {0}")]
    UnknownMode(String),

    #[error("Unknown calibration channel: {0}")]
    UnknownChannel(String),

    #[error("Invalid sensitivity for {channel}: {value}")]
    InvalidSensitivity { channel: Channel, value: f32 },

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),
}

/// Unidad consistente leída por el bucle y el despachador. El modo y su tabla
/// se cambian juntos bajo el mismo lock.
#[derive(Debug, Clone)]
pub struct ControllerState {
    pub mode: Mode,
    pub table: Arc<MappingTable>,
    pub enabled: bool,
    pub sensitivity: SensitivityConfig,
}

pub struct Controller {
    registry: ModeRegistry,
    state: RwLock<ControllerState>,
    readings: Mutex<LiveReadings>,
}

impl Controller {
    pub fn new(
        registry: ModeRegistry,
        initial_mode: &str,
        sensitivity: SensitivityConfig,
    ) -> Result<Self, ControlError> {
        let (mode, table) = resolve_mode(&registry, initial_mode)?;
        info!("Controlador inicializado en modo {}", mode);
        Ok(Self {
            registry,
            state: RwLock::new(ControllerState {
                mode,
                table,
                enabled: true,
                sensitivity,
            }),
            readings: Mutex::new(LiveReadings::default()),
        })
    }

    /// Copia consistente del estado actual
    pub fn snapshot(&self) -> ControllerState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cambia de modo de forma atómica. Un modo desconocido no altera nada.
    pub fn set_mode(&self, name: &str) -> Result<Mode, ControlError> {
        let (mode, table) = resolve_mode(&self.registry, name).map_err(|e| {
            warn!("Modo rechazado: {}", name);
            e
        })?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.mode != mode {
            info!("Modo {} -> {}", state.mode, mode);
        }
        state.mode = mode.clone();
        state.table = table;
        Ok(mode)
    }

    /// Alterna la habilitación global y devuelve el nuevo estado
    pub fn toggle_gestures(&self) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.enabled = !state.enabled;
        info!(
            "Gestos {}",
            if state.enabled { "habilitados" } else { "deshabilitados" }
        );
        state.enabled
    }

    /// Ajusta la sensibilidad de un canal
    pub fn calibrate(&self, channel: &str, value: f32) -> Result<(), ControlError> {
        let channel: Channel = channel
            .parse()
            .map_err(|_| ControlError::UnknownChannel(channel.to_string()))?;
        if !is_valid_multiplier(value) {
            return Err(ControlError::InvalidSensitivity { channel, value });
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.sensitivity.set(channel, value);
        info!("Sensibilidad {} = {}", channel, value);
        Ok(())
    }

    /// Sustituye toda la sensibilidad por un preset de accesibilidad
    pub fn apply_preset(&self, name: &str) -> Result<SensitivityConfig, ControlError> {
        let preset: SensitivityPreset = name
            .parse()
            .map_err(|_| ControlError::UnknownPreset(name.to_string()))?;
        let sensitivity = preset.sensitivity();

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.sensitivity = sensitivity;
        info!("Preset {} aplicado", preset.as_str());
        Ok(sensitivity)
    }

    pub fn modes(&self) -> Vec<Mode> {
        self.registry.modes()
    }

    /// Publicado por el bucle principal tras cada frame
    pub fn publish_readings(&self, readings: LiveReadings) {
        *self.readings.lock().unwrap_or_else(PoisonError::into_inner) = readings;
    }

    pub fn get_status(&self) -> Status {
        let state = self.snapshot();
        let readings = *self.readings.lock().unwrap_or_else(PoisonError::into_inner);
        Status {
            mode: state.mode,
            enabled: state.enabled,
            gaze_position: readings.gaze_position,
            head_tilt: readings.head_tilt,
            pending_blink_count: readings.pending_blink_count,
            last_frame_s: readings.last_frame_s,
        }
    }
}

fn resolve_mode(registry: &ModeRegistry, name: &str) -> Result<(Mode, Arc<MappingTable>), ControlError> {
    let mode: Mode = name
        .parse()
        .map_err(|_| ControlError::UnknownMode(name.to_string()))?;
    let table = registry
        .get(&mode)
        .ok_or_else(|| ControlError::UnknownMode(name.to_string()))?;
    Ok((mode, table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GestureKind, Point};

    fn controller() -> Controller {
        Controller::new(ModeRegistry::builtin(), "fps", SensitivityConfig::default()).unwrap()
    }

    #[test]
    fn unknown_initial_mode_fails() {
        let err = Controller::new(ModeRegistry::builtin(), "kart", SensitivityConfig::default())
            .err()
            .unwrap();
        assert_eq!(err, ControlError::UnknownMode("kart".to_string()));
    }

    #[test]
    fn set_mode_swaps_table() {
        let controller = controller();
        assert_eq!(controller.set_mode("racing"), Ok(Mode::Racing));
        let state = controller.snapshot();
        assert_eq!(state.mode, Mode::Racing);
        let racing = ModeRegistry::builtin().get(&Mode::Racing).unwrap();
        assert_eq!(*state.table, *racing);
    }

    #[test]
    fn unknown_mode_keeps_current() {
        let controller = controller();
        let before = controller.snapshot();
        assert_eq!(
            controller.set_mode("moba"),
            Err(ControlError::UnknownMode("moba".to_string()))
        );
        assert_eq!(controller.set_mode(""), Err(ControlError::UnknownMode(String::new())));
        let after = controller.snapshot();
        assert_eq!(after.mode, Mode::Fps);
        assert!(Arc::ptr_eq(&before.table, &after.table));
    }

    #[test]
    fn set_mode_is_idempotent() {
        let controller = controller();
        controller.set_mode("strategy").unwrap();
        let once = controller.snapshot();
        controller.set_mode("strategy").unwrap();
        let twice = controller.snapshot();
        assert_eq!(once.mode, twice.mode);
        assert!(Arc::ptr_eq(&once.table, &twice.table));
        assert_eq!(once.enabled, twice.enabled);
        assert_eq!(once.sensitivity, twice.sensitivity);
    }

    #[test]
    fn toggle_flips_enabled() {
        let controller = controller();
        assert!(!controller.toggle_gestures());
        assert!(!controller.snapshot().enabled);
        assert!(controller.toggle_gestures());
        assert!(controller.get_status().enabled);
    }

    #[test]
    fn calibrate_validates_channel_and_value() {
        let controller = controller();
        assert!(controller.calibrate("gaze", 1.5).is_ok());
        assert_eq!(controller.snapshot().sensitivity.gaze, 1.5);

        let before = controller.snapshot().sensitivity;
        assert_eq!(
            controller.calibrate("volume", 2.0),
            Err(ControlError::UnknownChannel("volume".to_string()))
        );
        assert!(matches!(
            controller.calibrate("head", -1.0),
            Err(ControlError::InvalidSensitivity { .. })
        ));
        assert_eq!(controller.snapshot().sensitivity, before);
    }

    #[test]
    fn apply_preset_replaces_sensitivity() {
        let controller = controller();
        let applied = controller.apply_preset("head_only").unwrap();
        assert_eq!(applied.head, 1.8);
        assert_eq!(controller.snapshot().sensitivity, applied);
        assert!(controller.apply_preset("turbo").is_err());
    }

    #[test]
    fn status_combines_state_and_readings() {
        let controller = controller();
        controller.publish_readings(LiveReadings {
            gaze_position: Some(Point::new(0.4, 0.6)),
            head_tilt: Some(-3.0),
            pending_blink_count: 1,
            last_frame_s: Some(10.0),
        });
        let status = controller.get_status();
        assert_eq!(status.mode, Mode::Fps);
        assert!(status.enabled);
        assert_eq!(status.head_tilt, Some(-3.0));
        assert_eq!(status.pending_blink_count, 1);
        assert_eq!(controller.modes().len(), 5);
        assert!(controller.snapshot().table.get(GestureKind::SingleBlink).is_some());
    }
}
