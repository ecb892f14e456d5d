use crate::types::{GestureEvent, GestureKind};

/// Compuerta anti-rebote: descarta (no encola) un gesto que llega antes de que
/// termine el cooldown del último gesto del mismo tipo que sí pasó.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    cooldown_s: f64,
    last_admitted: [Option<f64>; GestureKind::COUNT],
}

impl CooldownGate {
    pub fn new(cooldown_s: f64) -> Self {
        Self {
            cooldown_s: cooldown_s.max(0.0),
            last_admitted: [None; GestureKind::COUNT],
        }
    }

    /// Devuelve true si el evento puede despacharse
    pub fn admit(&mut self, event: &GestureEvent) -> bool {
        let slot = &mut self.last_admitted[event.kind.index()];
        if let Some(last) = *slot {
            if event.timestamp_s - last < self.cooldown_s {
                return false;
            }
        }
        *slot = Some(event.timestamp_s);
        true
    }

    pub fn cooldown_s(&self) -> f64 {
        self.cooldown_s
    }

    pub fn reset(&mut self) {
        self.last_admitted = [None; GestureKind::COUNT];
    }
}
