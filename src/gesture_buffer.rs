use std::collections::VecDeque;

/// Buffer circular de capacidad fija: al llenarse descarta la muestra más antigua
#[derive(Debug, Clone)]
pub struct SampleRing<T> {
    buffer: VecDeque<T>,
    capacity: usize,
}

impl<T: Copy> SampleRing<T> {
    /// Crea un buffer con la capacidad indicada (mínimo 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Añade una muestra al buffer
    pub fn push(&mut self, sample: T) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(sample);
    }

    /// Verifica si hay al menos `n` muestras
    pub fn has_at_least(&self, n: usize) -> bool {
        self.buffer.len() >= n
    }

    /// Las últimas `n` muestras, de la más antigua a la más reciente
    pub fn latest(&self, n: usize) -> impl Iterator<Item = &T> {
        let skip = self.buffer.len().saturating_sub(n);
        self.buffer.iter().skip(skip)
    }

    pub fn last(&self) -> Option<T> {
        self.buffer.back().copied()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_not_ready_initially() {
        let ring: SampleRing<f32> = SampleRing::new(10);
        assert!(ring.is_empty());
        assert!(!ring.has_at_least(1));
        assert!(ring.last().is_none());
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let mut ring = SampleRing::new(10);
        for i in 0..14 {
            ring.push(i as f32);
        }

        // Debe contener las últimas 10 muestras (4..13)
        assert_eq!(ring.len(), 10);
        assert_eq!(ring.latest(10).next().copied(), Some(4.0));
        assert_eq!(ring.last(), Some(13.0));
    }

    #[test]
    fn test_latest_window() {
        let mut ring = SampleRing::new(10);
        for i in 0..8 {
            ring.push(i);
        }
        let window: Vec<i32> = ring.latest(5).copied().collect();
        assert_eq!(window, vec![3, 4, 5, 6, 7]);

        // Pedir más de lo disponible devuelve todo
        assert_eq!(ring.latest(50).count(), 8);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut ring = SampleRing::new(0);
        ring.push(1u8);
        ring.push(2u8);
        assert_eq!(ring.capacity(), 1);
        assert_eq!(ring.last(), Some(2));
    }
}
