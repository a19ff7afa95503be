use std::collections::VecDeque;

/// Bounded tail of one entity's target series, newest last.
///
/// Holds just enough history to evaluate every configured lag and rolling
/// window. Length never exceeds `capacity`.
#[derive(Debug, Clone)]
pub struct EntityBuffer {
    values: VecDeque<f64>,
    capacity: usize,
}

impl EntityBuffer {
    /// `max(max(lags), max(windows)) + 1`.
    pub fn memory_for(lags: &[usize], windows: &[usize]) -> usize {
        lags.iter().chain(windows).copied().max().unwrap_or(0) + 1
    }

    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Keeps the last `capacity` values of an ordered history.
    pub fn from_history<I>(history: I, capacity: usize) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let mut buffer = Self::new(capacity);
        for value in history {
            buffer.push(value);
        }
        buffer
    }

    pub fn push(&mut self, value: f64) {
        self.values.push_back(value);
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    /// Value `lag` positions back from the end; `None` when the buffer is shorter.
    pub fn lag(&self, lag: usize) -> Option<f64> {
        if lag == 0 || self.values.len() < lag {
            return None;
        }
        self.values.get(self.values.len() - lag).copied()
    }

    /// Mean of the last `min(window, len)` values.
    pub fn rolling_mean(&self, window: usize) -> Option<f64> {
        let n = window.min(self.values.len());
        if n == 0 {
            return None;
        }
        let sum: f64 = self.values.iter().rev().take(n).sum();
        Some(sum / n as f64)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_for() {
        assert_eq!(EntityBuffer::memory_for(&[1, 7, 28], &[7, 28]), 29);
        assert_eq!(EntityBuffer::memory_for(&[1], &[14]), 15);
        assert_eq!(EntityBuffer::memory_for(&[], &[]), 1);
    }

    #[test]
    fn test_from_history_keeps_tail() {
        let buffer = EntityBuffer::from_history((1..=10).map(f64::from), 4);
        assert_eq!(buffer.values().collect::<Vec<_>>(), vec![7.0, 8.0, 9.0, 10.0]);
    }

    #[test]
    fn test_push_at_capacity_drops_oldest() {
        let mut buffer = EntityBuffer::from_history([1.0, 2.0, 3.0], 3);
        buffer.push(4.0);
        assert_eq!(buffer.len(), 3);
        assert!(!buffer.is_empty());
        assert_eq!(buffer.values().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_lag() {
        let buffer = EntityBuffer::from_history([10.0, 20.0, 30.0], 5);
        assert_eq!(buffer.lag(1), Some(30.0));
        assert_eq!(buffer.lag(3), Some(10.0));
        assert_eq!(buffer.lag(4), None);
    }

    #[test]
    fn test_rolling_mean_uses_available_tail() {
        let buffer = EntityBuffer::from_history([10.0, 20.0, 30.0], 5);
        assert_eq!(buffer.rolling_mean(2), Some(25.0));
        assert_eq!(buffer.rolling_mean(7), Some(20.0));
        assert_eq!(EntityBuffer::new(5).rolling_mean(7), None);
    }
}
