/// Tuning knobs for an [`AsyncFactory`](crate::AsyncFactory).
///
/// These are performance parameters, not correctness requirements: any
/// combination of valid values yields the same acquire semantics, only with
/// different stall behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactoryConfig {
    /// Ring capacity: how many objects are kept pre-built.
    pub buffer_size: usize,
    /// Spin-loop iterations an acquire attempts before falling back to
    /// inline allocation. Zero skips the ring entirely.
    pub spin_count: usize,
    /// After the first stall (which signals the producer), yield to the
    /// scheduler on every N-th spin instead of signaling again.
    pub yield_every: usize,
}

impl FactoryConfig {
    /// Creates a configuration with custom settings.
    ///
    /// # Panics
    ///
    /// Panics if `buffer_size` or `yield_every` is zero.
    pub const fn new(buffer_size: usize, spin_count: usize, yield_every: usize) -> Self {
        assert!(buffer_size > 0, "buffer_size must be at least 1");
        assert!(yield_every > 0, "yield_every must be at least 1");

        Self {
            buffer_size,
            spin_count,
            yield_every,
        }
    }
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64,
            spin_count: 1000,
            yield_every: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let c = FactoryConfig::default();
        assert_eq!(c.buffer_size, 64);
        assert_eq!(c.spin_count, 1000);
        assert_eq!(c.yield_every, 5);
    }

    #[test]
    #[should_panic(expected = "buffer_size")]
    fn zero_buffer_rejected() {
        let _ = FactoryConfig::new(0, 100, 5);
    }

    #[test]
    #[should_panic(expected = "yield_every")]
    fn zero_yield_cadence_rejected() {
        let _ = FactoryConfig::new(8, 100, 0);
    }
}
