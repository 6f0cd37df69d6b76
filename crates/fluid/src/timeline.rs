use std::time::Instant;

/// Bounds a frame delta to `[0, max_dt]`; non-finite deltas count as zero.
pub fn clamp_dt(dt: f32, max_dt: f32) -> f32 {
    if !dt.is_finite() {
        return 0.0;
    }
    dt.clamp(0.0, max_dt.max(0.0))
}

/// Per-step multiplier applied by advection: `1 / (1 + rate * dt)`.
pub fn decay_factor(rate: f32, dt: f32) -> f32 {
    1.0 / (1.0 + rate.max(0.0) * dt.max(0.0))
}

/// Wall-clock frame timing with a hard ceiling on the reported delta.
///
/// A stalled tab or a debugger pause must not produce one giant step, so
/// every delta is clamped to `max_dt`.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Option<Instant>,
    max_dt: f32,
}

impl FrameClock {
    pub fn new(max_dt: f32) -> Self {
        Self { last: None, max_dt }
    }

    pub fn max_dt(&self) -> f32 {
        self.max_dt
    }

    /// Returns the clamped delta since the previous call.
    ///
    /// The first call reports one nominal frame of `max_dt`.
    pub fn advance(&mut self, now: Instant) -> f32 {
        let dt = match self.last {
            Some(last) => now.saturating_duration_since(last).as_secs_f32(),
            None => self.max_dt,
        };
        self.last = Some(now);
        clamp_dt(dt, self.max_dt)
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn stalls_are_clamped_to_max_dt() {
        let start = Instant::now();
        let mut clock = FrameClock::new(1.0 / 60.0);
        assert!((clock.advance(start) - 1.0 / 60.0).abs() < 1e-6);
        let dt = clock.advance(start + Duration::from_secs(5));
        assert!((dt - 1.0 / 60.0).abs() < 1e-6);
        let short = clock.advance(start + Duration::from_secs(5) + Duration::from_millis(4));
        assert!((short - 0.004).abs() < 1e-4);
    }

    #[test]
    fn clamp_rejects_negative_and_nan() {
        assert_eq!(clamp_dt(-1.0, 0.016), 0.0);
        assert_eq!(clamp_dt(f32::NAN, 0.016), 0.0);
        assert_eq!(clamp_dt(5.0, 0.016), 0.016);
    }

    #[test]
    fn decay_factor_stays_in_unit_interval() {
        for rate in [0.0_f32, 0.2, 0.9, 3.0, 50.0] {
            for dt in [0.0_f32, 0.001, 1.0 / 60.0, 0.1] {
                let factor = decay_factor(rate, dt);
                assert!(factor > 0.0 && factor <= 1.0, "rate {rate} dt {dt} -> {factor}");
            }
        }
        assert_eq!(decay_factor(0.0, 0.016), 1.0);
    }
}
