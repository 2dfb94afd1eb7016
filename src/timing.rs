// timing.rs — Wall-clock measurement of a blur invocation.
//
// One untimed warm-up call absorbs lazy initialisation (rayon pool spin-up,
// shader compilation, first-touch page faults). Then `samples` calls are
// timed individually with `Instant`. The console reports the mean truncated
// to whole milliseconds; with `samples == 1` that is exactly the single
// measured call.

use std::time::{Duration, Instant};

use tracing::debug;

/// Individual timings of one measured operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    samples: Vec<Duration>,
}

impl Measurement {
    /// # Panics
    /// Panics on an empty sample list.
    pub fn from_samples(samples: Vec<Duration>) -> Self {
        assert!(!samples.is_empty(), "a measurement needs at least one sample");
        Measurement { samples }
    }

    pub fn samples(&self) -> &[Duration] {
        &self.samples
    }

    pub fn mean(&self) -> Duration {
        let total: Duration = self.samples.iter().sum();
        total / self.samples.len() as u32
    }

    pub fn min(&self) -> Duration {
        self.samples.iter().copied().min().unwrap_or_default()
    }

    /// Mean in whole milliseconds, truncated toward zero.
    pub fn reported_millis(&self) -> u128 {
        self.mean().as_millis()
    }
}

/// Warm up once, then time `samples` calls of `op`.
///
/// Returns the result of the last timed call. Errors from any call,
/// including the warm-up, abort the measurement.
pub fn measure<T, E>(
    label: &str,
    samples: usize,
    mut op: impl FnMut() -> Result<T, E>,
) -> Result<(T, Measurement), E> {
    assert!(samples > 0, "samples must be at least 1");

    let warm = Instant::now();
    op()?;
    debug!(label, elapsed_us = warm.elapsed().as_micros() as u64, "warm-up");

    let mut timings = Vec::with_capacity(samples);
    let (mut out, first) = timed(&mut op)?;
    timings.push(first);
    for _ in 1..samples {
        let (next, elapsed) = timed(&mut op)?;
        out = next;
        timings.push(elapsed);
    }
    for (i, t) in timings.iter().enumerate() {
        debug!(label, sample = i, elapsed_us = t.as_micros() as u64, "timed run");
    }
    let measurement = Measurement::from_samples(timings);
    debug!(
        label,
        mean_us = measurement.mean().as_micros() as u64,
        min_us = measurement.min().as_micros() as u64,
        "measurement"
    );
    Ok((out, measurement))
}

fn timed<T, E>(op: &mut impl FnMut() -> Result<T, E>) -> Result<(T, Duration), E> {
    let start = Instant::now();
    let out = op()?;
    Ok((out, start.elapsed()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_truncation() {
        let m = Measurement::from_samples(vec![
            Duration::from_micros(1_900),
            Duration::from_micros(2_900),
        ]);
        assert_eq!(m.mean(), Duration::from_micros(2_400));
        assert_eq!(m.reported_millis(), 2);
        assert_eq!(m.min(), Duration::from_micros(1_900));
    }

    #[test]
    fn test_sub_millisecond_reports_zero() {
        let m = Measurement::from_samples(vec![Duration::from_micros(999)]);
        assert_eq!(m.reported_millis(), 0);
    }

    #[test]
    fn test_measure_calls_warmup_plus_samples() {
        let mut calls = 0;
        let (out, m) = measure("count", 3, || {
            calls += 1;
            Ok::<_, ()>(calls)
        })
        .unwrap();
        assert_eq!(calls, 4);
        assert_eq!(out, 4, "result of the last timed call");
        assert_eq!(m.samples().len(), 3);
    }

    #[test]
    fn test_measure_covers_the_sleep() {
        let (_, m) = measure("sleep", 1, || {
            std::thread::sleep(Duration::from_millis(5));
            Ok::<_, ()>(())
        })
        .unwrap();
        assert!(m.reported_millis() >= 5);
    }

    #[test]
    fn test_measure_propagates_error() {
        let mut calls = 0;
        let res = measure("fail", 2, || {
            calls += 1;
            if calls == 2 { Err("boom") } else { Ok(()) }
        });
        assert_eq!(res.unwrap_err(), "boom");
        assert_eq!(calls, 2, "stops at the first failure");
    }

    #[test]
    #[should_panic(expected = "at least one sample")]
    fn test_empty_measurement_panics() {
        Measurement::from_samples(Vec::new());
    }
}
