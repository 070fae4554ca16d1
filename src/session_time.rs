use crate::core::units::SECONDS_PER_HOUR;
use chrono::{NaiveTime, TimeDelta};
use serde::Serialize;

/// Simulated time of a test session, advanced by one step for every sample the building model
/// consumes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SessionClock {
    step: f64,
    index: usize,
    elapsed: f64,
}

impl SessionClock {
    /// Arguments
    /// * `step` - simulated time per sample, in s
    pub fn new(step: f64) -> Self {
        Self {
            step,
            index: 0,
            elapsed: 0.,
        }
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Simulated time since the clock was started, in s
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn elapsed_hours(&self) -> f64 {
        self.elapsed / SECONDS_PER_HOUR
    }

    /// Move the clock on by one step and return the iteration just completed.
    pub fn advance(&mut self) -> SessionTimeIteration {
        self.index += 1;
        self.elapsed = self.index as f64 * self.step;
        SessionTimeIteration {
            index: self.index,
            time: self.elapsed,
            timestep: self.step,
        }
    }

    pub fn reset(&mut self) {
        self.index = 0;
        self.elapsed = 0.;
    }

    /// Elapsed time as `HH:MM:SS`, wrapping after a day.
    pub fn hms(&self) -> String {
        let elapsed = TimeDelta::milliseconds((self.elapsed * 1_000.).round() as i64);
        (NaiveTime::MIN + elapsed).format("%H:%M:%S").to_string()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SessionTimeIteration {
    pub index: usize,
    /// in s
    pub time: f64,
    /// in s
    pub timestep: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn clock() -> SessionClock {
        SessionClock::new(1.)
    }

    #[rstest]
    fn test_advance(mut clock: SessionClock) {
        for i in 1..=3 {
            let iteration = clock.advance();
            assert_eq!(iteration.index, i);
            assert_eq!(iteration.time, i as f64);
            assert_eq!(iteration.timestep, 1.);
        }
        assert_eq!(clock.elapsed(), 3.);
    }

    #[rstest]
    fn test_reset(mut clock: SessionClock) {
        clock.advance();
        clock.reset();
        assert_eq!(clock.index(), 0);
        assert_eq!(clock.elapsed(), 0.);
    }

    #[rstest]
    #[case(1., 0, "00:00:00")]
    #[case(1., 61, "00:01:01")]
    #[case(1., 3_725, "01:02:05")]
    #[case(60., 1_440, "00:00:00")]
    fn test_hms(#[case] step: f64, #[case] steps: usize, #[case] expected: &str) {
        let mut clock = SessionClock::new(step);
        for _ in 0..steps {
            clock.advance();
        }
        assert_eq!(clock.hms(), expected);
    }

    #[test]
    fn test_elapsed_hours() {
        let mut clock = SessionClock::new(900.);
        clock.advance();
        clock.advance();
        assert_eq!(clock.elapsed_hours(), 0.5);
    }
}
