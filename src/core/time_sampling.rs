//! Time sampling: the mapping between sample indices and times.
//!
//! Properties are sampled over time. A [`TimeSampling`] is an immutable
//! descriptor shared through the archive's pool; properties refer to it by
//! index.

use crate::util::{Chrono, Error, Result};

/// Variance class of a time sampling.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum TimeSamplingType {
    /// Index-keyed: `time(i) = i`.
    #[default]
    Static,

    /// One sample per cycle: `start_time + i * time_per_cycle`.
    Uniform {
        time_per_cycle: Chrono,
        start_time: Chrono,
    },

    /// `N` samples per cycle with explicit first-cycle times:
    /// `times[i % N] + (i / N) * time_per_cycle`.
    Cyclic {
        time_per_cycle: Chrono,
        times: Vec<Chrono>,
    },

    /// Explicit, strictly increasing time per sample.
    Acyclic { times: Vec<Chrono> },
}

impl TimeSamplingType {
    /// Tag persisted in the time sampling table.
    pub const fn tag(&self) -> u8 {
        match self {
            Self::Static => 0,
            Self::Uniform { .. } => 1,
            Self::Cyclic { .. } => 2,
            Self::Acyclic { .. } => 3,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Uniform { .. } => "uniform",
            Self::Cyclic { .. } => "cyclic",
            Self::Acyclic { .. } => "acyclic",
        }
    }
}

/// Immutable index/time mapping.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct TimeSampling {
    sampling_type: TimeSamplingType,
}

fn check_period(time_per_cycle: Chrono) -> Result<()> {
    if time_per_cycle.is_finite() && time_per_cycle > 0.0 {
        Ok(())
    } else {
        Err(Error::invalid(format!(
            "time per cycle must be positive and finite, got {}",
            time_per_cycle
        )))
    }
}

fn check_increasing(times: &[Chrono]) -> Result<()> {
    if times.is_empty() {
        return Err(Error::invalid("time list is empty"));
    }
    if let Some(t) = times.iter().find(|t| !t.is_finite()) {
        return Err(Error::invalid(format!("non-finite sample time {}", t)));
    }
    if let Some(w) = times.windows(2).find(|w| w[1] <= w[0]) {
        return Err(Error::invalid(format!(
            "sample times must strictly increase ({} then {})",
            w[0], w[1]
        )));
    }
    Ok(())
}

impl TimeSampling {
    /// Index-keyed sampling; the default entry of every archive pool.
    pub const STATIC: Self = Self { sampling_type: TimeSamplingType::Static };

    pub fn uniform(time_per_cycle: Chrono, start_time: Chrono) -> Result<Self> {
        check_period(time_per_cycle)?;
        if !start_time.is_finite() {
            return Err(Error::invalid(format!("non-finite start time {}", start_time)));
        }
        Ok(Self {
            sampling_type: TimeSamplingType::Uniform { time_per_cycle, start_time },
        })
    }

    /// Cyclic sampling. The first-cycle times must strictly increase and span
    /// less than one period.
    pub fn cyclic(time_per_cycle: Chrono, times: Vec<Chrono>) -> Result<Self> {
        check_period(time_per_cycle)?;
        check_increasing(&times)?;
        let span = times[times.len() - 1] - times[0];
        if span >= time_per_cycle {
            return Err(Error::invalid(format!(
                "cycle times span {} which is not shorter than the period {}",
                span, time_per_cycle
            )));
        }
        Ok(Self {
            sampling_type: TimeSamplingType::Cyclic { time_per_cycle, times },
        })
    }

    pub fn acyclic(times: Vec<Chrono>) -> Result<Self> {
        check_increasing(&times)?;
        Ok(Self { sampling_type: TimeSamplingType::Acyclic { times } })
    }

    /// Rebuild from persisted parts, validating them like the constructors.
    pub fn from_parts(tag: u8, time_per_cycle: Chrono, times: Vec<Chrono>) -> Result<Self> {
        match tag {
            0 => Ok(Self::STATIC),
            1 => {
                let start = times
                    .first()
                    .copied()
                    .ok_or_else(|| Error::invalid("uniform sampling without start time"))?;
                Self::uniform(time_per_cycle, start)
            }
            2 => Self::cyclic(time_per_cycle, times),
            3 => Self::acyclic(times),
            other => Err(Error::invalid(format!("unknown time sampling tag {}", other))),
        }
    }

    #[inline]
    pub fn sampling_type(&self) -> &TimeSamplingType {
        &self.sampling_type
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        matches!(self.sampling_type, TimeSamplingType::Static)
    }

    /// Whether writers must supply times matching this sampling.
    ///
    /// Uniform and cyclic samplings define every time up front, so a caller
    /// time is checked against them. Static and acyclic times are taken on
    /// trust.
    #[inline]
    pub fn is_time_checked(&self) -> bool {
        matches!(
            self.sampling_type,
            TimeSamplingType::Uniform { .. } | TimeSamplingType::Cyclic { .. }
        )
    }

    /// Period of one cycle; 1 for static, 0 for acyclic.
    pub fn time_per_cycle(&self) -> Chrono {
        match &self.sampling_type {
            TimeSamplingType::Static => 1.0,
            TimeSamplingType::Uniform { time_per_cycle, .. }
            | TimeSamplingType::Cyclic { time_per_cycle, .. } => *time_per_cycle,
            TimeSamplingType::Acyclic { .. } => 0.0,
        }
    }

    /// Times stored explicitly: the start time, the first cycle, or the full
    /// acyclic list.
    pub fn stored_times(&self) -> Vec<Chrono> {
        match &self.sampling_type {
            TimeSamplingType::Static => vec![0.0],
            TimeSamplingType::Uniform { start_time, .. } => vec![*start_time],
            TimeSamplingType::Cyclic { times, .. } | TimeSamplingType::Acyclic { times } => {
                times.clone()
            }
        }
    }

    pub fn samples_per_cycle(&self) -> usize {
        match &self.sampling_type {
            TimeSamplingType::Static | TimeSamplingType::Uniform { .. } => 1,
            TimeSamplingType::Cyclic { times, .. } | TimeSamplingType::Acyclic { times } => {
                times.len()
            }
        }
    }

    /// Time of sample `index`. Acyclic indices past the list clamp to its
    /// last time.
    pub fn sample_time(&self, index: usize) -> Chrono {
        match &self.sampling_type {
            TimeSamplingType::Static => index as Chrono,
            TimeSamplingType::Uniform { time_per_cycle, start_time } => {
                start_time + (index as Chrono) * time_per_cycle
            }
            TimeSamplingType::Cyclic { time_per_cycle, times } => {
                let n = times.len();
                times[index % n] + ((index / n) as Chrono) * time_per_cycle
            }
            TimeSamplingType::Acyclic { times } => times[index.min(times.len() - 1)],
        }
    }

    /// First and last sample time for a property with `num_samples` samples.
    pub fn time_range(&self, num_samples: usize) -> Option<(Chrono, Chrono)> {
        let last = self.last_index(num_samples).ok()?;
        Some((self.sample_time(0), self.sample_time(last)))
    }

    fn last_index(&self, num_samples: usize) -> Result<usize> {
        if num_samples == 0 {
            return Err(Error::invalid("time lookup on a property with no samples"));
        }
        Ok(match &self.sampling_type {
            TimeSamplingType::Acyclic { times } => num_samples.min(times.len()) - 1,
            _ => num_samples - 1,
        })
    }

    /// Closed-form guess of the floor index for a time at or after sample 0.
    fn estimate_index(&self, time: Chrono) -> usize {
        match &self.sampling_type {
            TimeSamplingType::Static => time.floor() as usize,
            TimeSamplingType::Uniform { time_per_cycle, start_time } => {
                ((time - start_time) / time_per_cycle).floor() as usize
            }
            TimeSamplingType::Cyclic { time_per_cycle, times } => {
                let cycle = ((time - times[0]) / time_per_cycle).floor();
                let offset = time - cycle * time_per_cycle;
                let within = times.partition_point(|t| *t <= offset);
                (cycle as usize) * times.len() + within.saturating_sub(1)
            }
            TimeSamplingType::Acyclic { times } => {
                times.partition_point(|t| *t <= time).saturating_sub(1)
            }
        }
    }

    /// Largest index whose time is `<= time`, clamped to the valid range.
    ///
    /// Fails with `InvalidValue` when `num_samples` is 0.
    pub fn floor_index(&self, time: Chrono, num_samples: usize) -> Result<(usize, Chrono)> {
        let last = self.last_index(num_samples)?;
        let idx = if time <= self.sample_time(0) {
            0
        } else if time >= self.sample_time(last) {
            last
        } else {
            // The estimate can be off by floating point rounding; walk it
            // onto the exact floor using the same arithmetic as sample_time.
            let mut i = self.estimate_index(time).min(last);
            while i > 0 && self.sample_time(i) > time {
                i -= 1;
            }
            while i < last && self.sample_time(i + 1) <= time {
                i += 1;
            }
            i
        };
        Ok((idx, self.sample_time(idx)))
    }

    /// Smallest index whose time is `>= time`, clamped to the valid range.
    pub fn ceil_index(&self, time: Chrono, num_samples: usize) -> Result<(usize, Chrono)> {
        let last = self.last_index(num_samples)?;
        let (floor_idx, floor_time) = self.floor_index(time, num_samples)?;
        if floor_time >= time || floor_idx == last {
            return Ok((floor_idx, floor_time));
        }
        let idx = floor_idx + 1;
        Ok((idx, self.sample_time(idx)))
    }

    /// Index whose time is closest to `time`; ties go to the floor.
    pub fn near_index(&self, time: Chrono, num_samples: usize) -> Result<(usize, Chrono)> {
        let floor = self.floor_index(time, num_samples)?;
        let ceil = self.ceil_index(time, num_samples)?;
        if (time - floor.1).abs() <= (ceil.1 - time).abs() {
            Ok(floor)
        } else {
            Ok(ceil)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::ErrorKind;

    fn all_kinds() -> Vec<TimeSampling> {
        vec![
            TimeSampling::STATIC,
            TimeSampling::uniform(1.0 / 24.0, 0.0).unwrap(),
            TimeSampling::uniform(0.1, -3.7).unwrap(),
            TimeSampling::cyclic(1.0, vec![0.0, 0.25, 0.5]).unwrap(),
            TimeSampling::cyclic(1.0 / 30.0, vec![0.01, 0.02]).unwrap(),
            TimeSampling::acyclic(vec![-1.0, 0.0, 0.3, 0.31, 7.5]).unwrap(),
        ]
    }

    #[test]
    fn test_uniform_times() {
        let ts = TimeSampling::uniform(1.0 / 24.0, 0.0).unwrap();
        assert_eq!(ts.sample_time(0), 0.0);
        assert!((ts.sample_time(24) - 1.0).abs() < 1e-10);
        assert!(ts.is_time_checked());
    }

    #[test]
    fn test_static_is_index_keyed() {
        let ts = TimeSampling::STATIC;
        assert_eq!(ts.sample_time(7), 7.0);
        assert_eq!(ts.floor_index(3.9, 10).unwrap(), (3, 3.0));
        assert!(!ts.is_time_checked());
    }

    #[test]
    fn test_cyclic_times() {
        let ts = TimeSampling::cyclic(1.0, vec![0.0, 0.25, 0.5]).unwrap();
        assert_eq!(ts.sample_time(4), 1.25);
        assert_eq!(ts.sample_time(8), 2.5);
        assert_eq!(ts.floor_index(2.4, 100).unwrap().0, 7);
        assert_eq!(ts.ceil_index(2.4, 100).unwrap().0, 8);
    }

    #[test]
    fn test_acyclic_clamps_past_end() {
        let ts = TimeSampling::acyclic(vec![0.0, 0.5, 1.0, 2.0]).unwrap();
        assert_eq!(ts.sample_time(3), 2.0);
        assert_eq!(ts.sample_time(10), 2.0);
        assert_eq!(ts.floor_index(100.0, 10).unwrap(), (3, 2.0));
    }

    #[test]
    fn test_floor_ceil_roundtrip_every_index() {
        for ts in all_kinds() {
            let n = match ts.sampling_type() {
                TimeSamplingType::Acyclic { times } => times.len(),
                _ => 500,
            };
            for i in 0..n {
                let t = ts.sample_time(i);
                assert_eq!(ts.floor_index(t, n).unwrap().0, i, "{:?} floor {}", ts, i);
                assert_eq!(ts.ceil_index(t, n).unwrap().0, i, "{:?} ceil {}", ts, i);
                assert_eq!(ts.near_index(t, n).unwrap().0, i, "{:?} near {}", ts, i);
            }
        }
    }

    #[test]
    fn test_queries_clamp() {
        for ts in all_kinds() {
            let (first, last) = ts.time_range(5).unwrap();
            assert_eq!(ts.floor_index(first - 100.0, 5).unwrap().0, 0);
            assert_eq!(ts.ceil_index(first - 100.0, 5).unwrap().0, 0);
            let last_idx = ts.floor_index(last + 100.0, 5).unwrap().0;
            assert_eq!(ts.sample_time(last_idx), last);
            assert_eq!(ts.ceil_index(last + 100.0, 5).unwrap().0, last_idx);
        }
    }

    #[test]
    fn test_near_ties_go_to_floor() {
        let ts = TimeSampling::uniform(1.0, 0.0).unwrap();
        assert_eq!(ts.near_index(2.5, 10).unwrap().0, 2);
        assert_eq!(ts.near_index(2.6, 10).unwrap().0, 3);
    }

    #[test]
    fn test_between_samples() {
        let ts = TimeSampling::uniform(1.0 / 24.0, 0.0).unwrap();
        assert_eq!(ts.floor_index(0.05, 3).unwrap().0, 1);
        assert_eq!(ts.ceil_index(0.05, 3).unwrap().0, 2);
    }

    #[test]
    fn test_zero_samples_rejected() {
        let ts = TimeSampling::uniform(1.0, 0.0).unwrap();
        let err = ts.floor_index(0.0, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
        assert!(ts.time_range(0).is_none());
    }

    #[test]
    fn test_invalid_construction() {
        assert!(TimeSampling::uniform(0.0, 0.0).is_err());
        assert!(TimeSampling::uniform(-1.0, 0.0).is_err());
        assert!(TimeSampling::uniform(f64::NAN, 0.0).is_err());
        assert!(TimeSampling::acyclic(vec![]).is_err());
        assert!(TimeSampling::acyclic(vec![0.0, 0.0]).is_err());
        assert!(TimeSampling::cyclic(1.0, vec![0.0, 1.0]).is_err());
        assert!(TimeSampling::cyclic(1.0, vec![0.5, 0.2]).is_err());
    }

    #[test]
    fn test_from_parts() {
        for ts in all_kinds() {
            let tag = ts.sampling_type().tag();
            let rebuilt = TimeSampling::from_parts(tag, ts.time_per_cycle(), ts.stored_times());
            assert_eq!(rebuilt.unwrap(), ts);
        }
        assert!(TimeSampling::from_parts(9, 1.0, vec![0.0]).is_err());
    }
}
