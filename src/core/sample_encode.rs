//! Sample placement and extrapolation of sample results to the full input.

use crate::domain::model::{ProbeInfo, SampleOutput};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleWindow {
    pub start: Duration,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SamplePlan {
    /// Input is too short to sample, encode all of it once.
    Full,
    Windows(Vec<SampleWindow>),
}

impl SamplePlan {
    pub fn len(&self) -> usize {
        match self {
            SamplePlan::Full => 1,
            SamplePlan::Windows(windows) => windows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Spreads `samples` windows evenly, with equal gaps before, between and after them.
pub fn plan_samples(duration: Duration, samples: u64, sample_duration: Duration) -> SamplePlan {
    let samples = samples.max(1);
    let sampled = sample_duration.as_secs_f64() * samples as f64;
    let total = duration.as_secs_f64();

    if sample_duration.is_zero() || total <= sampled {
        return SamplePlan::Full;
    }

    let gap = (total - sampled) / (samples + 1) as f64;
    let windows = (0..samples)
        .map(|i| SampleWindow {
            start: Duration::from_secs_f64(gap * (i + 1) as f64 + sample_duration.as_secs_f64() * i as f64),
            duration: sample_duration,
        })
        .collect();

    SamplePlan::Windows(windows)
}

/// Measurements of one encoded sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleScore {
    pub vmaf: f32,
    pub sample_size: u64,
    pub encoded_size: u64,
    pub encode_time: Duration,
}

/// Combines per-sample scores into a prediction for the full encode.
///
/// `sampled_duration` is the total playback time covered by the samples.
pub fn aggregate(probe: &ProbeInfo, scores: &[SampleScore], sampled_duration: Duration) -> SampleOutput {
    if scores.is_empty() {
        return SampleOutput {
            vmaf: 0.0,
            predicted_encode_size: 0,
            predicted_encode_percent: 0.0,
            predicted_encode_time: Duration::ZERO,
        };
    }

    let vmaf = scores.iter().map(|s| s.vmaf).sum::<f32>() / scores.len() as f32;
    let sample_bytes: u64 = scores.iter().map(|s| s.sample_size).sum();
    let encoded_bytes: u64 = scores.iter().map(|s| s.encoded_size).sum();
    let encode_time: Duration = scores.iter().map(|s| s.encode_time).sum();

    let ratio = if sample_bytes > 0 {
        encoded_bytes as f64 / sample_bytes as f64
    } else {
        0.0
    };

    let time_factor = if sampled_duration.is_zero() {
        1.0
    } else {
        (probe.duration.as_secs_f64() / sampled_duration.as_secs_f64()).max(1.0)
    };

    SampleOutput {
        vmaf,
        predicted_encode_size: (probe.size as f64 * ratio).round() as u64,
        predicted_encode_percent: ratio * 100.0,
        predicted_encode_time: encode_time.mul_f64(time_factor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_input_is_sampled_whole() {
        let plan = plan_samples(Duration::from_secs(50), 3, Duration::from_secs(20));
        assert_eq!(plan, SamplePlan::Full);
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_windows_are_evenly_spaced() {
        // 100s, 2 x 20s => gap 20s: [20..40] [60..80]
        let plan = plan_samples(Duration::from_secs(100), 2, Duration::from_secs(20));
        let SamplePlan::Windows(windows) = plan else {
            panic!("expected windows");
        };
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].start, Duration::from_secs(20));
        assert_eq!(windows[1].start, Duration::from_secs(60));
        assert!(windows.iter().all(|w| w.duration == Duration::from_secs(20)));
    }

    #[test]
    fn test_windows_fit_inside_input() {
        let duration = Duration::from_secs(3600);
        let SamplePlan::Windows(windows) = plan_samples(duration, 5, Duration::from_secs(20)) else {
            panic!("expected windows");
        };
        let last = windows.last().unwrap();
        assert!(last.start + last.duration <= duration);
        assert!(windows.windows(2).all(|w| w[0].start + w[0].duration <= w[1].start));
    }

    #[test]
    fn test_aggregate_extrapolates_size_and_time() {
        let probe = ProbeInfo {
            duration: Duration::from_secs(600),
            size: 1_000_000_000,
        };
        let scores = [
            SampleScore {
                vmaf: 94.0,
                sample_size: 10_000_000,
                encoded_size: 2_000_000,
                encode_time: Duration::from_secs(10),
            },
            SampleScore {
                vmaf: 96.0,
                sample_size: 10_000_000,
                encoded_size: 4_000_000,
                encode_time: Duration::from_secs(20),
            },
        ];

        let out = aggregate(&probe, &scores, Duration::from_secs(40));

        assert_eq!(out.vmaf, 95.0);
        assert!((out.predicted_encode_percent - 30.0).abs() < 1e-9);
        assert_eq!(out.predicted_encode_size, 300_000_000);
        // 30s of encoding for 40s of video => 450s for 600s
        assert_eq!(out.predicted_encode_time, Duration::from_secs(450));
    }

    #[test]
    fn test_aggregate_full_sample_keeps_encode_time() {
        let probe = ProbeInfo {
            duration: Duration::from_secs(30),
            size: 5_000,
        };
        let scores = [SampleScore {
            vmaf: 97.5,
            sample_size: 5_000,
            encoded_size: 1_000,
            encode_time: Duration::from_secs(12),
        }];

        let out = aggregate(&probe, &scores, Duration::from_secs(30));
        assert_eq!(out.predicted_encode_size, 1_000);
        assert_eq!(out.predicted_encode_time, Duration::from_secs(12));
    }
}
