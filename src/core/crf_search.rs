//! Pseudo binary search over crf values using sample encodes, looking for the
//! highest crf that still delivers `min_vmaf` within `max_encoded_percent`.

use crate::domain::model::{CrfAttempt, SampleOutput, SampleRequest, SearchCriteria};
use crate::domain::ports::SampleEncoder;
use crate::utils::error::{CrfError, Result};
use crate::utils::monitor::SystemMonitor;
use crate::utils::validation::validate_crf_bounds;
use console::style;
use indicatif::ProgressBar;
use std::path::Path;
use tokio::sync::watch;

pub const BAR_LEN: u64 = 1000;

/// What the search does after an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Accept(CrfAttempt),
    Next(u8),
    Fail,
}

pub struct CrfSearch<E: SampleEncoder> {
    encoder: E,
    monitor: SystemMonitor,
}

impl<E: SampleEncoder> CrfSearch<E> {
    pub fn new(encoder: E) -> Self {
        Self::new_with_monitoring(encoder, false)
    }

    pub fn new_with_monitoring(encoder: E, monitor_enabled: bool) -> Self {
        Self {
            encoder,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub async fn run(
        &self,
        input: &Path,
        criteria: &SearchCriteria,
        bar: &ProgressBar,
    ) -> Result<CrfAttempt> {
        let &SearchCriteria {
            preset,
            min_vmaf,
            max_encoded_percent,
            min_crf,
            max_crf,
            samples,
        } = criteria;
        validate_crf_bounds(min_crf, max_crf)?;

        let mut request = SampleRequest {
            input: input.to_path_buf(),
            crf: midpoint(min_crf, max_crf),
            preset,
            samples: 1,
            keep: false,
        };

        bar.set_length(BAR_LEN);
        let mut attempts: Vec<CrfAttempt> = Vec::new();
        // 第 3 輪在邊界上時只用 1 個樣本快速確認
        let mut quick_3rd_run = false;
        let mut run = 0_usize;

        loop {
            run += 1;
            request.samples = match run {
                // 前兩輪只用 1 個樣本以求速度
                1 | 2 => 1,
                3 if request.crf == min_crf || request.crf == max_crf => {
                    quick_3rd_run = true;
                    1
                }
                _ => samples,
            };

            bar.set_message(format!("sampling crf {}, ", request.crf));
            tracing::debug!("run {}: crf {} with {} sample(s)", run, request.crf, request.samples);

            let enc = self
                .sample_with_progress(&request, bar, run, quick_3rd_run)
                .await?;
            let attempt = CrfAttempt {
                crf: request.crf,
                samples: request.samples,
                enc,
            };
            attempts.push(attempt.clone());
            self.monitor.log_stats(&format!("crf {}", attempt.crf));

            match next_step(&attempts, &attempt, run, criteria) {
                Step::Accept(best) if best.crf == attempt.crf => {
                    self.monitor.log_final_stats();
                    return Ok(best);
                }
                Step::Accept(best) => {
                    print_attempt(&attempt, bar, min_vmaf, max_encoded_percent);
                    self.monitor.log_final_stats();
                    return Ok(best);
                }
                Step::Next(crf) => {
                    print_attempt(&attempt, bar, min_vmaf, max_encoded_percent);
                    request.crf = crf;
                }
                Step::Fail => {
                    print_attempt(&attempt, bar, min_vmaf, max_encoded_percent);
                    return Err(CrfError::NoSuitableCrf {
                        crf: attempt.crf,
                        vmaf: attempt.enc.vmaf,
                        percent: attempt.enc.predicted_encode_percent,
                    });
                }
            }
        }
    }

    /// Runs one sample encode, moving the overall bar as the encoder reports progress.
    async fn sample_with_progress(
        &self,
        request: &SampleRequest,
        bar: &ProgressBar,
        run: usize,
        quick_3rd_run: bool,
    ) -> Result<SampleOutput> {
        let (tx, mut rx) = watch::channel(0.0_f64);
        let encode = self.encoder.sample_encode(request, tx);
        tokio::pin!(encode);

        loop {
            tokio::select! {
                biased;
                out = &mut encode => return out,
                changed = rx.changed() => match changed {
                    Ok(()) => {
                        let sample_progress = *rx.borrow_and_update();
                        bar.set_position(guess_progress(run, sample_progress, quick_3rd_run) as u64);
                    }
                    // encoder 已丟棄 sender，只剩等結果
                    Err(_) => return (&mut encode).await,
                },
            }
        }
    }
}

/// Decides what to do after `sample`, given every attempt so far (including `sample`).
pub fn next_step(
    attempts: &[CrfAttempt],
    sample: &CrfAttempt,
    run: usize,
    criteria: &SearchCriteria,
) -> Step {
    let min_vmaf = criteria.min_vmaf;
    let max_encoded_percent = f64::from(criteria.max_encoded_percent);
    // 願意高出 min_vmaf 多少
    let higher_tolerance = run as f32 * 0.2;

    if sample.enc.vmaf > min_vmaf {
        if run > 2
            && sample.enc.predicted_encode_percent < max_encoded_percent
            && sample.enc.vmaf < min_vmaf + higher_tolerance
        {
            return Step::Accept(sample.clone());
        }

        let upper = attempts
            .iter()
            .filter(|s| s.crf > sample.crf)
            .min_by_key(|s| s.crf);

        match upper {
            Some(upper) if sample.crf.checked_add(1) == Some(upper.crf) => Step::Accept(sample.clone()),
            Some(upper) => Step::Next(vmaf_lerp_crf(min_vmaf, upper, sample)),
            None if sample.crf >= criteria.max_crf => Step::Accept(sample.clone()),
            None if run == 1 && u16::from(sample.crf) + 1 < u16::from(criteria.max_crf) => {
                Step::Next(midpoint(sample.crf, criteria.max_crf))
            }
            None => Step::Next(criteria.max_crf),
        }
    } else {
        if sample.enc.predicted_encode_percent > max_encoded_percent
            || sample.crf <= criteria.min_crf
        {
            return Step::Fail;
        }

        let lower = attempts
            .iter()
            .filter(|s| s.crf < sample.crf)
            .max_by_key(|s| s.crf);

        match lower {
            Some(lower) if lower.crf + 1 == sample.crf => Step::Accept(lower.clone()),
            Some(lower) => Step::Next(vmaf_lerp_crf(min_vmaf, sample, lower)),
            None if run == 1 && u16::from(sample.crf) > u16::from(criteria.min_crf) + 1 => {
                Step::Next(midpoint(criteria.min_crf, sample.crf))
            }
            None => Step::Next(criteria.min_crf),
        }
    }
}

/// Produces a crf between two attempts by linear interpolation of their VMAF scores.
///
/// The result is strictly between `better_q.crf` and `worse_q.crf` whenever
/// they are at least 2 apart.
pub fn vmaf_lerp_crf(min_vmaf: f32, worse_q: &CrfAttempt, better_q: &CrfAttempt) -> u8 {
    debug_assert!(
        better_q.crf < worse_q.crf,
        "invalid vmaf_lerp_crf usage: {:?}, {:?}",
        worse_q,
        better_q
    );

    let lo = better_q.crf.saturating_add(1);
    let hi = worse_q.crf.saturating_sub(1).max(lo);

    let vmaf_diff = better_q.enc.vmaf - worse_q.enc.vmaf;
    // VMAF 不單調時退回取中點
    if !(worse_q.enc.vmaf <= min_vmaf && vmaf_diff > 0.0) {
        return midpoint(better_q.crf, worse_q.crf).clamp(lo, hi);
    }

    let vmaf_factor = (min_vmaf - worse_q.enc.vmaf) / vmaf_diff;
    let crf_diff = f32::from(worse_q.crf) - f32::from(better_q.crf);
    let lerp = (f32::from(worse_q.crf) - crf_diff * vmaf_factor).round();
    (lerp as u8).clamp(lo, hi)
}

/// Guesses overall progress out of [`BAR_LEN`].
///
/// Assumes 4 runs at first (1 + 1 + 3 + 3 samples, or 1 + 1 + 1 + 3 with a
/// quick 3rd run), after that assumes the current run is the last.
pub fn guess_progress(run: usize, sample_progress: f64, quick_3rd_run: bool) -> f64 {
    let guess_total_samples = match run {
        0..=4 if quick_3rd_run => 1 + 1 + 1 + 3,
        0..=4 => 1 + 1 + 3 + 3,
        _ if quick_3rd_run => 3 + (run - 3) * 3,
        _ => 2 + (run - 2) * 3,
    };

    let done = match run {
        0 | 1 => sample_progress,
        2 => 1.0 + sample_progress,
        3 if quick_3rd_run => 2.0 + sample_progress,
        _ if quick_3rd_run => 3.0 + (run - 4) as f64 * 3.0 + sample_progress * 3.0,
        _ => 2.0 + (run - 3) as f64 * 3.0 + sample_progress * 3.0,
    };

    done * BAR_LEN as f64 / guess_total_samples as f64
}

fn midpoint(a: u8, b: u8) -> u8 {
    ((u16::from(a) + u16::from(b)) / 2) as u8
}

pub fn print_attempt(attempt: &CrfAttempt, bar: &ProgressBar, min_vmaf: f32, max_encoded_percent: f32) {
    let crf_label = style("- crf").dim();
    let mut crf = style(attempt.crf);
    let samples = style(match attempt.samples {
        1 => ", 1 sample",
        _ => "",
    })
    .dim();
    let vmaf_label = style("VMAF").dim();
    let mut vmaf = style(format!("{:.2}", attempt.enc.vmaf));
    let mut percent = style(format!("{:.0}%", attempt.enc.predicted_encode_percent));
    let open = style("(").dim();
    let close = style(")").dim();

    if attempt.enc.vmaf < min_vmaf {
        crf = crf.red();
        vmaf = vmaf.red().bright();
    }
    if attempt.enc.predicted_encode_percent > f64::from(max_encoded_percent) {
        crf = crf.red();
        percent = percent.red();
    }

    bar.println(format!(
        "{crf_label} {crf} {vmaf_label} {vmaf} {open}{percent}{samples}{close}"
    ));
}
