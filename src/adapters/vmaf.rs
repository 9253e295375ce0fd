use crate::adapters::ffmpeg::{run_ffmpeg, stderr_tail, FfmpegCommandBuilder, FfmpegSettings};
use crate::utils::error::{CrfError, Result};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

static VMAF_SCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"VMAF score[:=]\s*([0-9]+(?:\.[0-9]+)?)").expect("valid VMAF score regex")
});

/// libvmaf filter graph, first input is the distorted video, second the reference.
pub fn vmaf_filter(settings: &FfmpegSettings) -> String {
    let mut libvmaf = format!("libvmaf=n_threads={}", settings.vmaf_threads.max(1));
    if let Some(model) = &settings.vmaf_model {
        libvmaf.push_str(&format!(":model={}", model));
    }
    format!(
        "[0:v:0]setpts=PTS-STARTPTS[dis];[1:v:0]setpts=PTS-STARTPTS[ref];[dis][ref]{}",
        libvmaf
    )
}

pub fn parse_vmaf_score(stderr: &str) -> Option<f32> {
    VMAF_SCORE
        .captures_iter(stderr)
        .last()
        .and_then(|caps| caps[1].parse().ok())
}

/// Scores `distorted` against `reference`.
pub async fn vmaf<F>(
    settings: &FfmpegSettings,
    reference: &Path,
    distorted: &Path,
    expected: Option<Duration>,
    on_progress: F,
) -> Result<f32>
where
    F: FnMut(f64) + Send,
{
    let args = FfmpegCommandBuilder::new(distorted)
        .with_input(reference)
        .with_filter(vmaf_filter(settings))
        .build();

    let stderr = run_ffmpeg(&settings.ffmpeg, args, expected, on_progress).await?;
    let score = parse_vmaf_score(&stderr).ok_or_else(|| CrfError::VmafParseError {
        stderr_tail: stderr_tail(&stderr, 12),
    })?;

    tracing::debug!("VMAF {:?} vs {:?}: {:.2}", distorted, reference, score);
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vmaf_score() {
        let stderr = "[Parsed_libvmaf_4 @ 0x55d] VMAF score: 95.123456\n";
        assert_eq!(parse_vmaf_score(stderr), Some(95.123456));
        assert_eq!(parse_vmaf_score("VMAF score = 88\n"), Some(88.0));
        assert_eq!(parse_vmaf_score("frame=  100 fps=25"), None);
    }

    #[test]
    fn test_vmaf_filter_with_model() {
        let settings = FfmpegSettings {
            vmaf_threads: 8,
            vmaf_model: Some("version=vmaf_4k_v0.6.1".to_string()),
            ..FfmpegSettings::default()
        };
        let filter = vmaf_filter(&settings);
        assert!(filter.starts_with("[0:v:0]setpts=PTS-STARTPTS[dis]"));
        assert!(filter.ends_with("libvmaf=n_threads=8:model=version=vmaf_4k_v0.6.1"));
    }
}
