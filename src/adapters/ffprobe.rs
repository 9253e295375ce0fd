use crate::domain::model::ProbeInfo;
use crate::utils::error::{CrfError, Result};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

/// Probes duration (ffprobe) and size (filesystem) of a media file.
pub async fn probe(ffprobe: &Path, input: &Path) -> Result<ProbeInfo> {
    // ffprobe -v error -show_entries format=duration -of default=noprint_wrappers=1:nokey=1 input.mkv
    let output = Command::new(ffprobe)
        .arg("-v")
        .arg("error")
        .arg("-show_entries")
        .arg("format=duration")
        .arg("-of")
        .arg("default=noprint_wrappers=1:nokey=1")
        .arg(input)
        .output()
        .await
        .map_err(|e| CrfError::ProbeError {
            path: input.to_path_buf(),
            message: format!("Failed to execute {}: {}", ffprobe.display(), e),
        })?;

    if !output.status.success() {
        return Err(CrfError::ProbeError {
            path: input.to_path_buf(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let duration = parse_duration(&String::from_utf8_lossy(&output.stdout)).map_err(|message| {
        CrfError::ProbeError {
            path: input.to_path_buf(),
            message,
        }
    })?;
    let size = tokio::fs::metadata(input).await?.len();

    tracing::debug!("Probed {:?}: duration {:?}, {} bytes", input, duration, size);
    Ok(ProbeInfo { duration, size })
}

pub(crate) fn parse_duration(stdout: &str) -> std::result::Result<Duration, String> {
    let duration_str = stdout.trim();
    let secs = duration_str
        .parse::<f64>()
        .map_err(|e| format!("Failed to parse duration '{}': {}", duration_str, e))?;
    Duration::try_from_secs_f64(secs)
        .map_err(|e| format!("Invalid duration '{}': {}", duration_str, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("120.500000\n"), Ok(Duration::from_millis(120_500)));
        assert!(parse_duration("N/A").is_err());
        assert!(parse_duration("-1.0").is_err());
    }
}
