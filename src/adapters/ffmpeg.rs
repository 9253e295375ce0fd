//! ffmpeg command construction and execution.
//!
//! Every ffmpeg run goes through [`run_ffmpeg`], which asks ffmpeg for
//! machine-readable progress on stdout (`-progress pipe:1`) and drains stderr
//! in a background task so neither pipe can fill up and stall the child.

use crate::utils::error::{CrfError, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// stderr 只保留最後這麼多行
const STDERR_KEEP_LINES: usize = 200;
const STDERR_TAIL_LINES: usize = 12;

/// ffmpeg related settings, also the `[ffmpeg]` section of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegSettings {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub video_codec: String,
    pub pix_fmt: String,
    pub audio_codec: String,
    /// Length of each sample in seconds.
    pub sample_duration_secs: f64,
    pub vmaf_threads: usize,
    pub vmaf_model: Option<String>,
    /// Parent of the private `crf-seek-*` sample directory, defaults to the system temp dir.
    pub work_dir: Option<PathBuf>,
    /// Extra arguments appended to every encode.
    pub extra_encode_args: Vec<String>,
}

impl Default for FfmpegSettings {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            video_codec: "libsvtav1".to_string(),
            pix_fmt: "yuv420p10le".to_string(),
            audio_codec: "libopus".to_string(),
            sample_duration_secs: 20.0,
            vmaf_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            vmaf_model: None,
            work_dir: None,
            extra_encode_args: Vec::new(),
        }
    }
}

impl FfmpegSettings {
    pub fn sample_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.sample_duration_secs).unwrap_or(Duration::from_secs(20))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Output {
    File(PathBuf),
    Null,
}

#[derive(Debug, Clone)]
pub struct FfmpegCommandBuilder {
    seek: Option<Duration>,
    inputs: Vec<PathBuf>,
    duration: Option<Duration>,
    maps: Vec<String>,
    codecs: Vec<(String, String)>,
    crf: Option<u8>,
    preset: Option<u8>,
    pix_fmt: Option<String>,
    no_audio: bool,
    filter: Option<String>,
    extra: Vec<String>,
    output: Output,
}

impl FfmpegCommandBuilder {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            seek: None,
            inputs: vec![input.into()],
            duration: None,
            maps: Vec::new(),
            codecs: Vec::new(),
            crf: None,
            preset: None,
            pix_fmt: None,
            no_audio: false,
            filter: None,
            extra: Vec::new(),
            output: Output::Null,
        }
    }

    /// Input side seek, applies to the first input.
    pub fn with_seek(mut self, start: Duration) -> Self {
        self.seek = Some(start);
        self
    }

    pub fn with_input(mut self, input: impl Into<PathBuf>) -> Self {
        self.inputs.push(input.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_map(mut self, map: &str) -> Self {
        self.maps.push(map.to_string());
        self
    }

    /// `stream` is the codec specifier suffix, e.g. `v`, `a`, `s`.
    pub fn with_codec(mut self, stream: &str, codec: &str) -> Self {
        self.codecs.push((stream.to_string(), codec.to_string()));
        self
    }

    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = Some(crf);
        self
    }

    pub fn with_preset(mut self, preset: u8) -> Self {
        self.preset = Some(preset);
        self
    }

    pub fn with_pix_fmt(mut self, pix_fmt: &str) -> Self {
        self.pix_fmt = Some(pix_fmt.to_string());
        self
    }

    pub fn without_audio(mut self) -> Self {
        self.no_audio = true;
        self
    }

    pub fn with_filter(mut self, filter: String) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_extra_args(mut self, extra: &[String]) -> Self {
        self.extra.extend(extra.iter().cloned());
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Output::File(output.into());
        self
    }

    pub fn build(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-y".into()];

        if let Some(seek) = self.seek {
            args.push("-ss".into());
            args.push(format_secs(seek).into());
        }
        for input in &self.inputs {
            args.push("-i".into());
            args.push(input.clone().into_os_string());
        }
        if let Some(duration) = self.duration {
            args.push("-t".into());
            args.push(format_secs(duration).into());
        }
        if let Some(filter) = &self.filter {
            args.push("-lavfi".into());
            args.push(filter.into());
        }
        for map in &self.maps {
            args.push("-map".into());
            args.push(map.into());
        }
        for (stream, codec) in &self.codecs {
            args.push(format!("-c:{}", stream).into());
            args.push(codec.into());
        }
        if let Some(crf) = self.crf {
            args.push("-crf".into());
            args.push(crf.to_string().into());
        }
        if let Some(preset) = self.preset {
            args.push("-preset".into());
            args.push(preset.to_string().into());
        }
        if let Some(pix_fmt) = &self.pix_fmt {
            args.push("-pix_fmt".into());
            args.push(pix_fmt.into());
        }
        if self.no_audio {
            args.push("-an".into());
        }
        args.extend(self.extra.iter().map(OsString::from));

        match &self.output {
            Output::File(path) => args.push(path.clone().into_os_string()),
            Output::Null => {
                args.extend(["-f", "null", "-"].map(OsString::from));
            }
        }

        args
    }
}

fn format_secs(d: Duration) -> String {
    format!("{:.3}", d.as_secs_f64())
}

/// Reads `key=value` style fields, as printed by ffmpeg stats and `-progress` lines.
pub fn extract_value(line: &str, key: &str) -> Option<String> {
    let start = line.find(key)?;
    let after_key = &line[start + key.len()..];
    let value_part = after_key.trim_start();
    let end = value_part
        .find(char::is_whitespace)
        .unwrap_or(value_part.len());
    let value = &value_part[..end];
    (!value.is_empty()).then(|| value.to_string())
}

/// Encoded position from a `-progress` line, if the line carries one.
pub fn parse_progress_time(line: &str) -> Option<Duration> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // out_time_ms 其實也是微秒
        "out_time_us" | "out_time_ms" => value.parse::<u64>().ok().map(Duration::from_micros),
        _ => None,
    }
}

pub fn stderr_tail(stderr: &str, lines: usize) -> String {
    let all: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

/// Runs ffmpeg to completion, reporting progress as a fraction of `expected`.
///
/// Returns the captured stderr (last lines only) on success.
pub async fn run_ffmpeg<F>(
    program: &Path,
    args: Vec<OsString>,
    expected: Option<Duration>,
    mut on_progress: F,
) -> Result<String>
where
    F: FnMut(f64) + Send,
{
    let program_name = program.display().to_string();
    tracing::debug!("Running {} {:?}", program_name, args);

    let mut child = Command::new(program)
        .args(["-progress", "pipe:1", "-nostats"])
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| CrfError::FfmpegFailed {
            program: program_name.clone(),
            status: "failed to start".to_string(),
            stderr_tail: e.to_string(),
        })?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| CrfError::processing("ffmpeg stderr was not captured"))?;
    let stderr_task = tokio::spawn(async move {
        let mut kept = VecDeque::with_capacity(STDERR_KEEP_LINES);
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::trace!("ffmpeg: {}", line);
            if kept.len() == STDERR_KEEP_LINES {
                kept.pop_front();
            }
            kept.push_back(line);
        }
        Vec::from(kept).join("\n")
    });

    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let (Some(time), Some(total)) = (parse_progress_time(&line), expected) {
                if !total.is_zero() {
                    on_progress((time.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0));
                }
            } else if let Some(speed) = extract_value(&line, "speed=") {
                tracing::trace!("{} speed {}", program_name, speed);
            }
        }
    }

    let status = child.wait().await?;
    let stderr = stderr_task.await.unwrap_or_default();

    if !status.success() {
        return Err(CrfError::FfmpegFailed {
            program: program_name,
            status: status.to_string(),
            stderr_tail: stderr_tail(&stderr, STDERR_TAIL_LINES),
        });
    }
    on_progress(1.0);

    Ok(stderr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_sample_extract_command() {
        let args = strings(
            FfmpegCommandBuilder::new("in.mkv")
                .with_seek(Duration::from_secs(60))
                .with_duration(Duration::from_secs(20))
                .with_map("0:v:0")
                .with_codec("v", "copy")
                .without_audio()
                .with_output("/tmp/s.mkv")
                .build(),
        );

        assert_eq!(
            args,
            vec![
                "-hide_banner", "-y", "-ss", "60.000", "-i", "in.mkv", "-t", "20.000", "-map",
                "0:v:0", "-c:v", "copy", "-an", "/tmp/s.mkv"
            ]
        );
    }

    #[test]
    fn test_encode_command_with_null_output() {
        let args = strings(
            FfmpegCommandBuilder::new("in.mkv")
                .with_codec("v", "libsvtav1")
                .with_crf(32)
                .with_preset(8)
                .with_pix_fmt("yuv420p10le")
                .build(),
        );

        let crf = args.iter().position(|a| a == "-crf").unwrap();
        assert_eq!(args[crf + 1], "32");
        let preset = args.iter().position(|a| a == "-preset").unwrap();
        assert_eq!(args[preset + 1], "8");
        assert_eq!(&args[args.len() - 3..], ["-f", "null", "-"]);
    }

    #[test]
    fn test_extract_value() {
        let line = "frame= 123 fps= 60.0 size= 1024kB time=00:00:10.00 bitrate= 2000.0kbits/s speed= 1.0x";

        assert_eq!(extract_value(line, "frame="), Some("123".to_string()));
        assert_eq!(extract_value(line, "time="), Some("00:00:10.00".to_string()));
        assert_eq!(extract_value(line, "speed="), Some("1.0x".to_string()));
        assert_eq!(extract_value(line, "missing="), None);
    }

    #[test]
    fn test_parse_progress_time() {
        assert_eq!(
            parse_progress_time("out_time_us=12500000"),
            Some(Duration::from_millis(12_500))
        );
        assert_eq!(
            parse_progress_time("out_time_ms=1000000\n"),
            Some(Duration::from_secs(1))
        );
        assert_eq!(parse_progress_time("out_time_us=N/A"), None);
        assert_eq!(parse_progress_time("progress=continue"), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_ffmpeg_reports_progress() {
        let temp = tempfile::TempDir::new().unwrap();
        let ffmpeg = crate::adapters::fake_tool::write_script(
            temp.path(),
            "ffmpeg",
            r#"echo "out_time_us=5000000"
echo "speed=2.01x"
echo "out_time_ms=10000000"
echo "progress=end"
echo "encoding done" >&2"#,
        );

        let mut progress = Vec::new();
        let stderr = run_ffmpeg(&ffmpeg, Vec::new(), Some(Duration::from_secs(20)), |p| {
            progress.push(p)
        })
        .await
        .unwrap();

        assert_eq!(progress, vec![0.25, 0.5, 1.0]);
        assert_eq!(stderr, "encoding done");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_ffmpeg_failure_keeps_stderr_tail() {
        let temp = tempfile::TempDir::new().unwrap();
        let ffmpeg = crate::adapters::fake_tool::write_script(
            temp.path(),
            "ffmpeg",
            r#"echo "out_time_us=5000000"
echo "Input #0, matroska" >&2
echo "Unknown encoder 'libsvtav1'" >&2
exit 1"#,
        );

        let mut progress = Vec::new();
        let result = run_ffmpeg(&ffmpeg, Vec::new(), Some(Duration::from_secs(20)), |p| {
            progress.push(p)
        })
        .await;

        assert_eq!(progress, vec![0.25]);
        match result {
            Err(CrfError::FfmpegFailed {
                status,
                stderr_tail,
                ..
            }) => {
                assert!(status.contains('1'), "{}", status);
                assert!(stderr_tail.ends_with("Unknown encoder 'libsvtav1'"));
            }
            other => panic!("expected FfmpegFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_stderr_tail() {
        let stderr = "a\n\nb\nc\nd\n";
        assert_eq!(stderr_tail(stderr, 2), "c\nd");
        assert_eq!(stderr_tail(stderr, 10), "a\nb\nc\nd");
    }

    #[tokio::test]
    async fn test_missing_program_is_ffmpeg_failure() {
        let result = run_ffmpeg(
            Path::new("/definitely/not/ffmpeg"),
            vec![],
            None,
            |_| {},
        )
        .await;

        match result {
            Err(CrfError::FfmpegFailed { status, .. }) => assert_eq!(status, "failed to start"),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
