use crate::adapters::ffmpeg::{run_ffmpeg, FfmpegCommandBuilder, FfmpegSettings};
use crate::adapters::ffprobe;
use crate::core::crf_search::BAR_LEN;
use crate::utils::error::{CrfError, Result};
use indicatif::ProgressBar;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// `movie.mp4` => `movie.av1.mp4`, inputs without an extension get `.mkv`.
pub fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mkv".to_string());
    input.with_file_name(format!("{}.av1.{}", stem, ext))
}

pub fn encode_args(
    settings: &FfmpegSettings,
    input: &Path,
    output: &Path,
    crf: u8,
    preset: u8,
) -> Vec<OsString> {
    FfmpegCommandBuilder::new(input)
        .with_map("0:v:0")
        .with_map("0:a?")
        .with_map("0:s?")
        .with_codec("v", &settings.video_codec)
        .with_codec("a", &settings.audio_codec)
        .with_codec("s", "copy")
        .with_crf(crf)
        .with_preset(preset)
        .with_pix_fmt(&settings.pix_fmt)
        .with_extra_args(&settings.extra_encode_args)
        .with_output(output)
        .build()
}

/// Encodes the whole input at `crf`, returns the output path.
pub async fn encode(
    settings: &FfmpegSettings,
    input: &Path,
    output: Option<&Path>,
    crf: u8,
    preset: u8,
    bar: &ProgressBar,
) -> Result<PathBuf> {
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output(input));
    if output == input {
        return Err(CrfError::InvalidConfigValueError {
            field: "output".to_string(),
            value: output.display().to_string(),
            reason: "Output would overwrite the input".to_string(),
        });
    }

    let probe = ffprobe::probe(&settings.ffprobe, input).await?;
    tracing::info!("Encoding {:?} -> {:?} (crf {}, preset {})", input, output, crf, preset);

    bar.set_length(BAR_LEN);
    let args = encode_args(settings, input, &output, crf, preset);
    run_ffmpeg(&settings.ffmpeg, args, Some(probe.duration), |p| {
        bar.set_position((p * BAR_LEN as f64) as u64);
    })
    .await?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output() {
        assert_eq!(
            default_output(Path::new("/videos/movie.mp4")),
            PathBuf::from("/videos/movie.av1.mp4")
        );
        assert_eq!(
            default_output(Path::new("clip")),
            PathBuf::from("clip.av1.mkv")
        );
    }

    #[test]
    fn test_encode_args_map_all_streams() {
        let args: Vec<String> = encode_args(
            &FfmpegSettings::default(),
            Path::new("in.mkv"),
            Path::new("out.mkv"),
            30,
            6,
        )
        .into_iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();

        for map in ["0:v:0", "0:a?", "0:s?"] {
            assert!(args.iter().any(|a| a == map), "missing map {}", map);
        }
        let codec = args.iter().position(|a| a == "-c:v").unwrap();
        assert_eq!(args[codec + 1], "libsvtav1");
        let audio = args.iter().position(|a| a == "-c:a").unwrap();
        assert_eq!(args[audio + 1], "libopus");
        assert_eq!(args.last().unwrap(), "out.mkv");
        assert!(!args.iter().any(|a| a == "-an"));
    }

    #[tokio::test]
    async fn test_refuses_to_overwrite_input() {
        let bar = ProgressBar::hidden();
        let result = encode(
            &FfmpegSettings::default(),
            Path::new("movie.mkv"),
            Some(Path::new("movie.mkv")),
            30,
            8,
            &bar,
        )
        .await;
        assert!(matches!(result, Err(CrfError::InvalidConfigValueError { .. })));
    }
}
