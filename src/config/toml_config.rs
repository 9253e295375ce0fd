use crate::adapters::ffmpeg::FfmpegSettings;
use crate::core::output::StdoutFormat;
use crate::utils::error::{CrfError, Result};
use crate::utils::validation::{
    validate_crf_bounds, validate_non_empty_string, validate_path, validate_positive_number,
    validate_range, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var regex"));

/// Optional defaults file, every value can be overridden on the command line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub search: SearchDefaults,
    pub ffmpeg: FfmpegSettings,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchDefaults {
    pub preset: Option<u8>,
    pub min_vmaf: Option<f32>,
    pub max_encoded_percent: Option<f32>,
    pub min_crf: Option<u8>,
    pub max_crf: Option<u8>,
    pub samples: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub keep: Option<bool>,
    pub stdout_format: Option<StdoutFormat>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(CrfError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| CrfError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${FFMPEG_PATH})，未設定的保持原樣
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    /// Loads `path` when given, otherwise all defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                tracing::info!("📁 Loading configuration from: {}", path.display());
                Self::from_file(path)
            }
            None => Ok(Self::default()),
        }
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        let search = &self.search;
        if let Some(preset) = search.preset {
            validate_range("search.preset", preset, 0, 13)?;
        }
        if let Some(min_vmaf) = search.min_vmaf {
            validate_range("search.min_vmaf", min_vmaf, 0.0, 100.0)?;
        }
        if let Some(percent) = search.max_encoded_percent {
            validate_range("search.max_encoded_percent", percent, 0.0, 1000.0)?;
        }
        if let Some(min_crf) = search.min_crf {
            validate_range("search.min_crf", min_crf, 1, 63)?;
        }
        if let Some(max_crf) = search.max_crf {
            validate_range("search.max_crf", max_crf, 1, 63)?;
        }
        if let (Some(min_crf), Some(max_crf)) = (search.min_crf, search.max_crf) {
            validate_crf_bounds(min_crf, max_crf)?;
        }
        if let Some(samples) = search.samples {
            validate_positive_number("search.samples", samples, 1)?;
        }

        let ffmpeg = &self.ffmpeg;
        validate_path("ffmpeg.ffmpeg", &ffmpeg.ffmpeg)?;
        validate_path("ffmpeg.ffprobe", &ffmpeg.ffprobe)?;
        validate_non_empty_string("ffmpeg.video_codec", &ffmpeg.video_codec)?;
        validate_non_empty_string("ffmpeg.pix_fmt", &ffmpeg.pix_fmt)?;
        validate_non_empty_string("ffmpeg.audio_codec", &ffmpeg.audio_codec)?;
        validate_range("ffmpeg.sample_duration_secs", ffmpeg.sample_duration_secs, 1.0, 600.0)?;
        validate_positive_number("ffmpeg.vmaf_threads", ffmpeg.vmaf_threads as u64, 1)?;
        if let Some(work_dir) = &ffmpeg.work_dir {
            validate_path("ffmpeg.work_dir", work_dir)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_toml_config() {
        let toml_content = r#"
[search]
preset = 6
min_vmaf = 93.5
max_crf = 50

[ffmpeg]
ffmpeg = "/opt/ffmpeg/bin/ffmpeg"
video_codec = "libaom-av1"
sample_duration_secs = 10.0
vmaf_threads = 2

[output]
keep = true
stdout_format = "json"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.search.preset, Some(6));
        assert_eq!(config.search.min_vmaf, Some(93.5));
        assert_eq!(config.search.min_crf, None);
        assert_eq!(config.ffmpeg.ffmpeg, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.ffmpeg.video_codec, "libaom-av1");
        // 未指定的欄位使用預設值
        assert_eq!(config.ffmpeg.pix_fmt, "yuv420p10le");
        assert_eq!(config.output.stdout_format, Some(StdoutFormat::Json));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_is_default() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("CRF_SEEK_TEST_FFPROBE", "/usr/local/bin/ffprobe");

        let toml_content = r#"
[ffmpeg]
ffprobe = "${CRF_SEEK_TEST_FFPROBE}"
ffmpeg = "${CRF_SEEK_TEST_UNSET_VAR}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.ffmpeg.ffprobe, PathBuf::from("/usr/local/bin/ffprobe"));
        assert_eq!(config.ffmpeg.ffmpeg, PathBuf::from("${CRF_SEEK_TEST_UNSET_VAR}"));

        std::env::remove_var("CRF_SEEK_TEST_FFPROBE");
    }

    #[test]
    fn test_config_validation() {
        let config = TomlConfig::from_toml_str("[search]\nmin_crf = 40\nmax_crf = 30\n").unwrap();
        assert!(config.validate().is_err());

        let config = TomlConfig::from_toml_str("[search]\nmin_vmaf = 120.0\n").unwrap();
        assert!(config.validate().is_err());

        let config = TomlConfig::from_toml_str("[ffmpeg]\nvideo_codec = \" \"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = TomlConfig::from_toml_str("[search\npreset = 1");
        assert!(matches!(result, Err(CrfError::ConfigValidationError { .. })));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[search]\nsamples = 5\n").unwrap();

        let config = TomlConfig::load(Some(temp_file.path())).unwrap();
        assert_eq!(config.search.samples, Some(5));
    }
}
