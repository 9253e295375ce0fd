use crate::config::toml_config::TomlConfig;
use crate::core::output::StdoutFormat;
use crate::domain::model::SearchCriteria;
use crate::utils::error::{CrfError, Result};
use crate::utils::validation::{
    validate_crf_bounds, validate_existing_file, validate_path, validate_positive_number,
    validate_range, Validate,
};
use clap::Args;
use std::path::PathBuf;

pub const MAX_CRF: u8 = 63;
pub const MAX_PRESET: u8 = 13;

/// Search flags shared by `crf-search` and `auto-encode`.
///
/// Unset flags fall back to the config file, then to built-in defaults.
#[derive(Debug, Clone, Default, Args)]
pub struct SearchArgs {
    /// Input video file.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Encoder preset. Higher presets means faster encodes, but with a quality tradeoff.
    #[arg(long)]
    pub preset: Option<u8>,

    /// Desired VMAF score [default: 95]
    #[arg(long)]
    pub min_vmaf: Option<f32>,

    /// Maximum desired encoded size percentage of the input size [default: 80]
    #[arg(long)]
    pub max_encoded_percent: Option<f32>,

    /// Minimum (highest quality) crf value to try [default: 10]
    #[arg(long)]
    pub min_crf: Option<u8>,

    /// Maximum (lowest quality) crf value to try [default: 55]
    #[arg(long)]
    pub max_crf: Option<u8>,

    /// Number of samples to use across the input video [default: 3].
    /// More samples take longer but may provide a more accurate result.
    #[arg(long)]
    pub samples: Option<u64>,
}

impl SearchArgs {
    /// 命令列 > 設定檔 > 預設值
    pub fn criteria(&self, config: &TomlConfig) -> Result<SearchCriteria> {
        let defaults = SearchCriteria::default();
        let file = &config.search;

        let preset = self
            .preset
            .or(file.preset)
            .ok_or_else(|| CrfError::MissingConfigError {
                field: "preset".to_string(),
            })?;

        Ok(SearchCriteria {
            preset,
            min_vmaf: self.min_vmaf.or(file.min_vmaf).unwrap_or(defaults.min_vmaf),
            max_encoded_percent: self
                .max_encoded_percent
                .or(file.max_encoded_percent)
                .unwrap_or(defaults.max_encoded_percent),
            min_crf: self.min_crf.or(file.min_crf).unwrap_or(defaults.min_crf),
            max_crf: self.max_crf.or(file.max_crf).unwrap_or(defaults.max_crf),
            samples: self.samples.or(file.samples).unwrap_or(defaults.samples),
        })
    }
}

impl Validate for SearchCriteria {
    fn validate(&self) -> Result<()> {
        validate_range("preset", self.preset, 0, MAX_PRESET)?;
        validate_range("min_vmaf", self.min_vmaf, 0.0, 100.0)?;
        validate_range("max_encoded_percent", self.max_encoded_percent, 0.0, 1000.0)?;
        validate_range("min_crf", self.min_crf, 1, MAX_CRF)?;
        validate_range("max_crf", self.max_crf, 1, MAX_CRF)?;
        validate_crf_bounds(self.min_crf, self.max_crf)?;
        validate_positive_number("samples", self.samples, 1)
    }
}

impl Validate for SearchArgs {
    fn validate(&self) -> Result<()> {
        validate_existing_file("input", &self.input)
    }
}

#[derive(Debug, Clone, Args)]
pub struct CrfSearchArgs {
    #[command(flatten)]
    pub search: SearchArgs,

    /// Stdout message format [default: human]
    #[arg(long, value_enum)]
    pub stdout_format: Option<StdoutFormat>,
}

#[derive(Debug, Clone, Args)]
pub struct SampleEncodeArgs {
    /// Input video file.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Encoder constant rate factor. Lower means better quality.
    #[arg(long)]
    pub crf: u8,

    /// Encoder preset [default: from config file]
    #[arg(long)]
    pub preset: Option<u8>,

    /// Number of samples to use across the input video [default: 3]
    #[arg(long)]
    pub samples: Option<u64>,

    /// Keep temporary sample files after exit.
    #[arg(long)]
    pub keep: bool,

    /// Stdout message format [default: human]
    #[arg(long, value_enum)]
    pub stdout_format: Option<StdoutFormat>,
}

impl Validate for SampleEncodeArgs {
    fn validate(&self) -> Result<()> {
        validate_existing_file("input", &self.input)?;
        validate_range("crf", self.crf, 1, MAX_CRF)?;
        if let Some(preset) = self.preset {
            validate_range("preset", preset, 0, MAX_PRESET)?;
        }
        if let Some(samples) = self.samples {
            validate_positive_number("samples", samples, 1)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
pub struct EncodeArgs {
    /// Input video file.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Encoder constant rate factor.
    #[arg(long)]
    pub crf: u8,

    /// Encoder preset [default: from config file]
    #[arg(long)]
    pub preset: Option<u8>,

    /// Output file [default: <input stem>.av1.<ext>]
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl Validate for EncodeArgs {
    fn validate(&self) -> Result<()> {
        validate_existing_file("input", &self.input)?;
        validate_range("crf", self.crf, 1, MAX_CRF)?;
        if let Some(preset) = self.preset {
            validate_range("preset", preset, 0, MAX_PRESET)?;
        }
        if let Some(output) = &self.output {
            validate_path("output", output)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
pub struct AutoEncodeArgs {
    #[command(flatten)]
    pub search: SearchArgs,

    /// Output file [default: <input stem>.av1.<ext>]
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct VmafArgs {
    /// Original video.
    #[arg(long)]
    pub reference: PathBuf,

    /// Encoded video to score against the reference.
    #[arg(long)]
    pub distorted: PathBuf,
}

impl Validate for VmafArgs {
    fn validate(&self) -> Result<()> {
        validate_existing_file("reference", &self.reference)?;
        validate_existing_file("distorted", &self.distorted)
    }
}

/// Preset from the command line, else from the config file.
pub fn resolve_preset(preset: Option<u8>, config: &TomlConfig) -> Result<u8> {
    let preset = preset
        .or(config.search.preset)
        .ok_or_else(|| CrfError::MissingConfigError {
            field: "preset".to_string(),
        })?;
    validate_range("preset", preset, 0, MAX_PRESET)?;
    Ok(preset)
}
