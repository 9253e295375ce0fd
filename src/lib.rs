pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::ffmpeg::FfmpegSettings;
pub use adapters::sample_encoder::FfmpegSampleEncoder;
pub use config::{toml_config::TomlConfig, CliConfig};
pub use core::crf_search::CrfSearch;
pub use domain::model::{CrfAttempt, SampleOutput, SampleRequest, SearchCriteria};
pub use domain::ports::SampleEncoder;
pub use utils::error::{CrfError, Result};
