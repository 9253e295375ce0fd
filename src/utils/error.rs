use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrfError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("{program} exited with {status}: {stderr_tail}")]
    FfmpegFailed {
        program: String,
        status: String,
        stderr_tail: String,
    },

    #[error("Failed to probe {path:?}: {message}")]
    ProbeError { path: PathBuf, message: String },

    #[error("Could not read VMAF score from ffmpeg output")]
    VmafParseError { stderr_tail: String },

    #[error("Failed to find a suitable crf (last tried crf {crf}, VMAF {vmaf:.2}, {percent:.0}%)")]
    NoSuitableCrf { crf: u8, vmaf: f32, percent: f64 },

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value {value:?} for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    ExternalTool,
    Search,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl CrfError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CrfError::ConfigValidationError { .. }
            | CrfError::InvalidConfigValueError { .. }
            | CrfError::MissingConfigError { .. } => ErrorCategory::Configuration,
            CrfError::FfmpegFailed { .. }
            | CrfError::ProbeError { .. }
            | CrfError::VmafParseError { .. } => ErrorCategory::ExternalTool,
            CrfError::NoSuitableCrf { .. } | CrfError::ProcessingError { .. } => {
                ErrorCategory::Search
            }
            CrfError::IoError(_) | CrfError::SerializationError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // 參數調整後可重試
            CrfError::NoSuitableCrf { .. } => ErrorSeverity::Medium,
            CrfError::ConfigValidationError { .. }
            | CrfError::InvalidConfigValueError { .. }
            | CrfError::MissingConfigError { .. }
            | CrfError::ProbeError { .. }
            | CrfError::VmafParseError { .. }
            | CrfError::FfmpegFailed { .. }
            | CrfError::ProcessingError { .. } => ErrorSeverity::High,
            CrfError::IoError(_) | CrfError::SerializationError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            CrfError::NoSuitableCrf { .. } => {
                "Try a lower --min-vmaf, a higher --max-encoded-percent or a wider crf range"
            }
            CrfError::FfmpegFailed { .. } => {
                "Check that ffmpeg is installed with libsvtav1 and libvmaf support"
            }
            CrfError::ProbeError { .. } => "Check that the input is a readable video file and ffprobe is on PATH",
            CrfError::VmafParseError { .. } => "Check that ffmpeg was built with --enable-libvmaf",
            CrfError::ConfigValidationError { .. }
            | CrfError::InvalidConfigValueError { .. }
            | CrfError::MissingConfigError { .. } => "Fix the command line flags or the config file",
            CrfError::ProcessingError { .. } => "Re-run with --verbose for details",
            CrfError::IoError(_) => "Check file permissions and free disk space",
            CrfError::SerializationError(_) => "Report this as a bug",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            CrfError::FfmpegFailed { program, status, .. } => {
                format!("{} failed ({})", program, status)
            }
            CrfError::VmafParseError { .. } => "VMAF scoring produced no score".to_string(),
            other => other.to_string(),
        }
    }

    pub fn processing(message: impl Into<String>) -> Self {
        CrfError::ProcessingError {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CrfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_suitable_crf_is_retryable() {
        let err = CrfError::NoSuitableCrf {
            crf: 10,
            vmaf: 91.5,
            percent: 40.0,
        };
        assert_eq!(err.category(), ErrorCategory::Search);
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert!(err.to_string().contains("crf 10"));
    }

    #[test]
    fn test_ffmpeg_failure_message_hides_stderr() {
        let err = CrfError::FfmpegFailed {
            program: "ffmpeg".to_string(),
            status: "exit status: 1".to_string(),
            stderr_tail: "Unknown encoder 'libsvtav1'".to_string(),
        };
        assert_eq!(err.user_friendly_message(), "ffmpeg failed (exit status: 1)");
        assert!(err.to_string().contains("libsvtav1"));
        assert_eq!(err.category(), ErrorCategory::ExternalTool);
    }

    #[test]
    fn test_io_error_is_critical() {
        let err: CrfError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }
}
