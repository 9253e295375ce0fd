use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One sample-encode job.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRequest {
    pub input: PathBuf,
    pub crf: u8,
    pub preset: u8,
    pub samples: u64,
    pub keep: bool,
}

/// Sample-encode result extrapolated to the full input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleOutput {
    /// Mean VMAF over all samples.
    pub vmaf: f32,
    pub predicted_encode_size: u64,
    pub predicted_encode_percent: f64,
    #[serde(with = "duration_secs")]
    pub predicted_encode_time: Duration,
}

/// One iteration of the crf search.
#[derive(Debug, Clone, PartialEq)]
pub struct CrfAttempt {
    pub crf: u8,
    pub samples: u64,
    pub enc: SampleOutput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub preset: u8,
    pub min_vmaf: f32,
    pub max_encoded_percent: f32,
    pub min_crf: u8,
    pub max_crf: u8,
    pub samples: u64,
}

impl Default for SearchCriteria {
    fn default() -> Self {
        Self {
            preset: 8,
            min_vmaf: 95.0,
            max_encoded_percent: 80.0,
            min_crf: 10,
            max_crf: 55,
            samples: 3,
        }
    }
}

/// Facts about an input file needed to place and extrapolate samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeInfo {
    pub duration: Duration,
    pub size: u64,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
