use crate::domain::model::{CrfAttempt, SampleOutput};
use crate::utils::error::Result;
use clap::ValueEnum;
use console::style;
use indicatif::{HumanBytes, HumanDuration};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StdoutFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, Serialize)]
struct SearchJson<'a> {
    crf: u8,
    samples: u64,
    #[serde(flatten)]
    enc: &'a SampleOutput,
}

impl StdoutFormat {
    pub fn format_search_result(self, best: &CrfAttempt) -> Result<String> {
        match self {
            Self::Human => {
                let crf = style(best.crf).bold().green();
                Ok(format!("{} {}", style("crf").dim(), crf) + &human_prediction(&best.enc))
            }
            Self::Json => Ok(serde_json::to_string(&SearchJson {
                crf: best.crf,
                samples: best.samples,
                enc: &best.enc,
            })?),
        }
    }

    pub fn format_sample_result(self, enc: &SampleOutput) -> Result<String> {
        match self {
            Self::Human => Ok(human_prediction(enc).trim_start().to_string()),
            Self::Json => Ok(serde_json::to_string(enc)?),
        }
    }
}

fn human_prediction(enc: &SampleOutput) -> String {
    let vmaf = style(format!("{:.2}", enc.vmaf)).bold().green();
    let size = style(HumanBytes(enc.predicted_encode_size)).bold().green();
    let percent = style(format!("{}%", enc.predicted_encode_percent.round()))
        .bold()
        .green();
    let time = style(HumanDuration(enc.predicted_encode_time)).bold();
    format!(" VMAF {vmaf} predicted full encode size {size} ({percent}) taking {time}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn best() -> CrfAttempt {
        CrfAttempt {
            crf: 32,
            samples: 3,
            enc: SampleOutput {
                vmaf: 95.314,
                predicted_encode_size: 123_456_789,
                predicted_encode_percent: 41.6,
                predicted_encode_time: Duration::from_secs(1800),
            },
        }
    }

    #[test]
    fn test_human_search_result() {
        console::set_colors_enabled(false);
        let line = StdoutFormat::Human.format_search_result(&best()).unwrap();
        assert!(line.starts_with("crf 32 VMAF 95.31 predicted full encode size"));
        assert!(line.contains("(42%)"));
    }

    #[test]
    fn test_json_search_result() {
        let line = StdoutFormat::Json.format_search_result(&best()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["crf"], 32);
        assert_eq!(value["samples"], 3);
        assert_eq!(value["predicted_encode_size"], 123_456_789);
        assert_eq!(value["predicted_encode_time"], 1800.0);
    }

    #[test]
    fn test_json_sample_result() {
        let line = StdoutFormat::Json.format_sample_result(&best().enc).unwrap();
        let parsed: SampleOutput = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, best().enc);
    }
}
