pub mod crf_search;
pub mod encode;
pub mod output;
pub mod sample_encode;

pub use crate::domain::model::{CrfAttempt, ProbeInfo, SampleOutput, SampleRequest, SearchCriteria};
pub use crate::domain::ports::SampleEncoder;
pub use crate::utils::error::Result;
