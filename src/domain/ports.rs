use crate::domain::model::{SampleOutput, SampleRequest};
use crate::utils::error::Result;
use async_trait::async_trait;
use tokio::sync::watch;

/// Encodes samples of an input at a given crf and scores them.
///
/// Progress of the running job is published as a fraction in `0.0..=1.0`.
#[async_trait]
pub trait SampleEncoder: Send + Sync {
    async fn sample_encode(
        &self,
        request: &SampleRequest,
        progress: watch::Sender<f64>,
    ) -> Result<SampleOutput>;
}
