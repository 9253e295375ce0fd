use crate::adapters::ffmpeg::{run_ffmpeg, FfmpegCommandBuilder, FfmpegSettings};
use crate::adapters::{ffprobe, vmaf};
use crate::core::sample_encode::{aggregate, plan_samples, SamplePlan, SampleScore};
use crate::domain::model::{SampleOutput, SampleRequest};
use crate::domain::ports::SampleEncoder;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::watch;

/// 每個樣本中編碼所佔的進度比例，其餘為 VMAF
const ENCODE_SHARE: f64 = 0.75;

/// [`SampleEncoder`] backed by ffmpeg, ffprobe and libvmaf.
///
/// Each encoder owns a fresh `crf-seek-*` directory created under the
/// configured work dir (or the system temp dir). Extracted samples are cached
/// there, keyed on the input and the sample window, so repeated crf runs over
/// the same input only cut the samples once.
pub struct FfmpegSampleEncoder {
    settings: FfmpegSettings,
    work_dir: PathBuf,
}

impl FfmpegSampleEncoder {
    pub fn new(settings: FfmpegSettings) -> Result<Self> {
        let root = settings.work_dir.clone().unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&root)?;
        // 只有這個子目錄屬於我們，cleanup 不碰 root 底下其他檔案
        let work_dir = tempfile::Builder::new()
            .prefix("crf-seek-")
            .tempdir_in(&root)?
            .keep();
        tracing::debug!("Work dir {:?}", work_dir);

        Ok(Self { settings, work_dir })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn settings(&self) -> &FfmpegSettings {
        &self.settings
    }

    /// Removes this encoder's own work directory and everything in it.
    pub async fn cleanup(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.work_dir).await {
            Ok(()) => {
                tracing::debug!("Removed work dir {:?}", self.work_dir);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn extract_sample(
        &self,
        input: &Path,
        index: usize,
        count: usize,
        start: Duration,
        duration: Duration,
    ) -> Result<PathBuf> {
        let canonical = tokio::fs::canonicalize(input).await?;
        let metadata = tokio::fs::metadata(&canonical).await?;
        let key = sample_key(&canonical, metadata.len(), metadata.modified().ok(), start, duration);

        let name = format!("{}.sample{}of{}.{}.mkv", file_stem(input), index + 1, count, key);
        let path = self.work_dir.join(&name);
        if tokio::fs::try_exists(&path).await? {
            tracing::debug!("Reusing sample {:?}", path);
            return Ok(path);
        }

        // 先寫到 .part，成功才改名，中斷的檔案不會被當成快取
        let part = self.work_dir.join(format!("{}.part", name));
        let args = FfmpegCommandBuilder::new(input)
            .with_seek(start)
            .with_duration(duration)
            .with_map("0:v:0")
            .with_codec("v", "copy")
            .without_audio()
            .with_extra_args(&["-f".to_string(), "matroska".to_string()])
            .with_output(&part)
            .build();
        run_ffmpeg(&self.settings.ffmpeg, args, None, |_| {}).await?;
        tokio::fs::rename(&part, &path).await?;

        Ok(path)
    }

    async fn encode_sample<F>(
        &self,
        sample: &Path,
        request: &SampleRequest,
        expected: Duration,
        on_progress: F,
    ) -> Result<(PathBuf, Duration)>
    where
        F: FnMut(f64) + Send,
    {
        let output = self.work_dir.join(format!(
            "{}.crf{}.p{}.mkv",
            file_stem(sample),
            request.crf,
            request.preset
        ));

        let args = FfmpegCommandBuilder::new(sample)
            .with_map("0:v:0")
            .with_codec("v", &self.settings.video_codec)
            .with_crf(request.crf)
            .with_preset(request.preset)
            .with_pix_fmt(&self.settings.pix_fmt)
            .without_audio()
            .with_extra_args(&self.settings.extra_encode_args)
            .with_output(&output)
            .build();

        let started = Instant::now();
        run_ffmpeg(&self.settings.ffmpeg, args, Some(expected), on_progress).await?;
        Ok((output, started.elapsed()))
    }
}

#[async_trait]
impl SampleEncoder for FfmpegSampleEncoder {
    async fn sample_encode(
        &self,
        request: &SampleRequest,
        progress: watch::Sender<f64>,
    ) -> Result<SampleOutput> {
        tokio::fs::create_dir_all(&self.work_dir).await?;

        let probe = ffprobe::probe(&self.settings.ffprobe, &request.input).await?;
        let plan = plan_samples(probe.duration, request.samples, self.settings.sample_duration());
        let count = plan.len();
        tracing::debug!(
            "crf {} preset {}: {} sample(s) of {:?}",
            request.crf,
            request.preset,
            count,
            request.input
        );

        // (參考檔, 長度)
        let mut references = Vec::with_capacity(count);
        match &plan {
            SamplePlan::Full => references.push((request.input.clone(), probe.duration)),
            SamplePlan::Windows(windows) => {
                for (i, window) in windows.iter().enumerate() {
                    let path = self
                        .extract_sample(&request.input, i, count, window.start, window.duration)
                        .await?;
                    references.push((path, window.duration));
                }
            }
        }

        let mut scores = Vec::with_capacity(count);
        let mut sampled_duration = Duration::ZERO;
        for (i, (reference, duration)) in references.iter().enumerate() {
            let base = i as f64 / count as f64;
            let span = 1.0 / count as f64;

            let (encoded, encode_time) = self
                .encode_sample(reference, request, *duration, |p| {
                    progress.send_replace(base + span * ENCODE_SHARE * p);
                })
                .await?;

            let score = vmaf::vmaf(&self.settings, reference, &encoded, Some(*duration), |p| {
                progress.send_replace(base + span * (ENCODE_SHARE + (1.0 - ENCODE_SHARE) * p));
            })
            .await?;

            let sample_size = tokio::fs::metadata(reference).await?.len();
            let encoded_size = tokio::fs::metadata(&encoded).await?.len();
            scores.push(SampleScore {
                vmaf: score,
                sample_size,
                encoded_size,
                encode_time,
            });
            sampled_duration += *duration;

            if !request.keep {
                tokio::fs::remove_file(&encoded).await?;
            }
        }

        progress.send_replace(1.0);
        Ok(aggregate(&probe, &scores, sampled_duration))
    }
}

/// Identifies a sample by source file (path, size, mtime) and window.
fn sample_key(
    input: &Path,
    size: u64,
    modified: Option<SystemTime>,
    start: Duration,
    duration: Duration,
) -> String {
    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    size.hash(&mut hasher);
    modified.hash(&mut hasher);
    start.hash(&mut hasher);
    duration.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string())
}
