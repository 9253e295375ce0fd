//! One function per subcommand: resolve settings, run the work behind a
//! progress bar, print the result on stdout.

use crate::adapters::ffprobe;
use crate::adapters::sample_encoder::FfmpegSampleEncoder;
use crate::adapters::vmaf;
use crate::config::cli::{
    resolve_preset, AutoEncodeArgs, CrfSearchArgs, EncodeArgs, SampleEncodeArgs, SearchArgs,
    VmafArgs,
};
use crate::config::toml_config::TomlConfig;
use crate::core::crf_search::{CrfSearch, BAR_LEN};
use crate::core::encode;
use crate::core::output::StdoutFormat;
use crate::domain::model::{CrfAttempt, SampleRequest, SearchCriteria};
use crate::domain::ports::SampleEncoder;
use crate::utils::error::Result;
use crate::utils::progress;
use crate::utils::validation::Validate;
use console::style;
use tokio::sync::watch;

pub async fn crf_search(args: CrfSearchArgs, config: &TomlConfig, monitor: bool) -> Result<()> {
    let format = args
        .stdout_format
        .or(config.output.stdout_format)
        .unwrap_or_default();

    let (best, criteria) = run_search(&args.search, config, monitor).await?;
    if let Some(hint) = encode_hint(format, &args.search, &best, &criteria) {
        eprintln!("\n{}\n", hint);
    }
    println!("{}", format.format_search_result(&best)?);

    Ok(())
}

pub async fn sample_encode(args: SampleEncodeArgs, config: &TomlConfig) -> Result<()> {
    args.validate()?;
    let request = SampleRequest {
        input: args.input.clone(),
        crf: args.crf,
        preset: resolve_preset(args.preset, config)?,
        samples: args
            .samples
            .or(config.search.samples)
            .unwrap_or(SearchCriteria::default().samples),
        keep: args.keep || config.output.keep.unwrap_or(false),
    };
    let format = args
        .stdout_format
        .or(config.output.stdout_format)
        .unwrap_or(StdoutFormat::Human);

    let encoder = FfmpegSampleEncoder::new(config.ffmpeg.clone())?;
    let bar = progress::create_encode_bar(BAR_LEN);

    let (tx, mut rx) = watch::channel(0.0_f64);
    let bar_task = {
        let bar = bar.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let fraction = *rx.borrow_and_update();
                bar.set_position((fraction * BAR_LEN as f64) as u64);
            }
        })
    };

    let result = encoder.sample_encode(&request, tx).await;
    // sender 已隨 sample_encode 結束而丟棄，bar_task 會自行結束
    let _ = bar_task.await;
    bar.finish_and_clear();
    finish_samples(&encoder, request.keep).await;

    println!("{}", format.format_sample_result(&result?)?);
    Ok(())
}

pub async fn encode(args: EncodeArgs, config: &TomlConfig) -> Result<()> {
    args.validate()?;
    let preset = resolve_preset(args.preset, config)?;

    let bar = progress::create_encode_bar(BAR_LEN);
    let output = encode::encode(
        &config.ffmpeg,
        &args.input,
        args.output.as_deref(),
        args.crf,
        preset,
        &bar,
    )
    .await;
    bar.finish_and_clear();

    let output = output?;
    tracing::info!("✅ Encode completed: {}", output.display());
    println!("{}", output.display());
    Ok(())
}

pub async fn auto_encode(args: AutoEncodeArgs, config: &TomlConfig, monitor: bool) -> Result<()> {
    let (best, criteria) = run_search(&args.search, config, monitor).await?;
    eprintln!("{}", StdoutFormat::Human.format_search_result(&best)?);

    let bar = progress::create_encode_bar(BAR_LEN);
    let output = encode::encode(
        &config.ffmpeg,
        &args.search.input,
        args.output.as_deref(),
        best.crf,
        criteria.preset,
        &bar,
    )
    .await;
    bar.finish_and_clear();

    let output = output?;
    tracing::info!("✅ Encode completed: {} (crf {})", output.display(), best.crf);
    println!("{}", output.display());
    Ok(())
}

pub async fn vmaf(args: VmafArgs, config: &TomlConfig) -> Result<()> {
    args.validate()?;
    let settings = &config.ffmpeg;
    let probe = ffprobe::probe(&settings.ffprobe, &args.reference).await?;

    let bar = progress::create_encode_bar(BAR_LEN);
    let score = vmaf::vmaf(
        settings,
        &args.reference,
        &args.distorted,
        Some(probe.duration),
        |p| bar.set_position((p * BAR_LEN as f64) as u64),
    )
    .await;
    bar.finish_and_clear();

    println!("{:.2}", score?);
    Ok(())
}

async fn run_search(
    args: &SearchArgs,
    config: &TomlConfig,
    monitor: bool,
) -> Result<(CrfAttempt, SearchCriteria)> {
    args.validate()?;
    let criteria = args.criteria(config)?;
    criteria.validate()?;
    tracing::debug!("Search criteria: {:?}", criteria);

    let search =
        CrfSearch::new_with_monitoring(FfmpegSampleEncoder::new(config.ffmpeg.clone())?, monitor);
    let bar = progress::create_search_bar();

    let result = search.run(&args.input, &criteria, &bar).await;
    bar.finish();
    finish_samples(search.encoder(), config.output.keep.unwrap_or(false)).await;

    Ok((result?, criteria))
}

/// Keeps or removes the sample work directory; failing to clean up is not fatal.
async fn finish_samples(encoder: &FfmpegSampleEncoder, keep: bool) {
    if keep {
        tracing::info!("📁 Samples kept in {}", encoder.work_dir().display());
    } else if let Err(e) = encoder.cleanup().await {
        tracing::warn!("Failed to remove {}: {}", encoder.work_dir().display(), e);
    }
}

/// `crf-seek encode` command line for the result, only shown with human output.
fn encode_hint(
    format: StdoutFormat,
    args: &SearchArgs,
    best: &CrfAttempt,
    criteria: &SearchCriteria,
) -> Option<String> {
    if format != StdoutFormat::Human {
        return None;
    }
    Some(format!(
        "{} {}",
        style("Encode with:").dim(),
        style(format!(
            "crf-seek encode -i {:?} --crf {} --preset {}",
            args.input, best.crf, criteria.preset
        ))
        .dim()
        .italic()
    ))
}
