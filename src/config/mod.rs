pub mod cli;
pub mod toml_config;

use crate::utils::logger::LogFormat;
use clap::{Parser, Subcommand};
use cli::{AutoEncodeArgs, CrfSearchArgs, EncodeArgs, SampleEncodeArgs, VmafArgs};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "crf-seek", version)]
#[command(about = "Find the best AV1 crf for a video using sample encodes and VMAF")]
pub struct CliConfig {
    /// Path to a TOML file with default settings
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    pub log_format: LogFormat,

    /// Log CPU and memory usage after each crf attempt
    #[arg(long, global = true)]
    pub monitor: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Pseudo binary search using sample-encode to find the best crf value
    /// delivering min-vmaf & max-encoded-percent.
    ///
    /// Outputs the best crf value, mean sample VMAF score, predicted full
    /// encode size and predicted full encode time.
    CrfSearch(CrfSearchArgs),
    /// Encode samples of the input at one crf and predict the full encode.
    SampleEncode(SampleEncodeArgs),
    /// Encode the whole input at a given crf.
    Encode(EncodeArgs),
    /// Run crf-search, then encode the whole input at the crf it finds.
    AutoEncode(AutoEncodeArgs),
    /// Compute the VMAF score of an encode against its reference.
    Vmaf(VmafArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crf_search() {
        let cli = CliConfig::parse_from([
            "crf-seek", "crf-search", "-i", "movie.mkv", "--preset", "8", "--min-vmaf", "96",
            "--stdout-format", "json", "-v",
        ]);

        assert!(cli.verbose);
        let Command::CrfSearch(args) = cli.command else {
            panic!("expected crf-search");
        };
        assert_eq!(args.search.input, PathBuf::from("movie.mkv"));
        assert_eq!(args.search.preset, Some(8));
        assert_eq!(args.search.min_vmaf, Some(96.0));
        assert_eq!(args.search.max_crf, None);
    }

    #[test]
    fn test_parse_global_config_after_subcommand() {
        let cli = CliConfig::parse_from([
            "crf-seek", "encode", "-i", "a.mkv", "--crf", "30", "--config", "crf.toml",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("crf.toml")));
        assert!(matches!(cli.command, Command::Encode(EncodeArgs { crf: 30, .. })));
    }

    #[test]
    fn test_missing_input_is_rejected() {
        assert!(CliConfig::try_parse_from(["crf-seek", "crf-search", "--preset", "8"]).is_err());
    }

    #[test]
    fn test_command_definition() {
        use clap::CommandFactory;
        CliConfig::command().debug_assert();
    }
}
