use clap::Parser;
use crf_seek::app::commands;
use crf_seek::config::Command;
use crf_seek::utils::error::ErrorSeverity;
use crf_seek::utils::{logger, validation::Validate};
use crf_seek::{CliConfig, CrfError, TomlConfig};

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(cli.verbose, cli.log_format);
    tracing::debug!("CLI config: {:?}", cli);

    // 載入並驗證配置
    let config = match TomlConfig::load(cli.config.as_deref()).and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    if cli.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    let result = match cli.command {
        Command::CrfSearch(args) => commands::crf_search(args, &config, cli.monitor).await,
        Command::SampleEncode(args) => commands::sample_encode(args, &config).await,
        Command::Encode(args) => commands::encode(args, &config).await,
        Command::AutoEncode(args) => commands::auto_encode(args, &config, cli.monitor).await,
        Command::Vmaf(args) => commands::vmaf(args, &config).await,
    };

    if let Err(e) = result {
        report(&e);
        std::process::exit(exit_code(e.severity()));
    }
}

fn report(e: &CrfError) {
    // 記錄詳細錯誤信息
    tracing::error!(
        "❌ crf-seek failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    // 輸出用戶友好的錯誤信息
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
}

// 根據錯誤嚴重程度決定退出碼
fn exit_code(severity: ErrorSeverity) -> i32 {
    match severity {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}
