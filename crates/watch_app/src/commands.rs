use anyhow::{Context, Result};
use watch_engine::{
    FieldExtractor, LogSink, PriceImageDecoder, ReqwestFetcher, RetryQueue, Scanner,
    TesseractRecognizer, WebhookNotifier,
};
use watch_logging::{watch_info, watch_warn};

use crate::config::{resolve_destinations, Config};
use crate::{Cli, Command};

pub async fn run(cli: Cli) -> Result<()> {
    // Explicit destinations make the file optional for a scan; a drain only
    // needs the queue directory, which has a default.
    let required = match cli.command {
        Command::Scan => cli.webhook_url.is_none() || cli.webhook_error_url.is_none(),
        Command::DrainQueue => false,
    };
    let config = Config::load(&cli.config, required)?;

    match cli.command {
        Command::Scan => scan(&cli, &config).await,
        Command::DrainQueue => drain_queue(&config).await,
    }
}

fn notifier(config: &Config) -> Result<WebhookNotifier> {
    WebhookNotifier::new(RetryQueue::new(&config.queue_dir))
        .context("cannot build the webhook client")
}

async fn scan(cli: &Cli, config: &Config) -> Result<()> {
    let destinations = resolve_destinations(
        config,
        cli.webhook_url.as_deref(),
        cli.webhook_error_url.as_deref(),
    );
    let fetcher =
        ReqwestFetcher::new(config.fetch.settings()).context("cannot build the page client")?;
    let extractor = FieldExtractor::new(&config.selectors).context("invalid page selectors")?;
    let reader = PriceImageDecoder::new(TesseractRecognizer::default());
    let notifier = notifier(config)?;
    let sink = LogSink;

    let scanner = Scanner::new(&fetcher, &extractor, &reader, &notifier, &sink, destinations)
        .with_rules(config.detection_rules())
        .with_image_modes(config.image_modes);
    let report = scanner
        .run_pass(&config.data_path)
        .await
        .with_context(|| format!("scan of {:?} failed", config.data_path))?;

    watch_info!(
        "Scan finished: {} changed, {} unchanged, {} failed, {} disabled, {} skipped",
        report.changed,
        report.unchanged,
        report.failed,
        report.disabled,
        report.skipped
    );
    if report.notifications_failed > 0 {
        watch_warn!(
            "{} notification(s) queued in {:?} for a later drain",
            report.notifications_failed,
            config.queue_dir
        );
    }
    Ok(())
}

async fn drain_queue(config: &Config) -> Result<()> {
    let report = notifier(config)?.drain_queue().await;
    let remaining = report.retained + report.unreadable + report.undeleted;
    if remaining > 0 {
        watch_warn!(
            "{} notification(s) still queued in {:?}",
            remaining,
            config.queue_dir
        );
    }
    Ok(())
}
