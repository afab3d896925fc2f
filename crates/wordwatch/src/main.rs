//! `wordwatch` - CLI for the forbidden-word detector
//!
//! This binary checks single pieces of text, aggregates detections over
//! snapshots read from stdin, and drives a live detector from stdin lines.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use wordwatch::cli::{
    CheckCommand, Cli, Command, ConfigCommand, LiveCommand, NormalizeCommand, PatternsCommand,
    ScanCommand,
};
use wordwatch::feed::{spawn_feed, LineFeed};
use wordwatch::live::{LiveObserver, ManualScheduler, MonotonicClock, TokioScheduler};
use wordwatch::text::{normalize, tokenize};
use wordwatch::{
    init_logging, Action, Config, Detection, EngineSet, LiveDecision, LiveTypingDetector,
    MonitoringAggregator, PatternRepository, PatternSet, Reason, Severity,
};

/// Snapshots buffered between the stdin reader and the aggregator.
const FEED_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    // Execute the command
    match cli.command {
        Command::Check(cmd) => handle_check(&config, &cmd),
        Command::Normalize(cmd) => handle_normalize(&config, &cmd),
        Command::Scan(cmd) => handle_scan(&config, cmd).await,
        Command::Live(cmd) => handle_live(&config, cmd).await,
        Command::Patterns(cmd) => handle_patterns(cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

/// Compile engines from the configured lexicon and either the given or the
/// configured pattern payload.
fn build_engines(config: &Config, patterns: Option<&Path>) -> anyhow::Result<Arc<EngineSet>> {
    let patterns = match patterns {
        Some(path) => PatternSet::from_file(path)
            .with_context(|| format!("failed to load patterns from {}", path.display()))?,
        None => config
            .load_patterns()
            .context("failed to load configured patterns")?,
    };
    if patterns.is_empty() {
        tracing::warn!("No patterns loaded; nothing will match");
    }

    let lexicon = Arc::new(config.load_lexicon().context("failed to load lexicon")?);
    let engines = EngineSet::build(&patterns, lexicon, &config.engine_settings())
        .context("failed to compile engines")?;
    tracing::debug!(
        patterns = patterns.len(),
        signature = engines.signature(),
        "Engines ready"
    );
    Ok(Arc::new(engines))
}

fn handle_check(config: &Config, cmd: &CheckCommand) -> anyhow::Result<()> {
    let engines = build_engines(config, cmd.patterns.as_deref())?;
    let normalized = normalize(&cmd.text, &engines.normalizer);

    // Evaluation never schedules, so a manual scheduler is enough here
    let detector = LiveTypingDetector::new(
        Arc::clone(&engines),
        config.live.clone(),
        Arc::new(MonotonicClock::new()),
        Arc::new(ManualScheduler::default()),
        None,
    )?;
    let decisions = detector.evaluate(&normalized);

    if cmd.json {
        let output = serde_json::json!({
            "normalized": normalized,
            "decisions": decisions,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if decisions.is_empty() {
        println!("No matches.");
    } else {
        for decision in &decisions {
            println!("{}", format_decision(decision));
        }
    }
    Ok(())
}

fn format_decision(d: &LiveDecision) -> String {
    format!(
        "{:<6} {:<8} {:<8} {}",
        d.action.to_string(),
        d.reason.to_string(),
        d.severity.to_string(),
        d.pattern_id
    )
}

fn handle_normalize(config: &Config, cmd: &NormalizeCommand) -> anyhow::Result<()> {
    let normalized = normalize(&cmd.text, &config.normalizer);
    let tokens = tokenize(&normalized);

    if cmd.json {
        let output = serde_json::json!({
            "normalized": normalized,
            "tokens": tokens,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{normalized}");
        for token in &tokens {
            println!(
                "  {:>4}..{:<4} {:<7} {}",
                token.start,
                token.end,
                token.script.to_string(),
                token.text
            );
        }
    }
    Ok(())
}

fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

fn format_timestamp(timestamp_ms: u64) -> String {
    i64::try_from(timestamp_ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map_or_else(
            || timestamp_ms.to_string(),
            |t| t.to_rfc3339_opts(SecondsFormat::Millis, true),
        )
}

fn print_detection(detection: &Detection, json: bool) -> anyhow::Result<()> {
    let time = format_timestamp(detection.timestamp_ms);
    if json {
        let output = serde_json::json!({
            "time": time,
            "source_id": detection.source_id,
            "pattern_id": detection.pattern_id,
            "category": detection.category,
            "severity": detection.severity,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!(
            "{time}  {:<12} {:<8} {:<12} {}",
            detection.source_id,
            detection.severity.to_string(),
            detection.category,
            detection.pattern_id
        );
    }
    Ok(())
}

async fn handle_scan(config: &Config, cmd: ScanCommand) -> anyhow::Result<()> {
    let engines = build_engines(config, cmd.patterns.as_deref())?;
    let mut aggregator = MonitoringAggregator::new(engines, config.monitoring.clone())?;

    let feed = LineFeed::new(BufReader::new(tokio::io::stdin()), cmd.source).tagged(cmd.tagged);
    let handle = feed.handle();
    let mut snapshots = spawn_feed(feed, handle.clone(), FEED_CAPACITY);

    let mut total = 0usize;
    loop {
        tokio::select! {
            snapshot = snapshots.recv() => {
                let Some(snapshot) = snapshot else { break };
                let now = now_ms();
                for detection in aggregator.process_snapshot(&snapshot.source_id, &snapshot.text, now) {
                    total += 1;
                    print_detection(&detection, cmd.json)?;
                }
                aggregator.prune_idle(now);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping scan");
                handle.stop();
                break;
            }
        }
    }

    tracing::debug!(detections = total, "Scan finished");
    Ok(())
}

/// Prints every decision the live detector reports.
#[derive(Debug)]
struct PrintObserver {
    json: bool,
}

impl LiveObserver for PrintObserver {
    fn on_decision(&self, pattern_id: &str, severity: Severity, action: Action, reason: Reason) {
        let decision = LiveDecision {
            pattern_id: pattern_id.to_string(),
            severity,
            action,
            reason,
        };
        if self.json {
            match serde_json::to_string(&decision) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "Failed to encode decision"),
            }
        } else {
            println!("{}", format_decision(&decision));
        }
    }
}

async fn handle_live(config: &Config, cmd: LiveCommand) -> anyhow::Result<()> {
    let engines = build_engines(config, cmd.patterns.as_deref())?;

    let mut settings = config.live.clone();
    if let Some(debounce_ms) = cmd.debounce_ms {
        settings.debounce_ms = debounce_ms;
    }

    let detector = LiveTypingDetector::new(
        engines,
        settings,
        Arc::new(MonotonicClock::new()),
        Arc::new(TokioScheduler::current()),
        Some(Arc::new(PrintObserver { json: cmd.json })),
    )?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else { break };
                if line.is_empty() {
                    detector.on_focus_changed();
                } else {
                    detector.on_text_changed(&line);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping live detector");
                break;
            }
        }
    }

    // Whatever is still buffered is decided before exit
    detector.flush();
    detector.on_focus_changed();
    Ok(())
}

fn handle_patterns(cmd: PatternsCommand) -> anyhow::Result<()> {
    match cmd {
        PatternsCommand::Validate { file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let report = PatternRepository::new().update_from_json(&json);
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.ok {
                bail!("pattern payload {} is invalid", file.display());
            }
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Normalizer]");
                println!("  Marks:              {:?}", config.normalizer.marks);
                println!(
                    "  Leet substitutions: {}",
                    config.normalizer.leet_substitutions
                );
                println!();
                println!("[Evasion]");
                println!("  Remove separators:  {}", config.evasion.remove_separators);
                println!("  Separator class:    {}", config.evasion.separator_class);
                println!("  Leet folding:       {}", config.evasion.leet_enabled);
                println!();
                println!("[Decision]");
                println!("  Min long host:      {}", config.decision.min_host_long);
                println!(
                    "  Short host ratio:   {}",
                    config.decision.small_host_ratio_block
                );
                println!(
                    "  High blocks:        {}",
                    config.decision.severity_high_blocks
                );
                println!(
                    "  Segmentation:       {}",
                    config.decision.segmentation_enabled
                );
                println!(
                    "  Max segment cost:   {}",
                    config.decision.segmentation_max_cost
                );
                println!();
                println!("[Monitoring]");
                println!(
                    "  Min occurrences:    {}",
                    config.monitoring.min_occurrences
                );
                println!(
                    "  Window (seconds):   {}",
                    config.monitoring.window_seconds
                );
                println!("  Cooldown (ms):      {}", config.monitoring.cooldown_ms);
                println!("  Count mode:         {:?}", config.monitoring.count_mode);
                println!();
                println!("[Live]");
                println!("  Debounce (ms):      {}", config.live.debounce_ms);
                println!(
                    "  High severity only: {}",
                    config.live.block_high_severity_only
                );
                println!();
                println!("[Sources]");
                println!("  Lexicon locale:     {}", config.lexicon.locale);
                if let Some(path) = &config.lexicon.words_path {
                    println!("  Lexicon words:      {}", path.display());
                }
                match &config.patterns.path {
                    Some(path) => println!("  Patterns:           {}", path.display()),
                    None => println!("  Patterns:           (none)"),
                }
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}
