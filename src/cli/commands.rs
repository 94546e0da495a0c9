//! CLI command handlers.

use std::sync::Arc;

use super::{ProbeArgs, SummaryArgs};
use crate::config::SubtrackConfig;
use crate::connectivity::{ConnectivityMonitor, HttpProbe, ManualSignal};
use crate::error::{generate_actions, RecoveryCallbacks};
use crate::exchange::{ExchangeRateService, RefreshResult};
use crate::stats::{aggregate, format_amount, SubscriptionRecord};
use crate::util::retry::RetryExecutor;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Handle `subtrack rate`.
pub async fn handle_rate(config: &SubtrackConfig) -> CliResult {
    let service = ExchangeRateService::new(
        config.exchange.clone(),
        config.retry_policy(),
        RetryExecutor::new(),
    )?;

    let result = service.refresh().await;
    service.shutdown();
    let state = service.state();

    match result {
        RefreshResult::Updated(rate) => {
            println!("1 {} = {rate} {}", config.exchange.base_currency, config.exchange.target_currency);
        }
        RefreshResult::Failed(error) => {
            eprintln!("{error}");
            for action in generate_actions(&error, &RecoveryCallbacks::new()) {
                eprintln!("  [{}]", action.label);
            }
            println!(
                "1 {} = {} {} (default)",
                config.exchange.base_currency, state.rate, config.exchange.target_currency
            );
        }
        RefreshResult::Skipped => {}
    }
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

/// Handle `subtrack probe`.
pub async fn handle_probe(config: &SubtrackConfig, args: ProbeArgs) -> CliResult {
    let url = args.url.unwrap_or_else(|| config.connectivity.probe_url.clone());
    let probe = HttpProbe::new(url.clone(), config.connectivity.probe_timeout());
    let monitor = ConnectivityMonitor::with_probe(Arc::new(ManualSignal::new(true)), Arc::new(probe));

    if monitor.test_connectivity().await {
        println!("online ({url})");
    } else {
        println!("offline ({url})");
    }
    Ok(())
}

/// Handle `subtrack summary <file.json>`.
pub async fn handle_summary(config: &SubtrackConfig, args: SummaryArgs) -> CliResult {
    let text = std::fs::read_to_string(&args.path)?;
    let records: Vec<SubscriptionRecord> = serde_json::from_str(&text)?;

    let rate = match args.rate {
        Some(rate) => rate,
        None => {
            let service = ExchangeRateService::new(
                config.exchange.clone(),
                config.retry_policy(),
                RetryExecutor::new(),
            )?;
            service.refresh().await;
            service.shutdown();
            service.rate()
        }
    };

    let result = aggregate(&records, rate, config.exchange.default_rate);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("Monthly total: {}", result.formatted_total());
    println!("Average:       {}", result.formatted_average());
    println!(
        "Items:         {} ({} counted)",
        result.item_count, result.active_item_count
    );
    for (currency, breakdown) in &result.per_currency_breakdown {
        println!(
            "  {currency}: {} item(s), {}",
            breakdown.count,
            format_amount(breakdown.raw_total, *currency)
        );
    }
    if result.failed_item_count > 0 {
        eprintln!("{} item(s) excluded:", result.failed_item_count);
        for failed in &result.failed_items {
            eprintln!("  {}: {}", failed.item_id, failed.reason);
        }
    }
    Ok(())
}
