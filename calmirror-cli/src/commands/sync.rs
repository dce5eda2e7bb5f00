use anyhow::{Result, bail};
use calmirror_core::reconcile::CycleStats;
use calmirror_core::store::JsonFileStore;
use calmirror_core::{MirrorConfig, ReconciliationEngine, SubscriptionConfig, SyncWindow};
use owo_colors::OwoColorize;

pub async fn run(config: &MirrorConfig, only: Option<&str>) -> Result<()> {
    let failed = run_batch(config, only).await?;
    if failed > 0 {
        bail!("{failed} subscription(s) failed");
    }
    Ok(())
}

/// Run one cycle per subscription, sequentially. A failure in one
/// subscription does not abort the others; the failure count is returned
/// so callers can decide the exit condition.
pub async fn run_batch(config: &MirrorConfig, only: Option<&str>) -> Result<usize> {
    let subscriptions: Vec<&SubscriptionConfig> = match only {
        Some(id) => {
            let found: Vec<_> = config.subscriptions.iter().filter(|s| s.id == id).collect();
            if found.is_empty() {
                bail!("no subscription with id '{id}'");
            }
            found
        }
        None => config.subscriptions.iter().collect(),
    };
    if subscriptions.is_empty() {
        bail!("no subscriptions configured");
    }

    let destination = config.destination()?;
    let store = JsonFileStore::new(config.sync.state_dir());
    let engine = ReconciliationEngine::new(&destination, &store);
    let window = config.sync.window();

    let mut failed = 0;
    let mut totals = CycleStats::default();

    for subscription in subscriptions {
        match run_one(&engine, subscription, &window).await {
            Ok(stats) => {
                println!(
                    "{} {}: {} created, {} updated, {} deleted ({} considered)",
                    "✓".green(),
                    subscription.id.bold(),
                    stats.created,
                    stats.updated,
                    stats.deleted,
                    stats.considered
                );
                totals.created += stats.created;
                totals.updated += stats.updated;
                totals.deleted += stats.deleted;
                totals.considered += stats.considered;
            }
            Err(e) => {
                failed += 1;
                println!("{} {}: {}", "✗".red(), subscription.id.bold(), e.to_string().red());
            }
        }
    }

    if !totals.is_noop() {
        println!(
            "\nTotal: {} created, {} updated, {} deleted",
            totals.created, totals.updated, totals.deleted
        );
    }

    Ok(failed)
}

async fn run_one(
    engine: &ReconciliationEngine<'_, calmirror_core::destination::RestDestination, JsonFileStore>,
    subscription: &SubscriptionConfig,
    window: &SyncWindow,
) -> Result<CycleStats> {
    let source = subscription.source.build()?;
    let stats = engine
        .run_cycle(&subscription.id, &source, source.kind(), window)
        .await?;
    Ok(stats)
}
