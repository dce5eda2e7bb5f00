use anyhow::Result;
use calmirror_core::MirrorConfig;
use calmirror_core::reconcile::last_cycle_outcome;
use calmirror_core::source::EventSource;
use calmirror_core::store::{JsonFileStore, MappingStore};
use owo_colors::OwoColorize;

pub async fn run(config: &MirrorConfig) -> Result<()> {
    let store = JsonFileStore::new(config.sync.state_dir());

    if config.subscriptions.is_empty() {
        println!("No subscriptions configured");
        return Ok(());
    }

    for subscription in &config.subscriptions {
        let mapped = store.list(&subscription.id)?.len();
        let outcome = last_cycle_outcome(&store, &subscription.id)?;

        let rendered = match outcome.as_deref() {
            Some("success") => "success".green().to_string(),
            Some(failed) => failed.red().to_string(),
            None => "never synced".dimmed().to_string(),
        };

        let health = match subscription.source.build() {
            Ok(source) => match source.health_check().await {
                Ok(()) => "reachable".green().to_string(),
                Err(e) => format!("unreachable: {e}").red().to_string(),
            },
            Err(e) => format!("misconfigured: {e}").red().to_string(),
        };

        println!(
            "{}: {}, source {} ({} mirrored event{})",
            subscription.id.bold(),
            rendered,
            health,
            mapped,
            if mapped == 1 { "" } else { "s" }
        );
    }
    Ok(())
}
