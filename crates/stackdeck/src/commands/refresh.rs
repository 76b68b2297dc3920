use crate::utils::Console;
use colored::Colorize;
use stackdeck_cloud::Collection;
use stackdeck_provision::{Dispatcher, Orchestrator};
use std::sync::Arc;

pub async fn handle(orchestrator: Arc<Orchestrator>, console: &mut Console) -> anyhow::Result<()> {
    let dispatcher = Dispatcher::new(orchestrator);
    let Some(refresh) = dispatcher.trigger_refresh() else {
        println!("{}", "Refresh already in progress".yellow());
        return Ok(());
    };
    let snapshot = console
        .run(refresh.join())
        .await
        .ok_or_else(|| anyhow::anyhow!("refresh task did not finish"))?;

    println!();
    if snapshot.is_empty() {
        println!("{}", "No inventory available".dimmed());
        return Ok(());
    }
    for collection in Collection::ALL {
        let status = if snapshot.get(collection).is_some() {
            format!("{}", snapshot.items(collection).len()).green()
        } else {
            "failed".red()
        };
        println!("  {:<16} {}", collection.key(), status);
    }
    Ok(())
}
