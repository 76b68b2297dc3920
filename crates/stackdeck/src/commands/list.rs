use crate::display;
use crate::utils::Console;
use colored::Colorize;
use stackdeck_cloud::{Collection, Freshness, Snapshot};
use stackdeck_provision::Orchestrator;
use std::sync::Arc;

fn section(title: &str, entries: &[String], empty: &str) {
    println!("{}", title.bold());
    if entries.is_empty() {
        println!("  {}", empty.dimmed());
    } else {
        for entry in entries {
            println!("  • {}", entry);
        }
    }
}

fn freshness_line(freshness: &Freshness, collection: Collection) -> String {
    match freshness.get(collection) {
        Some(status) if status.stale => format!(
            "{} (stale: {})",
            collection.key(),
            status.last_error.as_deref().unwrap_or("unknown error")
        ),
        Some(status) => match (&status.fetched_at, &status.last_error) {
            (Some(at), _) => format!("{} fetched {}", collection.key(), at.to_rfc3339()),
            (None, Some(err)) => format!("{} unavailable: {}", collection.key(), err),
            (None, None) => format!("{} unknown", collection.key()),
        },
        None => format!("{} unknown", collection.key()),
    }
}

fn print_selectable(snapshot: &Snapshot) {
    section(
        "Images",
        &snapshot.names(Collection::Images),
        "No images found",
    );
    let flavors: Vec<String> = snapshot.flavors().iter().map(display::flavor_label).collect();
    section("Flavors", &flavors, "No flavors found");
    section(
        "Security groups",
        &display::security_group_order(snapshot.names(Collection::SecurityGroups)),
        "No SGs found",
    );
    section(
        "Networks",
        &snapshot.names(Collection::Networks),
        "No networks found",
    );
    let floating: Vec<String> = snapshot
        .available_floating_ips()
        .iter()
        .map(display::floating_ip_label)
        .collect();
    section("Floating IPs", &floating, "No available floating IPs");
}

pub async fn handle(
    orchestrator: Arc<Orchestrator>,
    console: &mut Console,
    all: bool,
) -> anyhow::Result<()> {
    let inventory = orchestrator.inventory();
    let snapshot = console.run(inventory.load_or_poll()).await;

    println!();
    print_selectable(&snapshot);

    if all {
        section(
            "Key pairs",
            &snapshot.names(Collection::Keypairs),
            "No key pairs found",
        );
        section(
            "Servers",
            &snapshot.names(Collection::Servers),
            "No servers found",
        );
        section(
            "Routers",
            &snapshot.names(Collection::Routers),
            "No routers found",
        );
        section(
            "Subnets",
            &snapshot.names(Collection::Subnets),
            "No subnets found",
        );

        let freshness = inventory.freshness().await;
        let lines: Vec<String> = Collection::ALL
            .into_iter()
            .map(|c| freshness_line(&freshness, c))
            .collect();
        section("Freshness", &lines, "No poll recorded");
    }
    Ok(())
}
