use crate::utils::Console;
use colored::Colorize;
use stackdeck_provision::Orchestrator;
use std::sync::Arc;

pub async fn handle(
    orchestrator: Arc<Orchestrator>,
    console: &mut Console,
    show: bool,
) -> anyhow::Result<()> {
    let token = console.run(orchestrator.tokens().get()).await?;

    println!(
        "Token valid until {}",
        token.expires_at.to_rfc3339().cyan()
    );
    println!(
        "Cache: {}",
        orchestrator.tokens().cache_path().display().to_string().dimmed()
    );
    if show {
        println!("{}", token.value);
    }
    Ok(())
}
