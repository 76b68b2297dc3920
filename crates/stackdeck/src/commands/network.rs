use crate::utils::{self, Console};
use stackdeck_provision::{Dispatcher, NetworkRequest, Orchestrator};
use std::sync::Arc;

pub async fn handle_create(
    orchestrator: Arc<Orchestrator>,
    console: &mut Console,
    request: NetworkRequest,
) -> anyhow::Result<()> {
    let dispatcher = Dispatcher::new(orchestrator);
    let chain = dispatcher.trigger_network_chain(request);
    let report = console
        .run(chain.join())
        .await
        .ok_or_else(|| anyhow::anyhow!("network chain was aborted"))?;
    utils::finish_report(&report)
}
