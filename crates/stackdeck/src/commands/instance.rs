use crate::display;
use crate::utils::{self, Console};
use anyhow::Context;
use stackdeck_cloud::Snapshot;
use stackdeck_provision::{
    Dispatcher, FloatingIpChoice, InstanceRequest, Orchestrator, Selection,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Arguments of `deck instance create`
pub struct CreateArgs {
    pub name: String,
    pub image: String,
    pub flavor: String,
    pub network: String,
    pub security_group: String,
    pub floating_ip: Option<String>,
    pub user_script: Option<PathBuf>,
}

/// `id:<ID>` selects by id, anything else by exact name.
pub fn parse_selection(raw: &str) -> Selection {
    match raw.strip_prefix("id:") {
        Some(id) => Selection::id(id),
        None => Selection::name(raw),
    }
}

/// Match an address, full id or id prefix against unassociated floating IPs.
pub fn pick_floating_ip(snapshot: &Snapshot, wanted: &str) -> Option<FloatingIpChoice> {
    snapshot
        .available_floating_ips()
        .into_iter()
        .find(|ip| {
            ip.floating_ip_address.as_deref() == Some(wanted)
                || ip.id == wanted
                || (wanted.len() >= 8 && ip.id.starts_with(wanted))
        })
        .map(|ip| FloatingIpChoice::Use {
            address: display::floating_ip_label(&ip),
            id: ip.id,
        })
}

pub async fn handle_create(
    orchestrator: Arc<Orchestrator>,
    console: &mut Console,
    args: CreateArgs,
) -> anyhow::Result<()> {
    let user_script = match &args.user_script {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read user script {}", path.display()))?,
        ),
        None => None,
    };

    let floating_ip = match &args.floating_ip {
        Some(wanted) => {
            let snapshot = console.run(orchestrator.inventory().load_or_poll()).await;
            match pick_floating_ip(&snapshot, wanted) {
                Some(choice) => choice,
                None => {
                    orchestrator.log().warn(format!(
                        "Selected floating IP '{}' not available; skipping assignment.",
                        wanted
                    ));
                    FloatingIpChoice::Skip
                }
            }
        }
        None => FloatingIpChoice::Skip,
    };

    let request = InstanceRequest {
        instance_name: args.name,
        image: Some(parse_selection(&args.image)),
        flavor: Some(parse_selection(&args.flavor)),
        network: Some(parse_selection(&args.network)),
        security_group: Some(args.security_group),
        floating_ip,
        user_script,
    };

    let dispatcher = Dispatcher::new(orchestrator);
    let chain = dispatcher.trigger_instance_chain(request);
    let report = console
        .run(chain.join())
        .await
        .ok_or_else(|| anyhow::anyhow!("instance chain was aborted"))?;
    utils::finish_report(&report)
}
