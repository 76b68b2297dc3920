mod commands;
mod display;
mod utils;

use clap::{Parser, Subcommand};
use stackdeck_provision::{NetworkRequest, Orchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "deck")]
#[command(about = "Control panel for an OpenStack project", long_about = None)]
struct Cli {
    /// Keep poll progress off the console (failures still show)
    #[arg(long, global = true)]
    quiet_poll: bool,

    /// Append every poll cycle to this file
    #[arg(long, global = true, value_name = "PATH")]
    poll_log: Option<PathBuf>,

    /// Directory holding the token cache and inventory snapshot
    #[arg(long, global = true, env = "STACKDECK_DATA_DIR", value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll every collection and rewrite the inventory snapshot
    Refresh,
    /// Show selectable resources from the cached inventory
    List {
        /// Also show servers, routers, subnets, key pairs and freshness
        #[arg(short, long)]
        all: bool,
    },
    /// Network provisioning
    #[command(subcommand)]
    Network(NetworkCommands),
    /// Instance provisioning
    #[command(subcommand)]
    Instance(InstanceCommands),
    /// Show the identity token, authenticating if the cache has none
    Token {
        /// Print the token value
        #[arg(long)]
        show: bool,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum NetworkCommands {
    /// Create a network with an optional subnet and router
    Create {
        /// Network name
        name: String,
        /// Subnet name (needs --cidr)
        #[arg(long)]
        subnet: Option<String>,
        /// Subnet CIDR, e.g. 10.0.0.0/24
        #[arg(long)]
        cidr: Option<String>,
        /// Create a router on the external network and attach the subnet
        #[arg(long)]
        router: bool,
        /// Router name (default: <name>_router)
        #[arg(long, requires = "router")]
        router_name: Option<String>,
    },
}

#[derive(Subcommand)]
enum InstanceCommands {
    /// Boot an instance, optionally attaching a floating IP
    Create {
        /// Instance name
        name: String,
        /// Image name, or id:<ID>
        #[arg(long)]
        image: String,
        /// Flavor name, or id:<ID>
        #[arg(long)]
        flavor: String,
        /// Network name, or id:<ID>
        #[arg(long)]
        network: String,
        /// Security group name
        #[arg(long, default_value = "default")]
        security_group: String,
        /// Floating IP address or id to associate
        #[arg(long)]
        floating_ip: Option<String>,
        /// Cloud-init script file
        #[arg(long, value_name = "FILE")]
        user_script: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Console lines are printed by the command itself
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,stackdeck::console=off")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Version needs no settings
    if matches!(cli.command, Commands::Version) {
        println!("stackdeck {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let settings = utils::load_settings(cli.data_dir)?;
    let (log, mut console) = utils::Console::new();
    let poll = utils::poll_options(&settings, cli.quiet_poll, cli.poll_log);
    let orchestrator = Arc::new(Orchestrator::from_settings(&settings, poll, log));

    let result = match cli.command {
        Commands::Refresh => commands::refresh::handle(orchestrator, &mut console).await,
        Commands::List { all } => commands::list::handle(orchestrator, &mut console, all).await,
        Commands::Network(NetworkCommands::Create {
            name,
            subnet,
            cidr,
            router,
            router_name,
        }) => {
            let request = NetworkRequest {
                network_name: name,
                subnet_name: subnet,
                cidr,
                auto_create_router: router,
                router_name,
            };
            commands::network::handle_create(orchestrator, &mut console, request).await
        }
        Commands::Instance(InstanceCommands::Create {
            name,
            image,
            flavor,
            network,
            security_group,
            floating_ip,
            user_script,
        }) => {
            let args = commands::instance::CreateArgs {
                name,
                image,
                flavor,
                network,
                security_group,
                floating_ip,
                user_script,
            };
            commands::instance::handle_create(orchestrator, &mut console, args).await
        }
        Commands::Token { show } => commands::token::handle(orchestrator, &mut console, show).await,
        Commands::Version => unreachable!("Version is handled before settings are loaded"),
    };

    console.drain();
    result
}
