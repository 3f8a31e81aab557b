//! CLI entry point for the smbtree network browser.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use smbtree_core::{Host, ItemKey, NetworkItem, Share, SharedSettings, Workgroup};

use smbtree_discover::config::DiscoverConfig;
use smbtree_discover::smbclient::SmbClientEnumerator;
use smbtree_discover::NetworkController;

#[derive(Parser)]
#[command(name = "smbtree")]
#[command(about = "Browse the SMB network neighborhood")]
struct Cli {
    /// Look up workgroups and domains.
    #[arg(long)]
    domains: bool,

    /// Look up the members of a workgroup (or scope --host to it).
    #[arg(short, long)]
    workgroup: Option<String>,

    /// Look up the shares of a host; needs --workgroup.
    #[arg(long)]
    host: Option<String>,

    /// List a share, given as //HOST/SHARE; needs --workgroup.
    #[arg(long)]
    share: Option<String>,

    /// Walk domains, then hosts, then shares.
    #[arg(long)]
    walk: bool,

    /// Search every known host for shares whose name contains TERM.
    #[arg(long, value_name = "TERM")]
    search: Option<String>,

    /// Show hidden (`$`) shares.
    #[arg(long)]
    hidden: bool,

    /// Config file prefix (default: smbtree).
    #[arg(short, long, default_value = "smbtree")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = DiscoverConfig::load(&cli.config)?;

    let enumerator = SmbClientEnumerator::from_config(&config);
    let version = enumerator.verify_installation().await?;
    tracing::info!(smbclient_version = %version, "smbclient verified");

    let settings = SharedSettings::new(config.browse.clone());
    if cli.hidden {
        settings.update(|s| s.detect_hidden_shares = true);
    }

    let controller = NetworkController::builder(Arc::new(enumerator))
        .with_credentials(Arc::new(config.credential_provider()?))
        .with_settings(Arc::new(settings))
        .with_event_capacity(config.event_capacity)
        .spawn();

    if cli.walk {
        walk(&controller).await;
    } else if cli.domains {
        controller.lookup_domains();
        controller.wait_until_idle().await;
    } else if let Some(unc) = cli.share.as_deref() {
        let workgroup = cli
            .workgroup
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--share needs --workgroup"))?;
        let share = parse_unc(workgroup, unc)?;
        controller.seed(NetworkItem::Share(share.clone()));
        controller.lookup_files(&NetworkItem::Share(share))?;
        controller.wait_until_idle().await;
    } else if let Some(host) = cli.host.as_deref() {
        let workgroup = cli
            .workgroup
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--host needs --workgroup"))?;
        let host = Host::new(workgroup, host);
        controller.seed(NetworkItem::Host(host.clone()));
        controller.lookup_shares(&host);
        controller.wait_until_idle().await;
    } else if let Some(workgroup) = cli.workgroup.as_deref() {
        let workgroup = Workgroup::new(workgroup);
        controller.seed(NetworkItem::Workgroup(workgroup.clone()));
        controller.lookup_domain_members(&workgroup);
        controller.wait_until_idle().await;
    } else if cli.search.is_none() {
        anyhow::bail!("Specify --domains, --workgroup, --host, --share, --walk or --search");
    }

    if let Some(term) = cli.search.as_deref() {
        if controller.snapshot().all_hosts().is_empty() {
            walk(&controller).await;
        }
        let found = controller.search(term).await;
        println!("{}", serde_json::to_string_pretty(&found)?);
        return Ok(());
    }

    let tree = controller.snapshot().tree(&ItemKey::Network);
    println!("{}", serde_json::to_string_pretty(&tree)?);
    Ok(())
}

/// Domains, then the members of every domain, then every host's shares.
async fn walk(controller: &NetworkController) {
    controller.lookup_domains();
    controller.wait_until_idle().await;

    for workgroup in controller.workgroups() {
        controller.lookup_domain_members(&workgroup);
    }
    controller.wait_until_idle().await;

    for host in controller.snapshot().all_hosts() {
        controller.lookup_shares(host);
    }
    controller.wait_until_idle().await;
}

fn parse_unc(workgroup: &str, unc: &str) -> anyhow::Result<Share> {
    let trimmed = unc.trim_start_matches(['/', '\\']);
    let mut parts = trimmed.split(['/', '\\']).filter(|p| !p.is_empty());
    match (parts.next(), parts.next()) {
        (Some(host), Some(share)) => Ok(Share::new(workgroup, host, share)),
        _ => anyhow::bail!("Invalid share {unc}: expected //HOST/SHARE"),
    }
}
