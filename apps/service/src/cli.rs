//! Command line interface and registry management commands

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use downdetector::{MetricsStore, ServiceId, ServiceRegistry, SortOrder};

use crate::database::LibsqlStore;
use crate::validation::{validate_owner_id, validate_service_name, validate_service_url};

#[derive(Debug, Parser)]
#[command(name = "downdetector", version, about = "HTTP service health monitor")]
pub struct Cli {
    /// Config file, defaults to $XDG_CONFIG_HOME/downdetector/config.toml
    #[arg(short, long, env = "DOWNDETECTOR_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scheduler and the control API (default)
    Serve,
    /// Register a service to monitor
    Add {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
        /// Discord guild that receives status announcements
        #[arg(long)]
        guild: Option<u64>,
    },
    /// List registered services
    List {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Remove one of the owner's services
    Remove {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        name: String,
    },
    /// Show the latest pings of a service
    History {
        #[arg(long)]
        id: ServiceId,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

pub async fn add_service(
    store: &LibsqlStore,
    out: &mut impl Write,
    owner: &str,
    name: &str,
    url: &str,
    guild: Option<u64>,
) -> Result<()> {
    validate_owner_id(owner).to_result()?;
    validate_service_name(name).to_result()?;
    validate_service_url(url).to_result()?;

    let service = store.create_service(owner, guild, name, url).await?;
    writeln!(out, "Added service '{}' ({}) with id {}", service.name, service.url, service.id)?;
    Ok(())
}

pub async fn list_services(store: &LibsqlStore, out: &mut impl Write, owner: Option<&str>) -> Result<()> {
    let services = match owner {
        Some(owner) => store.list_services_for_owner(owner).await?,
        None => store.list_services().await?,
    };

    if services.is_empty() {
        writeln!(out, "No services registered")?;
        return Ok(());
    }

    for service in services {
        writeln!(
            out,
            "{:>5}  {:<8} {:<24} {} (owner {})",
            service.id, service.status, service.name, service.url, service.owner_id
        )?;
    }
    Ok(())
}

pub async fn remove_service(store: &LibsqlStore, out: &mut impl Write, owner: &str, name: &str) -> Result<()> {
    if !store.delete_service(owner, name).await? {
        bail!("no service named '{}' for owner {}", name, owner);
    }
    writeln!(out, "Removed service '{}'", name)?;
    Ok(())
}

pub async fn show_history(store: &LibsqlStore, out: &mut impl Write, id: ServiceId, limit: usize) -> Result<()> {
    let service = store
        .get_service(id)
        .await?
        .with_context(|| format!("service {} not found", id))?;
    let pings = store.list_pings(id, limit, SortOrder::Descending).await?;

    writeln!(out, "{} ({}) is {}", service.name, service.url, service.status)?;
    for ping in pings {
        writeln!(
            out,
            "  {}  {:<7} {:>6} ms",
            ping.created_at.format("%Y-%m-%d %H:%M:%S"),
            ping.status,
            ping.latency_ms
        )?;
    }
    Ok(())
}
