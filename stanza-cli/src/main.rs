// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Stanza: reverse-proxy configuration renderer
//
//  Input:   service descriptors (YAML / JSON)
//  Secrets: files under the secrets dir, then environment
//  Output:  proxy configuration text on stdout, logs on stderr
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use anyhow::Context;
use clap::Parser;
use stanza_core::config::StanzaConfig;
use stanza_core::lookup::EnvLookup;
use stanza_core::model::load_services;
use stanza_render::{Renderer, group_by_src_port};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "stanza", version, about = "Render reverse-proxy configuration from service descriptors")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/stanza/stanza.yaml")]
    config: PathBuf,

    /// Service descriptor file with a top-level `services` list
    #[arg(short, long)]
    services: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Tracing ──
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Stanza starting");

    // ── Config ──
    let config = if cli.config.exists() {
        info!(path = %cli.config.display(), "Loading config file");
        StanzaConfig::load(&cli.config)?
    } else {
        info!("No config file found, using defaults");
        StanzaConfig::default()
    };

    // ── Services ──
    let services = load_services(&cli.services)
        .with_context(|| format!("loading services from {}", cli.services.display()))?;
    let tcp_groups = group_by_src_port(&services);
    info!(
        services = services.len(),
        tcp_ports = tcp_groups.len(),
        "Service descriptors loaded"
    );

    // ── Render ──
    let lookup = Arc::new(EnvLookup::new(&config.secrets));
    let renderer = Renderer::new(config.render, lookup)?;
    let rendered = renderer
        .render(&services, &tcp_groups)
        .context("rendering proxy configuration")?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(rendered.to_config_text().as_bytes())?;
    stdout.flush()?;

    info!("Stanza finished");
    Ok(())
}
