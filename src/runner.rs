use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};

use crate::cli::Cli;
use url_hunter::config::Config;
use url_hunter::dedup::Pipeline;
use url_hunter::http_client::ReqwestTransport;
use url_hunter::output::{spawn_url_writer, Format};
use url_hunter::{dedupe, sources, Collector, ScopeSpec, Session};

pub async fn run_from_cli(cli: Cli) -> anyhow::Result<()> {
    // Configure logging based on global flags.
    // Logs go to stderr so stdout carries only results; reqwest/hyper stay at INFO at most.
    use tracing_subscriber::EnvFilter;
    let crate_level = if cli.debug { "debug" } else if cli.verbose { "info" } else { "warn" };
    let filter_str = format!(
        "url_hunter={crate},reqwest=info,hyper=info,h2=info",
        crate = crate_level
    );
    let env_filter = EnvFilter::try_new(&filter_str).unwrap_or_else(|_| EnvFilter::new(crate_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if cli.list_sources {
        list_sources();
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref().map(std::path::Path::new))?;
    let Some(domain) = cli.domain.clone() else {
        bail!("a target domain is required (-d example.com)");
    };
    let domain = host_of(&domain);

    let wanted = select_sources(&cli, &config);
    let enabled = sources::build(&wanted)?;
    if enabled.is_empty() {
        bail!("no sources left to run");
    }

    let scope = ScopeSpec::new(&domain, cli.include_subdomains);
    let transport = Arc::new(ReqwestTransport::new(config.timeout_secs).context("failed to build HTTP client")?);
    let session = Arc::new(Session::new(scope, config.keys.clone(), transport));

    tracing::info!(domain = %domain, subdomains = cli.include_subdomains, sources = ?wanted, "Starting collection");
    let started = Instant::now();

    spawn_cancellation(&session, cli.timeout);

    let collector = Collector::new(session.clone(), enabled);
    let Pipeline { urls, mut errors, handle } = dedupe(collector.collect());

    let errors = tokio::spawn(async move {
        let mut count = 0usize;
        while errors.recv().await.is_some() {
            count += 1;
        }
        count
    });
    let format = if cli.json { Format::Json } else { Format::Plain };
    let writer = spawn_url_writer(cli.output.map(PathBuf::from), format, urls);

    let written = writer.await.context("output writer panicked")??;
    let unique = handle.await.context("dedup task panicked")?;
    let error_count = errors.await.unwrap_or(0);

    tracing::info!(
        unique,
        written,
        errors = error_count,
        elapsed_secs = started.elapsed().as_secs_f64(),
        cancelled = session.cancel.is_cancelled(),
        "Collection finished"
    );
    Ok(())
}

/// Sources from the command line, else the config file, else all; minus exclusions.
fn select_sources(cli: &Cli, config: &Config) -> Vec<String> {
    let base: Vec<String> = if !cli.sources.is_empty() {
        cli.sources.clone()
    } else if !config.sources.is_empty() {
        config.sources.clone()
    } else {
        sources::ALL.iter().map(|s| s.to_string()).collect()
    };
    base.into_iter()
        .filter(|s| !cli.exclude.iter().any(|e| e.eq_ignore_ascii_case(s)))
        .collect()
}

/// Cancel the run on Ctrl-C or after the overall timeout.
fn spawn_cancellation(session: &Arc<Session>, timeout: Option<u64>) {
    let cancel = session.cancel.clone();
    tokio::spawn(async move {
        let deadline = async {
            match timeout {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::warn!("interrupted, stopping sources"),
            _ = deadline => tracing::warn!("timeout reached, stopping sources"),
            _ = cancel.cancelled() => return,
        }
        cancel.cancel();
    });
}

/// Accept either a bare domain or a full URL for the target.
fn host_of(target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        if let Some(host) = url::Url::parse(target).ok().and_then(|u| u.host_str().map(|s| s.to_string())) {
            return host;
        }
    }
    target.trim().to_string()
}

fn list_sources() {
    println!("Available sources:\n");
    for name in sources::ALL {
        let marker = if sources::NEEDS_KEY.contains(name) { " *" } else { "" };
        println!("  {}{}", name, marker);
    }
    println!("\n* = Requires API key");
}
