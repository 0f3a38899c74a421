// File: footfall-cli/src/main.rs

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use footfall_common::models::viewport::ViewportSample;
use footfall_core::detector::SharedViewport;
use footfall_core::identity::FileCookieJar;
use footfall_core::{AnalyticsClient, AnalyticsConfig, Error};

#[derive(Parser, Debug, Clone)]
#[command(name = "footfall")]
#[command(author, version, about = "Footfall - visitor analytics pipeline driver")]
struct Args {
    /// Mode: "visit" (walk pages as a visitor) or "watch" (listen for
    /// dev-tools alerts)
    #[arg(long, default_value = "visit")]
    mode: String,

    /// Backend base URL; overrides FOOTFALL_BACKEND_URL
    #[arg(long)]
    backend_url: Option<String>,

    /// Pages to visit with dwell seconds, e.g. "/:12,/about:3"
    #[arg(long, default_value = "/:12,/about:3")]
    pages: String,

    /// Referrer reported on session open
    #[arg(long)]
    referrer: Option<String>,

    /// Scroll depth (percent) reported on every page
    #[arg(long)]
    scroll_depth: Option<u32>,

    /// Trip the inspect trap on the first page
    #[arg(long, default_value = "false")]
    trip_inspect: bool,

    /// Admin token sent when joining the alert room in watch mode
    #[arg(long)]
    admin_token: Option<String>,

    /// Directory the visitor cookie jar lives in
    #[arg(long)]
    profile_dir: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("footfall_core=info".parse().unwrap_or_default())
        .add_directive("footfall_cli=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub)
        .expect("Failed to set global subscriber");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();
    info!("Footfall starting. mode={}", args.mode);

    match args.mode.as_str() {
        "visit" => {
            if let Err(e) = run_visit(args).await {
                error!("Visit error: {:?}", e);
            }
        }
        "watch" => {
            if let Err(e) = run_watch(args).await {
                error!("Watch error: {:?}", e);
            }
        }
        other => {
            error!("Invalid mode '{}'. Use --mode=visit or --mode=watch.", other);
        }
    }
    info!("Main finished. Goodbye!");
    Ok(())
}

fn build_config(args: &Args) -> Result<AnalyticsConfig, Error> {
    let mut config = match (&args.backend_url, AnalyticsConfig::from_env()) {
        (_, Ok(cfg)) => cfg,
        (Some(url), Err(_)) => AnalyticsConfig::new(url.clone()),
        (None, Err(e)) => return Err(e),
    };
    if let Some(url) = &args.backend_url {
        config.backend_url = url.clone();
    }
    if let Some(referrer) = &args.referrer {
        config.referrer = Some(referrer.clone());
    }
    if let Some(dir) = &args.profile_dir {
        config.profile_dir = Some(PathBuf::from(dir));
    }
    Ok(config)
}

/// "/:12,/about:3" => [("/", 12), ("/about", 3)]. A page with no ":secs"
/// suffix gets a zero dwell.
fn parse_pages(spec: &str) -> Result<Vec<(String, u64)>, Error> {
    let mut pages = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (path, secs) = match part.rsplit_once(':') {
            Some((path, secs)) => {
                let secs: u64 = secs
                    .parse()
                    .map_err(|_| Error::Parse(format!("bad dwell in '{}'", part)))?;
                (path.to_string(), secs)
            }
            None => (part.to_string(), 0),
        };
        if path.is_empty() {
            return Err(Error::Parse(format!("empty path in '{}'", part)));
        }
        pages.push((path, secs));
    }
    if pages.is_empty() {
        return Err("no pages to visit".into());
    }
    Ok(pages)
}

fn page_title(path: &str) -> String {
    let name = path.trim_matches('/');
    if name.is_empty() {
        return "Home".to_string();
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => format!("{}{}", first.to_uppercase(), chars.as_str()),
        None => "Home".to_string(),
    }
}

async fn run_visit(args: Args) -> Result<(), Error> {
    let config = build_config(&args)?;
    let pages = parse_pages(&args.pages)?;

    // 1) Durable profile: the cookie jar decides who this visitor is.
    let jar = Arc::new(FileCookieJar::new(config.resolve_profile_dir()));
    let viewport = Arc::new(SharedViewport::new(ViewportSample::new(1280, 720, 1280, 720)));

    // 2) Bring the pipeline up and let the session attempt settle.
    let client = AnalyticsClient::create(config, jar, viewport).await?;
    client.wait_until_settled().await;
    match client.session_id() {
        Some(id) => info!("Session established => {}", id),
        None => info!("No session; backend-bound records will be dropped"),
    }

    // 3) Walk the page list, dwelling on each.
    for (index, (path, dwell_secs)) in pages.iter().enumerate() {
        let title = page_title(path);
        info!("Visiting {} ('{}') for {}s", path, title, dwell_secs);
        client.track_page_view(path, &title);
        if let Some(depth) = args.scroll_depth {
            client.track_scroll_depth(depth);
        }
        if index == 0 && args.trip_inspect {
            client.inspect_trap().trigger();
        }
        time::sleep(Duration::from_secs(*dwell_secs)).await;
    }

    // 4) Leave. The final dwell and the session end ride the beacon queue.
    client.shutdown().await;
    Ok(())
}

async fn run_watch(args: Args) -> Result<(), Error> {
    let config = build_config(&args)?;
    let jar = Arc::new(FileCookieJar::new(config.resolve_profile_dir()));
    let viewport = Arc::new(SharedViewport::default());

    let client = AnalyticsClient::create(config, jar, viewport).await?;
    client.wait_until_settled().await;
    if client.session_id().is_none() {
        return Err(Error::Backend(
            "no session; cannot watch for alerts".to_string(),
        ));
    }

    if let Some(token) = &args.admin_token {
        client.join_admin_room(token);
    }
    client.on_dev_tools_alert(|alert| {
        info!(
            "ALERT => visitor={} page={} at={}",
            alert.visitor_id, alert.page_url, alert.timestamp
        );
    });

    // Ctrl-C tears the pipeline down.
    let bus = client.event_bus();
    let _ctrlc_handle = tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {:?}", e);
        }
        info!("Ctrl-C detected; shutting down event bus...");
        bus.shutdown();
    });

    let mut shutdown_rx = client.event_bus().shutdown_rx.clone();
    loop {
        tokio::select! {
            _ = time::sleep(Duration::from_secs(30)) => {
                info!("Watching... channel={:?}", client.channel_status());
            }
            Ok(_) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Shutdown signaled; exiting watch loop.");
                    break;
                }
            }
        }
    }

    client.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_parse_with_and_without_dwell() {
        let pages = parse_pages("/:12, /about:3 ,/projects").unwrap();
        assert_eq!(
            pages,
            vec![
                ("/".to_string(), 12),
                ("/about".to_string(), 3),
                ("/projects".to_string(), 0),
            ]
        );
    }

    #[test]
    fn bad_dwell_is_rejected() {
        assert!(parse_pages("/:soon").is_err());
        assert!(parse_pages("").is_err());
    }

    #[test]
    fn titles_come_from_the_path() {
        assert_eq!(page_title("/"), "Home");
        assert_eq!(page_title("/about"), "About");
        assert_eq!(page_title("projects/"), "Projects");
    }
}
