//! Live extraction through the app's remote-debugging endpoint.
//!
//! Engaged only when static extraction found nothing and the platform's
//! desktop app exposes a debugging protocol. Every step that can fail
//! (unreachable port, no matching page, evaluation error, timeout) collapses
//! to "fallback failed"; the extractor then reports no credential.

mod client;

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use sysinfo::{ProcessesToUpdate, System};
use tokio::time::Instant;
use tracing::{debug, info};

use client::CdpClient;

use crate::paths::Os;
use crate::platform::PlatformAdapter;

/// Fixed local debugging port the app is (re)launched with.
pub const DEBUG_PORT: u16 = 9223;

/// How long a freshly launched app gets to open its debugging endpoint.
const STARTUP_DEADLINE: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(500);
const EVAL_TIMEOUT: Duration = Duration::from_secs(10);

/// One debuggable page, as listed by the `/json` endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdpTarget {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    pub web_socket_debugger_url: Option<String>,
}

/// Pick the page that is the app's own web surface: a `page`-typed target
/// whose URL or title identifies the platform, never a background page with
/// an unrelated URL.
pub fn pick_target<'a>(
    targets: &'a [CdpTarget],
    domain: &str,
    title_hint: &str,
) -> Option<&'a CdpTarget> {
    let pages: Vec<&CdpTarget> = targets.iter().filter(|t| t.kind == "page").collect();
    pages
        .iter()
        .find(|t| {
            t.url.to_ascii_lowercase().contains(domain)
                || t.title.to_ascii_lowercase().contains(title_hint)
        })
        .copied()
        .or_else(|| pages.first().copied())
}

/// Run the whole fallback. `None` is the expected outcome for every failure.
pub async fn live_extract(adapter: &dyn PlatformAdapter, os: Os, home: &Path) -> Option<String> {
    let probe = adapter.cdp_probe()?;

    if !process_running(probe.process_names) {
        debug!(platform = %adapter.platform(), "app not running, relaunching with debug port");
        launch_with_debug_port(adapter, os, home).await?;
    }

    let targets = wait_for_targets(DEBUG_PORT).await?;
    let target = pick_target(&targets, probe.page_domain, probe.page_title)?;
    let ws_url = target.web_socket_debugger_url.as_deref()?;
    debug!(title = %target.title, "attached to debugger target");

    let mut client = CdpClient::connect(ws_url).await?;
    let value = client.evaluate(probe.eval_expression, EVAL_TIMEOUT).await;
    client.close().await;

    let token = value?.as_str()?.to_string();
    if adapter.is_valid_token(&token) {
        info!(platform = %adapter.platform(), "live extraction recovered a token");
        Some(token)
    } else {
        debug!("live extraction returned a value that fails the token grammar");
        None
    }
}

fn process_running(names: &[&str]) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    system
        .processes()
        .values()
        .any(|p| names.iter().any(|&n| p.name().eq_ignore_ascii_case(n)))
}

async fn launch_with_debug_port(
    adapter: &dyn PlatformAdapter,
    os: Os,
    home: &Path,
) -> Option<()> {
    for binary in adapter.launch_candidates(os, home) {
        if !binary.exists() {
            continue;
        }
        let spawned = tokio::process::Command::new(&binary)
            .arg(format!("--remote-debugging-port={DEBUG_PORT}"))
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn();
        match spawned {
            Ok(_) => {
                debug!(binary = %binary.display(), "launched app with debugging enabled");
                return Some(());
            }
            Err(e) => debug!(binary = %binary.display(), error = %e, "launch failed"),
        }
    }
    None
}

async fn wait_for_targets(port: u16) -> Option<Vec<CdpTarget>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .ok()?;
    let deadline = Instant::now() + STARTUP_DEADLINE;
    loop {
        if let Some(targets) = fetch_targets(&client, port).await
            && !targets.is_empty()
        {
            return Some(targets);
        }
        if Instant::now() >= deadline {
            debug!(port, "debugging endpoint never became reachable");
            return None;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn fetch_targets(client: &reqwest::Client, port: u16) -> Option<Vec<CdpTarget>> {
    let url = format!("http://127.0.0.1:{port}/json");
    let response = client.get(&url).send().await.ok()?;
    response.json::<Vec<CdpTarget>>().await.ok()
}
