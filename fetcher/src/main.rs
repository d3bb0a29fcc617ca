use anyhow::{anyhow, bail, Result};
use clap::Parser;
use docindex_core::jsindex::parse_search_index;
use docindex_core::persist::sha1_hex;
use docindex_core::SearchIndex;
use parking_lot::RwLock;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use url::Url;
use tokio::task::JoinSet;

#[derive(Parser, Debug)]
#[command(name = "fetcher")]
#[command(about = "Mirror the searchindex.js of published documentation sites, respecting robots.txt")]
struct Cli {
    /// File with documentation base URLs, one per line (one per documentation version)
    #[arg(long)]
    sites: String,
    /// Output directory for mirrored indexes and manifest.jsonl
    #[arg(long, default_value = "./mirror")]
    output: String,
    /// Number of sites fetched at once
    #[arg(long, default_value_t = 4)]
    concurrency: usize,
    /// Request timeout seconds
    #[arg(long, default_value_t = 12)]
    timeout_secs: u64,
    /// Largest accepted searchindex.js, in bytes
    #[arg(long, default_value_t = 8 * 1024 * 1024)]
    max_bytes: usize,
    /// User-Agent string to use for robots.txt and fetching
    #[arg(long, default_value = "docindex-fetcher/0.1")]
    user_agent: String,
}

#[derive(Debug, Clone)]
struct Robots {
    allows: Vec<String>,
    disallows: Vec<String>,
}

type RobotsCache = Arc<RwLock<HashMap<String, Robots>>>;

#[derive(Debug, Serialize, Deserialize)]
struct ManifestEntry {
    url: String,
    sha1: String,
    envversion: Option<u32>,
    num_docs: usize,
    fetched_at: String,
    changed: bool,
}

struct Fetched {
    url: Url,
    body: String,
    index: SearchIndex,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    let args = Cli::parse();
    let output = PathBuf::from(&args.output);
    fs::create_dir_all(&output)?;

    let client = Client::builder()
        .user_agent(args.user_agent.clone())
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_secs(args.timeout_secs))
        .build()?;

    let mut queue: Vec<Url> = Vec::new();
    for line in BufReader::new(File::open(&args.sites)?).lines() {
        let s = line?.trim().to_string();
        if s.is_empty() || s.starts_with('#') { continue; }
        match Url::parse(&s).or_else(|_| Url::parse(&format!("https://{}", s))) {
            Ok(u) => queue.push(u),
            Err(e) => tracing::warn!(line = %s, error = %e, "skipping invalid site"),
        }
    }
    if queue.is_empty() { return Err(anyhow!("no valid sites")); }
    queue.reverse();
    tracing::info!(sites = queue.len(), concurrency = args.concurrency, output = %output.display(), "fetcher starting");

    let manifest_path = output.join("manifest.jsonl");
    let previous = load_previous(&manifest_path)?;
    let mut manifest = BufWriter::new(OpenOptions::new().create(true).append(true).open(&manifest_path)?);
    let robots_cache: RobotsCache = Arc::new(RwLock::new(HashMap::new()));

    let mut inflight: JoinSet<(Url, Result<Fetched>)> = JoinSet::new();
    let (mut written, mut unchanged, mut failed) = (0usize, 0usize, 0usize);
    loop {
        while inflight.len() < args.concurrency.max(1) {
            let Some(base) = queue.pop() else { break };
            let client_c = client.clone();
            let robots_c = robots_cache.clone();
            let ua = args.user_agent.clone();
            let max_bytes = args.max_bytes;
            inflight.spawn(async move {
                let res = fetch_site(&client_c, &robots_c, &base, &ua, max_bytes).await;
                (base, res)
            });
        }
        let Some(joined) = inflight.join_next().await else { break };
        let (base, res) = joined?;
        let fetched = match res {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(site = %base, error = %e, "fetch failed");
                failed += 1;
                continue;
            }
        };

        if record(&output, &previous, &fetched, &mut manifest)? {
            written += 1;
        } else {
            unchanged += 1;
        }
    }
    manifest.flush()?;

    tracing::info!(written, unchanged, failed, manifest = %manifest_path.display(), "done");
    Ok(())
}

/// Mirrors one fetched index under `output` unless its digest matches the
/// previous run, then appends its manifest line. Returns whether it changed.
fn record<W: Write>(
    output: &Path,
    previous: &HashMap<String, String>,
    fetched: &Fetched,
    manifest: &mut W,
) -> Result<bool> {
    let digest = sha1_hex(fetched.body.as_bytes());
    let url = fetched.url.to_string();
    let changed = previous.get(&url) != Some(&digest);
    if changed {
        let dir = output.join(site_dir(&fetched.url));
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("searchindex.js"), &fetched.body)?;
    }
    let entry = ManifestEntry {
        url,
        sha1: digest,
        envversion: fetched.index.envversion.primary(),
        num_docs: fetched.index.num_docs(),
        fetched_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        changed,
    };
    tracing::info!(url = %entry.url, num_docs = entry.num_docs, changed, "fetched index");
    serde_json::to_writer(&mut *manifest, &entry)?;
    manifest.write_all(b"\n")?;
    Ok(changed)
}

async fn fetch_site(client: &Client, robots: &RobotsCache, base: &Url, ua: &str, max_bytes: usize) -> Result<Fetched> {
    let url = index_url(base)?;
    if !allowed(client, robots, &url, ua).await? {
        bail!("disallowed by robots.txt");
    }
    let mut resp = client.get(url.clone()).send().await?;
    if !resp.status().is_success() {
        bail!("HTTP {}", resp.status());
    }
    if resp.content_length().is_some_and(|len| len as usize > max_bytes) {
        bail!("body larger than {max_bytes} bytes");
    }
    // Content-Length may be missing or wrong; enforce the cap while reading.
    let mut bytes = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        append_capped(&mut bytes, &chunk, max_bytes)?;
    }
    let body = String::from_utf8(bytes)?;
    let index = parse_search_index(&body)?;
    Ok(Fetched { url, body, index })
}

fn append_capped(buf: &mut Vec<u8>, chunk: &[u8], max_bytes: usize) -> Result<()> {
    if buf.len() + chunk.len() > max_bytes {
        bail!("body larger than {max_bytes} bytes");
    }
    buf.extend_from_slice(chunk);
    Ok(())
}

/// `<base>/searchindex.js`, unless the site line already names the file.
fn index_url(base: &Url) -> Result<Url> {
    if base.path().ends_with("searchindex.js") {
        return Ok(base.clone());
    }
    let mut dir = base.clone();
    if !dir.path().ends_with('/') {
        let path = format!("{}/", dir.path());
        dir.set_path(&path);
    }
    Ok(dir.join("searchindex.js")?)
}

/// `<host>/<path-slug>` directory holding a site's mirrored index.
fn site_dir(url: &Url) -> PathBuf {
    let host = url.host_str().unwrap_or("unknown-host");
    let path = url.path().trim_end_matches("searchindex.js").trim_matches('/');
    let slug: String = path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    let mut dir = PathBuf::from(host);
    dir.push(if slug.is_empty() { "root".to_string() } else { slug });
    dir
}

/// Latest digest per URL from an earlier run's manifest.
fn load_previous(path: &Path) -> Result<HashMap<String, String>> {
    let mut out = HashMap::new();
    if !path.exists() { return Ok(out); }
    for line in BufReader::new(File::open(path)?).lines() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        match serde_json::from_str::<ManifestEntry>(&line) {
            Ok(entry) => { out.insert(entry.url, entry.sha1); }
            Err(e) => tracing::warn!(error = %e, "ignoring malformed manifest line"),
        }
    }
    Ok(out)
}

fn parse_robots(txt: &str) -> Robots {
    // minimal parser for the '*' group
    let mut active = false;
    let mut allows = Vec::new();
    let mut disallows = Vec::new();
    for line in txt.lines() {
        let l = line.trim();
        if l.is_empty() || l.starts_with('#') { continue; }
        if let Some((k, v)) = l.split_once(':') {
            let key = k.trim().to_lowercase();
            let val = v.trim();
            match key.as_str() {
                "user-agent" => { active = val == "*"; }
                "allow" if active => allows.push(val.to_string()),
                "disallow" if active && !val.is_empty() => disallows.push(val.to_string()),
                _ => {}
            }
        }
    }
    Robots { allows, disallows }
}

async fn allowed(client: &Client, cache: &RobotsCache, url: &Url, ua: &str) -> Result<bool> {
    let host = match url.host_str() { Some(h) => h.to_string(), None => return Ok(false) };
    let rules_opt = { let c = cache.read(); c.get(&host).cloned() };
    let rules = if let Some(r) = rules_opt { r } else {
        let robots_url = url.join("/robots.txt")?;
        let txt = match client
            .get(robots_url)
            .header(header::USER_AGENT, ua)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
            _ => String::new(),
        };
        let parsed = parse_robots(&txt);
        { let mut c = cache.write(); c.insert(host.clone(), parsed.clone()); }
        parsed
    };
    Ok(path_allowed(url.path(), &rules))
}

fn path_allowed(path: &str, rules: &Robots) -> bool {
    // basic rule precedence: longest matching Allow vs Disallow
    let mut best_allow: Option<&str> = None;
    let mut best_dis: Option<&str> = None;
    for a in &rules.allows { if path.starts_with(a.as_str()) && best_allow.map_or(true, |p| a.len() > p.len()) { best_allow = Some(a); } }
    for d in &rules.disallows { if path.starts_with(d.as_str()) && best_dis.map_or(true, |p| d.len() > p.len()) { best_dis = Some(d); } }
    match (best_allow, best_dis) {
        (Some(a), Some(d)) => a.len() >= d.len(),
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => true,
    }
}
