use anyhow::Context;
use std::env;
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod nlp;
mod report;
mod server;
mod utils;

use config::Config;
use nlp::bert_ner::BertNer;
use report::FieldExtractor;
use server::AppState;
use utils::fetch::{DocumentFetcher, FetchPolicy};

/// Renders the startup banner: a title over `label  value` rows, framed and
/// sized to the widest row. Content carries no escape codes so widths are
/// plain char counts; the whole frame is tinted cyan.
fn banner(title: &str, rows: &[(&str, &str)]) -> String {
    let label_width = rows.iter().map(|(l, _)| l.chars().count()).max().unwrap_or(0);
    let lines: Vec<String> = std::iter::once(title.to_string())
        .chain(std::iter::once(String::new()))
        .chain(
            rows.iter()
                .map(|(label, value)| format!("{:<width$}  {}", label, value, width = label_width)),
        )
        .collect();
    let inner = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) + 4;

    let mut out = format!("\x1b[36m╭{}╮\n", "─".repeat(inner));
    for line in &lines {
        let pad = inner - 2 - line.chars().count();
        out.push_str(&format!("│  {}{}│\n", line, " ".repeat(pad)));
    }
    out.push_str(&format!("╰{}╯\x1b[0m", "─".repeat(inner)));
    out
}

fn init_tracing(quiet: bool) {
    // RUST_LOG wins; otherwise info, or errors only in quiet mode
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if quiet { "error" } else { "info" }));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

async fn run(cfg: Config) -> anyhow::Result<()> {
    // The model must be available before any request is served.
    info!(model = %cfg.model_id, revision = %cfg.model_revision, "Loading NER model");
    let (model_id, revision) = (cfg.model_id.clone(), cfg.model_revision.clone());
    let ner = tokio::task::spawn_blocking(move || BertNer::load(&model_id, &revision))
        .await
        .context("model loader task failed")?
        .with_context(|| format!("failed to obtain NER model {}", cfg.model_id))?;

    let policy = FetchPolicy::new(&cfg.allowed_hosts);
    if policy.is_restricted() {
        info!(hosts = ?cfg.allowed_hosts, "Fetching restricted to allow-listed hosts");
    } else {
        warn!("No host allow-list configured; any reachable URL will be fetched");
    }

    let state = AppState {
        fetcher: DocumentFetcher::new(policy)?,
        extractor: FieldExtractor::new(Arc::new(ner)),
    };
    let app = server::router(state, cfg.max_body_bytes);

    if !cfg.quiet {
        let listen = format!("http://{}", cfg.addr);
        let body_limit = format!("{} bytes", cfg.max_body_bytes);
        let hosts = if cfg.allowed_hosts.is_empty() {
            "any".to_string()
        } else {
            cfg.allowed_hosts.join(", ")
        };
        eprintln!(
            "\n{}\n",
            banner(
                &format!("credit-report-extract {}", env!("CARGO_PKG_VERSION")),
                &[
                    ("listen", listen.as_str()),
                    ("endpoint", "POST /extract_and_summarize"),
                    ("model", cfg.model_id.as_str()),
                    ("hosts", hosts.as_str()),
                    ("body limit", body_limit.as_str()),
                ],
            )
        );
    }

    server::serve(cfg.addr, app).await
}

#[tokio::main]
async fn main() {
    let matches = config::command().get_matches();
    init_tracing(matches.get_flag("quiet"));

    let cfg = match Config::from_matches(&matches, |key| env::var(key).ok()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(cfg).await {
        error!("Fatal: {:#}", e);
        process::exit(1);
    }
}
