use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::net::{IpAddr, SocketAddr};

use crate::nlp::bert_ner::{DEFAULT_MODEL_ID, DEFAULT_REVISION};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub addr: SocketAddr,
    pub model_id: String,
    pub model_revision: String,
    pub allowed_hosts: Vec<String>,
    pub max_body_bytes: usize,
    pub quiet: bool,
}

pub fn command() -> Command {
    Command::new("credit-report-extract")
        .version(env!("CARGO_PKG_VERSION"))
        .about("HTTP service extracting fields from credit report PDFs")
        .long_about(
            "Serves POST /extract_and_summarize. The request body names a PDF URL;\n\
            the service downloads it, extracts its text and returns the person name,\n\
            FICO score, open accounts and accounts ever late found in it.",
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("ADDR")
                .help("Bind address [env: HOST] (default: 0.0.0.0)")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .short('p')
                .value_name("PORT")
                .help("Listen port [env: PORT] (default: 5000)")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("model")
                .long("model")
                .value_name("REPO")
                .help("Hugging Face NER model repository [env: NER_MODEL]")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("model-revision")
                .long("model-revision")
                .value_name("REV")
                .help("Model revision [env: NER_MODEL_REVISION] (default: main)")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("allow-host")
                .long("allow-host")
                .value_name("HOST")
                .help("Only fetch PDFs from this host; repeatable, `*.example.com` matches subdomains [env: ALLOWED_HOSTS, comma separated]")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("max-body-bytes")
                .long("max-body-bytes")
                .value_name("BYTES")
                .help("Maximum request body size [env: MAX_BODY_BYTES] (default: 1048576)")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .help("Only log errors unless RUST_LOG is set")
                .action(ArgAction::SetTrue),
        )
}

impl Config {
    /// Builds the configuration from parsed arguments, falling back to
    /// `env` for every option that was not given on the command line.
    pub fn from_matches<F>(matches: &ArgMatches, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |arg: &str, var: &str| -> Option<String> {
            matches
                .get_one::<String>(arg)
                .cloned()
                .or_else(|| env(var))
                .filter(|v| !v.trim().is_empty())
        };

        let host = pick("host", "HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let ip: IpAddr = host
            .trim()
            .parse()
            .with_context(|| format!("invalid bind address: {}", host))?;

        let port = match pick("port", "PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("invalid port: {}", raw))?,
            None => DEFAULT_PORT,
        };

        let max_body_bytes = match pick("max-body-bytes", "MAX_BODY_BYTES") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("invalid max body size: {}", raw))?,
            None => DEFAULT_MAX_BODY_BYTES,
        };

        let allowed_hosts: Vec<String> = match matches.get_many::<String>("allow-host") {
            Some(values) => values.cloned().collect(),
            None => env("ALLOWED_HOSTS")
                .map(|list| list.split(',').map(|h| h.trim().to_string()).collect())
                .unwrap_or_default(),
        };
        let allowed_hosts = allowed_hosts.into_iter().filter(|h| !h.is_empty()).collect();

        Ok(Self {
            addr: SocketAddr::new(ip, port),
            model_id: pick("model", "NER_MODEL").unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            model_revision: pick("model-revision", "NER_MODEL_REVISION")
                .unwrap_or_else(|| DEFAULT_REVISION.to_string()),
            allowed_hosts,
            max_body_bytes,
            quiet: matches.get_flag("quiet"),
        })
    }
}
