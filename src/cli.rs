use std::net::{IpAddr, SocketAddr};

use clap::{ArgGroup, Parser};
use rdkafka::ClientConfig;
use regex::Regex;
use tokio::time::Duration;

use crate::constants::{
    DEFAULT_HTTP_HOST, DEFAULT_HTTP_PORT, DEFAULT_METADATA_REFRESH_INTERVAL, DEFAULT_NAME_EXCLUDE,
    DEFAULT_NAME_FILTER, DEFAULT_SCRAPE_TIMEOUT, DEFAULT_TOPIC_WORKERS,
};
use crate::name_filter::NameFilter;
use crate::scrape::ScrapeConfig;

/// Command Line Interface, defined via the declarative,
/// `derive` based functionality of the `clap` crate.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(
    ArgGroup::new("logging_flags")
        .required(false)
        .multiple(false)
        .args(["verbose", "quiet"]),
))]
pub struct Cli {
    // ------------------------------------------------------------------ Admin Client configuration
    /// Initial Kafka Brokers to connect to (format: 'HOST:PORT,...').
    ///
    /// Equivalent to '--kafka-conf=bootstrap.servers:host:port,...'.
    #[arg(short, long = "brokers", value_name = "BOOTSTRAP_BROKERS")]
    pub bootstrap_brokers: String,

    /// Client identifier used by the internal Kafka Clients.
    ///
    /// Equivalent to '--kafka-conf=client.id:my-client-id'.
    #[arg(long = "client-id", value_name = "CLIENT_ID", default_value = env!("CARGO_PKG_NAME"))]
    pub client_id: String,

    /// Additional configuration used by the internal Kafka Clients (format: 'CONF_KEY:CONF_VAL').
    ///
    /// To set multiple configurations keys, use this argument multiple times.
    /// See: https://github.com/edenhill/librdkafka/blob/master/CONFIGURATION.md.
    #[arg(
        long = "kafka-conf",
        value_name = "CONF_KEY:CONF_VAL",
        value_parser = kv_clap_value_parser,
        verbatim_doc_comment
    )]
    pub kafka_config: Vec<KVPair>,

    // ------------------------------------------------------------------ Scrape configuration
    /// Regex that determines which Topics to collect metrics for.
    #[arg(long = "topic.filter", value_name = "REGEX", default_value = DEFAULT_NAME_FILTER)]
    pub topic_filter: Regex,

    /// Regex that determines which Topics to exclude, even if accepted by '--topic.filter'.
    #[arg(long = "topic.exclude", value_name = "REGEX", default_value = DEFAULT_NAME_EXCLUDE)]
    pub topic_exclude: Regex,

    /// Regex that determines which Consumer Groups to collect metrics for.
    #[arg(long = "group.filter", value_name = "REGEX", default_value = DEFAULT_NAME_FILTER)]
    pub group_filter: Regex,

    /// Regex that determines which Consumer Groups to exclude, even if accepted by '--group.filter'.
    #[arg(long = "group.exclude", value_name = "REGEX", default_value = DEFAULT_NAME_EXCLUDE)]
    pub group_exclude: Regex,

    /// Maximum amount of Topics to fetch metadata and offsets for, concurrently.
    ///
    /// The actual amount is half the Topics in the cluster, capped to this value.
    #[arg(
        long = "topic.workers",
        value_name = "WORKERS",
        default_value = DEFAULT_TOPIC_WORKERS,
        value_parser = clap::value_parser!(u16).range(1..),
        verbatim_doc_comment
    )]
    pub topic_workers: u16,

    /// Fetch committed offsets of Consumer Groups for every known Topic Partition.
    ///
    /// By default, committed offsets are fetched only for the Topic Partitions
    /// assigned to the live Members of each Consumer Group.
    #[arg(long = "offset.show-all", verbatim_doc_comment)]
    pub offset_show_all: bool,

    /// Run every scrape request on its own, instead of sharing the scrape already in flight.
    #[arg(long = "concurrent.enable")]
    pub concurrent_enable: bool,

    /// Minimum interval between refreshes of the cluster metadata (e.g. '500ms', '30s', '5m', '1h').
    #[arg(
        long = "refresh.metadata",
        value_name = "INTERVAL",
        default_value = DEFAULT_METADATA_REFRESH_INTERVAL,
        value_parser = duration_clap_value_parser
    )]
    pub refresh_metadata: Duration,

    /// Additionally compute Consumer Groups lag from the commits in the '__consumer_offsets' topic.
    ///
    /// Reported as 'kafka_consumergroup_lag_alternate_source'.
    #[arg(long = "use.alternate-lag", verbatim_doc_comment)]
    pub use_alternate_lag: bool,

    // ------------------------------------------------------------------ HTTP configuration
    /// Constant label added to every exported metric (format: 'LABEL_NAME=LABEL_VALUE').
    ///
    /// To set multiple labels, use this argument multiple times.
    #[arg(
        long = "label",
        value_name = "LABEL_NAME=LABEL_VALUE",
        value_parser = label_clap_value_parser,
        verbatim_doc_comment
    )]
    pub labels: Vec<KVPair>,

    /// Maximum time to wait for a scrape to complete, before answering the HTTP request with an error.
    ///
    /// The scrape itself is not interrupted: its result is served to the requests waiting for it.
    #[arg(
        long = "scrape-timeout",
        value_name = "TIMEOUT",
        default_value = DEFAULT_SCRAPE_TIMEOUT,
        value_parser = duration_clap_value_parser,
        verbatim_doc_comment
    )]
    pub scrape_timeout: Duration,

    /// Host address to listen on for HTTP requests.
    ///
    /// Supports both IPv4 and IPv6 addresses.
    #[arg(long, default_value = DEFAULT_HTTP_HOST, verbatim_doc_comment)]
    pub host: IpAddr,

    /// Port to listen on for HTTP requests.
    #[arg(long, default_value = DEFAULT_HTTP_PORT, verbatim_doc_comment)]
    pub port: u16,

    /// Verbose logging.
    ///
    /// * none    = 'WARN'
    /// * '-v'    = 'INFO'
    /// * '-vv'   = 'DEBUG'
    /// * '-vvv'  = 'TRACE'
    ///
    /// Alternatively, set environment variable 'KOLLECTOR_LOG=(ERROR|WARN|INFO|DEBUG|TRACE|OFF)'.
    #[arg(short, long, action = clap::ArgAction::Count, verbatim_doc_comment)]
    pub verbose: u8,

    /// Quiet logging.
    ///
    /// * none    = 'WARN'
    /// * '-q'    = 'ERROR'
    /// * '-qq'   = 'OFF'
    ///
    /// Alternatively, set environment variable 'KOLLECTOR_LOG=(ERROR|WARN|INFO|DEBUG|TRACE|OFF)'.
    #[arg(short, long, action = clap::ArgAction::Count, verbatim_doc_comment)]
    pub quiet: u8,
}

impl Cli {
    pub fn verbosity_level(&self) -> i8 {
        self.verbose as i8 - self.quiet as i8
    }

    pub fn listen_on(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    pub fn build_client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", self.bootstrap_brokers.clone())
            .set("client.id", self.client_id.clone());
        for cfg in &self.kafka_config {
            config.set(cfg.0.clone(), cfg.1.clone());
        }

        trace!("Created:\n{:#?}", config);
        config
    }

    pub fn build_scrape_config(&self) -> ScrapeConfig {
        ScrapeConfig {
            topic_filter: NameFilter::new(self.topic_filter.clone(), self.topic_exclude.clone()),
            group_filter: NameFilter::new(self.group_filter.clone(), self.group_exclude.clone()),
            topic_workers: self.topic_workers as usize,
            fetch_all_offsets: self.offset_show_all,
            allow_concurrent: self.concurrent_enable,
            metadata_refresh_interval: self.refresh_metadata,
        }
    }
}

/// A simple (key,value) pair of `String`s, useful to be parsed from arguments via [`kv_clap_value_parser`].
pub type KVPair = (String, String);

/// To be used as [`clap::value_parser`] function to create [`KVPair`] values.
fn kv_clap_value_parser(kv: &str) -> Result<KVPair, String> {
    let (k, v) = match kv.split_once(':') {
        None => {
            return Err("Should have 'K:V' format".to_string());
        },
        Some((k, v)) => (k, v),
    };

    Ok((k.to_string(), v.to_string()))
}

/// To be used as [`clap::value_parser`] function to create Prometheus label [`KVPair`] values.
fn label_clap_value_parser(label: &str) -> Result<KVPair, String> {
    let (name, value) = match label.split_once('=') {
        None => {
            return Err("Should have 'LABEL_NAME=LABEL_VALUE' format".to_string());
        },
        Some((n, v)) => (n, v),
    };

    // Prometheus label names: [a-zA-Z_][a-zA-Z0-9_]*
    let valid_name = name
        .chars()
        .enumerate()
        .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()));
    if name.is_empty() || !valid_name {
        return Err(format!("Invalid label name '{name}'"));
    }

    Ok((name.to_string(), value.to_string()))
}

fn duration_clap_value_parser(duration_str: &str) -> Result<Duration, String> {
    humantime::parse_duration(duration_str).map_err(|e| format!("Unable to parse {duration_str}: {e}"))
}
