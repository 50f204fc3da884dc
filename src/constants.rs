/// Kafka internal topic that keeps track of Consumer's committed Offsets.
///
/// It's never reported as a Topic, and it's consumed by the `committed_offsets` module
/// when the alternate lag source is enabled.
pub(crate) const KONSUMER_OFFSETS_DATA_TOPIC: &str = "__consumer_offsets";

/// This is the Consumer Group (`group.id`) value used by
/// the Consumer inside the `committed_offsets` module.
pub(crate) const KONSUMER_OFFSETS_KCL_CONSUMER: &str = "__kollector__consumer_offsets_consumer";

// Defaults for the Command Line Interface
pub(crate) const DEFAULT_NAME_FILTER: &str = ".*";
pub(crate) const DEFAULT_NAME_EXCLUDE: &str = "^$";
pub(crate) const DEFAULT_TOPIC_WORKERS: &str = "100";
pub(crate) const DEFAULT_METADATA_REFRESH_INTERVAL: &str = "30s";
pub(crate) const DEFAULT_SCRAPE_TIMEOUT: &str = "60s";
pub(crate) const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
pub(crate) const DEFAULT_HTTP_PORT: &str = "9308";

/// Environment variable that, if set, overrides the logging verbosity.
pub(crate) const LOG_ENV_VAR: &str = "KOLLECTOR_LOG";
