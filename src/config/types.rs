use crate::config::defaults;
use serde::Deserialize;

/// Main configuration structure for Archive-Dispatch
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(rename = "service", default = "defaults::default_services")]
    pub services: Vec<ServiceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dispatcher: DispatcherConfig::default(),
            user_agent: UserAgentConfig::default(),
            output: OutputConfig::default(),
            services: defaults::default_services(),
        }
    }
}

impl Config {
    /// Finds a service entry by name
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Returns the names of all configured services, in configuration order
    pub fn service_names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }
}

/// Selects how much machinery adapters use for each operation
///
/// The mode is fixed when adapters are built; nothing branches on it afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Retry schedules and post-submit verification
    #[default]
    Enhanced,
    /// One attempt per operation, no verification
    Basic,
}

/// Dispatcher-wide behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DispatcherConfig {
    #[serde(default)]
    pub mode: DispatchMode,

    /// Overall deadline for one `submit`/`lookup` fan-out (milliseconds)
    #[serde(default = "defaults::deadline_ms")]
    pub deadline_ms: Option<u64>,

    /// Refill rate (requests/second) for services without their own profile
    #[serde(default = "defaults::default_rate")]
    pub default_rate: f64,

    /// Burst capacity for services without their own profile
    #[serde(default = "defaults::default_burst")]
    pub default_burst: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            mode: DispatchMode::default(),
            deadline_ms: defaults::deadline_ms(),
            default_rate: defaults::default_rate(),
            default_burst: defaults::default_burst(),
        }
    }
}

/// Identification sent with every outgoing request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Browser-like User-Agent header value
    #[serde(default = "defaults::identity")]
    pub identity: String,

    /// Accept-Language header value
    #[serde(default = "defaults::accept_language")]
    pub accept_language: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            identity: defaults::identity(),
            accept_language: defaults::accept_language(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory where WARC containers are written
    #[serde(default = "defaults::warc_dir")]
    pub warc_dir: String,

    /// Whether new containers are gzip-compressed per record
    #[serde(default = "defaults::compress")]
    pub compress: bool,

    /// Optional path for a markdown report of each run
    #[serde(default)]
    pub report_path: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            warc_dir: defaults::warc_dir(),
            compress: defaults::compress(),
            report_path: None,
        }
    }
}

/// The protocol family a service speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    /// Wayback-style service with an availability API and a save endpoint
    Primary,
    /// CAPTCHA-protected service reachable through interchangeable mirrors
    Mirror,
    /// Read-only lookup across several snapshot sources
    Aggregate,
}

/// One archiving service
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceConfig {
    /// Service name, also the rate-limiter bucket name
    pub name: String,

    pub kind: ServiceKind,

    /// Token refill rate (requests per second)
    pub rate: f64,

    /// Maximum burst size
    pub burst: u32,

    /// Per-request timeout (milliseconds)
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    /// Submission endpoint templates, in mirror-rotation order
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// Existence-check template (primary services)
    #[serde(default)]
    pub check_endpoint: Option<String>,

    /// Listing/lookup template
    #[serde(default)]
    pub lookup_endpoint: Option<String>,

    /// Waits between attempts (milliseconds)
    #[serde(default)]
    pub retry_schedule_ms: Vec<u64>,

    /// Upper bound on the sum of retry waits (milliseconds)
    #[serde(default = "defaults::max_total_wait_ms")]
    pub max_total_wait_ms: u64,

    /// Upper bound on attempts, in addition to the schedule length
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Randomize mirror order for every submission
    #[serde(default)]
    pub shuffle_mirrors: bool,

    #[serde(default)]
    pub markers: MarkerConfig,

    /// Snapshot sources (aggregate services)
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// Response-body and redirect markers used to classify responses
///
/// Remote markup changes over time, so these live in configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MarkerConfig {
    #[serde(default)]
    pub captcha: Vec<String>,

    #[serde(default)]
    pub already_archived: Vec<String>,

    #[serde(default)]
    pub rate_limited: Vec<String>,

    /// Substrings of a final URL that identify an archived copy
    #[serde(default)]
    pub archive_url: Vec<String>,
}

/// How a lookup source is queried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFormat {
    /// Memento TimeTravel JSON document
    MementoJson,
    /// Plain GET; a successful response means the listing exists
    Reachable,
    /// No request; the expanded template is reported as-is
    Link,
}

/// One lookup source of an aggregate service
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    pub name: String,
    pub template: String,
    pub format: SourceFormat,
}
