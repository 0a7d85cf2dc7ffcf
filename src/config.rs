//! Resolver configuration.
//!
//! ```toml
//! zones = ["example.org."]
//! url = "postgresql://dns@db.internal/dns"
//! tls = ["client.crt", "client.key", "ca.pem"]
//! mode = "bind"
//! timeout = 5
//! max-connections = 10
//!
//! [queries]
//! a = "SELECT name, ttl, addr FROM a_record WHERE name = '{{.Name}}'"
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use hickory_proto::rr::RecordType;
use serde::Deserialize;
use url::Url;

use crate::database::{self, ConnectOptions, TlsArgs};
use crate::error::ConfigError;
use crate::resolver::{DEFAULT_TIMEOUT, Resolver};
use crate::template::{QueryMode, QueryTemplates};
use crate::zone::ZoneMatcher;

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_max_connections() -> u32 {
    ConnectOptions::default().max_connections
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ResolverConfig {
    #[serde(default)]
    zones: Vec<String>,

    #[serde(default)]
    url: Option<String>,

    #[serde(default)]
    tls: Vec<Utf8PathBuf>,

    /// Query overrides keyed by record type name.
    #[serde(default)]
    queries: BTreeMap<String, String>,

    #[serde(default)]
    mode: QueryMode,

    /// Seconds allowed for each database call.
    #[serde(default = "default_timeout")]
    timeout: u64,

    #[serde(default = "default_max_connections")]
    max_connections: u32,
}

impl ResolverConfig {
    pub fn new<I, S>(zones: I, url: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            zones: zones.into_iter().map(Into::into).collect(),
            url: Some(url.into()),
            tls: Vec::new(),
            queries: BTreeMap::new(),
            mode: QueryMode::default(),
            timeout: default_timeout(),
            max_connections: default_max_connections(),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn with_tls<I, P>(mut self, tls: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.tls = tls.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_query(mut self, record_type: impl Into<String>, query: impl Into<String>) -> Self {
        self.queries.insert(record_type.into(), query.into());
        self
    }

    pub fn with_mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.as_secs();
        self
    }

    pub fn zones(&self) -> Result<ZoneMatcher, ConfigError> {
        ZoneMatcher::new(&self.zones)
    }

    pub fn url(&self) -> Result<Url, ConfigError> {
        match self.url.as_deref().map(str::trim) {
            None | Some("") => Err(ConfigError::MissingUrl),
            Some(url) => Ok(Url::parse(url)?),
        }
    }

    pub fn tls(&self) -> Result<TlsArgs, ConfigError> {
        TlsArgs::from_args(self.tls.iter().cloned())
    }

    /// The default queries with the configured overrides applied.
    ///
    /// Every template is rendered once in the configured mode here, so templates
    /// that cannot be used surface before serving.
    pub fn queries(&self) -> Result<QueryTemplates, ConfigError> {
        let mut templates = QueryTemplates::with_defaults();
        for (key, query) in &self.queries {
            let record_type = match key.to_ascii_lowercase().as_str() {
                "a" => RecordType::A,
                "aaaa" => RecordType::AAAA,
                "cname" => RecordType::CNAME,
                _ => return Err(ConfigError::UnsupportedType(key.clone())),
            };
            templates.insert(record_type, query.as_str());
        }

        for record_type in templates.types() {
            if let Some(template) = templates.get(record_type) {
                template
                    .validate(self.mode)
                    .map_err(|source| ConfigError::Template {
                        record_type,
                        source,
                    })?;
            }
        }
        Ok(templates)
    }

    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        match self.timeout {
            0 => Err(ConfigError::ZeroTimeout),
            secs => Ok(Duration::from_secs(secs)),
        }
    }

    pub fn connect_options(&self) -> Result<ConnectOptions, ConfigError> {
        Ok(ConnectOptions {
            max_connections: self.max_connections,
            acquire_timeout: self.timeout()?,
        })
    }

    /// Validate the configuration and build a resolver in front of `next`.
    ///
    /// Must be called within a Tokio runtime. No database connection is made.
    pub fn build<N>(&self, next: N) -> Result<Resolver<N>, ConfigError> {
        let zones = self.zones()?;
        let url = self.url()?;
        let tls = self.tls()?;
        let templates = self.queries()?;
        let options = self.connect_options()?;
        let store = database::connect(&url, &tls, &options)?;

        tracing::info!(
            zones = zones.zones().len(),
            mode = ?self.mode,
            "configured {} resolver",
            crate::resolver::NAME
        );
        Ok(Resolver::new(zones, templates, store, next)
            .with_mode(self.mode)
            .with_timeout(options.acquire_timeout))
    }
}
