//! Connection configuration.

use once_cell::sync::Lazy;
use ora_auth::Credentials;
use regex::Regex;

use crate::error::{Error, Result};
use crate::instrumentation::SanitizationConfig;

/// Default number of statements kept in each connection's cache.
pub const DEFAULT_STMT_CACHE_SIZE: usize = 30;

/// Default number of rows fetched along with a query execute.
pub const DEFAULT_PREFETCH_ROWS: u32 = 2;

/// DRCP session purity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Purity {
    /// Let the connection decide: `Reuse` for pooled connections, `New`
    /// for standalone ones.
    #[default]
    Default,
    /// Require a session never used before (`PURITY=NEW`).
    New,
    /// Accept a session previously used by the same connection class
    /// (`PURITY=SELF`).
    Reuse,
}

/// Server process type requested by a connect descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerType {
    /// Whatever the listener hands out.
    #[default]
    Unspecified,
    /// Dedicated server process.
    Dedicated,
    /// Shared server.
    Shared,
    /// Database Resident Connection Pooling.
    Pooled,
}

impl ServerType {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "dedicated" => Ok(Self::Dedicated),
            "shared" => Ok(Self::Shared),
            "pooled" => Ok(Self::Pooled),
            other => Err(Error::Config(format!("unknown server type: {other}"))),
        }
    }
}

/// The parts of a connect string relevant to session management.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectDescriptor {
    /// Host name or address.
    pub host: String,
    /// Listener port.
    pub port: u16,
    /// Service name, if given.
    pub service_name: Option<String>,
    /// Requested server type.
    pub server_type: ServerType,
}

static EZCONNECT_RE: Lazy<std::result::Result<Regex, regex::Error>> = Lazy::new(|| {
    Regex::new(
        r"^(?://)?(?P<host>\[[^\]]+\]|[^:/\s]+)(?::(?P<port>\d+))?(?:/(?P<service>[^:/\s]*))?(?::(?P<server>[A-Za-z]+))?(?:/\S+)?$",
    )
});

static DESCRIPTOR_KEY_RE: Lazy<std::result::Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(?i)\(\s*(HOST|PORT|SERVICE_NAME|SERVER)\s*=\s*([^)\s]+)\s*\)"));

fn compiled(re: &'static Lazy<std::result::Result<Regex, regex::Error>>) -> Result<&'static Regex> {
    Lazy::force(re)
        .as_ref()
        .map_err(|e| Error::Internal(format!("invalid pattern: {e}")))
}

impl ConnectDescriptor {
    /// Default listener port.
    pub const DEFAULT_PORT: u16 = 1521;

    /// Parse an Easy Connect string (`host[:port][/service][:server_type]`)
    /// or a full `(DESCRIPTION=...)` descriptor.
    pub fn parse(connect_string: &str) -> Result<Self> {
        let connect_string = connect_string.trim();
        if connect_string.is_empty() {
            return Err(Error::Config("connect string is empty".into()));
        }
        if connect_string.starts_with('(') {
            return Self::parse_descriptor(connect_string);
        }

        let caps = compiled(&EZCONNECT_RE)?
            .captures(connect_string)
            .ok_or_else(|| Error::Config(format!("invalid connect string: {connect_string}")))?;
        let host = caps
            .name("host")
            .map(|m| m.as_str().trim_matches(|c| c == '[' || c == ']').to_string())
            .unwrap_or_default();
        let port = match caps.name("port") {
            Some(m) => parse_port(m.as_str())?,
            None => Self::DEFAULT_PORT,
        };
        let service_name = caps
            .name("service")
            .map(|m| m.as_str().to_string())
            .filter(|s| !s.is_empty());
        let server_type = match caps.name("server") {
            Some(m) => ServerType::parse(m.as_str())?,
            None => ServerType::Unspecified,
        };

        Ok(Self {
            host,
            port,
            service_name,
            server_type,
        })
    }

    fn parse_descriptor(descriptor: &str) -> Result<Self> {
        let mut parsed = Self {
            host: String::new(),
            port: Self::DEFAULT_PORT,
            service_name: None,
            server_type: ServerType::Unspecified,
        };
        // first occurrence wins, as with address lists only the first
        // address is considered here
        let mut seen = [false; 4];
        for caps in compiled(&DESCRIPTOR_KEY_RE)?.captures_iter(descriptor) {
            let value = &caps[2];
            let slot = match caps[1].to_ascii_uppercase().as_str() {
                "HOST" => 0,
                "PORT" => 1,
                "SERVICE_NAME" => 2,
                _ => 3,
            };
            if std::mem::replace(&mut seen[slot], true) {
                continue;
            }
            match slot {
                0 => parsed.host = value.to_string(),
                1 => parsed.port = parse_port(value)?,
                2 => parsed.service_name = Some(value.to_string()),
                _ => parsed.server_type = ServerType::parse(value)?,
            }
        }
        if parsed.host.is_empty() {
            return Err(Error::Config("connect descriptor has no HOST".into()));
        }
        Ok(parsed)
    }

    /// Whether the descriptor requests a DRCP pooled server.
    #[must_use]
    pub fn is_drcp(&self) -> bool {
        self.server_type == ServerType::Pooled
    }
}

fn parse_port(value: &str) -> Result<u16> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("invalid port: {value}")))
}

/// Parameters used to establish a single connection.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    /// Credentials to authenticate with.
    pub credentials: Credentials,
    /// Easy Connect string or connect descriptor.
    pub connect_string: String,
    /// DRCP connection class.
    pub connection_class: Option<String>,
    /// DRCP session purity.
    pub purity: Purity,
    /// Statement cache capacity, `0` disables caching.
    pub stmt_cache_size: usize,
    /// Fail instead of queueing when an operation is already running.
    pub error_on_concurrent_execute: bool,
    /// Rows fetched along with a query execute.
    pub prefetch_rows: u32,
    /// Whether the connection is owned by a pool.
    pub pooled: bool,
    /// How SQL text is recorded in execute spans.
    pub sanitization: SanitizationConfig,
}

impl Default for ConnectParams {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            connect_string: String::new(),
            connection_class: None,
            purity: Purity::Default,
            stmt_cache_size: DEFAULT_STMT_CACHE_SIZE,
            error_on_concurrent_execute: false,
            prefetch_rows: DEFAULT_PREFETCH_ROWS,
            pooled: false,
            sanitization: SanitizationConfig::default(),
        }
    }
}

impl ConnectParams {
    /// Create parameters for the given connect string and credentials.
    #[must_use]
    pub fn new(connect_string: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            credentials,
            connect_string: connect_string.into(),
            ..Self::default()
        }
    }

    /// Parse a `key=value;...` connection string.
    ///
    /// Recognized keys: `user`, `password`, `connect_string`,
    /// `connection_class`, `purity`, `stmt_cache_size`, `prefetch_rows`,
    /// `error_on_concurrent_execute`, `sanitize_statements`.
    pub fn from_connection_string(conn_str: &str) -> Result<Self> {
        let mut params = Self::default();
        let mut user = None;
        let mut password = None;

        for part in conn_str.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("invalid key-value: {part}")))?;

            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user" | "user id" | "username" => user = Some(value.to_string()),
                "password" | "pwd" => password = Some(value.to_string()),
                "connect_string" | "connectstring" | "data source" => {
                    params.connect_string = value.to_string();
                }
                "connection_class" | "connectionclass" => {
                    params.connection_class = Some(value.to_string());
                }
                "purity" => {
                    params.purity = match value.to_ascii_lowercase().as_str() {
                        "new" => Purity::New,
                        "self" => Purity::Reuse,
                        "default" => Purity::Default,
                        other => return Err(Error::Config(format!("invalid purity: {other}"))),
                    };
                }
                "stmt_cache_size" | "stmtcachesize" => {
                    params.stmt_cache_size = value.parse().map_err(|_| {
                        Error::Config(format!("invalid statement cache size: {value}"))
                    })?;
                }
                "prefetch_rows" | "prefetchrows" => {
                    params.prefetch_rows = value
                        .parse()
                        .map_err(|_| Error::Config(format!("invalid prefetch rows: {value}")))?;
                }
                "error_on_concurrent_execute" => {
                    params.error_on_concurrent_execute = value.eq_ignore_ascii_case("true")
                        || value.eq_ignore_ascii_case("yes")
                        || value == "1";
                }
                "sanitize_statements" => {
                    if value.eq_ignore_ascii_case("false") || value == "0" {
                        params.sanitization = SanitizationConfig::no_sanitization();
                    }
                }
                _ => {
                    tracing::warn!(key = %key, "ignoring unknown connection string key");
                }
            }
        }

        let mut credentials = Credentials::default();
        if let Some(user) = user {
            credentials = credentials.with_user(user);
        }
        if let Some(password) = password {
            credentials = credentials.with_password(&password);
        }
        params.credentials = credentials;

        Ok(params)
    }

    /// Set the DRCP connection class.
    #[must_use]
    pub fn connection_class(mut self, class: impl Into<String>) -> Self {
        self.connection_class = Some(class.into());
        self
    }

    /// Set the DRCP session purity.
    #[must_use]
    pub fn purity(mut self, purity: Purity) -> Self {
        self.purity = purity;
        self
    }

    /// Set the statement cache capacity.
    #[must_use]
    pub fn stmt_cache_size(mut self, size: usize) -> Self {
        self.stmt_cache_size = size;
        self
    }

    /// Fail instead of queueing concurrent operations.
    #[must_use]
    pub fn error_on_concurrent_execute(mut self, enabled: bool) -> Self {
        self.error_on_concurrent_execute = enabled;
        self
    }

    /// Set the number of prefetched rows.
    #[must_use]
    pub fn prefetch_rows(mut self, rows: u32) -> Self {
        self.prefetch_rows = rows;
        self
    }

    /// Set how SQL text is recorded in execute spans.
    #[must_use]
    pub fn sanitization(mut self, sanitization: SanitizationConfig) -> Self {
        self.sanitization = sanitization;
        self
    }

    /// Mark the connection as pool owned.
    #[must_use]
    pub fn pooled(mut self, pooled: bool) -> Self {
        self.pooled = pooled;
        self
    }

    /// Validate credentials and the connect string.
    pub fn validate(&self) -> Result<()> {
        self.credentials.validate()?;
        self.descriptor().map(|_| ())
    }

    /// Parse the connect string.
    pub fn descriptor(&self) -> Result<ConnectDescriptor> {
        ConnectDescriptor::parse(&self.connect_string)
    }

    /// Purity to request, resolving [`Purity::Default`].
    #[must_use]
    pub fn effective_purity(&self) -> Purity {
        match self.purity {
            Purity::Default if self.pooled => Purity::Reuse,
            Purity::Default => Purity::New,
            explicit => explicit,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ezconnect() {
        let desc = ConnectDescriptor::parse("dbhost:1522/orclpdb").unwrap();
        assert_eq!(desc.host, "dbhost");
        assert_eq!(desc.port, 1522);
        assert_eq!(desc.service_name.as_deref(), Some("orclpdb"));
        assert!(!desc.is_drcp());

        let desc = ConnectDescriptor::parse("//dbhost/orclpdb:pooled").unwrap();
        assert_eq!(desc.port, ConnectDescriptor::DEFAULT_PORT);
        assert_eq!(desc.server_type, ServerType::Pooled);
        assert!(desc.is_drcp());

        let desc = ConnectDescriptor::parse("[::1]:1521/svc:DEDICATED").unwrap();
        assert_eq!(desc.host, "::1");
        assert_eq!(desc.server_type, ServerType::Dedicated);
    }

    #[test]
    fn test_parse_full_descriptor() {
        let desc = ConnectDescriptor::parse(
            "(DESCRIPTION=(ADDRESS=(PROTOCOL=TCP)(HOST=db1)(PORT=1530))\
             (CONNECT_DATA=(SERVICE_NAME=sales)(SERVER=POOLED)))",
        )
        .unwrap();
        assert_eq!(desc.host, "db1");
        assert_eq!(desc.port, 1530);
        assert_eq!(desc.service_name.as_deref(), Some("sales"));
        assert!(desc.is_drcp());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(ConnectDescriptor::parse("").is_err());
        assert!(ConnectDescriptor::parse("host:notaport/svc").is_err());
        assert!(ConnectDescriptor::parse("host/svc:bogus").is_err());
        assert!(ConnectDescriptor::parse("(DESCRIPTION=(CONNECT_DATA=(SID=x)))").is_err());
    }

    #[test]
    fn test_from_connection_string() {
        let params = ConnectParams::from_connection_string(
            "user=scott; password=tiger; connect_string=localhost/XEPDB1; stmt_cache_size=50",
        )
        .unwrap();
        assert_eq!(params.credentials.user.as_deref(), Some("scott"));
        assert_eq!(
            params.credentials.reveal_password().unwrap().as_deref(),
            Some("tiger")
        );
        assert_eq!(params.connect_string, "localhost/XEPDB1");
        assert_eq!(params.stmt_cache_size, 50);
        assert!(params.sanitization.enabled);
        params.validate().unwrap();

        let params = ConnectParams::from_connection_string(
            "connect_string=localhost/XEPDB1; sanitize_statements=false",
        )
        .unwrap();
        assert!(!params.sanitization.enabled);
    }

    #[test]
    fn test_from_connection_string_errors() {
        assert!(ConnectParams::from_connection_string("user").is_err());
        assert!(ConnectParams::from_connection_string("stmt_cache_size=lots").is_err());
        assert!(ConnectParams::from_connection_string("purity=dirty").is_err());
    }

    #[test]
    fn test_validate_requires_credentials() {
        let params = ConnectParams::new("localhost/XEPDB1", Credentials::default());
        assert!(matches!(params.validate(), Err(Error::Auth(_))));
    }

    #[test]
    fn test_effective_purity() {
        let params = ConnectParams::default();
        assert_eq!(params.effective_purity(), Purity::New);
        assert_eq!(params.clone().pooled(true).effective_purity(), Purity::Reuse);
        assert_eq!(
            params.pooled(true).purity(Purity::New).effective_purity(),
            Purity::New
        );
    }
}
