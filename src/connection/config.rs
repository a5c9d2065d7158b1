use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::core::{DbError, ErrorFormat, Result};
use crate::transaction::{IsolationLevel, TransactionOptions};

/// Client event categories emitted through `tracing`. `Query` logs
/// every operation with its entity and timing; the rest mirror the
/// usual severity ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Query,
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "query" => Ok(Self::Query),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(DbError::Parse(format!("unknown log level: {other}"))),
        }
    }
}

/// Client construction options.
///
/// Assembled with the builder or parsed from a `foliodb://` URL whose
/// query string may carry pool and transaction settings:
///
/// ```
/// use foliodb::connection::ClientOptions;
///
/// let options = ClientOptions::from_url(
///     "foliodb://localhost/portfolio?max_connections=20&isolation=Serializable",
/// )
/// .unwrap();
/// assert_eq!(options.max_connections, 20);
/// ```
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Connection target. The embedded store keys instances by this
    /// URL's database name.
    pub datasource_url: String,
    /// Which event categories to emit. Defaults to warnings and errors.
    pub log: Vec<LogLevel>,
    pub error_format: ErrorFormat,
    /// Defaults applied to every transaction that does not override them.
    pub transaction: TransactionOptions,
    /// Fields dropped from every result of an entity unless a `select`
    /// names them explicitly.
    pub omit: HashMap<String, Vec<String>>,
    pub max_connections: usize,
    pub min_connections: usize,
    /// How long an operation may wait for a pooled connection.
    pub acquire_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            datasource_url: "foliodb://localhost/portfolio".to_string(),
            log: vec![LogLevel::Warn, LogLevel::Error],
            error_format: ErrorFormat::default(),
            transaction: TransactionOptions::default(),
            omit: HashMap::new(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn datasource_url(mut self, url: impl Into<String>) -> Self {
        self.datasource_url = url.into();
        self
    }

    pub fn log(mut self, levels: impl IntoIterator<Item = LogLevel>) -> Self {
        self.log = levels.into_iter().collect();
        self
    }

    pub fn error_format(mut self, format: ErrorFormat) -> Self {
        self.error_format = format;
        self
    }

    pub fn transaction(mut self, options: TransactionOptions) -> Self {
        self.transaction = options;
        self
    }

    /// Suppresses `fields` from every default projection of `entity`.
    pub fn omit<I, S>(mut self, entity: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.omit
            .entry(entity.into())
            .or_default()
            .extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: usize) -> Self {
        self.min_connections = min;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Parses `foliodb://host[:port]/database[?option=value&...]`.
    ///
    /// Recognized options: `max_connections`, `min_connections`,
    /// `acquire_timeout_ms`, `isolation`, `log` (comma-separated).
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url.strip_prefix("foliodb://").ok_or_else(|| {
            DbError::Initialization(format!("datasource URL must start with foliodb://: {url}"))
        })?;

        let (target, query) = match rest.split_once('?') {
            Some((target, query)) => (target, Some(query)),
            None => (rest, None),
        };
        let database = target.split_once('/').map(|(_, db)| db).unwrap_or("");
        if database.is_empty() {
            return Err(DbError::Initialization(format!(
                "datasource URL is missing a database name: {url}"
            )));
        }

        let mut options = Self::new().datasource_url(url);
        if let Some(query) = query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    DbError::Initialization(format!("malformed datasource option: {pair}"))
                })?;
                options = options.apply_option(key, value)?;
            }
        }
        Ok(options)
    }

    fn apply_option(mut self, key: &str, value: &str) -> Result<Self> {
        match key {
            "max_connections" => {
                self.max_connections = parse_number(key, value)?;
            }
            "min_connections" => {
                self.min_connections = parse_number(key, value)?;
            }
            "acquire_timeout_ms" => {
                self.acquire_timeout = Duration::from_millis(parse_number(key, value)?);
            }
            "isolation" => {
                let level: IsolationLevel = value.parse()?;
                self.transaction = self.transaction.isolation_level(level);
            }
            "log" => {
                self.log = value
                    .split(',')
                    .map(LogLevel::from_str)
                    .collect::<Result<_>>()?;
            }
            other => {
                return Err(DbError::Initialization(format!(
                    "unknown datasource option: {other}"
                )));
            }
        }
        Ok(self)
    }

    /// The database name from the datasource URL.
    pub fn database(&self) -> &str {
        self.datasource_url
            .strip_prefix("foliodb://")
            .and_then(|rest| rest.split('?').next())
            .and_then(|target| target.split_once('/').map(|(_, db)| db))
            .unwrap_or("portfolio")
    }

    pub fn logs(&self, level: LogLevel) -> bool {
        self.log.contains(&level)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(DbError::Initialization(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(DbError::Initialization(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| DbError::Initialization(format!("invalid value for {key}: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = ClientOptions::default();
        assert_eq!(options.log, vec![LogLevel::Warn, LogLevel::Error]);
        assert_eq!(options.max_connections, 10);
        assert_eq!(options.min_connections, 1);
        assert_eq!(options.database(), "portfolio");
    }

    #[test]
    fn test_builder_pattern() {
        let options = ClientOptions::new()
            .max_connections(20)
            .min_connections(2)
            .omit("User", ["password"])
            .log([LogLevel::Query]);

        assert_eq!(options.max_connections, 20);
        assert_eq!(options.omit["User"], vec!["password".to_string()]);
        assert!(options.logs(LogLevel::Query));
        assert!(!options.logs(LogLevel::Warn));
    }

    #[test]
    fn test_from_url_with_options() {
        let options = ClientOptions::from_url(
            "foliodb://localhost:5432/resume?max_connections=5&acquire_timeout_ms=250&log=query,error",
        )
        .unwrap();

        assert_eq!(options.database(), "resume");
        assert_eq!(options.max_connections, 5);
        assert_eq!(options.acquire_timeout, Duration::from_millis(250));
        assert_eq!(options.log, vec![LogLevel::Query, LogLevel::Error]);
    }

    #[test]
    fn test_from_url_rejects_bad_input() {
        assert!(ClientOptions::from_url("postgres://localhost/db").is_err());
        assert!(ClientOptions::from_url("foliodb://localhost").is_err());
        assert!(ClientOptions::from_url("foliodb://localhost/db?bogus=1").is_err());
        assert!(ClientOptions::from_url("foliodb://localhost/db?max_connections=lots").is_err());
    }

    #[test]
    fn test_validate() {
        assert!(ClientOptions::new().validate().is_ok());
        assert!(ClientOptions::new().max_connections(0).validate().is_err());
        assert!(
            ClientOptions::new()
                .min_connections(10)
                .max_connections(5)
                .validate()
                .is_err()
        );
    }
}
