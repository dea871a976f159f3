//! Configuration loading and service-binding resolution
//!
//! Two sources feed the analyzer configuration:
//! 1. **Platform descriptors** (`VCAP_APPLICATION`, `VCAP_SERVICES`): decide the
//!    deployment context and the broker/database bindings. When absent the
//!    service runs against local defaults.
//! 2. **TOML bootstrap file** (optional): logging, static assets, topic names and
//!    timer settings. A missing file is never fatal.
//!
//! # Port priority
//!
//! 1. Command-line argument / `ASE_PORT`
//! 2. Platform-assigned port (managed deployments only)
//! 3. TOML `port`
//! 4. Local default (3003)

use crate::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Port used when no platform descriptor is present
pub const LOCAL_PORT: u16 = 3003;
/// Memory limit (MB) reported when no platform descriptor is present
pub const LOCAL_MEMORY_LIMIT_MB: u64 = 128;
/// Instance index reported when no platform descriptor is present
pub const LOCAL_INSTANCE_INDEX: i64 = -1;
/// Broker address used when no service descriptor is present
pub const LOCAL_BROKER_URL: &str = "amqp://localhost:5672";
/// Database address used when no service descriptor is present
pub const LOCAL_DATABASE_URL: &str = "mongodb://localhost:27017/ase";

/// Name of the message-broker binding in `VCAP_SERVICES`
pub const BROKER_SERVICE_NAME: &str = "mqlight";
/// Name of the database binding in `VCAP_SERVICES`
pub const DATABASE_SERVICE_NAME: &str = "mongodb-2.4";

pub const ENV_APPLICATION: &str = "VCAP_APPLICATION";
pub const ENV_SERVICES: &str = "VCAP_SERVICES";
pub const ENV_APP_PORT: &str = "VCAP_APP_PORT";
pub const ENV_PORT: &str = "PORT";

/// Deployment metadata for this process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationInfo {
    /// True when an application descriptor was supplied by the platform
    pub managed: bool,
    pub port: u16,
    pub memory_limit_mb: u64,
    pub instance_index: i64,
}

impl ApplicationInfo {
    /// Defaults for a process started outside any managed platform
    pub fn local() -> Self {
        Self {
            managed: false,
            port: LOCAL_PORT,
            memory_limit_mb: LOCAL_MEMORY_LIMIT_MB,
            instance_index: LOCAL_INSTANCE_INDEX,
        }
    }
}

/// Connection parameters for the message broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerCredentials {
    pub service: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl BrokerCredentials {
    pub fn local() -> Self {
        Self {
            service: LOCAL_BROKER_URL.to_string(),
            username: None,
            password: None,
        }
    }

    /// Broker URI with credentials folded into the authority
    ///
    /// Credentials already present in `service` win over the separate fields.
    pub fn connection_uri(&self) -> String {
        let Some(user) = self.username.as_deref() else {
            return self.service.clone();
        };

        let Some((scheme, rest)) = self.service.split_once("://") else {
            return self.service.clone();
        };

        let authority = rest.split('/').next().unwrap_or(rest);
        if authority.contains('@') {
            return self.service.clone();
        }

        match self.password.as_deref() {
            Some(password) => format!("{}://{}:{}@{}", scheme, user, password, rest),
            None => format!("{}://{}@{}", scheme, user, rest),
        }
    }
}

/// Everything the platform descriptors decide
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceBindings {
    pub application: ApplicationInfo,
    pub broker: BrokerCredentials,
    pub database_url: String,
}

#[derive(Debug, Deserialize)]
struct ServiceInstance<C> {
    credentials: C,
}

#[derive(Debug, Deserialize)]
struct BrokerBinding {
    #[serde(rename = "connectionLookupURI")]
    connection_lookup_uri: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DatabaseBinding {
    url: String,
}

impl ServiceBindings {
    /// Resolve bindings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve bindings through an arbitrary variable lookup
    ///
    /// Fails when a service descriptor is present but lacks the broker or
    /// database binding, or when a descriptor is not valid JSON.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let application = match lookup(ENV_APPLICATION) {
            Some(raw) => parse_application(&raw, &lookup)?,
            None => ApplicationInfo::local(),
        };

        let (broker, database_url) = match lookup(ENV_SERVICES) {
            Some(raw) => {
                info!("Running on managed platform (service descriptor present)");
                let services: HashMap<String, Value> = serde_json::from_str(&raw)?;
                let broker: BrokerBinding = first_binding(&services, BROKER_SERVICE_NAME)?;
                let database: DatabaseBinding = first_binding(&services, DATABASE_SERVICE_NAME)?;
                (
                    BrokerCredentials {
                        service: broker.connection_lookup_uri,
                        username: broker.username,
                        password: broker.password,
                    },
                    database.url,
                )
            }
            None => {
                info!("No service descriptor, using local broker and database");
                (BrokerCredentials::local(), LOCAL_DATABASE_URL.to_string())
            }
        };

        Ok(Self {
            application,
            broker,
            database_url,
        })
    }
}

fn parse_application<F>(raw: &str, lookup: &F) -> Result<ApplicationInfo>
where
    F: Fn(&str) -> Option<String>,
{
    let descriptor: Value = serde_json::from_str(raw)?;

    let memory_limit_mb = descriptor
        .get("limits")
        .and_then(|limits| limits.get("mem"))
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::Config(format!("{} lacks limits.mem", ENV_APPLICATION)))?;

    let instance_index = descriptor
        .get("instance_index")
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::Config(format!("{} lacks instance_index", ENV_APPLICATION)))?;

    let raw_port = lookup(ENV_APP_PORT)
        .or_else(|| lookup(ENV_PORT))
        .ok_or_else(|| {
            Error::Config(format!("{} present but neither {} nor {} is set", ENV_APPLICATION, ENV_APP_PORT, ENV_PORT))
        })?;
    let port = raw_port
        .trim()
        .parse::<u16>()
        .map_err(|e| Error::Config(format!("Invalid platform port '{}': {}", raw_port, e)))?;

    Ok(ApplicationInfo {
        managed: true,
        port,
        memory_limit_mb,
        instance_index,
    })
}

fn first_binding<C>(services: &HashMap<String, Value>, name: &str) -> Result<C>
where
    C: for<'de> Deserialize<'de>,
{
    let instance = services
        .get(name)
        .and_then(Value::as_array)
        .and_then(|instances| instances.first())
        .cloned()
        .ok_or_else(|| Error::MissingBinding(name.to_string()))?;

    let instance: ServiceInstance<C> = serde_json::from_value(instance)
        .map_err(|e| Error::Config(format!("Malformed '{}' binding: {}", name, e)))?;
    Ok(instance.credentials)
}

/// Resolve the HTTP port following the module-level priority order
pub fn resolve_port(cli_port: Option<u16>, toml_port: Option<u16>, application: &ApplicationInfo) -> u16 {
    if let Some(port) = cli_port {
        return port;
    }
    if application.managed {
        return application.port;
    }
    toml_port.unwrap_or(application.port)
}

/// Bootstrap configuration loaded from TOML file
///
/// Every field is optional; an empty file equals the compiled defaults.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct TomlConfig {
    /// HTTP port for local runs (platform-assigned port wins when managed)
    #[serde(default)]
    pub port: Option<u16>,

    /// Directory served by the HTTP listener
    #[serde(default)]
    pub static_dir: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub messaging: MessagingConfig,

    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Topic and delivery settings for the message client
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MessagingConfig {
    /// Topic exchange carrying all ASE topics
    pub exchange: String,
    /// Inbound topic carrying tweet records
    pub tweets_topic: String,
    /// Outbound topic for analyzed notifications
    pub analyzed_topic: String,
    /// Downstream aggregation topic (declared, not published by the analyzer)
    pub aggregate_topic: String,
    /// Shared subscription name; all analyzer instances compete on it
    pub share_id: String,
    /// Prefetch credit requested from the broker
    pub credit: u16,
    /// Expiry of published notifications
    pub notification_ttl_ms: u64,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            exchange: "amq.topic".to_string(),
            tweets_topic: "mqlight/ase/tweets".to_string(),
            analyzed_topic: "mqlight/ase/analyzed".to_string(),
            aggregate_topic: "mqlight/ase/aggregate".to_string(),
            share_id: "ase-analyzer".to_string(),
            credit: 5,
            notification_ttl_ms: 60 * 60 * 1000,
        }
    }
}

/// Periodic heartbeat settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub interval_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Where the bootstrap settings came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// No file was named
    Defaults,
    /// The named file does not exist; defaults are in effect
    Missing(PathBuf),
    /// Parsed from this file
    File(PathBuf),
}

/// Bootstrap settings together with their origin
///
/// Loading happens before the tracing subscriber is installed, so the caller
/// reports `source` once logging is up.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: TomlConfig,
    pub source: ConfigSource,
}

/// Load the TOML bootstrap file
///
/// `None` or a missing file yields defaults; a file that exists but does not
/// parse is a configuration error.
pub fn load_toml_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let Some(path) = path else {
        return Ok(LoadedConfig {
            config: TomlConfig::default(),
            source: ConfigSource::Defaults,
        });
    };

    if !path.exists() {
        return Ok(LoadedConfig {
            config: TomlConfig::default(),
            source: ConfigSource::Missing(path.to_path_buf()),
        });
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    Ok(LoadedConfig {
        config,
        source: ConfigSource::File(path.to_path_buf()),
    })
}
