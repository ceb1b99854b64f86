//! Process configuration.
//!
//! Flags fall back to environment variables, using the variable names the
//! relay has always been deployed with (`backend_url`, `queueURL`,
//! `tableName`). [`RelayConfig::from_args`] validates everything up front so a
//! misconfigured process fails at startup rather than on its first message.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use relay::{QueueName, TableName};
use thiserror::Error;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "webhook-relay")]
#[command(about = "Accepts webhooks, queues them in order, and relays them to a backend")]
#[command(version)]
pub struct Args {
    /// Address the webhook ingress listens on.
    #[arg(long, env = "RELAY_INGRESS_ADDR", default_value = "0.0.0.0:8080")]
    pub ingress_addr: SocketAddr,

    /// Address of the admin listener (health and record lookup).
    #[arg(long, env = "RELAY_ADMIN_ADDR", default_value = "127.0.0.1:8081")]
    pub admin_addr: SocketAddr,

    /// Base URL relayed requests are sent to.
    #[arg(long, env = "backend_url")]
    pub backend_url: Option<String>,

    /// Name of the ordered queue.
    #[arg(long, env = "queueURL")]
    pub queue_name: Option<String>,

    /// Name of the record table.
    #[arg(long, env = "tableName")]
    pub table_name: Option<String>,

    /// Keep records and the queue journal under this directory instead of
    /// in memory.
    #[arg(long, env = "RELAY_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    /// Derive the group key from this top-level JSON body field instead of
    /// routing every message to one group.
    #[arg(long, env = "RELAY_GROUP_BY_FIELD")]
    pub group_by_field: Option<String>,

    /// Maximum concurrent consumer invocations.
    #[arg(long, env = "RELAY_POOL_SIZE", default_value = "2")]
    pub pool_size: usize,

    /// Wall-clock budget of one consumer invocation, in seconds.
    #[arg(long, env = "RELAY_INVOCATION_TIMEOUT_SECS", default_value = "10")]
    pub invocation_timeout_secs: u64,

    /// Backend request timeout in seconds; must be below the invocation budget.
    #[arg(long, env = "RELAY_BACKEND_TIMEOUT_SECS", default_value = "5")]
    pub backend_timeout_secs: u64,

    /// Delay before a failed message becomes visible again, in milliseconds.
    #[arg(long, env = "RELAY_REDELIVERY_DELAY_MS", default_value = "30000")]
    pub redelivery_delay_ms: u64,

    /// Content-based deduplication window, in seconds.
    #[arg(long, env = "RELAY_DEDUP_WINDOW_SECS", default_value = "300")]
    pub dedup_window_secs: u64,

    /// Receives after which a failing message is dead-lettered.
    #[arg(long, env = "RELAY_MAX_RECEIVE_COUNT")]
    pub max_receive_count: Option<u32>,

    /// Also run the faux backend on this address; it becomes the backend when
    /// no backend URL is configured.
    #[arg(long, env = "RELAY_FAUX_BACKEND_ADDR")]
    pub faux_backend_addr: Option<SocketAddr>,

    /// OTLP gRPC endpoint; traces are exported only when set.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Errors raised while validating [`Args`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required value was given neither as a flag nor in the environment.
    #[error("Missing required setting --{flag} (or environment variable {env})")]
    Missing {
        /// Flag name.
        flag: &'static str,
        /// Environment variable name.
        env: &'static str,
    },

    /// A value is present but unusable.
    #[error("Invalid value for --{flag}: {message}")]
    Invalid {
        /// Flag name.
        flag: &'static str,
        /// Why the value was rejected.
        message: String,
    },
}

/// Where relayed requests go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendTarget {
    /// An external backend.
    Url(String),
    /// The faux backend started by this process.
    Faux,
}

/// Validated process configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub ingress_addr: SocketAddr,
    pub admin_addr: SocketAddr,
    pub backend: BackendTarget,
    pub queue_name: QueueName,
    pub table_name: TableName,
    pub store_dir: Option<PathBuf>,
    pub group_by_field: Option<String>,
    pub pool_size: usize,
    pub invocation_timeout: Duration,
    pub backend_timeout: Duration,
    pub redelivery_delay: Duration,
    pub dedup_window: Duration,
    pub max_receive_count: Option<u32>,
    pub faux_backend_addr: Option<SocketAddr>,
    pub otlp_endpoint: Option<String>,
    pub log_level: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl RelayConfig {
    /// Validates `args`.
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let backend = match (non_empty(args.backend_url), args.faux_backend_addr) {
            (Some(url), _) => BackendTarget::Url(url),
            (None, Some(_)) => BackendTarget::Faux,
            (None, None) => {
                return Err(ConfigError::Missing {
                    flag: "backend-url",
                    env: "backend_url",
                })
            }
        };
        let queue_name = non_empty(args.queue_name)
            .and_then(QueueName::new)
            .ok_or(ConfigError::Missing {
                flag: "queue-name",
                env: "queueURL",
            })?;
        let table_name = non_empty(args.table_name)
            .and_then(TableName::new)
            .ok_or(ConfigError::Missing {
                flag: "table-name",
                env: "tableName",
            })?;

        if args.pool_size == 0 {
            return Err(ConfigError::Invalid {
                flag: "pool-size",
                message: "must be at least 1".to_string(),
            });
        }
        if args.invocation_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                flag: "invocation-timeout-secs",
                message: "must be at least 1".to_string(),
            });
        }
        if args.backend_timeout_secs == 0
            || args.backend_timeout_secs >= args.invocation_timeout_secs
        {
            return Err(ConfigError::Invalid {
                flag: "backend-timeout-secs",
                message: format!(
                    "must be between 1 and the invocation timeout ({}s), exclusive",
                    args.invocation_timeout_secs
                ),
            });
        }
        if args.max_receive_count == Some(0) {
            return Err(ConfigError::Invalid {
                flag: "max-receive-count",
                message: "must be at least 1".to_string(),
            });
        }
        if args
            .group_by_field
            .as_deref()
            .is_some_and(|field| field.trim().is_empty())
        {
            return Err(ConfigError::Invalid {
                flag: "group-by-field",
                message: "must not be empty".to_string(),
            });
        }

        Ok(Self {
            ingress_addr: args.ingress_addr,
            admin_addr: args.admin_addr,
            backend,
            queue_name,
            table_name,
            store_dir: args.store_dir,
            group_by_field: args.group_by_field,
            pool_size: args.pool_size,
            invocation_timeout: Duration::from_secs(args.invocation_timeout_secs),
            backend_timeout: Duration::from_secs(args.backend_timeout_secs),
            redelivery_delay: Duration::from_millis(args.redelivery_delay_ms),
            dedup_window: Duration::from_secs(args.dedup_window_secs),
            max_receive_count: args.max_receive_count,
            faux_backend_addr: args.faux_backend_addr,
            otlp_endpoint: non_empty(args.otlp_endpoint),
            log_level: args.log_level,
        })
    }
}
