//! Runtime configuration for shell-cache.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! All route/caching knobs (exclusion patterns, shell asset list, cache root,
//! generation tag) live here.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "shell-cache", about = "Offline response-cache gateway")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Override the cache generation tag from the config file.
    #[arg(long)]
    pub generation: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Origin server configuration.
    pub origin: OriginConfig,

    /// Cache storage configuration.
    pub cache: CacheConfig,

    /// Route classification rules.
    pub routes: RouteConfig,

    /// Application shell assets.
    pub shell: ShellConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            origin: OriginConfig::default(),
            cache: CacheConfig::default(),
            routes: RouteConfig::default(),
            shell: ShellConfig::default(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,

    /// Maximum proxied request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            max_body_bytes: 16 * 1024 * 1024, // 16 MB
        }
    }
}

/// Origin server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    /// Base URL of the origin application (scheme + host + port).
    pub base_url: String,

    /// Per-fetch timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Cache storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding one store per generation.
    pub root: PathBuf,

    /// Generation tag for this deployment (e.g. a content hash or release tag).
    /// Supplied at build/deploy time, never computed internally.
    pub generation: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/var/lib/shell-cache"),
            generation: format!("v{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Route classification rules.
///
/// Evaluated in order: exclusion substrings, then non-GET methods, then the
/// static prefix, then the cross-origin host allow-list; everything else is
/// dynamic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// URL substrings that must never be intercepted: live-event streams,
    /// admin surfaces, state/session endpoints, command submission, and the
    /// web app manifest.
    pub excluded_substrings: Vec<String>,

    /// Path prefix for versioned shell assets.
    pub static_prefix: String,

    /// Third-party static-content hosts eligible for cache-first serving.
    pub cross_origin_hosts: Vec<String>,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            excluded_substrings: vec![
                "/api/stream".to_string(),
                "/api/state".to_string(),
                "/api/command".to_string(),
                "/admin".to_string(),
                "/manifest.json".to_string(),
            ],
            static_prefix: "/static/".to_string(),
            cross_origin_hosts: vec![
                "fonts.googleapis.com".to_string(),
                "fonts.gstatic.com".to_string(),
            ],
        }
    }
}

/// Application shell asset list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Ordered local resource paths required for the app to boot offline.
    /// Every entry must resolve during install or the install fails.
    pub assets: Vec<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            assets: vec![
                "/".to_string(),
                "/static/dist.css".to_string(),
                "/static/app.js".to_string(),
                "/static/icons/icon-192.png".to_string(),
                "/static/icons/icon-512.png".to_string(),
            ],
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults if the file is absent.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Resolve a local resource path against the origin base URL.
    pub fn origin_url(&self, path: &str) -> String {
        crate::fetch::join_origin(&self.origin.base_url, path)
    }
}
