use std::{net::SocketAddr, num::NonZeroUsize, time::Duration};

use clap::Parser;
use reqwest::Url;

use crate::{fetcher::RetryPolicy, service::ServiceConfig, upstream::OsrmSettings};

/// Command-line and environment configuration for the routing proxy.
#[derive(Debug, Clone, Parser)]
#[command(
    author,
    version,
    about = "Caching, deduplicating proxy in front of an OSRM routing engine"
)]
pub struct Config {
    /// Address the HTTP server binds to
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Base URL of the OSRM engine
    #[arg(long, env = "OSRM_URL", default_value = "https://router.project-osrm.org")]
    pub osrm_url: Url,

    #[arg(long, env = "OSRM_PROFILE", default_value = "driving")]
    pub osrm_profile: String,

    #[arg(long, env = "OSRM_USER_AGENT", default_value = "Saint-Tracker/1.0")]
    pub user_agent: String,

    /// Per-attempt upstream timeout
    #[arg(long, env = "UPSTREAM_TIMEOUT_MS", default_value_t = 10_000)]
    pub request_timeout_ms: u64,

    /// Retries after the first failed attempt of a segment fetch
    #[arg(long, env = "UPSTREAM_RETRIES", default_value_t = 2)]
    pub retries: u32,

    #[arg(long, env = "UPSTREAM_RETRY_DELAY_MS", default_value_t = 1_000)]
    pub retry_delay_ms: u64,

    /// Delay between consecutive upstream fetches of one route
    #[arg(long, env = "UPSTREAM_PACING_MS", default_value_t = 100)]
    pub pacing_delay_ms: u64,

    #[arg(long, env = "ROUTE_CACHE_TTL_SECS", default_value_t = 24 * 60 * 60)]
    pub cache_ttl_secs: u64,

    /// Age after which an in-flight request is no longer joined
    #[arg(long, env = "PENDING_TTL_SECS", default_value_t = 5 * 60)]
    pub pending_ttl_secs: u64,

    #[arg(long, env = "SEGMENT_CACHE_CAPACITY", default_value = "10000")]
    pub segment_capacity: NonZeroUsize,

    #[arg(long, env = "ROUTE_CACHE_CAPACITY", default_value = "1000")]
    pub route_capacity: NonZeroUsize,

    #[arg(long, env = "MAX_WAYPOINTS", default_value_t = 100)]
    pub max_waypoints: usize,

    /// How often abandoned pending requests are swept
    #[arg(long, env = "MAINTENANCE_INTERVAL_SECS", default_value_t = 60)]
    pub maintenance_interval_secs: u64,
}

impl Config {
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            pending_ttl: Duration::from_secs(self.pending_ttl_secs),
            segment_capacity: self.segment_capacity,
            route_capacity: self.route_capacity,
            pacing_delay: Duration::from_millis(self.pacing_delay_ms),
            retry: RetryPolicy {
                retries: self.retries,
                delay: Duration::from_millis(self.retry_delay_ms),
                timeout: Duration::from_millis(self.request_timeout_ms),
            },
            max_waypoints: self.max_waypoints,
            ..ServiceConfig::default()
        }
    }

    pub fn osrm_settings(&self) -> OsrmSettings {
        OsrmSettings {
            base_url: self.osrm_url.clone(),
            profile: self.osrm_profile.clone(),
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs.max(1))
    }
}
