use std::{env, net::IpAddr, time::Duration};

// Runtime/server constants and environment-driven settings.

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_ROLE_ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

pub fn bind_addr() -> IpAddr {
    // Phones reach the relay over the LAN, so listen on every interface by default.
    env::var("RELAY_BIND_ADDR")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(IpAddr::from([0, 0, 0, 0]))
}

pub fn http_port() -> u16 {
    env::var("RELAY_SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

pub fn heartbeat_interval() -> Duration {
    duration_ms("RELAY_HEARTBEAT_INTERVAL_MS").unwrap_or(DEFAULT_HEARTBEAT_INTERVAL)
}

// Silence tolerated before a session is treated as dead (2x interval by default).
pub fn heartbeat_grace() -> Duration {
    duration_ms("RELAY_HEARTBEAT_GRACE_MS").unwrap_or_else(|| heartbeat_interval() * 2)
}

pub fn reap_interval() -> Duration {
    duration_ms("RELAY_REAP_INTERVAL_MS").unwrap_or(DEFAULT_REAP_INTERVAL)
}

pub fn role_announce_timeout() -> Duration {
    duration_ms("RELAY_ROLE_ANNOUNCE_TIMEOUT_MS").unwrap_or(DEFAULT_ROLE_ANNOUNCE_TIMEOUT)
}

pub fn outbound_capacity() -> usize {
    env::var("RELAY_OUTBOUND_CAPACITY")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|capacity| *capacity > 0)
        .unwrap_or(DEFAULT_OUTBOUND_CAPACITY)
}

fn duration_ms(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|millis| *millis > 0)
        .map(Duration::from_millis)
}

/// Settings for one relay server instance.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub heartbeat_grace: Duration,
    pub reap_interval: Duration,
    pub role_announce_timeout: Duration,
    pub outbound_capacity: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            heartbeat_grace: DEFAULT_HEARTBEAT_INTERVAL * 2,
            reap_interval: DEFAULT_REAP_INTERVAL,
            role_announce_timeout: DEFAULT_ROLE_ANNOUNCE_TIMEOUT,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

impl RelaySettings {
    pub fn from_env() -> Self {
        Self {
            heartbeat_grace: heartbeat_grace(),
            reap_interval: reap_interval(),
            role_announce_timeout: role_announce_timeout(),
            outbound_capacity: outbound_capacity(),
        }
    }
}
