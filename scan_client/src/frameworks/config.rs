use crate::domain::Role;
use crate::interface_adapters::transport::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_RECONNECT_ATTEMPTS,
    DEFAULT_RECONNECT_DELAY, TransportSettings,
};
use crate::use_cases::ScanMode;
use std::{env, time::Duration};

// Client settings read from the environment (after `.env` is loaded).

pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:5000/ws";

pub fn relay_url() -> String {
    env::var("SCAN_RELAY_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_RELAY_URL.to_string())
}

pub fn client_role() -> Role {
    match env::var("SCAN_CLIENT_ROLE") {
        Ok(value) => value.parse().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "invalid SCAN_CLIENT_ROLE; using producer");
            Role::Producer
        }),
        Err(_) => Role::Producer,
    }
}

pub fn scan_mode() -> ScanMode {
    match env::var("SCAN_MODE") {
        Ok(value) => value.parse().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "invalid SCAN_MODE; using continuous");
            ScanMode::Continuous
        }),
        Err(_) => ScanMode::Continuous,
    }
}

// Tag applied to input lines that carry no symbology of their own.
pub fn default_symbology() -> Option<String> {
    env::var("SCAN_SYMBOLOGY")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn reconnect_attempts() -> u32 {
    env::var("SCAN_RECONNECT_ATTEMPTS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_RECONNECT_ATTEMPTS)
}

pub fn reconnect_delay() -> Duration {
    duration_ms("SCAN_RECONNECT_DELAY_MS").unwrap_or(DEFAULT_RECONNECT_DELAY)
}

pub fn connect_timeout() -> Duration {
    duration_ms("SCAN_CONNECT_TIMEOUT_MS").unwrap_or(DEFAULT_CONNECT_TIMEOUT)
}

pub fn heartbeat_interval() -> Duration {
    duration_ms("SCAN_HEARTBEAT_INTERVAL_MS").unwrap_or(DEFAULT_HEARTBEAT_INTERVAL)
}

fn duration_ms(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|millis| *millis > 0)
        .map(Duration::from_millis)
}

/// Everything one client process needs.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub transport: TransportSettings,
    pub mode: ScanMode,
    pub default_symbology: Option<String>,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let mut transport = TransportSettings::new(relay_url(), client_role());
        transport.platform = Some(env::consts::OS.to_string());
        transport.reconnect_attempts = reconnect_attempts();
        transport.reconnect_delay = reconnect_delay();
        transport.connect_timeout = connect_timeout();
        transport.heartbeat_interval = heartbeat_interval();

        Self {
            transport,
            mode: scan_mode(),
            default_symbology: default_symbology(),
        }
    }
}
