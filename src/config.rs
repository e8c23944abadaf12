use log::warn;
use rand::Rng;
use std::env;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;

/// Process settings read from the environment (and `.env`, if present).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
}

impl Settings {
    pub fn from_env() -> Self {
        let settings = Self::from_lookup(|key| env::var(key).ok());
        if env::var("GENERATE_PEER_PORT").as_deref() == Ok("true") {
            let offset: u16 = rand::thread_rng().gen_range(1..=1000);
            return settings.with_peer_port(offset);
        }
        settings
    }

    /// Build settings from any key lookup. Unparseable values fall back to
    /// the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match lookup("PORT") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("Invalid PORT {raw:?}, using {DEFAULT_PORT}");
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };
        Self { host, port }
    }

    /// Shift the port so several local peers can run side by side.
    pub fn with_peer_port(mut self, offset: u16) -> Self {
        self.port = self.port.saturating_add(offset);
        self
    }
}
