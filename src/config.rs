/// Channel configuration
///
/// An endpoint string either names an existing tape file or a live
/// `host[:port]`; the channel configs carry the dispatch-loop poll
/// interval and thread naming.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SUBSCRIBER_PORT: u16 = 9998;
pub const DEFAULT_ADMIN_PORT: u16 = 8775;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Live { host: String, port: u16 },
    Tape(PathBuf),
}

impl Endpoint {
    /// Existing file => tape; otherwise `host[:port]`, defaulting the port.
    /// A port that does not parse is kept as part of the host.
    pub fn parse(text: &str, default_port: u16) -> Self {
        let text = text.trim();
        let path = Path::new(text);
        if !text.is_empty() && path.is_file() {
            return Endpoint::Tape(path.to_path_buf());
        }
        match text.rsplit_once(':') {
            Some((host, port)) => match port.parse::<u16>() {
                Ok(port) => Endpoint::Live {
                    host: host.to_string(),
                    port,
                },
                Err(_) => Endpoint::Live {
                    host: text.to_string(),
                    port: default_port,
                },
            },
            None => Endpoint::Live {
                host: text.to_string(),
                port: default_port,
            },
        }
    }

    pub fn is_tape(&self) -> bool {
        matches!(self, Endpoint::Tape(_))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Live { host, port } => write!(f, "{}:{}", host, port),
            Endpoint::Tape(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriberConfig {
    pub poll_interval: Duration,
    pub thread_name: String,
    pub default_port: u16,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        SubscriberConfig {
            poll_interval: DEFAULT_POLL_INTERVAL,
            thread_name: "mdd-subscriber".to_string(),
            default_port: DEFAULT_SUBSCRIBER_PORT,
        }
    }
}

impl SubscriberConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    pub fn endpoint(&self, text: &str) -> Endpoint {
        Endpoint::parse(text, self.default_port)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdminConfig {
    pub poll_interval: Duration,
    pub thread_name: String,
    pub default_port: u16,
}

impl Default for AdminConfig {
    fn default() -> Self {
        AdminConfig {
            poll_interval: DEFAULT_POLL_INTERVAL,
            thread_name: "mdd-admin".to_string(),
            default_port: DEFAULT_ADMIN_PORT,
        }
    }
}

impl AdminConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    pub fn endpoint(&self, text: &str) -> Endpoint {
        Endpoint::parse(text, self.default_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_endpoint() {
        assert_eq!(
            Endpoint::parse("localhost:9995", DEFAULT_SUBSCRIBER_PORT),
            Endpoint::Live {
                host: "localhost".to_string(),
                port: 9995
            }
        );
        let ep = Endpoint::parse("edge3", DEFAULT_ADMIN_PORT);
        assert_eq!(ep.to_string(), "edge3:8775");
        assert!(!ep.is_tape());
    }

    #[test]
    fn test_tape_endpoint() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let ep = Endpoint::parse(&path, DEFAULT_SUBSCRIBER_PORT);
        assert!(ep.is_tape());
        assert_eq!(ep.to_string(), path);
    }

    #[test]
    fn test_config_builders() {
        let cfg = SubscriberConfig::default()
            .with_poll_interval(Duration::from_millis(10))
            .with_thread_name("feed");
        assert_eq!(cfg.poll_interval, Duration::from_millis(10));
        assert_eq!(cfg.thread_name, "feed");
        assert_eq!(cfg.endpoint("host").to_string(), "host:9998");
        assert_eq!(AdminConfig::default().endpoint("host").to_string(), "host:8775");
    }
}
