//! Mail relay settings passed to every transport submission.

use serde::{Deserialize, Serialize};

/// Connection settings for the outbound mail relay.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpSettings {
    /// Relay host name.
    #[serde(default = "default_host")]
    pub host: String,
    /// Relay port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login user name; empty means anonymous submission.
    #[serde(default)]
    pub username: String,
    /// Login secret.
    #[serde(default)]
    pub secret: String,
    /// Upgrade the connection with STARTTLS.
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
    /// Connect over implicit TLS.
    #[serde(default)]
    pub use_ssl: bool,
}

fn default_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_port() -> u16 {
    587
}

fn default_use_tls() -> bool {
    true
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: String::new(),
            secret: String::new(),
            use_tls: default_use_tls(),
            use_ssl: false,
        }
    }
}

impl SmtpSettings {
    /// Creates settings for a relay.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Sets the login credentials.
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, secret: impl Into<String>) -> Self {
        self.username = username.into();
        self.secret = secret.into();
        self
    }

    /// Sets the TLS mode.
    #[must_use]
    pub fn with_tls(mut self, use_tls: bool, use_ssl: bool) -> Self {
        self.use_tls = use_tls;
        self.use_ssl = use_ssl;
        self
    }

    /// Returns true if credentials are configured.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }

    /// Returns `host:port`.
    #[must_use]
    pub fn relay(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Describes the transport security in use.
    #[must_use]
    pub fn security(&self) -> &'static str {
        if self.use_ssl {
            "ssl"
        } else if self.use_tls {
            "starttls"
        } else {
            "plain"
        }
    }
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("use_tls", &self.use_tls)
            .field("use_ssl", &self.use_ssl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = SmtpSettings::default();
        assert_eq!(settings.relay(), "smtp.gmail.com:587");
        assert_eq!(settings.security(), "starttls");
        assert!(!settings.has_credentials());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let settings = SmtpSettings::new("mail.local", 25).with_credentials("bot", "hunter2");
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_ssl_takes_precedence() {
        let settings = SmtpSettings::default().with_tls(true, true);
        assert_eq!(settings.security(), "ssl");
    }
}
