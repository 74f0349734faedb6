//! Transfer credentials

use serde::{Deserialize, Serialize};

/// Credentials for one SFTP transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCredentials {
    /// Remote host address
    pub host: String,

    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for authentication
    pub username: String,

    /// Authentication method
    pub auth: AuthMethod,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Authentication methods supported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthMethod {
    /// Password authentication. The password itself is never persisted.
    Password {
        #[serde(default, skip_serializing)]
        password: String,
    },

    /// SSH key authentication
    Key {
        /// Path to private key file, read at connect time
        key_path: String,
        /// Optional passphrase for encrypted keys
        #[serde(default, skip_serializing)]
        passphrase: Option<String>,
    },
}

impl AuthMethod {
    pub fn password(password: impl Into<String>) -> Self {
        Self::Password {
            password: password.into(),
        }
    }

    pub fn key(key_path: impl Into<String>, passphrase: Option<String>) -> Self {
        Self::Key {
            key_path: key_path.into(),
            passphrase,
        }
    }

    pub fn is_password(&self) -> bool {
        matches!(self, AuthMethod::Password { .. })
    }
}

impl TransferCredentials {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>, auth: AuthMethod) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            auth,
            timeout_secs: default_timeout(),
        }
    }

    /// `host:port` for log lines and socket resolution
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// True when a password-auth credential has no password loaded yet
    /// (for example right after reading it back from disk).
    pub fn needs_password(&self) -> bool {
        matches!(&self.auth, AuthMethod::Password { password } if password.is_empty())
    }
}

fn default_port() -> u16 {
    22
}

fn default_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_is_not_serialized() {
        let creds = TransferCredentials::new("example.com", 22, "deploy", AuthMethod::password("hunter2"));
        let json = serde_json::to_string(&creds).unwrap();
        assert!(!json.contains("hunter2"));

        let loaded: TransferCredentials = serde_json::from_str(&json).unwrap();
        assert!(loaded.auth.is_password());
        assert!(loaded.needs_password());
    }

    #[test]
    fn test_key_auth_round_trips_path() {
        let creds = TransferCredentials::new(
            "example.com",
            2222,
            "deploy",
            AuthMethod::key("/home/me/.ssh/id_ed25519", Some("secret".into())),
        );
        let json = serde_json::to_string(&creds).unwrap();
        assert!(json.contains("\"type\":\"key\""));
        assert!(!json.contains("secret"));

        let loaded: TransferCredentials = serde_json::from_str(&json).unwrap();
        assert_eq!(
            loaded.auth,
            AuthMethod::Key {
                key_path: "/home/me/.ssh/id_ed25519".into(),
                passphrase: None
            }
        );
        assert!(!loaded.needs_password());
        assert_eq!(loaded.address(), "example.com:2222");
    }

    #[test]
    fn test_defaults_applied() {
        let loaded: TransferCredentials = serde_json::from_str(
            r#"{"host":"h","username":"u","auth":{"type":"password"}}"#,
        )
        .unwrap();
        assert_eq!(loaded.port, 22);
        assert_eq!(loaded.timeout_secs, 30);
    }
}
