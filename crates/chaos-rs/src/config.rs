//! Account configuration
//!
//! Read-only view of the `~/.chaosconfig` file written by the login flow.
//! Only the current account/user pair is needed to reach the registry.

use crate::error::ChaosError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default config file name in the home directory
pub const DEFAULT_CONFIG_FILE: &str = ".chaosconfig";

/// Root of the account config file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaosConfig {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub current_account: String,
    #[serde(default)]
    pub current_user: String,
}

/// A control-plane endpoint and the users logged into it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub endpoint: String,
    #[serde(default)]
    pub users: Vec<User>,
}

/// Stored login for one user
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    pub token: String,
    /// Unix seconds, stored as a string by the login flow
    #[serde(default)]
    pub expires_in: Option<String>,
}

/// Resolved credentials for registry calls
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub endpoint: String,
    pub username: String,
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Whether the token is expired at `now`. Tokens without an expiry never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }
}

impl ChaosConfig {
    /// Default config path: `~/.chaosconfig`
    pub fn default_path() -> Result<PathBuf, ChaosError> {
        dirs_next::home_dir()
            .map(|home| home.join(DEFAULT_CONFIG_FILE))
            .ok_or(ChaosError::NoHomeDirectory)
    }

    /// Load from an explicit path, or the default location
    pub fn load(path: Option<&Path>) -> Result<Self, ChaosError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        if !path.exists() {
            return Err(ChaosError::ConfigNotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(&path)?;
        Self::from_yaml(&content)
    }

    /// Parse config from YAML text
    pub fn from_yaml(content: &str) -> Result<Self, ChaosError> {
        let config: ChaosConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Credentials of the current account/user pair
    pub fn current_credentials(&self) -> Result<Credentials, ChaosError> {
        if self.current_account.is_empty() || self.current_user.is_empty() {
            return Err(ChaosError::ConfigInvalid(
                "no current account set".to_string(),
            ));
        }

        let account = self
            .accounts
            .iter()
            .find(|a| a.endpoint == self.current_account)
            .ok_or_else(|| ChaosError::AccountNotFound(self.current_account.clone()))?;

        let user = account
            .users
            .iter()
            .find(|u| u.username == self.current_user)
            .ok_or_else(|| {
                ChaosError::AccountNotFound(format!(
                    "{}@{}",
                    self.current_user, self.current_account
                ))
            })?;

        let expires_at = match user.expires_in.as_deref() {
            None | Some("") => None,
            Some(raw) => {
                let secs: i64 = raw.trim().parse().map_err(|_| {
                    ChaosError::ConfigInvalid(format!("invalid expiresIn value: {}", raw))
                })?;
                DateTime::<Utc>::from_timestamp(secs, 0)
            }
        };

        Ok(Credentials {
            endpoint: account.endpoint.trim_end_matches('/').to_string(),
            username: user.username.clone(),
            token: user.token.clone(),
            expires_at,
        })
    }
}
