// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration loading, validation and credential lookup.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;
use zeroize::Zeroizing;

use super::types::{Config, HostConfig, HostIdentity};
use super::utils::expand_tilde;
use crate::error::ConfigError;
use crate::ssh::AuthMethod;

const CONFIG_FILE_NAME: &str = "config.yaml";
const LOCAL_CONFIG_FILE_NAME: &str = "otsh.yaml";

impl Config {
    /// Load configuration from a file, falling back to defaults when it does not exist.
    pub async fn load(path: &Path) -> Result<Self> {
        let expanded_path = expand_tilde(path);

        if !expanded_path.exists() {
            tracing::debug!(
                "Config file not found at {:?}, using defaults",
                expanded_path
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&expanded_path)
            .await
            .with_context(|| format!("Failed to read configuration file at {}", expanded_path.display()))?;

        let config: Config = serde_yaml::from_str(&content).with_context(|| {
            format!(
                "Failed to parse YAML configuration file at {}. Check indentation and that every host has a hostname.",
                expanded_path.display()
            )
        })?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", expanded_path.display()))?;

        Ok(config)
    }

    /// Load configuration with priority order:
    /// 1. Explicit path (if it exists)
    /// 2. `./otsh.yaml`
    /// 3. `$XDG_CONFIG_HOME/otsh/config.yaml` or the platform config dir
    pub async fn load_with_priority(cli_config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_config_path {
            let expanded = expand_tilde(path);
            if expanded.exists() {
                tracing::debug!("Using explicitly specified config file: {:?}", expanded);
                return Self::load(&expanded).await;
            }
            tracing::debug!(
                "Config file {:?} not found, continuing with other sources",
                expanded
            );
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE_NAME);
        if local.exists() {
            tracing::debug!("Found {} in current directory", LOCAL_CONFIG_FILE_NAME);
            return Self::load(&local).await;
        }

        if let Some(path) = default_config_path().filter(|p| p.exists()) {
            tracing::debug!("Found config at {:?}", path);
            return Self::load(&path).await;
        }

        tracing::debug!("No config file found, using default empty configuration");
        Ok(Self::default())
    }

    /// Save the configuration as YAML, creating parent directories.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let expanded_path = expand_tilde(path);
        if let Some(parent) = expanded_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {parent:?}"))?;
        }
        let yaml = serde_yaml::to_string(self).context("Failed to serialize configuration to YAML")?;
        fs::write(&expanded_path, yaml)
            .await
            .with_context(|| format!("Failed to write configuration to {}", expanded_path.display()))?;
        Ok(())
    }

    /// Reject host entries that could never connect.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (alias, host) in &self.hosts {
            let invalid = |reason: &str| ConfigError::InvalidHost {
                alias: alias.clone(),
                reason: reason.to_string(),
            };
            if host.hostname.trim().is_empty() {
                return Err(invalid("hostname is empty"));
            }
            if host.username.trim().is_empty() {
                return Err(invalid("username is empty"));
            }
            if host.port == 0 {
                return Err(invalid("port must not be 0"));
            }
        }
        if self.defaults.interpreter_command.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: "interpreter_command",
            });
        }
        Ok(())
    }

    pub fn host(&self, alias: &str) -> Result<&HostConfig, ConfigError> {
        self.hosts.get(alias).ok_or_else(|| ConfigError::UnknownHost {
            alias: alias.to_string(),
        })
    }

    pub fn identity(&self, alias: &str) -> Result<HostIdentity, ConfigError> {
        let host = self.host(alias)?;
        Ok(HostIdentity::new(&host.hostname, &host.username, host.port).with_alias(alias))
    }
}

impl HostConfig {
    /// Resolve the secret for this host: explicit value, then the password
    /// file, then an interactive prompt when `prompt` is set.
    ///
    /// The secret doubles as the key passphrase when a key file is used.
    pub async fn resolve_secret(
        &self,
        explicit: Option<Zeroizing<String>>,
        prompt: bool,
    ) -> Result<Option<Zeroizing<String>>> {
        if explicit.is_some() {
            return Ok(explicit);
        }

        if let Some(password_file) = &self.password_file {
            let path = expand_tilde(Path::new(password_file));
            if path.exists() {
                let content = Zeroizing::new(
                    fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read password file {}", path.display()))?,
                );
                let trimmed = content.trim();
                if !trimmed.is_empty() {
                    tracing::debug!("Using password file {:?}", path);
                    return Ok(Some(Zeroizing::new(trimmed.to_string())));
                }
            }
        }

        if prompt {
            let entered = rpassword::prompt_password(format!(
                "Password for {}@{}: ",
                self.username, self.hostname
            ))
            .context("Failed to read password")?;
            return Ok(Some(Zeroizing::new(entered)));
        }

        Ok(None)
    }

    /// Pick the authentication method for this host.
    pub fn auth_method(&self, secret: Option<Zeroizing<String>>) -> Result<AuthMethod> {
        #[cfg(not(target_os = "windows"))]
        {
            if self.use_agent && env::var_os("SSH_AUTH_SOCK").is_some() {
                return Ok(AuthMethod::with_agent());
            }
        }

        if let Some(key_file) = &self.key_file {
            let key_path = expand_tilde(Path::new(key_file));
            if key_path.exists() {
                return Ok(AuthMethod::PrivateKeyFile {
                    key_file_path: key_path,
                    key_pass: secret,
                });
            }
            tracing::debug!("Key file {:?} not found", key_path);
        }

        match secret {
            Some(password) => Ok(AuthMethod::Password(password)),
            None => anyhow::bail!(
                "No usable credentials for {}@{}: key file missing and no password available",
                self.username,
                self.hostname
            ),
        }
    }
}

/// `$XDG_CONFIG_HOME/otsh/config.yaml`, else the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(xdg_config_home) = env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join("otsh").join(CONFIG_FILE_NAME));
    }
    ProjectDirs::from("", "", "otsh").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}
