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

use super::tokio_client::ServerCheckMethod;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use russh::keys::known_hosts::{known_host_keys_path, learn_known_hosts_path};
use russh::keys::{check_known_hosts_path, PublicKey};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Get the default known_hosts file path
pub fn get_default_known_hosts_path() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join(".ssh").join("known_hosts"))
}

/// Host key policy for a robot entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrictHostKeyChecking {
    /// Require the key to be present in known_hosts
    Yes,
    /// Accept any key
    #[default]
    No,
    /// Accept and record keys of unknown hosts, reject changed keys
    AcceptNew,
}

impl FromStr for StrictHostKeyChecking {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yes" | "true" => Ok(Self::Yes),
            "no" | "false" => Ok(Self::No),
            "accept-new" => Ok(Self::AcceptNew),
            other => Err(format!(
                "invalid host key checking mode '{other}' (expected yes, no or accept-new)"
            )),
        }
    }
}

/// Map a policy to the verification used by the client handler.
pub fn get_check_method(strict_mode: StrictHostKeyChecking) -> ServerCheckMethod {
    let known_hosts = get_default_known_hosts_path().filter(|path| path.exists());
    match (strict_mode, known_hosts) {
        (StrictHostKeyChecking::Yes, Some(path)) => {
            tracing::debug!("Using known_hosts file: {:?} (strict mode)", path);
            ServerCheckMethod::DefaultKnownHostsFile
        }
        (StrictHostKeyChecking::Yes, None) => {
            tracing::warn!("Known hosts file not found, host key verification disabled");
            ServerCheckMethod::NoCheck
        }
        (StrictHostKeyChecking::AcceptNew, _) => match get_default_known_hosts_path() {
            Some(path) => ServerCheckMethod::AcceptNew(path.to_string_lossy().into_owned()),
            None => {
                tracing::warn!("No home directory, host key verification disabled");
                ServerCheckMethod::NoCheck
            }
        },
        (StrictHostKeyChecking::No, _) => {
            tracing::debug!("Host key checking disabled");
            ServerCheckMethod::NoCheck
        }
    }
}

/// Check `key` against `path`, appending it when the host has no entry yet.
///
/// A recorded key that differs is still an error.
pub fn accept_new_host_key(
    hostname: &str,
    port: u16,
    key: &PublicKey,
    path: impl AsRef<Path>,
) -> Result<bool, russh::keys::Error> {
    let path = path.as_ref();
    if check_known_hosts_path(hostname, port, key, path)? {
        return Ok(true);
    }
    if !known_host_keys_path(hostname, port, path)?.is_empty() {
        // Entries exist, but only for other key types
        return Ok(false);
    }
    tracing::info!("Adding host key for {}:{} to {:?}", hostname, port, path);
    learn_known_hosts_path(hostname, port, key, path)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modes() {
        assert_eq!(
            "yes".parse::<StrictHostKeyChecking>().unwrap(),
            StrictHostKeyChecking::Yes
        );
        assert_eq!(
            "No".parse::<StrictHostKeyChecking>().unwrap(),
            StrictHostKeyChecking::No
        );
        assert_eq!(
            "accept-new".parse::<StrictHostKeyChecking>().unwrap(),
            StrictHostKeyChecking::AcceptNew
        );
        assert!("maybe".parse::<StrictHostKeyChecking>().is_err());
    }

    #[test]
    fn test_no_means_no_check() {
        assert_eq!(
            get_check_method(StrictHostKeyChecking::No),
            ServerCheckMethod::NoCheck
        );
    }

    const ROBOT_KEY: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIPDJ6B7E+5wmQbg68EhN7RKrh1bvlEBZHarqdfDktmA+";
    const OTHER_KEY: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIDerIU4Xr5xGQtHT9yXvqey5Q/lpJxST0WVrMNIi5QHk";

    fn key(base64: &str) -> PublicKey {
        russh::keys::parse_public_key_base64(base64).unwrap()
    }

    #[test]
    fn test_accept_new_records_unknown_host() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known_hosts");

        assert!(accept_new_host_key("ot2.local", 22, &key(ROBOT_KEY), &path).unwrap());
        let recorded = std::fs::read_to_string(&path).unwrap();
        assert!(recorded.contains("ot2.local"));
        assert!(recorded.contains(ROBOT_KEY));

        // Known now, so a plain check passes
        assert!(check_known_hosts_path("ot2.local", 22, &key(ROBOT_KEY), &path).unwrap());
        assert!(accept_new_host_key("ot2.local", 22, &key(ROBOT_KEY), &path).unwrap());
    }

    #[test]
    fn test_accept_new_rejects_changed_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known_hosts");
        std::fs::write(&path, format!("flex.local ssh-ed25519 {ROBOT_KEY}\n")).unwrap();

        assert!(accept_new_host_key("flex.local", 22, &key(OTHER_KEY), &path).is_err());
        // Other hosts are still learned
        assert!(accept_new_host_key("ot2.local", 2222, &key(OTHER_KEY), &path).unwrap());
        assert!(std::fs::read_to_string(&path).unwrap().contains("[ot2.local]:2222"));
    }

    #[test]
    fn test_accept_new_maps_to_learning_check() {
        if get_default_known_hosts_path().is_some() {
            assert!(matches!(
                get_check_method(StrictHostKeyChecking::AcceptNew),
                ServerCheckMethod::AcceptNew(_)
            ));
        }
    }

    #[test]
    fn test_yaml_spelling() {
        let mode: StrictHostKeyChecking = serde_yaml::from_str("accept-new").unwrap();
        assert_eq!(mode, StrictHostKeyChecking::AcceptNew);
    }
}
