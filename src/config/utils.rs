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

//! Configuration utility functions.

use directories::BaseDirs;
use std::path::{Path, PathBuf};

/// Expand a leading `~/` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/")) else {
        return path.to_path_buf();
    };
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf()));
    match home {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Whether `name` is usable as a Python identifier in generated code.
pub fn is_python_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric()) && !is_python_keyword(name)
}

fn is_python_keyword(name: &str) -> bool {
    matches!(
        name,
        "False"
            | "None"
            | "True"
            | "and"
            | "as"
            | "assert"
            | "async"
            | "await"
            | "break"
            | "class"
            | "continue"
            | "def"
            | "del"
            | "elif"
            | "else"
            | "except"
            | "finally"
            | "for"
            | "from"
            | "global"
            | "if"
            | "import"
            | "in"
            | "is"
            | "lambda"
            | "nonlocal"
            | "not"
            | "or"
            | "pass"
            | "raise"
            | "return"
            | "try"
            | "while"
            | "with"
            | "yield"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_expand_tilde() {
        let original = std::env::var_os("HOME");
        std::env::set_var("HOME", "/home/robot");
        assert_eq!(
            expand_tilde(Path::new("~/.ssh/ot2_ssh_key")),
            PathBuf::from("/home/robot/.ssh/ot2_ssh_key")
        );
        assert_eq!(
            expand_tilde(Path::new("/etc/otsh.yaml")),
            PathBuf::from("/etc/otsh.yaml")
        );
        match original {
            Some(home) => std::env::set_var("HOME", home),
            None => std::env::remove_var("HOME"),
        }
    }

    #[test]
    fn test_python_identifiers() {
        assert!(is_python_identifier("p300"));
        assert!(is_python_identifier("_tips"));
        assert!(!is_python_identifier("300p"));
        assert!(!is_python_identifier("tip-rack"));
        assert!(!is_python_identifier("class"));
        assert!(!is_python_identifier(""));
    }
}
