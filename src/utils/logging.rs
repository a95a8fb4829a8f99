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

use tracing_subscriber::EnvFilter;

/// Create an environment filter based on verbosity level
pub fn create_env_filter(verbosity: u8) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        // RUST_LOG wins, so russh internals can be traced on demand
        EnvFilter::from_default_env()
    } else {
        match verbosity {
            0 => EnvFilter::new("otsh=warn"),
            1 => EnvFilter::new("otsh=info"),
            // -vv: prompt matching and russh channel events
            2 => EnvFilter::new("otsh=debug,russh=debug"),
            _ => EnvFilter::new("otsh=trace,russh=trace"),
        }
    }
}

/// Initialize console logging on stderr.
///
/// Stdout stays reserved for command results, so JSON output can be piped.
pub fn init_logging(verbosity: u8) {
    let filter = create_env_filter(verbosity);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_create_env_filter() {
        let saved = std::env::var("RUST_LOG").ok();
        std::env::remove_var("RUST_LOG");

        assert_eq!(create_env_filter(0).to_string(), "otsh=warn");
        assert_eq!(create_env_filter(1).to_string(), "otsh=info");
        assert!(create_env_filter(2).to_string().contains("russh=debug"));
        assert!(create_env_filter(7).to_string().contains("otsh=trace"));

        std::env::set_var("RUST_LOG", "otsh::sync=trace");
        assert_eq!(create_env_filter(0).to_string(), "otsh::sync=trace");

        match saved {
            Some(value) => std::env::set_var("RUST_LOG", value),
            None => std::env::remove_var("RUST_LOG"),
        }
    }
}
