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

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "otsh",
    version,
    about = "Persistent shell and Python sessions on Opentrons robots",
    long_about = "otsh keeps one SSH shell open to an Opentrons robot and drives either the login shell\nor a Python interpreter through it, detecting completion by the prompt that comes back.\nInterpreter state (variables, loaded labware, the protocol context) survives between\nstatements of one invocation; a reconnect always starts over in the shell.",
    after_help = "EXAMPLES:\n  Run a statement:        otsh -H ot2 exec \"print(1 + 1)\"\n  Run a shell command:    otsh -H ot2 exec --shell \"uptime\"\n  Run a batch:            otsh -H ot2 batch steps.yaml --stop-on-error\n  Load a deck layout:     otsh -H ot2 deck layout.yaml\n  Check the link:         otsh -H ot2 status"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'F',
        long,
        help = "Configuration file path\nSearched when omitted: ./otsh.yaml, then ~/.config/otsh/config.yaml"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        short = 'H',
        long = "host",
        env = "OTSH_HOST",
        help = "Host alias from the configuration file"
    )]
    pub host: Option<String>,

    #[arg(
        short = 'P',
        long,
        help = "Prompt for the password or key passphrase when no password file is configured"
    )]
    pub password: bool,

    #[arg(
        long,
        help = "Maximum connection attempts (overrides the configuration file)"
    )]
    pub retries: Option<u32>,

    #[arg(
        short = 'v',
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Execute one statement or shell command",
        long_about = "Runs the command in the Python interpreter (default) or the login shell and prints the\noutcome as JSON.\n\nExit codes: 0 (ok), 1 (remote error, timeout or transport failure)"
    )]
    Exec {
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,

        #[arg(long, help = "Run in the login shell instead of the interpreter")]
        shell: bool,

        #[arg(long, help = "Command timeout in seconds")]
        timeout: Option<u64>,
    },

    #[command(
        about = "Run a YAML list of {description, command} items",
        after_help = "Example batch file:\n  - description: Import math\n    command: import math\n  - description: Print pi\n    command: print(math.pi)"
    )]
    Batch {
        file: PathBuf,

        #[arg(long, help = "Run the items in the login shell")]
        shell: bool,

        #[arg(long, help = "Stop at the first failed item")]
        stop_on_error: bool,

        #[arg(long, help = "Pause between items in milliseconds (default from config)")]
        delay_ms: Option<u64>,

        #[arg(long, help = "Per-item timeout in seconds")]
        timeout: Option<u64>,
    },

    #[command(about = "Send a Python source file as one code block")]
    Block {
        file: PathBuf,

        #[arg(short, long, help = "Description recorded in the result")]
        description: Option<String>,

        #[arg(long, help = "Timeout in seconds")]
        timeout: Option<u64>,
    },

    #[command(about = "Load a deck layout (protocol context, modules, labware, instruments)")]
    Deck { file: PathBuf },

    #[command(about = "Round trip through the interpreter")]
    Ping,

    #[command(about = "Show the connection status as JSON")]
    Status,

    #[command(about = "List configured host aliases")]
    Hosts,
}

impl Cli {
    pub fn timeout_secs(value: Option<u64>) -> Option<std::time::Duration> {
        value.map(std::time::Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exec() {
        let cli = Cli::try_parse_from(["otsh", "-H", "ot2", "-vv", "exec", "print(1", "+", "1)"])
            .unwrap();
        assert_eq!(cli.host.as_deref(), Some("ot2"));
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Exec {
                command, shell, ..
            } => {
                assert_eq!(command.join(" "), "print(1 + 1)");
                assert!(!shell);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_batch_flags() {
        let cli = Cli::try_parse_from([
            "otsh",
            "batch",
            "steps.yaml",
            "--shell",
            "--stop-on-error",
            "--delay-ms",
            "0",
        ])
        .unwrap();
        match cli.command {
            Commands::Batch {
                shell,
                stop_on_error,
                delay_ms,
                ..
            } => {
                assert!(shell && stop_on_error);
                assert_eq!(delay_ms, Some(0));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_exec_requires_command() {
        assert!(Cli::try_parse_from(["otsh", "exec"]).is_err());
    }
}
