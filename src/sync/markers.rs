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

//! Prompt, continuation and error markers.
//!
//! Completion is inferred purely from text: a mode's prompt must end the
//! last line of what has been read so far. A line of remote output that
//! happens to end the same way will be taken for a prompt; there is no
//! framing underneath to tell them apart.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::session::SessionMode;

/// Header Python prints before a stack trace.
pub const ERROR_MARKER: &str = "Traceback (most recent call last):";
pub const INTERPRETER_PROMPT: &str = ">>> ";
pub const CONTINUATION_PROMPT: &str = "... ";
pub const SHELL_PROMPTS: [&str; 2] = ["# ", "$ "];

/// CSI sequences (colors, bracketed paste toggles) and OSC title updates.
static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[()][A-Za-z0-9]")
        .expect("ANSI escape pattern is valid")
});

/// A line that opens a compound statement.
static BLOCK_OPENER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^\s*(?:async\s+(?:def|for|with)|def|class|if|elif|else|for|while|try|except|finally|with|match|case)\b[^\n]*:\s*(?:#[^\n]*)?$",
    )
    .expect("block opener pattern is valid")
});

/// Clauses that continue the compound statement above them.
static CLAUSE_CONTINUATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:elif\b|else\s*:|except\b|finally\s*:)")
        .expect("clause pattern is valid")
});

/// What the tail of the buffer says about the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptState {
    /// The expected prompt ends the buffer.
    Complete,
    /// The interpreter is waiting for the rest of a block.
    Continuation,
    /// Neither: keep reading.
    Pending,
}

/// Marker set for one mode.
#[derive(Debug, Clone)]
pub struct PromptMarkers {
    prompts: Vec<String>,
    continuation: Option<String>,
}

impl PromptMarkers {
    pub fn for_mode(mode: SessionMode) -> Self {
        match mode {
            SessionMode::Interpreter => Self {
                prompts: vec![INTERPRETER_PROMPT.to_string()],
                continuation: Some(CONTINUATION_PROMPT.to_string()),
            },
            SessionMode::Shell | SessionMode::Unknown => Self {
                prompts: SHELL_PROMPTS.iter().map(|p| p.to_string()).collect(),
                continuation: None,
            },
        }
    }

    /// Classify the buffer by its last line.
    pub fn state(&self, buffer: &str) -> PromptState {
        let tail = last_line(buffer);
        if self.prompts.iter().any(|p| tail.ends_with(p.as_str())) {
            PromptState::Complete
        } else if self
            .continuation
            .as_deref()
            .is_some_and(|c| tail.ends_with(c))
        {
            PromptState::Continuation
        } else {
            PromptState::Pending
        }
    }
}

/// Strip terminal escape sequences and carriage returns.
pub fn clean_output(raw: &str) -> String {
    ANSI_ESCAPE.replace_all(raw, "").replace('\r', "")
}

fn last_line(buffer: &str) -> String {
    let cleaned = clean_output(buffer);
    match cleaned.rfind('\n') {
        Some(pos) => cleaned[pos + 1..].to_string(),
        None => cleaned,
    }
}

/// Whether captured output carries a stack trace.
pub fn contains_error(output: &str) -> bool {
    output.contains(ERROR_MARKER)
}

/// Heuristic for statements the REPL reads over several lines.
pub fn is_multiline(code: &str) -> bool {
    BLOCK_OPENER.is_match(code) || code.trim().contains('\n')
}

/// Statements that start at column zero.
///
/// The REPL completes after each of them, so text with more than one cannot
/// be paired with a single prompt. Lines inside brackets or triple-quoted
/// strings are overcounted.
pub fn top_level_statements(code: &str) -> usize {
    let mut count = 0;
    let mut decorated = false;
    for line in code.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty()
            || trimmed.starts_with('#')
            || line.starts_with(char::is_whitespace)
            || CLAUSE_CONTINUATION.is_match(trimmed)
        {
            continue;
        }
        if !decorated {
            count += 1;
        }
        decorated = trimmed.starts_with('@');
    }
    count
}

/// Which mode the prompt at the end of `buffer` belongs to, if any.
pub fn detect_mode(buffer: &str) -> SessionMode {
    let tail = last_line(buffer);
    if tail.ends_with(INTERPRETER_PROMPT) || tail.ends_with(CONTINUATION_PROMPT) {
        SessionMode::Interpreter
    } else if SHELL_PROMPTS.iter().any(|p| tail.ends_with(p)) {
        SessionMode::Shell
    } else {
        SessionMode::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_prompt_must_trail() {
        let markers = PromptMarkers::for_mode(SessionMode::Shell);
        assert_eq!(markers.state("ls\r\nfoo\r\nroot@ot2:~# "), PromptState::Complete);
        assert_eq!(markers.state("user@flex:~$ "), PromptState::Complete);
        assert_eq!(
            markers.state("echo '# not done'\r\n# not done\r\n"),
            PromptState::Pending
        );
    }

    #[test]
    fn test_colored_prompt_is_recognized() {
        let markers = PromptMarkers::for_mode(SessionMode::Shell);
        let colored = "\x1b[?2004h\x1b[01;32mroot@ot2\x1b[00m:\x1b[01;34m~\x1b[00m# ";
        assert_eq!(markers.state(colored), PromptState::Complete);
    }

    #[test]
    fn test_interpreter_prompt_and_continuation() {
        let markers = PromptMarkers::for_mode(SessionMode::Interpreter);
        assert_eq!(markers.state("print(1)\r\n1\r\n>>> "), PromptState::Complete);
        assert_eq!(
            markers.state("for i in range(3):\r\n... "),
            PromptState::Continuation
        );
        assert_eq!(markers.state("x = 1\r\n"), PromptState::Pending);
        // a shell prompt does not complete an interpreter exchange
        assert_eq!(markers.state("root@ot2:~# "), PromptState::Pending);
    }

    #[test]
    fn test_prompt_split_across_reads() {
        let markers = PromptMarkers::for_mode(SessionMode::Interpreter);
        let mut buffer = String::from("30\r\n>>");
        assert_eq!(markers.state(&buffer), PromptState::Pending);
        buffer.push_str("> ");
        assert_eq!(markers.state(&buffer), PromptState::Complete);
    }

    #[test]
    fn test_multiline_heuristic() {
        assert!(is_multiline("for i in range(3):\n    print(i)"));
        assert!(is_multiline("def f(x):  # helper\n    return x"));
        assert!(is_multiline("async def run():\n    pass"));
        assert!(is_multiline("x = 1\nif x:\n    print(x)"));
        assert!(!is_multiline("print('for: everyone')"));
        assert!(!is_multiline("p300.aspirate(100, plate['A1'])"));
        assert!(!is_multiline("iffy = 3"));
        assert!(is_multiline("x = 41\nprint(x + 1)"));
        assert!(!is_multiline("print(1)\n"));
    }

    #[test]
    fn test_top_level_statements() {
        assert_eq!(top_level_statements("print(1)"), 1);
        assert_eq!(top_level_statements("x = 41\nprint(x + 1)\n"), 2);
        assert_eq!(top_level_statements("for i in range(3):\n    print(i)"), 1);
        assert_eq!(
            top_level_statements("try:\n    f()\nexcept ValueError:\n    pass\nelse:\n    g()\nfinally:\n    h()"),
            1
        );
        assert_eq!(top_level_statements("@cache\ndef f():\n    return 1\n\n# done\n"), 1);
        assert_eq!(top_level_statements("def f():\n    return 1\nprint(f())"), 2);
        assert_eq!(top_level_statements("else_value = 1"), 1);
    }

    #[test]
    fn test_detect_mode_from_tail() {
        assert_eq!(detect_mode("\r\n>>> "), SessionMode::Interpreter);
        assert_eq!(detect_mode("\r\nroot@ot2:~# "), SessionMode::Shell);
        assert_eq!(detect_mode("Password: "), SessionMode::Unknown);
    }

    #[test]
    fn test_error_marker() {
        assert!(contains_error(
            "Traceback (most recent call last):\r\n  File \"<stdin>\", line 1\r\nNameError: x"
        ));
        assert!(!contains_error("Traceback"));
    }
}
