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

//! Scripted in-memory remote side for tests.
//!
//! [`ScriptedTransport`] plays a login shell that can launch a tiny Python
//! REPL: it echoes input like a PTY, prints `# ` and `>>> ` prompts, keeps
//! integer variables, prints `... ` for open blocks and emits a traceback
//! for undefined names or `raise`. Replies can be scripted per input line
//! and faults (refused connects, dropped links, hangs) injected through a
//! cloneable [`RemoteHandle`] while a session owns the transport.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::Transport;
use crate::config::HostIdentity;
use crate::error::TransportError;
use crate::sync::ERROR_MARKER;

pub const MOCK_SHELL_PROMPT: &str = "root@ot2:~# ";
pub const MOCK_PYTHON_BANNER: &str =
    "Python 3.10.12 (main, Nov 20 2023, 15:14:05) [GCC 11.4.0] on linux\r\nType \"help\", \"copyright\", \"credits\" or \"license\" for more information.\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemoteMode {
    Shell,
    Python,
}

#[derive(Debug)]
struct Remote {
    link_up: bool,
    mode: RemoteMode,
    outbound: VecDeque<Vec<u8>>,
    pending_input: String,
    block: Vec<String>,
    vars: HashMap<String, i64>,
    replies: Vec<(String, String)>,
    hang_on: Vec<String>,
    drop_on: Vec<String>,
    fail_opens: u32,
    drop_after_sends: Option<u32>,
    swallow_blank_lines: u32,
    chunk_size: Option<usize>,
    python_available: bool,
    shell_prompt: String,
    open_calls: u32,
    close_calls: u32,
    sends: u32,
    written: Vec<u8>,
    lines: Vec<String>,
}

impl Remote {
    fn new() -> Self {
        Self {
            link_up: false,
            mode: RemoteMode::Shell,
            outbound: VecDeque::new(),
            pending_input: String::new(),
            block: Vec::new(),
            vars: HashMap::new(),
            replies: Vec::new(),
            hang_on: Vec::new(),
            drop_on: Vec::new(),
            fail_opens: 0,
            drop_after_sends: None,
            swallow_blank_lines: 0,
            chunk_size: None,
            python_available: true,
            shell_prompt: MOCK_SHELL_PROMPT.to_string(),
            open_calls: 0,
            close_calls: 0,
            sends: 0,
            written: Vec::new(),
            lines: Vec::new(),
        }
    }

    fn emit(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.chunk_size {
            Some(size) if size > 0 => {
                for chunk in text.as_bytes().chunks(size) {
                    self.outbound.push_back(chunk.to_vec());
                }
            }
            _ => self.outbound.push_back(text.as_bytes().to_vec()),
        }
    }

    fn emit_line(&mut self, text: &str) {
        if !text.is_empty() {
            self.emit(&format!("{text}\r\n"));
        }
    }

    fn reply_for(&self, text: &str) -> Option<String> {
        self.replies
            .iter()
            .find(|(needle, _)| text.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
    }

    fn take_drop_trigger(&mut self, line: &str) -> bool {
        match self.drop_on.iter().position(|n| line.contains(n.as_str())) {
            Some(pos) => {
                self.drop_on.remove(pos);
                true
            }
            None => false,
        }
    }

    fn feed(&mut self, input: &str) {
        self.pending_input.push_str(input);
        while let Some(pos) = self.pending_input.find('\n') {
            let line: String = self.pending_input.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']).to_string();
            self.lines.push(line.clone());
            match self.mode {
                RemoteMode::Shell => self.shell_line(&line),
                RemoteMode::Python => self.python_line(&line),
            }
            if !self.link_up {
                self.pending_input.clear();
                return;
            }
        }
    }

    fn shell_line(&mut self, line: &str) {
        self.emit(&format!("{line}\r\n"));
        if self.take_drop_trigger(line) {
            self.link_up = false;
            return;
        }
        if self.hang_on.iter().any(|n| line.contains(n.as_str())) {
            return;
        }
        if line.trim() == "python3" {
            if self.python_available {
                self.mode = RemoteMode::Python;
                self.emit(MOCK_PYTHON_BANNER);
                self.emit(">>> ");
                return;
            }
            self.emit_line("-sh: python3: not found");
        } else if let Some(reply) = self.reply_for(line) {
            self.emit_line(&reply);
        }
        let prompt = self.shell_prompt.clone();
        self.emit(&prompt);
    }

    fn python_line(&mut self, line: &str) {
        if line.trim().is_empty() && self.swallow_blank_lines > 0 {
            self.swallow_blank_lines -= 1;
            return;
        }
        self.emit(&format!("{line}\r\n"));
        if self.take_drop_trigger(line) {
            self.link_up = false;
            return;
        }
        if self.hang_on.iter().any(|n| line.contains(n.as_str())) {
            return;
        }

        if !self.block.is_empty() {
            if line.trim().is_empty() {
                let source = std::mem::take(&mut self.block).join("\n");
                let output = self.reply_for(&source).unwrap_or_default();
                self.emit_line(&output);
                self.emit(">>> ");
            } else {
                self.block.push(line.to_string());
                self.emit("... ");
            }
            return;
        }

        let statement = line.trim();
        if statement.is_empty() {
            self.emit(">>> ");
            return;
        }
        if statement == "exit()" || statement == "quit()" {
            self.mode = RemoteMode::Shell;
            let prompt = self.shell_prompt.clone();
            self.emit(&prompt);
            return;
        }
        if statement.ends_with(':') || statement.ends_with('(') || statement.ends_with('\\') {
            self.block.push(line.to_string());
            self.emit("... ");
            return;
        }

        let output = match self.reply_for(statement) {
            Some(reply) => reply,
            None => self.run_statement(statement),
        };
        self.emit_line(&output);
        self.emit(">>> ");
    }

    fn run_statement(&mut self, statement: &str) -> String {
        if let Some(rest) = statement.strip_prefix("raise ") {
            let (kind, message) = match rest.split_once('(') {
                Some((kind, args)) => (
                    kind.trim(),
                    args.trim_end_matches(')').trim_matches(['\'', '"']),
                ),
                None => (rest.trim(), ""),
            };
            return traceback(&format!("{kind}: {message}"));
        }
        if statement.starts_with("import ") || statement.starts_with("from ") {
            return String::new();
        }
        if let Some(inner) = statement
            .strip_prefix("print(")
            .and_then(|s| s.strip_suffix(')'))
        {
            return match self.eval(inner) {
                Ok(Some(Value::Int(n))) => n.to_string(),
                Ok(Some(Value::Str(s))) => s,
                Ok(None) => String::new(),
                Err(name) => name_error(&name),
            };
        }
        if let Some(source) = exec_source(statement) {
            return self.run_source(&source);
        }
        if let Some(name) = unknown_call(statement) {
            return name_error(name);
        }
        if let Some((target, expr)) = split_assignment(statement) {
            return match self.eval(expr) {
                Ok(Some(Value::Int(n))) => {
                    self.vars.insert(target.to_string(), n);
                    String::new()
                }
                Ok(_) => String::new(),
                Err(name) => name_error(&name),
            };
        }
        match self.eval(statement) {
            Ok(Some(Value::Int(n))) => n.to_string(),
            Ok(Some(Value::Str(s))) => format!("'{s}'"),
            Ok(None) => String::new(),
            Err(name) => name_error(&name),
        }
    }

    /// Run a flat module body the way `exec` would: only prints and the
    /// first traceback produce output.
    fn run_source(&mut self, source: &str) -> String {
        let mut output = Vec::new();
        for (number, line) in source.lines().enumerate() {
            let statement = line.trim();
            if statement.is_empty() || statement.starts_with('#') {
                continue;
            }
            let result = self.run_statement(statement);
            if result.starts_with(ERROR_MARKER) {
                output.push(result.replace(
                    "File \"<stdin>\", line 1",
                    &format!("File \"<otsh>\", line {}", number + 1),
                ));
                break;
            }
            if statement.starts_with("print(") && !result.is_empty() {
                output.push(result);
            }
        }
        output.join("\r\n")
    }

    fn eval(&self, expr: &str) -> Result<Option<Value>, String> {
        let expr = expr.trim();
        if let Some(s) = quoted(expr) {
            return Ok(Some(Value::Str(s.to_string())));
        }
        let mut total = 0i64;
        for term in expr.split('+') {
            let term = term.trim();
            if let Ok(n) = term.parse::<i64>() {
                total += n;
            } else if is_identifier(term) {
                match self.vars.get(term) {
                    Some(n) => total += n,
                    None => return Err(term.to_string()),
                }
            } else {
                return Ok(None);
            }
        }
        Ok(Some(Value::Int(total)))
    }
}

#[derive(Debug)]
enum Value {
    Int(i64),
    Str(String),
}

fn quoted(expr: &str) -> Option<&str> {
    ['\'', '"'].iter().find_map(|q| {
        expr.strip_prefix(*q)
            .and_then(|s| s.strip_suffix(*q))
            .filter(|s| !s.contains(*q))
    })
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Source of an `exec(compile(...))` line whose body has no indented lines.
fn exec_source(statement: &str) -> Option<String> {
    let literal = statement
        .strip_prefix("exec(compile(")?
        .strip_suffix(", '<otsh>', 'exec'))")?;
    let source: String = serde_json::from_str(literal).ok()?;
    let flat = source
        .lines()
        .all(|line| line.trim().is_empty() || !line.starts_with(char::is_whitespace));
    flat.then_some(source)
}

/// `name(...)` where `name` is not a builtin the fake REPL knows about.
fn unknown_call(statement: &str) -> Option<&str> {
    const BUILTINS: &[&str] = &["exec", "print", "len", "str", "int", "open", "help"];
    let (name, _) = statement.split_once('(')?;
    let name = name.trim();
    (statement.ends_with(')') && is_identifier(name) && !BUILTINS.contains(&name)).then_some(name)
}

fn split_assignment(statement: &str) -> Option<(&str, &str)> {
    let (target, expr) = statement.split_once('=')?;
    if expr.starts_with('=') || target.ends_with(['!', '<', '>']) {
        return None;
    }
    let target = target.trim();
    is_identifier(target).then_some((target, expr))
}

fn traceback(last_line: &str) -> String {
    format!(
        "Traceback (most recent call last):\r\n  File \"<stdin>\", line 1, in <module>\r\n{last_line}"
    )
}

fn name_error(name: &str) -> String {
    traceback(&format!("NameError: name '{name}' is not defined"))
}

/// Inspection and fault injection for a [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct RemoteHandle(Arc<Mutex<Remote>>);

impl RemoteHandle {
    fn lock(&self) -> MutexGuard<'_, Remote> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reply with `output` to any input line (or block) containing `needle`.
    pub fn reply_to(&self, needle: &str, output: &str) {
        self.lock()
            .replies
            .push((needle.to_string(), output.replace('\n', "\r\n")));
    }

    /// Never print a prompt after a line containing `needle`.
    pub fn hang_on(&self, needle: &str) {
        self.lock().hang_on.push(needle.to_string());
    }

    /// Drop the link right after echoing the next line containing `needle`.
    pub fn drop_on(&self, needle: &str) {
        self.lock().drop_on.push(needle.to_string());
    }

    pub fn fail_next_opens(&self, count: u32) {
        self.lock().fail_opens = count;
    }

    /// Let `count` more writes through, then fail the following one.
    pub fn drop_after_sends(&self, count: u32) {
        self.lock().drop_after_sends = Some(count);
    }

    /// Drop the link now, as a silent remote-side close.
    pub fn drop_link(&self) {
        self.lock().link_up = false;
    }

    pub fn swallow_blank_lines(&self, count: u32) {
        self.lock().swallow_blank_lines = count;
    }

    /// Deliver output in chunks of at most `size` bytes.
    pub fn set_chunk_size(&self, size: usize) {
        self.lock().chunk_size = Some(size);
    }

    pub fn set_shell_prompt(&self, prompt: &str) {
        self.lock().shell_prompt = prompt.to_string();
    }

    pub fn disable_python(&self) {
        self.lock().python_available = false;
    }

    /// Queue unsolicited output, as if left over from an earlier exchange.
    pub fn inject(&self, text: &str) {
        self.lock().emit(text);
    }

    pub fn open_calls(&self) -> u32 {
        self.lock().open_calls
    }

    pub fn close_calls(&self) -> u32 {
        self.lock().close_calls
    }

    pub fn send_count(&self) -> u32 {
        self.lock().sends
    }

    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.lock().written).into_owned()
    }

    /// Every complete line the remote side received, in order.
    pub fn lines(&self) -> Vec<String> {
        self.lock().lines.clone()
    }

    pub fn remote_in_python(&self) -> bool {
        self.lock().mode == RemoteMode::Python
    }

    pub fn variable(&self, name: &str) -> Option<i64> {
        self.lock().vars.get(name).copied()
    }
}

/// In-memory [`Transport`] backed by a scripted remote.
#[derive(Debug)]
pub struct ScriptedTransport {
    identity: HostIdentity,
    remote: RemoteHandle,
}

impl ScriptedTransport {
    /// A robot with a root shell and `python3` installed.
    pub fn python_robot() -> Self {
        Self {
            identity: HostIdentity::new("ot2.mock", "root", 22),
            remote: RemoteHandle(Arc::new(Mutex::new(Remote::new()))),
        }
    }

    pub fn with_identity(mut self, identity: HostIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn handle(&self) -> RemoteHandle {
        self.remote.clone()
    }

    pub fn fail_next_opens(&mut self, count: u32) {
        self.remote.fail_next_opens(count);
    }

    pub fn open_calls(&self) -> u32 {
        self.remote.open_calls()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        let mut remote = self.remote.lock();
        remote.open_calls += 1;
        if remote.fail_opens > 0 {
            remote.fail_opens -= 1;
            return Err(TransportError::Connect {
                peer: self.identity.to_string(),
                reason: "Connection refused".to_string(),
            });
        }
        remote.link_up = true;
        remote.mode = RemoteMode::Shell;
        remote.vars.clear();
        remote.block.clear();
        remote.pending_input.clear();
        remote.outbound.clear();
        remote.emit("Welcome to the OT-2\r\n");
        let prompt = remote.shell_prompt.clone();
        remote.emit(&prompt);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let mut remote = self.remote.lock();
        remote.close_calls += 1;
        remote.link_up = false;
        remote.outbound.clear();
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.remote.lock().link_up
    }

    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut remote = self.remote.lock();
        if !remote.link_up {
            return Err(TransportError::Closed);
        }
        if let Some(left) = remote.drop_after_sends {
            if left == 0 {
                remote.drop_after_sends = None;
                remote.link_up = false;
                return Err(TransportError::Closed);
            }
            remote.drop_after_sends = Some(left - 1);
        }
        remote.sends += 1;
        remote.written.extend_from_slice(data);
        remote.feed(&String::from_utf8_lossy(data));
        Ok(())
    }

    async fn recv(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        {
            let mut remote = self.remote.lock();
            if !remote.link_up {
                return Err(TransportError::Closed);
            }
            if let Some(chunk) = remote.outbound.pop_front() {
                return Ok(Some(chunk));
            }
        }
        tokio::time::sleep(wait).await;
        if self.remote.lock().link_up {
            Ok(None)
        } else {
            Err(TransportError::Closed)
        }
    }

    fn identity(&self) -> &HostIdentity {
        &self.identity
    }
}
