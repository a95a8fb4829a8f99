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

//! Prompt synchronization over a raw byte stream.

pub mod markers;
mod synchronizer;

pub use markers::{
    clean_output, contains_error, detect_mode, is_multiline, top_level_statements, PromptMarkers,
    PromptState, CONTINUATION_PROMPT, ERROR_MARKER, INTERPRETER_PROMPT, SHELL_PROMPTS,
};
pub use synchronizer::{drain, exchange, Exchange, SyncFailure, SyncOptions};
