use serde::{Deserialize, Serialize};

use super::hooks::EnvironmentVariable;

// ==================== Insert Text ====================

/// Edit the command line of a session
///
/// `deletion` characters are removed before the cursor (shifted by `offset`)
/// and `insertion` is typed in their place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct InsertTextRequest {
    pub insertion: Option<String>,
    pub deletion: Option<u64>,
    pub offset: Option<i64>,
    /// Run the resulting command line right away
    pub immediate: Option<bool>,
    /// Replace the whole buffer with this text instead of splicing
    pub insertion_buffer: Option<String>,
    pub insert_during_command: Option<bool>,
}

impl InsertTextRequest {
    /// Plain insertion at the cursor
    pub fn text(insertion: impl Into<String>) -> Self {
        Self {
            insertion: Some(insertion.into()),
            ..Self::default()
        }
    }
}

// ==================== Set Buffer ====================

/// Replace a session's command line outright
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SetBufferRequest {
    pub text: String,
    /// Cursor index into `text`; the host puts it at the end when unset
    pub cursor_position: Option<u64>,
}

impl SetBufferRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cursor_position: None,
        }
    }
}

// ==================== Intercept ====================

/// A UI action and the keys that trigger it by default
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Action {
    pub identifier: String,
    pub default_bindings: Vec<String>,
}

/// Control which keystrokes the host forwards instead of the shell
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum InterceptRequest {
    SetIntercepts {
        intercept_bound_keystrokes: bool,
        intercept_global_keystrokes: bool,
        actions: Vec<Action>,
        override_actions: bool,
    },
    SetVisible {
        visible: bool,
    },
}

// ==================== Run Process ====================

/// Run a process in the session's environment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RunProcessRequest {
    pub executable: String,
    pub arguments: Vec<String>,
    pub working_directory: Option<String>,
    pub env: Vec<EnvironmentVariable>,
}

impl RunProcessRequest {
    pub fn new<I, S>(executable: impl Into<String>, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            executable: executable.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
            working_directory: None,
            env: Vec::new(),
        }
    }
}

/// Output of a finished `RunProcessRequest`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RunProcessResponse {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}
