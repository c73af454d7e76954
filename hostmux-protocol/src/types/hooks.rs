use serde::{Deserialize, Serialize};

// ==================== Shell Context ====================

/// Environment variable as reported by the shell integration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EnvironmentVariable {
    pub key: String,
    /// `None` when the variable is set but empty-valued in the shell
    pub value: Option<String>,
}

impl EnvironmentVariable {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }
}

/// Snapshot of the shell that raised a hook
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ShellContext {
    pub pid: Option<i32>,
    pub ttys: Option<String>,
    pub process_name: Option<String>,
    pub current_working_directory: Option<String>,
    /// Shell-side session identifier, independent of the mux `SessionId`
    pub session_id: Option<String>,
    pub terminal: Option<String>,
    pub hostname: Option<String>,
    pub shell_path: Option<String>,
    pub environment_variables: Vec<EnvironmentVariable>,
    pub preexec: Option<bool>,
    pub alias: Option<String>,
}

/// Terminal cell the cursor sits on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CursorCoordinates {
    pub x: i32,
    pub y: i32,
}

// ==================== Hooks ====================

/// The command line buffer changed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EditBufferHook {
    pub context: Option<ShellContext>,
    pub text: String,
    pub cursor: i64,
    pub histno: i64,
    pub terminal_cursor_coordinates: Option<CursorCoordinates>,
}

/// A new prompt was drawn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PromptHook {
    pub context: Option<ShellContext>,
}

/// A command is about to run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PreExecHook {
    pub context: Option<ShellContext>,
    pub command: Option<String>,
}

/// A command finished
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PostExecHook {
    pub context: Option<ShellContext>,
    pub command: Option<String>,
    pub exit_code: Option<i32>,
}

/// A key bound by an intercept request was pressed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct InterceptedKeyHook {
    pub context: Option<ShellContext>,
    /// Identifier of the action the key is bound to
    pub action: String,
    pub key: Option<String>,
}
