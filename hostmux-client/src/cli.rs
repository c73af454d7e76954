//! Command-line argument parsing for the hostmux client
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// hostmux - talk to a terminal host over its session mux protocol
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// WebSocket URL of the host (overrides connection.url from config)
    #[arg(long, env = "HOSTMUX_URL", global = true)]
    pub url: Option<String>,

    /// Config file to use instead of the default location
    ///
    /// Unlike the default file, an explicit config must exist and parse.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print inbound hook events as JSON lines until the host goes away
    Watch {
        /// Do not ping the host
        #[arg(long, default_value_t = false)]
        no_liveness: bool,
    },

    /// Insert text into a session's command line
    InsertText {
        /// Target session
        #[arg(long, short)]
        session: String,

        /// Execute the buffer right after inserting
        #[arg(long, default_value_t = false)]
        immediate: bool,

        text: String,
    },

    /// Replace a session's command line
    SetBuffer {
        /// Target session
        #[arg(long, short)]
        session: String,

        /// Cursor position in the new text (defaults to the end)
        #[arg(long)]
        cursor: Option<u64>,

        text: String,
    },

    /// Run a process in a session's environment and print its result
    Run {
        /// Target session
        #[arg(long, short)]
        session: String,

        /// Working directory on the host
        #[arg(long)]
        cwd: Option<String>,

        executable: String,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_defaults() {
        let args = Args::parse_from(["hostmux", "watch"]);
        assert_eq!(args.command, Command::Watch { no_liveness: false });
        assert_eq!(args.verbose, 0);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from([
            "hostmux",
            "watch",
            "--no-liveness",
            "--url",
            "ws://localhost:9000",
            "-vv",
        ]);
        assert_eq!(args.command, Command::Watch { no_liveness: true });
        assert_eq!(args.url.as_deref(), Some("ws://localhost:9000"));
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_insert_text() {
        let args = Args::parse_from(["hostmux", "insert-text", "-s", "abc", "--immediate", "ls -la"]);
        assert_eq!(
            args.command,
            Command::InsertText {
                session: "abc".into(),
                immediate: true,
                text: "ls -la".into(),
            }
        );
    }

    #[test]
    fn test_set_buffer() {
        let args = Args::parse_from(["hostmux", "set-buffer", "-s", "abc", "--cursor", "3", "git"]);
        assert_eq!(
            args.command,
            Command::SetBuffer {
                session: "abc".into(),
                cursor: Some(3),
                text: "git".into(),
            }
        );
    }

    #[test]
    fn test_run_with_hyphen_args() {
        let args = Args::parse_from([
            "hostmux", "--config", "/tmp/h.toml", "run", "--session", "s1", "--cwd", "/tmp", "git",
            "log", "--oneline", "-n", "3",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/h.toml")));
        assert_eq!(
            args.command,
            Command::Run {
                session: "s1".into(),
                cwd: Some("/tmp".into()),
                executable: "git".into(),
                args: vec!["log".into(), "--oneline".into(), "-n".into(), "3".into()],
            }
        );
    }

    #[test]
    fn test_session_is_required() {
        assert!(Args::try_parse_from(["hostmux", "insert-text", "hello"]).is_err());
    }
}
