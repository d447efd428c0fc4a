//! Command Registry and Grammar
//!
//! A command frame's payload is a UTF-8 string of the form
//! `name-arg1-arg2-...-argN`; a compound frame carries one or more such
//! strings separated by `;`.
//!
//! Lookup is total: an unrecognized name maps to [`CommandKind::Unknown`]
//! (a no-op) instead of failing, so malformed or unknown input can never
//! crash a session. Arity is validated when the command is built.

use std::fmt;
use thiserror::Error;

/// Errors produced while building a command from its wire string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The command name was recognized but the argument count is wrong.
    #[error("wrong number of arguments for '{name}': expected {expected}, got {actual}")]
    WrongArity {
        name: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Every operation a client can request, plus the no-op fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// `create-<name>-<pass>`: create an account and authenticate as it.
    CreateUser,
    /// `login-<name>-<pass>`: authenticate this session.
    Login,
    /// `logout`: clear this session's identity.
    Logout,
    /// `user`: report this session's authenticated identity.
    GetUser,
    /// `checkUser-<name>`: does the user exist?
    CheckUser,
    /// `checkFile-<identifier>`: does the caller own this file?
    CheckFile,
    /// `checkUpload-<user>-<size>`: would an upload of `size` bytes fit?
    CheckUpload,
    /// `download-<identifier>`: fetch and decrypt an owned file.
    Download,
    /// `deleteFile-<user>-<identifier>`: delete an owned file.
    DeleteFile,
    /// `deleteUser-<user>`: delete the account and everything it owns.
    DeleteUser,
    /// `stop-<password>`: begin graceful server shutdown.
    Stop,
    /// `test`: connectivity no-op.
    Test,
    /// Fallback for unrecognized names; executes as a no-op.
    Unknown,
}

impl CommandKind {
    /// Maps a wire name to a command kind. Case-insensitive and total.
    pub fn lookup(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "create" => CommandKind::CreateUser,
            "login" => CommandKind::Login,
            "logout" => CommandKind::Logout,
            "user" => CommandKind::GetUser,
            "checkuser" => CommandKind::CheckUser,
            "checkfile" => CommandKind::CheckFile,
            "checkupload" => CommandKind::CheckUpload,
            "download" => CommandKind::Download,
            "deletefile" => CommandKind::DeleteFile,
            "deleteuser" => CommandKind::DeleteUser,
            "stop" => CommandKind::Stop,
            "test" => CommandKind::Test,
            _ => CommandKind::Unknown,
        }
    }

    /// The canonical wire name.
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::CreateUser => "create",
            CommandKind::Login => "login",
            CommandKind::Logout => "logout",
            CommandKind::GetUser => "user",
            CommandKind::CheckUser => "checkUser",
            CommandKind::CheckFile => "checkFile",
            CommandKind::CheckUpload => "checkUpload",
            CommandKind::Download => "download",
            CommandKind::DeleteFile => "deleteFile",
            CommandKind::DeleteUser => "deleteUser",
            CommandKind::Stop => "stop",
            CommandKind::Test => "test",
            CommandKind::Unknown => "unknown",
        }
    }

    /// Expected argument count, excluding the command name itself.
    pub fn arity(self) -> usize {
        match self {
            CommandKind::CreateUser => 2,
            CommandKind::Login => 2,
            CommandKind::Logout => 0,
            CommandKind::GetUser => 0,
            CommandKind::CheckUser => 1,
            CommandKind::CheckFile => 1,
            CommandKind::CheckUpload => 2,
            CommandKind::Download => 1,
            CommandKind::DeleteFile => 2,
            CommandKind::DeleteUser => 1,
            CommandKind::Stop => 1,
            CommandKind::Test => 0,
            CommandKind::Unknown => 0,
        }
    }

    /// Whether this command requires an authenticated session.
    ///
    /// `create` and `login` establish the identity, `checkUser` has no
    /// precondition by contract, and the no-ops touch nothing.
    pub fn requires_auth(self) -> bool {
        !matches!(
            self,
            CommandKind::CreateUser
                | CommandKind::Login
                | CommandKind::CheckUser
                | CommandKind::Test
                | CommandKind::Unknown
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One arity-checked command ready for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub args: Vec<String>,
}

impl Command {
    /// Builds a command from one `name-arg1-...-argN` wire string.
    pub fn parse(payload: &str) -> Result<Self, RegistryError> {
        let mut parts = payload.split('-');
        // split always yields at least one (possibly empty) part
        let name = parts.next().unwrap_or_default();
        let kind = CommandKind::lookup(name);
        let args: Vec<String> = parts.map(str::to_owned).collect();

        if kind != CommandKind::Unknown && args.len() != kind.arity() {
            return Err(RegistryError::WrongArity {
                name: kind.name(),
                expected: kind.arity(),
                actual: args.len(),
            });
        }
        Ok(Self { kind, args })
    }

    /// Splits a compound payload into its sub-commands, in order. Each
    /// sub-command parses independently; one bad entry does not poison
    /// the rest.
    pub fn parse_batch(payload: &str) -> Vec<Result<Self, RegistryError>> {
        payload
            .split(';')
            .filter(|part| !part.is_empty())
            .map(Self::parse)
            .collect()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for arg in &self.args {
            write!(f, "-{}", arg)?;
        }
        Ok(())
    }
}
