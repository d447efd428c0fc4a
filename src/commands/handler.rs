//! Command Execution
//!
//! This module executes parsed commands against the database, the blob
//! store, and the crypto collaborator. The session passes its own
//! authentication state in by reference; nothing about identity is kept
//! in global state, so concurrent sessions can never observe each
//! other's login.
//!
//! ## Authorization
//!
//! Every command except `create`, `login`, `checkUser` and the no-ops
//! requires an authenticated session. An unauthorized command returns a
//! textual `false` without touching the database or the filesystem.
//!
//! ## Compound Commands
//!
//! Sub-commands run strictly in order and each result is appended to
//! the aggregate answer. A sub-command's checked failure never aborts
//! the batch, and a connection-terminating side effect (`stop`) is
//! deferred until the whole batch has run, then applied once.

use crate::commands::registry::{Command, CommandKind};
use crate::crypto::Crypto;
use crate::db::{Db, DbError, DbResult, FileRecord};
use crate::server::Shutdown;
use crate::storage::BlobStore;
use crate::Limits;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// The identity a session has authenticated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
    pub name: String,
}

/// Per-session authentication state, owned by exactly one session and
/// passed into command execution by reference.
#[derive(Debug, Default)]
pub struct SessionState {
    user: Option<AuthUser>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The authenticated identity, if any.
    pub fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Whether this session is authenticated as exactly `name`.
    pub fn is(&self, name: &str) -> bool {
        self.user.as_ref().is_some_and(|u| u.name == name)
    }

    pub fn log_in(&mut self, user: AuthUser) {
        self.user = Some(user);
    }

    pub fn log_out(&mut self) {
        self.user = None;
    }
}

/// What running a command produced.
#[derive(Debug, Default)]
pub struct CommandOutcome {
    /// The textual result carried back in the answer frame.
    pub text: String,
    /// File bytes to follow the answer in a file-transfer frame.
    pub data: Option<Bytes>,
    /// Close this connection once the answer has been written.
    pub terminate: bool,
}

impl CommandOutcome {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    fn boolean(value: bool) -> Self {
        Self::text(if value { "true" } else { "false" })
    }

    fn failure() -> Self {
        Self::text("false")
    }
}

/// Executes commands. One handler is shared by all sessions; it holds
/// no per-session state.
#[derive(Clone)]
pub struct CommandHandler {
    db: Arc<Db>,
    store: Arc<BlobStore>,
    crypto: Arc<dyn Crypto>,
    limits: Limits,
    stop_secret: String,
    shutdown: Arc<Shutdown>,
}

impl CommandHandler {
    pub fn new(
        db: Arc<Db>,
        store: Arc<BlobStore>,
        crypto: Arc<dyn Crypto>,
        limits: Limits,
        stop_secret: String,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        Self {
            db,
            store,
            crypto,
            limits,
            stop_secret,
            shutdown,
        }
    }

    /// Runs a single-command payload.
    pub fn execute(&self, payload: &str, session: &mut SessionState) -> CommandOutcome {
        match Command::parse(payload) {
            Ok(command) => self.run(&command, session),
            Err(e) => {
                warn!(payload, error = %e, "rejected malformed command");
                CommandOutcome::failure()
            }
        }
    }

    /// Runs a compound payload: every sub-command in order, results
    /// concatenated, termination deferred to the end of the batch.
    pub fn execute_compound(&self, payload: &str, session: &mut SessionState) -> CommandOutcome {
        let mut aggregate = CommandOutcome::default();
        for parsed in Command::parse_batch(payload) {
            let outcome = match parsed {
                Ok(command) => self.run(&command, session),
                Err(e) => {
                    warn!(error = %e, "malformed sub-command in batch");
                    CommandOutcome::failure()
                }
            };
            aggregate.text.push_str(&outcome.text);
            aggregate.terminate |= outcome.terminate;
            if outcome.data.is_some() {
                aggregate.data = outcome.data;
            }
        }
        aggregate
    }

    fn run(&self, command: &Command, session: &mut SessionState) -> CommandOutcome {
        if command.kind.requires_auth() && !session.is_authenticated() {
            debug!(command = %command.kind, "unauthorized command refused");
            return CommandOutcome::failure();
        }

        let result = match command.kind {
            CommandKind::CreateUser => self.cmd_create(&command.args[0], &command.args[1], session),
            CommandKind::Login => self.cmd_login(&command.args[0], &command.args[1], session),
            CommandKind::Logout => self.cmd_logout(session),
            CommandKind::GetUser => self.cmd_get_user(session),
            CommandKind::CheckUser => self.cmd_check_user(&command.args[0]),
            CommandKind::CheckFile => self.cmd_check_file(&command.args[0], session),
            CommandKind::CheckUpload => {
                self.cmd_check_upload(&command.args[0], &command.args[1], session)
            }
            CommandKind::Download => self.cmd_download(&command.args[0], session),
            CommandKind::DeleteFile => {
                self.cmd_delete_file(&command.args[0], &command.args[1], session)
            }
            CommandKind::DeleteUser => self.cmd_delete_user(&command.args[0], session),
            CommandKind::Stop => Ok(self.cmd_stop(&command.args[0])),
            CommandKind::Test => Ok(CommandOutcome::text("Test Answer")),
            CommandKind::Unknown => Ok(CommandOutcome::default()),
        };

        match result {
            Ok(outcome) => outcome,
            Err(e @ (DbError::UnknownUser(_) | DbError::UnknownFile(_))) => {
                debug!(command = %command.kind, error = %e, "command target not found");
                CommandOutcome::failure()
            }
            Err(e) => {
                error!(command = %command.kind, error = %e, "command failed");
                CommandOutcome::failure()
            }
        }
    }

    /// Handles an uploaded file payload: size check, encrypt, persist
    /// the blob, record the descriptor. Returns the new identifier as
    /// the answer text, or a failure marker.
    pub fn store_upload(&self, data: &[u8], session: &SessionState) -> CommandOutcome {
        let Some(user) = session.user() else {
            debug!("file transfer from unauthenticated session refused");
            return CommandOutcome::failure();
        };
        if data.len() as i64 > self.limits.max_file_size {
            warn!(
                user = %user.name,
                size = data.len(),
                "file transfer rejected: too large"
            );
            return CommandOutcome::failure();
        }

        let encrypted = match self.crypto.encrypt(data) {
            Ok(blob) => blob,
            Err(e) => {
                error!(error = %e, "encryption failed");
                return CommandOutcome::failure();
            }
        };

        let identifier = self.store.new_identifier();
        if let Err(e) = self.store.save(&identifier, &encrypted) {
            error!(identifier, error = %e, "blob write failed");
            return CommandOutcome::failure();
        }
        let record = FileRecord {
            identifier: identifier.clone(),
            owner: user.id,
            size: data.len() as i64,
        };
        match self.db.add_descriptor(&record) {
            Ok(true) => {
                info!(user = %user.name, identifier, size = record.size, "file stored");
                CommandOutcome::text(identifier)
            }
            Ok(false) | Err(_) => {
                // Descriptor insert failed; do not leave an orphan blob.
                let _ = self.store.remove(&identifier);
                error!(identifier, "descriptor insert failed");
                CommandOutcome::failure()
            }
        }
    }

    // ========================================================================
    // Individual commands
    // ========================================================================

    fn cmd_create(
        &self,
        name: &str,
        pass: &str,
        session: &mut SessionState,
    ) -> DbResult<CommandOutcome> {
        match self.db.create_account(name, pass.as_bytes()) {
            Ok(id) => {
                if let Err(e) = self.store.register_user(name) {
                    warn!(user = name, error = %e, "could not seed user directory");
                }
                session.log_in(AuthUser {
                    id,
                    name: name.to_owned(),
                });
                Ok(CommandOutcome::text(name))
            }
            Err(DbError::UserExists(_)) => {
                debug!(user = name, "create refused: name taken");
                Ok(CommandOutcome::failure())
            }
            Err(e) => Err(e),
        }
    }

    fn cmd_login(
        &self,
        name: &str,
        pass: &str,
        session: &mut SessionState,
    ) -> DbResult<CommandOutcome> {
        let id = self.db.user_id(name)?;
        let salted = self.db.salt_pass(id, pass.as_bytes())?;
        let expected = self.db.stored_pass(id)?;
        let authentic = salted == expected;
        if authentic {
            session.log_in(AuthUser {
                id,
                name: name.to_owned(),
            });
            info!(user = name, "login succeeded");
        } else {
            info!(user = name, "login failed: wrong password");
        }
        Ok(CommandOutcome::boolean(authentic))
    }

    fn cmd_logout(&self, session: &mut SessionState) -> DbResult<CommandOutcome> {
        session.log_out();
        Ok(CommandOutcome::boolean(true))
    }

    fn cmd_get_user(&self, session: &SessionState) -> DbResult<CommandOutcome> {
        match session.user() {
            Some(user) => Ok(CommandOutcome::text(user.name.clone())),
            None => Ok(CommandOutcome::failure()),
        }
    }

    fn cmd_check_user(&self, name: &str) -> DbResult<CommandOutcome> {
        Ok(CommandOutcome::boolean(self.db.account_exists(name)?))
    }

    fn cmd_check_file(
        &self,
        identifier: &str,
        session: &SessionState,
    ) -> DbResult<CommandOutcome> {
        let Some(user) = session.user() else {
            return Ok(CommandOutcome::failure());
        };
        match self.db.descriptor(identifier) {
            Ok(record) => Ok(CommandOutcome::boolean(record.owner == user.id)),
            Err(DbError::UnknownFile(_)) => Ok(CommandOutcome::failure()),
            Err(e) => Err(e),
        }
    }

    fn cmd_check_upload(
        &self,
        name: &str,
        size: &str,
        session: &SessionState,
    ) -> DbResult<CommandOutcome> {
        if !session.is(name) {
            return Ok(CommandOutcome::failure());
        }
        let Ok(size) = size.parse::<i64>() else {
            return Ok(CommandOutcome::failure());
        };
        if size < 0 || size > self.limits.max_file_size {
            return Ok(CommandOutcome::failure());
        }
        let id = self.db.user_id(name)?;
        let used = self.db.total_space_for_user(id)?;
        Ok(CommandOutcome::boolean(
            used + size <= self.limits.max_user_quota,
        ))
    }

    fn cmd_download(
        &self,
        identifier: &str,
        session: &SessionState,
    ) -> DbResult<CommandOutcome> {
        let Some(user) = session.user() else {
            return Ok(CommandOutcome::failure());
        };
        let record = self.db.descriptor(identifier)?;
        if record.owner != user.id {
            debug!(user = %user.name, identifier, "download refused: not the owner");
            return Ok(CommandOutcome::failure());
        }
        let encrypted = match self.store.load(identifier) {
            Ok(blob) => blob,
            Err(e) => {
                error!(identifier, error = %e, "blob read failed");
                return Ok(CommandOutcome::failure());
            }
        };
        match self.crypto.decrypt(&encrypted) {
            Ok(plain) => Ok(CommandOutcome {
                text: "true".to_owned(),
                data: Some(Bytes::from(plain)),
                terminate: false,
            }),
            Err(e) => {
                error!(identifier, error = %e, "decryption failed");
                Ok(CommandOutcome::failure())
            }
        }
    }

    fn cmd_delete_file(
        &self,
        name: &str,
        identifier: &str,
        session: &SessionState,
    ) -> DbResult<CommandOutcome> {
        let Some(user) = session.user() else {
            return Ok(CommandOutcome::failure());
        };
        if user.name != name {
            return Ok(CommandOutcome::failure());
        }
        let record = self.db.descriptor(identifier)?;
        if record.owner != user.id {
            return Ok(CommandOutcome::failure());
        }
        if let Err(e) = self.store.remove(identifier) {
            error!(identifier, error = %e, "blob removal failed");
        }
        let deleted = self.db.delete_descriptor(identifier)?;
        if deleted {
            info!(user = name, identifier, "file deleted");
        }
        Ok(CommandOutcome::boolean(deleted))
    }

    fn cmd_delete_user(
        &self,
        name: &str,
        session: &mut SessionState,
    ) -> DbResult<CommandOutcome> {
        if !session.is(name) {
            return Ok(CommandOutcome::failure());
        }
        let id = self.db.user_id(name)?;
        // Blobs first: the descriptor rows cascade with the user row.
        for record in self.db.owned_files(id)? {
            if let Err(e) = self.store.remove(&record.identifier) {
                error!(identifier = %record.identifier, error = %e, "blob removal failed");
            }
        }
        let deleted = self.db.delete_account(id)?;
        if deleted {
            session.log_out();
            info!(user = name, "account deleted");
        }
        Ok(CommandOutcome::boolean(deleted))
    }

    fn cmd_stop(&self, password: &str) -> CommandOutcome {
        if password != self.stop_secret {
            warn!("stop received with wrong password");
            return CommandOutcome::failure();
        }
        info!("stop accepted, beginning shutdown");
        self.shutdown.trigger();
        CommandOutcome {
            text: "true".to_owned(),
            data: None,
            terminate: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::NullCrypto;

    const SECRET: &str = "reallyactuallystop";

    fn handler_with(limits: Limits) -> (tempfile::TempDir, CommandHandler, Arc<Shutdown>) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Db::open_in_memory().unwrap());
        let store = Arc::new(BlobStore::open(dir.path().join("storage")).unwrap());
        let shutdown = Arc::new(Shutdown::new());
        let handler = CommandHandler::new(
            db,
            store,
            Arc::new(NullCrypto),
            limits,
            SECRET.to_owned(),
            Arc::clone(&shutdown),
        );
        (dir, handler, shutdown)
    }

    fn handler() -> (tempfile::TempDir, CommandHandler, Arc<Shutdown>) {
        handler_with(Limits::default())
    }

    #[test]
    fn test_create_authenticates_session() {
        let (_dir, handler, _) = handler();
        let mut session = SessionState::new();

        let outcome = handler.execute("create-Alice-pw1", &mut session);
        assert_eq!(outcome.text, "Alice");
        assert!(session.is("Alice"));
    }

    #[test]
    fn test_create_duplicate_fails() {
        let (_dir, handler, _) = handler();
        let mut session = SessionState::new();
        handler.execute("create-Alice-pw1", &mut session);

        let mut other = SessionState::new();
        let outcome = handler.execute("create-Alice-pw2", &mut other);
        assert_eq!(outcome.text, "false");
        assert!(!other.is_authenticated());
    }

    #[test]
    fn test_login_correct_and_wrong_password() {
        let (_dir, handler, _) = handler();
        let mut session = SessionState::new();
        handler.execute("create-Alice-pw1", &mut session);

        let mut fresh = SessionState::new();
        let wrong = handler.execute("login-Alice-nope", &mut fresh);
        assert_eq!(wrong.text, "false");
        assert!(!fresh.is_authenticated());

        let right = handler.execute("login-Alice-pw1", &mut fresh);
        assert_eq!(right.text, "true");
        assert!(fresh.is("Alice"));
    }

    #[test]
    fn test_login_unknown_user() {
        let (_dir, handler, _) = handler();
        let mut session = SessionState::new();
        let outcome = handler.execute("login-Ghost-pw", &mut session);
        assert_eq!(outcome.text, "false");
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_logout_clears_identity() {
        let (_dir, handler, _) = handler();
        let mut session = SessionState::new();
        handler.execute("create-Alice-pw1", &mut session);

        let outcome = handler.execute("logout", &mut session);
        assert_eq!(outcome.text, "true");
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_authorization_gate_blocks_side_effects() {
        let (_dir, handler, _) = handler();
        let mut alice = SessionState::new();
        handler.execute("create-Alice-pw1", &mut alice);
        let upload = handler.store_upload(b"secret", &alice);
        let file_id = upload.text.clone();
        assert_ne!(file_id, "false");

        // A fresh, unauthenticated session can neither download nor
        // delete that file, and the attempts change nothing.
        let mut intruder = SessionState::new();
        for payload in [
            format!("download-{file_id}"),
            format!("deleteFile-Alice-{file_id}"),
            "deleteUser-Alice".to_owned(),
            format!("stop-{SECRET}"),
        ] {
            let outcome = handler.execute(&payload, &mut intruder);
            assert_eq!(outcome.text, "false");
        }
        assert_eq!(handler.execute(&format!("checkFile-{file_id}"), &mut alice).text, "true");
    }

    #[test]
    fn test_check_user_without_login() {
        let (_dir, handler, _) = handler();
        let mut creator = SessionState::new();
        handler.execute("create-Bob-pw", &mut creator);

        let mut anon = SessionState::new();
        assert_eq!(handler.execute("checkUser-Bob", &mut anon).text, "true");
        assert_eq!(handler.execute("checkUser-Eve", &mut anon).text, "false");
    }

    #[test]
    fn test_check_upload_boundaries() {
        let limits = Limits {
            max_file_size: 1000,
            max_user_quota: 1000,
        };
        let (_dir, handler, _) = handler_with(limits);
        let mut session = SessionState::new();
        handler.execute("create-Alice-pw1", &mut session);
        let stored = handler.store_upload(&[0u8; 600], &session);
        assert_ne!(stored.text, "false");

        // 600 used: exactly filling the quota is allowed...
        assert_eq!(
            handler.execute("checkUpload-Alice-400", &mut session).text,
            "true"
        );
        // ...one byte past it is not.
        assert_eq!(
            handler.execute("checkUpload-Alice-401", &mut session).text,
            "false"
        );
        // Per-file cap applies independently of remaining quota.
        assert_eq!(
            handler.execute("checkUpload-Alice-1001", &mut session).text,
            "false"
        );
        // Only the quota owner may ask.
        let mut other = SessionState::new();
        handler.execute("create-Bob-pw", &mut other);
        assert_eq!(
            handler.execute("checkUpload-Alice-1", &mut other).text,
            "false"
        );
    }

    #[test]
    fn test_upload_download_roundtrip() {
        let (_dir, handler, _) = handler();
        let mut session = SessionState::new();
        handler.execute("create-Alice-pw1", &mut session);

        let payload = vec![7u8; 100];
        let upload = handler.store_upload(&payload, &session);
        let file_id = upload.text;
        assert_ne!(file_id, "false");

        let download = handler.execute(&format!("download-{file_id}"), &mut session);
        assert_eq!(download.text, "true");
        assert_eq!(download.data.unwrap(), Bytes::from(payload));
    }

    #[test]
    fn test_download_requires_ownership() {
        let (_dir, handler, _) = handler();
        let mut alice = SessionState::new();
        handler.execute("create-Alice-pw1", &mut alice);
        let file_id = handler.store_upload(b"private", &alice).text;

        let mut bob = SessionState::new();
        handler.execute("create-Bob-pw2", &mut bob);
        let outcome = handler.execute(&format!("download-{file_id}"), &mut bob);
        assert_eq!(outcome.text, "false");
        assert!(outcome.data.is_none());
    }

    #[test]
    fn test_delete_file() {
        let (_dir, handler, _) = handler();
        let mut session = SessionState::new();
        handler.execute("create-Alice-pw1", &mut session);
        let file_id = handler.store_upload(b"doomed", &session).text;

        let outcome = handler.execute(&format!("deleteFile-Alice-{file_id}"), &mut session);
        assert_eq!(outcome.text, "true");
        // Gone from both the table and the store.
        assert_eq!(
            handler.execute(&format!("checkFile-{file_id}"), &mut session).text,
            "false"
        );
        assert_eq!(
            handler.execute(&format!("download-{file_id}"), &mut session).text,
            "false"
        );
    }

    #[test]
    fn test_delete_user_cascades() {
        let (_dir, handler, _) = handler();
        let mut session = SessionState::new();
        handler.execute("create-Alice-pw1", &mut session);
        handler.store_upload(b"one", &session);
        handler.store_upload(b"two", &session);

        let outcome = handler.execute("deleteUser-Alice", &mut session);
        assert_eq!(outcome.text, "true");
        assert!(!session.is_authenticated());

        let mut anon = SessionState::new();
        assert_eq!(handler.execute("checkUser-Alice", &mut anon).text, "false");
    }

    #[test]
    fn test_compound_partial_failure() {
        let (_dir, handler, _) = handler();
        let mut creator = SessionState::new();
        handler.execute("create-Bob-pw", &mut creator);

        let mut session = SessionState::new();
        let outcome =
            handler.execute_compound("checkUser-Bob;login-Bob-wrongpw;checkUser-Bob", &mut session);
        // All three ran, in order, despite the middle failure.
        assert_eq!(outcome.text, "truefalsetrue");
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_compound_defers_termination() {
        let (_dir, handler, shutdown) = handler();
        let mut session = SessionState::new();
        handler.execute("create-Alice-pw1", &mut session);

        let outcome = handler.execute_compound(
            &format!("stop-{SECRET};checkUser-Alice"),
            &mut session,
        );
        // The trailing sub-command still ran and the terminate flag is
        // applied once, for the whole batch.
        assert_eq!(outcome.text, "truetrue");
        assert!(outcome.terminate);
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn test_stop_wrong_password() {
        let (_dir, handler, shutdown) = handler();
        let mut session = SessionState::new();
        handler.execute("create-Alice-pw1", &mut session);

        let outcome = handler.execute("stop-guess", &mut session);
        assert_eq!(outcome.text, "false");
        assert!(!outcome.terminate);
        assert!(!shutdown.is_triggered());
    }

    #[test]
    fn test_unknown_command_is_silent_noop() {
        let (_dir, handler, _) = handler();
        let mut session = SessionState::new();
        let outcome = handler.execute("frobnicate-x", &mut session);
        assert_eq!(outcome.text, "");
        assert!(!outcome.terminate);
    }

    #[test]
    fn test_oversized_upload_rejected() {
        let limits = Limits {
            max_file_size: 10,
            max_user_quota: 100,
        };
        let (_dir, handler, _) = handler_with(limits);
        let mut session = SessionState::new();
        handler.execute("create-Alice-pw1", &mut session);

        let outcome = handler.store_upload(&[0u8; 11], &session);
        assert_eq!(outcome.text, "false");
    }
}
