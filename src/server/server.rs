//! # Server Core - Shared State and Command Handlers
//!
//! The core owns everything the commands operate on:
//! - the [`TaskStore`] with the current task list,
//! - the [`CredentialStore`] consulted by `Login`,
//! - the [`BackupSink`] receiving `backup` uploads,
//! - the [`ConnectionRegistry`] used to fan out task updates.
//!
//! It knows nothing about sockets. Accepting connections and turning frames
//! into [`CommandRouter::dispatch`] calls is the job of the
//! [`ServerMiddleware`](super::middleware::ServerMiddleware).

use anyhow::Result;
use async_trait::async_trait;
use log::{error, info, warn};
use std::sync::Arc;

use super::backup::BackupSink;
use super::credentials::{Credential, CredentialStore};
use super::registry::ConnectionRegistry;
use super::router::{Caller, CommandHandler, CommandResult, CommandRouter};
use super::tasks::TaskStore;
use crate::common::config::ServerConfig;
use crate::common::messages::{Message, CMD_BACKUP, CMD_LOGIN, CMD_TASKS};
use crate::common::payload::{login_state_bytes, BackupBatch, LoginRequest, TaskList};

/// State shared by every connection.
pub struct ServerCore {
    tasks: Arc<TaskStore>,
    credentials: Arc<CredentialStore>,
    backup: Arc<BackupSink>,
    registry: Arc<ConnectionRegistry>,
    max_batch_files: usize,
}

impl ServerCore {
    /// Load (or bootstrap) all persisted state named by `config`.
    ///
    /// # Returns
    /// The core, plus the root credential if the users file had to be created.
    pub async fn open(config: &ServerConfig) -> Result<(Self, Option<Credential>)> {
        let (credentials, generated) =
            CredentialStore::load_or_bootstrap(&config.storage.users_file).await?;
        let tasks = TaskStore::load(&config.storage.tasks_file).await?;
        let backup = BackupSink::new(&config.storage.backup_dir);

        let core = Self::from_parts(
            tasks,
            credentials,
            backup,
            config.limits.max_batch_files,
        );
        Ok((core, generated))
    }

    pub fn from_parts(
        tasks: TaskStore,
        credentials: CredentialStore,
        backup: BackupSink,
        max_batch_files: usize,
    ) -> Self {
        Self {
            tasks: Arc::new(tasks),
            credentials: Arc::new(credentials),
            backup: Arc::new(backup),
            registry: Arc::new(ConnectionRegistry::new()),
            max_batch_files,
        }
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn backup(&self) -> &BackupSink {
        &self.backup
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Router with the `tasks`, `backup` and `Login` handlers bound.
    pub fn router(&self) -> CommandRouter {
        let mut router = CommandRouter::new();
        router.register(
            CMD_TASKS,
            Arc::new(TasksCommand {
                tasks: self.tasks.clone(),
                registry: self.registry.clone(),
            }),
        );
        router.register(
            CMD_BACKUP,
            Arc::new(BackupCommand {
                sink: self.backup.clone(),
                max_batch_files: self.max_batch_files,
            }),
        );
        router.register(
            CMD_LOGIN,
            Arc::new(LoginCommand {
                credentials: self.credentials.clone(),
            }),
        );
        router
    }
}

/// `tasks`: replace the shared list, persist it, fan it out to everyone else.
struct TasksCommand {
    tasks: Arc<TaskStore>,
    registry: Arc<ConnectionRegistry>,
}

#[async_trait]
impl CommandHandler for TasksCommand {
    async fn handle(&self, data: Vec<u8>, caller: &Caller) -> CommandResult {
        let list = match TaskList::from_bytes(&data) {
            Ok(list) => list,
            Err(e) => {
                warn!("⚠️  Rejected task list from {}: {}", caller.id, e);
                return CommandResult::Failure;
            }
        };
        let encoded = match list.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("❌ Cannot encode task list: {}", e);
                return CommandResult::Failure;
            }
        };
        let count = list.len();

        // Held until the broadcast is queued so updates reach every
        // connection in the order they were persisted
        let current = match self.tasks.replace(list).await {
            Ok(guard) => guard,
            Err(e) => {
                error!("❌ Failed to persist task list, not broadcasting: {:#}", e);
                return CommandResult::Failure;
            }
        };

        let update = Message::request(CMD_TASKS, encoded);
        let delivered = self.registry.broadcast_except(caller.id, &update).await;
        drop(current);

        info!(
            "-> Tasks updated by {} ({} tasks, sent to {} other clients)",
            caller.id, count, delivered
        );
        CommandResult::Success
    }
}

/// `backup`: write each uploaded file into the backup directory.
struct BackupCommand {
    sink: Arc<BackupSink>,
    max_batch_files: usize,
}

#[async_trait]
impl CommandHandler for BackupCommand {
    async fn handle(&self, data: Vec<u8>, caller: &Caller) -> CommandResult {
        let batch = match BackupBatch::from_bytes(&data, self.max_batch_files) {
            Ok(batch) => batch,
            Err(e) => {
                warn!("⚠️  Rejected backup batch from {}: {}", caller.id, e);
                return CommandResult::Failure;
            }
        };

        info!("-> Get {} files for backup from {}", batch.len(), caller.id);
        let report = self.sink.store(batch).await;
        if report.failed > 0 {
            warn!(
                "⚠️  Backup from {}: {} written, {} failed",
                caller.id, report.written, report.failed
            );
        }

        CommandResult::from(report.is_success())
    }
}

/// `Login`: check credentials and tell the caller the outcome in a separate message.
struct LoginCommand {
    credentials: Arc<CredentialStore>,
}

#[async_trait]
impl CommandHandler for LoginCommand {
    async fn handle(&self, data: Vec<u8>, caller: &Caller) -> CommandResult {
        let login = match LoginRequest::from_bytes(&data) {
            Ok(login) => login,
            Err(e) => {
                warn!("⚠️  Malformed login from {}: {}", caller.id, e);
                return CommandResult::Failure;
            }
        };

        let logged_in = self
            .credentials
            .check(&login.username, &login.password)
            .await;
        info!(
            "🔑 Login state for '{}' on {}: {}",
            login.username, caller.id, logged_in
        );

        caller.send(Message::request(CMD_LOGIN, login_state_bytes(logged_in)));
        CommandResult::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::messages::Status;
    use crate::common::payload::{parse_login_state, FileRecord};
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Fixture {
        _dir: tempfile::TempDir,
        core: ServerCore,
        router: CommandRouter,
        root: Credential,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::in_dir(dir.path());
        let (core, root) = ServerCore::open(&config).await.unwrap();
        let router = core.router();
        Fixture {
            _dir: dir,
            core,
            router,
            root: root.expect("fresh directory bootstraps root"),
        }
    }

    async fn connect(core: &ServerCore) -> (Caller, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(16);
        let (id, _) = core.registry().register(tx.clone()).await;
        (Caller { id, outbound: tx }, rx)
    }

    fn login_payload(user: &str, password: &str) -> Vec<u8> {
        LoginRequest::new(user, password).to_bytes()
    }

    fn login_outcome(message: Message) -> bool {
        match message {
            Message::Request { command, data } if command == CMD_LOGIN => {
                parse_login_state(&data).unwrap()
            }
            other => panic!("expected login state, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_router_has_three_commands() {
        let fx = fixture().await;
        let mut commands: Vec<&str> = fx.router.commands().collect();
        commands.sort();
        assert_eq!(commands, vec!["Login", "backup", "tasks"]);
    }

    #[tokio::test]
    async fn test_login_outcomes() {
        let fx = fixture().await;
        let (caller, mut rx) = connect(&fx.core).await;

        let ok = fx
            .router
            .dispatch(CMD_LOGIN, login_payload("root", &fx.root.password), &caller)
            .await;
        assert_eq!(ok, CommandResult::Success);
        assert!(login_outcome(rx.try_recv().unwrap()));

        let wrong = fx
            .router
            .dispatch(CMD_LOGIN, login_payload("root", "not-it"), &caller)
            .await;
        assert_eq!(wrong, CommandResult::Success);
        assert!(!login_outcome(rx.try_recv().unwrap()));

        fx.router
            .dispatch(CMD_LOGIN, login_payload("alice", "x"), &caller)
            .await;
        assert!(!login_outcome(rx.try_recv().unwrap()));
    }

    #[tokio::test]
    async fn test_malformed_login_is_failure_without_state_message() {
        let fx = fixture().await;
        let (caller, mut rx) = connect(&fx.core).await;

        let result = fx
            .router
            .dispatch(CMD_LOGIN, b"root-without-separator".to_vec(), &caller)
            .await;

        assert_eq!(result.status(), Status::Error);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_tasks_broadcast_excludes_sender() {
        let fx = fixture().await;
        let (sender, mut rx_sender) = connect(&fx.core).await;
        let (_other, mut rx_other) = connect(&fx.core).await;
        let (_third, mut rx_third) = connect(&fx.core).await;

        let list = TaskList::new(vec![json!({"title": "ship it"})]);
        let result = fx
            .router
            .dispatch(CMD_TASKS, list.to_bytes().unwrap(), &sender)
            .await;

        assert_eq!(result, CommandResult::Success);
        assert!(rx_sender.try_recv().is_err());
        for rx in [&mut rx_other, &mut rx_third] {
            match rx.try_recv().unwrap() {
                Message::Request { command, data } => {
                    assert_eq!(command, CMD_TASKS);
                    assert_eq!(TaskList::from_bytes(&data).unwrap(), list);
                }
                other => panic!("unexpected {:?}", other),
            }
            assert!(rx.try_recv().is_err());
        }
        assert_eq!(fx.core.tasks().snapshot().await, list);
    }

    #[tokio::test]
    async fn test_invalid_task_list_changes_nothing() {
        let fx = fixture().await;
        let (sender, _rx) = connect(&fx.core).await;
        let (_other, mut rx_other) = connect(&fx.core).await;

        let result = fx
            .router
            .dispatch(CMD_TASKS, b"{\"oops\":1}".to_vec(), &sender)
            .await;

        assert_eq!(result, CommandResult::Failure);
        assert!(fx.core.tasks().snapshot().await.is_empty());
        assert!(rx_other.try_recv().is_err());
        assert!(!fx.core.tasks().path().exists());
    }

    #[tokio::test]
    async fn test_unpersisted_tasks_are_not_broadcast() {
        let fx = fixture().await;
        let (sender, _rx) = connect(&fx.core).await;
        let (_other, mut rx_other) = connect(&fx.core).await;

        let path = fx.core.tasks().path().to_path_buf();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("blocker"), b"x").unwrap();

        let list = TaskList::new(vec![json!(1)]);
        let result = fx
            .router
            .dispatch(CMD_TASKS, list.to_bytes().unwrap(), &sender)
            .await;

        assert_eq!(result, CommandResult::Failure);
        assert!(rx_other.try_recv().is_err());
        assert!(fx.core.tasks().snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_backup_batch() {
        let fx = fixture().await;
        let (caller, _rx) = connect(&fx.core).await;
        let batch = BackupBatch::new(vec![
            FileRecord::new("a.txt", vec![1, 2, 3]),
            FileRecord::new("b.txt", vec![]),
        ]);

        let result = fx
            .router
            .dispatch(CMD_BACKUP, batch.to_bytes().unwrap(), &caller)
            .await;

        assert_eq!(result, CommandResult::Success);
        let dir = fx.core.backup().dir();
        assert_eq!(std::fs::read(dir.join("a.txt")).unwrap(), vec![1, 2, 3]);
        assert!(std::fs::read(dir.join("b.txt")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backup_batch_over_limit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::in_dir(dir.path());
        config.limits.max_batch_files = 1;
        let (core, _) = ServerCore::open(&config).await.unwrap();
        let router = core.router();
        let (caller, _rx) = connect(&core).await;

        let batch = BackupBatch::new(vec![
            FileRecord::new("a.txt", vec![1]),
            FileRecord::new("b.txt", vec![2]),
        ]);
        let result = router
            .dispatch(CMD_BACKUP, batch.to_bytes().unwrap(), &caller)
            .await;

        assert_eq!(result, CommandResult::Failure);
        assert!(!core.backup().dir().exists());
    }

    #[tokio::test]
    async fn test_unknown_command_leaves_state_alone() {
        let fx = fixture().await;
        let (caller, mut rx) = connect(&fx.core).await;

        let result = fx
            .router
            .dispatch("delete_everything", b"[]".to_vec(), &caller)
            .await;

        assert_eq!(result.status(), Status::Error);
        assert!(rx.try_recv().is_err());
        assert!(fx.core.tasks().snapshot().await.is_empty());
        assert!(!fx.core.backup().dir().exists());
        assert_eq!(fx.core.credentials().len().await, 1);
    }
}
