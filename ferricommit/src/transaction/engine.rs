//! The transaction state machine.
//!
//! Classic mode:
//!
//! ```text
//! Idle -> CheckpointCreated -> Applying -> Applied -> Committed ---------> Cleanup
//!  |                              |           |
//!  |                              |           +-> RollingBack -> RolledBackDryRun -> Cleanup
//!  |                              +-> RollingBack -> RolledBackOnError -----------> Cleanup
//!  +-> Failed                          (rollback error) -> Failed
//! ```
//!
//! Light mode is `Idle -> Applying -> Applied | Failed`.
//!
//! Every device call, caller commands and checkpoint operations alike, is
//! bounded by `command_timeout`. The cancel token is raced while creating the
//! safety checkpoint and while applying. Recovery and cleanup calls observe
//! the timeout only: a cancelled transaction still rolls back.
//!
//! The engine holds `&mut` to its channel, so a session can never carry two
//! transactions at once. Engines for different devices share nothing and
//! can run in parallel.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use log::{debug, trace, warn};
use tokio_util::sync::CancellationToken;

use super::detect::{self, PromptTracker};
use super::{
    Capability, ChangeResult, Mode, Outcome, State, TransactionConfig, TransactionReport,
    TransactionRequest, TransactionResult,
};
use crate::channel::{CommandChannel, Response};
use crate::checkpoint::{
    Checkpoint, CheckpointEntry, CheckpointNamer, CheckpointStore, SrosCheckpoints, expired,
};
use crate::error::{ChannelError, CheckpointError, Error, ErrorKind, Result, TransactionError};

/// Runs configuration transactions against one device session.
pub struct TransactionEngine<'a, C, S = SrosCheckpoints> {
    channel: &'a mut C,
    capability: Capability<S>,
    config: TransactionConfig,
    namer: CheckpointNamer,
    cancel: CancellationToken,
}

impl<'a, C: CommandChannel> TransactionEngine<'a, C, SrosCheckpoints> {
    /// Create an engine for an SR OS device, choosing the capability from
    /// `config.mode`.
    pub fn from_config(channel: &'a mut C, config: TransactionConfig) -> Result<Self> {
        let capability = match config.mode {
            Mode::Classic => Capability::Checkpoint(SrosCheckpoints),
            Mode::Light => Capability::Absent,
        };
        Self::new(channel, capability, config)
    }
}

impl<'a, C, S> TransactionEngine<'a, C, S>
where
    C: CommandChannel,
    S: CheckpointStore,
{
    /// Create an engine.
    ///
    /// Fails with [`Error::InvalidConfig`] if the configuration is invalid
    /// or `config.mode` disagrees with `capability`.
    pub fn new(
        channel: &'a mut C,
        capability: Capability<S>,
        config: TransactionConfig,
    ) -> Result<Self> {
        config.validate()?;
        if capability.mode() != config.mode {
            return Err(Error::InvalidConfig {
                message: format!(
                    "mode is '{}' but the device capability is '{}'",
                    config.mode,
                    capability.mode()
                ),
            });
        }

        let namer = match &config.instance_id {
            Some(id) => {
                CheckpointNamer::with_instance(config.checkpoint_prefix.clone(), id.clone())
            }
            None => CheckpointNamer::new(config.checkpoint_prefix.clone()),
        };
        debug!(
            "checkpoint prefix {:?}, instance {:?}",
            namer.prefix(),
            namer.instance()
        );

        Ok(Self {
            channel,
            capability,
            config,
            namer,
            cancel: CancellationToken::new(),
        })
    }

    /// Use `token` to cancel transactions run by this engine.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Replace the checkpoint namer. Its prefix should match the configured one,
    /// otherwise retention will not recognize the checkpoints it names.
    pub fn with_namer(mut self, namer: CheckpointNamer) -> Self {
        self.namer = namer;
        self
    }

    /// Get the capability mode.
    pub fn mode(&self) -> Mode {
        self.capability.mode()
    }

    /// Get the configuration.
    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Get the namer, whose instance token marks the checkpoints this engine
    /// may reclaim.
    pub fn namer(&self) -> &CheckpointNamer {
        &self.namer
    }

    /// Get a handle that cancels this engine's transactions.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one rollout request.
    ///
    /// Commands are sent strictly in order, one at a time, stopping at the
    /// first failure. On success the report carries the outcome
    /// (`Committed` or `RolledBackDryRun`), the change result, and any
    /// cleanup warnings. On failure the error carries the outcome reached
    /// and whether the device was left modified.
    pub async fn execute(&mut self, request: &TransactionRequest) -> TransactionResult {
        let mode = self.mode();
        if mode == Mode::Light && (request.want_dry_run || request.want_diff) {
            let wanted = if request.want_dry_run { "dry-run" } else { "diff" };
            return Err(TransactionError::new(
                ErrorKind::UnsupportedInMode,
                format!("{} is not available in {} mode", wanted, mode),
                Outcome::Failed,
            ));
        }

        if self.cancel.is_cancelled() {
            return Err(TransactionError::new(
                ErrorKind::ConfigurationApplyFailed,
                "cancelled before the transaction started",
                Outcome::Failed,
            ));
        }

        let mut log = RunLog::new();
        if request.commands.is_empty() {
            debug!("no commands to apply");
            let outcome = if request.want_dry_run {
                log.enter(State::RolledBackDryRun);
                Outcome::RolledBackDryRun
            } else {
                log.enter(State::Committed);
                Outcome::Committed
            };
            return Ok(log.report(outcome, ChangeResult::unchanged(), None));
        }

        let Self {
            channel,
            capability,
            config,
            namer,
            cancel,
        } = self;

        match capability {
            Capability::Checkpoint(store) => {
                ClassicRun {
                    channel: &mut **channel,
                    store: &*store,
                    config: &*config,
                    namer,
                    cancel: &*cancel,
                    log,
                }
                .execute(request)
                .await
            }
            Capability::Absent => {
                execute_light(&mut **channel, config, cancel, log, request).await
            }
        }
    }

    /// Compare a stored checkpoint with the active configuration and, unless
    /// `dry_run`, revert the device to it.
    ///
    /// A real restore that changed the device saves a commit checkpoint (if
    /// enabled) and enforces retention afterwards. A dry-run touches nothing
    /// and reports `RolledBackDryRun` with the would-be patch.
    pub async fn restore(&mut self, name: &str, dry_run: bool) -> TransactionResult {
        let Self {
            channel,
            capability,
            config,
            namer,
            cancel,
        } = self;

        let Capability::Checkpoint(store) = capability else {
            return Err(TransactionError::new(
                ErrorKind::UnsupportedInMode,
                "restore is not available in light mode",
                Outcome::Failed,
            ));
        };

        if cancel.is_cancelled() {
            return Err(TransactionError::new(
                ErrorKind::ConfigurationApplyFailed,
                "cancelled before the restore started",
                Outcome::Failed,
            ));
        }

        ClassicRun {
            channel: &mut **channel,
            store: &*store,
            config: &*config,
            namer,
            cancel: &*cancel,
            log: RunLog::new(),
        }
        .restore(name, dry_run)
        .await
    }

    /// List the checkpoints carrying this engine's prefix, oldest first.
    ///
    /// Includes checkpoints named by other instances sharing the prefix;
    /// [`namer`](Self::namer) tells which ones this engine owns.
    pub async fn checkpoints(&mut self) -> Result<Vec<CheckpointEntry>> {
        let Capability::Checkpoint(store) = &self.capability else {
            return Err(TransactionError::new(
                ErrorKind::UnsupportedInMode,
                "checkpoints are not available in light mode",
                Outcome::Failed,
            )
            .into());
        };

        let limit = self.config.command_timeout;
        let entries = tokio::time::timeout(limit, store.list(&mut *self.channel))
            .await
            .map_err(|_| ChannelError::PatternTimeout(limit))??;
        Ok(entries
            .into_iter()
            .filter(|entry| self.namer.shares_prefix(&entry.name))
            .collect())
    }
}

// =============================================================================
// Bookkeeping
// =============================================================================

/// State history, responses, and warnings of one run.
struct RunLog {
    states: Vec<State>,
    responses: Vec<Response>,
    warnings: Vec<String>,
}

impl RunLog {
    fn new() -> Self {
        Self {
            states: vec![State::Idle],
            responses: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn enter(&mut self, state: State) {
        let from = self.states.last().copied().unwrap_or(State::Idle);
        debug!("transaction: {:?} -> {:?}", from, state);
        self.states.push(state);
    }

    fn warn(&mut self, message: String) {
        warn!("transaction: {}", message);
        self.warnings.push(message);
    }

    fn report(
        self,
        outcome: Outcome,
        change: ChangeResult,
        checkpoint: Option<Checkpoint>,
    ) -> TransactionReport {
        TransactionReport {
            outcome,
            change,
            checkpoint,
            responses: self.responses,
            states: self.states,
            warnings: self.warnings,
        }
    }

    fn fail(self, error: TransactionError) -> TransactionError {
        let mut warnings = error.warnings.clone();
        warnings.extend(self.warnings);
        error.with_warnings(warnings)
    }
}

/// Why a bounded device call produced no value.
#[derive(Debug)]
enum Interrupted {
    TimedOut(Duration),
    Cancelled,
    Failed(Error),
}

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interrupted::TimedOut(limit) => write!(f, "no response within {:?}", limit),
            Interrupted::Cancelled => f.write_str("cancelled"),
            Interrupted::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// Run one device call under `limit`, racing `cancel` when one is given.
async fn bounded<T, F>(
    call: F,
    limit: Duration,
    cancel: Option<&CancellationToken>,
) -> std::result::Result<T, Interrupted>
where
    F: Future<Output = Result<T>>,
{
    let timed = async {
        match tokio::time::timeout(limit, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Interrupted::Failed(e)),
            Err(_) => Err(Interrupted::TimedOut(limit)),
        }
    };

    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(Interrupted::Cancelled),
            result = timed => result,
        },
        None => timed.await,
    }
}

/// Why the apply phase stopped.
struct Halt {
    command: Option<String>,
    reason: String,
    /// The command may have reached the device with an unknown effect.
    uncertain: bool,
}

impl Halt {
    fn into_error(self, kind: ErrorKind, detail: String, outcome: Outcome) -> TransactionError {
        let error = TransactionError::new(kind, detail, outcome);
        match self.command {
            Some(command) => error.with_command(command),
            None => error,
        }
    }
}

/// Send `commands` in order, stopping at the first failure.
///
/// Every response (including a rejected one) is recorded in `log`.
async fn apply<C: CommandChannel>(
    channel: &mut C,
    cancel: &CancellationToken,
    limit: Duration,
    commands: &[String],
    log: &mut RunLog,
) -> std::result::Result<(), Halt> {
    for command in commands {
        if cancel.is_cancelled() {
            return Err(Halt {
                command: Some(command.clone()),
                reason: format!("cancelled before sending '{}'", command),
                uncertain: false,
            });
        }

        trace!("applying {:?}", command);
        let response = match bounded(channel.send(command), limit, Some(cancel)).await {
            Ok(response) => response,
            Err(interrupted) => {
                let reason = match interrupted {
                    Interrupted::Cancelled => {
                        format!("cancelled while waiting for '{}'", command)
                    }
                    Interrupted::TimedOut(limit) => {
                        format!("'{}' got no response within {:?}", command, limit)
                    }
                    Interrupted::Failed(e) => format!("'{}' failed: {}", command, e),
                };
                return Err(Halt {
                    command: Some(command.clone()),
                    reason,
                    uncertain: true,
                });
            }
        };

        let failure = response.failure_message.clone();
        log.responses.push(response);
        if let Some(message) = failure {
            return Err(Halt {
                command: Some(command.clone()),
                reason: format!("'{}' rejected: {}", command, message),
                uncertain: false,
            });
        }
    }
    Ok(())
}

// =============================================================================
// Classic mode
// =============================================================================

struct ClassicRun<'e, C, S> {
    channel: &'e mut C,
    store: &'e S,
    config: &'e TransactionConfig,
    namer: &'e mut CheckpointNamer,
    cancel: &'e CancellationToken,
    log: RunLog,
}

impl<C, S> ClassicRun<'_, C, S>
where
    C: CommandChannel,
    S: CheckpointStore,
{
    async fn execute(mut self, request: &TransactionRequest) -> TransactionResult {
        let checkpoint = match self.create_checkpoint(true).await {
            Ok(checkpoint) => checkpoint,
            Err(detail) => {
                self.log.enter(State::Failed);
                return Err(self.log.fail(TransactionError::new(
                    ErrorKind::CheckpointCreationFailed,
                    detail,
                    Outcome::Failed,
                )));
            }
        };
        self.log.enter(State::CheckpointCreated);

        self.log.enter(State::Applying);
        let applied = apply(
            &mut *self.channel,
            self.cancel,
            self.config.command_timeout,
            &request.commands,
            &mut self.log,
        )
        .await;

        if let Err(halt) = applied {
            return self.recover(halt, checkpoint).await;
        }
        self.log.enter(State::Applied);

        let change = self.measure(&checkpoint, request.want_diff).await;

        if request.want_dry_run {
            self.log.enter(State::RollingBack);
            let limit = self.config.command_timeout;
            let reverted =
                bounded(self.store.rollback(&mut *self.channel, &checkpoint.name), limit, None)
                    .await;
            if let Err(e) = reverted {
                self.log.enter(State::Failed);
                let error = TransactionError::new(
                    ErrorKind::RollbackFailed,
                    format!(
                        "dry-run revert to checkpoint {} failed: {}; checkpoint left on device",
                        checkpoint.name, e
                    ),
                    Outcome::Failed,
                )
                .with_changed(true);
                return Err(self.log.fail(error));
            }
            self.log.enter(State::RolledBackDryRun);
            self.cleanup(&checkpoint).await;
            return Ok(self
                .log
                .report(Outcome::RolledBackDryRun, change, Some(checkpoint)));
        }

        self.log.enter(State::Committed);
        if change.changed() {
            self.save_commit_checkpoint().await;
        }
        self.cleanup(&checkpoint).await;
        Ok(self.log.report(Outcome::Committed, change, Some(checkpoint)))
    }

    async fn restore(mut self, name: &str, dry_run: bool) -> TransactionResult {
        let limit = self.config.command_timeout;
        let compared =
            bounded(self.store.diff(&mut *self.channel, name), limit, Some(self.cancel)).await;
        let patch = match compared {
            Ok(patch) => patch,
            Err(Interrupted::Failed(Error::Checkpoint(CheckpointError::NotFound { .. }))) => {
                self.log.enter(State::Failed);
                return Err(self.log.fail(TransactionError::new(
                    ErrorKind::CheckpointMissing,
                    format!("checkpoint {} is not on the device", name),
                    Outcome::Failed,
                )));
            }
            Err(e) => {
                self.log.enter(State::Failed);
                return Err(self.log.fail(TransactionError::new(
                    ErrorKind::ConfigurationApplyFailed,
                    format!("could not compare with checkpoint {}: {}", name, e),
                    Outcome::Failed,
                )));
            }
        };
        let change = ChangeResult::from_patch(patch, true);

        if dry_run {
            self.log.enter(State::RolledBackDryRun);
            return Ok(self.log.report(Outcome::RolledBackDryRun, change, None));
        }

        self.log.enter(State::Applying);
        if change.changed() {
            let reverted =
                bounded(self.store.rollback(&mut *self.channel, name), limit, None).await;
            if let Err(e) = reverted {
                self.log.enter(State::Failed);
                let error = TransactionError::new(
                    ErrorKind::RollbackFailed,
                    format!("revert to checkpoint {} failed: {}", name, e),
                    Outcome::Failed,
                )
                .with_changed(true);
                return Err(self.log.fail(error));
            }
        }
        self.log.enter(State::Applied);
        self.log.enter(State::Committed);
        if change.changed() {
            self.save_commit_checkpoint().await;
        }
        self.log.enter(State::Cleanup);
        self.enforce_retention().await;
        Ok(self.log.report(Outcome::Committed, change, None))
    }

    /// Save a checkpoint under a fresh name, regenerating the name on
    /// collision. Nothing is retried for any other error, a timeout included.
    ///
    /// With `interruptible` set, cancellation aborts the save.
    async fn create_checkpoint(
        &mut self,
        interruptible: bool,
    ) -> std::result::Result<Checkpoint, String> {
        let attempts = self.config.max_name_attempts;
        let limit = self.config.command_timeout;
        let cancel = interruptible.then_some(self.cancel);

        for attempt in 1..=attempts {
            let name = self.namer.next_name();
            let created =
                bounded(self.store.create(&mut *self.channel, &name), limit, cancel).await;
            match created {
                Ok(()) => {
                    debug!("checkpoint {} created", name);
                    return Ok(Checkpoint::new(name));
                }
                Err(Interrupted::Failed(Error::Checkpoint(CheckpointError::NameCollision {
                    ..
                }))) => {
                    debug!(
                        "checkpoint name {} already taken (attempt {}/{})",
                        name, attempt, attempts
                    );
                }
                Err(e) => return Err(format!("could not create checkpoint {}: {}", name, e)),
            }
        }
        Err(format!(
            "no free checkpoint name after {} attempts",
            attempts
        ))
    }

    /// Revert after a failed apply.
    async fn recover(mut self, halt: Halt, checkpoint: Checkpoint) -> TransactionResult {
        warn!(
            "transaction: {}; reverting to checkpoint {}",
            halt.reason, checkpoint.name
        );
        self.log.enter(State::RollingBack);

        let limit = self.config.command_timeout;
        let reverted =
            bounded(self.store.rollback(&mut *self.channel, &checkpoint.name), limit, None).await;
        if let Err(e) = reverted {
            self.log.enter(State::Failed);
            let detail = format!(
                "{}; revert to checkpoint {} failed: {}; checkpoint left on device",
                halt.reason, checkpoint.name, e
            );
            let error = halt
                .into_error(ErrorKind::RollbackFailed, detail, Outcome::Failed)
                .with_changed(true);
            return Err(self.log.fail(error));
        }

        self.log.enter(State::RolledBackOnError);
        self.cleanup(&checkpoint).await;

        let detail = format!(
            "{}; reverted to checkpoint {}",
            halt.reason, checkpoint.name
        );
        let error = halt.into_error(
            ErrorKind::ConfigurationApplyFailed,
            detail,
            Outcome::RolledBackOnError,
        );
        Err(self.log.fail(error))
    }

    /// Compare the device with the safety checkpoint.
    ///
    /// If the device cannot compare, the commands were still applied, so the
    /// transaction is reported as changed.
    async fn measure(&mut self, checkpoint: &Checkpoint, want_diff: bool) -> ChangeResult {
        let limit = self.config.command_timeout;
        let delta = detect::checkpoint_delta(self.store, &mut *self.channel, checkpoint, want_diff);
        match bounded(delta, limit, None).await {
            Ok(change) => change,
            Err(e) => {
                self.log.warn(format!(
                    "could not compare with checkpoint {}: {}",
                    checkpoint.name, e
                ));
                ChangeResult::new(true, None)
            }
        }
    }

    /// Save the committed configuration as the new retention baseline.
    async fn save_commit_checkpoint(&mut self) {
        if !self.config.save_on_commit {
            return;
        }
        match self.create_checkpoint(false).await {
            Ok(checkpoint) => debug!("commit checkpoint {} saved", checkpoint.name),
            Err(detail) => self.log.warn(format!("commit checkpoint not saved: {}", detail)),
        }
    }

    /// Delete the safety checkpoint, then trim old checkpoints.
    async fn cleanup(&mut self, checkpoint: &Checkpoint) {
        self.log.enter(State::Cleanup);
        let limit = self.config.command_timeout;
        let deleted =
            bounded(self.store.delete(&mut *self.channel, &checkpoint.name), limit, None).await;
        if let Err(e) = deleted {
            self.log.warn(format!(
                "could not delete checkpoint {}: {}",
                checkpoint.name, e
            ));
            return;
        }
        self.enforce_retention().await;
    }

    /// Trim this instance's checkpoints down to `retention_count`.
    ///
    /// Checkpoints named by other instances are left alone, even under the
    /// same prefix.
    async fn enforce_retention(&mut self) {
        let limit = self.config.command_timeout;
        let entries = match bounded(self.store.list(&mut *self.channel), limit, None).await {
            Ok(entries) => entries,
            Err(e) => {
                self.log.warn(format!("could not list checkpoints for retention: {}", e));
                return;
            }
        };

        let doomed: Vec<String> = expired(&entries, &*self.namer, self.config.retention_count)
            .into_iter()
            .map(|entry| entry.name.clone())
            .collect();
        for name in doomed {
            debug!("retention: deleting checkpoint {}", name);
            let deleted = bounded(self.store.delete(&mut *self.channel, &name), limit, None).await;
            if let Err(e) = deleted {
                self.log
                    .warn(format!("retention could not delete checkpoint {}: {}", name, e));
            }
        }
    }
}

// =============================================================================
// Light mode
// =============================================================================

async fn execute_light<C: CommandChannel>(
    channel: &mut C,
    config: &TransactionConfig,
    cancel: &CancellationToken,
    mut log: RunLog,
    request: &TransactionRequest,
) -> TransactionResult {
    let mut tracker = PromptTracker::new(config.change_indicator.as_str());
    let limit = config.command_timeout;

    match bounded(channel.read_prompt(), limit, Some(cancel)).await {
        Ok(prompt) => tracker.record_before(&prompt),
        Err(e) => {
            log.enter(State::Failed);
            return Err(log.fail(TransactionError::new(
                ErrorKind::ConfigurationApplyFailed,
                format!("could not read the prompt before applying: {}", e),
                Outcome::Failed,
            )));
        }
    }
    if tracker.modified_before() {
        log.warn(
            "device already had unsaved changes; the change flag cannot tell them apart"
                .to_string(),
        );
    }

    log.enter(State::Applying);
    let applied = apply(&mut *channel, cancel, limit, &request.commands, &mut log).await;
    for response in &log.responses {
        tracker.observe(&response.prompt);
    }

    match applied {
        Ok(()) => {
            match bounded(channel.read_prompt(), limit, None).await {
                Ok(prompt) => tracker.observe(&prompt),
                Err(e) => log.warn(format!("could not read the prompt after applying: {}", e)),
            }
            log.enter(State::Applied);
            let change = ChangeResult::new(tracker.changed(), None);
            Ok(log.report(Outcome::Committed, change, None))
        }
        Err(halt) => {
            log.enter(State::Failed);
            let partial = halt.uncertain || log.responses.iter().any(Response::is_success);
            let detail = format!(
                "{}; no checkpoint in light mode, earlier commands stay applied",
                halt.reason
            );
            let error = halt
                .into_error(ErrorKind::ConfigurationApplyFailed, detail, Outcome::Failed)
                .with_changed(tracker.changed() || partial);
            Err(log.fail(error))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Severity;
    use crate::testing::SimulatedRouter;

    fn classic() -> TransactionConfig {
        TransactionConfig::default()
    }

    fn light() -> TransactionConfig {
        TransactionConfig::default().with_mode(Mode::Light)
    }

    fn owned(router: &SimulatedRouter) -> Vec<String> {
        router
            .checkpoint_names()
            .into_iter()
            .filter(|name| name.starts_with("ferricommit-"))
            .collect()
    }

    #[tokio::test]
    async fn test_commit_with_diff() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut router = SimulatedRouter::new();

        let report = {
            let mut engine = TransactionEngine::from_config(&mut router, classic()).unwrap();
            let request = TransactionRequest::new(["set A=1", "set B=2"]).with_diff(true);
            engine.execute(&request).await.unwrap()
        };

        assert_eq!(report.outcome, Outcome::Committed);
        assert!(report.changed());
        let diff = report.diff().unwrap();
        assert!(diff.contains("+   A=1"));
        assert!(diff.contains("+   B=2"));
        assert_eq!(report.responses.len(), 2);
        assert!(report.warnings.is_empty());
        assert_eq!(
            report.states,
            vec![
                State::Idle,
                State::CheckpointCreated,
                State::Applying,
                State::Applied,
                State::Committed,
                State::Cleanup,
            ]
        );

        // Safety checkpoint gone, commit checkpoint kept
        let safety = report.checkpoint.unwrap();
        let remaining = owned(&router);
        assert!(!remaining.contains(&safety.name));
        assert_eq!(remaining.len(), 1);
        assert_eq!(router.value("A"), Some("1"));
        assert_eq!(router.value("B"), Some("2"));
    }

    #[tokio::test]
    async fn test_exactly_one_safety_checkpoint_per_transaction() {
        let mut router = SimulatedRouter::new();
        {
            let config = classic().with_save_on_commit(false);
            let mut engine = TransactionEngine::from_config(&mut router, config).unwrap();
            engine
                .execute(&TransactionRequest::new(["set A=1"]))
                .await
                .unwrap();
        }

        assert_eq!(router.sent_matching("admin rollback save"), 1);
        assert_eq!(router.sent_matching("admin rollback delete"), 1);
        assert!(owned(&router).is_empty());
    }

    #[tokio::test]
    async fn test_second_of_three_fails_restores_initial_state() {
        let mut router = SimulatedRouter::new().with_config(&[("A", "0"), ("B", "0")]);
        let initial = router.config().clone();

        let err = {
            let mut engine = TransactionEngine::from_config(&mut router, classic()).unwrap();
            let request = TransactionRequest::new(["set A=1", "bogus", "set C=3"]);
            engine.execute(&request).await.unwrap_err()
        };

        assert_eq!(err.kind, ErrorKind::ConfigurationApplyFailed);
        assert_eq!(err.outcome, Outcome::RolledBackOnError);
        assert_eq!(err.offending_command.as_deref(), Some("bogus"));
        assert!(!err.changed);
        assert_eq!(err.severity(), Severity::Recoverable);
        assert_eq!(router.config(), &initial);
        assert_eq!(router.sent_matching("set C"), 0);
        assert!(owned(&router).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_command_leaves_no_partial_change() {
        let mut router = SimulatedRouter::new();

        let err = {
            let mut engine = TransactionEngine::from_config(&mut router, classic()).unwrap();
            let request = TransactionRequest::new(["set A=1", "invalid-command"]);
            engine.execute(&request).await.unwrap_err()
        };

        assert_eq!(err.outcome, Outcome::RolledBackOnError);
        assert_eq!(err.offending_command.as_deref(), Some("invalid-command"));
        assert!(err.detail.contains("Bad Command"));
        assert_eq!(router.value("A"), None);
    }

    #[tokio::test]
    async fn test_dry_run_is_idempotent() {
        let mut router = SimulatedRouter::new().with_config(&[("A", "0")]);
        let initial = router.config().clone();

        let (first, second) = {
            let mut engine = TransactionEngine::from_config(&mut router, classic()).unwrap();
            let request = TransactionRequest::new(["set A=1"])
                .with_dry_run(true)
                .with_diff(true);
            let first = engine.execute(&request).await.unwrap();
            let second = engine.execute(&request).await.unwrap();
            (first, second)
        };

        assert_eq!(first.outcome, Outcome::RolledBackDryRun);
        assert_eq!(second.outcome, Outcome::RolledBackDryRun);
        assert!(first.changed());
        assert_eq!(first.changed(), second.changed());
        assert_eq!(first.diff(), Some("-   A=0\n+   A=1"));
        assert_eq!(first.diff(), second.diff());
        assert_eq!(router.config(), &initial);
        assert!(router.checkpoint_names().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_without_change() {
        let mut router = SimulatedRouter::new().with_config(&[("A", "0")]);
        let mut engine = TransactionEngine::from_config(&mut router, classic()).unwrap();
        let request = TransactionRequest::new(["set A=0"]).with_dry_run(true);

        let report = engine.execute(&request).await.unwrap();
        assert!(!report.changed());
        assert!(report.diff().is_none());
    }

    #[tokio::test]
    async fn test_retention_keeps_one_own_checkpoint() {
        let mut router = SimulatedRouter::new().with_checkpoint("operator-backup");

        {
            let mut engine = TransactionEngine::from_config(&mut router, classic()).unwrap();
            for value in 1..=4 {
                let command = format!("set A={}", value);
                let report = engine
                    .execute(&TransactionRequest::new([command]))
                    .await
                    .unwrap();
                assert!(report.warnings.is_empty(), "{:?}", report.warnings);
            }
        }

        assert_eq!(owned(&router).len(), 1);
        assert!(
            router
                .checkpoint_names()
                .contains(&"operator-backup".to_string())
        );
    }

    #[tokio::test]
    async fn test_zero_retention_removes_everything_owned() {
        let mut router = SimulatedRouter::new();
        {
            let config = classic().with_retention_count(0);
            let mut engine = TransactionEngine::from_config(&mut router, config).unwrap();
            engine
                .execute(&TransactionRequest::new(["set A=1"]))
                .await
                .unwrap();
        }
        assert!(owned(&router).is_empty());
    }

    #[tokio::test]
    async fn test_retention_spares_other_instances() {
        let foreign = "ferricommit-0000000000001-bbbb0002-0001";
        let mut router = SimulatedRouter::new().with_checkpoint(foreign);

        {
            let config = classic().with_instance_id("aaaa0001");
            let mut engine = TransactionEngine::from_config(&mut router, config).unwrap();
            assert_eq!(engine.namer().instance(), "aaaa0001");
            for value in 1..=3 {
                let command = format!("set A={}", value);
                engine
                    .execute(&TransactionRequest::new([command]))
                    .await
                    .unwrap();
            }
        }

        let names = router.checkpoint_names();
        assert!(names.contains(&foreign.to_string()));
        let mine: Vec<&String> = names.iter().filter(|n| n.contains("-aaaa0001-")).collect();
        assert_eq!(mine.len(), 1);
    }

    #[tokio::test]
    async fn test_pinned_instance_reclaims_previous_run() {
        let mut router = SimulatedRouter::new();

        for value in 1..=3 {
            let config = classic().with_instance_id("worker1");
            let mut engine = TransactionEngine::from_config(&mut router, config).unwrap();
            let command = format!("set A={}", value);
            engine
                .execute(&TransactionRequest::new([command]))
                .await
                .unwrap();
        }

        assert_eq!(owned(&router).len(), 1);
    }

    #[tokio::test]
    async fn test_checkpoint_creation_failure_sends_nothing() {
        let mut router = SimulatedRouter::new().fail_on("admin rollback save");

        let err = {
            let mut engine = TransactionEngine::from_config(&mut router, classic()).unwrap();
            engine
                .execute(&TransactionRequest::new(["set A=1"]))
                .await
                .unwrap_err()
        };

        assert_eq!(err.kind, ErrorKind::CheckpointCreationFailed);
        assert_eq!(err.outcome, Outcome::Failed);
        assert!(!err.changed);
        assert_eq!(router.sent_matching("set "), 0);
        assert_eq!(router.value("A"), None);
    }

    #[tokio::test]
    async fn test_name_collision_is_retried() {
        fn frozen() -> u64 {
            42
        }
        let taken = "ferricommit-0000000000042-0000beef-0001";
        let mut router = SimulatedRouter::new().with_checkpoint(taken);

        let report = {
            let config = classic().with_save_on_commit(false);
            let mut engine = TransactionEngine::from_config(&mut router, config)
                .unwrap()
                .with_namer(CheckpointNamer::with_clock("ferricommit", "0000beef", frozen));
            engine
                .execute(&TransactionRequest::new(["set A=1"]))
                .await
                .unwrap()
        };

        assert_eq!(
            report.checkpoint.as_ref().map(|c| c.name.as_str()),
            Some("ferricommit-0000000000042-0000beef-0002")
        );
        assert_eq!(router.sent_matching("admin rollback save"), 1);
        assert_eq!(router.checkpoint_names(), vec![taken.to_string()]);
    }

    #[tokio::test]
    async fn test_name_collision_gives_up() {
        fn frozen() -> u64 {
            7
        }
        let mut router = SimulatedRouter::new()
            .with_checkpoint("fc-0000000000007-0000beef-0001")
            .with_checkpoint("fc-0000000000007-0000beef-0002");

        let err = {
            let mut config = classic().with_checkpoint_prefix("fc");
            config.max_name_attempts = 2;
            let mut engine = TransactionEngine::from_config(&mut router, config)
                .unwrap()
                .with_namer(CheckpointNamer::with_clock("fc", "0000beef", frozen));
            engine
                .execute(&TransactionRequest::new(["set A=1"]))
                .await
                .unwrap_err()
        };

        assert_eq!(err.kind, ErrorKind::CheckpointCreationFailed);
        assert_eq!(router.sent_matching("admin rollback save"), 0);
        assert_eq!(router.sent_matching("set "), 0);
    }

    #[tokio::test]
    async fn test_rollback_failure_is_fatal() {
        let mut router = SimulatedRouter::new()
            .with_config(&[("A", "0")])
            .fail_on("admin rollback revert");

        let err = {
            let mut engine = TransactionEngine::from_config(&mut router, classic()).unwrap();
            engine
                .execute(&TransactionRequest::new(["set A=1", "bogus"]))
                .await
                .unwrap_err()
        };

        assert_eq!(err.kind, ErrorKind::RollbackFailed);
        assert_eq!(err.outcome, Outcome::Failed);
        assert_eq!(err.severity(), Severity::Fatal);
        assert!(err.changed);
        assert_eq!(err.offending_command.as_deref(), Some("bogus"));

        // Checkpoint kept for manual recovery and named in the error
        let remaining = owned(&router);
        assert_eq!(remaining.len(), 1);
        assert!(err.detail.contains(&remaining[0]));

        // Manual recovery from the kept checkpoint
        router.clear_failures();
        SrosCheckpoints
            .rollback(&mut router, &remaining[0])
            .await
            .unwrap();
        assert_eq!(router.value("A"), Some("0"));
    }

    #[tokio::test]
    async fn test_dry_run_revert_failure_is_fatal() {
        let mut router = SimulatedRouter::new().fail_on("admin rollback revert");

        let err = {
            let mut engine = TransactionEngine::from_config(&mut router, classic()).unwrap();
            let request = TransactionRequest::new(["set A=1"]).with_dry_run(true);
            engine.execute(&request).await.unwrap_err()
        };

        assert_eq!(err.kind, ErrorKind::RollbackFailed);
        assert!(err.changed);
        assert_eq!(router.value("A"), Some("1"));
    }

    #[tokio::test]
    async fn test_cleanup_failure_is_only_a_warning() {
        let mut router = SimulatedRouter::new().fail_on("admin rollback delete");

        let report = {
            let mut engine = TransactionEngine::from_config(&mut router, classic()).unwrap();
            engine
                .execute(&TransactionRequest::new(["set A=1"]))
                .await
                .unwrap()
        };

        assert_eq!(report.outcome, Outcome::Committed);
        assert!(report.changed());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("could not delete"));
    }

    #[tokio::test]
    async fn test_cleanup_warning_does_not_replace_apply_failure() {
        let mut router = SimulatedRouter::new().fail_on("admin rollback delete");

        let err = {
            let mut engine = TransactionEngine::from_config(&mut router, classic()).unwrap();
            engine
                .execute(&TransactionRequest::new(["bogus"]))
                .await
                .unwrap_err()
        };

        assert_eq!(err.kind, ErrorKind::ConfigurationApplyFailed);
        assert_eq!(err.outcome, Outcome::RolledBackOnError);
        assert_eq!(err.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_command_timeout_rolls_back() {
        let mut router = SimulatedRouter::new()
            .with_config(&[("A", "0")])
            .hang_on("set B");

        let err = {
            let config = classic().with_command_timeout(Duration::from_millis(50));
            let mut engine = TransactionEngine::from_config(&mut router, config).unwrap();
            engine
                .execute(&TransactionRequest::new(["set A=1", "set B=2"]))
                .await
                .unwrap_err()
        };

        assert_eq!(err.kind, ErrorKind::ConfigurationApplyFailed);
        assert_eq!(err.outcome, Outcome::RolledBackOnError);
        assert_eq!(err.offending_command.as_deref(), Some("set B=2"));
        assert!(err.detail.contains("no response"));
        assert_eq!(router.value("A"), Some("0"));
    }

    #[tokio::test]
    async fn test_checkpoint_save_timeout_sends_nothing() {
        let mut router = SimulatedRouter::new().hang_on("admin rollback save");

        let err = {
            let config = classic().with_command_timeout(Duration::from_millis(50));
            let mut engine = TransactionEngine::from_config(&mut router, config).unwrap();
            let request = TransactionRequest::new(["set A=1"]);
            let run = engine.execute(&request);
            let result = tokio::time::timeout(Duration::from_secs(2), run)
                .await
                .expect("save is bounded");
            tokio_test::assert_err!(result)
        };

        assert_eq!(err.kind, ErrorKind::CheckpointCreationFailed);
        assert_eq!(err.outcome, Outcome::Failed);
        assert!(err.detail.contains("no response"));
        assert!(!err.changed);
        assert_eq!(router.sent_matching("admin rollback save"), 1);
        assert_eq!(router.sent_matching("set "), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_checkpoint_save_sends_nothing() {
        let mut router = SimulatedRouter::new().hang_on("admin rollback save");
        let token = CancellationToken::new();

        let result = {
            let mut engine = TransactionEngine::from_config(&mut router, classic())
                .unwrap()
                .with_cancel(token.clone());
            let request = TransactionRequest::new(["set A=1"]);
            let (result, _) = tokio::join!(engine.execute(&request), async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                token.cancel();
            });
            result
        };

        let err = tokio_test::assert_err!(result);
        assert_eq!(err.kind, ErrorKind::CheckpointCreationFailed);
        assert!(err.detail.contains("cancelled"));
        assert_eq!(router.sent_matching("set "), 0);
    }

    #[tokio::test]
    async fn test_rollback_timeout_is_fatal() {
        let mut router = SimulatedRouter::new()
            .with_config(&[("A", "0")])
            .hang_on("admin rollback revert");

        let err = {
            let config = classic().with_command_timeout(Duration::from_millis(50));
            let mut engine = TransactionEngine::from_config(&mut router, config).unwrap();
            let request = TransactionRequest::new(["set A=1", "bogus"]);
            let run = engine.execute(&request);
            let result = tokio::time::timeout(Duration::from_secs(2), run)
                .await
                .expect("revert is bounded");
            tokio_test::assert_err!(result)
        };

        assert_eq!(err.kind, ErrorKind::RollbackFailed);
        assert_eq!(err.outcome, Outcome::Failed);
        assert_eq!(err.severity(), Severity::Fatal);
        assert!(err.changed);
        assert!(err.detail.contains("no response"));
        assert_eq!(err.offending_command.as_deref(), Some("bogus"));
        assert_eq!(router.value("A"), Some("1"));
        assert_eq!(owned(&router).len(), 1);
    }

    #[tokio::test]
    async fn test_compare_timeout_counts_as_changed() {
        let mut router = SimulatedRouter::new().hang_on("admin rollback compare");

        let report = {
            let config = classic().with_command_timeout(Duration::from_millis(50));
            let mut engine = TransactionEngine::from_config(&mut router, config).unwrap();
            let request = TransactionRequest::new(["set A=1"]).with_diff(true);
            engine.execute(&request).await.unwrap()
        };

        assert_eq!(report.outcome, Outcome::Committed);
        assert!(report.changed());
        assert!(report.diff().is_none());
        assert!(report.warnings[0].contains("could not compare"));
        assert_eq!(router.value("A"), Some("1"));
    }

    #[tokio::test]
    async fn test_cancel_mid_transaction_rolls_back() {
        let mut router = SimulatedRouter::new()
            .with_config(&[("A", "0")])
            .hang_on("set B");
        let token = CancellationToken::new();

        let result = {
            let mut engine = TransactionEngine::from_config(&mut router, classic())
                .unwrap()
                .with_cancel(token.clone());
            let request = TransactionRequest::new(["set A=1", "set B=2"]);
            let (result, _) = tokio::join!(engine.execute(&request), async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                token.cancel();
            });
            result
        };

        let err = result.unwrap_err();
        assert_eq!(err.outcome, Outcome::RolledBackOnError);
        assert!(err.detail.contains("cancelled"));
        assert_eq!(router.value("A"), Some("0"));
    }

    #[tokio::test]
    async fn test_cancel_before_start_touches_nothing() {
        let mut router = SimulatedRouter::new();
        let token = CancellationToken::new();
        token.cancel();

        let err = {
            let mut engine = TransactionEngine::from_config(&mut router, classic())
                .unwrap()
                .with_cancel(token);
            engine
                .execute(&TransactionRequest::new(["set A=1"]))
                .await
                .unwrap_err()
        };

        assert_eq!(err.kind, ErrorKind::ConfigurationApplyFailed);
        assert_eq!(err.outcome, Outcome::Failed);
        assert!(router.sent().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_during_apply_escalates() {
        let mut router = SimulatedRouter::new().disconnect_on("set B");

        let err = {
            let mut engine = TransactionEngine::from_config(&mut router, classic()).unwrap();
            engine
                .execute(&TransactionRequest::new(["set A=1", "set B=2"]))
                .await
                .unwrap_err()
        };

        assert_eq!(err.kind, ErrorKind::RollbackFailed);
        assert_eq!(err.offending_command.as_deref(), Some("set B=2"));
        assert!(router.is_closed());
    }

    #[tokio::test]
    async fn test_empty_request_is_a_noop() {
        let mut router = SimulatedRouter::new();
        let report = {
            let mut engine = TransactionEngine::from_config(&mut router, classic()).unwrap();
            engine
                .execute(&TransactionRequest::new(Vec::<String>::new()))
                .await
                .unwrap()
        };

        assert_eq!(report.outcome, Outcome::Committed);
        assert!(!report.changed());
        assert!(report.checkpoint.is_none());
        assert!(router.sent().is_empty());
    }

    #[tokio::test]
    async fn test_empty_dry_run_reports_rolled_back() {
        let mut router = SimulatedRouter::new();
        let report = {
            let mut engine = TransactionEngine::from_config(&mut router, classic()).unwrap();
            let request = TransactionRequest::new(Vec::<String>::new()).with_dry_run(true);
            tokio_test::assert_ok!(engine.execute(&request).await)
        };

        assert_eq!(report.outcome, Outcome::RolledBackDryRun);
        assert_eq!(report.states, vec![State::Idle, State::RolledBackDryRun]);
        assert!(!report.changed());
        assert!(router.sent().is_empty());
    }

    #[tokio::test]
    async fn test_light_rejects_dry_run_and_diff() {
        let mut router = SimulatedRouter::new();
        {
            let mut engine = TransactionEngine::from_config(&mut router, light()).unwrap();
            for request in [
                TransactionRequest::new(["set A=1"]).with_dry_run(true),
                TransactionRequest::new(["set A=1"]).with_diff(true),
            ] {
                let err = engine.execute(&request).await.unwrap_err();
                assert_eq!(err.kind, ErrorKind::UnsupportedInMode);
                assert!(!err.changed);
            }
        }

        assert!(router.sent().is_empty());
        assert_eq!(router.prompt_reads(), 0);
    }

    #[tokio::test]
    async fn test_light_detects_change_from_prompt() {
        let mut router = SimulatedRouter::new();

        let report = {
            let mut engine = TransactionEngine::from_config(&mut router, light()).unwrap();
            engine
                .execute(&TransactionRequest::new(["set A=1"]))
                .await
                .unwrap()
        };

        assert_eq!(report.outcome, Outcome::Committed);
        assert!(report.changed());
        assert!(report.diff().is_none());
        assert!(report.checkpoint.is_none());
        assert_eq!(
            report.states,
            vec![State::Idle, State::Applying, State::Applied]
        );
        assert_eq!(router.sent_matching("admin rollback"), 0);
    }

    #[tokio::test]
    async fn test_light_read_only_commands_are_unchanged() {
        let mut router = SimulatedRouter::new();
        let mut engine = TransactionEngine::from_config(&mut router, light()).unwrap();

        let report = engine
            .execute(&TransactionRequest::new(["show system rollback"]))
            .await
            .unwrap();
        assert!(!report.changed());
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_light_prior_unsaved_changes_count_and_warn() {
        let mut router = SimulatedRouter::new().with_unsaved_changes();
        let mut engine = TransactionEngine::from_config(&mut router, light()).unwrap();

        let report = engine
            .execute(&TransactionRequest::new(["show system rollback"]))
            .await
            .unwrap();
        assert!(report.changed());
        assert_eq!(report.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_light_partial_failure_is_not_rolled_back() {
        let mut router = SimulatedRouter::new();

        let err = {
            let mut engine = TransactionEngine::from_config(&mut router, light()).unwrap();
            engine
                .execute(&TransactionRequest::new(["set A=1", "bogus", "set C=3"]))
                .await
                .unwrap_err()
        };

        assert_eq!(err.kind, ErrorKind::ConfigurationApplyFailed);
        assert_eq!(err.outcome, Outcome::Failed);
        assert_eq!(err.offending_command.as_deref(), Some("bogus"));
        assert!(err.changed);
        assert_eq!(err.severity(), Severity::Degraded);
        assert_eq!(router.value("A"), Some("1"));
        assert_eq!(router.value("C"), None);
    }

    #[tokio::test]
    async fn test_light_timeout_reports_changed() {
        let mut router = SimulatedRouter::new().hang_on("set B");

        let err = {
            let config = light().with_command_timeout(Duration::from_millis(50));
            let mut engine = TransactionEngine::from_config(&mut router, config).unwrap();
            let request = TransactionRequest::new(["set A=1", "set B=2", "set C=3"]);
            engine.execute(&request).await.unwrap_err()
        };

        assert_eq!(err.kind, ErrorKind::ConfigurationApplyFailed);
        assert_eq!(err.outcome, Outcome::Failed);
        assert_eq!(err.offending_command.as_deref(), Some("set B=2"));
        assert!(err.detail.contains("no response"));
        assert!(err.changed);
        assert_eq!(err.severity(), Severity::Degraded);
        assert_eq!(router.value("A"), Some("1"));
        assert_eq!(router.sent_matching("set C"), 0);
        assert_eq!(router.sent_matching("admin rollback"), 0);
    }

    #[tokio::test]
    async fn test_light_cancel_stops_sends() {
        let mut router = SimulatedRouter::new().hang_on("set B");
        let token = CancellationToken::new();

        let result = {
            let mut engine = TransactionEngine::from_config(&mut router, light())
                .unwrap()
                .with_cancel(token.clone());
            let request = TransactionRequest::new(["set A=1", "set B=2", "set C=3"]);
            let (result, _) = tokio::join!(engine.execute(&request), async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                token.cancel();
            });
            result
        };

        let err = tokio_test::assert_err!(result);
        assert_eq!(err.outcome, Outcome::Failed);
        assert_eq!(err.offending_command.as_deref(), Some("set B=2"));
        assert!(err.detail.contains("cancelled"));
        assert!(err.changed);
        assert_eq!(router.sent_matching("set C"), 0);
        assert_eq!(router.sent_matching("admin rollback"), 0);
    }

    #[tokio::test]
    async fn test_light_cancel_before_start_reads_nothing() {
        let mut router = SimulatedRouter::new();
        let token = CancellationToken::new();
        token.cancel();

        let err = {
            let mut engine = TransactionEngine::from_config(&mut router, light())
                .unwrap()
                .with_cancel(token);
            engine
                .execute(&TransactionRequest::new(["set A=1"]))
                .await
                .unwrap_err()
        };

        assert!(!err.changed);
        assert_eq!(router.prompt_reads(), 0);
        assert!(router.sent().is_empty());
    }

    #[tokio::test]
    async fn test_light_first_command_rejected_is_unchanged() {
        let mut router = SimulatedRouter::new();
        let mut engine = TransactionEngine::from_config(&mut router, light()).unwrap();

        let err = engine
            .execute(&TransactionRequest::new(["bogus"]))
            .await
            .unwrap_err();
        assert!(!err.changed);
        assert_eq!(err.severity(), Severity::Recoverable);
    }

    #[tokio::test]
    async fn test_restore_dry_run_then_real() {
        let mut router = SimulatedRouter::new()
            .with_config(&[("A", "0")])
            .with_checkpoint("golden");
        router.send("set A=1").await.unwrap();

        {
            let mut engine = TransactionEngine::from_config(&mut router, classic()).unwrap();

            let preview = engine.restore("golden", true).await.unwrap();
            assert_eq!(preview.outcome, Outcome::RolledBackDryRun);
            assert!(preview.changed());
            assert_eq!(preview.diff(), Some("-   A=0\n+   A=1"));

            let restored = engine.restore("golden", false).await.unwrap();
            assert_eq!(restored.outcome, Outcome::Committed);
            assert!(restored.changed());
        }

        assert_eq!(router.value("A"), Some("0"));
        assert!(router.checkpoint_names().contains(&"golden".to_string()));
        assert_eq!(owned(&router).len(), 1);
    }

    #[tokio::test]
    async fn test_restore_missing_checkpoint() {
        let mut router = SimulatedRouter::new();
        let mut engine = TransactionEngine::from_config(&mut router, classic()).unwrap();

        let err = engine.restore("nope", false).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::CheckpointMissing);
        assert_eq!(err.outcome, Outcome::Failed);
    }

    #[tokio::test]
    async fn test_restore_and_list_unsupported_in_light_mode() {
        let mut router = SimulatedRouter::new().with_checkpoint("golden");
        let mut engine = TransactionEngine::from_config(&mut router, light()).unwrap();

        let err = engine.restore("golden", false).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedInMode);
        assert!(matches!(
            engine.checkpoints().await,
            Err(Error::Transaction(TransactionError {
                kind: ErrorKind::UnsupportedInMode,
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn test_checkpoints_lists_prefix_only() {
        let mut router = SimulatedRouter::new()
            .with_checkpoint("operator-backup")
            .with_checkpoint("ferricommit-0000000000001-0a1b2c3d-0001");
        let mut engine = TransactionEngine::from_config(&mut router, classic()).unwrap();

        let names: Vec<String> = engine
            .checkpoints()
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names, vec!["ferricommit-0000000000001-0a1b2c3d-0001"]);
    }

    #[test]
    fn test_new_rejects_mode_mismatch() {
        let mut router = SimulatedRouter::new();
        let result =
            TransactionEngine::new(&mut router, Capability::<SrosCheckpoints>::Absent, classic());
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));

        let mut router = SimulatedRouter::new();
        let invalid = classic().with_command_timeout(Duration::ZERO);
        assert!(TransactionEngine::from_config(&mut router, invalid).is_err());
    }
}
