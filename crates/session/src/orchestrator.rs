// session/src/orchestrator.rs

use crate::{
    backend::{ChainProvider, Checker, ExecutionBackend, SourceStore},
    events::SessionEvent,
    Address, CallRequest, ChainSnapshot, CheckPolicy, ContractInstance, DeployRequest, Deployment,
    ExecutionError, OperationKind, RunRecord, RunnerOutput, RunnerResult, Selection,
    SessionConfig, SessionError, SessionResult, SourceFile,
};
use chrono::Utc;
use diagnostics::{CheckResult, DiagnosticNotifier, Notification};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, oneshot};

/// External collaborators wired into a session
#[derive(Clone)]
pub struct Collaborators {
    pub checker: Arc<dyn Checker>,
    pub store: Arc<dyn SourceStore>,
    pub backend: Arc<dyn ExecutionBackend>,
    pub chain: Arc<dyn ChainProvider>,
}

/// Result of a save request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The store was updated
    Saved,
    /// Code matched the last persisted version; the store was not called
    Unchanged,
}

/// Handle to an operation that completes asynchronously
#[derive(Debug)]
pub struct Pending<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Pending<T> {
    fn new(rx: oneshot::Receiver<T>) -> Self {
        Self { rx }
    }

    /// Wait for the operation's outcome
    pub async fn wait(self) -> SessionResult<T> {
        self.rx.await.map_err(|_| SessionError::Abandoned)
    }
}

/// Mutable session state, only written through `ContractSession`
#[derive(Debug, Default)]
pub struct SessionState {
    files: BTreeMap<String, SourceFile>,
    contracts: BTreeMap<Address, ContractInstance>,
    selection: Selection,
    is_deploying: bool,
    is_calling: bool,
    checks_in_flight: HashMap<String, usize>,
    history: VecDeque<RunRecord>,
    notifier: DiagnosticNotifier,
}

impl SessionState {
    pub fn file(&self, name: &str) -> Option<&SourceFile> {
        self.files.get(name)
    }

    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.values()
    }

    pub fn contract(&self, address: &str) -> Option<&ContractInstance> {
        self.contracts.get(address)
    }

    pub fn contracts(&self) -> impl Iterator<Item = &ContractInstance> {
        self.contracts.values()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn active_source(&self) -> Option<&SourceFile> {
        self.selection
            .active_source
            .as_deref()
            .and_then(|name| self.files.get(name))
    }

    pub fn active_contract(&self) -> Option<&ContractInstance> {
        self.selection
            .active_contract
            .as_deref()
            .and_then(|address| self.contracts.get(address))
    }

    pub fn is_deploying(&self) -> bool {
        self.is_deploying
    }

    pub fn is_calling(&self) -> bool {
        self.is_calling
    }

    pub fn is_checking(&self, name: &str) -> bool {
        self.checks_in_flight.get(name).copied().unwrap_or(0) > 0
    }

    pub fn history(&self) -> impl Iterator<Item = &RunRecord> {
        self.history.iter()
    }

    pub fn notifier(&self) -> &DiagnosticNotifier {
        &self.notifier
    }

    fn release(&mut self, flight: &Flight) {
        match flight {
            Flight::Busy(OperationKind::Deploy) => self.is_deploying = false,
            Flight::Busy(OperationKind::Call) => self.is_calling = false,
            Flight::Check(name) => {
                if let Some(count) = self.checks_in_flight.get_mut(name) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        self.checks_in_flight.remove(name);
                    }
                }
            }
        }
    }

    fn record(&mut self, record: RunRecord, limit: usize) {
        self.history.push_back(record);
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }
}

#[derive(Debug, Clone)]
enum Flight {
    Busy(OperationKind),
    Check(String),
}

/// Releases an in-flight marker even if the task driving it dies.
struct FlightGuard {
    shared: Arc<Shared>,
    flight: Option<Flight>,
}

impl FlightGuard {
    fn new(shared: Arc<Shared>, flight: Flight) -> Self {
        Self {
            shared,
            flight: Some(flight),
        }
    }

    /// Release under a lock the caller already holds
    fn complete(mut self, state: &mut SessionState) {
        if let Some(flight) = self.flight.take() {
            state.release(&flight);
        }
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if let Some(flight) = self.flight.take() {
            tracing::warn!("{:?} ended without completing; releasing", flight);
            lock_state(&self.shared).release(&flight);
        }
    }
}

struct Shared {
    config: SessionConfig,
    collaborators: Collaborators,
    state: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

fn lock_state(shared: &Shared) -> MutexGuard<'_, SessionState> {
    shared.state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single authority over the contract development session.
///
/// Cloning is cheap; all clones share one state. Operations that reach an
/// external collaborator run on spawned Tokio tasks and must be started from
/// within a Tokio runtime.
#[derive(Clone)]
pub struct ContractSession {
    shared: Arc<Shared>,
}

impl ContractSession {
    pub fn new(config: SessionConfig, collaborators: Collaborators) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            shared: Arc::new(Shared {
                config,
                collaborators,
                state: Mutex::new(SessionState::default()),
                events,
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Receive session change events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Read session state under the lock
    pub fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(&self.lock())
    }

    /// Current chain snapshot from the provider
    pub fn chain(&self) -> ChainSnapshot {
        self.shared.collaborators.chain.snapshot()
    }

    // ==================== SOURCE FILES ====================

    /// Populate the session from the source store
    pub async fn load_workspace(&self) -> SessionResult<usize> {
        let sources = self.shared.collaborators.store.load_all().await?;
        let count = sources.len();

        let added: Vec<String> = {
            let mut state = self.lock();
            sources
                .into_iter()
                .filter_map(|(name, code)| {
                    let is_new = !state.files.contains_key(&name);
                    state
                        .files
                        .insert(name.clone(), SourceFile::persisted(name.clone(), code));
                    is_new.then_some(name)
                })
                .collect()
        };

        for name in added {
            self.emit(SessionEvent::SourceAdded { name });
        }
        tracing::info!("Loaded {} source files", count);
        Ok(count)
    }

    pub fn add_source(&self, name: &str, code: impl Into<String>) -> SessionResult<()> {
        {
            let mut state = self.lock();
            if state.files.contains_key(name) {
                return Err(SessionError::DuplicateSource(name.to_string()));
            }
            state
                .files
                .insert(name.to_string(), SourceFile::new(name, code));
        }
        self.emit(SessionEvent::SourceAdded {
            name: name.to_string(),
        });
        Ok(())
    }

    pub fn remove_source(&self, name: &str) -> SessionResult<SourceFile> {
        let (removed, deselected) = {
            let mut state = self.lock();
            let removed = state
                .files
                .remove(name)
                .ok_or_else(|| SessionError::UnknownSource(name.to_string()))?;
            let deselected = state.selection.active_source.as_deref() == Some(name);
            if deselected {
                state.selection.active_source = None;
            }
            (removed, deselected)
        };

        self.emit(SessionEvent::SourceRemoved {
            name: name.to_string(),
        });
        if deselected {
            self.emit(SessionEvent::SelectionChanged);
        }
        Ok(removed)
    }

    /// Replace a file's in-memory code
    pub fn edit(&self, name: &str, code: impl Into<String>) -> SessionResult<()> {
        let mut state = self.lock();
        let file = state
            .files
            .get_mut(name)
            .ok_or_else(|| SessionError::UnknownSource(name.to_string()))?;
        file.code = code.into();
        Ok(())
    }

    /// Send a file's current code to the checker.
    ///
    /// On completion the file's `error` reflects the result and the result is
    /// queued for notification.
    pub fn check(&self, name: &str) -> SessionResult<Pending<CheckResult>> {
        let (code, guard) = {
            let mut state = self.lock();
            let code = state
                .files
                .get(name)
                .map(|file| file.code.clone())
                .ok_or_else(|| SessionError::UnknownSource(name.to_string()))?;

            if state.is_checking(name) && self.shared.config.check_policy == CheckPolicy::Reject {
                tracing::debug!("Rejecting duplicate check of {}", name);
                return Err(SessionError::CheckInFlight(name.to_string()));
            }

            *state.checks_in_flight.entry(name.to_string()).or_insert(0) += 1;
            let guard = FlightGuard::new(self.shared.clone(), Flight::Check(name.to_string()));
            (code, guard)
        };

        tracing::info!("Checking {}", name);

        let (tx, rx) = oneshot::channel();
        let session = self.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            let result = session.shared.collaborators.checker.check(&code).await;
            session.finish_check(guard, &name, &result);
            let _ = tx.send(result);
        });

        Ok(Pending::new(rx))
    }

    fn finish_check(&self, guard: FlightGuard, name: &str, result: &CheckResult) {
        let shown = {
            let mut state = self.lock();
            guard.complete(&mut state);

            match state.files.get_mut(name) {
                Some(file) => file.error = result.to_error(),
                None => tracing::warn!("{} was removed before its check returned", name),
            }

            let before = state.notifier.visible().map(|n| n.key);
            let after = state
                .notifier
                .on_check_result(result.clone())
                .map(|n| n.key);
            after.filter(|key| Some(*key) != before)
        };

        if result.is_success() {
            tracing::info!("✓ {} checked", name);
        } else {
            tracing::info!(
                "{} failed checking with {} diagnostics",
                name,
                result.diagnostics().len()
            );
        }

        self.emit(SessionEvent::SourceChecked {
            name: name.to_string(),
            success: result.is_success(),
        });
        if let Some(key) = shown {
            self.emit(SessionEvent::NotificationShown { key });
        }
    }

    /// Persist `code` as the file's contents if it differs from what was
    /// last persisted.
    ///
    /// On failure the file stays dirty and the error is returned; nothing is
    /// retried.
    pub async fn save(&self, name: &str, code: impl Into<String>) -> SessionResult<SaveOutcome> {
        let code = code.into();
        {
            let mut state = self.lock();
            let file = state
                .files
                .get_mut(name)
                .ok_or_else(|| SessionError::UnknownSource(name.to_string()))?;
            file.code = code.clone();
            if !file.is_dirty() {
                tracing::debug!("{} unchanged, skipping save", name);
                return Ok(SaveOutcome::Unchanged);
            }
        }

        match self.shared.collaborators.store.update(name, &code).await {
            Ok(()) => {
                if let Some(file) = self.lock().files.get_mut(name) {
                    file.persisted = Some(code);
                }
                tracing::info!("✓ Saved {}", name);
                self.emit(SessionEvent::SourceSaved {
                    name: name.to_string(),
                });
                Ok(SaveOutcome::Saved)
            }
            Err(err) => {
                tracing::warn!("Failed to save {}: {}", name, err);
                self.emit(SessionEvent::SaveFailed {
                    name: name.to_string(),
                    error: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    // ==================== SELECTION ====================

    /// Make `name` the active edit target; unknown names leave the
    /// selection untouched.
    pub fn select_source(&self, name: &str) -> bool {
        let changed = {
            let mut state = self.lock();
            if !state.files.contains_key(name) {
                return false;
            }
            let changed = state.selection.active_source.as_deref() != Some(name);
            state.selection.active_source = Some(name.to_string());
            changed
        };
        if changed {
            self.emit(SessionEvent::SelectionChanged);
        }
        true
    }

    /// Make `address` the active contract; unknown addresses leave the
    /// selection untouched.
    pub fn select_contract(&self, address: &str) -> bool {
        let changed = {
            let mut state = self.lock();
            if !state.contracts.contains_key(address) {
                return false;
            }
            let changed = state.selection.active_contract.as_deref() != Some(address);
            state.selection.active_contract = Some(address.to_string());
            changed
        };
        if changed {
            self.emit(SessionEvent::SelectionChanged);
        }
        true
    }

    // ==================== DEPLOY / CALL ====================

    /// Deploy a contract.
    ///
    /// Rejected synchronously with [`SessionError::Busy`] while another
    /// deploy is in flight; no backend call is made in that case. Whether
    /// the deployer exists is for the backend to decide.
    pub fn deploy(&self, request: DeployRequest) -> SessionResult<Pending<RunnerResult>> {
        let guard = {
            let mut state = self.lock();
            if state.is_deploying {
                tracing::warn!("Deploy rejected: another deploy is in progress");
                return Err(SessionError::Busy(OperationKind::Deploy));
            }
            state.is_deploying = true;
            FlightGuard::new(self.shared.clone(), Flight::Busy(OperationKind::Deploy))
        };

        tracing::info!(
            "Deploying contract from {} (gas limit {})",
            request.deployer.address,
            request.gas_limit
        );

        let (tx, rx) = oneshot::channel();
        let session = self.clone();
        tokio::spawn(async move {
            let outcome = session.shared.collaborators.backend.deploy(request).await;
            let result = session.finish_deploy(guard, outcome);
            let _ = tx.send(result);
        });

        Ok(Pending::new(rx))
    }

    fn finish_deploy(
        &self,
        guard: FlightGuard,
        outcome: Result<Deployment, ExecutionError>,
    ) -> RunnerResult {
        let block_num = self.chain().block_num;
        let limit = self.shared.config.history_limit;
        let mut state = self.lock();
        guard.complete(&mut state);

        match outcome {
            Ok(deployment) => {
                let output = RunnerOutput::from(&deployment);
                state.contracts.insert(
                    deployment.address.clone(),
                    ContractInstance {
                        address: deployment.address,
                        abi: deployment.abi,
                        state: deployment.state,
                    },
                );
                state.record(
                    RunRecord {
                        kind: OperationKind::Deploy,
                        address: Some(output.address.clone()),
                        transition: None,
                        block_num,
                        outcome: Ok(output.gas_used),
                        recorded_at: Utc::now(),
                    },
                    limit,
                );
                drop(state);

                tracing::info!("✓ Contract deployed at {} (gas used {})", output.address, output.gas_used);
                self.emit(SessionEvent::ContractDeployed {
                    address: output.address.clone(),
                });
                Ok(output)
            }
            Err(err) => {
                state.record(
                    RunRecord {
                        kind: OperationKind::Deploy,
                        address: None,
                        transition: None,
                        block_num,
                        outcome: Err(err.to_string()),
                        recorded_at: Utc::now(),
                    },
                    limit,
                );
                drop(state);

                tracing::warn!("Deploy failed: {}", err);
                self.emit(SessionEvent::OperationFailed {
                    kind: OperationKind::Deploy,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Invoke a transition on a deployed contract.
    ///
    /// Rejected synchronously when the address is not a deployed contract or
    /// while another call is in flight.
    pub fn call(&self, request: CallRequest) -> SessionResult<Pending<RunnerResult>> {
        let guard = {
            let mut state = self.lock();
            if !state.contracts.contains_key(&request.address) {
                return Err(SessionError::UnknownContract(request.address));
            }
            if state.is_calling {
                tracing::warn!("Call rejected: another call is in progress");
                return Err(SessionError::Busy(OperationKind::Call));
            }
            state.is_calling = true;
            FlightGuard::new(self.shared.clone(), Flight::Busy(OperationKind::Call))
        };

        tracing::info!("Calling {} on {}", request.transition, request.address);

        let (tx, rx) = oneshot::channel();
        let session = self.clone();
        let address = request.address.clone();
        let transition = request.transition.clone();
        tokio::spawn(async move {
            let outcome = session.shared.collaborators.backend.call(request).await;
            let result = session.finish_call(guard, address, transition, outcome);
            let _ = tx.send(result);
        });

        Ok(Pending::new(rx))
    }

    fn finish_call(
        &self,
        guard: FlightGuard,
        address: Address,
        transition: String,
        outcome: Result<RunnerOutput, ExecutionError>,
    ) -> RunnerResult {
        let block_num = self.chain().block_num;
        let limit = self.shared.config.history_limit;
        let mut state = self.lock();
        guard.complete(&mut state);

        let record = RunRecord {
            kind: OperationKind::Call,
            address: Some(address.clone()),
            transition: Some(transition.clone()),
            block_num,
            outcome: outcome
                .as_ref()
                .map(|output| output.gas_used)
                .map_err(|err| err.to_string()),
            recorded_at: Utc::now(),
        };
        state.record(record, limit);

        match outcome {
            Ok(output) => {
                if let Some(instance) = state.contracts.get_mut(&address) {
                    instance.state = output.state.clone();
                }
                drop(state);

                tracing::info!("✓ {} on {} succeeded (gas used {})", transition, address, output.gas_used);
                self.emit(SessionEvent::TransitionCalled { address, transition });
                Ok(output)
            }
            Err(err) => {
                drop(state);

                tracing::warn!("{} on {} failed: {}", transition, address, err);
                self.emit(SessionEvent::OperationFailed {
                    kind: OperationKind::Call,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    // ==================== NOTIFICATIONS ====================

    pub fn visible_notification(&self) -> Option<Notification> {
        self.lock().notifier.visible().cloned()
    }

    /// Close the visible notification; the next one waits for
    /// [`ContractSession::advance_notifications`].
    pub fn dismiss_notification(&self) -> Option<Notification> {
        self.lock().notifier.dismiss()
    }

    /// The visible notification finished displaying; show the next one.
    pub fn advance_notifications(&self) -> Option<Notification> {
        let next = self.lock().notifier.advance().cloned();
        if let Some(notification) = &next {
            self.emit(SessionEvent::NotificationShown {
                key: notification.key,
            });
        }
        next
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        lock_state(&self.shared)
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is not an error
        let _ = self.shared.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: OperationKind, gas: u64) -> RunRecord {
        RunRecord {
            kind,
            address: None,
            transition: None,
            block_num: 0,
            outcome: Ok(gas),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = SessionState::default();
        for gas in 0..5 {
            state.record(record(OperationKind::Deploy, gas), 3);
        }

        let kept: Vec<u64> = state
            .history()
            .map(|r| *r.outcome.as_ref().unwrap())
            .collect();
        assert_eq!(kept, vec![2, 3, 4]);
    }

    #[test]
    fn test_release_clears_only_its_flight() {
        let mut state = SessionState {
            is_deploying: true,
            is_calling: true,
            ..Default::default()
        };
        state.checks_in_flight.insert("Foo".into(), 2);

        state.release(&Flight::Busy(OperationKind::Deploy));
        assert!(!state.is_deploying());
        assert!(state.is_calling());

        state.release(&Flight::Check("Foo".into()));
        assert!(state.is_checking("Foo"));
        state.release(&Flight::Check("Foo".into()));
        assert!(!state.is_checking("Foo"));
    }
}
