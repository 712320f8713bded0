//! Event-loop side coordinator for the lineage view.
//!
//! Owns everything the UI mutates: the active model group, the loaded session
//! set, the measured viewport, the cached projection and the selection. Slow
//! service calls run through an [`Executor`] and report back over a channel;
//! [`Console::poll`] applies whatever has arrived, dropping results that a
//! newer request has superseded.

use crate::api::{ApiError, HistoryService};
use crate::lineage::{
    project, LineageConfig, LineageError, ModelGroup, ModelGroupId, ParameterRecord, Projection,
    SessionRecord,
};
use crate::selection::{
    DetailFetcher, DetailRequest, FetchToken, SelectionController, SelectionSnapshot,
};
use crate::training::{ContinueError, TrainingForm};
use crate::viewport::ViewportObserver;
use egui::Vec2;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs blocking service calls off the event thread.
pub trait Executor {
    fn execute(&self, job: Job);
}

/// One detached OS thread per job.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadExecutor;

impl Executor for ThreadExecutor {
    fn execute(&self, job: Job) {
        std::thread::spawn(job);
    }
}

/// Results delivered back to the event thread.
#[derive(Debug)]
pub enum Outcome {
    ModelGroups {
        generation: u64,
        result: Result<Vec<ModelGroup>, ApiError>,
    },
    Sessions {
        generation: u64,
        model_group_id: ModelGroupId,
        result: Result<Vec<SessionRecord>, ApiError>,
    },
    Parameters {
        token: FetchToken,
        result: Result<ParameterRecord, ApiError>,
    },
    Retrain {
        generation: u64,
        model_group_id: ModelGroupId,
        parent_session_id: String,
        result: Result<SessionRecord, ApiError>,
    },
}

/// State of a value fetched from the history service.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Remote<T> {
    #[default]
    Idle,
    Loading,
    Ready(T),
    Failed(String),
}

impl<T> Remote<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Remote::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Remote::Loading)
    }
}

/// What the graph area should show.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphView {
    /// No model group chosen yet
    NoGroup,
    Loading,
    LoadFailed(String),
    /// Sessions are loaded but the container has not been measured yet
    WaitingForViewport,
    /// The group has no training runs yet
    Empty,
    /// The sessions do not form a tree; nothing is drawn
    Invalid(LineageError),
    Ready(Projection),
}

/// Issues parameter fetches through the executor.
pub struct ParameterFetcher {
    service: Arc<dyn HistoryService>,
    executor: Rc<dyn Executor>,
    outcomes: Sender<Outcome>,
}

impl DetailFetcher for ParameterFetcher {
    fn dispatch(&self, request: DetailRequest) {
        let service = Arc::clone(&self.service);
        let tx = self.outcomes.clone();
        self.executor.execute(Box::new(move || {
            let result = service.fetch_parameters(&request.session_id);
            let _ = tx.send(Outcome::Parameters {
                token: request.token,
                result,
            });
        }));
    }
}

pub struct Console {
    service: Arc<dyn HistoryService>,
    executor: Rc<dyn Executor>,
    outcomes_tx: Sender<Outcome>,
    outcomes_rx: Receiver<Outcome>,
    in_flight: usize,

    config: LineageConfig,
    default_task: i64,

    model_groups: Remote<Vec<ModelGroup>>,
    model_groups_generation: u64,
    group: Option<ModelGroupId>,
    sessions: Remote<Vec<SessionRecord>>,
    sessions_generation: u64,

    viewport: ViewportObserver,
    view: GraphView,
    dirty: bool,

    selection: SelectionController<ParameterFetcher>,
    continuation: Remote<SessionRecord>,
    continuation_generation: u64,
}

impl Console {
    pub fn new(
        service: Arc<dyn HistoryService>,
        executor: Rc<dyn Executor>,
        config: LineageConfig,
    ) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::channel();
        let fetcher = ParameterFetcher {
            service: Arc::clone(&service),
            executor: Rc::clone(&executor),
            outcomes: outcomes_tx.clone(),
        };

        Self {
            service,
            executor,
            outcomes_tx,
            outcomes_rx,
            in_flight: 0,
            config,
            default_task: 0,
            model_groups: Remote::Idle,
            model_groups_generation: 0,
            group: None,
            sessions: Remote::Idle,
            sessions_generation: 0,
            viewport: ViewportObserver::new(),
            view: GraphView::NoGroup,
            dirty: false,
            selection: SelectionController::new(fetcher),
            continuation: Remote::Idle,
            continuation_generation: 0,
        }
    }

    /// Task id sent with continued-training requests.
    pub fn set_default_task(&mut self, task: i64) {
        self.default_task = task;
    }

    pub fn set_config(&mut self, config: LineageConfig) {
        if self.config != config {
            self.config = config;
            self.dirty = true;
        }
    }

    // -----------------------------------------------------------------------
    // Model groups and sessions
    // -----------------------------------------------------------------------

    pub fn model_groups(&self) -> &Remote<Vec<ModelGroup>> {
        &self.model_groups
    }

    pub fn refresh_model_groups(&mut self) {
        self.model_groups_generation += 1;
        self.model_groups = Remote::Loading;

        let generation = self.model_groups_generation;
        let service = Arc::clone(&self.service);
        self.spawn(move || Outcome::ModelGroups {
            generation,
            result: service.fetch_model_groups(),
        });
    }

    pub fn active_group(&self) -> Option<ModelGroupId> {
        self.group
    }

    pub fn sessions(&self) -> &Remote<Vec<SessionRecord>> {
        &self.sessions
    }

    /// Switch to `model_group_id` (or reload it), dropping selection and layout.
    pub fn select_group(&mut self, model_group_id: ModelGroupId) {
        self.selection.on_group_changed(model_group_id);
        self.group = Some(model_group_id);
        self.reset_continuation();
        self.view = GraphView::Loading;
        self.reload_sessions();
    }

    /// Fetch the active group's sessions again, keeping the selection.
    pub fn reload_sessions(&mut self) {
        let Some(model_group_id) = self.group else {
            return;
        };
        self.sessions_generation += 1;
        self.sessions = Remote::Loading;
        self.dirty = true;

        let generation = self.sessions_generation;
        let service = Arc::clone(&self.service);
        self.spawn(move || Outcome::Sessions {
            generation,
            model_group_id,
            result: service.fetch_sessions(model_group_id),
        });
    }

    pub fn session(&self, session_id: &str) -> Option<&SessionRecord> {
        self.sessions
            .ready()?
            .iter()
            .find(|s| s.session_id == session_id)
    }

    // -----------------------------------------------------------------------
    // Layout
    // -----------------------------------------------------------------------

    /// Report the current size of the graph container.
    pub fn on_viewport(&mut self, size: Vec2) {
        if self.viewport.observe(size) {
            self.dirty = true;
        }
    }

    /// Current graph, fully recomputed if anything it depends on changed.
    pub fn graph(&mut self) -> &GraphView {
        if self.dirty {
            self.recompute();
        }
        &self.view
    }

    fn recompute(&mut self) {
        self.dirty = false;
        let Some(model_group_id) = self.group else {
            self.view = GraphView::NoGroup;
            return;
        };

        self.view = match &self.sessions {
            Remote::Idle | Remote::Loading => GraphView::Loading,
            Remote::Failed(message) => GraphView::LoadFailed(message.clone()),
            Remote::Ready(sessions) => match self.viewport.current() {
                None => GraphView::WaitingForViewport,
                Some(size) => match project(model_group_id, sessions, size, &self.config) {
                    Ok(None) => GraphView::Empty,
                    Ok(Some(mut projection)) => {
                        projection.apply_selection(self.selection.selected_session_id());
                        GraphView::Ready(projection)
                    }
                    Err(e) => GraphView::Invalid(e),
                },
            },
        };
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    /// A node was clicked.
    pub fn on_node_activated(&mut self, session_id: &str) {
        self.selection.select_node(session_id);
        self.in_flight += 1;
        self.reset_continuation();
        if let GraphView::Ready(projection) = &mut self.view {
            projection.apply_selection(Some(session_id));
        }
    }

    /// The empty canvas was clicked, or the detail panel closed.
    pub fn on_background_activated(&mut self) {
        self.selection.clear_selection();
        self.reset_continuation();
        if let GraphView::Ready(projection) = &mut self.view {
            projection.apply_selection(None);
        }
    }

    pub fn retry_detail(&mut self) {
        if self.selection.retry().is_some() {
            self.in_flight += 1;
        }
    }

    pub fn selection(&self) -> SelectionSnapshot {
        self.selection.snapshot()
    }

    /// Session record behind the current selection.
    pub fn selected_session(&self) -> Option<&SessionRecord> {
        self.session(self.selection.selected_session_id()?)
    }

    // -----------------------------------------------------------------------
    // Continue to train
    // -----------------------------------------------------------------------

    pub fn continuation(&self) -> &Remote<SessionRecord> {
        &self.continuation
    }

    /// Forget the last continuation; a result still in flight will be dropped.
    fn reset_continuation(&mut self) {
        self.continuation_generation += 1;
        self.continuation = Remote::Idle;
    }

    /// Start a new training run derived from the selected session.
    pub fn continue_training(&mut self, model_name: &str) -> Result<(), ContinueError> {
        let snapshot = self.selection.snapshot();
        let parent = snapshot
            .selected_session_id
            .as_deref()
            .and_then(|id| self.session(id))
            .ok_or(ContinueError::NothingSelected)?;
        let parameters = snapshot
            .current_parameters
            .as_ref()
            .ok_or(ContinueError::ParametersNotLoaded)?;

        let form = TrainingForm::continue_from(parent, parameters, model_name, self.default_task)?;
        let parent_session_id = parent.session_id.clone();
        let model_group_id = parent.model_group_id;
        self.continuation_generation += 1;
        self.continuation = Remote::Loading;

        let generation = self.continuation_generation;
        let service = Arc::clone(&self.service);
        self.spawn(move || Outcome::Retrain {
            generation,
            model_group_id,
            parent_session_id,
            result: service.retrain(&form),
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Async results
    // -----------------------------------------------------------------------

    /// True while any dispatched call has not reported back.
    pub fn has_pending_work(&self) -> bool {
        self.in_flight > 0
    }

    /// Apply every result that has arrived. Never blocks.
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        loop {
            match self.outcomes_rx.try_recv() {
                Ok(outcome) => {
                    self.in_flight = self.in_flight.saturating_sub(1);
                    self.apply(outcome);
                    applied += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        applied
    }

    fn apply(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::ModelGroups { generation, result } => {
                if generation != self.model_groups_generation {
                    tracing::debug!(generation, "discarding stale model group list");
                    return;
                }
                self.model_groups = match result {
                    Ok(groups) => {
                        tracing::info!(count = groups.len(), "loaded model groups");
                        Remote::Ready(groups)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to load model groups");
                        Remote::Failed(e.to_string())
                    }
                };
            }
            Outcome::Sessions {
                generation,
                model_group_id,
                result,
            } => {
                if generation != self.sessions_generation || Some(model_group_id) != self.group {
                    tracing::debug!(model_group_id, generation, "discarding stale session list");
                    return;
                }
                self.sessions = match result {
                    Ok(sessions) => {
                        tracing::info!(model_group_id, count = sessions.len(), "loaded sessions");
                        Remote::Ready(sessions)
                    }
                    Err(e) => {
                        tracing::warn!(model_group_id, error = %e, "failed to load sessions");
                        Remote::Failed(e.to_string())
                    }
                };
                self.dirty = true;
            }
            Outcome::Parameters { token, result } => {
                self.selection.on_fetch_resolved(token, result);
            }
            Outcome::Retrain {
                generation,
                model_group_id,
                parent_session_id,
                result,
            } => {
                let current = generation == self.continuation_generation;
                match result {
                    Ok(session) => {
                        tracing::info!(
                            parent = %parent_session_id,
                            session = %session.session_id,
                            "continued training started"
                        );
                        // The new run belongs in the graph even if the operator moved on
                        if Some(model_group_id) == self.group {
                            self.reload_sessions();
                        }
                        if current {
                            self.continuation = Remote::Ready(session);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(parent = %parent_session_id, error = %e, "continued training failed");
                        if current {
                            self.continuation = Remote::Failed(e.to_string());
                        }
                    }
                }
                if !current {
                    tracing::debug!(parent = %parent_session_id, "discarding stale continuation result");
                }
            }
        }
    }

    fn spawn<F>(&mut self, call: F)
    where
        F: FnOnce() -> Outcome + Send + 'static,
    {
        let tx = self.outcomes_tx.clone();
        self.in_flight += 1;
        self.executor.execute(Box::new(move || {
            let _ = tx.send(call());
        }));
    }
}

#[cfg(test)]
#[path = "console_tests.rs"]
mod tests;
