//! Selected node and its lazily fetched parameter detail.
//!
//! Every fetch is tagged with a [`FetchToken`]. Selecting another node,
//! clearing the selection or switching model group mints or drops the active
//! token, so a result that arrives late is recognized and discarded instead of
//! overwriting what the operator is looking at now.

use crate::api::ApiError;
use crate::lineage::{ModelGroupId, ParameterRecord};

/// Failure of a parameter fetch. Recoverable: the graph stays intact.
pub type DetailFetchError = ApiError;

/// Opaque tag of one issued detail fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchToken(u64);

/// A detail fetch the controller wants performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailRequest {
    pub token: FetchToken,
    pub session_id: String,
}

/// Performs detail fetches asynchronously. Results come back through
/// [`SelectionController::on_fetch_resolved`] with the request's token.
pub trait DetailFetcher {
    fn dispatch(&self, request: DetailRequest);
}

#[derive(Debug, Clone, PartialEq)]
pub enum Detail {
    Pending,
    Loaded(ParameterRecord),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Selection {
    #[default]
    Idle,
    Detail { session_id: String, detail: Detail },
}

/// Read-only view handed to the detail panel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectionSnapshot {
    pub selected_session_id: Option<String>,
    pub current_parameters: Option<ParameterRecord>,
    pub is_loading: bool,
    pub is_error: bool,
    pub error: Option<String>,
}

pub struct SelectionController<F> {
    state: Selection,
    active_token: Option<FetchToken>,
    next_token: u64,
    model_group_id: Option<ModelGroupId>,
    fetcher: F,
}

impl<F: DetailFetcher> SelectionController<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            state: Selection::Idle,
            active_token: None,
            next_token: 0,
            model_group_id: None,
            fetcher,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &Selection {
        &self.state
    }

    pub fn selected_session_id(&self) -> Option<&str> {
        match &self.state {
            Selection::Idle => None,
            Selection::Detail { session_id, .. } => Some(session_id),
        }
    }

    #[cfg(test)]
    pub fn active_token(&self) -> Option<FetchToken> {
        self.active_token
    }

    #[cfg(test)]
    pub fn model_group_id(&self) -> Option<ModelGroupId> {
        self.model_group_id
    }

    /// Select `session_id` and fetch its parameters, superseding any fetch in flight.
    pub fn select_node(&mut self, session_id: &str) -> FetchToken {
        self.state = Selection::Detail {
            session_id: session_id.to_string(),
            detail: Detail::Pending,
        };
        self.issue(session_id)
    }

    /// Fetch the current selection's parameters again, e.g. after a failure.
    pub fn retry(&mut self) -> Option<FetchToken> {
        let Selection::Detail { session_id, detail } = &mut self.state else {
            return None;
        };
        *detail = Detail::Pending;
        let session_id = session_id.clone();
        Some(self.issue(&session_id))
    }

    /// Apply a fetch result. Returns `false` when the result was stale and dropped.
    pub fn on_fetch_resolved(
        &mut self,
        token: FetchToken,
        result: Result<ParameterRecord, DetailFetchError>,
    ) -> bool {
        if self.active_token != Some(token) {
            tracing::debug!(token = token.0, "discarding stale parameter fetch");
            return false;
        }
        let Selection::Detail { session_id, detail } = &mut self.state else {
            return false;
        };

        self.active_token = None;
        *detail = match result {
            Ok(parameters) => Detail::Loaded(parameters),
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "parameter fetch failed");
                Detail::Failed(e.to_string())
            }
        };
        true
    }

    /// Drop the selection. A fetch still in flight becomes a no-op.
    pub fn clear_selection(&mut self) {
        if self.state != Selection::Idle {
            tracing::debug!("selection cleared");
        }
        self.state = Selection::Idle;
        self.active_token = None;
    }

    /// Reset for a different model group.
    pub fn on_group_changed(&mut self, model_group_id: ModelGroupId) {
        tracing::info!(
            from = ?self.model_group_id,
            to = model_group_id,
            "model group changed"
        );
        self.clear_selection();
        self.model_group_id = Some(model_group_id);
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        match &self.state {
            Selection::Idle => SelectionSnapshot::default(),
            Selection::Detail { session_id, detail } => SelectionSnapshot {
                selected_session_id: Some(session_id.clone()),
                current_parameters: match detail {
                    Detail::Loaded(parameters) => Some(parameters.clone()),
                    _ => None,
                },
                is_loading: matches!(detail, Detail::Pending),
                is_error: matches!(detail, Detail::Failed(_)),
                error: match detail {
                    Detail::Failed(message) => Some(message.clone()),
                    _ => None,
                },
            },
        }
    }

    fn issue(&mut self, session_id: &str) -> FetchToken {
        self.next_token += 1;
        let token = FetchToken(self.next_token);
        self.active_token = Some(token);
        tracing::debug!(session_id, token = token.0, "fetching session parameters");
        self.fetcher.dispatch(DetailRequest {
            token,
            session_id: session_id.to_string(),
        });
        token
    }
}
