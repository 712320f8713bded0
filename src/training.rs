//! "Continue to train": new training requests derived from a parent run.

use crate::lineage::{Hyperparameters, ModelGroupId, ParameterRecord, SessionRecord};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContinueError {
    #[error("no session is selected")]
    NothingSelected,
    #[error("a name for the new model is required")]
    MissingModelName,
    #[error("parameters for the selected session are not loaded yet")]
    ParametersNotLoaded,
    #[error("parameters belong to session {found}, expected {expected}")]
    ParameterMismatch { expected: String, found: String },
}

/// Request body for the re-train endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingForm {
    pub pm_no: Option<i64>,
    pub pm_name: String,
    pub fm_no: Option<ModelGroupId>,
    pub fm_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_session_no: Option<String>,
    pub ts_model_name: String,
    pub dataset: String,
    pub task: i64,
    #[serde(flatten)]
    pub hyperparameters: Hyperparameters,
}

impl TrainingForm {
    /// Pre-fill a training request that continues from `parent`.
    ///
    /// Every hyper-parameter, the dataset and the base model are carried over;
    /// only the new run name comes from the operator.
    pub fn continue_from(
        parent: &SessionRecord,
        parameters: &ParameterRecord,
        model_name: &str,
        task: i64,
    ) -> Result<Self, ContinueError> {
        if parameters.session_no != parent.session_id {
            return Err(ContinueError::ParameterMismatch {
                expected: parent.session_id.clone(),
                found: parameters.session_no.clone(),
            });
        }
        let model_name = model_name.trim();
        if model_name.is_empty() {
            return Err(ContinueError::MissingModelName);
        }

        Ok(Self {
            pm_no: parent.base_model_id,
            pm_name: parent.base_model_name.clone(),
            fm_no: Some(parent.model_group_id),
            fm_name: parent.model_group_name.clone(),
            parent_session_no: Some(parent.session_id.clone()),
            ts_model_name: model_name.to_string(),
            dataset: parameters.dataset.clone().unwrap_or_default(),
            task,
            hyperparameters: parameters.hyperparameters.clone(),
        })
    }
}
