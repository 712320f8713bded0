//! Lineage data types matching the history service responses.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Identifier of a fine-tuned-model family (`fm_no` on the wire).
pub type ModelGroupId = i64;

/// One training run as reported by the history service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "session_no", deserialize_with = "id_string")]
    pub session_id: String,
    #[serde(rename = "fm_no")]
    pub model_group_id: ModelGroupId,
    #[serde(rename = "fm_name", default)]
    pub model_group_name: String,
    #[serde(rename = "pm_no", default)]
    pub base_model_id: Option<i64>,
    #[serde(rename = "pm_name", default)]
    pub base_model_name: String,
    /// `None` marks the root of the group. Empty strings are normalized to `None`.
    #[serde(
        rename = "parent_session_no",
        default,
        deserialize_with = "optional_id_string"
    )]
    pub parent_session_id: Option<String>,
    #[serde(rename = "ts_model_name", default)]
    pub display_name: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

impl SessionRecord {
    pub fn is_root(&self) -> bool {
        self.parent_session_id.is_none()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.start_time.as_deref().and_then(parse_timestamp)
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.end_time.as_deref().and_then(parse_timestamp)
    }

    /// Wall-clock duration of the run, when both ends are known.
    pub fn duration(&self) -> Option<chrono::Duration> {
        let (start, end) = (self.started_at()?, self.ended_at()?);
        (end >= start).then(|| end - start)
    }

    /// Label shown on the graph: the trained model name, or the id as fallback.
    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.session_id
        } else {
            &self.display_name
        }
    }
}

/// Parameters recorded for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub parameter_no: i64,
    #[serde(deserialize_with = "id_string")]
    pub session_no: String,
    pub fm_no: ModelGroupId,
    pub model_name: String,
    #[serde(default)]
    pub dataset: Option<String>,
    #[serde(flatten)]
    pub hyperparameters: Hyperparameters,
}

/// Trainer settings shared by recorded parameters and new training requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub epochs: u32,
    pub save_strategy: String,
    pub logging_strategy: String,
    pub evaluation_strategy: String,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub batch_size: u32,
    pub eval_steps: u32,
    pub save_steps: u32,
    pub save_total_limits: u32,
    pub run_on_gpu: bool,
    pub load_best_at_the_end: bool,
}

/// A fine-tuned-model family, the unit the sidebar lists.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelGroup {
    #[serde(rename = "fm_no")]
    pub id: ModelGroupId,
    #[serde(rename = "fm_name")]
    pub name: String,
    #[serde(rename = "pm_no", default)]
    pub base_model_id: Option<i64>,
    #[serde(rename = "pm_name", default)]
    pub base_model_name: String,
    #[serde(rename = "fm_description", default)]
    pub description: String,
}

/// A session placed in the validated lineage tree.
#[derive(Debug, Clone, PartialEq)]
pub struct LineageNode {
    pub record: SessionRecord,
    pub depth: usize,
    pub children: Vec<LineageNode>,
}

impl LineageNode {
    pub fn id(&self) -> &str {
        &self.record.session_id
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        self.descendants().len()
    }

    /// Number of parent→child links in this subtree.
    #[cfg(test)]
    pub fn edge_count(&self) -> usize {
        self.node_count() - 1
    }

    /// Pre-order traversal (node first, then children in order).
    pub fn descendants(&self) -> Vec<&LineageNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    #[cfg(test)]
    pub fn find(&self, session_id: &str) -> Option<&LineageNode> {
        self.descendants().into_iter().find(|n| n.id() == session_id)
    }

    /// Maximum depth found in this subtree.
    pub fn max_depth(&self) -> usize {
        self.descendants()
            .iter()
            .map(|n| n.depth)
            .fold(self.depth, usize::max)
    }
}

// Long retrain chains nest deeply; unlink children before they drop.
impl Drop for LineageNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// Parse the timestamp formats the history service emits.
///
/// Accepts RFC 3339 as well as naive `YYYY-MM-DD HH:MM:SS[.f]` / `T`-separated
/// strings, which are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Session numbers arrive as strings from some endpoints and integers from others.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s.trim().to_string(),
            RawId::Number(n) => n.to_string(),
        }
    }
}

fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(RawId::into_string)
}

fn optional_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawId>::deserialize(deserializer)?;
    Ok(raw.map(RawId::into_string).filter(|id| !id.is_empty()))
}
