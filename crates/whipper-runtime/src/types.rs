//! Runtime types.

use std::fmt;

use serde::{Deserialize, Serialize};

use whipper_store::InputTable;

/// What a batch run should do.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunRequest {
    #[serde(rename = "promptId")]
    pub prompt_id: String,
    /// Input table; without one the template is submitted once on its own.
    #[serde(default)]
    pub inputs: Option<InputTable>,
    /// Column of `inputs` to feed into the template.
    #[serde(rename = "targetField", default)]
    pub target_field: Option<String>,
    /// Resubmit replies that do not look like a table row, asking for no prose.
    #[serde(rename = "retryClassifier", default)]
    pub retry_classifier: bool,
    /// Only redo rows a reviewer flagged.
    #[serde(rename = "redoFlagged", default)]
    pub redo_flagged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunMode {
    Batch,
    SingleShot,
    RedoFlagged,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    #[serde(rename = "promptId")]
    pub prompt_id: String,
    pub mode: RunMode,
    /// Rows submitted by this run.
    pub processed: usize,
    /// Rows already cached when the run started.
    #[serde(rename = "resumedFrom")]
    pub resumed_from: usize,
    /// Rows the run covers: inputs, or flagged rows when redoing.
    pub total: usize,
}

/// Something the user should see while a run is in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    EmptyTemplate { prompt_id: String },
    Resuming { from: usize, total: usize },
    NoFlaggedRows,
    SubmissionFailed {
        attempt: u32,
        max_attempts: u32,
        reason: String,
        backoff_secs: u64,
    },
    ResetFailed { reason: String },
    Recovered { attempts: u32 },
    Reformatting { row: usize },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::EmptyTemplate { prompt_id } => {
                write!(f, "Prompt {} has no text; submitting inputs alone", prompt_id)
            }
            Notice::Resuming { from, total } => {
                write!(f, "Resuming at row {} of {}", from + 1, total)
            }
            Notice::NoFlaggedRows => write!(f, "No flagged rows to redo"),
            Notice::SubmissionFailed {
                attempt,
                max_attempts,
                reason,
                backoff_secs,
            } => write!(
                f,
                "Submission failed ({}, attempt {}/{}); resubmitting after {}s",
                reason, attempt, max_attempts, backoff_secs
            ),
            Notice::ResetFailed { reason } => write!(f, "Client reset failed: {}", reason),
            Notice::Recovered { attempts } => {
                write!(f, "Process resumed after {} attempts", attempts)
            }
            Notice::Reformatting { row } => {
                write!(f, "Row {} reply is not a table row; asking again", row + 1)
            }
        }
    }
}

/// Run status shown by the dashboard.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none", rename = "promptId")]
    pub prompt_id: Option<String>,
    pub progress: u8,
    pub output: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "lastRun")]
    pub last_run: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
