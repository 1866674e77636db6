//! Dispatch: structured call in, handler side effects out.
//!
//! The ten operation kinds form a closed [`Operation`] enum, each variant
//! carrying its own typed argument record.  [`Operation::from_call`] checks
//! the raw arguments against the schema registry and decodes them;
//! [`run_task`] executes the operation and normalises every outcome into a
//! success message or a [`TaskError`].

use crate::classify::StructuredCall;
use crate::embeddings::EmbeddingProvider;
use crate::ops::{self, CardStore};
use crate::schema;
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Failure taxonomy surfaced to the boundary.  Classifier failures never
/// appear here — they are recovered by the fallback before dispatch.
#[derive(Debug, Error)]
pub enum TaskError {
    /// No classifier/fallback match, or a name outside the registry.
    #[error("Task not recognized or not supported.")]
    Unrecognized,
    /// Arguments missing or malformed for the selected operation.
    #[error("invalid arguments for {op}: {message}")]
    Validation { op: String, message: String },
    /// The handler itself failed (I/O, subprocess, data, query).
    #[error("{0:#}")]
    Handler(anyhow::Error),
}

impl From<anyhow::Error> for TaskError {
    fn from(e: anyhow::Error) -> Self {
        TaskError::Handler(e)
    }
}

// ── Typed argument records ──────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateDataArgs {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormatMarkdownArgs {
    pub prettier_version: String,
    pub filename: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CountWeekdaysArgs {
    pub filename: String,
    pub targetfile: String,
    pub weekday: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SortContactsArgs {
    pub filename: String,
    pub targetfile: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecentLogLinesArgs {
    pub log_dir_path: String,
    pub output_file_path: String,
    pub num_files: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkdownIndexArgs {
    pub doc_dir_path: String,
    pub output_file_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractSenderArgs {
    pub filename: String,
    pub output_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreditCardArgs {
    pub filename: String,
    /// The card image the task mentions.  Accepted for schema
    /// compatibility; the record comes from the generator, not OCR.
    #[allow(dead_code)]
    pub image_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimilarCommentsArgs {
    pub filename: String,
    pub output_filename: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunSqlArgs {
    pub filename: String,
    pub output_filename: String,
    pub query: String,
}

// ── The closed operation set ────────────────────────────────────────────────

/// One of the ten registered operations, with validated arguments.
#[derive(Debug, Clone)]
pub enum Operation {
    GenerateData(GenerateDataArgs),
    FormatMarkdown(FormatMarkdownArgs),
    CountWeekdays(CountWeekdaysArgs),
    SortContacts(SortContactsArgs),
    RecentLogLines(RecentLogLinesArgs),
    MarkdownIndex(MarkdownIndexArgs),
    ExtractSender(ExtractSenderArgs),
    CreditCard(CreditCardArgs),
    SimilarComments(SimilarCommentsArgs),
    RunSql(RunSqlArgs),
}

impl Operation {
    /// The registry code for this operation (`A1`–`A10`).
    pub fn code(&self) -> &'static str {
        match self {
            Operation::GenerateData(_) => "A1",
            Operation::FormatMarkdown(_) => "A2",
            Operation::CountWeekdays(_) => "A3",
            Operation::SortContacts(_) => "A4",
            Operation::RecentLogLines(_) => "A5",
            Operation::MarkdownIndex(_) => "A6",
            Operation::ExtractSender(_) => "A7",
            Operation::CreditCard(_) => "A8",
            Operation::SimilarComments(_) => "A9",
            Operation::RunSql(_) => "A10",
        }
    }

    /// Resolve and decode a structured call.  Absent or unknown names are
    /// [`TaskError::Unrecognized`]; schema or decode problems are
    /// [`TaskError::Validation`].
    pub fn from_call(call: &StructuredCall) -> Result<Operation, TaskError> {
        let name = call.name.as_deref().ok_or(TaskError::Unrecognized)?;
        let def = schema::op_by_name(name).ok_or(TaskError::Unrecognized)?;

        schema::validate_args(def, &call.arguments).map_err(|message| TaskError::Validation {
            op: def.name.to_string(),
            message,
        })?;

        fn decode<T: DeserializeOwned>(
            op: &'static str,
            args: &serde_json::Value,
        ) -> Result<T, TaskError> {
            serde_json::from_value(args.clone()).map_err(|e| TaskError::Validation {
                op: op.to_string(),
                message: e.to_string(),
            })
        }

        let args = &call.arguments;
        Ok(match def.name {
            "A1" => Operation::GenerateData(decode("A1", args)?),
            "A2" => Operation::FormatMarkdown(decode("A2", args)?),
            "A3" => Operation::CountWeekdays(decode("A3", args)?),
            "A4" => Operation::SortContacts(decode("A4", args)?),
            "A5" => Operation::RecentLogLines(decode("A5", args)?),
            "A6" => Operation::MarkdownIndex(decode("A6", args)?),
            "A7" => Operation::ExtractSender(decode("A7", args)?),
            "A8" => Operation::CreditCard(decode("A8", args)?),
            "A9" => Operation::SimilarComments(decode("A9", args)?),
            "A10" => Operation::RunSql(decode("A10", args)?),
            _ => return Err(TaskError::Unrecognized),
        })
    }
}

// ── Execution context ───────────────────────────────────────────────────────

/// Collaborators and identity shared by every dispatch.
pub struct RunContext {
    /// Account email the data generator and card lookup are keyed by.
    pub account_email: String,
    /// Path to the external data-generation script (A1).
    pub datagen_script: String,
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub cards: Arc<dyn CardStore>,
}

/// Run a blocking handler off the async runtime.
async fn run_blocking<F>(f: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("handler task panicked")?
}

/// Execute one operation against the context.  Handler errors come back as
/// [`TaskError::Handler`]; the process never crashes on them.
pub async fn execute(op: Operation, ctx: &RunContext) -> Result<(), TaskError> {
    let result = match op {
        Operation::GenerateData(args) => {
            let script = ctx.datagen_script.clone();
            run_blocking(move || ops::generate_data(&script, &args.email)).await
        }
        Operation::FormatMarkdown(args) => {
            run_blocking(move || ops::format_markdown(&args.prettier_version, &args.filename)).await
        }
        Operation::CountWeekdays(args) => {
            run_blocking(move || {
                ops::count_weekdays(
                    Path::new(&args.filename),
                    Path::new(&args.targetfile),
                    &args.weekday,
                )
                .map(|_| ())
            })
            .await
        }
        Operation::SortContacts(args) => {
            run_blocking(move || {
                ops::sort_contacts(Path::new(&args.filename), Path::new(&args.targetfile))
            })
            .await
        }
        Operation::RecentLogLines(args) => {
            run_blocking(move || {
                ops::recent_log_lines(
                    Path::new(&args.log_dir_path),
                    Path::new(&args.output_file_path),
                    args.num_files,
                )
                .map(|_| ())
            })
            .await
        }
        Operation::MarkdownIndex(args) => {
            run_blocking(move || {
                ops::markdown_index(
                    Path::new(&args.doc_dir_path),
                    Path::new(&args.output_file_path),
                )
                .map(|_| ())
            })
            .await
        }
        Operation::ExtractSender(args) => {
            run_blocking(move || {
                ops::extract_sender(Path::new(&args.filename), Path::new(&args.output_file))
                    .map(|_| ())
            })
            .await
        }
        Operation::CreditCard(args) => {
            let cards = Arc::clone(&ctx.cards);
            let email = ctx.account_email.clone();
            run_blocking(move || ops::credit_card(Path::new(&args.filename), cards.as_ref(), &email))
                .await
        }
        Operation::SimilarComments(args) => {
            ops::similar_comments(
                Path::new(&args.filename),
                Path::new(&args.output_filename),
                ctx.embeddings.as_ref(),
            )
            .await
        }
        Operation::RunSql(args) => {
            run_blocking(move || {
                ops::run_sql(
                    Path::new(&args.filename),
                    Path::new(&args.output_filename),
                    &args.query,
                )
                .map(|_| ())
            })
            .await
        }
    };

    result.map_err(TaskError::from)
}

/// Full pipeline tail: decode, execute, and build the success message that
/// names the operation and echoes the task text.
pub async fn run_task(
    task: &str,
    call: StructuredCall,
    ctx: &RunContext,
) -> Result<String, TaskError> {
    let op = Operation::from_call(&call)?;
    let code = op.code();
    execute(op, ctx).await?;
    Ok(format!("{} Task '{}' executed successfully", code, task))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, arguments: serde_json::Value) -> StructuredCall {
        StructuredCall { name: Some(name.to_string()), arguments }
    }

    #[test]
    fn test_from_call_empty_is_unrecognized() {
        let err = Operation::from_call(&StructuredCall::default()).unwrap_err();
        assert!(matches!(err, TaskError::Unrecognized));
    }

    #[test]
    fn test_from_call_unknown_name_is_unrecognized_not_partial() {
        for name in ["A11", "A", "a3", "read_file"] {
            let err = Operation::from_call(&call(name, json!({}))).unwrap_err();
            assert!(matches!(err, TaskError::Unrecognized), "name: {name}");
        }
    }

    #[test]
    fn test_from_call_missing_argument_is_validation() {
        let err = Operation::from_call(&call("A3", json!({ "filename": "/data/dates.txt" })))
            .unwrap_err();
        match err {
            TaskError::Validation { op, message } => {
                assert_eq!(op, "A3");
                assert!(message.contains("targetfile"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_from_call_pattern_violation_is_validation() {
        let err = Operation::from_call(&call(
            "A2",
            json!({ "prettier_version": "eslint@9.0.0", "filename": "/data/format.md" }),
        ))
        .unwrap_err();
        assert!(matches!(err, TaskError::Validation { .. }));
    }

    #[test]
    fn test_from_call_decodes_typed_args() {
        let op = Operation::from_call(&call(
            "A5",
            json!({
                "log_dir_path": "/data/logs",
                "output_file_path": "/data/logs-recent.txt",
                "num_files": 10
            }),
        ))
        .unwrap();
        assert_eq!(op.code(), "A5");
        match op {
            Operation::RecentLogLines(args) => assert_eq!(args.num_files, 10),
            other => panic!("expected A5, got {other:?}"),
        }
    }

    #[test]
    fn test_code_covers_all_ten() {
        let calls = [
            call("A1", json!({ "email": "a@b.cd" })),
            call("A2", json!({ "prettier_version": "prettier@3.4.2", "filename": "/d/f.md" })),
            call("A3", json!({ "filename": "f", "targetfile": "t", "weekday": "Monday" })),
            call("A4", json!({ "filename": "f", "targetfile": "t" })),
            call("A5", json!({ "log_dir_path": "d", "output_file_path": "o", "num_files": 1 })),
            call("A6", json!({ "doc_dir_path": "d", "output_file_path": "o" })),
            call("A7", json!({ "filename": "f", "output_file": "o" })),
            call("A8", json!({ "filename": "f", "image_path": "i" })),
            call("A9", json!({ "filename": "f", "output_filename": "o" })),
            call("A10", json!({ "filename": "f", "output_filename": "o", "query": "SELECT 1" })),
        ];
        let codes: Vec<&str> = calls
            .iter()
            .map(|c| Operation::from_call(c).unwrap().code())
            .collect();
        assert_eq!(codes, ["A1", "A2", "A3", "A4", "A5", "A6", "A7", "A8", "A9", "A10"]);
    }
}
