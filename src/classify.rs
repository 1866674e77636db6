//! Intent classification: free text in, structured operation call out.
//!
//! The primary path sends the task and the full schema registry to an
//! OpenAI-compatible `/chat/completions` endpoint with automatic tool
//! selection and extracts the first tool call.  Every failure mode on that
//! path (transport error, non-2xx, missing tool call, malformed argument
//! JSON) degrades uniformly to the keyword fallback, which recognises the
//! ten canonical task phrasings with no I/O at all.

use crate::config::Config;
use crate::schema;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

const CLASSIFIER_PROMPT: &str =
    "You are a function classifier that extracts structured parameters from queries.";

/// Seconds before an in-flight classifier call is abandoned.
const CLASSIFY_TIMEOUT_SECS: u64 = 20;

/// The operation name + argument mapping produced by classification.
///
/// An absent `name` means "no match"; the dispatcher treats it the same as
/// an unknown name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredCall {
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Value,
}

impl StructuredCall {
    fn new(name: &str, arguments: Value) -> Self {
        Self { name: Some(name.to_string()), arguments }
    }
}

/// Default argument values substituted by the fallback rules.
#[derive(Debug, Clone)]
pub struct FallbackDefaults {
    pub user_email: String,
    /// Root directory the canonical phrasings refer to (normally `/data`).
    pub data_root: String,
}

impl FallbackDefaults {
    fn path(&self, file: &str) -> String {
        format!("{}/{}", self.data_root.trim_end_matches('/'), file)
    }
}

// ── Fallback rule table ─────────────────────────────────────────────────────

struct FallbackRule {
    /// Every keyword must appear in the lowercased task text.
    keywords: &'static [&'static str],
    build: fn(&FallbackDefaults) -> StructuredCall,
}

/// Ordered first-match-wins rules, one per operation.
static FALLBACK_RULES: &[FallbackRule] = &[
    FallbackRule {
        keywords: &["datagen.py"],
        build: |d| StructuredCall::new("A1", json!({ "email": d.user_email })),
    },
    FallbackRule {
        keywords: &["format the contents", "format.md"],
        build: |d| {
            StructuredCall::new(
                "A2",
                json!({ "prettier_version": "prettier@3.4.2", "filename": d.path("format.md") }),
            )
        },
    },
    FallbackRule {
        keywords: &["dates.txt", "wednesdays"],
        build: |d| {
            StructuredCall::new(
                "A3",
                json!({
                    "filename": d.path("dates.txt"),
                    "targetfile": d.path("dates-wednesdays.txt"),
                    "weekday": "Wednesday"
                }),
            )
        },
    },
    FallbackRule {
        keywords: &["contacts.json"],
        build: |d| {
            StructuredCall::new(
                "A4",
                json!({
                    "filename": d.path("contacts.json"),
                    "targetfile": d.path("contacts-sorted.json")
                }),
            )
        },
    },
    FallbackRule {
        keywords: &["logs", "log"],
        build: |d| {
            StructuredCall::new(
                "A5",
                json!({
                    "log_dir_path": d.path("logs"),
                    "output_file_path": d.path("logs-recent.txt"),
                    "num_files": 10
                }),
            )
        },
    },
    FallbackRule {
        keywords: &["docs", "index.json"],
        build: |d| {
            StructuredCall::new(
                "A6",
                json!({
                    "doc_dir_path": d.path("docs"),
                    "output_file_path": d.path("docs/index.json")
                }),
            )
        },
    },
    FallbackRule {
        keywords: &["email.txt", "email-sender.txt"],
        build: |d| {
            StructuredCall::new(
                "A7",
                json!({
                    "filename": d.path("email.txt"),
                    "output_file": d.path("email-sender.txt")
                }),
            )
        },
    },
    FallbackRule {
        keywords: &["credit_card.png", "credit-card.txt"],
        build: |d| {
            StructuredCall::new(
                "A8",
                json!({
                    "filename": d.path("credit-card.txt"),
                    "image_path": d.path("credit_card.png")
                }),
            )
        },
    },
    FallbackRule {
        keywords: &["comments.txt", "comments-similar.txt"],
        build: |d| {
            StructuredCall::new(
                "A9",
                json!({
                    "filename": d.path("comments.txt"),
                    "output_filename": d.path("comments-similar.txt")
                }),
            )
        },
    },
    FallbackRule {
        keywords: &["ticket-sales.db", "ticket-sales-gold.txt"],
        build: |d| {
            StructuredCall::new(
                "A10",
                json!({
                    "filename": d.path("ticket-sales.db"),
                    "output_filename": d.path("ticket-sales-gold.txt"),
                    "query": "SELECT SUM(units * price) FROM tickets WHERE type = 'Gold'"
                }),
            )
        },
    },
];

/// Deterministic keyword classifier.  Pure — no network, no filesystem.
/// Returns an empty call when no rule matches.
pub fn fallback_call(task: &str, defaults: &FallbackDefaults) -> StructuredCall {
    let lower = task.to_lowercase();
    for rule in FALLBACK_RULES {
        if rule.keywords.iter().all(|k| lower.contains(k)) {
            return (rule.build)(defaults);
        }
    }
    StructuredCall::default()
}

// ── Remote classifier ───────────────────────────────────────────────────────

/// Classifier with a network-backed primary path and the offline fallback.
pub struct Classifier {
    http: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
    model: String,
    defaults: FallbackDefaults,
}

impl Classifier {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(CLASSIFY_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: config.api_base.clone(),
            api_token: config.api_token.clone(),
            model: config.chat_model.clone(),
            defaults: FallbackDefaults {
                user_email: config.user_email.clone(),
                data_root: config.data_root.clone(),
            },
        })
    }

    /// Classify a task string into a [`StructuredCall`].
    ///
    /// Never fails: any primary-path error is logged and the fallback rules
    /// answer instead.  With no API token configured the primary path is
    /// skipped entirely.
    pub async fn classify(&self, task: &str) -> StructuredCall {
        if let Some(ref token) = self.api_token {
            match self.classify_remote(task, token).await {
                Ok(call) => return call,
                Err(e) => {
                    eprintln!("[classify] remote classifier failed, using keyword fallback: {e:#}");
                }
            }
        }
        fallback_call(task, &self.defaults)
    }

    /// Call the chat-completions endpoint with the registry as tool
    /// definitions and extract the first selected tool call.
    async fn classify_remote(&self, task: &str, token: &str) -> Result<StructuredCall> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": CLASSIFIER_PROMPT },
                { "role": "user", "content": task },
            ],
            "tools": schema::ops_openai(),
            "tool_choice": "auto",
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .context("HTTP request to classifier failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("classifier returned {}", resp.status());
        }

        let data: Value = resp.json().await.context("invalid JSON from classifier")?;

        // Fixed response path: choices[0].message.tool_calls[0].function.
        let func = data["choices"][0]["message"]["tool_calls"][0]
            .get("function")
            .context("no tool call in classifier response")?;
        let name = func["name"]
            .as_str()
            .context("tool call missing function name")?
            .to_string();
        let args_str = func["arguments"].as_str().unwrap_or("{}");
        let arguments: Value =
            serde_json::from_str(args_str).context("tool call arguments are not valid JSON")?;

        Ok(StructuredCall { name: Some(name), arguments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> FallbackDefaults {
        FallbackDefaults {
            user_email: "23f1002121@ds.study.iitm.ac.in".to_string(),
            data_root: "/data".to_string(),
        }
    }

    #[test]
    fn test_fallback_a1() {
        let call = fallback_call("Run datagen.py with my email as the argument", &defaults());
        assert_eq!(call.name.as_deref(), Some("A1"));
        assert_eq!(call.arguments["email"], "23f1002121@ds.study.iitm.ac.in");
    }

    #[test]
    fn test_fallback_a3_defaults() {
        let call = fallback_call(
            "The file /data/dates.txt contains dates; count the number of Wednesdays \
             and write the count to /data/dates-wednesdays.txt",
            &defaults(),
        );
        assert_eq!(call.name.as_deref(), Some("A3"));
        assert_eq!(call.arguments["filename"], "/data/dates.txt");
        assert_eq!(call.arguments["targetfile"], "/data/dates-wednesdays.txt");
        assert_eq!(call.arguments["weekday"], "Wednesday");
    }

    #[test]
    fn test_fallback_covers_all_ten() {
        let cases = [
            ("Run datagen.py to set everything up", "A1"),
            ("Format the contents of /data/format.md with prettier", "A2"),
            ("Count Wednesdays in /data/dates.txt", "A3"),
            ("Sort /data/contacts.json by last name", "A4"),
            ("Write the first line of the 10 most recent .log files in /data/logs", "A5"),
            ("Index the H1s of /data/docs markdown into /data/docs/index.json", "A6"),
            ("Take /data/email.txt and write the sender to /data/email-sender.txt", "A7"),
            ("Read /data/credit_card.png and write the number to /data/credit-card.txt", "A8"),
            ("Find the most similar comments.txt pair, write comments-similar.txt", "A9"),
            ("Total Gold sales from /data/ticket-sales.db into /data/ticket-sales-gold.txt", "A10"),
        ];
        let d = defaults();
        for (task, expected) in cases {
            let call = fallback_call(task, &d);
            assert_eq!(call.name.as_deref(), Some(expected), "task: {task}");
        }
    }

    #[test]
    fn test_fallback_is_case_insensitive() {
        let d = defaults();
        let a = fallback_call("count WEDNESDAYS in DATES.TXT", &d);
        let b = fallback_call("count wednesdays in dates.txt", &d);
        assert_eq!(a, b);
        assert_eq!(a.name.as_deref(), Some("A3"));
    }

    #[test]
    fn test_fallback_no_match_is_empty() {
        let call = fallback_call("please water my plants", &defaults());
        assert_eq!(call, StructuredCall::default());
        assert!(call.name.is_none());
    }

    #[test]
    fn test_fallback_respects_data_root() {
        let d = FallbackDefaults {
            user_email: "x@example.com".to_string(),
            data_root: "/tmp/sandbox/".to_string(),
        };
        let call = fallback_call("sort contacts.json please", &d);
        assert_eq!(call.arguments["filename"], "/tmp/sandbox/contacts.json");
    }
}
