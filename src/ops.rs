//! Handler library: the ten deterministic file/data operations.
//!
//! Every handler is a stateless function of its validated arguments.  The
//! synchronous ones (A1–A8, A10) do plain blocking I/O and are run on the
//! blocking pool by the dispatcher; A9 is async because it calls the
//! embeddings provider.  Handlers never format boundary responses — they
//! return `Ok(())`/values for tests and rich `anyhow` errors on failure.

use crate::embeddings::EmbeddingProvider;
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::time::SystemTime;

// ── A1: run the external data generator ─────────────────────────────────────

/// Invoke the data-generation script with the account email as its sole
/// argument.  The script materialises the input files of every other
/// operation under the data root.
pub fn generate_data(script: &str, email: &str) -> Result<()> {
    let status = Command::new("python3")
        .arg(script)
        .arg(email)
        .status()
        .with_context(|| format!("Failed to launch data generator '{}'", script))?;

    if !status.success() {
        anyhow::bail!("data generator '{}' exited with {}", script, status);
    }
    Ok(())
}

// ── A2: format a markdown file with a pinned prettier ───────────────────────

/// Pipe the file's contents through `npx <version> --stdin-filepath <file>`
/// and write the formatted output back in place.
pub fn format_markdown(prettier_version: &str, filename: &str) -> Result<()> {
    let original = fs::read_to_string(filename)
        .with_context(|| format!("Failed to read file '{}'", filename))?;

    let mut child = Command::new("npx")
        .arg(prettier_version)
        .arg("--stdin-filepath")
        .arg(filename)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to launch npx {}", prettier_version))?;

    {
        let mut stdin = child.stdin.take().context("formatter stdin unavailable")?;
        stdin
            .write_all(original.as_bytes())
            .context("Failed to pipe file contents to the formatter")?;
    }

    let output = child.wait_with_output().context("Failed to wait for the formatter")?;
    if !output.status.success() {
        anyhow::bail!(
            "formatter exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    fs::write(filename, &output.stdout)
        .with_context(|| format!("Failed to write formatted file '{}'", filename))?;
    Ok(())
}

// ── A3: weekday counting over a dates file ──────────────────────────────────

/// Date/date-time layouts accepted by the dates file.  Date-times are tried
/// first so a time suffix never truncates to a bogus parse.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%d-%b-%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d-%b-%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %B %Y",
    "%m/%d/%Y",
];

/// Format-tolerant date parse.  Returns `None` for anything unrecognised.
pub fn parse_date_lenient(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.date());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, format) {
            return Some(d);
        }
    }
    None
}

/// Normalise a weekday name: case-insensitive, trailing-"s" tolerant
/// ("Wednesdays" → Wednesday).  An unrecognised name is a hard error.
pub fn parse_weekday(name: &str) -> Result<Weekday> {
    let lower = name.to_lowercase();
    match lower.trim_end_matches('s') {
        "monday" => Ok(Weekday::Mon),
        "tuesday" => Ok(Weekday::Tue),
        "wednesday" => Ok(Weekday::Wed),
        "thursday" => Ok(Weekday::Thu),
        "friday" => Ok(Weekday::Fri),
        "saturday" => Ok(Weekday::Sat),
        "sunday" => Ok(Weekday::Sun),
        _ => anyhow::bail!("Invalid weekday '{}'", name),
    }
}

/// Count the lines of `filename` whose date falls on `weekday` and write
/// the decimal count (no trailing newline) to `targetfile`.  Blank and
/// unparseable lines are skipped silently.
pub fn count_weekdays(filename: &Path, targetfile: &Path, weekday: &str) -> Result<u64> {
    let target_day = parse_weekday(weekday)?;

    let content = fs::read_to_string(filename)
        .with_context(|| format!("Failed to read dates file '{}'", filename.display()))?;

    let count = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(parse_date_lenient)
        .filter(|date| date.weekday() == target_day)
        .count() as u64;

    fs::write(targetfile, count.to_string())
        .with_context(|| format!("Failed to write count to '{}'", targetfile.display()))?;
    Ok(count)
}

// ── A4: stable two-key contact sort ─────────────────────────────────────────

fn contact_sort_key(contact: &Value) -> (String, String) {
    let field = |name: &str| {
        contact
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    };
    (field("last_name"), field("first_name"))
}

/// Sort the contacts array by `(last_name, first_name)` ascending, missing
/// keys sorting as empty strings, and write indented JSON.  The sort is
/// stable, so key ties keep their original relative order.
pub fn sort_contacts(filename: &Path, targetfile: &Path) -> Result<()> {
    let content = fs::read_to_string(filename)
        .with_context(|| format!("Failed to read contacts file '{}'", filename.display()))?;
    let mut contacts: Vec<Value> =
        serde_json::from_str(&content).context("Contacts file is not a JSON array")?;

    contacts.sort_by(|a, b| contact_sort_key(a).cmp(&contact_sort_key(b)));

    let sorted = serde_json::to_string_pretty(&contacts).context("Failed to serialise contacts")?;
    fs::write(targetfile, sorted)
        .with_context(|| format!("Failed to write sorted contacts to '{}'", targetfile.display()))?;
    Ok(())
}

// ── A5: first lines of the most recent logs ─────────────────────────────────

/// Write the first line of the `num_files` most recently modified `*.log`
/// files in `log_dir`, most recent first, one line per file.  Fewer files
/// than requested is fine; unreadable or empty files contribute an empty
/// line.  Returns the number of lines written.
pub fn recent_log_lines(log_dir: &Path, output: &Path, num_files: usize) -> Result<usize> {
    let pattern = format!("{}/*.log", log_dir.display().to_string().trim_end_matches('/'));
    let mut files: Vec<(PathBuf, SystemTime)> = Vec::new();

    for entry in glob::glob(&pattern).context("Invalid log directory pattern")? {
        let path = entry.context("Failed to read log directory entry")?;
        let mtime = fs::metadata(&path)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((path, mtime));
    }

    // Most recent first; ties keep glob's alphabetical order (stable sort).
    files.sort_by(|a, b| b.1.cmp(&a.1));
    files.truncate(num_files);

    let mut out = String::new();
    for (path, _) in &files {
        let first_line = fs::read_to_string(path)
            .ok()
            .and_then(|content| content.lines().next().map(|l| l.trim().to_string()))
            .unwrap_or_default();
        out.push_str(&first_line);
        out.push('\n');
    }

    fs::write(output, out)
        .with_context(|| format!("Failed to write log sample to '{}'", output.display()))?;
    Ok(files.len())
}

// ── A6: markdown H1 index ───────────────────────────────────────────────────

/// Recursively index every `.md` file under `doc_dir` by its first level-1
/// heading.  Files with no H1 are omitted.  The mapping (docs-relative path
/// → title) is written as indented JSON.  Returns the number of entries.
pub fn markdown_index(doc_dir: &Path, output: &Path) -> Result<usize> {
    let mut index: BTreeMap<String, String> = BTreeMap::new();

    for entry in walkdir::WalkDir::new(doc_dir) {
        let entry = entry.context("Failed to walk docs directory")?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read markdown file '{}'", path.display()))?;
        if let Some(title) = content
            .lines()
            .find(|line| line.starts_with("# "))
            .map(|line| line[2..].trim().to_string())
        {
            let rel = path.strip_prefix(doc_dir).unwrap_or(path);
            index.insert(rel.display().to_string(), title);
        }
    }

    let json = serde_json::to_string_pretty(&index).context("Failed to serialise index")?;
    fs::write(output, json)
        .with_context(|| format!("Failed to write index to '{}'", output.display()))?;
    Ok(index.len())
}

// ── A7: sender address extraction ───────────────────────────────────────────

static FROM_RE: OnceLock<Regex> = OnceLock::new();

/// Extract the address between angle brackets after a `From:` line and
/// write just the address.  No match writes an empty string.
pub fn extract_sender(filename: &Path, output: &Path) -> Result<String> {
    let content = fs::read_to_string(filename)
        .with_context(|| format!("Failed to read email file '{}'", filename.display()))?;

    let re = FROM_RE.get_or_init(|| Regex::new(r"From:.*<([^>]+)>").expect("valid sender pattern"));
    let email = re
        .captures(&content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    fs::write(output, &email)
        .with_context(|| format!("Failed to write sender to '{}'", output.display()))?;
    Ok(email)
}

// ── A8: credit-card record lookup ───────────────────────────────────────────

/// A generated credit-card record, keyed by the account it was generated
/// for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardRecord {
    pub email: String,
    pub number: String,
}

/// Collaborator seam for A8: given an identity, return its generated
/// credit-card record.  Production reads the generator's sidecar file;
/// tests stub this.
pub trait CardStore: Send + Sync {
    fn credit_card(&self, email: &str) -> Result<CardRecord>;
}

/// Reads the JSON record the data generator writes next to the card image.
pub struct SidecarCardStore {
    path: PathBuf,
}

impl SidecarCardStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CardStore for SidecarCardStore {
    fn credit_card(&self, email: &str) -> Result<CardRecord> {
        let content = fs::read_to_string(&self.path).with_context(|| {
            format!(
                "Failed to read card record '{}' — run the data generator first",
                self.path.display()
            )
        })?;
        let record: CardRecord =
            serde_json::from_str(&content).context("Malformed card record")?;
        if record.email != email {
            anyhow::bail!(
                "card record belongs to '{}', not configured account '{}'",
                record.email,
                email
            );
        }
        Ok(record)
    }
}

/// Write the account's card number, spaces removed, to `output`.  This is a
/// data lookup against the generated record, never OCR on the card image.
pub fn credit_card(output: &Path, store: &dyn CardStore, account_email: &str) -> Result<()> {
    let record = store.credit_card(account_email)?;
    let digits = record.number.replace(' ', "");
    fs::write(output, digits)
        .with_context(|| format!("Failed to write card number to '{}'", output.display()))?;
    Ok(())
}

// ── A9: most similar comment pair ───────────────────────────────────────────

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scan all ordered pairs `(i, j)` with `i < j` and return the first pair
/// with the strictly greatest dot product.  Deterministic for identical
/// inputs; self-pairs are excluded by construction.
pub fn most_similar_pair(vectors: &[Vec<f32>]) -> Option<(usize, usize)> {
    if vectors.len() < 2 {
        return None;
    }
    let mut best = (0, 1);
    let mut best_score = f32::NEG_INFINITY;
    for i in 0..vectors.len() {
        for j in (i + 1)..vectors.len() {
            let score = dot(&vectors[i], &vectors[j]);
            if score > best_score {
                best_score = score;
                best = (i, j);
            }
        }
    }
    Some(best)
}

/// Embed every non-blank line of `filename`, find the most similar pair,
/// and write the two comments sorted lexicographically, newline-separated
/// with no trailing newline.
pub async fn similar_comments(
    filename: &Path,
    output: &Path,
    embeddings: &dyn EmbeddingProvider,
) -> Result<()> {
    let content = fs::read_to_string(filename)
        .with_context(|| format!("Failed to read comments file '{}'", filename.display()))?;
    let comments: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();

    if comments.len() < 2 {
        anyhow::bail!("Not enough comments in the file.");
    }

    let vectors = embeddings.embed_batch(&comments).await?;
    if vectors.len() != comments.len() {
        anyhow::bail!("Mismatch between number of comments and embeddings returned.");
    }

    let (i, j) = most_similar_pair(&vectors).context("No comment pair to compare")?;
    let mut pair = [comments[i].as_str(), comments[j].as_str()];
    pair.sort();

    fs::write(output, format!("{}\n{}", pair[0], pair[1]))
        .with_context(|| format!("Failed to write similar pair to '{}'", output.display()))?;
    Ok(())
}

// ── A10: SQL scalar extraction ──────────────────────────────────────────────

/// Execute `query` against the SQLite database and write the first column
/// of the first row as text.  Zero rows and NULL both coerce to `"0"`;
/// extra rows and columns are ignored.
pub fn run_sql(db: &Path, output: &Path, query: &str) -> Result<String> {
    let conn = rusqlite::Connection::open(db)
        .with_context(|| format!("Failed to open database '{}'", db.display()))?;
    let mut stmt = conn.prepare(query).context("Failed to prepare query")?;
    let mut rows = stmt.query([]).context("Failed to execute query")?;

    let text = match rows.next().context("Failed to fetch result row")? {
        Some(row) => {
            use rusqlite::types::ValueRef;
            match row.get_ref(0).context("Failed to read result column")? {
                ValueRef::Null => "0".to_string(),
                ValueRef::Integer(i) => i.to_string(),
                ValueRef::Real(f) => f.to_string(),
                ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
                ValueRef::Blob(b) => String::from_utf8_lossy(b).into_owned(),
            }
        }
        None => "0".to_string(),
    };

    fs::write(output, &text)
        .with_context(|| format!("Failed to write query result to '{}'", output.display()))?;
    Ok(text)
}
