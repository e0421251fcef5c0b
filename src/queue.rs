//! The review queue. Proposed changes are written out as bash scripts
//! that call `dbcli`; an operator reads them and runs the ones they
//! accept.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use time::OffsetDateTime;

use crate::comment::Suggestion;
use crate::errors::BackendError;

const VALID_TABLES: &str = "venue, session, comment, rating";
const MAX_TITLE_LENGTH: usize = 64;
const MAX_ATTEMPTS: usize = 5;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Table {
    Venue,
    Session,
    Comment,
    Rating,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Venue => "venue",
            Table::Session => "session",
            Table::Comment => "comment",
            Table::Rating => "rating",
        }
    }
}

impl FromStr for Table {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "venue" => Ok(Table::Venue),
            "session" => Ok(Table::Session),
            "comment" => Ok(Table::Comment),
            "rating" => Ok(Table::Rating),
            _ => Err(BackendError::InvalidTable {
                table: s.to_owned(),
                valid: VALID_TABLES,
            }),
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The shell variable holding the ID printed by an earlier insert. It
/// can only be obtained from [`Script::insert_captured`], so every
/// reference in a script is bound by a preceding step.
#[derive(Debug)]
pub struct Captured(String);

impl Captured {
    pub fn variable(&self) -> &str {
        &self.0
    }
}

#[derive(Debug)]
enum Step {
    Insert {
        table: Table,
        payload: String,
        capture: Option<String>,
    },
    Update {
        table: Table,
        id: i32,
        payload: String,
    },
    Delete {
        table: Table,
        id: i32,
    },
}

/// A reviewable change, built up step by step.
#[derive(Debug)]
pub struct Script {
    title: String,
    steps: Vec<Step>,
    notes: Vec<(&'static str, String)>,
}

impl Script {
    pub fn new(title: impl AsRef<str>) -> Self {
        Script {
            title: sanitize_title(title.as_ref()),
            steps: vec![],
            notes: vec![],
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn insert<T: Serialize>(&mut self, table: Table, payload: &T) -> Result<(), BackendError> {
        self.steps.push(Step::Insert {
            table,
            payload: quote(&to_json(payload)?),
            capture: None,
        });

        Ok(())
    }

    /// Adds an insert whose new ID is kept for later steps.
    pub fn insert_captured<T: Serialize>(
        &mut self,
        table: Table,
        payload: &T,
    ) -> Result<Captured, BackendError> {
        let variable = self.fresh_variable(table);

        self.steps.push(Step::Insert {
            table,
            payload: quote(&to_json(payload)?),
            capture: Some(variable.clone()),
        });

        Ok(Captured(variable))
    }

    /// Adds an insert whose `field` is set to a captured ID when the
    /// script runs. Any value `payload` has for `field` is replaced.
    pub fn insert_referencing<T: Serialize>(
        &mut self,
        table: Table,
        payload: &T,
        field: &str,
        captured: &Captured,
    ) -> Result<(), BackendError> {
        let object = match serde_json::to_value(payload)
            .map_err(|source| BackendError::Serialization { source })?
        {
            Value::Object(object) => object,
            _ => return Err(BackendError::MissingField("payload object")),
        };

        // rebuilt rather than removed from, so the remaining keys keep
        // the order they were serialized in
        let kept: Map<String, Value> = object.into_iter().filter(|(key, _)| key != field).collect();
        let is_empty = kept.is_empty();
        let value = Value::Object(kept);

        let json = to_json(&value)?;
        let escaped = escape(&json[..json.len() - 1]);
        let separator = if is_empty { "" } else { "," };

        self.steps.push(Step::Insert {
            table,
            payload: format!(
                "\"{}{}\\\"{}\\\":${}}}\"",
                escaped,
                separator,
                escape(field),
                captured.variable()
            ),
            capture: None,
        });

        Ok(())
    }

    pub fn update<T: Serialize>(
        &mut self,
        table: Table,
        id: i32,
        payload: &T,
    ) -> Result<(), BackendError> {
        self.steps.push(Step::Update {
            table,
            id,
            payload: quote(&to_json(payload)?),
        });

        Ok(())
    }

    pub fn delete(&mut self, table: Table, id: i32) {
        self.steps.push(Step::Delete { table, id });
    }

    /// Attaches a comment for the reviewer.
    pub fn note(&mut self, label: &'static str, text: impl AsRef<str>) {
        let flattened = text
            .as_ref()
            .replace(|c: char| c == '\n' || c == '\r', " ");

        self.notes.push((label, flattened));
    }

    /// Renders the script, invoking `command` for every step.
    pub fn render(&self, command: &str) -> String {
        let command = shell_word(command);
        let mut lines = vec!["#!/usr/bin/env bash".to_owned(), "set -euo pipefail".to_owned(), String::new()];

        for step in &self.steps {
            lines.push(match step {
                Step::Insert {
                    table,
                    payload,
                    capture: Some(variable),
                } => format!("{}=$({} insert {} {})", variable, command, table, payload),
                Step::Insert { table, payload, .. } => {
                    format!("{} insert {} {}", command, table, payload)
                }
                Step::Update { table, id, payload } => {
                    format!("{} update {} {} {}", command, table, id, payload)
                }
                Step::Delete { table, id } => format!("{} delete {} {}", command, table, id),
            });
        }

        if !self.notes.is_empty() {
            lines.push(String::new());
        }

        for (label, text) in &self.notes {
            lines.push(format!("# {}: {}", label, text));
        }

        let mut script = lines.join("\n");
        script.push('\n');
        script
    }

    fn fresh_variable(&self, table: Table) -> String {
        let base = format!("new_{}_id", table);
        let taken = |name: &str| {
            self.steps
                .iter()
                .any(|step| matches!(step, Step::Insert { capture: Some(v), .. } if v == name))
        };

        if !taken(&base) {
            return base;
        }

        (2..)
            .map(|n| format!("{}_{}", base, n))
            .find(|name| !taken(name))
            .unwrap_or(base)
    }
}

fn to_json<T: Serialize>(payload: &T) -> Result<String, BackendError> {
    serde_json::to_string(payload).map_err(|source| BackendError::Serialization { source })
}

/// Escapes text for use inside a bash double-quoted string.
pub fn escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());

    for c in s.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}

fn quote(s: &str) -> String {
    format!("\"{}\"", escape(s))
}

/// `command` as one shell word, quoted only when it has to be.
fn shell_word(command: &str) -> String {
    let plain = !command.is_empty()
        && command
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:=@%,".contains(c));

    if plain {
        command.to_owned()
    } else {
        quote(command)
    }
}

fn sanitize_title(title: &str) -> String {
    let sanitized: String = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_TITLE_LENGTH)
        .collect();

    if sanitized.is_empty() {
        "change".to_owned()
    } else {
        sanitized
    }
}

/// A time-ordered file name prefix, unique down to the nanosecond.
fn timestamp_prefix(now: OffsetDateTime) -> String {
    format!("{}_{:09}", now.format("%Y%m%d_%H%M%S"), now.nanosecond())
}

/// Somewhere to put proposed changes.
pub trait ReviewQueue {
    /// Queues a script and returns where it was written.
    fn submit(&self, script: Script) -> BoxFuture<Result<PathBuf, BackendError>>;

    /// Files a free-text suggestion about a session.
    fn suggest(
        &self,
        session_id: i32,
        suggestion: Suggestion,
    ) -> BoxFuture<Result<PathBuf, BackendError>>;
}

/// Writes scripts and suggestions to two directories.
#[derive(Clone, Debug)]
pub struct DirectoryQueue {
    scripts: PathBuf,
    suggestions: PathBuf,
    command: String,
}

impl DirectoryQueue {
    pub fn new(scripts: PathBuf, suggestions: PathBuf, command: impl Into<String>) -> Self {
        DirectoryQueue {
            scripts,
            suggestions,
            command: command.into(),
        }
    }

    pub fn scripts_directory(&self) -> &Path {
        &self.scripts
    }

    pub fn suggestions_directory(&self) -> &Path {
        &self.suggestions
    }
}

impl ReviewQueue for DirectoryQueue {
    fn submit(&self, script: Script) -> BoxFuture<Result<PathBuf, BackendError>> {
        let directory = self.scripts.clone();
        let contents = script.render(&self.command);
        let title = script.title;

        async move {
            spawn_write(move || {
                write_new_file(&directory, 0o755, &contents, |now| {
                    format!("{}_{}.sh", timestamp_prefix(now), title)
                })
            })
            .await
        }
        .boxed()
    }

    fn suggest(
        &self,
        session_id: i32,
        suggestion: Suggestion,
    ) -> BoxFuture<Result<PathBuf, BackendError>> {
        let directory = self.suggestions.clone();

        let mut contents = format!("Session {}: {}\n", session_id, suggestion.content);
        if let Some(author) = suggestion.author {
            contents.push_str(&format!("Author: {}\n", author));
        }

        async move {
            spawn_write(move || {
                write_new_file(&directory, 0o644, &contents, |now| {
                    format!("{}_session_{}.txt", timestamp_prefix(now), session_id)
                })
            })
            .await
        }
        .boxed()
    }
}

async fn spawn_write(
    write: impl FnOnce() -> io::Result<PathBuf> + Send + 'static,
) -> Result<PathBuf, BackendError> {
    tokio::task::spawn_blocking(write)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
        .and_then(|result| result)
        .map_err(|source| BackendError::QueueWriteFailed { source })
}

/// Writes `contents` through a temporary file so that readers never
/// see a partial file, without replacing anything already queued.
fn write_new_file(
    directory: &Path,
    mode: u32,
    contents: &str,
    name: impl Fn(OffsetDateTime) -> String,
) -> io::Result<PathBuf> {
    fs::create_dir_all(directory)?;

    let mut file = NamedTempFile::new_in(directory)?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    set_mode(file.path(), mode)?;

    let mut attempt = 0;

    loop {
        let path = directory.join(name(OffsetDateTime::now_utc()));

        match file.persist_noclobber(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists && attempt < MAX_ATTEMPTS => {
                attempt += 1;
                file = e.file;
            }
            Err(e) => return Err(e.error),
        }
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
