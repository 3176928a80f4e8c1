// Data models for TodoStore

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Progress,
    Completed,
}

impl TaskStatus {
    /// Next status in the pending -> progress -> completed -> pending cycle
    pub fn next(self) -> Self {
        match self {
            TaskStatus::Pending => TaskStatus::Progress,
            TaskStatus::Progress => TaskStatus::Completed,
            TaskStatus::Completed => TaskStatus::Pending,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Progress => "progress",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "progress" | "in-progress" => Ok(TaskStatus::Progress),
            "completed" | "done" => Ok(TaskStatus::Completed),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// Generates the lowercase string mapping shared by the fixed enumerations.
macro_rules! keyword_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let lowered = s.to_ascii_lowercase();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == lowered)
                    .ok_or_else(|| format!("unknown {}: {}", stringify!($name).to_lowercase(), s))
            }
        }
    };
}

keyword_enum!(
    /// Fixed task categories
    Category {
        Work => "work",
        Personal => "personal",
        Shopping => "shopping",
        Health => "health",
    }
);

keyword_enum!(
    Priority {
        High => "high",
        Medium => "medium",
        Low => "low",
    }
);

keyword_enum!(
    /// Labels a task can carry; a task holds each at most once
    Label {
        Urgent => "urgent",
        Review => "review",
        Important => "important",
        Later => "later",
    }
);

/// Attachment metadata (no file content is stored)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    /// Size in bytes as reported by the caller
    ///
    /// Older blobs hold display strings such as `"123KB"`; those are read
    /// back as bytes, and anything unreadable becomes 0.
    #[serde(default, deserialize_with = "lenient_size")]
    pub size: u64,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    File,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg"];

impl Attachment {
    pub fn kind(&self) -> AttachmentKind {
        AttachmentKind::from_name(&self.name)
    }
}

impl AttachmentKind {
    pub fn from_name(name: &str) -> Self {
        let ext = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
        match ext {
            Some(ext) if IMAGE_EXTENSIONS.contains(&ext.as_str()) => AttachmentKind::Image,
            _ => AttachmentKind::File,
        }
    }
}

/// Where a due date sits relative to the current day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueState {
    Overdue,
    Today,
    Upcoming,
}

/// A single to-do item
///
/// `completed` is not stored on the struct: it is derived from `status` and
/// written alongside it when the task is serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "StoredTask", from = "StoredTask")]
pub struct Task {
    pub id: String,
    pub text: String,
    pub status: TaskStatus,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub labels: Vec<Label>,
    /// Percentage 0..=100
    pub progress: u8,
    pub estimated_time: u32,
    pub actual_time: u32,
    /// Start of a running time-tracking interval
    pub tracking_since: Option<DateTime<Utc>>,
    pub dependencies: Vec<String>,
    pub attachments: Vec<Attachment>,
    pub order: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking_since.is_some()
    }

    pub fn has_label(&self, label: Label) -> bool {
        self.labels.contains(&label)
    }

    pub fn due_state(&self, today: NaiveDate) -> Option<DueState> {
        let due = self.due_date?.date_naive();
        Some(if due < today {
            DueState::Overdue
        } else if due == today {
            DueState::Today
        } else {
            DueState::Upcoming
        })
    }

    /// Case-insensitive substring match against text or notes
    pub fn matches_query(&self, query: &str) -> bool {
        if query.is_empty() {
            return true;
        }
        let needle = query.to_lowercase();
        self.text.to_lowercase().contains(&needle)
            || self
                .notes
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains(&needle))
    }
}

/// User-supplied fields for a new task
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub text: String,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub labels: Vec<Label>,
    pub estimated_time: u32,
}

impl TaskDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Fields to overlay onto an existing task
///
/// `None` leaves a field untouched; `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub text: Option<String>,
    pub status: Option<TaskStatus>,
    pub category: Option<Option<Category>>,
    pub priority: Option<Option<Priority>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub notes: Option<Option<String>>,
    pub labels: Option<Vec<Label>>,
    pub progress: Option<u8>,
    pub estimated_time: Option<u32>,
    pub actual_time: Option<u32>,
    pub dependencies: Option<Vec<String>>,
    pub attachments: Option<Vec<Attachment>>,
}

impl TaskPatch {
    /// Spread this patch over `task`, producing the next full task object
    pub fn apply_to(self, task: &Task) -> Task {
        let mut next = task.clone();
        if let Some(text) = self.text {
            let trimmed = text.trim();
            // Task text must stay non-empty

            if !trimmed.is_empty() {
                next.text = trimmed.to_string();
            }
        }
        if let Some(status) = self.status {
            next.status = status;
        }
        if let Some(category) = self.category {
            next.category = category;
        }
        if let Some(priority) = self.priority {
            next.priority = priority;
        }
        if let Some(due_date) = self.due_date {
            next.due_date = due_date;
        }
        if let Some(notes) = self.notes {
            next.notes = normalize_notes(notes);
        }
        if let Some(labels) = self.labels {
            next.labels = dedup_labels(labels);
        }
        if let Some(progress) = self.progress {
            next.progress = progress.min(100);
        }
        if let Some(estimated_time) = self.estimated_time {
            next.estimated_time = estimated_time;
        }
        if let Some(actual_time) = self.actual_time {
            next.actual_time = actual_time;
        }
        if let Some(dependencies) = self.dependencies {
            next.dependencies = dependencies;
        }
        if let Some(attachments) = self.attachments {
            next.attachments = attachments;
        }
        next
    }
}

pub(crate) fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

pub(crate) fn dedup_labels(labels: Vec<Label>) -> Vec<Label> {
    let mut out = Vec::with_capacity(labels.len());
    for label in labels {
        if !out.contains(&label) {
            out.push(label);
        }
    }
    out
}

// ============================================================================
// Persisted shape
// ============================================================================

/// On-disk representation of a task
///
/// Tolerates the older boolean-only shape: numeric ids, a missing `status`,
/// and `null` where collections or counters are expected. Unknown enum
/// strings are dropped instead of failing the whole collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTask {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    text: String,
    #[serde(default)]
    status: Option<TaskStatus>,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    labels: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    progress: u8,
    #[serde(default, deserialize_with = "null_as_default")]
    estimated_time: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    actual_time: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tracking_since: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    dependencies: Vec<StringOrNumber>,
    #[serde(default, deserialize_with = "null_as_default")]
    attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    order: Option<i64>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(i64),
}

impl From<StringOrNumber> for String {
    fn from(value: StringOrNumber) -> Self {
        match value {
            StringOrNumber::String(s) => s,
            StringOrNumber::Number(n) => n.to_string(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    StringOrNumber::deserialize(deserializer).map(String::from)
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSize {
    Bytes(u64),
    Float(f64),
    Text(String),
}

fn lenient_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let size = match Option::<RawSize>::deserialize(deserializer)? {
        None => 0,
        Some(RawSize::Bytes(n)) => n,
        Some(RawSize::Float(f)) if f.is_finite() && f >= 0.0 => f.round() as u64,
        Some(RawSize::Float(f)) => {
            warn!(size = f, "Dropping unreadable attachment size");
            0
        }
        Some(RawSize::Text(text)) => parse_size(&text).unwrap_or_else(|| {
            warn!(size = %text, "Dropping unreadable attachment size");
            0
        }),
    };
    Ok(size)
}

/// Parse a display size like `"123KB"` or `"1.5 MB"` into bytes (1024 base)
fn parse_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let split = text.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let number: f64 = number.parse().ok()?;
    let scale: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => 1 << 10,
        "M" | "MB" => 1 << 20,
        "G" | "GB" => 1 << 30,
        _ => return None,
    };
    Some((number * scale as f64).round() as u64)
}

fn parse_lenient<T: FromStr<Err = String>>(task_id: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(id = %task_id, error = %e, "Dropping unrecognized value");
            None
        }
    }
}

impl From<StoredTask> for Task {
    fn from(stored: StoredTask) -> Self {
        let status = stored.status.unwrap_or(if stored.completed {
            TaskStatus::Completed
        } else {
            TaskStatus::Pending
        });
        let category = parse_lenient(&stored.id, stored.category);
        let priority = parse_lenient(&stored.id, stored.priority);
        let labels = stored
            .labels
            .into_iter()
            .filter_map(|l| parse_lenient(&stored.id, Some(l)))
            .collect();

        let mut dependencies: Vec<String> = stored.dependencies.into_iter().map(String::from).collect();
        dependencies.retain(|d| d != &stored.id);

        Task {
            id: stored.id,
            text: stored.text,
            status,
            category,
            priority,
            due_date: stored.due_date,
            notes: stored.notes,
            labels: dedup_labels(labels),
            progress: stored.progress.min(100),
            estimated_time: stored.estimated_time,
            actual_time: stored.actual_time,
            tracking_since: stored.tracking_since,
            dependencies,
            attachments: stored.attachments,
            order: stored.order,
            created_at: stored.created_at,
        }
    }
}

impl From<Task> for StoredTask {
    fn from(task: Task) -> Self {
        StoredTask {
            completed: task.completed(),
            status: Some(task.status),
            category: task.category.map(|c| c.as_str().to_string()),
            priority: task.priority.map(|p| p.as_str().to_string()),
            labels: task.labels.iter().map(|l| l.as_str().to_string()).collect(),
            dependencies: task.dependencies.into_iter().map(StringOrNumber::String).collect(),
            id: task.id,
            text: task.text,
            due_date: task.due_date,
            notes: task.notes,
            progress: task.progress,
            estimated_time: task.estimated_time,
            actual_time: task.actual_time,
            tracking_since: task.tracking_since,
            attachments: task.attachments,
            order: task.order,
            created_at: task.created_at,
        }
    }
}

/// Helper function to get current timestamp in milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
