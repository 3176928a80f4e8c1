// Task collection state manager

use crate::filter::ViewFilter;
use crate::models::{Attachment, Label, Task, TaskDraft, TaskPatch, TaskStatus, dedup_labels, normalize_notes};
use crate::stats::Stats;
use crate::storage::{Storage, validate_key};
use crate::tracking::elapsed_minutes;
use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Owns the ordered task collection and writes it back to storage after
/// every change
///
/// Operations that name an unknown id are no-ops and report `false`/`None`.
/// Errors are only returned when the storage backend fails; the in-memory
/// collection is then left as it was before the call.
pub struct TaskStore<S: Storage> {
    storage: S,
    key: String,
    tasks: Vec<Task>,
}

impl<S: Storage> TaskStore<S> {
    /// Restore the collection stored under `key`
    ///
    /// Missing or malformed data starts an empty collection.
    pub fn load(storage: S, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        validate_key(&key)?;

        let tasks = match storage.get(&key).context("Failed to read task collection")? {
            None => {
                debug!(key = %key, "No stored tasks, starting empty");
                Vec::new()
            }
            Some(blob) => match serde_json::from_str::<Vec<Task>>(&blob) {
                Ok(tasks) => dedup_ids(tasks),
                Err(e) => {
                    warn!(key = %key, error = %e, "Stored tasks are malformed, starting empty");
                    Vec::new()
                }
            },
        };

        info!(key = %key, count = tasks.len(), "Loaded tasks");
        Ok(Self { storage, key, tasks })
    }

    /// Serialize the whole collection and write it under the store's key
    pub fn persist(&mut self) -> Result<()> {
        let blob = serde_json::to_string(&self.tasks).context("Failed to serialize tasks")?;
        self.storage.set(&self.key, &blob)?;
        debug!(count = self.tasks.len(), "Persisted tasks");
        Ok(())
    }

    /// Write `next` to storage, and adopt it only once the write succeeded
    fn commit(&mut self, next: Vec<Task>) -> Result<()> {
        let blob = serde_json::to_string(&next).context("Failed to serialize tasks")?;
        self.storage.set(&self.key, &blob)?;
        self.tasks = next;
        debug!(count = self.tasks.len(), "Persisted tasks");
        Ok(())
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    // ========================================================================
    // Core operations
    // ========================================================================

    /// Create a task from `draft` and insert it at the front
    ///
    /// Returns `None` without touching the collection when the text is blank.
    pub fn create(&mut self, draft: TaskDraft) -> Result<Option<Task>> {
        let text = draft.text.trim();
        if text.is_empty() {
            debug!("Ignoring task with blank text");
            return Ok(None);
        }

        let task = Task {
            id: self.next_id(),
            text: text.to_string(),
            status: TaskStatus::Pending,
            category: draft.category,
            priority: draft.priority,
            due_date: draft.due_date,
            notes: normalize_notes(draft.notes),
            labels: dedup_labels(draft.labels),
            progress: 0,
            estimated_time: draft.estimated_time,
            actual_time: 0,
            tracking_since: None,
            dependencies: Vec::new(),
            attachments: Vec::new(),
            order: None,
            created_at: Utc::now(),
        };

        let mut next = self.tasks.clone();
        next.insert(0, task.clone());
        self.commit(next)?;

        info!(id = %task.id, "Created task");
        Ok(Some(task))
    }

    /// Replace the task matching `id` with `next`
    ///
    /// The stored id and creation time are kept, and the task is never allowed
    /// to depend on itself.
    pub fn update(&mut self, id: &str, mut next: Task) -> Result<bool> {
        let Some(pos) = self.position(id) else {
            debug!(id, "update: unknown id");
            return Ok(false);
        };

        let current = &self.tasks[pos];
        next.id = current.id.clone();
        next.created_at = current.created_at;
        next.dependencies.retain(|d| d != id);
        next.progress = next.progress.min(100);

        let mut tasks = self.tasks.clone();
        tasks[pos] = next;
        self.commit(tasks)?;

        debug!(id, "Updated task");
        Ok(true)
    }

    /// Overlay `patch` on the current task and store the result
    pub fn patch(&mut self, id: &str, patch: TaskPatch) -> Result<bool> {
        self.replace_with(id, |task| Some(patch.apply_to(task)))
    }

    /// Remove the task matching `id`
    ///
    /// Other tasks may keep referring to it in their dependencies; views skip
    /// ids that no longer resolve.
    pub fn delete(&mut self, id: &str) -> Result<bool> {
        let Some(pos) = self.position(id) else {
            debug!(id, "delete: unknown id");
            return Ok(false);
        };

        let mut next = self.tasks.clone();
        next.remove(pos);
        self.commit(next)?;
        info!(id, "Deleted task");
        Ok(true)
    }

    /// Advance status pending -> progress -> completed -> pending
    pub fn toggle_status(&mut self, id: &str) -> Result<bool> {
        self.replace_with(id, |task| {
            let mut next = task.clone();
            next.status = task.status.next();
            Some(next)
        })
    }

    pub fn set_status(&mut self, id: &str, status: TaskStatus) -> Result<bool> {
        self.patch(
            id,
            TaskPatch {
                status: Some(status),
                ..Default::default()
            },
        )
    }

    /// Move the item at `source` to `destination` within the view for `filter`
    ///
    /// Every task in the view then gets `order` equal to its new position.
    /// Tasks outside the view keep their previous `order`. A missing or
    /// out-of-range index cancels the move.
    pub fn reorder(&mut self, source: usize, destination: Option<usize>, filter: &ViewFilter) -> Result<bool> {
        let Some(destination) = destination else {
            debug!("reorder: drop cancelled");
            return Ok(false);
        };

        let mut ids: Vec<String> = self.view(filter).into_iter().map(|t| t.id.clone()).collect();
        if source >= ids.len() || destination >= ids.len() {
            debug!(source, destination, len = ids.len(), "reorder: index out of range");
            return Ok(false);
        }

        let moved = ids.remove(source);
        ids.insert(destination, moved);

        let positions: HashMap<&str, i64> = ids.iter().enumerate().map(|(i, id)| (id.as_str(), i as i64)).collect();
        let mut next = self.tasks.clone();
        for task in &mut next {
            if let Some(&order) = positions.get(task.id.as_str()) {
                task.order = Some(order);
            }
        }

        self.commit(next)?;
        info!(source, destination, "Reordered tasks");
        Ok(true)
    }

    /// Filtered, sorted view of the collection
    pub fn view(&self, filter: &ViewFilter) -> Vec<&Task> {
        filter.apply(&self.tasks)
    }

    pub fn stats(&self) -> Stats {
        Stats::from_tasks(&self.tasks)
    }

    // ========================================================================
    // Dependencies
    // ========================================================================

    /// Make `id` depend on `dep_id`
    ///
    /// Rejects self-dependencies, unknown targets, duplicates, and a direct
    /// cycle where `dep_id` already depends on `id`. Longer cycles are not
    /// checked.
    pub fn add_dependency(&mut self, id: &str, dep_id: &str) -> Result<bool> {
        if id == dep_id {
            debug!(id, "add_dependency: self dependency rejected");
            return Ok(false);
        }
        let Some(dep) = self.get(dep_id) else {
            debug!(id, dep_id, "add_dependency: unknown dependency");
            return Ok(false);
        };
        if dep.dependencies.iter().any(|d| d == id) {
            debug!(id, dep_id, "add_dependency: circular dependency rejected");
            return Ok(false);
        }

        self.replace_with(id, |task| {
            if task.dependencies.iter().any(|d| d == dep_id) {
                return None;
            }
            let mut next = task.clone();
            next.dependencies.push(dep_id.to_string());
            Some(next)
        })
    }

    pub fn remove_dependency(&mut self, id: &str, dep_id: &str) -> Result<bool> {
        self.replace_with(id, |task| {
            if !task.dependencies.iter().any(|d| d == dep_id) {
                return None;
            }
            let mut next = task.clone();
            next.dependencies.retain(|d| d != dep_id);
            Some(next)
        })
    }

    /// Dependencies of `id` that still exist and are not completed
    pub fn blocking_dependencies(&self, id: &str) -> Vec<&Task> {
        self.resolved_dependencies(id)
            .into_iter()
            .filter(|t| !t.completed())
            .collect()
    }

    /// Dependencies of `id` that resolve to live tasks, in declared order
    pub fn resolved_dependencies(&self, id: &str) -> Vec<&Task> {
        let Some(task) = self.get(id) else {
            return Vec::new();
        };
        task.dependencies.iter().filter_map(|dep| self.get(dep)).collect()
    }

    /// Tasks that `id` could take on as a new dependency
    pub fn available_dependencies(&self, id: &str) -> Vec<&Task> {
        let Some(task) = self.get(id) else {
            return Vec::new();
        };
        self.tasks
            .iter()
            .filter(|t| t.id != id && !task.dependencies.contains(&t.id) && !t.dependencies.iter().any(|d| d == id))
            .collect()
    }

    // ========================================================================
    // Attachments, labels, progress
    // ========================================================================

    /// Record attachment metadata on a task; blank names are ignored
    pub fn add_attachment(&mut self, id: &str, name: &str, size: u64) -> Result<Option<Attachment>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }

        let attachment = Attachment {
            id: self.next_id(),
            name: name.to_string(),
            size,
            added_at: Utc::now(),
        };

        let added = self.replace_with(id, |task| {
            let mut next = task.clone();
            next.attachments.push(attachment.clone());
            Some(next)
        })?;

        Ok(added.then_some(attachment))
    }

    pub fn remove_attachment(&mut self, id: &str, attachment_id: &str) -> Result<bool> {
        self.replace_with(id, |task| {
            if !task.attachments.iter().any(|a| a.id == attachment_id) {
                return None;
            }
            let mut next = task.clone();
            next.attachments.retain(|a| a.id != attachment_id);
            Some(next)
        })
    }

    /// Add `label` if absent, remove it if present
    pub fn toggle_label(&mut self, id: &str, label: Label) -> Result<bool> {
        self.replace_with(id, |task| {
            let mut next = task.clone();
            if next.has_label(label) {
                next.labels.retain(|l| *l != label);
            } else {
                next.labels.push(label);
            }
            Some(next)
        })
    }

    /// Shift progress by `delta` percentage points, clamped to 0..=100
    pub fn adjust_progress(&mut self, id: &str, delta: i32) -> Result<bool> {
        self.replace_with(id, |task| {
            let mut next = task.clone();
            next.progress = (i32::from(task.progress) + delta).clamp(0, 100) as u8;
            Some(next)
        })
    }

    pub fn set_estimate(&mut self, id: &str, minutes: u32) -> Result<bool> {
        self.patch(
            id,
            TaskPatch {
                estimated_time: Some(minutes),
                ..Default::default()
            },
        )
    }

    // ========================================================================
    // Time tracking
    // ========================================================================

    /// Open a tracking interval starting now
    pub fn start_tracking(&mut self, id: &str) -> Result<bool> {
        self.start_tracking_at(id, Utc::now())
    }

    pub fn start_tracking_at(&mut self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        self.replace_with(id, |task| {
            if task.is_tracking() {
                return None;
            }
            let mut next = task.clone();
            next.tracking_since = Some(now);
            Some(next)
        })
    }

    /// Close the open interval and add its rounded minutes to `actual_time`
    ///
    /// Returns the minutes added, or `None` when nothing was being tracked.
    pub fn stop_tracking(&mut self, id: &str) -> Result<Option<u32>> {
        self.stop_tracking_at(id, Utc::now())
    }

    pub fn stop_tracking_at(&mut self, id: &str, now: DateTime<Utc>) -> Result<Option<u32>> {
        let Some(since) = self.get(id).and_then(|t| t.tracking_since) else {
            return Ok(None);
        };

        let minutes = elapsed_minutes(since, now);
        self.replace_with(id, |task| {
            let mut next = task.clone();
            next.actual_time = task.actual_time.saturating_add(minutes);
            next.tracking_since = None;
            Some(next)
        })?;

        info!(id, minutes, "Stopped time tracking");
        Ok(Some(minutes))
    }

    /// Zero the tracked time and discard any open interval
    pub fn reset_time(&mut self, id: &str) -> Result<bool> {
        self.replace_with(id, |task| {
            let mut next = task.clone();
            next.actual_time = 0;
            next.tracking_since = None;
            Some(next)
        })
    }

    // ========================================================================
    // Helper methods
    // ========================================================================

    fn position(&self, id: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    /// Derive the next object from the current one and route it through
    /// `update`; `f` returning `None` means nothing changes.
    fn replace_with<F>(&mut self, id: &str, f: F) -> Result<bool>
    where
        F: FnOnce(&Task) -> Option<Task>,
    {
        let Some(current) = self.get(id) else {
            debug!(id, "unknown id");
            return Ok(false);
        };
        match f(current) {
            Some(next) => self.update(id, next),
            None => Ok(false),
        }
    }

    fn next_id(&self) -> String {
        loop {
            let id = Uuid::now_v7().to_string();
            if self.get(&id).is_none() {
                return id;
            }
        }
    }
}

/// Keep the first task for each id
fn dedup_ids(tasks: Vec<Task>) -> Vec<Task> {
    let mut seen = HashSet::new();
    let before = tasks.len();
    let tasks: Vec<Task> = tasks.into_iter().filter(|t| seen.insert(t.id.clone())).collect();
    if tasks.len() != before {
        warn!(dropped = before - tasks.len(), "Dropped tasks with duplicate ids");
    }
    tasks
}
