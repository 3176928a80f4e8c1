// View filtering and ordering for tasks

use crate::models::{Category, Priority, Task, TaskStatus};
use std::str::FromStr;

/// Status facet of a view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    /// Anything not completed (pending or in progress)
    Pending,
    Completed,
}

impl StatusFilter {
    pub fn matches(self, status: TaskStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Pending => status != TaskStatus::Completed,
            StatusFilter::Completed => status == TaskStatus::Completed,
        }
    }
}

impl std::fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusFilter::All => write!(f, "all"),
            StatusFilter::Pending => write!(f, "pending"),
            StatusFilter::Completed => write!(f, "completed"),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "pending" => Ok(StatusFilter::Pending),
            "completed" => Ok(StatusFilter::Completed),
            other => Err(format!("unknown status filter: {}", other)),
        }
    }
}

/// Filter for deriving a view of the task list
///
/// All facets must match. Unset facets match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewFilter {
    /// Case-insensitive substring of text or notes
    pub search: String,
    pub status: StatusFilter,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
}

impl ViewFilter {
    pub fn is_active(&self) -> bool {
        !self.search.is_empty() || self.status != StatusFilter::All || self.category.is_some() || self.priority.is_some()
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.status.matches(task.status)
            && self.category.is_none_or(|c| task.category == Some(c))
            && self.priority.is_none_or(|p| task.priority == Some(p))
            && task.matches_query(&self.search)
    }

    /// Filter and sort `tasks` into a display view
    pub fn apply<'a>(&self, tasks: &'a [Task]) -> Vec<&'a Task> {
        let mut view: Vec<&Task> = tasks.iter().filter(|t| self.matches(t)).collect();
        sort_view(&mut view);
        view
    }
}

/// Sort by `order` when every task has one, else newest first
///
/// Both sorts are stable, so ties keep collection order.
pub fn sort_view(view: &mut [&Task]) {
    if view.iter().all(|t| t.order.is_some()) {
        view.sort_by_key(|t| t.order);
    } else {
        view.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn task(id: &str, minutes: i64, status: TaskStatus) -> Task {
        Task {
            id: id.to_string(),
            text: format!("Task {}", id),
            status,
            category: None,
            priority: None,
            due_date: None,
            notes: None,
            labels: vec![],
            progress: 0,
            estimated_time: 0,
            actual_time: 0,
            tracking_since: None,
            dependencies: vec![],
            attachments: vec![],
            order: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes),
        }
    }

    #[test]
    fn test_status_filter_pending_includes_progress() {
        assert!(StatusFilter::Pending.matches(TaskStatus::Pending));
        assert!(StatusFilter::Pending.matches(TaskStatus::Progress));
        assert!(!StatusFilter::Pending.matches(TaskStatus::Completed));
        assert!(StatusFilter::Completed.matches(TaskStatus::Completed));
        assert!(StatusFilter::All.matches(TaskStatus::Progress));
    }

    #[test]
    fn test_status_filter_parse_and_display() {
        assert_eq!("Pending".parse::<StatusFilter>().unwrap(), StatusFilter::Pending);
        assert_eq!(StatusFilter::Completed.to_string(), "completed");
        assert!("progress".parse::<StatusFilter>().is_err());
    }

    #[test]
    fn test_view_filter_conjunction() {
        let mut a = task("a", 0, TaskStatus::Pending);
        a.category = Some(Category::Work);
        a.priority = Some(Priority::High);
        a.notes = Some("call the bank".to_string());
        let mut b = task("b", 1, TaskStatus::Pending);
        b.category = Some(Category::Work);
        let c = task("c", 2, TaskStatus::Completed);
        let tasks = vec![a, b, c];

        let filter = ViewFilter {
            category: Some(Category::Work),
            ..Default::default()
        };
        let ids: Vec<&str> = filter.apply(&tasks).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        let filter = ViewFilter {
            search: "BANK".to_string(),
            category: Some(Category::Work),
            priority: Some(Priority::High),
            ..Default::default()
        };
        let ids: Vec<&str> = filter.apply(&tasks).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
        assert!(filter.is_active());
        assert!(!ViewFilter::default().is_active());
    }

    #[test]
    fn test_sort_newest_first_without_full_order() {
        let mut a = task("a", 0, TaskStatus::Pending);
        a.order = Some(0);
        let b = task("b", 5, TaskStatus::Pending);
        let c = task("c", 3, TaskStatus::Pending);
        let tasks = vec![a, b, c];

        let ids: Vec<&str> = ViewFilter::default().apply(&tasks).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_sort_by_order_when_all_present() {
        let mut a = task("a", 0, TaskStatus::Pending);
        a.order = Some(2);
        let mut b = task("b", 5, TaskStatus::Pending);
        b.order = Some(0);
        let mut c = task("c", 3, TaskStatus::Pending);
        c.order = Some(1);
        let tasks = vec![a, b, c];

        let ids: Vec<&str> = ViewFilter::default().apply(&tasks).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_order_only_needs_to_cover_filtered_result() {
        let mut a = task("a", 0, TaskStatus::Pending);
        a.order = Some(1);
        let mut b = task("b", 5, TaskStatus::Pending);
        b.order = Some(0);
        let c = task("c", 9, TaskStatus::Completed);
        let tasks = vec![a, b, c];

        let filter = ViewFilter {
            status: StatusFilter::Pending,
            ..Default::default()
        };
        let ids: Vec<&str> = filter.apply(&tasks).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
