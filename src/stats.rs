// Derived statistics over the task collection

use crate::models::{Task, TaskStatus};

/// Counts recomputed from the collection on every read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub in_progress: usize,
}

impl Stats {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut stats = Stats {
            total: tasks.len(),
            ..Default::default()
        };
        for task in tasks {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Progress => stats.in_progress += 1,
                TaskStatus::Completed => stats.completed += 1,
            }
        }
        stats
    }

    /// Percentage of completed tasks, rounded; 0 for an empty collection
    pub fn completion_rate(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        (100.0 * self.completed as f64 / self.total as f64).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn task_with(status: TaskStatus) -> Task {
        Task {
            id: uuid::Uuid::now_v7().to_string(),
            text: "t".to_string(),
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
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_collection_rate_is_zero() {
        let stats = Stats::from_tasks(&[]);
        assert_eq!(stats, Stats::default());
        assert_eq!(stats.completion_rate(), 0);
    }

    #[test]
    fn test_counts_by_status() {
        let tasks = vec![
            task_with(TaskStatus::Pending),
            task_with(TaskStatus::Progress),
            task_with(TaskStatus::Completed),
        ];
        let stats = Stats::from_tasks(&tasks);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.completion_rate(), 33);
    }

    #[test]
    fn test_completion_rate_rounds() {
        let tasks = vec![
            task_with(TaskStatus::Completed),
            task_with(TaskStatus::Completed),
            task_with(TaskStatus::Pending),
        ];
        assert_eq!(Stats::from_tasks(&tasks).completion_rate(), 67);
    }
}
