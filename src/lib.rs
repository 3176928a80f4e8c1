// TodoStore - Task list state with filtered views and key-value persistence

pub mod config;
pub mod filter;
pub mod models;
pub mod prefs;
pub mod stats;
pub mod storage;
pub mod store;
pub mod tracking;

// Re-export main types for convenience
pub use config::{Backend, Config};
pub use filter::{StatusFilter, ViewFilter};
pub use models::{
    Attachment, AttachmentKind, Category, DueState, Label, Priority, Task, TaskDraft, TaskPatch, TaskStatus, now_ms,
};
pub use stats::Stats;
pub use storage::{FileStorage, MemoryStorage, SqliteStorage, Storage};
pub use store::TaskStore;
