use chrono::{DateTime, Local, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use eyre::{Result, eyre};
use std::path::PathBuf;
use todostore::tracking::{format_minutes, is_over_time, time_progress};
use todostore::{
    AttachmentKind, Category, Config, DueState, Label, Priority, StatusFilter, Storage, Task, TaskDraft, TaskPatch,
    TaskStatus, TaskStore, ViewFilter, prefs,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "todostore")]
#[command(about = "TodoStore CLI - Task list with filtering, reordering and local persistence")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Path to a YAML config file (default: <config dir>/todostore/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured data directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct FilterArgs {
    /// Match text or notes (case-insensitive)
    #[arg(short, long, default_value = "")]
    search: String,

    /// all | pending | completed
    #[arg(long, default_value = "all")]
    status: StatusFilter,

    #[arg(long)]
    category: Option<Category>,

    #[arg(long)]
    priority: Option<Priority>,
}

impl From<FilterArgs> for ViewFilter {
    fn from(args: FilterArgs) -> Self {
        ViewFilter {
            search: args.search,
            status: args.status,
            category: args.category,
            priority: args.priority,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new task
    Add {
        text: Vec<String>,
        #[arg(long)]
        category: Option<Category>,
        #[arg(long)]
        priority: Option<Priority>,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long = "label")]
        labels: Vec<Label>,
        /// Estimated minutes
        #[arg(long, default_value_t = 0)]
        estimate: u32,
    },

    /// List tasks in display order
    List {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Show one task with its dependencies and attachments
    Show { id: String },

    /// Change fields of a task
    Edit {
        id: String,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        category: Option<Category>,
        #[arg(long, conflicts_with = "category")]
        clear_category: bool,
        #[arg(long)]
        priority: Option<Priority>,
        #[arg(long, conflicts_with = "priority")]
        clear_priority: bool,
        #[arg(long)]
        due: Option<NaiveDate>,
        #[arg(long, conflicts_with = "due")]
        clear_due: bool,
        /// New notes; an empty string clears them
        #[arg(long)]
        notes: Option<String>,
    },

    /// Delete a task
    Rm { id: String },

    /// Cycle status pending -> progress -> completed
    Toggle { id: String },

    /// Set status directly
    Status { id: String, status: TaskStatus },

    /// Move a task within the (filtered) list; omit TO to cancel
    Move {
        from: usize,
        to: Option<usize>,
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Manage dependencies
    Dep {
        #[command(subcommand)]
        command: DepCommands,
    },

    /// Manage attachment metadata
    Attach {
        #[command(subcommand)]
        command: AttachCommands,
    },

    /// Toggle a label on a task
    Label { id: String, label: Label },

    /// Adjust progress by a number of percentage points
    Progress {
        id: String,
        #[arg(allow_hyphen_values = true)]
        delta: i32,
    },

    /// Set the estimated time in minutes
    Estimate { id: String, minutes: u32 },

    /// Track time spent on a task
    Track {
        #[command(subcommand)]
        command: TrackCommands,
    },

    /// Show completion statistics
    Stats,

    /// Show or change the dark mode preference
    Theme {
        #[arg(long, conflicts_with = "off")]
        on: bool,
        #[arg(long)]
        off: bool,
        /// Flip the current setting
        #[arg(long, conflicts_with_all = ["on", "off"])]
        toggle: bool,
    },
}

#[derive(Subcommand)]
enum DepCommands {
    /// Make ID depend on DEP
    Add { id: String, dep: String },
    Rm { id: String, dep: String },
    /// List dependencies and candidates
    Show { id: String },
}

#[derive(Subcommand)]
enum AttachCommands {
    Add {
        id: String,
        name: String,
        /// Size in bytes
        #[arg(long, default_value_t = 0)]
        size: u64,
    },
    Rm { id: String, attachment: String },
}

#[derive(Subcommand)]
enum TrackCommands {
    Start { id: String },
    Stop { id: String },
    Reset { id: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }

    // Setup tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let storage = config.open_storage()?;
    let mut store = TaskStore::load(storage, config.tasks_key.clone())?;

    run(&mut store, &config, cli.command)
}

fn run<S: Storage>(store: &mut TaskStore<S>, config: &Config, command: Commands) -> Result<()> {
    match command {
        Commands::Add {
            text,
            category,
            priority,
            due,
            notes,
            labels,
            estimate,
        } => {
            let draft = TaskDraft {
                text: text.join(" "),
                category,
                priority,
                due_date: due.map(start_of_day).transpose()?,
                notes,
                labels,
                estimated_time: estimate,
            };
            match store.create(draft)? {
                Some(task) => println!("{} {}", "Added".green(), format_task(&task)),
                None => println!("{}", "Task text cannot be empty".yellow()),
            }
        }

        Commands::List { filter } => {
            let filter = ViewFilter::from(filter);
            let view = store.view(&filter);
            let stats = store.stats();
            if stats.total > 0 {
                println!("{} of {} tasks completed", stats.completed, stats.total);
            }
            if view.is_empty() {
                if filter.is_active() {
                    println!("{}", "No tasks match the current filters".dimmed());
                } else {
                    println!("{}", "No tasks yet. Add one to get started!".dimmed());
                }
            }
            for (i, task) in view.iter().enumerate() {
                let blocked = !store.blocking_dependencies(&task.id).is_empty();
                let marker = if blocked { " blocked".yellow().to_string() } else { String::new() };
                println!("{:>3}. {}{}", i, format_task(task), marker);
            }
        }

        Commands::Show { id } => {
            let task = lookup(store, &id)?;
            print_details(store, task);
        }

        Commands::Edit {
            id,
            text,
            category,
            clear_category,
            priority,
            clear_priority,
            due,
            clear_due,
            notes,
        } => {
            let id = resolve(store, &id)?;
            let patch = TaskPatch {
                text,
                category: if clear_category { Some(None) } else { category.map(Some) },
                priority: if clear_priority { Some(None) } else { priority.map(Some) },
                due_date: if clear_due {
                    Some(None)
                } else {
                    due.map(start_of_day).transpose()?.map(Some)
                },
                notes: notes.map(Some),
                ..Default::default()
            };
            store.patch(&id, patch)?;
            if let Some(task) = store.get(&id) {
                println!("{} {}", "Updated".green(), format_task(task));
            }
        }

        Commands::Rm { id } => {
            let id = resolve(store, &id)?;
            if store.delete(&id)? {
                println!("{} {}", "Deleted".red(), short_id(&id));
            }
        }

        Commands::Toggle { id } => {
            let id = resolve(store, &id)?;
            store.toggle_status(&id)?;
            if let Some(task) = store.get(&id) {
                println!("{}", format_task(task));
            }
        }

        Commands::Status { id, status } => {
            let id = resolve(store, &id)?;
            store.set_status(&id, status)?;
            if let Some(task) = store.get(&id) {
                println!("{}", format_task(task));
            }
        }

        Commands::Move { from, to, filter } => {
            let filter = ViewFilter::from(filter);
            if store.reorder(from, to, &filter)? {
                for (i, task) in store.view(&filter).iter().enumerate() {
                    println!("{:>3}. {}", i, format_task(task));
                }
            } else {
                println!("{}", "Move cancelled".dimmed());
            }
        }

        Commands::Dep { command } => run_dep(store, command)?,

        Commands::Attach { command } => match command {
            AttachCommands::Add { id, name, size } => {
                let id = resolve(store, &id)?;
                match store.add_attachment(&id, &name, size)? {
                    Some(att) => println!("{} {} ({})", "Attached".green(), att.name, short_id(&att.id)),
                    None => println!("{}", "Attachment name cannot be empty".yellow()),
                }
            }
            AttachCommands::Rm { id, attachment } => {
                let id = resolve(store, &id)?;
                let attachment_id = store.get(&id).and_then(|t| {
                    t.attachments
                        .iter()
                        .find(|a| matches_id(&a.id, &attachment))
                        .map(|a| a.id.clone())
                });
                let att_id = attachment_id.ok_or_else(|| eyre!("No attachment matching '{}'", attachment))?;
                store.remove_attachment(&id, &att_id)?;
                println!("{} {}", "Removed attachment".red(), short_id(&att_id));
            }
        },

        Commands::Label { id, label } => {
            let id = resolve(store, &id)?;
            store.toggle_label(&id, label)?;
            if let Some(task) = store.get(&id) {
                println!("{}", format_task(task));
            }
        }

        Commands::Progress { id, delta } => {
            let id = resolve(store, &id)?;
            store.adjust_progress(&id, delta)?;
            if let Some(task) = store.get(&id) {
                println!("{}: {}%", task.text, task.progress);
            }
        }

        Commands::Estimate { id, minutes } => {
            let id = resolve(store, &id)?;
            store.set_estimate(&id, minutes)?;
            println!("Estimated {}", format_minutes(minutes));
        }

        Commands::Track { command } => run_track(store, command)?,

        Commands::Stats => {
            let stats = store.stats();
            println!("Total:       {}", stats.total);
            println!("Pending:     {}", stats.pending);
            println!("In progress: {}", stats.in_progress);
            println!("Completed:   {}", stats.completed);
            println!("Completion:  {}%", stats.completion_rate());
        }

        Commands::Theme { on, off, toggle } => {
            let key = config.dark_mode_key.as_str();
            let storage = store.storage_mut();
            let enabled = if toggle {
                prefs::toggle_dark_mode(storage, key)?
            } else if on || off {
                prefs::set_dark_mode(storage, key, on)?;
                on
            } else {
                prefs::dark_mode(&*storage, key)?
            };
            println!("Dark mode: {}", if enabled { "on" } else { "off" });
        }
    }

    Ok(())
}

fn run_dep<S: Storage>(store: &mut TaskStore<S>, command: DepCommands) -> Result<()> {
    match command {
        DepCommands::Add { id, dep } => {
            let id = resolve(store, &id)?;
            let dep = resolve(store, &dep)?;
            if store.add_dependency(&id, &dep)? {
                println!("{} {} now depends on {}", "Linked".green(), short_id(&id), short_id(&dep));
            } else {
                println!("{}", "Dependency rejected (self, duplicate or circular)".yellow());
            }
        }
        DepCommands::Rm { id, dep } => {
            let id = resolve(store, &id)?;
            let dep_id = store
                .get(&id)
                .and_then(|t| t.dependencies.iter().find(|d| matches_id(d, &dep)).cloned());
            let dep_id = dep_id.ok_or_else(|| eyre!("No dependency matching '{}'", dep))?;
            store.remove_dependency(&id, &dep_id)?;
            println!("{} {}", "Unlinked".red(), short_id(&dep_id));
        }
        DepCommands::Show { id } => {
            let task = lookup(store, &id)?;
            println!("{}", format_task(task));
            println!("Depends on:");
            for dep in store.resolved_dependencies(&task.id) {
                println!("  {}", format_task(dep));
            }
            println!("Available:");
            for candidate in store.available_dependencies(&task.id) {
                println!("  {}", format_task(candidate));
            }
        }
    }
    Ok(())
}

fn run_track<S: Storage>(store: &mut TaskStore<S>, command: TrackCommands) -> Result<()> {
    match command {
        TrackCommands::Start { id } => {
            let id = resolve(store, &id)?;
            if store.start_tracking(&id)? {
                println!("{}", "Tracking time...".cyan());
            } else {
                println!("{}", "Already tracking".yellow());
            }
        }
        TrackCommands::Stop { id } => {
            let id = resolve(store, &id)?;
            match store.stop_tracking(&id)? {
                Some(minutes) => {
                    let total = store.get(&id).map(|t| t.actual_time).unwrap_or_default();
                    println!("Tracked {} (total {})", format_minutes(minutes), format_minutes(total));
                }
                None => println!("{}", "Not tracking".yellow()),
            }
        }
        TrackCommands::Reset { id } => {
            let id = resolve(store, &id)?;
            store.reset_time(&id)?;
            println!("Time reset");
        }
    }
    Ok(())
}

/// Resolve an exact id or a unique id prefix/suffix
fn resolve<S: Storage>(store: &TaskStore<S>, query: &str) -> Result<String> {
    lookup(store, query).map(|t| t.id.clone())
}

fn lookup<'a, S: Storage>(store: &'a TaskStore<S>, query: &str) -> Result<&'a Task> {
    if let Some(task) = store.get(query) {
        return Ok(task);
    }
    let mut matches = store.tasks().iter().filter(|t| matches_id(&t.id, query));
    match (matches.next(), matches.next()) {
        (Some(task), None) => Ok(task),
        (Some(_), Some(_)) => Err(eyre!("Ambiguous id '{}'", query)),
        _ => Err(eyre!("No task matching '{}'", query)),
    }
}

fn matches_id(id: &str, query: &str) -> bool {
    !query.is_empty() && (id.starts_with(query) || id.ends_with(query))
}

fn start_of_day(date: NaiveDate) -> Result<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| eyre!("Invalid date: {}", date))
}

/// Last 8 characters: UUID v7 ids share their leading timestamp bits
fn short_id(id: &str) -> &str {
    let start = id.char_indices().rev().nth(7).map(|(i, _)| i).unwrap_or(0);
    &id[start..]
}

fn format_task(task: &Task) -> String {
    let status = match task.status {
        TaskStatus::Pending => "[ ]".normal(),
        TaskStatus::Progress => "[~]".cyan(),
        TaskStatus::Completed => "[x]".green(),
    };
    let text = if task.completed() {
        task.text.strikethrough().dimmed().to_string()
    } else {
        task.text.clone()
    };

    let mut parts = vec![format!("{} {} {}", short_id(&task.id).dimmed(), status, text)];
    if let Some(category) = task.category {
        parts.push(category.to_string().blue().to_string());
    }
    if let Some(priority) = task.priority {
        let p = match priority {
            Priority::High => priority.to_string().red(),
            Priority::Medium => priority.to_string().yellow(),
            Priority::Low => priority.to_string().green(),
        };
        parts.push(p.to_string());
    }
    if let Some(due) = task.due_date {
        let label = format!("due {}", due.format("%b %d"));
        let colored = match task.due_state(Local::now().date_naive()) {
            Some(DueState::Overdue) => label.red(),
            Some(DueState::Today) => label.blue(),
            _ => label.green(),
        };
        parts.push(colored.to_string());
    }
    for label in &task.labels {
        parts.push(format!("#{}", label).magenta().to_string());
    }
    if task.estimated_time > 0 || task.actual_time > 0 {
        let time = format!("{}/{}", format_minutes(task.actual_time), format_minutes(task.estimated_time));
        if is_over_time(task.actual_time, task.estimated_time) {
            parts.push(time.red().to_string());
        } else {
            parts.push(time);
        }
    }
    if task.is_tracking() {
        parts.push("tracking".cyan().to_string());
    }
    parts.join("  ")
}

fn print_details<S: Storage>(store: &TaskStore<S>, task: &Task) {
    println!("{}", format_task(task));
    println!("  created:  {}", task.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"));
    if let Some(notes) = &task.notes {
        println!("  notes:    {}", notes);
    }
    if task.progress > 0 && !task.completed() {
        println!("  progress: {}%", task.progress);
    }
    if task.estimated_time > 0 {
        println!(
            "  time:     {} of {} ({:.0}%)",
            format_minutes(task.actual_time),
            format_minutes(task.estimated_time),
            time_progress(task.actual_time, task.estimated_time)
        );
    }

    let blocking = store.blocking_dependencies(&task.id);
    if !blocking.is_empty() {
        println!("  {}", "Blocked by incomplete dependencies:".yellow());
        for dep in blocking {
            println!("    - {}", dep.text);
        }
    }
    let deps = store.resolved_dependencies(&task.id);
    if !deps.is_empty() {
        println!("  depends on:");
        for dep in deps {
            println!("    {} {}", if dep.completed() { "[x]" } else { "[ ]" }, dep.text);
        }
    }
    if !task.attachments.is_empty() {
        println!("  attachments:");
        for att in &task.attachments {
            let kind = match att.kind() {
                AttachmentKind::Image => "image",
                AttachmentKind::File => "file",
            };
            println!("    {} {} ({}, {} bytes)", short_id(&att.id).dimmed(), att.name, kind, att.size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use todostore::MemoryStorage;

    fn store_with(ids: &[&str]) -> TaskStore<MemoryStorage> {
        let blob = ids
            .iter()
            .map(|id| format!(r#"{{"id":"{}","text":"task {}","createdAt":"2026-01-01T00:00:00Z"}}"#, id, id))
            .collect::<Vec<_>>()
            .join(",");
        let mut storage = MemoryStorage::new();
        storage.set("todo-tasks", &format!("[{}]", blob)).unwrap();
        TaskStore::load(storage, "todo-tasks").unwrap()
    }

    #[test]
    fn test_resolve_exact_prefix_and_suffix() {
        let store = store_with(&["abc-111", "abd-222"]);
        assert_eq!(resolve(&store, "abd-222").unwrap(), "abd-222");
        assert_eq!(resolve(&store, "abc").unwrap(), "abc-111");
        assert_eq!(resolve(&store, "222").unwrap(), "abd-222");
    }

    #[test]
    fn test_resolve_unknown_or_ambiguous_is_error() {
        let store = store_with(&["abc-111", "abd-222"]);

        let err = resolve(&store, "zzz").unwrap_err();
        assert!(err.to_string().contains("No task matching 'zzz'"));

        let err = resolve(&store, "ab").unwrap_err();
        assert!(err.to_string().contains("Ambiguous id 'ab'"));

        assert!(lookup(&store, "").is_err());
    }

    #[test]
    fn test_missing_task_fails_command() {
        let mut store = TaskStore::load(MemoryStorage::new(), "todo-tasks").unwrap();
        store.create(TaskDraft::new("only")).unwrap();

        assert!(run_dep(&mut store, DepCommands::Show { id: "nope".to_string() }).is_err());
        assert_eq!(store.len(), 1);
    }
}
