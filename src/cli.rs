use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dayplan", version, about = "Date-grouped personal task list")]
pub struct Cli {
    /// Directory holding tasks.json and logs (defaults to the user data dir)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    /// Log level written to the log file (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
    /// Pretend today is this date (YYYY-MM-DD)
    #[arg(long, global = true, hide = true)]
    pub today: Option<String>,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List tasks grouped by date
    List,
    /// Add a new task
    Add {
        /// Title of the task
        title: String,
        /// What the task is about
        #[arg(long, short = 'd')]
        description: String,
        /// Due date in YYYY-MM-DD format
        #[arg(long)]
        date: Option<String>,
        /// Time of day in HH:MM format
        #[arg(long)]
        time: Option<String>,
    },
    /// Mark a task done, or not done if it already is
    Done {
        /// Task id
        task_id: String,
    },
    /// Delete a task
    Delete {
        /// Task id
        task_id: String,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Move a task to another date
    Move {
        /// Task id
        task_id: String,
        /// New due date in YYYY-MM-DD format
        date: String,
    },
    /// Launch the interactive TUI
    Tui,
}
