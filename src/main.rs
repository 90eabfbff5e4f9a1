mod cli;
mod commands;
mod logging;
mod model;
mod organizer;
mod repository;
mod storage;
mod ui;

use anyhow::Result;
use clap::Parser;
use organizer::{Clock, FixedClock, SystemClock};
use repository::TaskRepository;
use std::sync::Arc;
use storage::{FileBackend, TaskStore};

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let data_dir = match args.data_dir {
        Some(dir) => dir,
        None => storage::default_data_dir()?,
    };
    let _logger = logging::init(&args.log_level, &data_dir)?;

    let clock: Box<dyn Clock> = match args.today.as_deref() {
        Some(raw) => Box::new(FixedClock(model::parse_date(raw)?)),
        None => Box::new(SystemClock),
    };
    let backend = FileBackend::open(&data_dir)?;
    log::info!("event=store_open dir={}", backend.dir().display());
    let mut repo = TaskRepository::open(TaskStore::new(Arc::new(backend)))?;

    let command = args.command.unwrap_or(cli::Command::Tui);
    let result = match command {
        cli::Command::List => commands::list(&repo, clock.as_ref()),
        cli::Command::Add {
            title,
            description,
            date,
            time,
        } => commands::add(&mut repo, clock.as_ref(), title, description, date, time),
        cli::Command::Done { task_id } => commands::toggle_done(&mut repo, task_id),
        cli::Command::Delete { task_id, yes } => commands::delete(&mut repo, task_id, yes),
        cli::Command::Move { task_id, date } => commands::move_task(&mut repo, task_id, date),
        cli::Command::Tui => commands::tui(&mut repo, clock.as_ref()),
    };
    if let Err(err) = repo.flush() {
        log::error!("event=app_exit status=flush_failed error={}", err);
    }
    result
}
