use crate::model::{generate_id, parse_date, stored_date, NewTask, Task};
use crate::organizer::{calculate_section_stats, group_tasks_by_date, Clock};
use crate::repository::TaskRepository;
use crate::ui;
use anyhow::{bail, Context, Result};
use std::io::{self, BufRead, Write};

pub fn list(repo: &TaskRepository, clock: &dyn Clock) -> Result<()> {
    let sections = group_tasks_by_date(repo.tasks(), clock);
    if sections.is_empty() {
        println!("No tasks yet. Add one with `dayplan add`.");
        return Ok(());
    }
    for section in sections {
        let stats = calculate_section_stats(&section.data);
        println!(
            "{} ({}/{} done, {}%)",
            section.title, stats.completed, stats.total, stats.percentage
        );
        for task in &section.data {
            print_task(task);
        }
        println!();
    }
    Ok(())
}

pub fn add(
    repo: &mut TaskRepository,
    clock: &dyn Clock,
    title: String,
    description: String,
    date: Option<String>,
    time: Option<String>,
) -> Result<()> {
    let draft = NewTask {
        title,
        description,
        date,
        time,
    };
    let id = generate_id(repo.tasks());
    let task = draft.validate(id.clone(), clock.today())?;
    let label = task.date_key().to_string();
    repo.add(task).wait().context("saving tasks")?;
    println!("Added task {} for {}", id, label);
    Ok(())
}

pub fn toggle_done(repo: &mut TaskRepository, task_id: String) -> Result<()> {
    if !repo.toggle_done(&task_id).wait().context("saving tasks")? {
        bail!("task {} not found", task_id);
    }
    let state = match repo.get(&task_id) {
        Some(task) if task.is_done => "done",
        _ => "not done",
    };
    println!("Marked {} as {}", task_id, state);
    Ok(())
}

pub fn delete(repo: &mut TaskRepository, task_id: String, yes: bool) -> Result<()> {
    if let Some(task) = repo.get(&task_id) {
        if !yes && !confirm(&format!("Delete \"{}\"?", task.title))? {
            println!("Delete canceled");
            return Ok(());
        }
    }
    if !repo.delete(&task_id).wait().context("saving tasks")? {
        bail!("task {} not found", task_id);
    }
    println!("Deleted {}", task_id);
    Ok(())
}

pub fn move_task(repo: &mut TaskRepository, task_id: String, date: String) -> Result<()> {
    let new_date = parse_date(&date)?;
    if !repo
        .reschedule(&task_id, stored_date(new_date))
        .wait()
        .context("saving tasks")?
    {
        bail!("task {} not found", task_id);
    }
    println!("Moved {} to {}", task_id, new_date.format("%Y-%m-%d"));
    Ok(())
}

pub fn tui(repo: &mut TaskRepository, clock: &dyn Clock) -> Result<()> {
    ui::run(repo, clock)
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn print_task(task: &Task) {
    let mark = if task.is_done { "x" } else { " " };
    let time = task.time.as_deref().unwrap_or("--:--");
    println!("  [{}] {} {}  {}", mark, time, task.id, task.title);
    println!("        {}", task.description);
}
