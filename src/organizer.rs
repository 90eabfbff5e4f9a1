use crate::model::Task;
use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, Utc};
use std::cmp::Ordering;

pub trait Clock {
    fn today(&self) -> NaiveDate;
}

/// The local calendar date of the machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSection {
    pub title: String,
    pub date: String,
    pub data: Vec<Task>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionStats {
    pub total: usize,
    pub completed: usize,
    pub percentage: u8,
}

/// Groups tasks into one section per calendar date, earliest date first.
///
/// Inside a section open tasks come before completed ones, and tasks that both
/// carry a time are ordered by it.
pub fn group_tasks_by_date(tasks: &[Task], clock: &dyn Clock) -> Vec<TaskSection> {
    let mut sorted: Vec<&Task> = tasks.iter().collect();
    sorted.sort_by_key(|t| {
        let ts = parse_timestamp(&t.date);
        (ts.is_none(), ts)
    });

    let mut groups: Vec<(&str, Vec<Task>)> = Vec::new();
    for task in sorted {
        let key = task.date_key();
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, data)) => data.push(task.clone()),
            None => groups.push((key, vec![task.clone()])),
        }
    }

    groups
        .into_iter()
        .map(|(key, mut data)| {
            insertion_sort_by(&mut data, compare_within_section);
            TaskSection {
                title: format_section_date(key, clock),
                date: key.to_string(),
                data,
            }
        })
        .collect()
}

/// "Today", "Yesterday", "Tomorrow", otherwise e.g. "05 March 2025".
pub fn format_section_date(key: &str, clock: &dyn Clock) -> String {
    let Ok(date) = NaiveDate::parse_from_str(key, "%Y-%m-%d") else {
        return key.to_string();
    };
    let today = clock.today();
    if date == today {
        "Today".into()
    } else if date == today - Duration::days(1) {
        "Yesterday".into()
    } else if date == today + Duration::days(1) {
        "Tomorrow".into()
    } else {
        date.format("%d %B %Y").to_string()
    }
}

pub fn calculate_section_stats(tasks: &[Task]) -> SectionStats {
    let total = tasks.len();
    let completed = tasks.iter().filter(|t| t.is_done).count();
    let percentage = if total == 0 {
        0
    } else {
        // round half up: floor((200c + t) / 2t)
        ((200 * completed + total) / (2 * total)) as u8
    };
    SectionStats {
        total,
        completed,
        percentage,
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(midnight, Utc).fixed_offset())
}

fn compare_within_section(a: &Task, b: &Task) -> Ordering {
    if a.is_done != b.is_done {
        return a.is_done.cmp(&b.is_done);
    }
    match (&a.time, &b.time) {
        (Some(x), Some(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

// Moves an element left only past neighbours that compare strictly greater.
fn insertion_sort_by<T>(items: &mut [T], cmp: impl Fn(&T, &T) -> Ordering) {
    for i in 1..items.len() {
        let mut j = i;
        while j > 0 && cmp(&items[j], &items[j - 1]) == Ordering::Less {
            items.swap(j, j - 1);
            j -= 1;
        }
    }
}
