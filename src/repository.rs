use crate::model::Task;
use crate::storage::{SaveTicket, StoreError, StoreWriter, TaskStore};
use log::{debug, info};

/// Outcome of a mutation.
///
/// `applied` is false when the target id was unknown. `ticket` is present
/// whenever a save was queued.
#[derive(Debug)]
pub struct Mutation {
    pub applied: bool,
    pub ticket: Option<SaveTicket>,
}

impl Mutation {
    fn skipped() -> Self {
        Mutation {
            applied: false,
            ticket: None,
        }
    }

    /// Waits for the queued save, if any.
    pub fn wait(self) -> Result<bool, StoreError> {
        if let Some(ticket) = self.ticket {
            ticket.wait()?;
        }
        Ok(self.applied)
    }
}

/// In-memory task list; every change is handed to the store writer.
pub struct TaskRepository {
    tasks: Vec<Task>,
    writer: StoreWriter,
}

impl TaskRepository {
    pub fn new(writer: StoreWriter) -> Self {
        TaskRepository {
            tasks: Vec::new(),
            writer,
        }
    }

    /// Loads the stored tasks and starts a writer for later changes.
    pub fn open(store: TaskStore) -> anyhow::Result<Self> {
        let tasks = store.load();
        info!("event=tasks_open count={}", tasks.len());
        let mut repo = TaskRepository::new(StoreWriter::spawn(store)?);
        repo.set_all(tasks);
        Ok(repo)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Replaces the whole collection without saving it.
    pub fn set_all(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks;
    }

    /// Appends a task. A task whose id is already present is refused.
    pub fn add(&mut self, task: Task) -> Mutation {
        if self.get(&task.id).is_some() {
            debug!("event=task_add status=duplicate id={}", task.id);
            return Mutation::skipped();
        }
        debug!("event=task_add id={}", task.id);
        self.tasks.push(task);
        self.persist()
    }

    pub fn toggle_done(&mut self, id: &str) -> Mutation {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            return Mutation::skipped();
        };
        task.is_done = !task.is_done;
        debug!("event=task_toggle id={} done={}", id, task.is_done);
        self.persist()
    }

    /// Removes the task if present. The collection is saved either way.
    pub fn delete(&mut self, id: &str) -> Mutation {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        let applied = self.tasks.len() != before;
        if applied {
            debug!("event=task_delete id={}", id);
        }
        Mutation {
            applied,
            ..self.persist()
        }
    }

    pub fn reschedule(&mut self, id: &str, new_date: impl Into<String>) -> Mutation {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            return Mutation::skipped();
        };
        task.date = new_date.into();
        debug!("event=task_reschedule id={} date={}", id, task.date);
        self.persist()
    }

    /// Blocks until every queued save has been written.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.writer.flush()
    }

    fn persist(&self) -> Mutation {
        Mutation {
            applied: true,
            ticket: Some(self.writer.submit(self.tasks.clone())),
        }
    }
}
