use crate::model::{generate_id, parse_date, stored_date, NewTask, Task, TaskId};
use crate::organizer::{calculate_section_stats, group_tasks_by_date, Clock, TaskSection};
use crate::repository::{Mutation, TaskRepository};
use crate::storage::SaveTicket;
use anyhow::Result;
use chrono::{Duration as ChronoDuration, NaiveDate};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use log::warn;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::{Alignment, Color, Modifier, Rect, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Terminal;
use std::io::{stdout, Stdout};
use std::time::{Duration, Instant};

pub fn run(repo: &mut TaskRepository, clock: &dyn Clock) -> Result<()> {
    let mut terminal = setup_terminal()?;
    let mut app = App::new(repo, clock);
    let result = app.event_loop(&mut terminal);
    teardown_terminal(&mut terminal)?;
    result
}

struct App<'a> {
    repo: &'a mut TaskRepository,
    clock: &'a dyn Clock,
    selected: usize,
    offset: usize,
    pending: Vec<SaveTicket>,
    last_save: Option<Instant>,
    status: String,
    mode: Mode,
}

enum Mode {
    Normal,
    Creating(TaskForm),
    Rescheduling { task_id: TaskId, date: FieldValue },
    ConfirmDelete { task_id: TaskId },
}

struct TaskForm {
    title: FieldValue,
    description: FieldValue,
    date: FieldValue,
    time: FieldValue,
    field: FormField,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum FormField {
    Title,
    Description,
    Date,
    Time,
}

#[derive(Clone)]
struct FieldValue {
    value: String,
    cursor: usize,
}

impl FieldValue {
    fn new(value: &str) -> Self {
        FieldValue {
            value: value.to_string(),
            cursor: value.len(),
        }
    }

    fn move_left(&mut self) {
        self.cursor = prev_char_boundary(self.cursor, &self.value);
    }

    fn move_right(&mut self) {
        self.cursor = next_char_boundary(self.cursor, &self.value);
    }

    fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let prev = prev_char_boundary(self.cursor, &self.value);
        self.value.drain(prev..self.cursor);
        self.cursor = prev;
    }

    fn insert_char(&mut self, ch: char) {
        self.value.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
    }

    fn with_caret(&self) -> String {
        let mut text = self.value.clone();
        text.insert_str(self.cursor, "▌");
        text
    }
}

impl<'a> App<'a> {
    fn new(repo: &'a mut TaskRepository, clock: &'a dyn Clock) -> Self {
        let status = format!("Loaded {} tasks", repo.tasks().len());
        App {
            repo,
            clock,
            selected: 0,
            offset: 0,
            pending: Vec::new(),
            last_save: None,
            status,
            mode: Mode::Normal,
        }
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        loop {
            self.poll_saves();
            terminal.draw(|f| self.draw(f))?;
            if event::poll(Duration::from_millis(200))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key) {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        match self.mode {
            Mode::Normal => self.handle_normal_key(key),
            Mode::Creating(_) | Mode::Rescheduling { .. } => {
                self.handle_form_key(key);
                false
            }
            Mode::ConfirmDelete { .. } => {
                self.handle_confirm_key(key);
                false
            }
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Up | KeyCode::Char('k') => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                let count = self.repo.tasks().len();
                if self.selected + 1 < count {
                    self.selected += 1;
                }
            }
            KeyCode::Char('n') => {
                self.mode = Mode::Creating(TaskForm::new());
                self.status = "New task (Tab/Shift-Tab move, Enter save, Esc cancel)".into();
            }
            KeyCode::Char(' ') | KeyCode::Enter | KeyCode::Char('x') => self.toggle_selected(),
            KeyCode::Char('d') => match self.current_task() {
                Some(task) => {
                    self.status = format!("Delete {}? (y to confirm, n/Esc to cancel)", task.id);
                    self.mode = Mode::ConfirmDelete { task_id: task.id };
                }
                None => self.status = "No task selected to delete".into(),
            },
            KeyCode::Char('m') => match self.current_task() {
                Some(task) => {
                    self.status = format!("Rescheduling {} (Enter save, Esc cancel)", task.id);
                    self.mode = Mode::Rescheduling {
                        task_id: task.id.clone(),
                        date: FieldValue::new(task.date_key()),
                    };
                }
                None => self.status = "No task selected to move".into(),
            },
            KeyCode::Char('>') => self.shift_selected(1),
            KeyCode::Char('<') => self.shift_selected(-1),
            _ => {}
        }
        false
    }

    fn handle_form_key(&mut self, key: KeyEvent) {
        let mut mode = std::mem::replace(&mut self.mode, Mode::Normal);
        let close = match &mut mode {
            Mode::Creating(form) => self.process_form_key(form, key),
            Mode::Rescheduling { task_id, date } => {
                let id = task_id.clone();
                self.process_reschedule_key(&id, date, key)
            }
            Mode::Normal | Mode::ConfirmDelete { .. } => true,
        };
        if !close {
            self.mode = mode;
        }
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) {
        let task_id = match &self.mode {
            Mode::ConfirmDelete { task_id } => task_id.clone(),
            _ => return,
        };
        match key.code {
            KeyCode::Char('y') | KeyCode::Enter => {
                let mutation = self.repo.delete(&task_id);
                self.status = if mutation.applied {
                    format!("Deleted {}", task_id)
                } else {
                    format!("{} was already gone", task_id)
                };
                self.track(mutation);
                self.clamp_selection();
                self.mode = Mode::Normal;
            }
            KeyCode::Char('n') | KeyCode::Esc => {
                self.status = "Delete canceled".into();
                self.mode = Mode::Normal;
            }
            _ => {}
        }
    }

    fn process_form_key(&mut self, form: &mut TaskForm, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => {
                self.status = "Canceled".into();
                return true;
            }
            KeyCode::Tab => form.next_field(),
            KeyCode::BackTab => form.prev_field(),
            KeyCode::Left => form.active_field_mut().move_left(),
            KeyCode::Right => form.active_field_mut().move_right(),
            KeyCode::Backspace => form.active_field_mut().backspace(),
            KeyCode::Enter => return self.create_task_from_form(form),
            KeyCode::Char(_) => {
                if let Some(c) = typed_char(&key) {
                    form.active_field_mut().insert_char(c);
                    if form.field == FormField::Title {
                        form.default_date_from_title(self.clock.today());
                    }
                }
            }
            _ => {}
        }
        false
    }

    fn process_reschedule_key(
        &mut self,
        task_id: &str,
        date: &mut FieldValue,
        key: KeyEvent,
    ) -> bool {
        match key.code {
            KeyCode::Esc => {
                self.status = "Canceled".into();
                true
            }
            KeyCode::Left => {
                date.move_left();
                false
            }
            KeyCode::Right => {
                date.move_right();
                false
            }
            KeyCode::Backspace => {
                date.backspace();
                false
            }
            KeyCode::Enter => match parse_date(&date.value) {
                Ok(new_date) => {
                    self.reschedule(task_id, new_date);
                    true
                }
                Err(err) => {
                    self.status = format!("Could not move: {}", err);
                    false
                }
            },
            KeyCode::Char(_) => {
                if let Some(c) = typed_char(&key) {
                    date.insert_char(c);
                }
                false
            }
            _ => false,
        }
    }

    fn create_task_from_form(&mut self, form: &TaskForm) -> bool {
        let draft = NewTask {
            title: form.title.value.clone(),
            description: form.description.value.clone(),
            date: Some(form.date.value.clone()),
            time: Some(form.time.value.clone()),
        };
        let id = generate_id(self.repo.tasks());
        match draft.validate(id.clone(), self.clock.today()) {
            Ok(task) => {
                let mutation = self.repo.add(task);
                self.track(mutation);
                self.select_id(&id);
                self.status = format!("Created task {}", id);
                true
            }
            Err(err) => {
                self.status = format!("Could not create: {}", err);
                false
            }
        }
    }

    fn toggle_selected(&mut self) {
        let Some(task) = self.current_task() else {
            self.status = "No task selected".into();
            return;
        };
        let mutation = self.repo.toggle_done(&task.id);
        self.track(mutation);
        self.select_id(&task.id);
        self.status = if task.is_done {
            format!("Reopened \"{}\"", task.title)
        } else {
            format!("Completed \"{}\"", task.title)
        };
    }

    fn shift_selected(&mut self, days: i64) {
        let Some(task) = self.current_task() else {
            return;
        };
        let current = parse_date(task.date_key()).unwrap_or_else(|_| self.clock.today());
        self.reschedule(&task.id, current + ChronoDuration::days(days));
    }

    fn reschedule(&mut self, task_id: &str, new_date: NaiveDate) {
        let mutation = self.repo.reschedule(task_id, stored_date(new_date));
        self.status = if mutation.applied {
            format!("Moved {} to {}", task_id, new_date.format("%Y-%m-%d"))
        } else {
            format!("{} no longer exists", task_id)
        };
        self.track(mutation);
        self.select_id(task_id);
    }

    fn track(&mut self, mutation: Mutation) {
        if let Some(ticket) = mutation.ticket {
            self.pending.push(ticket);
        }
    }

    fn poll_saves(&mut self) {
        let mut failure = None;
        let mut saved = false;
        self.pending.retain(|ticket| match ticket.poll() {
            None => true,
            Some(Ok(())) => {
                saved = true;
                false
            }
            Some(Err(err)) => {
                failure = Some(err);
                false
            }
        });
        if saved {
            self.last_save = Some(Instant::now());
        }
        if let Some(err) = failure {
            warn!("event=ui_save status=error error={}", err);
            self.status = format!("Save failed: {}", err);
        }
    }

    fn sections(&self) -> Vec<TaskSection> {
        group_tasks_by_date(self.repo.tasks(), self.clock)
    }

    fn ordered_tasks(&self) -> Vec<Task> {
        self.sections().into_iter().flat_map(|s| s.data).collect()
    }

    fn current_task(&self) -> Option<Task> {
        self.ordered_tasks().into_iter().nth(self.selected)
    }

    fn select_id(&mut self, id: &str) {
        if let Some(idx) = self.ordered_tasks().iter().position(|t| t.id == id) {
            self.selected = idx;
        }
        self.clamp_selection();
    }

    fn clamp_selection(&mut self) {
        self.selected = self
            .selected
            .min(self.repo.tasks().len().saturating_sub(1));
    }

    fn draw(&mut self, f: &mut ratatui::Frame<'_>) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(8),
                Constraint::Length(4),
            ])
            .split(f.size());

        self.draw_header(f, layout[0]);
        self.draw_sections(f, layout[1]);
        self.draw_footer(f, layout[2]);

        match &self.mode {
            Mode::Creating(form) => self.draw_form(f, form),
            Mode::Rescheduling { task_id, date } => self.draw_reschedule(f, task_id, date),
            Mode::ConfirmDelete { task_id } => self.draw_confirm(f, task_id),
            Mode::Normal => {}
        }
    }

    fn draw_header(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let stats = calculate_section_stats(self.repo.tasks());
        let saved = self
            .last_save
            .map(|at| format!("saved {}", format_elapsed(at)))
            .unwrap_or_else(|| "no changes".into());
        let title = Line::from(vec![
            Span::styled(
                "dayplan ",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                self.clock.today().format("%A %d %B").to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw("  •  "),
            Span::styled(
                format!("{}/{} done ({}%)", stats.completed, stats.total, stats.percentage),
                Style::default().fg(Color::Green),
            ),
            Span::raw("  •  "),
            Span::styled(saved, Style::default().fg(Color::Gray)),
        ]);
        let block = Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(Color::DarkGray));
        let paragraph = Paragraph::new(title)
            .alignment(Alignment::Center)
            .block(block);
        f.render_widget(paragraph, area);
    }

    fn draw_sections(&mut self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let sections = self.sections();
        if sections.is_empty() {
            let msg = Paragraph::new("No tasks yet. Press n to add one.")
                .alignment(Alignment::Center)
                .block(Block::default().borders(Borders::ALL).title("Tasks"));
            f.render_widget(Clear, area);
            f.render_widget(msg, area);
            return;
        }

        let width = area.width.saturating_sub(2) as usize;
        let mut items = Vec::new();
        let mut selected_row = 0;
        let mut task_idx = 0;
        for (section_idx, section) in sections.iter().enumerate() {
            items.push(section_header_item(section, color_for_index(section_idx)));
            for task in &section.data {
                let selected = task_idx == self.selected;
                if selected {
                    selected_row = items.len();
                }
                items.push(task_item(task, width, selected));
                task_idx += 1;
            }
        }

        let viewport = area.height.saturating_sub(2) as usize;
        self.offset = adjust_offset(selected_row, self.offset, viewport, 1, items.len());
        let mut state = ListState::default();
        state.select(Some(selected_row));
        *state.offset_mut() = self.offset;

        let block = Block::default()
            .title(Span::styled(
                "Tasks",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .style(Style::default().bg(Color::Rgb(16, 18, 24)));
        let list = List::new(items).block(block);
        f.render_stateful_widget(list, area, &mut state);
    }

    fn draw_footer(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(2), Constraint::Length(2)])
            .split(area);

        let key = Style::default().fg(Color::LightCyan);
        let help = Line::from(vec![
            Span::styled("↑↓ / j k", key),
            Span::raw(" move  "),
            Span::styled("space", key),
            Span::raw(" done  "),
            Span::styled("n", key),
            Span::raw(" new  "),
            Span::styled("m", key),
            Span::raw(" reschedule  "),
            Span::styled("< >", key),
            Span::raw(" ±1 day  "),
            Span::styled("d", key),
            Span::raw(" delete  "),
            Span::styled("q", key),
            Span::raw(" quit"),
        ]);
        let help_bar = Paragraph::new(help).alignment(Alignment::Center).block(
            Block::default()
                .borders(Borders::TOP)
                .border_style(Style::default().fg(Color::DarkGray)),
        );
        f.render_widget(help_bar, rows[0]);

        let bottom = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(rows[1]);

        let status = Paragraph::new(self.status.clone())
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::TOP)
                    .border_style(Style::default().fg(Color::DarkGray)),
            );
        f.render_widget(status, bottom[0]);

        let detail = self
            .current_task()
            .map(|t| selected_task_detail(&t))
            .unwrap_or_else(|| Line::from("Nothing selected"));
        let detail = Paragraph::new(detail).wrap(Wrap { trim: true }).block(
            Block::default()
                .borders(Borders::TOP)
                .border_style(Style::default().fg(Color::DarkGray))
                .title("Task"),
        );
        f.render_widget(detail, bottom[1]);
    }

    fn draw_form(&self, f: &mut ratatui::Frame<'_>, form: &TaskForm) {
        let area = centered_rect(70, 50, f.size());
        let mut fields = vec![
            field_line("Title *", &form.title, form.field == FormField::Title),
            field_line(
                "Description *",
                &form.description,
                form.field == FormField::Description,
            ),
            field_line(
                "Due date * (YYYY-MM-DD)",
                &form.date,
                form.field == FormField::Date,
            ),
            field_line("Time (HH:MM)", &form.time, form.field == FormField::Time),
        ];
        fields.push(Line::from(""));
        fields.push(Line::from(Span::styled(
            "Enter to save • Esc to cancel • Tab/Shift-Tab to move",
            Style::default().fg(Color::Gray),
        )));
        let dialog = Paragraph::new(fields)
            .block(
                Block::default()
                    .title(Span::styled(
                        "New Task",
                        Style::default()
                            .fg(Color::Cyan)
                            .add_modifier(Modifier::BOLD),
                    ))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Cyan)),
            )
            .wrap(Wrap { trim: true });
        f.render_widget(Clear, area);
        f.render_widget(dialog, area);
    }

    fn draw_reschedule(&self, f: &mut ratatui::Frame<'_>, task_id: &str, date: &FieldValue) {
        let area = centered_rect(50, 25, f.size());
        let title = self
            .repo
            .get(task_id)
            .map(|t| t.title.clone())
            .unwrap_or_else(|| task_id.to_string());
        let body = vec![
            Line::from(Span::styled(
                format!("Move \"{}\"", title),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            field_line("New date (YYYY-MM-DD)", date, true),
        ];
        let dialog = Paragraph::new(body).block(
            Block::default()
                .title(Span::styled(
                    "Reschedule",
                    Style::default()
                        .fg(Color::LightYellow)
                        .add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::LightYellow)),
        );
        f.render_widget(Clear, area);
        f.render_widget(dialog, area);
    }

    fn draw_confirm(&self, f: &mut ratatui::Frame<'_>, task_id: &str) {
        let area = centered_rect(50, 30, f.size());
        let title = self
            .repo
            .get(task_id)
            .map(|t| t.title.clone())
            .unwrap_or_else(|| task_id.to_string());
        let body = vec![
            Line::from(Span::styled(
                format!("Delete \"{}\"?", title),
                Style::default()
                    .fg(Color::LightRed)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from("Press y to confirm, n or Esc to cancel"),
        ];
        let dialog = Paragraph::new(body).alignment(Alignment::Center).block(
            Block::default()
                .title(Span::styled(
                    "Confirm Delete",
                    Style::default()
                        .fg(Color::LightRed)
                        .add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::LightRed)),
        );
        f.render_widget(Clear, area);
        f.render_widget(dialog, area);
    }
}

impl TaskForm {
    fn new() -> Self {
        TaskForm {
            title: FieldValue::new(""),
            description: FieldValue::new(""),
            date: FieldValue::new(""),
            time: FieldValue::new(""),
            field: FormField::Title,
        }
    }

    fn next_field(&mut self) {
        self.field = match self.field {
            FormField::Title => FormField::Description,
            FormField::Description => FormField::Date,
            FormField::Date => FormField::Time,
            FormField::Time => FormField::Title,
        };
    }

    fn prev_field(&mut self) {
        self.field = match self.field {
            FormField::Title => FormField::Time,
            FormField::Description => FormField::Title,
            FormField::Date => FormField::Description,
            FormField::Time => FormField::Date,
        };
    }

    fn active_field_mut(&mut self) -> &mut FieldValue {
        match self.field {
            FormField::Title => &mut self.title,
            FormField::Description => &mut self.description,
            FormField::Date => &mut self.date,
            FormField::Time => &mut self.time,
        }
    }

    /// Typing "today" into the title fills an empty date with today.
    fn default_date_from_title(&mut self, today: NaiveDate) {
        if self.date.value.trim().is_empty() && self.title.value.to_lowercase().contains("today") {
            self.date = FieldValue::new(&today.format("%Y-%m-%d").to_string());
        }
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn teardown_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn color_for_index(idx: usize) -> Color {
    let palette = [
        Color::Cyan,
        Color::LightGreen,
        Color::LightMagenta,
        Color::LightBlue,
        Color::LightYellow,
    ];
    palette[idx % palette.len()]
}

fn adjust_offset(
    selected: usize,
    current_offset: usize,
    viewport: usize,
    scrolloff: usize,
    len: usize,
) -> usize {
    if viewport == 0 || len == 0 {
        return 0;
    }
    let max_offset = len.saturating_sub(viewport);
    let margin = scrolloff.min(viewport.saturating_sub(1));
    let mut offset = current_offset.min(max_offset);
    if selected < offset.saturating_add(margin) {
        offset = selected.saturating_sub(margin);
    } else {
        let upper = offset
            .saturating_add(viewport.saturating_sub(1))
            .saturating_sub(margin);
        if selected > upper {
            offset = selected.saturating_add(margin + 1).saturating_sub(viewport);
        }
    }
    offset.min(max_offset)
}

fn prev_char_boundary(cursor: usize, text: &str) -> usize {
    text[..cursor]
        .char_indices()
        .next_back()
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

fn next_char_boundary(cursor: usize, text: &str) -> usize {
    text[cursor..]
        .chars()
        .next()
        .map(|ch| cursor + ch.len_utf8())
        .unwrap_or(text.len())
}

fn truncate_text(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(&"..."[..max.min(3)]);
    out
}

fn progress_bar(percentage: u8, width: usize) -> String {
    let filled = (percentage as usize * width + 50) / 100;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

fn section_header_item(section: &TaskSection, accent: Color) -> ListItem<'static> {
    let stats = calculate_section_stats(&section.data);
    let spans = vec![
        Span::styled(
            section.title.clone(),
            Style::default().fg(accent).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(
            format!("{}/{}", stats.completed, stats.total),
            Style::default().fg(Color::Gray),
        ),
        Span::raw(" "),
        Span::styled(progress_bar(stats.percentage, 10), Style::default().fg(accent)),
        Span::styled(
            format!(" {}%", stats.percentage),
            Style::default().fg(Color::Gray),
        ),
    ];
    ListItem::new(Line::from(spans))
}

fn task_item(task: &Task, width: usize, selected: bool) -> ListItem<'static> {
    let mark = if task.is_done { "[x]" } else { "[ ]" };
    let time = task.time.clone().unwrap_or_else(|| "     ".into());
    let title_width = width.saturating_sub(12);
    let mut title_style = Style::default().fg(Color::White);
    if task.is_done {
        title_style = title_style
            .fg(Color::DarkGray)
            .add_modifier(Modifier::CROSSED_OUT);
    }
    let line = Line::from(vec![
        Span::raw("  "),
        Span::styled(mark, Style::default().fg(Color::LightGreen)),
        Span::raw(" "),
        Span::styled(time, Style::default().fg(Color::LightYellow)),
        Span::raw(" "),
        Span::styled(truncate_text(&task.title, title_width), title_style),
    ]);
    let mut item = ListItem::new(line);
    if selected {
        item = item.style(
            Style::default()
                .bg(Color::Rgb(252, 214, 112))
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        );
    }
    item
}

fn field_line(label: &str, field: &FieldValue, active: bool) -> Line<'static> {
    let label_style = Style::default()
        .fg(Color::Gray)
        .add_modifier(Modifier::BOLD | Modifier::DIM);
    let value_style = Style::default().fg(if active { Color::Cyan } else { Color::White });
    let text = if active {
        field.with_caret()
    } else {
        field.value.clone()
    };
    Line::from(vec![
        Span::styled(format!("{}: ", label), label_style),
        Span::styled(text, value_style),
    ])
}

fn selected_task_detail(task: &Task) -> Line<'static> {
    let mut spans = vec![Span::styled(
        task.title.clone(),
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    )];
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
        task.id.clone(),
        Style::default().fg(Color::DarkGray),
    ));
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
        task.description.clone(),
        Style::default().fg(Color::Gray).add_modifier(Modifier::DIM),
    ));
    Line::from(spans)
}

fn format_elapsed(last: Instant) -> String {
    let secs = last.elapsed().as_secs();
    if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else {
        format!("{}h ago", secs / 3600)
    }
}

/// The character a key press types into a text field, if any.
/// Ctrl and Alt chords are shortcuts, not text.
fn typed_char(key: &KeyEvent) -> Option<char> {
    let chord = key
        .modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT);
    match key.code {
        KeyCode::Char(c) if !chord => Some(c),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn field_editing_respects_char_boundaries() {
        let mut field = FieldValue::new("café");
        field.move_left();
        assert_eq!(field.cursor, 3);
        field.backspace();
        assert_eq!(field.value, "caé");
        field.move_right();
        field.insert_char('s');
        assert_eq!(field.value, "caés");
        assert_eq!(field.with_caret(), "caés▌");
    }

    #[test]
    fn typing_today_in_title_fills_empty_date() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
        let mut form = TaskForm::new();
        for ch in "Pay rent today".chars() {
            form.title.insert_char(ch);
        }
        form.default_date_from_title(today);
        assert_eq!(form.date.value, "2025-03-05");

        form.date = FieldValue::new("2025-04-01");
        form.default_date_from_title(today);
        assert_eq!(form.date.value, "2025-04-01");
    }

    #[test]
    fn chords_are_not_typed_into_fields() {
        let plain = KeyEvent::new(KeyCode::Char('4'), KeyModifiers::NONE);
        let shifted = KeyEvent::new(KeyCode::Char('A'), KeyModifiers::SHIFT);
        let ctrl = KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL);
        let alt = KeyEvent::new(KeyCode::Char('x'), KeyModifiers::ALT);
        assert_eq!(typed_char(&plain), Some('4'));
        assert_eq!(typed_char(&shifted), Some('A'));
        assert_eq!(typed_char(&ctrl), None);
        assert_eq!(typed_char(&alt), None);
        assert_eq!(typed_char(&KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)), None);

        let mut date = FieldValue::new("2025-03-0");
        for key in [ctrl, alt, plain] {
            if let Some(c) = typed_char(&key) {
                date.insert_char(c);
            }
        }
        assert_eq!(date.value, "2025-03-04");
    }

    #[test]
    fn form_fields_cycle() {
        let mut form = TaskForm::new();
        form.next_field();
        form.next_field();
        assert!(form.field == FormField::Date);
        form.prev_field();
        form.prev_field();
        form.prev_field();
        assert!(form.field == FormField::Time);
    }

    #[test]
    fn offset_keeps_selection_visible() {
        assert_eq!(adjust_offset(0, 0, 5, 1, 20), 0);
        assert_eq!(adjust_offset(10, 0, 5, 1, 20), 7);
        assert_eq!(adjust_offset(19, 7, 5, 1, 20), 15);
        assert_eq!(adjust_offset(3, 0, 0, 1, 20), 0);
    }

    #[test]
    fn text_helpers() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("a long title here", 8), "a lon...");
        assert_eq!(progress_bar(50, 10), "█████░░░░░");
        assert_eq!(progress_bar(0, 4), "░░░░");
        assert_eq!(progress_bar(100, 4), "████");
    }
}
