use std::{
  collections::HashMap,
  error::Error,
  fs::OpenOptions,
  io,
  sync::{Arc, Mutex},
  time::{Duration, Instant},
};

use botdash::{
  app::AppState,
  config::Config,
  error::ApiError,
  form::{FieldInput, FieldValues, FormBinder, FormItem, Widget, initial_values},
  pages::{ControlView, Page, Tone},
  poll_scheduler::{PollScheduler, SchedulerHandle},
  session::Session,
  settings::{SettingsDocument, SettingsResource},
  summary::SummaryView,
};
use crossterm::{
  event::{self, DisableMouseCapture, EnableMouseCapture, Event as CEvent, KeyCode},
  execute,
  terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use tokio::runtime::Runtime;
use tracing::{error, info};
use tui::{
  Terminal,
  backend::{Backend, CrosstermBackend},
  layout::{Constraint, Direction, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Span, Spans},
  widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs, Wrap},
};

const SUMMARY_COLUMNS: [&str; 3] = ["ID", "Profile", "Email"];

/// A loaded settings document and the user's pending edits to it.
struct FormState {
  resource: SettingsResource,
  binder: FormBinder,
  original: SettingsDocument,
  items: Vec<FormItem>,
  values: FieldValues,
  selected: usize,
  editing: Option<String>,
}

impl FormState {
  fn new(resource: SettingsResource, binder: FormBinder, original: SettingsDocument) -> Self {
    let items = binder.render(&original);
    let values = initial_values(&items);
    Self {
      resource,
      binder,
      original,
      items,
      values,
      selected: 0,
      editing: None,
    }
  }

  fn selected_field(&self) -> Option<&botdash::form::FormField> {
    match self.items.get(self.selected) {
      Some(FormItem::Field(field)) => Some(field),
      _ => None,
    }
  }

  fn select_next(&mut self) {
    if self.selected + 1 < self.items.len() {
      self.selected += 1;
    }
  }

  fn select_previous(&mut self) {
    self.selected = self.selected.saturating_sub(1);
  }

  fn toggle(&mut self) {
    let Some(field) = self.selected_field() else { return };
    if field.widget != Widget::Toggle {
      return;
    }
    let path = field.path.clone();
    if let Some(FieldInput::Toggle(b)) = self.values.get_mut(&path) {
      *b = !*b;
    }
  }

  fn step(&mut self, delta: i64) {
    let Some(field) = self.selected_field() else { return };
    let Widget::Integer { bounds } = &field.widget else { return };
    let bounds = bounds.clone();
    let path = field.path.clone();
    let Some(FieldInput::Text(text)) = self.values.get_mut(&path) else { return };
    let Ok(current) = text.trim().parse::<i64>() else { return };
    let mut next = current.saturating_add(delta);
    if let Some(bounds) = bounds {
      next = next.clamp(*bounds.start(), *bounds.end());
    }
    *text = next.to_string();
  }

  fn begin_edit(&mut self) {
    let Some(field) = self.selected_field() else { return };
    if matches!(field.widget, Widget::Toggle | Widget::ReadOnly) {
      return;
    }
    let current = self
      .values
      .get(&field.path)
      .and_then(FieldInput::as_text)
      .unwrap_or_default()
      .to_string();
    self.editing = Some(current);
  }

  fn is_multiline(&self) -> bool {
    self.selected_field().is_some_and(|f| f.widget == Widget::MultiLine)
  }

  fn commit_edit(&mut self) {
    let Some(buffer) = self.editing.take() else { return };
    if let Some(path) = self.selected_field().map(|f| f.path.clone()) {
      self.values.insert(path, FieldInput::Text(buffer));
    }
  }
}

struct Notice {
  tone: Tone,
  text: String,
}

struct Dashboard {
  page: Page,
  session: Session,
  forms: HashMap<Page, FormState>,
  summary: Option<Result<SummaryView, ApiError>>,
  notice: Option<Notice>,
  confirm_delete: bool,
  load_failed: bool,
}

impl Dashboard {
  fn new() -> Self {
    Self {
      page: Page::Summary,
      session: Session::default(),
      forms: HashMap::new(),
      summary: None,
      notice: None,
      confirm_delete: false,
      load_failed: false,
    }
  }

  fn notify(&mut self, tone: Tone, text: impl Into<String>) {
    self.notice = Some(Notice { tone, text: text.into() });
  }

  fn form(&self) -> Option<&FormState> {
    self.forms.get(&self.page)
  }

  fn form_mut(&mut self) -> Option<&mut FormState> {
    self.forms.get_mut(&self.page)
  }

  fn is_editing(&self) -> bool {
    self.form().is_some_and(|form| form.editing.is_some())
  }

  fn view(&self) -> ControlView {
    ControlView::derive(self.page, &self.session.status, self.form().map(|form| &form.original))
  }

  /// Loads whatever the current page shows on first visit.
  fn ensure_loaded(&mut self, rt: &Runtime, app: &AppState) {
    if self.page == Page::Summary && self.summary.is_none() {
      self.summary = Some(rt.block_on(app.summary.fetch()));
    }
    if let (Some(resource), Some(binder)) = (self.page.settings(), self.page.form()) {
      if !self.forms.contains_key(&self.page) && !self.load_failed {
        self.load_form(rt, app, resource, binder, false);
      }
    }
  }

  fn load_form(&mut self, rt: &Runtime, app: &AppState, resource: SettingsResource, binder: FormBinder, fresh: bool) {
    let loaded = if fresh {
      rt.block_on(app.settings.reload(resource))
    } else {
      rt.block_on(app.settings.load(resource))
    };
    match loaded {
      Ok(document) => {
        self.load_failed = false;
        self.forms.insert(self.page, FormState::new(resource, binder, document));
      }
      Err(e) => {
        self.load_failed = true;
        self.forms.remove(&self.page);
        self.notify(Tone::Error, format!("Failed to load {}: {}", resource, e.describe()));
      }
    }
  }

  fn reload(&mut self, rt: &Runtime, app: &AppState) {
    if self.page == Page::Summary {
      self.summary = Some(rt.block_on(app.summary.refresh()));
      return;
    }
    if let (Some(resource), Some(binder)) = (self.page.settings(), self.page.form()) {
      self.load_form(rt, app, resource, binder, true);
      if self.forms.contains_key(&self.page) {
        self.notify(Tone::Info, format!("Reloaded {}.", resource));
      }
    }
  }

  fn save(&mut self, rt: &Runtime, app: &AppState) {
    let Some(form) = self.forms.get(&self.page) else { return };
    let resource = form.resource;
    let outcome = rt.block_on(app.save_settings(resource, &form.binder, &form.original, &form.values));
    match outcome.result {
      Ok(message) => {
        info!(%resource, "settings saved from dashboard");
        // Other pages editing the same document hold a stale copy now.
        self.forms.retain(|_, form| form.resource != resource);
        if let Some(binder) = self.page.form() {
          self.load_form(rt, app, resource, binder, false);
        }
        match outcome.warnings.first() {
          Some(warning) => self.notify(Tone::Warning, format!("{} {}", message, warning)),
          None => self.notify(Tone::Success, message),
        }
      }
      Err(e) => {
        error!(%resource, error = %e, "settings save failed");
        self.notify(Tone::Error, format!("Save failed: {}", e.describe()));
      }
    }
  }

  fn start(&mut self, rt: &Runtime, app: &AppState) {
    let view = self.view();
    let Some(task) = self.page.task() else { return };
    if !view.can_start {
      let reason = match view.start_blocker {
        Some(reason) => reason,
        None if view.is_any_task_running => "Another task is running.".to_string(),
        None => "Worker status is unknown.".to_string(),
      };
      self.notify(Tone::Warning, reason);
      return;
    }
    if self.page == Page::DeleteProfiles && !self.confirm_delete {
      self.confirm_delete = true;
      self.notify(Tone::Warning, "Press y to confirm profile deletion.");
      return;
    }
    self.confirm_delete = false;
    match rt.block_on(app.start_task(&task)) {
      Ok(message) => self.notify(Tone::Success, message),
      Err(e) => self.notify(Tone::Error, format!("Failed to start {}: {}", task, e.describe())),
    }
  }

  fn stop(&mut self, rt: &Runtime, app: &AppState) {
    if !self.view().can_stop {
      self.notify(Tone::Warning, "Nothing this page can stop.");
      return;
    }
    match rt.block_on(app.stop_task()) {
      Ok(message) => self.notify(Tone::Success, message),
      Err(e) => self.notify(Tone::Error, format!("Failed to stop: {}", e.describe())),
    }
  }

  fn switch(&mut self, page: Page) {
    self.page = page;
    self.confirm_delete = false;
    self.load_failed = false;
    self.notice = None;
  }
}

fn setup_logging(config: &Config) -> Result<(), Box<dyn Error>> {
  let file = OpenOptions::new().create(true).append(true).open(&config.log_file)?;
  tracing_subscriber::fmt()
    .with_writer(Mutex::new(file))
    .with_ansi(false)
    .init();
  Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
  let config = match Config::from_env() {
    Ok(config) => config,
    Err(e) => {
      eprintln!("{}", e);
      std::process::exit(1);
    }
  };
  setup_logging(&config)?;
  info!(api_url = %config.api_url, "dashboard starting");

  let rt = Runtime::new()?;
  let app = Arc::new(AppState::new(&config));
  let (scheduler, handle) = PollScheduler::new(app.clone());
  rt.spawn(scheduler.run());

  enable_raw_mode()?;
  let mut stdout = io::stdout();
  execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
  let backend = CrosstermBackend::new(stdout);
  let mut terminal = Terminal::new(backend)?;

  let result = run(&mut terminal, &rt, &app, &handle);

  handle.shutdown();
  disable_raw_mode()?;
  execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
  terminal.show_cursor()?;
  info!("dashboard stopped");
  result
}

fn run<B: Backend>(
  terminal: &mut Terminal<B>,
  rt: &Runtime,
  app: &AppState,
  handle: &SchedulerHandle,
) -> Result<(), Box<dyn Error>> {
  let mut dashboard = Dashboard::new();
  let tick_rate = Duration::from_millis(250);
  let mut last_tick = Instant::now();

  loop {
    dashboard.session = rt.block_on(app.session.snapshot());
    dashboard.ensure_loaded(rt, app);
    terminal.draw(|f| ui(f, &dashboard))?;

    let timeout = tick_rate
      .checked_sub(last_tick.elapsed())
      .unwrap_or_else(|| Duration::from_secs(0));
    if event::poll(timeout)? {
      if let CEvent::Key(key) = event::read()? {
        if dashboard.is_editing() {
          let multiline = dashboard.form().is_some_and(FormState::is_multiline);
          if let Some(form) = dashboard.form_mut() {
            match key.code {
              KeyCode::Esc => form.commit_edit(),
              KeyCode::Enter if multiline => form.editing.get_or_insert_with(String::new).push('\n'),
              KeyCode::Enter => form.commit_edit(),
              KeyCode::Backspace => {
                form.editing.get_or_insert_with(String::new).pop();
              }
              KeyCode::Char(c) => form.editing.get_or_insert_with(String::new).push(c),
              _ => {}
            }
          }
          continue;
        }

        match key.code {
          KeyCode::Char('q') => break,
          KeyCode::Right => dashboard.switch(dashboard.page.next()),
          KeyCode::Left => dashboard.switch(dashboard.page.previous()),
          KeyCode::Down => dashboard.form_mut().into_iter().for_each(FormState::select_next),
          KeyCode::Up => dashboard.form_mut().into_iter().for_each(FormState::select_previous),
          KeyCode::Char(' ') => dashboard.form_mut().into_iter().for_each(FormState::toggle),
          KeyCode::Char('+') => dashboard.form_mut().into_iter().for_each(|f| f.step(1)),
          KeyCode::Char('-') => dashboard.form_mut().into_iter().for_each(|f| f.step(-1)),
          KeyCode::Char('e') | KeyCode::Enter => dashboard.form_mut().into_iter().for_each(FormState::begin_edit),
          KeyCode::Char('w') => dashboard.save(rt, app),
          KeyCode::Char('l') => dashboard.reload(rt, app),
          KeyCode::Char('s') => dashboard.start(rt, app),
          KeyCode::Char('y') if dashboard.confirm_delete => dashboard.start(rt, app),
          KeyCode::Char('x') => dashboard.stop(rt, app),
          KeyCode::Char('r') => handle.refresh_now(),
          _ => dashboard.confirm_delete = false,
        }
      }
    }
    if last_tick.elapsed() >= tick_rate {
      last_tick = Instant::now();
    }
  }
  Ok(())
}

fn tone_color(tone: Tone) -> Color {
  match tone {
    Tone::Info => Color::Cyan,
    Tone::Success => Color::Green,
    Tone::Warning => Color::Yellow,
    Tone::Error => Color::Red,
  }
}

fn ui<B: Backend>(f: &mut tui::Frame<B>, dashboard: &Dashboard) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .margin(1)
    .constraints([
      Constraint::Length(3),
      Constraint::Length(5),
      Constraint::Min(0),
      Constraint::Length(3),
    ].as_ref())
    .split(f.size());

  let tabs = Tabs::new(
    Page::ALL
      .iter()
      .map(|p| Spans::from(Span::styled(p.title(), Style::default().fg(Color::Yellow))))
      .collect(),
  )
    .block(Block::default().borders(Borders::ALL).title("Signup Bot Dashboard"))
    .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
    .select(dashboard.page.index());
  f.render_widget(tabs, chunks[0]);

  render_status(f, dashboard, chunks[1]);

  match dashboard.page {
    Page::Summary => render_summary(f, dashboard, chunks[2]),
    Page::RunFullFlow => render_logs(f, &dashboard.session, chunks[2]),
    Page::FullFlowConfig => render_form(f, dashboard.form(), chunks[2]),
    Page::CheckConsistency | Page::DeleteProfiles => {
      let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
        .split(chunks[2]);
      render_form(f, dashboard.form(), halves[0]);
      render_logs(f, &dashboard.session, halves[1]);
    }
  }

  let help = if dashboard.is_editing() {
    "Type to edit | Enter: Newline/Done | Esc: Done"
  } else {
    "←/→: Tabs | ↑/↓: Select | Space/+/-/e: Edit | w: Save | l: Reload | s: Start | x: Stop | r: Refresh | q: Quit"
  };
  let footer = Paragraph::new(help)
    .style(Style::default().fg(Color::White))
    .block(Block::default().borders(Borders::ALL));
  f.render_widget(footer, chunks[3]);
}

fn render_status<B: Backend>(f: &mut tui::Frame<B>, dashboard: &Dashboard, area: Rect) {
  let view = dashboard.view();
  let mut lines = vec![
    Spans::from(Span::styled(
      view.status_line.clone(),
      Style::default().fg(tone_color(view.tone)).add_modifier(Modifier::BOLD),
    )),
    Spans::from(Span::raw(view.detail_line.clone())),
  ];
  if let Some(notice) = &dashboard.notice {
    lines.push(Spans::from(Span::styled(notice.text.clone(), Style::default().fg(tone_color(notice.tone)))));
  } else if let Some(blocker) = &view.start_blocker {
    lines.push(Spans::from(Span::styled(blocker.clone(), Style::default().fg(Color::Yellow))));
  }
  let status = Paragraph::new(lines)
    .wrap(Wrap { trim: true })
    .block(Block::default().borders(Borders::ALL).title("Bot Status"));
  f.render_widget(status, area);
}

fn render_logs<B: Backend>(f: &mut tui::Frame<B>, session: &Session, area: Rect) {
  let visible = area.height.saturating_sub(2) as usize;
  let lines = session.logs.lines();
  let log_items: Vec<ListItem> = lines[lines.len().saturating_sub(visible)..]
    .iter()
    .map(|l| ListItem::new(Spans::from(Span::raw(l.as_str()))))
    .collect();
  let title = match session.last_fetch {
    Some(at) => format!("Bot Logs (polled {}s ago)", at.elapsed().as_secs()),
    None => "Bot Logs".to_string(),
  };
  let logs_list = List::new(log_items).block(Block::default().borders(Borders::ALL).title(title));
  f.render_widget(logs_list, area);
}

fn field_text(form: &FormState, item: &FormItem, selected: bool) -> Spans<'static> {
  let field = match item {
    FormItem::Section { label, path } => {
      let indent = "  ".repeat(path.depth());
      return Spans::from(Span::styled(
        format!("{}{}", indent, label),
        Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
      ));
    }
    FormItem::Field(field) => field,
  };
  let indent = "  ".repeat(field.path.depth());
  let value = match (&field.widget, form.values.get(&field.path)) {
    (_, _) if selected && form.editing.is_some() => {
      format!("{}_", form.editing.as_deref().unwrap_or_default().replace('\n', " ⏎ "))
    }
    (Widget::Toggle, Some(FieldInput::Toggle(true))) => "[x]".to_string(),
    (Widget::Toggle, _) => "[ ]".to_string(),
    (Widget::MultiLine, Some(FieldInput::Text(text))) if text.trim().is_empty() => "(none)".to_string(),
    (Widget::MultiLine, Some(FieldInput::Text(text))) => text.lines().collect::<Vec<_>>().join(", "),
    (Widget::Integer { bounds: Some(bounds) }, Some(input)) => {
      format!("{} ({}-{})", input.as_text().unwrap_or_default(), bounds.start(), bounds.end())
    }
    (_, Some(input)) => input.as_text().unwrap_or_default().to_string(),
    (_, None) => String::new(),
  };
  let style = if field.widget == Widget::ReadOnly {
    Style::default().fg(Color::DarkGray)
  } else {
    Style::default()
  };
  Spans::from(vec![
    Span::raw(format!("{}{}: ", indent, field.label)),
    Span::styled(value, style),
  ])
}

fn render_form<B: Backend>(f: &mut tui::Frame<B>, form: Option<&FormState>, area: Rect) {
  let block = Block::default().borders(Borders::ALL);
  let Some(form) = form else {
    f.render_widget(Paragraph::new("Settings not loaded. Press l to retry.").block(block.title("Settings")), area);
    return;
  };
  let items: Vec<ListItem> = form
    .items
    .iter()
    .enumerate()
    .map(|(i, item)| ListItem::new(field_text(form, item, i == form.selected)))
    .collect();
  let list = List::new(items)
    .block(block.title(format!("Settings ({})", form.resource)))
    .highlight_style(Style::default().bg(Color::Blue));
  let mut state = ListState::default();
  state.select(Some(form.selected));
  f.render_stateful_widget(list, area, &mut state);
}

fn render_summary<B: Backend>(f: &mut tui::Frame<B>, dashboard: &Dashboard, area: Rect) {
  let block = Block::default().borders(Borders::ALL).title("Profile Summary");
  let items: Vec<ListItem> = match &dashboard.summary {
    None => vec![ListItem::new("Loading...")],
    Some(Err(e)) => vec![ListItem::new(Spans::from(Span::styled(
      format!("Failed to load summary: {}", e.describe()),
      Style::default().fg(Color::Red),
    )))],
    Some(Ok(SummaryView::Empty { message })) => vec![ListItem::new(message.clone())],
    Some(Ok(SummaryView::Loaded { profiles })) => {
      let header = ListItem::new(Spans::from(Span::styled(
        format!("{:<12} {:<20} {}", SUMMARY_COLUMNS[0], SUMMARY_COLUMNS[1], SUMMARY_COLUMNS[2]),
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
      )));
      std::iter::once(header)
        .chain(profiles.iter().map(|p| {
          ListItem::new(format!(
            "{:<12} {:<20} {}",
            p.display(SUMMARY_COLUMNS[0]),
            p.display(SUMMARY_COLUMNS[1]),
            p.display(SUMMARY_COLUMNS[2])
          ))
        }))
        .collect()
    }
  };
  f.render_widget(List::new(items).block(block), area);
}
