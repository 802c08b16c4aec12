use std::collections::{HashMap, VecDeque};
use std::io;
use std::process::{Command as Process, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;
use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};

use crate::app::{Browser, Pending, ProgressEvent, ProgressSink};
use crate::domain::{
    Attributes, Level, RETRIEVE_URI, SERIES_INSTANCE_UID, SOP_INSTANCE_UID, STUDY_INSTANCE_UID,
};
use crate::error::BrowserError;
use crate::format;
use crate::inspector::{INSPECTOR_HEADERS, InspectorLine, inspect};
use crate::qido::{QidoClient, join_url};
use crate::query::{Flag, QueryBuilder, Range};
use crate::stow::{StoreReceipt, StowClient, UploadQueue};
use crate::tree::{Applied, RowId, RowKind, VisibleRow};
use crate::wado::{InstanceLinks, WadoClient};

const LOGS_MAX: usize = 200;
const ATTRIBUTE_LINES_MAX: usize = 40;
const COMMANDS: &[&str] = &[
    "search", "next", "previous", "aet", "limit", "orderby", "date", "time", "match", "flag",
    "add", "remove", "clear", "upload", "quit",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Browser,
    Form,
    Logs,
    Upload,
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputMode {
    Table,
    Command,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Search,
    Next,
    Previous,
    Aet(String),
    Limit(usize),
    OrderBy(String),
    StudyDate(Range),
    StudyTime(Range),
    Match { name: String, value: String },
    Flag { name: String, value: String, checked: bool },
    Add(Vec<Utf8PathBuf>),
    Remove(Utf8PathBuf),
    Clear,
    Upload,
    Quit,
}

/// Parses the `:` command line.
pub fn parse_command(input: &str) -> Result<Command, String> {
    let parts = input.split_whitespace().collect::<Vec<_>>();
    let Some((&name, rest)) = parts.split_first() else {
        return Err("empty command".to_string());
    };
    match name {
        "search" | "s" => Ok(Command::Search),
        "next" | "n" => Ok(Command::Next),
        "previous" | "prev" | "p" => Ok(Command::Previous),
        "aet" => rest
            .first()
            .map(|aet| Command::Aet(aet.to_string()))
            .ok_or_else(|| "aet requires a value".to_string()),
        "limit" => {
            let value = rest.first().ok_or("limit requires a value")?;
            match value.parse::<usize>() {
                Ok(limit) if limit > 0 => Ok(Command::Limit(limit)),
                _ => Err(format!("invalid page size: {value}")),
            }
        }
        "orderby" => Ok(Command::OrderBy(rest.join(","))),
        "date" => Ok(Command::StudyDate(parse_range(rest))),
        "time" => Ok(Command::StudyTime(parse_range(rest))),
        "match" => {
            let name = rest.first().ok_or("match requires an attribute name")?;
            Ok(Command::Match {
                name: name.to_string(),
                value: rest[1..].join(" "),
            })
        }
        "flag" => match rest {
            [name, value, state] => Ok(Command::Flag {
                name: name.to_string(),
                value: value.to_string(),
                checked: matches!(*state, "on" | "true" | "yes"),
            }),
            _ => Err("usage: flag NAME VALUE on|off".to_string()),
        },
        "add" => {
            if rest.is_empty() {
                return Err("add requires at least one file".to_string());
            }
            Ok(Command::Add(rest.iter().map(Utf8PathBuf::from).collect()))
        }
        "remove" => rest
            .first()
            .map(|file| Command::Remove(Utf8PathBuf::from(*file)))
            .ok_or_else(|| "remove requires a file".to_string()),
        "clear" => Ok(Command::Clear),
        "upload" => Ok(Command::Upload),
        "quit" | "q" => Ok(Command::Quit),
        other => Err(format!("unknown command: {other}")),
    }
}

/// `FROM [TO]`, where `_` stands for an empty bound.
fn parse_range(args: &[&str]) -> Range {
    let bound = |value: Option<&&str>| match value {
        Some(&"_") | None => String::new(),
        Some(value) => value.to_string(),
    };
    Range::new(bound(args.first()), bound(args.get(1)))
}

#[derive(Debug)]
struct AppState {
    status: String,
    view: View,
    input_mode: InputMode,
    logs: VecDeque<String>,
    alert: Option<String>,
    in_flight: usize,
    request_count: u64,
}

enum Reply {
    Search {
        pending: Pending,
        result: Result<Vec<Attributes>, BrowserError>,
    },
    Download {
        destination: Utf8PathBuf,
        result: Result<u64, BrowserError>,
    },
    Store {
        files: Vec<Utf8PathBuf>,
        result: Result<StoreReceipt, BrowserError>,
    },
}

struct TuiProgress {
    state: Arc<Mutex<AppState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            let message = event.message.trim().to_string();
            if message.starts_with("GET ") {
                state.request_count = state.request_count.saturating_add(1);
            } else {
                state.status = message.clone();
            }
            push_log(&mut state.logs, format!("[{}] {message}", timestamp()));
        }
    }
}

pub struct TuiClients<W, S> {
    pub wado: W,
    pub stow: S,
}

pub struct Tui<Q, W, S>
where
    Q: QidoClient + 'static,
    W: WadoClient + 'static,
    S: StowClient + 'static,
{
    browser: Browser<Q>,
    wado: Arc<W>,
    stow: Arc<S>,
    base_url: String,
    download_dir: Utf8PathBuf,
    uploads: UploadQueue,
    links: HashMap<RowId, InstanceLinks>,
    state: Arc<Mutex<AppState>>,
    table: TableState,
    input: String,
    history: Vec<String>,
    history_index: Option<usize>,
    log_scroll: u16,
}

impl<Q, W, S> Tui<Q, W, S>
where
    Q: QidoClient + 'static,
    W: WadoClient + 'static,
    S: StowClient + 'static,
{
    pub fn new(
        browser: Browser<Q>,
        clients: TuiClients<W, S>,
        base_url: impl Into<String>,
        download_dir: Utf8PathBuf,
        uploads: UploadQueue,
    ) -> Self {
        Self {
            browser,
            wado: Arc::new(clients.wado),
            stow: Arc::new(clients.stow),
            base_url: base_url.into(),
            download_dir,
            uploads,
            links: HashMap::new(),
            state: Arc::new(Mutex::new(AppState {
                status: "ready".to_string(),
                view: View::Browser,
                input_mode: InputMode::Table,
                logs: VecDeque::new(),
                alert: None,
                in_flight: 0,
                request_count: 0,
            })),
            table: TableState::default(),
            input: String::new(),
            history: Vec::new(),
            history_index: None,
            log_scroll: 0,
        }
    }

    pub fn run(mut self, search_on_start: bool) -> miette::Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let (tx, rx) = mpsc::channel();
        if search_on_start {
            let pending = self.browser.prepare_search(0);
            self.dispatch(pending, &tx);
        }
        let result = self.event_loop(&mut terminal, &tx, &rx);

        disable_raw_mode().into_diagnostic()?;
        let mut stdout = io::stdout();
        stdout.execute(LeaveAlternateScreen).into_diagnostic()?;
        result
    }

    fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
        tx: &Sender<Reply>,
        rx: &Receiver<Reply>,
    ) -> miette::Result<()> {
        let mut tick = 0usize;
        loop {
            while let Ok(reply) = rx.try_recv() {
                self.handle_reply(reply);
            }

            let rows = self.browser.tree().visible_rows();
            self.clamp_selection(rows.len());
            terminal
                .draw(|frame| self.draw(frame, &rows, tick))
                .into_diagnostic()?;

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if self.handle_key(key, &rows, tx) {
                        return Ok(());
                    }
                }
            }
            tick = tick.wrapping_add(1);
        }
    }

    fn dispatch(&self, pending: Pending, tx: &Sender<Reply>) {
        self.begin_request();
        let sink = self.sink();
        sink.event(ProgressEvent {
            message: format!("GET {}", pending.path()),
        });
        let client = self.browser.client();
        let tx = tx.clone();
        thread::spawn(move || {
            let result = client.search(pending.path());
            let _ = tx.send(Reply::Search { pending, result });
        });
    }

    fn handle_reply(&mut self, reply: Reply) {
        self.end_request();
        let sink = self.sink();
        match reply {
            Reply::Search { pending, result } => {
                let fresh_studies = matches!(pending, Pending::Studies { .. });
                match self.browser.complete(pending, result, &sink) {
                    Ok(Applied::Inserted(_)) => {
                        let tree = self.browser.tree();
                        self.links.retain(|id, _| tree.row(*id).is_some());
                        if fresh_studies {
                            self.table.select(Some(0));
                        }
                    }
                    Ok(Applied::Stale) => {}
                    Err(err) => self.alert(&err),
                }
            }
            Reply::Download {
                destination,
                result,
            } => match result {
                Ok(bytes) => self.set_status(format!(
                    "saved {destination} ({})",
                    bytes_to_human(bytes)
                )),
                Err(err) => self.alert(&err),
            },
            Reply::Store { files, result } => match self.uploads.complete_batch(&files, result) {
                Ok(receipt) => {
                    self.set_status(format!(
                        "stored {} files (HTTP {})",
                        receipt.files, receipt.status
                    ));
                }
                Err(err) => self.alert(&err),
            },
        }
    }

    fn handle_key(&mut self, key: KeyEvent, rows: &[VisibleRow], tx: &Sender<Reply>) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        if self.take_alert() {
            return false;
        }
        let view = match key.code {
            KeyCode::F(1) => Some(View::Help),
            KeyCode::F(2) => Some(View::Browser),
            KeyCode::F(3) => Some(View::Form),
            KeyCode::F(4) => Some(View::Logs),
            KeyCode::F(5) => Some(View::Upload),
            _ => None,
        };
        if let Some(view) = view {
            self.set_view(view);
            return false;
        }
        if self.input_mode() == InputMode::Command {
            return self.handle_command_key(key, tx);
        }

        let selected = self
            .table
            .selected()
            .and_then(|index| rows.get(index))
            .map(|row| row.kind);
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char(':') => self.set_input_mode(InputMode::Command),
            KeyCode::Up | KeyCode::Char('k') => self.table.select_previous(),
            KeyCode::Down | KeyCode::Char('j') => self.table.select_next(),
            KeyCode::PageUp => self.scroll_logs(-5),
            KeyCode::PageDown => self.scroll_logs(5),
            KeyCode::Char('n') => {
                let pending = self.browser.prepare_next_page();
                self.dispatch(pending, tx);
            }
            KeyCode::Char('p') => {
                let pending = self.browser.prepare_previous_page();
                self.dispatch(pending, tx);
            }
            KeyCode::Enter | KeyCode::Char('s') => {
                if let Some(RowKind::Record(id)) = selected {
                    match self.browser.prepare_expand(id, 0) {
                        Ok(pending) => self.dispatch(pending, tx),
                        Err(err) => self.set_status(err.to_string()),
                    }
                }
            }
            KeyCode::Char('x') => match selected {
                Some(RowKind::Record(id)) | Some(RowKind::ChildHeader { owner: id, .. }) => {
                    if let Err(err) = self.browser.collapse(id) {
                        self.set_status(err.to_string());
                    }
                }
                Some(RowKind::Attributes(id)) => self.toggle_attributes(id),
                None => {}
            },
            KeyCode::Char('a') => match selected {
                Some(RowKind::Record(id)) | Some(RowKind::Attributes(id)) => {
                    self.toggle_attributes(id)
                }
                _ => {}
            },
            KeyCode::Char('<') | KeyCode::Char('>') => {
                let owner = match selected {
                    Some(RowKind::Record(id)) | Some(RowKind::ChildHeader { owner: id, .. }) => {
                        Some(id)
                    }
                    _ => None,
                };
                if let Some(id) = owner.filter(|id| self.browser.tree().child_offset(*id).is_some())
                {
                    let pending = if key.code == KeyCode::Char('<') {
                        self.browser.prepare_previous_children(id)
                    } else {
                        self.browser.prepare_next_children(id)
                    };
                    match pending {
                        Ok(pending) => self.dispatch(pending, tx),
                        Err(err) => self.set_status(err.to_string()),
                    }
                }
            }
            KeyCode::Char('+') | KeyCode::Char('-') => {
                if let Some(RowKind::Record(id)) = selected {
                    let forward = key.code == KeyCode::Char('+');
                    if let Some(selector) = self
                        .links_for(id)
                        .and_then(InstanceLinks::selector_mut)
                    {
                        if forward {
                            selector.select_next();
                        } else {
                            selector.select_previous();
                        }
                    }
                }
            }
            KeyCode::Char('v') => {
                if let Some(RowKind::Record(id)) = selected {
                    self.view(id);
                }
            }
            KeyCode::Char('d') | KeyCode::Char('c') => {
                if let Some(RowKind::Record(id)) = selected {
                    self.download(id, key.code == KeyCode::Char('c'), tx);
                }
            }
            _ => {}
        }
        false
    }

    fn handle_command_key(&mut self, key: KeyEvent, tx: &Sender<Reply>) -> bool {
        match key.code {
            KeyCode::Esc => {
                self.input.clear();
                self.set_input_mode(InputMode::Table);
            }
            KeyCode::Enter => {
                if let Some(command) = self.take_command() {
                    self.set_input_mode(InputMode::Table);
                    match parse_command(&command) {
                        Ok(command) => return self.execute(command, tx),
                        Err(message) => self.set_status(message),
                    }
                }
            }
            KeyCode::Tab => {
                let completed = self.autocomplete();
                self.input = completed;
            }
            KeyCode::Up => self.history_up(),
            KeyCode::Down => self.history_down(),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(ch) => self.input.push(ch),
            _ => {}
        }
        false
    }

    fn execute(&mut self, command: Command, tx: &Sender<Reply>) -> bool {
        match command {
            Command::Search => {
                let pending = self.browser.prepare_search(0);
                self.dispatch(pending, tx);
            }
            Command::Next => {
                let pending = self.browser.prepare_next_page();
                self.dispatch(pending, tx);
            }
            Command::Previous => {
                let pending = self.browser.prepare_previous_page();
                self.dispatch(pending, tx);
            }
            Command::Aet(aet) => {
                self.set_status(format!("AET set to {aet}"));
                self.browser.form_mut().aet = aet;
            }
            Command::Limit(limit) => {
                self.browser.form_mut().limit = limit;
                self.set_status(format!("page size set to {limit}"));
            }
            Command::OrderBy(order_by) => {
                self.set_status(format!("order by {order_by}"));
                self.browser.form_mut().order_by = order_by;
            }
            Command::StudyDate(range) => {
                self.browser.form_mut().study_date = range;
                self.set_status("study date range updated");
            }
            Command::StudyTime(range) => {
                self.browser.form_mut().study_time = range;
                self.set_status("study time range updated");
            }
            Command::Match { name, value } => {
                self.set_status(format!("matcher {name}={value}"));
                self.browser.form_mut().set_matcher(name, value);
            }
            Command::Flag {
                name,
                value,
                checked,
            } => {
                let form = self.browser.form_mut();
                form.flags.retain(|flag| flag.name != name);
                form.flags.push(Flag {
                    name: name.clone(),
                    value,
                    checked,
                });
                self.set_status(format!(
                    "flag {name} {}",
                    if checked { "on" } else { "off" }
                ));
            }
            Command::Add(files) => {
                let added = files
                    .into_iter()
                    .filter(|file| self.uploads.add(file.clone()))
                    .count();
                self.set_status(format!("{added} files queued"));
                self.set_view(View::Upload);
            }
            Command::Remove(file) => {
                if !self.uploads.remove(&file) {
                    self.set_status(format!("{file} is not queued"));
                }
            }
            Command::Clear => {
                self.uploads.clear();
                self.set_status("upload queue cleared");
            }
            Command::Upload => self.upload(tx),
            Command::Quit => return true,
        }
        false
    }

    fn toggle_attributes(&mut self, id: RowId) {
        if let Err(err) = self.browser.toggle_attributes(id) {
            self.set_status(err.to_string());
        }
    }

    fn links_for(&mut self, id: RowId) -> Option<&mut InstanceLinks> {
        if !self.links.contains_key(&id) {
            let links = self.browser.instance_links(id).ok()?;
            self.links.insert(id, links);
        }
        self.links.get_mut(&id)
    }

    fn view(&mut self, id: RowId) {
        let uri = match self.links_for(id).map(|links| links.view_uri()) {
            Some(Ok(uri)) => uri,
            Some(Err(err)) => return self.set_status(err.to_string()),
            None => return self.set_status("only instances can be viewed"),
        };
        let url = join_url(&self.base_url, &uri);
        match open_external(&url) {
            Ok(()) => self.set_status(format!("opened {url}")),
            Err(err) => self.set_status(format!("{url} ({err})")),
        }
    }

    fn download(&mut self, id: RowId, compressed: bool, tx: &Sender<Reply>) {
        let Some(row) = self.browser.tree().row(id) else {
            return;
        };
        let target = match row.level {
            Level::Instance => InstanceLinks::for_instance(&row.record).map(|links| {
                let uri = if compressed {
                    links.download_compressed
                } else {
                    links.download
                };
                let name = row
                    .record
                    .first_string(SOP_INSTANCE_UID)
                    .unwrap_or_else(|| format!("instance-{}", row.number));
                (uri, format!("{name}.dcm"))
            }),
            level => {
                let uid_name = if level == Level::Study {
                    STUDY_INSTANCE_UID
                } else {
                    SERIES_INSTANCE_UID
                };
                row.record.require_string(RETRIEVE_URI).map(|uri| {
                    let name = row
                        .record
                        .first_string(uid_name)
                        .unwrap_or_else(|| format!("{level}-{}", row.number));
                    (uri, format!("{name}.multipart"))
                })
            }
        };
        let (uri, name) = match target {
            Ok(target) => target,
            Err(err) => return self.set_status(err.to_string()),
        };

        let destination = self.download_dir.join(name);
        self.begin_request();
        self.set_status(format!("downloading {destination}"));
        let client = Arc::clone(&self.wado);
        let tx = tx.clone();
        thread::spawn(move || {
            let result = client.download(&uri, &destination);
            let _ = tx.send(Reply::Download {
                destination,
                result,
            });
        });
    }

    fn upload(&mut self, tx: &Sender<Reply>) {
        let files = match self.uploads.prepare_batch() {
            Ok(files) => files,
            Err(err) => return self.alert(&err),
        };
        let path = self.browser.store_path();
        self.begin_request();
        self.set_status(format!("uploading {} files to {path}", files.len()));
        let client = Arc::clone(&self.stow);
        let tx = tx.clone();
        thread::spawn(move || {
            let result = client.store(&path, &files);
            let _ = tx.send(Reply::Store { files, result });
        });
    }

    fn sink(&self) -> TuiProgress {
        TuiProgress {
            state: Arc::clone(&self.state),
        }
    }

    fn alert(&self, err: &BrowserError) {
        let message = match err {
            BrowserError::QidoStatus { message, .. }
            | BrowserError::StowStatus { message, .. }
            | BrowserError::WadoStatus { message, .. } => message.clone(),
            other => other.to_string(),
        };
        if let Ok(mut state) = self.state.lock() {
            push_log(&mut state.logs, format!("[{}] error: {err}", timestamp()));
            state.alert = Some(message);
        }
    }

    fn take_alert(&self) -> bool {
        self.state
            .lock()
            .map(|mut state| state.alert.take().is_some())
            .unwrap_or(false)
    }

    fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        if let Ok(mut state) = self.state.lock() {
            push_log(&mut state.logs, format!("[{}] {status}", timestamp()));
            state.status = status;
        }
    }

    fn begin_request(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.in_flight += 1;
        }
    }

    fn end_request(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.in_flight = state.in_flight.saturating_sub(1);
        }
    }

    fn input_mode(&self) -> InputMode {
        self.state
            .lock()
            .map(|state| state.input_mode)
            .unwrap_or(InputMode::Table)
    }

    fn set_input_mode(&self, mode: InputMode) {
        if let Ok(mut state) = self.state.lock() {
            state.input_mode = mode;
        }
    }

    fn set_view(&self, view: View) {
        if let Ok(mut state) = self.state.lock() {
            state.view = view;
        }
    }

    fn clamp_selection(&mut self, len: usize) {
        match self.table.selected() {
            _ if len == 0 => self.table.select(None),
            Some(index) if index >= len => self.table.select(Some(len - 1)),
            None => self.table.select(Some(0)),
            Some(_) => {}
        }
    }

    fn take_command(&mut self) -> Option<String> {
        let current = self.input.trim().to_string();
        self.input.clear();
        if current.is_empty() {
            return None;
        }
        self.history.push(current.clone());
        self.history_index = None;
        Some(current)
    }

    fn history_up(&mut self) {
        if self.history.is_empty() {
            return;
        }
        let next = match self.history_index {
            Some(index) => index.saturating_sub(1),
            None => self.history.len() - 1,
        };
        self.history_index = Some(next);
        self.input = self.history[next].clone();
    }

    fn history_down(&mut self) {
        match self.history_index {
            Some(index) if index + 1 < self.history.len() => {
                self.history_index = Some(index + 1);
                self.input = self.history[index + 1].clone();
            }
            _ => {
                self.history_index = None;
                self.input.clear();
            }
        }
    }

    fn autocomplete(&self) -> String {
        let current = self.input.trim_start();
        if current.contains(' ') {
            return self.input.clone();
        }
        let matches = COMMANDS
            .iter()
            .filter(|command| command.starts_with(current))
            .collect::<Vec<_>>();
        match matches.as_slice() {
            [only] => format!("{only} "),
            _ => self.input.clone(),
        }
    }

    fn scroll_logs(&mut self, delta: i16) {
        let max = self.state.lock().map(|state| state.logs.len()).unwrap_or(0);
        let max_scroll = max.saturating_sub(1) as i16;
        let next = (self.log_scroll as i16 + delta).clamp(0, max_scroll);
        self.log_scroll = next as u16;
    }

    fn draw(&mut self, frame: &mut ratatui::Frame, rows: &[VisibleRow], tick: usize) {
        let (view, status, alert, in_flight, requests, mode, logs) = match self.state.lock() {
            Ok(state) => (
                state.view,
                state.status.clone(),
                state.alert.clone(),
                state.in_flight,
                state.request_count,
                state.input_mode,
                state.logs.iter().cloned().collect::<Vec<_>>(),
            ),
            Err(_) => return,
        };

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(8),
                Constraint::Length(3),
            ])
            .split(frame.area());

        frame.render_widget(self.draw_header(in_flight, requests, tick), chunks[0]);
        match view {
            View::Browser => self.draw_table(frame, rows, chunks[1]),
            View::Form => frame.render_widget(self.draw_form(), chunks[1]),
            View::Logs => frame.render_widget(draw_logs_view(&logs, self.log_scroll), chunks[1]),
            View::Upload => frame.render_widget(self.draw_uploads(), chunks[1]),
            View::Help => frame.render_widget(draw_help(), chunks[1]),
        }
        self.draw_command_line(frame, mode, &status, rows, chunks[2]);

        if let Some(message) = alert {
            draw_alert(frame, &message);
        }
    }

    fn draw_header(&self, in_flight: usize, requests: u64, tick: usize) -> Paragraph<'static> {
        let busy = if in_flight > 0 {
            ["|", "/", "-", "\\"][tick % 4]
        } else {
            " "
        };
        let form = self.browser.form();
        let tree = self.browser.tree();
        let title = Line::from(vec![
            Span::styled(
                "ARC-BROWSER",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" "),
            Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
            Span::raw(format!("   Archive: {}   AET: ", self.base_url)),
            Span::styled(form.aet.clone(), Style::default().fg(Color::Cyan)),
            Span::raw("   "),
            Span::styled(busy, Style::default().fg(Color::Green)),
        ]);
        let page = Line::from(Span::styled(
            format!(
                "Studies {}-{} · page size {} · order {} · {} requests · {} queued uploads",
                tree.study_offset() + 1,
                tree.study_offset() + tree.studies().len(),
                form.limit,
                form.order_by,
                requests,
                self.uploads.len()
            ),
            Style::default().fg(Color::Gray),
        ));
        Paragraph::new(vec![title, page])
            .alignment(Alignment::Left)
            .block(Block::default().borders(Borders::BOTTOM))
    }

    fn draw_table(&mut self, frame: &mut ratatui::Frame, rows: &[VisibleRow], area: Rect) {
        let table_rows = rows
            .iter()
            .map(|row| self.table_row(row))
            .collect::<Vec<_>>();
        let mut widths = vec![Constraint::Length(12), Constraint::Length(3)];
        widths.extend(std::iter::repeat_n(Constraint::Fill(1), format::STUDY_HEADERS.len()));

        let mut header_cells = vec![Cell::from("#"), Cell::from("")];
        header_cells.extend(format::STUDY_HEADERS.iter().map(|header| Cell::from(*header)));
        let header = Row::new(header_cells).style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        );

        let table = Table::new(table_rows, widths)
            .header(header)
            .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .block(Block::default());
        frame.render_stateful_widget(table, area, &mut self.table);
    }

    fn table_row(&self, row: &VisibleRow) -> Row<'static> {
        let tree = self.browser.tree();
        let indent = "  ".repeat(row.depth);
        match row.kind {
            RowKind::Record(id) => {
                let Some(group) = tree.row(id) else {
                    return Row::new(Vec::<Cell>::new());
                };
                let glyph = match (group.state.children(), group.level.child()) {
                    (Some(_), _) => "▾",
                    (None, Some(_)) => "▸",
                    (None, None) => " ",
                };
                let marker = if group.state.attributes_open() {
                    format!("{glyph}A")
                } else {
                    glyph.to_string()
                };
                let mut cells = vec![
                    Cell::from(format!("{indent}{}.", group.number)),
                    Cell::from(marker),
                ];
                cells.extend(
                    format::columns(group.level, &group.record)
                        .into_iter()
                        .map(Cell::from),
                );
                let color = match group.level {
                    Level::Study => Color::White,
                    Level::Series => Color::Green,
                    Level::Instance => Color::Yellow,
                };
                Row::new(cells).style(Style::default().fg(color))
            }
            RowKind::ChildHeader { owner, level } => {
                let offset = tree.child_offset(owner).unwrap_or(0);
                let mut cells = vec![
                    Cell::from(format!("{indent}{} {}+", level.plural(), offset + 1)),
                    Cell::from(""),
                ];
                cells.extend(format::headers(level).iter().map(|header| Cell::from(*header)));
                Row::new(cells).style(
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::BOLD),
                )
            }
            RowKind::Attributes(id) => {
                let lines = tree
                    .row(id)
                    .map(|group| inspect(&group.record))
                    .unwrap_or_default();
                attribute_row(&indent, &lines)
            }
        }
    }

    fn draw_form(&self) -> Paragraph<'static> {
        let form = self.browser.form();
        let label = |text: &str| Span::styled(text.to_string(), Style::default().fg(Color::Gray));
        let mut lines = vec![
            Line::from(Span::styled(
                "SEARCH FORM",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(vec![label("AET: "), Span::raw(form.aet.clone())]),
            Line::from(vec![label("Page size: "), Span::raw(form.limit.to_string())]),
            Line::from(vec![label("Order by: "), Span::raw(form.order_by.clone())]),
            Line::from(vec![
                label("Study date: "),
                Span::raw(format!("{} .. {}", form.study_date.from, form.study_date.to)),
            ]),
            Line::from(vec![
                label("Study time: "),
                Span::raw(format!("{} .. {}", form.study_time.from, form.study_time.to)),
            ]),
            Line::from(label("Matchers:")),
        ];
        for matcher in &form.matchers {
            lines.push(Line::from(format!("  {}={}", matcher.name, matcher.value)));
        }
        lines.push(Line::from(label("Flags:")));
        for flag in &form.flags {
            let mark = if flag.checked { "[x]" } else { "[ ]" };
            lines.push(Line::from(format!("  {mark} {}={}", flag.name, flag.value)));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("Next search: {}", QueryBuilder::new(form).studies(0)),
            Style::default().fg(Color::DarkGray),
        )));
        Paragraph::new(lines).wrap(Wrap { trim: true })
    }

    fn draw_uploads(&self) -> Paragraph<'static> {
        let mut lines = vec![Line::from(Span::styled(
            format!("UPLOAD QUEUE → {}", self.browser.store_path()),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ))];
        if self.uploads.is_empty() {
            lines.push(Line::from("no files queued (:add FILE...)"));
        }
        for file in self.uploads.files() {
            lines.push(Line::from(format!("- {file}")));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            ":add FILE...  :remove FILE  :clear  :upload",
            Style::default().fg(Color::DarkGray),
        )));
        Paragraph::new(lines).wrap(Wrap { trim: true })
    }

    fn draw_command_line(
        &mut self,
        frame: &mut ratatui::Frame,
        mode: InputMode,
        status: &str,
        rows: &[VisibleRow],
        area: Rect,
    ) {
        let prefix = match mode {
            InputMode::Command => ": ",
            InputMode::Table => "» ",
        };
        let detail = self.selection_detail(rows);
        let lines = vec![
            Line::from(vec![
                Span::styled(
                    prefix,
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(self.input.clone(), Style::default().fg(Color::White)),
            ]),
            Line::from(vec![
                Span::styled("= ", Style::default().fg(Color::DarkGray)),
                Span::styled(status.to_string(), Style::default().fg(Color::DarkGray)),
                Span::styled(detail, Style::default().fg(Color::DarkGray)),
            ]),
        ];
        let para = Paragraph::new(lines).block(Block::default().borders(Borders::TOP));
        frame.render_widget(para, area);
        if mode == InputMode::Command {
            let cursor_x = area
                .x
                .saturating_add((prefix.len() + self.input.len()) as u16)
                .min(area.x + area.width.saturating_sub(1));
            frame.set_cursor_position((cursor_x, area.y.saturating_add(1)));
        }
    }

    fn selection_detail(&mut self, rows: &[VisibleRow]) -> String {
        let Some(RowKind::Record(id)) = self
            .table
            .selected()
            .and_then(|index| rows.get(index))
            .map(|row| row.kind)
        else {
            return String::new();
        };
        let span = self.browser.tree().span(id);
        let selector = self
            .links_for(id)
            .and_then(|links| links.selector())
            .map(|selector| {
                format!(
                    "   {} {}/{}",
                    selector.title(),
                    selector.selected() + 1,
                    selector.count()
                )
            })
            .unwrap_or_default();
        format!("   span {span}{selector}")
    }
}

fn attribute_row(indent: &str, lines: &[InspectorLine]) -> Row<'static> {
    let shown = lines.iter().take(ATTRIBUTE_LINES_MAX.saturating_sub(1));
    let mut names = vec![Line::from(INSPECTOR_HEADERS[0])];
    let mut tags = vec![Line::from(INSPECTOR_HEADERS[1])];
    let mut vrs = vec![Line::from(INSPECTOR_HEADERS[2])];
    let mut values = vec![Line::from(INSPECTOR_HEADERS[3])];
    for line in shown {
        match line {
            InspectorLine::Attribute {
                name,
                tag,
                vr,
                value,
                ..
            } => {
                names.push(Line::from(format!("{}{name}", line.indent())));
                tags.push(Line::from(tag.clone()));
                vrs.push(Line::from(vr.clone()));
                values.push(Line::from(value.clone()));
            }
            InspectorLine::Item { number, .. } => {
                names.push(Line::from(format!("{}Item #{number}", line.indent())));
                tags.push(Line::from(""));
                vrs.push(Line::from(""));
                values.push(Line::from(""));
            }
        }
    }
    let height = names.len() as u16;
    Row::new(vec![
        Cell::from(indent.to_string()),
        Cell::from("A"),
        Cell::from(Text::from(names)),
        Cell::from(Text::from(tags)),
        Cell::from(Text::from(vrs)),
        Cell::from(Text::from(values)),
    ])
    .height(height)
    .style(Style::default().fg(Color::Gray))
}

fn draw_logs_view(logs: &[String], scroll: u16) -> Paragraph<'static> {
    let total = logs.len();
    let visible = 20usize;
    let start = total.saturating_sub(scroll as usize + visible);
    let mut lines = Vec::with_capacity(visible + 1);
    lines.push(Line::from(Span::styled(
        "LOGS (PgUp/PgDown to scroll)",
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )));
    for line in logs.iter().skip(start).take(visible) {
        lines.push(Line::from(line.clone()));
    }
    Paragraph::new(lines).wrap(Wrap { trim: true })
}

fn draw_help() -> Paragraph<'static> {
    let lines = vec![
        Line::from("F1 Help  F2 Browser  F3 Search form  F4 Logs  F5 Upload queue"),
        Line::from("Up/Down select   Enter/s expand   x collapse   a attributes"),
        Line::from("< > previous/next page of an expanded row   n p previous/next studies"),
        Line::from("v view instance   + - frame/reference   d download   c download compressed"),
        Line::from(": command mode, Esc leaves it, Tab completes, Up/Down history"),
        Line::from("Commands: search next previous aet limit orderby date time match flag"),
        Line::from("          add remove clear upload quit"),
        Line::from("Examples: :date 20240101 20240131   :match PatientID 12345"),
        Line::from("          :flag fuzzymatching true on   :add /tmp/a.dcm /tmp/b.dcm"),
    ];
    Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Help"))
        .wrap(Wrap { trim: true })
}

fn draw_alert(frame: &mut ratatui::Frame, message: &str) {
    let area = centered(frame.area(), 50, 5);
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Error")
        .style(Style::default().fg(Color::Red));
    let text = Paragraph::new(vec![
        Line::from(message.to_string()),
        Line::from(Span::styled(
            "press any key",
            Style::default().fg(Color::DarkGray),
        )),
    ])
    .alignment(Alignment::Center)
    .block(block)
    .wrap(Wrap { trim: true });
    frame.render_widget(Clear, area);
    frame.render_widget(text, area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn open_external(url: &str) -> io::Result<()> {
    #[cfg(target_os = "macos")]
    let mut command = Process::new("open");
    #[cfg(target_os = "windows")]
    let mut command = {
        let mut command = Process::new("cmd");
        command.args(["/C", "start", ""]);
        command
    };
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let mut command = Process::new("xdg-open");

    command
        .arg(url)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
}

fn push_log(buffer: &mut VecDeque<String>, item: String) {
    buffer.push_back(item);
    while buffer.len() > LOGS_MAX {
        buffer.pop_front();
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

fn bytes_to_human(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let value = bytes as f64;
    if value >= MB {
        format!("{:.1} MB", value / MB)
    } else if value >= KB {
        format!("{:.1} KB", value / KB)
    } else {
        format!("{bytes} B")
    }
}
