use std::{error::Error, io, sync::Arc, time::Duration};

use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use probe_core::{
    DirectoryNode, InvocationRecord, NodeKind, NoticeKind, SelectionOrigin, TargetDescriptor,
    TargetId,
};
use probe_gateway::HttpGateway;
use probe_session::{spawn_session, SessionCommand, SessionHandle, SessionState};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Terminal,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_GATEWAY_URL: &str = "http://localhost:8080";
const DEFAULT_TARGET_PORTS: [u16; 3] = [31802, 31362, 31363];
const COMPACT_WIDTH: u16 = 100;

#[derive(Clone, Debug)]
struct Config {
    gateway_url: String,
    target_host: String,
    target_ports: Vec<u16>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pane {
    Services,
    Methods,
    Records,
    Directory,
}

impl Pane {
    fn next(self) -> Self {
        match self {
            Pane::Services => Pane::Methods,
            Pane::Methods => Pane::Records,
            Pane::Records => Pane::Directory,
            Pane::Directory => Pane::Services,
        }
    }

    fn prev(self) -> Self {
        match self {
            Pane::Services => Pane::Directory,
            Pane::Methods => Pane::Services,
            Pane::Records => Pane::Methods,
            Pane::Directory => Pane::Records,
        }
    }

    fn title(self) -> &'static str {
        match self {
            Pane::Services => "Services",
            Pane::Methods => "Methods",
            Pane::Records => "Test Cases",
            Pane::Directory => "Directory",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InputMode {
    Browse,
    EditParams,
    AddTarget,
    RenameRecord,
}

/// Cursor/focus state owned by the terminal loop. Everything else comes
/// from session snapshots.
struct Ui {
    focus: Pane,
    service_cursor: usize,
    method_cursor: usize,
    record_cursor: usize,
    directory_cursor: usize,
    mode: InputMode,
    draft: String,
    rename_id: Option<i64>,
    help_open: bool,
}

impl Ui {
    fn new() -> Self {
        Self {
            focus: Pane::Services,
            service_cursor: 0,
            method_cursor: 0,
            record_cursor: 0,
            directory_cursor: 0,
            mode: InputMode::Browse,
            draft: String::new(),
            rename_id: None,
            help_open: false,
        }
    }

    fn clamp(&mut self, state: &SessionState, directory_len: usize) {
        self.service_cursor = clamp_cursor(self.service_cursor, state.services.len());
        self.method_cursor = clamp_cursor(self.method_cursor, state.methods.len());
        self.record_cursor = clamp_cursor(self.record_cursor, state.records.len());
        self.directory_cursor = clamp_cursor(self.directory_cursor, directory_len);
    }

    fn focused_cursor(&mut self) -> &mut usize {
        match self.focus {
            Pane::Services => &mut self.service_cursor,
            Pane::Methods => &mut self.method_cursor,
            Pane::Records => &mut self.record_cursor,
            Pane::Directory => &mut self.directory_cursor,
        }
    }

    fn move_cursor(&mut self, delta: i64) {
        let cursor = self.focused_cursor();
        if delta < 0 {
            *cursor = cursor.saturating_sub(delta.unsigned_abs() as usize);
        } else {
            *cursor = cursor.saturating_add(delta as usize);
        }
    }
}

fn clamp_cursor(cursor: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        cursor.min(len - 1)
    }
}

/// One visible line of the directory tree, carrying enough of its
/// ancestry to select a history entry with the right write-back scope.
#[derive(Clone, Debug)]
struct DirectoryRow {
    depth: usize,
    label: String,
    kind: NodeKind,
    entry: Option<(String, String, InvocationRecord)>,
}

fn flatten_directory(nodes: &[DirectoryNode]) -> Vec<DirectoryRow> {
    let mut rows = Vec::new();
    for node in nodes {
        push_directory_node(node, 0, None, None, &mut rows);
    }
    rows
}

fn push_directory_node(
    node: &DirectoryNode,
    depth: usize,
    service: Option<&str>,
    method: Option<&str>,
    rows: &mut Vec<DirectoryRow>,
) {
    let (service, method) = match node.kind {
        NodeKind::Service => (Some(node.label.as_str()), None),
        NodeKind::Method => (service, Some(node.label.as_str())),
        NodeKind::History => (service, method),
    };
    let entry = match (&node.record, service, method) {
        (Some(record), Some(service), Some(method)) => {
            Some((service.to_string(), method.to_string(), record.clone()))
        }
        _ => None,
    };
    rows.push(DirectoryRow {
        depth,
        label: node.label.clone(),
        kind: node.kind,
        entry,
    });
    for child in &node.children {
        push_directory_node(child, depth + 1, service, method, rows);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = load_config();
    init_logging();

    let gateway = Arc::new(HttpGateway::new(&config.gateway_url)?);
    let seed = seed_targets(&config);
    let (handle, session_task) = spawn_session(gateway, seed);
    info!(event = "console_started", gateway_url = %config.gateway_url);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let mut events = EventStream::new();
    let mut state_rx = handle.state();
    let mut ui = Ui::new();

    loop {
        let state = state_rx.borrow().clone();
        let directory_rows = flatten_directory(&state.directory);
        ui.clamp(&state, directory_rows.len());
        terminal.draw(|frame| render_ui(frame, &state, &directory_rows, &ui))?;

        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            maybe_event = events.next() => {
                match maybe_event {
                    Some(Ok(event)) => {
                        if handle_input(event, &state, &directory_rows, &mut ui, &handle, &config)
                            .await
                        {
                            break;
                        }
                    }
                    Some(Err(_)) | None => break,
                }
            }
        }
    }

    handle.shutdown().await;
    let _ = tokio::time::timeout(Duration::from_secs(2), session_task).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

async fn handle_input(
    event: Event,
    state: &SessionState,
    directory_rows: &[DirectoryRow],
    ui: &mut Ui,
    handle: &SessionHandle,
    config: &Config,
) -> bool {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
            handle_key(key, state, directory_rows, ui, handle, config).await
        }
        _ => false,
    }
}

async fn handle_key(
    key: KeyEvent,
    state: &SessionState,
    directory_rows: &[DirectoryRow],
    ui: &mut Ui,
    handle: &SessionHandle,
    config: &Config,
) -> bool {
    match ui.mode {
        InputMode::EditParams => {
            match key.code {
                KeyCode::Esc => {
                    ui.mode = InputMode::Browse;
                    handle
                        .send(SessionCommand::EditParams {
                            text: std::mem::take(&mut ui.draft),
                        })
                        .await;
                }
                KeyCode::Enter => ui.draft.push('\n'),
                KeyCode::Tab => ui.draft.push_str("  "),
                KeyCode::Backspace => {
                    ui.draft.pop();
                }
                KeyCode::Char(ch) => ui.draft.push(ch),
                _ => {}
            }
            return false;
        }
        InputMode::AddTarget => {
            match key.code {
                KeyCode::Esc => {
                    ui.mode = InputMode::Browse;
                    ui.draft.clear();
                }
                KeyCode::Enter => {
                    ui.mode = InputMode::Browse;
                    if let Ok(port) = ui.draft.trim().parse::<u16>() {
                        handle
                            .send(SessionCommand::AddTarget {
                                name: format!("node-{port}"),
                                host: config.target_host.clone(),
                                port,
                            })
                            .await;
                    }
                    ui.draft.clear();
                }
                KeyCode::Backspace => {
                    ui.draft.pop();
                }
                KeyCode::Char(ch) if ch.is_ascii_digit() => ui.draft.push(ch),
                _ => {}
            }
            return false;
        }
        InputMode::RenameRecord => {
            match key.code {
                KeyCode::Esc => {
                    ui.mode = InputMode::Browse;
                    ui.draft.clear();
                    ui.rename_id = None;
                }
                KeyCode::Enter => {
                    ui.mode = InputMode::Browse;
                    let name = std::mem::take(&mut ui.draft);
                    if let Some(id) = ui.rename_id.take() {
                        if !name.trim().is_empty() {
                            handle.send(SessionCommand::RenameRecord { id, name }).await;
                        }
                    }
                }
                KeyCode::Backspace => {
                    ui.draft.pop();
                }
                KeyCode::Char(ch) => ui.draft.push(ch),
                _ => {}
            }
            return false;
        }
        InputMode::Browse => {}
    }

    if matches!(key.code, KeyCode::Char('?') | KeyCode::F(1)) {
        ui.help_open = !ui.help_open;
        return false;
    }
    if key.code == KeyCode::Esc && ui.help_open {
        ui.help_open = false;
        return false;
    }
    if ui.help_open {
        return false;
    }

    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Tab => ui.focus = ui.focus.next(),
        KeyCode::BackTab => ui.focus = ui.focus.prev(),
        KeyCode::Down | KeyCode::Char('j') => ui.move_cursor(1),
        KeyCode::Up | KeyCode::Char('k') => ui.move_cursor(-1),
        KeyCode::Char('g') => *ui.focused_cursor() = 0,
        KeyCode::Enter => activate_cursor(state, directory_rows, ui, handle).await,
        KeyCode::Esc => {
            handle.send(SessionCommand::ClearSelection).await;
        }
        KeyCode::Char('e') => {
            ui.mode = InputMode::EditParams;
            ui.draft = state.edit_buffer.clone();
        }
        KeyCode::Char('a') => {
            ui.mode = InputMode::AddTarget;
            ui.draft.clear();
        }
        KeyCode::Char('x') => {
            if let Some(id) = state.active_target {
                handle.send(SessionCommand::RemoveTarget { id }).await;
            }
        }
        KeyCode::Char(']') => cycle_target(state, handle, 1).await,
        KeyCode::Char('[') => cycle_target(state, handle, -1).await,
        KeyCode::Char('i') => {
            handle.send(SessionCommand::Invoke).await;
        }
        KeyCode::Char('s') => {
            handle.send(SessionCommand::SaveRecord).await;
        }
        KeyCode::Char('u') => {
            handle.send(SessionCommand::UpdateSelectedRecord).await;
        }
        KeyCode::Char('n') => {
            if let Some(record) = state.records.get(ui.record_cursor) {
                ui.mode = InputMode::RenameRecord;
                ui.rename_id = Some(record.id);
                ui.draft = record.name.clone();
            }
        }
        KeyCode::Char('d') => {
            if let Some(record) = state.records.get(ui.record_cursor) {
                handle
                    .send(SessionCommand::DeleteRecord { id: record.id })
                    .await;
            }
        }
        _ => {}
    }
    false
}

async fn activate_cursor(
    state: &SessionState,
    directory_rows: &[DirectoryRow],
    ui: &mut Ui,
    handle: &SessionHandle,
) {
    match ui.focus {
        Pane::Services => {
            if let Some(service) = state.services.get(ui.service_cursor) {
                handle
                    .send(SessionCommand::SelectService {
                        service: Some(service.clone()),
                    })
                    .await;
                ui.method_cursor = 0;
                ui.record_cursor = 0;
            }
        }
        Pane::Methods => {
            if let Some(method) = state.methods.get(ui.method_cursor) {
                handle
                    .send(SessionCommand::SelectMethod {
                        method: Some(method.clone()),
                    })
                    .await;
                ui.record_cursor = 0;
            }
        }
        Pane::Records => {
            if let Some(record) = state.records.get(ui.record_cursor) {
                handle
                    .send(SessionCommand::SelectRecord {
                        record: record.clone(),
                        origin: SelectionOrigin::FromList,
                    })
                    .await;
            }
        }
        Pane::Directory => {
            if let Some(row) = directory_rows.get(ui.directory_cursor) {
                if let Some((service, method, record)) = row.entry.clone() {
                    handle
                        .send(SessionCommand::SelectRecord {
                            record,
                            origin: SelectionOrigin::FromDirectory { service, method },
                        })
                        .await;
                }
            }
        }
    }
}

async fn cycle_target(state: &SessionState, handle: &SessionHandle, step: i64) {
    if state.targets.is_empty() {
        return;
    }
    let current = state
        .active_target
        .and_then(|id| state.targets.iter().position(|target| target.id == id))
        .unwrap_or(0);
    let len = state.targets.len() as i64;
    let next = (current as i64 + step).rem_euclid(len) as usize;
    let id = state.targets[next].id;
    if state.active_target != Some(id) {
        handle.send(SessionCommand::ActivateTarget { id }).await;
    }
}

#[derive(Clone, Copy)]
struct ProbeTheme {
    bg: Color,
    border: Color,
    focus: Color,
    title: Color,
    text: Color,
    muted: Color,
    accent: Color,
    ok: Color,
    critical: Color,
}

fn probe_theme() -> ProbeTheme {
    ProbeTheme {
        bg: Color::Rgb(11, 18, 32),
        border: Color::Rgb(71, 85, 105),
        focus: Color::Rgb(56, 189, 248),
        title: Color::Rgb(191, 219, 254),
        text: Color::Rgb(226, 232, 240),
        muted: Color::Rgb(148, 163, 184),
        accent: Color::Rgb(56, 189, 248),
        ok: Color::Rgb(34, 197, 94),
        critical: Color::Rgb(239, 68, 68),
    }
}

fn render_ui(
    frame: &mut ratatui::Frame,
    state: &SessionState,
    directory_rows: &[DirectoryRow],
    ui: &Ui,
) {
    let size = frame.size();
    let theme = probe_theme();
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(0)])
        .split(size);
    frame.render_widget(render_header(state, ui, theme, size.width), rows[0]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(28),
            Constraint::Percentage(36),
            Constraint::Percentage(36),
        ])
        .split(rows[1]);

    let catalog = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(columns[0]);
    render_service_list(frame, state, ui, theme, catalog[0]);
    render_method_list(frame, state, ui, theme, catalog[1]);

    let stored = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(columns[1]);
    render_record_list(frame, state, ui, theme, stored[0]);
    render_directory(frame, directory_rows, ui, theme, stored[1]);

    let workbench = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(columns[2]);
    frame.render_widget(render_params(state, ui, theme), workbench[0]);
    frame.render_widget(render_response(state, theme), workbench[1]);

    if ui.help_open {
        render_help_overlay(frame, theme);
    }
}

fn render_header(state: &SessionState, ui: &Ui, theme: ProbeTheme, width: u16) -> Paragraph<'static> {
    let compact = width < COMPACT_WIDTH;
    let inner_width = width.saturating_sub(4) as usize;
    let target = state
        .targets
        .iter()
        .find(|target| Some(target.id) == state.active_target)
        .map(|target| format!("{} ({}:{})", target.name, target.host, target.port))
        .unwrap_or_else(|| "none".to_string());
    let loading = if state.loading_invoke {
        "invoking"
    } else if state.loading_services || state.loading_methods {
        "loading"
    } else {
        "idle"
    };
    let fields = vec![
        format!("Target: {}", ellipsize(&target, if compact { 22 } else { 40 })),
        format!("Targets: {}", state.targets.len()),
        format!(
            "Service: {}",
            state.active_service.as_deref().unwrap_or("-")
        ),
        format!("Method: {}", state.active_method.as_deref().unwrap_or("-")),
        format!("State: {loading}"),
    ];
    let status_line = fit_fields(&fields, inner_width.max(12));

    let (notice_text, notice_color) = match ui.mode {
        InputMode::AddTarget => (format!("Add target port: {}_", ui.draft), theme.accent),
        InputMode::RenameRecord => (format!("Rename: {}_", ui.draft), theme.accent),
        InputMode::EditParams => ("Editing params (Esc commits)".to_string(), theme.accent),
        InputMode::Browse => match &state.notification {
            Some(notice) => (
                notice.message.clone(),
                match notice.kind {
                    NoticeKind::Success => theme.ok,
                    NoticeKind::Error => theme.critical,
                },
            ),
            None => {
                let hint = if compact {
                    "ready".to_string()
                } else {
                    "ready (Enter select, i invoke, s save, ? help)".to_string()
                };
                (hint, theme.muted)
            }
        },
    };

    Paragraph::new(Text::from(vec![
        Line::from(Span::styled(status_line, Style::default().fg(theme.text))),
        Line::from(Span::styled(
            ellipsize(&notice_text, inner_width.max(12)),
            Style::default().fg(notice_color),
        )),
    ]))
    .style(Style::default().fg(theme.text).bg(theme.bg))
    .block(pane_block("RPC Probe", false, theme))
}

fn pane_block(title: &'static str, focused: bool, theme: ProbeTheme) -> Block<'static> {
    let border = if focused { theme.focus } else { theme.border };
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(theme.bg))
        .title(Span::styled(
            title,
            Style::default()
                .fg(theme.title)
                .add_modifier(Modifier::BOLD),
        ))
}

fn render_service_list(
    frame: &mut ratatui::Frame,
    state: &SessionState,
    ui: &Ui,
    theme: ProbeTheme,
    area: Rect,
) {
    let items: Vec<ListItem> = state
        .services
        .iter()
        .map(|service| {
            let active = state.active_service.as_deref() == Some(service.as_str());
            styled_item(service, active, theme)
        })
        .collect();
    render_list(
        frame,
        items,
        ui.service_cursor,
        Pane::Services,
        ui,
        theme,
        area,
    );
}

fn render_method_list(
    frame: &mut ratatui::Frame,
    state: &SessionState,
    ui: &Ui,
    theme: ProbeTheme,
    area: Rect,
) {
    let items: Vec<ListItem> = state
        .methods
        .iter()
        .map(|method| {
            let active = state.active_method.as_deref() == Some(method.as_str());
            styled_item(method, active, theme)
        })
        .collect();
    render_list(
        frame,
        items,
        ui.method_cursor,
        Pane::Methods,
        ui,
        theme,
        area,
    );
}

fn render_record_list(
    frame: &mut ratatui::Frame,
    state: &SessionState,
    ui: &Ui,
    theme: ProbeTheme,
    area: Rect,
) {
    let selected_id = state.selection.as_ref().map(|selection| selection.record.id);
    let items: Vec<ListItem> = state
        .records
        .iter()
        .map(|record| {
            let marker = if Some(record.id) == selected_id {
                "* "
            } else {
                "  "
            };
            styled_item(
                &format!("{marker}{} #{}", record.name, record.id),
                Some(record.id) == selected_id,
                theme,
            )
        })
        .collect();
    render_list(
        frame,
        items,
        ui.record_cursor,
        Pane::Records,
        ui,
        theme,
        area,
    );
}

fn render_directory(
    frame: &mut ratatui::Frame,
    rows: &[DirectoryRow],
    ui: &Ui,
    theme: ProbeTheme,
    area: Rect,
) {
    let items: Vec<ListItem> = rows
        .iter()
        .map(|row| {
            let indent = "  ".repeat(row.depth);
            let color = match row.kind {
                NodeKind::Service => theme.title,
                NodeKind::Method => theme.text,
                NodeKind::History => theme.muted,
            };
            ListItem::new(Line::from(Span::styled(
                format!("{indent}{}", row.label),
                Style::default().fg(color),
            )))
        })
        .collect();
    render_list(
        frame,
        items,
        ui.directory_cursor,
        Pane::Directory,
        ui,
        theme,
        area,
    );
}

fn styled_item(label: &str, active: bool, theme: ProbeTheme) -> ListItem<'static> {
    let style = if active {
        Style::default()
            .fg(theme.accent)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(theme.text)
    };
    ListItem::new(Line::from(Span::styled(label.to_string(), style)))
}

fn render_list(
    frame: &mut ratatui::Frame,
    items: Vec<ListItem<'static>>,
    cursor: usize,
    pane: Pane,
    ui: &Ui,
    theme: ProbeTheme,
    area: Rect,
) {
    let focused = ui.focus == pane;
    let list = List::new(items)
        .block(pane_block(pane.title(), focused, theme))
        .highlight_style(
            Style::default()
                .bg(theme.border)
                .add_modifier(Modifier::BOLD),
        );
    let mut list_state = ListState::default();
    if focused {
        list_state.select(Some(cursor));
    }
    frame.render_stateful_widget(list, area, &mut list_state);
}

fn render_params(state: &SessionState, ui: &Ui, theme: ProbeTheme) -> Paragraph<'static> {
    let (title, body) = if ui.mode == InputMode::EditParams {
        ("Params (editing)", ui.draft.clone())
    } else {
        ("Params", state.edit_buffer.clone())
    };
    Paragraph::new(body)
        .style(Style::default().fg(theme.text).bg(theme.bg))
        .wrap(Wrap { trim: false })
        .block(pane_block(title, ui.mode == InputMode::EditParams, theme))
}

fn render_response(state: &SessionState, theme: ProbeTheme) -> Paragraph<'static> {
    let lines = match &state.last_response {
        Some(outcome) => {
            let (label, color) = if outcome.success {
                ("ok", theme.ok)
            } else {
                ("failed", theme.critical)
            };
            vec![
                Line::from(Span::styled(
                    format!(
                        "{label} in {}ms at {}",
                        outcome.elapsed_ms,
                        outcome.finished_at.format("%H:%M:%S")
                    ),
                    Style::default().fg(color),
                )),
                Line::from(Span::styled(
                    outcome.body.clone(),
                    Style::default().fg(theme.text),
                )),
            ]
        }
        None => vec![Line::from(Span::styled(
            "no invocation yet".to_string(),
            Style::default().fg(theme.muted),
        ))],
    };
    Paragraph::new(Text::from(lines))
        .style(Style::default().fg(theme.text).bg(theme.bg))
        .wrap(Wrap { trim: false })
        .block(pane_block("Response", false, theme))
}

fn render_help_overlay(frame: &mut ratatui::Frame, theme: ProbeTheme) {
    let size = frame.size();
    let width = size.width.saturating_sub(8).min(60).max(30);
    let height = 14.min(size.height.saturating_sub(2));
    let area = Rect {
        x: (size.width.saturating_sub(width)) / 2,
        y: (size.height.saturating_sub(height)) / 2,
        width,
        height,
    };
    let lines = [
        "Tab / Shift-Tab  switch pane",
        "j/k or arrows    move cursor",
        "Enter            select item",
        "e                edit params (Esc commits)",
        "i / s / u        invoke / save / update selection",
        "n / d            rename / delete test case",
        "a / x            add / remove target",
        "[ / ]            previous / next target",
        "Esc              clear selection",
        "q                quit",
    ];
    let text: Vec<Line> = lines
        .iter()
        .map(|line| Line::from(Span::styled((*line).to_string(), Style::default().fg(theme.text))))
        .collect();
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Text::from(text))
            .style(Style::default().fg(theme.text).bg(theme.bg))
            .block(pane_block("Help", true, theme)),
        area,
    );
}

fn ellipsize(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    if max <= 3 {
        return "...".chars().take(max).collect();
    }
    let prefix: String = input.chars().take(max - 3).collect();
    format!("{prefix}...")
}

fn fit_fields(fields: &[String], max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let mut output = String::new();
    for field in fields {
        if field.trim().is_empty() {
            continue;
        }
        let candidate = if output.is_empty() {
            field.clone()
        } else {
            format!("{output} | {field}")
        };
        if candidate.chars().count() <= max {
            output = candidate;
            continue;
        }
        if output.is_empty() {
            return ellipsize(field, max);
        }
        break;
    }
    output
}

fn seed_targets(config: &Config) -> Vec<TargetDescriptor> {
    config
        .target_ports
        .iter()
        .map(|&port| TargetDescriptor {
            id: TargetId::new(),
            name: format!("node-{port}"),
            host: config.target_host.clone(),
            port,
        })
        .collect()
}

fn load_config() -> Config {
    Config {
        gateway_url: resolve_gateway_url(),
        target_host: resolve_target_host(),
        target_ports: resolve_target_ports(),
    }
}

fn resolve_gateway_url() -> String {
    if let Ok(value) = std::env::var("PROBE_GATEWAY_URL") {
        if !value.trim().is_empty() {
            return value;
        }
    }
    DEFAULT_GATEWAY_URL.to_string()
}

fn resolve_target_host() -> String {
    if let Ok(value) = std::env::var("PROBE_TARGET_HOST") {
        if !value.trim().is_empty() {
            return value;
        }
    }
    "localhost".to_string()
}

fn resolve_target_ports() -> Vec<u16> {
    if let Ok(value) = std::env::var("PROBE_TARGET_PORTS") {
        let ports = parse_port_list(&value);
        if !ports.is_empty() {
            return ports;
        }
    }
    DEFAULT_TARGET_PORTS.to_vec()
}

fn parse_port_list(value: &str) -> Vec<u16> {
    value
        .split(',')
        .filter_map(|part| part.trim().parse::<u16>().ok())
        .collect()
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_enabled = matches!(
        std::env::var("PROBE_LOG_STDOUT").ok().as_deref(),
        Some("1") | Some("true") | Some("TRUE") | Some("yes") | Some("YES")
    );
    if stdout_enabled {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::sink)
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_core::build_directory;
    use std::collections::HashMap;

    fn record(id: i64, service: &str, method: &str) -> InvocationRecord {
        InvocationRecord {
            id,
            port: 31802,
            service: service.to_string(),
            method: method.to_string(),
            name: format!("case-{id}"),
            json_params: "{}".to_string(),
            create_time: None,
            modify_time: None,
            is_valid: probe_core::RecordValidity::Valid,
        }
    }

    #[test]
    fn directory_rows_carry_their_service_and_method() {
        let services = vec!["UserService".to_string()];
        let mut methods = HashMap::new();
        methods.insert(
            "UserService".to_string(),
            vec!["getUserById".to_string()],
        );
        let records = vec![record(7, "UserService", "getUserById")];
        let tree = build_directory(&services, &methods, &records);

        let rows = flatten_directory(&tree);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].depth, 0);
        assert!(rows[0].entry.is_none());
        let (service, method, rec) = rows[2].entry.clone().unwrap();
        assert_eq!(service, "UserService");
        assert_eq!(method, "getUserById");
        assert_eq!(rec.id, 7);
    }

    #[test]
    fn port_list_skips_malformed_entries() {
        assert_eq!(parse_port_list("31802, 31362"), vec![31802, 31362]);
        assert_eq!(parse_port_list("oops,31363,"), vec![31363]);
        assert!(parse_port_list("").is_empty());
    }

    #[test]
    fn ellipsize_keeps_short_input_intact() {
        assert_eq!(ellipsize("short", 10), "short");
        assert_eq!(ellipsize("com.example.UserService", 10), "com.exa...");
    }

    #[test]
    fn cursor_clamp_handles_shrunk_lists() {
        assert_eq!(clamp_cursor(5, 3), 2);
        assert_eq!(clamp_cursor(0, 0), 0);
        assert_eq!(clamp_cursor(1, 4), 1);
    }
}
