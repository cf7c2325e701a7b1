// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use querylens_app::{
    AnalyticsSource, ColumnSpec, Export, FetchError, Interaction, Payload, RequestId,
    RetryAction, Session, SessionEvent, SourceKind, TableCommand, TableEvent, Ticket, View,
    value_text,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Tabs, Wrap};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const LINK_ARROW: &str = "→";
const DRILL_ARROW: &str = "↘";
const BUSY_MARK: &str = "⟳";
const STATUS_CLEAR_AFTER: Duration = Duration::from_secs(4);
const MIN_COLUMN_WIDTH: u16 = 12;
const COLUMN_SPACING: u16 = 1;

/// Everything the terminal loop needs from the outside world.
pub trait AppRuntime {
    fn source(&self) -> Arc<dyn AnalyticsSource>;
    fn export_dir(&self) -> PathBuf;

    /// Run the ticket's request and report back on `tx`. The default runs
    /// inline; interactive runtimes override this with
    /// [`spawn_fetch_worker`] so the loop keeps drawing.
    fn spawn_fetch(&mut self, ticket: &Ticket, tx: Sender<InternalEvent>) -> Result<()> {
        let outcome = self.source().fetch(&ticket.request);
        tx.send(InternalEvent::FetchCompleted {
            id: ticket.id,
            outcome,
        })
        .map_err(|_| anyhow::anyhow!("fetch event channel closed"))?;
        Ok(())
    }

    fn write_export(&mut self, export: &Export) -> Result<PathBuf> {
        let dir = self.export_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("create export directory {}", dir.display()))?;
        let path = dir.join(&export.file_name);
        fs::write(&path, &export.contents)
            .with_context(|| format!("write export {}", path.display()))?;
        Ok(path)
    }
}

/// Run one request on a worker thread. The worker owns nothing but the
/// source handle and the channel; the session stays on the loop thread.
pub fn spawn_fetch_worker(
    source: Arc<dyn AnalyticsSource>,
    ticket: &Ticket,
    tx: Sender<InternalEvent>,
) -> Result<()> {
    let id = ticket.id;
    let request = ticket.request.clone();
    thread::Builder::new()
        .name(format!("fetch-{id}"))
        .spawn(move || {
            let outcome = source.fetch(&request);
            if tx.send(InternalEvent::FetchCompleted { id, outcome }).is_err() {
                debug!(request = %id, "fetch finished after the terminal loop exited");
            }
        })
        .context("spawn fetch worker")?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    ClearStatus {
        token: u64,
    },
    FetchCompleted {
        id: RequestId,
        outcome: Result<Payload, FetchError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum InputMode {
    #[default]
    Nav,
    Search,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ViewData {
    input: InputMode,
    selected_row: usize,
    selected_col: usize,
    /// First table column drawn; the window slides to keep the cursor visible.
    col_offset: usize,
    /// How many columns the last frame had room for. Zero draws them all.
    visible_cols: usize,
    overlay_scroll: u16,
    help_visible: bool,
    status_line: Option<String>,
    status_token: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorCommand {
    MoveRow(isize),
    MoveColumn(isize),
    JumpFirstRow,
    JumpLastRow,
    JumpFirstColumn,
    JumpLastColumn,
}

pub fn run_app<R: AppRuntime>(session: &mut Session, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::default();
    let (internal_tx, internal_rx) = mpsc::channel();

    let events = session.start();
    apply_session_events(session, runtime, &mut view_data, &internal_tx, events);

    let mut result = Ok(());
    loop {
        process_internal_events(session, runtime, &mut view_data, &internal_tx, &internal_rx);

        let width = terminal.size().context("read terminal size")?.width;
        view_data.visible_cols = columns_that_fit(width);
        scroll_columns_into_view(&mut view_data);

        if let Err(error) = terminal.draw(|frame| render(frame, session, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = event::poll(Duration::from_millis(120)).context("poll event")?;
        if has_event {
            match event::read().context("read event")? {
                Event::Key(key) => {
                    if handle_key_event(session, runtime, &mut view_data, &internal_tx, key) {
                        break;
                    }
                }
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn process_internal_events<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                view_data.status_line = None;
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::FetchCompleted { id, outcome } => {
                let events = session.complete(id, outcome);
                apply_session_events(session, runtime, view_data, tx, events);
            }
        }
    }
}

/// Carry out what the session asked for. Fetches go to the runtime; a fetch
/// that cannot even be started is completed as a transport failure so the
/// session never waits on it.
fn apply_session_events<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    events: Vec<SessionEvent>,
) {
    let mut queue = VecDeque::from(events);
    while let Some(event) = queue.pop_front() {
        match event {
            SessionEvent::Fetch(ticket) => {
                if let Err(error) = runtime.spawn_fetch(&ticket, tx.clone()) {
                    warn!(request = %ticket.id, error = %format!("{error:#}"), "fetch not started");
                    let failure = FetchError::transport(ticket.request.describe(), format!("{error:#}"));
                    queue.extend(session.complete(ticket.id, Err(failure)));
                }
            }
            SessionEvent::Navigated { title, .. } => {
                reset_cursor(view_data);
                emit_status(view_data, tx, format!("{LINK_ARROW} {title}"));
            }
            SessionEvent::Returned { title, .. } => {
                reset_cursor(view_data);
                emit_status(view_data, tx, format!("back to {title}"));
            }
            SessionEvent::DatasetLoaded { .. } => clamp_cursor(session, view_data),
            SessionEvent::OverlayOpened(_) => view_data.overlay_scroll = 0,
            SessionEvent::Ignored(message)
            | SessionEvent::Busy(message)
            | SessionEvent::Status(message) => emit_status(view_data, tx, message),
            SessionEvent::Table(TableEvent::QueryChanged) => view_data.selected_row = 0,
            SessionEvent::Table(TableEvent::Status(status)) => {
                emit_status(view_data, tx, status.message());
            }
            SessionEvent::OverlayUpdated
            | SessionEvent::OverlayClosed
            | SessionEvent::NoticeRaised(_)
            | SessionEvent::NoticeCleared
            | SessionEvent::Discarded { .. } => {}
        }
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_AFTER);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(view_data: &mut ViewData, internal_tx: &Sender<InternalEvent>, message: impl Into<String>) {
    view_data.status_line = Some(message.into());
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn dispatch<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    interaction: Interaction,
) {
    let events = session.handle(interaction);
    apply_session_events(session, runtime, view_data, tx, events);
}

fn handle_key_event<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if view_data.help_visible {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('?')) {
            view_data.help_visible = false;
        }
        return false;
    }

    if session.overlay().is_open() {
        handle_overlay_key(session, runtime, view_data, internal_tx, key);
        return false;
    }

    if view_data.input == InputMode::Search {
        handle_search_key(session, runtime, view_data, internal_tx, key);
        return false;
    }

    if let Some(command) = cursor_command_for_key(key) {
        apply_cursor_command(session, view_data, command);
        return false;
    }

    match (key.code, key.modifiers) {
        (KeyCode::Char('q'), KeyModifiers::NONE) => return true,
        (KeyCode::Char('?'), _) => view_data.help_visible = true,
        (KeyCode::Enter, _) => {
            if let Some(interaction) = enter_interaction(session, view_data) {
                dispatch(session, runtime, view_data, internal_tx, interaction);
            }
        }
        (KeyCode::Char('v'), KeyModifiers::NONE) => {
            let row = view_data.selected_row;
            dispatch(session, runtime, view_data, internal_tx, Interaction::ViewQueries { row });
        }
        (KeyCode::Char('d'), KeyModifiers::NONE) => {
            let row = view_data.selected_row;
            dispatch(session, runtime, view_data, internal_tx, Interaction::ViewDetails { row });
        }
        (KeyCode::Char('/'), _) => {
            view_data.input = InputMode::Search;
        }
        (KeyCode::Char('c'), KeyModifiers::NONE) => {
            let interaction = Interaction::Table(TableCommand::ClearSearch);
            dispatch(session, runtime, view_data, internal_tx, interaction);
        }
        (KeyCode::Char('0'), KeyModifiers::NONE) => {
            let interaction = Interaction::Table(TableCommand::Reset);
            dispatch(session, runtime, view_data, internal_tx, interaction);
            reset_cursor(view_data);
        }
        (KeyCode::Char('s'), KeyModifiers::NONE) => {
            let columns = session.columns();
            if let Some(column) = columns.get(view_data.selected_col) {
                let interaction = Interaction::Table(TableCommand::ToggleSort(column.key.clone()));
                dispatch(session, runtime, view_data, internal_tx, interaction);
            }
        }
        (KeyCode::Char('n'), KeyModifiers::NONE) | (KeyCode::PageDown, _) => {
            let interaction = Interaction::Table(TableCommand::NextPage);
            dispatch(session, runtime, view_data, internal_tx, interaction);
        }
        (KeyCode::Char('p'), KeyModifiers::NONE) | (KeyCode::PageUp, _) => {
            let interaction = Interaction::Table(TableCommand::PrevPage);
            dispatch(session, runtime, view_data, internal_tx, interaction);
        }
        (KeyCode::Char('b'), KeyModifiers::NONE) | (KeyCode::Backspace, _) | (KeyCode::Esc, _) => {
            dispatch(session, runtime, view_data, internal_tx, Interaction::Back);
        }
        (KeyCode::Char('H'), _) => {
            dispatch(session, runtime, view_data, internal_tx, Interaction::Home);
        }
        (KeyCode::Tab, _) | (KeyCode::BackTab, _) => {
            let next = match session.current_view().root_kind() {
                SourceKind::Warehouse => SourceKind::User,
                SourceKind::User => SourceKind::Warehouse,
            };
            dispatch(session, runtime, view_data, internal_tx, Interaction::SwitchRoot(next));
        }
        (KeyCode::Char(digit @ '1'..='9'), KeyModifiers::NONE) => {
            let index = usize::from(digit as u8 - b'1');
            if let Some(kind) = SourceKind::ALL.get(index).copied() {
                dispatch(session, runtime, view_data, internal_tx, Interaction::SwitchRoot(kind));
            }
        }
        (KeyCode::Char('r'), KeyModifiers::NONE) => {
            dispatch(session, runtime, view_data, internal_tx, Interaction::Refresh);
        }
        (KeyCode::Char('R'), _) => {
            dispatch(session, runtime, view_data, internal_tx, Interaction::Retry);
        }
        (KeyCode::Char('x'), KeyModifiers::NONE) => {
            dispatch(session, runtime, view_data, internal_tx, Interaction::DismissNotice);
        }
        (KeyCode::Char('e'), KeyModifiers::NONE) => export_current(session, runtime, view_data, internal_tx),
        _ => {}
    }
    false
}

fn handle_overlay_key<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Esc | KeyCode::Enter | KeyCode::Backspace | KeyCode::Char('q') | KeyCode::Char('b') => {
            dispatch(session, runtime, view_data, internal_tx, Interaction::CloseOverlay);
        }
        KeyCode::Char('j') | KeyCode::Down => {
            view_data.overlay_scroll = view_data.overlay_scroll.saturating_add(1);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            view_data.overlay_scroll = view_data.overlay_scroll.saturating_sub(1);
        }
        KeyCode::Char('g') => view_data.overlay_scroll = 0,
        _ => {}
    }
}

fn handle_search_key<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let command = match (key.code, key.modifiers) {
        (KeyCode::Esc, _) | (KeyCode::Enter, _) => {
            view_data.input = InputMode::Nav;
            return;
        }
        (KeyCode::Char('u'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            TableCommand::ClearSearch
        }
        (KeyCode::Backspace, _) => TableCommand::PopSearchChar,
        (KeyCode::Char(ch), modifiers) if !modifiers.contains(KeyModifiers::CONTROL) => {
            TableCommand::PushSearchChar(ch)
        }
        _ => return,
    };
    dispatch(session, runtime, view_data, internal_tx, Interaction::Table(command));
}

fn export_current<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let written = session
        .export()
        .and_then(|export| runtime.write_export(&export).map(|path| (export.rows, path)));
    match written {
        Ok((rows, path)) => {
            emit_status(view_data, internal_tx, format!("exported {rows} rows to {}", path.display()));
        }
        Err(error) => {
            warn!(error = %format!("{error:#}"), "export failed");
            emit_status(view_data, internal_tx, format!("export failed: {error:#}"));
        }
    }
}

/// Enter does the one thing that makes sense for the view: drill from a
/// root list, list queries from a drill-down, open details from a query list.
fn enter_interaction(session: &Session, view_data: &ViewData) -> Option<Interaction> {
    let row = view_data.selected_row;
    match session.current_view() {
        View::RootList(_) => {
            let column = session.columns().get(view_data.selected_col)?.key.clone();
            Some(Interaction::ActivateCell { row, column })
        }
        View::DrillDown { .. } => Some(Interaction::ViewQueries { row }),
        View::QueryList { .. } => Some(Interaction::ViewDetails { row }),
    }
}

fn contextual_enter_hint(session: &Session, view_data: &ViewData) -> &'static str {
    match session.current_view() {
        View::RootList(_) => {
            let columns = session.columns();
            let drillable = columns
                .get(view_data.selected_col)
                .zip(session.row(view_data.selected_row))
                .is_some_and(|(column, record)| column.triggers_on(record));
            if drillable { "drill" } else { "-" }
        }
        View::DrillDown { .. } => "queries",
        View::QueryList { .. } => "details",
    }
}

fn cursor_command_for_key(key: KeyEvent) -> Option<CursorCommand> {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => Some(CursorCommand::MoveRow(1)),
        KeyCode::Char('k') | KeyCode::Up => Some(CursorCommand::MoveRow(-1)),
        KeyCode::Char('h') | KeyCode::Left => Some(CursorCommand::MoveColumn(-1)),
        KeyCode::Char('l') | KeyCode::Right => Some(CursorCommand::MoveColumn(1)),
        KeyCode::Char('g') => Some(CursorCommand::JumpFirstRow),
        KeyCode::Char('G') => Some(CursorCommand::JumpLastRow),
        KeyCode::Char('^') => Some(CursorCommand::JumpFirstColumn),
        KeyCode::Char('$') => Some(CursorCommand::JumpLastColumn),
        _ => None,
    }
}

fn apply_cursor_command(session: &Session, view_data: &mut ViewData, command: CursorCommand) {
    let rows = session.table_view().map_or(0, |view| view.rows.len());
    let columns = session.columns().len();
    match command {
        CursorCommand::MoveRow(delta) => {
            view_data.selected_row = step(view_data.selected_row, delta, rows);
        }
        CursorCommand::MoveColumn(delta) => {
            view_data.selected_col = step(view_data.selected_col, delta, columns);
        }
        CursorCommand::JumpFirstRow => view_data.selected_row = 0,
        CursorCommand::JumpLastRow => view_data.selected_row = rows.saturating_sub(1),
        CursorCommand::JumpFirstColumn => view_data.selected_col = 0,
        CursorCommand::JumpLastColumn => view_data.selected_col = columns.saturating_sub(1),
    }
    scroll_columns_into_view(view_data);
}

/// Columns that fit a table `width` cells wide, borders included.
fn columns_that_fit(width: u16) -> usize {
    let inner = width.saturating_sub(2);
    usize::from(((inner + COLUMN_SPACING) / (MIN_COLUMN_WIDTH + COLUMN_SPACING)).max(1))
}

fn scroll_columns_into_view(view_data: &mut ViewData) {
    if view_data.visible_cols == 0 {
        view_data.col_offset = 0;
        return;
    }
    if view_data.selected_col < view_data.col_offset {
        view_data.col_offset = view_data.selected_col;
    } else if view_data.selected_col >= view_data.col_offset + view_data.visible_cols {
        view_data.col_offset = view_data.selected_col + 1 - view_data.visible_cols;
    }
}

fn visible_column_indices(column_count: usize, view_data: &ViewData) -> Range<usize> {
    if view_data.visible_cols == 0 {
        return 0..column_count;
    }
    let start = view_data.col_offset.min(column_count.saturating_sub(1));
    start..(start + view_data.visible_cols).min(column_count)
}

fn step(current: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    current.saturating_add_signed(delta).min(len - 1)
}

fn reset_cursor(view_data: &mut ViewData) {
    view_data.selected_row = 0;
    view_data.selected_col = 0;
    view_data.col_offset = 0;
}

fn clamp_cursor(session: &Session, view_data: &mut ViewData) {
    let rows = session.table_view().map_or(0, |view| view.rows.len());
    let columns = session.columns().len();
    view_data.selected_row = view_data.selected_row.min(rows.saturating_sub(1));
    view_data.selected_col = view_data.selected_col.min(columns.saturating_sub(1));
    scroll_columns_into_view(view_data);
}

fn render(frame: &mut ratatui::Frame<'_>, session: &Session, view_data: &ViewData) {
    let mut constraints = vec![Constraint::Length(3), Constraint::Min(1)];
    if session.notice().is_some() {
        constraints.push(Constraint::Length(3));
    }
    constraints.push(Constraint::Length(3));
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(frame.area());

    if session.stack().depth() == 1 {
        let current = session.current_view().root_kind();
        let selected = SourceKind::ALL
            .iter()
            .position(|kind| *kind == current)
            .unwrap_or(0);
        let titles = SourceKind::ALL
            .iter()
            .map(|kind| kind.label().to_owned())
            .collect::<Vec<String>>();
        let tabs = Tabs::new(titles)
            .block(Block::default().title("querylens").borders(Borders::ALL))
            .style(Style::default().fg(Color::White))
            .highlight_style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )
            .select(selected);
        frame.render_widget(tabs, layout[0]);
    } else {
        let breadcrumb = Paragraph::new(render_breadcrumb_text(session))
            .block(Block::default().title("querylens").borders(Borders::ALL));
        frame.render_widget(breadcrumb, layout[0]);
    }

    render_table(frame, layout[1], session, view_data);

    if let Some(text) = render_notice_text(session) {
        let notice = Paragraph::new(text)
            .style(Style::default().fg(Color::Red))
            .block(Block::default().borders(Borders::ALL).title("error"));
        frame.render_widget(notice, layout[2]);
    }

    let status_widget = Paragraph::new(status_text(session, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status_widget, layout[layout.len() - 1]);

    if session.overlay().is_open() {
        let area = centered_rect(80, 80, frame.area());
        frame.render_widget(Clear, area);
        let title = session
            .overlay()
            .query_id()
            .map_or_else(|| "query".to_owned(), |id| format!("query {id}"));
        let overlay = Paragraph::new(render_overlay_text(session))
            .wrap(Wrap { trim: false })
            .scroll((view_data.overlay_scroll, 0))
            .block(
                Block::default()
                    .title(title)
                    .borders(Borders::ALL)
                    .style(Style::default().fg(Color::White)),
            );
        frame.render_widget(overlay, area);
    }

    if view_data.help_visible {
        let area = centered_rect(60, 70, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

fn render_table(frame: &mut ratatui::Frame<'_>, area: Rect, session: &Session, view_data: &ViewData) {
    let title = table_title(session);
    let Some(table_view) = session.table_view() else {
        let empty = Paragraph::new(empty_table_text(session))
            .block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(empty, area);
        return;
    };
    if table_view.rows.is_empty() {
        let message = if table_view.is_empty_source() {
            "no data".to_owned()
        } else {
            format!("no rows match \"{}\"", session.table().query().search)
        };
        let empty = Paragraph::new(message)
            .block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(empty, area);
        return;
    }

    let all_columns = session.columns();
    let window = visible_column_indices(all_columns.len(), view_data);
    let first_index = window.start;
    let columns = &all_columns[window];
    let widths = vec![Constraint::Min(MIN_COLUMN_WIDTH); columns.len().max(1)];
    let header = Row::new(columns.iter().map(|column| {
        Cell::from(header_label(session, column)).style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
    }));

    let rows = table_view.rows.iter().enumerate().map(|(row_index, record)| {
        let selected_row = row_index == view_data.selected_row;
        let cells = columns
            .iter()
            .enumerate()
            .map(|(offset, column)| {
                let column_index = first_index + offset;
                let mut style = Style::default();
                if column.triggers_on(record) {
                    style = style.fg(Color::Cyan);
                }
                if selected_row {
                    style = style.bg(Color::DarkGray);
                }
                if selected_row && column_index == view_data.selected_col {
                    style = Style::default()
                        .fg(Color::Black)
                        .bg(Color::Cyan)
                        .add_modifier(Modifier::BOLD);
                }
                Cell::from(column.display(record)).style(style)
            })
            .collect::<Vec<_>>();
        Row::new(cells)
    });

    let title = match column_scroll_hint(all_columns.len(), first_index, columns.len()) {
        Some(hint) => format!("{title} | {hint}"),
        None => title,
    };
    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(COLUMN_SPACING)
        .block(Block::default().title(title).borders(Borders::ALL));
    frame.render_widget(table, area);
}

/// "cols 4-6 of 9" once some columns are off screen.
fn column_scroll_hint(total: usize, first: usize, shown: usize) -> Option<String> {
    if shown >= total {
        return None;
    }
    Some(format!("cols {}-{} of {total}", first + 1, first + shown))
}

fn header_label(session: &Session, column: &ColumnSpec) -> String {
    let mut label = column.label.clone();
    if column.clickable {
        label.push(' ');
        label.push_str(DRILL_ARROW);
    }
    if let Some(direction) = session.table().query().sort_direction(&column.key) {
        label.push(' ');
        label.push_str(direction.arrow());
    }
    label
}

fn table_title(session: &Session) -> String {
    let title = &session.stack().current().title;
    let mut parts = vec![title.clone()];
    if let Some(view) = session.table_view() {
        parts.push(view.counts.summary());
        parts.push(view.page_label());
    }
    if let Some(dataset) = session.current_dataset() {
        let loaded = dataset.loaded_at();
        parts.push(format!(
            "loaded {:02}:{:02}:{:02} UTC",
            loaded.hour(),
            loaded.minute(),
            loaded.second()
        ));
    }
    let search = &session.table().query().search;
    if !search.is_empty() {
        parts.push(format!("/{search}"));
    }
    if let Some(label) = session.busy_label() {
        parts.push(format!("{BUSY_MARK} {label}"));
    }
    parts.join(" | ")
}

fn empty_table_text(session: &Session) -> String {
    match session.busy_label() {
        Some(label) => format!("loading {label}..."),
        None if session.notice().is_some() => "not loaded".to_owned(),
        None => "no data".to_owned(),
    }
}

fn render_breadcrumb_text(session: &Session) -> String {
    session
        .stack()
        .entries()
        .iter()
        .map(|entry| entry.title.as_str())
        .collect::<Vec<_>>()
        .join(&format!(" {LINK_ARROW} "))
}

fn render_notice_text(session: &Session) -> Option<String> {
    let notice = session.notice()?;
    let mut text = format!("{} ({})", notice.message, notice.suggestion);
    match &notice.retry {
        Some(RetryAction::RootLoad(kind)) => {
            text.push_str(&format!(" | R reload {}", kind.label()));
        }
        Some(RetryAction::Restore(view)) => {
            text.push_str(&format!(" | R reload {}", view.title()));
        }
        None => {}
    }
    text.push_str(" | x dismiss");
    Some(text)
}

fn render_overlay_text(session: &Session) -> String {
    let overlay = session.overlay();
    if overlay.is_loading() {
        return "loading query details...".to_owned();
    }
    if let Some(error) = overlay.error() {
        return format!("{error}\n\n{}\n\nesc close", error.suggestion());
    }
    let Some(record) = overlay.record() else {
        return "no details".to_owned();
    };
    let width = record.keys().map(str::len).max().unwrap_or(0);
    record
        .fields()
        .map(|(key, value)| format!("{key:<width$}  {}", value_text(value)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn status_text(session: &Session, view_data: &ViewData) -> String {
    if view_data.input == InputMode::Search {
        return format!(
            "SEARCH /{} | enter/esc done | ctrl+u clear",
            session.table().query().search
        );
    }
    if session.overlay().is_open() {
        return "j/k scroll | esc close".to_owned();
    }
    let enter_hint = contextual_enter_hint(session, view_data);
    let default =
        format!("j/k/h/l | enter {enter_hint} | v d | / c s 0 | n/p pg | b H tab | r R x | e ? | q");
    match &view_data.status_line {
        Some(status) => format!("{status} | {default}"),
        None => default,
    }
}

fn help_overlay_text() -> String {
    [
        ("j/k h/l", "move row / column"),
        ("g/G ^/$", "first/last row / column"),
        ("enter", "drill, list queries or open details"),
        ("v", "list the row's queries"),
        ("d", "open query details"),
        ("/", "search (enter/esc to finish)"),
        ("c", "clear search"),
        ("0", "reset search, sort and page"),
        ("s", "cycle sort on column"),
        ("n/p", "next/previous page"),
        ("b esc", "back"),
        ("H", "home"),
        ("tab 1 2", "switch root list"),
        ("r", "refresh"),
        ("R", "retry failed load"),
        ("x", "dismiss error"),
        ("e", "export to CSV"),
        ("q", "quit"),
    ]
    .iter()
    .map(|(keys, action)| format!("{keys:<10} {action}"))
    .collect::<Vec<_>>()
    .join("\n")
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
