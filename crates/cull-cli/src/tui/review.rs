//! Review screen: group picker, worklist with detail pane, and the bulk and
//! permissions modals.
//!
//! Single decisions are written on a spawned task so navigation stays live
//! while the write is outstanding; results come back over a channel and are
//! applied by item id.

use crossterm::event::KeyEvent;
use cull_core::TriageError;
use cull_core::config::{MetricsConfig, Operator};
use cull_core::error::Result;
use cull_core::links::LinkGraph;
use cull_core::location::SessionLocation;
use cull_core::metrics::MetricsTable;
use cull_core::model::{Disposition, DispositionAck, ItemId, Outcome};
use cull_triage::{
    BulkReport, Command, DecisionApplied, DisplayState, Effect, PendingDecision, Prompt,
    ReviewSignals, TriageSession, signals_for,
};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::border,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

use super::keymap::{self, Action, KeyContext, TextEdit};

const STATUS_TTL: Duration = Duration::from_secs(3);

type Finished = (PendingDecision, Result<DispositionAck>);

pub struct ReviewView {
    session: TriageSession,
    links: LinkGraph,
    metrics: MetricsTable,
    metrics_config: MetricsConfig,
    operator: Operator,
    highlight: usize,
    goto: Option<String>,
    status_msg: Option<(String, Instant)>,
    should_quit: bool,
    outstanding: usize,
    finished_tx: mpsc::UnboundedSender<Finished>,
    finished_rx: mpsc::UnboundedReceiver<Finished>,
}

impl ReviewView {
    pub fn new(
        session: TriageSession,
        links: LinkGraph,
        metrics: MetricsTable,
        metrics_config: MetricsConfig,
        operator: Operator,
    ) -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let highlight = session
            .active_group_id()
            .and_then(|active| session.groups().iter().position(|g| &g.id == active))
            .unwrap_or(0);
        Self {
            session,
            links,
            metrics,
            metrics_config,
            operator,
            highlight,
            goto: None,
            status_msg: None,
            should_quit: false,
            outstanding: 0,
            finished_tx,
            finished_rx,
        }
    }

    pub const fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn location(&self) -> SessionLocation {
        self.session.location()
    }

    pub fn set_status(&mut self, msg: impl Into<String>) {
        self.status_msg = Some((msg.into(), Instant::now()));
    }

    fn key_context(&self) -> KeyContext {
        KeyContext {
            prompt: self.session.prompt(),
            display: self.session.display(),
            text_input: self.goto.is_some(),
        }
    }

    pub async fn handle_key(&mut self, key: KeyEvent) {
        match keymap::dispatch(key, self.key_context()) {
            Action::Session(Command::Decide(outcome)) => self.start_decision(outcome),
            Action::Session(command) => self.run_command(command).await,
            Action::MoveHighlight(delta) => self.move_highlight(delta),
            Action::ChooseHighlighted => {
                if let Some(group) = self.session.groups().get(self.highlight).map(|g| g.id.clone()) {
                    self.run_command(Command::SelectGroup(group)).await;
                }
            }
            Action::OpenGoto => self.goto = Some(String::new()),
            Action::Text(edit) => self.edit_goto(edit).await,
            Action::Ignore => {}
        }
    }

    fn move_highlight(&mut self, delta: isize) {
        let count = self.session.groups().len();
        if count == 0 {
            return;
        }
        self.highlight = if delta < 0 {
            self.highlight.saturating_sub(delta.unsigned_abs())
        } else {
            self.highlight.saturating_add(delta.unsigned_abs()).min(count - 1)
        };
    }

    async fn run_command(&mut self, command: Command) {
        match self.session.apply_command(command).await {
            Ok(effect) => self.show_effect(effect),
            Err(TriageError::EmptySelection) => self.set_status("Select items with x first"),
            Err(err) => self.set_status(err.to_string()),
        }
        if let Some(active) = self.session.active_group_id() {
            if let Some(idx) = self.session.groups().iter().position(|g| &g.id == active) {
                self.highlight = idx;
            }
        }
    }

    fn show_effect(&mut self, effect: Effect) {
        match effect {
            Effect::Nothing => {}
            Effect::Decided(applied) => self.show_decision(applied),
            Effect::Bulk(report) => self.show_bulk(report),
            Effect::Selected { selected } => {
                self.set_status(if selected { "Selected" } else { "Unselected" });
            }
            Effect::Quit => self.should_quit = true,
        }
    }

    fn show_decision(&mut self, applied: DecisionApplied) {
        let msg = match applied.outcome {
            Outcome::Keep => format!("Kept #{}", applied.item),
            Outcome::Remove => format!("Removed #{} (now draft)", applied.item),
        };
        self.set_status(msg);
    }

    fn show_bulk(&mut self, report: BulkReport) {
        let mut msg = format!("Applied to {} of {}", report.succeeded, report.requested);
        if report.failed > 0 {
            msg.push_str(&format!(", {} failed", report.failed));
        }
        self.set_status(msg);
    }

    fn start_decision(&mut self, outcome: Outcome) {
        let Some(item) = self.session.focused().map(|item| item.id) else {
            return;
        };
        let pending = match self.session.begin_decision(item, outcome) {
            Ok(pending) => pending,
            Err(err) => {
                self.set_status(err.to_string());
                return;
            }
        };
        debug!(item = %item, outcome = %outcome, "decision started");
        self.outstanding += 1;
        let directory = self.session.directory();
        let tx = self.finished_tx.clone();
        tokio::spawn(async move {
            let result = pending.persist(directory.as_ref()).await;
            if tx.send((pending, result)).is_err() {
                debug!("review screen closed before a decision finished");
            }
        });
    }

    async fn finish(&mut self, pending: PendingDecision, result: Result<DispositionAck>) {
        self.outstanding = self.outstanding.saturating_sub(1);
        match self.session.finish_decision(pending, result).await {
            Ok(applied) => self.show_decision(applied),
            Err(err) => self.set_status(err.to_string()),
        }
    }

    /// Apply every decision that has finished since the last call. Returns
    /// whether anything was applied.
    pub async fn drain_finished(&mut self) -> bool {
        let mut applied = false;
        while let Ok((pending, result)) = self.finished_rx.try_recv() {
            self.finish(pending, result).await;
            applied = true;
        }
        applied
    }

    /// Wait for every outstanding decision.
    pub async fn settle(&mut self) {
        while self.outstanding > 0 {
            let Some((pending, result)) = self.finished_rx.recv().await else {
                break;
            };
            self.finish(pending, result).await;
        }
    }

    async fn edit_goto(&mut self, edit: TextEdit) {
        let Some(buf) = self.goto.as_mut() else {
            return;
        };
        match edit {
            TextEdit::Insert(c) => buf.push(c),
            TextEdit::Backspace => {
                buf.pop();
            }
            TextEdit::Cancel => self.goto = None,
            TextEdit::Submit => {
                let raw = std::mem::take(buf);
                self.goto = None;
                self.jump_to(raw.trim()).await;
            }
        }
    }

    async fn jump_to(&mut self, raw: &str) {
        let Ok(item) = raw.parse::<ItemId>() else {
            self.set_status(format!("'{raw}' is not an item id"));
            return;
        };
        if self.session.worklist().iter().any(|candidate| candidate.id == item) {
            self.session.focus_item(item).await;
        } else {
            self.set_status(format!("#{item} is not in this group"));
        }
    }

    fn signals(&self) -> Option<ReviewSignals> {
        signals_for(&self.session, &self.links, &self.metrics, &self.metrics_config)
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    pub fn render(&self, frame: &mut Frame<'_>) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(1)])
            .split(frame.area());

        match self.session.display() {
            DisplayState::GroupSelection => self.render_groups(frame, chunks[0]),
            DisplayState::Reviewing | DisplayState::GroupComplete => {
                let panes = Layout::default()
                    .direction(Direction::Horizontal)
                    .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
                    .split(chunks[0]);
                self.render_worklist(frame, panes[0]);
                self.render_detail(frame, panes[1]);
            }
            DisplayState::Done => self.render_done(frame, chunks[0]),
        }
        frame.render_widget(Paragraph::new(self.status_line()), chunks[1]);

        match self.session.prompt() {
            Prompt::Bulk => self.render_bulk_modal(frame, chunks[0]),
            Prompt::Permissions => self.render_permissions_modal(frame, chunks[0]),
            Prompt::Closed => {}
        }
    }

    fn render_groups(&self, frame: &mut Frame<'_>, area: Rect) {
        let items: Vec<ListItem> = self
            .session
            .groups()
            .iter()
            .map(|group| {
                let done_style = if group.remaining() == 0 {
                    Style::default().fg(Color::DarkGray)
                } else {
                    Style::default()
                };
                ListItem::new(Line::from(vec![
                    Span::styled(format!("{:<24} ", group.label), done_style),
                    Span::styled(
                        format!("{:>5}/{:<5}", group.triaged_count, group.total_count),
                        Style::default().fg(Color::Cyan),
                    ),
                    Span::styled(
                        format!(" {} left", group.remaining()),
                        Style::default().fg(Color::Yellow),
                    ),
                ]))
            })
            .collect();

        let title = format!(
            " cull: choose a group ({} items left) ",
            self.session.remaining_overall()
        );
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(
                Style::default()
                    .add_modifier(Modifier::BOLD)
                    .fg(Color::White)
                    .bg(Color::DarkGray),
            )
            .highlight_symbol("► ");
        let mut state = ListState::default().with_selected(Some(self.highlight));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn render_worklist(&self, frame: &mut Frame<'_>, area: Rect) {
        let selection = self.session.selection();
        let items: Vec<ListItem> = self
            .session
            .worklist()
            .iter()
            .map(|item| {
                let check = if selection.contains(&item.id) { "[x] " } else { "[ ] " };
                let (marker, color) = if self.session.is_in_flight(item.id) {
                    ("…", Color::Yellow)
                } else {
                    match item.disposition {
                        Disposition::Keep => ("✓", Color::Green),
                        Disposition::Remove => ("✗", Color::Red),
                        Disposition::Undecided => ("·", Color::DarkGray),
                    }
                };
                ListItem::new(Line::from(vec![
                    Span::raw(check),
                    Span::styled(format!("{marker} "), Style::default().fg(color)),
                    Span::raw(item.title.clone()),
                ]))
            })
            .collect();

        let title = self.session.active_group().map_or_else(
            || " Items ".to_string(),
            |group| {
                let complete = if self.session.display() == DisplayState::GroupComplete {
                    " complete"
                } else {
                    ""
                };
                format!(
                    " {} {}/{}{complete} ",
                    group.label, group.triaged_count, group.total_count
                )
            },
        );
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(
                Style::default()
                    .add_modifier(Modifier::BOLD)
                    .fg(Color::White)
                    .bg(Color::DarkGray),
            )
            .highlight_symbol("► ");
        let mut state = ListState::default().with_selected(self.session.cursor());
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn detail_lines(&self) -> Vec<Line<'static>> {
        let label = Style::default().fg(Color::Cyan);
        let Some(item) = self.session.focused() else {
            return vec![Line::from("No item focused")];
        };

        let mut lines = vec![
            Line::from(Span::styled(
                item.title.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(vec![
                Span::styled("ID: ", label),
                Span::raw(item.id.to_string()),
                Span::raw("   "),
                Span::styled("Status: ", label),
                Span::raw(item.publication_status.to_string()),
                Span::raw("   "),
                Span::styled("Decision: ", label),
                Span::raw(item.disposition.to_string()),
            ]),
        ];

        if let Some(detail) = self.session.detail().filter(|d| d.id == item.id) {
            let joined = |set: &std::collections::BTreeSet<String>| {
                if set.is_empty() {
                    "-".to_string()
                } else {
                    set.iter().cloned().collect::<Vec<_>>().join(", ")
                }
            };
            lines.push(Line::from(vec![
                Span::styled("Categories: ", label),
                Span::raw(joined(&detail.categories)),
            ]));
            lines.push(Line::from(vec![
                Span::styled("Tags: ", label),
                Span::raw(joined(&detail.tags)),
            ]));
            lines.push(Line::from(vec![
                Span::styled("URL: ", label),
                Span::raw(detail.canonical_url.clone()),
            ]));
            if !detail.edit_url.is_empty() {
                lines.push(Line::from(vec![
                    Span::styled("Edit: ", label),
                    Span::raw(detail.edit_url.clone()),
                ]));
            }
        }

        if let Some(signals) = self.signals() {
            lines.push(Line::from(""));
            let mut badges = Vec::new();
            if signals.high_traffic {
                badges.push(Span::styled(" high traffic ", Style::default().fg(Color::Black).bg(Color::Yellow)));
                badges.push(Span::raw(" "));
            }
            if signals.top_level {
                badges.push(Span::styled(" top level ", Style::default().fg(Color::Black).bg(Color::Blue)));
                badges.push(Span::raw(" "));
            }
            if signals.kept {
                badges.push(Span::styled(" kept ", Style::default().fg(Color::Black).bg(Color::Green)));
            }
            if !badges.is_empty() {
                lines.push(Line::from(badges));
            }
            lines.push(Line::from(vec![
                Span::styled("Links: ", label),
                Span::raw(format!("{} in, {} out", signals.inbound, signals.outbound)),
            ]));
            if let Some(row) = &signals.metrics {
                lines.push(Line::from(Span::styled("Traffic:", Style::default().fg(Color::Green))));
                for (column, value) in row {
                    lines.push(Line::from(format!("  {column}: {value}")));
                }
            }
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                format!(
                    "{} left in group, {} overall",
                    signals.remaining_in_group, signals.remaining_overall
                ),
                Style::default().fg(Color::DarkGray),
            )));
        }
        lines
    }

    fn render_detail(&self, frame: &mut Frame<'_>, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title(" Details ");
        let p = Paragraph::new(self.detail_lines())
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(p, area);
    }

    fn render_done(&self, frame: &mut Frame<'_>, area: Rect) {
        let text = vec![
            Line::from(Span::styled(
                "All groups reviewed",
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(format!("{} items still undecided", self.session.remaining_overall())),
        ];
        let p = Paragraph::new(text)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title(" cull "));
        frame.render_widget(p, area);
    }

    fn modal_area(area: Rect, width: u16, height: u16) -> Rect {
        let width = width.min(area.width.saturating_sub(4));
        let height = height.min(area.height.saturating_sub(2));
        let x = area.x + area.width.saturating_sub(width) / 2;
        let y = area.y + area.height.saturating_sub(height) / 2;
        Rect::new(x, y, width, height)
    }

    fn modal_block(title: &'static str) -> Block<'static> {
        Block::default()
            .borders(Borders::ALL)
            .border_set(border::ROUNDED)
            .border_style(Style::default().fg(Color::Green))
            .title(title)
            .title_style(Style::default().fg(Color::White).add_modifier(Modifier::BOLD))
    }

    fn render_bulk_modal(&self, frame: &mut Frame<'_>, area: Rect) {
        let modal = Self::modal_area(area, 48, 6);
        frame.render_widget(Clear, modal);
        let key = Style::default().fg(Color::Cyan);
        let dim = Style::default().fg(Color::DarkGray);
        let text = vec![
            Line::from(format!("Apply to {} selected items", self.session.selection().len())),
            Line::from(""),
            Line::from(vec![
                Span::styled("k", key),
                Span::styled(" keep  ", dim),
                Span::styled("r", key),
                Span::styled(" remove  ", dim),
                Span::styled("Esc", key),
                Span::styled(" cancel", dim),
            ]),
        ];
        frame.render_widget(Paragraph::new(text).block(Self::modal_block(" Bulk action ")), modal);
    }

    fn render_permissions_modal(&self, frame: &mut Frame<'_>, area: Rect) {
        let modal = Self::modal_area(area, 56, 8);
        frame.render_widget(Clear, modal);
        let label = Style::default().fg(Color::Cyan);
        let admin = if self.operator.role.can_administer() { "yes" } else { "no" };
        let text = vec![
            Line::from(vec![Span::styled("Operator: ", label), Span::raw(self.operator.name.clone())]),
            Line::from(vec![Span::styled("Role: ", label), Span::raw(self.operator.role.to_string())]),
            Line::from(vec![
                Span::styled("Import metrics and clear data: ", label),
                Span::raw(admin),
            ]),
            Line::from(""),
            Line::from(Span::styled("Esc close", Style::default().fg(Color::DarkGray))),
        ];
        frame.render_widget(
            Paragraph::new(text).block(Self::modal_block(" Permissions ")),
            modal,
        );
    }

    fn status_line(&self) -> Line<'static> {
        if let Some(buf) = &self.goto {
            return Line::from(vec![
                Span::styled("go to item: ", Style::default().fg(Color::Cyan)),
                Span::raw(format!("{buf}█")),
            ]);
        }
        if let Some((msg, at)) = &self.status_msg {
            if at.elapsed() < STATUS_TTL {
                return Line::from(Span::styled(msg.clone(), Style::default().fg(Color::Cyan)));
            }
        }
        let hints: &[(&str, &str)] = match self.session.display() {
            DisplayState::GroupSelection => &[("↑/↓", "move"), ("Enter", "open"), ("→", "first group"), ("q", "quit")],
            DisplayState::Done => &[("←", "groups"), ("q", "quit")],
            DisplayState::Reviewing | DisplayState::GroupComplete => &[
                ("Space", "keep"),
                ("Esc/Del", "remove"),
                ("↑/↓", "move"),
                ("←/→", "groups/next"),
                ("x", "select"),
                ("b", "bulk"),
                ("g", "go to"),
                ("q", "quit"),
            ],
        };
        let mut spans = Vec::with_capacity(hints.len() * 2);
        for (key, label) in hints {
            spans.push(Span::styled((*key).to_string(), Style::default().fg(Color::Cyan)));
            spans.push(Span::styled(format!(" {label}  "), Style::default().fg(Color::DarkGray)));
        }
        Line::from(spans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyModifiers};
    use cull_core::backend::DurableDispositions;
    use cull_core::config::Role;
    use cull_core::db;
    use cull_core::store::ContentSnapshot;
    use cull_core::{ContentDirectory, SqliteDirectory};
    use ratatui::{Terminal, backend::TestBackend};
    use std::sync::Arc;

    const SNAPSHOT: &str = r#"{"groups": [
        {"id": "page", "label": "Pages", "items": [
            {"id": 1, "title": "About", "canonical_url": "https://example.com/about/"},
            {"id": 2, "title": "Contact", "canonical_url": "https://example.com/contact/"}
        ]}
    ]}"#;

    async fn view() -> ReviewView {
        let directory = SqliteDirectory::from_connection(
            db::open_in_memory().expect("store"),
            Box::new(DurableDispositions),
            Operator::new("alice", Role::Editor),
        );
        directory
            .ingest(&ContentSnapshot::from_json(SNAPSHOT).expect("snapshot"))
            .expect("ingest");
        let directory: Arc<dyn ContentDirectory> = Arc::new(directory);
        let session = TriageSession::open(directory).await.expect("session");
        ReviewView::new(
            session,
            LinkGraph::default(),
            MetricsTable::default(),
            MetricsConfig::default(),
            Operator::new("alice", Role::Editor),
        )
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn screen(view: &ReviewView) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 24)).expect("terminal");
        terminal.draw(|frame| view.render(frame)).expect("draw");
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(ratatui::buffer::Cell::symbol)
            .collect()
    }

    #[tokio::test]
    async fn enter_opens_highlighted_group() {
        let mut view = view().await;
        assert!(screen(&view).contains("choose a group"));

        view.handle_key(press(KeyCode::Enter)).await;
        assert_eq!(view.session.display(), DisplayState::Reviewing);
        assert_eq!(view.location().to_query(), "type=page&post=1");
        assert!(screen(&view).contains("Pages 0/2"));
    }

    #[tokio::test]
    async fn space_keeps_in_background_and_advances() {
        let mut view = view().await;
        view.handle_key(press(KeyCode::Enter)).await;

        view.handle_key(press(KeyCode::Char(' '))).await;
        assert!(view.session.is_in_flight(ItemId(1)));
        view.settle().await;

        assert!(!view.session.is_in_flight(ItemId(1)));
        assert_eq!(view.session.worklist()[0].disposition, Disposition::Keep);
        assert_eq!(view.session.focused().map(|item| item.id), Some(ItemId(2)));
        assert_eq!(view.session.active_group().map(|g| g.triaged_count), Some(1));
    }

    #[tokio::test]
    async fn escape_closes_bulk_prompt_without_deciding() {
        let mut view = view().await;
        view.handle_key(press(KeyCode::Enter)).await;
        view.handle_key(press(KeyCode::Char('x'))).await;
        view.handle_key(press(KeyCode::Char('b'))).await;
        assert_eq!(view.session.prompt(), Prompt::Bulk);
        assert!(screen(&view).contains("Apply to 1 selected items"));

        view.handle_key(press(KeyCode::Esc)).await;
        assert_eq!(view.session.prompt(), Prompt::Closed);
        assert_eq!(view.outstanding, 0);
        assert_eq!(view.session.worklist()[0].disposition, Disposition::Undecided);
    }

    #[tokio::test]
    async fn bulk_without_selection_shows_hint() {
        let mut view = view().await;
        view.handle_key(press(KeyCode::Enter)).await;
        view.handle_key(press(KeyCode::Char('b'))).await;
        assert_eq!(view.session.prompt(), Prompt::Closed);
        assert!(screen(&view).contains("Select items with x first"));
    }

    #[tokio::test]
    async fn goto_focuses_typed_item() {
        let mut view = view().await;
        view.handle_key(press(KeyCode::Enter)).await;
        view.handle_key(press(KeyCode::Char('g'))).await;
        view.handle_key(press(KeyCode::Char('2'))).await;
        // Space is text here, not a keep.
        view.handle_key(press(KeyCode::Char(' '))).await;
        view.handle_key(press(KeyCode::Enter)).await;

        assert_eq!(view.outstanding, 0);
        assert_eq!(view.session.focused().map(|item| item.id), Some(ItemId(2)));
    }

    #[tokio::test]
    async fn permissions_modal_shows_role() {
        let mut view = view().await;
        view.handle_key(press(KeyCode::Char('p'))).await;
        let text = screen(&view);
        assert!(text.contains("Operator: alice"));
        assert!(text.contains("Role: editor"));
    }
}
