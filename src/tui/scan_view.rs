//! Live view of a bulk scan with progress, pause/resume and stop

use crate::checker::{ScanController, ScanRunner, ScanSession, ScanState};
use crate::proxy::models::ProxyResult;
use crate::results::{ResultStats, SLOW_LATENCY_MS};
use crate::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use tokio::sync::watch;
use tokio::time::Duration;

/// Maximum number of rows shown per list
const MAX_VISIBLE_RESULTS: usize = 100;

/// What the view knows about the running scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanSnapshot {
    pub state: ScanState,
    pub progress: u8,
    pub total: usize,
    pub results: Vec<ProxyResult>,
}

impl ScanSnapshot {
    pub fn from_session(session: &ScanSession) -> Self {
        Self {
            state: session.state().clone(),
            progress: session.progress(),
            total: session.total_proxies(),
            results: session.results().to_vec(),
        }
    }
}

/// Which result list has focus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Alive,
    Dead,
}

/// Scan TUI application state
pub struct ScanApp {
    proxies: Vec<String>,
    runner: ScanRunner,
    controller: Option<ScanController>,
    snapshot: ScanSnapshot,
    latency_threshold: u64,
    focus: Focus,
    list_state: ListState,
    should_quit: bool,
}

impl ScanApp {
    pub fn new(proxies: Vec<String>, runner: ScanRunner) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            proxies,
            runner,
            controller: None,
            snapshot: ScanSnapshot::default(),
            latency_threshold: SLOW_LATENCY_MS,
            focus: Focus::Alive,
            list_state,
            should_quit: false,
        }
    }

    /// Latencies above `ms` are highlighted
    pub fn with_latency_threshold(mut self, ms: u64) -> Self {
        self.latency_threshold = ms;
        self
    }

    /// Run the scan inside the TUI and return the final session
    pub async fn run(&mut self) -> Result<ScanSession> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal).await;

        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result
    }

    async fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<ScanSession> {
        let (controller, controls) = ScanController::new();
        self.controller = Some(controller);

        let (tx, mut rx) = watch::channel(ScanSnapshot::default());
        let runner = self.runner.clone();
        let proxies = std::mem::take(&mut self.proxies);

        let mut scan = tokio::spawn(async move {
            let mut last_sent: Option<(ScanState, usize)> = None;
            runner
                .run(proxies, controls, move |session| {
                    let marker = (session.state().clone(), session.results().len());
                    if last_sent.as_ref() != Some(&marker) {
                        let _ = tx.send(ScanSnapshot::from_session(session));
                        last_sent = Some(marker);
                    }
                })
                .await
        });
        let mut finished: Option<ScanSession> = None;

        loop {
            if rx.has_changed().unwrap_or(false) {
                self.snapshot = rx.borrow_and_update().clone();
            }

            terminal.draw(|f| self.ui(f))?;

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_input(key.code);
                    }
                }
            }

            if finished.is_none() && scan.is_finished() {
                let session = (&mut scan).await?;
                self.snapshot = ScanSnapshot::from_session(&session);
                finished = Some(session);
            }

            if self.should_quit {
                break;
            }
        }

        match finished {
            Some(session) => Ok(session),
            None => Ok(scan.await?),
        }
    }

    fn handle_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => {
                if let Some(controller) = &self.controller {
                    controller.stop();
                }
                self.should_quit = true;
            }
            KeyCode::Char('p') | KeyCode::Char(' ') => {
                if let Some(controller) = &self.controller {
                    match self.snapshot.state {
                        ScanState::Scanning => controller.pause(),
                        ScanState::Paused => controller.resume(),
                        _ => {}
                    }
                }
            }
            KeyCode::Char('s') => {
                if let Some(controller) = &self.controller {
                    controller.stop();
                }
            }
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::Alive => Focus::Dead,
                    Focus::Dead => Focus::Alive,
                };
                self.list_state.select(Some(0));
            }
            KeyCode::Down => {
                let len = self.focused_len();
                let i = match self.list_state.selected() {
                    Some(i) if i + 1 < len => i + 1,
                    _ => 0,
                };
                self.list_state.select(Some(i));
            }
            KeyCode::Up => {
                let len = self.focused_len();
                let i = match self.list_state.selected() {
                    Some(0) | None => len.saturating_sub(1),
                    Some(i) => i - 1,
                };
                self.list_state.select(Some(i));
            }
            _ => {}
        }
    }

    fn focused_len(&self) -> usize {
        let alive = self.focus == Focus::Alive;
        self.snapshot
            .results
            .iter()
            .filter(|r| r.is_alive() == alive)
            .take(MAX_VISIBLE_RESULTS)
            .count()
    }

    fn status_line(&self, stats: &ResultStats) -> (String, Color) {
        let counts = format!(
            "Alive: {} | Dead: {} | Slow: {} | Avg: {}ms",
            stats.alive, stats.dead, stats.slow, stats.avg_latency
        );
        match &self.snapshot.state {
            ScanState::Idle if self.controller.is_some() && stats.total > 0 => (
                format!("Stopped. {} | Press 'q' to quit", counts),
                Color::Yellow,
            ),
            ScanState::Idle => ("Connecting... Press 'q' to quit".to_string(), Color::Yellow),
            ScanState::Scanning => (
                format!("Scanning... {} | p: pause, s: stop, q: quit", counts),
                Color::Yellow,
            ),
            ScanState::Paused => (
                format!("Paused. {} | p: resume, s: stop, q: quit", counts),
                Color::Cyan,
            ),
            ScanState::Completed => (
                format!("Complete! {} | Press 'q' to quit", counts),
                Color::Green,
            ),
            ScanState::Errored(message) => (format!("Error: {}", message), Color::Red),
        }
    }

    fn ui(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(3),
            ])
            .split(f.size());

        let title = Paragraph::new("Proxy Scan")
            .style(Style::default().fg(Color::Cyan))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(title, chunks[0]);

        let stats = ResultStats::from_results(&self.snapshot.results);
        let progress_label = format!(
            "{}/{} ({}%)",
            stats.total, self.snapshot.total, self.snapshot.progress
        );
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Progress"))
            .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
            .percent(u16::from(self.snapshot.progress.min(100)))
            .label(progress_label);
        f.render_widget(gauge, chunks[1]);

        let list_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[2]);

        let alive: Vec<&ProxyResult> = self
            .snapshot
            .results
            .iter()
            .rev()
            .filter(|r| r.is_alive())
            .take(MAX_VISIBLE_RESULTS)
            .collect();
        let dead: Vec<&ProxyResult> = self
            .snapshot
            .results
            .iter()
            .rev()
            .filter(|r| !r.is_alive())
            .take(MAX_VISIBLE_RESULTS)
            .collect();

        render_result_list(
            f,
            list_chunks[0],
            &format!("Alive ({})", stats.alive),
            &alive,
            self.latency_threshold,
            self.focus == Focus::Alive,
            Color::Green,
            &mut self.list_state,
        );
        render_result_list(
            f,
            list_chunks[1],
            &format!("Dead ({})", stats.dead),
            &dead,
            self.latency_threshold,
            self.focus == Focus::Dead,
            Color::Red,
            &mut self.list_state,
        );

        let (message, color) = self.status_line(&stats);
        let status = Paragraph::new(message)
            .style(Style::default().fg(color))
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(status, chunks[3]);
    }
}

#[allow(clippy::too_many_arguments)]
fn render_result_list(
    f: &mut Frame,
    area: Rect,
    title: &str,
    results: &[&ProxyResult],
    latency_threshold: u64,
    focused: bool,
    color: Color,
    list_state: &mut ListState,
) {
    let items: Vec<ListItem> = results
        .iter()
        .map(|r| {
            let (content, fg) = if r.is_alive() {
                let fg = if r.latency > latency_threshold {
                    Color::Yellow
                } else {
                    color
                };
                let country = r.country.as_deref().unwrap_or("--");
                (
                    format!("{} {} ({}ms) {}", r.protocol, r.address(), r.latency, country),
                    fg,
                )
            } else {
                let reason = r.error.as_deref().unwrap_or("unreachable");
                (format!("{} {}", r.address(), reason), color)
            };
            ListItem::new(content).style(Style::default().fg(fg))
        })
        .collect();

    let border_style = if focused {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title.to_string())
                .border_style(border_style),
        )
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol(">> ");

    if focused {
        f.render_stateful_widget(list, area, list_state);
    } else {
        f.render_widget(list, area);
    }
}
