use std::io::{self, Stdout};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame, Terminal,
};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::UiConfig;
use crate::error::ChatError;
use crate::llm::CompletionClient;
use crate::session::{ChatSession, NoticeLevel, Startup};
use crate::streaming::{accumulate, StreamState};
use crate::ui::commands::{get_help_text, ParsedCommand, SlashCommand};
use crate::ui::composer::{Composer, ComposerResult};
use crate::ui::history::ConversationView;
use crate::ui::settings::{SettingsPanel, SettingsView};

pub type Tui = Terminal<CrosstermBackend<Stdout>>;

const SIDEBAR_WIDTH: u16 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Composer,
    Settings,
}

/// Actions requested by key handling that the event loop has to carry out.
#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    None,
    Submit(String),
    Exit,
}

/// Interactive chat screen bound to one session.
pub struct ChatApp {
    session: ChatSession,
    composer: Composer,
    settings: SettingsPanel,
    focus: Focus,
    show_timestamps: bool,
    show_help: bool,
}

impl ChatApp {
    pub fn new(session: ChatSession, ui: &UiConfig) -> Self {
        Self {
            session,
            composer: Composer::new("Type your message... (/help for commands)"),
            settings: SettingsPanel::default(),
            focus: Focus::Composer,
            show_timestamps: ui.show_timestamps,
            show_help: false,
        }
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    /// Main loop: draw, wait for a key, act on it.
    pub async fn run<B, C>(&mut self, terminal: &mut Terminal<B>, client: &C) -> Result<()>
    where
        B: Backend,
        C: CompletionClient + ?Sized,
    {
        loop {
            terminal
                .draw(|frame| self.draw(frame, None))
                .context("Failed to draw frame")?;

            if !event::poll(Duration::from_millis(250)).context("Failed to poll terminal events")? {
                continue;
            }

            let action = match event::read().context("Failed to read terminal event")? {
                Event::Key(key) => self.handle_key(key),
                Event::Paste(text) => {
                    if self.focus == Focus::Composer {
                        self.composer.insert_str(&text);
                    }
                    AppAction::None
                }
                _ => AppAction::None,
            };

            match action {
                AppAction::None => {}
                AppAction::Submit(text) => self.submit(terminal, client, text).await?,
                AppAction::Exit => return Ok(()),
            }
        }
    }

    /// Route a key to the focused component.
    pub fn handle_key(&mut self, key: KeyEvent) -> AppAction {
        if key.kind != KeyEventKind::Press {
            return AppAction::None;
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return AppAction::Exit;
        }
        if self.show_help {
            self.show_help = false;
            return AppAction::None;
        }
        if key.code == KeyCode::Tab {
            self.toggle_focus();
            return AppAction::None;
        }

        match self.focus {
            Focus::Settings => {
                if key.code == KeyCode::Esc {
                    self.toggle_focus();
                } else {
                    self.settings.handle_key(key, &mut self.session);
                }
                AppAction::None
            }
            Focus::Composer => match self.composer.handle_key(key) {
                ComposerResult::Submitted(text) => AppAction::Submit(text),
                ComposerResult::Command(command) => self.handle_slash_command(command),
                ComposerResult::None => AppAction::None,
            },
        }
    }

    fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Composer => Focus::Settings,
            Focus::Settings => Focus::Composer,
        };
        self.composer.set_focus(self.focus == Focus::Composer);
        self.settings.set_focus(self.focus == Focus::Settings);
    }

    /// Handle slash commands
    pub fn handle_slash_command(&mut self, command: ParsedCommand) -> AppAction {
        debug!(command = command.command.command(), "slash command");
        match command.command {
            SlashCommand::Model => match command.model_target() {
                Some(Ok(model)) => {
                    self.session.config_mut().set_model(model);
                    self.session.notify(NoticeLevel::Info, format!("Model: {model}"));
                }
                Some(Err(err)) => self.session.notify(NoticeLevel::Error, err.to_string()),
                None => {
                    let current = self.session.config().model();
                    self.session.notify(NoticeLevel::Info, format!("Current model: {current}"));
                }
            },
            SlashCommand::Temp => match command.temperature_target() {
                Some(Ok(value)) => match self.session.config_mut().set_temperature(value) {
                    Ok(applied) => self
                        .session
                        .notify(NoticeLevel::Info, format!("Temperature: {applied:.1}")),
                    Err(err) => self.session.notify(NoticeLevel::Error, err.to_string()),
                },
                Some(Err(err)) => self.session.notify(NoticeLevel::Error, err.to_string()),
                None => {
                    let current = self.session.config().temperature();
                    self.session.notify(NoticeLevel::Info, format!("Temperature: {current:.1}"));
                }
            },
            SlashCommand::Tokens => match command.max_tokens_target() {
                Some(Ok(value)) => {
                    let applied = self.session.config_mut().set_max_tokens(value);
                    self.session.notify(NoticeLevel::Info, format!("Max tokens: {applied}"));
                }
                Some(Err(err)) => self.session.notify(NoticeLevel::Error, err.to_string()),
                None => {
                    let current = self.session.config().max_tokens();
                    self.session.notify(NoticeLevel::Info, format!("Max tokens: {current}"));
                }
            },
            SlashCommand::Clear => self.session.clear(),
            SlashCommand::Help => self.show_help = true,
            SlashCommand::Bye => return AppAction::Exit,
        }
        AppAction::None
    }

    /// Stream one reply, redrawing after every fragment. Keys are not read
    /// until the stream has ended.
    async fn submit<B, C>(&mut self, terminal: &mut Terminal<B>, client: &C, text: String) -> Result<()>
    where
        B: Backend,
        C: CompletionClient + ?Sized,
    {
        if let Err(err) = self.session.begin_turn(&text) {
            self.session.notify(NoticeLevel::Info, err.to_string());
            return Ok(());
        }

        let mut live = StreamState::new();
        terminal
            .draw(|frame| self.draw(frame, Some(&live)))
            .context("Failed to draw frame")?;

        let span = info_span!("completion", session = %self.session.id());
        let stream = match client
            .stream_completion(self.session.turns(), self.session.config())
            .instrument(span.clone())
            .await
        {
            Ok(stream) => stream,
            Err(err) => {
                self.session.fail_turn(err);
                return Ok(());
            }
        };

        let mut draw_error: Option<io::Error> = None;
        let outcome = {
            let this = &*self;
            let mut sink = |fragment: &str, _buffer: &str| {
                live.push_delta(fragment);
                if draw_error.is_none() {
                    if let Err(err) = terminal.draw(|frame| this.draw(frame, Some(&live))) {
                        draw_error = Some(err);
                    }
                }
            };
            accumulate(stream, &mut sink).instrument(span).await
        };

        info!(chars = outcome.text.len(), complete = outcome.is_complete(), "reply finished");
        self.session.finish_turn(outcome);

        match draw_error {
            Some(err) => Err(err).context("Failed to draw frame"),
            None => Ok(()),
        }
    }

    fn draw(&self, frame: &mut Frame, live: Option<&StreamState>) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(20)])
            .split(frame.size());

        frame.render_widget(
            SettingsView {
                panel: &self.settings,
                config: self.session.config(),
            },
            columns[0],
        );

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(5),    // Conversation
                Constraint::Length(1), // Notice
                Constraint::Length(3), // Composer
            ])
            .split(columns[1]);

        frame.render_widget(
            ConversationView::new(self.session.turns(), live, self.show_timestamps),
            rows[0],
        );
        frame.render_widget(self.notice_line(live.is_some()), rows[1]);
        frame.render_widget(&self.composer, rows[2]);

        if self.show_help {
            render_help(frame, columns[1]);
        }
    }

    fn notice_line(&self, streaming: bool) -> Paragraph<'static> {
        if streaming {
            return Paragraph::new(Line::from(Span::styled(
                format!("🤖 {} is replying...", self.session.config().model()),
                Style::default().fg(Color::Green),
            )));
        }

        let Some(notice) = self.session.latest_notice() else {
            return Paragraph::new("");
        };
        let (prefix, color) = match notice.level {
            NoticeLevel::Info => ("ℹ️ ", Color::Blue),
            NoticeLevel::Success => ("✅ ", Color::Green),
            NoticeLevel::Error => ("❌ ", Color::Red),
        };
        Paragraph::new(Line::from(vec![
            Span::styled(prefix, Style::default().fg(color)),
            Span::styled(notice.message.clone(), Style::default().fg(color)),
        ]))
    }
}

fn render_help(frame: &mut Frame, area: Rect) {
    let popup = centered(area, 70, 12);
    frame.render_widget(Clear, popup);
    frame.render_widget(
        Paragraph::new(get_help_text())
            .wrap(Wrap { trim: false })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Help (any key to close)")
                    .border_style(Style::default().fg(Color::Cyan)),
            ),
        popup,
    );
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

/// Screen shown when startup failed. Only quitting is possible.
fn draw_stopped(frame: &mut Frame, err: &ChatError) {
    let area = centered(frame.size(), 72, 7);
    let text = vec![
        Line::from(Span::styled(
            format!("⚠️ {err}"),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "The app is stopped. Press q or Esc to quit.",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    frame.render_widget(
        Paragraph::new(text)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("streamchat")),
        area,
    );
}

/// The stopped screen only reacts to q, Esc and Ctrl-C.
fn stopped_key_quits(key: &KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    let ctrl_c = key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL);
    ctrl_c || matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
}

fn run_stopped<B: Backend>(terminal: &mut Terminal<B>, err: &ChatError) -> Result<()> {
    loop {
        terminal
            .draw(|frame| draw_stopped(frame, err))
            .context("Failed to draw frame")?;

        if let Event::Key(key) = event::read().context("Failed to read terminal event")? {
            if stopped_key_quits(&key) {
                return Ok(());
            }
        }
    }
}

/// Run `undo` if `result` failed, keeping the original error.
fn undo_on_error<T>(result: io::Result<T>, undo: impl FnOnce() -> io::Result<()>) -> io::Result<T> {
    if result.is_err() {
        if let Err(undo_err) = undo() {
            warn!(error = %undo_err, "failed to restore terminal");
        }
    }
    result
}

fn setup_terminal() -> Result<Tui> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    undo_on_error(execute!(stdout, EnterAlternateScreen, EnableBracketedPaste), disable_raw_mode)
        .context("Failed to enter alternate screen")?;
    undo_on_error(Terminal::new(CrosstermBackend::new(stdout)), || {
        let mut stdout = io::stdout();
        execute!(stdout, LeaveAlternateScreen, DisableBracketedPaste)?;
        disable_raw_mode()
    })
    .context("Failed to create terminal")
}

fn restore_terminal(terminal: &mut Tui) -> Result<()> {
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableBracketedPaste)
        .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;
    Ok(())
}

/// Run the terminal UI for whatever startup produced.
pub async fn run_tui(startup: Startup, ui: &UiConfig) -> Result<()> {
    let mut terminal = setup_terminal()?;

    let result = match startup {
        Startup::Ready { session, client } => {
            info!(session = %session.id(), "starting chat session");
            let mut app = ChatApp::new(session, ui);
            app.run(&mut terminal, &client).await
        }
        Startup::Stopped(err) => run_stopped(&mut terminal, &err),
    };

    restore_terminal(&mut terminal)?;
    result
}
