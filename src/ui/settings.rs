//! Sidebar with the model selector, the two sliders and the clear action.

use chrono::Local;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

use crate::generation::{
    GenerationConfig, MAX_MAX_TOKENS, MAX_TEMPERATURE, MIN_MAX_TOKENS, MIN_TEMPERATURE,
};
use crate::session::{ChatSession, NoticeLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    Model,
    Temperature,
    MaxTokens,
    Clear,
}

impl SettingsField {
    const ORDER: [SettingsField; 4] = [
        SettingsField::Model,
        SettingsField::Temperature,
        SettingsField::MaxTokens,
        SettingsField::Clear,
    ];

    fn index(self) -> usize {
        Self::ORDER.iter().position(|f| *f == self).unwrap_or(0)
    }

    fn next(self) -> Self {
        Self::ORDER[(self.index() + 1) % Self::ORDER.len()]
    }

    fn previous(self) -> Self {
        Self::ORDER[(self.index() + Self::ORDER.len() - 1) % Self::ORDER.len()]
    }
}

#[derive(Debug, Clone)]
pub struct SettingsPanel {
    selected: SettingsField,
    has_focus: bool,
}

impl Default for SettingsPanel {
    fn default() -> Self {
        Self {
            selected: SettingsField::Model,
            has_focus: false,
        }
    }
}

impl SettingsPanel {
    pub fn selected(&self) -> SettingsField {
        self.selected
    }

    pub fn set_focus(&mut self, has_focus: bool) {
        self.has_focus = has_focus;
    }

    /// Apply a key to the session's settings. Returns false when the key was
    /// not handled.
    pub fn handle_key(&mut self, key: KeyEvent, session: &mut ChatSession) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }

        match key.code {
            KeyCode::Up => self.selected = self.selected.previous(),
            KeyCode::Down => self.selected = self.selected.next(),
            KeyCode::Left => self.adjust(session, -1),
            KeyCode::Right => self.adjust(session, 1),
            KeyCode::Enter if self.selected == SettingsField::Clear => session.clear(),
            _ => return false,
        }
        true
    }

    fn adjust(&self, session: &mut ChatSession, steps: i32) {
        let config = session.config_mut();
        match self.selected {
            SettingsField::Model => {
                let model = if steps > 0 {
                    config.model().next()
                } else {
                    config.model().previous()
                };
                config.set_model(model);
                session.notify(NoticeLevel::Info, format!("Model: {model}"));
            }
            SettingsField::Temperature => {
                config.step_temperature(steps);
            }
            SettingsField::MaxTokens => {
                config.step_max_tokens(steps);
            }
            SettingsField::Clear => {}
        }
    }
}

/// Render-time pairing of the panel with the settings it shows.
pub struct SettingsView<'a> {
    pub panel: &'a SettingsPanel,
    pub config: &'a GenerationConfig,
}

impl Widget for SettingsView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let border = if self.panel.has_focus {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .title("🤖 Settings")
            .border_style(border);
        let inner = block.inner(area);
        block.render(area, buf);

        let bar_width = inner.width.saturating_sub(4) as usize;
        let temperature_ratio =
            (self.config.temperature() - MIN_TEMPERATURE) / (MAX_TEMPERATURE - MIN_TEMPERATURE);
        let tokens_ratio = (self.config.max_tokens() - MIN_MAX_TOKENS) as f32
            / (MAX_MAX_TOKENS - MIN_MAX_TOKENS) as f32;

        let mut lines = Vec::new();
        lines.push(self.label(SettingsField::Model, "Model"));
        lines.push(Line::from(format!("  ◂ {} ▸", self.config.model())));
        lines.push(Line::from(""));
        lines.push(self.label(
            SettingsField::Temperature,
            &format!("Temperature  {:.1}", self.config.temperature()),
        ));
        lines.push(slider_line(temperature_ratio, bar_width));
        lines.push(Line::from(""));
        lines.push(self.label(
            SettingsField::MaxTokens,
            &format!("Max Tokens  {}", self.config.max_tokens()),
        ));
        lines.push(slider_line(tokens_ratio, bar_width));
        lines.push(Line::from(""));
        lines.push(self.label(SettingsField::Clear, "🗑️ Clear Conversation"));
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Tab: focus  ←/→: adjust",
            Style::default().fg(Color::DarkGray),
        )));
        lines.push(Line::from(Span::styled(
            format!("streamchat • {}", Local::now().format("%Y-%m-%d")),
            Style::default().fg(Color::DarkGray),
        )));

        for (i, line) in lines.iter().enumerate() {
            if i >= inner.height as usize {
                break;
            }
            buf.set_line(inner.x, inner.y + i as u16, line, inner.width);
        }
    }
}

impl SettingsView<'_> {
    fn label(&self, field: SettingsField, text: &str) -> Line<'static> {
        let selected = self.panel.has_focus && self.panel.selected == field;
        let style = if selected {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        let marker = if selected { "› " } else { "  " };
        Line::from(Span::styled(format!("{marker}{text}"), style))
    }
}

fn slider_line(ratio: f32, width: usize) -> Line<'static> {
    let filled = ((ratio.clamp(0.0, 1.0) * width as f32).round() as usize).min(width);
    Line::from(vec![
        Span::raw("  "),
        Span::styled("━".repeat(filled), Style::default().fg(Color::Green)),
        Span::styled("─".repeat(width - filled), Style::default().fg(Color::DarkGray)),
    ])
}
