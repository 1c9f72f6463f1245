use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

use crate::ui::commands::{parse_slash_command, ParsedCommand};

/// Result returned when the user interacts with the composer
#[derive(Debug, PartialEq)]
pub enum ComposerResult {
    Submitted(String),
    Command(ParsedCommand),
    None,
}

/// Single-line message input. The cursor is a char index, not a byte offset.
#[derive(Debug, Clone)]
pub struct Composer {
    content: String,
    cursor: usize,
    placeholder: String,
    has_focus: bool,
}

impl Composer {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            cursor: 0,
            placeholder: placeholder.into(),
            has_focus: true,
        }
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ComposerResult {
        if key.kind != KeyEventKind::Press {
            return ComposerResult::None;
        }

        match key.code {
            KeyCode::Enter => {
                if self.content.trim().is_empty() {
                    return ComposerResult::None;
                }
                let content = std::mem::take(&mut self.content);
                self.cursor = 0;
                if let Some(command) = parse_slash_command(&content) {
                    return ComposerResult::Command(command);
                }
                return ComposerResult::Submitted(content);
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.clear();
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.insert_char(c);
            }
            KeyCode::Backspace => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    let at = self.byte_offset(self.cursor);
                    self.content.remove(at);
                }
            }
            KeyCode::Delete => {
                if self.cursor < self.char_count() {
                    let at = self.byte_offset(self.cursor);
                    self.content.remove(at);
                }
            }
            KeyCode::Left => {
                self.cursor = self.cursor.saturating_sub(1);
            }
            KeyCode::Right => {
                self.cursor = (self.cursor + 1).min(self.char_count());
            }
            KeyCode::Home => {
                self.cursor = 0;
            }
            KeyCode::End => {
                self.cursor = self.char_count();
            }
            _ => {}
        }

        ComposerResult::None
    }

    pub fn insert_str(&mut self, text: &str) {
        for c in text.chars().filter(|c| *c != '\n' && *c != '\r') {
            self.insert_char(c);
        }
    }

    fn insert_char(&mut self, c: char) {
        let at = self.byte_offset(self.cursor);
        self.content.insert(at, c);
        self.cursor += 1;
    }

    fn char_count(&self) -> usize {
        self.content.chars().count()
    }

    fn byte_offset(&self, char_index: usize) -> usize {
        self.content
            .char_indices()
            .nth(char_index)
            .map(|(i, _)| i)
            .unwrap_or(self.content.len())
    }

    pub fn set_focus(&mut self, has_focus: bool) {
        self.has_focus = has_focus;
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn clear(&mut self) {
        self.content.clear();
        self.cursor = 0;
    }
}

impl Widget for &Composer {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title("Type your message...")
            .style(if self.has_focus {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Gray)
            });

        let inner_area = block.inner(area);
        block.render(area, buf);

        let line = if self.content.is_empty() && !self.has_focus {
            Line::from(Span::styled(
                self.placeholder.as_str(),
                Style::default().fg(Color::DarkGray),
            ))
        } else if self.content.is_empty() {
            Line::from(vec![
                Span::raw("▌"),
                Span::styled(self.placeholder.as_str(), Style::default().fg(Color::DarkGray)),
            ])
        } else {
            let mut content = self.content.clone();
            if self.has_focus {
                content.insert(self.byte_offset(self.cursor), '▌');
            }
            // Keep the cursor visible on long input.
            let width = inner_area.width as usize;
            let skip = (self.cursor + 1).saturating_sub(width);
            Line::from(content.chars().skip(skip).collect::<String>())
        };
        buf.set_line(inner_area.x, inner_area.y, &line, inner_area.width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::commands::SlashCommand;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(composer: &mut Composer, text: &str) {
        for c in text.chars() {
            composer.handle_key(key(KeyCode::Char(c)));
        }
    }

    #[test]
    fn enter_submits_and_clears() {
        let mut composer = Composer::new("placeholder");
        type_text(&mut composer, "Hello");

        assert_eq!(
            composer.handle_key(key(KeyCode::Enter)),
            ComposerResult::Submitted("Hello".to_string())
        );
        assert_eq!(composer.content(), "");
    }

    #[test]
    fn blank_input_is_not_submitted() {
        let mut composer = Composer::new("placeholder");
        type_text(&mut composer, "   ");
        assert_eq!(composer.handle_key(key(KeyCode::Enter)), ComposerResult::None);
        assert_eq!(composer.content(), "   ");
    }

    #[test]
    fn slash_input_becomes_command() {
        let mut composer = Composer::new("placeholder");
        type_text(&mut composer, "/temp 0.4");

        match composer.handle_key(key(KeyCode::Enter)) {
            ComposerResult::Command(parsed) => {
                assert_eq!(parsed.command, SlashCommand::Temp);
                assert_eq!(parsed.argument(), Some("0.4"));
            }
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn editing_respects_multibyte_characters() {
        let mut composer = Composer::new("placeholder");
        type_text(&mut composer, "héllo");
        composer.handle_key(key(KeyCode::Left));
        composer.handle_key(key(KeyCode::Left));
        composer.handle_key(key(KeyCode::Left));
        composer.handle_key(key(KeyCode::Backspace));
        assert_eq!(composer.content(), "hllo");

        composer.handle_key(key(KeyCode::Home));
        composer.handle_key(key(KeyCode::Delete));
        type_text(&mut composer, "🚀");
        assert_eq!(composer.content(), "🚀llo");

        composer.handle_key(key(KeyCode::End));
        type_text(&mut composer, "!");
        assert_eq!(composer.content(), "🚀llo!");
    }

    #[test]
    fn ctrl_u_clears_line() {
        let mut composer = Composer::new("placeholder");
        type_text(&mut composer, "draft");
        composer.handle_key(KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL));
        assert_eq!(composer.content(), "");
    }

    #[test]
    fn paste_drops_newlines() {
        let mut composer = Composer::new("placeholder");
        composer.insert_str("line one\nline two");
        assert_eq!(composer.content(), "line oneline two");
    }
}
