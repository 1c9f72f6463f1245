//! Conversation history display component

use chrono::Local;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

use crate::conversation::{Role, Turn};
use crate::streaming::StreamState;

const STREAMING_CURSOR: &str = "▌";

/// Renders the turns of a session plus the reply currently streaming in,
/// pinned to the bottom of the area.
pub struct ConversationView<'a> {
    turns: &'a [Turn],
    live: Option<&'a StreamState>,
    show_timestamps: bool,
}

impl<'a> ConversationView<'a> {
    pub fn new(turns: &'a [Turn], live: Option<&'a StreamState>, show_timestamps: bool) -> Self {
        Self {
            turns,
            live,
            show_timestamps,
        }
    }

    /// All display lines for the given content width.
    pub fn lines(&self, width: u16) -> Vec<Line<'static>> {
        let width = width.saturating_sub(2) as usize;
        let mut all_lines = Vec::new();

        for turn in self.turns {
            all_lines.push(self.header(turn.role(), Some(turn)));
            for content_line in wrap_text(turn.content(), width) {
                all_lines.push(Line::from(vec![
                    Span::raw("  "),
                    Span::styled(content_line, content_style(turn.role())),
                ]));
            }
            all_lines.push(Line::from(""));
        }

        if let Some(live) = self.live {
            all_lines.push(self.header(Role::Assistant, None));
            let mut content_lines = wrap_text(live.text(), width);
            let last = content_lines.pop().unwrap_or_default();
            for content_line in content_lines {
                all_lines.push(Line::from(vec![
                    Span::raw("  "),
                    Span::styled(content_line, content_style(Role::Assistant)),
                ]));
            }
            all_lines.push(Line::from(vec![
                Span::raw("  "),
                Span::styled(last, content_style(Role::Assistant)),
                Span::styled(STREAMING_CURSOR, Style::default().fg(Color::Yellow)),
            ]));
        }

        all_lines
    }

    fn header(&self, role: Role, turn: Option<&Turn>) -> Line<'static> {
        let name = match role {
            Role::User => "You",
            Role::Assistant => "Assistant",
        };
        let mut spans = vec![
            Span::raw(format!("{} ", role.avatar())),
            Span::styled(
                name,
                content_style(role).add_modifier(Modifier::BOLD),
            ),
        ];
        if self.show_timestamps {
            let time = turn
                .map(|t| t.created_at().with_timezone(&Local))
                .unwrap_or_else(Local::now)
                .format("%H:%M")
                .to_string();
            spans.push(Span::styled(format!(" {time}"), Style::default().fg(Color::DarkGray)));
        }
        Line::from(spans)
    }
}

impl Widget for ConversationView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title("💬 Conversation");

        let inner_area = block.inner(area);
        block.render(area, buf);

        let all_lines = self.lines(inner_area.width);

        let height = inner_area.height as usize;
        let start = all_lines.len().saturating_sub(height);
        for (i, line) in all_lines[start..].iter().enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
        }
    }
}

fn content_style(role: Role) -> Style {
    match role {
        Role::User => Style::default().fg(Color::Cyan),
        Role::Assistant => Style::default().fg(Color::Green),
    }
}

/// Word-wrap `text` to `width` columns, keeping explicit line breaks. Words
/// longer than a line are split.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current_line = String::new();
        let mut current_len = 0;

        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();

            while word.len() > width {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current_line));
                    current_len = 0;
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }

            let needed = if current_len == 0 { word.len() } else { current_len + 1 + word.len() };
            if needed > width && current_len > 0 {
                lines.push(std::mem::take(&mut current_line));
                current_len = 0;
            }
            if current_len > 0 {
                current_line.push(' ');
                current_len += 1;
            }
            current_len += word.len();
            current_line.extend(word);
        }

        lines.push(current_line);
    }

    lines
}
