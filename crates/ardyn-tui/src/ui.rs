use chrono::Local;
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use ardyn_core::{ChatMessage, ChatRole};
use unicode_width::UnicodeWidthChar;
use crate::app::App;

const PRODUCT_NAME: &str = "ArdynIQ";
const MAX_INPUT_ROWS: usize = 5;

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Vec<Span<'static>> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;

            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(bold_text, Style::default().add_modifier(Modifier::BOLD)));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    spans
}

const TAB_WIDTH: usize = 4;

fn char_width(c: char) -> usize {
    UnicodeWidthChar::width(c).unwrap_or(0)
}

/// A run of styled cells that is either all whitespace or all non-whitespace.
struct Token {
    cells: Vec<(char, Style)>,
    width: usize,
    blank: bool,
}

fn tokenize(spans: Vec<Span<'static>>) -> Vec<Token> {
    let mut tokens: Vec<Token> = Vec::new();

    for span in spans {
        for c in span.content.chars() {
            // Tabs have no display width of their own
            let (cells, width) = if c == '\t' {
                (vec![(' ', span.style); TAB_WIDTH], TAB_WIDTH)
            } else {
                (vec![(c, span.style)], char_width(c))
            };
            let blank = c.is_whitespace();

            match tokens.last_mut() {
                Some(token) if token.blank == blank => {
                    token.cells.extend(cells);
                    token.width += width;
                }
                _ => tokens.push(Token { cells, width, blank }),
            }
        }
    }

    tokens
}

/// Merge adjacent cells with the same style back into spans.
fn cells_to_line(cells: Vec<(char, Style)>) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut run: Option<(String, Style)> = None;

    for (c, style) in cells {
        if let Some((text, current)) = run.as_mut() {
            if *current == style {
                text.push(c);
                continue;
            }
        }
        if let Some((text, current)) = run.take() {
            spans.push(Span::styled(text, current));
        }
        run = Some((c.to_string(), style));
    }
    if let Some((text, style)) = run {
        spans.push(Span::styled(text, style));
    }

    Line::from(spans)
}

struct LineBuilder {
    width: usize,
    lines: Vec<Line<'static>>,
    cells: Vec<(char, Style)>,
    used: usize,
}

impl LineBuilder {
    fn remaining(&self) -> usize {
        self.width.saturating_sub(self.used)
    }

    fn push_cell(&mut self, cell: (char, Style)) {
        let w = char_width(cell.0);
        if self.used > 0 && self.used + w > self.width {
            self.break_line();
        }
        self.cells.push(cell);
        self.used += w;
    }

    fn break_line(&mut self) {
        self.lines.push(cells_to_line(std::mem::take(&mut self.cells)));
        self.used = 0;
    }

    /// Break before a word; trailing whitespace at the break is not shown.
    fn wrap_before_word(&mut self) {
        while self.cells.last().is_some_and(|(c, _)| c.is_whitespace()) {
            self.cells.pop();
        }
        self.break_line();
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        if !self.cells.is_empty() || self.lines.is_empty() {
            self.break_line();
        }
        self.lines
    }
}

/// Wrap styled spans to `width` display columns.
///
/// Whitespace is kept as written, except where a line breaks. Words move to
/// the next line when they don't fit; a word wider than the whole pane is
/// split across lines.
fn wrap_spans(spans: Vec<Span<'static>>, width: usize) -> Vec<Line<'static>> {
    let width = width.max(1);
    let mut builder = LineBuilder {
        width,
        lines: Vec::new(),
        cells: Vec::new(),
        used: 0,
    };

    for token in tokenize(spans) {
        if token.blank {
            if token.width <= builder.remaining() {
                builder.cells.extend(token.cells);
                builder.used += token.width;
            } else if builder.used > 0 {
                builder.break_line();
            } else {
                // Indentation wider than the pane is clipped
                for cell in token.cells {
                    if builder.used + char_width(cell.0) > width {
                        break;
                    }
                    builder.push_cell(cell);
                }
            }
            continue;
        }

        if token.width > builder.remaining() && builder.used > 0 && token.width <= width {
            builder.wrap_before_word();
        }
        for cell in token.cells {
            builder.push_cell(cell);
        }
    }

    builder.finish()
}

/// Lay out the whole conversation as pre-wrapped lines.
fn chat_lines(app: &App, width: usize) -> Vec<Line<'static>> {
    let conversation = app.conversation();
    let mut lines: Vec<Line<'static>> = Vec::new();

    for msg in &conversation.messages {
        lines.push(message_header(msg));
        for source_line in msg.content.lines() {
            let spans = match msg.role {
                ChatRole::User => vec![Span::raw(source_line.to_string())],
                ChatRole::Assistant => parse_markdown_line(source_line),
            };
            lines.extend(wrap_spans(spans, width));
        }
        lines.push(Line::default());
    }

    if conversation.pending_request {
        lines.push(Line::from(Span::styled("AI", assistant_style())));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    lines
}

fn user_style() -> Style {
    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
}

fn assistant_style() -> Style {
    Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD)
}

fn message_header(msg: &ChatMessage) -> Line<'static> {
    let (label, style) = match msg.role {
        ChatRole::User => ("You", user_style()),
        ChatRole::Assistant => ("AI", assistant_style()),
    };
    let time = msg.timestamp.with_timezone(&Local).format("%H:%M").to_string();

    Line::from(vec![
        Span::styled(label, style),
        Span::styled(format!("  {}", time), Style::default().fg(Color::DarkGray)),
    ])
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let error_height = if app.conversation().last_error.is_some() { 3 } else { 0 };
    let input_rows = app.input.text().split('\n').count().clamp(1, MAX_INPUT_ROWS);

    let [header_area, chat_area, error_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(error_height),
        Constraint::Length(input_rows as u16 + 2),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    if error_height > 0 {
        render_error(app, frame, error_area);
    }
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    if app.show_api_key_input {
        render_api_key_input(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let count = app.conversation().messages.len();
    let status = if count > 0 {
        format!(" {} messages ", count)
    } else {
        " ready ".to_string()
    };

    let title = Line::from(vec![
        Span::styled(format!(" {} ", PRODUCT_NAME), Style::default().fg(Color::Cyan).bold()),
        Span::styled(status, Style::default().fg(Color::White)),
        Span::styled(format!(" {} ", app.model()), Style::default().fg(Color::Magenta)),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversation ");

    let inner = block.inner(area);

    if app.conversation().is_empty() && !app.conversation().pending_request {
        app.update_chat_viewport(inner.height, 0);

        let welcome = Text::from(vec![
            Line::default(),
            Line::from(Span::styled(format!("Welcome to {}", PRODUCT_NAME), user_style())),
            Line::default(),
            Line::from(Span::styled(
                "Ask anything. Enter to send, Alt+Enter for a new line.",
                Style::default().fg(Color::DarkGray),
            )),
        ])
        .centered();

        let paragraph = Paragraph::new(welcome).block(block).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
        return;
    }

    let lines = chat_lines(app, inner.width as usize);
    let total = u16::try_from(lines.len()).unwrap_or(u16::MAX);
    app.update_chat_viewport(inner.height, total);

    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_error(app: &App, frame: &mut Frame, area: Rect) {
    let Some(error) = app.conversation().last_error.as_deref() else {
        return;
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Error (Esc to dismiss) ");

    let paragraph = Paragraph::new(Span::styled(error.to_string(), Style::default().fg(Color::LightRed)))
        .block(block);

    frame.render_widget(paragraph, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let pending = app.conversation().pending_request;
    let (border_color, title) = if pending {
        (Color::DarkGray, " Waiting for reply... (Esc to cancel) ")
    } else {
        (Color::Yellow, " Message ")
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    let inner_width = area.width.saturating_sub(2) as usize;
    let inner_height = area.height.saturating_sub(2) as usize;
    let (cursor_row, cursor_col) = app.input.cursor_row_col();

    // Keep the cursor visible in both directions
    let col_offset = if inner_width > 0 && cursor_col >= inner_width {
        cursor_col - inner_width + 1
    } else {
        0
    };
    let row_offset = cursor_row.saturating_sub(inner_height.saturating_sub(1));

    let visible: Vec<Line> = app.input
        .text()
        .split('\n')
        .skip(row_offset)
        .take(inner_height)
        .map(|line| Line::from(line.chars().skip(col_offset).take(inner_width).collect::<String>()))
        .collect();

    let text_color = if pending { Color::DarkGray } else { Color::Cyan };
    let input = Paragraph::new(visible)
        .style(Style::default().fg(text_color))
        .block(block);

    frame.render_widget(input, area);

    if !app.show_api_key_input {
        frame.set_cursor_position((
            area.x + 1 + (cursor_col - col_offset) as u16,
            area.y + 1 + (cursor_row - row_offset) as u16,
        ));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hint = |key: &'static str, label: &'static str| {
        [
            Span::styled(format!(" {} ", key), key_style),
            Span::styled(format!(" {} ", label), label_style),
        ]
    };

    let conversation = app.conversation();
    let mut hints: Vec<Span> = Vec::new();

    if app.show_api_key_input {
        hints.extend(hint("Enter", "save"));
        hints.extend(hint("Esc", "cancel"));
    } else {
        if conversation.pending_request {
            hints.extend(hint("Esc", "cancel"));
        } else {
            hints.extend(hint("Enter", "send"));
            if conversation.last_error.is_some() {
                hints.extend(hint("Esc", "dismiss"));
            }
        }
        hints.extend(hint("Alt+Enter", "newline"));
        if !conversation.is_empty() {
            hints.extend(hint("Ctrl+L", "clear"));
        }
        hints.extend(hint("PgUp/PgDn", "scroll"));
        hints.extend(hint("Ctrl+K", "API key"));
        hints.extend(hint("Ctrl+C", "quit"));
    }

    let footer = Paragraph::new(Line::from(hints)).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_api_key_input(app: &App, frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let popup_width = 60.min(area.width.saturating_sub(4));
    let popup_height = 7;

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height.min(area.height));

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Enter API Key ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);
    if inner.height < 5 {
        return;
    }

    let instructions = Paragraph::new("Paste your API key below. Press Enter to save, Esc to cancel.")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 1));

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    let masked = mask_key(app.api_key_input.text());
    let cursor_x = masked.chars().count().min(input_area.width as usize) as u16;
    let input = Paragraph::new(masked).style(Style::default().fg(Color::Cyan));
    frame.render_widget(input, input_area);

    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));

    let source = if app.config.has_api_key() {
        "A key is configured; a new one replaces it"
    } else {
        "No key found in OPENAI_API_KEY or the config file"
    };
    let status = Paragraph::new(source).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(status, Rect::new(inner.x, inner.y + 4, inner.width, 1));
}

/// Show only the last four characters of a key.
fn mask_key(key: &str) -> String {
    let len = key.chars().count();
    if len <= 4 {
        return "*".repeat(len);
    }

    let masked_len = len - 4;
    let last_four: String = key.chars().skip(masked_len).collect();
    format!("{}...{}", "*".repeat(masked_len.min(20)), last_four)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ardyn_core::Config;
    use ratatui::{backend::TestBackend, Terminal};

    fn line_text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_parse_markdown_bold() {
        let spans = parse_markdown_line("a **bold** move");
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[1].content, "bold");
        assert!(spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_parse_markdown_unclosed_is_literal() {
        let spans = parse_markdown_line("2 ** 3");
        let text: String = spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "2 ** 3");
    }

    #[test]
    fn test_wrap_keeps_punctuation_attached_to_styled_word() {
        let lines = wrap_spans(parse_markdown_line("see **this**, then go"), 80);
        assert_eq!(lines.len(), 1);
        assert_eq!(line_text(&lines[0]), "see this, then go");
    }

    #[test]
    fn test_wrap_breaks_on_word_boundaries() {
        let lines = wrap_spans(vec![Span::raw("the quick brown fox jumps")], 10);
        let texts: Vec<String> = lines.iter().map(line_text).collect();
        assert_eq!(texts, vec!["the quick", "brown fox", "jumps"]);
    }

    #[test]
    fn test_wrap_empty_line_still_takes_a_row() {
        let lines = wrap_spans(Vec::new(), 10);
        assert_eq!(lines.len(), 1);
        assert_eq!(line_text(&lines[0]), "");
    }

    #[test]
    fn test_wrap_splits_words_wider_than_the_pane() {
        let url = format!("https://example.com/{}END", "a".repeat(60));
        let lines = wrap_spans(vec![Span::raw(url.clone())], 30);

        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|line| line.width() <= 30));
        let joined: String = lines.iter().map(line_text).collect();
        assert_eq!(joined, url);
        assert!(line_text(&lines[2]).ends_with("END"));
    }

    #[test]
    fn test_wrap_long_word_after_short_word_fills_the_line() {
        let lines = wrap_spans(vec![Span::raw(format!("see {}", "x".repeat(12)))], 10);
        let texts: Vec<String> = lines.iter().map(line_text).collect();
        assert_eq!(texts, vec!["see xxxxxx", "xxxxxx"]);
    }

    #[test]
    fn test_wrap_preserves_indentation_and_inner_spacing() {
        let lines = wrap_spans(parse_markdown_line("    let x  =  1;"), 80);
        assert_eq!(lines.len(), 1);
        assert_eq!(line_text(&lines[0]), "    let x  =  1;");

        let tabbed = wrap_spans(vec![Span::raw("\tx")], 80);
        assert_eq!(line_text(&tabbed[0]), "    x");
    }

    #[test]
    fn test_wrap_measures_display_width() {
        let lines = wrap_spans(vec![Span::raw("你好世界你好世界")], 10);
        let texts: Vec<String> = lines.iter().map(line_text).collect();
        assert_eq!(texts, vec!["你好世界你", "好世界"]);
        assert!(lines.iter().all(|line| line.width() <= 10));
    }

    #[test]
    fn test_wrap_keeps_styles_across_a_split() {
        let lines = wrap_spans(parse_markdown_line("**abcdefgh** ok"), 4);
        let texts: Vec<String> = lines.iter().map(line_text).collect();
        assert_eq!(texts, vec!["abcd", "efgh", "ok"]);
        assert!(lines[1].spans[0].style.add_modifier.contains(Modifier::BOLD));
        assert!(!lines[2].spans[0].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_api_key_cursor_follows_masked_text() {
        let mut app = App::new(Config::new());
        app.open_api_key_prompt();
        app.api_key_input.insert_str("sk-123456");

        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();

        // Popup is 60 wide and 7 tall, centered; the key row sits two rows into it
        let masked = mask_key("sk-123456");
        assert_eq!(masked, "*****...3456");
        let cursor = terminal.get_cursor_position().unwrap();
        assert_eq!(cursor.x, 10 + 1 + masked.chars().count() as u16);
        assert_eq!(cursor.y, 8 + 1 + 2);
    }

    #[test]
    fn test_mask_key_shows_last_four() {
        assert_eq!(mask_key(""), "");
        assert_eq!(mask_key("abc"), "***");
        assert_eq!(mask_key("sk-123456"), "*****...3456");
    }

    #[test]
    fn test_render_welcome_and_prompt() {
        let mut app = App::new(Config::new());
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();

        let buffer = terminal.backend().buffer();
        let screen: String = buffer.content.iter().map(|c| c.symbol()).collect();
        assert!(screen.contains("Welcome to ArdynIQ"));
        assert!(screen.contains("Enter API Key"));
    }
}
