use ardyn_core::{CompletionClient, Config, ConversationState, Transcript};

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Editable text with a character-based cursor.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InputBox {
    text: String,
    cursor: usize,
}

impl InputBox {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.text, self.cursor);
        self.text.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn insert_str(&mut self, s: &str) {
        let byte_pos = char_to_byte_index(&self.text, self.cursor);
        self.text.insert_str(byte_pos, s);
        self.cursor += s.chars().count();
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.char_count() {
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.char_count());
    }

    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.char_count();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    /// Row and column of the cursor, counting `\n` as a line break.
    pub fn cursor_row_col(&self) -> (usize, usize) {
        let before: String = self.text.chars().take(self.cursor).collect();
        let row = before.matches('\n').count();
        let col = before
            .rsplit('\n')
            .next()
            .map(|line| line.chars().count())
            .unwrap_or(0);
        (row, col)
    }
}

pub struct App {
    pub should_quit: bool,
    pub config: Config,
    pub transcript: Transcript,
    pub input: InputBox,

    // Chat viewport (updated during render)
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_total_lines: u16,
    /// Keep the newest message in view until the user scrolls away.
    pub follow_tail: bool,

    // Typing indicator
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // API key prompt
    pub show_api_key_input: bool,
    pub api_key_input: InputBox,
}

impl App {
    pub fn new(config: Config) -> Self {
        let client = CompletionClient::new(config.completion_config());
        let show_api_key_input = !config.has_api_key();

        Self {
            should_quit: false,
            config,
            transcript: Transcript::new(client),
            input: InputBox::default(),
            chat_scroll: 0,
            chat_height: 0,
            chat_total_lines: 0,
            follow_tail: true,
            animation_frame: 0,
            show_api_key_input,
            api_key_input: InputBox::default(),
        }
    }

    pub fn conversation(&self) -> &ConversationState {
        self.transcript.state()
    }

    pub fn model(&self) -> &str {
        self.transcript.client().model()
    }

    /// Send the input box contents. The input is kept while a request is
    /// pending so nothing typed is lost.
    pub fn submit_input(&mut self) -> bool {
        if self.transcript.is_pending() || self.input.is_blank() {
            return false;
        }
        if !self.config.has_api_key() {
            self.open_api_key_prompt();
            return false;
        }

        let text = self.input.text().trim().to_string();
        if !self.transcript.submit(&text) {
            return false;
        }

        self.input.clear();
        self.animation_frame = 0;
        self.follow_tail = true;
        true
    }

    /// Called on every tick event.
    pub fn tick(&mut self) {
        if self.transcript.poll() {
            self.follow_tail = true;
        }
        if self.transcript.is_pending() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn clear_chat(&mut self) {
        self.transcript.clear();
        self.chat_scroll = 0;
        self.follow_tail = true;
    }

    /// Esc: stop the running request, otherwise dismiss the error banner.
    pub fn escape(&mut self) {
        if self.transcript.is_pending() {
            self.transcript.cancel();
        } else if self.conversation().last_error.is_some() {
            self.transcript.dismiss_error();
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.follow_tail = false;
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines);
        if self.chat_scroll >= self.max_chat_scroll() {
            self.follow_tail = true;
        }
    }

    pub fn scroll_page_up(&mut self) {
        self.scroll_up(self.chat_height.max(2) / 2);
    }

    pub fn scroll_page_down(&mut self) {
        self.scroll_down(self.chat_height.max(2) / 2);
    }

    pub fn max_chat_scroll(&self) -> u16 {
        self.chat_total_lines.saturating_sub(self.chat_height)
    }

    /// Recompute the scroll offset after the chat content was laid out.
    pub fn update_chat_viewport(&mut self, height: u16, total_lines: u16) {
        self.chat_height = height;
        self.chat_total_lines = total_lines;

        let max = self.max_chat_scroll();
        if self.follow_tail || self.chat_scroll > max {
            self.chat_scroll = max;
        }
    }

    pub fn open_api_key_prompt(&mut self) {
        self.show_api_key_input = true;
        self.api_key_input.clear();
    }

    pub fn close_api_key_prompt(&mut self) {
        self.show_api_key_input = false;
        self.api_key_input.clear();
    }

    /// Use the typed key for future requests and remember it on disk.
    pub fn confirm_api_key(&mut self) {
        let key = self.api_key_input.text().trim().to_string();
        if key.is_empty() {
            return;
        }

        if let Err(err) = Config::save_api_key(&key) {
            tracing::warn!(error = %err, "could not save API key to config file");
        }

        self.config.api_key = Some(key);
        self.transcript.set_client(CompletionClient::new(self.config.completion_config()));
        self.close_api_key_prompt();
        tracing::info!("API key updated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_with_key() -> App {
        App::new(Config {
            api_key: Some("sk-test".to_string()),
            api_url: Some("http://127.0.0.1:1".to_string()),
            ..Config::new()
        })
    }

    #[test]
    fn test_input_editing_is_utf8_safe() {
        let mut input = InputBox::default();
        for c in "héllo".chars() {
            input.insert(c);
        }
        input.move_left();
        input.move_left();
        input.backspace();
        assert_eq!(input.text(), "hélo");
        assert_eq!(input.cursor(), 2);

        input.move_home();
        input.delete();
        assert_eq!(input.text(), "élo");

        input.move_end();
        input.insert_str(" wörld");
        assert_eq!(input.text(), "élo wörld");
        assert_eq!(input.cursor(), 9);

        input.move_right();
        assert_eq!(input.cursor(), 9);
    }

    #[test]
    fn test_cursor_row_col_tracks_newlines() {
        let mut input = InputBox::default();
        input.insert_str("first\nsecond");
        assert_eq!(input.cursor_row_col(), (1, 6));

        input.move_home();
        assert_eq!(input.cursor_row_col(), (0, 0));
    }

    #[test]
    fn test_missing_key_opens_prompt() {
        let mut app = App::new(Config::new());
        assert!(app.show_api_key_input);

        app.close_api_key_prompt();
        app.input.insert_str("Hello");
        assert!(!app.submit_input());
        assert!(app.show_api_key_input);
        assert_eq!(app.input.text(), "Hello");
        assert!(app.conversation().is_empty());
    }

    #[tokio::test]
    async fn test_submit_input_trims_and_clears() {
        let mut app = app_with_key();
        assert!(!app.show_api_key_input);

        app.input.insert_str("  Hello  ");
        assert!(app.submit_input());
        assert_eq!(app.input.text(), "");
        assert!(app.conversation().pending_request);
        assert_eq!(app.conversation().messages[0].content, "Hello");

        // Input stays put while a request is pending
        app.input.insert_str("next");
        assert!(!app.submit_input());
        assert_eq!(app.input.text(), "next");
        assert_eq!(app.conversation().messages.len(), 1);
    }

    #[test]
    fn test_blank_input_is_not_submitted() {
        let mut app = app_with_key();
        app.input.insert_str("   ");
        assert!(!app.submit_input());
        assert!(app.conversation().is_empty());
    }

    #[tokio::test]
    async fn test_escape_cancels_then_dismisses() {
        let mut app = app_with_key();
        app.input.insert_str("Hello");
        app.submit_input();

        app.escape();
        app.transcript.settle().await;
        assert!(!app.conversation().pending_request);
        assert!(app.conversation().last_error.is_some());

        app.escape();
        assert!(app.conversation().last_error.is_none());
        assert_eq!(app.conversation().messages.len(), 1);
    }

    #[test]
    fn test_viewport_follows_tail_until_user_scrolls() {
        let mut app = app_with_key();
        app.update_chat_viewport(10, 30);
        assert_eq!(app.chat_scroll, 20);

        app.scroll_up(5);
        assert!(!app.follow_tail);
        app.update_chat_viewport(10, 40);
        assert_eq!(app.chat_scroll, 15);

        app.scroll_down(100);
        assert!(app.follow_tail);
        app.update_chat_viewport(10, 40);
        assert_eq!(app.chat_scroll, 30);
    }

    #[test]
    fn test_viewport_shorter_than_screen_does_not_scroll() {
        let mut app = app_with_key();
        app.update_chat_viewport(20, 5);
        assert_eq!(app.chat_scroll, 0);
        assert_eq!(app.max_chat_scroll(), 0);
    }
}
