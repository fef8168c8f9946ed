use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use crate::app::App;
use crate::tui::AppEvent;

const MOUSE_SCROLL_LINES: u16 = 3;

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Paste(text) => handle_paste(app, &text),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick(),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if app.show_api_key_input {
        handle_api_key_input(app, key);
    } else {
        handle_chat_key(app, key);
    }
}

// The key field is masked, so editing only happens at the end
fn handle_api_key_input(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
        KeyCode::Esc => app.close_api_key_prompt(),
        KeyCode::Enter => app.confirm_api_key(),
        KeyCode::Backspace => app.api_key_input.backspace(),
        KeyCode::Char(c) if !ctrl => app.api_key_input.insert(c),
        _ => {}
    }
}

fn handle_chat_key(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);

    match key.code {
        // Newline without sending; plain Shift+Enter is indistinguishable on most terminals
        KeyCode::Enter if alt || key.modifiers.contains(KeyModifiers::SHIFT) => app.input.insert('\n'),
        KeyCode::Char('j') if ctrl => app.input.insert('\n'),
        KeyCode::Enter => {
            app.submit_input();
        }

        KeyCode::Char('l') if ctrl => app.clear_chat(),
        KeyCode::Char('k') if ctrl => app.open_api_key_prompt(),
        KeyCode::Char('a') if ctrl => app.input.move_home(),
        KeyCode::Char('e') if ctrl => app.input.move_end(),
        KeyCode::Char('u') if ctrl => app.input.clear(),
        KeyCode::Esc => app.escape(),

        // Chat scrolling
        KeyCode::PageUp => app.scroll_page_up(),
        KeyCode::PageDown => app.scroll_page_down(),
        KeyCode::Up if ctrl => app.scroll_up(1),
        KeyCode::Down if ctrl => app.scroll_down(1),

        // Editing
        KeyCode::Backspace => app.input.backspace(),
        KeyCode::Delete => app.input.delete(),
        KeyCode::Left => app.input.move_left(),
        KeyCode::Right => app.input.move_right(),
        KeyCode::Home => app.input.move_home(),
        KeyCode::End => app.input.move_end(),
        KeyCode::Char(c) if !ctrl => app.input.insert(c),
        _ => {}
    }
}

fn handle_paste(app: &mut App, text: &str) {
    // Terminals send CRLF or CR for pasted line breaks
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    if app.show_api_key_input {
        app.api_key_input.insert_str(text.trim());
    } else {
        app.input.insert_str(&text);
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(MOUSE_SCROLL_LINES),
        MouseEventKind::ScrollUp => app.scroll_up(MOUSE_SCROLL_LINES),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ardyn_core::Config;
    use crossterm::event::{KeyEventKind, KeyEventState};

    fn app() -> App {
        App::new(Config {
            api_key: Some("sk-test".to_string()),
            api_url: Some("http://127.0.0.1:1".to_string()),
            ..Config::new()
        })
    }

    fn press(app: &mut App, code: KeyCode, modifiers: KeyModifiers) {
        let key = KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        };
        handle_event(app, AppEvent::Key(key)).unwrap();
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c), KeyModifiers::NONE);
        }
    }

    #[test]
    fn test_ctrl_c_quits() {
        let mut app = app();
        press(&mut app, KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(app.should_quit);
    }

    #[test]
    fn test_alt_enter_inserts_newline() {
        let mut app = app();
        type_text(&mut app, "one");
        press(&mut app, KeyCode::Enter, KeyModifiers::ALT);
        type_text(&mut app, "two");
        assert_eq!(app.input.text(), "one\ntwo");
        assert!(app.conversation().is_empty());
    }

    #[tokio::test]
    async fn test_enter_submits_and_ctrl_l_clears() {
        let mut app = app();
        type_text(&mut app, "Hello");
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);
        assert_eq!(app.conversation().messages.len(), 1);
        assert!(app.conversation().pending_request);
        assert_eq!(app.input.text(), "");

        press(&mut app, KeyCode::Char('l'), KeyModifiers::CONTROL);
        assert!(app.conversation().is_empty());
        assert!(!app.conversation().pending_request);
    }

    #[test]
    fn test_api_key_prompt_captures_typing() {
        let mut app = app();
        press(&mut app, KeyCode::Char('k'), KeyModifiers::CONTROL);
        assert!(app.show_api_key_input);

        type_text(&mut app, "sk-new");
        assert_eq!(app.api_key_input.text(), "sk-new");
        assert_eq!(app.input.text(), "");

        press(&mut app, KeyCode::Esc, KeyModifiers::NONE);
        assert!(!app.show_api_key_input);
        assert_eq!(app.api_key_input.text(), "");
    }

    #[test]
    fn test_api_key_prompt_ignores_control_chords() {
        let mut app = app();
        press(&mut app, KeyCode::Char('k'), KeyModifiers::CONTROL);
        type_text(&mut app, "sk-");
        press(&mut app, KeyCode::Char('v'), KeyModifiers::CONTROL);
        press(&mut app, KeyCode::Char('a'), KeyModifiers::CONTROL);
        press(&mut app, KeyCode::Left, KeyModifiers::NONE);
        type_text(&mut app, "9");

        assert!(app.show_api_key_input);
        assert_eq!(app.api_key_input.text(), "sk-9");
        assert_eq!(app.api_key_input.cursor(), 4);
    }

    #[test]
    fn test_paste_normalizes_line_endings() {
        let mut app = app();
        handle_event(&mut app, AppEvent::Paste("a\r\nb\rc".to_string())).unwrap();
        assert_eq!(app.input.text(), "a\nb\nc");
    }

    #[test]
    fn test_mouse_wheel_scrolls_chat() {
        let mut app = app();
        app.update_chat_viewport(10, 50);
        let wheel = |kind| MouseEvent {
            kind,
            column: 0,
            row: 0,
            modifiers: KeyModifiers::NONE,
        };

        handle_event(&mut app, AppEvent::Mouse(wheel(MouseEventKind::ScrollUp))).unwrap();
        assert_eq!(app.chat_scroll, 37);
        assert!(!app.follow_tail);

        handle_event(&mut app, AppEvent::Mouse(wheel(MouseEventKind::ScrollDown))).unwrap();
        assert_eq!(app.chat_scroll, 40);
        assert!(app.follow_tail);
    }
}
