//! Client-side line editor
//!
//! Turns atomic input events into buffer edits, submitted commands and
//! out-of-band signals. Performs no I/O: every effect the display surface
//! needs is returned as an echo string.

use unicode_width::UnicodeWidthChar;

use super::input::InputEvent;
use super::protocol::{OutboundMessage, EOF_BYTE};
use crate::history::CommandHistory;

/// Result of handling one input event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorAction {
    /// Text to write to the display surface immediately
    pub echo: Option<String>,
    /// Message to hand to the transport
    pub message: Option<OutboundMessage>,
}

impl EditorAction {
    fn none() -> Self {
        Self::default()
    }

    fn echo(text: impl Into<String>) -> Self {
        Self {
            echo: Some(text.into()),
            message: None,
        }
    }

    fn send(message: OutboundMessage) -> Self {
        Self {
            echo: None,
            message: Some(message),
        }
    }

    fn with_message(mut self, message: OutboundMessage) -> Self {
        self.message = Some(message);
        self
    }
}

/// In-progress command line plus history
#[derive(Debug, Clone, Default)]
pub struct EditorState {
    /// Characters of the line being edited
    buffer: Vec<char>,
    /// Insertion point, `0 <= cursor <= buffer.len()`
    cursor: usize,
    /// Submitted commands
    history: CommandHistory,
}

/// Line editor
pub struct LineEditor {
    state: EditorState,
    /// Also send `up_arrow`/`down_arrow` to the backend
    forward_history_keys: bool,
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new(CommandHistory::default(), false)
    }
}

impl LineEditor {
    pub fn new(history: CommandHistory, forward_history_keys: bool) -> Self {
        Self {
            state: EditorState {
                buffer: Vec::new(),
                cursor: 0,
                history,
            },
            forward_history_keys,
        }
    }

    /// Current line content
    pub fn buffer(&self) -> String {
        self.state.buffer.iter().collect()
    }

    pub fn cursor(&self) -> usize {
        self.state.cursor
    }

    pub fn history(&self) -> &CommandHistory {
        &self.state.history
    }

    /// Drop the line being edited (history entries are kept)
    pub fn reset(&mut self) {
        self.state.buffer.clear();
        self.state.cursor = 0;
        self.state.history.reset_cursor();
    }

    /// Apply one input event
    pub fn handle(&mut self, event: InputEvent) -> EditorAction {
        match event {
            InputEvent::Printable(ch) => self.insert(ch),
            InputEvent::Enter => self.submit(),
            InputEvent::Backspace => self.backspace(),
            InputEvent::CtrlC => {
                self.reset();
                EditorAction::echo("^C\r\n").with_message(OutboundMessage::signal("SIGINT"))
            }
            InputEvent::CtrlD => EditorAction::send(OutboundMessage::RawControl {
                bytes: vec![EOF_BYTE],
            }),
            InputEvent::Tab => EditorAction::send(OutboundMessage::special("tab")),
            InputEvent::ArrowUp => {
                let selected = self.state.history.older().map(str::to_owned);
                let action = match selected {
                    Some(entry) => self.replace_line(&entry),
                    None => EditorAction::none(),
                };
                self.forward_history_key(action, "up_arrow")
            }
            InputEvent::ArrowDown => {
                let selected = self
                    .state
                    .history
                    .newer()
                    .map(|entry| entry.unwrap_or_default().to_owned());
                let action = match selected {
                    Some(entry) => self.replace_line(&entry),
                    None => EditorAction::none(),
                };
                self.forward_history_key(action, "down_arrow")
            }
            InputEvent::ArrowLeft => {
                if self.state.cursor == 0 {
                    return EditorAction::none();
                }
                self.state.cursor -= 1;
                let width = char_width(self.state.buffer[self.state.cursor]);
                EditorAction::echo(cursor_left(width))
            }
            InputEvent::ArrowRight => {
                if self.state.cursor >= self.state.buffer.len() {
                    return EditorAction::none();
                }
                let width = char_width(self.state.buffer[self.state.cursor]);
                self.state.cursor += 1;
                EditorAction::echo(cursor_right(width))
            }
            InputEvent::OtherControl(bytes) => {
                EditorAction::send(OutboundMessage::RawControl { bytes })
            }
        }
    }

    fn insert(&mut self, ch: char) -> EditorAction {
        let state = &mut self.state;
        let tail: String = state.buffer[state.cursor..].iter().collect();
        state.buffer.insert(state.cursor, ch);
        state.cursor += 1;

        if tail.is_empty() {
            return EditorAction::echo(ch.to_string());
        }
        // Redraw the tail after a mid-line insert and step back over it
        let mut echo = String::new();
        echo.push(ch);
        echo.push_str(&tail);
        echo.push_str(&cursor_left(str_width(&tail)));
        EditorAction::echo(echo)
    }

    fn submit(&mut self) -> EditorAction {
        let text = self.buffer();
        self.state.buffer.clear();
        self.state.cursor = 0;
        // An empty line is still forwarded, like a bare newline in a shell
        self.state.history.push(text.clone());
        EditorAction::echo("\r\n").with_message(OutboundMessage::command(text))
    }

    fn backspace(&mut self) -> EditorAction {
        let state = &mut self.state;
        if state.cursor == 0 {
            return EditorAction::none();
        }

        state.cursor -= 1;
        let removed = state.buffer.remove(state.cursor);
        let width = char_width(removed);

        let mut echo = "\x08".repeat(width);
        let tail: String = state.buffer[state.cursor..].iter().collect();
        if tail.is_empty() {
            echo.push_str(&" ".repeat(width));
            echo.push_str(&"\x08".repeat(width));
        } else {
            // Shift the rest of the line left over the erased cell
            echo.push_str(&tail);
            echo.push_str(&" ".repeat(width));
            echo.push_str(&cursor_left(str_width(&tail) + width));
        }
        EditorAction::echo(echo)
    }

    /// Swap the displayed line for `content`, cursor at the end
    fn replace_line(&mut self, content: &str) -> EditorAction {
        let state = &mut self.state;
        let before: usize = state.buffer[..state.cursor].iter().map(|&c| char_width(c)).sum();

        state.buffer = content.chars().collect();
        state.cursor = state.buffer.len();

        let mut echo = cursor_left(before);
        echo.push_str("\x1b[K");
        echo.push_str(content);
        EditorAction::echo(echo)
    }

    fn forward_history_key(&self, action: EditorAction, key: &str) -> EditorAction {
        if self.forward_history_keys {
            action.with_message(OutboundMessage::special(key))
        } else {
            action
        }
    }
}

/// Display columns taken by a character (at least one for printables)
fn char_width(ch: char) -> usize {
    ch.width().unwrap_or(1)
}

fn str_width(s: &str) -> usize {
    s.chars().map(char_width).sum()
}

fn cursor_left(cols: usize) -> String {
    "\x1b[D".repeat(cols)
}

fn cursor_right(cols: usize) -> String {
    "\x1b[C".repeat(cols)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_str(editor: &mut LineEditor, s: &str) {
        for ch in s.chars() {
            editor.handle(InputEvent::Printable(ch));
        }
    }

    #[test]
    fn test_basic_round_trip() {
        let mut editor = LineEditor::default();

        let l = editor.handle(InputEvent::Printable('l'));
        assert_eq!(l, EditorAction::echo("l"));
        let s = editor.handle(InputEvent::Printable('s'));
        assert_eq!(s, EditorAction::echo("s"));

        let enter = editor.handle(InputEvent::Enter);
        assert_eq!(enter.echo.as_deref(), Some("\r\n"));
        assert_eq!(enter.message, Some(OutboundMessage::command("ls")));
        assert_eq!(editor.buffer(), "");
        assert_eq!(editor.cursor(), 0);
    }

    #[test]
    fn test_empty_enter_still_sends_command() {
        let mut editor = LineEditor::default();
        let action = editor.handle(InputEvent::Enter);

        assert_eq!(action.echo.as_deref(), Some("\r\n"));
        assert_eq!(action.message, Some(OutboundMessage::command("")));
        assert!(editor.history().is_empty());
    }

    #[test]
    fn test_enter_clears_state_mid_line() {
        let mut editor = LineEditor::default();
        type_str(&mut editor, "echo hi");
        editor.handle(InputEvent::ArrowLeft);
        editor.handle(InputEvent::ArrowLeft);

        let action = editor.handle(InputEvent::Enter);
        assert_eq!(action.message, Some(OutboundMessage::command("echo hi")));
        assert_eq!(editor.buffer(), "");
        assert_eq!(editor.cursor(), 0);
    }

    #[test]
    fn test_interrupt_mid_edit() {
        let mut editor = LineEditor::default();
        type_str(&mut editor, "rm -rf");
        assert_eq!(editor.cursor(), 6);

        let action = editor.handle(InputEvent::CtrlC);
        assert_eq!(action.echo.as_deref(), Some("^C\r\n"));
        assert_eq!(action.message, Some(OutboundMessage::signal("SIGINT")));
        assert_eq!(editor.buffer(), "");
        assert_eq!(editor.cursor(), 0);
        assert!(editor.history().is_empty());
    }

    #[test]
    fn test_ctrl_d_keeps_buffer() {
        let mut editor = LineEditor::default();
        type_str(&mut editor, "cat");

        let action = editor.handle(InputEvent::CtrlD);
        assert_eq!(action.echo, None);
        assert_eq!(action.message, Some(OutboundMessage::RawControl { bytes: vec![0x04] }));
        assert_eq!(editor.buffer(), "cat");
        assert_eq!(editor.cursor(), 3);
    }

    #[test]
    fn test_tab_requests_completion() {
        let mut editor = LineEditor::default();
        type_str(&mut editor, "ec");

        let action = editor.handle(InputEvent::Tab);
        assert_eq!(action.echo, None);
        assert_eq!(action.message, Some(OutboundMessage::special("tab")));
        assert_eq!(editor.buffer(), "ec");
    }

    #[test]
    fn test_backspace_at_origin_is_noop() {
        let mut editor = LineEditor::default();
        assert_eq!(editor.handle(InputEvent::Backspace), EditorAction::none());

        type_str(&mut editor, "ab");
        editor.handle(InputEvent::ArrowLeft);
        editor.handle(InputEvent::ArrowLeft);
        assert_eq!(editor.handle(InputEvent::Backspace), EditorAction::none());
        assert_eq!(editor.buffer(), "ab");
        assert_eq!(editor.cursor(), 0);
    }

    #[test]
    fn test_backspace_at_end() {
        let mut editor = LineEditor::default();
        type_str(&mut editor, "ab");

        let action = editor.handle(InputEvent::Backspace);
        assert_eq!(action, EditorAction::echo("\x08 \x08"));
        assert_eq!(editor.buffer(), "a");
        assert_eq!(editor.cursor(), 1);
    }

    #[test]
    fn test_backspace_mid_line_redraws_tail() {
        let mut editor = LineEditor::default();
        type_str(&mut editor, "abc");
        editor.handle(InputEvent::ArrowLeft);

        let action = editor.handle(InputEvent::Backspace);
        assert_eq!(action, EditorAction::echo("\x08c \x1b[D\x1b[D"));
        assert_eq!(editor.buffer(), "ac");
        assert_eq!(editor.cursor(), 1);
    }

    #[test]
    fn test_insert_mid_line() {
        let mut editor = LineEditor::default();
        type_str(&mut editor, "ac");
        editor.handle(InputEvent::ArrowLeft);

        let action = editor.handle(InputEvent::Printable('b'));
        assert_eq!(action, EditorAction::echo("bc\x1b[D"));
        assert_eq!(editor.buffer(), "abc");
        assert_eq!(editor.cursor(), 2);
    }

    #[test]
    fn test_arrow_left_right_clamp() {
        let mut editor = LineEditor::default();
        assert_eq!(editor.handle(InputEvent::ArrowLeft), EditorAction::none());
        assert_eq!(editor.handle(InputEvent::ArrowRight), EditorAction::none());

        type_str(&mut editor, "x");
        assert_eq!(editor.handle(InputEvent::ArrowRight), EditorAction::none());
        assert_eq!(editor.handle(InputEvent::ArrowLeft), EditorAction::echo("\x1b[D"));
        assert_eq!(editor.cursor(), 0);
        assert_eq!(editor.handle(InputEvent::ArrowLeft), EditorAction::none());
        assert_eq!(editor.handle(InputEvent::ArrowRight), EditorAction::echo("\x1b[C"));
        assert_eq!(editor.cursor(), 1);
    }

    #[test]
    fn test_cursor_invariant_holds() {
        let mut editor = LineEditor::default();
        let events = [
            InputEvent::Backspace,
            InputEvent::Printable('a'),
            InputEvent::ArrowLeft,
            InputEvent::ArrowLeft,
            InputEvent::Printable('日'),
            InputEvent::ArrowRight,
            InputEvent::ArrowRight,
            InputEvent::ArrowRight,
            InputEvent::Backspace,
            InputEvent::Backspace,
            InputEvent::Backspace,
            InputEvent::Printable('z'),
            InputEvent::ArrowLeft,
        ];

        for event in events {
            editor.handle(event);
            assert!(editor.cursor() <= editor.buffer().chars().count());
        }
        assert_eq!(editor.buffer(), "z");
        assert_eq!(editor.cursor(), 0);
    }

    #[test]
    fn test_history_replay() {
        let mut editor = LineEditor::default();
        type_str(&mut editor, "echo a");
        editor.handle(InputEvent::Enter);
        type_str(&mut editor, "echo b");
        editor.handle(InputEvent::Enter);

        let up = editor.handle(InputEvent::ArrowUp);
        assert_eq!(editor.buffer(), "echo b");
        assert_eq!(editor.cursor(), 6);
        assert_eq!(up, EditorAction::echo("\x1b[Kecho b"));
        assert_eq!(up.message, None);

        editor.handle(InputEvent::ArrowUp);
        assert_eq!(editor.buffer(), "echo a");

        let down = editor.handle(InputEvent::ArrowDown);
        assert_eq!(editor.buffer(), "echo b");
        // Erase the six columns of "echo a" before drawing the entry
        assert_eq!(down.echo, Some(format!("{}\x1b[Kecho b", "\x1b[D".repeat(6))));
    }

    #[test]
    fn test_history_navigation_clamps() {
        let mut editor = LineEditor::default();

        // Not browsing: ArrowDown changes nothing
        type_str(&mut editor, "draft");
        assert_eq!(editor.handle(InputEvent::ArrowDown), EditorAction::none());
        assert_eq!(editor.buffer(), "draft");
        assert_eq!(editor.history().cursor(), None);
        editor.handle(InputEvent::CtrlC);

        type_str(&mut editor, "one");
        editor.handle(InputEvent::Enter);
        type_str(&mut editor, "two");
        editor.handle(InputEvent::Enter);

        for _ in 0..5 {
            editor.handle(InputEvent::ArrowUp);
        }
        assert_eq!(editor.buffer(), "one");
        assert_eq!(editor.history().cursor(), Some(1));

        editor.handle(InputEvent::ArrowDown);
        editor.handle(InputEvent::ArrowDown);
        assert_eq!(editor.buffer(), "");
        assert_eq!(editor.cursor(), 0);
        assert_eq!(editor.history().cursor(), None);
    }

    #[test]
    fn test_history_bound() {
        let mut editor = LineEditor::new(CommandHistory::new(3), false);
        for i in 0..5 {
            type_str(&mut editor, &format!("cmd{}", i));
            editor.handle(InputEvent::Enter);
        }

        assert_eq!(editor.history().len(), 3);
        assert_eq!(editor.history().entries(), &["cmd4", "cmd3", "cmd2"]);
    }

    #[test]
    fn test_forward_history_keys() {
        let mut editor = LineEditor::new(CommandHistory::new(10), true);
        type_str(&mut editor, "pwd");
        editor.handle(InputEvent::Enter);

        let up = editor.handle(InputEvent::ArrowUp);
        assert_eq!(up.message, Some(OutboundMessage::special("up_arrow")));
        assert_eq!(editor.buffer(), "pwd");

        let down = editor.handle(InputEvent::ArrowDown);
        assert_eq!(down.message, Some(OutboundMessage::special("down_arrow")));
        assert_eq!(editor.buffer(), "");
    }

    #[test]
    fn test_other_control_passthrough() {
        let mut editor = LineEditor::default();
        type_str(&mut editor, "vi");

        let action = editor.handle(InputEvent::OtherControl(b"\x1b[H".to_vec()));
        assert_eq!(
            action,
            EditorAction::send(OutboundMessage::RawControl { bytes: b"\x1b[H".to_vec() })
        );
        assert_eq!(editor.buffer(), "vi");
    }
}
