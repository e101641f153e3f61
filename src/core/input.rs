//! Raw input decoding
//!
//! Splits the byte stream coming from the display surface into the atomic
//! events the line editor understands.

/// An atomic input event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// A single printable character
    Printable(char),
    Enter,
    Backspace,
    CtrlC,
    CtrlD,
    Tab,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    /// Any other sequence, forwarded untouched
    OtherControl(Vec<u8>),
}

const ESC: u8 = 0x1B;

impl InputEvent {
    /// Classify one atomic sequence.
    ///
    /// Unknown or malformed sequences become `OtherControl` so that nothing
    /// meaningful to the backend is lost.
    pub fn parse(seq: &[u8]) -> InputEvent {
        match seq {
            b"\r" | b"\n" | b"\r\n" => InputEvent::Enter,
            [0x7F] | [0x08] => InputEvent::Backspace,
            [0x03] => InputEvent::CtrlC,
            [0x04] => InputEvent::CtrlD,
            b"\t" => InputEvent::Tab,
            [ESC, b'[' | b'O', b'A'] => InputEvent::ArrowUp,
            [ESC, b'[' | b'O', b'B'] => InputEvent::ArrowDown,
            [ESC, b'[' | b'O', b'C'] => InputEvent::ArrowRight,
            [ESC, b'[' | b'O', b'D'] => InputEvent::ArrowLeft,
            _ => Self::parse_char(seq).unwrap_or_else(|| InputEvent::OtherControl(seq.to_vec())),
        }
    }

    /// A sequence holding exactly one non-control character
    fn parse_char(seq: &[u8]) -> Option<InputEvent> {
        let s = std::str::from_utf8(seq).ok()?;
        let mut chars = s.chars();
        let ch = chars.next()?;
        if chars.next().is_some() || ch.is_control() {
            return None;
        }
        Some(InputEvent::Printable(ch))
    }

    /// Tokenize a chunk that may hold several atomic sequences
    pub fn split(data: &[u8]) -> Vec<InputEvent> {
        let mut events = Vec::new();
        let mut i = 0;

        while i < data.len() {
            let len = sequence_len(&data[i..]);
            events.push(Self::parse(&data[i..i + len]));
            i += len;
        }

        events
    }
}

/// Length of the atomic sequence at the start of `data` (never 0 for
/// non-empty input)
fn sequence_len(data: &[u8]) -> usize {
    let b = data[0];

    match b {
        ESC => escape_len(data),
        b'\r' if data.get(1) == Some(&b'\n') => 2,
        0x00..=0x7F => 1,
        _ => {
            // UTF-8 multi-byte sequence
            let seq_len = if b & 0xE0 == 0xC0 { 2 }
                else if b & 0xF0 == 0xE0 { 3 }
                else if b & 0xF8 == 0xF0 { 4 }
                else { 1 }; // Invalid lead byte

            if seq_len <= data.len() && std::str::from_utf8(&data[..seq_len]).is_ok() {
                seq_len
            } else {
                1
            }
        }
    }
}

/// Length of an escape sequence: CSI (`ESC [ params final`), SS3
/// (`ESC O x`), Alt-prefixed char (`ESC x`) or a lone ESC
fn escape_len(data: &[u8]) -> usize {
    match data.get(1) {
        Some(b'[') => {
            // Parameter and intermediate bytes run until a final byte 0x40..=0x7E
            for (offset, &byte) in data.iter().enumerate().skip(2) {
                if (0x40..=0x7E).contains(&byte) {
                    return offset + 1;
                }
                if !(0x20..=0x3F).contains(&byte) {
                    // Broken sequence, stop before the offending byte
                    return offset;
                }
            }
            data.len()
        }
        // SS3 only with a final byte; otherwise Alt+Shift+O
        Some(b'O') if data.get(2).is_some_and(|b| (0x40..=0x7E).contains(b)) => 3,
        Some(&next) if (0x20..0x7F).contains(&next) => 2,
        _ => 1,
    }
}
