//! Command history for termlink
//!
//! Session-scoped storage of submitted command lines with up/down browsing.

/// Default maximum number of history entries
pub const HISTORY_LIMIT: usize = 100;

/// Bounded command history, newest first
#[derive(Debug, Clone)]
pub struct CommandHistory {
    /// Submitted commands (index 0 is the most recent)
    entries: Vec<String>,
    /// Browse position, `None` while editing the live line
    cursor: Option<usize>,
    /// Maximum entries
    max_entries: usize,
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new(HISTORY_LIMIT)
    }
}

impl CommandHistory {
    /// Create an empty history holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: None,
            max_entries: capacity.max(1),
        }
    }

    /// Add a submitted command to the front
    pub fn push(&mut self, command: String) {
        self.cursor = None;

        if command.is_empty() {
            return;
        }

        self.entries.insert(0, command);

        // Trim if exceeding limit
        self.entries.truncate(self.max_entries);
    }

    /// Step towards older entries (ArrowUp).
    ///
    /// Returns the newly selected entry, or `None` when already at the
    /// oldest entry or the history is empty.
    pub fn older(&mut self) -> Option<&str> {
        let next = match self.cursor {
            None => 0,
            Some(i) => i + 1,
        };
        if next >= self.entries.len() {
            return None;
        }
        self.cursor = Some(next);
        self.entries.get(next).map(String::as_str)
    }

    /// Step towards newer entries (ArrowDown).
    ///
    /// `None` means nothing changed (not browsing). `Some(None)` means
    /// browsing ended and the live line is empty again.
    pub fn newer(&mut self) -> Option<Option<&str>> {
        match self.cursor {
            None => None,
            Some(0) => {
                self.cursor = None;
                Some(None)
            }
            Some(i) => {
                self.cursor = Some(i - 1);
                Some(self.entries.get(i - 1).map(String::as_str))
            }
        }
    }

    /// Stop browsing
    pub fn reset_cursor(&mut self) {
        self.cursor = None;
    }

    /// Current browse position
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Entry by position (0 = most recent)
    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(String::as_str)
    }

    /// All entries, newest first
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
