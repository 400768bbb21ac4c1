use crate::error::{Error, Result};

/// Default marker opening a thinking block.
pub const DEFAULT_OPEN: &str = "<think>";

/// Default marker closing a thinking block.
pub const DEFAULT_CLOSE: &str = "</think>";

/// The open/close delimiter pair bounding a hidden thinking block.
///
/// Markers are matched ASCII case-insensitively, so `<THINK>` closes with
/// `</Think>` just as well as with `</think>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Markers {
    open: String,
    close: String,
}

impl Markers {
    /// Creates a marker pair.
    ///
    /// Both markers must be non-empty, and neither may be a prefix of the
    /// other (ignoring ASCII case).  Otherwise a chunk ending right after
    /// the shorter marker could not be classified without lookahead.
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Result<Self> {
        let open = open.into();
        let close = close.into();
        if open.is_empty() {
            return Err(Error::validation(
                "open marker must not be empty",
                Some("open".to_string()),
            ));
        }
        if close.is_empty() {
            return Err(Error::validation(
                "close marker must not be empty",
                Some("close".to_string()),
            ));
        }
        if open.eq_ignore_ascii_case(&close) {
            return Err(Error::validation(
                format!("open and close markers must differ (both are {open:?})"),
                Some("close".to_string()),
            ));
        }
        if starts_with_ignore_ascii_case(&open, &close)
            || starts_with_ignore_ascii_case(&close, &open)
        {
            return Err(Error::validation(
                format!("neither marker may be a prefix of the other ({open:?}, {close:?})"),
                Some("close".to_string()),
            ));
        }
        Ok(Self { open, close })
    }

    /// The marker that opens a block.
    pub fn open(&self) -> &str {
        &self.open
    }

    /// The marker that closes a block.
    pub fn close(&self) -> &str {
        &self.close
    }

    /// Number of trailing bytes that may hold an incomplete marker.
    pub fn carry_window(&self) -> usize {
        self.open.len().max(self.close.len()) - 1
    }
}

fn starts_with_ignore_ascii_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len()
        && text.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            open: DEFAULT_OPEN.to_string(),
            close: DEFAULT_CLOSE.to_string(),
        }
    }
}
