use super::markers::Markers;

/// A change of the outermost block boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Depth went from 0 to 1.
    EnterBlock,
    /// Depth went from 1 to 0.
    ExitBlock,
}

/// A transition together with where it happened in the visible output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionEvent {
    /// What happened.
    pub transition: Transition,
    /// Byte offset into the accompanying visible text at which it happened.
    pub offset: usize,
}

/// Result of scanning one buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Scan {
    /// Text outside any block, safe to display.
    pub visible: String,
    /// Unresolved tail that may be the start of a marker.
    pub remaining: String,
    /// Net change in nesting depth.
    pub depth_delta: isize,
    /// Outermost transitions, in stream order.
    pub events: Vec<TransitionEvent>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MarkerKind {
    Open,
    Close,
}

/// Incremental classifier separating visible text from marked blocks.
///
/// The scanner holds no state of its own; callers carry `remaining` and the
/// depth from one call to the next.
#[derive(Clone, Debug, Default)]
pub struct MarkerScanner {
    markers: Markers,
}

impl MarkerScanner {
    /// Creates a scanner for the given marker pair.
    pub fn new(markers: Markers) -> Self {
        Self { markers }
    }

    /// The marker pair this scanner matches.
    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    /// Scans `buffer` (carried tail plus new chunk) starting at nesting `depth`.
    pub fn scan(&self, buffer: &str, depth: usize) -> Scan {
        let mut visible = String::new();
        let mut events = Vec::new();
        let mut current = depth;
        let mut matches = self.matches(buffer);
        let mut pos = 0;
        while let Some((start, kind)) = matches.next() {
            if current == 0 {
                visible.push_str(&buffer[pos..start]);
            }
            match kind {
                MarkerKind::Open => {
                    current += 1;
                    if current == 1 {
                        events.push(TransitionEvent {
                            transition: Transition::EnterBlock,
                            offset: visible.len(),
                        });
                    }
                }
                MarkerKind::Close if current > 0 => {
                    current -= 1;
                    if current == 0 {
                        events.push(TransitionEvent {
                            transition: Transition::ExitBlock,
                            offset: visible.len(),
                        });
                    }
                }
                // A close with nothing open is swallowed.
                MarkerKind::Close => {}
            }
            pos = matches.position();
        }
        let held = self.held_tail_start(buffer, pos);
        if current == 0 {
            visible.push_str(&buffer[pos..held]);
        }
        Scan {
            visible,
            remaining: buffer[held..].to_string(),
            depth_delta: current as isize - depth as isize,
            events,
        }
    }

    pub(crate) fn matches<'a>(&'a self, text: &'a str) -> MarkerMatches<'a> {
        MarkerMatches {
            text,
            markers: &self.markers,
            pos: 0,
            next_open: None,
            next_close: None,
        }
    }

    /// Start of the longest suffix of `text[from..]` that is a proper prefix
    /// of either marker, or `text.len()` if there is none.
    fn held_tail_start(&self, text: &str, from: usize) -> usize {
        let window = self.markers.carry_window();
        let start = from.max(text.len().saturating_sub(window));
        (start..text.len())
            .filter(|&idx| text.is_char_boundary(idx))
            .find(|&idx| {
                let tail = &text.as_bytes()[idx..];
                is_partial_prefix(tail, self.markers.open().as_bytes())
                    || is_partial_prefix(tail, self.markers.close().as_bytes())
            })
            .unwrap_or(text.len())
    }
}

/// Iterator over complete, non-overlapping marker matches, leftmost first.
pub(crate) struct MarkerMatches<'a> {
    text: &'a str,
    markers: &'a Markers,
    pos: usize,
    next_open: Option<Option<usize>>,
    next_close: Option<Option<usize>>,
}

impl MarkerMatches<'_> {
    /// Byte offset just past the last match returned.
    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    fn refresh(cached: &mut Option<Option<usize>>, text: &str, needle: &str, pos: usize) -> Option<usize> {
        match *cached {
            Some(Some(idx)) if idx >= pos => Some(idx),
            Some(None) => None,
            _ => {
                let found = find_ignore_ascii_case(text, needle, pos);
                *cached = Some(found);
                found
            }
        }
    }
}

impl Iterator for MarkerMatches<'_> {
    type Item = (usize, MarkerKind);

    fn next(&mut self) -> Option<Self::Item> {
        let open = Self::refresh(&mut self.next_open, self.text, self.markers.open(), self.pos);
        let close = Self::refresh(&mut self.next_close, self.text, self.markers.close(), self.pos);
        let (start, kind) = match (open, close) {
            (None, None) => return None,
            (Some(o), None) => (o, MarkerKind::Open),
            (None, Some(c)) => (c, MarkerKind::Close),
            // Neither marker is a prefix of the other, so they never share a start.
            (Some(o), Some(c)) if o <= c => (o, MarkerKind::Open),
            (Some(_), Some(c)) => (c, MarkerKind::Close),
        };
        let len = match kind {
            MarkerKind::Open => self.markers.open().len(),
            MarkerKind::Close => self.markers.close().len(),
        };
        self.pos = start + len;
        Some((start, kind))
    }
}

fn find_ignore_ascii_case(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let hay = haystack.as_bytes();
    let needle = needle.as_bytes();
    if from > hay.len() || hay.len() - from < needle.len() {
        return None;
    }
    hay[from..]
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
        .map(|idx| idx + from)
}

fn is_partial_prefix(tail: &[u8], marker: &[u8]) -> bool {
    tail.len() < marker.len() && marker[..tail.len()].eq_ignore_ascii_case(tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> MarkerScanner {
        MarkerScanner::default()
    }

    #[test]
    fn plain_text_passes_through() {
        let scan = scanner().scan("hello world", 0);
        assert_eq!(scan.visible, "hello world");
        assert_eq!(scan.remaining, "");
        assert_eq!(scan.depth_delta, 0);
        assert!(scan.events.is_empty());
    }

    #[test]
    fn complete_block_is_removed() {
        let scan = scanner().scan("a<think>b</think>c", 0);
        assert_eq!(scan.visible, "ac");
        assert_eq!(scan.depth_delta, 0);
        assert_eq!(
            scan.events,
            vec![
                TransitionEvent {
                    transition: Transition::EnterBlock,
                    offset: 1
                },
                TransitionEvent {
                    transition: Transition::ExitBlock,
                    offset: 1
                },
            ]
        );
    }

    #[test]
    fn matching_ignores_ascii_case() {
        let scan = scanner().scan("x<THINK>y</Think>z", 0);
        assert_eq!(scan.visible, "xz");
        assert_eq!(scan.events.len(), 2);
    }

    #[test]
    fn partial_open_marker_is_held() {
        let scan = scanner().scan("ab<thi", 0);
        assert_eq!(scan.visible, "ab");
        assert_eq!(scan.remaining, "<thi");
    }

    #[test]
    fn partial_close_marker_is_held_inside_block() {
        let scan = scanner().scan("<think>secret</thi", 0);
        assert_eq!(scan.visible, "");
        assert_eq!(scan.remaining, "</thi");
        assert_eq!(scan.depth_delta, 1);
    }

    #[test]
    fn lone_angle_bracket_is_held() {
        let scan = scanner().scan("a < b <", 0);
        assert_eq!(scan.visible, "a < b ");
        assert_eq!(scan.remaining, "<");
    }

    #[test]
    fn non_prefix_tail_is_released() {
        let scan = scanner().scan("x <tag>", 0);
        assert_eq!(scan.visible, "x <tag>");
        assert_eq!(scan.remaining, "");
    }

    #[test]
    fn hidden_content_is_not_held() {
        let scan = scanner().scan("<think>a very long piece of reasoning", 0);
        assert_eq!(scan.visible, "");
        assert_eq!(scan.remaining, "");
        assert_eq!(scan.depth_delta, 1);
    }

    #[test]
    fn nested_blocks_emit_only_outer_transitions() {
        let scan = scanner().scan("<think><think>X</think>Y</think>Z", 0);
        assert_eq!(scan.visible, "Z");
        assert_eq!(scan.depth_delta, 0);
        let transitions: Vec<_> = scan.events.iter().map(|e| e.transition).collect();
        assert_eq!(
            transitions,
            vec![Transition::EnterBlock, Transition::ExitBlock]
        );
    }

    #[test]
    fn continues_from_given_depth() {
        let scan = scanner().scan("still hidden</think>shown", 2);
        assert_eq!(scan.visible, "");
        assert_eq!(scan.depth_delta, -1);
        assert!(scan.events.is_empty());

        let scan = scanner().scan("hidden</think>shown", 1);
        assert_eq!(scan.visible, "shown");
        assert_eq!(scan.depth_delta, -1);
        assert_eq!(scan.events[0].transition, Transition::ExitBlock);
        assert_eq!(scan.events[0].offset, 0);
    }

    #[test]
    fn stray_close_is_dropped() {
        let scan = scanner().scan("a</think>b", 0);
        assert_eq!(scan.visible, "ab");
        assert_eq!(scan.depth_delta, 0);
        assert!(scan.events.is_empty());
    }

    #[test]
    fn multibyte_text_near_tail() {
        let scan = scanner().scan("héllo wörld ✓", 0);
        assert_eq!(scan.visible, "héllo wörld ✓");
        assert_eq!(scan.remaining, "");
    }

    #[test]
    fn custom_markers_with_long_prefix() {
        let markers = Markers::new("<reasoning>", "</reasoning>").unwrap();
        let scanner = MarkerScanner::new(markers);
        let scan = scanner.scan("answer <reasonin", 0);
        assert_eq!(scan.visible, "answer ");
        assert_eq!(scan.remaining, "<reasonin");
    }

    #[test]
    fn event_offsets_interleave_with_text() {
        let scan = scanner().scan("one<think>x</think>two<think>y", 0);
        assert_eq!(scan.visible, "onetwo");
        let offsets: Vec<_> = scan.events.iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![3, 3, 6]);
        assert_eq!(scan.depth_delta, 1);
    }
}
