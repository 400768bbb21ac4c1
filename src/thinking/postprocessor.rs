use super::markers::Markers;
use super::scanner::{MarkerScanner, Transition, TransitionEvent};

/// Output of one `process_chunk` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessedChunk {
    /// Text to display.
    pub visible: String,
    /// Outermost transitions, with offsets into `visible`.
    pub events: Vec<TransitionEvent>,
}

/// A piece of a processed chunk in stream order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Visible text.
    Text(&'a str),
    /// A block boundary.
    Transition(Transition),
}

impl ProcessedChunk {
    fn passthrough(chunk: &str) -> Self {
        Self {
            visible: chunk.to_string(),
            events: Vec::new(),
        }
    }

    /// Splits the chunk into text and transitions in the order they occurred.
    pub fn segments(&self) -> Vec<Segment<'_>> {
        let mut segments = Vec::with_capacity(self.events.len() * 2 + 1);
        let mut cursor = 0;
        for event in &self.events {
            if event.offset > cursor {
                segments.push(Segment::Text(&self.visible[cursor..event.offset]));
                cursor = event.offset;
            }
            segments.push(Segment::Transition(event.transition));
        }
        if cursor < self.visible.len() {
            segments.push(Segment::Text(&self.visible[cursor..]));
        }
        segments
    }

    /// The transitions without their offsets.
    pub fn transitions(&self) -> impl Iterator<Item = Transition> + '_ {
        self.events.iter().map(|event| event.transition)
    }
}

#[derive(Debug, Default)]
struct ScanState {
    carry: String,
    depth: usize,
}

/// Chunk-in, chunk-out filter that hides thinking blocks from a token stream.
///
/// Chunks may split markers anywhere; the postprocessor holds back only as
/// much text as could still turn out to be a marker.
#[derive(Debug)]
pub struct StreamPostprocessor {
    scanner: MarkerScanner,
    remove_thinking: bool,
    state: ScanState,
}

impl StreamPostprocessor {
    /// Creates a postprocessor.  With `remove_thinking` false every chunk is
    /// passed through untouched, markers included.
    pub fn new(markers: Markers, remove_thinking: bool) -> Self {
        Self {
            scanner: MarkerScanner::new(markers),
            remove_thinking,
            state: ScanState::default(),
        }
    }

    /// Whether thinking blocks are being removed.
    pub fn removes_thinking(&self) -> bool {
        self.remove_thinking
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.state.depth
    }

    /// True while inside a thinking block.
    pub fn in_block(&self) -> bool {
        self.state.depth > 0
    }

    /// Feeds one raw chunk.
    pub fn process_chunk(&mut self, chunk: &str) -> ProcessedChunk {
        if !self.remove_thinking {
            return ProcessedChunk::passthrough(chunk);
        }
        if chunk.is_empty() {
            return ProcessedChunk::default();
        }
        let mut buffer = std::mem::take(&mut self.state.carry);
        buffer.push_str(chunk);
        let scan = self.scanner.scan(&buffer, self.state.depth);
        self.state.depth = self.state.depth.saturating_add_signed(scan.depth_delta);
        self.state.carry = scan.remaining;
        ProcessedChunk {
            visible: scan.visible,
            events: scan.events,
        }
    }

    /// Ends the stream, returning held-back text that never became a marker.
    ///
    /// An unterminated block is dropped along with everything after its
    /// opening marker.  The postprocessor is reset afterwards.
    pub fn finalize(&mut self) -> String {
        let tail = if self.state.depth == 0 {
            std::mem::take(&mut self.state.carry)
        } else {
            String::new()
        };
        self.reset();
        tail
    }

    /// Clears all state so the instance can serve another stream.
    pub fn reset(&mut self) {
        self.state = ScanState::default();
    }
}

impl Default for StreamPostprocessor {
    fn default() -> Self {
        Self::new(Markers::default(), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(chunks: &[&str]) -> (String, Vec<Transition>) {
        run_with(Markers::default(), chunks)
    }

    fn run_with(markers: Markers, chunks: &[&str]) -> (String, Vec<Transition>) {
        let mut pp = StreamPostprocessor::new(markers, true);
        let mut visible = String::new();
        let mut transitions = Vec::new();
        for chunk in chunks {
            let processed = pp.process_chunk(chunk);
            visible.push_str(&processed.visible);
            transitions.extend(processed.transitions());
        }
        visible.push_str(&pp.finalize());
        (visible, transitions)
    }

    /// Every way of cutting `input` into two or three pieces.
    fn chunkings(input: &str) -> Vec<Vec<&str>> {
        let bounds: Vec<usize> = (0..=input.len())
            .filter(|&i| input.is_char_boundary(i))
            .collect();
        let mut out = Vec::new();
        for &a in &bounds {
            for &b in bounds.iter().filter(|&&b| b >= a) {
                out.push(vec![&input[..a], &input[a..b], &input[b..]]);
            }
        }
        out
    }

    #[test]
    fn example_split_across_chunks() {
        let (visible, transitions) = run(&["Hello ", "<thi", "nk>reasoning...", "</think> world"]);
        assert_eq!(visible, "Hello  world");
        assert_eq!(
            transitions,
            vec![Transition::EnterBlock, Transition::ExitBlock]
        );
    }

    #[test]
    fn chunk_boundary_invariance() {
        let inputs = [
            "ab<think>X</think>cd",
            "<think><think>X</think>Y</think>Z",
            "a<b<think>c</think>d</",
            "x</think>y<THINK>z",
            "héllo <think>wörld</think> ✓",
        ];
        for input in inputs {
            let (expected, expected_transitions) = run(&[input]);
            for chunks in chunkings(input) {
                let (visible, transitions) = run(&chunks);
                assert_eq!(visible, expected, "chunks {chunks:?}");
                assert_eq!(transitions, expected_transitions, "chunks {chunks:?}");
            }
        }
    }

    #[test]
    fn chunk_boundary_invariance_with_custom_markers() {
        let pairs = [("[[", "]]"), ("<reasoning>", "</r>"), ("{", "}")];
        let inputs = ["a[[x]]b", "a<reasoning>x</r>b", "a{x}b{y", "a[[[[x]]]]b]]c"];
        for (open, close) in pairs {
            let markers = Markers::new(open, close).unwrap();
            for input in inputs {
                let (expected, expected_transitions) = run_with(markers.clone(), &[input]);
                for chunks in chunkings(input) {
                    let (visible, transitions) = run_with(markers.clone(), &chunks);
                    assert_eq!(visible, expected, "{open} {close} chunks {chunks:?}");
                    assert_eq!(transitions, expected_transitions, "chunks {chunks:?}");
                }
            }
        }
        let markers = Markers::new("[[", "]]").unwrap();
        assert_eq!(run_with(markers.clone(), &["a[", "[x]", "]b"]).0, "ab");
        assert_eq!(run_with(markers, &["a[[[[x]]]]b]]c"]).0, "abc");
    }

    #[test]
    fn two_documented_chunkings_agree() {
        assert_eq!(run(&["ab<thi", "nk>X</think>cd"]).0, "abcd");
        assert_eq!(run(&["a", "b<think>X</", "think>cd"]).0, "abcd");
    }

    #[test]
    fn no_marker_leaks_for_any_chunking() {
        let input = "pre<think>one<think>two</think></think>mid</think>post<think>tail";
        for chunks in chunkings(input) {
            let (visible, _) = run(&chunks);
            let lower = visible.to_ascii_lowercase();
            assert!(!lower.contains("<think>"), "{visible:?}");
            assert!(!lower.contains("</think>"), "{visible:?}");
        }
    }

    #[test]
    fn nested_blocks() {
        assert_eq!(run(&["<think><think>X</think>Y</think>Z"]).0, "Z");
    }

    #[test]
    fn unterminated_block_is_discarded() {
        let (visible, transitions) = run(&["abc<think>hidden ", "forever"]);
        assert_eq!(visible, "abc");
        assert_eq!(transitions, vec![Transition::EnterBlock]);
    }

    #[test]
    fn unterminated_block_with_partial_close_is_discarded() {
        assert_eq!(run(&["abc<think>hidden</thi"]).0, "abc");
    }

    #[test]
    fn finalize_flushes_false_alarm() {
        let mut pp = StreamPostprocessor::default();
        assert_eq!(pp.process_chunk("1 <th").visible, "1 ");
        assert_eq!(pp.finalize(), "<th");
        assert_eq!(pp.depth(), 0);
    }

    #[test]
    fn passthrough_mode() {
        let mut pp = StreamPostprocessor::new(Markers::default(), false);
        for chunk in ["<think>", "raw", "</thi", "nk>", ""] {
            let processed = pp.process_chunk(chunk);
            assert_eq!(processed.visible, chunk);
            assert!(processed.events.is_empty());
        }
        assert_eq!(pp.finalize(), "");
    }

    #[test]
    fn empty_chunks_are_noops() {
        let mut pp = StreamPostprocessor::default();
        pp.process_chunk("<thi");
        assert_eq!(pp.process_chunk(""), ProcessedChunk::default());
        let processed = pp.process_chunk("nk>x");
        assert_eq!(processed.visible, "");
        assert!(pp.in_block());
    }

    #[test]
    fn reset_clears_state() {
        let mut pp = StreamPostprocessor::default();
        pp.process_chunk("<think>abc</th");
        assert!(pp.in_block());
        pp.reset();
        assert!(!pp.in_block());
        assert_eq!(pp.process_chunk("ink>visible").visible, "ink>visible");
    }

    #[test]
    fn segments_follow_stream_order() {
        let mut pp = StreamPostprocessor::default();
        let processed = pp.process_chunk("a<think>b</think>c<think>d");
        assert_eq!(
            processed.segments(),
            vec![
                Segment::Text("a"),
                Segment::Transition(Transition::EnterBlock),
                Segment::Transition(Transition::ExitBlock),
                Segment::Text("c"),
                Segment::Transition(Transition::EnterBlock),
            ]
        );
    }
}
