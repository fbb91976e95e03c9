//! Line reassembly over arbitrarily chunked byte reads.
//!
//! ```text
//! chunk ─► [pending tail + chunk] ─► split on EOL ─► complete lines
//!                   ▲                                    │
//!                   └─────── trailing partial line ◄─────┘
//! ```
//!
//! A line ends at `\n`, `\r\n` or a bare `\r`. Splitting happens after
//! concatenation, so a terminator that straddles a chunk boundary is
//! reassembled correctly. A `\r` that ends a chunk is held until the next
//! chunk shows whether a `\n` follows it.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream};

use crate::error::WatchError;
use crate::source::ByteStream;

/// Incremental line splitter.
///
/// Holds at most one partial line between calls to [`push`](Self::push).
#[derive(Debug, Default)]
pub struct LineReassembler {
    pending: Option<BytesMut>,
    /// Prefix of `pending` already searched for a terminator.
    scanned: usize,
}

impl LineReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every line it completes, in order.
    ///
    /// Lines exclude their terminator. Empty lines are returned as empty
    /// `Bytes`. Only the bytes appended since the last call are searched.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        let mut from = std::mem::take(&mut self.scanned);
        let mut buf = match self.pending.take() {
            Some(mut tail) => {
                tail.extend_from_slice(chunk);
                tail
            }
            None => BytesMut::from(chunk),
        };

        let mut lines = Vec::new();
        loop {
            let Some(offset) = buf[from..].iter().position(|&b| b == b'\n' || b == b'\r')
            else {
                from = buf.len();
                break;
            };
            let pos = from + offset;
            let width = match (buf[pos], buf.get(pos + 1).copied()) {
                (b'\r', Some(b'\n')) => 2,
                (b'\r', None) => {
                    from = pos;
                    break;
                }
                _ => 1,
            };
            let mut line = buf.split_to(pos + width);
            line.truncate(pos);
            lines.push(line.freeze());
            from = 0;
        }

        if !buf.is_empty() {
            self.scanned = from;
            self.pending = Some(buf);
        }
        lines
    }

    /// End of input: return the buffered partial line, if non-empty.
    ///
    /// A held `\r` completes its line here, since no `\n` can follow.
    pub fn finish(&mut self) -> Option<Bytes> {
        self.scanned = 0;
        let mut tail = self.pending.take().filter(|tail| !tail.is_empty())?;
        if tail.last() == Some(&b'\r') {
            tail.truncate(tail.len() - 1);
        }
        Some(tail.freeze())
    }

    /// The partial line currently buffered, if any.
    pub fn pending(&self) -> Option<&[u8]> {
        self.pending.as_deref()
    }
}

/// Split a complete chunk sequence into lines (reassembler + final flush).
pub fn split_chunks<I, C>(chunks: I) -> Vec<Bytes>
where
    I: IntoIterator<Item = C>,
    C: AsRef<[u8]>,
{
    let mut reassembler = LineReassembler::new();
    let mut out = Vec::new();
    for chunk in chunks {
        out.extend(reassembler.push(chunk.as_ref()));
    }
    out.extend(reassembler.finish());
    out
}

struct LineState<S> {
    source: S,
    reassembler: LineReassembler,
    ready: VecDeque<Bytes>,
    done: bool,
}

/// Lazy line sequence over a [`ByteStream`].
///
/// Chunks are read only when every previously completed line has been
/// consumed. The sequence ends after a zero-length chunk (flushing any
/// partial tail first). A read error is yielded once and ends the sequence.
pub fn lines<S>(source: S) -> impl Stream<Item = Result<Bytes, WatchError>> + Send
where
    S: ByteStream,
{
    let state = LineState {
        source,
        reassembler: LineReassembler::new(),
        ready: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(line) = st.ready.pop_front() {
                return Some((Ok(line), st));
            }
            if st.done {
                return None;
            }
            match st.source.next_chunk().await {
                Ok(chunk) if chunk.is_empty() => {
                    st.done = true;
                    let tail = st.reassembler.finish()?;
                    return Some((Ok(tail), st));
                }
                Ok(chunk) => {
                    let complete = st.reassembler.push(&chunk);
                    st.ready.extend(complete);
                }
                Err(e) => {
                    st.done = true;
                    return Some((Err(e), st));
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ChunkStream;
    use futures::StreamExt;
    use proptest::prelude::*;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn partial_line_carried_across_chunks() {
        let mut r = LineReassembler::new();
        assert_eq!(r.push(b"{\"a\":1}\n{\"b\""), vec![b("{\"a\":1}")]);
        assert_eq!(r.pending(), Some(&b"{\"b\""[..]));
        assert_eq!(r.push(b":2}\n"), vec![b("{\"b\":2}")]);
        assert_eq!(r.pending(), None);
        assert_eq!(r.finish(), None);
    }

    #[test]
    fn lone_terminator_yields_empty_line() {
        let mut r = LineReassembler::new();
        assert_eq!(r.push(b"\n"), vec![Bytes::new()]);
    }

    #[test]
    fn consecutive_terminators_yield_empty_line() {
        assert_eq!(split_chunks(["a\n\nb\n"]), vec![b("a"), b(""), b("b")]);
    }

    #[test]
    fn crlf_split_across_boundary() {
        assert_eq!(split_chunks(["one\r", "\ntwo\r\n"]), vec![b("one"), b("two")]);
    }

    #[test]
    fn bare_carriage_return_ends_line() {
        assert_eq!(
            split_chunks(["{\"a\":1}\r{\"b\":2}\r"]),
            vec![b("{\"a\":1}"), b("{\"b\":2}")]
        );
        assert_eq!(split_chunks(["a\r\rb\n"]), vec![b("a"), b(""), b("b")]);
    }

    #[test]
    fn carriage_return_at_chunk_end_waits_for_next_chunk() {
        let mut r = LineReassembler::new();
        assert!(r.push(b"one\r").is_empty());
        assert_eq!(r.pending(), Some(&b"one\r"[..]));
        assert_eq!(r.push(b"two"), vec![b("one")]);
        assert_eq!(r.pending(), Some(&b"two"[..]));
        assert!(r.push(b"\r").is_empty());
        assert_eq!(r.finish(), Some(b("two")));
    }

    #[test]
    fn long_line_over_many_small_chunks() {
        let body = "x".repeat(10_000);
        let mut r = LineReassembler::new();
        for chunk in body.as_bytes().chunks(7) {
            assert!(r.push(chunk).is_empty());
        }
        assert_eq!(r.push(b"\n"), vec![b(&body)]);
        assert_eq!(r.pending(), None);
    }

    #[test]
    fn trailing_segment_flushed() {
        assert_eq!(split_chunks(["x\ny", "z"]), vec![b("x"), b("yz")]);
    }

    #[test]
    fn no_input_no_lines() {
        assert!(split_chunks(Vec::<&[u8]>::new()).is_empty());
    }

    #[tokio::test]
    async fn stream_flushes_tail_then_ends() {
        let src = ChunkStream::new(vec![b("a\nb"), b("c")]);
        let got: Vec<Bytes> = lines(src).map(|l| l.unwrap()).collect().await;
        assert_eq!(got, vec![b("a"), b("bc")]);
    }

    struct FailingStream {
        sent: bool,
    }

    #[async_trait::async_trait]
    impl ByteStream for FailingStream {
        async fn next_chunk(&mut self) -> Result<Bytes, WatchError> {
            if self.sent {
                return Err(WatchError::Http("connection reset".into()));
            }
            self.sent = true;
            Ok(b("ok\npartial"))
        }
    }

    #[tokio::test]
    async fn stream_error_yielded_once() {
        let items: Vec<_> = lines(FailingStream { sent: false }).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &b("ok"));
        assert!(matches!(items[1], Err(WatchError::Http(_))));
    }

    fn partition(input: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
        let mut points: Vec<usize> = cuts.iter().map(|c| c % (input.len() + 1)).collect();
        points.sort_unstable();
        points.dedup();
        let mut chunks = Vec::new();
        let mut start = 0;
        for p in points {
            chunks.push(input[start..p].to_vec());
            start = p;
        }
        chunks.push(input[start..].to_vec());
        chunks.retain(|c| !c.is_empty());
        chunks
    }

    proptest! {
        #[test]
        fn chunk_boundaries_do_not_change_lines(
            input in proptest::collection::vec(
                prop_oneof![Just(b'\n'), Just(b'\r'), Just(b'{'), Just(b'}'), b'a'..=b'z'],
                0..200,
            ),
            cuts in proptest::collection::vec(0usize..256, 0..16),
        ) {
            let whole = split_chunks([&input]);
            let chunked = split_chunks(partition(&input, &cuts));
            prop_assert_eq!(whole, chunked);
        }

        #[test]
        fn emits_terminated_lines_plus_tail(
            lines_in in proptest::collection::vec("[a-z{}:\" ]{0,12}", 0..10),
            tail in "[a-z]{0,6}",
            cuts in proptest::collection::vec(0usize..256, 0..8),
        ) {
            let mut input = String::new();
            for l in &lines_in {
                input.push_str(l);
                input.push('\n');
            }
            input.push_str(&tail);

            let mut expected: Vec<Bytes> = lines_in.iter().map(|l| b(l)).collect();
            if !tail.is_empty() {
                expected.push(b(&tail));
            }
            prop_assert_eq!(split_chunks(partition(input.as_bytes(), &cuts)), expected);
        }

        #[test]
        fn mixed_terminators_split_like_whole_input(
            lines_in in proptest::collection::vec(
                ("[a-z{}:\" ]{1,12}", prop_oneof![Just("\n"), Just("\r"), Just("\r\n")]),
                0..10,
            ),
            cuts in proptest::collection::vec(0usize..256, 0..8),
        ) {
            let mut input = String::new();
            for (line, eol) in &lines_in {
                input.push_str(line);
                input.push_str(eol);
            }

            let expected: Vec<Bytes> = lines_in.iter().map(|(l, _)| b(l)).collect();
            prop_assert_eq!(split_chunks(partition(input.as_bytes(), &cuts)), expected);
        }
    }
}
