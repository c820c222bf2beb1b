//! Sliding region windows over a token stream.
//!
//! Each window flattens `W` consecutive normalized lines and counts token
//! occurrences. Counts are updated incrementally as the window slides, so a
//! step costs the tokens of the entering and leaving lines only.

use std::collections::HashMap;

use crate::core::{normalize::NormalizedLine, segment::TokenStream};

/// Token → occurrences across all lines of one window (zero counts never stored)
pub type FrequencyCount = HashMap<String, u32>;

/// One region window and its counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window
{
    /// Start offset within the stream
    pub offset: usize,
    pub counts: FrequencyCount,
}

/// Lazy window sequence over offsets `0 .. len - width` (exclusive)
#[derive(Debug, Clone)]
pub struct Windows<'a>
{
    lines: &'a [NormalizedLine],
    width: usize,
    next: usize,
    end: usize,
    counts: FrequencyCount,
}

/// Start a fresh pass over `stream`. Calling again restarts from offset 0.
pub fn windows(
    stream: &TokenStream,
    width: usize,
) -> Windows<'_>
{
    let end = if width == 0 { 0 } else { stream.len().saturating_sub(width) };

    Windows { lines: &stream.lines, width, next: 0, end, counts: FrequencyCount::new() }
}

/// Offset-0 window used for queries; `None` when the stream is shorter than `width`
pub fn first_window(
    stream: &TokenStream,
    width: usize,
) -> Option<Window>
{
    if width == 0 || stream.len() < width
    {
        return None;
    }

    let mut counts = FrequencyCount::new();
    for line in &stream.lines[..width]
    {
        add_line(&mut counts, line);
    }

    Some(Window { offset: 0, counts })
}

impl Iterator for Windows<'_>
{
    type Item = Window;

    fn next(&mut self) -> Option<Window>
    {
        if self.next >= self.end
        {
            return None;
        }

        if self.next == 0
        {
            for line in &self.lines[..self.width]
            {
                add_line(&mut self.counts, line);
            }
        }
        else
        {
            remove_line(&mut self.counts, &self.lines[self.next - 1]);
            add_line(&mut self.counts, &self.lines[self.next + self.width - 1]);
        }

        let window = Window { offset: self.next, counts: self.counts.clone() };
        self.next += 1;

        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>)
    {
        let left = self
            .end
            .saturating_sub(self.next);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Windows<'_> {}

fn add_line(
    counts: &mut FrequencyCount,
    line: &NormalizedLine,
)
{
    for tok in &line.tokens
    {
        *counts
            .entry(tok.clone())
            .or_insert(0) += 1;
    }
}

fn remove_line(
    counts: &mut FrequencyCount,
    line: &NormalizedLine,
)
{
    for tok in &line.tokens
    {
        if let Some(c) = counts.get_mut(tok)
        {
            *c -= 1;
            if *c == 0
            {
                counts.remove(tok);
            }
        }
    }
}

#[cfg(test)]
mod tests
{
    use std::path::PathBuf;

    use super::*;
    use crate::core::segment::StreamId;

    fn stream(lines: &[&[&str]]) -> TokenStream
    {
        TokenStream {
            id: StreamId { source: PathBuf::from("s"), function: None, start_line: 0 },
            lines: lines
                .iter()
                .enumerate()
                .map(|(i, toks)| NormalizedLine {
                    line: i,
                    tokens: toks
                        .iter()
                        .map(|t| t.to_string())
                        .collect(),
                })
                .collect(),
        }
    }

    /// Recount a window from scratch
    fn direct(
        s: &TokenStream,
        offset: usize,
        width: usize,
    ) -> FrequencyCount
    {
        let mut c = FrequencyCount::new();
        for line in &s.lines[offset..offset + width]
        {
            add_line(&mut c, line);
        }
        c
    }

    #[test]
    fn shorter_than_window_is_empty()
    {
        let s = stream(&[&["mov"], &["add"]]);
        assert_eq!(windows(&s, 3).count(), 0);
        assert_eq!(first_window(&s, 3), None);
    }

    #[test]
    fn offsets_stop_before_last_full_window()
    {
        let s = stream(&[&["a"], &["b"], &["c"], &["d"], &["e"]]);
        let offsets: Vec<usize> = windows(&s, 2)
            .map(|w| w.offset)
            .collect();
        assert_eq!(offsets, vec![0, 1, 2]);

        // A stream exactly one window long yields no sliding windows
        assert_eq!(windows(&stream(&[&["a"], &["b"]]), 2).count(), 0);
    }

    #[test]
    fn counts_flatten_lines()
    {
        let s = stream(&[&["mov", "REGSEG", "REGSEG"], &["mov", "REGSEG", "MEM"], &["ret"], &["nop"]]);
        let w = windows(&s, 2)
            .next()
            .unwrap();

        assert_eq!(w.counts["mov"], 2);
        assert_eq!(w.counts["REGSEG"], 3);
        assert_eq!(w.counts["MEM"], 1);
        assert!(!w.counts.contains_key("ret"));
    }

    #[test]
    fn incremental_counts_match_direct_recount()
    {
        let s = stream(&[
            &["push", "REGSEG"],
            &["mov", "REGSEG", "REGSEG"],
            &["sub", "REGSEG", "byte"],
            &["mov", "MEM", "REGSEG"],
            &["call", "VAL"],
            &["leave"],
            &["ret"],
        ]);

        for w in windows(&s, 3)
        {
            assert_eq!(w.counts, direct(&s, w.offset, 3), "offset {}", w.offset);
        }
    }

    #[test]
    fn restartable_and_sized()
    {
        let s = stream(&[&["a"], &["b"], &["a"], &["c"]]);
        let first: Vec<Window> = windows(&s, 2).collect();
        let again: Vec<Window> = windows(&s, 2).collect();

        assert_eq!(first, again);
        assert_eq!(windows(&s, 2).len(), 2);
    }
}
