//! Input abstraction shared by both matchers.
//!
//! The matchers never index into the subject directly. They read it through
//! [`StrSource`], which only has to answer three questions: what is the next
//! symbol, go back to an earlier position, and are two windows equal. Any
//! storage able to do that (a contiguous buffer, a rope, a decoder) can be
//! searched without touching the matching code.

/// The capability triple the matchers need from an input.
///
/// Positions are measured in whatever unit the source reports through
/// `next_char`; match offsets come back in the same unit.
pub trait StrSource {
    /// Reads the symbol at the current position and advances past it,
    /// returning the symbol and the number of position units it occupies.
    /// `None` at the end of input.
    fn next_char(&mut self) -> Option<(char, usize)>;

    /// Moves the read position back (or forward) to `pos`, which must be a
    /// position previously observed through `next_char`.
    fn rewind(&mut self, pos: usize);

    /// True when the `len` units starting at `a` equal those starting at
    /// `b`. Windows reaching past the end of input compare unequal.
    fn compare(&self, a: usize, b: usize, len: usize) -> bool;
}

/// UTF-8 text; positions are byte offsets.
#[derive(Debug, Clone)]
pub struct StrInput<'t> {
    text: &'t str,
    pos: usize,
}

impl<'t> StrInput<'t> {
    pub fn new(text: &'t str) -> StrInput<'t> {
        StrInput { text, pos: 0 }
    }
}

impl<'t> StrSource for StrInput<'t> {
    fn next_char(&mut self) -> Option<(char, usize)> {
        let ch = self.text.get(self.pos..)?.chars().next()?;
        let width = ch.len_utf8();
        self.pos += width;
        Some((ch, width))
    }

    fn rewind(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn compare(&self, a: usize, b: usize, len: usize) -> bool {
        let bytes = self.text.as_bytes();
        match (window(bytes, a, len), window(bytes, b, len)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }
}

/// Wide characters; positions are character indices.
#[derive(Debug, Clone)]
pub struct CharInput<'t> {
    text: &'t [char],
    pos: usize,
}

impl<'t> CharInput<'t> {
    pub fn new(text: &'t [char]) -> CharInput<'t> {
        CharInput { text, pos: 0 }
    }
}

impl<'t> StrSource for CharInput<'t> {
    fn next_char(&mut self) -> Option<(char, usize)> {
        let ch = *self.text.get(self.pos)?;
        self.pos += 1;
        Some((ch, 1))
    }

    fn rewind(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn compare(&self, a: usize, b: usize, len: usize) -> bool {
        match (window(self.text, a, len), window(self.text, b, len)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }
}

/// Raw bytes, each byte one symbol (read as the code point of equal value).
#[derive(Debug, Clone)]
pub struct ByteInput<'t> {
    text: &'t [u8],
    pos: usize,
}

impl<'t> ByteInput<'t> {
    pub fn new(text: &'t [u8]) -> ByteInput<'t> {
        ByteInput { text, pos: 0 }
    }
}

impl<'t> StrSource for ByteInput<'t> {
    fn next_char(&mut self) -> Option<(char, usize)> {
        let byte = *self.text.get(self.pos)?;
        self.pos += 1;
        Some((char::from(byte), 1))
    }

    fn rewind(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn compare(&self, a: usize, b: usize, len: usize) -> bool {
        match (window(self.text, a, len), window(self.text, b, len)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }
}

fn window<T>(text: &[T], start: usize, len: usize) -> Option<&[T]> {
    text.get(start..start.checked_add(len)?)
}

/// Read head over a source with one symbol of lookahead.
///
/// Assertions need the symbol on each side of the current position, so the
/// cursor always remembers the previous symbol and has already fetched the
/// next one.
pub(crate) struct Cursor<'s, S: StrSource + ?Sized> {
    source: &'s mut S,
    pos: usize,
    prev: Option<char>,
    next: Option<(char, usize)>,
}

impl<'s, S: StrSource + ?Sized> Cursor<'s, S> {
    pub(crate) fn new(source: &'s mut S, pos: usize, prev: Option<char>) -> Cursor<'s, S> {
        source.rewind(pos);
        let next = source.next_char();
        Cursor { source, pos, prev, next }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn prev(&self) -> Option<char> {
        self.prev
    }

    pub(crate) fn peek(&self) -> Option<char> {
        self.next.map(|(ch, _)| ch)
    }

    /// Steps over the lookahead symbol. Returns false at end of input.
    pub(crate) fn advance(&mut self) -> bool {
        match self.next {
            Some((ch, width)) => {
                self.pos += width;
                self.prev = Some(ch);
                self.next = self.source.next_char();
                true
            }
            None => false,
        }
    }

    pub(crate) fn seek(&mut self, pos: usize, prev: Option<char>) {
        self.source.rewind(pos);
        self.pos = pos;
        self.prev = prev;
        self.next = self.source.next_char();
    }

    pub(crate) fn compare(&self, a: usize, b: usize, len: usize) -> bool {
        self.source.compare(a, b, len)
    }
}
