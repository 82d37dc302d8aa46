//! Exact matching by depth-first search over the automaton.
//!
//! Used for patterns with back-references, which no finite automaton can
//! follow, and whenever the caller asks for it. Choice points live on a
//! [`Stack`] instead of the call stack, so deep or long searches end in
//! [`Error::OutOfSpace`] rather than a crash.
//!
//! Without back-references the search never enters a state twice at the
//! same input position: the first arrival already explored everything
//! reachable from there. This keeps the search polynomial and makes it
//! settle on exactly the paths the parallel matcher keeps, including for
//! loops whose body can match empty.

use crate::error::Error;
use crate::source::{Cursor, StrSource};
use crate::stack::Stack;
use crate::tnfa::{Context, EdgeKind, StateId, Tnfa};

/// Frames the backtracking stack starts with.
pub const BACKTRACK_STACK_INIT: usize = 512;
/// Frames the backtracking stack may grow to.
pub const BACKTRACK_STACK_MAX: usize = 1 << 20;
/// Frames added each time the backtracking stack fills up.
pub const BACKTRACK_STACK_INCR: usize = 1024;

#[derive(Debug, Clone, Copy)]
enum Frame {
    /// Resume at `edge` of `state` with the input at `pos`.
    Retry {
        state: StateId,
        edge: usize,
        pos: usize,
        prev: Option<char>,
    },
    /// Undo a tag write.
    Restore { tag: usize, old: Option<usize> },
}

/// One bit per `(position, state)` pair, grown as the search moves right.
struct Visited {
    origin: usize,
    states: usize,
    bits: Vec<u64>,
}

impl Visited {
    fn new(origin: usize, states: usize) -> Visited {
        Visited { origin, states, bits: Vec::new() }
    }

    /// Marks the pair; false if it was already marked.
    fn insert(&mut self, state: StateId, pos: usize) -> bool {
        let bit = (pos - self.origin) * self.states + state.idx();
        let (word, mask) = (bit / 64, 1u64 << (bit % 64));
        if word >= self.bits.len() {
            let grown = (word + 1).max(2 * self.bits.len());
            self.bits.resize(grown, 0);
        }
        let fresh = self.bits[word] & mask == 0;
        self.bits[word] |= mask;
        fresh
    }
}

struct Backtracker<'t> {
    tnfa: &'t Tnfa,
    ctx: Context,
    frames: Stack<Frame>,
    tags: Vec<Option<usize>>,
    // None when back-references make the outcome depend on tag values
    visited: Option<Visited>,
}

/// Finds the leftmost match at or after `start`, returning its tag values.
pub(crate) fn execute<S: StrSource + ?Sized>(
    tnfa: &Tnfa,
    source: &mut S,
    start: usize,
    prev: Option<char>,
    ctx: Context,
) -> Result<Option<Vec<Option<usize>>>, Error> {
    let visited = if tnfa.has_backrefs {
        None
    } else {
        Some(Visited::new(start, tnfa.states.len()))
    };
    let mut matcher = Backtracker {
        tnfa,
        ctx,
        frames: Stack::new(BACKTRACK_STACK_INIT, BACKTRACK_STACK_MAX, BACKTRACK_STACK_INCR),
        tags: vec![None; tnfa.num_tags],
        visited,
    };
    let mut cursor = Cursor::new(source, start, prev);
    loop {
        let (pos, prev) = (cursor.pos(), cursor.prev());
        if matcher.attempt(&mut cursor)? {
            return Ok(Some(matcher.tags));
        }
        cursor.seek(pos, prev);
        if !cursor.advance() {
            return Ok(None);
        }
    }
}

impl<'t> Backtracker<'t> {
    /*
     - attempt - search for a match starting exactly at the cursor
     */
    fn attempt<S: StrSource + ?Sized>(
        &mut self,
        cursor: &mut Cursor<'_, S>,
    ) -> Result<bool, Error> {
        self.frames.clear();
        self.tags.iter_mut().for_each(|tag| *tag = None);
        let tnfa = self.tnfa;
        let mut state = tnfa.start;
        let mut edge = 0;
        loop {
            if state == tnfa.accept {
                return Ok(true);
            }
            let edges = &tnfa.state(state).edges;
            let seen = edge == 0 && !self.first_arrival(state, cursor.pos());
            if seen || edge >= edges.len() {
                match self.backtrack(cursor) {
                    Some((s, e)) => {
                        state = s;
                        edge = e;
                        continue;
                    }
                    None => return Ok(false),
                }
            }
            if edge + 1 < edges.len() {
                self.frames.push(Frame::Retry {
                    state,
                    edge: edge + 1,
                    pos: cursor.pos(),
                    prev: cursor.prev(),
                })?;
            }
            let current = &edges[edge];
            if self.follow(&current.kind, cursor)? {
                state = current.to;
                edge = 0;
            } else {
                // dead end; the retry frame (if any) picks up the next edge
                edge = edges.len();
            }
        }
    }

    fn first_arrival(&mut self, state: StateId, pos: usize) -> bool {
        match &mut self.visited {
            Some(visited) => visited.insert(state, pos),
            None => true,
        }
    }

    fn follow<S: StrSource + ?Sized>(
        &mut self,
        kind: &EdgeKind,
        cursor: &mut Cursor<'_, S>,
    ) -> Result<bool, Error> {
        match kind {
            EdgeKind::Consume(class) => match cursor.peek() {
                Some(ch) if self.tnfa.class(*class).matches(ch) => Ok(cursor.advance()),
                _ => Ok(false),
            },
            EdgeKind::BackRef(group) => Ok(self.back_reference(*group, cursor)),
            EdgeKind::Epsilon { ops, assert } => {
                if let Some(assert) = assert {
                    let (prev, next, pos) = (cursor.prev(), cursor.peek(), cursor.pos());
                    if !assert.holds(prev, next, pos, &self.tags, &self.ctx) {
                        return Ok(false);
                    }
                }
                for op in ops {
                    let tag = op.tag();
                    if !self.frames.is_empty() {
                        self.frames.push(Frame::Restore { tag, old: self.tags[tag] })?;
                    }
                    self.tags[tag] = op.value(cursor.pos());
                }
                Ok(true)
            }
        }
    }

    fn back_reference<S: StrSource + ?Sized>(
        &self,
        group: usize,
        cursor: &mut Cursor<'_, S>,
    ) -> bool {
        let (from, to) = match (self.tags[2 * group], self.tags[2 * group + 1]) {
            (Some(from), Some(to)) if from <= to => (from, to),
            _ => return false,
        };
        let target = cursor.pos() + (to - from);
        if !cursor.compare(from, cursor.pos(), to - from) {
            return false;
        }
        while cursor.pos() < target {
            if !cursor.advance() {
                return false;
            }
        }
        true
    }

    /// Unwinds to the most recent choice point, undoing tag writes on the way.
    fn backtrack<S: StrSource + ?Sized>(
        &mut self,
        cursor: &mut Cursor<'_, S>,
    ) -> Option<(StateId, usize)> {
        while let Some(frame) = self.frames.pop() {
            match frame {
                Frame::Restore { tag, old } => self.tags[tag] = old,
                Frame::Retry { state, edge, pos, prev } => {
                    cursor.seek(pos, prev);
                    return Some((state, edge));
                }
            }
        }
        None
    }
}
