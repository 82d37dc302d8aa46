//! Cost-bounded matching.
//!
//! All candidate paths advance through the input together, one symbol at a
//! time. Each path (a thread) carries the cost it has paid so far for
//! edits: consuming a symbol the automaton did not expect (substitution),
//! skipping a symbol while staying put (deletion), or taking a consuming
//! edge without any input (insertion). At most one thread survives per
//! state, the cheaper one, or the older one when costs tie, so the work
//! per symbol is bounded by the automaton size.
//!
//! With a ceiling of zero no edit is affordable and the search reduces to
//! an exact leftmost-first simulation, which is why exact matching of
//! patterns without back-references runs here too.

use std::cmp::Ordering;

use crate::error::{Error, SizeLimit};
use crate::source::{Cursor, StrSource};
use crate::stack::Stack;
use crate::tnfa::{Context, EdgeKind, StateId, Tnfa};

/// Most `states × tags` entries a single search may keep.
pub const MAX_APPROX_CELLS: usize = 1 << 26;

/// Edit costs and limits for one approximate search.
///
/// A match is accepted only if its total cost is at most `max_cost` and
/// every edit counter stays within its cap. The default is the exact
/// profile: unit costs, `max_cost` zero, no individual caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApproxParams {
    /// Cost of matching a pattern symbol that is missing from the input.
    pub cost_ins: u32,
    /// Cost of skipping an input symbol the pattern does not account for.
    pub cost_del: u32,
    /// Cost of matching a pattern symbol against a different input symbol.
    pub cost_subst: u32,
    pub max_cost: u32,
    pub max_ins: u32,
    pub max_del: u32,
    pub max_subst: u32,
    /// Cap on the number of edits of any kind.
    pub max_err: u32,
}

impl Default for ApproxParams {
    fn default() -> ApproxParams {
        ApproxParams {
            cost_ins: 1,
            cost_del: 1,
            cost_subst: 1,
            max_cost: 0,
            max_ins: u32::MAX,
            max_del: u32::MAX,
            max_subst: u32::MAX,
            max_err: u32::MAX,
        }
    }
}

impl ApproxParams {
    /// Unit costs with the given ceiling.
    pub fn with_max_cost(max_cost: u32) -> ApproxParams {
        ApproxParams { max_cost, ..ApproxParams::default() }
    }

    pub(crate) fn is_exact(&self) -> bool {
        self.max_cost == 0
    }

    fn allows(&self, cost: u32, limit: u32, counts: &EditCounts) -> bool {
        cost <= limit
            && counts.ins <= self.max_ins
            && counts.del <= self.max_del
            && counts.subst <= self.max_subst
            && counts.total() <= self.max_err
    }
}

/// How many edits of each kind a match needed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EditCounts {
    pub ins: u32,
    pub del: u32,
    pub subst: u32,
}

impl EditCounts {
    pub fn total(&self) -> u32 {
        self.ins.saturating_add(self.del).saturating_add(self.subst)
    }
}

/// The winning thread of a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Found {
    pub(crate) tags: Vec<Option<usize>>,
    pub(crate) cost: u32,
    pub(crate) counts: EditCounts,
}

#[derive(Debug, Clone)]
struct Thread {
    state: StateId,
    start: usize,
    cost: u32,
    counts: EditCounts,
    tags: Vec<Option<usize>>,
}

impl Thread {
    fn key(&self) -> (u32, usize) {
        (self.cost, self.start)
    }

    fn moved(&self, to: StateId) -> Thread {
        Thread { state: to, ..self.clone() }
    }
}

#[derive(Debug, Clone, Copy)]
enum Edit {
    Insert,
    Delete,
    Substitute,
}

/// Threads at one input position, in priority order, one per state.
struct ThreadList {
    threads: Vec<Thread>,
    slot: Vec<Option<usize>>,
}

impl ThreadList {
    fn new(states: usize) -> ThreadList {
        ThreadList {
            threads: Vec::new(),
            slot: vec![None; states],
        }
    }

    /// Adds the thread unless its state already holds one at least as
    /// good. Returns the thread's index when it was taken.
    fn admit(&mut self, thread: Thread) -> Option<usize> {
        let state = thread.state.idx();
        match self.slot[state] {
            Some(i) => {
                if thread.key().cmp(&self.threads[i].key()) == Ordering::Less {
                    self.threads[i] = thread;
                    Some(i)
                } else {
                    None
                }
            }
            None => {
                self.slot[state] = Some(self.threads.len());
                self.threads.push(thread);
                Some(self.threads.len() - 1)
            }
        }
    }

    fn unindex(&mut self) {
        for thread in &self.threads {
            self.slot[thread.state.idx()] = None;
        }
    }

    fn reindex(&mut self) {
        for (i, thread) in self.threads.iter().enumerate() {
            self.slot[thread.state.idx()] = Some(i);
        }
    }

    fn clear(&mut self) {
        self.unindex();
        self.threads.clear();
    }

    fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

struct Search<'t> {
    tnfa: &'t Tnfa,
    params: &'t ApproxParams,
    ctx: Context,
    limit: u32,
    work: Stack<Thread>,
    inserts: Vec<Thread>,
    best: Option<Thread>,
}

/// Finds the cheapest match at or after `start`; among equally cheap ones
/// the leftmost, and among those the one an exact backtracking search
/// would prefer.
pub(crate) fn execute<S: StrSource + ?Sized>(
    tnfa: &Tnfa,
    source: &mut S,
    start: usize,
    prev: Option<char>,
    params: &ApproxParams,
    ctx: Context,
) -> Result<Option<Found>, Error> {
    let cells = tnfa.states.len().saturating_mul(tnfa.num_tags.max(1));
    if cells > MAX_APPROX_CELLS {
        return Err(Error::Size(SizeLimit::SearchTable));
    }
    let edges: usize = tnfa.states.iter().map(|s| s.edges.len()).sum();
    let mut search = Search {
        tnfa,
        params,
        ctx,
        limit: params.max_cost,
        work: Stack::new(64, edges + 1, 64),
        inserts: Vec::new(),
        best: None,
    };
    let mut cursor = Cursor::new(source, start, prev);
    search.run(&mut cursor)
}

impl<'t> Search<'t> {
    fn run<S: StrSource + ?Sized>(
        &mut self,
        cursor: &mut Cursor<'_, S>,
    ) -> Result<Option<Found>, Error> {
        let mut current = ThreadList::new(self.tnfa.states.len());
        let mut next = ThreadList::new(self.tnfa.states.len());
        loop {
            if self.best.as_ref().map_or(true, |best| best.cost > 0) {
                let thread = Thread {
                    state: self.tnfa.start,
                    start: cursor.pos(),
                    cost: 0,
                    counts: EditCounts::default(),
                    tags: vec![None; self.tnfa.num_tags],
                };
                self.close(thread, &mut current, cursor)?;
                self.drain_inserts(&mut current, cursor)?;
            }

            current.unindex();
            current.threads.sort_by_key(Thread::key);
            self.take_match(&mut current);
            current.reindex();

            let exact_found = self.best.as_ref().map_or(false, |best| best.cost == 0);
            if current.is_empty() && exact_found {
                break;
            }
            let ch = match cursor.peek() {
                Some(ch) => ch,
                None => break,
            };
            cursor.advance();
            self.step(ch, &current, &mut next, cursor)?;
            std::mem::swap(&mut current, &mut next);
            next.clear();
        }
        Ok(self.best.take().map(|best| Found {
            tags: best.tags,
            cost: best.cost,
            counts: best.counts,
        }))
    }

    /*
     - take_match - record the best accepting thread and drop the ones it beats
     */
    fn take_match(&mut self, list: &mut ThreadList) {
        let accept = self.tnfa.accept;
        if let Some(i) = list.threads.iter().position(|t| t.state == accept) {
            let candidate = &list.threads[i];
            if self.best.as_ref().map_or(true, |best| candidate.key() <= best.key()) {
                log::trace!(
                    "approx: match from {:?} cost {} {:?}",
                    candidate.tags.first().copied().flatten(),
                    candidate.cost,
                    candidate.counts
                );
                self.limit = self.limit.min(candidate.cost);
                self.best = Some(candidate.clone());
            }
            list.threads.truncate(i);
        }
        if let Some(best) = &self.best {
            let key = best.key();
            list.threads.retain(|t| t.key() <= key);
        }
    }

    /*
     - step - move every thread over `ch`, already consumed by the cursor
     *
     * Matches come first, then substitutions, then deletions, then the
     * insertions discovered along the way.
     */
    fn step<S: StrSource + ?Sized>(
        &mut self,
        ch: char,
        current: &ThreadList,
        next: &mut ThreadList,
        cursor: &mut Cursor<'_, S>,
    ) -> Result<(), Error> {
        let tnfa = self.tnfa;
        for thread in &current.threads {
            for edge in &tnfa.state(thread.state).edges {
                if let EdgeKind::Consume(class) = edge.kind {
                    if tnfa.class(class).matches(ch) {
                        self.close(thread.moved(edge.to), next, cursor)?;
                    }
                }
            }
        }
        for thread in &current.threads {
            for edge in &tnfa.state(thread.state).edges {
                if let EdgeKind::Consume(class) = edge.kind {
                    if !tnfa.class(class).matches(ch) {
                        if let Some(edited) = self.edit(thread, edge.to, Edit::Substitute) {
                            self.close(edited, next, cursor)?;
                        }
                    }
                }
            }
        }
        for thread in &current.threads {
            if thread.state == tnfa.start || thread.state == tnfa.accept {
                continue;
            }
            if let Some(edited) = self.edit(thread, thread.state, Edit::Delete) {
                self.close(edited, next, cursor)?;
            }
        }
        self.drain_inserts(next, cursor)
    }

    fn edit(&self, thread: &Thread, to: StateId, edit: Edit) -> Option<Thread> {
        let mut counts = thread.counts;
        let price = match edit {
            Edit::Insert => {
                counts.ins = counts.ins.saturating_add(1);
                self.params.cost_ins
            }
            Edit::Delete => {
                counts.del = counts.del.saturating_add(1);
                self.params.cost_del
            }
            Edit::Substitute => {
                counts.subst = counts.subst.saturating_add(1);
                self.params.cost_subst
            }
        };
        let cost = thread.cost.saturating_add(price);
        if !self.params.allows(cost, self.limit, &counts) {
            return None;
        }
        Some(Thread {
            state: to,
            start: thread.start,
            cost,
            counts,
            tags: thread.tags.clone(),
        })
    }

    /*
     - close - add a thread and everything reachable from it without input
     *
     * Depth first, edges in priority order. Insertions seen on the way are
     * queued for `drain_inserts`.
     */
    fn close<S: StrSource + ?Sized>(
        &mut self,
        root: Thread,
        list: &mut ThreadList,
        cursor: &Cursor<'_, S>,
    ) -> Result<(), Error> {
        let tnfa = self.tnfa;
        let (pos, prev, peek) = (cursor.pos(), cursor.prev(), cursor.peek());
        self.work.push(root)?;
        while let Some(thread) = self.work.pop() {
            if !self.params.allows(thread.cost, self.limit, &thread.counts) {
                continue;
            }
            let state = thread.state;
            let i = match list.admit(thread) {
                Some(i) => i,
                None => continue,
            };
            let thread = &list.threads[i];
            let edges = &tnfa.state(state).edges;
            for edge in edges {
                if let EdgeKind::Consume(_) = edge.kind {
                    if let Some(edited) = self.edit(thread, edge.to, Edit::Insert) {
                        self.inserts.push(edited);
                    }
                }
            }
            for edge in edges.iter().rev() {
                if let EdgeKind::Epsilon { ops, assert } = &edge.kind {
                    if let Some(assert) = assert {
                        if !assert.holds(prev, peek, pos, &thread.tags, &self.ctx) {
                            continue;
                        }
                    }
                    let mut successor = thread.moved(edge.to);
                    for op in ops {
                        successor.tags[op.tag()] = op.value(pos);
                    }
                    self.work.push(successor)?;
                }
            }
        }
        Ok(())
    }

    fn drain_inserts<S: StrSource + ?Sized>(
        &mut self,
        list: &mut ThreadList,
        cursor: &Cursor<'_, S>,
    ) -> Result<(), Error> {
        let mut i = 0;
        while i < self.inserts.len() {
            let thread = self.inserts[i].clone();
            i += 1;
            self.close(thread, list, cursor)?;
        }
        self.inserts.clear();
        Ok(())
    }
}
