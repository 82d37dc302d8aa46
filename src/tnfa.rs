//! Tagged NFA construction.
//!
//! The syntax tree is lowered Thompson style: every node is given an entry
//! and an exit state and fills in the edges between them. A state's
//! outgoing edges are written by exactly one node, in priority order, so
//! walking them first to last gives the leftmost-first preference that
//! both matchers rely on. Submatch boundaries are recorded by tag
//! operations on epsilon edges.

use std::collections::HashMap;
use std::fmt;
use std::fmt::Display;
use std::ops::{Index, IndexMut};

use itertools::Itertools;

use crate::charset::{is_word_char, CharSet};
use crate::error::{Error, SizeLimit};
use crate::parse::{Ast, Node};
use crate::regex::CompileFlags;
use crate::stack::Stack;

/// Largest automaton, in states, a pattern may compile to.
pub const MAX_STATES: usize = 1 << 18;

/// Index into the automaton's state array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct StateId(pub(crate) u32);

impl StateId {
    #[inline]
    pub(crate) fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Index<StateId> for [State] {
    type Output = State;

    #[inline]
    fn index(&self, id: StateId) -> &State {
        &self[id.idx()]
    }
}

impl IndexMut<StateId> for [State] {
    #[inline]
    fn index_mut(&mut self, id: StateId) -> &mut State {
        &mut self[id.idx()]
    }
}

pub(crate) type ClassId = usize;

/// Zero-width conditions on the characters around the current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub(crate) enum AssertKind {
    Bol,
    Eol,
    WordStart,
    WordEnd,
    WordBoundary,
    NotWordBoundary,
}

/// What the matchers know about the edges of the subject.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Context {
    pub(crate) notbol: bool,
    pub(crate) noteol: bool,
    pub(crate) newline: bool,
}

impl AssertKind {
    pub(crate) fn holds(self, prev: Option<char>, next: Option<char>, ctx: &Context) -> bool {
        let word_before = prev.map_or(false, is_word_char);
        let word_after = next.map_or(false, is_word_char);
        match self {
            AssertKind::Bol => {
                (prev.is_none() && !ctx.notbol) || (ctx.newline && prev == Some('\n'))
            }
            AssertKind::Eol => {
                (next.is_none() && !ctx.noteol) || (ctx.newline && next == Some('\n'))
            }
            AssertKind::WordStart => !word_before && word_after,
            AssertKind::WordEnd => word_before && !word_after,
            AssertKind::WordBoundary => word_before != word_after,
            AssertKind::NotWordBoundary => word_before == word_after,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Assertion {
    Anchor(AssertKind),
    /// The input position moved past the value recorded in a hidden tag.
    Progress(usize),
}

impl Assertion {
    pub(crate) fn holds(
        self,
        prev: Option<char>,
        next: Option<char>,
        pos: usize,
        tags: &[Option<usize>],
        ctx: &Context,
    ) -> bool {
        match self {
            Assertion::Anchor(kind) => kind.holds(prev, next, ctx),
            Assertion::Progress(tag) => tags[tag].map_or(true, |mark| pos > mark),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TagOp {
    Set(usize),
    Reset(usize),
}

impl TagOp {
    pub(crate) fn tag(self) -> usize {
        match self {
            TagOp::Set(tag) | TagOp::Reset(tag) => tag,
        }
    }

    pub(crate) fn value(self, pos: usize) -> Option<usize> {
        match self {
            TagOp::Set(_) => Some(pos),
            TagOp::Reset(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EdgeKind {
    Consume(ClassId),
    BackRef(usize),
    /// The assertion is checked before the operations run.
    Epsilon {
        ops: Vec<TagOp>,
        assert: Option<Assertion>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Edge {
    pub(crate) to: StateId,
    pub(crate) kind: EdgeKind,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct State {
    pub(crate) edges: Vec<Edge>,
}

/// The compiled automaton. Immutable once built.
#[derive(Debug, Clone)]
pub(crate) struct Tnfa {
    pub(crate) states: Vec<State>,
    pub(crate) classes: Vec<CharSet>,
    pub(crate) start: StateId,
    pub(crate) accept: StateId,
    pub(crate) num_tags: usize,
    /// Parenthesized groups, not counting the whole match.
    pub(crate) num_groups: usize,
    pub(crate) has_backrefs: bool,
    pub(crate) newline: bool,
}

impl Tnfa {
    pub(crate) fn state(&self, id: StateId) -> &State {
        &self.states[..][id]
    }

    pub(crate) fn class(&self, id: ClassId) -> &CharSet {
        &self.classes[id]
    }

    /// Number of capture slots, whole match included.
    pub(crate) fn slots(&self) -> usize {
        self.num_groups + 1
    }
}

/*
 - estimate_states - upper bound on the states `lower` allocates for a node
 */
fn estimate_states(node: &Node) -> usize {
    match node {
        Node::Empty | Node::Literal(_) | Node::BackRef(_) | Node::Anchor(_) => 0,
        Node::Concat(children) => children
            .iter()
            .fold(children.len().saturating_sub(1), |acc, c| {
                acc.saturating_add(estimate_states(c))
            }),
        Node::Alternation(children) => children
            .iter()
            .fold(children.len(), |acc, c| acc.saturating_add(estimate_states(c))),
        Node::Group { child, index } => {
            let own = if index.is_some() { 2 } else { 0 };
            estimate_states(child).saturating_add(own)
        }
        Node::Repeat { child, min, max, .. } => {
            let copies = max.unwrap_or_else(|| (*min).max(1)) as usize;
            copies.saturating_mul(estimate_states(child).saturating_add(2)).saturating_add(1)
        }
    }
}

struct Work<'a> {
    node: &'a Node,
    entry: StateId,
    exit: StateId,
}

// Work-variable struct for lowering.
struct Builder {
    states: Vec<State>,
    classes: Vec<CharSet>,
    interned: HashMap<CharSet, ClassId>,
    next_tag: usize,
}

impl Builder {
    fn new_state(&mut self) -> StateId {
        let id = StateId(self.states.len() as u32);
        self.states.push(State::default());
        id
    }

    fn intern(&mut self, set: &CharSet) -> ClassId {
        if let Some(&id) = self.interned.get(set) {
            return id;
        }
        let id = self.classes.len();
        self.classes.push(set.clone());
        self.interned.insert(set.clone(), id);
        id
    }

    fn edge(&mut self, from: StateId, to: StateId, kind: EdgeKind) {
        self.states[..][from].edges.push(Edge { to, kind });
    }

    fn epsilon(&mut self, from: StateId, to: StateId, ops: Vec<TagOp>, assert: Option<Assertion>) {
        self.edge(from, to, EdgeKind::Epsilon { ops, assert });
    }

    // Adds `enter` and `skip` epsilon edges out of `from`, in greedy order.
    fn fork(&mut self, from: StateId, enter: (StateId, Vec<TagOp>), skip: StateId, greedy: bool) {
        if greedy {
            self.epsilon(from, enter.0, enter.1, None);
            self.epsilon(from, skip, Vec::new(), None);
        } else {
            self.epsilon(from, skip, Vec::new(), None);
            self.epsilon(from, enter.0, enter.1, None);
        }
    }

    fn lower<'a>(&mut self, work: Work<'a>, pending: &mut Stack<Work<'a>>) -> Result<(), Error> {
        let Work { node, entry, exit } = work;
        match node {
            Node::Empty => self.epsilon(entry, exit, Vec::new(), None),
            Node::Literal(set) => {
                let class = self.intern(set);
                self.edge(entry, exit, EdgeKind::Consume(class));
            }
            Node::BackRef(group) => self.edge(entry, exit, EdgeKind::BackRef(*group)),
            Node::Anchor(kind) => {
                self.epsilon(entry, exit, Vec::new(), Some(Assertion::Anchor(*kind)))
            }
            Node::Group { child, index: None } => pending.push(Work { node: child, entry, exit })?,
            Node::Group { child, index: Some(index) } => {
                let open = self.new_state();
                let close = self.new_state();
                self.epsilon(entry, open, vec![TagOp::Set(2 * index)], None);
                self.epsilon(close, exit, vec![TagOp::Set(2 * index + 1)], None);
                pending.push(Work { node: child, entry: open, exit: close })?;
            }
            Node::Concat(children) => {
                let mut from = entry;
                for (i, child) in children.iter().enumerate() {
                    let to = if i + 1 == children.len() { exit } else { self.new_state() };
                    pending.push(Work { node: child, entry: from, exit: to })?;
                    from = to;
                }
            }
            Node::Alternation(children) => {
                for child in children {
                    let branch = self.new_state();
                    self.epsilon(entry, branch, Vec::new(), None);
                    pending.push(Work { node: child, entry: branch, exit })?;
                }
            }
            Node::Repeat { child, min, max, greedy } => {
                self.lower_repeat(child, *min, *max, *greedy, entry, exit, pending)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn lower_repeat<'a>(
        &mut self,
        child: &'a Node,
        min: u32,
        max: Option<u32>,
        greedy: bool,
        entry: StateId,
        exit: StateId,
        pending: &mut Stack<Work<'a>>,
    ) -> Result<(), Error> {
        let mut inner = Vec::new();
        child.group_indices(&mut inner);
        let resets = inner
            .iter()
            .flat_map(|&g| [TagOp::Reset(2 * g), TagOp::Reset(2 * g + 1)])
            .collect_vec();

        // the last mandatory copy of an unbounded repetition becomes the loop
        let mandatory = match max {
            None if min > 0 => min - 1,
            _ => min,
        };
        let mut cur = entry;
        for _ in 0..mandatory {
            let body = self.new_state();
            let next = self.new_state();
            self.epsilon(cur, body, resets.clone(), None);
            pending.push(Work { node: child, entry: body, exit: next })?;
            cur = next;
        }

        match max {
            Some(max) => {
                for _ in min..max {
                    let body = self.new_state();
                    let next = self.new_state();
                    self.fork(cur, (body, resets.clone()), exit, greedy);
                    pending.push(Work { node: child, entry: body, exit: next })?;
                    cur = next;
                }
                self.epsilon(cur, exit, Vec::new(), None);
            }
            None => {
                let body = self.new_state();
                let end = self.new_state();
                let nullable = child.nullable();
                let mut enter_ops = resets;
                let guard = if nullable {
                    let hidden = self.next_tag;
                    self.next_tag += 1;
                    enter_ops.push(TagOp::Set(hidden));
                    Some(Assertion::Progress(hidden))
                } else {
                    None
                };
                if min == 0 {
                    // cur is the loop head: iterate or leave
                    self.fork(cur, (body, enter_ops), exit, greedy);
                    self.epsilon(end, cur, Vec::new(), guard);
                    if nullable {
                        self.epsilon(end, exit, Vec::new(), None);
                    }
                } else {
                    self.epsilon(cur, body, enter_ops, None);
                    if greedy {
                        self.epsilon(end, cur, Vec::new(), guard);
                        self.epsilon(end, exit, Vec::new(), None);
                    } else {
                        self.epsilon(end, exit, Vec::new(), None);
                        self.epsilon(end, cur, Vec::new(), guard);
                    }
                }
                pending.push(Work { node: child, entry: body, exit: end })?;
            }
        }
        Ok(())
    }
}

/// Lowers a parsed pattern to a tagged automaton.
pub(crate) fn compile(ast: &Ast, flags: CompileFlags) -> Result<Tnfa, Error> {
    let estimate = estimate_states(&ast.root).saturating_add(4);
    if estimate > MAX_STATES {
        log::debug!("compile: refusing automaton of about {} states", estimate);
        return Err(Error::Size(SizeLimit::Automaton));
    }

    let mut builder = Builder {
        states: Vec::with_capacity(estimate),
        classes: Vec::new(),
        interned: HashMap::new(),
        next_tag: 2 * (ast.groups + 1),
    };
    let start = builder.new_state();
    let entry = builder.new_state();
    let exit = builder.new_state();
    let accept = builder.new_state();
    builder.epsilon(start, entry, vec![TagOp::Set(0)], None);
    builder.epsilon(exit, accept, vec![TagOp::Set(1)], None);

    let mut pending = Stack::new(64, 2 * MAX_STATES, 64);
    pending.push(Work { node: &ast.root, entry, exit })?;
    while let Some(work) = pending.pop() {
        builder.lower(work, &mut pending)?;
    }

    let tnfa = Tnfa {
        states: builder.states,
        classes: builder.classes,
        start,
        accept,
        num_tags: builder.next_tag,
        num_groups: ast.groups,
        has_backrefs: ast.has_backrefs,
        newline: flags.contains(CompileFlags::NEWLINE),
    };
    log::debug!(
        "compile: {} states, {} classes, {} tags, {} groups{}",
        tnfa.states.len(),
        tnfa.classes.len(),
        tnfa.num_tags,
        tnfa.num_groups,
        if tnfa.has_backrefs { ", back-references" } else { "" }
    );
    log::trace!("compile: automaton\n{}", tnfa);
    Ok(tnfa)
}

impl Display for TagOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagOp::Set(tag) => write!(f, "t{}=pos", tag),
            TagOp::Reset(tag) => write!(f, "t{}=-", tag),
        }
    }
}

impl Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "-> {}", self.to)?;
        match &self.kind {
            EdgeKind::Consume(class) => write!(f, " class {}", class),
            EdgeKind::BackRef(group) => write!(f, " \\{}", group),
            EdgeKind::Epsilon { ops, assert } => {
                match assert {
                    Some(Assertion::Anchor(kind)) => write!(f, " assert {}", kind)?,
                    Some(Assertion::Progress(tag)) => write!(f, " assert pos>t{}", tag)?,
                    None => {}
                }
                if !ops.is_empty() {
                    write!(f, " [{}]", ops.iter().join(", "))?;
                }
                Ok(())
            }
        }
    }
}

impl Display for Tnfa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "start {} accept {} tags {}", self.start, self.accept, self.num_tags)?;
        for (i, class) in self.classes.iter().enumerate() {
            writeln!(f, "class {}: {}", i, class)?;
        }
        for (i, state) in self.states.iter().enumerate() {
            writeln!(f, "{}:", i)?;
            for edge in &state.edges {
                writeln!(f, "    {}", edge)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parse::parse;

    fn build(pattern: &str) -> Result<Tnfa, Error> {
        let chars: Vec<char> = pattern.chars().collect();
        let ast = parse(&chars, CompileFlags::EXTENDED)?;
        compile(&ast, CompileFlags::EXTENDED)
    }

    fn epsilons(tnfa: &Tnfa) -> Vec<&EdgeKind> {
        tnfa.states
            .iter()
            .flat_map(|s| s.edges.iter())
            .map(|e| &e.kind)
            .filter(|k| matches!(k, EdgeKind::Epsilon { .. }))
            .collect()
    }

    #[test]
    fn test_compile_whole_match_tags() {
        let tnfa = build("a").unwrap();
        assert_eq!(tnfa.num_tags, 2);
        assert_eq!(tnfa.slots(), 1);
        let first = &tnfa.state(tnfa.start).edges[0];
        assert_eq!(first.kind, EdgeKind::Epsilon { ops: vec![TagOp::Set(0)], assert: None });
        assert!(tnfa.state(tnfa.accept).edges.is_empty());
    }

    #[test]
    fn test_compile_group_tags() {
        let tnfa = build("(a)(b)").unwrap();
        assert_eq!(tnfa.num_groups, 2);
        assert_eq!(tnfa.num_tags, 6);
        let sets: Vec<usize> = epsilons(&tnfa)
            .into_iter()
            .flat_map(|k| match k {
                EdgeKind::Epsilon { ops, .. } => ops.clone(),
                _ => Vec::new(),
            })
            .map(TagOp::tag)
            .sorted()
            .collect();
        assert_eq!(sets, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_compile_interns_classes() {
        let tnfa = build("abab[ab]").unwrap();
        assert_eq!(tnfa.classes.len(), 3);
    }

    #[test]
    fn test_compile_hidden_tag_only_for_nullable_loops() {
        assert_eq!(build("a*").unwrap().num_tags, 2);
        assert_eq!(build("(a*)*").unwrap().num_tags, 5);
        let tnfa = build("(a|)+").unwrap();
        assert_eq!(tnfa.num_tags, 5);
        let guarded = epsilons(&tnfa)
            .into_iter()
            .filter(|k| matches!(k, EdgeKind::Epsilon { assert: Some(Assertion::Progress(4)), .. }))
            .count();
        assert_eq!(guarded, 1);
    }

    #[test]
    fn test_compile_greedy_order() {
        let greedy = build("a*").unwrap();
        let lazy = build("a*?").unwrap();
        // the loop head is the entry state, right after the start edge
        let head = greedy.state(greedy.start).edges[0].to;
        let lazy_head = lazy.state(lazy.start).edges[0].to;
        let enters_first = |tnfa: &Tnfa, head: StateId| {
            let first = tnfa.state(head).edges[0].to;
            tnfa.state(first).edges.iter().any(|e| matches!(e.kind, EdgeKind::Consume(_)))
        };
        assert!(enters_first(&greedy, head));
        assert!(!enters_first(&lazy, lazy_head));
    }

    #[test]
    fn test_compile_size_limit() {
        assert_eq!(build("(abcdefghij){1,100000}").unwrap_err(), Error::Size(SizeLimit::Automaton));
        assert!(build("(abcdefghij){1,100}").is_ok());
    }

    #[test]
    fn test_assertions() {
        let ctx = Context::default();
        assert!(AssertKind::Bol.holds(None, Some('a'), &ctx));
        assert!(!AssertKind::Bol.holds(Some('\n'), Some('a'), &ctx));
        let nl = Context { newline: true, ..Context::default() };
        assert!(AssertKind::Bol.holds(Some('\n'), Some('a'), &nl));
        assert!(AssertKind::Eol.holds(Some('a'), Some('\n'), &nl));
        let notbol = Context { notbol: true, ..Context::default() };
        assert!(!AssertKind::Bol.holds(None, Some('a'), &notbol));
        assert!(AssertKind::WordStart.holds(Some(' '), Some('w'), &ctx));
        assert!(AssertKind::WordEnd.holds(Some('w'), None, &ctx));
        assert!(AssertKind::WordBoundary.holds(None, Some('w'), &ctx));
        assert!(AssertKind::NotWordBoundary.holds(Some('a'), Some('b'), &ctx));
        let tags = [None, Some(3)];
        assert!(!Assertion::Progress(1).holds(None, None, 3, &tags, &ctx));
        assert!(Assertion::Progress(1).holds(None, None, 4, &tags, &ctx));
        assert!(Assertion::Progress(0).holds(None, None, 0, &tags, &ctx));
    }

    #[test]
    fn test_automaton_dump() {
        let dump = build("^a").unwrap().to_string();
        assert!(dump.starts_with("start 0 accept 3 tags 2"));
        assert!(dump.contains("assert Bol"));
        assert!(dump.contains("class 0: a"));
        assert!(dump.contains("[t0=pos]"));
    }
}
