use itertools::{peek_nth, Itertools, PeekNth};

use std::{iter::Copied, slice::Iter};

use crate::charset::{CharSet, PosixClass};
use crate::error::{Error, ErrorCode, SizeLimit};
use crate::regex::CompileFlags;
use crate::tnfa::AssertKind;

/// Longest pattern, in characters, the parser accepts.
pub const MAX_PATTERN_LEN: usize = 1 << 16;
/// Deepest syntax tree the parser builds (groups and stacked repetitions).
pub const MAX_NESTING: usize = 256;
/// Largest count allowed inside `{m,n}`.
pub const DUP_MAX: u32 = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    Extended,
    Basic,
    Literal,
}

impl Dialect {
    pub(crate) fn from_flags(flags: CompileFlags) -> Dialect {
        if flags.contains(CompileFlags::LITERAL) {
            Dialect::Literal
        } else if flags.contains(CompileFlags::EXTENDED) {
            Dialect::Extended
        } else {
            Dialect::Basic
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Empty,
    Literal(CharSet),
    Concat(Vec<Node>),
    /// Branch order is match priority.
    Alternation(Vec<Node>),
    Repeat {
        child: Box<Node>,
        min: u32,
        max: Option<u32>,
        greedy: bool,
    },
    Group {
        child: Box<Node>,
        index: Option<usize>,
    },
    BackRef(usize),
    Anchor(AssertKind),
}

impl Node {
    /// Can this node match without consuming input?
    pub(crate) fn nullable(&self) -> bool {
        match self {
            Node::Empty | Node::Anchor(_) | Node::BackRef(_) => true,
            Node::Literal(_) => false,
            Node::Concat(children) => children.iter().all(Node::nullable),
            Node::Alternation(children) => children.iter().any(Node::nullable),
            Node::Repeat { child, min, .. } => *min == 0 || child.nullable(),
            Node::Group { child, .. } => child.nullable(),
        }
    }

    /// Capture indices of every group nested in this node, itself included.
    pub(crate) fn group_indices(&self, out: &mut Vec<usize>) {
        match self {
            Node::Empty | Node::Literal(_) | Node::BackRef(_) | Node::Anchor(_) => {}
            Node::Concat(children) | Node::Alternation(children) => {
                for child in children {
                    child.group_indices(out);
                }
            }
            Node::Repeat { child, .. } => child.group_indices(out),
            Node::Group { child, index } => {
                out.extend(*index);
                child.group_indices(out);
            }
        }
    }
}

/// A parsed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Ast {
    pub(crate) root: Node,
    pub(crate) groups: usize,
    pub(crate) has_backrefs: bool,
}

pub(crate) fn parse(pattern: &[char], flags: CompileFlags) -> Result<Ast, Error> {
    if pattern.len() > MAX_PATTERN_LEN {
        return Err(Error::Size(SizeLimit::Pattern));
    }
    let mut parser = Parser::new(pattern, flags);
    let root = if parser.dialect == Dialect::Literal {
        parser.literal_run(|_| false).0
    } else {
        let (root, _) = parser.regex()?;
        if parser.peek().is_some() {
            // only a stray group close stops the top level early
            return Err(parser.error(ErrorCode::EParen));
        }
        root
    };
    Ok(Ast {
        root,
        groups: parser.groups,
        has_backrefs: parser.has_backrefs,
    })
}

type Parsed = (Node, usize);

// Work-variable struct for pattern parsing. Every production returns the
// node together with its height so the tree depth stays bounded.
struct Parser<'p> {
    chars: PeekNth<Copied<Iter<'p, char>>>,
    offset: usize,
    dialect: Dialect,
    icase: bool,
    newline: bool,
    ungreedy: bool,
    groups: usize,
    depth: usize,
    has_backrefs: bool,
}

impl<'p> Parser<'p> {
    fn new(pattern: &'p [char], flags: CompileFlags) -> Parser<'p> {
        Parser {
            chars: peek_nth(pattern.iter().copied()),
            offset: 0,
            dialect: Dialect::from_flags(flags),
            icase: flags.contains(CompileFlags::ICASE),
            newline: flags.contains(CompileFlags::NEWLINE),
            ungreedy: flags.contains(CompileFlags::UNGREEDY),
            groups: 0,
            depth: 0,
            has_backrefs: false,
        }
    }

    /*
     - regex - alternation, the lowest precedence level
     */
    fn regex(&mut self) -> Result<Parsed, Error> {
        let mut branches = vec![self.branch()?];
        while self.eat_alternation() {
            branches.push(self.branch()?);
        }
        if branches.len() == 1 {
            return Ok(branches.swap_remove(0));
        }
        let height = self.check_height(branches.iter().map(|b| b.1).max().unwrap_or(0) + 1)?;
        Ok((Node::Alternation(branches.into_iter().map(|b| b.0).collect()), height))
    }

    /*
     - branch - one alternative of an | operator
     *
     * Implements the concatenation operator.
     */
    fn branch(&mut self) -> Result<Parsed, Error> {
        let mut pieces = Vec::new();
        while !self.at_branch_end() {
            let first = pieces.is_empty();
            pieces.push(self.piece(first)?);
        }
        match pieces.len() {
            0 => Ok((Node::Empty, 1)),
            1 => Ok(pieces.swap_remove(0)),
            _ => {
                let height = self.check_height(pieces.iter().map(|p| p.1).max().unwrap_or(0) + 1)?;
                Ok((Node::Concat(pieces.into_iter().map(|p| p.0).collect()), height))
            }
        }
    }

    /*
     - piece - an atom followed by any number of repetition operators
     */
    fn piece(&mut self, first: bool) -> Result<Parsed, Error> {
        let (mut node, mut height) = self.atom(first)?;
        loop {
            if self.dialect == Dialect::Basic && node == Node::Anchor(AssertKind::Bol) {
                // `^*` in a basic pattern is an anchor followed by a literal star
                break;
            }
            let (min, max) = match self.repetition()? {
                Some(bounds) => bounds,
                None => break,
            };
            let mut greedy = !self.ungreedy;
            if self.dialect == Dialect::Extended && self.eat('?') {
                greedy = !greedy;
            }
            height = self.check_height(height + 1)?;
            node = Node::Repeat {
                child: Box::new(node),
                min,
                max,
                greedy,
            };
        }
        Ok((node, height))
    }

    fn repetition(&mut self) -> Result<Option<(u32, Option<u32>)>, Error> {
        let bounds = match (self.dialect, self.peek()) {
            (Dialect::Extended, Some('*')) | (Dialect::Basic, Some('*')) => {
                self.bump();
                (0, None)
            }
            (Dialect::Extended, Some('+')) => {
                self.bump();
                (1, None)
            }
            (Dialect::Extended, Some('?')) => {
                self.bump();
                (0, Some(1))
            }
            (Dialect::Extended, Some('{')) => {
                self.bump();
                self.bound()?
            }
            (Dialect::Basic, Some('\\')) if self.peek_nth(1) == Some('{') => {
                self.bump();
                self.bump();
                self.bound()?
            }
            _ => return Ok(None),
        };
        Ok(Some(bounds))
    }

    /*
     - bound - the inside of {m,n}, opening brace already absorbed
     */
    fn bound(&mut self) -> Result<(u32, Option<u32>), Error> {
        let low = self.number()?;
        let (min, max) = if self.eat(',') {
            (low.unwrap_or(0), self.number()?)
        } else {
            match low {
                Some(n) => (n, Some(n)),
                None => return Err(self.error(ErrorCode::BadBr)),
            }
        };
        let closed = match self.dialect {
            Dialect::Basic => self.eat_escaped('}'),
            _ => self.eat('}'),
        };
        if !closed {
            let code = if self.peek().is_none() { ErrorCode::EBrace } else { ErrorCode::BadBr };
            return Err(self.error(code));
        }
        if min > DUP_MAX || max.map_or(false, |max| max > DUP_MAX || max < min) {
            return Err(self.error(ErrorCode::BadBr));
        }
        Ok((min, max))
    }

    fn number(&mut self) -> Result<Option<u32>, Error> {
        let mut value: Option<u32> = None;
        while let Some(digit) = self.peek().and_then(|c| c.to_digit(10)) {
            self.bump();
            value = value
                .unwrap_or(0)
                .checked_mul(10)
                .and_then(|v| v.checked_add(digit))
                .map(Some)
                .ok_or_else(|| self.error(ErrorCode::BadBr))?;
        }
        Ok(value)
    }

    /*
     - atom - the lowest level
     */
    fn atom(&mut self, first: bool) -> Result<Parsed, Error> {
        let ch = match self.bump() {
            Some(ch) => ch,
            None => return Err(self.error(ErrorCode::BadPat)),
        };
        match (self.dialect, ch) {
            (_, '[') => self.bracket(),
            (_, '.') => {
                let mut set = CharSet::any();
                if self.newline {
                    set.exclude_newline();
                }
                Ok((Node::Literal(set), 1))
            }
            (_, '\\') => self.escape(),
            (Dialect::Extended, '(') => self.group(),
            (Dialect::Extended, '^') => Ok((Node::Anchor(AssertKind::Bol), 1)),
            (Dialect::Extended, '$') => Ok((Node::Anchor(AssertKind::Eol), 1)),
            (Dialect::Extended, '*' | '+' | '?' | '{') => Err(self.error(ErrorCode::BadRpt)),
            (Dialect::Basic, '^') if first => Ok((Node::Anchor(AssertKind::Bol), 1)),
            (Dialect::Basic, '$') if self.at_branch_end() => Ok((Node::Anchor(AssertKind::Eol), 1)),
            (_, ch) => Ok((self.literal(ch), 1)),
        }
    }

    fn group(&mut self) -> Result<Parsed, Error> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(Error::Size(SizeLimit::Nesting));
        }
        self.groups += 1;
        let index = self.groups;
        let (child, height) = self.regex()?;
        if !self.eat_group_close() {
            return Err(self.error(ErrorCode::EParen));
        }
        self.depth -= 1;
        let height = self.check_height(height + 1)?;
        Ok((
            Node::Group {
                child: Box::new(child),
                index: Some(index),
            },
            height,
        ))
    }

    /*
     - escape - whatever follows a backslash outside brackets
     */
    fn escape(&mut self) -> Result<Parsed, Error> {
        let ch = match self.bump() {
            Some(ch) => ch,
            None => return Err(self.error(ErrorCode::EEscape)),
        };
        let node = match ch {
            '1'..='9' => {
                let index = ch as usize - '0' as usize;
                if index > self.groups {
                    return Err(self.error(ErrorCode::ESubreg));
                }
                self.has_backrefs = true;
                Node::BackRef(index)
            }
            '(' if self.dialect == Dialect::Basic => return self.group(),
            '{' if self.dialect == Dialect::Basic => return Err(self.error(ErrorCode::BadRpt)),
            '<' => Node::Anchor(AssertKind::WordStart),
            '>' => Node::Anchor(AssertKind::WordEnd),
            'b' => Node::Anchor(AssertKind::WordBoundary),
            'B' => Node::Anchor(AssertKind::NotWordBoundary),
            'w' | 'W' => {
                let mut set = CharSet::of_class(PosixClass::Alnum, ch == 'W');
                set.push_range('_', '_');
                Node::Literal(set)
            }
            's' | 'S' => Node::Literal(CharSet::of_class(PosixClass::Space, ch == 'S')),
            'd' | 'D' => Node::Literal(CharSet::of_class(PosixClass::Digit, ch == 'D')),
            'n' => self.literal('\n'),
            't' => self.literal('\t'),
            'r' => self.literal('\r'),
            'f' => self.literal('\x0c'),
            'e' => self.literal('\x1b'),
            'x' => {
                let ch = self.hex()?;
                self.literal(ch)
            }
            'Q' => {
                let run =
                    self.literal_run(|p| p.peek() == Some('\\') && p.peek_nth(1) == Some('E'));
                self.eat_escaped('E');
                return Ok(run);
            }
            ch => self.literal(ch),
        };
        Ok((node, 1))
    }

    fn hex(&mut self) -> Result<char, Error> {
        let mut digits = String::new();
        if self.eat('{') {
            loop {
                match self.bump() {
                    Some('}') => break,
                    Some(ch) if ch.is_ascii_hexdigit() => digits.push(ch),
                    Some(_) => return Err(self.error(ErrorCode::EEscape)),
                    None => return Err(self.error(ErrorCode::EBrace)),
                }
            }
        } else {
            while digits.len() < 2 {
                match self.peek() {
                    Some(ch) if ch.is_ascii_hexdigit() => {
                        self.bump();
                        digits.push(ch);
                    }
                    _ => break,
                }
            }
            if digits.is_empty() {
                return Ok('x');
            }
        }
        u32::from_str_radix(&digits, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error(ErrorCode::EEscape))
    }

    /*
     - bracket - a bracket expression, opening [ already absorbed
     */
    fn bracket(&mut self) -> Result<Parsed, Error> {
        let mut set = CharSet::empty();
        let negated = self.eat('^');
        let mut first = true;
        loop {
            let ch = match self.bump() {
                Some(ch) => ch,
                None => return Err(self.error(ErrorCode::EBrack)),
            };
            if ch == ']' && !first {
                break;
            }
            first = false;
            let lo = match (ch, self.peek()) {
                ('[', Some(':')) => {
                    self.bump();
                    let name = self.bracket_word(':')?;
                    let class = PosixClass::from_name(&name)
                        .ok_or_else(|| self.error(ErrorCode::ECtype))?;
                    set.push_class(class);
                    continue;
                }
                ('[', Some(delim @ ('=' | '.'))) => {
                    self.bump();
                    self.collating_element(delim)?
                }
                (ch, _) => ch,
            };
            if self.peek() == Some('-') && self.peek_nth(1).map_or(false, |c| c != ']') {
                self.bump();
                let hi = match (self.bump(), self.peek()) {
                    (Some('['), Some(delim @ ('=' | '.'))) => {
                        self.bump();
                        self.collating_element(delim)?
                    }
                    (Some('['), Some(':')) | (None, _) => return Err(self.error(ErrorCode::ERange)),
                    (Some(hi), _) => hi,
                };
                if lo > hi {
                    return Err(self.error(ErrorCode::ERange));
                }
                set.push_range(lo, hi);
            } else {
                set.push_range(lo, lo);
            }
        }
        if self.icase {
            set.fold_case();
        }
        set.set_negated(negated);
        if self.newline {
            set.exclude_newline();
        }
        Ok((Node::Literal(set), 1))
    }

    fn collating_element(&mut self, delim: char) -> Result<char, Error> {
        let word = self.bracket_word(delim)?;
        word.chars().exactly_one().map_err(|_| self.error(ErrorCode::ECollate))
    }

    // read up to the closing `<delim>]`
    fn bracket_word(&mut self, delim: char) -> Result<String, Error> {
        let mut word = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error(ErrorCode::EBrack)),
                Some(ch) if ch == delim && self.peek() == Some(']') => {
                    self.bump();
                    return Ok(word);
                }
                Some(ch) => word.push(ch),
            }
        }
    }

    /// Literal characters up to `stop` or the end of the pattern.
    fn literal_run(&mut self, stop: impl Fn(&mut Self) -> bool) -> Parsed {
        let mut items = Vec::new();
        while !stop(self) {
            match self.bump() {
                Some(ch) => items.push(self.literal(ch)),
                None => break,
            }
        }
        match items.len() {
            0 => (Node::Empty, 1),
            1 => (items.swap_remove(0), 1),
            _ => (Node::Concat(items), 2),
        }
    }

    fn literal(&self, ch: char) -> Node {
        let mut set = CharSet::single(ch);
        if self.icase {
            set.fold_case();
        }
        Node::Literal(set)
    }

    fn check_height(&self, height: usize) -> Result<usize, Error> {
        if height > MAX_NESTING {
            Err(Error::Size(SizeLimit::Nesting))
        } else {
            Ok(height)
        }
    }

    fn at_branch_end(&mut self) -> bool {
        self.peek().is_none() || self.at_alternation() || self.at_group_close()
    }

    fn at_alternation(&mut self) -> bool {
        match self.dialect {
            Dialect::Extended => self.peek() == Some('|'),
            Dialect::Basic => self.peek() == Some('\\') && self.peek_nth(1) == Some('|'),
            Dialect::Literal => false,
        }
    }

    fn at_group_close(&mut self) -> bool {
        match self.dialect {
            Dialect::Extended => self.peek() == Some(')'),
            Dialect::Basic => self.peek() == Some('\\') && self.peek_nth(1) == Some(')'),
            Dialect::Literal => false,
        }
    }

    fn eat_alternation(&mut self) -> bool {
        match self.dialect {
            Dialect::Extended => self.eat('|'),
            Dialect::Basic => self.eat_escaped('|'),
            Dialect::Literal => false,
        }
    }

    fn eat_group_close(&mut self) -> bool {
        match self.dialect {
            Dialect::Extended => self.eat(')'),
            Dialect::Basic => self.eat_escaped(')'),
            Dialect::Literal => false,
        }
    }

    fn error(&self, code: ErrorCode) -> Error {
        Error::syntax(code, self.offset)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn peek_nth(&mut self, n: usize) -> Option<char> {
        self.chars.peek_nth(n).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        self.offset += 1;
        Some(ch)
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_escaped(&mut self, ch: char) -> bool {
        if self.peek() == Some('\\') && self.peek_nth(1) == Some(ch) {
            self.bump();
            self.bump();
            true
        } else {
            false
        }
    }
}
