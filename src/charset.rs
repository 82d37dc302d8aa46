use itertools::Itertools;
use std::fmt::Display;

/// Ranges wider than this are folded only below `FOLD_SPAN_MAX`, which
/// covers the Latin, Greek and Cyrillic blocks.
const FOLD_SPAN_MAX: u32 = 0x800;

/// POSIX bracket expression classes, `[:name:]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub(crate) enum PosixClass {
    Alnum,
    Alpha,
    Blank,
    Cntrl,
    Digit,
    Graph,
    Lower,
    Print,
    Punct,
    Space,
    Upper,
    Xdigit,
}

impl PosixClass {
    pub(crate) fn from_name(name: &str) -> Option<PosixClass> {
        let class = match name {
            "alnum" => PosixClass::Alnum,
            "alpha" => PosixClass::Alpha,
            "blank" => PosixClass::Blank,
            "cntrl" => PosixClass::Cntrl,
            "digit" => PosixClass::Digit,
            "graph" => PosixClass::Graph,
            "lower" => PosixClass::Lower,
            "print" => PosixClass::Print,
            "punct" => PosixClass::Punct,
            "space" => PosixClass::Space,
            "upper" => PosixClass::Upper,
            "xdigit" => PosixClass::Xdigit,
            _ => return None,
        };
        Some(class)
    }

    pub(crate) fn matches(self, ch: char) -> bool {
        match self {
            PosixClass::Alnum => ch.is_alphanumeric(),
            PosixClass::Alpha => ch.is_alphabetic(),
            PosixClass::Blank => ch == ' ' || ch == '\t',
            PosixClass::Cntrl => ch.is_control(),
            PosixClass::Digit => ch.is_ascii_digit(),
            PosixClass::Graph => !ch.is_control() && !ch.is_whitespace(),
            PosixClass::Lower => ch.is_lowercase(),
            PosixClass::Print => !ch.is_control(),
            PosixClass::Punct => {
                ch.is_ascii_punctuation()
                    || (!ch.is_ascii()
                        && !ch.is_alphanumeric()
                        && !ch.is_whitespace()
                        && !ch.is_control())
            }
            PosixClass::Space => ch.is_whitespace(),
            PosixClass::Upper => ch.is_uppercase(),
            PosixClass::Xdigit => ch.is_ascii_hexdigit(),
        }
    }
}

/// Characters that make up a word for `\<`, `\>`, `\b`, `\B` and `\w`.
pub(crate) fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ClassItem {
    Range(char, char),
    Class(PosixClass),
}

/// Predicate over single input symbols: the payload of a consuming
/// transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CharSet {
    items: Vec<ClassItem>,
    negated: bool,
}

impl CharSet {
    pub(crate) fn empty() -> CharSet {
        CharSet { items: Vec::new(), negated: false }
    }

    pub(crate) fn single(ch: char) -> CharSet {
        CharSet { items: vec![ClassItem::Range(ch, ch)], negated: false }
    }

    /// Matches every symbol; `.` outside newline-sensitive mode.
    pub(crate) fn any() -> CharSet {
        CharSet { items: Vec::new(), negated: true }
    }

    pub(crate) fn of_class(class: PosixClass, negated: bool) -> CharSet {
        CharSet { items: vec![ClassItem::Class(class)], negated }
    }

    pub(crate) fn push_range(&mut self, lo: char, hi: char) {
        self.items.push(ClassItem::Range(lo, hi));
    }

    pub(crate) fn push_class(&mut self, class: PosixClass) {
        self.items.push(ClassItem::Class(class));
    }

    pub(crate) fn set_negated(&mut self, negated: bool) {
        self.negated = negated;
    }

    pub(crate) fn matches(&self, ch: char) -> bool {
        let hit = self.items.iter().any(|item| match *item {
            ClassItem::Range(lo, hi) => lo <= ch && ch <= hi,
            ClassItem::Class(class) => class.matches(ch),
        });
        hit != self.negated
    }

    /// A non-matching list never matches a newline in newline-sensitive
    /// mode. Matching lists are left as written.
    pub(crate) fn exclude_newline(&mut self) {
        if self.negated {
            self.push_range('\n', '\n');
        }
    }

    /// Adds the case counterparts of every member, so matching can stay a
    /// plain membership test.
    pub(crate) fn fold_case(&mut self) {
        let mut extra = Vec::new();
        let mut classes = Vec::new();
        for item in &self.items {
            match *item {
                ClassItem::Range(lo, hi) => {
                    let hi = if (hi as u32).saturating_sub(lo as u32) > FOLD_SPAN_MAX {
                        match char::from_u32(FOLD_SPAN_MAX - 1) {
                            Some(top) if lo <= top => top,
                            _ => continue,
                        }
                    } else {
                        hi
                    };
                    for ch in lo..=hi {
                        extra.extend(case_variants(ch));
                    }
                }
                ClassItem::Class(PosixClass::Lower) => classes.push(PosixClass::Upper),
                ClassItem::Class(PosixClass::Upper) => classes.push(PosixClass::Lower),
                ClassItem::Class(_) => {}
            }
        }
        extra.retain(|&ch| !self.contains_literally(ch));
        extra.sort_unstable();
        extra.dedup();
        let ranges = extra
            .into_iter()
            .map(|ch| (ch, ch))
            .coalesce(|a, b| match char::from_u32(a.1 as u32 + 1) {
                Some(next) if next == b.0 => Ok((a.0, b.1)),
                _ => Err((a, b)),
            })
            .collect_vec();
        for (lo, hi) in ranges {
            self.push_range(lo, hi);
        }
        for class in classes {
            if !self.items.contains(&ClassItem::Class(class)) {
                self.push_class(class);
            }
        }
    }

    fn contains_literally(&self, ch: char) -> bool {
        self.items
            .iter()
            .any(|item| matches!(*item, ClassItem::Range(lo, hi) if lo <= ch && ch <= hi))
    }
}

fn case_variants(ch: char) -> impl Iterator<Item = char> {
    let lower = ch.to_lowercase().exactly_one().ok();
    let upper = ch.to_uppercase().exactly_one().ok();
    lower.into_iter().chain(upper).filter(move |&v| v != ch)
}

impl Display for CharSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.negated && self.items.is_empty() {
            return write!(f, ".");
        }
        if !self.negated {
            if let [ClassItem::Range(lo, hi)] = self.items.as_slice() {
                if lo == hi {
                    return write!(f, "{}", lo.escape_debug());
                }
            }
        }
        write!(f, "[")?;
        if self.negated {
            write!(f, "^")?;
        }
        for item in &self.items {
            match *item {
                ClassItem::Range(lo, hi) if lo == hi => write!(f, "{}", lo.escape_debug())?,
                ClassItem::Range(lo, hi) => {
                    write!(f, "{}-{}", lo.escape_debug(), hi.escape_debug())?
                }
                ClassItem::Class(class) => write!(f, "[:{}:]", class.to_string().to_lowercase())?,
            }
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_charset_membership() {
        let mut set = CharSet::empty();
        set.push_range('a', 'f');
        set.push_class(PosixClass::Digit);
        assert!(set.matches('c'));
        assert!(set.matches('7'));
        assert!(!set.matches('g'));
        set.set_negated(true);
        assert!(!set.matches('c'));
        assert!(set.matches('g'));
        assert!(CharSet::any().matches('\n'));
    }

    #[test]
    fn test_charset_exclude_newline() {
        let mut dot = CharSet::any();
        dot.exclude_newline();
        assert!(!dot.matches('\n'));
        assert!(dot.matches('x'));

        let mut set = CharSet::single('\n');
        set.exclude_newline();
        assert!(set.matches('\n'));
    }

    #[test]
    fn test_charset_fold_case() {
        let mut set = CharSet::empty();
        set.push_range('a', 'c');
        set.push_range('X', 'X');
        set.fold_case();
        for ch in ['a', 'b', 'c', 'A', 'B', 'C', 'x', 'X'] {
            assert!(set.matches(ch), "{}", ch);
        }
        assert!(!set.matches('d'));
        assert!(!set.matches('D'));

        let mut lower = CharSet::of_class(PosixClass::Lower, false);
        lower.fold_case();
        assert!(lower.matches('Q'));
    }

    #[test]
    fn test_charset_fold_case_wide_range() {
        let mut set = CharSet::empty();
        set.push_range('a', '\u{FFFF}');
        set.fold_case();
        assert!(set.matches('A'));
        assert!(set.matches('Z'));
        assert!(!set.matches('0'));

        // nothing below the fold limit: left as written
        let mut set = CharSet::empty();
        set.push_range('\u{1000}', '\u{FFFF}');
        set.fold_case();
        assert!(!set.matches('A'));
    }

    #[test]
    fn test_posix_class_names() {
        assert_eq!(PosixClass::from_name("alpha"), Some(PosixClass::Alpha));
        assert_eq!(PosixClass::from_name("xdigit"), Some(PosixClass::Xdigit));
        assert_eq!(PosixClass::from_name("letter"), None);
        assert!(PosixClass::Punct.matches('!'));
        assert!(!PosixClass::Punct.matches('a'));
        assert!(PosixClass::Blank.matches('\t'));
    }

    #[test]
    fn test_charset_display() {
        let mut set = CharSet::empty();
        set.push_range('a', 'z');
        set.push_class(PosixClass::Digit);
        assert_eq!(set.to_string(), "[a-z[:digit:]]");
        assert_eq!(CharSet::single('q').to_string(), "q");
        assert_eq!(CharSet::any().to_string(), ".");
    }
}
