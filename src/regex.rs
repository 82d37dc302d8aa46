use bitflags::bitflags;

use crate::approx::{self, ApproxParams, EditCounts};
use crate::backtrack;
use crate::error::Error;
use crate::parse::parse;
use crate::source::{StrInput, StrSource};
use crate::tnfa::{compile, Context, Tnfa};

bitflags! {
    /// Options fixed when a pattern is compiled.
    pub struct CompileFlags: u32 {
        const EXTENDED = 0x01;       // POSIX extended syntax, basic otherwise
        const ICASE    = 0x02;
        const NEWLINE  = 0x04;       // `.` and `[^...]` skip '\n', anchors match around it
        const NOSUB    = 0x08;       // report the whole match only
        const LITERAL  = 0x10;       // every pattern character stands for itself
        const UNGREEDY = 0x40;       // repetitions are minimal unless followed by `?`
    }
}

bitflags! {
    /// Options for a single search.
    pub struct ExecFlags: u32 {
        const NOTBOL               = 0x01;  // start of text is not a line start
        const NOTEOL               = 0x02;  // end of text is not a line end
        const APPROX_MATCHER       = 0x04;
        const BACKTRACKING_MATCHER = 0x08;
    }
}

/// Half-open range of positions in the searched text, in the source's units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Submatch spans of a successful search. Slot 0 is the whole match,
/// slot `k` the `k`th parenthesized group. Groups that took no part in
/// the match, and slots past the pattern's group count, hold `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captures {
    slots: Vec<Option<Span>>,
}

impl Captures {
    pub fn get(&self, i: usize) -> Option<Span> {
        self.slots.get(i).copied().flatten()
    }

    /// Number of slots, as requested by the caller.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<Span>> + '_ {
        self.slots.iter().copied()
    }
}

/// Result of an approximate search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApproxMatch {
    pub captures: Captures,
    pub cost: u32,
    pub counts: EditCounts,
}

/// A compiled pattern.
///
/// Compiling is the expensive step; the result is immutable and can be
/// shared between threads and searched any number of times.
#[derive(Debug, Clone)]
pub struct Regex {
    tnfa: Tnfa,
    flags: CompileFlags,
}

impl Regex {
    /// Compiles a POSIX extended pattern.
    pub fn new(pattern: &str) -> Result<Regex, Error> {
        Regex::with_flags(pattern, CompileFlags::EXTENDED)
    }

    pub fn with_flags(pattern: &str, flags: CompileFlags) -> Result<Regex, Error> {
        let chars: Vec<char> = pattern.chars().collect();
        Regex::from_chars(&chars, flags)
    }

    /// Compiles a pattern given as wide characters. The slice may contain
    /// NUL, which is an ordinary pattern character.
    pub fn from_chars(pattern: &[char], flags: CompileFlags) -> Result<Regex, Error> {
        let ast = parse(pattern, flags)?;
        let tnfa = compile(&ast, flags)?;
        Ok(Regex { tnfa, flags })
    }

    /// Compiles a byte pattern, each byte read as the character of equal
    /// value. Pair with [`ByteInput`](crate::ByteInput) subjects.
    pub fn from_bytes(pattern: &[u8], flags: CompileFlags) -> Result<Regex, Error> {
        let chars: Vec<char> = pattern.iter().map(|&b| char::from(b)).collect();
        Regex::from_chars(&chars, flags)
    }

    /// Number of parenthesized groups.
    pub fn group_count(&self) -> usize {
        self.tnfa.num_groups
    }

    pub fn has_backrefs(&self) -> bool {
        self.tnfa.has_backrefs
    }

    pub fn flags(&self) -> CompileFlags {
        self.flags
    }

    /// Searches `text` for the leftmost match and reports up to `nmatch`
    /// capture slots. Offsets are byte offsets into `text`.
    pub fn exec(
        &self,
        text: &str,
        nmatch: usize,
        eflags: ExecFlags,
    ) -> Result<Option<Captures>, Error> {
        self.exec_at(text, 0, nmatch, eflags)
    }

    /// Like [`exec`](Regex::exec), starting at byte offset `start`. The
    /// text before `start` still decides anchors and word boundaries.
    pub fn exec_at(
        &self,
        text: &str,
        start: usize,
        nmatch: usize,
        eflags: ExecFlags,
    ) -> Result<Option<Captures>, Error> {
        if !text.is_char_boundary(start) {
            return Err(Error::InvalidArgument("start offset is not a character boundary"));
        }
        let prev = text[..start].chars().next_back();
        let mut input = StrInput::new(text);
        self.search(&mut input, start, prev, nmatch, eflags)
    }

    /// Searches any [`StrSource`] from its position zero.
    pub fn exec_source<S: StrSource + ?Sized>(
        &self,
        source: &mut S,
        nmatch: usize,
        eflags: ExecFlags,
    ) -> Result<Option<Captures>, Error> {
        self.search(source, 0, None, nmatch, eflags)
    }

    pub fn is_match(&self, text: &str) -> Result<bool, Error> {
        Ok(self.exec(text, 0, ExecFlags::empty())?.is_some())
    }

    /// Searches `text` for the cheapest match within `params`.
    pub fn aexec(
        &self,
        text: &str,
        nmatch: usize,
        params: &ApproxParams,
        eflags: ExecFlags,
    ) -> Result<Option<ApproxMatch>, Error> {
        let mut input = StrInput::new(text);
        self.aexec_source(&mut input, nmatch, params, eflags)
    }

    pub fn aexec_source<S: StrSource + ?Sized>(
        &self,
        source: &mut S,
        nmatch: usize,
        params: &ApproxParams,
        eflags: ExecFlags,
    ) -> Result<Option<ApproxMatch>, Error> {
        let ctx = self.context(eflags);
        if self.needs_backtracking(eflags)? {
            if !params.is_exact() {
                return Err(Error::InvalidArgument(
                    "the backtracking matcher cannot match approximately",
                ));
            }
            log::debug!("aexec: backtracking matcher");
            let tags = backtrack::execute(&self.tnfa, source, 0, None, ctx)?;
            return Ok(tags.map(|tags| ApproxMatch {
                captures: self.captures(&tags, nmatch),
                cost: 0,
                counts: EditCounts::default(),
            }));
        }
        log::debug!("aexec: parallel matcher, max cost {}", params.max_cost);
        let found = approx::execute(&self.tnfa, source, 0, None, params, ctx)?;
        Ok(found.map(|found| ApproxMatch {
            captures: self.captures(&found.tags, nmatch),
            cost: found.cost,
            counts: found.counts,
        }))
    }

    /*
     - best_matches - records whose best match is the cheapest in the corpus
     *
     * Two passes. The first finds the lowest cost any record can be matched
     * at, tightening the ceiling as it goes and stopping at the first exact
     * hit. The second collects every record matching at that cost.
     */
    pub fn best_matches<T: AsRef<str>>(
        &self,
        records: &[T],
        params: &ApproxParams,
    ) -> Result<Vec<(usize, ApproxMatch)>, Error> {
        let mut ceiling = params.max_cost;
        let mut found_any = false;
        for record in records {
            let bounded = ApproxParams { max_cost: ceiling, ..*params };
            if let Some(m) = self.aexec(record.as_ref(), 1, &bounded, ExecFlags::empty())? {
                ceiling = m.cost;
                found_any = true;
                if ceiling == 0 {
                    break;
                }
            }
        }
        if !found_any {
            return Ok(Vec::new());
        }
        log::debug!("best_matches: lowest cost {}", ceiling);

        let bounded = ApproxParams { max_cost: ceiling, ..*params };
        let mut best = Vec::new();
        for (i, record) in records.iter().enumerate() {
            if let Some(m) = self.aexec(record.as_ref(), 1, &bounded, ExecFlags::empty())? {
                if m.cost == ceiling {
                    best.push((i, m));
                }
            }
        }
        Ok(best)
    }

    fn search<S: StrSource + ?Sized>(
        &self,
        source: &mut S,
        start: usize,
        prev: Option<char>,
        nmatch: usize,
        eflags: ExecFlags,
    ) -> Result<Option<Captures>, Error> {
        let ctx = self.context(eflags);
        let tags = if self.needs_backtracking(eflags)? {
            log::debug!("exec: backtracking matcher");
            backtrack::execute(&self.tnfa, source, start, prev, ctx)?
        } else {
            log::debug!("exec: parallel matcher");
            let exact = ApproxParams::default();
            approx::execute(&self.tnfa, source, start, prev, &exact, ctx)?.map(|found| found.tags)
        };
        Ok(tags.map(|tags| self.captures(&tags, nmatch)))
    }

    // back-references or an explicit request pick the backtracker
    fn needs_backtracking(&self, eflags: ExecFlags) -> Result<bool, Error> {
        let backtracking =
            self.tnfa.has_backrefs || eflags.contains(ExecFlags::BACKTRACKING_MATCHER);
        if backtracking && eflags.contains(ExecFlags::APPROX_MATCHER) {
            return Err(Error::InvalidArgument("pattern or flags need the backtracking matcher"));
        }
        Ok(backtracking)
    }

    fn context(&self, eflags: ExecFlags) -> Context {
        Context {
            notbol: eflags.contains(ExecFlags::NOTBOL),
            noteol: eflags.contains(ExecFlags::NOTEOL),
            newline: self.tnfa.newline,
        }
    }

    fn captures(&self, tags: &[Option<usize>], nmatch: usize) -> Captures {
        let reported = if self.flags.contains(CompileFlags::NOSUB) { 1 } else { self.tnfa.slots() };
        let slots = (0..nmatch)
            .map(|i| {
                if i >= reported {
                    return None;
                }
                match (tags[2 * i], tags[2 * i + 1]) {
                    (Some(start), Some(end)) if start <= end => Some(Span { start, end }),
                    _ => None,
                }
            })
            .collect();
        Captures { slots }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::{ErrorCode, SizeLimit};
    use crate::source::{ByteInput, CharInput};

    fn span(start: usize, end: usize) -> Option<Span> {
        Some(Span { start, end })
    }

    fn whole(re: &Regex, text: &str) -> Option<Span> {
        re.exec(text, 1, ExecFlags::empty()).unwrap().and_then(|m| m.get(0))
    }

    #[test]
    fn test_regex_comp_ok_simple() {
        let patterns = [
            "a", "abcdefg", "a|b", "^a", "a$", "a*", "a?", "a+", "(a|b)c*d+", "(a+|b)?",
        ];
        for pattern in patterns {
            assert!(Regex::new(pattern).is_ok(), "{}", pattern);
        }
        assert!(Regex::new("hello world! Have a good day.").is_ok());
    }

    #[test]
    fn test_regex_comp_err_simple() {
        assert_eq!(Regex::new("a(").unwrap_err().code(), ErrorCode::EParen);
        assert_eq!(Regex::new("+a").unwrap_err().code(), ErrorCode::BadRpt);
        assert_eq!(Regex::new("a{2,1}").unwrap_err().code(), ErrorCode::BadBr);
    }

    #[test]
    fn test_regex_back_reference_scenarios() {
        let re = Regex::new("(foo)\\1").unwrap();
        assert!(re.has_backrefs());
        let m = re.exec("xfoofofoofoo", 2, ExecFlags::empty()).unwrap().unwrap();
        assert_eq!(m.get(0), span(6, 12));
        assert_eq!(m.get(1), span(6, 9));

        let re = Regex::new("(cat|dog)\\1").unwrap();
        assert_eq!(re.exec("catdog", 2, ExecFlags::empty()).unwrap(), None);
        let m = re.exec("dogdog", 2, ExecFlags::empty()).unwrap().unwrap();
        assert_eq!(m.get(0), span(0, 6));
        assert_eq!(m.get(1), span(0, 3));
    }

    #[test]
    fn test_regex_approximate_scenarios() {
        let re = Regex::new("optimize").unwrap();
        let m = re
            .aexec("optimise", 1, &ApproxParams::with_max_cost(2), ExecFlags::empty())
            .unwrap()
            .unwrap();
        assert_eq!(m.cost, 1);
        assert_eq!(m.counts, EditCounts { ins: 0, del: 0, subst: 1 });
        assert_eq!(m.captures.get(0), span(0, 8));

        assert_eq!(
            re.aexec("optimise", 1, &ApproxParams::default(), ExecFlags::empty()).unwrap(),
            None
        );
    }

    #[test]
    fn test_regex_size_limit() {
        let err = Regex::new("(abcdefghij){1,100000}").unwrap_err();
        assert_eq!(err, Error::Size(SizeLimit::Automaton));
        assert_eq!(err.code(), ErrorCode::ESize);
    }

    #[test]
    fn test_regex_back_references_refuse_approximation() {
        let re = Regex::new("(a)\\1").unwrap();
        assert!(matches!(
            re.aexec("aa", 1, &ApproxParams::with_max_cost(1), ExecFlags::empty()),
            Err(Error::InvalidArgument(_))
        ));
        let m = re.aexec("baa", 2, &ApproxParams::default(), ExecFlags::empty()).unwrap().unwrap();
        assert_eq!(m.cost, 0);
        assert_eq!(m.captures.get(0), span(1, 3));
        assert_eq!(m.captures.get(1), span(1, 2));
    }

    #[test]
    fn test_regex_aexec_honours_matcher_flags() {
        let exact = ApproxParams::default();
        let re = Regex::new("(a)\\1").unwrap();
        assert!(matches!(
            re.aexec("aa", 1, &exact, ExecFlags::APPROX_MATCHER),
            Err(Error::InvalidArgument(_))
        ));

        let re = Regex::new("colou?r").unwrap();
        let loose = ApproxParams::with_max_cost(1);
        assert!(matches!(
            re.aexec("colr", 1, &loose, ExecFlags::BACKTRACKING_MATCHER),
            Err(Error::InvalidArgument(_))
        ));
        let both = ExecFlags::APPROX_MATCHER | ExecFlags::BACKTRACKING_MATCHER;
        assert!(matches!(re.aexec("color", 1, &exact, both), Err(Error::InvalidArgument(_))));
        let m = re.aexec("a colour", 1, &exact, ExecFlags::BACKTRACKING_MATCHER).unwrap().unwrap();
        assert_eq!((m.cost, m.captures.get(0)), (0, span(2, 8)));
        let m = re.aexec("colr", 1, &loose, ExecFlags::APPROX_MATCHER).unwrap().unwrap();
        assert_eq!(m.cost, 1);
    }

    #[test]
    fn test_regex_literal_mode() {
        let re = Regex::with_flags("a.b*(", CompileFlags::LITERAL).unwrap();
        assert_eq!(whole(&re, "a.b*("), span(0, 5));
        assert_eq!(whole(&re, "xa.b*(y"), span(1, 6));
        assert_eq!(whole(&re, "axbbb("), None);
        assert_eq!(re.group_count(), 0);
    }

    #[test]
    fn test_regex_compile_is_deterministic() {
        let first = Regex::new("(a|ab)(c|bcd)(d*)").unwrap();
        let second = Regex::new("(a|ab)(c|bcd)(d*)").unwrap();
        for text in ["abcd", "abcdd", "xx", "acd"] {
            assert_eq!(
                first.exec(text, 4, ExecFlags::empty()).unwrap(),
                second.exec(text, 4, ExecFlags::empty()).unwrap()
            );
        }
    }

    #[test]
    fn test_regex_matchers_agree() {
        let re = Regex::new("(a|b)*c(d?)").unwrap();
        for text in ["abacd", "c", "xxabcdd", "ab"] {
            assert_eq!(
                re.exec(text, 3, ExecFlags::empty()).unwrap(),
                re.exec(text, 3, ExecFlags::BACKTRACKING_MATCHER).unwrap(),
                "{}",
                text
            );
        }
        assert!(matches!(
            re.exec("c", 1, ExecFlags::APPROX_MATCHER | ExecFlags::BACKTRACKING_MATCHER),
            Err(Error::InvalidArgument(_))
        ));
        assert!(re.exec("c", 1, ExecFlags::APPROX_MATCHER).unwrap().is_some());
    }

    #[test]
    fn test_regex_matchers_agree_on_generated_patterns() {
        let atoms = ["a", "b", ".", "a*", "b?", "()", "(a|)", "(a*|b)", "(b*|.)", "((a)*|c)"];
        let mut texts = vec![String::new()];
        for len in 1..=3 {
            for n in 0..3usize.pow(len) {
                let text = (0..len)
                    .map(|i| ['a', 'b', 'c'][n / 3usize.pow(i) % 3])
                    .collect::<String>();
                texts.push(text);
            }
        }
        for x in atoms {
            for y in atoms {
                let shapes = [
                    format!("({}{})*", x, y),
                    format!("({}|{})+", x, y),
                    format!("({})*{}", x, y),
                    format!("{}({})*?", x, y),
                    format!("({}{}){{1,2}}", x, y),
                ];
                for pattern in &shapes {
                    let re = Regex::new(pattern).unwrap();
                    let slots = re.group_count() + 1;
                    for text in &texts {
                        assert_eq!(
                            re.exec(text, slots, ExecFlags::empty()).unwrap(),
                            re.exec(text, slots, ExecFlags::BACKTRACKING_MATCHER).unwrap(),
                            "{} on {:?}",
                            pattern,
                            text
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_regex_nmatch_and_nosub() {
        let re = Regex::new("(a)").unwrap();
        let m = re.exec("a", 4, ExecFlags::empty()).unwrap().unwrap();
        assert_eq!(m.len(), 4);
        assert_eq!(m.get(1), span(0, 1));
        assert_eq!(m.get(2), None);
        assert_eq!(m.get(3), None);

        let re = Regex::with_flags("(a)(b)", CompileFlags::EXTENDED | CompileFlags::NOSUB).unwrap();
        let m = re.exec("ab", 3, ExecFlags::empty()).unwrap().unwrap();
        assert_eq!(m.iter().collect::<Vec<_>>(), vec![span(0, 2), None, None]);

        let m = Regex::new("b").unwrap().exec("ab", 0, ExecFlags::empty()).unwrap().unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn test_regex_flags() {
        let re = Regex::with_flags("hello", CompileFlags::EXTENDED | CompileFlags::ICASE).unwrap();
        assert_eq!(whole(&re, "Say HeLLo"), span(4, 9));
        assert_eq!(re.flags(), CompileFlags::EXTENDED | CompileFlags::ICASE);

        let re = Regex::with_flags("^b$", CompileFlags::EXTENDED | CompileFlags::NEWLINE).unwrap();
        assert_eq!(whole(&re, "a\nb\nc"), span(2, 3));
        assert_eq!(whole(&Regex::new("^b$").unwrap(), "a\nb\nc"), None);

        let re = Regex::with_flags("a.c", CompileFlags::EXTENDED | CompileFlags::NEWLINE).unwrap();
        assert_eq!(whole(&re, "a\nc"), None);

        let re = Regex::with_flags("a+", CompileFlags::EXTENDED | CompileFlags::UNGREEDY).unwrap();
        assert_eq!(whole(&re, "aaa"), span(0, 1));

        let re = Regex::new("^a").unwrap();
        assert_eq!(re.exec("a", 1, ExecFlags::NOTBOL).unwrap(), None);
        let re = Regex::new("a$").unwrap();
        assert_eq!(re.exec("a", 1, ExecFlags::NOTEOL).unwrap(), None);
    }

    #[test]
    fn test_regex_basic_syntax() {
        let re = Regex::with_flags("\\(ab*\\)\\{2\\}c", CompileFlags::empty()).unwrap();
        let m = re.exec("xabbac", 2, ExecFlags::empty()).unwrap().unwrap();
        assert_eq!(m.get(0), span(1, 6));
        assert_eq!(m.get(1), span(4, 5));
        let re = Regex::with_flags("a|b", CompileFlags::empty()).unwrap();
        assert_eq!(whole(&re, "a|b"), span(0, 3));
    }

    #[test]
    fn test_regex_exec_at() {
        let re = Regex::new("\\<ab").unwrap();
        let m = re.exec_at("xab ab", 1, 1, ExecFlags::empty()).unwrap().unwrap();
        assert_eq!(m.get(0), span(4, 6));

        let re = Regex::new("^a").unwrap();
        assert_eq!(re.exec_at("xa", 1, 1, ExecFlags::empty()).unwrap(), None);
        assert!(matches!(
            re.exec_at("é", 1, 1, ExecFlags::empty()),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            re.exec_at("a", 5, 1, ExecFlags::empty()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_regex_sources() {
        let re = Regex::new("é+").unwrap();
        assert_eq!(whole(&re, "aéé"), span(1, 5));

        let pattern: Vec<char> = "b+".chars().collect();
        let text: Vec<char> = "abbb".chars().collect();
        let re = Regex::from_chars(&pattern, CompileFlags::EXTENDED).unwrap();
        let m = re.exec_source(&mut CharInput::new(&text), 1, ExecFlags::empty()).unwrap().unwrap();
        assert_eq!(m.get(0), span(1, 4));

        let re = Regex::from_bytes(b"a.c", CompileFlags::EXTENDED).unwrap();
        let mut input = ByteInput::new(b"xxabc");
        let m = re.exec_source(&mut input, 1, ExecFlags::empty()).unwrap().unwrap();
        assert_eq!(m.get(0), span(2, 5));

        let re = Regex::new("(ab)\\1").unwrap();
        let exact = ApproxParams::default();
        let m = re
            .aexec_source(&mut ByteInput::new(b"abab"), 2, &exact, ExecFlags::empty())
            .unwrap()
            .unwrap();
        assert_eq!(m.captures.get(1), span(0, 2));
    }

    #[test]
    fn test_regex_is_match() {
        let re = Regex::new("b[0-9]+").unwrap();
        assert!(re.is_match("ab12").unwrap());
        assert!(!re.is_match("ab").unwrap());
    }

    #[test]
    fn test_regex_best_matches() {
        let re = Regex::new("optimize").unwrap();
        let records = ["optimse", "optimise", "nothing here"];
        let best = re.best_matches(&records, &ApproxParams::with_max_cost(3)).unwrap();
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].0, 1);
        assert_eq!(best[0].1.cost, 1);

        let records = vec![
            "optimise".to_string(),
            "to optimize".to_string(),
            "optimize".to_string(),
        ];
        let best = re.best_matches(&records, &ApproxParams::with_max_cost(3)).unwrap();
        assert_eq!(best.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![1, 2]);
        assert!(best.iter().all(|(_, m)| m.cost == 0));

        let best = re.best_matches(&["zzz"], &ApproxParams::with_max_cost(1)).unwrap();
        assert!(best.is_empty());
    }

    #[test]
    fn test_regex_is_send_and_sync() {
        fn shareable<T: Send + Sync>() {}
        shareable::<Regex>();
    }
}
