//! approx-regex - POSIX regular expressions with exact and approximate matching
//!
//! ## Usage
//! see regex.rs test mod
//!
//! ```plain
//!     let re = Regex::new("optimi[sz]e")?;
//!     re.exec("we optimise", 1, ExecFlags::empty())?       // whole match at 3..11
//!
//!     let re = Regex::new("optimize")?;
//!     re.aexec("optimise", 1, &ApproxParams::with_max_cost(2), ExecFlags::empty())?
//!                                                          // cost 1, one substitution
//! ```
//!
//! ## Regular Expressions:
//!
//! ```plain
//!     char        match itself
//!
//!      .          match any character (not '\n' with NEWLINE)
//!
//!      \          matches the character following it, or starts an escape:
//!                 \1-\9 back-reference, \< \> word start/end, \b \B word
//!                 boundary/not, \w \W \s \S \d \D classes, \n \t \r \f \e,
//!                 \xHH \x{HHHH} code points, \Q...\E literal text
//!
//!     [set]       matches one of the characters in the set. If the first
//!                 character in the set is "^", it matches a character NOT in
//!                 the set. Ranges a-z, classes [:alpha:], [=c=] and [.c.]
//!
//!     ( )         group, numbered by its opening parenthesis
//!
//!      |          alternation, the earlier branch is preferred
//!
//!   * + ? {m,n}   repetition; a trailing ? makes it minimal
//!
//!      ^ $        beginning and end of line
//! ```
//!
//! Basic syntax (no EXTENDED flag) spells groups, bounds and alternation
//! `\( \)`, `\{ \}` and `\|`.
//!
//! ## Matching
//!
//! Patterns compile to an automaton whose epsilon edges carry tags, the
//! positions where submatches begin and end. Patterns without
//! back-references are searched by a parallel simulation that can also
//! charge for insertions, deletions and substitutions; back-references go
//! through a backtracking search. Either way the leftmost match wins, and
//! among matches starting there the one preferred by branch order and
//! greediness.
//!
#[macro_use]
extern crate enum_display_derive;

mod approx;
mod backtrack;
mod charset;
mod error;
mod parse;
mod regex;
mod source;
mod stack;
mod tnfa;

pub use approx::{ApproxParams, EditCounts, MAX_APPROX_CELLS};
pub use backtrack::{BACKTRACK_STACK_INCR, BACKTRACK_STACK_INIT, BACKTRACK_STACK_MAX};
pub use error::{Error, ErrorCode, SizeLimit};
pub use parse::{DUP_MAX, MAX_NESTING, MAX_PATTERN_LEN};
pub use regex::{ApproxMatch, Captures, CompileFlags, ExecFlags, Regex, Span};
pub use source::{ByteInput, CharInput, StrInput, StrSource};
pub use stack::Stack;
pub use tnfa::MAX_STATES;
