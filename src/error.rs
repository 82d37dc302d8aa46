use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt::Display;

/// Stable numeric codes for every failure the engine can report.
///
/// The numbering follows the classic `reg_errcode_t` table so command line
/// tools and bindings can map exit statuses 1:1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    NoMatch = 1,
    BadPat = 2,
    ECollate = 3,
    ECtype = 4,
    EEscape = 5,
    ESubreg = 6,
    EBrack = 7,
    EParen = 8,
    EBrace = 9,
    BadBr = 10,
    ERange = 11,
    ESpace = 12,
    BadRpt = 13,
    ESize = 14,
    EInval = 15,
}

impl ErrorCode {
    /// Human readable text for the code.
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::Ok => "No error",
            ErrorCode::NoMatch => "No match",
            ErrorCode::BadPat => "Invalid regexp",
            ErrorCode::ECollate => "Unknown collating element",
            ErrorCode::ECtype => "Unknown character class name",
            ErrorCode::EEscape => "Trailing backslash",
            ErrorCode::ESubreg => "Invalid back reference",
            ErrorCode::EBrack => "Missing ']'",
            ErrorCode::EParen => "Missing ')'",
            ErrorCode::EBrace => "Missing '}'",
            ErrorCode::BadBr => "Invalid contents of {}",
            ErrorCode::ERange => "Invalid character range",
            ErrorCode::ESpace => "Out of memory",
            ErrorCode::BadRpt => "Invalid use of repetition operators",
            ErrorCode::ESize => "Regexp or search state too large",
            ErrorCode::EInval => "Invalid argument",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Which fixed ceiling a pattern or a search ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SizeLimit {
    Pattern,
    Nesting,
    Automaton,
    SearchTable,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Malformed pattern. `offset` counts characters consumed by the parser.
    #[error("{code} (at offset {offset})")]
    Syntax { code: ErrorCode, offset: usize },
    #[error("{0} exceeds its size limit")]
    Size(SizeLimit),
    #[error("out of space: {0}")]
    OutOfSpace(&'static str),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

impl Error {
    pub(crate) fn syntax(code: ErrorCode, offset: usize) -> Error {
        Error::Syntax { code, offset }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Syntax { code, .. } => *code,
            Error::Size(_) => ErrorCode::ESize,
            Error::OutOfSpace(_) => ErrorCode::ESpace,
            Error::InvalidArgument(_) => ErrorCode::EInval,
        }
    }
}
