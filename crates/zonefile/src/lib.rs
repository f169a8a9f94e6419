//! Parsing RFC 1035 master files into an ordered entry sequence.
//!
//! Unlike a resolver-oriented zone parser, this crate keeps everything it
//! reads: comments, control directives (`$ORIGIN`, `$TTL`, ...) and resource
//! records appear in a [`Zonefile`] in their original order.  Records are kept
//! at the token level; rdata is a sequence of strings, not typed record data.
//! This is what an editor needs: it can move, match and splice entries and
//! write them back without understanding every record type.
//!
//! The supported syntax is the common subset of the master file format:
//! `;` comments, single-level `(`...`)` line continuation, `"`-quoted strings
//! with `\"` escapes, and owner inheritance for lines starting with
//! whitespace.  `$INCLUDE` is carried through as an opaque control entry and
//! never followed.

use std::fmt;

use domain::base::iana::Rtype;

mod scan;

//----------- Zonefile ---------------------------------------------------------

/// A parsed master file: an ordered sequence of entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Zonefile {
    entries: Vec<Entry>,
}

impl Zonefile {
    /// Parse a master file from text.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        Ok(Self {
            entries: scan::scan(text)?,
        })
    }

    /// Parse a master file from raw bytes.
    ///
    /// The input must be valid UTF-8; anything else is reported as a
    /// [`ParseError`] on the offending line.
    pub fn parse_bytes(data: &[u8]) -> Result<Self, ParseError> {
        match std::str::from_utf8(data) {
            Ok(text) => Self::parse(text),
            Err(err) => {
                let line = data[..err.valid_up_to()]
                    .iter()
                    .filter(|&&b| b == b'\n')
                    .count()
                    + 1;
                Err(ParseError::new(line, ParseErrorKind::NotUtf8))
            }
        }
    }

    /// The entries in source order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Consume the file, yielding its entries.
    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }
}

//----------- Entry ------------------------------------------------------------

/// One element of a master file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entry {
    /// A run of consecutive comment-only lines.
    Comment(Comment),

    /// A `$...` control directive.
    Control(Control),

    /// A resource record.
    Record(Record),
}

impl Entry {
    /// The contained record, if this entry is one.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Entry::Record(record) => Some(record),
            _ => None,
        }
    }

    /// The contained record, mutably.
    pub fn as_record_mut(&mut self) -> Option<&mut Record> {
        match self {
            Entry::Record(record) => Some(record),
            _ => None,
        }
    }
}

//----------- Comment ----------------------------------------------------------

/// Consecutive comment-only lines, stored verbatim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Comment {
    /// The comment lines, each including its leading `;`.
    pub lines: Vec<String>,
}

//----------- Control ----------------------------------------------------------

/// A control directive such as `$ORIGIN example.org.`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Control {
    /// The directive, including the `$`.
    pub command: String,

    /// The argument tokens.
    pub args: Vec<String>,
}

//----------- Record -----------------------------------------------------------

/// A resource record at the token level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// The owner name as written.  Empty means "inherit the previous owner".
    pub owner: String,

    /// The time to live, in seconds, if one was given.
    pub ttl: Option<u32>,

    /// The class as written, if one was given.
    pub class: Option<String>,

    /// The record type mnemonic as written.
    pub rtype: String,

    /// The rdata tokens in order.  Quoted strings are stored unescaped and
    /// without their quotes.
    pub values: Vec<String>,
}

impl Record {
    /// The numeric record type, if the mnemonic (or `TYPEnnn` form) is known.
    pub fn rtype_code(&self) -> Option<Rtype> {
        self.rtype.parse().ok()
    }
}

//----------- parse_ttl --------------------------------------------------------

/// Parse a TTL token: plain decimal seconds, or decimal with a single
/// `W`/`D`/`H`/`M` unit suffix (case-insensitive).
pub fn parse_ttl(token: &str) -> Option<u32> {
    if token.is_empty() || !token.is_ascii() {
        return None;
    }
    if token.bytes().all(|b| b.is_ascii_digit()) {
        return token.parse().ok();
    }

    let (digits, unit) = token.split_at(token.len() - 1);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u32 = digits.parse().ok()?;
    let unit_secs = match unit {
        "w" | "W" => 604_800,
        "d" | "D" => 86_400,
        "h" | "H" => 3_600,
        "m" | "M" => 60,
        _ => return None,
    };
    value.checked_mul(unit_secs)
}

//----------- ParseError -------------------------------------------------------

/// An error while parsing a master file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    /// The 1-based line the error was detected on.
    pub line: usize,

    /// What went wrong.
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub(crate) fn new(line: usize, kind: ParseErrorKind) -> Self {
        Self { line, kind }
    }
}

/// The kinds of [`ParseError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The input was not valid UTF-8.
    NotUtf8,

    /// A quoted string was not closed before the end of the line.
    UnterminatedString,

    /// A `)` without a matching `(`, or `(` left open at the end of input.
    UnbalancedParen,

    /// A `(` inside an already open `(`.
    NestedParen,

    /// A record line without a record type token.
    MissingType,
}

impl std::error::Error for ParseError {}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: ", self.line)?;
        match self.kind {
            ParseErrorKind::NotUtf8 => f.write_str("input is not valid UTF-8"),
            ParseErrorKind::UnterminatedString => f.write_str("unterminated quoted string"),
            ParseErrorKind::UnbalancedParen => f.write_str("unbalanced parenthesis"),
            ParseErrorKind::NestedParen => f.write_str("nested parentheses are not allowed"),
            ParseErrorKind::MissingType => f.write_str("record has no type"),
        }
    }
}
