//! The canonicalizing zone file reformatter.
//!
//! [`reformat`] parses a master file and prints it back in a fixed layout:
//! owners are stripped to their origin-relative form and grouped, columns are
//! aligned on the longest owner, TTLs become their shortest unit form, and a
//! handful of record types get multi-line parenthesized layouts.  Feeding the
//! output back in reproduces it exactly (modulo the serial bump), which is
//! what keeps hand-edited and machine-edited zone files converging on the
//! same shape.

use std::collections::HashMap;
use std::fmt;
use std::io;

use domain::base::iana::Rtype;
use zonewright_zonefile::{Entry, ParseError, Record, Zonefile};

use self::time::{humanize_duration, increase_serial, serial_to_human_date};

pub mod time;

/// The gap between the type column and the value.
const GUTTER: &str = "   ";

/// Extra indent for continuation lines inside parentheses.
const INDENT: usize = 29;

/// Continuation lines of split-up rdata carry this many characters.
const CHUNK_LEN: usize = 55;

/// Digest-style rdata up to this long stays on the record's own line.
const INLINE_MAX: usize = 64;

/// Annotations for the parenthesized SOA fields, in rdata order.
const SOA_FIELDS: [&str; 5] = ["; serial", "; refresh", "; retry", "; expire", "; minimum"];

//----------- reformat ---------------------------------------------------------

/// Reformat a master file.
///
/// `origin` seeds origin stripping; a `$ORIGIN` directive in the input (or,
/// failing that, the owner of the SOA record) takes over from there.  With
/// `increment_serial` the SOA serial is bumped on the way through.
pub fn reformat<W: io::Write>(
    input: &[u8],
    origin: Option<&str>,
    out: &mut W,
    increment_serial: bool,
) -> Result<(), FmtError> {
    let mut entries = Zonefile::parse_bytes(input)?.into_entries();
    let layout = scan(&mut entries, origin)?;
    emit(&entries, &layout, out, increment_serial)
}

//----------- fqdn, strip_origin -----------------------------------------------

/// Append a trailing dot unless the name already has one (or is empty).
pub fn fqdn(name: &str) -> String {
    if name.is_empty() || name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

/// Strip a trailing origin from a name.
///
/// A name equal to the origin becomes `@`; a name ending in `.<origin>`
/// loses that suffix; anything else passes through unchanged.
pub fn strip_origin<'a>(origin: &str, name: &'a str) -> &'a str {
    if origin.is_empty() || !name.ends_with(origin) {
        return name;
    }
    if name.len() == origin.len() {
        return "@";
    }
    let prefix = &name[..name.len() - origin.len()];
    match prefix.strip_suffix('.') {
        Some(label) => label,
        None => name,
    }
}

//----------- Pass 1: scan -----------------------------------------------------

/// What the scan pass learns about the file.
struct Layout {
    /// The owner column width: longest stripped owner plus two.
    width: usize,

    /// Records per stripped owner, inherited owners resolved.
    owner_counts: HashMap<String, usize>,
}

/// Strip origins, and gather the column width and per-owner record counts.
fn scan(entries: &mut [Entry], origin_hint: Option<&str>) -> Result<Layout, FmtError> {
    let mut origin = fqdn(origin_hint.unwrap_or(""));
    let mut owner_counts = HashMap::new();
    let mut longest = 0;
    let mut prev_owner = String::new();

    for entry in entries.iter_mut() {
        let record = match entry {
            Entry::Comment(_) => continue,
            Entry::Control(control) => {
                if control.command == "$ORIGIN" {
                    if let Some(arg) = control.args.first() {
                        origin = fqdn(arg);
                    }
                }
                continue;
            }
            Entry::Record(record) => record,
        };

        record.owner = strip_origin(&origin, &record.owner).to_string();

        match record.rtype_code() {
            Some(Rtype::SOA) => {
                need_values(record, 3)?;
                if origin.is_empty() {
                    // No $ORIGIN given; the SOA owner is the best we have.
                    origin = fqdn(&record.owner);
                }
                strip_value(record, 0, &origin);
                strip_value(record, 1, &origin);
            }
            Some(Rtype::SRV) => {
                need_values(record, 4)?;
                strip_value(record, 3, &origin);
            }
            Some(Rtype::RRSIG) => {
                need_values(record, 8)?;
                strip_value(record, 7, &origin);
            }
            Some(Rtype::MX) => {
                need_values(record, 2)?;
                strip_value(record, 1, &origin);
            }
            Some(Rtype::NS | Rtype::CNAME | Rtype::PTR | Rtype::NSEC) => {
                need_values(record, 1)?;
                strip_value(record, 0, &origin);
            }
            Some(Rtype::TXT) => need_values(record, 1)?,
            Some(Rtype::DS | Rtype::CDS | Rtype::DNSKEY | Rtype::CDNSKEY | Rtype::TLSA) => {
                need_values(record, 4)?;
            }
            _ => {}
        }

        let owner_key = if record.owner.is_empty() {
            prev_owner.clone()
        } else {
            record.owner.clone()
        };
        *owner_counts.entry(owner_key).or_insert(0) += 1;

        longest = longest.max(record.owner.len());
        if !record.owner.is_empty() {
            prev_owner = record.owner.clone();
        }
    }

    Ok(Layout {
        width: longest + 2,
        owner_counts,
    })
}

fn need_values(record: &Record, count: usize) -> Result<(), FmtError> {
    if record.values.len() < count {
        return Err(FmtError::Malformed {
            rtype: record.rtype.clone(),
            values: record.values.clone(),
        });
    }
    Ok(())
}

fn strip_value(record: &mut Record, idx: usize, origin: &str) {
    let stripped = strip_origin(origin, &record.values[idx]).to_string();
    record.values[idx] = stripped;
}

//----------- Pass 2: emit -----------------------------------------------------

/// Print the entries in the canonical layout.
fn emit<W: io::Write>(
    entries: &[Entry],
    layout: &Layout,
    out: &mut W,
    increment_serial: bool,
) -> Result<(), FmtError> {
    let width = layout.width;
    let mut prev_owner = String::new();
    let mut prev_type = String::new();
    let mut prev_ttl = 0;
    let mut prev_was_comment = false;
    let mut before_first_record = true;

    for entry in entries {
        let record = match entry {
            Entry::Comment(comment) => {
                // Keep comments close to what follows them; only separate
                // them from a preceding record.
                if !prev_was_comment && !before_first_record {
                    writeln!(out)?;
                }
                for line in &comment.lines {
                    writeln!(out, "{line}")?;
                }
                prev_was_comment = true;
                prev_owner.clear();
                prev_type.clear();
                continue;
            }
            Entry::Control(control) => {
                writeln!(out, "{} {}", control.command, control.args.join(" "))?;
                prev_was_comment = false;
                prev_owner.clear();
                prev_type.clear();
                continue;
            }
            Entry::Record(record) => record,
        };

        if record.owner != prev_owner {
            if !record.owner.is_empty() && !prev_was_comment && !before_first_record {
                let count = layout.owner_counts.get(&prev_owner).copied().unwrap_or(0);
                // Owners with several records get set apart; runs of lone
                // records stay packed until the type changes.
                if count > 1 || (count == 1 && prev_type != record.rtype) {
                    writeln!(out)?;
                }
            }
            write!(out, "{:<width$}", record.owner)?;
        } else {
            write!(out, "{:<width$}", "")?;
        }
        prev_was_comment = false;
        before_first_record = false;

        match record.ttl {
            Some(ttl) if ttl != prev_ttl => {
                prev_ttl = ttl;
                write!(out, "{:>10}", time::seconds_to_human(ttl))?;
            }
            _ => write!(out, "{:>10}", "")?,
        }

        write!(out, "{:>5}", record.class.as_deref().unwrap_or("IN"))?;
        write!(out, "{GUTTER}{:<8}", record.rtype)?;

        emit_values(record, width, out, increment_serial)?;

        if !record.owner.is_empty() {
            prev_owner.clone_from(&record.owner);
        }
        prev_type.clone_from(&record.rtype);
    }
    Ok(())
}

/// Print a record's value column, including the trailing newline.
fn emit_values<W: io::Write>(
    record: &Record,
    width: usize,
    out: &mut W,
    increment_serial: bool,
) -> Result<(), FmtError> {
    let values = &record.values;
    match record.rtype_code() {
        Some(Rtype::TXT) => {
            if values.len() <= 1 {
                writeln!(out, "{GUTTER}{}", quote(&values[0]))?;
            } else {
                writeln!(out, "{GUTTER}(")?;
                for value in values {
                    indent(out, width + INDENT)?;
                    writeln!(out, "{GUTTER}{}", quote(value))?;
                }
                close_paren(out, width)?;
            }
        }

        Some(Rtype::CAA) => {
            write!(out, "{GUTTER}")?;
            for (idx, value) in values.iter().enumerate() {
                if idx > 0 {
                    write!(out, " ")?;
                }
                if idx < 2 {
                    write!(out, "{value}")?;
                } else {
                    write!(out, "{}", quote(value))?;
                }
            }
            writeln!(out)?;
        }

        Some(Rtype::SOA) => {
            writeln!(out, "{GUTTER}{} (", values[..2].join(" "))?;
            for (idx, value) in values[2..].iter().enumerate() {
                indent(out, width + INDENT)?;
                if idx == 0 {
                    let serial = if increment_serial {
                        increase_serial(value)
                    } else {
                        value.clone()
                    };
                    match serial_to_human_date(&serial) {
                        Some(date) => {
                            writeln!(out, "{GUTTER}{serial:<13}{}  {date}", SOA_FIELDS[0])?
                        }
                        None => writeln!(out, "{GUTTER}{serial:<13}{}", SOA_FIELDS[0])?,
                    }
                } else {
                    let label = SOA_FIELDS.get(idx).copied().unwrap_or_default();
                    writeln!(out, "{GUTTER}{:<13}{label}", humanize_duration(value))?;
                }
            }
            close_paren(out, width)?;
        }

        Some(Rtype::DS | Rtype::CDS | Rtype::DNSKEY | Rtype::CDNSKEY | Rtype::TLSA) => {
            let tail = values[3..].concat();
            if tail.len() <= INLINE_MAX {
                writeln!(out, "{GUTTER}{}", values.join(" "))?;
            } else {
                writeln!(out, "{GUTTER}{} (", values[..3].join(" "))?;
                for piece in chunks(&tail, CHUNK_LEN) {
                    indent(out, width + INDENT)?;
                    writeln!(out, "{GUTTER}{piece}")?;
                }
                close_paren(out, width)?;
            }
        }

        Some(Rtype::RRSIG) => {
            writeln!(out, "{GUTTER}{} (", values[..8].join(" "))?;
            let tail = values[8..].concat();
            for piece in chunks(&tail, CHUNK_LEN) {
                indent(out, width + INDENT)?;
                writeln!(out, "{GUTTER}{piece}")?;
            }
            close_paren(out, width)?;
        }

        _ => writeln!(out, "{GUTTER}{}", values.join(" "))?,
    }
    Ok(())
}

fn indent<W: io::Write>(out: &mut W, width: usize) -> io::Result<()> {
    write!(out, "{:width$}", "")
}

fn close_paren<W: io::Write>(out: &mut W, width: usize) -> io::Result<()> {
    indent(out, width + INDENT + GUTTER.len())?;
    writeln!(out, ")")
}

/// Quote a value, escaping embedded double quotes.
pub(crate) fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\\\""))
}

/// Break a string into pieces of at most `limit` characters.
fn chunks(s: &str, limit: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = s;
    while rest.len() > limit {
        let mut at = limit;
        while !rest.is_char_boundary(at) {
            at -= 1;
        }
        let (head, tail) = rest.split_at(at);
        pieces.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

//----------- FmtError ---------------------------------------------------------

/// An error while reformatting a zone file.
#[derive(Debug)]
pub enum FmtError {
    /// The input did not parse.
    Parse(ParseError),

    /// A record has too few value tokens for its type.
    Malformed {
        rtype: String,
        values: Vec<String>,
    },

    /// Writing the output failed.
    Io(io::Error),
}

impl std::error::Error for FmtError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FmtError::Parse(err) => Some(err),
            FmtError::Malformed { .. } => None,
            FmtError::Io(err) => Some(err),
        }
    }
}

impl fmt::Display for FmtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FmtError::Parse(err) => write!(f, "parse error: {err}"),
            FmtError::Malformed { rtype, values } => {
                write!(f, "malformed {rtype} record: {values:?}")
            }
            FmtError::Io(err) => write!(f, "write failed: {err}"),
        }
    }
}

impl From<ParseError> for FmtError {
    fn from(err: ParseError) -> Self {
        FmtError::Parse(err)
    }
}

impl From<io::Error> for FmtError {
    fn from(err: io::Error) -> Self {
        FmtError::Io(err)
    }
}
