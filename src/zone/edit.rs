//! Matching and splicing record entries.
//!
//! The edit step of every update is a pure function over the entry sequence:
//! find the records a set of matchers selects, put the replacements where the
//! first of them stood, drop the rest, and leave everything else alone.
//! Keeping this free of I/O makes the replace semantics easy to test on
//! their own.

use domain::base::iana::Rtype;
use zonewright_zonefile::{Entry, Record};

//----------- Matcher ----------------------------------------------------------

/// A predicate over records.
///
/// `None` fields match anything; `values` matches only when the record's
/// value tokens are equal in order.
#[derive(Clone, Debug, Default)]
pub struct Matcher {
    pub owner: Option<String>,
    pub rtype: Option<Rtype>,
    pub values: Option<Vec<String>>,
}

impl Matcher {
    /// Match records by owner and type.
    pub fn owner_and_type(owner: &str, rtype: Rtype) -> Self {
        Self {
            owner: Some(owner.to_string()),
            rtype: Some(rtype),
            values: None,
        }
    }

    /// Additionally require the record's values to equal `values`.
    pub fn with_values(mut self, values: Vec<String>) -> Self {
        self.values = Some(values);
        self
    }

    fn matches(&self, record: &Record) -> bool {
        if let Some(owner) = &self.owner {
            if record.owner != *owner {
                return false;
            }
        }
        if let Some(rtype) = self.rtype {
            if record.rtype_code() != Some(rtype) {
                return false;
            }
        }
        if let Some(values) = &self.values {
            if record.values != *values {
                return false;
            }
        }
        true
    }
}

//----------- splice -----------------------------------------------------------

/// The outcome of a [`splice`].
#[derive(Clone, Debug)]
pub struct Spliced {
    /// The edited entry sequence.
    pub entries: Vec<Entry>,

    /// Whether any matcher hit an existing record.
    pub found: bool,

    /// Whether the edited sequence differs from the input.
    pub changed: bool,
}

/// Replace the matching records in an entry sequence.
///
/// The replacements take the position of the first matching record; further
/// matches are dropped.  Without a match the replacements are appended when
/// `allow_new` is set, and otherwise the sequence is returned unchanged with
/// `found` false.
pub fn splice(old: &[Entry], matchers: &[Matcher], replacements: &[Entry], allow_new: bool) -> Spliced {
    let mut entries = Vec::with_capacity(old.len() + replacements.len());
    let mut found = false;

    for entry in old {
        let matched = entry
            .as_record()
            .is_some_and(|record| matchers.iter().any(|m| m.matches(record)));
        if matched {
            if !found {
                entries.extend(replacements.iter().cloned());
                found = true;
            }
            continue;
        }
        entries.push(entry.clone());
    }

    if !found && allow_new {
        entries.extend(replacements.iter().cloned());
    }

    let changed = entries.as_slice() != old;
    Spliced {
        entries,
        found,
        changed,
    }
}
