//! The line scanner behind [`Zonefile::parse`](crate::Zonefile::parse).

use domain::base::iana::Class;

use crate::{Comment, Control, Entry, ParseError, ParseErrorKind, Record};

/// Scan a whole master file into entries.
pub(crate) fn scan(text: &str) -> Result<Vec<Entry>, ParseError> {
    let mut scanner = Scanner::default();
    for (idx, line) in text.lines().enumerate() {
        scanner.line(line, idx + 1)?;
    }
    scanner.finish()
}

//----------- Scanner ----------------------------------------------------------

/// Scanner state across physical lines.
#[derive(Default)]
struct Scanner {
    entries: Vec<Entry>,

    /// Comment lines waiting to be flushed as one [`Comment`] entry.
    comment: Vec<String>,

    /// An entry spanning lines via an open parenthesis.
    open: Option<OpenEntry>,
}

/// A record or control entry that is still being collected.
struct OpenEntry {
    /// Whether the first line started in column 0.
    has_owner: bool,

    /// The line the entry started on, for error reporting.
    start_line: usize,

    tokens: Vec<String>,
}

impl Scanner {
    fn line(&mut self, line: &str, line_no: usize) -> Result<(), ParseError> {
        let mut in_paren = match self.open {
            Some(_) => true,
            None => {
                let trimmed = line.trim_start();
                if trimmed.is_empty() {
                    self.flush_comment();
                    return Ok(());
                }
                if trimmed.starts_with(';') {
                    self.comment.push(line.trim_end().to_string());
                    return Ok(());
                }

                self.flush_comment();
                self.open = Some(OpenEntry {
                    has_owner: !line.starts_with(|c: char| c.is_ascii_whitespace()),
                    start_line: line_no,
                    tokens: Vec::new(),
                });
                false
            }
        };

        let open = self.open.as_mut().expect("an entry is open");
        let bytes = line.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b if b.is_ascii_whitespace() => i += 1,
                b';' => break,
                b'(' => {
                    if in_paren {
                        return Err(ParseError::new(line_no, ParseErrorKind::NestedParen));
                    }
                    in_paren = true;
                    i += 1;
                }
                b')' => {
                    if !in_paren {
                        return Err(ParseError::new(line_no, ParseErrorKind::UnbalancedParen));
                    }
                    in_paren = false;
                    i += 1;
                }
                b'"' => {
                    i += 1;
                    let mut token = String::new();
                    let mut seg = i;
                    loop {
                        match bytes.get(i) {
                            None => {
                                return Err(ParseError::new(
                                    line_no,
                                    ParseErrorKind::UnterminatedString,
                                ));
                            }
                            Some(b'\\') if bytes.get(i + 1) == Some(&b'"') => {
                                token.push_str(&line[seg..i]);
                                token.push('"');
                                i += 2;
                                seg = i;
                            }
                            Some(b'"') => {
                                token.push_str(&line[seg..i]);
                                i += 1;
                                break;
                            }
                            Some(_) => i += 1,
                        }
                    }
                    open.tokens.push(token);
                }
                _ => {
                    let start = i;
                    while i < bytes.len()
                        && !bytes[i].is_ascii_whitespace()
                        && !matches!(bytes[i], b';' | b'(' | b')' | b'"')
                    {
                        i += 1;
                    }
                    open.tokens.push(line[start..i].to_string());
                }
            }
        }

        if in_paren {
            // The entry continues on the next line.
            return Ok(());
        }

        let open = self.open.take().expect("an entry is open");
        if let Some(entry) = classify(open)? {
            self.entries.push(entry);
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<Entry>, ParseError> {
        if let Some(open) = self.open {
            return Err(ParseError::new(
                open.start_line,
                ParseErrorKind::UnbalancedParen,
            ));
        }
        self.flush_comment();
        Ok(self.entries)
    }

    fn flush_comment(&mut self) {
        if !self.comment.is_empty() {
            self.entries.push(Entry::Comment(Comment {
                lines: std::mem::take(&mut self.comment),
            }));
        }
    }
}

/// Turn a collected token run into a control or record entry.
fn classify(open: OpenEntry) -> Result<Option<Entry>, ParseError> {
    let start_line = open.start_line;
    let mut tokens = open.tokens;
    if tokens.is_empty() {
        return Ok(None);
    }

    if tokens[0].starts_with('$') {
        let command = tokens.remove(0);
        return Ok(Some(Entry::Control(Control {
            command,
            args: tokens,
        })));
    }

    let owner = if open.has_owner {
        tokens.remove(0)
    } else {
        String::new()
    };

    // TTL and class may both precede the type, in either order.
    let mut ttl = None;
    let mut class = None;
    let mut idx = 0;
    while let Some(token) = tokens.get(idx) {
        if class.is_none() && Class::from_mnemonic(token.as_bytes()).is_some() {
            class = Some(token.clone());
            idx += 1;
            continue;
        }
        if ttl.is_none() {
            if let Some(secs) = crate::parse_ttl(token) {
                ttl = Some(secs);
                idx += 1;
                continue;
            }
        }
        break;
    }

    let Some(rtype) = tokens.get(idx).cloned() else {
        return Err(ParseError::new(start_line, ParseErrorKind::MissingType));
    };
    let values = tokens.split_off(idx + 1);

    Ok(Some(Entry::Record(Record {
        owner,
        ttl,
        class,
        rtype,
        values,
    })))
}
