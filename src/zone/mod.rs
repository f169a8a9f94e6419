//! Managed zone files and the operations that edit them.
//!
//! A [`ZoneManager`] owns one [`ZoneFile`] per configured path.  Updates are
//! dispatched to the file whose origin is the longest suffix of the requested
//! domain.  Every operation re-reads the file under a per-file lock (so edits
//! made out of band are picked up), splices the replacement records into the
//! entry sequence, and writes the result back through the reformatter with a
//! bumped SOA serial.  A downstream DNS server watching the file picks the
//! change up from there.

use std::fmt::Write as _;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::{fmt, io};

use camino::Utf8PathBuf;
use domain::base::iana::Rtype;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zonewright_zonefile::{Entry, ParseError, Zonefile};

use crate::fmt::{fqdn, quote, reformat, strip_origin, FmtError};
use crate::util;
use crate::zone::edit::{splice, Matcher};

pub mod edit;

/// Written instead of an empty ACME TXT value; a challenge record cannot
/// really hold "".
pub const EMPTY_PLACEHOLDER: &str = "placeholder";

//----------- ZoneManager ------------------------------------------------------

/// The set of managed zone files.
pub struct ZoneManager {
    files: Vec<ZoneFile>,
}

impl ZoneManager {
    /// Load every configured zone file, failing on the first bad one.
    pub fn open(paths: &[Utf8PathBuf]) -> Result<Self, ZoneError> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            files.push(ZoneFile::open(path.clone())?);
        }
        Ok(Self { files })
    }

    /// The origins of the managed zones.
    pub fn origins(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|file| file.origin.as_str())
    }

    /// Replace the A/AAAA record set at `domain`.
    ///
    /// The v4 addresses become the new A records (ascending), the v6
    /// addresses the new AAAA records; address families not present in
    /// `addrs` are left untouched.
    pub async fn update_ddns_address(
        &self,
        domain: &str,
        addrs: &[IpAddr],
    ) -> Result<bool, ZoneError> {
        let domain_dot = fqdn(domain);
        let file = self.find_zone(&domain_dot)?;
        info!(domain = %domain_dot, zone = %file.origin, "updating DDNS address");
        file.update_ddns_address(&domain_dot, addrs).await
    }

    /// Replace the ACME DNS-01 challenge TXT record at `domain`.
    ///
    /// With an empty `old_token` every TXT at the challenge owner is
    /// replaced; otherwise only the TXT whose sole value equals `old_token`
    /// is (the LEGO HTTP-req flow, which parks a placeholder between
    /// challenges).  An empty `new_token` writes the placeholder.
    pub async fn update_acme_challenge(
        &self,
        domain: &str,
        new_token: &str,
        old_token: &str,
    ) -> Result<bool, ZoneError> {
        let mut domain_dot = fqdn(domain);
        if !domain_dot.starts_with("_acme-challenge.") {
            domain_dot = format!("_acme-challenge.{domain_dot}");
        }
        let file = self.find_zone(&domain_dot)?;
        info!(domain = %domain_dot, zone = %file.origin, "updating ACME challenge");
        file.update_acme_challenge(&domain_dot, new_token, old_token)
            .await
    }

    /// Replace the records of a caller-supplied type at `domain`.
    ///
    /// Unlike the DDNS and ACME operations this never creates records at a
    /// fresh owner; a miss is an error.
    pub async fn update_record(
        &self,
        domain: &str,
        rtype: &str,
        values: &[String],
    ) -> Result<bool, ZoneError> {
        let rtype_code: Rtype = rtype.parse().map_err(|_| ZoneError::UnknownRecordType {
            rtype: rtype.to_string(),
        })?;
        let domain_dot = fqdn(domain);
        let file = self.find_zone(&domain_dot)?;
        info!(domain = %domain_dot, rtype = %rtype_code, zone = %file.origin, "updating record");
        file.update_record(&domain_dot, rtype_code, values).await
    }

    /// The managed file whose origin is the longest suffix of `domain_dot`.
    fn find_zone(&self, domain_dot: &str) -> Result<&ZoneFile, ZoneError> {
        self.files
            .iter()
            .filter(|file| file.serves(domain_dot))
            .max_by_key(|file| file.origin.len())
            .ok_or_else(|| ZoneError::ZoneNotFound {
                domain: domain_dot.to_string(),
            })
    }
}

//----------- ZoneFile ---------------------------------------------------------

/// A single managed zone file.
pub struct ZoneFile {
    path: Utf8PathBuf,

    /// The origin established at startup.  A reload that detects a different
    /// origin is refused.
    origin: String,

    /// Serializes reload-edit-rewrite cycles on this file.
    lock: Mutex<()>,
}

impl ZoneFile {
    fn open(path: Utf8PathBuf) -> Result<Self, ZoneError> {
        let data = std::fs::read(&path).map_err(ZoneError::Io)?;
        let (_, origin) = load_entries(&data)?;
        info!(zone = %origin, %path, "loaded zone file");
        Ok(Self {
            path,
            origin,
            lock: Mutex::new(()),
        })
    }

    /// Whether `domain_dot` is the origin or lies under it.
    fn serves(&self, domain_dot: &str) -> bool {
        domain_dot == self.origin
            || domain_dot
                .strip_suffix(&self.origin)
                .is_some_and(|prefix| prefix.ends_with('.'))
    }

    async fn update_ddns_address(
        &self,
        domain_dot: &str,
        addrs: &[IpAddr],
    ) -> Result<bool, ZoneError> {
        let owner = strip_origin(&self.origin, domain_dot);

        let mut v4: Vec<Ipv4Addr> = Vec::new();
        let mut v6: Vec<Ipv6Addr> = Vec::new();
        for addr in addrs {
            match addr {
                IpAddr::V4(addr) => v4.push(*addr),
                IpAddr::V6(addr) => v6.push(*addr),
            }
        }
        v4.sort_unstable();
        v6.sort_unstable();

        let mut matchers = Vec::new();
        let mut snippet = String::new();
        if !v4.is_empty() {
            matchers.push(Matcher::owner_and_type(owner, Rtype::A));
            for addr in &v4 {
                let _ = writeln!(snippet, "{owner} IN A {addr}");
            }
        }
        if !v6.is_empty() {
            matchers.push(Matcher::owner_and_type(owner, Rtype::AAAA));
            for addr in &v6 {
                let _ = writeln!(snippet, "{owner} IN AAAA {addr}");
            }
        }

        self.replace_records(&matchers, &snippet, true, domain_dot)
            .await
    }

    async fn update_acme_challenge(
        &self,
        domain_dot: &str,
        new_token: &str,
        old_token: &str,
    ) -> Result<bool, ZoneError> {
        let owner = strip_origin(&self.origin, domain_dot);

        let token = if new_token.is_empty() {
            warn!(domain = %domain_dot, "writing placeholder for empty TXT value");
            EMPTY_PLACEHOLDER
        } else {
            new_token
        };

        let mut matcher = Matcher::owner_and_type(owner, Rtype::TXT);
        if !old_token.is_empty() {
            matcher = matcher.with_values(vec![old_token.to_string()]);
        }
        let snippet = format!("{owner} IN TXT {}\n", quote(token));

        self.replace_records(&[matcher], &snippet, true, domain_dot)
            .await
    }

    async fn update_record(
        &self,
        domain_dot: &str,
        rtype: Rtype,
        values: &[String],
    ) -> Result<bool, ZoneError> {
        let owner = strip_origin(&self.origin, domain_dot);

        let matchers = [Matcher::owner_and_type(owner, rtype)];
        let mut snippet = String::new();
        for value in values {
            // TXT rdata is one free-text token; every other type's value
            // string is whitespace-split into its rdata fields by the parser.
            if rtype == Rtype::TXT {
                let _ = writeln!(snippet, "{owner} IN {rtype} {}", quote(value));
            } else {
                let _ = writeln!(snippet, "{owner} IN {rtype} {value}");
            }
        }

        self.replace_records(&matchers, &snippet, false, domain_dot)
            .await
    }

    /// The reload-splice-rewrite cycle shared by all operations.
    async fn replace_records(
        &self,
        matchers: &[Matcher],
        snippet: &str,
        allow_new: bool,
        domain: &str,
    ) -> Result<bool, ZoneError> {
        let _guard = self.lock.lock().await;

        let entries = self.reload().await?;
        // New records go through the parser rather than being built by hand;
        // this reuses its validation and keeps one source of record syntax.
        let replacements = Zonefile::parse(snippet)?.into_entries();

        let outcome = splice(&entries, matchers, &replacements, allow_new);
        if !outcome.found && !allow_new {
            return Err(ZoneError::RecordNotFound {
                domain: domain.to_string(),
            });
        }
        if !outcome.changed {
            debug!(domain, "zone not changed");
            return Ok(false);
        }

        let mut plain = Vec::new();
        render_entries(&outcome.entries, &mut plain).map_err(ZoneError::Io)?;

        let mut pretty = Vec::new();
        reformat(&plain, Some(&self.origin), &mut pretty, true)?;

        util::write_file(&self.path, &pretty).map_err(ZoneError::Io)?;
        info!(domain, path = %self.path, "zone file rewritten");
        Ok(true)
    }

    /// Re-read the file, check the origin and resolve owners.
    async fn reload(&self) -> Result<Vec<Entry>, ZoneError> {
        let data = tokio::fs::read(&self.path).await.map_err(ZoneError::Io)?;
        let (entries, origin) = load_entries(&data)?;
        if origin != self.origin {
            return Err(ZoneError::OriginChanged {
                expected: self.origin.clone(),
                found: origin,
            });
        }
        Ok(entries)
    }
}

//----------- Loading ----------------------------------------------------------

/// Parse a zone file, determine its origin and normalize record owners to
/// their origin-stripped form.
fn load_entries(data: &[u8]) -> Result<(Vec<Entry>, String), ZoneError> {
    let mut entries = Zonefile::parse_bytes(data)?.into_entries();
    let origin = detect_origin(&entries)?;

    let mut prev_owner = String::new();
    for entry in entries.iter_mut() {
        if let Some(record) = entry.as_record_mut() {
            if record.owner.is_empty() {
                record.owner.clone_from(&prev_owner);
            } else {
                prev_owner.clone_from(&record.owner);
            }
            record.owner = strip_origin(&origin, &record.owner).to_string();
        }
    }

    Ok((entries, origin))
}

/// The zone origin: the last `$ORIGIN` directive, or the owner of the first
/// SOA record.  A zone without a SOA is rejected outright.
fn detect_origin(entries: &[Entry]) -> Result<String, ZoneError> {
    let mut directive = None;
    let mut soa_owner = None;
    let mut prev_owner = String::new();

    for entry in entries {
        match entry {
            Entry::Control(control) if control.command == "$ORIGIN" => {
                if let Some(arg) = control.args.first() {
                    directive = Some(fqdn(arg));
                }
            }
            Entry::Record(record) => {
                if !record.owner.is_empty() {
                    prev_owner.clone_from(&record.owner);
                }
                if soa_owner.is_none() && record.rtype_code() == Some(Rtype::SOA) {
                    soa_owner = Some(prev_owner.clone());
                }
            }
            _ => {}
        }
    }

    let Some(soa_owner) = soa_owner else {
        return Err(ZoneError::SoaNotFound);
    };
    if let Some(origin) = directive {
        return Ok(origin);
    }
    if soa_owner.is_empty() || soa_owner == "@" {
        return Err(ZoneError::UnknownOrigin);
    }
    Ok(fqdn(&soa_owner))
}

//----------- Serialization ----------------------------------------------------

/// Write entries in a plain one-line-per-entry form.
///
/// This is the intermediate representation fed to the reformatter; values are
/// quoted so they survive the round trip through the parser unchanged.
fn render_entries<W: io::Write>(entries: &[Entry], out: &mut W) -> io::Result<()> {
    for entry in entries {
        match entry {
            Entry::Comment(comment) => {
                for line in &comment.lines {
                    writeln!(out, "{line}")?;
                }
            }
            Entry::Control(control) => {
                writeln!(out, "{} {}", control.command, control.args.join(" "))?;
            }
            Entry::Record(record) => {
                write!(out, "{}", record.owner)?;
                if let Some(ttl) = record.ttl {
                    write!(out, " {ttl}")?;
                }
                if let Some(class) = &record.class {
                    write!(out, " {class}")?;
                }
                write!(out, " {}", record.rtype)?;
                for value in &record.values {
                    write!(out, " {}", quote(value))?;
                }
                writeln!(out)?;
            }
        }
    }
    Ok(())
}

//----------- ZoneError --------------------------------------------------------

/// An error from zone loading or mutation.
#[derive(Debug)]
pub enum ZoneError {
    /// The zone file (or a synthesized record) did not parse.
    Parse(ParseError),

    /// The zone file has no SOA record.
    SoaNotFound,

    /// The zone file has neither a `$ORIGIN` nor an absolute SOA owner.
    UnknownOrigin,

    /// The zone file's origin differs from the one seen at startup.
    OriginChanged { expected: String, found: String },

    /// No managed zone serves the domain.
    ZoneNotFound { domain: String },

    /// No record matched and creating one was not allowed.
    RecordNotFound { domain: String },

    /// The requested record type is not known.
    UnknownRecordType { rtype: String },

    /// Rewriting the zone through the reformatter failed.
    Format(FmtError),

    /// Reading or writing the zone file failed.
    Io(io::Error),
}

impl std::error::Error for ZoneError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ZoneError::Parse(err) => Some(err),
            ZoneError::Format(err) => Some(err),
            ZoneError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for ZoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneError::Parse(err) => write!(f, "zone parse error: {err}"),
            ZoneError::SoaNotFound => f.write_str("SOA record not found"),
            ZoneError::UnknownOrigin => f.write_str("zone origin could not be determined"),
            ZoneError::OriginChanged { expected, found } => {
                write!(f, "zone origin changed from {expected} to {found}")
            }
            ZoneError::ZoneNotFound { domain } => {
                write!(f, "zone not found for domain: {domain}")
            }
            ZoneError::RecordNotFound { domain } => {
                write!(f, "record not found: {domain}")
            }
            ZoneError::UnknownRecordType { rtype } => {
                write!(f, "unknown record type: {rtype}")
            }
            ZoneError::Format(err) => write!(f, "reformat failed: {err}"),
            ZoneError::Io(err) => write!(f, "zone file I/O failed: {err}"),
        }
    }
}

impl From<ParseError> for ZoneError {
    fn from(err: ParseError) -> Self {
        ZoneError::Parse(err)
    }
}

impl From<FmtError> for ZoneError {
    fn from(err: FmtError) -> Self {
        ZoneError::Format(err)
    }
}

#[cfg(test)]
mod tests;
