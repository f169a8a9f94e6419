//! Configuration for the update server.

use std::str::FromStr;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use jiff::{Span, SpanRelativeTo};

//----------- Args -------------------------------------------------------------

/// Command line options for the update server.
///
/// Every flag can also be given through an environment variable with the
/// `ZM_` prefix.
#[derive(Clone, Debug, Parser)]
#[command(name = "zonewright", version, about = "DNS zone file update server")]
pub struct Args {
    /// Server listen address
    #[arg(
        long,
        value_name = "HOST:PORT",
        default_value = "localhost:9999",
        env = "ZM_LISTEN"
    )]
    pub listen: String,

    /// Accept the PROXY protocol (v1 or v2) on the listener
    #[arg(long, env = "ZM_ACCEPT_PROXY")]
    pub accept_proxy: bool,

    /// Timeout for PROXY headers
    #[arg(
        long,
        value_name = "DUR",
        default_value = "10s",
        env = "ZM_PROXY_HEADER_TIMEOUT"
    )]
    pub proxy_header_timeout: TimeSpan,

    /// Passwords file (bcrypt only)
    #[arg(short = 'p', long, value_name = "FILE", env = "ZM_HTPASSWD")]
    pub htpasswd: Utf8PathBuf,

    /// Zone files to update
    #[arg(
        short = 'z',
        long = "zone",
        value_name = "FILE",
        required = true,
        value_delimiter = ',',
        env = "ZM_ZONE"
    )]
    pub zones: Vec<Utf8PathBuf>,

    /// Verbose logging
    #[arg(long, env = "ZM_DEBUG")]
    pub debug: bool,
}

//----------- TimeSpan ---------------------------------------------------------

/// A duration in whole seconds, parsed from forms like `10s`, `2m` or `90`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TimeSpan(u64);

impl TimeSpan {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }
}

impl FromStr for TimeSpan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // A bare number is taken as seconds.
        if let Ok(secs) = s.parse() {
            return Ok(Self(secs));
        }
        let span: Span = s
            .parse()
            .map_err(|err| format!("unable to parse {s} as timespan: {err}"))?;
        let duration = span
            .to_duration(SpanRelativeTo::days_are_24_hours())
            .map_err(|err| format!("unable to convert duration: {err}"))?;
        let duration = Duration::try_from(duration)
            .map_err(|err| format!("unable to convert duration: {err}"))?;
        Ok(Self(duration.as_secs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn timespan_parsing() {
        assert_eq!("10s".parse(), Ok(TimeSpan::from_secs(10)));
        assert_eq!("90".parse(), Ok(TimeSpan::from_secs(90)));
        assert_eq!("2m".parse(), Ok(TimeSpan::from_secs(120)));
        assert_eq!("1h 30m".parse(), Ok(TimeSpan::from_secs(5400)));
        assert!("soon".parse::<TimeSpan>().is_err());
    }

    #[test]
    fn zones_split_on_commas() {
        let args = Args::parse_from([
            "zonewright",
            "-p",
            "users.htpasswd",
            "-z",
            "a.zone,b.zone",
        ]);
        assert_eq!(args.zones.len(), 2);
        assert_eq!(args.listen, "localhost:9999");
        assert_eq!(args.proxy_header_timeout, TimeSpan::from_secs(10));
    }
}
