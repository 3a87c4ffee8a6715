use std::fmt;
use std::str::FromStr;

use crate::Error;

/// A remote host to run commands against, identified by address, optional
/// user, and optional port.
///
/// An `Endpoint` is parsed once, when the [`Connection`](crate::Connection)
/// is built, and is immutable from then on. The accepted forms are the same
/// as the `destination` argument to `ssh`: `[user@]hostname[:port]`, or a
/// URI of the form `ssh://[user@]hostname[:port]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    user: Option<String>,
    port: Option<u16>,
}

impl Endpoint {
    /// Parse an endpoint from a connection string.
    ///
    /// The port component is only split off when it parses as a valid port
    /// number; anything else is kept as part of the host.
    ///
    /// Beware of bare IPv6 addresses: the split happens at the last `:`, so
    /// a trailing numeric group (as in `fe80::1`) is taken as the port.
    /// Give such hosts an ssh config alias, or append an explicit port so
    /// the final group is unambiguous.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let mut rest = s.strip_prefix("ssh://").unwrap_or(s);

        let mut user = None;
        if let Some(at) = rest.find('@') {
            let u = &rest[..at];
            if u.is_empty() {
                return Err(Error::Endpoint(s.to_string()));
            }
            user = Some(u.to_string());
            rest = &rest[(at + 1)..];
        }

        let mut port = None;
        if let Some(colon) = rest.rfind(':') {
            if let Ok(p) = rest[(colon + 1)..].parse() {
                port = Some(p);
                rest = &rest[..colon];
            }
        }

        if rest.is_empty() {
            return Err(Error::Endpoint(s.to_string()));
        }

        Ok(Endpoint {
            host: rest.to_string(),
            user,
            port,
        })
    }

    /// The host name or address.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The user to log in as, if one was given.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// The port to connect on, if one was given.
    ///
    /// The port is not part of the [`Display`](fmt::Display) rendering; each
    /// command type passes it separately (`ssh -p` vs `scp -P`).
    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.user {
            Some(ref user) => write!(f, "{}@{}", user, self.host),
            None => write!(f, "{}", self.host),
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::parse(s)
    }
}
