use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::net::IpAddr;

use rocket::request::{FromRequest, Outcome};
use rocket::Request;

/// Header set by reverse proxies listing the client and any intermediate hops.
pub const FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";

/// The network origin of a request, as recorded in audit records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOrigin(String);

impl ClientOrigin {
    /// Used when neither a forwarding header nor a peer address is available.
    pub const UNKNOWN: &'static str = "unknown";

    /// Prefer the first entry of the forwarding header, falling back to the
    /// address of the connected peer.
    pub fn derive(forwarded_for: Option<&str>, remote: Option<IpAddr>) -> Self {
        let forwarded = forwarded_for
            .and_then(|header| header.split(',').next())
            .map(str::trim)
            .filter(|first| !first.is_empty());
        match (forwarded, remote) {
            (Some(first), _) => Self(first.to_string()),
            (None, Some(ip)) => Self(ip.to_string()),
            (None, None) => Self(Self::UNKNOWN.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ClientOrigin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientOrigin {
    type Error = Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let forwarded_for = req.headers().get_one(FORWARDED_FOR_HEADER);
        let remote = req.remote().map(|addr| addr.ip());
        Outcome::Success(Self::derive(forwarded_for, remote))
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    const PEER: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7));

    #[test]
    fn first_forwarded_entry_wins() {
        let origin = ClientOrigin::derive(Some("203.0.113.5, 10.0.0.1, 10.0.0.2"), Some(PEER));
        assert_eq!(origin.as_str(), "203.0.113.5");
    }

    #[test]
    fn single_forwarded_entry() {
        let origin = ClientOrigin::derive(Some("2001:db8::1"), None);
        assert_eq!(origin.as_str(), "2001:db8::1");
    }

    #[test]
    fn falls_back_to_peer() {
        assert_eq!(ClientOrigin::derive(None, Some(PEER)).as_str(), "192.0.2.7");
        // An empty header or empty first entry is treated as absent.
        assert_eq!(ClientOrigin::derive(Some(""), Some(PEER)).as_str(), "192.0.2.7");
        assert_eq!(ClientOrigin::derive(Some(" , 10.0.0.1"), Some(PEER)).as_str(), "192.0.2.7");
    }

    #[test]
    fn unknown_without_any_source() {
        assert_eq!(ClientOrigin::derive(None, None).as_str(), ClientOrigin::UNKNOWN);
    }
}
