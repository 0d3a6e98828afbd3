use bytes::Bytes;
use std::fmt;

/// Prefix that derives a reverse-channel identity from a forward-channel one.
///
/// Both peers rely on this convention to compute the reverse identity from
/// the forward identity without a round trip; it must never change.
pub const REVERSE_PREFIX: &str = "rev:";

/// An opaque peer address frame.
///
/// Identities are never parsed or interpreted by the runtime beyond the
/// `rev:` prefix convention used to derive a reverse identity from a
/// forward one. Treat the bytes as opaque.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PeerIdentity(Bytes);

impl PeerIdentity {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Derives the reverse-channel identity for this (forward) identity.
    pub fn to_reverse(&self) -> Self {
        let mut buf = Vec::with_capacity(REVERSE_PREFIX.len() + self.0.len());
        buf.extend_from_slice(REVERSE_PREFIX.as_bytes());
        buf.extend_from_slice(&self.0);
        Self(Bytes::from(buf))
    }

    pub fn is_reverse_of(&self, forward: &PeerIdentity) -> bool {
        *self == forward.to_reverse()
    }
}

impl fmt::Debug for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "PeerIdentity({s:?})"),
            Err(_) => write!(f, "PeerIdentity({:?})", &self.0[..]),
        }
    }
}

impl From<&str> for PeerIdentity {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for PeerIdentity {
    fn from(s: String) -> Self {
        Self(Bytes::from(s.into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_prefix_is_preserved() {
        let fwd = PeerIdentity::from("client:1");
        let rev = fwd.to_reverse();
        assert_eq!(rev.as_bytes(), b"rev:client:1");
        assert!(rev.is_reverse_of(&fwd));
    }

    #[test]
    fn distinct_identities_are_not_reverse_of_each_other() {
        let a = PeerIdentity::from("client:1");
        let b = PeerIdentity::from("client:2");
        assert!(!a.to_reverse().is_reverse_of(&b));
    }
}
