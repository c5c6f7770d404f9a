//! Bolt handshake and protocol versions.
//!
//! The client opens with the magic preamble followed by four version
//! proposals. Each proposal is `[0x00, range, minor, major]`: it offers
//! `major.minor` down to `major.(minor - range)`. The server answers with
//! four bytes naming the chosen version, or zeros if none fits.

use std::fmt;

/// Bolt preamble.
pub const BOLT_MAGIC: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];

/// Magic plus four proposals.
pub const HANDSHAKE_SIZE: usize = 20;

/// Size of the server's reply.
pub const HANDSHAKE_RESPONSE_SIZE: usize = 4;

/// A negotiated protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoltVersion {
    pub major: u8,
    pub minor: u8,
}

impl BoltVersion {
    pub const V4_0: BoltVersion = BoltVersion::new(4, 0);
    pub const V4_4: BoltVersion = BoltVersion::new(4, 4);
    pub const V5_0: BoltVersion = BoltVersion::new(5, 0);
    pub const V5_1: BoltVersion = BoltVersion::new(5, 1);

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Parses the server's reply; all zeros means no agreement.
    pub fn from_reply(reply: [u8; HANDSHAKE_RESPONSE_SIZE]) -> Option<Self> {
        let [_, _, minor, major] = reply;
        (major != 0).then_some(Self { major, minor })
    }

    pub fn to_reply(self) -> [u8; HANDSHAKE_RESPONSE_SIZE] {
        [0, 0, self.minor, self.major]
    }

    /// Credentials go in LOGON rather than HELLO from 5.1 on.
    pub fn separates_auth(self) -> bool {
        self >= Self::V5_1
    }

    /// Date-times are sent with UTC seconds from 5.0 on.
    pub fn uses_utc_datetime(self) -> bool {
        self >= Self::V5_0
    }
}

impl fmt::Display for BoltVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// One handshake slot: a version and how many minors below it are acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRange {
    pub newest: BoltVersion,
    pub range: u8,
}

impl VersionRange {
    pub const fn exact(major: u8, minor: u8) -> Self {
        Self { newest: BoltVersion::new(major, minor), range: 0 }
    }

    pub const fn down_to(major: u8, minor: u8, range: u8) -> Self {
        Self { newest: BoltVersion::new(major, minor), range }
    }

    pub fn contains(&self, v: BoltVersion) -> bool {
        v.major == self.newest.major
            && v.minor <= self.newest.minor
            && v.minor >= self.newest.minor.saturating_sub(self.range)
    }

    fn to_bytes(self) -> [u8; 4] {
        [0, self.range, self.newest.minor, self.newest.major]
    }

    fn from_bytes([_, range, minor, major]: [u8; 4]) -> Option<Self> {
        (major != 0).then_some(Self { newest: BoltVersion::new(major, minor), range })
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.range == 0 {
            write!(f, "{}", self.newest)
        } else {
            let oldest = self.newest.minor.saturating_sub(self.range);
            write!(f, "{}..{}.{}", self.newest, self.newest.major, oldest)
        }
    }
}

/// Builds the 20-byte client opening. Unused slots stay zero.
pub fn client_preamble(proposals: &[VersionRange]) -> [u8; HANDSHAKE_SIZE] {
    let mut out = [0u8; HANDSHAKE_SIZE];
    out[..4].copy_from_slice(&BOLT_MAGIC);
    for (slot, proposal) in out[4..].chunks_exact_mut(4).zip(proposals.iter().take(4)) {
        slot.copy_from_slice(&proposal.to_bytes());
    }
    out
}

/// Server-side view of a preamble: the proposals, or `None` if the magic is wrong.
pub fn parse_preamble(bytes: &[u8; HANDSHAKE_SIZE]) -> Option<Vec<VersionRange>> {
    if bytes[..4] != BOLT_MAGIC {
        return None;
    }
    Some(
        bytes[4..]
            .chunks_exact(4)
            .filter_map(|c| VersionRange::from_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

/// Renders proposals for error messages, e.g. `5.4..5.0, 4.4`.
pub fn describe(proposals: &[VersionRange]) -> String {
    proposals.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preamble_layout() {
        let bytes = client_preamble(&[VersionRange::down_to(5, 4, 4), VersionRange::exact(4, 4)]);
        assert_eq!(&bytes[..4], &BOLT_MAGIC);
        assert_eq!(&bytes[4..8], &[0, 4, 4, 5]);
        assert_eq!(&bytes[8..12], &[0, 0, 4, 4]);
        assert_eq!(&bytes[12..], &[0u8; 8]);
    }

    #[test]
    fn test_preamble_parses_back() {
        let offered = [VersionRange::down_to(5, 2, 2), VersionRange::exact(4, 1)];
        let parsed = parse_preamble(&client_preamble(&offered)).unwrap();
        assert_eq!(parsed, offered.to_vec());

        let mut bad = client_preamble(&offered);
        bad[0] = 0;
        assert!(parse_preamble(&bad).is_none());
    }

    #[test]
    fn test_reply_parsing() {
        assert_eq!(BoltVersion::from_reply([0, 0, 4, 4]), Some(BoltVersion::V4_4));
        assert_eq!(BoltVersion::from_reply([0, 0, 0, 0]), None);
        assert_eq!(BoltVersion::new(5, 2).to_reply(), [0, 0, 2, 5]);
    }

    #[test]
    fn test_ranges() {
        let r = VersionRange::down_to(5, 4, 4);
        assert!(r.contains(BoltVersion::new(5, 0)));
        assert!(r.contains(BoltVersion::new(5, 4)));
        assert!(!r.contains(BoltVersion::new(5, 5)));
        assert!(!r.contains(BoltVersion::new(4, 4)));
        assert_eq!(r.to_string(), "5.4..5.0");
        assert_eq!(VersionRange::exact(4, 1).to_string(), "4.1");
    }

    #[test]
    fn test_version_features() {
        assert!(BoltVersion::new(5, 2).separates_auth());
        assert!(!BoltVersion::V5_0.separates_auth());
        assert!(BoltVersion::V5_0.uses_utc_datetime());
        assert!(!BoltVersion::V4_4.uses_utc_datetime());
        assert!(BoltVersion::V4_4 < BoltVersion::V5_0);
    }
}
