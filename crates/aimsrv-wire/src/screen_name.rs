//! Screen name display/identity forms (`spec.md` §3).
//!
//! Two views of the same identifier: the *display form* is what the wire
//! surface and clients show (case and internal spacing preserved, trailing
//! spaces trimmed, at most 16 bytes); the *identity form* is lowercase with
//! all spaces removed and is what equality, lookup, and hashing use.
//! Deriving identity from display is total; going the other way requires a
//! stored display form, so `Identity` never attempts it.

use std::fmt;

use crate::{Result, WireError};

pub const MAX_SCREEN_NAME_LEN: usize = 16;

/// The wire-facing, case-and-spacing-preserving form of a screen name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenName(String);

/// The lookup/equality form: lowercase, spaces removed. Safe to use as a
/// `HashMap` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl ScreenName {
    /// Validates and constructs a display-form screen name: trailing spaces
    /// are trimmed, and the trimmed form must be non-empty and at most
    /// [`MAX_SCREEN_NAME_LEN`] bytes.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim_end_matches(' ');
        if trimmed.is_empty() {
            return Err(WireError::InvalidScreenName("empty after trimming trailing spaces"));
        }
        if trimmed.len() > MAX_SCREEN_NAME_LEN {
            return Err(WireError::InvalidScreenName("exceeds 16 bytes"));
        }
        if trimmed.ends_with(' ') {
            return Err(WireError::InvalidScreenName("trailing space"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn identity(&self) -> Identity {
        Identity::from_display(&self.0)
    }
}

impl fmt::Display for ScreenName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Identity {
    /// Derives the identity form directly from a raw display string, without
    /// the length/trailing-space validation `ScreenName::parse` performs.
    /// Total: always succeeds.
    pub fn from_display(display: &str) -> Self {
        let normalized: String = display
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&ScreenName> for Identity {
    fn from(sn: &ScreenName) -> Self {
        sn.identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_normalization_matches_regardless_of_case_and_spaces() {
        let a = Identity::from_display("Chatting Chuck");
        let b = Identity::from_display("chattingchuck");
        let c = Identity::from_display("chatting chuck");
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn display_form_round_trips_through_storage() {
        let sn = ScreenName::parse("Chatting Chuck").unwrap();
        assert_eq!(sn.as_str(), "Chatting Chuck");
        assert_eq!(sn.identity().as_str(), "chattingchuck");
    }

    #[test]
    fn rejects_over_length_name() {
        let err = ScreenName::parse("ThisNameIsWayTooLong").unwrap_err();
        assert!(matches!(err, WireError::InvalidScreenName(_)));
    }

    #[test]
    fn trims_trailing_spaces_only() {
        let sn = ScreenName::parse("Alice   ").unwrap();
        assert_eq!(sn.as_str(), "Alice");
    }

    #[test]
    fn rejects_all_space_name() {
        assert!(ScreenName::parse("    ").is_err());
    }
}
