//! Output format tags and the validated set of formats a request asks for.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A recognised output format (aspect ratio) for a rendered creative.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FormatTag {
    Square,
    Portrait4x5,
    Story9x16,
    Landscape16x9,
    Classic4x3,
    Classic3x4,
    Photo3x2,
    Photo2x3,
    Ultrawide21x9,
}

impl FormatTag {
    pub const ALL: [FormatTag; 9] = [
        FormatTag::Square,
        FormatTag::Portrait4x5,
        FormatTag::Story9x16,
        FormatTag::Landscape16x9,
        FormatTag::Classic4x3,
        FormatTag::Classic3x4,
        FormatTag::Photo3x2,
        FormatTag::Photo2x3,
        FormatTag::Ultrawide21x9,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FormatTag::Square => "1:1",
            FormatTag::Portrait4x5 => "4:5",
            FormatTag::Story9x16 => "9:16",
            FormatTag::Landscape16x9 => "16:9",
            FormatTag::Classic4x3 => "4:3",
            FormatTag::Classic3x4 => "3:4",
            FormatTag::Photo3x2 => "3:2",
            FormatTag::Photo2x3 => "2:3",
            FormatTag::Ultrawide21x9 => "21:9",
        }
    }
}

impl core::fmt::Display for FormatTag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatTag {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        FormatTag::ALL
            .into_iter()
            .find(|f| f.as_str() == trimmed)
            .ok_or_else(|| DomainError::validation(format!("unknown format tag '{s}'")))
    }
}

impl TryFrom<String> for FormatTag {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FormatTag> for String {
    fn from(value: FormatTag) -> Self {
        value.as_str().to_string()
    }
}

/// Non-empty, duplicate-free, ordered list of formats requested together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FormatTag>", into = "Vec<FormatTag>")]
pub struct RequestedFormats(Vec<FormatTag>);

impl RequestedFormats {
    /// Build from already-typed tags, preserving order.
    pub fn new(formats: Vec<FormatTag>) -> DomainResult<Self> {
        if formats.is_empty() {
            return Err(DomainError::validation("at least one format is required"));
        }

        for (idx, tag) in formats.iter().enumerate() {
            if formats[..idx].contains(tag) {
                return Err(DomainError::validation(format!("duplicate format tag '{tag}'")));
            }
        }

        Ok(Self(formats))
    }

    /// Parse raw tags (e.g. from a client payload).
    pub fn parse<I, S>(raw: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags = raw
            .into_iter()
            .map(|s| s.as_ref().parse::<FormatTag>())
            .collect::<DomainResult<Vec<_>>>()?;
        Self::new(tags)
    }

    pub fn as_slice(&self) -> &[FormatTag] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FormatTag> {
        self.0.iter()
    }
}

impl TryFrom<Vec<FormatTag>> for RequestedFormats {
    type Error = DomainError;

    fn try_from(value: Vec<FormatTag>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RequestedFormats> for Vec<FormatTag> {
    fn from(value: RequestedFormats) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_tags() {
        assert_eq!("16:9".parse::<FormatTag>().unwrap(), FormatTag::Landscape16x9);
        assert_eq!(" 1:1 ".parse::<FormatTag>().unwrap(), FormatTag::Square);
    }

    #[test]
    fn rejects_unknown_tag() {
        assert!(matches!(
            "5:7".parse::<FormatTag>(),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn requested_formats_keep_order() {
        let formats = RequestedFormats::parse(["9:16", "1:1", "16:9"]).unwrap();
        assert_eq!(
            formats.as_slice(),
            &[FormatTag::Story9x16, FormatTag::Square, FormatTag::Landscape16x9]
        );
    }

    #[test]
    fn requested_formats_reject_empty_and_duplicates() {
        let empty: [&str; 0] = [];
        assert!(RequestedFormats::parse(empty).is_err());
        assert!(RequestedFormats::parse(["1:1", "1:1"]).is_err());
    }

    #[test]
    fn serde_uses_wire_tags() {
        let formats = RequestedFormats::parse(["1:1", "16:9"]).unwrap();
        let json = serde_json::to_value(&formats).unwrap();
        assert_eq!(json, serde_json::json!(["1:1", "16:9"]));

        let back: RequestedFormats = serde_json::from_value(json).unwrap();
        assert_eq!(back, formats);

        let bad: Result<RequestedFormats, _> = serde_json::from_value(serde_json::json!([]));
        assert!(bad.is_err());
    }
}
