// Symbolic register addresses (`N33:5`) and their gateway URL encoding.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// A register address: data file name plus element index, e.g. `N91:3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagAddress {
    pub file: String,
    pub element: u32,
}

impl TagAddress {
    pub fn new(file: impl Into<String>, element: u32) -> Self {
        Self {
            file: file.into(),
            element,
        }
    }

    /// Path segment form for GET-style URLs.
    ///
    /// The gateway URL-decodes the path once before forwarding to the PLC
    /// driver, so the colon goes out as `%253A` and arrives as `%3A`.
    pub fn encoded(&self) -> String {
        format!("{}%253A{}", self.file, self.element)
    }
}

impl fmt::Display for TagAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.element)
    }
}

impl FromStr for TagAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (file, element) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidTag(s.to_owned()))?;
        if file.is_empty() || !file.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidTag(s.to_owned()));
        }
        let element = element
            .parse()
            .map_err(|_| Error::InvalidTag(s.to_owned()))?;
        Ok(Self::new(file, element))
    }
}

impl Serialize for TagAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TagAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn colon_is_double_encoded() {
        let tag = TagAddress::new("N33", 0);
        assert_eq!(tag.encoded(), "N33%253A0");
        assert_eq!(tag.to_string(), "N33:0");
    }

    #[test]
    fn parses_file_and_element() {
        let tag: TagAddress = "N96:19".parse().unwrap();
        assert_eq!(tag, TagAddress::new("N96", 19));
    }

    #[test]
    fn rejects_malformed_addresses() {
        for raw in ["N33", ":4", "N33:x", "N 3:1", "N33:-1"] {
            assert!(raw.parse::<TagAddress>().is_err(), "{raw} should not parse");
        }
    }
}
