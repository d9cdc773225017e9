//! Semantic ordering for catalog panel versions
//!
//! Panel catalogs publish versions such as `1.9`, `1.10` or `2.0.1`, and
//! locally amended panels carry an add-on suffix (`1.10|2`) counting the
//! amendments made on top of the catalog version. Comparison is numeric per
//! component so that `1.9 < 1.10`, and missing components count as zero so
//! that `1.10` and `1.10.0` are the same version.

use crate::error::{PanelError, Result};
use std::cmp::Ordering;
use std::str::FromStr;

const ADD_ON_SEPARATOR: char = '|';

/// Parsed panel version
#[derive(Debug, Clone, Copy)]
pub struct PanelVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// Local amendment counter, `None` for an untouched catalog version
    pub add_on: Option<u32>,
    /// Number of dotted components written in the source text (display only)
    components: u8,
}

impl PanelVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            add_on: None,
            components: 3,
        }
    }

    /// Parse `major[.minor[.patch]][|add_on]`
    pub fn parse(version: &str) -> Result<Self> {
        let trimmed = version.trim();
        let (base, add_on) = match trimmed.split_once(ADD_ON_SEPARATOR) {
            Some((base, suffix)) => {
                let counter = suffix
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| PanelError::InvalidVersion(version.to_string()))?;
                (base.trim(), Some(counter))
            },
            None => (trimmed, None),
        };

        let parts: Vec<&str> = base.split('.').collect();
        if base.is_empty() || parts.len() > 3 {
            return Err(PanelError::InvalidVersion(version.to_string()));
        }

        let mut numbers = [0u32; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| PanelError::InvalidVersion(version.to_string()))?;
        }

        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            add_on,
            components: parts.len() as u8,
        })
    }

    /// Version tag for the next local amendment of this version
    ///
    /// `1.2` becomes `1.2|1`, `1.2|1` becomes `1.2|2`.
    pub fn next_add_on(&self) -> Self {
        Self {
            add_on: Some(self.add_on.map_or(1, |n| n + 1)),
            ..*self
        }
    }

    /// The catalog version without any add-on counter
    pub fn catalog_version(&self) -> Self {
        Self {
            add_on: None,
            ..*self
        }
    }

    fn sort_key(&self) -> (u32, u32, u32, Option<u32>) {
        (self.major, self.minor, self.patch, self.add_on)
    }
}

impl PartialEq for PanelVersion {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for PanelVersion {}

impl PartialOrd for PanelVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PanelVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl std::hash::Hash for PanelVersion {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.sort_key().hash(state);
    }
}

impl FromStr for PanelVersion {
    type Err = PanelError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for PanelVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.major)?;
        if self.components >= 2 {
            write!(f, ".{}", self.minor)?;
        }
        if self.components >= 3 {
            write!(f, ".{}", self.patch)?;
        }
        if let Some(add_on) = self.add_on {
            write!(f, "{}{}", ADD_ON_SEPARATOR, add_on)?;
        }
        Ok(())
    }
}

/// Latest version among a set of version tags
///
/// Returns `Ok(None)` for an empty set; any unparseable tag is an error since
/// silently skipping it could hide the real latest version.
pub fn latest_version<'a, I>(tags: I) -> Result<Option<PanelVersion>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut latest: Option<PanelVersion> = None;
    for tag in tags {
        let version = PanelVersion::parse(tag)?;
        if latest.is_none_or(|current| version > current) {
            latest = Some(version);
        }
    }
    Ok(latest)
}

/// Compare two version tags semantically, falling back to text equality when
/// either side does not parse
pub fn same_version(a: &str, b: &str) -> bool {
    match (PanelVersion::parse(a), PanelVersion::parse(b)) {
        (Ok(left), Ok(right)) => left == right,
        _ => a.trim() == b.trim(),
    }
}
