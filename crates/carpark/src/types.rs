//! Domain identifiers and the occupancy payload.

use serde::{Deserialize, Serialize};

/// Identifier of a parking slot.
///
/// Assigned once at pool construction (1..=capacity) and never reused for
/// a different slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(u64);

impl SlotId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for SlotId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("license plate must not be empty")]
pub struct InvalidLicensePlate;

/// License plate of a vehicle. Doubles as the owner token of a slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LicensePlate(String);

impl LicensePlate {
    /// Parse a plate from raw request text.
    ///
    /// Surrounding whitespace and one pair of surrounding double quotes are
    /// stripped, so both `BK-1234` and `"BK-1234"` yield the same plate.
    pub fn parse(raw: &str) -> Result<Self, InvalidLicensePlate> {
        let trimmed = raw.trim();
        let unquoted = trimmed
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(trimmed)
            .trim();
        if unquoted.is_empty() {
            return Err(InvalidLicensePlate);
        }
        Ok(Self(unquoted.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LicensePlate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for LicensePlate {
    type Err = InvalidLicensePlate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// The occupant of a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub license_plate: LicensePlate,
}

impl Vehicle {
    pub fn new(license_plate: LicensePlate) -> Self {
        Self { license_plate }
    }
}
