//! Health status types for the parking service.

use serde::{Deserialize, Serialize};

/// Health of the parking service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Health {
    /// Lot not initialized yet
    #[default]
    Unknown,
    /// Accepting vehicles
    Ready,
    /// Initialized but every slot is reserved or occupied
    Full,
}
