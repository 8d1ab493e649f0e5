//! ParkingSlot - a single allocatable unit and its state machine.
//!
//! Status, owner, occupant and timestamp live together in one `SlotState`
//! value behind a per-slot mutex. Every transition replaces the whole value,
//! so a reader can never observe e.g. `Occupied` without an occupant.
//!
//! Transitions:
//! - `Available` → `Locked` via `lock()`
//! - `Locked` → `Occupied` via `commit_occupancy()`
//! - `Locked` → `Available` via `unlock()` (rollback, idempotent)
//! - `Occupied` → `Available` via `release()`

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{LicensePlate, SlotId, Vehicle};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    #[default]
    Available,
    /// Reserved for an owner, pending commit.
    Locked,
    Occupied,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Locked => "LOCKED",
            Self::Occupied => "OCCUPIED",
        }
    }
}

impl std::fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("Cannot lock slot {slot} having status {status}")]
    LockConflict { slot: SlotId, status: SlotStatus },
    #[error("Slot {slot} is held by a different owner")]
    OwnershipMismatch { slot: SlotId },
    #[error("Slot {slot} is not occupied (status {status})")]
    NotOccupied { slot: SlotId, status: SlotStatus },
    #[error("Slot {slot} is not locked (status {status})")]
    NotLocked { slot: SlotId, status: SlotStatus },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SlotState {
    Available,
    Locked {
        owner: LicensePlate,
    },
    Occupied {
        owner: LicensePlate,
        vehicle: Vehicle,
        since: DateTime<Utc>,
    },
}

impl SlotState {
    fn status(&self) -> SlotStatus {
        match self {
            SlotState::Available => SlotStatus::Available,
            SlotState::Locked { .. } => SlotStatus::Locked,
            SlotState::Occupied { .. } => SlotStatus::Occupied,
        }
    }
}

/// Consistent point-in-time view of a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSnapshot {
    pub id: SlotId,
    pub status: SlotStatus,
    pub owner: Option<LicensePlate>,
    pub vehicle: Option<Vehicle>,
    pub occupied_since: Option<DateTime<Utc>>,
}

/// An occupancy that was just ended by `release()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReleasedOccupancy {
    pub vehicle: Vehicle,
    pub occupied_since: DateTime<Utc>,
}

/// A single parking slot.
///
/// Outside the crate a slot is read-only. State changes go through
/// [`SlotPool`](crate::SlotPool), which moves the slot between its free and
/// occupied partitions in the same step.
///
/// ```
/// use carpark::{LicensePlate, ParkingService, SlotStatus};
///
/// let service = ParkingService::new();
/// let pool = service.initialize("lot", 1).unwrap();
/// let plate = LicensePlate::parse("A").unwrap();
/// service.park(plate.clone()).unwrap();
///
/// let slot = pool.find_occupant_slot(&plate).unwrap();
/// assert_eq!(slot.status(), SlotStatus::Occupied);
/// assert_eq!(slot.owner(), Some(plate));
/// ```
///
/// Releasing a slot directly does not compile:
///
/// ```compile_fail
/// use carpark::{LicensePlate, ParkingService};
///
/// let service = ParkingService::new();
/// let pool = service.initialize("lot", 1).unwrap();
/// let plate = LicensePlate::parse("A").unwrap();
/// service.park(plate.clone()).unwrap();
///
/// let slot = pool.find_occupant_slot(&plate).unwrap();
/// let _ = slot.release(&plate);
/// ```
///
/// Neither does committing a reservation behind the pool's back:
///
/// ```compile_fail
/// use carpark::{LicensePlate, ParkingService, Vehicle};
///
/// let service = ParkingService::new();
/// let pool = service.initialize("lot", 1).unwrap();
/// let plate = LicensePlate::parse("A").unwrap();
///
/// let slot = pool.reserve_slot_for(&plate).unwrap();
/// let _ = slot.commit_occupancy(&plate, Vehicle::new(plate.clone()));
/// ```
#[derive(Debug)]
pub struct ParkingSlot {
    id: SlotId,
    state: Mutex<SlotState>,
}

impl ParkingSlot {
    pub fn new(id: SlotId) -> Self {
        Self {
            id,
            state: Mutex::new(SlotState::Available),
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    /// Lock the slot state, recovering from poison.
    ///
    /// Transitions assign a complete `SlotState`, so a poisoned guard still
    /// holds a valid state.
    fn state(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::error!(slot = %self.id, "Slot mutex poisoned - recovering state");
            poisoned.into_inner()
        })
    }

    /// Reserve the slot for `owner`. Only an `Available` slot can be locked.
    pub(crate) fn lock(&self, owner: &LicensePlate) -> Result<(), SlotError> {
        let mut state = self.state();
        if *state != SlotState::Available {
            return Err(SlotError::LockConflict {
                slot: self.id,
                status: state.status(),
            });
        }
        *state = SlotState::Locked {
            owner: owner.clone(),
        };
        Ok(())
    }

    /// Turn a reservation held by `owner` into an occupancy.
    ///
    /// The owner check and the transition happen under one lock.
    pub(crate) fn commit_occupancy(
        &self,
        owner: &LicensePlate,
        vehicle: Vehicle,
    ) -> Result<DateTime<Utc>, SlotError> {
        let mut state = self.state();
        match &*state {
            SlotState::Locked { owner: holder } if holder == owner => {}
            SlotState::Locked { .. } => {
                return Err(SlotError::OwnershipMismatch { slot: self.id });
            }
            other => {
                return Err(SlotError::NotLocked {
                    slot: self.id,
                    status: other.status(),
                });
            }
        }

        let since = Utc::now();
        *state = SlotState::Occupied {
            owner: owner.clone(),
            vehicle,
            since,
        };
        Ok(since)
    }

    /// End the occupancy held by `owner`.
    pub(crate) fn release(&self, owner: &LicensePlate) -> Result<ReleasedOccupancy, SlotError> {
        let mut state = self.state();
        match std::mem::replace(&mut *state, SlotState::Available) {
            SlotState::Occupied {
                owner: holder,
                vehicle,
                since,
            } if holder == *owner => Ok(ReleasedOccupancy {
                vehicle,
                occupied_since: since,
            }),
            previous => {
                let err = match previous {
                    SlotState::Occupied { .. } => SlotError::OwnershipMismatch { slot: self.id },
                    ref other => SlotError::NotOccupied {
                        slot: self.id,
                        status: other.status(),
                    },
                };
                // Put back whatever we took out; failure must not mutate.
                *state = previous;
                Err(err)
            }
        }
    }

    /// Roll back a reservation. No-op unless the slot is `Locked`.
    ///
    /// Returns whether a reservation was actually dropped.
    pub(crate) fn unlock(&self) -> bool {
        let mut state = self.state();
        if matches!(*state, SlotState::Locked { .. }) {
            *state = SlotState::Available;
            true
        } else {
            false
        }
    }

    pub fn status(&self) -> SlotStatus {
        self.state().status()
    }

    pub fn is_available(&self) -> bool {
        self.status() == SlotStatus::Available
    }

    pub fn is_locked(&self) -> bool {
        self.status() == SlotStatus::Locked
    }

    pub fn is_occupied(&self) -> bool {
        self.status() == SlotStatus::Occupied
    }

    /// Current owner token, if the slot is locked or occupied.
    pub fn owner(&self) -> Option<LicensePlate> {
        match &*self.state() {
            SlotState::Available => None,
            SlotState::Locked { owner } | SlotState::Occupied { owner, .. } => Some(owner.clone()),
        }
    }

    pub fn snapshot(&self) -> SlotSnapshot {
        let state = self.state();
        let status = state.status();
        match &*state {
            SlotState::Available => SlotSnapshot {
                id: self.id,
                status,
                owner: None,
                vehicle: None,
                occupied_since: None,
            },
            SlotState::Locked { owner } => SlotSnapshot {
                id: self.id,
                status,
                owner: Some(owner.clone()),
                vehicle: None,
                occupied_since: None,
            },
            SlotState::Occupied {
                owner,
                vehicle,
                since,
            } => SlotSnapshot {
                id: self.id,
                status,
                owner: Some(owner.clone()),
                vehicle: Some(vehicle.clone()),
                occupied_since: Some(*since),
            },
        }
    }
}
