//! ParkingService: transport-agnostic parking lot operations.
//!
//! This service owns:
//! - The one-shot lot initialization (PoolInitializer)
//! - The reserve → commit → rollback protocol around the SlotPool
//! - Shutdown signalling for transports
//!
//! Transports (HTTP today) delegate to this service and only map its typed
//! results onto responses.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;

use crate::health::Health;
use crate::lifecycle::{AlreadyInitialized, PoolInitializer};
use crate::pool::{PoolError, SlotPool};
use crate::slot::SlotStatus;
use crate::types::{LicensePlate, SlotId, Vehicle};
use crate::version::VersionInfo;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParkError {
    #[error("Parking lot has not been initialized")]
    NotReady,
    #[error("Vehicle already parked having license plate: {0}")]
    AlreadyParked(LicensePlate),
    #[error("No slots are available")]
    NoSlotAvailable,
    #[error("Internal error while parking: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnparkError {
    #[error("Parking lot has not been initialized")]
    NotReady,
    #[error("No parked vehicle found having license plate: {0}")]
    NotOccupied(LicensePlate),
    #[error("Internal error while unparking: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotStatusError {
    #[error("Parking lot has not been initialized")]
    NotReady,
    #[error("Slot not found having slotId: {0}")]
    SlotNotFound(SlotId),
}

/// Proof of a successful park.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParkingTicket {
    pub slot_id: SlotId,
    pub license_plate: LicensePlate,
    pub parked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnparkReceipt {
    pub slot_id: SlotId,
    pub license_plate: LicensePlate,
    pub parked_at: DateTime<Utc>,
    pub unparked_at: DateTime<Utc>,
    pub duration: TimeDelta,
}

/// Slot status as reported to clients. Occupant details only for occupied slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotReport {
    pub slot_id: SlotId,
    pub status: SlotStatus,
    pub license_plate: Option<LicensePlate>,
    pub parked_at: Option<DateTime<Utc>>,
    pub duration: Option<TimeDelta>,
}

/// Snapshot of service health for transports to query.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub state: Health,
    pub lot_name: Option<String>,
    pub available_slots: usize,
    pub total_slots: usize,
    pub version: VersionInfo,
}

impl HealthSnapshot {
    pub fn is_ready(&self) -> bool {
        self.state == Health::Ready
    }
}

pub struct ParkingService {
    lot: PoolInitializer,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,

    version: VersionInfo,
}

impl Default for ParkingService {
    fn default() -> Self {
        Self::new()
    }
}

impl ParkingService {
    /// Create without a lot. Operations report `NotReady` until `initialize()`.
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            lot: PoolInitializer::new(),
            shutdown_tx,
            shutdown_rx,
            version: VersionInfo::new(),
        }
    }

    pub fn with_version(mut self, version: VersionInfo) -> Self {
        self.version = version;
        self
    }

    /// Build the lot. Only the first call succeeds.
    pub fn initialize(
        &self,
        name: impl Into<String>,
        capacity: usize,
    ) -> Result<Arc<SlotPool>, AlreadyInitialized> {
        self.lot.initialize(name, capacity)
    }

    pub fn pool(&self) -> Option<Arc<SlotPool>> {
        self.lot.get()
    }

    pub fn is_parked(&self, plate: &LicensePlate) -> bool {
        self.pool().is_some_and(|pool| pool.is_occupied(plate))
    }

    /// Park `plate` in the first available slot.
    ///
    /// The already-parked check runs before reserving. A concurrent park of
    /// the same plate that slips past it is caught at commit and reported as
    /// `AlreadyParked` too.
    pub fn park(&self, plate: LicensePlate) -> Result<ParkingTicket, ParkError> {
        let pool = self.pool().ok_or(ParkError::NotReady)?;

        if pool.is_occupied(&plate) {
            return Err(ParkError::AlreadyParked(plate));
        }

        let slot = pool.reserve_slot_for(&plate).map_err(|e| match e {
            PoolError::NoSlotAvailable => ParkError::NoSlotAvailable,
            other => ParkError::Internal(other.to_string()),
        })?;

        let vehicle = Vehicle::new(plate.clone());
        match pool.commit(&slot, &plate, vehicle) {
            Ok(occupied) => {
                tracing::info!(slot = %occupied.slot_id, plate = %plate, "Vehicle parked");
                Ok(ParkingTicket {
                    slot_id: occupied.slot_id,
                    license_plate: plate,
                    parked_at: occupied.occupied_since,
                })
            }
            Err(PoolError::AlreadyOccupied { .. }) => {
                pool.abort_reservation(&slot);
                Err(ParkError::AlreadyParked(plate))
            }
            Err(e) => {
                pool.abort_reservation(&slot);
                tracing::error!(slot = %slot.id(), plate = %plate, error = %e, "Failed to park vehicle");
                Err(ParkError::Internal(e.to_string()))
            }
        }
    }

    pub fn unpark(&self, plate: &LicensePlate) -> Result<UnparkReceipt, UnparkError> {
        let pool = self.pool().ok_or(UnparkError::NotReady)?;

        let released = pool.release_occupancy(plate).map_err(|e| match e {
            PoolError::NotOccupied { owner } => UnparkError::NotOccupied(owner),
            other => UnparkError::Internal(other.to_string()),
        })?;

        let unparked_at = Utc::now();
        tracing::info!(slot = %released.slot_id, plate = %plate, "Vehicle unparked");

        Ok(UnparkReceipt {
            slot_id: released.slot_id,
            license_plate: released.vehicle.license_plate,
            parked_at: released.occupied_since,
            unparked_at,
            duration: unparked_at - released.occupied_since,
        })
    }

    pub fn slot_status(&self, id: SlotId) -> Result<SlotReport, SlotStatusError> {
        let pool = self.pool().ok_or(SlotStatusError::NotReady)?;
        let slot = pool
            .find_slot_by_id(id)
            .ok_or(SlotStatusError::SlotNotFound(id))?;

        let snapshot = slot.snapshot();
        tracing::debug!(slot = %id, status = %snapshot.status, "Slot status");

        let (license_plate, parked_at, duration) = match (snapshot.vehicle, snapshot.occupied_since)
        {
            (Some(vehicle), Some(since)) => (
                Some(vehicle.license_plate),
                Some(since),
                Some(Utc::now() - since),
            ),
            _ => (None, None, None),
        };

        Ok(SlotReport {
            slot_id: snapshot.id,
            status: snapshot.status,
            license_plate,
            parked_at,
            duration,
        })
    }

    pub fn available_slots(&self) -> usize {
        self.pool().map_or(0, |pool| pool.available_count())
    }

    pub fn total_slots(&self) -> usize {
        self.pool().map_or(0, |pool| pool.total_capacity())
    }

    pub fn health(&self) -> HealthSnapshot {
        let pool = self.pool();
        let (state, lot_name, available_slots, total_slots) = match pool.as_ref() {
            Some(p) => {
                let available = p.available_count();
                let state = if available == 0 {
                    Health::Full
                } else {
                    Health::Ready
                };
                (
                    state,
                    Some(p.name().to_string()),
                    available,
                    p.total_capacity(),
                )
            }
            None => (Health::Unknown, None, 0, 0),
        };

        HealthSnapshot {
            state,
            lot_name,
            available_slots,
            total_slots,
            version: self.version.clone(),
        }
    }

    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }
}
