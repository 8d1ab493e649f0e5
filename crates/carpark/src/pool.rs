//! SlotPool - fixed set of parking slots split into free and occupied partitions.
//!
//! Lock order is partitions → slot. The slot mutex is never held while
//! acquiring the partition mutex.
//!
//! Slots in `free` are `Available` or `Locked`; slots in `occupied` are
//! `Occupied` and keyed by their owner. A slot moves between the two maps
//! only while the partition mutex is held, so `|free| + |occupied|` always
//! equals the capacity.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::slot::{ParkingSlot, SlotError, SlotStatus};
use crate::types::{LicensePlate, SlotId, Vehicle};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("No slots are available")]
    NoSlotAvailable,
    #[error("Slot {slot} is not reserved by {owner}")]
    OwnershipMismatch { slot: SlotId, owner: LicensePlate },
    #[error("Slot {slot} is not reserved (status {status})")]
    NotReserved { slot: SlotId, status: SlotStatus },
    #[error("No occupied slot found for {owner}")]
    NotOccupied { owner: LicensePlate },
    #[error("{owner} already occupies slot {slot}")]
    AlreadyOccupied { owner: LicensePlate, slot: SlotId },
    #[error("Slot {0} is not in the free partition of this pool")]
    UnknownSlot(SlotId),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result of a successful `commit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupiedSlot {
    pub slot_id: SlotId,
    pub vehicle: Vehicle,
    pub occupied_since: DateTime<Utc>,
}

/// Result of a successful `release_occupancy`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasedSlot {
    pub slot_id: SlotId,
    pub vehicle: Vehicle,
    pub occupied_since: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Partitions {
    /// Ordered by id; the reservation scan walks this in ascending order.
    free: BTreeMap<SlotId, Arc<ParkingSlot>>,
    occupied: HashMap<LicensePlate, Arc<ParkingSlot>>,
}

#[derive(Debug)]
pub struct SlotPool {
    name: String,
    capacity: usize,
    partitions: Mutex<Partitions>,
}

impl SlotPool {
    /// Build a pool of `capacity` available slots with ids `1..=capacity`.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let name = name.into();
        let free: BTreeMap<_, _> = (1..=capacity as u64)
            .map(|id| (SlotId::new(id), Arc::new(ParkingSlot::new(SlotId::new(id)))))
            .collect();

        tracing::info!(lot = %name, capacity, "Parking lot created");

        Self {
            name,
            capacity,
            partitions: Mutex::new(Partitions {
                free,
                occupied: HashMap::with_capacity(capacity),
            }),
        }
    }

    fn partitions(&self) -> MutexGuard<'_, Partitions> {
        self.partitions.lock().unwrap_or_else(|poisoned| {
            tracing::error!(lot = %self.name, "Pool mutex poisoned - recovering partitions");
            poisoned.into_inner()
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total_capacity(&self) -> usize {
        self.capacity
    }

    /// Lock the first available slot (ascending id) for `owner`.
    ///
    /// The whole scan runs under the partition mutex, so two concurrent
    /// reservations can never pick the same slot.
    pub fn reserve_slot_for(&self, owner: &LicensePlate) -> Result<Arc<ParkingSlot>, PoolError> {
        let partitions = self.partitions();
        for slot in partitions.free.values() {
            // lock() re-checks availability atomically; a slot locked outside
            // the pool just loses here and the scan moves on.
            if slot.lock(owner).is_ok() {
                tracing::info!(slot = %slot.id(), plate = %owner, "Slot locked");
                return Ok(Arc::clone(slot));
            }
        }
        tracing::debug!(plate = %owner, "No available slot to reserve");
        Err(PoolError::NoSlotAvailable)
    }

    /// Finalize a reservation: the slot becomes `Occupied` by `vehicle` and
    /// moves to the occupied partition under `owner`.
    ///
    /// Nothing is mutated on failure; the reservation stays in place and the
    /// caller decides whether to abort it.
    pub fn commit(
        &self,
        slot: &Arc<ParkingSlot>,
        owner: &LicensePlate,
        vehicle: Vehicle,
    ) -> Result<OccupiedSlot, PoolError> {
        let mut partitions = self.partitions();
        let id = slot.id();

        match partitions.free.get(&id) {
            Some(member) if Arc::ptr_eq(member, slot) => {}
            _ => return Err(PoolError::UnknownSlot(id)),
        }

        if let Some(existing) = partitions.occupied.get(owner) {
            return Err(PoolError::AlreadyOccupied {
                owner: owner.clone(),
                slot: existing.id(),
            });
        }

        let occupied_since = slot.commit_occupancy(owner, vehicle.clone()).map_err(|e| match e {
            SlotError::OwnershipMismatch { slot } => PoolError::OwnershipMismatch {
                slot,
                owner: owner.clone(),
            },
            SlotError::NotLocked { slot, status } => PoolError::NotReserved { slot, status },
            other => PoolError::Internal(other.to_string()),
        })?;

        if let Some(slot) = partitions.free.remove(&id) {
            partitions.occupied.insert(owner.clone(), slot);
        }

        Ok(OccupiedSlot {
            slot_id: id,
            vehicle,
            occupied_since,
        })
    }

    /// Roll back a reservation. Safe to call any number of times.
    pub fn abort_reservation(&self, slot: &ParkingSlot) {
        if slot.unlock() {
            tracing::info!(slot = %slot.id(), "Released lock on slot");
        }
    }

    /// End the occupancy held by `owner` and return the slot to the free partition.
    pub fn release_occupancy(&self, owner: &LicensePlate) -> Result<ReleasedSlot, PoolError> {
        let mut partitions = self.partitions();
        let slot = partitions
            .occupied
            .get(owner)
            .cloned()
            .ok_or_else(|| PoolError::NotOccupied {
                owner: owner.clone(),
            })?;

        // Anything but success here means the occupied index disagrees with
        // the slot itself. Report it and leave both untouched.
        let released = slot.release(owner).map_err(|e| {
            tracing::error!(slot = %slot.id(), plate = %owner, error = %e, "Bug: occupied index out of sync with slot");
            PoolError::Internal(e.to_string())
        })?;

        partitions.occupied.remove(owner);
        partitions.free.insert(slot.id(), Arc::clone(&slot));

        Ok(ReleasedSlot {
            slot_id: slot.id(),
            vehicle: released.vehicle,
            occupied_since: released.occupied_since,
        })
    }

    pub fn find_occupant_slot(&self, owner: &LicensePlate) -> Option<Arc<ParkingSlot>> {
        self.partitions().occupied.get(owner).cloned()
    }

    /// Look a slot up by id. Occupied slots are keyed by owner, so that
    /// half of the lookup is a linear scan.
    pub fn find_slot_by_id(&self, id: SlotId) -> Option<Arc<ParkingSlot>> {
        let partitions = self.partitions();
        partitions
            .free
            .get(&id)
            .or_else(|| partitions.occupied.values().find(|s| s.id() == id))
            .cloned()
    }

    pub fn is_occupied(&self, owner: &LicensePlate) -> bool {
        self.partitions().occupied.contains_key(owner)
    }

    /// Number of `Available` slots. Locked slots are reserved, not available.
    pub fn available_count(&self) -> usize {
        self.partitions()
            .free
            .values()
            .filter(|s| s.is_available())
            .count()
    }

    pub fn occupied_count(&self) -> usize {
        self.partitions().occupied.len()
    }

    #[cfg(test)]
    fn partition_sizes(&self) -> (usize, usize) {
        let partitions = self.partitions();
        (partitions.free.len(), partitions.occupied.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn plate(s: &str) -> LicensePlate {
        LicensePlate::parse(s).unwrap()
    }

    fn car(s: &str) -> Vehicle {
        Vehicle::new(plate(s))
    }

    fn park(pool: &SlotPool, s: &str) -> OccupiedSlot {
        let slot = pool.reserve_slot_for(&plate(s)).unwrap();
        pool.commit(&slot, &plate(s), car(s)).unwrap()
    }

    #[test]
    fn new_pool_is_all_available() {
        for capacity in [0, 1, 5, 64] {
            let pool = SlotPool::new("Demo Parking Lot", capacity);
            assert_eq!(pool.available_count(), capacity);
            assert_eq!(pool.total_capacity(), capacity);
            assert_eq!(pool.occupied_count(), 0);
            assert_eq!(pool.partition_sizes(), (capacity, 0));
        }
    }

    #[test]
    fn empty_pool_has_nothing_to_reserve() {
        let pool = SlotPool::new("empty", 0);
        assert_eq!(
            pool.reserve_slot_for(&plate("A")).unwrap_err(),
            PoolError::NoSlotAvailable
        );
    }

    #[test]
    fn reserve_locks_lowest_id_first() {
        let pool = SlotPool::new("lot", 3);

        let slot = pool.reserve_slot_for(&plate("BK-78h")).unwrap();
        assert_eq!(slot.id(), SlotId::new(1));
        assert!(slot.is_locked());
        assert_eq!(slot.owner(), Some(plate("BK-78h")));

        let next = pool.reserve_slot_for(&plate("X")).unwrap();
        assert_eq!(next.id(), SlotId::new(2));

        // Locked slots are reserved, not available, but stay in the free partition.
        assert_eq!(pool.available_count(), 1);
        assert_eq!(pool.partition_sizes(), (3, 0));
    }

    #[test]
    fn commit_moves_slot_to_occupied() {
        let pool = SlotPool::new("lot", 2);
        let slot = pool.reserve_slot_for(&plate("BK-1234")).unwrap();

        let occupied = pool.commit(&slot, &plate("BK-1234"), car("BK-1234")).unwrap();

        assert_eq!(occupied.slot_id, SlotId::new(1));
        assert_eq!(occupied.vehicle, car("BK-1234"));
        let snapshot = slot.snapshot();
        assert_eq!(snapshot.status, SlotStatus::Occupied);
        assert_eq!(snapshot.vehicle, Some(car("BK-1234")));
        assert_eq!(snapshot.occupied_since, Some(occupied.occupied_since));
        assert!(pool.is_occupied(&plate("BK-1234")));
        assert_eq!(pool.partition_sizes(), (1, 1));
    }

    #[test]
    fn commit_with_foreign_owner_fails_and_keeps_lock() {
        let pool = SlotPool::new("lot", 2);
        let slot = pool.reserve_slot_for(&plate("SOMEOTHERLICENSE")).unwrap();

        let err = pool
            .commit(&slot, &plate("BK-1234"), car("BK-1234"))
            .unwrap_err();

        assert_eq!(
            err,
            PoolError::OwnershipMismatch {
                slot: SlotId::new(1),
                owner: plate("BK-1234")
            }
        );
        assert!(slot.is_locked());
        assert_eq!(slot.owner(), Some(plate("SOMEOTHERLICENSE")));
        assert!(!pool.is_occupied(&plate("BK-1234")));
        assert_eq!(pool.partition_sizes(), (2, 0));
    }

    #[test]
    fn commit_after_abort_fails() {
        let pool = SlotPool::new("lot", 1);
        let slot = pool.reserve_slot_for(&plate("A")).unwrap();
        pool.abort_reservation(&slot);

        assert_eq!(
            pool.commit(&slot, &plate("A"), car("A")).unwrap_err(),
            PoolError::NotReserved {
                slot: SlotId::new(1),
                status: SlotStatus::Available
            }
        );
        assert_eq!(pool.available_count(), 1);
    }

    #[test]
    fn commit_rejects_slot_from_another_pool() {
        let pool = SlotPool::new("lot", 1);
        let other = SlotPool::new("other", 1);
        let foreign = other.reserve_slot_for(&plate("A")).unwrap();

        assert_eq!(
            pool.commit(&foreign, &plate("A"), car("A")).unwrap_err(),
            PoolError::UnknownSlot(SlotId::new(1))
        );
        assert!(foreign.is_locked());
        assert_eq!(pool.available_count(), 1);
    }

    #[test]
    fn commit_rejects_second_occupancy_for_same_owner() {
        let pool = SlotPool::new("lot", 2);
        let first = pool.reserve_slot_for(&plate("A")).unwrap();
        let second = pool.reserve_slot_for(&plate("A")).unwrap();

        pool.commit(&first, &plate("A"), car("A")).unwrap();
        let err = pool.commit(&second, &plate("A"), car("A")).unwrap_err();

        assert_eq!(
            err,
            PoolError::AlreadyOccupied {
                owner: plate("A"),
                slot: SlotId::new(1)
            }
        );
        assert!(second.is_locked());
        assert_eq!(pool.occupied_count(), 1);
    }

    #[test]
    fn abort_reservation_twice_is_harmless() {
        let pool = SlotPool::new("lot", 1);
        let slot = pool.reserve_slot_for(&plate("A")).unwrap();

        pool.abort_reservation(&slot);
        pool.abort_reservation(&slot);

        assert!(slot.is_available());
        assert_eq!(pool.available_count(), 1);
    }

    #[test]
    fn abort_reservation_ignores_occupied_slot() {
        let pool = SlotPool::new("lot", 1);
        let slot = pool.reserve_slot_for(&plate("A")).unwrap();
        pool.commit(&slot, &plate("A"), car("A")).unwrap();

        pool.abort_reservation(&slot);

        assert!(slot.is_occupied());
        assert!(pool.is_occupied(&plate("A")));
    }

    #[test]
    fn round_trip_restores_slot() {
        let pool = SlotPool::new("lot", 2);
        let parked = park(&pool, "A");
        assert_eq!(pool.available_count(), 1);

        let released = pool.release_occupancy(&plate("A")).unwrap();

        assert_eq!(released.slot_id, parked.slot_id);
        assert_eq!(released.vehicle, car("A"));
        assert_eq!(released.occupied_since, parked.occupied_since);
        assert_eq!(pool.available_count(), 2);
        assert!(!pool.is_occupied(&plate("A")));
        assert_eq!(pool.partition_sizes(), (2, 0));

        let slot = pool.find_slot_by_id(parked.slot_id).unwrap();
        let snapshot = slot.snapshot();
        assert_eq!(snapshot.status, SlotStatus::Available);
        assert!(snapshot.owner.is_none());
        assert!(snapshot.vehicle.is_none());
        assert!(snapshot.occupied_since.is_none());
    }

    #[test]
    fn release_of_unknown_owner_fails_without_mutation() {
        let pool = SlotPool::new("lot", 2);
        park(&pool, "A");

        assert_eq!(
            pool.release_occupancy(&plate("Z")).unwrap_err(),
            PoolError::NotOccupied { owner: plate("Z") }
        );
        assert!(pool.is_occupied(&plate("A")));
        assert_eq!(pool.partition_sizes(), (1, 1));
    }

    #[test]
    fn find_slot_by_id_covers_both_partitions() {
        let pool = SlotPool::new("lot", 2);
        park(&pool, "A");

        let occupied = pool.find_slot_by_id(SlotId::new(1)).unwrap();
        assert_eq!(occupied.owner(), Some(plate("A")));

        let free = pool.find_slot_by_id(SlotId::new(2)).unwrap();
        assert!(free.is_available());

        assert!(pool.find_slot_by_id(SlotId::new(3)).is_none());
        assert!(pool.find_slot_by_id(SlotId::new(0)).is_none());
    }

    #[test]
    fn find_occupant_slot_by_owner() {
        let pool = SlotPool::new("lot", 2);
        park(&pool, "A");

        let slot = pool.find_occupant_slot(&plate("A")).unwrap();
        assert_eq!(slot.id(), SlotId::new(1));
        assert!(pool.find_occupant_slot(&plate("B")).is_none());
    }

    #[test]
    fn concurrent_reservations_never_share_a_slot() {
        const CAPACITY: usize = 8;
        const CALLERS: usize = 32;

        let pool = SlotPool::new("lot", CAPACITY);

        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..CALLERS)
                .map(|i| {
                    let pool = &pool;
                    s.spawn(move || {
                        let owner = plate(&format!("CAR-{i}"));
                        pool.reserve_slot_for(&owner).map(|slot| (owner, slot.id()))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let granted: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(PoolError::NoSlotAvailable)))
            .count();

        assert_eq!(granted.len(), CAPACITY);
        assert_eq!(rejected, CALLERS - CAPACITY);

        let ids: HashSet<_> = granted.iter().map(|(_, id)| *id).collect();
        assert_eq!(ids.len(), CAPACITY);

        for (owner, id) in granted {
            let slot = pool.find_slot_by_id(*id).unwrap();
            assert_eq!(slot.owner().as_ref(), Some(owner));
        }
        assert_eq!(pool.available_count(), 0);
    }

    #[test]
    fn concurrent_park_and_release_keeps_partitions_consistent() {
        const CAPACITY: usize = 4;
        let pool = SlotPool::new("lot", CAPACITY);

        std::thread::scope(|s| {
            for worker in 0..8 {
                let pool = &pool;
                s.spawn(move || {
                    for round in 0..50 {
                        let owner = plate(&format!("W{worker}-{round}"));
                        let Ok(slot) = pool.reserve_slot_for(&owner) else {
                            continue;
                        };
                        pool.commit(&slot, &owner, Vehicle::new(owner.clone()))
                            .unwrap();
                        pool.release_occupancy(&owner).unwrap();
                    }
                });
            }
        });

        assert_eq!(pool.partition_sizes(), (CAPACITY, 0));
        assert_eq!(pool.available_count(), CAPACITY);
    }

    /// Capacity-2 walkthrough: fill, exhaust, free, reuse, bad release, lookup.
    #[test]
    fn two_slot_scenarios() {
        let pool = SlotPool::new("lot", 2);

        let a = pool.reserve_slot_for(&plate("A")).unwrap();
        assert_eq!(a.id(), SlotId::new(1));
        pool.commit(&a, &plate("A"), car("A")).unwrap();
        assert!(a.is_occupied());
        assert_eq!(pool.available_count(), 1);

        let b = pool.reserve_slot_for(&plate("B")).unwrap();
        assert_eq!(b.id(), SlotId::new(2));
        pool.commit(&b, &plate("B"), car("B")).unwrap();
        assert_eq!(
            pool.reserve_slot_for(&plate("C")).unwrap_err(),
            PoolError::NoSlotAvailable
        );
        assert_eq!(pool.available_count(), 0);

        let by_id = pool.find_slot_by_id(SlotId::new(2)).unwrap();
        assert!(by_id.is_occupied());
        assert_eq!(by_id.owner(), Some(plate("B")));

        pool.release_occupancy(&plate("A")).unwrap();
        assert!(a.is_available());
        assert_eq!(pool.available_count(), 1);

        let c = pool.reserve_slot_for(&plate("C")).unwrap();
        assert_eq!(c.id(), SlotId::new(1));
        pool.commit(&c, &plate("C"), car("C")).unwrap();

        let before = pool.partition_sizes();
        assert!(matches!(
            pool.release_occupancy(&plate("Z")),
            Err(PoolError::NotOccupied { .. })
        ));
        assert_eq!(pool.partition_sizes(), before);
        assert_eq!(pool.available_count(), 0);
    }
}
