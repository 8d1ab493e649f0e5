//! carpark: concurrent fixed-capacity parking slot allocation.

mod health;
mod lifecycle;
mod types;
mod version;

pub mod pool;
pub mod service;
pub mod slot;
pub mod transport;

pub use health::Health;
pub use lifecycle::{AlreadyInitialized, PoolInitializer};
pub use pool::{OccupiedSlot, PoolError, ReleasedSlot, SlotPool};
pub use service::{
    HealthSnapshot, ParkError, ParkingService, ParkingTicket, SlotReport, SlotStatusError,
    UnparkError, UnparkReceipt,
};
pub use slot::{ParkingSlot, SlotError, SlotSnapshot, SlotStatus};
pub use types::{InvalidLicensePlate, LicensePlate, SlotId, Vehicle};
pub use version::{CARPARK_VERSION, VersionInfo};
