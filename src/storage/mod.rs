//! Per-entity stores over the shared connection pool. Every store follows
//! the same contract: counts are computed over the filtered set without
//! limit/offset, listings are ordered by the natural key ascending, and
//! upserts key on the natural key.

mod blade;
mod chassis;
mod discrete;
mod disk;
mod fan;
mod nic;
mod psu;
mod scanned_port;
mod storage_blade;

pub use blade::BladeStorage;
pub use chassis::ChassisStorage;
pub use discrete::DiscreteStorage;
pub use disk::DiskStorage;
pub use fan::FanStorage;
pub use nic::NicStorage;
pub use psu::PsuStorage;
pub use scanned_port::{Reachability, ScannedPortStorage};
pub use storage_blade::StorageBladeStorage;
