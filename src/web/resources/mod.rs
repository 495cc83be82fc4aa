//! One module per exposed collection, mirroring the storage layer. Every
//! list handler speaks the same query dialect: `filter[...]`,
//! `page[offset]`/`page[limit]`, `include`, and the relation selectors.

pub mod blade;
pub mod chassis;
pub mod discrete;
pub mod disk;
pub mod fan;
pub mod nic;
pub mod psu;
pub mod scanned_port;
pub mod storage_blade;
