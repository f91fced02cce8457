//! Low-level IO primitives for `.mv2s` files.

pub mod header;
pub mod pfile;
pub mod wal;

pub use wal::{WalCounters, WalRing, WalStats};
