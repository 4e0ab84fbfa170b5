#![forbid(unsafe_code)]

mod bus;
mod phys;

pub use bus::{MapError, MmioHandler, RegionKind, SystemBus};
pub use phys::{DenseMemory, GuestMemory, GuestMemoryError, GuestMemoryResult};
