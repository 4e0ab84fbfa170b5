use crate::phys::{DenseMemory, GuestMemory};
use core::fmt;
use std::sync::Arc;

/// Handler for a memory-mapped peripheral window.
///
/// `offset` is relative to the window base. Implementations must never fault
/// the caller: undecoded offsets are answered with a default and a diagnostic.
pub trait MmioHandler {
    fn read(&mut self, offset: u32, size: usize) -> u32;
    fn write(&mut self, offset: u32, size: usize, value: u32);
}

/// Errors mapping a region onto the [`SystemBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    /// A region has zero length.
    EmptyRegion { name: &'static str, start: u32 },
    /// A region extends past the top of the 32-bit address space.
    AddressOverflow {
        name: &'static str,
        start: u32,
        len: u64,
    },
    /// The new region intersects an already-mapped one.
    Overlap {
        name: &'static str,
        start: u32,
        end: u64,
        other: &'static str,
        other_start: u32,
        other_end: u64,
    },
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::EmptyRegion { name, start } => {
                write!(f, "region {name:?} at 0x{start:08x} is empty")
            }
            MapError::AddressOverflow { name, start, len } => write!(
                f,
                "region {name:?} at 0x{start:08x} len 0x{len:x} overflows the address space"
            ),
            MapError::Overlap {
                name,
                start,
                end,
                other,
                other_start,
                other_end,
            } => write!(
                f,
                "region {name:?} [0x{start:08x}, 0x{end:08x}) overlaps {other:?} [0x{other_start:08x}, 0x{other_end:08x})"
            ),
        }
    }
}

impl std::error::Error for MapError {}

enum Backing {
    Ram(DenseMemory),
    /// Read-only image. Alias mappings share the same `Arc`.
    Rom(Arc<[u8]>),
    Mmio(Box<dyn MmioHandler>),
}

/// What backs a mapped region; used for introspection and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Ram,
    Rom,
    Mmio,
}

struct Region {
    name: &'static str,
    start: u32,
    /// Exclusive end, kept as `u64` so a region may touch 0x1_0000_0000.
    end: u64,
    backing: Backing,
}

impl Region {
    fn contains(&self, addr: u32) -> bool {
        addr >= self.start && (addr as u64) < self.end
    }
}

/// Physical address router: RAM + ROM (with aliases) + peripheral MMIO.
///
/// Regions are kept sorted and validated to be pairwise disjoint at map time.
/// Addresses not covered by any region are served by the stub responder:
/// reads return 0, writes are discarded, and both are logged so firmware that
/// probes unmodeled hardware keeps running.
pub struct SystemBus {
    regions: Vec<Region>,
}

impl SystemBus {
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    pub fn map_ram(&mut self, name: &'static str, start: u32, ram: DenseMemory) -> Result<(), MapError> {
        let len = ram.size() as u64;
        self.insert(name, start, len, Backing::Ram(ram))
    }

    /// Maps a read-only image. Mapping the same `Arc` at two bases creates an
    /// alias: both windows decode to the same backing bytes.
    pub fn map_rom(&mut self, name: &'static str, start: u32, data: Arc<[u8]>) -> Result<(), MapError> {
        let len = data.len() as u64;
        self.insert(name, start, len, Backing::Rom(data))
    }

    pub fn map_mmio(
        &mut self,
        name: &'static str,
        start: u32,
        len: u32,
        handler: Box<dyn MmioHandler>,
    ) -> Result<(), MapError> {
        self.insert(name, start, len as u64, Backing::Mmio(handler))
    }

    fn insert(
        &mut self,
        name: &'static str,
        start: u32,
        len: u64,
        backing: Backing,
    ) -> Result<(), MapError> {
        if len == 0 {
            return Err(MapError::EmptyRegion { name, start });
        }
        let end = start as u64 + len;
        if end > u32::MAX as u64 + 1 {
            return Err(MapError::AddressOverflow { name, start, len });
        }

        let idx = self.regions.partition_point(|r| r.start < start);
        if let Some(prev) = idx.checked_sub(1).and_then(|i| self.regions.get(i)) {
            if (start as u64) < prev.end {
                return Err(MapError::Overlap {
                    name,
                    start,
                    end,
                    other: prev.name,
                    other_start: prev.start,
                    other_end: prev.end,
                });
            }
        }
        if let Some(next) = self.regions.get(idx) {
            if end > next.start as u64 {
                return Err(MapError::Overlap {
                    name,
                    start,
                    end,
                    other: next.name,
                    other_start: next.start,
                    other_end: next.end,
                });
            }
        }

        self.regions.insert(
            idx,
            Region {
                name,
                start,
                end,
                backing,
            },
        );
        Ok(())
    }

    /// Mapped windows as `(name, start, exclusive_end, kind)`, sorted by base.
    pub fn regions(&self) -> impl Iterator<Item = (&'static str, u32, u64, RegionKind)> + '_ {
        self.regions.iter().map(|r| {
            let kind = match r.backing {
                Backing::Ram(_) => RegionKind::Ram,
                Backing::Rom(_) => RegionKind::Rom,
                Backing::Mmio(_) => RegionKind::Mmio,
            };
            (r.name, r.start, r.end, kind)
        })
    }

    fn region_index(&self, addr: u32) -> Option<usize> {
        let idx = self.regions.partition_point(|r| r.start <= addr);
        let cand = idx.checked_sub(1)?;
        self.regions[cand].contains(addr).then_some(cand)
    }

    /// CPU-path access. `size` must be 1, 2 or 4 and the access must not cross
    /// a region boundary (peripheral windows are 4-byte aligned registers).
    pub fn read(&mut self, addr: u32, size: usize) -> u32 {
        debug_assert!(matches!(size, 1 | 2 | 4));

        let Some(idx) = self.region_index(addr) else {
            tracing::debug!(addr = format_args!("0x{addr:08x}"), size, "unassigned bus read");
            return 0;
        };
        let region = &mut self.regions[idx];
        if (addr as u64) + (size as u64) > region.end {
            tracing::debug!(
                addr = format_args!("0x{addr:08x}"),
                size,
                region = region.name,
                "bus read crosses region boundary"
            );
            return 0;
        }

        let offset = addr - region.start;
        match &mut region.backing {
            Backing::Ram(ram) => {
                let mut buf = [0u8; 4];
                // In range per the boundary check above.
                ram.read_into(offset, &mut buf[..size]).expect("checked range");
                u32::from_le_bytes(buf)
            }
            Backing::Rom(data) => {
                let mut buf = [0u8; 4];
                let start = offset as usize;
                buf[..size].copy_from_slice(&data[start..start + size]);
                u32::from_le_bytes(buf)
            }
            Backing::Mmio(handler) => handler.read(offset, size),
        }
    }

    pub fn write(&mut self, addr: u32, size: usize, value: u32) {
        debug_assert!(matches!(size, 1 | 2 | 4));

        let Some(idx) = self.region_index(addr) else {
            tracing::debug!(
                addr = format_args!("0x{addr:08x}"),
                size,
                value = format_args!("0x{value:08x}"),
                "unassigned bus write discarded"
            );
            return;
        };
        let region = &mut self.regions[idx];
        if (addr as u64) + (size as u64) > region.end {
            tracing::debug!(
                addr = format_args!("0x{addr:08x}"),
                size,
                region = region.name,
                "bus write crosses region boundary"
            );
            return;
        }

        let offset = addr - region.start;
        match &mut region.backing {
            Backing::Ram(ram) => {
                ram.write_from(offset, &value.to_le_bytes()[..size])
                    .expect("checked range");
            }
            Backing::Rom(_) => {
                tracing::debug!(
                    addr = format_args!("0x{addr:08x}"),
                    region = region.name,
                    "write to read-only region discarded"
                );
            }
            Backing::Mmio(handler) => handler.write(offset, size, value),
        }
    }

    /// Bulk access for loaders and RAM inspection. Spans RAM and ROM regions;
    /// MMIO windows and holes read as 0 and swallow writes.
    pub fn read_physical(&mut self, addr: u32, dst: &mut [u8]) {
        dst.fill(0);
        for (i, slot) in dst.iter_mut().enumerate() {
            let Some(a) = addr.checked_add(i as u32) else {
                break;
            };
            if let Some(idx) = self.region_index(a) {
                let region = &self.regions[idx];
                let offset = a - region.start;
                match &region.backing {
                    Backing::Ram(ram) => {
                        let mut b = [0u8; 1];
                        ram.read_into(offset, &mut b).expect("checked range");
                        *slot = b[0];
                    }
                    Backing::Rom(data) => *slot = data[offset as usize],
                    Backing::Mmio(_) => {}
                }
            }
        }
    }

    pub fn write_physical(&mut self, addr: u32, src: &[u8]) {
        for (i, byte) in src.iter().copied().enumerate() {
            let Some(a) = addr.checked_add(i as u32) else {
                break;
            };
            if let Some(idx) = self.region_index(a) {
                let region = &mut self.regions[idx];
                let offset = a - region.start;
                if let Backing::Ram(ram) = &mut region.backing {
                    ram.write_from(offset, &[byte]).expect("checked range");
                }
            }
        }
    }

    pub fn read_u32(&mut self, addr: u32) -> u32 {
        self.read(addr, 4)
    }

    pub fn write_u32(&mut self, addr: u32, value: u32) {
        self.write(addr, 4, value);
    }
}

impl Default for SystemBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Echo {
        last_write: Rc<Cell<(u32, u32)>>,
    }

    impl MmioHandler for Echo {
        fn read(&mut self, offset: u32, _size: usize) -> u32 {
            0xA000_0000 | offset
        }

        fn write(&mut self, offset: u32, _size: usize, value: u32) {
            self.last_write.set((offset, value));
        }
    }

    #[test]
    fn ram_rom_and_mmio_dispatch_by_address() {
        let mut bus = SystemBus::new();
        bus.map_ram("sram", 0x2000_0000, DenseMemory::new(0x1000).unwrap())
            .unwrap();

        let rom: Arc<[u8]> = vec![0x11u8, 0x22, 0x33, 0x44].into();
        bus.map_rom("flash", 0x0800_0000, rom).unwrap();

        let last_write = Rc::new(Cell::new((0, 0)));
        bus.map_mmio(
            "dev",
            0x4000_0000,
            0x400,
            Box::new(Echo {
                last_write: last_write.clone(),
            }),
        )
        .unwrap();

        bus.write_u32(0x2000_0010, 0xCAFE_F00D);
        assert_eq!(bus.read_u32(0x2000_0010), 0xCAFE_F00D);

        assert_eq!(bus.read_u32(0x0800_0000), 0x4433_2211);
        // ROM writes are discarded.
        bus.write_u32(0x0800_0000, 0xFFFF_FFFF);
        assert_eq!(bus.read_u32(0x0800_0000), 0x4433_2211);

        assert_eq!(bus.read_u32(0x4000_0014), 0xA000_0014);
        bus.write_u32(0x4000_0008, 7);
        assert_eq!(last_write.get(), (0x8, 7));
    }

    #[test]
    fn rom_alias_shares_backing_bytes() {
        let mut bus = SystemBus::new();
        let rom: Arc<[u8]> = vec![0xAAu8; 16].into();
        bus.map_rom("flash", 0x0800_0000, Arc::clone(&rom)).unwrap();
        bus.map_rom("flash.alias", 0x0000_0000, rom).unwrap();

        assert_eq!(bus.read_u32(0x0000_0004), bus.read_u32(0x0800_0004));
    }

    #[test]
    fn unassigned_addresses_read_zero_and_swallow_writes() {
        let mut bus = SystemBus::new();
        bus.map_ram("sram", 0x2000_0000, DenseMemory::new(0x100).unwrap())
            .unwrap();

        assert_eq!(bus.read_u32(0x6000_0000), 0);
        bus.write_u32(0x6000_0000, 0xDEAD_BEEF);
        assert_eq!(bus.read_u32(0x6000_0000), 0);
    }

    #[test]
    fn overlapping_regions_are_rejected() {
        let mut bus = SystemBus::new();
        bus.map_ram("a", 0x1000, DenseMemory::new(0x100).unwrap())
            .unwrap();

        let err = bus
            .map_ram("b", 0x10FF, DenseMemory::new(0x100).unwrap())
            .unwrap_err();
        assert!(matches!(err, MapError::Overlap { name: "b", .. }));

        // Adjacent regions are fine.
        bus.map_ram("c", 0x1100, DenseMemory::new(0x100).unwrap())
            .unwrap();

        // Overflow past the 32-bit space is rejected.
        let err = bus
            .map_ram("d", 0xFFFF_FF00, DenseMemory::new(0x200).unwrap())
            .unwrap_err();
        assert!(matches!(err, MapError::AddressOverflow { .. }));
    }

    #[test]
    fn bulk_access_spans_regions_and_skips_holes() {
        let mut bus = SystemBus::new();
        bus.map_ram("lo", 0x1000, DenseMemory::new(4).unwrap()).unwrap();
        bus.map_ram("hi", 0x1008, DenseMemory::new(4).unwrap()).unwrap();

        bus.write_physical(0x1000, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);

        let mut buf = [0xFFu8; 12];
        bus.read_physical(0x1000, &mut buf);
        assert_eq!(buf, [1, 2, 3, 4, 0, 0, 0, 0, 9, 10, 11, 12]);
    }
}
