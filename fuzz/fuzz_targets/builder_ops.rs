#![no_main]
use libfuzzer_sys::fuzz_target;
use memforge::{
    AddressSpace, LoadMonitor, MapLimits, MemoryMap, Perms, RegionBuilder, SliceSource,
};

// Treat the front half of the input as an image and the back half as an op
// stream driving one load session. Nothing here may panic.
fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }
    let (image, mut ops) = data.split_at(data.len() / 2);
    let src = SliceSource::from(image);
    let mut map = MemoryMap::with_limits(MapLimits {
        max_regions: 64,
        max_total_bytes: 1 << 20,
    });
    let space = match AddressSpace::new("fuzz", 32) {
        Ok(space) => space,
        Err(_) => return,
    };
    let mut builder = RegionBuilder::new(&mut map, &src, space, 0x1000, LoadMonitor::new());

    while ops.len() >= 6 {
        let (head, rest) = ops.split_at(6);
        ops = rest;
        let offset = u16::from_le_bytes([head[1], head[2]]) as u64;
        let size = u16::from_le_bytes([head[3], head[4]]) as u64;
        let payload = vec![head[5]; (size % 512) as usize];
        match head[0] % 5 {
            0 => {
                let _ = builder.create_uninitialized("scratch", offset, size, Perms::RW);
            }
            1 => {
                let _ = builder.create_deferred("table", offset, size, Perms::R);
            }
            2 => {
                let _ = builder.create_initialized("blob", offset, &payload, Perms::RX);
            }
            3 => {
                let _ = builder.merge("patch", offset, &payload);
            }
            _ => {
                let _ = builder.finalize_all();
            }
        }
    }
    let _ = builder.finalize_all();
});
