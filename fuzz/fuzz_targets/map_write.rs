#![no_main]
use libfuzzer_sys::fuzz_target;
use memforge::{Address, LoadMonitor, MapLimits, MemoryMap, Perms, RegionStore};

// Drive the store directly with arbitrary spans, offsets and lengths.
fuzz_target!(|data: &[u8]| {
    let mut map = MemoryMap::with_limits(MapLimits {
        max_regions: 32,
        max_total_bytes: 1 << 18,
    });
    let monitor = LoadMonitor::new();
    let mut ids = Vec::new();

    for op in data.chunks_exact(9) {
        let start = Address::new(u32::from_le_bytes([op[1], op[2], op[3], op[4]]) as u64);
        let len = u16::from_le_bytes([op[5], op[6]]) as u64;
        let pick = op[7] as usize;
        let fill = op[8];
        match op[0] % 6 {
            0 => {
                if let Ok(id) = map.create_uninitialized("lazy", start, len, Perms::RW) {
                    ids.push(id);
                }
            }
            1 => {
                let payload = vec![fill; (len % 256) as usize];
                if let Ok(id) =
                    map.create_initialized("eager", start, &payload, Perms::RX, &monitor)
                {
                    ids.push(id);
                }
            }
            2 => {
                if let Some(&id) = ids.get(pick % ids.len().max(1)) {
                    let _ = map.convert_to_initialized(id, fill);
                }
            }
            3 => {
                if let Some(&id) = ids.get(pick % ids.len().max(1)) {
                    let payload = vec![fill; (len % 256) as usize];
                    let _ = map.write_bytes(id, start, &payload);
                }
            }
            4 => {
                if let Some(&id) = ids.get(pick % ids.len().max(1)) {
                    let _ = map.read_bytes(id, start, len);
                }
            }
            _ => {
                let _ = map.find_containing(start);
            }
        }
    }
});
