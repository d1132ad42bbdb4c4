use honggfuzz::fuzz;
use memtrace::{Cache, MemoryAccess};

fn main() {
    let mut cache = Cache::new(4096, 64, 4).expect("valid geometry");
    loop {
        fuzz!(|data: &[u8]| {
            if let Ok(text) = std::str::from_utf8(data) {
                let _ = text.parse::<memtrace::LogRecord>();
                if let Ok(MemoryAccess::Regular(mem)) = text.parse::<MemoryAccess>() {
                    cache.access(mem.address);
                }
            }
        });
    }
}
