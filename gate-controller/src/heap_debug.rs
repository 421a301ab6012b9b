//! Heap statistics for diagnosing allocation failures.
//!
//! Every HTTP exchange and credential document lives on the heap, so the
//! firmware logs a snapshot at boot, after connecting and before a restart,
//! and warns when a request is about to run short.

use core::fmt;

#[derive(Clone, Copy)]
pub struct HeapStats {
    pub used: usize,
    pub free: usize,
}

impl HeapStats {
    pub fn now() -> Self {
        Self {
            used: esp_alloc::HEAP.used(),
            free: esp_alloc::HEAP.free(),
        }
    }

    pub fn free_kb(&self) -> usize {
        self.free / 1024
    }
}

impl fmt::Display for HeapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "used={}KB free={}KB (total={}KB)",
            self.used / 1024,
            self.free / 1024,
            (self.used + self.free) / 1024
        )
    }
}

pub fn log_heap_stats(context: &str) {
    log::info!("heap[{}]: {}", context, HeapStats::now());
}

/// Warn when free heap is under `threshold_kb`.
pub fn warn_if_low(threshold_kb: usize, context: &str) {
    let stats = HeapStats::now();
    if stats.free_kb() < threshold_kb {
        log::warn!("heap[{}]: LOW MEMORY {} (threshold={}KB)", context, stats, threshold_kb);
    }
}
