// pea: clock & watermarks (C1, §4.1)

use std::time::Instant;

/// Monotonic time source plus the idle/dump/memory watermark predicates.
/// Memory is sampled on demand only, never from a background task (§4.1).
pub struct Clock {
    last_active: Instant,
    last_dump: Instant,
    max_idle_time_secs: u64,
    dump_interval_secs: u64,
    memory_hwm_gb: f64,
    memory_probe: Box<dyn Fn() -> f64 + Send + Sync>,
}

impl Clock {
    pub fn new(max_idle_time_secs: u64, dump_interval_secs: u64, memory_hwm_gb: f64) -> Self {
        Self::with_memory_probe(
            max_idle_time_secs,
            dump_interval_secs,
            memory_hwm_gb,
            Box::new(default_used_memory_gb),
        )
    }

    pub fn with_memory_probe(
        max_idle_time_secs: u64,
        dump_interval_secs: u64,
        memory_hwm_gb: f64,
        memory_probe: Box<dyn Fn() -> f64 + Send + Sync>,
    ) -> Self {
        let now = Instant::now();
        Self {
            last_active: now,
            last_dump: now,
            max_idle_time_secs,
            dump_interval_secs,
            memory_hwm_gb,
            memory_probe,
        }
    }

    pub fn now(&self) -> Instant {
        Instant::now()
    }

    /// Sampled on demand, as §4.1 requires.
    pub fn used_memory_gb(&self) -> f64 {
        (self.memory_probe)()
    }

    pub fn mark_active(&mut self) {
        self.last_active = Instant::now();
    }

    pub fn mark_dumped(&mut self) {
        self.last_dump = Instant::now();
    }

    pub fn is_idle(&self) -> bool {
        self.last_active.elapsed().as_secs() > self.max_idle_time_secs
    }

    pub fn should_dump(&self) -> bool {
        self.dump_interval_secs > 0 && self.last_dump.elapsed().as_secs() > self.dump_interval_secs
    }

    /// `true` iff `memory_hwm_gb > 0` and the probe reports usage above it
    /// (§4.4 post-hook step 3; `memory_hwm = 0` disables the check).
    pub fn over_memory_watermark(&self) -> bool {
        self.memory_hwm_gb > 0.0 && self.used_memory_gb() > self.memory_hwm_gb
    }

    pub fn last_active_at(&self) -> Instant {
        self.last_active
    }
}

#[cfg(target_os = "linux")]
fn default_used_memory_gb() -> f64 {
    std::fs::read_to_string("/proc/self/statm")
        .ok()
        .and_then(|s| s.split_whitespace().nth(1).map(str::to_string))
        .and_then(|pages| pages.parse::<f64>().ok())
        .map(|pages| pages * 4096.0 / 1_073_741_824.0)
        .unwrap_or(0.0)
}

#[cfg(not(target_os = "linux"))]
fn default_used_memory_gb() -> f64 {
    0.0
}
