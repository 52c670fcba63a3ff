use super::governor::Governor;
use crate::config::AutoConfig;
use crate::metrics::RunMetrics;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{CpuExt, System, SystemExt};
use tokio::time::sleep;

/// One CPU/memory reading, both as percentages.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSample {
    pub cpu_percent: f32,
    pub mem_percent: f32,
}

/// Source of resource readings, injectable for tests.
pub trait ResourceProbe: Send {
    fn sample(&mut self) -> ResourceSample;
}

pub struct SysinfoProbe {
    system: System,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SysinfoProbe {
    fn sample(&mut self) -> ResourceSample {
        self.system.refresh_cpu();
        self.system.refresh_memory();
        let total = self.system.total_memory().max(1);
        ResourceSample {
            cpu_percent: self.system.global_cpu_info().cpu_usage(),
            mem_percent: self.system.used_memory() as f32 / total as f32 * 100.0,
        }
    }
}

/// If the recent failure rate exceeds the threshold, the limit the governor
/// should drop to: half the current limit, floored at the minimum bound.
fn throttle_target(config: &AutoConfig, limit: usize, recent_failures: usize) -> Option<usize> {
    let capacity = (limit as u64 * config.ops_per_worker_minute as u64).max(1);
    let failure_rate = recent_failures as f64 / capacity as f64;
    if failure_rate > config.failure_rate_threshold {
        Some((limit / 2).max(config.min_concurrency))
    } else {
        None
    }
}

/// Resource-pressure nudge: one step down when CPU or memory is hot, one
/// step up when both are comfortably cold.
fn resource_target(config: &AutoConfig, limit: usize, sample: ResourceSample) -> Option<usize> {
    let hot =
        sample.cpu_percent > config.cpu_upper_threshold || sample.mem_percent > config.mem_upper_threshold;
    let cold =
        sample.cpu_percent < config.cpu_lower_threshold && sample.mem_percent < config.mem_upper_threshold;

    if hot && limit > config.min_concurrency {
        Some(limit - 1)
    } else if cold && limit < config.max_concurrency {
        Some(limit + 1)
    } else {
        None
    }
}

/// Background control loop that adapts the governor's limit to the observed
/// failure rate and to host resource pressure.
///
/// The failure branch is checked first and dominates: remote throttling is
/// far more damaging than local load, so it cuts the limit in half and then
/// pauses for twice the cooldown before looking again. The resource branch
/// only nudges by one step per tick.
pub struct AutoTuner {
    config: AutoConfig,
    governor: Arc<Governor>,
    metrics: Arc<RunMetrics>,
}

impl AutoTuner {
    pub fn new(config: AutoConfig, governor: Arc<Governor>, metrics: Arc<RunMetrics>) -> Self {
        Self {
            config,
            governor,
            metrics,
        }
    }

    /// Run until the orchestrator cancels the task.
    pub async fn run(self) {
        if !self.config.enabled {
            return;
        }
        log::info!(
            "Auto-concurrency enabled with range {}-{}",
            self.config.min_concurrency,
            self.config.max_concurrency
        );
        let mut probe = SysinfoProbe::new();
        loop {
            let pause = self.tick(&mut probe).await;
            sleep(pause).await;
        }
    }

    /// One controller tick. Returns how long to sleep before the next one.
    async fn tick(&self, probe: &mut dyn ResourceProbe) -> Duration {
        let check_interval = Duration::from_secs(self.config.check_interval_seconds);
        let cooldown = Duration::from_secs(self.config.cooldown_seconds);

        let recent_failures = self.metrics.recent_failures().await;
        let limit = self.governor.limit().await;
        let cooled = self.governor.elapsed_since_change().await >= cooldown;

        if let Some(target) = throttle_target(&self.config, limit, recent_failures) {
            if cooled {
                let applied = self.governor.set_limit(target).await;
                log::warn!(
                    "Auto-concurrency: THROTTLING DOWN to {} after {} recent failures",
                    applied,
                    recent_failures
                );
                // Extra-long pause so the remote side can recover before we
                // judge the failure rate again.
                return cooldown * 2;
            }
        } else if cooled {
            let sample = probe.sample();
            if let Some(target) = resource_target(&self.config, limit, sample) {
                let applied = self.governor.set_limit(target).await;
                if applied > limit {
                    log::info!(
                        "Auto-concurrency: increased to {} (CPU {:.1}%, MEM {:.1}%)",
                        applied,
                        sample.cpu_percent,
                        sample.mem_percent
                    );
                } else {
                    log::info!(
                        "Auto-concurrency: decreased to {} (CPU {:.1}%, MEM {:.1}%)",
                        applied,
                        sample.cpu_percent,
                        sample.mem_percent
                    );
                }
            }
        }

        check_interval
    }
}
