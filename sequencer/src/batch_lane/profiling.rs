// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug)]
pub(super) struct BatchLaneMetrics {
    enabled: bool,
    log_interval: Duration,
    window_started_at: Instant,
    loops: u64,
    handled_inputs: u64,
    sealed_by_size: u64,
    sealed_by_timer: u64,
    sealed_by_trigger: u64,
    idle_sleeps: u64,
    queue_phase: Duration,
    seal_phase: Duration,
    idle_sleep: Duration,
}

impl BatchLaneMetrics {
    pub(super) fn new(enabled: bool, log_interval: Duration) -> Self {
        Self {
            enabled,
            log_interval,
            window_started_at: Instant::now(),
            loops: 0,
            handled_inputs: 0,
            sealed_by_size: 0,
            sealed_by_timer: 0,
            sealed_by_trigger: 0,
            idle_sleeps: 0,
            queue_phase: Duration::ZERO,
            seal_phase: Duration::ZERO,
            idle_sleep: Duration::ZERO,
        }
    }

    pub(super) fn phase_started_at(&self) -> Option<Instant> {
        self.enabled.then(Instant::now)
    }

    pub(super) fn on_loop_start(&mut self) {
        if !self.enabled {
            return;
        }
        self.loops = self.loops.saturating_add(1);
    }

    pub(super) fn on_queue_phase_end(&mut self, started_at: Option<Instant>, handled: u64) {
        if !self.enabled {
            return;
        }
        self.handled_inputs = self.handled_inputs.saturating_add(handled);
        self.queue_phase = self.queue_phase.saturating_add(elapsed_or_zero(started_at));
    }

    pub(super) fn on_sealed(&mut self, trigger: &str) {
        if !self.enabled {
            return;
        }
        match trigger {
            "size" => self.sealed_by_size = self.sealed_by_size.saturating_add(1),
            "timer" => self.sealed_by_timer = self.sealed_by_timer.saturating_add(1),
            _ => self.sealed_by_trigger = self.sealed_by_trigger.saturating_add(1),
        }
    }

    pub(super) fn on_seal_phase_end(&mut self, started_at: Option<Instant>) {
        if !self.enabled {
            return;
        }
        self.seal_phase = self.seal_phase.saturating_add(elapsed_or_zero(started_at));
    }

    pub(super) fn on_idle_sleep_end(&mut self, started_at: Option<Instant>) {
        if !self.enabled {
            return;
        }
        self.idle_sleeps = self.idle_sleeps.saturating_add(1);
        self.idle_sleep = self.idle_sleep.saturating_add(elapsed_or_zero(started_at));
    }

    pub(super) fn maybe_log_window(&mut self) {
        if !self.enabled {
            return;
        }
        let elapsed = self.window_started_at.elapsed();
        if elapsed < self.log_interval {
            return;
        }
        self.log_window(elapsed, false);
        self.reset_window();
    }

    pub(super) fn log_final(&mut self) {
        if !self.enabled {
            return;
        }
        let elapsed = self.window_started_at.elapsed();
        if elapsed.is_zero() && self.loops == 0 {
            return;
        }
        self.log_window(elapsed, true);
    }

    fn log_window(&self, elapsed: Duration, final_window: bool) {
        let elapsed_secs = elapsed.as_secs_f64();
        let sealed_total = self
            .sealed_by_size
            .saturating_add(self.sealed_by_timer)
            .saturating_add(self.sealed_by_trigger);
        let sealed_per_sec = if elapsed_secs > 0.0 {
            sealed_total as f64 / elapsed_secs
        } else {
            0.0
        };
        let queue_share_pct = percentage(self.queue_phase.as_nanos(), elapsed.as_nanos());
        let seal_share_pct = percentage(self.seal_phase.as_nanos(), elapsed.as_nanos());
        let idle_share_pct = percentage(self.idle_sleep.as_nanos(), elapsed.as_nanos());
        info!(
            final_window,
            window_ms = elapsed.as_millis() as u64,
            loops = self.loops,
            handled_inputs = self.handled_inputs,
            sealed_by_size = self.sealed_by_size,
            sealed_by_timer = self.sealed_by_timer,
            sealed_by_trigger = self.sealed_by_trigger,
            sealed_per_sec = sealed_per_sec,
            idle_sleeps = self.idle_sleeps,
            queue_phase_ms = self.queue_phase.as_millis() as u64,
            seal_phase_ms = self.seal_phase.as_millis() as u64,
            idle_sleep_ms = self.idle_sleep.as_millis() as u64,
            queue_share_pct = queue_share_pct,
            seal_share_pct = seal_share_pct,
            idle_share_pct = idle_share_pct,
            "batch lane metrics"
        );
    }

    fn reset_window(&mut self) {
        self.window_started_at = Instant::now();
        self.loops = 0;
        self.handled_inputs = 0;
        self.sealed_by_size = 0;
        self.sealed_by_timer = 0;
        self.sealed_by_trigger = 0;
        self.idle_sleeps = 0;
        self.queue_phase = Duration::ZERO;
        self.seal_phase = Duration::ZERO;
        self.idle_sleep = Duration::ZERO;
    }
}

fn elapsed_or_zero(started_at: Option<Instant>) -> Duration {
    started_at.map_or(Duration::ZERO, |value| value.elapsed())
}

fn percentage(part: u128, total: u128) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64) * 100.0 / (total as f64)
}
