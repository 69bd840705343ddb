//! Capture timing engine: per-channel two-phase samplers and the speed /
//! RPM / slip computation fed by them.
//!
//! The hardware side is nothing more than "a capture timer latches its
//! counter on a pulse edge and raises an event"; everything here is a pure
//! state transition `(phase, counter) -> (phase, outcome)` so the period
//! math runs off-target under test.

use crate::config::{PCLK_HZ, RPM_PULSES_PER_REV, RPM_TIMER_PSC, SPEED_TIMER_PSC};
use crate::ipc::{CaptureSource, SensorEvent, SensorSnapshot};
use crate::settings::SettingsData;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Phase {
    FirstSample,
    SecondSample,
}

/// Result of feeding one capture event into a channel.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "stm32f072", derive(defmt::Format))]
pub enum CaptureOutcome {
    /// First sample stored; waiting for the closing edge.
    Armed,
    /// Completed period measurement in timer ticks.
    Period(u32),
    /// Spurious double trigger (zero-tick period); sample dropped, prior
    /// frequency stands.
    Discarded,
}

/// Two-phase sampler over a free-running 16-bit capture counter.
#[derive(Clone, Copy, Debug)]
pub struct CaptureChannel {
    last_count: u16,
    phase: Phase,
}

impl CaptureChannel {
    pub const fn new() -> Self {
        Self {
            last_count: 0,
            phase: Phase::FirstSample,
        }
    }

    /// Feed one latched counter value. Returns to `FirstSample` after every
    /// completed (or discarded) measurement.
    pub fn capture(&mut self, count: u16) -> CaptureOutcome {
        match self.phase {
            Phase::FirstSample => {
                self.last_count = count;
                self.phase = Phase::SecondSample;
                CaptureOutcome::Armed
            }
            Phase::SecondSample => {
                let first = u32::from(self.last_count);
                let second = u32::from(count);
                // Counter wraps at 0xFFFF between the two edges at most once
                // at the speeds this module sees.
                let delta = if second >= first {
                    second - first
                } else {
                    (second + 0x1_0000) - first
                };
                self.last_count = count;
                self.phase = Phase::FirstSample;
                if delta == 0 {
                    CaptureOutcome::Discarded
                } else {
                    CaptureOutcome::Period(delta)
                }
            }
        }
    }
}

impl Default for CaptureChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Period ticks to frequency in Hz. `delta` must be non-zero.
pub fn ticks_to_hz(clock_hz: u32, prescaler: u32, delta: u32) -> u32 {
    (clock_hz / prescaler) / delta
}

/// Diagnostics counters, in the spirit of a parser's stats block.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct EngineStats {
    /// Completed period measurements.
    pub periods: u32,
    /// Zero-tick samples discarded.
    pub discarded: u32,
}

/// Consumes capture and shifting events, maintains per-channel frequencies
/// and derives the published snapshot.
pub struct SpeedRpmEngine {
    front: CaptureChannel,
    rear: CaptureChannel,
    engine: CaptureChannel,
    front_hz: u32,
    rear_hz: u32,
    rpm: u32,
    shifting: bool,
    stats: EngineStats,
}

impl SpeedRpmEngine {
    pub const fn new() -> Self {
        Self {
            front: CaptureChannel::new(),
            rear: CaptureChannel::new(),
            engine: CaptureChannel::new(),
            front_hz: 0,
            rear_hz: 0,
            rpm: 0,
            shifting: false,
            stats: EngineStats {
                periods: 0,
                discarded: 0,
            },
        }
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Apply one event. Returns a snapshot whenever the event changed the
    /// published values (a completed period or a shifting update); arming
    /// edges and discarded samples produce nothing.
    pub fn apply(&mut self, event: SensorEvent, settings: &SettingsData) -> Option<SensorSnapshot> {
        match event {
            SensorEvent::Capture { source, count } => {
                let channel = match source {
                    CaptureSource::FrontWheel => &mut self.front,
                    CaptureSource::RearWheel => &mut self.rear,
                    CaptureSource::Engine => &mut self.engine,
                };
                match channel.capture(count) {
                    CaptureOutcome::Armed => None,
                    CaptureOutcome::Discarded => {
                        self.stats.discarded = self.stats.discarded.wrapping_add(1);
                        None
                    }
                    CaptureOutcome::Period(delta) => {
                        self.stats.periods = self.stats.periods.wrapping_add(1);
                        match source {
                            CaptureSource::FrontWheel => {
                                self.front_hz = ticks_to_hz(PCLK_HZ, SPEED_TIMER_PSC, delta)
                            }
                            CaptureSource::RearWheel => {
                                self.rear_hz = ticks_to_hz(PCLK_HZ, SPEED_TIMER_PSC, delta)
                            }
                            CaptureSource::Engine => {
                                self.rpm =
                                    (PCLK_HZ / RPM_TIMER_PSC) / (delta * RPM_PULSES_PER_REV)
                            }
                        }
                        Some(self.snapshot(settings))
                    }
                }
            }
            SensorEvent::Shifting(on) => {
                self.shifting = on;
                Some(self.snapshot(settings))
            }
        }
    }

    fn snapshot(&self, settings: &SettingsData) -> SensorSnapshot {
        // Fastest wheel speed in Hertz.
        let speed_hz = self.front_hz.max(self.rear_hz);
        SensorSnapshot {
            shifting: self.shifting as u8,
            _pad: [0; 3],
            speed_hz,
            rpm: self.rpm,
            slip_pct: slip_pct(self.front_hz, self.rear_hz, speed_hz, self.rpm, settings),
        }
    }
}

impl Default for SpeedRpmEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Rear-vs-front slip percentage, truncating toward zero. Not clamped: the
/// host expects negative values and values past 100 verbatim. Forced to zero
/// at or below the configured speed/RPM floor, and while the reference wheel
/// has no measurement yet.
pub fn slip_pct(
    front_hz: u32,
    rear_hz: u32,
    speed_hz: u32,
    rpm: u32,
    settings: &SettingsData,
) -> i32 {
    if speed_hz <= settings.min_speed || rpm <= settings.min_rpm {
        return 0;
    }
    if front_hz == 0 {
        return 0;
    }
    ((rear_hz as i32 - front_hz as i32) * 100) / front_hz as i32
}
