//! Strain-gauge shift detector.
//!
//! Every sampling period the ADC fills a 20-entry window; the gauge sits on
//! every fourth conversion slot, so the detector averages those taps and
//! compares against the configured threshold.

use crate::config::{GAUGE_STRIDE, GAUGE_TAPS, SAMPLE_WINDOW_LEN};

/// Fills one conversion window per call. Implemented by the on-target ADC
/// sequencer and by a canned buffer in tests.
#[allow(async_fn_in_trait)]
pub trait SampleSource {
    async fn fill(&mut self, window: &mut [u16; SAMPLE_WINDOW_LEN]);
}

/// Integer mean of the gauge taps (slots 0, 4, 8, 12, 16), truncating.
pub fn gauge_average(window: &[u16; SAMPLE_WINDOW_LEN]) -> u32 {
    let mut sum: u32 = 0;
    let mut i = 0;
    while i < SAMPLE_WINDOW_LEN {
        sum += u32::from(window[i]);
        i += GAUGE_STRIDE;
    }
    sum / GAUGE_TAPS as u32
}

/// Level detector, no hysteresis: the threshold itself reads as shifting.
pub fn is_shifting(average: u32, threshold: u32) -> bool {
    average >= threshold
}
