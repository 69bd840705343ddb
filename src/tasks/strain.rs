use embassy_executor::task;
use embassy_time::{Duration, Ticker};

use crate::board::{AdcWindow, I2cWiperBus};
use crate::config::{SAMPLE_WINDOW_LEN, STRAIN_PERIOD_MS};
use crate::drivers::pot::PotController;
use crate::drivers::strain::{gauge_average, is_shifting, SampleSource};
use crate::ipc::{self, SensorEvent, SENSOR_EVENTS};
use crate::{log_info, log_warn};

/// Samples the strain gauge every 100 ms and keeps the gain potentiometer
/// tracking the configured wiper value.
#[task]
pub async fn strain_task(mut adc: AdcWindow, mut pot: PotController<I2cWiperBus>) {
    log_info!("strain monitor up");
    let mut ticker = Ticker::every(Duration::from_millis(STRAIN_PERIOD_MS));
    let mut window = [0u16; SAMPLE_WINDOW_LEN];
    let mut shifting = None;

    loop {
        ticker.next().await;
        let settings = ipc::current_settings();

        // Re-applies after a save changes the setpoint, and retries a pot
        // that timed out on an earlier cycle.
        if pot.needs_apply(settings.wiper) {
            if let Err(e) = pot.apply_wiper(settings.wiper).await {
                log_warn!("gain pot unreachable: {:?}", e);
            }
        }

        adc.fill(&mut window).await;
        let now = is_shifting(gauge_average(&window), settings.sensor_threshold);
        if shifting != Some(now) {
            shifting = Some(now);
            SENSOR_EVENTS.send(SensorEvent::Shifting(now)).await;
        }
    }
}
