use embassy_executor::task;
use embassy_stm32::peripherals::{TIM1, TIM2, TIM3};
use embassy_stm32::timer::input_capture::InputCapture;
use embassy_stm32::timer::Channel;
use portable_atomic::Ordering;

use crate::drivers::capture::SpeedRpmEngine;
use crate::ipc::{self, CaptureSource, SensorEvent, DROPPED_EVENTS, SENSOR_EVENTS};
use crate::{log_info, log_warn};

/// Sole consumer of the capture/shifting event queue and sole owner of the
/// published snapshot.
#[task]
pub async fn sensor_task() {
    log_info!("sensor task up");
    let mut engine = SpeedRpmEngine::new();
    let mut reported_drops = 0u32;

    loop {
        let event = SENSOR_EVENTS.receive().await;
        let settings = ipc::current_settings();
        if let Some(snapshot) = engine.apply(event, &settings) {
            ipc::publish_sensors(&snapshot);
        }

        let drops = DROPPED_EVENTS.load(Ordering::Relaxed);
        if drops != reported_drops {
            log_warn!("capture queue overflow, {} events dropped", drops);
            reported_drops = drops;
        }
    }
}

fn offer(source: CaptureSource, count: u16) {
    if SENSOR_EVENTS
        .try_send(SensorEvent::Capture { source, count })
        .is_err()
    {
        DROPPED_EVENTS.fetch_add(1, Ordering::Relaxed);
    }
}

#[task]
pub async fn front_wheel_capture(mut ic: InputCapture<'static, TIM2>) {
    loop {
        ic.wait_for_rising_edge(Channel::Ch1).await;
        offer(CaptureSource::FrontWheel, ic.get_capture_value(Channel::Ch1) as u16);
    }
}

#[task]
pub async fn rear_wheel_capture(mut ic: InputCapture<'static, TIM3>) {
    loop {
        ic.wait_for_rising_edge(Channel::Ch1).await;
        offer(CaptureSource::RearWheel, ic.get_capture_value(Channel::Ch1) as u16);
    }
}

#[task]
pub async fn engine_capture(mut ic: InputCapture<'static, TIM1>) {
    loop {
        ic.wait_for_rising_edge(Channel::Ch1).await;
        offer(CaptureSource::Engine, ic.get_capture_value(Channel::Ch1) as u16);
    }
}
