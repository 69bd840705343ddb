#![no_std]
#![no_main]

use defmt::{info, warn};
use embassy_executor::Spawner;
use {defmt_rtt as _, panic_probe as _};

use tcs_firmware::{
    drivers::pot::PotController,
    ipc,
    settings::{SettingsData, SettingsStore},
    tasks::{
        engine_capture, front_wheel_capture, rear_wheel_capture, sensor_task, serial_task,
        strain_task,
    },
    Board,
};

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("traction sensor module starting");
    let mut board = Board::init();

    let settings = match board.flash.load() {
        Ok(s) => s,
        Err(e) => {
            warn!("no stored settings ({:?}), using defaults", e);
            SettingsData::boot_default()
        }
    };
    ipc::replace_settings(settings);

    let pot = PotController::new(board.pot_bus, 0);

    spawner.spawn(sensor_task()).unwrap();
    spawner
        .spawn(front_wheel_capture(board.front_capture))
        .unwrap();
    spawner
        .spawn(rear_wheel_capture(board.rear_capture))
        .unwrap();
    spawner.spawn(engine_capture(board.engine_capture)).unwrap();
    spawner.spawn(strain_task(board.adc, pot)).unwrap();
    spawner
        .spawn(serial_task(board.serial_rx, board.serial_sink, board.flash))
        .unwrap();
    info!("all tasks spawned");

    core::future::pending::<()>().await;
}
