#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod drivers;
pub mod ipc;
pub mod logging;
pub mod protocol;
pub mod settings;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(feature = "stm32f072")]
pub mod board;
#[cfg(feature = "stm32f072")]
pub mod tasks;

pub use ipc::SensorSnapshot;
pub use settings::SettingsData;

#[cfg(feature = "stm32f072")]
pub use board::Board;
