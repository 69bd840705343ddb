pub mod sensors;
pub mod serial;
pub mod strain;

pub use sensors::{engine_capture, front_wheel_capture, rear_wheel_capture, sensor_task};
pub use serial::serial_task;
pub use strain::strain_task;
