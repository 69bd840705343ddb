pub mod capture;
pub mod pot;
pub mod strain;

pub use capture::{CaptureChannel, CaptureOutcome, SpeedRpmEngine};
pub use pot::{PotController, PotError, WiperBus};
pub use strain::SampleSource;
