pub mod driver;
pub mod protocol;

pub use driver::{PotController, PotError, WiperBus};
