//! Transport layer module.

pub mod mock;
pub mod nusb;
pub mod traits;

pub use mock::{ControlCall, MockTransport};
pub use nusb::{DeviceSelector, NusbTransport};
pub use traits::{TransportError, UsbTransport};
