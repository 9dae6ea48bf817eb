//! Vendor control transfers: boot mode switching and resets.
//!
//! These go to the RP2040 co-processor, which owns the ESP32's reset line and
//! the UART bridging it to USB. They are out-of-band and never framed.

use std::fmt;

use tracing::{debug, info};

use crate::protocol::constants::*;
use crate::transport::{TransportError, UsbTransport};

/// ESP32 boot mode selected through `REQUEST_MODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMode {
    Normal,
    WebUsbLegacy,
    FpgaDownload,
    WebUsb,
    Unknown(u8),
}

impl BootMode {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0x00 => BootMode::Normal,
            0x01 => BootMode::WebUsbLegacy,
            0x02 => BootMode::FpgaDownload,
            0x03 => BootMode::WebUsb,
            other => BootMode::Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            BootMode::Normal => 0x00,
            BootMode::WebUsbLegacy => 0x01,
            BootMode::FpgaDownload => 0x02,
            BootMode::WebUsb => 0x03,
            BootMode::Unknown(v) => v,
        }
    }
}

impl fmt::Display for BootMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootMode::Normal => write!(f, "normal"),
            BootMode::WebUsbLegacy => write!(f, "webusb-legacy"),
            BootMode::FpgaDownload => write!(f, "fpga-download"),
            BootMode::WebUsb => write!(f, "webusb"),
            BootMode::Unknown(v) => write!(f, "unknown(0x{:02X})", v),
        }
    }
}

/// Typed wrapper over the control half of a transport.
pub struct Control<'a, T: UsbTransport> {
    transport: &'a T,
}

impl<'a, T: UsbTransport> Control<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    pub fn set_connected(&self, connected: bool) -> Result<(), TransportError> {
        let value = if connected {
            STATE_CONNECT
        } else {
            STATE_DISCONNECT
        };
        self.transport.control_out(REQUEST_STATE, value)
    }

    pub fn boot_mode(&self) -> Result<BootMode, TransportError> {
        Ok(BootMode::from_u8(
            self.transport.control_in(REQUEST_MODE_GET, 0)?,
        ))
    }

    pub fn set_boot_mode(&self, mode: BootMode) -> Result<(), TransportError> {
        self.transport
            .control_out(REQUEST_MODE, mode.as_u8() as u16)
    }

    pub fn reset_esp32(&self) -> Result<(), TransportError> {
        self.transport.control_out(REQUEST_RESET, 0)
    }

    /// `baud` is in units of 100 baud.
    pub fn set_baudrate(&self, baud: u16) -> Result<(), TransportError> {
        self.transport.control_out(REQUEST_BAUDRATE, baud)
    }

    pub fn firmware_version(&self) -> Result<u8, TransportError> {
        self.transport.control_in(REQUEST_FW_VERSION_GET, 0)
    }

    /// Bring the bridge up and, unless already there, reboot the ESP32 into
    /// WebUSB mode. Returns true when a mode switch was issued.
    pub fn start_webusb(&self) -> Result<bool, TransportError> {
        self.set_connected(true)?;
        let current = self.boot_mode()?;
        debug!(mode = %current, "Current boot mode");

        if current == BootMode::WebUsb {
            return Ok(false);
        }

        info!(from = %current, "Switching badge into WebUSB mode");
        self.set_boot_mode(BootMode::WebUsb)?;
        self.reset_esp32()?;
        self.set_baudrate(BAUDRATE_WEBUSB)?;
        Ok(true)
    }

    /// Drop the bridge and reboot the ESP32 into its normal firmware.
    pub fn reset_to_normal(&self) -> Result<(), TransportError> {
        info!("Resetting badge into normal mode");
        self.set_connected(false)?;
        self.set_boot_mode(BootMode::Normal)?;
        self.reset_esp32()?;
        self.set_baudrate(BAUDRATE_NORMAL)
    }
}
