//! nusb-based USB transport implementation.

use std::io::{ErrorKind, Read, Write};
use std::sync::Mutex;
use std::time::Duration;

use nusb::io::{EndpointRead, EndpointWrite};
use nusb::transfer::{Bulk, ControlIn, ControlOut, ControlType, In, Out, Recipient};
use nusb::{Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument, trace};

use super::traits::{TransportError, UsbTransport};
use crate::protocol::constants::{
    BADGE_PRODUCT_ID, BADGE_VENDOR_ID, CONTROL_TIMEOUT_MS, DEFAULT_MAX_PACKET_SIZE,
    ESP32_INTERFACE,
};

/// Which badge to open and which interface to claim.
#[derive(Debug, Clone, Copy)]
pub struct DeviceSelector {
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface: u8,
    /// USB device address, for hosts with several badges attached.
    pub address: Option<u8>,
}

impl Default for DeviceSelector {
    fn default() -> Self {
        Self {
            vendor_id: BADGE_VENDOR_ID,
            product_id: BADGE_PRODUCT_ID,
            interface: ESP32_INTERFACE,
            address: None,
        }
    }
}

/// nusb-based USB transport.
pub struct NusbTransport {
    interface: Interface,
    interface_number: u8,
    reader: Mutex<EndpointRead<Bulk>>,
    writer: Mutex<EndpointWrite<Bulk>>,
    max_packet_size: usize,
}

impl NusbTransport {
    /// Open the first attached badge.
    pub fn open() -> Result<Self, TransportError> {
        Self::open_with(DeviceSelector::default())
    }

    /// Open a badge matching `selector`.
    #[instrument(level = "info", fields(vid = format!("{:04X}", selector.vendor_id), pid = format!("{:04X}", selector.product_id)))]
    pub fn open_with(selector: DeviceSelector) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| {
                d.vendor_id() == selector.vendor_id
                    && d.product_id() == selector.product_id
                    && selector.address.is_none_or(|a| d.device_address() == a)
            })
            .ok_or(TransportError::DeviceNotFound {
                vid: selector.vendor_id,
                pid: selector.product_id,
            })?;

        info!(
            address = device_info.device_address(),
            "Found badge"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        let interface_number = selector.interface;
        let interface = device
            .claim_interface(interface_number)
            .wait()
            .map_err(|e| TransportError::ClaimInterfaceFailed {
                interface: interface_number,
                message: e.to_string(),
            })?;

        // Find BULK endpoints of the bridge interface
        let mut in_endpoint: Option<(u8, usize)> = None;
        let mut out_endpoint: Option<u8> = None;

        for config in device.configurations() {
            for iface in config.interfaces() {
                if iface.interface_number() != interface_number {
                    continue;
                }
                for alt in iface.alt_settings() {
                    for ep in alt.endpoints() {
                        if ep.transfer_type() != nusb::descriptors::TransferType::Bulk {
                            continue;
                        }
                        if ep.direction() == nusb::transfer::Direction::In {
                            in_endpoint = Some((ep.address(), ep.max_packet_size()));
                        } else {
                            out_endpoint = Some(ep.address());
                        }
                    }
                }
            }
        }

        let (in_address, max_packet_size) =
            in_endpoint.ok_or_else(|| TransportError::EndpointNotFound {
                ep_type: "Bulk".into(),
                direction: "In".into(),
            })?;
        let out_address = out_endpoint.ok_or_else(|| TransportError::EndpointNotFound {
            ep_type: "Bulk".into(),
            direction: "Out".into(),
        })?;

        let reader = interface
            .endpoint::<Bulk, In>(in_address)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?
            .reader(4096);
        let writer = interface
            .endpoint::<Bulk, Out>(out_address)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?
            .writer(4096);

        info!(
            in_ep = %format!("0x{:02X}", in_address),
            out_ep = %format!("0x{:02X}", out_address),
            max_packet_size,
            "Badge opened successfully"
        );

        Ok(Self {
            interface,
            interface_number,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            max_packet_size: if max_packet_size == 0 {
                DEFAULT_MAX_PACKET_SIZE
            } else {
                max_packet_size
            },
        })
    }
}

impl UsbTransport for NusbTransport {
    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| TransportError::WriteFailed("writer lock poisoned".into()))?;

        writer
            .write_all(data)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        debug!(bytes_written = data.len(), "Write complete");
        Ok(data.len())
    }

    fn read(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let mut reader = self
            .reader
            .lock()
            .map_err(|_| TransportError::ReadFailed("reader lock poisoned".into()))?;
        reader.set_read_timeout(timeout);

        let mut buf = vec![0u8; max_len];
        let n = match reader.read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::TimedOut => {
                return Err(TransportError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            Err(e) => return Err(TransportError::ReadFailed(e.to_string())),
        };

        buf.truncate(n);
        trace!(bytes_read = n, "Read complete");
        Ok(buf)
    }

    #[instrument(skip(self), fields(request = %format!("0x{:02X}", request)))]
    fn control_out(&self, request: u8, value: u16) -> Result<(), TransportError> {
        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request,
                    value,
                    index: self.interface_number as u16,
                    data: &[],
                },
                Duration::from_millis(CONTROL_TIMEOUT_MS),
            )
            .wait()
            .map_err(|e| TransportError::ControlFailed {
                request,
                message: e.to_string(),
            })
    }

    #[instrument(skip(self), fields(request = %format!("0x{:02X}", request)))]
    fn control_in(&self, request: u8, value: u16) -> Result<u8, TransportError> {
        let data = self
            .interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request,
                    value,
                    index: self.interface_number as u16,
                    length: 1,
                },
                Duration::from_millis(CONTROL_TIMEOUT_MS),
            )
            .wait()
            .map_err(|e| TransportError::ControlFailed {
                request,
                message: e.to_string(),
            })?;

        data.first()
            .copied()
            .ok_or_else(|| TransportError::ControlFailed {
                request,
                message: "empty data stage".into(),
            })
    }

    fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }
}
