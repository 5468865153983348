//! Bulk USB transport implementation (libusb)

use std::time::Duration;

use rusb::{DeviceHandle, Direction, GlobalContext};
use tracing::{debug, warn};
use zerocopy::IntoBytes;

use crate::error::TransportError;
use crate::protocol::{device, timing, PacketHeader, BULK_READ_BYTES, HEADER_BYTES};
use crate::types::{DiscoveredDevice, TransportKind};
use crate::StenoTransport;

/// Open device with claimed interface and resolved endpoints
struct BulkLink {
    handle: DeviceHandle<GlobalContext>,
    interface: u8,
    endpoint_in: u8,
    endpoint_out: u8,
}

impl Drop for BulkLink {
    fn drop(&mut self) {
        // Best-effort: the device may already be gone
        let _ = self.handle.release_interface(self.interface);
    }
}

/// Bulk transport for writers reachable through libusb
///
/// Finds the first device with the Stenograph vendor ID and talks to it
/// through the bulk IN/OUT endpoints of its first interface.
pub struct BulkUsbTransport {
    vendor_id: u16,
    link: Option<BulkLink>,
}

impl Default for BulkUsbTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl BulkUsbTransport {
    /// Create an unconnected transport for the Stenograph vendor ID
    pub fn new() -> Self {
        Self::with_vendor_id(device::VENDOR_ID)
    }

    /// Create an unconnected transport matching a different vendor ID
    pub fn with_vendor_id(vendor_id: u16) -> Self {
        Self {
            vendor_id,
            link: None,
        }
    }

    /// List matching devices without opening them
    pub fn list(vendor_id: u16) -> Result<Vec<DiscoveredDevice>, TransportError> {
        let devices = usb_devices()?;
        Ok(devices
            .iter()
            .filter_map(|dev| {
                let desc = dev.device_descriptor().ok()?;
                (desc.vendor_id() == vendor_id).then(|| DiscoveredDevice {
                    kind: TransportKind::Bulk,
                    path: format!("bus {:03} addr {:03}", dev.bus_number(), dev.address()),
                    pid: Some(desc.product_id()),
                })
            })
            .collect())
    }

    fn open(&self) -> Result<BulkLink, TransportError> {
        let devices = usb_devices()?;
        let dev = devices
            .iter()
            .find(|dev| {
                dev.device_descriptor()
                    .map(|desc| desc.vendor_id() == self.vendor_id)
                    .unwrap_or(false)
            })
            .ok_or_else(|| {
                TransportError::DeviceNotFound(format!("no USB device with vendor {:04x}", self.vendor_id))
            })?;

        let handle = dev.open()?;
        // Not supported on every platform; claiming still works without it
        let _ = handle.set_auto_detach_kernel_driver(true);

        let config = match dev.active_config_descriptor() {
            Ok(config) => config,
            Err(_) => dev.config_descriptor(0)?,
        };
        if handle.active_configuration().ok() != Some(config.number()) {
            handle.set_active_configuration(config.number())?;
        }

        let alt = config
            .interfaces()
            .next()
            .and_then(|iface| iface.descriptors().next())
            .ok_or_else(|| TransportError::InvalidPacket("device has no interfaces".into()))?;

        let mut endpoint_in = None;
        let mut endpoint_out = None;
        for ep in alt.endpoint_descriptors() {
            match ep.direction() {
                Direction::In => {
                    endpoint_in.get_or_insert(ep.address());
                }
                Direction::Out => {
                    endpoint_out.get_or_insert(ep.address());
                }
            }
        }
        let (Some(endpoint_in), Some(endpoint_out)) = (endpoint_in, endpoint_out) else {
            return Err(TransportError::InvalidPacket(
                "interface lacks bulk IN/OUT endpoints".into(),
            ));
        };

        let interface = alt.interface_number();
        handle.claim_interface(interface)?;
        debug!(
            "Opened writer bus {:03} addr {:03}: interface {}, IN 0x{:02X}, OUT 0x{:02X}",
            dev.bus_number(),
            dev.address(),
            interface,
            endpoint_in,
            endpoint_out
        );

        Ok(BulkLink {
            handle,
            interface,
            endpoint_in,
            endpoint_out,
        })
    }

    /// Drop the link after the device reported removal
    fn removed(&mut self) -> TransportError {
        self.link = None;
        TransportError::Disconnected
    }
}

fn usb_devices() -> Result<rusb::DeviceList<GlobalContext>, TransportError> {
    rusb::devices().map_err(|e| {
        warn!("libusb must be installed to interface with Stenograph machines ({e})");
        TransportError::from(e)
    })
}

impl StenoTransport for BulkUsbTransport {
    fn connect(&mut self) -> bool {
        self.link = None;
        match self.open() {
            Ok(link) => {
                self.link = Some(link);
                true
            }
            Err(e) => {
                debug!("Bulk connect failed: {}", e);
                false
            }
        }
    }

    fn disconnect(&mut self) {
        self.link = None;
    }

    fn send_request(&mut self, header: &PacketHeader) -> Result<usize, TransportError> {
        let Some(link) = &self.link else {
            return Ok(0);
        };
        let timeout = Duration::from_millis(timing::WRITE_TIMEOUT_MS);
        match link.handle.write_bulk(link.endpoint_out, header.as_bytes(), timeout) {
            Ok(n) => Ok(n),
            Err(rusb::Error::NoDevice) => Err(self.removed()),
            Err(e) => Err(e.into()),
        }
    }

    fn receive_response(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let Some(link) = &self.link else {
            return Err(TransportError::NotConnected);
        };
        let mut buf = [0u8; BULK_READ_BYTES];
        match link.handle.read_bulk(link.endpoint_in, &mut buf, timeout) {
            Ok(n) if n >= HEADER_BYTES => Ok(Some(buf[..n].to_vec())),
            Ok(n) => {
                debug!("Short bulk read ({} bytes), ignoring", n);
                Ok(None)
            }
            Err(rusb::Error::Timeout) => Ok(None),
            Err(rusb::Error::NoDevice) => Err(self.removed()),
            Err(e) => Err(e.into()),
        }
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Bulk
    }
}
