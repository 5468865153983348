//! Raw handle transport for the Stenograph Windows writer driver
//!
//! The vendor driver exposes the writer as a device interface. We locate it
//! through SetupAPI by interface class, open a file handle on its path and
//! exchange packets with plain WriteFile/ReadFile calls. The handle is opened
//! for overlapped I/O only so each call can be bounded by a timeout; from the
//! caller's point of view every operation is still synchronous.

use std::mem;
use std::ptr;
use std::time::Duration;

use tracing::debug;
use windows_sys::core::GUID;
use windows_sys::Win32::Devices::DeviceAndDriverInstallation::{
    SetupDiDestroyDeviceInfoList, SetupDiEnumDeviceInterfaces, SetupDiGetClassDevsW,
    SetupDiGetDeviceInterfaceDetailW, DIGCF_DEVICEINTERFACE, DIGCF_PRESENT,
    SP_DEVICE_INTERFACE_DATA, SP_DEVICE_INTERFACE_DETAIL_DATA_W,
};
use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_DEVICE_NOT_CONNECTED, ERROR_DEV_NOT_EXIST,
    ERROR_INVALID_HANDLE, ERROR_IO_PENDING, GENERIC_READ, GENERIC_WRITE, HANDLE,
    INVALID_HANDLE_VALUE, WAIT_TIMEOUT,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, ReadFile, WriteFile, FILE_ATTRIBUTE_NORMAL, FILE_FLAG_OVERLAPPED,
    FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows_sys::Win32::System::Threading::CreateEventW;
use windows_sys::Win32::System::IO::{
    CancelIoEx, GetOverlappedResult, GetOverlappedResultEx, OVERLAPPED,
};
use zerocopy::IntoBytes;

use crate::error::TransportError;
use crate::protocol::{device, timing, PacketHeader, HEADER_BYTES, RAW_READ_BYTES};
use crate::types::{DiscoveredDevice, TransportKind};
use crate::StenoTransport;

const WRITER_CLASS: GUID = GUID::from_u128(device::WRITER_INTERFACE_CLASS);

/// Owned file handle plus the event used for overlapped completion
struct DeviceHandle {
    file: HANDLE,
    event: HANDLE,
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        unsafe {
            CancelIoEx(self.file, ptr::null());
            CloseHandle(self.file);
            CloseHandle(self.event);
        }
    }
}

// The handles are only touched from the thread that owns the transport.
unsafe impl Send for DeviceHandle {}

/// Raw handle transport for writers bound to the vendor driver
pub struct RawHandleTransport {
    device: Option<DeviceHandle>,
}

impl Default for RawHandleTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RawHandleTransport {
    /// Create an unconnected transport
    pub fn new() -> Self {
        Self { device: None }
    }

    /// List writer interface paths without opening them
    pub fn list() -> Result<Vec<DiscoveredDevice>, TransportError> {
        Ok(interface_paths()?
            .into_iter()
            .map(|path| DiscoveredDevice {
                kind: TransportKind::Raw,
                path: String::from_utf16_lossy(&path[..path.len().saturating_sub(1)]),
                pid: None,
            })
            .collect())
    }

    fn open(&self) -> Result<DeviceHandle, TransportError> {
        let path = interface_paths()?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::DeviceNotFound("no writer interface present".into()))?;

        let file = unsafe {
            CreateFileW(
                path.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                ptr::null(),
                OPEN_EXISTING,
                FILE_ATTRIBUTE_NORMAL | FILE_FLAG_OVERLAPPED,
                ptr::null_mut(),
            )
        };
        if file == INVALID_HANDLE_VALUE {
            return Err(last_error());
        }

        let event = unsafe { CreateEventW(ptr::null(), 1, 0, ptr::null()) };
        if event.is_null() {
            let err = last_error();
            unsafe { CloseHandle(file) };
            return Err(err);
        }

        debug!(
            "Opened writer interface {}",
            String::from_utf16_lossy(&path[..path.len().saturating_sub(1)])
        );
        Ok(DeviceHandle { file, event })
    }

    /// Run one overlapped read or write and wait up to `timeout` for it
    ///
    /// Returns `Ok(None)` if the operation did not complete in time.
    fn transfer(
        &mut self,
        buf: *mut u8,
        len: u32,
        write: bool,
        timeout: Duration,
    ) -> Result<Option<u32>, TransportError> {
        let (file, event) = match &self.device {
            Some(dev) => (dev.file, dev.event),
            None => return Err(TransportError::NotConnected),
        };

        let mut overlapped: OVERLAPPED = unsafe { mem::zeroed() };
        overlapped.hEvent = event;
        let mut transferred = 0u32;

        let started = unsafe {
            if write {
                WriteFile(file, buf as *const u8, len, &mut transferred, &mut overlapped)
            } else {
                ReadFile(file, buf, len, &mut transferred, &mut overlapped)
            }
        };
        if started == 0 {
            let code = unsafe { GetLastError() };
            if code != ERROR_IO_PENDING {
                return Err(self.classify(code));
            }
        }

        let millis = timeout.as_millis().min(u32::MAX as u128) as u32;
        let done = unsafe { GetOverlappedResultEx(file, &overlapped, &mut transferred, millis, 0) };
        if done != 0 {
            return Ok(Some(transferred));
        }

        let code = unsafe { GetLastError() };
        if code == WAIT_TIMEOUT {
            // The buffer must stay valid until the cancelled request drains
            unsafe {
                CancelIoEx(file, &overlapped);
                GetOverlappedResult(file, &overlapped, &mut transferred, 1);
            }
            return Ok(None);
        }
        Err(self.classify(code))
    }

    fn classify(&mut self, code: u32) -> TransportError {
        match code {
            ERROR_DEVICE_NOT_CONNECTED | ERROR_DEV_NOT_EXIST | ERROR_INVALID_HANDLE => {
                self.device = None;
                TransportError::Disconnected
            }
            _ => TransportError::Io(std::io::Error::from_raw_os_error(code as i32)),
        }
    }
}

impl StenoTransport for RawHandleTransport {
    fn connect(&mut self) -> bool {
        self.device = None;
        match self.open() {
            Ok(dev) => {
                self.device = Some(dev);
                true
            }
            Err(e) => {
                debug!("Raw handle connect failed: {}", e);
                false
            }
        }
    }

    fn disconnect(&mut self) {
        self.device = None;
    }

    fn send_request(&mut self, header: &PacketHeader) -> Result<usize, TransportError> {
        if self.device.is_none() {
            return Ok(0);
        }
        // Requests never carry payload, so the header is the whole write
        let mut buf = vec![0u8; header.wire_len()];
        buf[..HEADER_BYTES].copy_from_slice(header.as_bytes());
        let timeout = Duration::from_millis(timing::WRITE_TIMEOUT_MS);
        match self.transfer(buf.as_mut_ptr(), buf.len() as u32, true, timeout)? {
            Some(n) => Ok(n as usize),
            None => Err(TransportError::Timeout),
        }
    }

    fn receive_response(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let mut buf = vec![0u8; RAW_READ_BYTES];
        match self.transfer(buf.as_mut_ptr(), buf.len() as u32, false, timeout)? {
            Some(n) if n as usize >= HEADER_BYTES => {
                buf.truncate(n as usize);
                Ok(Some(buf))
            }
            Some(n) => {
                debug!("Short raw read ({} bytes), ignoring", n);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn is_connected(&self) -> bool {
        self.device.is_some()
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Raw
    }
}

fn last_error() -> TransportError {
    TransportError::Io(std::io::Error::last_os_error())
}

/// NUL-terminated device paths of every present writer interface
fn interface_paths() -> Result<Vec<Vec<u16>>, TransportError> {
    let info_set = unsafe {
        SetupDiGetClassDevsW(
            &WRITER_CLASS,
            ptr::null(),
            ptr::null_mut(),
            DIGCF_PRESENT | DIGCF_DEVICEINTERFACE,
        )
    };
    if info_set as isize == -1 {
        return Err(last_error());
    }

    let mut paths = Vec::new();
    let mut index = 0u32;
    loop {
        let mut iface: SP_DEVICE_INTERFACE_DATA = unsafe { mem::zeroed() };
        iface.cbSize = mem::size_of::<SP_DEVICE_INTERFACE_DATA>() as u32;
        let found = unsafe {
            SetupDiEnumDeviceInterfaces(info_set, ptr::null(), &WRITER_CLASS, index, &mut iface)
        };
        if found == 0 {
            break;
        }
        index += 1;

        // First call only reports the detail size
        let mut required = 0u32;
        unsafe {
            SetupDiGetDeviceInterfaceDetailW(
                info_set,
                &iface,
                ptr::null_mut(),
                0,
                &mut required,
                ptr::null_mut(),
            );
        }
        if required == 0 {
            continue;
        }

        // u64 storage keeps the detail struct aligned
        let mut storage = vec![0u64; (required as usize).div_ceil(8)];
        let detail = storage.as_mut_ptr() as *mut SP_DEVICE_INTERFACE_DETAIL_DATA_W;
        unsafe {
            (*detail).cbSize = mem::size_of::<SP_DEVICE_INTERFACE_DETAIL_DATA_W>() as u32;
        }
        let ok = unsafe {
            SetupDiGetDeviceInterfaceDetailW(
                info_set,
                &iface,
                detail,
                required,
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        if ok == 0 {
            continue;
        }

        let path_ptr = unsafe { ptr::addr_of!((*detail).DevicePath) } as *const u16;
        let max_chars = (required as usize - mem::size_of::<u32>()) / 2;
        let mut path = Vec::with_capacity(max_chars);
        for i in 0..max_chars {
            let c = unsafe { *path_ptr.add(i) };
            path.push(c);
            if c == 0 {
                break;
            }
        }
        if path.last() != Some(&0) {
            path.push(0);
        }
        paths.push(path);
    }

    unsafe { SetupDiDestroyDeviceInfoList(info_set) };
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconnected_send_writes_nothing() {
        let mut transport = RawHandleTransport::new();
        let written = transport
            .send_request(&PacketHeader::read_request())
            .unwrap();
        assert_eq!(written, 0);
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_unconnected_receive_reports_not_connected() {
        let mut transport = RawHandleTransport::new();
        let err = transport
            .receive_response(Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
        assert!(err.is_device_removed());
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut transport = RawHandleTransport::new();
        transport.disconnect();
        transport.disconnect();
        assert!(!transport.is_connected());
        assert_eq!(transport.kind(), TransportKind::Raw);
    }

    #[test]
    fn test_writer_class_guid() {
        assert_eq!(WRITER_CLASS.data1, 0xc5682e20);
        assert_eq!(WRITER_CLASS.data2, 0x8059);
        assert_eq!(WRITER_CLASS.data3, 0x604a);
    }

    #[test]
    #[ignore] // requires hardware
    fn test_connect_real_writer() {
        let mut transport = RawHandleTransport::new();
        assert!(transport.connect(), "plug in a Stenograph writer");
        let written = transport
            .send_request(&PacketHeader::read_request())
            .unwrap();
        assert_eq!(written, HEADER_BYTES);
        transport.disconnect();
    }
}
