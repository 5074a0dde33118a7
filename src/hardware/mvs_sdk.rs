//! Vision SDK Binding
//!
//! The industrial camera talks to the vendor's `MvCameraControl` library. The
//! handful of calls it needs are behind the [`VisionSdk`] trait so the camera
//! logic can be exercised without the library or a camera attached.
//!
//! Every SDK entry point reports a status code; `MV_OK` (0) is success and
//! anything else is a failure code that is logged in hex.
//!
//! The real binding, [`MvsSdk`], is only compiled with the `hikrobot_sdk`
//! feature, which requires `libMvCameraControl` on the linker path.

use crate::error::{CellError, CellResult};

/// Raw SDK status code
pub type SdkCode = u32;

/// Success
pub const MV_OK: SdkCode = 0;

/// Frame grab timed out (normal when the line is idle)
pub const MV_E_GC_TIMEOUT: SdkCode = 0x8000_0107;

/// Transport layer selector for USB3 Vision devices
pub const MV_USB_DEVICE: u32 = 0x0000_0004;

/// Largest frame the camera can deliver: 3072 x 2048, up to 3 bytes per pixel
pub const MAX_FRAME_BYTES: usize = 3072 * 2048 * 3;

/// Metadata the SDK reports alongside a grabbed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameInfo {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// GenICam pixel type code
    pub pixel_type: u32,
    /// Driver frame counter
    pub frame_num: u32,
    /// Valid bytes written into the caller's buffer
    pub frame_len: u32,
}

/// The subset of the vision SDK used by the industrial camera.
///
/// Calls are blocking and are only made from the frame producer thread.
pub trait VisionSdk: Send {
    /// Enumerate USB devices, returning how many were found
    fn enum_devices(&mut self) -> Result<u32, SdkCode>;

    /// Create a handle for the device at `index` of the last enumeration
    fn create_handle(&mut self, index: u32) -> SdkCode;

    /// Open the device with exclusive access
    fn open_device(&mut self) -> SdkCode;

    /// Set an integer node (e.g. `Width`)
    fn set_int_value(&mut self, key: &str, value: u32) -> SdkCode;

    /// Set an enumeration node (e.g. `PixelFormat`)
    fn set_enum_value(&mut self, key: &str, value: u32) -> SdkCode;

    /// Start the acquisition stream
    fn start_grabbing(&mut self) -> SdkCode;

    /// Stop the acquisition stream
    fn stop_grabbing(&mut self) -> SdkCode;

    /// Copy one frame into `buffer`, waiting at most `timeout_ms`
    fn get_one_frame_timeout(&mut self, buffer: &mut [u8], timeout_ms: u32) -> Result<FrameInfo, SdkCode>;

    /// Close the opened device
    fn close_device(&mut self) -> SdkCode;

    /// Free the device handle
    fn destroy_handle(&mut self) -> SdkCode;
}

/// Map a status code to `Ok(())` or an `Sdk` error naming the operation.
pub fn check(operation: &'static str, code: SdkCode) -> CellResult<()> {
    if code == MV_OK {
        Ok(())
    } else {
        Err(CellError::Sdk { operation, code })
    }
}

#[cfg(feature = "hikrobot_sdk")]
pub use ffi_binding::MvsSdk;

#[cfg(feature = "hikrobot_sdk")]
mod ffi_binding {
    use super::{FrameInfo, SdkCode, VisionSdk, MV_OK, MV_USB_DEVICE};
    use std::ffi::{c_void, CString};
    use std::os::raw::{c_char, c_int, c_uint, c_ushort};
    use std::ptr;

    const MV_MAX_DEVICE_NUM: usize = 256;
    const MV_ACCESS_EXCLUSIVE: c_uint = 1;

    #[repr(C)]
    struct MvDeviceInfoList {
        n_device_num: c_uint,
        p_device_info: [*mut c_void; MV_MAX_DEVICE_NUM],
    }

    // Leading fields of MV_FRAME_OUT_INFO_EX; the tail is reserved space the
    // SDK is free to write into.
    #[repr(C)]
    struct MvFrameOutInfoEx {
        n_width: c_ushort,
        n_height: c_ushort,
        en_pixel_type: c_uint,
        n_frame_num: c_uint,
        n_dev_time_stamp_high: c_uint,
        n_dev_time_stamp_low: c_uint,
        n_reserved0: c_uint,
        n_host_time_stamp: i64,
        n_frame_len: c_uint,
        tail: [u8; 1024],
    }

    #[link(name = "MvCameraControl")]
    extern "C" {
        fn MV_CC_EnumDevices(n_tlayer_type: c_uint, dev_list: *mut MvDeviceInfoList) -> c_int;
        fn MV_CC_CreateHandle(handle: *mut *mut c_void, dev_info: *const c_void) -> c_int;
        fn MV_CC_OpenDevice(handle: *mut c_void, access_mode: c_uint, switchover_key: c_ushort) -> c_int;
        fn MV_CC_SetIntValue(handle: *mut c_void, key: *const c_char, value: c_uint) -> c_int;
        fn MV_CC_SetEnumValue(handle: *mut c_void, key: *const c_char, value: c_uint) -> c_int;
        fn MV_CC_StartGrabbing(handle: *mut c_void) -> c_int;
        fn MV_CC_StopGrabbing(handle: *mut c_void) -> c_int;
        fn MV_CC_GetOneFrameTimeout(
            handle: *mut c_void,
            data: *mut u8,
            data_size: c_uint,
            frame_info: *mut MvFrameOutInfoEx,
            msec: c_uint,
        ) -> c_int;
        fn MV_CC_CloseDevice(handle: *mut c_void) -> c_int;
        fn MV_CC_DestroyHandle(handle: *mut c_void) -> c_int;
    }

    // Status codes are unsigned in the SDK headers but returned as int.
    fn code(ret: c_int) -> SdkCode {
        ret as u32
    }

    /// `VisionSdk` backed by `libMvCameraControl`.
    pub struct MvsSdk {
        devices: Box<MvDeviceInfoList>,
        handle: *mut c_void,
    }

    // SAFETY: the handle is only used from the thread that owns the MvsSdk;
    // the SDK permits a handle to move between threads.
    unsafe impl Send for MvsSdk {}

    impl MvsSdk {
        /// Binding with no handle created
        pub fn new() -> Self {
            Self {
                devices: Box::new(MvDeviceInfoList {
                    n_device_num: 0,
                    p_device_info: [ptr::null_mut(); MV_MAX_DEVICE_NUM],
                }),
                handle: ptr::null_mut(),
            }
        }

        fn with_key(&mut self, key: &str, value: u32, f: unsafe extern "C" fn(*mut c_void, *const c_char, c_uint) -> c_int) -> SdkCode {
            let Ok(key) = CString::new(key) else {
                return u32::MAX;
            };
            // SAFETY: handle was created by MV_CC_CreateHandle and key is NUL terminated.
            code(unsafe { f(self.handle, key.as_ptr(), value) })
        }
    }

    impl Default for MvsSdk {
        fn default() -> Self {
            Self::new()
        }
    }

    impl VisionSdk for MvsSdk {
        fn enum_devices(&mut self) -> Result<u32, SdkCode> {
            // SAFETY: devices points to a live, correctly sized list.
            let ret = code(unsafe { MV_CC_EnumDevices(MV_USB_DEVICE, &mut *self.devices) });
            if ret == MV_OK {
                Ok(self.devices.n_device_num)
            } else {
                Err(ret)
            }
        }

        fn create_handle(&mut self, index: u32) -> SdkCode {
            let info = self.devices.p_device_info[index as usize % MV_MAX_DEVICE_NUM];
            // SAFETY: info comes from the last successful enumeration.
            code(unsafe { MV_CC_CreateHandle(&mut self.handle, info) })
        }

        fn open_device(&mut self) -> SdkCode {
            // SAFETY: handle was created by MV_CC_CreateHandle.
            code(unsafe { MV_CC_OpenDevice(self.handle, MV_ACCESS_EXCLUSIVE, 0) })
        }

        fn set_int_value(&mut self, key: &str, value: u32) -> SdkCode {
            self.with_key(key, value, MV_CC_SetIntValue)
        }

        fn set_enum_value(&mut self, key: &str, value: u32) -> SdkCode {
            self.with_key(key, value, MV_CC_SetEnumValue)
        }

        fn start_grabbing(&mut self) -> SdkCode {
            // SAFETY: handle refers to an opened device.
            code(unsafe { MV_CC_StartGrabbing(self.handle) })
        }

        fn stop_grabbing(&mut self) -> SdkCode {
            // SAFETY: handle refers to an opened device.
            code(unsafe { MV_CC_StopGrabbing(self.handle) })
        }

        fn get_one_frame_timeout(&mut self, buffer: &mut [u8], timeout_ms: u32) -> Result<FrameInfo, SdkCode> {
            // SAFETY: the struct is plain old data; all-zero is a valid value.
            let mut info: MvFrameOutInfoEx = unsafe { std::mem::zeroed() };
            // SAFETY: buffer is valid for buffer.len() bytes and info outlives the call.
            let ret = code(unsafe {
                MV_CC_GetOneFrameTimeout(
                    self.handle,
                    buffer.as_mut_ptr(),
                    buffer.len() as c_uint,
                    &mut info,
                    timeout_ms,
                )
            });
            if ret != MV_OK {
                return Err(ret);
            }
            Ok(FrameInfo {
                width: u32::from(info.n_width),
                height: u32::from(info.n_height),
                pixel_type: info.en_pixel_type,
                frame_num: info.n_frame_num,
                frame_len: info.n_frame_len,
            })
        }

        fn close_device(&mut self) -> SdkCode {
            // SAFETY: handle refers to an opened device.
            code(unsafe { MV_CC_CloseDevice(self.handle) })
        }

        fn destroy_handle(&mut self) -> SdkCode {
            // SAFETY: handle was created by MV_CC_CreateHandle and is not used afterwards.
            let ret = code(unsafe { MV_CC_DestroyHandle(self.handle) });
            self.handle = ptr::null_mut();
            ret
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_maps_codes() {
        assert!(check("MV_CC_StartGrabbing", MV_OK).is_ok());

        let err = check("MV_CC_OpenDevice", 0x8000_0203).unwrap_err();
        assert_eq!(err.to_string(), "MV_CC_OpenDevice failed (ret = 0x80000203)");
    }
}
