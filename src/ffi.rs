use std::ffi::{c_char, CString};
use std::path::Path;
use std::ptr;

use crate::adapters::{AngReader, FormatReader, H5AngReader};
use crate::container::MemContainer;
use crate::ops::convention::identify;
use crate::types::dataset::ReadError;
use crate::types::transform::{CoordinateConvention, TransformDescriptor};

pub const EBSD_CONVENTION_UNKNOWN: i32 = -1;
pub const EBSD_CONVENTION_TSL: i32 = 0;
pub const EBSD_CONVENTION_HKL: i32 = 1;
pub const EBSD_CONVENTION_HEDM: i32 = 2;

/// Status code for failures of the call itself (null pointers, invalid UTF-8).
pub const EBSD_INVALID_ARGUMENT: i32 = -1;

/// Status of a C ABI call: `code` is 0 on success, a negative error code
/// otherwise. `message` is null on success.
#[repr(C)]
pub struct EbsdStatus {
    pub code: i32,
    pub message: *const c_char,
}

impl EbsdStatus {
    pub fn success() -> Self {
        Self {
            code: 0,
            message: ptr::null(),
        }
    }

    pub fn error(code: i32, msg: &str) -> Self {
        // CString cannot hold interior NULs
        let msg = CString::new(msg.replace('\0', " ")).unwrap_or_default();
        Self {
            code,
            message: msg.into_raw(),
        }
    }
}

impl From<ReadError> for EbsdStatus {
    fn from(e: ReadError) -> Self {
        Self::error(e.code(), &e.to_string())
    }
}

#[no_mangle]
pub extern "C" fn ebsd_free_status(status: *const EbsdStatus) {
    if status.is_null() {
        return;
    }
    unsafe {
        let s = &*status;
        if !s.message.is_null() {
            let _ = CString::from_raw(s.message as *mut c_char);
        }
    }
}

fn convention_code(convention: CoordinateConvention) -> i32 {
    match convention {
        CoordinateConvention::TslDefault => EBSD_CONVENTION_TSL,
        CoordinateConvention::HklDefault => EBSD_CONVENTION_HKL,
        CoordinateConvention::HedmDefault => EBSD_CONVENTION_HEDM,
        CoordinateConvention::Unknown => EBSD_CONVENTION_UNKNOWN,
    }
}

/// Classify two `[angle, x, y, z]` transforms. Null input is unknown.
#[no_mangle]
pub extern "C" fn ebsd_identify_convention(sample: *const f32, euler: *const f32) -> i32 {
    if sample.is_null() || euler.is_null() {
        return EBSD_CONVENTION_UNKNOWN;
    }
    unsafe {
        let s = std::slice::from_raw_parts(sample, 4);
        let e = std::slice::from_raw_parts(euler, 4);
        convention_code(identify(
            &TransformDescriptor::new(s[0], s[1], s[2], s[3]),
            &TransformDescriptor::new(e[0], e[1], e[2], e[3]),
        ))
    }
}

unsafe fn str_arg<'a>(ptr: *const c_char, len: usize, what: &str) -> Result<&'a str, EbsdStatus> {
    if ptr.is_null() {
        return Err(EbsdStatus::error(
            EBSD_INVALID_ARGUMENT,
            &format!("{what} is null"),
        ));
    }
    let bytes = std::slice::from_raw_parts(ptr as *const u8, len);
    std::str::from_utf8(bytes).map_err(|_| {
        EbsdStatus::error(EBSD_INVALID_ARGUMENT, &format!("invalid UTF-8 in {what}"))
    })
}

/// Number of phases declared in the header of an `.ang` file.
#[no_mangle]
pub extern "C" fn ebsd_ang_phase_count(
    path_ptr: *const c_char,
    path_len: usize,
    out_count: *mut usize,
) -> EbsdStatus {
    if out_count.is_null() {
        return EbsdStatus::error(EBSD_INVALID_ARGUMENT, "out_count is null");
    }
    unsafe {
        let path = match str_arg(path_ptr, path_len, "path") {
            Ok(p) => p,
            Err(status) => return status,
        };
        let mut reader = AngReader::new(Path::new(path));
        match reader.read_header_only() {
            Ok(()) => {
                *out_count = reader.phases().len();
                EbsdStatus::success()
            }
            Err(e) => e.into(),
        }
    }
}

/// Number of scan points in an `.ang` file. No columns are materialized.
#[no_mangle]
pub extern "C" fn ebsd_ang_point_count(
    path_ptr: *const c_char,
    path_len: usize,
    out_count: *mut usize,
) -> EbsdStatus {
    if out_count.is_null() {
        return EbsdStatus::error(EBSD_INVALID_ARGUMENT, "out_count is null");
    }
    unsafe {
        let path = match str_arg(path_ptr, path_len, "path") {
            Ok(p) => p,
            Err(status) => return status,
        };
        let mut reader = AngReader::new(Path::new(path));
        reader.read_all_arrays(false);
        match reader.read_file() {
            Ok(()) => {
                *out_count = reader.dataset().point_count;
                EbsdStatus::success()
            }
            Err(e) => e.into(),
        }
    }
}

/// Number of phases of scan `index` in a MessagePack container file.
#[no_mangle]
pub extern "C" fn ebsd_container_phase_count(
    path_ptr: *const c_char,
    path_len: usize,
    index_ptr: *const c_char,
    index_len: usize,
    out_count: *mut usize,
) -> EbsdStatus {
    if out_count.is_null() {
        return EbsdStatus::error(EBSD_INVALID_ARGUMENT, "out_count is null");
    }
    unsafe {
        let path = match str_arg(path_ptr, path_len, "path") {
            Ok(p) => p,
            Err(status) => return status,
        };
        let index = match str_arg(index_ptr, index_len, "index") {
            Ok(i) => i,
            Err(status) => return status,
        };
        let container = match MemContainer::open(Path::new(path)) {
            Ok(c) => c,
            Err(e) => return ReadError::MissingFile(format!("{path}: {e}")).into(),
        };
        let mut reader = H5AngReader::new(container, index);
        match reader.read_header_only() {
            Ok(()) => {
                *out_count = reader.phases().len();
                EbsdStatus::success()
            }
            Err(e) => e.into(),
        }
    }
}
