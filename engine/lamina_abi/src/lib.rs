//! Lamina native module ABI (`lamina_abi`)
//!
//! The fixed C calling convention between the lamina host and custom functions
//! compiled into dynamically loadable modules.
//!
//! # Exported symbols
//!
//! A module exports one entry point per custom function, plus an optional
//! metadata symbol named after it:
//!
//! ```text
//! int32_t <entry>(const LaminaArgs *args, LaminaOutput *out);
//! int32_t <entry>_signature(LaminaSignature *sig);
//! ```
//!
//! # Status codes
//!
//! - [`STATUS_OK`]: `out.len` values were written to `out.values`.
//! - [`STATUS_BUFFER_TOO_SMALL`]: `out.len` holds the required length, nothing
//!   was written. The host grows the buffer and calls again.
//! - anything else: the function failed.
//!
//! # Safety
//!
//! Every pointer/length pair in [`LaminaArgs`] is valid for reads for the
//! duration of the call; `LaminaOutput::values` is valid for `capacity` writes.
//! Rust modules should implement entry points with [`serve`], which checks
//! null pointers and stops panics at the FFI boundary.

#![allow(
    unsafe_code,
    reason = "C-ABI types and helpers require unsafe for raw pointer operations"
)]

use std::panic::{self, AssertUnwindSafe};

/// Version of this calling convention. Bumped on any layout change.
pub const ABI_VERSION: u32 = 1;

/// The call succeeded.
pub const STATUS_OK: i32 = 0;
/// The output buffer is too small; `LaminaOutput::len` holds the required length.
pub const STATUS_BUFFER_TOO_SMALL: i32 = 1;
/// The function reported a failure.
pub const STATUS_FAILED: i32 = 2;

/// `LaminaArgs::domain` value for models without domains.
pub const NO_DOMAIN: i32 = -1;

/// `LaminaSignature::params` value meaning "any parameter count".
pub const ANY_PARAMS: usize = 0;

/// Suffix of the optional metadata symbol.
pub const SIGNATURE_SUFFIX: &str = "_signature";

/// Call arguments: { ptr, len } pairs plus the contrast/domain indices.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LaminaArgs {
    pub params: *const f64,
    pub n_params: usize,
    pub bulk_in: *const f64,
    pub n_bulk_in: usize,
    pub bulk_out: *const f64,
    pub n_bulk_out: usize,
    pub x: *const f64,
    pub n_x: usize,
    /// Zero-based contrast index.
    pub contrast: u32,
    /// Zero-based domain index, or [`NO_DOMAIN`].
    pub domain: i32,
}

/// Output buffer owned by the host.
#[repr(C)]
#[derive(Debug)]
pub struct LaminaOutput {
    pub values: *mut f64,
    pub capacity: usize,
    pub len: usize,
    pub scalar: f64,
    /// Non-zero when `scalar` was written.
    pub has_scalar: u8,
}

/// Metadata describing the declared shape of an entry point.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaminaSignature {
    pub abi_version: u32,
    /// Expected parameter count, or [`ANY_PARAMS`].
    pub params: usize,
    /// Values per output row (1 for XY profiles, 3 or 4 for layer tables).
    pub columns: usize,
}

/// Entry point type.
pub type EntryFn = unsafe extern "C" fn(*const LaminaArgs, *mut LaminaOutput) -> i32;

/// Metadata symbol type.
pub type SignatureFn = unsafe extern "C" fn(*mut LaminaSignature) -> i32;

/// Name of the metadata symbol for `entry`.
pub fn signature_symbol(entry: &str) -> String {
    format!("{entry}{SIGNATURE_SUFFIX}")
}

/// Borrowed view of [`LaminaArgs`] for module authors.
#[derive(Debug, Clone, Copy)]
pub struct CallArgs<'a> {
    pub params: &'a [f64],
    pub bulk_in: &'a [f64],
    pub bulk_out: &'a [f64],
    pub x: &'a [f64],
    pub contrast: usize,
    pub domain: Option<usize>,
}

/// Values produced by a module function before they are copied to the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleOutput {
    pub values: Vec<f64>,
    pub scalar: Option<f64>,
}

impl LaminaArgs {
    /// Build arguments pointing at borrowed slices.
    ///
    /// The returned value must not outlive the slices.
    pub fn from_slices(
        params: &[f64],
        bulk_in: &[f64],
        bulk_out: &[f64],
        x: &[f64],
        contrast: u32,
        domain: i32,
    ) -> Self {
        LaminaArgs {
            params: params.as_ptr(),
            n_params: params.len(),
            bulk_in: bulk_in.as_ptr(),
            n_bulk_in: bulk_in.len(),
            bulk_out: bulk_out.as_ptr(),
            n_bulk_out: bulk_out.len(),
            x: x.as_ptr(),
            n_x: x.len(),
            contrast,
            domain,
        }
    }

    /// Reborrow as slices.
    ///
    /// # Safety
    /// Every non-null pointer must be valid for reads of its paired length.
    pub unsafe fn view(&self) -> CallArgs<'_> {
        CallArgs {
            params: slice_or_empty(self.params, self.n_params),
            bulk_in: slice_or_empty(self.bulk_in, self.n_bulk_in),
            bulk_out: slice_or_empty(self.bulk_out, self.n_bulk_out),
            x: slice_or_empty(self.x, self.n_x),
            contrast: self.contrast as usize,
            domain: usize::try_from(self.domain).ok(),
        }
    }
}

impl LaminaOutput {
    /// Wrap a host buffer.
    pub fn new(buffer: &mut [f64]) -> Self {
        LaminaOutput {
            values: buffer.as_mut_ptr(),
            capacity: buffer.len(),
            len: 0,
            scalar: 0.0,
            has_scalar: 0,
        }
    }

    /// Copy `values` into the buffer, or report the required length.
    ///
    /// # Safety
    /// `self.values` must be valid for `self.capacity` writes.
    pub unsafe fn write(&mut self, values: &[f64]) -> i32 {
        self.len = values.len();
        if values.len() > self.capacity {
            return STATUS_BUFFER_TOO_SMALL;
        }
        if !values.is_empty() {
            // SAFETY: capacity checked above, caller guarantees the buffer
            std::ptr::copy_nonoverlapping(values.as_ptr(), self.values, values.len());
        }
        STATUS_OK
    }

    /// Record the auxiliary scalar output.
    pub fn set_scalar(&mut self, scalar: f64) {
        self.scalar = scalar;
        self.has_scalar = 1;
    }

    /// The scalar output, if one was written.
    pub fn scalar(&self) -> Option<f64> {
        (self.has_scalar != 0).then_some(self.scalar)
    }
}

/// Run a module function behind the C entry point.
///
/// Null pointers and panics map to [`STATUS_FAILED`]; a panic must never
/// unwind into the host.
///
/// # Safety
/// `args` and `out` must satisfy the contracts documented on the crate.
pub unsafe fn serve(
    args: *const LaminaArgs,
    out: *mut LaminaOutput,
    f: fn(&CallArgs<'_>) -> Option<ModuleOutput>,
) -> i32 {
    if args.is_null() || out.is_null() {
        return STATUS_FAILED;
    }
    // SAFETY: non-null, caller guarantees validity
    let view = (*args).view();
    let produced = panic::catch_unwind(AssertUnwindSafe(|| f(&view)));
    let Ok(Some(output)) = produced else {
        return STATUS_FAILED;
    };
    // SAFETY: non-null, caller guarantees validity
    let out = &mut *out;
    if let Some(scalar) = output.scalar {
        out.set_scalar(scalar);
    }
    out.write(&output.values)
}

/// Fill a metadata record.
///
/// # Safety
/// `sig` must be null or valid for writes.
pub unsafe fn describe(sig: *mut LaminaSignature, params: usize, columns: usize) -> i32 {
    if sig.is_null() {
        return STATUS_FAILED;
    }
    // SAFETY: non-null, caller guarantees validity
    *sig = LaminaSignature {
        abi_version: ABI_VERSION,
        params,
        columns,
    };
    STATUS_OK
}

unsafe fn slice_or_empty<'a>(ptr: *const f64, len: usize) -> &'a [f64] {
    if ptr.is_null() || len == 0 {
        return &[];
    }
    // SAFETY: caller guarantees ptr is valid for len reads
    std::slice::from_raw_parts(ptr, len)
}
