//! Demo native custom functions.
//!
//! Built as a `cdylib`, this crate is a loadable lamina module; it doubles
//! as a template for authoring modules in Rust. Each export forwards to a
//! plain Rust function in [`models`] through [`lamina_abi::serve`].
//!
//! | symbol           | model  | params | columns | metadata |
//! |------------------|--------|--------|---------|----------|
//! | `linear_xy`      | XY     | 2      | 1       | yes      |
//! | `sld_tanh`       | XY     | any    | 1       | yes      |
//! | `oxide_bilayer`  | layers | 5      | 3       | yes      |
//! | `graded_film`    | layers | 3      | 3       | yes      |
//! | `hydrated_slab`  | layers | 4      | 4       | yes      |
//! | `scaled_params`  | layers | -      | -       | no       |
//! | `failing`        | layers | any    | 3       | yes      |

use lamina_abi::{describe, serve, LaminaArgs, LaminaOutput, LaminaSignature, ANY_PARAMS};

pub mod models;

/// # Safety
/// See the `lamina_abi` calling convention.
#[no_mangle]
pub unsafe extern "C" fn linear_xy(args: *const LaminaArgs, out: *mut LaminaOutput) -> i32 {
    serve(args, out, models::linear_xy)
}

/// # Safety
/// `sig` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn linear_xy_signature(sig: *mut LaminaSignature) -> i32 {
    describe(sig, 2, 1)
}

/// # Safety
/// See the `lamina_abi` calling convention.
#[no_mangle]
pub unsafe extern "C" fn sld_tanh(args: *const LaminaArgs, out: *mut LaminaOutput) -> i32 {
    serve(args, out, models::sld_tanh)
}

/// # Safety
/// `sig` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn sld_tanh_signature(sig: *mut LaminaSignature) -> i32 {
    describe(sig, ANY_PARAMS, 1)
}

/// # Safety
/// See the `lamina_abi` calling convention.
#[no_mangle]
pub unsafe extern "C" fn oxide_bilayer(args: *const LaminaArgs, out: *mut LaminaOutput) -> i32 {
    serve(args, out, models::oxide_bilayer)
}

/// # Safety
/// `sig` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn oxide_bilayer_signature(sig: *mut LaminaSignature) -> i32 {
    describe(sig, 5, 3)
}

/// # Safety
/// See the `lamina_abi` calling convention.
#[no_mangle]
pub unsafe extern "C" fn graded_film(args: *const LaminaArgs, out: *mut LaminaOutput) -> i32 {
    serve(args, out, models::graded_film)
}

/// # Safety
/// `sig` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn graded_film_signature(sig: *mut LaminaSignature) -> i32 {
    describe(sig, 3, 3)
}

/// # Safety
/// See the `lamina_abi` calling convention.
#[no_mangle]
pub unsafe extern "C" fn hydrated_slab(args: *const LaminaArgs, out: *mut LaminaOutput) -> i32 {
    serve(args, out, models::hydrated_slab)
}

/// # Safety
/// `sig` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn hydrated_slab_signature(sig: *mut LaminaSignature) -> i32 {
    describe(sig, 4, 4)
}

/// No metadata symbol: the host calls it unchecked.
///
/// # Safety
/// See the `lamina_abi` calling convention.
#[no_mangle]
pub unsafe extern "C" fn scaled_params(args: *const LaminaArgs, out: *mut LaminaOutput) -> i32 {
    serve(args, out, models::scaled_params)
}

/// # Safety
/// See the `lamina_abi` calling convention.
#[no_mangle]
pub unsafe extern "C" fn failing(args: *const LaminaArgs, out: *mut LaminaOutput) -> i32 {
    serve(args, out, models::failing)
}

/// # Safety
/// `sig` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn failing_signature(sig: *mut LaminaSignature) -> i32 {
    describe(sig, ANY_PARAMS, 3)
}
