//! `qnn-ffi` - C ABI over the qnn operator library.
//!
//! Tensors and operators cross the boundary as opaque handles. Every entry
//! point returns a [`QnnStatus`]; on failure the message is kept in a
//! thread-local slot readable through `qnn_last_error`.

mod error;
mod handle;
mod types;

pub use error::*;
pub use handle::{QnnOp, QnnTensor};
pub use types::*;

use std::ffi::{c_void, CString};
use std::os::raw::c_char;

use error::{invalid_argument, report_op, report_tensor};
use qnn_ops::{DisoParams, OpBase, ReluParams, ResizeParams};
use qnn_tensor::{QuantParams, Shape, Tensor};

/// Execute a closure that returns a `QnnStatus`, catching any panics
/// and converting them into `QnnStatus::Internal`.
fn catch_panic<F: FnOnce() -> QnnStatus>(f: F) -> QnnStatus {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(status) => status,
        Err(_) => {
            log::error!("panic caught at the FFI boundary");
            set_last_error("internal panic".to_string());
            QnnStatus::Internal
        }
    }
}

/// Move `value` to the heap and hand the pointer to the caller.
unsafe fn emit<T>(out: *mut *mut T, value: T) -> QnnStatus {
    *out = Box::into_raw(Box::new(value));
    QnnStatus::Ok
}

/// Borrow the tensors behind an array of handles.
unsafe fn borrow_tensors<'a>(
    handles: *const *const QnnTensor,
    count: usize,
) -> Result<Vec<&'a Tensor>, QnnStatus> {
    if count == 0 {
        return Ok(Vec::new());
    }
    if handles.is_null() {
        return Err(invalid_argument("inputs is null"));
    }
    std::slice::from_raw_parts(handles, count)
        .iter()
        .map(|&h| match h.as_ref() {
            Some(t) => Ok(&t.tensor),
            None => Err(invalid_argument("null tensor handle in inputs")),
        })
        .collect()
}

/// Create a zero-filled tensor.
///
/// `dims` points to `rank` dimension sizes. On success, writes a
/// heap-allocated `QnnTensor` pointer into `*out`; the caller must later
/// call `qnn_tensor_destroy`.
#[no_mangle]
pub unsafe extern "C" fn qnn_tensor_create(
    dtype: QnnDType,
    layout: QnnLayout,
    dims: *const usize,
    rank: usize,
    out: *mut *mut QnnTensor,
) -> QnnStatus {
    catch_panic(|| {
        if out.is_null() || (dims.is_null() && rank > 0) {
            return invalid_argument("null argument");
        }
        let dims = if rank == 0 {
            Vec::new()
        } else {
            unsafe { std::slice::from_raw_parts(dims, rank) }.to_vec()
        };
        match Tensor::zeros(Shape::new(dims), dtype.into(), layout.into()) {
            Ok(tensor) => unsafe { emit(out, QnnTensor { tensor }) },
            Err(e) => report_tensor(e),
        }
    })
}

/// Attach a quantization domain (`real = scale * (q - zero_point)`).
#[no_mangle]
pub unsafe extern "C" fn qnn_tensor_set_quant(
    tensor: *mut QnnTensor,
    scale: f32,
    zero_point: i32,
) -> QnnStatus {
    catch_panic(|| {
        let Some(t) = (unsafe { tensor.as_mut() }) else {
            return invalid_argument("tensor is null");
        };
        if !(scale.is_finite() && scale > 0.0) {
            set_last_error(format!("scale {} is not a positive finite number", scale));
            return QnnStatus::InvalidArgument;
        }
        t.tensor.set_quant(QuantParams::from_scale(scale, zero_point));
        QnnStatus::Ok
    })
}

/// Overwrite the tensor's buffer from `len` bytes of native-endian,
/// row-major elements. `len` must equal the buffer size exactly.
#[no_mangle]
pub unsafe extern "C" fn qnn_tensor_write(
    tensor: *mut QnnTensor,
    data: *const c_void,
    len: usize,
) -> QnnStatus {
    catch_panic(|| {
        let Some(t) = (unsafe { tensor.as_mut() }) else {
            return invalid_argument("tensor is null");
        };
        if data.is_null() {
            return invalid_argument("data is null");
        }
        let bytes = unsafe { std::slice::from_raw_parts(data as *const u8, len) };
        match t.tensor.storage_mut().copy_from_ne_bytes(bytes) {
            Ok(()) => QnnStatus::Ok,
            Err(e) => report_tensor(e),
        }
    })
}

/// Copy the tensor's buffer into `len` bytes at `data`. `len` must equal
/// the buffer size exactly.
#[no_mangle]
pub unsafe extern "C" fn qnn_tensor_read(
    tensor: *const QnnTensor,
    data: *mut c_void,
    len: usize,
) -> QnnStatus {
    catch_panic(|| {
        let Some(t) = (unsafe { tensor.as_ref() }) else {
            return invalid_argument("tensor is null");
        };
        if data.is_null() {
            return invalid_argument("data is null");
        }
        let bytes = t.tensor.storage().to_ne_bytes();
        if bytes.len() != len {
            set_last_error(format!("buffer holds {} bytes, tensor has {}", len, bytes.len()));
            return QnnStatus::InvalidArgument;
        }
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), data as *mut u8, len) };
        QnnStatus::Ok
    })
}

/// Destroy a tensor previously created by `qnn_tensor_create`.
///
/// Passing a null pointer is a no-op and returns `QnnStatus::Ok`.
#[no_mangle]
pub unsafe extern "C" fn qnn_tensor_destroy(tensor: *mut QnnTensor) -> QnnStatus {
    if tensor.is_null() {
        return QnnStatus::Ok;
    }
    drop(Box::from_raw(tensor));
    QnnStatus::Ok
}

/// Create a 2-D convolution, convolution + relu or deconvolution handle.
#[no_mangle]
pub unsafe extern "C" fn qnn_op_conv2d_create(
    desc: *const QnnConv2dDesc,
    out: *mut *mut QnnOp,
) -> QnnStatus {
    catch_panic(|| {
        let Some(desc) = (unsafe { desc.as_ref() }) else {
            return invalid_argument("desc is null");
        };
        if out.is_null() {
            return invalid_argument("out is null");
        }
        unsafe { emit(out, QnnOp::conv2d(desc)) }
    })
}

/// Create a max, average or global pooling handle.
#[no_mangle]
pub unsafe extern "C" fn qnn_op_pool2d_create(
    desc: *const QnnPool2dDesc,
    out: *mut *mut QnnOp,
) -> QnnStatus {
    catch_panic(|| {
        let Some(desc) = (unsafe { desc.as_ref() }) else {
            return invalid_argument("desc is null");
        };
        if out.is_null() {
            return invalid_argument("out is null");
        }
        unsafe { emit(out, QnnOp::pool2d(desc)) }
    })
}

#[no_mangle]
pub unsafe extern "C" fn qnn_op_resize_create(
    layout: QnnLayout,
    mode: QnnResizeMode,
    align_corners: bool,
    out: *mut *mut QnnOp,
) -> QnnStatus {
    catch_panic(|| {
        if out.is_null() {
            return invalid_argument("out is null");
        }
        let params = ResizeParams::new(OpBase::new(layout.into()).with_name("ffi"), mode.into())
            .with_align_corners(align_corners);
        unsafe { emit(out, QnnOp::Resize(params)) }
    })
}

/// Create a relu-family handle. `n` is the upper bound of `ReluN`;
/// `alpha` the negative slope of `LeakyRelu` and the scale of `Elu`.
#[no_mangle]
pub unsafe extern "C" fn qnn_op_relu_create(
    kind: QnnReluKind,
    layout: QnnLayout,
    n: f32,
    alpha: f32,
    out: *mut *mut QnnOp,
) -> QnnStatus {
    catch_panic(|| {
        if out.is_null() {
            return invalid_argument("out is null");
        }
        let params = ReluParams::new(OpBase::new(layout.into()).with_name("ffi"))
            .with_n(n)
            .with_alpha(alpha);
        unsafe { emit(out, QnnOp::Relu { kind, params }) }
    })
}

/// Create a broadcasting binary elementwise handle.
#[no_mangle]
pub unsafe extern "C" fn qnn_op_binary_create(
    kind: QnnBinaryKind,
    layout: QnnLayout,
    out: *mut *mut QnnOp,
) -> QnnStatus {
    catch_panic(|| {
        if out.is_null() {
            return invalid_argument("out is null");
        }
        let params = DisoParams::new(OpBase::new(layout.into()).with_name("ffi"));
        unsafe { emit(out, QnnOp::Binary { kind, params }) }
    })
}

/// Validate the operator against its tensors and bind a kernel.
///
/// `inputs` holds `n_inputs` handles: `[input, kernel]` or
/// `[input, kernel, bias]` for convolutions, `[lhs, rhs]` for binary
/// operators and `[input]` otherwise. A failed init leaves any kernel bound
/// by an earlier init in place.
#[no_mangle]
pub unsafe extern "C" fn qnn_op_init(
    op: *mut QnnOp,
    inputs: *const *const QnnTensor,
    n_inputs: usize,
    output: *const QnnTensor,
) -> QnnStatus {
    catch_panic(|| {
        let (Some(op), Some(output)) = (unsafe { op.as_mut() }, unsafe { output.as_ref() }) else {
            return invalid_argument("null argument");
        };
        let inputs = match unsafe { borrow_tensors(inputs, n_inputs) } {
            Ok(v) => v,
            Err(status) => return status,
        };
        match op.init(&inputs, &output.tensor) {
            Ok(()) => QnnStatus::Ok,
            Err(e) => report_op(e),
        }
    })
}

/// Run the kernel bound by `qnn_op_init`, writing into `output`.
///
/// The output handle must not also appear among the inputs.
#[no_mangle]
pub unsafe extern "C" fn qnn_op_invoke(
    op: *const QnnOp,
    inputs: *const *const QnnTensor,
    n_inputs: usize,
    output: *mut QnnTensor,
) -> QnnStatus {
    catch_panic(|| {
        if op.is_null() || output.is_null() {
            return invalid_argument("null argument");
        }
        let inputs = match unsafe { borrow_tensors(inputs, n_inputs) } {
            Ok(v) => v,
            Err(status) => return status,
        };
        let out_tensor = unsafe { std::ptr::addr_of_mut!((*output).tensor) };
        if inputs.iter().any(|&t| std::ptr::eq(t, out_tensor)) {
            return invalid_argument("output aliases an input");
        }
        let (op, output) = unsafe { (&*op, &mut *out_tensor) };
        match op.invoke(&inputs, output) {
            Ok(()) => QnnStatus::Ok,
            Err(e) => report_op(e),
        }
    })
}

/// Destroy an operator handle. Passing a null pointer is a no-op.
#[no_mangle]
pub unsafe extern "C" fn qnn_op_destroy(op: *mut QnnOp) -> QnnStatus {
    if op.is_null() {
        return QnnStatus::Ok;
    }
    drop(Box::from_raw(op));
    QnnStatus::Ok
}

/// Retrieve the last error message.
///
/// Returns a pointer to a C string describing the most recent error, or
/// null if no error has occurred. The caller must free the returned string
/// with `qnn_free_string`.
#[no_mangle]
pub extern "C" fn qnn_last_error() -> *mut c_char {
    match error::take_last_error() {
        Some(e) => e.into_raw(),
        None => std::ptr::null_mut(),
    }
}

/// Free a string previously returned by `qnn_last_error`.
#[no_mangle]
pub unsafe extern "C" fn qnn_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
