use std::cell::RefCell;
use std::ffi::CString;

use qnn_ops::OpError;
use qnn_tensor::TensorError;

use crate::types::QnnStatus;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Store an error message for later retrieval via `qnn_last_error`.
pub fn set_last_error(msg: String) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Take the last error message, leaving `None` in its place.
pub fn take_last_error() -> Option<CString> {
    LAST_ERROR.with(|e| e.borrow_mut().take())
}

/// Record `err` as the last error and return its status.
pub(crate) fn report_op(err: OpError) -> QnnStatus {
    let status = QnnStatus::from(&err);
    set_last_error(err.to_string());
    status
}

pub(crate) fn report_tensor(err: TensorError) -> QnnStatus {
    set_last_error(err.to_string());
    QnnStatus::InvalidArgument
}

pub(crate) fn invalid_argument(msg: &str) -> QnnStatus {
    set_last_error(msg.to_string());
    QnnStatus::InvalidArgument
}
