use qnn_tensor::{DType, Layout, TensorError};
use thiserror::Error;

use crate::registry::OpKind;

/// Errors returned by operator init and invoke.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OpError {
    #[error("{op}: unsupported layout {layout}")]
    UnsupportedLayout { op: OpKind, layout: Layout },

    #[error("{op}: no kernel for dtype {dtype} in layout {layout}")]
    UnsupportedDtype {
        op: OpKind,
        dtype: DType,
        layout: Layout,
    },

    #[error("{op}: invoked before a successful init")]
    CallbackUnset { op: OpKind },

    #[error("{op}: {variant} is not implemented")]
    Unimplemented { op: OpKind, variant: String },

    #[error("{op}: {reason}")]
    InvalidParams { op: OpKind, reason: String },

    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}

/// Convenience type alias for Results with OpError.
pub type Result<T> = std::result::Result<T, OpError>;

/// Flat status code for an operator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    UnsupportedLayout,
    UnsupportedDtype,
    CallbackUnset,
    Unimplemented,
    InvalidArgument,
}

impl OpError {
    pub fn status(&self) -> Status {
        match self {
            OpError::UnsupportedLayout { .. } => Status::UnsupportedLayout,
            OpError::UnsupportedDtype { .. } => Status::UnsupportedDtype,
            OpError::CallbackUnset { .. } => Status::CallbackUnset,
            OpError::Unimplemented { .. } => Status::Unimplemented,
            OpError::InvalidParams { .. } | OpError::Tensor(_) => Status::InvalidArgument,
        }
    }

    pub(crate) fn invalid(op: OpKind, reason: impl Into<String>) -> Self {
        OpError::InvalidParams {
            op,
            reason: reason.into(),
        }
    }

    pub(crate) fn unimplemented(op: OpKind, variant: impl Into<String>) -> Self {
        OpError::Unimplemented {
            op,
            variant: variant.into(),
        }
    }
}

impl Status {
    /// Status of a finished call.
    pub fn of<T>(result: &Result<T>) -> Status {
        match result {
            Ok(_) => Status::Success,
            Err(e) => e.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = OpError::UnsupportedLayout {
            op: OpKind::Conv2d,
            layout: Layout::Ncdhw,
        };
        assert_eq!(err.status(), Status::UnsupportedLayout);
        assert_eq!(err.to_string(), "conv2d: unsupported layout NCDHW");

        let err: OpError = TensorError::Other("bad".into()).into();
        assert_eq!(err.status(), Status::InvalidArgument);

        assert_eq!(Status::of(&Ok::<(), OpError>(())), Status::Success);
        assert_eq!(
            Status::of::<()>(&Err(OpError::CallbackUnset { op: OpKind::Relu })),
            Status::CallbackUnset
        );
    }
}
