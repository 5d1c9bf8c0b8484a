use qnn_ops::{OpError, ResizeMode, Status};
use qnn_tensor::{DType, Layout};

/// Status codes returned by all FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QnnStatus {
    Ok = 0,
    UnsupportedLayout = 1,
    UnsupportedDtype = 2,
    CallbackUnset = 3,
    Unimplemented = 4,
    InvalidArgument = 5,
    Internal = 6,
}

impl From<Status> for QnnStatus {
    fn from(status: Status) -> Self {
        match status {
            Status::Success => QnnStatus::Ok,
            Status::UnsupportedLayout => QnnStatus::UnsupportedLayout,
            Status::UnsupportedDtype => QnnStatus::UnsupportedDtype,
            Status::CallbackUnset => QnnStatus::CallbackUnset,
            Status::Unimplemented => QnnStatus::Unimplemented,
            Status::InvalidArgument => QnnStatus::InvalidArgument,
        }
    }
}

impl From<&OpError> for QnnStatus {
    fn from(err: &OpError) -> Self {
        err.status().into()
    }
}

/// Element type of a tensor handle.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QnnDType {
    F32 = 0,
    F16 = 1,
    U8 = 2,
    I8 = 3,
    I32 = 4,
}

impl From<QnnDType> for DType {
    fn from(dtype: QnnDType) -> Self {
        match dtype {
            QnnDType::F32 => DType::F32,
            QnnDType::F16 => DType::F16,
            QnnDType::U8 => DType::U8,
            QnnDType::I8 => DType::I8,
            QnnDType::I32 => DType::I32,
        }
    }
}

/// Axis ordering of a tensor handle, and the layout an operator runs in.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QnnLayout {
    Ncw = 0,
    Nwc = 1,
    Nchw = 2,
    Nhwc = 3,
    Ncdhw = 4,
    Ndhwc = 5,
    Flat = 6,
}

impl From<QnnLayout> for Layout {
    fn from(layout: QnnLayout) -> Self {
        match layout {
            QnnLayout::Ncw => Layout::Ncw,
            QnnLayout::Nwc => Layout::Nwc,
            QnnLayout::Nchw => Layout::Nchw,
            QnnLayout::Nhwc => Layout::Nhwc,
            QnnLayout::Ncdhw => Layout::Ncdhw,
            QnnLayout::Ndhwc => Layout::Ndhwc,
            QnnLayout::Flat => Layout::Flat,
        }
    }
}

/// Which 2-D convolution a conv handle runs. Plain convolutions are
/// re-derived to depthwise or grouped at init.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QnnConvVariant {
    Conv = 0,
    ConvRelu = 1,
    Deconv = 2,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QnnPoolKind {
    Max = 0,
    Avg = 1,
    GlobalMax = 2,
    GlobalAvg = 3,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QnnReluKind {
    Relu = 0,
    Relu1 = 1,
    Relu6 = 2,
    ReluN = 3,
    LeakyRelu = 4,
    Elu = 5,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QnnBinaryKind {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Div = 3,
    FloorDivide = 4,
    Maximum = 5,
    Minimum = 6,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QnnResizeMode {
    Bilinear = 0,
    NearestNeighbor = 1,
    Bicubic = 2,
}

impl From<QnnResizeMode> for ResizeMode {
    fn from(mode: QnnResizeMode) -> Self {
        match mode {
            QnnResizeMode::Bilinear => ResizeMode::Bilinear,
            QnnResizeMode::NearestNeighbor => ResizeMode::NearestNeighbor,
            QnnResizeMode::Bicubic => ResizeMode::Bicubic,
        }
    }
}

/// Geometry of a 2-D convolution handle.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct QnnConv2dDesc {
    pub layout: QnnLayout,
    pub variant: QnnConvVariant,
    pub stride_h: usize,
    pub stride_w: usize,
    pub pad_top: usize,
    pub pad_left: usize,
    pub pad_down: usize,
    pub pad_right: usize,
    pub dilation_h: usize,
    pub dilation_w: usize,
    pub group: usize,
}

impl Default for QnnConv2dDesc {
    fn default() -> Self {
        Self {
            layout: QnnLayout::Nchw,
            variant: QnnConvVariant::Conv,
            stride_h: 1,
            stride_w: 1,
            pad_top: 0,
            pad_left: 0,
            pad_down: 0,
            pad_right: 0,
            dilation_h: 1,
            dilation_w: 1,
            group: 1,
        }
    }
}

/// Window of a 2-D pooling handle. Global pools ignore the window fields.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct QnnPool2dDesc {
    pub layout: QnnLayout,
    pub kind: QnnPoolKind,
    pub filter_h: usize,
    pub filter_w: usize,
    pub stride_h: usize,
    pub stride_w: usize,
    pub pad_top: usize,
    pub pad_left: usize,
    pub pad_down: usize,
    pub pad_right: usize,
    pub count_include_pad: bool,
}

impl Default for QnnPool2dDesc {
    fn default() -> Self {
        Self {
            layout: QnnLayout::Nchw,
            kind: QnnPoolKind::Max,
            filter_h: 1,
            filter_w: 1,
            stride_h: 1,
            stride_w: 1,
            pad_top: 0,
            pad_left: 0,
            pad_down: 0,
            pad_right: 0,
            count_include_pad: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnn_ops::OpKind;

    #[test]
    fn test_status_from_op_error() {
        let err = OpError::UnsupportedDtype {
            op: OpKind::Conv2d,
            dtype: DType::I32,
            layout: Layout::Nchw,
        };
        assert_eq!(QnnStatus::from(&err), QnnStatus::UnsupportedDtype);
        assert_eq!(QnnStatus::from(Status::Success), QnnStatus::Ok);
        assert_eq!(QnnStatus::Internal as i32, 6);
    }

    #[test]
    fn test_c_enums_map_onto_library_types() {
        assert_eq!(Layout::from(QnnLayout::Ndhwc), Layout::Ndhwc);
        assert_eq!(DType::from(QnnDType::I8), DType::I8);
        assert_eq!(ResizeMode::from(QnnResizeMode::NearestNeighbor), ResizeMode::NearestNeighbor);
        assert_eq!(QnnPool2dDesc::default().stride_h, 1);
    }
}
