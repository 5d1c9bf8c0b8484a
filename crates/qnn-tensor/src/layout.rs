use std::fmt;

/// Axis ordering convention of a tensor's shape.
///
/// Channel-first layouts put the channel axis right after the batch axis,
/// channel-last layouts put it at the end. `Flat` describes tensors with no
/// spatial meaning (bias vectors, matrices, index vectors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Layout {
    Ncw,
    Nwc,
    #[default]
    Nchw,
    Nhwc,
    Ncdhw,
    Ndhwc,
    Flat,
}

impl Layout {
    pub fn is_channel_first(&self) -> bool {
        matches!(self, Layout::Ncw | Layout::Nchw | Layout::Ncdhw)
    }

    pub fn is_channel_last(&self) -> bool {
        matches!(self, Layout::Nwc | Layout::Nhwc | Layout::Ndhwc)
    }

    /// Number of spatial axes (1 for `Ncw`, 2 for `Nchw`, 3 for `Ncdhw`).
    /// `Flat` has none.
    pub fn spatial_rank(&self) -> usize {
        match self {
            Layout::Ncw | Layout::Nwc => 1,
            Layout::Nchw | Layout::Nhwc => 2,
            Layout::Ncdhw | Layout::Ndhwc => 3,
            Layout::Flat => 0,
        }
    }

    /// Rank a tensor in this layout is expected to have, or `None` for `Flat`.
    pub fn rank(&self) -> Option<usize> {
        match self {
            Layout::Flat => None,
            other => Some(other.spatial_rank() + 2),
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Layout::Ncw => "NCW",
            Layout::Nwc => "NWC",
            Layout::Nchw => "NCHW",
            Layout::Nhwc => "NHWC",
            Layout::Ncdhw => "NCDHW",
            Layout::Ndhwc => "NDHWC",
            Layout::Flat => "flat",
        };
        write!(f, "{}", s)
    }
}
