//! State shared by every operator parameter record.

use std::fmt;

use log::{debug, log_enabled, trace, Level};
use qnn_tensor::{DType, Layout, Tensor};

use crate::backend::{Api, KernelProvider};
use crate::error::{OpError, Result};
use crate::registry::OpKind;

/// Common header of every parameter record: a diagnostic name, the layout
/// the operator runs in and the provider kernels are bound from.
#[derive(Debug, Clone, Default)]
pub struct OpBase {
    pub name: String,
    pub layout: Layout,
    pub api: Api,
}

impl OpBase {
    pub fn new(layout: Layout) -> Self {
        OpBase {
            name: String::new(),
            layout,
            api: Api::Reference,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_api(mut self, api: Api) -> Self {
        self.api = api;
        self
    }

    pub(crate) fn provider(&self) -> &'static dyn KernelProvider {
        self.api.provider()
    }

    /// Error unless the record's layout is one of `accepted`.
    pub(crate) fn expect_layout(&self, op: OpKind, accepted: &[Layout]) -> Result<()> {
        if accepted.contains(&self.layout) {
            Ok(())
        } else {
            Err(OpError::UnsupportedLayout {
                op,
                layout: self.layout,
            })
        }
    }

    /// Debug hook run before every kernel invocation.
    pub(crate) fn trace_invoke(&self, op: OpKind, inputs: &[&Tensor], outputs: &[&Tensor]) {
        if !log_enabled!(Level::Debug) {
            return;
        }
        let describe = |ts: &[&Tensor]| {
            ts.iter()
                .map(|t| format!("{}:{}", t.shape(), t.dtype()))
                .collect::<Vec<_>>()
                .join(" ")
        };
        debug!(
            "{} '{}' [{}]: {} -> {}",
            op,
            self.name,
            self.layout,
            describe(inputs),
            describe(outputs)
        );
    }
}

/// The kernel bound into a parameter record by init.
///
/// Empty at construction; `bind` fills it and invoke reads it.
#[derive(Clone, Copy)]
pub struct KernelSlot<F> {
    kernel: Option<F>,
}

impl<F: Copy> KernelSlot<F> {
    pub const fn empty() -> Self {
        KernelSlot { kernel: None }
    }

    pub fn is_bound(&self) -> bool {
        self.kernel.is_some()
    }

    pub fn get(&self) -> Option<F> {
        self.kernel
    }

    /// Store the result of a registry lookup, or report the miss as an
    /// unsupported dtype. A failed bind leaves the slot unchanged.
    pub(crate) fn bind(
        &mut self,
        op: OpKind,
        base: &OpBase,
        dtype: DType,
        found: Option<F>,
    ) -> Result<()> {
        match found {
            Some(kernel) => {
                trace!(
                    "{}: bound {} kernel for {} {} from '{}'",
                    base.name,
                    op,
                    dtype,
                    base.layout,
                    base.provider().name()
                );
                self.kernel = Some(kernel);
                Ok(())
            }
            None => Err(OpError::UnsupportedDtype {
                op,
                dtype,
                layout: base.layout,
            }),
        }
    }

    /// The bound kernel, or `CallbackUnset` if init never succeeded.
    pub(crate) fn bound(&self, op: OpKind) -> Result<F> {
        self.kernel.ok_or(OpError::CallbackUnset { op })
    }
}

impl<F: Copy> Default for KernelSlot<F> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<F> fmt::Debug for KernelSlot<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.kernel.is_some() { "KernelSlot(bound)" } else { "KernelSlot(unset)" })
    }
}
