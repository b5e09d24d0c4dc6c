//! The device merge lattice.
//!
//! Two annotations combine to themselves when equal and to
//! [`DeviceState::Unknown`] otherwise. Operand merging adds one exception:
//! a zero-rank tensor on the host (an implicit scalar) adopts whatever
//! device it is combined with.

use devflow_ir::{Device, TensorType};

/// A device annotation as seen by the lattice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceState {
    Unknown,
    Known(Device),
}

impl From<Option<Device>> for DeviceState {
    fn from(device: Option<Device>) -> Self {
        match device {
            Some(d) => Self::Known(d),
            None => Self::Unknown,
        }
    }
}

impl From<DeviceState> for Option<Device> {
    fn from(state: DeviceState) -> Self {
        match state {
            DeviceState::Known(d) => Some(d),
            DeviceState::Unknown => None,
        }
    }
}

/// Symmetric merge used at control-flow joins.
pub fn merge(a: DeviceState, b: DeviceState) -> DeviceState {
    match (a, b) {
        (DeviceState::Known(x), DeviceState::Known(y)) if x == y => a,
        _ => DeviceState::Unknown,
    }
}

/// A tensor operand participating in device resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Operand {
    pub device: DeviceState,
    /// Zero-rank and known to be on the host.
    pub host_scalar: bool,
}

impl Operand {
    pub fn of(ty: &TensorType) -> Self {
        Self {
            device: ty.device.into(),
            host_scalar: is_host_scalar(ty),
        }
    }
}

/// Returns `true` for a tensor whose rank is known to be 0 and whose device
/// is known to be the host.
///
/// Unknown rank or unknown device never qualifies.
pub fn is_host_scalar(ty: &TensorType) -> bool {
    ty.rank() == Some(0) && ty.device.is_some_and(Device::is_cpu)
}

/// Folds `next` into the running resolution `acc`.
///
/// `acc.host_scalar` means "every operand folded so far was a host
/// scalar". Returns `None` when the operands disagree irreconcilably.
///
/// The exemption is consumed once: after a host-scalar group adopts a real
/// device, a later operand on a third device is a conflict even if the
/// group could have absorbed it.
pub fn merge_operand(acc: Operand, next: Operand) -> Option<Operand> {
    if acc.device == next.device || next.host_scalar {
        return Some(acc);
    }
    if acc.host_scalar {
        return Some(Operand {
            device: next.device,
            host_scalar: false,
        });
    }
    None
}
