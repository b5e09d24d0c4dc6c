//! Type system for the devflow IR.
//!
//! Only [`TensorType`] carries placement information. Every other type
//! exists so operator schemas can be matched against node inputs.

use std::str::FromStr;

use crate::error::IrError;

/// The class of compute unit a tensor can live on.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum DeviceKind {
    /// Host memory.
    Cpu,
    /// NVIDIA GPU.
    Cuda,
    /// AMD GPU.
    Hip,
    /// Apple Metal.
    Mps,
    /// Intel GPU.
    Xpu,
    /// Shape-only placeholder device; holds no data.
    Meta,
}

impl DeviceKind {
    /// The lowercase name used in the textual IR.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
            Self::Hip => "hip",
            Self::Mps => "mps",
            Self::Xpu => "xpu",
            Self::Meta => "meta",
        }
    }
}

impl FromStr for DeviceKind {
    type Err = IrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "cpu" => Self::Cpu,
            "cuda" => Self::Cuda,
            "hip" => Self::Hip,
            "mps" => Self::Mps,
            "xpu" => Self::Xpu,
            "meta" => Self::Meta,
            _ => return Err(IrError::InvalidDevice(s.to_string())),
        })
    }
}

/// A concrete compute location: a device kind plus an optional ordinal.
///
/// `cuda` and `cuda:0` are distinct devices; no implicit "current device"
/// is assumed.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct Device {
    pub kind: DeviceKind,
    pub index: Option<u16>,
}

impl Device {
    /// The default host location.
    pub const CPU: Self = Self {
        kind: DeviceKind::Cpu,
        index: None,
    };

    pub fn new(kind: DeviceKind, index: Option<u16>) -> Self {
        Self { kind, index }
    }

    /// Shorthand for `cuda:<index>`.
    pub fn cuda(index: u16) -> Self {
        Self::new(DeviceKind::Cuda, Some(index))
    }

    /// Returns `true` for the default host location, whatever its ordinal.
    pub fn is_cpu(self) -> bool {
        self.kind == DeviceKind::Cpu
    }
}

impl FromStr for Device {
    type Err = IrError;

    /// Parses `kind` or `kind:index`, e.g. `cpu`, `cuda:1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || IrError::InvalidDevice(s.to_string());
        match s.split_once(':') {
            None => Ok(Self::new(s.parse().map_err(|_| invalid())?, None)),
            Some((kind, index)) => {
                let kind = kind.parse().map_err(|_| invalid())?;
                let index = index.parse::<u16>().map_err(|_| invalid())?;
                Ok(Self::new(kind, Some(index)))
            }
        }
    }
}

/// Element type of a tensor.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ScalarType {
    Bool,
    U8,
    I8,
    I32,
    I64,
    F16,
    BF16,
    F32,
    F64,
}

impl ScalarType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F16 => "f16",
            Self::BF16 => "bf16",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }
}

impl FromStr for ScalarType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "bool" => Self::Bool,
            "u8" => Self::U8,
            "i8" => Self::I8,
            "i32" => Self::I32,
            "i64" => Self::I64,
            "f16" => Self::F16,
            "bf16" => Self::BF16,
            "f32" => Self::F32,
            "f64" => Self::F64,
            _ => return Err(()),
        })
    }
}

/// A tensor dimension: known at compile time or not.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Dimension {
    Fixed(u64),
    Dynamic,
}

/// A tensor shape whose rank is known.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct TensorShape {
    pub dims: Vec<Dimension>,
}

impl TensorShape {
    /// A zero-dimensional (scalar-shaped) tensor.
    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    pub fn fixed(dims: &[u64]) -> Self {
        Self {
            dims: dims.iter().map(|&d| Dimension::Fixed(d)).collect(),
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }
}

/// A refined tensor type. Every field is optional; `None` means "not known".
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct TensorType {
    pub dtype: Option<ScalarType>,
    pub shape: Option<TensorShape>,
    pub device: Option<Device>,
}

impl TensorType {
    /// A tensor type with only its device refined.
    pub fn on(device: Device) -> Self {
        Self {
            device: Some(device),
            ..Self::default()
        }
    }

    /// Returns the same type refined with `shape`.
    pub fn with_shape(mut self, shape: TensorShape) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Returns the same type refined with `dtype`.
    pub fn with_dtype(mut self, dtype: ScalarType) -> Self {
        self.dtype = Some(dtype);
        self
    }

    /// Returns a copy that differs from `self` only in its device.
    pub fn with_device(&self, device: Option<Device>) -> Self {
        Self {
            device,
            ..self.clone()
        }
    }

    /// Number of dimensions, if the shape is known.
    pub fn rank(&self) -> Option<usize> {
        self.shape.as_ref().map(TensorShape::rank)
    }
}

/// The type of a graph value.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum Type {
    Tensor(TensorType),
    Int,
    Float,
    /// Either an `int` or a `float`.
    Number,
    Bool,
    Str,
    Device,
    NoneType,
    /// Top type; every type is a subtype of `Any`.
    Any,
    Optional(Box<Type>),
    List(Box<Type>),
    Union(Vec<Type>),
}

impl Type {
    /// An unrefined tensor type.
    pub fn tensor() -> Self {
        Self::Tensor(TensorType::default())
    }

    pub fn optional(inner: Type) -> Self {
        Self::Optional(Box::new(inner))
    }

    pub fn list(element: Type) -> Self {
        Self::List(Box::new(element))
    }

    pub fn as_tensor(&self) -> Option<&TensorType> {
        match self {
            Self::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_tensor(&self) -> bool {
        matches!(self, Self::Tensor(_))
    }

    /// Returns `true` if a value of type `self` may be passed where `other`
    /// is expected.
    ///
    /// Tensor refinements (dtype, shape, device) never affect subtyping.
    pub fn is_subtype_of(&self, other: &Type) -> bool {
        match (self, other) {
            (_, Self::Any) => true,
            (Self::Union(members), _) => members.iter().all(|m| m.is_subtype_of(other)),
            (_, Self::Union(members)) => members.iter().any(|m| self.is_subtype_of(m)),
            (Self::Optional(a), Self::Optional(b)) => a.is_subtype_of(b),
            (Self::NoneType, Self::Optional(_)) => true,
            (_, Self::Optional(inner)) => self.is_subtype_of(inner),
            (Self::List(a), Self::List(b)) => a.is_subtype_of(b),
            (Self::Tensor(_), Self::Tensor(_)) => true,
            (Self::Int | Self::Float, Self::Number) => true,
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

/// A compile-time constant carried by a `prim::Constant` node.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Device(Device),
}

impl Constant {
    /// The type of the value this constant produces.
    pub fn ty(&self) -> Type {
        match self {
            Self::None => Type::NoneType,
            Self::Bool(_) => Type::Bool,
            Self::Int(_) => Type::Int,
            Self::Float(_) => Type::Float,
            Self::Str(_) => Type::Str,
            Self::Device(_) => Type::Device,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_devices() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::CPU);
        assert_eq!("cuda:1".parse::<Device>().unwrap(), Device::cuda(1));
        assert_eq!(
            "mps".parse::<Device>().unwrap(),
            Device::new(DeviceKind::Mps, None)
        );
        assert!("tpu:0".parse::<Device>().is_err());
        assert!("cuda:x".parse::<Device>().is_err());
        assert!("cuda:".parse::<Device>().is_err());
    }

    #[test]
    fn ordinal_is_part_of_identity() {
        assert_ne!(Device::new(DeviceKind::Cuda, None), Device::cuda(0));
        assert_ne!(Device::cuda(0), Device::cuda(1));
        assert!(Device::new(DeviceKind::Cpu, Some(0)).is_cpu());
        assert!(!Device::cuda(0).is_cpu());
    }

    #[test]
    fn rank_requires_known_shape() {
        assert_eq!(TensorType::default().rank(), None);
        let scalar = TensorType::on(Device::CPU).with_shape(TensorShape::scalar());
        assert_eq!(scalar.rank(), Some(0));
        let matrix = TensorType::default().with_shape(TensorShape::fixed(&[2, 3]));
        assert_eq!(matrix.rank(), Some(2));
    }

    #[test]
    fn with_device_keeps_other_fields() {
        let ty = TensorType::on(Device::CPU)
            .with_dtype(ScalarType::F32)
            .with_shape(TensorShape::fixed(&[4]));
        let moved = ty.with_device(Some(Device::cuda(0)));
        assert_eq!(moved.dtype, Some(ScalarType::F32));
        assert_eq!(moved.shape, ty.shape);
        assert_eq!(moved.device, Some(Device::cuda(0)));
        assert_eq!(ty.with_device(None).device, None);
    }

    #[test]
    fn device_subtyping() {
        let optional_device = Type::optional(Type::Device);
        assert!(Type::Device.is_subtype_of(&Type::Device));
        assert!(Type::Device.is_subtype_of(&optional_device));
        assert!(Type::NoneType.is_subtype_of(&optional_device));
        assert!(Type::Device.is_subtype_of(&Type::Union(vec![Type::Str, Type::Device])));
        assert!(Type::Device.is_subtype_of(&Type::Any));
        assert!(!Type::Device.is_subtype_of(&Type::Str));
        assert!(!Type::Device.is_subtype_of(&Type::tensor()));
    }

    #[test]
    fn structural_subtyping() {
        let refined = Type::Tensor(TensorType::on(Device::cuda(0)));
        assert!(refined.is_subtype_of(&Type::tensor()));
        assert!(Type::list(refined.clone()).is_subtype_of(&Type::list(Type::tensor())));
        assert!(Type::Int.is_subtype_of(&Type::Number));
        assert!(!Type::Bool.is_subtype_of(&Type::Number));
        assert!(Type::optional(Type::Int).is_subtype_of(&Type::optional(Type::Number)));
        assert!(!Type::optional(Type::Int).is_subtype_of(&Type::Int));
        let union = Type::Union(vec![Type::Int, Type::Float]);
        assert!(union.is_subtype_of(&Type::Number));
        assert!(!union.is_subtype_of(&Type::Int));
    }

    #[test]
    fn constant_types() {
        assert_eq!(Constant::None.ty(), Type::NoneType);
        assert_eq!(Constant::Device(Device::CPU).ty(), Type::Device);
        assert_eq!(Constant::Float(0.5).ty(), Type::Float);
    }
}
