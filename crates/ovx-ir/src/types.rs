//! Element types, quantization descriptors and tensor attributes.

use std::fmt;

/// Element data type of a tensor.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum DataType {
    F32,
    F16,
    BF16,
    I32,
    I16,
    I8,
    U8,
}

impl DataType {
    /// Width of one element in bytes.
    pub fn byte_width(self) -> usize {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::F16 | Self::BF16 | Self::I16 => 2,
            Self::I8 | Self::U8 => 1,
        }
    }

    /// Returns `true` for the floating-point types.
    pub fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F16 | Self::BF16)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::BF16 => "bf16",
            Self::I32 => "i32",
            Self::I16 => "i16",
            Self::I8 => "i8",
            Self::U8 => "u8",
        })
    }
}

/// The kind of a quantization scheme, without its parameters.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum QuantKind {
    None,
    AffineAsymmetric,
    AffineSymmetric,
    SymmetricFloat8,
    DynamicFixedPoint,
}

impl fmt::Display for QuantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::AffineAsymmetric => "affine-asymmetric",
            Self::AffineSymmetric => "affine-symmetric",
            Self::SymmetricFloat8 => "symmetric-float8",
            Self::DynamicFixedPoint => "dfp",
        })
    }
}

/// A quantization descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Quantization {
    #[default]
    None,
    AffineAsymmetric { scale: f32, zero_point: i32 },
    AffineSymmetric { scale: f32 },
    SymmetricFloat8 { scale: f32 },
    /// Fixed point with `fractional_bits` bits after the binary point.
    DynamicFixedPoint { fractional_bits: i8 },
}

impl Quantization {
    pub fn kind(&self) -> QuantKind {
        match self {
            Self::None => QuantKind::None,
            Self::AffineAsymmetric { .. } => QuantKind::AffineAsymmetric,
            Self::AffineSymmetric { .. } => QuantKind::AffineSymmetric,
            Self::SymmetricFloat8 { .. } => QuantKind::SymmetricFloat8,
            Self::DynamicFixedPoint { .. } => QuantKind::DynamicFixedPoint,
        }
    }

    /// The scale of a scale-based scheme, if any.
    pub fn scale(&self) -> Option<f32> {
        match *self {
            Self::AffineAsymmetric { scale, .. }
            | Self::AffineSymmetric { scale }
            | Self::SymmetricFloat8 { scale } => Some(scale),
            Self::None | Self::DynamicFixedPoint { .. } => None,
        }
    }

    /// The fraction length of a fixed-point scheme, if any.
    pub fn fractional_bits(&self) -> Option<i8> {
        match *self {
            Self::DynamicFixedPoint { fractional_bits } => Some(fractional_bits),
            _ => None,
        }
    }

    /// The zero point; 0 for schemes without one.
    pub fn zero_point(&self) -> i32 {
        match *self {
            Self::AffineAsymmetric { zero_point, .. } => zero_point,
            _ => 0,
        }
    }
}

/// Data type plus quantization.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DType {
    pub data_type: DataType,
    pub quant: Quantization,
}

impl DType {
    pub const F32: Self = Self::plain(DataType::F32);
    pub const F16: Self = Self::plain(DataType::F16);
    pub const I32: Self = Self::plain(DataType::I32);

    /// An unquantized dtype.
    pub const fn plain(data_type: DataType) -> Self {
        Self {
            data_type,
            quant: Quantization::None,
        }
    }

    /// A quantized dtype.
    pub const fn quantized(data_type: DataType, quant: Quantization) -> Self {
        Self { data_type, quant }
    }
}

impl Default for DType {
    fn default() -> Self {
        Self::F32
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.quant {
            Quantization::None => write!(f, "{}", self.data_type),
            Quantization::AffineAsymmetric { scale, zero_point } => {
                write!(f, "{}(scale={scale}, zp={zero_point})", self.data_type)
            }
            Quantization::AffineSymmetric { scale } | Quantization::SymmetricFloat8 { scale } => {
                write!(f, "{}(scale={scale})", self.data_type)
            }
            Quantization::DynamicFixedPoint { fractional_bits } => {
                write!(f, "{}(fl={fractional_bits})", self.data_type)
            }
        }
    }
}

/// Creation attributes of a tensor.
///
/// Dimension 0 is the innermost (fastest varying) axis. A `shape` of `None`
/// means AUTO: the producing operator's `setup` resolves it.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct TensorAttr {
    pub shape: Option<Vec<usize>>,
    pub dtype: DType,
    /// Storage is deferred until the compute walk needs it.
    pub is_virtual: bool,
    pub is_const: bool,
}

impl TensorAttr {
    /// A non-virtual tensor with a fixed shape.
    pub fn new(shape: &[usize], dtype: DType) -> Self {
        Self {
            shape: Some(shape.to_vec()),
            dtype,
            is_virtual: false,
            is_const: false,
        }
    }

    /// A non-virtual tensor whose shape is resolved by its producer.
    pub fn auto(dtype: DType) -> Self {
        Self {
            shape: None,
            dtype,
            is_virtual: false,
            is_const: false,
        }
    }

    /// A constant tensor with a fixed shape.
    pub fn constant(shape: &[usize], dtype: DType) -> Self {
        Self {
            is_const: true,
            ..Self::new(shape, dtype)
        }
    }

    /// Attributes for an intermediate tensor of an expansion.
    ///
    /// The shape is AUTO. A non-quantized integer dtype is widened to F16.
    pub fn internal(dtype: &DType, is_virtual: bool) -> Self {
        let dtype = if dtype.quant == Quantization::None && !dtype.data_type.is_float() {
            DType::F16
        } else {
            *dtype
        };
        Self {
            shape: None,
            dtype,
            is_virtual,
            is_const: false,
        }
    }

    pub fn with_shape(mut self, shape: &[usize]) -> Self {
        self.shape = Some(shape.to_vec());
        self
    }

    pub fn rank(&self) -> Option<usize> {
        self.shape.as_ref().map(Vec::len)
    }

    /// Number of elements, if the shape is resolved.
    pub fn element_count(&self) -> Option<usize> {
        self.shape.as_ref().map(|s| s.iter().product())
    }

    /// Size in bytes, if the shape is resolved.
    pub fn byte_size(&self) -> Option<usize> {
        self.element_count()
            .map(|n| n * self.dtype.data_type.byte_width())
    }
}

/// Formats a shape as `[a, b, c]`, or `AUTO`.
pub fn format_shape(shape: Option<&[usize]>) -> String {
    match shape {
        None => "AUTO".to_owned(),
        Some(dims) => {
            let dims: Vec<_> = dims.iter().map(|d| d.to_string()).collect();
            format!("[{}]", dims.join(", "))
        }
    }
}
