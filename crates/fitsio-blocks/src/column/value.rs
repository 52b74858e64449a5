//! Column element types and the values a column store accepts.

/// Element type of a binary table column, named after its `TFORM` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// `L`: stored as `T`, `F`, or 0 for null.
    Logical,
    /// `B`: unsigned byte.
    Byte,
    /// `B` with `TZERO = -128`.
    SignedByte,
    /// `I`: 16-bit integer.
    Short,
    /// `J`: 32-bit integer.
    Int,
    /// `K`: 64-bit integer.
    Long,
    /// `E`: 32-bit IEEE float.
    Float,
    /// `D`: 64-bit IEEE float.
    Double,
}

impl ScalarType {
    pub fn tform_char(self) -> char {
        match self {
            ScalarType::Logical => 'L',
            ScalarType::Byte | ScalarType::SignedByte => 'B',
            ScalarType::Short => 'I',
            ScalarType::Int => 'J',
            ScalarType::Long => 'K',
            ScalarType::Float => 'E',
            ScalarType::Double => 'D',
        }
    }

    /// Width of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            ScalarType::Logical | ScalarType::Byte | ScalarType::SignedByte => 1,
            ScalarType::Short => 2,
            ScalarType::Int | ScalarType::Float => 4,
            ScalarType::Long | ScalarType::Double => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarType::Logical => "logical",
            ScalarType::Byte => "byte",
            ScalarType::SignedByte => "signed byte",
            ScalarType::Short => "short",
            ScalarType::Int => "int",
            ScalarType::Long => "long",
            ScalarType::Float => "float",
            ScalarType::Double => "double",
        }
    }

    /// The `(min, max)` representable values of an integer type, in the
    /// logical (not stored) domain.
    pub fn integer_range(self) -> Option<(i64, i64)> {
        match self {
            ScalarType::Byte => Some((0, u8::MAX as i64)),
            ScalarType::SignedByte => Some((i8::MIN as i64, i8::MAX as i64)),
            ScalarType::Short => Some((i16::MIN as i64, i16::MAX as i64)),
            ScalarType::Int => Some((i32::MIN as i64, i32::MAX as i64)),
            ScalarType::Long => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    /// `TZERO` offset applied when storing, if any.
    pub fn zero_offset(self) -> Option<i64> {
        match self {
            ScalarType::SignedByte => Some(-128),
            _ => None,
        }
    }
}

/// The shape of values a column holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    Scalar(ScalarType),
    /// Strings, stored at the width of the longest value.
    String,
    /// Arrays with the same dimensions in every row, fastest-varying first.
    FixedArray { element: ScalarType, shape: Vec<usize> },
    /// Arrays whose length varies by row, stored at the longest length.
    VariableArray { element: ScalarType },
}

impl ColumnKind {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnKind::Scalar(t) => t.name(),
            ColumnKind::String => "string",
            ColumnKind::FixedArray { .. } => "fixed array",
            ColumnKind::VariableArray { .. } => "variable array",
        }
    }
}

/// One cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Logical(bool),
    Byte(u8),
    SignedByte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    LogicalArray(Vec<bool>),
    ByteArray(Vec<u8>),
    SignedByteArray(Vec<i8>),
    ShortArray(Vec<i16>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
    FloatArray(Vec<f32>),
    DoubleArray(Vec<f64>),
}

impl ColumnValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnValue::Null => "null",
            ColumnValue::Logical(_) => "logical",
            ColumnValue::Byte(_) => "byte",
            ColumnValue::SignedByte(_) => "signed byte",
            ColumnValue::Short(_) => "short",
            ColumnValue::Int(_) => "int",
            ColumnValue::Long(_) => "long",
            ColumnValue::Float(_) => "float",
            ColumnValue::Double(_) => "double",
            ColumnValue::String(_) => "string",
            ColumnValue::LogicalArray(_) => "logical array",
            ColumnValue::ByteArray(_) => "byte array",
            ColumnValue::SignedByteArray(_) => "signed byte array",
            ColumnValue::ShortArray(_) => "short array",
            ColumnValue::IntArray(_) => "int array",
            ColumnValue::LongArray(_) => "long array",
            ColumnValue::FloatArray(_) => "float array",
            ColumnValue::DoubleArray(_) => "double array",
        }
    }

    /// Integer scalar in the logical domain, if this value is one of `ty`.
    pub(crate) fn integer_of(&self, ty: ScalarType) -> Option<i64> {
        match (self, ty) {
            (ColumnValue::Byte(v), ScalarType::Byte) => Some(*v as i64),
            (ColumnValue::SignedByte(v), ScalarType::SignedByte) => Some(*v as i64),
            (ColumnValue::Short(v), ScalarType::Short) => Some(*v as i64),
            (ColumnValue::Int(v), ScalarType::Int) => Some(*v as i64),
            (ColumnValue::Long(v), ScalarType::Long) => Some(*v),
            _ => None,
        }
    }
}

macro_rules! impl_from_value {
    ($($t:ty => $variant:ident),* $(,)?) => {$(
        impl From<$t> for ColumnValue {
            fn from(v: $t) -> Self {
                ColumnValue::$variant(v)
            }
        }
    )*};
}

impl_from_value!(
    bool => Logical,
    u8 => Byte,
    i8 => SignedByte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => String,
    Vec<bool> => LogicalArray,
    Vec<u8> => ByteArray,
    Vec<i8> => SignedByteArray,
    Vec<i16> => ShortArray,
    Vec<i32> => IntArray,
    Vec<i64> => LongArray,
    Vec<f32> => FloatArray,
    Vec<f64> => DoubleArray,
);

impl From<&str> for ColumnValue {
    fn from(v: &str) -> Self {
        ColumnValue::String(String::from(v))
    }
}

impl<T: Into<ColumnValue>> From<Option<T>> for ColumnValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ColumnValue::Null, Into::into)
    }
}

/// Descriptive metadata written alongside a column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub ucd: Option<String>,
    pub utype: Option<String>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>) -> Self {
        ColumnInfo {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn ucd(mut self, ucd: impl Into<String>) -> Self {
        self.ucd = Some(ucd.into());
        self
    }

    pub fn utype(mut self, utype: impl Into<String>) -> Self {
        self.utype = Some(utype.into());
        self
    }
}
