//! Bind values and variable metadata.

/// Direction of a bind parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindDirection {
    /// Value is sent to the server.
    #[default]
    In,
    /// Value is returned by the server.
    Out,
    /// Value is sent and a new value is returned.
    InOut,
}

/// Database types a bind variable can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OraType {
    /// VARCHAR2.
    #[default]
    Varchar,
    /// NUMBER.
    Number,
    /// BINARY_DOUBLE.
    BinaryDouble,
    /// RAW.
    Raw,
    /// DATE.
    Date,
    /// TIMESTAMP.
    Timestamp,
    /// BOOLEAN (PL/SQL and 23ai SQL).
    Boolean,
    /// CLOB.
    Clob,
    /// BLOB.
    Blob,
    /// REF CURSOR.
    Cursor,
}

impl OraType {
    /// Whether binding this type forces a full execute round trip.
    #[must_use]
    pub fn requires_full_execute(&self) -> bool {
        matches!(self, Self::Cursor)
    }
}

/// A single bind or column value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// SQL NULL.
    #[default]
    Null,
    /// Character data.
    String(String),
    /// Integral number.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Binary data.
    Bytes(Vec<u8>),
    /// Boolean.
    Boolean(bool),
}

impl Value {
    /// Infer the database type for this value.
    #[must_use]
    pub fn ora_type(&self) -> OraType {
        match self {
            Self::Null | Self::String(_) => OraType::Varchar,
            Self::Integer(_) => OraType::Number,
            Self::Float(_) => OraType::BinaryDouble,
            Self::Bytes(_) => OraType::Raw,
            Self::Boolean(_) => OraType::Boolean,
        }
    }

    /// Size in bytes needed to transmit the value.
    #[must_use]
    pub fn size(&self) -> u32 {
        match self {
            Self::Null => 0,
            Self::String(s) => s.len() as u32,
            Self::Bytes(b) => b.len() as u32,
            Self::Integer(_) | Self::Float(_) => 22,
            Self::Boolean(_) => 4,
        }
    }

    /// Whether this value is SQL NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

/// A bind variable: values plus the metadata describing their shape.
///
/// The shape (type, direction, size, array-ness) decides whether a cached
/// statement can be re-executed or needs a full execute.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Values bound (one for scalar binds, many for array binds).
    pub values: Vec<Value>,
    /// Database type.
    pub ora_type: OraType,
    /// Bind direction.
    pub direction: BindDirection,
    /// Maximum size of a single value in bytes.
    pub max_size: u32,
    /// Whether this is a PL/SQL array bind.
    pub is_array: bool,
    /// Maximum number of array elements.
    pub max_array_size: u32,
}

impl Variable {
    /// Create an IN variable for a single value.
    #[must_use]
    pub fn input(value: Value) -> Self {
        Self {
            ora_type: value.ora_type(),
            max_size: value.size(),
            values: vec![value],
            direction: BindDirection::In,
            is_array: false,
            max_array_size: 0,
        }
    }

    /// Create an OUT variable of the given type and size.
    #[must_use]
    pub fn output(ora_type: OraType, max_size: u32) -> Self {
        Self {
            values: vec![Value::Null],
            ora_type,
            direction: BindDirection::Out,
            max_size,
            is_array: false,
            max_array_size: 0,
        }
    }

    /// Create an IN OUT variable.
    #[must_use]
    pub fn input_output(value: Value, max_size: u32) -> Self {
        Self {
            ora_type: value.ora_type(),
            values: vec![value],
            direction: BindDirection::InOut,
            max_size,
            is_array: false,
            max_array_size: 0,
        }
    }

    /// Create an IN array variable.
    #[must_use]
    pub fn array(values: Vec<Value>, ora_type: OraType, max_array_size: u32) -> Self {
        let max_size = values.iter().map(Value::size).max().unwrap_or(0);
        Self {
            values,
            ora_type,
            direction: BindDirection::In,
            max_size,
            is_array: true,
            max_array_size,
        }
    }
}

impl From<Value> for Variable {
    fn from(value: Value) -> Self {
        Self::input(value)
    }
}
