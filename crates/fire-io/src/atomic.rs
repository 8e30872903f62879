use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The closed set of primitive types a column can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtomicKind {
    Bool,
    U8,
    I32,
    I64,
    U32,
    U64,
    F32,
    F64,
    Str,
}

impl AtomicKind {
    /// Serialize to a type byte.
    pub fn type_byte(&self) -> u8 {
        match self {
            Self::Bool => 1,
            Self::U8 => 2,
            Self::I32 => 3,
            Self::I64 => 4,
            Self::U32 => 5,
            Self::U64 => 6,
            Self::F32 => 7,
            Self::F64 => 8,
            Self::Str => 9,
        }
    }

    /// Parse from a type byte.
    pub fn from_type_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Bool),
            2 => Some(Self::U8),
            3 => Some(Self::I32),
            4 => Some(Self::I64),
            5 => Some(Self::U32),
            6 => Some(Self::U64),
            7 => Some(Self::F32),
            8 => Some(Self::F64),
            9 => Some(Self::Str),
            _ => None,
        }
    }

    /// Rust spelling of the type, used in type names and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::U8 => "u8",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Str => "String",
        }
    }
}

impl fmt::Display for AtomicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One column value with its type attached.
///
/// Used wherever values move without a static type: pass-through copies and
/// dynamic decoding.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    U8(u8),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
}

impl Scalar {
    pub fn kind(&self) -> AtomicKind {
        match self {
            Self::Bool(_) => AtomicKind::Bool,
            Self::U8(_) => AtomicKind::U8,
            Self::I32(_) => AtomicKind::I32,
            Self::I64(_) => AtomicKind::I64,
            Self::U32(_) => AtomicKind::U32,
            Self::U64(_) => AtomicKind::U64,
            Self::F32(_) => AtomicKind::F32,
            Self::F64(_) => AtomicKind::F64,
            Self::Str(_) => AtomicKind::Str,
        }
    }

    /// The value a freshly cleared column entry of `kind` holds.
    pub fn default_for(kind: AtomicKind) -> Self {
        match kind {
            AtomicKind::Bool => Self::Bool(false),
            AtomicKind::U8 => Self::U8(0),
            AtomicKind::I32 => Self::I32(0),
            AtomicKind::I64 => Self::I64(0),
            AtomicKind::U32 => Self::U32(0),
            AtomicKind::U64 => Self::U64(0),
            AtomicKind::F32 => Self::F32(0.0),
            AtomicKind::F64 => Self::F64(0.0),
            AtomicKind::Str => Self::Str(String::new()),
        }
    }
}

/// A Rust type that maps one-to-one onto an [`AtomicKind`].
pub trait Atomic:
    Clone + Default + PartialEq + Serialize + DeserializeOwned + Send + 'static
{
    const KIND: AtomicKind;

    fn into_scalar(self) -> Scalar;

    fn from_scalar(scalar: Scalar) -> Option<Self>;
}

macro_rules! impl_atomic {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Atomic for $ty {
                const KIND: AtomicKind = AtomicKind::$variant;

                fn into_scalar(self) -> Scalar {
                    Scalar::$variant(self)
                }

                fn from_scalar(scalar: Scalar) -> Option<Self> {
                    match scalar {
                        Scalar::$variant(value) => Some(value),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_atomic! {
    bool => Bool,
    u8 => U8,
    i32 => I32,
    i64 => I64,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => Str,
}
