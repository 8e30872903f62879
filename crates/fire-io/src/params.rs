//! Dynamically typed parameter bags attached to headers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::atomic::AtomicKind;
use crate::codec::{Loader, Saver, Storable, SIZE_KIND};
use crate::error::{StorageError, StorageResult};
use crate::schema::{FieldKind, RESERVED_SIZE};

/// Leaf columns of a parameter bag, relative to the bag's path.
///
/// Every entry writes `name` and `tag`; the value goes to the one column
/// family its tag selects.
pub(crate) const PARAMETER_COLUMNS: [(&str, AtomicKind); 12] = [
    (RESERVED_SIZE, AtomicKind::U64),
    ("name", AtomicKind::Str),
    ("tag", AtomicKind::U8),
    ("int", AtomicKind::I64),
    ("float", AtomicKind::F64),
    ("string", AtomicKind::Str),
    ("int_vec/size", AtomicKind::U64),
    ("int_vec/data", AtomicKind::I64),
    ("float_vec/size", AtomicKind::U64),
    ("float_vec/data", AtomicKind::F64),
    ("string_vec/size", AtomicKind::U64),
    ("string_vec/data", AtomicKind::Str),
];

static STR_KIND: FieldKind = FieldKind::Atomic(AtomicKind::Str);
static U8_KIND: FieldKind = FieldKind::Atomic(AtomicKind::U8);
static I64_KIND: FieldKind = FieldKind::Atomic(AtomicKind::I64);
static F64_KIND: FieldKind = FieldKind::Atomic(AtomicKind::F64);

/// Stored type tag of one parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParameterTag {
    Int,
    Float,
    Str,
    IntVec,
    FloatVec,
    StrVec,
}

impl ParameterTag {
    pub fn type_byte(&self) -> u8 {
        match self {
            Self::Int => 1,
            Self::Float => 2,
            Self::Str => 3,
            Self::IntVec => 4,
            Self::FloatVec => 5,
            Self::StrVec => 6,
        }
    }

    pub fn from_type_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Int),
            2 => Some(Self::Float),
            3 => Some(Self::Str),
            4 => Some(Self::IntVec),
            5 => Some(Self::FloatVec),
            6 => Some(Self::StrVec),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "string",
            Self::IntVec => "int vector",
            Self::FloatVec => "float vector",
            Self::StrVec => "string vector",
        };
        f.write_str(name)
    }
}

/// One parameter value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Parameter {
    Int(i64),
    Float(f64),
    Str(String),
    IntVec(Vec<i64>),
    FloatVec(Vec<f64>),
    StrVec(Vec<String>),
}

impl Parameter {
    pub fn tag(&self) -> ParameterTag {
        match self {
            Self::Int(_) => ParameterTag::Int,
            Self::Float(_) => ParameterTag::Float,
            Self::Str(_) => ParameterTag::Str,
            Self::IntVec(_) => ParameterTag::IntVec,
            Self::FloatVec(_) => ParameterTag::FloatVec,
            Self::StrVec(_) => ParameterTag::StrVec,
        }
    }
}

/// A Rust type that can be stored in a [`ParameterStorage`].
pub trait ParameterValue: Sized {
    const TAG: ParameterTag;

    fn wrap(self) -> Parameter;

    fn peek(parameter: &Parameter) -> Option<&Self>;
}

macro_rules! impl_parameter_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ParameterValue for $ty {
                const TAG: ParameterTag = ParameterTag::$variant;

                fn wrap(self) -> Parameter {
                    Parameter::$variant(self)
                }

                fn peek(parameter: &Parameter) -> Option<&Self> {
                    match parameter {
                        Parameter::$variant(value) => Some(value),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_parameter_value! {
    i64 => Int,
    f64 => Float,
    String => Str,
    Vec<i64> => IntVec,
    Vec<f64> => FloatVec,
    Vec<String> => StrVec,
}

/// Named, heterogeneous values stored with an event or run header.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterStorage {
    values: BTreeMap<String, Parameter>,
}

impl ParameterStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, replacing any previous value of any type.
    pub fn set<T: ParameterValue>(&mut self, name: impl Into<String>, value: T) {
        self.values.insert(name.into(), value.wrap());
    }

    pub fn get<T: ParameterValue + Clone>(&self, name: &str) -> StorageResult<T> {
        let parameter = self
            .values
            .get(name)
            .ok_or_else(|| StorageError::ParameterNotFound(name.to_string()))?;
        T::peek(parameter)
            .cloned()
            .ok_or_else(|| StorageError::ParameterType {
                name: name.to_string(),
                expected: T::TAG.to_string(),
                actual: parameter.tag().to_string(),
            })
    }

    pub fn raw(&self, name: &str) -> Option<&Parameter> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Parameter> {
        self.values.remove(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Parameter)> {
        self.values.iter()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl Saver<'_> {
    /// Write a parameter bag at the current path.
    pub fn parameters(&mut self, storage: &ParameterStorage) -> StorageResult<()> {
        if !matches!(self.kind(), FieldKind::Parameters) {
            return Err(self.shape_mismatch("parameters"));
        }
        self.child(RESERVED_SIZE, &SIZE_KIND)
            .atomic(storage.len() as u64)?;
        for (name, value) in storage.iter() {
            self.child("name", &STR_KIND).atomic(name.clone())?;
            self.child("tag", &U8_KIND)
                .atomic(value.tag().type_byte())?;
            match value {
                Parameter::Int(v) => self.child("int", &I64_KIND).atomic(*v)?,
                Parameter::Float(v) => self.child("float", &F64_KIND).atomic(*v)?,
                Parameter::Str(v) => self.child("string", &STR_KIND).atomic(v.clone())?,
                Parameter::IntVec(v) => {
                    self.child("int_vec/size", &SIZE_KIND)
                        .atomic(v.len() as u64)?;
                    let mut data = self.child("int_vec/data", &I64_KIND);
                    for x in v {
                        data.atomic(*x)?;
                    }
                }
                Parameter::FloatVec(v) => {
                    self.child("float_vec/size", &SIZE_KIND)
                        .atomic(v.len() as u64)?;
                    let mut data = self.child("float_vec/data", &F64_KIND);
                    for x in v {
                        data.atomic(*x)?;
                    }
                }
                Parameter::StrVec(v) => {
                    self.child("string_vec/size", &SIZE_KIND)
                        .atomic(v.len() as u64)?;
                    let mut data = self.child("string_vec/data", &STR_KIND);
                    for x in v {
                        data.atomic(x.clone())?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl Loader<'_> {
    /// Read a parameter bag written by [`Saver::parameters`].
    pub fn parameters(&mut self, storage: &mut ParameterStorage) -> StorageResult<()> {
        if !matches!(self.kind(), FieldKind::Parameters) {
            return Err(self.shape_mismatch("parameters"));
        }
        storage.clear();
        let len = self
            .child(RESERVED_SIZE, &SIZE_KIND, None)
            .atomic::<u64>()?;
        for _ in 0..len {
            let name: String = self.child("name", &STR_KIND, None).atomic()?;
            let byte: u8 = self.child("tag", &U8_KIND, None).atomic()?;
            let tag =
                ParameterTag::from_type_byte(byte).ok_or(StorageError::UnknownParameterTag(byte))?;
            let value = match tag {
                ParameterTag::Int => Parameter::Int(self.child("int", &I64_KIND, None).atomic()?),
                ParameterTag::Float => {
                    Parameter::Float(self.child("float", &F64_KIND, None).atomic()?)
                }
                ParameterTag::Str => {
                    Parameter::Str(self.child("string", &STR_KIND, None).atomic()?)
                }
                ParameterTag::IntVec => Parameter::IntVec(self.vector("int_vec", &I64_KIND)?),
                ParameterTag::FloatVec => {
                    Parameter::FloatVec(self.vector("float_vec", &F64_KIND)?)
                }
                ParameterTag::StrVec => Parameter::StrVec(self.vector("string_vec", &STR_KIND)?),
            };
            storage.values.insert(name, value);
        }
        Ok(())
    }

    fn vector<A: crate::atomic::Atomic>(
        &mut self,
        family: &str,
        kind: &FieldKind,
    ) -> StorageResult<Vec<A>> {
        let len = self
            .child(&format!("{family}/{RESERVED_SIZE}"), &SIZE_KIND, None)
            .atomic::<u64>()?;
        let mut data = self.child(&format!("{family}/data"), kind, None);
        (0..len).map(|_| data.atomic()).collect()
    }
}

impl Storable for ParameterStorage {
    fn kind() -> FieldKind {
        FieldKind::Parameters
    }

    fn save(&self, saver: &mut Saver<'_>) -> StorageResult<()> {
        saver.parameters(self)
    }

    fn load(&mut self, loader: &mut Loader<'_>) -> StorageResult<()> {
        loader.parameters(self)
    }

    fn clear(&mut self) {
        self.values.clear();
    }
}
