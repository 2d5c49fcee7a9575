//! Scalar kinds and their fixed memory representation
//!
//! Every primitive the pass knows about is a [`ScalarKind`]. Its numeric tag is
//! the index the runtime uses in the `CTypeEnumRead` / `CTypeEnumWrite` tables,
//! so the order of the variants is part of the output format.
//!
//! # Design Principles
//!
//! 1. **Fixed widths**: every kind has one byte length, except `pointer` and
//!    `size`, which follow the [`AddressingWidth`] of the compilation
//! 2. **Atomics are tagged**: each atomic kind maps back to its plain kind
//! 3. **64-bit values are big integers**: kinds wider than 32 bits are carried
//!    as host big integers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of pointers and `size` values on the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AddressingWidth {
    /// 4-byte pointers
    #[default]
    #[serde(rename = "32")]
    Bits32,
    /// 8-byte pointers, carried as big integers
    #[serde(rename = "64")]
    Bits64,
}

impl AddressingWidth {
    /// Pointer size in bytes
    pub fn pointer_bytes(&self) -> u32 {
        match self {
            AddressingWidth::Bits32 => 4,
            AddressingWidth::Bits64 => 8,
        }
    }

    /// Whether pointers are big integers on the host
    pub fn is_64(&self) -> bool {
        *self == AddressingWidth::Bits64
    }
}

/// Byte order used when numbering bits inside a bit-field unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Least significant bits first
    #[default]
    Little,
    /// Most significant bits first
    Big,
}

/// Alignment requirements for memory access
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Alignment {
    /// 1-byte alignment
    Byte1 = 1,
    /// 2-byte alignment
    Byte2 = 2,
    /// 4-byte alignment
    Byte4 = 4,
    /// 8-byte alignment
    Byte8 = 8,
}

impl Alignment {
    /// Creates an alignment requirement from a size in bytes
    pub fn from_size(size: u32) -> Self {
        match size {
            0 | 1 => Alignment::Byte1,
            2 => Alignment::Byte2,
            3 | 4 => Alignment::Byte4,
            _ => Alignment::Byte8,
        }
    }

    /// Returns the alignment value in bytes
    pub fn value(&self) -> u32 {
        *self as u32
    }

    /// Round `offset` up to the next multiple of this alignment
    pub fn align(&self, offset: u32) -> u32 {
        align_to(offset, self.value())
    }
}

/// Round `offset` up to a multiple of `align`; an alignment of 0 leaves it unchanged
pub fn align_to(offset: u32, align: u32) -> u32 {
    if align <= 1 {
        return offset;
    }
    offset.div_ceil(align) * align
}

/// Primitive kinds, in runtime tag order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    /// Null pointer
    Null = 0,
    /// `void`
    Void,
    /// Unsigned 8-bit
    Uint8,
    /// Atomic unsigned 8-bit
    AtomicUint8,
    /// 8-bit character
    Char,
    /// Atomic 8-bit character
    AtomicChar,
    /// Unsigned 16-bit
    Uint16,
    /// Atomic unsigned 16-bit
    AtomicUint16,
    /// Unsigned 32-bit
    Uint32,
    /// Atomic unsigned 32-bit
    AtomicUint32,
    /// Unsigned 64-bit
    Uint64,
    /// Signed 8-bit
    Int8,
    /// Atomic signed 8-bit
    AtomicInt8,
    /// Signed 16-bit
    Int16,
    /// Atomic signed 16-bit
    AtomicInt16,
    /// Signed 32-bit
    Int32,
    /// Atomic signed 32-bit
    AtomicInt32,
    /// Signed 64-bit
    Int64,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// Raw pointer
    Pointer,
    /// Atomic signed 64-bit
    AtomicInt64,
    /// Atomic unsigned 64-bit
    AtomicUint64,
    /// Boolean
    Bool,
    /// Atomic boolean
    AtomicBool,
    /// Platform-width unsigned integer
    Size,
}

const ALL_KINDS: [ScalarKind; 26] = [
    ScalarKind::Null,
    ScalarKind::Void,
    ScalarKind::Uint8,
    ScalarKind::AtomicUint8,
    ScalarKind::Char,
    ScalarKind::AtomicChar,
    ScalarKind::Uint16,
    ScalarKind::AtomicUint16,
    ScalarKind::Uint32,
    ScalarKind::AtomicUint32,
    ScalarKind::Uint64,
    ScalarKind::Int8,
    ScalarKind::AtomicInt8,
    ScalarKind::Int16,
    ScalarKind::AtomicInt16,
    ScalarKind::Int32,
    ScalarKind::AtomicInt32,
    ScalarKind::Int64,
    ScalarKind::Float,
    ScalarKind::Double,
    ScalarKind::Pointer,
    ScalarKind::AtomicInt64,
    ScalarKind::AtomicUint64,
    ScalarKind::Bool,
    ScalarKind::AtomicBool,
    ScalarKind::Size,
];

impl ScalarKind {
    /// All kinds in tag order
    pub fn all() -> &'static [ScalarKind] {
        &ALL_KINDS
    }

    /// Runtime tag of this kind
    pub fn tag(&self) -> u8 {
        *self as u8
    }

    /// Source-level type name
    pub fn name(&self) -> &'static str {
        match self {
            ScalarKind::Null => "nullptr",
            ScalarKind::Void => "void",
            ScalarKind::Uint8 => "uint8",
            ScalarKind::AtomicUint8 => "atomic_uint8",
            ScalarKind::Char => "char",
            ScalarKind::AtomicChar => "atomic_char",
            ScalarKind::Uint16 => "uint16",
            ScalarKind::AtomicUint16 => "atomic_uint16",
            ScalarKind::Uint32 => "uint32",
            ScalarKind::AtomicUint32 => "atomic_uint32",
            ScalarKind::Uint64 => "uint64",
            ScalarKind::Int8 => "int8",
            ScalarKind::AtomicInt8 => "atomic_int8",
            ScalarKind::Int16 => "int16",
            ScalarKind::AtomicInt16 => "atomic_int16",
            ScalarKind::Int32 => "int32",
            ScalarKind::AtomicInt32 => "atomic_int32",
            ScalarKind::Int64 => "int64",
            ScalarKind::Float => "float",
            ScalarKind::Double => "double",
            ScalarKind::Pointer => "pointer",
            ScalarKind::AtomicInt64 => "atomic_int64",
            ScalarKind::AtomicUint64 => "atomic_uint64",
            ScalarKind::Bool => "bool",
            ScalarKind::AtomicBool => "atomic_bool",
            ScalarKind::Size => "size",
        }
    }

    /// Look a kind up by its source-level type name
    pub fn from_name(name: &str) -> Option<Self> {
        ALL_KINDS.iter().copied().find(|k| k.name() == name)
    }

    /// Byte length of one value of this kind
    pub fn byte_length(&self, width: AddressingWidth) -> u32 {
        match self {
            ScalarKind::Pointer | ScalarKind::Size => width.pointer_bytes(),
            ScalarKind::Null | ScalarKind::Void => 4,
            ScalarKind::Uint8
            | ScalarKind::AtomicUint8
            | ScalarKind::Char
            | ScalarKind::AtomicChar
            | ScalarKind::Int8
            | ScalarKind::AtomicInt8
            | ScalarKind::Bool
            | ScalarKind::AtomicBool => 1,
            ScalarKind::Uint16
            | ScalarKind::AtomicUint16
            | ScalarKind::Int16
            | ScalarKind::AtomicInt16 => 2,
            ScalarKind::Uint32
            | ScalarKind::AtomicUint32
            | ScalarKind::Int32
            | ScalarKind::AtomicInt32
            | ScalarKind::Float => 4,
            ScalarKind::Uint64
            | ScalarKind::Int64
            | ScalarKind::AtomicInt64
            | ScalarKind::AtomicUint64
            | ScalarKind::Double => 8,
        }
    }

    /// Bit width of one value of this kind
    pub fn bits(&self, width: AddressingWidth) -> u32 {
        self.byte_length(width) * 8
    }

    /// Shift that converts a byte address into an element index for atomics
    pub fn pointer_shift(&self) -> u32 {
        match self {
            ScalarKind::Uint8
            | ScalarKind::AtomicUint8
            | ScalarKind::Char
            | ScalarKind::AtomicChar
            | ScalarKind::Int8
            | ScalarKind::AtomicInt8
            | ScalarKind::Bool
            | ScalarKind::AtomicBool => 0,
            ScalarKind::Uint16
            | ScalarKind::AtomicUint16
            | ScalarKind::Int16
            | ScalarKind::AtomicInt16 => 1,
            ScalarKind::Uint64
            | ScalarKind::Int64
            | ScalarKind::AtomicInt64
            | ScalarKind::AtomicUint64
            | ScalarKind::Double => 4,
            _ => 2,
        }
    }

    /// Whether this is one of the atomic kinds
    pub fn is_atomic(&self) -> bool {
        self.plain() != *self
    }

    /// The non-atomic kind with the same representation
    pub fn plain(&self) -> ScalarKind {
        match self {
            ScalarKind::AtomicUint8 => ScalarKind::Uint8,
            ScalarKind::AtomicChar => ScalarKind::Char,
            ScalarKind::AtomicUint16 => ScalarKind::Uint16,
            ScalarKind::AtomicUint32 => ScalarKind::Uint32,
            ScalarKind::AtomicInt8 => ScalarKind::Int8,
            ScalarKind::AtomicInt16 => ScalarKind::Int16,
            ScalarKind::AtomicInt32 => ScalarKind::Int32,
            ScalarKind::AtomicInt64 => ScalarKind::Int64,
            ScalarKind::AtomicUint64 => ScalarKind::Uint64,
            ScalarKind::AtomicBool => ScalarKind::Bool,
            other => *other,
        }
    }

    /// Signed integer kinds
    pub fn is_signed(&self) -> bool {
        matches!(
            self.plain(),
            ScalarKind::Int8 | ScalarKind::Int16 | ScalarKind::Int32 | ScalarKind::Int64
        )
    }

    /// Integer kinds, including char, pointer and size
    pub fn is_integer(&self) -> bool {
        !matches!(
            self.plain(),
            ScalarKind::Float
                | ScalarKind::Double
                | ScalarKind::Bool
                | ScalarKind::Void
                | ScalarKind::Null
        )
    }

    /// Floating point kinds
    pub fn is_float(&self) -> bool {
        matches!(self, ScalarKind::Float | ScalarKind::Double)
    }

    /// Whether values of this kind are host big integers
    pub fn is_bigint(&self, width: AddressingWidth) -> bool {
        match self.plain() {
            ScalarKind::Int64 | ScalarKind::Uint64 => true,
            ScalarKind::Pointer | ScalarKind::Size => width.is_64(),
            _ => false,
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}
