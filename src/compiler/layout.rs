//! Struct and union memory layout.
//!
//! Fields are placed left to right. Each field is aligned to its natural
//! alignment, consecutive bit-fields of the same base kind share one storage
//! unit while their widths fit, and the aggregate is padded to its widest
//! alignment. Unions place every field at offset 0.

use super::memory_model::{align_to, AddressingWidth, ByteOrder, ScalarKind};
use crate::types::{AggregateKey, DeclId};
use std::rc::Rc;

/// What kind of aggregate a descriptor lays out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    /// `@struct` class
    Struct,
    /// `@union` class
    Union,
    /// Anonymous `struct<{..}>` member type
    InlineStruct,
    /// Anonymous `union<{..}>` member type
    InlineUnion,
}

impl AggregateKind {
    /// Whether every field sits at offset 0
    pub fn is_union(&self) -> bool {
        matches!(self, AggregateKind::Union | AggregateKind::InlineUnion)
    }

    /// Whether this is an anonymous member aggregate
    pub fn is_inline(&self) -> bool {
        matches!(self, AggregateKind::InlineStruct | AggregateKind::InlineUnion)
    }
}

/// Value type stored in a field
#[derive(Debug, Clone)]
pub enum FieldType {
    /// Builtin scalar
    Scalar(ScalarKind),
    /// Aggregate embedded by value
    Aggregate(Rc<StructDescriptor>),
    /// Aggregate reached through a pointer; resolved on demand so that
    /// self-referential layouts stay finite
    StructRef {
        /// Identity of the pointee layout
        key: AggregateKey,
        /// Declared name of the pointee
        name: String,
    },
}

impl FieldType {
    /// Scalar kind, if the field holds one
    pub fn scalar(&self) -> Option<ScalarKind> {
        match self {
            FieldType::Scalar(k) => Some(*k),
            _ => None,
        }
    }
}

/// One member of an aggregate
#[derive(Debug, Clone)]
pub struct FieldMeta {
    /// Member name
    pub name: String,
    /// Stored type; for pointers, the innermost pointee
    pub ty: FieldType,
    /// Levels of indirection; 0 for a value field
    pub pointer_level: u32,
    /// Whether the member is a fixed-length array
    pub is_array: bool,
    /// Element count for arrays
    pub array_length: u32,
    /// Whether the member is a bit-field
    pub is_bit_field: bool,
    /// Width in bits for bit-fields
    pub bit_width: u32,
    /// Byte offset from the start of the aggregate
    pub byte_offset: u32,
    /// Bit offset inside the storage unit, numbered per the session byte order
    pub bit_offset: u32,
}

impl FieldMeta {
    /// A value field of the given type, not yet placed
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            pointer_level: 0,
            is_array: false,
            array_length: 0,
            is_bit_field: false,
            bit_width: 0,
            byte_offset: 0,
            bit_offset: 0,
        }
    }

    /// Scalar field shortcut
    pub fn scalar(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self::new(name, FieldType::Scalar(kind))
    }

    /// Builder: make this a pointer of the given depth
    pub fn pointer(mut self, level: u32) -> Self {
        self.pointer_level = level;
        self
    }

    /// Builder: make this an array of `length` elements
    pub fn array(mut self, length: u32) -> Self {
        self.is_array = true;
        self.array_length = length;
        self
    }

    /// Builder: make this a bit-field of `width` bits
    pub fn bits(mut self, width: u32) -> Self {
        self.is_bit_field = true;
        self.bit_width = width;
        self
    }

    /// Whether the member is stored as a pointer
    pub fn is_pointer(&self) -> bool {
        self.pointer_level > 0
    }

    /// Size of one element
    pub fn element_size(&self, width: AddressingWidth) -> u32 {
        if self.is_pointer() {
            return width.pointer_bytes();
        }
        match &self.ty {
            FieldType::Scalar(k) => k.byte_length(width),
            FieldType::Aggregate(d) => d.total_length,
            FieldType::StructRef { .. } => width.pointer_bytes(),
        }
    }

    /// Total bytes the member occupies
    pub fn size(&self, width: AddressingWidth) -> u32 {
        if self.is_array {
            self.element_size(width) * self.array_length
        } else {
            self.element_size(width)
        }
    }

    /// Natural alignment
    pub fn alignment(&self, width: AddressingWidth) -> u32 {
        if self.is_pointer() {
            return width.pointer_bytes();
        }
        match &self.ty {
            FieldType::Scalar(k) => k.byte_length(width),
            FieldType::Aggregate(d) => d.max_alignment,
            FieldType::StructRef { .. } => width.pointer_bytes(),
        }
    }

    /// Bits in the storage unit of a bit-field
    pub fn unit_bits(&self, width: AddressingWidth) -> u32 {
        self.ty.scalar().map(|k| k.bits(width)).unwrap_or(0)
    }
}

/// Computed layout of one aggregate
#[derive(Debug, Clone)]
pub struct StructDescriptor {
    /// Name used to reference the aggregate in emitted code
    pub name: String,
    /// Cache identity
    pub key: AggregateKey,
    /// Struct, union or inline variant
    pub kind: AggregateKind,
    /// Own fields in declaration order
    pub fields: Vec<FieldMeta>,
    /// Padded size in bytes
    pub total_length: u32,
    /// Widest member alignment
    pub max_alignment: u32,
    /// Extended aggregate, laid out first
    pub parent: Option<Rc<StructDescriptor>>,
    /// Declaration an inline aggregate is nested in
    pub enclosing: Option<DeclId>,
    /// Dotted member path of an inline aggregate inside its enclosing declaration
    pub path: Option<String>,
    /// Module that declares the aggregate
    pub module: Option<String>,
}

impl StructDescriptor {
    /// Look a field up, searching own fields before inherited ones
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        match self.fields.iter().find(|f| f.name == name) {
            Some(f) => Some(f),
            None => self.parent.as_deref().and_then(|p| p.field(name)),
        }
    }

    /// Inherited fields first, then own fields
    pub fn all_fields(&self) -> Vec<&FieldMeta> {
        let mut list = match &self.parent {
            Some(p) => p.all_fields(),
            None => Vec::new(),
        };
        list.extend(self.fields.iter());
        list
    }

    /// Whether `ancestor` is this aggregate or one it extends
    pub fn extends(&self, ancestor: &AggregateKey) -> bool {
        self.key == *ancestor
            || self
                .parent
                .as_deref()
                .map(|p| p.extends(ancestor))
                .unwrap_or(false)
    }
}

/// Offset computation for one addressing width and byte order
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutEngine {
    /// Width of pointer and `size` members
    pub width: AddressingWidth,
    /// Bit numbering inside bit-field units
    pub byte_order: ByteOrder,
}

impl LayoutEngine {
    /// Create an engine
    pub fn new(width: AddressingWidth, byte_order: ByteOrder) -> Self {
        Self { width, byte_order }
    }

    /// Largest natural alignment among `fields`
    pub fn max_alignment(&self, fields: &[FieldMeta]) -> u32 {
        fields
            .iter()
            .map(|f| f.alignment(self.width))
            .max()
            .unwrap_or(0)
    }

    /// Largest member size among `fields`
    pub fn max_size(&self, fields: &[FieldMeta]) -> u32 {
        fields.iter().map(|f| f.size(self.width)).max().unwrap_or(0)
    }

    /// Place `fields` starting at `start` and return the padded end offset
    pub fn layout(&self, fields: &mut [FieldMeta], max_alignment: u32, start: u32) -> u32 {
        let mut offset = start;
        let mut unit_offset = start;
        let mut open_kind: Option<ScalarKind> = None;
        let mut remaining = 0u32;

        for field in fields.iter_mut() {
            if field.is_bit_field {
                let kind = field.ty.scalar();
                if kind.is_some() && kind == open_kind && remaining >= field.bit_width {
                    let unit = field.unit_bits(self.width);
                    let raw = unit - remaining;
                    remaining -= field.bit_width;
                    if field.bit_width == 0 {
                        // zero width pads out the rest of the unit
                        field.bit_width = remaining;
                        remaining = 0;
                        open_kind = None;
                    }
                    field.byte_offset = unit_offset;
                    field.bit_offset = self.bit_offset(unit, raw, field.bit_width);
                    continue;
                }
            }

            offset = align_to(offset, field.alignment(self.width));
            field.byte_offset = offset;

            if field.is_bit_field {
                let unit = field.unit_bits(self.width);
                open_kind = field.ty.scalar();
                remaining = unit.saturating_sub(field.bit_width);
                field.bit_offset = self.bit_offset(unit, 0, field.bit_width);
            } else {
                open_kind = None;
                remaining = 0;
                field.bit_offset = 0;
            }

            unit_offset = offset;
            offset += field.size(self.width);
        }

        align_to(offset, max_alignment)
    }

    /// Put every field at offset 0 and return the padded union size
    pub fn layout_union(&self, fields: &mut [FieldMeta], max_alignment: u32) -> u32 {
        for field in fields.iter_mut() {
            field.byte_offset = 0;
            field.bit_offset = if field.is_bit_field {
                self.bit_offset(field.unit_bits(self.width), 0, field.bit_width)
            } else {
                0
            };
        }
        align_to(self.max_size(fields), max_alignment)
    }

    /// Build a complete descriptor, or `None` when nothing in `fields` has a size
    #[allow(clippy::too_many_arguments)]
    pub fn describe(
        &self,
        name: String,
        key: AggregateKey,
        kind: AggregateKind,
        mut fields: Vec<FieldMeta>,
        parent: Option<Rc<StructDescriptor>>,
        enclosing: Option<DeclId>,
        path: Option<String>,
        module: Option<String>,
    ) -> Option<StructDescriptor> {
        let inherited = parent.as_deref().map(|p| p.max_alignment).unwrap_or(0);

        let (total_length, max_alignment) = if fields.is_empty() {
            // only a derived aggregate may be empty; it takes its parent's shape
            let p = parent.as_deref()?;
            (p.total_length, p.max_alignment)
        } else {
            let max_alignment = self.max_alignment(&fields).max(inherited);
            if max_alignment == 0 {
                return None;
            }
            let start = parent.as_deref().map(|p| p.total_length).unwrap_or(0);
            let total = if kind.is_union() {
                self.layout_union(&mut fields, max_alignment)
            } else {
                self.layout(&mut fields, max_alignment, start)
            };
            (total, max_alignment)
        };

        tracing::debug!(
            "layout {}: {} field(s), length {}, alignment {}",
            name,
            fields.len(),
            total_length,
            max_alignment
        );

        Some(StructDescriptor {
            name,
            key,
            kind,
            fields,
            total_length,
            max_alignment,
            parent,
            enclosing,
            path,
            module,
        })
    }

    fn bit_offset(&self, unit: u32, raw: u32, width: u32) -> u32 {
        match self.byte_order {
            ByteOrder::Little => unit.saturating_sub(raw + width),
            ByteOrder::Big => raw,
        }
    }
}

/// Shift that brings a bit-field down to bit 0 after a full-unit read
pub fn read_shift(unit_bits: u32, bit_offset: u32, bit_width: u32) -> u32 {
    unit_bits.saturating_sub(bit_offset + bit_width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeId;

    fn engine() -> LayoutEngine {
        LayoutEngine::default()
    }

    fn key() -> AggregateKey {
        AggregateKey::Inline(TypeId(0))
    }

    fn describe(kind: AggregateKind, fields: Vec<FieldMeta>) -> StructDescriptor {
        engine()
            .describe("T".into(), key(), kind, fields, None, None, None, None)
            .unwrap()
    }

    #[test]
    fn test_int8_then_uint16() {
        let d = describe(
            AggregateKind::Struct,
            vec![
                FieldMeta::scalar("a", ScalarKind::Int8),
                FieldMeta::scalar("b", ScalarKind::Uint16),
            ],
        );
        assert_eq!(d.fields[0].byte_offset, 0);
        assert_eq!(d.fields[1].byte_offset, 2);
        assert_eq!(d.max_alignment, 2);
        assert_eq!(d.total_length, 4);
    }

    #[test]
    fn test_union_sizes() {
        let d = describe(
            AggregateKind::Union,
            vec![
                FieldMeta::scalar("a", ScalarKind::Uint8),
                FieldMeta::scalar("b", ScalarKind::Uint16),
                FieldMeta::scalar("c", ScalarKind::Uint32),
            ],
        );
        assert_eq!(d.total_length, 4);
        assert!(d.fields.iter().all(|f| f.byte_offset == 0));
    }

    #[test]
    fn test_bit_field_packing() {
        let d = describe(
            AggregateKind::Struct,
            vec![
                FieldMeta::scalar("a", ScalarKind::Uint8).bits(3),
                FieldMeta::scalar("b", ScalarKind::Uint8).bits(4),
                FieldMeta::scalar("c", ScalarKind::Uint8).bits(3),
            ],
        );
        assert_eq!(d.fields[0].byte_offset, 0);
        assert_eq!(d.fields[1].byte_offset, 0);
        assert_eq!(d.fields[2].byte_offset, 1);
        // little endian numbering: the first field sits in the low bits
        assert_eq!(d.fields[0].bit_offset, 5);
        assert_eq!(d.fields[1].bit_offset, 1);
        assert_eq!(read_shift(8, 5, 3), 0);
        assert_eq!(read_shift(8, 1, 4), 3);
        assert_eq!(d.total_length, 2);
    }

    #[test]
    fn test_big_endian_bit_numbering() {
        let engine = LayoutEngine::new(AddressingWidth::Bits32, ByteOrder::Big);
        let mut fields = vec![
            FieldMeta::scalar("a", ScalarKind::Uint8).bits(3),
            FieldMeta::scalar("b", ScalarKind::Uint8).bits(4),
        ];
        engine.layout(&mut fields, 1, 0);
        assert_eq!(fields[0].bit_offset, 0);
        assert_eq!(fields[1].bit_offset, 3);
    }

    #[test]
    fn test_differing_kind_closes_unit() {
        let d = describe(
            AggregateKind::Struct,
            vec![
                FieldMeta::scalar("a", ScalarKind::Uint8).bits(3),
                FieldMeta::scalar("b", ScalarKind::Int8).bits(3),
            ],
        );
        assert_eq!(d.fields[1].byte_offset, 1);
    }

    #[test]
    fn test_pointers_follow_width() {
        let fields = vec![
            FieldMeta::scalar("a", ScalarKind::Uint8).pointer(1),
            FieldMeta::scalar("b", ScalarKind::Uint8).pointer(2),
        ];
        let d32 = describe(AggregateKind::Struct, fields.clone());
        assert_eq!((d32.fields[1].byte_offset, d32.total_length), (4, 8));
        let d64 = LayoutEngine::new(AddressingWidth::Bits64, ByteOrder::Little)
            .describe(
                "T".into(),
                key(),
                AggregateKind::Struct,
                fields,
                None,
                None,
                None,
                None,
            )
            .unwrap();
        assert_eq!((d64.fields[1].byte_offset, d64.total_length), (8, 16));
        assert_eq!(d64.max_alignment, 8);
    }

    #[test]
    fn test_inheritance_starts_after_parent() {
        let parent = Rc::new(describe(
            AggregateKind::Struct,
            vec![
                FieldMeta::scalar("a", ScalarKind::Uint32),
                FieldMeta::scalar("b", ScalarKind::Uint8),
            ],
        ));
        let child = engine()
            .describe(
                "C".into(),
                key(),
                AggregateKind::Struct,
                vec![FieldMeta::scalar("c", ScalarKind::Uint8)],
                Some(parent.clone()),
                None,
                None,
                None,
            )
            .unwrap();
        assert_eq!(child.fields[0].byte_offset, 8);
        assert_eq!(child.total_length, 12);
        assert_eq!(child.field("a").map(|f| f.byte_offset), Some(0));
        assert_eq!(child.all_fields().len(), 3);
    }

    #[test]
    fn test_empty_is_not_an_aggregate() {
        let d = engine().describe(
            "E".into(),
            key(),
            AggregateKind::Struct,
            vec![],
            None,
            None,
            None,
            None,
        );
        assert!(d.is_none());
    }

    #[test]
    fn test_arrays_multiply_size() {
        let d = describe(
            AggregateKind::Struct,
            vec![
                FieldMeta::scalar("a", ScalarKind::Uint16).array(3),
                FieldMeta::scalar("b", ScalarKind::Uint32),
            ],
        );
        assert_eq!(d.fields[1].byte_offset, 8);
        assert_eq!(d.total_length, 12);
    }
}
