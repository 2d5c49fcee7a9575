//! Per-aggregate layout metadata attached to emitted class declarations.
//!
//! Every field becomes a record with nine fixed keys, numbered as the runtime
//! reads them:
//!
//! | key | meaning |
//! |-----|---------|
//! | 0 | kind tag, aggregate name, or inline nested record |
//! | 1 | is pointer |
//! | 2 | pointer depth |
//! | 3 | is array |
//! | 4 | array length |
//! | 5 | is bit-field |
//! | 6 | bit width |
//! | 7 | byte offset |
//! | 8 | bit offset |

use super::layout::{FieldMeta, FieldType, StructDescriptor};
use crate::syntax::Printer;
use serde::{Deserialize, Serialize};

/// Stored type of a field record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordType {
    /// Scalar kind tag
    Kind(u8),
    /// Named aggregate
    Struct(String),
    /// Anonymous aggregate, emitted in place
    Inline(Box<StructMetadata>),
}

/// One field's access recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub ty: RecordType,
    pub pointer: u8,
    pub pointer_level: u32,
    pub array: u8,
    pub array_length: u32,
    pub bit_field: u8,
    pub bit_field_length: u32,
    pub base_address_offset: u32,
    pub base_bit_offset: u32,
}

impl FieldRecord {
    /// Record for a laid out field
    pub fn from_field(field: &FieldMeta) -> Self {
        let ty = match &field.ty {
            FieldType::Scalar(k) => RecordType::Kind(k.tag()),
            FieldType::Aggregate(d) if d.kind.is_inline() => {
                RecordType::Inline(Box::new(StructMetadata::from_descriptor(d)))
            }
            FieldType::Aggregate(d) => RecordType::Struct(d.name.clone()),
            FieldType::StructRef { name, .. } => RecordType::Struct(name.clone()),
        };
        Self {
            ty,
            pointer: u8::from(field.is_pointer()),
            pointer_level: field.pointer_level,
            array: u8::from(field.is_array),
            array_length: field.array_length,
            bit_field: u8::from(field.is_bit_field),
            bit_field_length: field.bit_width,
            base_address_offset: field.byte_offset,
            base_bit_offset: field.bit_offset,
        }
    }

    fn numeric_keys(&self) -> [u32; 8] {
        [
            self.pointer as u32,
            self.pointer_level,
            self.array as u32,
            self.array_length,
            self.bit_field as u32,
            self.bit_field_length,
            self.base_address_offset,
            self.base_bit_offset,
        ]
    }

    fn numeric_tail(&self) -> String {
        self.numeric_keys()
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{}: {}", i + 1, v))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Layout metadata of one aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructMetadata {
    /// Own fields in declaration order
    pub fields: Vec<(String, FieldRecord)>,
    /// Total size in bytes
    pub length: u32,
    /// Widest member alignment
    pub max_alignment: u32,
    /// Extended aggregate
    #[serde(default)]
    pub parent: Option<String>,
}

impl StructMetadata {
    /// Metadata for a computed descriptor
    pub fn from_descriptor(descriptor: &StructDescriptor) -> Self {
        Self {
            fields: descriptor
                .fields
                .iter()
                .map(|f| (f.name.clone(), FieldRecord::from_field(f)))
                .collect(),
            length: descriptor.total_length,
            max_alignment: descriptor.max_alignment,
            parent: descriptor.parent.as_ref().map(|p| p.name.clone()),
        }
    }

    /// Print the registration block that follows `class_name`'s declaration
    pub fn write_registration(&self, printer: &mut Printer, class_name: &str) {
        printer.line("(function (prototype) {");
        printer.indent();
        self.write_body(printer, class_name);
        printer.dedent();
        printer.line(&format!("}})({}.prototype);", class_name));
    }

    fn write_body(&self, printer: &mut Printer, class_name: &str) {
        printer.line("var map = new Map();");
        for (name, record) in &self.fields {
            let key = serde_json::to_string(name).unwrap_or_else(|_| format!("\"{}\"", name));
            match &record.ty {
                RecordType::Kind(tag) => printer.line(&format!(
                    "map.set({}, {{ 0: {}, {} }});",
                    key,
                    tag,
                    record.numeric_tail()
                )),
                RecordType::Struct(target) if target == class_name => printer.line(&format!(
                    "map.set({}, {{ get 0() {{ return {}; }}, {} }});",
                    key,
                    target,
                    record.numeric_tail()
                )),
                RecordType::Struct(target) => printer.line(&format!(
                    "map.set({}, {{ 0: {}, {} }});",
                    key,
                    target,
                    record.numeric_tail()
                )),
                RecordType::Inline(inner) => {
                    printer.line(&format!("map.set({}, {{", key));
                    printer.indent();
                    printer.line("0: (function (prototype) {");
                    printer.indent();
                    inner.write_body(printer, class_name);
                    printer.line("return prototype;");
                    printer.dedent();
                    printer.line("})({}),");
                    printer.line(&record.numeric_tail());
                    printer.dedent();
                    printer.line("});");
                }
            }
        }
        printer.line("definedMetaProperty(prototype, symbolStruct, true);");
        printer.line(&format!(
            "definedMetaProperty(prototype, symbolStructMaxBaseTypeByteLength, {});",
            self.max_alignment
        ));
        printer.line(&format!(
            "definedMetaProperty(prototype, symbolStructLength, {});",
            self.length
        ));
        printer.line("definedMetaProperty(prototype, symbolStructKeysMeta, map);");
    }
}
