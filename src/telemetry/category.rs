use super::field::{self, BitCursor, FieldSpec, FieldValue, Presentation};
use super::{TelemetryError, TelemetryResult};
use serde::ser::SerializeMap;
use std::collections::HashSet;

/// Layout of one named category of the beacon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySpec {
    name: String,
    fields: Vec<FieldSpec>,
    bit_count: usize,
}

impl CategorySpec {
    /// Builds a category whose fields must add up to exactly `declared_bits`
    pub fn new(
        name: impl Into<String>,
        fields: Vec<FieldSpec>,
        declared_bits: usize,
    ) -> TelemetryResult<Self> {
        let name = name.into();
        if fields.is_empty() {
            return Err(TelemetryError::inconsistent(&name, "category has no fields"));
        }

        let mut names = HashSet::new();
        for spec in &fields {
            spec.validate()?;
            if spec.presentation() != Presentation::Reserved && !names.insert(spec.name()) {
                return Err(TelemetryError::inconsistent(
                    &name,
                    format!("field {:?} is declared twice", spec.name()),
                ));
            }
        }

        let sum: usize = fields.iter().map(|f| usize::from(f.bits())).sum();
        if sum != declared_bits {
            return Err(TelemetryError::inconsistent(
                &name,
                format!("fields span {sum} bits, but the category declares {declared_bits}"),
            ));
        }

        Ok(CategorySpec { name, fields, bit_count: declared_bits })
    }

    /// Builds a category that is exactly as wide as its fields
    pub fn from_fields(name: impl Into<String>, fields: Vec<FieldSpec>) -> TelemetryResult<Self> {
        let declared = fields.iter().map(|f| usize::from(f.bits())).sum();
        Self::new(name, fields, declared)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn bit_count(&self) -> usize {
        self.bit_count
    }

    /// Decodes all fields of this category in declaration order, starting at the cursor.
    ///
    /// Advancing the cursor by anything other than the declared bit count means the layout
    /// itself is broken and is reported as [`TelemetryError::SpecInconsistency`].
    pub fn parse(&self, cursor: &mut BitCursor) -> TelemetryResult<Category> {
        let start = cursor.position();
        let mut values = Vec::with_capacity(self.fields.len());

        for spec in &self.fields {
            let value = field::decode(cursor, spec)?;
            if spec.presentation() != Presentation::Reserved {
                values.push((spec.name().to_string(), value));
            }
        }

        let consumed = cursor.position() - start;
        if consumed != self.bit_count {
            return Err(TelemetryError::inconsistent(
                &self.name,
                format!("decoding consumed {consumed} bits instead of {}", self.bit_count),
            ));
        }

        Ok(Category { name: self.name.clone(), fields: values })
    }
}

/// Decoded values of one category, in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    name: String,
    fields: Vec<(String, FieldValue)>,
}

impl Category {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(name, _)| name == field).map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl serde::Serialize for Category {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            // TOML integers are signed 64 bit
            match i64::try_from(value.raw()) {
                Ok(raw) => map.serialize_entry(name, &raw)?,
                Err(_) => map.serialize_entry(name, &value.to_string())?,
            }
        }
        map.end()
    }
}
