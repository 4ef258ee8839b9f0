use super::category::{Category, CategorySpec};
use super::field::{BitCursor, ByteOrder, FieldSpec, Presentation};
use super::{TelemetryError, TelemetryResult, TrailingBytes};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Display;
use std::path::Path;

/// Runs the configured categories, in order, over a beacon payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconDecoder {
    categories: Vec<CategorySpec>,
}

impl BeaconDecoder {
    pub fn new(categories: Vec<CategorySpec>) -> TelemetryResult<Self> {
        let mut names = HashSet::new();
        for category in &categories {
            if !names.insert(category.name()) {
                return Err(TelemetryError::inconsistent(category.name(), "category is declared twice"));
            }
        }

        Ok(BeaconDecoder { categories })
    }

    pub fn categories(&self) -> &[CategorySpec] {
        &self.categories
    }

    /// Number of bits a complete beacon carries
    pub fn bit_count(&self) -> usize {
        self.categories.iter().map(CategorySpec::bit_count).sum()
    }

    /// Decodes one beacon payload. The same payload always decodes to the same snapshot.
    pub fn decode(&self, payload: &[u8]) -> TelemetryResult<DecodedBeacon> {
        let mut cursor = BitCursor::new(payload);
        let mut categories = Vec::with_capacity(self.categories.len());

        for spec in &self.categories {
            if cursor.remaining_bits() < spec.bit_count() {
                return Err(TelemetryError::TruncatedPayload {
                    category: spec.name().to_string(),
                    available: cursor.total_bits(),
                    required: cursor.position() + spec.bit_count(),
                });
            }
            categories.push(spec.parse(&mut cursor)?);
        }

        let trailing = match cursor.remaining_bits() {
            0 => None,
            bits => Some(TrailingBytes { bits }),
        };

        Ok(DecodedBeacon { snapshot: TelemetrySnapshot { categories }, trailing })
    }
}

impl Default for BeaconDecoder {
    fn default() -> Self {
        BeaconLayout::default().decoder().expect("built-in beacon layout is consistent")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBeacon {
    pub snapshot: TelemetrySnapshot,
    pub trailing: Option<TrailingBytes>,
}

/// Everything decoded from one beacon, category by category in layout order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    categories: Vec<Category>,
}

impl TelemetrySnapshot {
    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name() == name)
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Raw value of a single field
    pub fn value(&self, category: &str, field: &str) -> Option<u64> {
        self.category(category)?.get(field).map(|v| v.raw())
    }
}

impl Serialize for TelemetrySnapshot {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.categories.iter().map(|c| (c.name(), c)))
    }
}

impl Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for category in &self.categories {
            writeln!(f, "{}", category.name())?;
            for (name, value) in category.iter() {
                writeln!(f, "    {name}: {value}")?;
            }
        }
        Ok(())
    }
}

/// Beacon layout as written in a TOML layout file
///
/// ```toml
/// [[category]]
/// name = "02: Program State"
///
/// [[category.field]]
/// name = "Program CRC"
/// bits = 16
/// presentation = "hex"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconLayout {
    pub category: Vec<CategoryLayout>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLayout {
    pub name: String,
    /// Declared width; defaults to the sum of the fields
    pub bits: Option<usize>,
    pub field: Vec<FieldLayout>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLayout {
    #[serde(default = "reserved_name")]
    pub name: String,
    pub bits: u8,
    #[serde(default)]
    pub presentation: Presentation,
    #[serde(default)]
    pub byte_order: ByteOrder,
}

fn reserved_name() -> String {
    "reserved".into()
}

impl BeaconLayout {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&content)?)
    }

    /// Validates the layout and builds a decoder for it
    pub fn decoder(&self) -> TelemetryResult<BeaconDecoder> {
        let categories = self
            .category
            .iter()
            .map(|category| {
                let fields: Vec<FieldSpec> = category
                    .field
                    .iter()
                    .map(|f| {
                        FieldSpec::new(&f.name, f.bits, f.presentation).with_byte_order(f.byte_order)
                    })
                    .collect();
                match category.bits {
                    Some(bits) => CategorySpec::new(&category.name, fields, bits),
                    None => CategorySpec::from_fields(&category.name, fields),
                }
            })
            .collect::<TelemetryResult<Vec<_>>>()?;

        BeaconDecoder::new(categories)
    }
}

impl Default for BeaconLayout {
    fn default() -> Self {
        BeaconLayout {
            category: vec![CategoryLayout {
                name: "02: Program State".into(),
                bits: Some(16),
                field: vec![FieldLayout {
                    name: "Program CRC".into(),
                    bits: 16,
                    presentation: Presentation::Hex,
                    byte_order: ByteOrder::Little,
                }],
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program_state_decoder() -> BeaconDecoder {
        BeaconDecoder::new(vec![
            CategorySpec::new("Program State", vec![FieldSpec::hex("Program CRC", 16)], 16).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn program_state_beacon_is_decoded() {
        let decoded = program_state_decoder().decode(&[0x34, 0x12]).unwrap();

        assert_eq!(decoded.snapshot.value("Program State", "Program CRC"), Some(0x1234));
        assert_eq!(decoded.trailing, None);
        assert_eq!(decoded.snapshot.to_string(), "Program State\n    Program CRC: 0x1234\n");
    }

    #[test]
    fn decoding_is_repeatable() {
        let decoder = BeaconDecoder::default();
        let payload = [0xEF, 0xBE];

        assert_eq!(decoder.decode(&payload).unwrap(), decoder.decode(&payload).unwrap());
    }

    #[test]
    fn short_payload_is_truncated() {
        let result = program_state_decoder().decode(&[0x34]);
        assert_eq!(
            result,
            Err(TelemetryError::TruncatedPayload {
                category: "Program State".into(),
                available: 8,
                required: 16
            })
        );
    }

    #[test]
    fn extra_bytes_are_reported_as_trailing() {
        let decoded = program_state_decoder().decode(&[0x34, 0x12, 0x00]).unwrap();

        assert_eq!(decoded.snapshot.value("Program State", "Program CRC"), Some(0x1234));
        assert_eq!(decoded.trailing, Some(TrailingBytes { bits: 8 }));
    }

    #[test]
    fn categories_consume_one_shared_cursor() {
        let decoder = BeaconDecoder::new(vec![
            CategorySpec::from_fields("A", vec![FieldSpec::decimal("low", 4)]).unwrap(),
            CategorySpec::from_fields("B", vec![FieldSpec::decimal("high", 4)]).unwrap(),
        ])
        .unwrap();

        let snapshot = decoder.decode(&[0x5A]).unwrap().snapshot;

        assert_eq!(snapshot.value("A", "low"), Some(0xA));
        assert_eq!(snapshot.value("B", "high"), Some(0x5));
        assert_eq!(decoder.bit_count(), 8);
    }

    #[test]
    fn duplicate_categories_are_rejected() {
        let category = CategorySpec::from_fields("A", vec![FieldSpec::flag("f")]).unwrap();
        assert!(BeaconDecoder::new(vec![category.clone(), category]).is_err());
    }

    #[test]
    fn layout_is_read_from_toml() {
        let layout = BeaconLayout::from_toml_str(
            r#"
            [[category]]
            name = "02: Program State"

            [[category.field]]
            name = "Program CRC"
            bits = 16

            [[category]]
            name = "03: Time"
            bits = 40

            [[category.field]]
            name = "Mission time"
            bits = 32
            presentation = "decimal"
            byte_order = "big"

            [[category.field]]
            bits = 8
            presentation = "reserved"
            "#,
        )
        .unwrap();

        let decoder = layout.decoder().unwrap();
        let snapshot = decoder.decode(&[0x34, 0x12, 0x00, 0x00, 0x01, 0x00, 0xFF]).unwrap().snapshot;

        assert_eq!(snapshot.value("02: Program State", "Program CRC"), Some(0x1234));
        assert_eq!(snapshot.value("03: Time", "Mission time"), Some(256));
        assert_eq!(snapshot.category("03: Time").unwrap().len(), 1);
    }

    #[test]
    fn inconsistent_layout_fails_validation() {
        let layout = BeaconLayout::from_toml_str(
            r#"
            [[category]]
            name = "Broken"
            bits = 10

            [[category.field]]
            name = "x"
            bits = 8
            "#,
        )
        .unwrap();

        assert!(matches!(layout.decoder(), Err(TelemetryError::SpecInconsistency { .. })));
    }

    #[test]
    fn snapshot_serializes_by_name() {
        let snapshot = BeaconDecoder::default().decode(&[0x34, 0x12]).unwrap().snapshot;
        let text = toml::to_string(&snapshot).unwrap();
        let table: toml::Table = toml::from_str(&text).unwrap();

        assert_eq!(table["02: Program State"]["Program CRC"].as_integer(), Some(4660));
    }

    #[test]
    fn wide_values_serialize_as_text() {
        let decoder = BeaconDecoder::new(vec![CategorySpec::from_fields(
            "Clock",
            vec![FieldSpec::hex("Raw", 64), FieldSpec::decimal("Uptime", 64)],
        )
        .unwrap()])
        .unwrap();
        let mut payload = vec![0xFF; 8];
        payload.extend(7u64.to_le_bytes());

        let snapshot = decoder.decode(&payload).unwrap().snapshot;
        let table: toml::Table = toml::from_str(&toml::to_string(&snapshot).unwrap()).unwrap();

        assert_eq!(table["Clock"]["Raw"].as_str(), Some("0xFFFFFFFFFFFFFFFF"));
        assert_eq!(table["Clock"]["Uptime"].as_integer(), Some(7));
    }
}
