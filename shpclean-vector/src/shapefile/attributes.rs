/*
This code is part of the shpclean shapefile diagnose & repair tool.
Created: 18/03/2024
Last Modified: 22/05/2024
License: MIT

NOTE: structures for the attribute (.dbf) side of a shapefile. Only the
header and the field descriptor list are modelled; record payloads move
through the tool as raw fixed-length byte rows.
*/

/// The handful of .dbf header values the tool needs. Offsets are byte
/// positions within the file.
#[derive(Debug, Default, Clone)]
pub struct AttributeHeader {
    pub num_records: u32,
    pub header_size: u16,
    pub record_length: u16,
}

/// One 32-byte field descriptor.
#[derive(Debug, Default, Clone)]
pub struct AttributeField {
    pub name: String,
    pub field_type: char,
    pub offset: u32,
    pub field_length: u8,
    pub decimal_count: u8,
}

impl AttributeField {
    pub fn new(
        name: &str,
        field_type: char,
        offset: u32,
        field_length: u8,
        decimal_count: u8,
    ) -> AttributeField {
        AttributeField {
            name: name.to_string(),
            field_type,
            offset,
            field_length,
            decimal_count,
        }
    }
}

/// Maps a rejected .dbf magic byte onto the legacy dialect it most
/// likely belongs to. Returns `None` for the two accepted values
/// (0x03 plain, 0x83 with memo sidecar).
pub fn dialect_name(magic: u8) -> Option<&'static str> {
    match magic {
        0x03 | 0x83 => None,
        0x02 | 0xF8 => Some("FoxBASE"),
        0xF5 => Some("FoxPro 2.x (or earlier)"),
        0x30 | 0x31 | 0x32 => Some("Visual FoxPro"),
        0x43 | 0x63 | 0xBB | 0xCB => Some("dBASE IV"),
        _ => Some("unknown"),
    }
}

/// A descriptor list is usable when it is non-empty and every surviving
/// field (memo fields are dropped before this check) carries one of the
/// classic dBASE III types.
pub fn fields_are_supported(fields: &[AttributeField]) -> bool {
    if fields.is_empty() {
        return false;
    }
    fields
        .iter()
        .all(|f| matches!(f.field_type, 'C' | 'N' | 'D' | 'L' | 'F') && f.field_length > 0)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_magic_byte_table() {
        assert_eq!(dialect_name(0x03), None);
        assert_eq!(dialect_name(0x83), None);
        assert_eq!(dialect_name(0x02), Some("FoxBASE"));
        assert_eq!(dialect_name(0xF8), Some("FoxBASE"));
        assert_eq!(dialect_name(0xF5), Some("FoxPro 2.x (or earlier)"));
        for magic in [0x30, 0x31, 0x32] {
            assert_eq!(dialect_name(magic), Some("Visual FoxPro"));
        }
        for magic in [0x43, 0x63, 0xBB, 0xCB] {
            assert_eq!(dialect_name(magic), Some("dBASE IV"));
        }
        assert_eq!(dialect_name(0x00), Some("unknown"));
        assert_eq!(dialect_name(0x7F), Some("unknown"));
    }

    #[test]
    fn test_field_support() {
        let good = vec![
            AttributeField::new("ID", 'N', 0, 9, 0),
            AttributeField::new("NAME", 'C', 9, 32, 0),
            AttributeField::new("WHEN", 'D', 41, 8, 0),
        ];
        assert!(fields_are_supported(&good));

        let mut bad = good.clone();
        bad.push(AttributeField::new("BLOB", 'B', 49, 10, 0));
        assert!(!fields_are_supported(&bad));

        assert!(!fields_are_supported(&[]));
    }
}
