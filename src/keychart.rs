//! Stenograph key chart and stroke decoding.
//!
//! A live stroke arrives as 4 bytes. Byte `n` selects chart row `n`; within a
//! byte only bits 0-5 are used, and bit `i` selects column `5 - i`. Walking
//! rows in order and bits from high to low therefore yields keys in chart
//! order, which is the physical left-to-right order for most rows.

use std::fmt;

use stenograph_transport::protocol::STROKE_BYTES;

/// Bits of each stroke byte that carry keys
pub const KEY_BITS: usize = 6;

/// Physical key for each (byte, column) slot; `None` marks an unused slot.
///
/// `^` is the stenomark, a structural marker rather than a stroke key.
pub static STENO_KEY_CHART: [[Option<&str>; KEY_BITS]; STROKE_BYTES] = [
    [Some("^"), Some("#"), Some("S-"), Some("T-"), Some("K-"), Some("P-")],
    [Some("W-"), Some("H-"), Some("R-"), Some("A-"), Some("O-"), Some("*")],
    [Some("-E"), Some("-U"), Some("-F"), Some("-R"), Some("-P"), Some("-B")],
    [Some("-L"), Some("-G"), Some("-T"), Some("-S"), Some("-D"), Some("-Z")],
];

/// Physical layout of the writer, for display
pub const KEYS_LAYOUT: &str = "
    #  #  #  #  #  #  #  #  #  #
    S- T- P- H- * -F -P -L -T -D
    S- K- W- R- * -R -B -G -S -Z
          A- O-   -E -U
    ^
";

/// Decode the first 4 bytes of a live payload into key names.
///
/// Missing bytes (payloads shorter than 4) decode as no keys.
pub fn decode(payload: &[u8]) -> Vec<&'static str> {
    let mut keys = Vec::new();
    for (row, &byte) in STENO_KEY_CHART.iter().zip(payload.iter().take(STROKE_BYTES)) {
        for column in 0..KEY_BITS {
            let bit = KEY_BITS - 1 - column;
            if (byte >> bit) & 1 == 1 {
                if let Some(key) = row[column] {
                    keys.push(key);
                }
            }
        }
    }
    keys
}

/// Every key name the chart can produce, in chart order
pub fn all_keys() -> impl Iterator<Item = &'static str> {
    STENO_KEY_CHART.iter().flatten().flatten().copied()
}

// ---------------------------------------------------------------------------
// Stroke
// ---------------------------------------------------------------------------

/// One chord: the physical keys pressed together, in chart order. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stroke {
    keys: Vec<&'static str>,
}

impl Stroke {
    /// Decode a live payload; `None` when no key bit is set.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        let keys = decode(payload);
        (!keys.is_empty()).then_some(Self { keys })
    }

    /// Key names in chart order
    pub fn keys(&self) -> &[&'static str] {
        &self.keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| *k == key)
    }
}

impl fmt::Display for Stroke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.keys.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_zero_of_first_byte_is_p() {
        assert_eq!(decode(&[0b000001, 0, 0, 0]), vec!["P-"]);
    }

    #[test]
    fn bit_five_selects_first_column() {
        assert_eq!(decode(&[0b100000, 0, 0, 0]), vec!["^"]);
        assert_eq!(decode(&[0, 0, 0, 0b100000]), vec!["-L"]);
    }

    #[test]
    fn all_zero_decodes_empty() {
        assert!(decode(&[0, 0, 0, 0]).is_empty());
        assert!(Stroke::from_payload(&[0, 0, 0, 0]).is_none());
    }

    #[test]
    fn keys_come_out_in_chart_order() {
        // S- and K- on row 0, A- on row 1, -E and -B on row 2, -Z on row 3
        let keys = decode(&[0b001010, 0b000100, 0b100001, 0b000001]);
        assert_eq!(keys, vec!["S-", "K-", "A-", "-E", "-B", "-Z"]);
    }

    #[test]
    fn every_bit_set_yields_whole_chart() {
        let keys = decode(&[0x3F, 0x3F, 0x3F, 0x3F]);
        assert_eq!(keys, all_keys().collect::<Vec<_>>());
        assert_eq!(keys.len(), 24);
    }

    #[test]
    fn high_bits_are_ignored() {
        assert!(decode(&[0xC0, 0xC0, 0xC0, 0xC0]).is_empty());
        assert_eq!(decode(&[0xC1, 0, 0, 0]), vec!["P-"]);
    }

    #[test]
    fn only_first_four_bytes_count() {
        assert_eq!(decode(&[0, 0, 0, 0, 0x3F, 0x3F]), Vec::<&str>::new());
        assert_eq!(decode(&[0b000001]), vec!["P-"]);
    }

    #[test]
    fn stroke_display_joins_keys() {
        let stroke = Stroke::from_payload(&[0b000110, 0b000010, 0, 0]).unwrap();
        assert_eq!(stroke.to_string(), "T- K- O-");
        assert!(stroke.contains("O-"));
        assert!(!stroke.contains("*"));
    }
}
