// types.rs — Data types carried by ports, arrays, and expressions
//
// Widths are in bits. The runtime evaluates everything in 64-bit words,
// so the builder rejects any declared width above 64; records are flat
// field lists whose total width obeys the same bound.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

/// The type of a value flowing through the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Raw bit vector, no arithmetic interpretation.
    Bits(u16),
    /// Unsigned integer.
    UInt(u16),
    /// Two's-complement signed integer.
    Int(u16),
    /// Named bundle of fields, packed most-significant-first.
    Record(RecordType),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordType {
    pub name: String,
    pub fields: Vec<(String, DataType)>,
}

impl DataType {
    /// Total width in bits.
    pub fn bits(&self) -> u16 {
        match self {
            DataType::Bits(w) | DataType::UInt(w) | DataType::Int(w) => *w,
            DataType::Record(r) => r.fields.iter().map(|(_, t)| t.bits()).sum(),
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, DataType::Int(_))
    }

    pub fn is_record(&self) -> bool {
        matches!(self, DataType::Record(_))
    }

    /// Structural equality with the record/raw-bits fallback: a record and
    /// a `Bits` value are interchangeable when their total widths agree,
    /// since records are just named views over a packed bit vector.
    pub fn accepts(&self, value: &DataType) -> bool {
        if self == value {
            return true;
        }
        match (self, value) {
            (DataType::Record(_), DataType::Bits(_))
            | (DataType::Bits(_), DataType::Record(_)) => self.bits() == value.bits(),
            _ => false,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Bits(w) => write!(f, "b{}", w),
            DataType::UInt(w) => write!(f, "u{}", w),
            DataType::Int(w) => write!(f, "i{}", w),
            DataType::Record(r) => write!(f, "{}<{}b>", r.name, self.bits()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair_record() -> DataType {
        DataType::Record(RecordType {
            name: "pair".into(),
            fields: vec![
                ("hi".into(), DataType::UInt(16)),
                ("lo".into(), DataType::UInt(16)),
            ],
        })
    }

    #[test]
    fn record_width_is_field_sum() {
        assert_eq!(pair_record().bits(), 32);
    }

    #[test]
    fn record_accepts_matching_raw_bits() {
        let r = pair_record();
        assert!(r.accepts(&DataType::Bits(32)));
        assert!(!r.accepts(&DataType::Bits(31)));
        assert!(!r.accepts(&DataType::UInt(32)));
    }

    #[test]
    fn display_forms() {
        assert_eq!(DataType::UInt(8).to_string(), "u8");
        assert_eq!(DataType::Int(32).to_string(), "i32");
        assert_eq!(pair_record().to_string(), "pair<32b>");
    }
}
