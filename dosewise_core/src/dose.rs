//! Exact rational dose quantities.
//!
//! Doses are stored as reduced fractions plus a unit so that half and
//! quarter tablets never accumulate floating-point drift. Float
//! conversion exists for display only.

use crate::{Error, Result};
use num_rational::Ratio;
use num_traits::CheckedAdd;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::ops::Add;

/// A dose expressed as `numerator/denominator unit`, always in lowest terms
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "DoseRecord")]
pub struct DoseQuantity {
    amount: Ratio<u64>,
    unit: String,
}

/// Wire shape used when decoding; every decoded dose passes through `normalize`
#[derive(Deserialize)]
struct DoseRecord {
    numerator: i64,
    denominator: i64,
    unit: String,
}

impl TryFrom<DoseRecord> for DoseQuantity {
    type Error = Error;

    fn try_from(record: DoseRecord) -> Result<Self> {
        DoseQuantity::normalize(record.numerator, record.denominator, record.unit)
    }
}

impl Serialize for DoseQuantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut record = serializer.serialize_struct("DoseQuantity", 3)?;
        record.serialize_field("numerator", self.amount.numer())?;
        record.serialize_field("denominator", self.amount.denom())?;
        record.serialize_field("unit", &self.unit)?;
        record.end()
    }
}

impl DoseQuantity {
    /// Build a dose reduced to lowest terms.
    ///
    /// Fails on a zero denominator or a negative numerator/denominator.
    /// A zero numerator always normalizes to `0/1`.
    pub fn normalize(numerator: i64, denominator: i64, unit: impl Into<String>) -> Result<Self> {
        if denominator == 0 {
            return Err(Error::Dose("denominator cannot be zero".into()));
        }
        if numerator < 0 || denominator < 0 {
            return Err(Error::Dose(format!(
                "numerator and denominator must be non-negative (got {}/{})",
                numerator, denominator
            )));
        }
        Ok(Self {
            amount: Ratio::new(numerator as u64, denominator as u64),
            unit: unit.into(),
        })
    }

    /// Whole-number dose, e.g. `1 tablet`
    pub fn whole(amount: u64, unit: impl Into<String>) -> Self {
        Self {
            amount: Ratio::from_integer(amount),
            unit: unit.into(),
        }
    }

    /// Parse `"2"` or `"1/2"` as an amount of `unit`
    pub fn parse(amount: &str, unit: impl Into<String>) -> Result<Self> {
        let invalid = || Error::Dose(format!("invalid dose amount {:?}", amount));
        let (num, den) = match amount.trim().split_once('/') {
            Some((n, d)) => (n.trim(), d.trim()),
            None => (amount.trim(), "1"),
        };
        let numerator: i64 = num.parse().map_err(|_| invalid())?;
        let denominator: i64 = den.parse().map_err(|_| invalid())?;
        Self::normalize(numerator, denominator, unit)
    }

    pub fn numerator(&self) -> u64 {
        *self.amount.numer()
    }

    pub fn denominator(&self) -> u64 {
        *self.amount.denom()
    }

    pub fn amount(&self) -> Ratio<u64> {
        self.amount
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Sum of two doses of the same unit
    pub fn checked_add(&self, other: &DoseQuantity) -> Result<DoseQuantity> {
        if self.unit != other.unit {
            return Err(Error::Dose(format!(
                "cannot add doses with different units: {} vs {}",
                self.unit, other.unit
            )));
        }
        let amount = CheckedAdd::checked_add(&self.amount, &other.amount)
            .ok_or_else(|| Error::Dose("dose arithmetic overflow".into()))?;
        Ok(Self {
            amount,
            unit: self.unit.clone(),
        })
    }

    /// Approximate decimal value. Display and logging only.
    pub fn to_decimal_approx(&self) -> f64 {
        self.numerator() as f64 / self.denominator() as f64
    }

    /// Human-readable form: `"1 tablet"` or `"1/2 tablet"`
    pub fn format(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DoseQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.amount.is_integer() {
            write!(f, "{} {}", self.numerator(), self.unit)
        } else {
            write!(f, "{}/{} {}", self.numerator(), self.denominator(), self.unit)
        }
    }
}

impl Add for &DoseQuantity {
    type Output = Result<DoseQuantity>;

    fn add(self, rhs: &DoseQuantity) -> Self::Output {
        self.checked_add(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whole_number() {
        let dose = DoseQuantity::normalize(4, 2, "tablet").unwrap();
        assert_eq!(dose.numerator(), 2);
        assert_eq!(dose.denominator(), 1);
        assert_eq!(dose.format(), "2 tablet");
    }

    #[test]
    fn test_normalize_fraction() {
        let dose = DoseQuantity::normalize(2, 4, "tablet").unwrap();
        assert_eq!(dose.numerator(), 1);
        assert_eq!(dose.denominator(), 2);
        assert_eq!(dose.format(), "1/2 tablet");
    }

    #[test]
    fn test_zero_normalizes_to_zero_over_one() {
        let dose = DoseQuantity::normalize(0, 8, "ml").unwrap();
        assert_eq!((dose.numerator(), dose.denominator()), (0, 1));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for (n, d) in [(6, 8), (5, 2), (0, 3), (9, 3), (7, 7)] {
            let once = DoseQuantity::normalize(n, d, "tablet").unwrap();
            let twice = DoseQuantity::normalize(
                once.numerator() as i64,
                once.denominator() as i64,
                "tablet",
            )
            .unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_zero_denominator_rejected() {
        let err = DoseQuantity::normalize(1, 0, "tablet").unwrap_err();
        assert!(matches!(err, Error::Dose(_)));
    }

    #[test]
    fn test_negative_values_rejected() {
        assert!(DoseQuantity::normalize(-1, 2, "tablet").is_err());
        assert!(DoseQuantity::normalize(1, -2, "tablet").is_err());
    }

    #[test]
    fn test_addition_same_unit() {
        let half = DoseQuantity::normalize(1, 2, "tablet").unwrap();
        let quarter = DoseQuantity::normalize(1, 4, "tablet").unwrap();
        let sum = (&half + &quarter).unwrap();
        assert_eq!(sum, DoseQuantity::normalize(3, 4, "tablet").unwrap());
        assert_eq!(sum.format(), "3/4 tablet");
    }

    #[test]
    fn test_addition_different_unit_rejected() {
        let tablet = DoseQuantity::whole(1, "tablet");
        let ml = DoseQuantity::whole(1, "ml");
        assert!(matches!(tablet.checked_add(&ml), Err(Error::Dose(_))));
    }

    #[test]
    fn test_addition_overflow_is_an_error() {
        let a = DoseQuantity::normalize(1, 1 << 33, "ml").unwrap();
        let b = DoseQuantity::normalize(1, (1 << 33) - 1, "ml").unwrap();
        let err = a.checked_add(&b).unwrap_err();
        assert!(matches!(err, Error::Dose(ref msg) if msg.contains("overflow")));
    }

    #[test]
    fn test_addition_with_large_shared_denominator() {
        let a = DoseQuantity::normalize(1, 1 << 40, "ml").unwrap();
        let b = DoseQuantity::normalize(1, 1 << 40, "ml").unwrap();
        let sum = a.checked_add(&b).unwrap();
        assert_eq!((sum.numerator(), sum.denominator()), (1, 1 << 39));
    }

    #[test]
    fn test_decimal_approx() {
        let dose = DoseQuantity::normalize(5, 2, "ml").unwrap();
        assert_eq!(dose.to_decimal_approx(), 2.5);
    }

    #[test]
    fn test_parse_amounts() {
        assert_eq!(
            DoseQuantity::parse("1/2", "tablet").unwrap(),
            DoseQuantity::normalize(1, 2, "tablet").unwrap()
        );
        assert_eq!(
            DoseQuantity::parse("3", "puff").unwrap(),
            DoseQuantity::whole(3, "puff")
        );
        assert!(DoseQuantity::parse("half", "tablet").is_err());
        assert!(DoseQuantity::parse("1/0", "tablet").is_err());
    }

    #[test]
    fn test_record_roundtrip() {
        let dose = DoseQuantity::normalize(1, 4, "tablet").unwrap();
        let json = serde_json::to_value(&dose).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"numerator": 1, "denominator": 4, "unit": "tablet"})
        );
        let back: DoseQuantity = serde_json::from_value(json).unwrap();
        assert_eq!(back, dose);
    }

    #[test]
    fn test_decode_normalizes_and_validates() {
        let dose: DoseQuantity =
            serde_json::from_str(r#"{"numerator": 2, "denominator": 4, "unit": "tablet"}"#)
                .unwrap();
        assert_eq!(dose.format(), "1/2 tablet");

        let bad = serde_json::from_str::<DoseQuantity>(
            r#"{"numerator": 1, "denominator": 0, "unit": "tablet"}"#,
        );
        assert!(bad.is_err());
    }
}
