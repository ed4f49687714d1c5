//! Typed reads of resolved values.
//!
//! A literal keeps its source text, so `"8080"`, `8080` and `${port}` all
//! convert to a `u16` the same way. Conversions never panic; anything that
//! does not fit comes back as a [`ConversionError`].

use crate::error::ConversionError;
use crate::value::Value;
use serde::Serialize;
use std::fmt;
use std::num::IntErrorKind;
use std::time::Duration;

/// Types a [`Value`] can be read as.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, ConversionError>;
}

/// Text of a scalar, or why there is none.
fn scalar<'v>(value: &'v Value, target: &'static str) -> Result<&'v str, ConversionError> {
    match value {
        Value::Literal(literal) if literal.is_null() => Err(ConversionError::Null { target }),
        Value::Literal(literal) => Ok(literal.text()),
        other => Err(ConversionError::WrongType {
            expected: target,
            found: other.type_name(),
        }),
    }
}

fn invalid(text: &str, target: &'static str) -> ConversionError {
    ConversionError::InvalidFormat {
        value: text.to_string(),
        target,
    }
}

fn overflow(text: &str, target: &'static str) -> ConversionError {
    ConversionError::Overflow {
        value: text.to_string(),
        target,
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

/// A bound `null` reads as the empty string.
impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        if value.is_null() {
            return Ok(String::new());
        }
        scalar(value, "string").map(str::to_string)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        let text = scalar(value, "boolean")?;
        match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" => Ok(true),
            "false" | "no" | "off" => Ok(false),
            _ => Err(invalid(text, "boolean")),
        }
    }
}

/// Parses decimal or `0x` hexadecimal integers. Floating point text with no
/// fractional part (`1e3`, `2.0`) is accepted as well.
fn parse_integer(text: &str, target: &'static str) -> Result<i128, ConversionError> {
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let signed = |text: &str| text.starts_with(['+', '-']);
    if negative && signed(digits) {
        return Err(invalid(text, target));
    }
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) if signed(hex) => return Err(invalid(text, target)),
        Some(hex) => i128::from_str_radix(hex, 16),
        None => digits.parse::<i128>(),
    };

    match magnitude {
        Ok(magnitude) if negative => magnitude
            .checked_neg()
            .ok_or_else(|| overflow(text, target)),
        Ok(magnitude) => Ok(magnitude),
        Err(err) if matches!(err.kind(), IntErrorKind::PosOverflow | IntErrorKind::NegOverflow) => {
            Err(overflow(text, target))
        }
        Err(_) => match trimmed.parse::<f64>() {
            Ok(float) if float.is_finite() && float.fract() == 0.0 => {
                if float.abs() < i128::MAX as f64 {
                    Ok(float as i128)
                } else {
                    Err(overflow(text, target))
                }
            }
            _ => Err(invalid(text, target)),
        },
    }
}

macro_rules! impl_from_value_int {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self, ConversionError> {
                    let text = scalar(value, $name)?;
                    let wide = parse_integer(text, $name)?;
                    <$ty>::try_from(wide).map_err(|_| overflow(text, $name))
                }
            }
        )*
    };
}

impl_from_value_int! {
    i8 => "i8",
    i16 => "i16",
    i32 => "i32",
    i64 => "i64",
    isize => "isize",
    u8 => "u8",
    u16 => "u16",
    u32 => "u32",
    u64 => "u64",
    usize => "usize",
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        let text = scalar(value, "f64")?;
        text.trim().parse::<f64>().map_err(|_| invalid(text, "f64"))
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        let text = scalar(value, "f32")?;
        let wide = text.trim().parse::<f64>().map_err(|_| invalid(text, "f32"))?;
        if wide.is_finite() && wide.abs() > f64::from(f32::MAX) {
            return Err(overflow(text, "f32"));
        }
        Ok(wide as f32)
    }
}

impl FromValue for Duration {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        parse_duration(scalar(value, "duration")?)
    }
}

impl FromValue for ByteSize {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        parse_bytes(scalar(value, "byte size")?)
    }
}

/// Arrays convert element by element; a scalar is promoted to a
/// one-element list and `null` reads as an empty list.
impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Array(items) => items.iter().map(T::from_value).collect(),
            null if null.is_null() => Ok(Vec::new()),
            other => Ok(vec![T::from_value(other)?]),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        if value.is_null() {
            return Ok(None);
        }
        T::from_value(value).map(Some)
    }
}

/// Splits `"10 ms"` into `("10", "ms")`.
fn split_quantity(text: &str) -> (&str, &str) {
    let trimmed = text.trim();
    let unit_start = trimmed
        .find(|c: char| c.is_alphabetic())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(unit_start);
    (number.trim(), unit.trim())
}

/// `quantity * multiplier` as a whole number, exact when `quantity` is an
/// integer and rounded otherwise.
fn scale(
    text: &str,
    quantity: &str,
    multiplier: u128,
    target: &'static str,
) -> Result<u64, ConversionError> {
    if quantity.starts_with('-') {
        return Err(invalid(text, target));
    }
    let scaled = match quantity.parse::<u128>() {
        Ok(whole) => whole.checked_mul(multiplier),
        Err(_) => {
            let fractional = quantity.parse::<f64>().map_err(|_| invalid(text, target))?;
            if !fractional.is_finite() {
                return Err(invalid(text, target));
            }
            let product = (fractional * multiplier as f64).round();
            (product <= u64::MAX as f64).then_some(product as u128)
        }
    };
    scaled
        .and_then(|value| u64::try_from(value).ok())
        .ok_or_else(|| overflow(text, target))
}

fn duration_unit(unit: &str) -> Option<u128> {
    let nanos = match unit {
        "ns" | "nano" | "nanos" | "nanosecond" | "nanoseconds" => 1,
        "us" | "µs" | "micro" | "micros" | "microsecond" | "microseconds" => 1_000,
        "" | "ms" | "milli" | "millis" | "millisecond" | "milliseconds" => 1_000_000,
        "s" | "second" | "seconds" => 1_000_000_000,
        "m" | "minute" | "minutes" => 60 * 1_000_000_000,
        "h" | "hour" | "hours" => 60 * 60 * 1_000_000_000,
        "d" | "day" | "days" => 24 * 60 * 60 * 1_000_000_000,
        _ => return None,
    };
    Some(nanos)
}

/// Parses `"10s"`, `"1.5 hours"` or a bare number of milliseconds.
pub fn parse_duration(text: &str) -> Result<Duration, ConversionError> {
    let (quantity, unit) = split_quantity(text);
    if quantity.is_empty() {
        return Err(invalid(text, "duration"));
    }
    let multiplier = duration_unit(unit).ok_or_else(|| ConversionError::InvalidUnit {
        unit: unit.to_string(),
        target: "duration",
    })?;
    scale(text, quantity, multiplier, "duration").map(Duration::from_nanos)
}

/// A number of bytes read from text like `"512k"` or `"1.5 GiB"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub fn bytes(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.0)
    }
}

/// (single-letter prefix, decimal name, binary name)
const BYTE_PREFIXES: [(&str, &str, &str); 6] = [
    ("k", "kilo", "kibi"),
    ("m", "mega", "mebi"),
    ("g", "giga", "gibi"),
    ("t", "tera", "tebi"),
    ("p", "peta", "pebi"),
    ("e", "exa", "exbi"),
];

fn byte_unit(unit: &str) -> Option<u128> {
    let unit = unit.to_ascii_lowercase();
    // "kilobytes" and "kilobyte" name the same unit.
    let name = unit
        .strip_suffix("bytes")
        .map(|stem| format!("{stem}byte"))
        .unwrap_or_else(|| unit.clone());
    if matches!(name.as_str(), "" | "b" | "byte") {
        return Some(1);
    }

    for (power, (short, decimal, binary)) in (1u32..).zip(BYTE_PREFIXES) {
        let binary_forms = [
            short.to_string(),
            format!("{short}i"),
            format!("{short}ib"),
            format!("{binary}byte"),
        ];
        if binary_forms.contains(&name) {
            return Some(1024u128.pow(power));
        }
        if name == format!("{short}b") || name == format!("{decimal}byte") {
            return Some(1000u128.pow(power));
        }
    }
    None
}

/// Parses a byte count with an optional unit. Units are case-insensitive;
/// `k`, `Ki` and `KiB` are powers of 1024 while `kB` and `kilobytes` are
/// powers of 1000.
pub fn parse_bytes(text: &str) -> Result<ByteSize, ConversionError> {
    let (quantity, unit) = split_quantity(text);
    if quantity.is_empty() {
        return Err(invalid(text, "byte size"));
    }
    let multiplier = byte_unit(unit).ok_or_else(|| ConversionError::InvalidUnit {
        unit: unit.to_string(),
        target: "byte size",
    })?;
    scale(text, quantity, multiplier, "byte size").map(ByteSize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Literal, LiteralKind};

    fn unquoted(text: &str) -> Value {
        Value::Literal(Literal::unquoted(text))
    }

    #[test]
    fn test_booleans() {
        for text in ["true", "yes", "ON", "True"] {
            assert!(bool::from_value(&unquoted(text)).unwrap(), "{text}");
        }
        for text in ["false", "no", "off"] {
            assert!(!bool::from_value(&unquoted(text)).unwrap(), "{text}");
        }
        assert!(matches!(
            bool::from_value(&unquoted("maybe")),
            Err(ConversionError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_integer_sign_is_read_once() {
        assert_eq!(i64::from_value(&unquoted("-5")), Ok(-5));
        assert_eq!(i64::from_value(&unquoted("-0x10")), Ok(-16));
        for text in ["--5", "-+5", "0x-1", "0x+1", "-0x-1"] {
            assert!(
                matches!(
                    i64::from_value(&unquoted(text)),
                    Err(ConversionError::InvalidFormat { .. })
                ),
                "{text}"
            );
        }
    }

    #[test]
    fn test_negating_the_largest_magnitude_is_an_error() {
        assert!(parse_integer("--170141183460469231731687303715884105728", "i64").is_err());
        assert!(matches!(
            parse_integer("-170141183460469231731687303715884105728", "i64"),
            Err(ConversionError::Overflow { .. })
        ));
        assert!(matches!(
            i64::from_value(&unquoted("-9223372036854775809")),
            Err(ConversionError::Overflow { target: "i64", .. })
        ));
    }

    #[test]
    fn test_integer_widths_and_overflow() {
        assert_eq!(u8::from_value(&unquoted("255")), Ok(255));
        assert_eq!(i8::from_value(&unquoted("-128")), Ok(-128));
        assert!(matches!(
            u8::from_value(&unquoted("256")),
            Err(ConversionError::Overflow { target: "u8", .. })
        ));
        assert!(matches!(
            i8::from_value(&unquoted("128")),
            Err(ConversionError::Overflow { target: "i8", .. })
        ));
        assert!(matches!(
            u32::from_value(&unquoted("-1")),
            Err(ConversionError::Overflow { .. })
        ));
        assert!(matches!(
            i64::from_value(&unquoted("99999999999999999999999999999999999999999")),
            Err(ConversionError::Overflow { .. })
        ));
    }

    #[test]
    fn test_integer_forms() {
        assert_eq!(i32::from_value(&unquoted("0x1F")), Ok(31));
        assert_eq!(i64::from_value(&unquoted("1e3")), Ok(1000));
        assert_eq!(i64::from_value(&Value::from("42")), Ok(42));
        assert!(matches!(
            i32::from_value(&unquoted("1.5")),
            Err(ConversionError::InvalidFormat { .. })
        ));
        assert!(matches!(
            i32::from_value(&unquoted("abc")),
            Err(ConversionError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_floats() {
        assert_eq!(f64::from_value(&unquoted("1.5e2")), Ok(150.0));
        assert_eq!(f32::from_value(&unquoted("0.25")), Ok(0.25));
        assert!(matches!(
            f32::from_value(&unquoted("1e300")),
            Err(ConversionError::Overflow { .. })
        ));
    }

    #[test]
    fn test_null_handling() {
        let null = Value::null();
        assert_eq!(String::from_value(&null), Ok(String::new()));
        assert_eq!(Vec::<i32>::from_value(&null), Ok(Vec::new()));
        assert_eq!(Option::<i32>::from_value(&null), Ok(None));
        assert_eq!(
            i32::from_value(&null),
            Err(ConversionError::Null { target: "i32" })
        );
    }

    #[test]
    fn test_wrong_type() {
        let array = Value::Array(vec![unquoted("1")]);
        assert_eq!(
            String::from_value(&array),
            Err(ConversionError::WrongType {
                expected: "string",
                found: "array"
            })
        );
        assert!(matches!(
            i32::from_value(&Value::empty_object()),
            Err(ConversionError::WrongType { found: "object", .. })
        ));
    }

    #[test]
    fn test_scalar_promotes_to_list() {
        assert_eq!(Vec::<u16>::from_value(&unquoted("80")), Ok(vec![80]));
        let array = Value::Array(vec![unquoted("1"), unquoted("2")]);
        assert_eq!(Vec::<u16>::from_value(&array), Ok(vec![1, 2]));
        let bad = Value::Array(vec![unquoted("1"), unquoted("x")]);
        assert!(Vec::<u16>::from_value(&bad).is_err());
    }

    #[test]
    fn test_durations() {
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("500"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("10 seconds"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1.5h"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration("2d"), Ok(Duration::from_secs(172_800)));
        assert_eq!(parse_duration("250us"), Ok(Duration::from_micros(250)));
        assert_eq!(parse_duration("7ns"), Ok(Duration::from_nanos(7)));
        assert!(matches!(
            parse_duration("5 fortnights"),
            Err(ConversionError::InvalidUnit { .. })
        ));
        assert!(matches!(
            parse_duration("-1s"),
            Err(ConversionError::InvalidFormat { .. })
        ));
        assert!(matches!(
            parse_duration("s"),
            Err(ConversionError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_duration_from_number_literal() {
        let value = Value::Literal(Literal::new("250", LiteralKind::Number));
        assert_eq!(Duration::from_value(&value), Ok(Duration::from_millis(250)));
    }

    #[test]
    fn test_byte_sizes() {
        assert_eq!(parse_bytes("512"), Ok(ByteSize(512)));
        assert_eq!(parse_bytes("10kB"), Ok(ByteSize(10_000)));
        assert_eq!(parse_bytes("1KiB"), Ok(ByteSize(1024)));
        assert_eq!(parse_bytes("1.5k"), Ok(ByteSize(1536)));
        assert_eq!(parse_bytes("1 MB"), Ok(ByteSize(1_000_000)));
        assert_eq!(parse_bytes("2 megabytes"), Ok(ByteSize(2_000_000)));
        assert_eq!(parse_bytes("1 gibibyte"), Ok(ByteSize(1 << 30)));
        assert_eq!(parse_bytes("3 bytes"), Ok(ByteSize(3)));
        assert!(matches!(
            parse_bytes("20 EiB"),
            Err(ConversionError::Overflow { .. })
        ));
        assert!(matches!(
            parse_bytes("1 parsec"),
            Err(ConversionError::InvalidUnit { .. })
        ));
    }
}
