// API error path tests
// These cover error variants, conversions and edge cases at the Config layer

use hocon_core::error::ConversionError;
use hocon_core::{parse_str, parse_with, EnvSource, HoconError, ParseOptions};

fn conversion_error(err: HoconError) -> ConversionError {
    match err {
        HoconError::Conversion { source, .. } => source,
        other => panic!("expected a conversion error, got {other:?}"),
    }
}

#[test]
fn test_api_parse_error() {
    let result = parse_str("{ invalid syntax");
    assert!(matches!(result, Err(HoconError::Parser(_))));
}

#[test]
fn test_api_resolve_error() {
    let options = ParseOptions::new().env(EnvSource::Disabled);
    let result = parse_with("value = ${missing_key}", &options);
    assert!(matches!(result, Err(HoconError::Resolve(_))));
}

#[test]
fn test_api_origin_appears_in_diagnostics() {
    let options = ParseOptions::new().origin("settings/app.conf");
    let err = parse_with("a = \"open", &options).unwrap_err();
    let rendered = format!("{:?}", miette::Report::new(err));
    assert!(rendered.contains("settings/app.conf"), "{rendered}");
}

#[test]
fn test_api_empty_document() {
    let config = parse_str("").unwrap();
    assert!(config.keys().is_empty());
    let config = parse_str("{}").unwrap();
    assert!(config.keys().is_empty());
}

#[test]
fn test_missing_path() {
    let config = parse_str("a = 1").unwrap();
    let err = config.get_string("b.c").unwrap_err();
    assert!(err.is_missing());
    match err {
        HoconError::Missing { path } => assert_eq!(path, "b.c"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_path_through_scalar_is_missing() {
    let config = parse_str("a = 1").unwrap();
    assert!(config.get_value("a.b").unwrap_err().is_missing());
}

#[test]
fn test_invalid_query_path() {
    let config = parse_str("a = 1").unwrap();
    let err = config.get_string("a..b").unwrap_err();
    assert!(matches!(err, HoconError::Path(_)));
}

#[test]
fn test_wrong_type() {
    let config = parse_str("obj { a = 1 }\nlist = [1, 2]").unwrap();
    assert!(matches!(
        conversion_error(config.get_string("obj").unwrap_err()),
        ConversionError::WrongType { .. }
    ));
    assert!(matches!(
        conversion_error(config.get_i32("list").unwrap_err()),
        ConversionError::WrongType { .. }
    ));
}

#[test]
fn test_invalid_number_and_bool() {
    let config = parse_str("n = twelve\nb = maybe").unwrap();
    assert!(matches!(
        conversion_error(config.get_i64("n").unwrap_err()),
        ConversionError::InvalidFormat { .. }
    ));
    assert!(matches!(
        conversion_error(config.get_bool("b").unwrap_err()),
        ConversionError::InvalidFormat { .. }
    ));
}

#[test]
fn test_unsigned_rejects_negative() {
    let config = parse_str("n = -1").unwrap();
    assert!(matches!(
        conversion_error(config.get_u64("n").unwrap_err()),
        ConversionError::Overflow { .. }
    ));
}

#[test]
fn test_null_for_value_types() {
    let config = parse_str("n = null").unwrap();
    assert!(matches!(
        conversion_error(config.get_i32("n").unwrap_err()),
        ConversionError::Null { .. }
    ));
    assert!(matches!(
        conversion_error(config.get_duration("n").unwrap_err()),
        ConversionError::Null { .. }
    ));
    // Reference-like types take their empty form.
    assert_eq!(config.get_string("n").unwrap(), "");
    assert!(config.get_list::<i32, _>("n").unwrap().is_empty());
    assert_eq!(config.get_opt::<i32, _>("n").unwrap(), None);
    assert!(config.is_null("n").unwrap());
}

#[test]
fn test_bad_duration_and_size_units() {
    let config = parse_str("d = 5 fortnights\ns = 3 parsecs").unwrap();
    assert!(matches!(
        conversion_error(config.get_duration("d").unwrap_err()),
        ConversionError::InvalidUnit { .. }
    ));
    assert!(matches!(
        conversion_error(config.get_bytes("s").unwrap_err()),
        ConversionError::InvalidUnit { .. }
    ));
}

#[test]
fn test_flatten_duplicate_key() {
    let config = parse_str("\"a.b\" = 1\na { b = 2 }").unwrap();
    let err = config.flatten(".").unwrap_err();
    assert!(matches!(err, HoconError::DuplicateKey { .. }));
    assert!(config.flatten("/").is_ok());
}
