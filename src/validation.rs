//! Field normalization and validation
//!
//! Helpers shared by every record type. Each one either returns the
//! normalized value or a [`RecordError::Validation`] naming the field and
//! what it accepts.

use crate::catalog::{INTERFERENCIAS_AEREAS, SIN_INTERFERENCIA};
use crate::error::{RecordError, Result};
use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$").expect("email pattern is valid"))
}

/// Collapse whitespace runs and trim the ends
fn squash(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn capitalize_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

/// `" la  pampa "` → `"La Pampa"`
pub fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(capitalize_word)
        .collect::<Vec<_>>()
        .join(" ")
}

/// First letter upper-case, the rest lower-case: `"QUERCUS robur"` → `"Quercus robur"`
pub fn capitalize(value: &str) -> String {
    capitalize_word(&squash(value))
}

/// A string that must be present after trimming
pub fn required(field: &'static str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RecordError::validation(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

/// Trim an optional string; blank becomes `None`
pub fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Match `value` case-insensitively against `allowed`, returning the
/// canonical spelling
pub fn one_of(field: &'static str, value: &str, allowed: &'static [&'static str]) -> Result<&'static str> {
    let wanted = value.trim().to_lowercase();
    allowed
        .iter()
        .copied()
        .find(|candidate| candidate.to_lowercase() == wanted)
        .ok_or_else(|| {
            RecordError::validation(
                field,
                format!("'{}' is not one of: {}", value.trim(), allowed.join(", ")),
            )
        })
}

pub fn optional_one_of(
    field: &'static str,
    value: Option<String>,
    allowed: &'static [&'static str],
) -> Result<Option<String>> {
    match optional(value) {
        Some(v) => Ok(Some(one_of(field, &v, allowed)?.to_string())),
        None => Ok(None),
    }
}

/// A number inside `[min, max]`
pub fn within(field: &'static str, value: f64, min: f64, max: f64) -> Result<f64> {
    if !value.is_finite() || value < min || value > max {
        return Err(RecordError::validation(
            field,
            format!("{} is outside [{}, {}]", value, min, max),
        ));
    }
    Ok(value)
}

pub fn optional_within(field: &'static str, value: Option<f64>, min: f64, max: f64) -> Result<Option<f64>> {
    value.map(|v| within(field, v, min, max)).transpose()
}

pub fn non_negative(field: &'static str, value: Option<f64>) -> Result<Option<f64>> {
    value.map(|v| within(field, v, 0.0, f64::MAX)).transpose()
}

pub fn non_negative_int(field: &'static str, value: Option<i32>) -> Result<Option<i32>> {
    match value {
        Some(v) if v < 0 => Err(RecordError::validation(field, format!("{} must not be negative", v))),
        other => Ok(other),
    }
}

pub fn latitude(field: &'static str, value: Option<f64>) -> Result<Option<f64>> {
    optional_within(field, value, -90.0, 90.0)
}

pub fn longitude(field: &'static str, value: Option<f64>) -> Result<Option<f64>> {
    optional_within(field, value, -180.0, 180.0)
}

/// Trimmed, lower-cased email with a `local@domain.tld` shape
pub fn email(field: &'static str, value: &str) -> Result<String> {
    let normalized = required(field, value)?.to_lowercase();
    if !email_pattern().is_match(&normalized) {
        return Err(RecordError::validation(field, format!("'{}' is not a valid email", normalized)));
    }
    Ok(normalized)
}

pub fn not_in_future(field: &'static str, date: NaiveDate, today: NaiveDate) -> Result<NaiveDate> {
    if date > today {
        return Err(RecordError::validation(
            field,
            format!("{} is after today ({})", date, today),
        ));
    }
    Ok(date)
}

pub fn optional_not_in_future(
    field: &'static str,
    date: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<Option<NaiveDate>> {
    date.map(|d| not_in_future(field, d, today)).transpose()
}

/// A `"lat, long"` pair, re-rendered in canonical form
pub fn coordinates(field: &'static str, value: Option<String>) -> Result<Option<String>> {
    let Some(raw) = optional(value) else {
        return Ok(None);
    };
    let invalid = || RecordError::validation(field, format!("'{}' is not a 'latitude, longitude' pair", raw));

    let mut parts = raw.split(',').map(str::trim);
    let (Some(lat), Some(long), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    let lat: f64 = lat.parse().map_err(|_| invalid())?;
    let long: f64 = long.parse().map_err(|_| invalid())?;
    within(field, lat, -90.0, 90.0)?;
    within(field, long, -180.0, 180.0)?;
    Ok(Some(format!("{}, {}", lat, long)))
}

/// Aerial interference level and its free-text specification.
///
/// A level other than `no` requires a specification; no level (or `no`)
/// forbids one.
pub fn aerial_interference(
    level: Option<String>,
    specification: Option<String>,
) -> Result<(Option<String>, Option<String>)> {
    let level = optional_one_of("interferencia_aerea", level, INTERFERENCIAS_AEREAS)?;
    let specification = optional(specification);
    let present = level.as_deref().is_some_and(|l| l != SIN_INTERFERENCIA);

    match (present, &specification) {
        (true, None) => Err(RecordError::validation(
            "especificacion_interferencia",
            "required when interferencia_aerea is set",
        )),
        (false, Some(_)) => Err(RecordError::validation(
            "especificacion_interferencia",
            "must be empty when there is no aerial interference",
        )),
        _ => Ok((level, specification)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ALTURAS, ORIGENES};
    use proptest::prelude::*;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case(" la pampa "), "La Pampa");
        assert_eq!(title_case("LA PAMPA"), "La Pampa");
        assert_eq!(title_case("santiago   del estero"), "Santiago Del Estero");
        assert_eq!(title_case("córdoba"), "Córdoba");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("  QUERCUS   robur "), "Quercus robur");
        assert_eq!(capitalize("jacaranda mimosifolia"), "Jacaranda mimosifolia");
    }

    #[test]
    fn test_required_and_optional() {
        assert_eq!(required("nombre", "  x ").unwrap(), "x");
        assert!(required("nombre", "   ").is_err());
        assert_eq!(optional(Some("  ".into())), None);
        assert_eq!(optional(Some(" barrio norte ".into())), Some("barrio norte".into()));
        assert_eq!(optional(None), None);
    }

    #[test]
    fn test_one_of_names_field_and_set() {
        let err = one_of("altura", "10 m", ALTURAS).unwrap_err();
        assert_eq!(err.field(), Some("altura"));
        assert!(err.to_string().contains("1-2 m, >3 m, 3-5 m, > 5m"));
    }

    #[test]
    fn test_one_of_returns_canonical_spelling() {
        assert_eq!(one_of("origen", " NATIVO ", ORIGENES).unwrap(), "nativo");
        assert_eq!(one_of("altura", "> 5M", ALTURAS).unwrap(), "> 5m");
    }

    #[test]
    fn test_ranges() {
        assert!(latitude("latitud", Some(-90.0)).is_ok());
        assert!(latitude("latitud", Some(90.5)).is_err());
        assert!(longitude("longitud", Some(-180.1)).is_err());
        assert!(longitude("longitud", None).unwrap().is_none());
        assert!(non_negative("ancho_vereda", Some(-0.1)).is_err());
        assert!(non_negative("ancho_vereda", Some(f64::NAN)).is_err());
        assert!(non_negative_int("edad", Some(-1)).is_err());
        assert_eq!(non_negative_int("edad", Some(12)).unwrap(), Some(12));
    }

    #[test]
    fn test_email() {
        assert_eq!(email("email", "  Ana.Perez@Municipio.GOB.ar ").unwrap(), "ana.perez@municipio.gob.ar");
        assert!(email("email", "ana@localhost").is_err());
        assert!(email("email", "ana perez@x.org").is_err());
        assert!(email("email", "").is_err());
    }

    #[test]
    fn test_not_in_future() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        assert!(not_in_future("fecha_censo", today, today).is_ok());
        let tomorrow = today.succ_opt().unwrap();
        let err = not_in_future("fecha_censo", tomorrow, today).unwrap_err();
        assert_eq!(err.field(), Some("fecha_censo"));
    }

    #[test]
    fn test_coordinates() {
        assert_eq!(
            coordinates("ubicacion", Some(" -34.6037 ,-58.3816 ".into())).unwrap(),
            Some("-34.6037, -58.3816".into())
        );
        assert_eq!(coordinates("ubicacion", Some("".into())).unwrap(), None);
        assert!(coordinates("ubicacion", Some("-34.6".into())).is_err());
        assert!(coordinates("ubicacion", Some("1, 2, 3".into())).is_err());
        assert!(coordinates("ubicacion", Some("95, 10".into())).is_err());
        assert!(coordinates("ubicacion", Some("north, south".into())).is_err());
    }

    #[test]
    fn test_aerial_interference_both_directions() {
        // set without specification
        let err = aerial_interference(Some("alta".into()), None).unwrap_err();
        assert_eq!(err.field(), Some("especificacion_interferencia"));
        let err = aerial_interference(Some("media".into()), Some("   ".into())).unwrap_err();
        assert_eq!(err.field(), Some("especificacion_interferencia"));

        // unset with specification
        assert!(aerial_interference(None, Some("cables".into())).is_err());
        assert!(aerial_interference(Some("no".into()), Some("cables".into())).is_err());

        // consistent
        assert_eq!(
            aerial_interference(Some("Alta".into()), Some(" cableado de media tension ".into())).unwrap(),
            (Some("alta".into()), Some("cableado de media tension".into()))
        );
        assert_eq!(aerial_interference(Some("no".into()), None).unwrap(), (Some("no".into()), None));
        assert_eq!(aerial_interference(None, None).unwrap(), (None, None));
    }

    #[test]
    fn test_aerial_interference_rejects_unknown_level() {
        let err = aerial_interference(Some("muy alta".into()), Some("x".into())).unwrap_err();
        assert_eq!(err.field(), Some("interferencia_aerea"));
    }

    proptest! {
        #[test]
        fn prop_title_case_is_idempotent(s in "[a-zA-ZáéíóúñÑ ]{0,40}") {
            let once = title_case(&s);
            prop_assert_eq!(title_case(&once), once.clone());
            prop_assert_eq!(once.trim(), once.as_str());
        }

        #[test]
        fn prop_title_case_ignores_input_case(s in "[a-z ]{0,40}") {
            prop_assert_eq!(title_case(&s), title_case(&s.to_uppercase()));
        }

        #[test]
        fn prop_every_height_is_accepted_in_any_case(idx in 0..ALTURAS.len(), upper in any::<bool>()) {
            let value = if upper { ALTURAS[idx].to_uppercase() } else { ALTURAS[idx].to_string() };
            prop_assert_eq!(one_of("altura", &value, ALTURAS).unwrap(), ALTURAS[idx]);
        }
    }
}
