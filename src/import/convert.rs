//! Conversion of cell values into typed record values.

use crate::import::mapping::TargetKind;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::number_format::format_datetime;
use crate::spreadsheet::number_format::format_number;
use crate::spreadsheet::SourceFormat;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Typed value stored in a record field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    String(String),
    Integer(i32),
    Long(i64),
    Decimal(Decimal),
    Boolean(bool),
    DateTime(NaiveDateTime),
}

impl Value {
    /// JSON form of the value. Decimals keep their exact digits, date-times use ISO 8601.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(text) => serde_json::Value::String(text.to_owned()),
            Self::Integer(value) => serde_json::Value::from(*value),
            Self::Long(value) => serde_json::Value::from(*value),
            Self::Decimal(value) => serde_json::Number::from_str(&value.to_string())
                .map(serde_json::Value::Number)
                .unwrap_or_else(|_| serde_json::Value::String(value.to_string())),
            Self::Boolean(value) => serde_json::Value::Bool(*value),
            Self::DateTime(value) => serde_json::Value::String(value.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Incompatible data conversion of {source_kind} value '{value}' into {target}")]
    IncompatibleConversion {
        value: String,
        source_kind: &'static str,
        target: String,
    },

    #[error("Unable to parse a source value: '{value}' into {target}")]
    InvalidValue {
        value: String,
        target: TargetKind,
        #[source]
        cause: ValueError,
    },
}

/// Why a value could not be parsed into its target kind.
#[derive(Error, Debug)]
pub enum ValueError {
    #[error("{0}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("{0}")]
    Decimal(#[from] rust_decimal::Error),

    #[error("value is out of range")]
    OutOfRange,

    #[error("value has a fractional part")]
    NotIntegral,

    #[error("value is not a finite number")]
    NotFinite,
}

/// Converts the value of `cell` into `target`.
///
/// Workbook cells are read through their formatted value, delimited text through the raw value.
/// An absent value converts to `None` for every target.
pub fn convert(cell: &Cell, format: SourceFormat, target: &TargetKind) -> Result<Option<Value>, ConversionError> {
    let value = match format {
        SourceFormat::Spreadsheet => cell.formatted_value.as_ref(),
        SourceFormat::DelimitedText => cell.raw_value.as_ref(),
    };
    let Some(value) = value else {
        return Ok(None);
    };

    let converted = match (value, target) {
        (_, TargetKind::Unsupported(_)) => None,

        (CellValue::Text(text), TargetKind::String) => Some(Value::String(text.to_owned())),
        (CellValue::Text(text), TargetKind::Integer) => Some(Value::Integer(parse_integer(text, target)?)),
        (CellValue::Text(text), TargetKind::Long) => Some(Value::Long(parse_integer(text, target)?)),
        (CellValue::Text(text), TargetKind::Decimal) => Some(Value::Decimal(parse_decimal(text, target)?)),
        (CellValue::Text(text), TargetKind::Boolean) => parse_boolean(text).map(Value::Boolean),
        (CellValue::Text(_), TargetKind::DateTime) => None,

        (CellValue::DateTime(datetime), TargetKind::String) => {
            let text = match &cell.display_mask {
                Some(mask) => format_datetime(datetime, mask),
                None => value.to_string(),
            };
            Some(Value::String(text))
        }
        (CellValue::DateTime(datetime), TargetKind::DateTime) => Some(Value::DateTime(*datetime)),
        (CellValue::DateTime(_), _) => None,

        (CellValue::Boolean(_), TargetKind::String) => Some(Value::String(value.to_string())),
        (CellValue::Boolean(flag), TargetKind::Integer) => Some(Value::Integer(i32::from(*flag))),
        (CellValue::Boolean(flag), TargetKind::Long) => Some(Value::Long(i64::from(*flag))),
        (CellValue::Boolean(flag), TargetKind::Decimal) => Some(Value::Decimal(Decimal::from(u8::from(*flag)))),
        (CellValue::Boolean(flag), TargetKind::Boolean) => Some(Value::Boolean(*flag)),
        (CellValue::Boolean(_), TargetKind::DateTime) => None,

        (CellValue::Number(number), TargetKind::String) => Some(Value::String(format_number(*number))),
        (CellValue::Number(number), TargetKind::Integer) => {
            let integral = to_integral(*number, target)?;
            let value = i32::try_from(integral).map_err(|_| invalid(value, target, ValueError::OutOfRange))?;
            Some(Value::Integer(value))
        }
        (CellValue::Number(number), TargetKind::Long) => Some(Value::Long(to_integral(*number, target)?)),
        (CellValue::Number(number), TargetKind::Decimal) => {
            if !number.is_finite() {
                return Err(invalid(value, target, ValueError::NotFinite));
            }
            let decimal = Decimal::from_str_exact(&format_number(*number)).map_err(|error| invalid(value, target, error.into()))?;
            Some(Value::Decimal(decimal))
        }
        (CellValue::Number(_), TargetKind::Boolean | TargetKind::DateTime) => None,
    };

    converted.map(Some).ok_or_else(|| ConversionError::IncompatibleConversion {
        value: value.to_string(),
        source_kind: value.kind_name(),
        target: target.to_string(),
    })
}

fn invalid(value: impl ToString, target: &TargetKind, cause: ValueError) -> ConversionError {
    ConversionError::InvalidValue {
        value: value.to_string(),
        target: target.to_owned(),
        cause,
    }
}

fn parse_integer<T: FromStr<Err = std::num::ParseIntError>>(text: &str, target: &TargetKind) -> Result<T, ConversionError> {
    text.trim().parse::<T>().map_err(|error| invalid(text, target, error.into()))
}

fn parse_decimal(text: &str, target: &TargetKind) -> Result<Decimal, ConversionError> {
    let trimmed = text.trim();
    Decimal::from_str_exact(trimmed)
        .or_else(|error| Decimal::from_scientific(trimmed).map_err(|_| error))
        .map_err(|error| invalid(text, target, error.into()))
}

/// Only the literals `true` and `false` are booleans, in any case.
fn parse_boolean(text: &str) -> Option<bool> {
    match text.trim() {
        value if value.eq_ignore_ascii_case("true") => Some(true),
        value if value.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

/// Whole number held by a float; fractions are rejected, not truncated.
fn to_integral(number: f64, target: &TargetKind) -> Result<i64, ConversionError> {
    let text = format_number(number);
    if !number.is_finite() {
        return Err(invalid(&text, target, ValueError::NotFinite));
    }
    if number.fract() != 0.0 {
        return Err(invalid(&text, target, ValueError::NotIntegral));
    }
    // i64::MAX is not representable; 2^63 is the first float out of range.
    if number < i64::MIN as f64 || number >= i64::MAX as f64 {
        return Err(invalid(&text, target, ValueError::OutOfRange));
    }
    Ok(number as i64)
}
