use chrono::Local;

use crate::measurement::{ClientId, Measurement, celsius_to_fahrenheit};

pub const FIELD_SEPARATOR: char = ';';
pub const SCD4X_TAG: &str = "SCD4X";
pub const SCD4X_FIELD_COUNT: usize = 4;

pub const ACK_PREFIX: &str = "ACK: ";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DecodeError {
    #[error("expected {expected} fields, got {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("unknown record tag {0:?}")]
    UnknownTag(String),
    #[error("field {field} is not a number: {value:?}")]
    InvalidNumber { field: usize, value: String },
    #[error("negative CO2 concentration: {0}")]
    NegativeConcentration(f64),
}

/// Decodes one `SCD4X;<co2>;<temperature_c>;<humidity>` frame.
///
/// The temperature is converted to Fahrenheit and the measurement is stamped
/// with the current time. `client_id` is only used for attribution.
pub fn decode(frame: &str, client_id: ClientId) -> Result<Measurement, DecodeError> {
    let fields: Vec<&str> = frame.split(FIELD_SEPARATOR).map(str::trim).collect();
    if fields.len() != SCD4X_FIELD_COUNT {
        return Err(DecodeError::FieldCount {
            expected: SCD4X_FIELD_COUNT,
            found: fields.len(),
        });
    }

    if fields[0] != SCD4X_TAG {
        return Err(DecodeError::UnknownTag(fields[0].to_string()));
    }

    let co2_concentration = parse_number(&fields, 1)?;
    if co2_concentration < 0.0 {
        return Err(DecodeError::NegativeConcentration(co2_concentration));
    }
    // "-0" parses as negative zero
    let co2_concentration = co2_concentration + 0.0;
    let temperature = parse_number(&fields, 2)?;
    let humidity = parse_number(&fields, 3)?;

    Ok(Measurement {
        client_id,
        timestamp: Local::now(),
        temperature: celsius_to_fahrenheit(temperature),
        humidity,
        co2_concentration,
    })
}

fn parse_number(fields: &[&str], field: usize) -> Result<f64, DecodeError> {
    let value = fields[field];
    match value.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        _ => Err(DecodeError::InvalidNumber {
            field,
            value: value.to_string(),
        }),
    }
}

/// Reply sent back for every inbound frame, whether it decoded or not.
pub fn acknowledgement(frame: &str) -> String {
    format!("{ACK_PREFIX}{frame}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_decode_scd4x() {
        let m = decode("SCD4X;412;21.0;45", 7).unwrap();
        assert_eq!(m.client_id, 7);
        assert_close(m.co2_concentration, 412.0);
        assert_close(m.temperature, 69.8);
        assert_close(m.humidity, 45.0);
    }

    #[test]
    fn test_decode_converts_temperature() {
        for (celsius, fahrenheit) in [(0.0, 32.0), (100.0, 212.0), (-40.0, -40.0), (23.5, 74.3)] {
            let m = decode(&format!("SCD4X;800;{celsius};50.5"), 1).unwrap();
            assert_close(m.temperature, fahrenheit);
        }
    }

    #[test]
    fn test_decode_accepts_decimal_co2() {
        let m = decode("SCD4X;412.5;20;40", 1).unwrap();
        assert_close(m.co2_concentration, 412.5);
    }

    #[test]
    fn test_decode_tolerates_padding_around_fields() {
        let m = decode("SCD4X; 600 ;19.5; 38.2", 3).unwrap();
        assert_close(m.co2_concentration, 600.0);
        assert_close(m.humidity, 38.2);
    }

    #[test]
    fn test_decode_wrong_field_count() {
        assert_eq!(
            decode("SCD4X;412;21.0", 1),
            Err(DecodeError::FieldCount {
                expected: 4,
                found: 3
            })
        );
        assert_eq!(
            decode("SCD4X;412;21.0;45;1", 1),
            Err(DecodeError::FieldCount {
                expected: 4,
                found: 5
            })
        );
        assert!(matches!(
            decode("garbage", 1),
            Err(DecodeError::FieldCount { found: 1, .. })
        ));
        assert!(decode("", 1).is_err());
    }

    #[test]
    fn test_decode_unknown_tag() {
        assert_eq!(
            decode("BME280;412;21.0;45", 1),
            Err(DecodeError::UnknownTag("BME280".to_string()))
        );
        assert!(matches!(
            decode("scd4x;412;21.0;45", 1),
            Err(DecodeError::UnknownTag(_))
        ));
    }

    #[test]
    fn test_decode_invalid_numbers() {
        assert_eq!(
            decode("SCD4X;abc;21.0;45", 1),
            Err(DecodeError::InvalidNumber {
                field: 1,
                value: "abc".to_string()
            })
        );
        assert!(matches!(
            decode("SCD4X;412;warm;45", 1),
            Err(DecodeError::InvalidNumber { field: 2, .. })
        ));
        assert!(matches!(
            decode("SCD4X;412;21.0;", 1),
            Err(DecodeError::InvalidNumber { field: 3, .. })
        ));
        assert!(matches!(
            decode("SCD4X;NaN;21.0;45", 1),
            Err(DecodeError::InvalidNumber { field: 1, .. })
        ));
    }

    #[test]
    fn test_decode_negative_co2() {
        assert_eq!(
            decode("SCD4X;-5;21.0;45", 1),
            Err(DecodeError::NegativeConcentration(-5.0))
        );
    }

    #[test]
    fn test_decode_negative_zero_co2() {
        let m = decode("SCD4X;-0;21;45", 1).unwrap();
        assert!(m.co2_concentration.is_sign_positive());
        assert_eq!(m.co2_concentration.to_string(), "0");
    }

    #[test]
    fn test_acknowledgement() {
        assert_eq!(acknowledgement("SCD4X;412;21.0;45"), "ACK: SCD4X;412;21.0;45\n");
        assert_eq!(acknowledgement("garbage"), "ACK: garbage\n");
    }
}
