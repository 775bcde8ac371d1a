//! Geocoding data model and CEP Aberto client
//!
//! This module contains the record type parsed from CEP Aberto responses,
//! the HTTP transport used to reach the API, and the cache-backed fetcher
//! that resolves postal codes with retry and backoff.

pub mod client;
pub mod fetcher;

pub use client::{ClientConfig, ClientError, HttpReply, HttpTransport, Transport, TransportError};
pub use fetcher::{AbsentReason, BatchReport, BatchStats, GeocodeFetcher, Lookup, Resolved, RetryPolicy};

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A latitude or longitude as the API wrote it
///
/// Keeps the original text next to the parsed value so exports reproduce the
/// response exactly (`"-27.59690"` stays `-27.59690`).
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    value: f64,
    text: String,
}

impl Coordinate {
    /// Parses coordinate text, returning `None` when it is not a number
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let value = text.parse().ok()?;
        Some(Self {
            value,
            text: text.to_string(),
        })
    }

    /// Decimal degrees
    pub fn value(&self) -> f64 {
        self.value
    }

    /// The coordinate exactly as received
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for Coordinate {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(self.value)
    }
}

/// City block of a CEP Aberto response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct City {
    /// City name
    #[serde(default, rename(deserialize = "nome"))]
    pub name: Option<String>,
    /// IBGE municipality code
    #[serde(default, deserialize_with = "lenient_string")]
    pub ibge: Option<String>,
    /// Telephone area code
    #[serde(default, deserialize_with = "lenient_u16")]
    pub ddd: Option<u16>,
}

/// State block of a CEP Aberto response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Two-letter state abbreviation (e.g. "SC")
    #[serde(default, rename(deserialize = "sigla"))]
    pub abbreviation: Option<String>,
}

/// Geocoding data for a single postal code
///
/// Every field is optional. The API omits fields it does not know about and
/// a missing field must never turn a successful lookup into an error.
/// Deserialization reads the API's Portuguese field names; serialization
/// writes the English ones used in our output files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeocodeRecord {
    /// Postal code echoed back by the API
    #[serde(default, deserialize_with = "lenient_string")]
    pub cep: Option<String>,
    /// Latitude in decimal degrees
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub latitude: Option<Coordinate>,
    /// Longitude in decimal degrees
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub longitude: Option<Coordinate>,
    /// Altitude in meters
    #[serde(default, deserialize_with = "lenient_f64")]
    pub altitude: Option<f64>,
    /// Street name
    #[serde(default, rename(deserialize = "logradouro"))]
    pub street: Option<String>,
    /// Neighborhood
    #[serde(default, rename(deserialize = "bairro"))]
    pub neighborhood: Option<String>,
    /// Address complement (e.g. "lado ímpar")
    #[serde(default, rename(deserialize = "complemento"))]
    pub complement: Option<String>,
    /// City information
    #[serde(default, rename(deserialize = "cidade"), deserialize_with = "lenient_city")]
    pub city: Option<City>,
    /// State information
    #[serde(default, rename(deserialize = "estado"), deserialize_with = "lenient_state")]
    pub state: Option<State>,
}

impl GeocodeRecord {
    /// Parses a raw CEP Aberto response body
    pub fn from_body(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    /// Returns true when the API answered without any geocoding data (`{}`)
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// City name, if known
    pub fn city_name(&self) -> Option<&str> {
        self.city.as_ref().and_then(|c| c.name.as_deref())
    }

    /// State abbreviation, if known
    pub fn state_abbreviation(&self) -> Option<&str> {
        self.state.as_ref().and_then(|s| s.abbreviation.as_deref())
    }
}

// The API sends coordinates as strings; older payloads used numbers.
fn lenient_coordinate<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Coordinate>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => Coordinate::parse(&n.to_string()),
        Some(Value::String(s)) => Coordinate::parse(&s),
        _ => None,
    })
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_u16<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u16>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_u64().and_then(|v| u16::try_from(v).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_city<'de, D: Deserializer<'de>>(d: D) -> Result<Option<City>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(name)) => Some(City {
            name: Some(name),
            ..City::default()
        }),
        Some(value @ Value::Object(_)) => serde_json::from_value(value).ok(),
        _ => None,
    })
}

fn lenient_state<'de, D: Deserializer<'de>>(d: D) -> Result<Option<State>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(abbreviation)) => Some(State {
            abbreviation: Some(abbreviation),
        }),
        Some(value @ Value::Object(_)) => serde_json::from_value(value).ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SE_BODY: &str = r#"{
        "altitude": 760.0,
        "cep": "01001000",
        "latitude": "-23.5479099981",
        "longitude": "-46.636",
        "logradouro": "Praça da Sé",
        "bairro": "Sé",
        "complemento": "- lado ímpar",
        "cidade": {"ddd": 11, "ibge": "3550308", "nome": "São Paulo"},
        "estado": {"sigla": "SP"}
    }"#;

    #[test]
    fn test_parse_full_response() {
        let record = GeocodeRecord::from_body(SE_BODY).unwrap();

        assert_eq!(record.cep.as_deref(), Some("01001000"));
        assert!((record.latitude.as_ref().unwrap().value() - (-23.5479099981)).abs() < 1e-9);
        assert!((record.longitude.as_ref().unwrap().value() - (-46.636)).abs() < 1e-9);
        assert_eq!(record.altitude, Some(760.0));
        assert_eq!(record.street.as_deref(), Some("Praça da Sé"));
        assert_eq!(record.neighborhood.as_deref(), Some("Sé"));
        assert_eq!(record.complement.as_deref(), Some("- lado ímpar"));
        assert_eq!(record.city_name(), Some("São Paulo"));
        assert_eq!(record.city.as_ref().unwrap().ddd, Some(11));
        assert_eq!(record.state_abbreviation(), Some("SP"));
    }

    #[test]
    fn test_missing_fields_yield_none() {
        let record = GeocodeRecord::from_body(r#"{"cep": "88010000", "latitude": -27.59}"#).unwrap();

        assert_eq!(record.latitude.as_ref().map(Coordinate::value), Some(-27.59));
        assert!(record.longitude.is_none());
        assert!(record.street.is_none());
        assert!(record.city.is_none());
        assert!(record.state.is_none());
        assert!(!record.is_empty());
    }

    #[test]
    fn test_coordinate_keeps_original_text() {
        let record =
            GeocodeRecord::from_body(r#"{"latitude": " -27.59690 ", "longitude": "-48.5"}"#).unwrap();
        let latitude = record.latitude.unwrap();

        assert_eq!(latitude.as_str(), "-27.59690");
        assert_eq!(latitude.to_string(), "-27.59690");
        assert!((latitude.value() - (-27.5969)).abs() < 1e-9);
    }

    #[test]
    fn test_coordinate_serializes_as_number() {
        let record = GeocodeRecord::from_body(r#"{"latitude": "-27.59690"}"#).unwrap();
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["latitude"], serde_json::json!(-27.5969));
    }

    #[test]
    fn test_empty_object_is_empty_record() {
        let record = GeocodeRecord::from_body("{}").unwrap();
        assert!(record.is_empty());
    }

    #[test]
    fn test_unexpected_shapes_are_tolerated() {
        let body = r#"{
            "latitude": "not a number",
            "longitude": null,
            "cidade": "Florianópolis",
            "estado": "SC",
            "ibge_extra": [1, 2, 3]
        }"#;
        let record = GeocodeRecord::from_body(body).unwrap();

        assert!(record.latitude.is_none());
        assert!(record.longitude.is_none());
        assert_eq!(record.city_name(), Some("Florianópolis"));
        assert_eq!(record.state_abbreviation(), Some("SC"));
    }

    #[test]
    fn test_non_object_body_is_an_error() {
        assert!(GeocodeRecord::from_body("[]").is_err());
        assert!(GeocodeRecord::from_body("<html>rate limited</html>").is_err());
    }

    #[test]
    fn test_serializes_with_english_field_names() {
        let record = GeocodeRecord::from_body(SE_BODY).unwrap();
        let json = serde_json::to_string(&record).unwrap();

        assert!(json.contains("\"street\":\"Praça da Sé\""));
        assert!(json.contains("\"abbreviation\":\"SP\""));
        assert!(!json.contains("logradouro"));
    }
}
