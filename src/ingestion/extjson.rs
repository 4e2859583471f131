//! Extended JSON decoding.
//!
//! Walks a parsed JSON tree depth-first and replaces wrapper objects such as
//! `{"$date": "1963-10-06T00:00:00.000Z"}` or `{"$oid": "578611d17c8a27dd5b329fd5"}` with native
//! BSON values. A wrapper is only recognized when its key is the *only* key of the object; an
//! object with a marker key plus anything else is ordinary data.
//!
//! Decoding never fails. A recognized marker whose payload is malformed is kept as a plain
//! (recursively decoded) document.

use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, DateTime, Document, Regex, Timestamp};
use serde_json::{Map, Number, Value};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::types::{GenericDocument, NativeDocument};

#[derive(Debug, Error)]
#[error("{0}")]
struct MarkerError(&'static str);

type MarkerCtor = fn(&Value) -> Result<Bson, MarkerError>;

const MARKERS: &[(&str, MarkerCtor)] = &[
    ("$oid", object_id),
    ("$date", date),
    ("$numberLong", number_long),
    ("$numberInt", number_int),
    ("$numberDouble", number_double),
    ("$numberDecimal", number_decimal),
    ("$binary", binary),
    ("$timestamp", timestamp),
    ("$regularExpression", regular_expression),
    ("$symbol", symbol),
    ("$minKey", min_key),
    ("$maxKey", max_key),
    ("$undefined", undefined),
];

fn marker_ctor(key: &str) -> Option<MarkerCtor> {
    MARKERS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, ctor)| *ctor)
}

/// Returns true if `key` is a recognized Extended JSON marker name.
pub fn is_marker_key(key: &str) -> bool {
    marker_ctor(key).is_some()
}

/// Decode one document.
///
/// The top level always stays a document, even if its only key is a marker name.
pub fn decode_document(doc: GenericDocument) -> NativeDocument {
    decode_map(doc)
}

/// Decode an arbitrary JSON value.
pub fn decode_value(value: Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(b),
        Value::Number(n) => decode_number(&n),
        Value::String(s) => Bson::String(s),
        Value::Array(items) => Bson::Array(items.into_iter().map(decode_value).collect()),
        Value::Object(map) => decode_object(map),
    }
}

fn decode_object(map: Map<String, Value>) -> Bson {
    if map.len() == 1 {
        if let Some((key, payload)) = map.iter().next() {
            if let Some(ctor) = marker_ctor(key) {
                match ctor(payload) {
                    Ok(native) => return native,
                    Err(err) => {
                        tracing::trace!(marker = %key, error = %err, "keeping malformed marker as plain object");
                    }
                }
            }
        }
    }
    Bson::Document(decode_map(map))
}

fn decode_map(map: Map<String, Value>) -> Document {
    map.into_iter().map(|(k, v)| (k, decode_value(v))).collect()
}

fn decode_number(n: &Number) -> Bson {
    if let Some(i) = n.as_i64() {
        match i32::try_from(i) {
            Ok(small) => Bson::Int32(small),
            Err(_) => Bson::Int64(i),
        }
    } else {
        // u64 beyond i64::MAX, or a float.
        Bson::Double(n.as_f64().unwrap_or(f64::NAN))
    }
}

fn object_id(payload: &Value) -> Result<Bson, MarkerError> {
    let hex = payload.as_str().ok_or(MarkerError("$oid payload must be a string"))?;
    ObjectId::parse_str(hex)
        .map(Bson::ObjectId)
        .map_err(|_| MarkerError("$oid payload is not a 24 character hex string"))
}

fn date(payload: &Value) -> Result<Bson, MarkerError> {
    let millis = match payload {
        Value::String(s) => rfc3339_millis(s)?,
        Value::Number(n) => n.as_i64().ok_or(MarkerError("$date millis must be an integer"))?,
        Value::Object(inner) if inner.len() == 1 => match inner.get("$numberLong") {
            Some(long) => parse_i64(long)?,
            None => return Err(MarkerError("$date object payload must be {\"$numberLong\": ...}")),
        },
        _ => return Err(MarkerError("unsupported $date payload")),
    };
    Ok(Bson::DateTime(DateTime::from_millis(millis)))
}

fn rfc3339_millis(s: &str) -> Result<i64, MarkerError> {
    let parsed = OffsetDateTime::parse(s, &Rfc3339)
        .map_err(|_| MarkerError("$date string is not rfc 3339"))?;
    i64::try_from(parsed.unix_timestamp_nanos().div_euclid(1_000_000))
        .map_err(|_| MarkerError("$date out of range"))
}

fn parse_i64(payload: &Value) -> Result<i64, MarkerError> {
    match payload {
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| MarkerError("expected a 64-bit integer string")),
        Value::Number(n) => n.as_i64().ok_or(MarkerError("expected a 64-bit integer")),
        _ => Err(MarkerError("expected a 64-bit integer")),
    }
}

fn number_long(payload: &Value) -> Result<Bson, MarkerError> {
    parse_i64(payload).map(Bson::Int64)
}

fn number_int(payload: &Value) -> Result<Bson, MarkerError> {
    let wide = parse_i64(payload)?;
    i32::try_from(wide)
        .map(Bson::Int32)
        .map_err(|_| MarkerError("$numberInt out of 32-bit range"))
}

fn number_double(payload: &Value) -> Result<Bson, MarkerError> {
    let v = match payload {
        Value::String(s) => match s.as_str() {
            "Infinity" => f64::INFINITY,
            "-Infinity" => f64::NEG_INFINITY,
            "NaN" => f64::NAN,
            other => other
                .parse::<f64>()
                .map_err(|_| MarkerError("$numberDouble is not numeric"))?,
        },
        Value::Number(n) => n.as_f64().ok_or(MarkerError("$numberDouble is not numeric"))?,
        _ => return Err(MarkerError("$numberDouble payload must be a string")),
    };
    Ok(Bson::Double(v))
}

fn number_decimal(payload: &Value) -> Result<Bson, MarkerError> {
    if !payload.is_string() {
        return Err(MarkerError("$numberDecimal payload must be a string"));
    }
    match via_bson_extjson("$numberDecimal", payload)? {
        decimal @ Bson::Decimal128(_) => Ok(decimal),
        _ => Err(MarkerError("$numberDecimal did not decode to a decimal")),
    }
}

fn binary(payload: &Value) -> Result<Bson, MarkerError> {
    let fields = payload
        .as_object()
        .ok_or(MarkerError("$binary payload must be an object"))?;
    if fields.len() != 2 || !fields.contains_key("base64") || !fields.contains_key("subType") {
        return Err(MarkerError("$binary payload must have exactly base64 and subType"));
    }
    match via_bson_extjson("$binary", payload)? {
        bin @ Bson::Binary(_) => Ok(bin),
        _ => Err(MarkerError("$binary did not decode to binary data")),
    }
}

/// Hand a single-key wrapper to the driver's Extended JSON parser.
fn via_bson_extjson(key: &str, payload: &Value) -> Result<Bson, MarkerError> {
    let mut wrapper = Map::with_capacity(1);
    wrapper.insert(key.to_string(), payload.clone());
    Bson::try_from(Value::Object(wrapper)).map_err(|_| MarkerError("rejected by extended json parser"))
}

fn timestamp(payload: &Value) -> Result<Bson, MarkerError> {
    let fields = payload
        .as_object()
        .ok_or(MarkerError("$timestamp payload must be an object"))?;
    if fields.len() != 2 {
        return Err(MarkerError("$timestamp payload must have exactly t and i"));
    }
    let part = |name: &str| {
        fields
            .get(name)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or(MarkerError("$timestamp t and i must be 32-bit unsigned integers"))
    };
    Ok(Bson::Timestamp(Timestamp {
        time: part("t")?,
        increment: part("i")?,
    }))
}

fn regular_expression(payload: &Value) -> Result<Bson, MarkerError> {
    let fields = payload
        .as_object()
        .ok_or(MarkerError("$regularExpression payload must be an object"))?;
    if fields.len() != 2 {
        return Err(MarkerError("$regularExpression payload must have exactly pattern and options"));
    }
    let pattern = fields
        .get("pattern")
        .and_then(Value::as_str)
        .ok_or(MarkerError("$regularExpression pattern must be a string"))?;
    let options = fields
        .get("options")
        .and_then(Value::as_str)
        .ok_or(MarkerError("$regularExpression options must be a string"))?;

    let mut sorted: Vec<char> = options.chars().collect();
    sorted.sort_unstable();
    Ok(Bson::RegularExpression(Regex {
        pattern: pattern.to_string(),
        options: sorted.into_iter().collect(),
    }))
}

fn symbol(payload: &Value) -> Result<Bson, MarkerError> {
    payload
        .as_str()
        .map(|s| Bson::Symbol(s.to_string()))
        .ok_or(MarkerError("$symbol payload must be a string"))
}

fn min_key(payload: &Value) -> Result<Bson, MarkerError> {
    match payload.as_i64() {
        Some(1) => Ok(Bson::MinKey),
        _ => Err(MarkerError("$minKey payload must be 1")),
    }
}

fn max_key(payload: &Value) -> Result<Bson, MarkerError> {
    match payload.as_i64() {
        Some(1) => Ok(Bson::MaxKey),
        _ => Err(MarkerError("$maxKey payload must be 1")),
    }
}

fn undefined(payload: &Value) -> Result<Bson, MarkerError> {
    match payload {
        Value::Bool(true) => Ok(Bson::Undefined),
        _ => Err(MarkerError("$undefined payload must be true")),
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_value, is_marker_key};
    use mongodb::bson::{Bson, DateTime};
    use serde_json::json;

    #[test]
    fn every_table_entry_is_a_marker() {
        for key in ["$oid", "$date", "$numberLong", "$binary", "$maxKey"] {
            assert!(is_marker_key(key), "{key}");
        }
        assert!(!is_marker_key("$ref"));
        assert!(!is_marker_key("oid"));
    }

    #[test]
    fn date_accepts_all_payload_shapes() {
        let expected = Bson::DateTime(DateTime::from_millis(-196_905_600_000));
        assert_eq!(decode_value(json!({"$date": "1963-10-06T00:00:00.000Z"})), expected);
        assert_eq!(decode_value(json!({"$date": -196_905_600_000_i64})), expected);
        assert_eq!(
            decode_value(json!({"$date": {"$numberLong": "-196905600000"}})),
            expected
        );
    }

    #[test]
    fn date_with_offset_is_normalized_to_utc() {
        assert_eq!(
            decode_value(json!({"$date": "1970-01-01T01:00:00.500+01:00"})),
            Bson::DateTime(DateTime::from_millis(500))
        );
    }

    #[test]
    fn numbers_pick_narrowest_integer_type() {
        assert_eq!(decode_value(json!(7)), Bson::Int32(7));
        assert_eq!(decode_value(json!(5_000_000_000_i64)), Bson::Int64(5_000_000_000));
        assert_eq!(decode_value(json!(13.37)), Bson::Double(13.37));
    }

    #[test]
    fn numeric_wrappers() {
        assert_eq!(decode_value(json!({"$numberLong": "42"})), Bson::Int64(42));
        assert_eq!(decode_value(json!({"$numberInt": "-3"})), Bson::Int32(-3));
        assert_eq!(decode_value(json!({"$numberDouble": "2.5"})), Bson::Double(2.5));
        assert_eq!(
            decode_value(json!({"$numberDouble": "-Infinity"})),
            Bson::Double(f64::NEG_INFINITY)
        );
        assert!(matches!(
            decode_value(json!({"$numberDecimal": "1.10"})),
            Bson::Decimal128(_)
        ));
    }

    #[test]
    fn number_int_out_of_range_stays_plain() {
        let decoded = decode_value(json!({"$numberInt": "5000000000"}));
        let Bson::Document(doc) = decoded else {
            panic!("expected plain document, got {decoded:?}");
        };
        assert_eq!(doc.get_str("$numberInt").unwrap(), "5000000000");
    }

    #[test]
    fn binary_timestamp_and_regex() {
        assert!(matches!(
            decode_value(json!({"$binary": {"base64": "aGVsbG8=", "subType": "00"}})),
            Bson::Binary(ref b) if b.bytes == b"hello"
        ));
        assert!(matches!(
            decode_value(json!({"$timestamp": {"t": 10, "i": 2}})),
            Bson::Timestamp(ts) if ts.time == 10 && ts.increment == 2
        ));
        assert!(matches!(
            decode_value(json!({"$regularExpression": {"pattern": "^a", "options": "xi"}})),
            Bson::RegularExpression(ref r) if r.pattern == "^a" && r.options == "ix"
        ));
    }

    #[test]
    fn key_markers() {
        assert_eq!(decode_value(json!({"$minKey": 1})), Bson::MinKey);
        assert_eq!(decode_value(json!({"$maxKey": 1})), Bson::MaxKey);
        assert_eq!(decode_value(json!({"$undefined": true})), Bson::Undefined);
        assert_eq!(decode_value(json!({"$symbol": "s"})), Bson::Symbol("s".to_string()));
    }

    #[test]
    fn malformed_oid_stays_plain() {
        let decoded = decode_value(json!({"$oid": "not-hex"}));
        assert!(matches!(decoded, Bson::Document(ref d) if d.get_str("$oid").unwrap() == "not-hex"));
    }
}
