//! Tagged-union encoding: every non-primitive value travels as
//! `{"__type": <tag>, "__var": <payload>}`.

use super::{SerializationError, SerializationResult};
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use std::fmt;

pub const TYPE: &str = "__type";
pub const VAR: &str = "__var";

/// Wire type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Dict,
    Set,
    Tuple,
    List,
    Dag,
    Operator,
    Datetime,
    Timedelta,
    Timezone,
    RelativeDelta,
}

impl TypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dict => "dict",
            Self::Set => "set",
            Self::Tuple => "tuple",
            Self::List => "list",
            Self::Dag => "dag",
            Self::Operator => "operator",
            Self::Datetime => "datetime",
            Self::Timedelta => "timedelta",
            Self::Timezone => "timezone",
            Self::RelativeDelta => "relativedelta",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        Some(match tag {
            "dict" => Self::Dict,
            "set" => Self::Set,
            "tuple" => Self::Tuple,
            "list" => Self::List,
            "dag" => Self::Dag,
            "operator" => Self::Operator,
            "datetime" => Self::Datetime,
            "timedelta" => Self::Timedelta,
            "timezone" => Self::Timezone,
            "relativedelta" => Self::RelativeDelta,
            _ => return None,
        })
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn wrap(tag: TypeTag, payload: Value) -> Value {
    let mut node = Map::new();
    node.insert(TYPE.to_string(), Value::String(tag.as_str().to_string()));
    node.insert(VAR.to_string(), payload);
    Value::Object(node)
}

/// The tag of a tagged node, `None` for primitives and untagged containers
pub fn tag_of(value: &Value) -> Option<TypeTag> {
    value.get(TYPE).and_then(Value::as_str).and_then(TypeTag::parse)
}

/// Payload of a node that must carry `expected`
pub fn unwrap<'a>(value: &'a Value, expected: TypeTag) -> SerializationResult<&'a Value> {
    match tag_of(value) {
        Some(tag) if tag == expected => value
            .get(VAR)
            .ok_or_else(|| SerializationError::malformed(format!("'{expected}' node without payload"))),
        Some(tag) => Err(SerializationError::malformed(format!(
            "expected '{expected}' node, found '{tag}'"
        ))),
        None => Err(SerializationError::malformed(format!(
            "expected '{expected}' node, found {value}"
        ))),
    }
}

pub fn encode_datetime(date: DateTime<Utc>) -> Value {
    wrap(TypeTag::Datetime, Value::String(date.to_rfc3339()))
}

pub fn decode_datetime(value: &Value) -> SerializationResult<DateTime<Utc>> {
    let raw = unwrap(value, TypeTag::Datetime)?
        .as_str()
        .ok_or_else(|| SerializationError::malformed("datetime payload must be a string"))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|e| SerializationError::malformed(format!("invalid datetime '{raw}': {e}")))
}

/// Durations travel as float seconds
pub fn encode_timedelta(duration: Duration) -> Value {
    let seconds = match duration.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        None => duration.num_seconds() as f64,
    };
    wrap(TypeTag::Timedelta, Value::from(seconds))
}

/// Largest timedelta magnitude accepted on the wire: 999,999,999 days, in seconds
pub const MAX_TIMEDELTA_SECONDS: f64 = 86_399_999_999_999.0;

pub fn decode_timedelta(value: &Value) -> SerializationResult<Duration> {
    let seconds = unwrap(value, TypeTag::Timedelta)?
        .as_f64()
        .ok_or_else(|| SerializationError::malformed("timedelta payload must be a number"))?;
    if !seconds.is_finite() || seconds.abs() > MAX_TIMEDELTA_SECONDS {
        return Err(SerializationError::malformed(format!(
            "timedelta of {seconds} seconds is out of range"
        )));
    }

    let whole = seconds.trunc();
    let micros = ((seconds - whole) * 1_000_000.0).round() as i64;
    Duration::try_seconds(whole as i64)
        .and_then(|duration| duration.checked_add(&Duration::microseconds(micros)))
        .ok_or_else(|| {
            SerializationError::malformed(format!("timedelta of {seconds} seconds is out of range"))
        })
}

/// Sets serialize as sorted sequences
pub fn encode_set<'a, I>(items: I) -> Value
where
    I: IntoIterator<Item = &'a String>,
{
    let mut items: Vec<&String> = items.into_iter().collect();
    items.sort();
    items.dedup();
    wrap(
        TypeTag::Set,
        Value::Array(items.into_iter().map(|s| Value::String(s.clone())).collect()),
    )
}

/// Strings of a `set`, `list` or `tuple` node
pub fn decode_strings(value: &Value) -> SerializationResult<Vec<String>> {
    let items = match tag_of(value) {
        Some(TypeTag::Set | TypeTag::List | TypeTag::Tuple) => value.get(VAR),
        _ => None,
    }
    .and_then(Value::as_array)
    .ok_or_else(|| SerializationError::malformed(format!("expected a sequence node, found {value}")))?;

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| SerializationError::malformed(format!("expected a string, found {item}")))
        })
        .collect()
}

/// Arbitrary JSON: objects become `dict` nodes and arrays `list` nodes, recursively
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => wrap(
            TypeTag::Dict,
            Value::Object(map.iter().map(|(k, v)| (k.clone(), encode_value(v))).collect()),
        ),
        Value::Array(items) => wrap(TypeTag::List, Value::Array(items.iter().map(encode_value).collect())),
        primitive => primitive.clone(),
    }
}

pub fn decode_value(value: &Value) -> SerializationResult<Value> {
    match tag_of(value) {
        Some(TypeTag::Dict) => {
            let map = unwrap(value, TypeTag::Dict)?
                .as_object()
                .ok_or_else(|| SerializationError::malformed("dict payload must be an object"))?;
            map.iter()
                .map(|(k, v)| Ok((k.clone(), decode_value(v)?)))
                .collect::<SerializationResult<Map<String, Value>>>()
                .map(Value::Object)
        }
        Some(tag @ (TypeTag::List | TypeTag::Set | TypeTag::Tuple)) => {
            let items = unwrap(value, tag)?
                .as_array()
                .ok_or_else(|| SerializationError::malformed(format!("{tag} payload must be an array")))?;
            items
                .iter()
                .map(decode_value)
                .collect::<SerializationResult<Vec<Value>>>()
                .map(Value::Array)
        }
        Some(TypeTag::Datetime | TypeTag::Timedelta | TypeTag::Timezone) => {
            Ok(value.get(VAR).cloned().unwrap_or(Value::Null))
        }
        Some(tag) => Err(SerializationError::malformed(format!(
            "'{tag}' node is not allowed inside a value"
        ))),
        None => Ok(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_timedelta_is_distinguishable_from_number() {
        let encoded = encode_timedelta(Duration::days(1));
        assert_eq!(encoded, json!({"__type": "timedelta", "__var": 86400.0}));
        assert!(decode_timedelta(&json!(86400.0)).is_err());
        assert_eq!(decode_timedelta(&encoded).unwrap(), Duration::days(1));
    }

    #[test]
    fn test_timedelta_out_of_range_is_malformed() {
        for seconds in [1e18, -1e18, MAX_TIMEDELTA_SECONDS + 1.0] {
            let err = decode_timedelta(&json!({"__type": "timedelta", "__var": seconds})).unwrap_err();
            assert!(matches!(err, SerializationError::Malformed(_)));
        }

        let widest = decode_timedelta(&json!({"__type": "timedelta", "__var": -MAX_TIMEDELTA_SECONDS}))
            .unwrap();
        assert_eq!(widest, Duration::seconds(-86_399_999_999_999));
        assert_eq!(
            decode_timedelta(&json!({"__type": "timedelta", "__var": 1.5})).unwrap(),
            Duration::milliseconds(1500)
        );
    }

    #[test]
    fn test_datetime_format() {
        let date = Utc.with_ymd_and_hms(2019, 8, 1, 0, 0, 0).unwrap();
        let encoded = encode_datetime(date);
        assert_eq!(encoded[VAR], "2019-08-01T00:00:00+00:00");
        assert_eq!(decode_datetime(&encoded).unwrap(), date);
    }

    #[test]
    fn test_sets_are_sorted() {
        let items = ["b".to_string(), "a".to_string(), "c".to_string()];
        assert_eq!(encode_set(items.iter()), json!({"__type": "set", "__var": ["a", "b", "c"]}));
    }

    #[test]
    fn test_nested_values() {
        let value = json!({"retries": [1, 2], "nested": {"flag": true}});
        let encoded = encode_value(&value);
        assert_eq!(encoded[TYPE], "dict");
        assert_eq!(encoded[VAR]["retries"][TYPE], "list");
        assert_eq!(decode_value(&encoded).unwrap(), value);
    }

    #[test]
    fn test_wrong_tag_is_malformed() {
        let err = unwrap(&json!({"__type": "set", "__var": []}), TypeTag::Dict).unwrap_err();
        assert!(matches!(err, SerializationError::Malformed(_)));
    }
}
