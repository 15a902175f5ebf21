use super::{ConversionContext, TypeConverter};
use crate::{ConversionError, Value, ValueType};
use std::collections::BTreeMap;

fn mismatch(source: &ValueType, target: &ValueType, value: &Value) -> ConversionError {
    ConversionError::new(
        source.clone(),
        target.clone(),
        format!("value of type {} does not match", value.value_type()),
    )
}

/// Defers `Any` sources to the value's runtime type
pub struct DynamicTypeConverter;

impl TypeConverter for DynamicTypeConverter {
    fn name(&self) -> &str {
        "dynamic"
    }

    fn can_convert(&self, source: &ValueType, _target: &ValueType, _ctx: &ConversionContext<'_>) -> bool {
        *source == ValueType::Any
    }

    fn try_convert(
        &self,
        _source: &ValueType,
        target: &ValueType,
        value: &Value,
        ctx: &ConversionContext<'_>,
    ) -> Result<Value, ConversionError> {
        ctx.try_convert(&value.value_type(), target, value)
    }
}

/// Converts between booleans, integers and numbers
pub struct NumericTypeConverter;

impl NumericTypeConverter {
    fn is_numeric(ty: &ValueType) -> bool {
        matches!(ty, ValueType::Bool | ValueType::Integer | ValueType::Number)
    }
}

impl TypeConverter for NumericTypeConverter {
    fn name(&self) -> &str {
        "numeric"
    }

    fn can_convert(&self, source: &ValueType, target: &ValueType, _ctx: &ConversionContext<'_>) -> bool {
        Self::is_numeric(source) && Self::is_numeric(target)
    }

    fn try_convert(
        &self,
        source: &ValueType,
        target: &ValueType,
        value: &Value,
        _ctx: &ConversionContext<'_>,
    ) -> Result<Value, ConversionError> {
        let number = match value {
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Integer(i) => *i as f64,
            Value::Number(n) => *n,
            other => return Err(mismatch(source, target, other)),
        };

        match target {
            ValueType::Bool => Ok(Value::Bool(number != 0.0)),
            ValueType::Number => Ok(Value::Number(number)),
            ValueType::Integer => match value {
                Value::Integer(i) => Ok(Value::Integer(*i)),
                _ if number.is_finite()
                    && number.fract() == 0.0
                    && number >= i64::MIN as f64
                    // i64::MAX rounds up to 2^63 as f64, which is out of range
                    && number < i64::MAX as f64 =>
                {
                    Ok(Value::Integer(number as i64))
                }
                _ => Err(ConversionError::new(
                    source.clone(),
                    target.clone(),
                    format!("{} is not an integer", number),
                )),
            },
            _ => Err(mismatch(source, target, value)),
        }
    }
}

/// Parses strings into booleans, integers and numbers
pub struct StringParseConverter;

impl TypeConverter for StringParseConverter {
    fn name(&self) -> &str {
        "string-parse"
    }

    fn can_convert(&self, source: &ValueType, target: &ValueType, _ctx: &ConversionContext<'_>) -> bool {
        *source == ValueType::String
            && matches!(target, ValueType::Bool | ValueType::Integer | ValueType::Number)
    }

    fn try_convert(
        &self,
        source: &ValueType,
        target: &ValueType,
        value: &Value,
        _ctx: &ConversionContext<'_>,
    ) -> Result<Value, ConversionError> {
        let text = value
            .as_str()
            .ok_or_else(|| mismatch(source, target, value))?
            .trim();
        let invalid = || {
            ConversionError::new(
                source.clone(),
                target.clone(),
                format!("'{}' does not parse as {}", text, target),
            )
        };

        match target {
            ValueType::Bool => {
                if text.eq_ignore_ascii_case("true") {
                    Ok(Value::Bool(true))
                } else if text.eq_ignore_ascii_case("false") {
                    Ok(Value::Bool(false))
                } else {
                    Err(invalid())
                }
            }
            ValueType::Integer => text.parse::<i64>().map(Value::Integer).map_err(|_| invalid()),
            ValueType::Number => text.parse::<f64>().map(Value::Number).map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

/// Formats booleans, integers and numbers as strings
pub struct StringFormatConverter;

impl TypeConverter for StringFormatConverter {
    fn name(&self) -> &str {
        "string-format"
    }

    fn can_convert(&self, source: &ValueType, target: &ValueType, _ctx: &ConversionContext<'_>) -> bool {
        *target == ValueType::String
            && matches!(source, ValueType::Bool | ValueType::Integer | ValueType::Number)
    }

    fn try_convert(
        &self,
        source: &ValueType,
        target: &ValueType,
        value: &Value,
        _ctx: &ConversionContext<'_>,
    ) -> Result<Value, ConversionError> {
        match value {
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            Value::Integer(i) => Ok(Value::String(i.to_string())),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            other => Err(mismatch(source, target, other)),
        }
    }
}

/// Converts arrays element by element
pub struct ArrayTypeConverter;

impl TypeConverter for ArrayTypeConverter {
    fn name(&self) -> &str {
        "array"
    }

    fn can_convert(&self, source: &ValueType, target: &ValueType, ctx: &ConversionContext<'_>) -> bool {
        match (source, target) {
            (ValueType::Array(from), ValueType::Array(to)) => ctx.can_convert(from, to),
            _ => false,
        }
    }

    fn try_convert(
        &self,
        source: &ValueType,
        target: &ValueType,
        value: &Value,
        ctx: &ConversionContext<'_>,
    ) -> Result<Value, ConversionError> {
        let (ValueType::Array(from), ValueType::Array(to), Value::Array(items)) =
            (source, target, value)
        else {
            return Err(mismatch(source, target, value));
        };

        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                ctx.try_convert(from, to, item).map_err(|err| {
                    ConversionError::new(
                        source.clone(),
                        target.clone(),
                        format!("element {}: {}", index, err.reason),
                    )
                    .with_attempts(err.attempts)
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }
}

/// Converts object values entry by entry
pub struct ObjectTypeConverter;

impl TypeConverter for ObjectTypeConverter {
    fn name(&self) -> &str {
        "object"
    }

    fn can_convert(&self, source: &ValueType, target: &ValueType, ctx: &ConversionContext<'_>) -> bool {
        match (source, target) {
            (ValueType::Object(from), ValueType::Object(to)) => ctx.can_convert(from, to),
            _ => false,
        }
    }

    fn try_convert(
        &self,
        source: &ValueType,
        target: &ValueType,
        value: &Value,
        ctx: &ConversionContext<'_>,
    ) -> Result<Value, ConversionError> {
        let (ValueType::Object(from), ValueType::Object(to), Value::Object(entries)) =
            (source, target, value)
        else {
            return Err(mismatch(source, target, value));
        };

        let mut converted = BTreeMap::new();
        for (key, entry) in entries {
            let entry = ctx.try_convert(from, to, entry).map_err(|err| {
                ConversionError::new(
                    source.clone(),
                    target.clone(),
                    format!("entry '{}': {}", key, err.reason),
                )
                .with_attempts(err.attempts)
            })?;
            converted.insert(key.clone(), entry);
        }
        Ok(Value::Object(converted))
    }
}

/// Wraps anything as JSON and reads JSON back through its runtime type
pub struct JsonTypeConverter;

impl TypeConverter for JsonTypeConverter {
    fn name(&self) -> &str {
        "json"
    }

    fn can_convert(&self, source: &ValueType, target: &ValueType, _ctx: &ConversionContext<'_>) -> bool {
        *source == ValueType::Json || *target == ValueType::Json
    }

    fn try_convert(
        &self,
        source: &ValueType,
        target: &ValueType,
        value: &Value,
        ctx: &ConversionContext<'_>,
    ) -> Result<Value, ConversionError> {
        if *target == ValueType::Json {
            return Ok(Value::Json(value.to_json()));
        }
        match value {
            Value::Json(json) => {
                let plain = Value::from_json(json.clone());
                ctx.try_convert(&plain.value_type(), target, &plain)
            }
            other => Err(mismatch(source, target, other)),
        }
    }
}
