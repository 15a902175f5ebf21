use super::{ConversionContext, TypeConverter};
use crate::{ConversionError, Value, ValueType};

/// Converts through the first workable intermediate type.
///
/// For each candidate in order, both hops (`source -> candidate` and
/// `candidate -> target`) must be resolvable. A hop that fails at runtime moves
/// on to the next candidate; the intermediate value is discarded.
pub struct MultiHopConverter {
    intermediates: Vec<ValueType>,
}

impl MultiHopConverter {
    pub fn new(intermediates: impl IntoIterator<Item = ValueType>) -> Self {
        Self {
            intermediates: intermediates.into_iter().collect(),
        }
    }

    pub fn intermediates(&self) -> &[ValueType] {
        &self.intermediates
    }

    fn resolvable(
        &self,
        source: &ValueType,
        intermediate: &ValueType,
        target: &ValueType,
        ctx: &ConversionContext<'_>,
    ) -> bool {
        ctx.can_convert(source, intermediate) && ctx.can_convert(intermediate, target)
    }
}

impl TypeConverter for MultiHopConverter {
    fn name(&self) -> &str {
        "multi-hop"
    }

    fn reentrant(&self) -> bool {
        false
    }

    fn can_convert(&self, source: &ValueType, target: &ValueType, ctx: &ConversionContext<'_>) -> bool {
        self.intermediates
            .iter()
            .any(|intermediate| self.resolvable(source, intermediate, target, ctx))
    }

    fn try_convert(
        &self,
        source: &ValueType,
        target: &ValueType,
        value: &Value,
        ctx: &ConversionContext<'_>,
    ) -> Result<Value, ConversionError> {
        let mut attempts = Vec::new();

        for intermediate in &self.intermediates {
            if !self.resolvable(source, intermediate, target, ctx) {
                continue;
            }

            let hop = ctx
                .try_convert(source, intermediate, value)
                .and_then(|middle| ctx.try_convert(intermediate, target, &middle));

            match hop {
                Ok(converted) => {
                    if !attempts.is_empty() {
                        tracing::debug!(
                            %source,
                            %target,
                            via = %intermediate,
                            "multi-hop conversion succeeded after {} failed hop(s): {:?}",
                            attempts.len(),
                            attempts
                        );
                    }
                    return Ok(converted);
                }
                Err(err) => {
                    tracing::debug!(
                        %source,
                        %target,
                        via = %intermediate,
                        "conversion hop failed: {}",
                        err
                    );
                    attempts.push(format!("via {}: {}", intermediate, err));
                }
            }
        }

        Err(ConversionError::new(
            source.clone(),
            target.clone(),
            "no intermediate type succeeded",
        )
        .with_attempts(attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::super::{NumericTypeConverter, StringParseConverter, TypeResolver};
    use super::*;

    /// Handles only `string -> integer`, and rejects everything at runtime.
    struct RejectingIntegerParse;

    impl TypeConverter for RejectingIntegerParse {
        fn name(&self) -> &str {
            "rejecting-integer-parse"
        }

        fn can_convert(&self, source: &ValueType, target: &ValueType, _: &ConversionContext<'_>) -> bool {
            *source == ValueType::String && *target == ValueType::Integer
        }

        fn try_convert(
            &self,
            source: &ValueType,
            target: &ValueType,
            _: &Value,
            _: &ConversionContext<'_>,
        ) -> Result<Value, ConversionError> {
            Err(ConversionError::new(source.clone(), target.clone(), "rejected"))
        }
    }

    /// Handles only `string -> number`.
    struct NumberParse;

    impl TypeConverter for NumberParse {
        fn name(&self) -> &str {
            "number-parse"
        }

        fn can_convert(&self, source: &ValueType, target: &ValueType, _: &ConversionContext<'_>) -> bool {
            *source == ValueType::String && *target == ValueType::Number
        }

        fn try_convert(
            &self,
            source: &ValueType,
            target: &ValueType,
            value: &Value,
            _: &ConversionContext<'_>,
        ) -> Result<Value, ConversionError> {
            value
                .as_str()
                .and_then(|s| s.parse::<f64>().ok())
                .map(Value::Number)
                .ok_or_else(|| ConversionError::new(source.clone(), target.clone(), "unparsable"))
        }
    }

    #[test]
    fn falls_back_to_second_intermediate_when_first_hop_fails() {
        let resolver = TypeResolver::builder()
            .rule(MultiHopConverter::new([ValueType::Integer, ValueType::Number]))
            .rule(RejectingIntegerParse)
            .rule(NumberParse)
            .rule(NumericTypeConverter)
            .build();

        assert!(resolver.can_convert(&ValueType::String, &ValueType::Bool));
        let converted = resolver
            .try_convert(&ValueType::String, &ValueType::Bool, &Value::from("3"))
            .unwrap();
        assert_eq!(converted, Value::Bool(true));
    }

    #[test]
    fn fails_when_every_intermediate_fails() {
        let resolver = TypeResolver::builder()
            .rule(MultiHopConverter::new([ValueType::Integer, ValueType::Number]))
            .rule(RejectingIntegerParse)
            .rule(NumberParse)
            .rule(NumericTypeConverter)
            .build();

        let err = resolver
            .try_convert(&ValueType::String, &ValueType::Bool, &Value::from("three"))
            .unwrap_err();
        assert_eq!(err.target_type, ValueType::Bool);
        assert!(err.attempts.iter().any(|a| a.starts_with("multi-hop")));
        assert!(err.attempts.iter().any(|a| a.contains("via integer")));
        assert!(err.attempts.iter().any(|a| a.contains("via number")));
    }

    #[test]
    fn second_hop_failure_moves_to_next_candidate() {
        // string -> integer succeeds but integer -> bool is unavailable at runtime
        // through the first candidate, so the number route must be used.
        struct IntegerToBoolFails;

        impl TypeConverter for IntegerToBoolFails {
            fn name(&self) -> &str {
                "integer-bool-fails"
            }

            fn can_convert(&self, source: &ValueType, target: &ValueType, _: &ConversionContext<'_>) -> bool {
                *source == ValueType::Integer && *target == ValueType::Bool
            }

            fn try_convert(
                &self,
                source: &ValueType,
                target: &ValueType,
                _: &Value,
                _: &ConversionContext<'_>,
            ) -> Result<Value, ConversionError> {
                Err(ConversionError::new(source.clone(), target.clone(), "refused"))
            }
        }

        struct NumberToBool;

        impl TypeConverter for NumberToBool {
            fn name(&self) -> &str {
                "number-bool"
            }

            fn can_convert(&self, source: &ValueType, target: &ValueType, _: &ConversionContext<'_>) -> bool {
                *source == ValueType::Number && *target == ValueType::Bool
            }

            fn try_convert(
                &self,
                _: &ValueType,
                _: &ValueType,
                value: &Value,
                _: &ConversionContext<'_>,
            ) -> Result<Value, ConversionError> {
                Ok(Value::Bool(value.as_f64().unwrap_or(0.0) > 0.0))
            }
        }

        let resolver = TypeResolver::builder()
            .rule(MultiHopConverter::new([ValueType::Integer, ValueType::Number]))
            .rule(StringParseConverter)
            .rule(IntegerToBoolFails)
            .rule(NumberToBool)
            .build();

        let converted = resolver
            .try_convert(&ValueType::String, &ValueType::Bool, &Value::from("2"))
            .unwrap();
        assert_eq!(converted, Value::Bool(true));
    }

    #[test]
    fn does_not_recurse_into_itself() {
        let resolver = TypeResolver::builder()
            .rule(MultiHopConverter::new([ValueType::Number]))
            .build();
        assert!(!resolver.can_convert(&ValueType::String, &ValueType::Bool));
    }
}
