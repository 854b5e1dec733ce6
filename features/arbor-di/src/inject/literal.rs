use std::any::type_name;

use crate::{
    errors::ConversionError,
    inject::{mismatch, Expect, FromValue},
    value::Value,
};

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Literal(literal) => Ok(literal),
            other => Err(mismatch("a literal", &other)),
        }
    }

    fn expects() -> Expect {
        Expect::Scalar
    }
}

/// Scalars parsed from their literal form
macro_rules! parsed_literal {
    ($($scalar:ty),* $(,)?) => {
        $(
            impl FromValue for $scalar {
                fn from_value(value: Value) -> Result<Self, ConversionError> {
                    let literal = String::from_value(value)?;
                    literal.trim().parse().map_err(|_| ConversionError::Parse {
                        value: literal,
                        target: type_name::<$scalar>(),
                    })
                }

                fn expects() -> Expect {
                    Expect::Scalar
                }
            }
        )*
    };
}

parsed_literal!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    std::path::PathBuf,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalars() {
        assert_eq!(u16::from_value(Value::Literal(" 8080 ".into())).unwrap(), 8080);
        assert!(bool::from_value(Value::Literal("true".into())).unwrap());
        assert_eq!(f64::from_value(Value::Literal("0.5".into())).unwrap(), 0.5);
    }

    #[test]
    fn reports_unparseable_literals() {
        let error = u8::from_value(Value::Literal("300".into())).unwrap_err();
        assert!(matches!(
            error,
            ConversionError::Parse { target: "u8", ref value } if value == "300"
        ));
    }
}
