///
/// Boxed numbers.
///
/// `Number` is a number whose underlying representation is known only at
/// runtime, such as a value read from a loosely typed configuration or a
/// foreign runtime. Each variant is one representation tag.
///
/// Number -> DatabaseValue:
/// - Decimal holding an exact integer in i64 range -> Integer
/// - signed and unsigned integers up to 32 bits, and i64 -> Integer
/// - u64 and usize -> Integer, values above i64::MAX are a fatal caller bug
/// - f32, f64 and other decimals -> Real
/// - bool -> Integer 0/1
///
/// DatabaseValue -> Number: Integer and Real map directly, Text is parsed
/// as a decimal with a fixed `.` separator, Null and Blob yield nothing.
///

use std::str::FromStr;

use num_traits::ToPrimitive;
use rust_decimal::Decimal;

use crate::value::{DatabaseValue, DatabaseValueConvertible};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Isize(isize),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Usize(usize),
    F32(f32),
    F64(f64),
    Bool(bool),
    Decimal(Decimal),
}

impl Number {
    pub fn to_i64(&self) -> Option<i64> {
        match self.database_value() {
            DatabaseValue::Integer(i) => Some(i),
            DatabaseValue::Real(f) => f64_to_i64(f),
            _ => None,
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self.database_value() {
            DatabaseValue::Integer(i) => i as f64,
            DatabaseValue::Real(f) => f,
            _ => f64::NAN,
        }
    }
}

fn f64_to_i64(f: f64) -> Option<i64> {
    i64::from_database_value(&DatabaseValue::Real(f))
}

fn checked_unsigned(value: u64) -> DatabaseValue {
    assert!(
        value <= i64::MAX as u64,
        "{} exceeds i64::MAX and cannot be stored in SQLite",
        value
    );
    DatabaseValue::Integer(value as i64)
}

impl DatabaseValueConvertible for Number {
    fn database_value(&self) -> DatabaseValue {
        if let Number::Decimal(decimal) = self {
            if decimal.fract().is_zero() {
                if let Some(i) = decimal.to_i64() {
                    return DatabaseValue::Integer(i);
                }
            }
        }
        match *self {
            Number::I8(v) => DatabaseValue::Integer(i64::from(v)),
            Number::I16(v) => DatabaseValue::Integer(i64::from(v)),
            Number::I32(v) => DatabaseValue::Integer(i64::from(v)),
            Number::I64(v) => DatabaseValue::Integer(v),
            Number::Isize(v) => DatabaseValue::Integer(v as i64),
            Number::U8(v) => DatabaseValue::Integer(i64::from(v)),
            Number::U16(v) => DatabaseValue::Integer(i64::from(v)),
            Number::U32(v) => DatabaseValue::Integer(i64::from(v)),
            Number::U64(v) => checked_unsigned(v),
            Number::Usize(v) => checked_unsigned(v as u64),
            Number::F32(v) => DatabaseValue::Real(f64::from(v)),
            Number::F64(v) => DatabaseValue::Real(v),
            Number::Bool(v) => DatabaseValue::Integer(if v { 1 } else { 0 }),
            Number::Decimal(v) => match v.to_f64() {
                Some(f) => DatabaseValue::Real(f),
                None => panic!("decimal {} has no double representation", v),
            },
        }
    }

    fn from_database_value(value: &DatabaseValue) -> Option<Self> {
        match value {
            DatabaseValue::Integer(i) => Some(Number::I64(*i)),
            DatabaseValue::Real(f) => Some(Number::F64(*f)),
            DatabaseValue::Text(s) => parse_decimal(s).map(Number::Decimal),
            DatabaseValue::Null | DatabaseValue::Blob(_) => None,
        }
    }
}

/// Parses a decimal with `.` as separator, whatever the process locale.
fn parse_decimal(text: &str) -> Option<Decimal> {
    let trimmed = text.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

impl DatabaseValueConvertible for Decimal {
    fn database_value(&self) -> DatabaseValue {
        Number::Decimal(*self).database_value()
    }

    fn from_database_value(value: &DatabaseValue) -> Option<Self> {
        match value {
            DatabaseValue::Integer(i) => Some(Decimal::from(*i)),
            DatabaseValue::Real(f) => Decimal::from_f64_retain(*f),
            DatabaseValue::Text(s) => parse_decimal(s),
            DatabaseValue::Null | DatabaseValue::Blob(_) => None,
        }
    }
}

macro_rules! impl_number_from {
    ($($ty:ty => $variant:ident),*) => {
        $(
            impl From<$ty> for Number {
                fn from(value: $ty) -> Self {
                    Number::$variant(value)
                }
            }
        )*
    };
}

impl_number_from!(
    i8 => I8, i16 => I16, i32 => I32, i64 => I64, isize => Isize,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64, usize => Usize,
    f32 => F32, f64 => F64, bool => Bool, Decimal => Decimal
);
