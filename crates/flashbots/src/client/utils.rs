use std::str::FromStr;

use alloy_primitives::{Address, U256, U64};
use serde::{de, Deserialize};
use serde_json::Value;

// Relays report quantities as hex strings, decimal strings or bare numbers.
fn quantity_from_value<E: de::Error>(value: Value) -> Result<U256, E> {
    match value {
        Value::String(s) if s == "0x" => Ok(U256::ZERO),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex) => U256::from_str_radix(hex, 16).map_err(de::Error::custom),
            None => U256::from_str_radix(&s, 10).map_err(de::Error::custom),
        },
        Value::Number(num) => num.as_u64().map(U256::from).ok_or_else(|| de::Error::custom("Invalid number")),
        _ => Err(de::Error::custom("wrong type")),
    }
}

pub fn deserialize_u64<'de, D>(deserializer: D) -> Result<U64, D::Error>
where
    D: de::Deserializer<'de>,
{
    let value = quantity_from_value::<D::Error>(Value::deserialize(deserializer)?)?;
    u64::try_from(value).map(U64::from).map_err(|_| de::Error::custom("quantity does not fit into u64"))
}

pub fn deserialize_u256<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: de::Deserializer<'de>,
{
    quantity_from_value(Value::deserialize(deserializer)?)
}

pub fn deserialize_optional_address<'de, D>(deserializer: D) -> Result<Option<Address>, D::Error>
where
    D: de::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) if s == "0x" => Ok(None),
        Value::String(s) => Address::from_str(&s).map(Some).map_err(de::Error::custom),
        Value::Null => Ok(None),
        _ => Err(de::Error::custom("expected a hexadecimal string")),
    }
}
