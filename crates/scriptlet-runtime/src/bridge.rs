//! Dynamic value trees → rhai values.

use rhai::{Array, Dynamic, Map};
use serde::Serialize;

use scriptlet_value::{ConvertError, DynamicValue, to_dynamic};

/// Hand a converted value to the interpreter.
///
/// rhai integers are signed, so `Uint` values above `i64::MAX` become
/// floats. rhai maps are key-sorted.
pub fn to_rhai(value: DynamicValue) -> Dynamic {
    match value {
        DynamicValue::None => Dynamic::UNIT,
        DynamicValue::Bool(b) => Dynamic::from_bool(b),
        DynamicValue::Int(i) => Dynamic::from_int(i),
        DynamicValue::Uint(u) => match i64::try_from(u) {
            Ok(i) => Dynamic::from_int(i),
            Err(_) => Dynamic::from_float(u as f64),
        },
        DynamicValue::Float(x) => Dynamic::from_float(x),
        DynamicValue::String(s) => Dynamic::from(s),
        DynamicValue::List(items) => {
            let array: Array = items.into_iter().map(to_rhai).collect();
            Dynamic::from_array(array)
        }
        DynamicValue::Dict(dict) => {
            let mut map = Map::new();
            for (key, value) in dict {
                map.insert(key.into(), to_rhai(value));
            }
            Dynamic::from_map(map)
        }
    }
}

/// Convert a host record straight into a script value.
pub fn to_script_value<T: ?Sized + Serialize>(value: &T) -> Result<Dynamic, ConvertError> {
    to_dynamic(value).map(to_rhai)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars() {
        assert!(to_rhai(DynamicValue::None).is_unit());
        assert_eq!(to_rhai(DynamicValue::Int(-3)).as_int(), Ok(-3));
        assert_eq!(to_rhai(DynamicValue::Uint(7)).as_int(), Ok(7));
        assert_eq!(to_rhai(DynamicValue::Bool(true)).as_bool(), Ok(true));
        assert_eq!(
            to_rhai(DynamicValue::from("node1")).into_string().unwrap(),
            "node1"
        );
    }

    #[test]
    fn huge_unsigned_values_become_floats() {
        let value = to_rhai(DynamicValue::Uint(u64::MAX));
        assert!(value.is_float());
    }

    #[test]
    fn records_become_maps() {
        #[derive(Serialize)]
        struct Member {
            server_name: String,
            roles: Vec<String>,
        }

        let value = to_script_value(&Member {
            server_name: "node1".to_string(),
            roles: vec!["database".to_string()],
        })
        .unwrap();

        let map = value.cast::<Map>();
        assert_eq!(
            map.get("server_name").unwrap().clone().into_string().unwrap(),
            "node1"
        );
        let roles = map.get("roles").unwrap().clone().into_array().unwrap();
        assert_eq!(roles.len(), 1);
    }
}
