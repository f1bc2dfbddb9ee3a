//! Global functions available in expressions
//!
//! Session-bound functions (`value`, `direction`, `exec` and the per-script
//! functions) are registered by the evaluator; the ones here are stateless.

use base64::Engine as _;
use minijinja::value::{Rest, Value, ValueKind};
use minijinja::{Error, ErrorKind, State};

/// Select a value by matching `selector` against key/value pairs
///
/// Usage: ${ switch(env.TIER, 'dev', 'prod', 'live', 'test', 'staging') }
///
/// Returns the value of the first key equal to the selector, the default otherwise.
pub fn switch(selector: Value, default: String, arms: Rest<String>) -> Result<String, Error> {
    if selector.is_undefined() || selector.is_none() {
        return Err(Error::new(
            ErrorKind::UndefinedError,
            "switch: selector is undefined",
        ));
    }
    if arms.len() % 2 != 0 {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            "switch: expected key/value pairs after the default",
        ));
    }
    let selector = selector.to_string();
    Ok(arms
        .chunks(2)
        .find(|pair| pair[0] == selector)
        .map(|pair| pair[1].clone())
        .unwrap_or(default))
}

/// Environment variable by name; a missing variable is an error naming it
///
/// Usage: ${ getenv('TIER') }
///
/// The switch shorthand compiles its selector to this call.
pub fn getenv(state: &State, name: String) -> Result<String, Error> {
    state
        .lookup("env")
        .and_then(|env| env.get_item(&Value::from(name.as_str())).ok())
        .filter(|value| !value.is_undefined() && !value.is_none())
        .map(|value| value.to_string())
        .ok_or_else(|| {
            Error::new(
                ErrorKind::UndefinedError,
                format!("env variable not found: {name}"),
            )
        })
}

/// Split a comma separated string into trimmed, non-empty items
///
/// Usage: ${ comma_list(env.HOSTS) | join(' ') }
pub fn comma_list(value: String) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Usage: ${ to_base64('user:password') }
pub fn to_base64(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

/// Usage: ${ from_base64(env.ENCODED) }
pub fn from_base64(value: String) -> Result<String, Error> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(value.trim().as_bytes())
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("base64 decode error: {e}")))?;
    String::from_utf8(decoded)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("UTF-8 decode error: {e}")))
}

/// Flatten script arguments: sequences contribute their items, everything else its string form
pub(crate) fn flatten_args(args: &[Value]) -> Result<Vec<String>, Error> {
    let mut result = Vec::new();
    for arg in args {
        if arg.is_undefined() {
            return Err(Error::new(
                ErrorKind::UndefinedError,
                "script argument is undefined",
            ));
        }
        if arg.kind() == ValueKind::Seq {
            for item in arg.try_iter()? {
                result.push(item.to_string());
            }
        } else {
            result.push(arg.to_string());
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arms(items: &[&str]) -> Rest<String> {
        Rest(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_switch() {
        let result = switch(Value::from("prod"), "dev".into(), arms(&["prod", "live"])).unwrap();
        assert_eq!(result, "live");

        let result = switch(Value::from("other"), "dev".into(), arms(&["prod", "live"])).unwrap();
        assert_eq!(result, "dev");
    }

    #[test]
    fn test_switch_first_match_wins() {
        let result = switch(Value::from("a"), "0".into(), arms(&["a", "1", "a", "2"])).unwrap();
        assert_eq!(result, "1");
    }

    #[test]
    fn test_switch_undefined_selector() {
        let err = switch(Value::UNDEFINED, "0".into(), arms(&[])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UndefinedError);
    }

    #[test]
    fn test_switch_odd_arms() {
        assert!(switch(Value::from("a"), "0".into(), arms(&["a"])).is_err());
    }

    #[test]
    fn test_comma_list() {
        assert_eq!(comma_list(" a, b,,c ".into()), vec!["a", "b", "c"]);
        assert!(comma_list(String::new()).is_empty());
    }

    #[test]
    fn test_base64() {
        assert_eq!(to_base64("hello".into()), "aGVsbG8=");
        assert_eq!(from_base64("aGVsbG8=".into()).unwrap(), "hello");
        assert!(from_base64("!!!".into()).is_err());
    }

    #[test]
    fn test_flatten_args() {
        let args = vec![
            Value::from("a"),
            Value::from(vec!["b", "c"]),
            Value::from(3),
        ];
        assert_eq!(flatten_args(&args).unwrap(), vec!["a", "b", "c", "3"]);
        assert!(flatten_args(&[Value::UNDEFINED]).is_err());
    }
}
