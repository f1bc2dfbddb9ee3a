//! Filters available in expressions

use minijinja::Error;
use minijinja::value::Value;

use crate::functions;

/// Base64 encode a string
///
/// Usage: ${ env.PASSWORD | b64encode }
pub fn b64encode(value: String) -> String {
    functions::to_base64(value)
}

/// Base64 decode a string
///
/// Usage: ${ encoded | b64decode }
pub fn b64decode(value: String) -> Result<String, Error> {
    functions::from_base64(value)
}

/// Usage: ${ env.HOSTS | comma_list | first }
pub fn comma_list(value: String) -> Vec<String> {
    functions::comma_list(value)
}

/// Quote a value with double quotes, escaping embedded quotes
///
/// Usage: ${ value('name') | quote }
pub fn quote(value: Value) -> String {
    let s = match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    };
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote() {
        assert_eq!(quote(Value::from("a")), "\"a\"");
        assert_eq!(quote(Value::from("say \"hi\"")), "\"say \\\"hi\\\"\"");
        assert_eq!(quote(Value::from(42)), "\"42\"");
    }

    #[test]
    fn test_b64_roundtrip() {
        assert_eq!(b64decode(b64encode("stool".into())).unwrap(), "stool");
    }
}
