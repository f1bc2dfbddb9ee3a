//! Fuzzy "did you mean" suggestions

/// Maximum Levenshtein distance to consider for suggestions
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Functions registered in every evaluation session
pub const AVAILABLE_FUNCTIONS: &[&str] = &[
    "switch",
    "getenv",
    "value",
    "direction",
    "exec",
    "comma_list",
    "to_base64",
    "from_base64",
];

/// Filters registered in every evaluation session
pub const AVAILABLE_FILTERS: &[&str] = &["b64encode", "b64decode", "comma_list", "quote"];

/// Variables bound in every evaluation session
pub const CONTEXT_VARIABLES: &[&str] = &["env", "prev", "stool", "storage"];

/// Closest candidate within the suggestion distance, ties resolved by order
pub fn closest_match<'a>(
    input: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<&'a str> {
    candidates
        .into_iter()
        .map(|candidate| (strsim::levenshtein(input, candidate), candidate))
        .filter(|(distance, _)| *distance > 0 && *distance <= MAX_SUGGESTION_DISTANCE)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate)
}

/// Suggest a direction name for a failed lookup
pub fn suggest_direction<'a>(
    name: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    closest_match(name, candidates).map(|found| format!("did you mean `{found}`?"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closest_match() {
        let names = ["replicas", "hostname", "port"];
        assert_eq!(closest_match("replica", names), Some("replicas"));
        assert_eq!(closest_match("prot", names), Some("port"));
        assert_eq!(closest_match("completely-different", names), None);
        assert_eq!(closest_match("port", names), None);
    }

    #[test]
    fn test_suggest_direction() {
        assert_eq!(
            suggest_direction("hostnme", ["hostname"]).as_deref(),
            Some("did you mean `hostname`?")
        );
    }
}
