/// Extract a short type name from the full module path.
///
/// Given `"my_crate::some_module::MyType"`, returns `"MyType"`.
pub fn short_type_name(full: &str) -> &str {
    full.rsplit("::").next().unwrap_or(full)
}

/// Build a yearly sequential document code such as `COT-2026-0007`.
pub fn sequence_code(prefix: &str, year: i32, sequence: u32) -> String {
    format!("{}-{}-{:04}", prefix, year, sequence)
}

/// Re-prefix a document code, keeping everything after the old prefix.
///
/// `("COT-2026-0007", "COT", "PRJ")` gives `"PRJ-2026-0007"`. A code that
/// does not start with `old_prefix` is appended whole.
pub fn reprefix_code(code: &str, old_prefix: &str, new_prefix: &str) -> String {
    let suffix = code
        .strip_prefix(old_prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .unwrap_or(code);
    format!("{}-{}", new_prefix, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_drops_module_path() {
        assert_eq!(short_type_name("solar_pipeline::components::Foo"), "Foo");
        assert_eq!(short_type_name("Bare"), "Bare");
    }

    #[test]
    fn sequence_code_pads_to_four_digits() {
        assert_eq!(sequence_code("COT", 2026, 7), "COT-2026-0007");
        assert_eq!(sequence_code("COT", 2026, 12345), "COT-2026-12345");
    }

    #[test]
    fn reprefix_swaps_known_prefix() {
        assert_eq!(reprefix_code("COT-2026-0007", "COT", "PRJ"), "PRJ-2026-0007");
        assert_eq!(reprefix_code("Q-77", "COT", "PRJ"), "PRJ-Q-77");
    }
}
