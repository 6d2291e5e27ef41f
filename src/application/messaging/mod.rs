//! Message handling - command extraction, argument binding and dispatch

pub mod binder;
pub mod dispatcher;
pub mod tokenizer;

pub use binder::bind;
pub use dispatcher::{Dispatcher, EXIT_RESTART, EXIT_SHUTDOWN};
pub use tokenizer::{has_prefix, read_commands, strip_prefix};

/// Prettify a list of strings: `["a", "b", "c"]` becomes `a, b and c`.
///
/// `formatting` is applied to each item and must contain `%s`; `final_word`
/// links the two last items, typically "and" or "or".
pub fn pretty(items: &[String], formatting: &str, final_word: &str) -> String {
    let formatted: Vec<String> = items
        .iter()
        .map(|item| formatting.replace("%s", item))
        .collect();
    match formatted.len() {
        0 => String::new(),
        1 => formatted.into_iter().next().unwrap_or_default(),
        n => format!(
            "{} {} {}",
            formatted[..n - 1].join(", "),
            final_word,
            formatted[n - 1]
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::pretty;

    fn strs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pretty() {
        assert_eq!(pretty(&[], "%s", "and"), "");
        assert_eq!(pretty(&strs(&["a"]), "%s", "and"), "a");
        assert_eq!(pretty(&strs(&["a"]), "*%s*", "and"), "*a*");
        assert_eq!(pretty(&strs(&["a", "b"]), "%s", "and"), "a and b");
        assert_eq!(pretty(&strs(&["a", "b", "c"]), "%s", "and"), "a, b and c");
        assert_eq!(
            pretty(&strs(&["a", "b", "c"]), "*%s*", "and"),
            "*a*, *b* and *c*"
        );
    }
}
