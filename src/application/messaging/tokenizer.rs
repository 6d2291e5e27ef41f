//! Extraction of command strings from raw message text.
//!
//! A message is a command when it starts with a configured prefix. Inside
//! prose, a command can be embedded after a breaker character: `please say
//! |;hi` calls `;hi`, and a doubled breaker lets the command itself contain
//! the breaker: `||;say things with a | in them`.

/// Tell if a string starts with one of the prefixes
pub fn has_prefix(text: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| text.starts_with(prefix.as_str()))
}

/// Strip the first matching prefix and any whitespace following it
pub fn strip_prefix<'a>(text: &'a str, prefixes: &[String]) -> &'a str {
    for prefix in prefixes {
        if let Some(rest) = text.strip_prefix(prefix.as_str()) {
            return rest.trim_start();
        }
    }
    text
}

/// Read commands from a string; returns the command strings and whether the
/// command is the only content of the message.
///
/// `";example"` yields `(["example"], true)` because the message is only a
/// command; `"Give an |;example"` yields `(["example"], false)` because the
/// message has other content. An empty list means "no command present", not
/// an error.
pub fn read_commands(
    text: &str,
    prefixes: &[String],
    breaker: char,
    direct: bool,
) -> (Vec<String>, bool) {
    // Any direct/private message is considered a command
    if direct {
        return (vec![strip_prefix(text, prefixes).to_string()], true);
    }
    if has_prefix(text, prefixes) {
        return (vec![strip_prefix(text, prefixes).to_string()], true);
    }
    let doubled: String = [breaker, breaker].iter().collect();
    if let Some(index) = text.find(&doubled) {
        // Text before the doubled breaker is re-parsed with the single-breaker
        // rule; text after it is checked directly against the prefix list.
        // An unprefixed remainder is dropped silently.
        let (mut commands, _) =
            read_commands(text[..index].trim_end(), prefixes, breaker, false);
        let sub = text[index + doubled.len()..].trim_start();
        if has_prefix(sub, prefixes) {
            commands.push(strip_prefix(sub, prefixes).to_string());
        }
        return (commands, false);
    }
    if text.contains(breaker) {
        let mut commands = Vec::new();
        for part in text.split(breaker) {
            let part = part.trim();
            if has_prefix(part, prefixes) {
                commands.push(strip_prefix(part, prefixes).to_string());
            }
        }
        return (commands, false);
    }
    (Vec::new(), false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefixes(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn read(text: &str, pre: &[&str], direct: bool) -> (Vec<String>, bool) {
        read_commands(text, &prefixes(pre), '|', direct)
    }

    #[test]
    fn test_has_prefix() {
        assert!(has_prefix(";hi", &prefixes(&[";"])));
        assert!(!has_prefix("hi", &prefixes(&[";"])));
        assert!(has_prefix(";hi", &prefixes(&[";", "!"])));
        assert!(has_prefix("!hi", &prefixes(&[";", "!"])));
        assert!(!has_prefix(";hi", &prefixes(&["!"])));
    }

    #[test]
    fn test_strip_prefix() {
        assert_eq!(strip_prefix(";hi", &prefixes(&[";"])), "hi");
        assert_eq!(strip_prefix("hi", &prefixes(&[";"])), "hi");
        assert_eq!(strip_prefix(";hi", &prefixes(&[";", "!"])), "hi");
        assert_eq!(strip_prefix("!hi", &prefixes(&[";", "!"])), "hi");
        assert_eq!(strip_prefix(";hi", &prefixes(&["!"])), ";hi");
    }

    #[test]
    fn test_read_commands() {
        assert_eq!(read(";a b c", &[";"], false), (vec!["a b c".to_string()], true));
        assert_eq!(
            read("|;a b|;c", &[";"], false),
            (vec!["a b".to_string(), "c".to_string()], false)
        );
        assert_eq!(read("a b", &[";"], true), (vec!["a b".to_string()], true));
        assert_ne!(read("a b", &[";"], false), (vec!["a b".to_string()], true));
        assert_eq!(read("a b || c", &[";"], false), (vec![], false));
        assert_eq!(read("a b ||;c", &[";"], false), (vec!["c".to_string()], false));
        assert_eq!(
            read("a |;b || ;c | ;d", &[";"], false),
            (vec!["b".to_string(), "c | ;d".to_string()], false)
        );
    }

    #[test]
    fn test_no_prefix_no_breaker_is_empty() {
        assert_eq!(read("just some prose", &[";"], false), (vec![], false));
    }

    #[test]
    fn test_embedded_command_in_prose() {
        assert_eq!(
            read("tell me |;hello", &[";"], false),
            (vec!["hello".to_string()], false)
        );
    }

    #[test]
    fn test_mention_prefix() {
        assert_eq!(
            read("<@42> hello there", &["<@42>", ";"], false),
            (vec!["hello there".to_string()], true)
        );
    }
}
