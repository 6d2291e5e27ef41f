//! Binds a raw argument string to a command descriptor: flag extraction,
//! bounded tokenization, arity checks and per-parameter validation.

use crate::application::errors::BindError;
use crate::domain::entities::{ArgType, ArgValue, ArityMode, Bound, CommandSpec, Hint};

/// Bind a raw argument string against a descriptor. Every failure is a
/// recoverable, user-facing error.
pub fn bind(spec: &CommandSpec, raw: &str) -> Result<Bound, BindError> {
    let mut text = raw.trim().to_string();
    let mut flags = String::new();

    // Flags are only parsed when the command declares some
    while text.starts_with('-') && !spec.flags.is_empty() {
        let token: String = text.chars().take_while(|c| !c.is_whitespace()).collect();
        for flag in token.chars().skip(1) {
            if flag == '-' {
                continue;
            }
            if !spec.flags.contains_key(&flag) {
                return Err(BindError::InvalidFlag(flag));
            }
            flags.push(flag);
        }
        text = text[token.len()..].trim_start().to_string();
    }

    let max = spec.max_arity();
    let mut tokens = split_args(&text, max);

    if tokens.len() < spec.min_arity() {
        return Err(BindError::TooFewArguments(spec.min_arity()));
    }
    let overflow = tokens.len() > max
        || (spec.arity == ArityMode::Fixed
            && tokens.last().is_some_and(|t| t.contains(char::is_whitespace)));
    if overflow {
        if max == 0 {
            return Err(BindError::NoArgumentsExpected);
        }
        return Err(BindError::TooManyArguments(max));
    }

    // The variadic tail is re-split and exempt from validation
    let mut tail = Vec::new();
    if spec.arity == ArityMode::Variadic && tokens.len() == max && max > 0 {
        let last = tokens.pop().unwrap_or_default();
        tail = last.split_whitespace().map(String::from).collect();
    }

    let mut values = Vec::with_capacity(tokens.len());
    for (param, token) in spec.params().iter().zip(tokens) {
        let value = match &param.hint {
            None => ArgValue::Str(token),
            Some(Hint::Type(arg_type)) => coerce(*arg_type, &param.name, token)?,
            Some(Hint::Choice(options)) => {
                match options.iter().find(|o| o.eq_ignore_ascii_case(&token)) {
                    // Canonicalize to the declared casing
                    Some(canonical) => ArgValue::Str(canonical.clone()),
                    None => {
                        return Err(BindError::InvalidChoice {
                            param: param.name.clone(),
                            value: token,
                            allowed: options.clone(),
                        })
                    }
                }
            }
            Some(Hint::Pattern(pattern)) => {
                // Anchored at the start, like the patterns were declared
                let matched = pattern.find(&token).is_some_and(|m| m.start() == 0);
                if !matched {
                    return Err(BindError::PatternMismatch {
                        param: param.name.clone(),
                        value: token,
                        pattern: pattern.as_str().to_string(),
                    });
                }
                ArgValue::Str(token)
            }
        };
        values.push(value);
    }

    Ok(Bound { flags, values, tail })
}

fn coerce(arg_type: ArgType, param: &str, token: String) -> Result<ArgValue, BindError> {
    let mismatch = |token: String| BindError::TypeMismatch {
        param: param.to_string(),
        value: token,
        expected: arg_type.name(),
    };
    match arg_type {
        ArgType::Str => Ok(ArgValue::Str(token)),
        ArgType::Bool => match token.to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(ArgValue::Bool(true)),
            "false" | "no" | "0" => Ok(ArgValue::Bool(false)),
            _ => Err(mismatch(token)),
        },
        ArgType::Int => match token.parse() {
            Ok(n) => Ok(ArgValue::Int(n)),
            Err(_) => Err(mismatch(token)),
        },
        ArgType::Float => match token.parse() {
            Ok(x) => Ok(ArgValue::Float(x)),
            Err(_) => Err(mismatch(token)),
        },
    }
}

/// Split into at most `max` whitespace-delimited chunks; the final chunk
/// keeps any embedded whitespace. With `max == 0` the text is split fully so
/// leftover tokens can be detected.
fn split_args(text: &str, max: usize) -> Vec<String> {
    let mut rest = text.trim_start();
    if rest.is_empty() {
        return Vec::new();
    }
    if max == 0 {
        return rest.split_whitespace().map(String::from).collect();
    }
    let mut out = Vec::new();
    while out.len() + 1 < max {
        match rest.find(char::is_whitespace) {
            Some(i) => {
                out.push(rest[..i].to_string());
                rest = rest[i..].trim_start();
                if rest.is_empty() {
                    return out;
                }
            }
            None => {
                out.push(rest.to_string());
                return out;
            }
        }
    }
    out.push(rest.trim_end().to_string());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::CommandSpec;
    use regex_lite::Regex;

    fn strv(items: &[&str]) -> Vec<ArgValue> {
        items.iter().map(|s| ArgValue::Str(s.to_string())).collect()
    }

    #[test]
    fn test_fixed_arity() {
        let spec = CommandSpec::new("pair").with_param("a").with_param("b");
        assert_eq!(bind(&spec, "a"), Err(BindError::TooFewArguments(2)));
        assert_eq!(bind(&spec, "a b c"), Err(BindError::TooManyArguments(2)));
        assert_eq!(bind(&spec, "a b").unwrap().values, strv(&["a", "b"]));
    }

    #[test]
    fn test_no_arguments_expected() {
        let spec = CommandSpec::new("ping");
        assert_eq!(bind(&spec, "extra"), Err(BindError::NoArgumentsExpected));
        assert_eq!(bind(&spec, "").unwrap(), Bound::default());
    }

    #[test]
    fn test_full_text_keeps_whitespace() {
        let spec = CommandSpec::new("say").with_param("text").full_text();
        assert_eq!(bind(&spec, "hello big world").unwrap().values, strv(&["hello big world"]));
        let spec = CommandSpec::new("tr").with_param("word").with_param("rest").full_text();
        let bound = bind(&spec, "a b c d").unwrap();
        assert_eq!(bound.values, strv(&["a", "b c d"]));
    }

    #[test]
    fn test_variadic_tail() {
        let spec = CommandSpec::new("sum").with_param("first").with_tail("rest");
        let bound = bind(&spec, "1 2 3 4").unwrap();
        assert_eq!(bound.values, strv(&["1"]));
        assert_eq!(bound.tail, vec!["2", "3", "4"]);
        // tail may be empty
        let bound = bind(&spec, "1").unwrap();
        assert_eq!(bound.values, strv(&["1"]));
        assert!(bound.tail.is_empty());
    }

    #[test]
    fn test_flags() {
        let spec = CommandSpec::new("cipher")
            .with_param("text")
            .full_text()
            .with_flag('d', "decode")
            .with_flag('e', "encode");
        let bound = bind(&spec, "-de text").unwrap();
        assert!(bound.has_flag('d'));
        assert!(bound.has_flag('e'));
        assert_eq!(bound.values, strv(&["text"]));
        assert_eq!(bind(&spec, "-x text"), Err(BindError::InvalidFlag('x')));
    }

    #[test]
    fn test_leading_dash_without_declared_flags_is_an_argument() {
        let spec = CommandSpec::new("echo").with_param("text").full_text();
        assert_eq!(bind(&spec, "-de text").unwrap().values, strv(&["-de text"]));
    }

    #[test]
    fn test_bool_coercion_vocabulary() {
        let spec = CommandSpec::new("set")
            .with_param("on")
            .with_hint("on", Hint::Type(ArgType::Bool));
        assert_eq!(bind(&spec, "YES").unwrap().values, vec![ArgValue::Bool(true)]);
        assert_eq!(bind(&spec, "0").unwrap().values, vec![ArgValue::Bool(false)]);
        assert_eq!(
            bind(&spec, "maybe"),
            Err(BindError::TypeMismatch {
                param: "on".to_string(),
                value: "maybe".to_string(),
                expected: "bool",
            })
        );
    }

    #[test]
    fn test_numeric_coercion() {
        let spec = CommandSpec::new("roll")
            .with_param("n")
            .with_hint("n", Hint::Type(ArgType::Int))
            .with_opt_param("bias")
            .with_hint("bias", Hint::Type(ArgType::Float));
        let bound = bind(&spec, "6 0.5").unwrap();
        assert_eq!(bound.int(0), Some(6));
        assert_eq!(bound.float(1), Some(0.5));
        assert!(matches!(
            bind(&spec, "six"),
            Err(BindError::TypeMismatch { expected: "int", .. })
        ));
    }

    #[test]
    fn test_choice_canonicalizes_case() {
        let spec = CommandSpec::new("mode").with_param("which").with_hint(
            "which",
            Hint::Choice(vec!["On".to_string(), "Off".to_string()]),
        );
        assert_eq!(bind(&spec, "ON").unwrap().values, strv(&["On"]));
        assert_eq!(
            bind(&spec, "auto"),
            Err(BindError::InvalidChoice {
                param: "which".to_string(),
                value: "auto".to_string(),
                allowed: vec!["On".to_string(), "Off".to_string()],
            })
        );
    }

    #[test]
    fn test_pattern_is_start_anchored() {
        let spec = CommandSpec::new("tz").with_param("zone").with_hint(
            "zone",
            Hint::Pattern(Regex::new("[A-Z]{3}").unwrap()),
        );
        assert_eq!(bind(&spec, "UTC").unwrap().values, strv(&["UTC"]));
        assert!(matches!(
            bind(&spec, "xUTC"),
            Err(BindError::PatternMismatch { .. })
        ));
    }

    #[test]
    fn test_variadic_tail_skips_validation() {
        let spec = CommandSpec::new("add")
            .with_param("n")
            .with_hint("n", Hint::Type(ArgType::Int))
            .with_tail("rest");
        // tail tokens are not coerced even though they are not numbers
        let bound = bind(&spec, "1 two three").unwrap();
        assert_eq!(bound.int(0), Some(1));
        assert_eq!(bound.tail, vec!["two", "three"]);
    }

    #[test]
    fn test_optional_params_may_be_absent() {
        let spec = CommandSpec::new("greet").with_param("who").with_opt_param("emotion");
        let bound = bind(&spec, "world").unwrap();
        assert_eq!(bound.values, strv(&["world"]));
        assert_eq!(bound.str(1), None);
    }
}
