use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use regex::Regex;

use crate::core::{DbError, Result};

lazy_static::lazy_static! {
    static ref LIKE_REGEX_CACHE: Arc<Mutex<LruCache<String, Arc<Regex>>>> =
        Arc::new(Mutex::new(LruCache::new(NonZeroUsize::new(200).unwrap())));
}

/// Translates a SQL LIKE pattern into an anchored regex.
/// `%` becomes `.*`, `_` becomes `.`, backslash escapes the next char.
#[inline]
fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');

    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            '\\' if i + 1 < chars.len() => {
                i += 1;
                regex.push_str(&regex::escape(&chars[i].to_string()));
            }
            c if ".*+?^${}()|[]\\".contains(c) => {
                regex.push('\\');
                regex.push(c);
            }
            c => regex.push(c),
        }
        i += 1;
    }

    regex.push('$');
    regex
}

/// Handles the common pattern shapes without compiling a regex:
/// exact match, `prefix%`, `%suffix` and `%substring%`.
#[inline]
fn fast_path_like(text: &str, pattern: &str, case_sensitive: bool) -> Option<bool> {
    if !pattern.contains('%') && !pattern.contains('_') {
        return Some(if case_sensitive {
            text == pattern
        } else {
            text.eq_ignore_ascii_case(pattern)
        });
    }

    if pattern.ends_with('%')
        && !pattern[..pattern.len() - 1].contains('%')
        && !pattern.contains('_')
    {
        let prefix = &pattern[..pattern.len() - 1];
        return Some(if case_sensitive {
            text.starts_with(prefix)
        } else {
            text.to_lowercase().starts_with(&prefix.to_lowercase())
        });
    }

    if pattern.starts_with('%') && !pattern[1..].contains('%') && !pattern.contains('_') {
        let suffix = &pattern[1..];
        return Some(if case_sensitive {
            text.ends_with(suffix)
        } else {
            text.to_lowercase().ends_with(&suffix.to_lowercase())
        });
    }

    if pattern.starts_with('%')
        && pattern.ends_with('%')
        && pattern.matches('%').count() == 2
        && !pattern.contains('_')
    {
        let substring = &pattern[1..pattern.len() - 1];
        return Some(if case_sensitive {
            text.contains(substring)
        } else {
            text.to_lowercase().contains(&substring.to_lowercase())
        });
    }

    None
}

fn get_or_compile_regex(pattern: &str, case_sensitive: bool) -> Result<Arc<Regex>> {
    let cache_key = if case_sensitive {
        format!("s:{}", pattern)
    } else {
        format!("i:{}", pattern)
    };

    {
        let mut cache = LIKE_REGEX_CACHE.lock().unwrap();
        if let Some(regex) = cache.get(&cache_key) {
            return Ok(Arc::clone(regex));
        }
    }

    let regex_pattern = like_to_regex(pattern);
    let compiled = regex::RegexBuilder::new(&regex_pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| DbError::Execution(format!("invalid LIKE pattern: {}", e)))?;

    let compiled_arc = Arc::new(compiled);

    {
        let mut cache = LIKE_REGEX_CACHE.lock().unwrap();
        cache.put(cache_key, Arc::clone(&compiled_arc));
    }

    Ok(compiled_arc)
}

/// Evaluates `text LIKE pattern`, fast paths first, cached regex for the
/// rest.
#[inline]
pub fn eval_like(text: &str, pattern: &str, case_sensitive: bool) -> Result<bool> {
    if let Some(result) = fast_path_like(text, pattern, case_sensitive) {
        return Ok(result);
    }

    let regex = get_or_compile_regex(pattern, case_sensitive)?;
    Ok(regex.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_and_wildcard_patterns() {
        assert!(eval_like("rust", "rust", true).unwrap());
        assert!(eval_like("rustacean", "rust%", true).unwrap());
        assert!(eval_like("ferrous rust", "%rust", true).unwrap());
        assert!(eval_like("a rusty nail", "%rust%", true).unwrap());
        assert!(!eval_like("go", "rust%", true).unwrap());
    }

    #[test]
    fn test_underscore_matches_single_char() {
        assert!(eval_like("cat", "c_t", true).unwrap());
        assert!(!eval_like("cart", "c_t", true).unwrap());
    }

    #[test]
    fn test_case_insensitive_mode() {
        assert!(eval_like("RUST", "rust", false).unwrap());
        assert!(eval_like("Rustacean", "rust%", false).unwrap());
        assert!(!eval_like("RUST", "rust", true).unwrap());
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert!(eval_like("a.b", "a.b", true).unwrap());
        assert!(!eval_like("axb", "a.b", true).unwrap());
        assert!(eval_like("50% off", "50\\% off", true).unwrap());
    }
}
