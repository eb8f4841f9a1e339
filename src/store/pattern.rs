//! Glob matching for `KEYS`-style patterns
//!
//! Supports the subset the remote store understands: `*` (any run of
//! characters, including none), `?` (exactly one character), `[...]`
//! character classes with ranges and `^` negation, and `\` to escape the
//! next character.

/// Characters that carry meaning inside a pattern
const GLOB_META: &[char] = &['*', '?', '[', ']', '\\'];

/// Check whether `key` matches the glob `pattern`
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();

    let (mut p, mut k) = (0, 0);
    // Position of the last `*` seen and the key index it was tried against
    let mut backtrack: Option<(usize, usize)> = None;

    while k < key.len() {
        if p < pattern.len() {
            match pattern[p] {
                '*' => {
                    backtrack = Some((p, k));
                    p += 1;
                    continue;
                }
                '?' => {
                    p += 1;
                    k += 1;
                    continue;
                }
                '[' => {
                    if let Some((matched, next)) = match_class(&pattern, p, key[k]) {
                        if matched {
                            p = next;
                            k += 1;
                            continue;
                        }
                    } else if key[k] == '[' {
                        // Unterminated class: treat `[` literally
                        p += 1;
                        k += 1;
                        continue;
                    }
                }
                '\\' if p + 1 < pattern.len() => {
                    if pattern[p + 1] == key[k] {
                        p += 2;
                        k += 1;
                        continue;
                    }
                }
                c => {
                    if c == key[k] {
                        p += 1;
                        k += 1;
                        continue;
                    }
                }
            }
        }

        // Mismatch: let the last star swallow one more character
        match backtrack {
            Some((star_p, star_k)) => {
                backtrack = Some((star_p, star_k + 1));
                p = star_p + 1;
                k = star_k + 1;
            }
            None => return false,
        }
    }

    // Trailing stars match the empty remainder
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

/// Match `c` against the class starting at `pattern[start] == '['`.
///
/// Returns `(matched, index after the closing ']')`, or `None` if the class
/// is never closed.
fn match_class(pattern: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = pattern.get(i) == Some(&'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    let mut first = true;
    while i < pattern.len() {
        let mut lo = pattern[i];
        if lo == ']' && !first {
            return Some((matched != negate, i + 1));
        }
        first = false;

        if lo == '\\' && i + 1 < pattern.len() {
            i += 1;
            lo = pattern[i];
        }

        if i + 2 < pattern.len() && pattern[i + 1] == '-' && pattern[i + 2] != ']' {
            let mut hi = pattern[i + 2];
            let mut consumed = 3;
            if hi == '\\' && i + 3 < pattern.len() {
                hi = pattern[i + 3];
                consumed = 4;
            }
            let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
            if lo <= c && c <= hi {
                matched = true;
            }
            i += consumed;
        } else {
            if lo == c {
                matched = true;
            }
            i += 1;
        }
    }
    None
}

/// Escape glob metacharacters so `raw` only ever matches itself
pub fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if GLOB_META.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_match() {
        assert!(glob_match("class:42:roster", "class:42:roster"));
        assert!(!glob_match("class:42:roster", "class:42:rosters"));
        assert!(!glob_match("class:42", "class:42:roster"));
    }

    #[test]
    fn test_star() {
        assert!(glob_match("class:42:*", "class:42:data:u1"));
        assert!(glob_match("class:42:*", "class:42:"));
        assert!(!glob_match("class:42:*", "class:420:data"));
        assert!(glob_match("*", ""));
        assert!(glob_match("student:class:*:c9", "student:class:u1:c9"));
        assert!(!glob_match("student:class:*:c9", "student:class:u1:c90"));
        assert!(glob_match("*:stats:*", "teacher:dashboard:stats:T1"));
    }

    #[test]
    fn test_question_mark() {
        assert!(glob_match("k?y", "key"));
        assert!(!glob_match("k?y", "ky"));
    }

    #[test]
    fn test_character_classes() {
        assert!(glob_match("h[ae]llo", "hallo"));
        assert!(!glob_match("h[ae]llo", "hillo"));
        assert!(glob_match("h[^e]llo", "hallo"));
        assert!(!glob_match("h[^e]llo", "hello"));
        assert!(glob_match("v[0-9]", "v7"));
        assert!(!glob_match("v[0-9]", "vx"));
    }

    #[test]
    fn test_escape() {
        assert!(glob_match(r"a\*b", "a*b"));
        assert!(!glob_match(r"a\*b", "axb"));

        let escaped = escape_glob("odd*id?");
        assert_eq!(escaped, r"odd\*id\?");
        assert!(glob_match(&escaped, "odd*id?"));
        assert!(!glob_match(&escaped, "oddXidY"));
    }
}
