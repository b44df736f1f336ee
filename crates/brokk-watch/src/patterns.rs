//! Glob matching for the watcher's include/ignore pattern lists
//! ([`crate::service::WatchConfig::include_patterns`] /
//! `ignore_patterns`).
//!
//! A small DP-memoized `*`/`**`/`?` matcher, following the general glob
//! matcher shown in the retrieved example pack rather than pulling in a
//! `glob`/`ignore` crate dependency the corpus doesn't reach for at this
//! scale.

pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = text.chars().collect();
    let cols = txt.len() + 1;
    let mut memo: Vec<Option<bool>> = vec![None; (pat.len() + 1) * cols];
    glob_match_inner(&pat, &txt, 0, 0, cols, &mut memo)
}

fn glob_match_inner(
    pattern: &[char],
    text: &[char],
    pi: usize,
    ti: usize,
    cols: usize,
    memo: &mut [Option<bool>],
) -> bool {
    let key = pi * cols + ti;
    if let Some(cached) = memo[key] {
        return cached;
    }

    let result = if pi == pattern.len() {
        ti == text.len()
    } else {
        let token = pattern[pi];
        if token == '*' {
            if pi + 1 < pattern.len() && pattern[pi + 1] == '*' {
                let mut next = pi + 2;
                while next < pattern.len() && pattern[next] == '*' {
                    next += 1;
                }

                glob_match_inner(pattern, text, next, ti, cols, memo)
                    || (ti < text.len() && glob_match_inner(pattern, text, pi, ti + 1, cols, memo))
            } else {
                glob_match_inner(pattern, text, pi + 1, ti, cols, memo)
                    || (ti < text.len()
                        && text[ti] != '/'
                        && glob_match_inner(pattern, text, pi, ti + 1, cols, memo))
            }
        } else if token == '?' {
            ti < text.len() && text[ti] != '/' && glob_match_inner(pattern, text, pi + 1, ti + 1, cols, memo)
        } else {
            ti < text.len() && token == text[ti] && glob_match_inner(pattern, text, pi + 1, ti + 1, cols, memo)
        }
    };

    memo[key] = Some(result);
    result
}
