//! Shell-style pattern matching for solution globbing

/// A path pattern split into per-segment glob words
///
/// Segments without `*`, `?` or `[` are constant and can be walked without
/// listing directories. A backslash escapes the next character, including `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathGlob {
    words: Vec<String>,
    consts: Vec<bool>,
}

impl PathGlob {
    pub fn new(pattern: &str) -> Self {
        let mut glob = Self::default();
        let mut word = String::new();
        let mut seen_glob = false;
        let mut chars = pattern.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    word.push(c);
                    if let Some(escaped) = chars.next() {
                        word.push(escaped);
                    }
                }
                '/' => {
                    glob.push(std::mem::take(&mut word), !seen_glob);
                    seen_glob = false;
                }
                '*' | '?' | '[' => {
                    seen_glob = true;
                    word.push(c);
                }
                other => word.push(other),
            }
        }
        glob.push(word, !seen_glob);
        glob
    }

    fn push(&mut self, word: String, is_const: bool) {
        if !word.is_empty() {
            self.words.push(word);
            self.consts.push(is_const);
        }
    }

    pub fn depth(&self) -> usize {
        self.words.len()
    }

    pub fn word(&self, depth: usize) -> &str {
        &self.words[depth]
    }

    pub fn is_const(&self, depth: usize) -> bool {
        self.consts[depth]
    }

    pub fn matches(&self, name: &str, depth: usize) -> bool {
        self.words
            .get(depth)
            .is_some_and(|word| fnmatch(word, name))
    }
}

/// `fnmatch(3)` without flags: `*`, `?`, bracket expressions (with `!`/`^`
/// negation and ranges) and backslash escapes.
pub fn fnmatch(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let (mut p, mut n) = (0, 0);
    // Position to resume from after the most recent `*`
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        let step = match pattern.get(p) {
            Some('*') => {
                star = Some((p + 1, n));
                p += 1;
                continue;
            }
            Some('?') => Some(p + 1),
            Some('[') => match match_bracket(&pattern, p, name[n]) {
                Some((true, end)) => Some(end),
                Some((false, _)) => None,
                // Unterminated bracket is a literal '['
                None if name[n] == '[' => Some(p + 1),
                None => None,
            },
            Some('\\') if p + 1 < pattern.len() => (pattern[p + 1] == name[n]).then_some(p + 2),
            Some(&c) => (c == name[n]).then_some(p + 1),
            None => None,
        };
        match step {
            Some(next) => {
                p = next;
                n += 1;
            }
            None => match star {
                Some((star_p, star_n)) => {
                    p = star_p;
                    n = star_n + 1;
                    star = Some((star_p, star_n + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

/// Match `c` against the bracket expression starting at `pattern[start]`.
/// Returns whether it matched and the index just past `]`, or `None` when the
/// expression is unterminated.
fn match_bracket(pattern: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = matches!(pattern.get(i), Some('!') | Some('^'));
    if negate {
        i += 1;
    }
    let mut matched = false;
    let mut first = true;
    loop {
        let mut lo = *pattern.get(i)?;
        if lo == ']' && !first {
            return Some((matched != negate, i + 1));
        }
        first = false;
        if lo == '\\' {
            i += 1;
            lo = *pattern.get(i)?;
        }
        i += 1;
        if pattern.get(i) == Some(&'-') && pattern.get(i + 1).is_some_and(|&hi| hi != ']') {
            let mut hi = pattern[i + 1];
            i += 2;
            if hi == '\\' {
                hi = *pattern.get(i)?;
                i += 1;
            }
            if lo <= c && c <= hi {
                matched = true;
            }
        } else if lo == c {
            matched = true;
        }
    }
}

/// Pattern with `*` as its only wildcard, used for extension discovery
#[derive(Debug, Clone)]
pub struct SimpleWildCard {
    components: Vec<String>,
}

impl SimpleWildCard {
    pub fn new(pattern: &str) -> Self {
        Self {
            components: pattern.split('*').map(str::to_string).collect(),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        let Some((first, rest)) = self.components.split_first() else {
            return name.is_empty();
        };
        let Some(mut remaining) = name.strip_prefix(first.as_str()) else {
            return false;
        };
        let Some((last, middle)) = rest.split_last() else {
            return remaining.is_empty();
        };
        for component in middle {
            match remaining.find(component.as_str()) {
                Some(idx) => remaining = &remaining[idx + component.len()..],
                None => return false,
            }
        }
        remaining.ends_with(last.as_str())
    }
}
