//! `~=` 运算符：`s<sep>from<sep>to[<sep>flags]`

use regex::RegexBuilder;

/// 解析好的替换表达式
#[derive(Debug, Clone, PartialEq)]
pub struct Substitution {
    pattern: String,
    replacement: String,
    global: bool,
    case_insensitive: bool,
}

impl Substitution {
    /// 第一个字符之后的字符是分隔符；只能分出 3 或 4 段
    pub fn parse(text: &str) -> Option<Self> {
        let mut chars = text.chars();
        if chars.next()? != 's' {
            return None;
        }
        let separator = chars.next()?;
        let parts: Vec<&str> = text.split(separator).collect();
        if parts.len() != 3 && parts.len() != 4 {
            return None;
        }
        let flags = parts.get(3).copied().unwrap_or("");
        let pattern = if flags.contains('q') {
            regex::escape(parts[1])
        } else {
            parts[1].to_string()
        };
        Some(Self {
            pattern,
            replacement: replacement(parts[2]),
            global: flags.contains('g'),
            case_insensitive: flags.contains('i'),
        })
    }

    /// 对列表做替换
    ///
    /// 没有 `g` 时只替换第一个匹配的值。结果为空串的值被去掉。
    /// 没有任何匹配返回 `Ok(None)`。
    pub fn apply(&self, values: &[String]) -> Result<Option<Vec<String>>, regex::Error> {
        let regex = RegexBuilder::new(&self.pattern)
            .case_insensitive(self.case_insensitive)
            .build()?;
        let mut out = Vec::with_capacity(values.len());
        let mut matched = false;
        for value in values {
            if (matched && !self.global) || !regex.is_match(value) {
                out.push(value.clone());
                continue;
            }
            matched = true;
            let replaced = regex.replace_all(value, self.replacement.as_str());
            if !replaced.is_empty() {
                out.push(replaced.into_owned());
            }
        }
        Ok(matched.then_some(out))
    }
}

/// `\1` 风格的反向引用换成 `${1}`，字面的 `$` 转义
fn replacement(to: &str) -> String {
    let mut out = String::with_capacity(to.len());
    let mut chars = to.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek().copied() {
                Some(d) if d.is_ascii_digit() => {
                    chars.next();
                    out.push_str(&format!("${{{d}}}"));
                }
                _ => out.push(c),
            },
            '$' => out.push_str("$$"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_parse_shapes() {
        assert!(Substitution::parse("s/a/b").is_some());
        assert!(Substitution::parse("s/a/b/g").is_some());
        assert!(Substitution::parse("s,a,b,").is_some());
        assert!(Substitution::parse("s/a").is_none());
        assert!(Substitution::parse("s/a/b/c/d").is_none());
        assert!(Substitution::parse("x/a/b").is_none());
    }

    #[test]
    fn test_first_match_only_without_global() {
        let sub = Substitution::parse("s/\\.c$/.o/").unwrap();
        let out = sub.apply(&list(&["a.c", "b.c", "c.h"])).unwrap().unwrap();
        assert_eq!(out, list(&["a.o", "b.c", "c.h"]));

        let sub = Substitution::parse("s/\\.c$/.o/g").unwrap();
        let out = sub.apply(&list(&["a.c", "b.c", "c.h"])).unwrap().unwrap();
        assert_eq!(out, list(&["a.o", "b.o", "c.h"]));
    }

    #[test]
    fn test_flags() {
        let sub = Substitution::parse("s/DEBUG//gi").unwrap();
        let out = sub.apply(&list(&["debug", "release"])).unwrap().unwrap();
        assert_eq!(out, list(&["release"]));

        let sub = Substitution::parse("s/a.b/x/q").unwrap();
        assert_eq!(sub.apply(&list(&["acb"])).unwrap(), None);
        assert_eq!(sub.apply(&list(&["a.b"])).unwrap().unwrap(), list(&["x"]));
    }

    #[test]
    fn test_back_reference() {
        let sub = Substitution::parse("s/(\\w+)\\.cpp/\\1.o $x/").unwrap();
        let out = sub.apply(&list(&["main.cpp"])).unwrap().unwrap();
        assert_eq!(out, list(&["main.o $x"]));
    }

    #[test]
    fn test_invalid_pattern() {
        let sub = Substitution::parse("s/(/x/").unwrap();
        assert!(sub.apply(&list(&["a"])).is_err());
    }
}
