//! A small JSONPath subset: `$`, `.name`, `['name']`, `[n]`, `[-n]`, `[*]`,
//! `.*` and `..name`.

use serde_json::Value;

use super::RuleError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Child(String),
    Index(i64),
    Wildcard,
    Descendant(String),
}

/// A compiled JSONPath expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

impl JsonPath {
    /// Compiles a path. It must start with `$`.
    pub fn parse(path: &str) -> Result<Self, RuleError> {
        let path = path.trim();
        let rest = path
            .strip_prefix('$')
            .ok_or_else(|| RuleError::new(format!("JSONPath '{path}' must start with '$'")))?;

        let chars: Vec<char> = rest.chars().collect();
        let mut segments = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '.' if chars.get(i + 1) == Some(&'.') => {
                    i += 2;
                    let name = read_name(&chars, &mut i);
                    if name.is_empty() {
                        return Err(RuleError::new(format!("JSONPath '{path}': empty name after '..'")));
                    }
                    segments.push(Segment::Descendant(name));
                }
                '.' => {
                    i += 1;
                    if chars.get(i) == Some(&'*') {
                        i += 1;
                        segments.push(Segment::Wildcard);
                    } else {
                        let name = read_name(&chars, &mut i);
                        if name.is_empty() {
                            return Err(RuleError::new(format!("JSONPath '{path}': empty name after '.'")));
                        }
                        segments.push(Segment::Child(name));
                    }
                }
                '[' => {
                    let close = chars[i..]
                        .iter()
                        .position(|c| *c == ']')
                        .map(|p| p + i)
                        .ok_or_else(|| RuleError::new(format!("JSONPath '{path}': unclosed '['")))?;
                    let inner: String = chars[i + 1..close].iter().collect();
                    segments.push(parse_bracket(inner.trim(), path)?);
                    i = close + 1;
                }
                c => {
                    return Err(RuleError::new(format!("JSONPath '{path}': unexpected '{c}'")));
                }
            }
        }

        Ok(Self { segments })
    }

    /// Selects every value the path reaches from `root`.
    #[must_use]
    pub fn select(&self, root: &Value) -> Vec<Value> {
        let mut current = vec![root];
        for segment in &self.segments {
            let mut next = Vec::new();
            for value in current {
                apply(segment, value, &mut next);
            }
            current = next;
        }
        current.into_iter().cloned().collect()
    }
}

fn read_name(chars: &[char], i: &mut usize) -> String {
    let start = *i;
    while *i < chars.len() && chars[*i] != '.' && chars[*i] != '[' {
        *i += 1;
    }
    chars[start..*i].iter().collect::<String>().trim().to_string()
}

fn parse_bracket(inner: &str, path: &str) -> Result<Segment, RuleError> {
    if inner == "*" {
        return Ok(Segment::Wildcard);
    }
    for quote in ['\'', '"'] {
        if let Some(name) = inner.strip_prefix(quote).and_then(|s| s.strip_suffix(quote)) {
            return Ok(Segment::Child(name.to_string()));
        }
    }
    inner
        .parse::<i64>()
        .map(Segment::Index)
        .map_err(|_| RuleError::new(format!("JSONPath '{path}': bad subscript '[{inner}]'")))
}

fn apply<'v>(segment: &Segment, value: &'v Value, out: &mut Vec<&'v Value>) {
    match segment {
        Segment::Child(name) => {
            if let Some(child) = value.get(name.as_str()) {
                out.push(child);
            }
        }
        Segment::Index(index) => {
            if let Value::Array(items) = value {
                let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
                let idx = if *index < 0 { len + index } else { *index };
                if let Some(item) = usize::try_from(idx).ok().and_then(|i| items.get(i)) {
                    out.push(item);
                }
            }
        }
        Segment::Wildcard => match value {
            Value::Array(items) => out.extend(items.iter()),
            Value::Object(map) => out.extend(map.values()),
            _ => {}
        },
        Segment::Descendant(name) => descend(value, name, out),
    }
}

fn descend<'v>(value: &'v Value, name: &str, out: &mut Vec<&'v Value>) {
    match value {
        Value::Object(map) => {
            if let Some(found) = map.get(name) {
                out.push(found);
            }
            for child in map.values() {
                descend(child, name, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                descend(item, name, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "data": {
                "list": [
                    {"name": "Dune", "author": {"name": "Herbert"}},
                    {"name": "Emma", "author": {"name": "Austen"}}
                ],
                "total": 2
            }
        })
    }

    fn select(path: &str) -> Vec<Value> {
        JsonPath::parse(path).unwrap().select(&doc())
    }

    #[test]
    fn test_child_and_index() {
        assert_eq!(select("$.data.total"), vec![json!(2)]);
        assert_eq!(select("$.data.list[0].name"), vec![json!("Dune")]);
        assert_eq!(select("$.data.list[-1].name"), vec![json!("Emma")]);
        assert_eq!(select("$['data']['total']"), vec![json!(2)]);
        assert!(select("$.data.list[5]").is_empty());
        assert!(select("$.missing").is_empty());
    }

    #[test]
    fn test_wildcards() {
        assert_eq!(select("$.data.list[*].name"), vec![json!("Dune"), json!("Emma")]);
        assert_eq!(select("$.data.list.*.name"), vec![json!("Dune"), json!("Emma")]);
    }

    #[test]
    fn test_descendant() {
        // Book names first, then the nested author names.
        let names = select("$..name");
        assert_eq!(names.len(), 4);
        assert!(names.contains(&json!("Herbert")));
    }

    #[test]
    fn test_root_only() {
        assert_eq!(select("$"), vec![doc()]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(JsonPath::parse("data.list").is_err());
        assert!(JsonPath::parse("$.data[").is_err());
        assert!(JsonPath::parse("$.data[abc]").is_err());
        assert!(JsonPath::parse("$..").is_err());
    }
}
