use std::{cmp::Ordering, fmt::Display, str::FromStr};

use crate::{
    attributes::{AttrValue, Attributes},
    errors::FilterError,
};

/// LDAP style service filter, e.g. `(&(objectClass=Greeter)(lang=en*))`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equal(String, String),
    Approx(String, String),
    GreaterEq(String, String),
    LessEq(String, String),
    Present(String),
    /// Value split at its wildcards: `a*b*c` is `["a", "b", "c"]`, `*b` is `["", "b"]`
    Substring(String, Vec<String>),
}

impl Filter {
    pub fn parse(filter: &str) -> Result<Filter, FilterError> {
        let mut parser = Parser {
            source: filter,
            chars: filter.chars().collect(),
            position: 0,
        };
        parser.skip_whitespace();
        let parsed = parser.filter()?;
        parser.skip_whitespace();
        if parser.position != parser.chars.len() {
            return Err(FilterError::Trailing {
                filter: filter.to_string(),
                position: parser.position,
            });
        }
        Ok(parsed)
    }

    pub fn equal(key: impl Into<String>, value: impl Into<String>) -> Filter {
        Filter::Equal(key.into(), value.into())
    }

    /// Conjunction of all given filters, a single filter is returned as is
    pub fn all(mut filters: Vec<Filter>) -> Filter {
        if filters.len() == 1 {
            return filters.remove(0);
        }
        Filter::And(filters)
    }

    pub fn matches(&self, attributes: &Attributes) -> bool {
        match self {
            Filter::And(filters) => filters.iter().all(|filter| filter.matches(attributes)),
            Filter::Or(filters) => filters.iter().any(|filter| filter.matches(attributes)),
            Filter::Not(filter) => !filter.matches(attributes),
            Filter::Present(key) => attributes.get(key).is_some(),
            Filter::Equal(key, expected) => {
                check(attributes, key, &|actual| equal(actual, expected))
            }
            Filter::Approx(key, expected) => {
                check(attributes, key, &|actual| approx(actual, expected))
            }
            Filter::GreaterEq(key, expected) => check(attributes, key, &|actual| {
                compare(actual, expected).is_some_and(Ordering::is_ge)
            }),
            Filter::LessEq(key, expected) => check(attributes, key, &|actual| {
                compare(actual, expected).is_some_and(Ordering::is_le)
            }),
            Filter::Substring(key, parts) => {
                check(attributes, key, &|actual| substring(actual, parts))
            }
        }
    }
}

impl FromStr for Filter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Filter::parse(s)
    }
}

impl Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Filter::And(filters) => {
                f.write_str("(&")?;
                for filter in filters {
                    write!(f, "{filter}")?;
                }
                f.write_str(")")
            }
            Filter::Or(filters) => {
                f.write_str("(|")?;
                for filter in filters {
                    write!(f, "{filter}")?;
                }
                f.write_str(")")
            }
            Filter::Not(filter) => write!(f, "(!{filter})"),
            Filter::Equal(key, value) => write!(f, "({key}={})", escape(value)),
            Filter::Approx(key, value) => write!(f, "({key}~={})", escape(value)),
            Filter::GreaterEq(key, value) => write!(f, "({key}>={})", escape(value)),
            Filter::LessEq(key, value) => write!(f, "({key}<={})", escape(value)),
            Filter::Present(key) => write!(f, "({key}=*)"),
            Filter::Substring(key, parts) => {
                let parts: Vec<String> = parts.iter().map(|part| escape(part)).collect();
                write!(f, "({key}={})", parts.join("*"))
            }
        }
    }
}

/// Applies the check to the attribute, or to any element if it is a list
fn check(attributes: &Attributes, key: &str, test: &dyn Fn(&AttrValue) -> bool) -> bool {
    match attributes.get(key) {
        Some(AttrValue::List(values)) => values.iter().any(test),
        Some(value) => test(value),
        None => false,
    }
}

fn equal(actual: &AttrValue, expected: &str) -> bool {
    match actual {
        AttrValue::Str(actual) => actual == expected,
        AttrValue::Int(actual) => expected.trim().parse::<i64>() == Ok(*actual),
        AttrValue::Bool(actual) => expected.trim().eq_ignore_ascii_case(&actual.to_string()),
        AttrValue::List(_) => false,
    }
}

fn approx(actual: &AttrValue, expected: &str) -> bool {
    let normalize = |value: &str| -> String {
        value
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect()
    };
    match actual {
        AttrValue::Str(actual) => normalize(actual) == normalize(expected),
        other => equal(other, expected),
    }
}

fn compare(actual: &AttrValue, expected: &str) -> Option<Ordering> {
    match actual {
        AttrValue::Str(actual) => Some(actual.as_str().cmp(expected)),
        AttrValue::Int(actual) => expected.trim().parse::<i64>().ok().map(|e| actual.cmp(&e)),
        AttrValue::Bool(_) | AttrValue::List(_) => None,
    }
}

fn substring(actual: &AttrValue, parts: &[String]) -> bool {
    let AttrValue::Str(actual) = actual else {
        return false;
    };
    let Some((first, rest)) = parts.split_first() else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return actual == first;
    };

    let Some(mut remaining) = actual.strip_prefix(first.as_str()) else {
        return false;
    };
    for part in middle {
        match remaining.find(part.as_str()) {
            Some(index) => remaining = &remaining[index + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last.as_str())
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '(' | ')' | '*' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    position: usize,
}

impl Parser<'_> {
    fn filter(&mut self) -> Result<Filter, FilterError> {
        self.expect('(')?;
        self.skip_whitespace();
        let filter = match self.peek() {
            Some('&') => {
                self.position += 1;
                Filter::And(self.filter_list()?)
            }
            Some('|') => {
                self.position += 1;
                Filter::Or(self.filter_list()?)
            }
            Some('!') => {
                self.position += 1;
                self.skip_whitespace();
                Filter::Not(Box::new(self.filter()?))
            }
            _ => self.item()?,
        };
        self.skip_whitespace();
        self.expect(')')?;
        Ok(filter)
    }

    fn filter_list(&mut self) -> Result<Vec<Filter>, FilterError> {
        let mut filters = Vec::new();
        self.skip_whitespace();
        while self.peek() == Some('(') {
            filters.push(self.filter()?);
            self.skip_whitespace();
        }
        if filters.is_empty() {
            return Err(self.unexpected());
        }
        Ok(filters)
    }

    fn item(&mut self) -> Result<Filter, FilterError> {
        let start = self.position;
        while let Some(c) = self.peek() {
            if matches!(c, '=' | '~' | '<' | '>' | '(' | ')') {
                break;
            }
            self.position += 1;
        }
        let key: String = self.chars[start..self.position].iter().collect();
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(FilterError::MissingAttribute {
                filter: self.source.to_string(),
                position: start,
            });
        }

        let operator = match self.peek() {
            Some('=') => '=',
            Some(c @ ('~' | '<' | '>')) => {
                self.position += 1;
                if self.peek() != Some('=') {
                    return Err(self.unexpected());
                }
                c
            }
            _ => return Err(self.unexpected()),
        };
        self.position += 1;

        let parts = self.value()?;
        match operator {
            '=' => Ok(match parts.as_slice() {
                [value] => Filter::Equal(key, value.clone()),
                [first, last] if first.is_empty() && last.is_empty() => Filter::Present(key),
                _ => Filter::Substring(key, parts),
            }),
            operator => {
                // Wildcards only have meaning for `=`
                let value = parts.join("*");
                Ok(match operator {
                    '~' => Filter::Approx(key, value),
                    '>' => Filter::GreaterEq(key, value),
                    _ => Filter::LessEq(key, value),
                })
            }
        }
    }

    /// Reads a value up to the closing parenthesis, split at unescaped wildcards
    fn value(&mut self) -> Result<Vec<String>, FilterError> {
        let mut parts = vec![String::new()];
        loop {
            match self.peek() {
                None => return Err(self.end()),
                Some(')') => break,
                Some('(') => return Err(self.unexpected()),
                Some('*') => parts.push(String::new()),
                Some('\\') => {
                    self.position += 1;
                    let escaped = self.peek().ok_or_else(|| self.end())?;
                    if let Some(part) = parts.last_mut() {
                        part.push(escaped);
                    }
                }
                Some(c) => {
                    if let Some(part) = parts.last_mut() {
                        part.push(c);
                    }
                }
            }
            self.position += 1;
        }
        Ok(parts)
    }

    fn expect(&mut self, expected: char) -> Result<(), FilterError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.position += 1;
                Ok(())
            }
            Some(_) => Err(self.unexpected()),
            None => Err(self.end()),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.position += 1;
        }
    }

    fn unexpected(&self) -> FilterError {
        match self.peek() {
            Some(found) => FilterError::Unexpected {
                filter: self.source.to_string(),
                position: self.position,
                found,
            },
            None => self.end(),
        }
    }

    fn end(&self) -> FilterError {
        FilterError::UnexpectedEnd {
            filter: self.source.to_string(),
        }
    }
}
