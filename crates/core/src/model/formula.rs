use std::fmt;
use std::str::FromStr;

use crate::data::DataFrame;
use crate::error::{MaihdaError, Result};

/// A random-intercept model formula: `response ~ fixed terms + (1 | group)`.
///
/// ```
/// use maihda_core::model::Formula;
///
/// let f: Formula = "bmi ~ age + (1 | stratum)".parse().unwrap();
/// assert_eq!(f.response(), "bmi");
/// assert_eq!(f.fixed_terms(), &["age".to_string()]);
/// assert_eq!(f.group(), "stratum");
/// assert!(f.has_intercept());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    response: String,
    fixed: Vec<String>,
    intercept: bool,
    group: String,
}

impl Formula {
    /// Parse a formula string.
    ///
    /// # Errors
    /// Returns [`MaihdaError::Formula`] when the text is not of the form
    /// `response ~ terms` with exactly one `(1 | group)` term.
    pub fn parse(text: &str) -> Result<Self> {
        let mut sides = text.split('~');
        let (lhs, rhs) = match (sides.next(), sides.next(), sides.next()) {
            (Some(l), Some(r), None) => (l.trim(), r.trim()),
            _ => {
                return Err(MaihdaError::Formula(format!(
                    "expected exactly one '~' in '{}'",
                    text
                )))
            }
        };

        if !is_identifier(lhs) {
            return Err(MaihdaError::Formula(format!(
                "response '{}' is not a column name",
                lhs
            )));
        }

        let mut fixed = Vec::new();
        let mut intercept = true;
        let mut groups = Vec::new();

        for term in split_terms(rhs)? {
            if let Some(inner) = term.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
                groups.push(parse_random_term(inner)?);
                continue;
            }
            match term.as_str() {
                "1" | "+1" => intercept = true,
                "0" | "-1" => intercept = false,
                t if is_identifier(t) => {
                    if !fixed.iter().any(|f| f == t) {
                        fixed.push(t.to_string());
                    }
                }
                t => {
                    return Err(MaihdaError::Formula(format!(
                        "unsupported term '{}' (fixed terms must be column names)",
                        t
                    )))
                }
            }
        }

        let group = match groups.len() {
            1 => groups.remove(0),
            0 => {
                return Err(MaihdaError::Formula(format!(
                    "'{}' has no random-intercept term; add '(1 | stratum)'",
                    text
                )))
            }
            n => {
                return Err(MaihdaError::Formula(format!(
                    "'{}' has {} random terms; only a single '(1 | group)' is supported",
                    text, n
                )))
            }
        };

        Ok(Formula {
            response: lhs.to_string(),
            fixed,
            intercept,
            group,
        })
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn fixed_terms(&self) -> &[String] {
        &self.fixed
    }

    pub fn has_intercept(&self) -> bool {
        self.intercept
    }

    /// The grouping field of the random intercept.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Every field the formula reads, response first.
    pub fn variables(&self) -> Vec<&str> {
        let mut vars = vec![self.response.as_str()];
        vars.extend(self.fixed.iter().map(|s| s.as_str()));
        vars.push(self.group.as_str());
        vars
    }

    /// Check that every field named by the formula exists in `df`.
    pub fn validate(&self, df: &DataFrame) -> Result<()> {
        for var in self.variables() {
            if !df.has_column(var) {
                return Err(MaihdaError::ColumnNotFound(var.to_string()));
            }
        }
        Ok(())
    }
}

impl FromStr for Formula {
    type Err = MaihdaError;

    fn from_str(s: &str) -> Result<Self> {
        Formula::parse(s)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ~ {}", self.response, if self.intercept { "1" } else { "0" })?;
        for term in &self.fixed {
            write!(f, " + {}", term)?;
        }
        write!(f, " + (1 | {})", self.group)
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        && !s.chars().all(|c| c.is_ascii_digit())
}

/// Split the right-hand side on `+` and `-` outside parentheses. A `-`
/// stays attached to the term that follows it.
fn split_terms(rhs: &str) -> Result<Vec<String>> {
    let mut terms = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;

    for c in rhs.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(MaihdaError::Formula(format!("unbalanced ')' in '{}'", rhs)));
                }
                current.push(c);
            }
            '+' | '-' if depth == 0 => {
                let term = current.trim().to_string();
                if !term.is_empty() {
                    terms.push(term);
                }
                current.clear();
                if c == '-' {
                    current.push('-');
                }
            }
            c if c.is_whitespace() && depth == 0 => {}
            _ => current.push(c),
        }
    }
    if depth != 0 {
        return Err(MaihdaError::Formula(format!("unbalanced '(' in '{}'", rhs)));
    }
    let term = current.trim().to_string();
    if !term.is_empty() {
        terms.push(term);
    }
    if terms.is_empty() {
        return Err(MaihdaError::Formula("empty right-hand side".into()));
    }
    Ok(terms)
}

fn parse_random_term(inner: &str) -> Result<String> {
    let mut parts = inner.split('|');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(lhs), Some(group), None) if lhs.trim() == "1" => {
            let group = group.trim();
            if is_identifier(group) {
                Ok(group.to_string())
            } else {
                Err(MaihdaError::Formula(format!(
                    "grouping term '{}' is not a column name",
                    group
                )))
            }
        }
        _ => Err(MaihdaError::Formula(format!(
            "random term '({})' must be a random intercept '(1 | group)'",
            inner
        ))),
    }
}
