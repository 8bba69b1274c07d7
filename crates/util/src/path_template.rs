use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// A path template with `{placeholder}` tokens, such as `input/{name}` or `items/{id}/detail`.
///
/// Each placeholder matches exactly one non-empty path segment. Substitution is purely
/// textual: values are inserted as-is without encoding.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    raw: String,
    tokens: Vec<Token>,
    placeholders: Vec<String>,
    matcher: Regex,
    ignore_case: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Placeholder(String),
}

/// Malformed template text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated placeholder in '{template}'")]
    Unterminated { template: String },

    #[error("unexpected '}}' in '{template}'")]
    UnexpectedClose { template: String },

    #[error("empty placeholder in '{template}'")]
    EmptyPlaceholder { template: String },

    #[error("invalid placeholder '{name}' in '{template}'")]
    InvalidPlaceholder { template: String, name: String },

    #[error("placeholder '{name}' appears twice in '{template}'")]
    DuplicatePlaceholder { template: String, name: String },
}

/// A placeholder with no value to substitute.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("placeholder '{{{placeholder}}}' in '{template}' has no matching route parameter")]
pub struct UnresolvedPlaceholderError {
    pub template: String,
    pub placeholder: String,
}

impl PathTemplate {
    /// Parse a case-sensitive template (blob paths).
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        Self::compile(template, false)
    }

    /// Parse a template whose literal parts match without regard to case (HTTP routes).
    pub fn parse_ignore_case(template: &str) -> Result<Self, TemplateError> {
        Self::compile(template, true)
    }

    fn compile(template: &str, ignore_case: bool) -> Result<Self, TemplateError> {
        let tokens = tokenize(template)?;
        let mut placeholders: Vec<String> = Vec::new();
        let mut pattern = String::from(if ignore_case { "(?i)^" } else { "^" });
        for token in &tokens {
            match token {
                Token::Literal(text) => pattern.push_str(&regex::escape(text)),
                Token::Placeholder(name) => {
                    if placeholders.contains(name) {
                        return Err(TemplateError::DuplicatePlaceholder {
                            template: template.to_string(),
                            name: name.clone(),
                        });
                    }
                    placeholders.push(name.clone());
                    pattern.push_str("([^/]+)");
                }
            }
        }
        pattern.push('$');

        // Escaped literals and fixed groups always form a valid expression.
        let matcher = Regex::new(&pattern).map_err(|_| TemplateError::Unterminated {
            template: template.to_string(),
        })?;

        Ok(Self {
            raw: template.to_string(),
            tokens,
            placeholders,
            matcher,
            ignore_case,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Placeholder names in order of appearance.
    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    pub fn has_placeholders(&self) -> bool {
        !self.placeholders.is_empty()
    }

    /// Match a concrete path, returning captured placeholder values.
    pub fn matches(&self, path: &str) -> Option<IndexMap<String, String>> {
        let captures = self.matcher.captures(path)?;
        let mut values = IndexMap::with_capacity(self.placeholders.len());
        for (index, name) in self.placeholders.iter().enumerate() {
            let value = captures.get(index + 1)?;
            values.insert(name.clone(), value.as_str().to_string());
        }
        Some(values)
    }

    /// Substitute every placeholder with its parameter value.
    pub fn resolve(&self, params: &IndexMap<String, String>) -> Result<String, UnresolvedPlaceholderError> {
        let mut resolved = String::with_capacity(self.raw.len());
        for token in &self.tokens {
            match token {
                Token::Literal(text) => resolved.push_str(text),
                Token::Placeholder(name) => {
                    let value = params.get(name).ok_or_else(|| UnresolvedPlaceholderError {
                        template: self.raw.clone(),
                        placeholder: name.clone(),
                    })?;
                    resolved.push_str(value);
                }
            }
        }
        Ok(resolved)
    }

    /// Template text with placeholder names erased, used to detect overlapping routes.
    pub fn shape(&self) -> String {
        let mut shape = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) if self.ignore_case => shape.push_str(&text.to_lowercase()),
                Token::Literal(text) => shape.push_str(text),
                Token::Placeholder(_) => shape.push_str("{}"),
            }
        }
        shape
    }
}

impl PartialEq for PathTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw && self.ignore_case == other.ignore_case
    }
}

impl Eq for PathTemplate {}

fn tokenize(template: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars();

    while let Some(character) = chars.next() {
        match character {
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for next_character in chars.by_ref() {
                    if next_character == '}' {
                        closed = true;
                        break;
                    }
                    name.push(next_character);
                }
                if !closed {
                    return Err(TemplateError::Unterminated {
                        template: template.to_string(),
                    });
                }
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(TemplateError::EmptyPlaceholder {
                        template: template.to_string(),
                    });
                }
                if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
                    return Err(TemplateError::InvalidPlaceholder {
                        template: template.to_string(),
                        name,
                    });
                }
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                tokens.push(Token::Placeholder(name));
            }
            '}' => {
                return Err(TemplateError::UnexpectedClose {
                    template: template.to_string(),
                });
            }
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    Ok(tokens)
}

static PLACEHOLDER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder regex should compile"));

/// Extracts placeholder names from arbitrary text without validating it as a template.
pub fn placeholder_names(text: &str) -> Vec<String> {
    PLACEHOLDER_REGEX
        .captures_iter(text)
        .map(|captures| captures[1].trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn resolve_substitutes_route_parameters() {
        let template = PathTemplate::parse("output/{name}").unwrap();
        let path = template.resolve(&params(&[("name", "report.txt")])).unwrap();
        assert_eq!(path, "output/report.txt");
    }

    #[test]
    fn resolve_is_purely_textual() {
        let template = PathTemplate::parse("archive/{name}.bak").unwrap();
        let path = template.resolve(&params(&[("name", "a b%20c")])).unwrap();
        assert_eq!(path, "archive/a b%20c.bak");
    }

    #[test]
    fn resolve_reports_missing_parameter() {
        let template = PathTemplate::parse("output/{name}/{version}").unwrap();
        let error = template.resolve(&params(&[("name", "x")])).unwrap_err();
        assert_eq!(error.placeholder, "version");
        assert_eq!(error.template, "output/{name}/{version}");
    }

    #[test]
    fn resolve_is_idempotent() {
        let template = PathTemplate::parse("output/{name}").unwrap();
        let values = params(&[("name", "report.txt")]);
        assert_eq!(template.resolve(&values).unwrap(), template.resolve(&values).unwrap());
    }

    #[test]
    fn matches_captures_single_segments() {
        let template = PathTemplate::parse("input/{name}").unwrap();
        let captured = template.matches("input/report.txt").unwrap();
        assert_eq!(captured.get("name").map(String::as_str), Some("report.txt"));

        assert!(template.matches("input/nested/report.txt").is_none());
        assert!(template.matches("input/").is_none());
        assert!(template.matches("output/report.txt").is_none());
    }

    #[test]
    fn matches_escapes_literal_regex_characters() {
        let template = PathTemplate::parse("logs/{day}.log").unwrap();
        assert!(template.matches("logs/monday.log").is_some());
        assert!(template.matches("logs/mondayXlog").is_none());
    }

    #[test]
    fn ignore_case_applies_to_literals_only() {
        let template = PathTemplate::parse_ignore_case("Items/{id}").unwrap();
        let captured = template.matches("items/AbC").unwrap();
        assert_eq!(captured.get("id").map(String::as_str), Some("AbC"));
        assert!(PathTemplate::parse("Items/{id}").unwrap().matches("items/AbC").is_none());
    }

    #[test]
    fn rejects_malformed_templates() {
        assert!(matches!(PathTemplate::parse("input/{name"), Err(TemplateError::Unterminated { .. })));
        assert!(matches!(PathTemplate::parse("input/name}"), Err(TemplateError::UnexpectedClose { .. })));
        assert!(matches!(PathTemplate::parse("input/{}"), Err(TemplateError::EmptyPlaceholder { .. })));
        assert!(matches!(PathTemplate::parse("input/{a/b}"), Err(TemplateError::InvalidPlaceholder { .. })));
        assert!(matches!(
            PathTemplate::parse("{name}/{name}"),
            Err(TemplateError::DuplicatePlaceholder { .. })
        ));
    }

    #[test]
    fn shape_erases_placeholder_names() {
        let first = PathTemplate::parse_ignore_case("Items/{id}").unwrap();
        let second = PathTemplate::parse_ignore_case("items/{key}").unwrap();
        assert_eq!(first.shape(), second.shape());
    }

    #[test]
    fn placeholder_names_scans_free_text() {
        assert_eq!(placeholder_names("a/{x}/b/{ y }"), vec!["x".to_string(), "y".to_string()]);
        assert!(placeholder_names("plain/path").is_empty());
    }
}
