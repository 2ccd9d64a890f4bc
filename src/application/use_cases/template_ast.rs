//! Typed representation of the template mini-language.
//!
//! Supported syntax:
//! - `{{ name }}` substitutes a value from the render context.
//! - `{% if cond %} ... {% endif %}` and `{% if not cond %} ... {% endif %}`
//!   include the body iff the condition holds. Blocks nest at most one level.
//!
//! Anything else, including `%(name)s` bind placeholders, is literal text.

use crate::domain::error::{AppError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}|\{%-?\s*(.*?)\s*-?%\}").unwrap()
});

static IF_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^if\s+(not\s+)?([A-Za-z_][A-Za-z0-9_]*)$").unwrap());

const MAX_DEPTH: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub name: String,
    pub negated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(String),
    Conditional {
        condition: Condition,
        body: Vec<Segment>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TemplateAst {
    pub segments: Vec<Segment>,
}

/// Values and boolean flags a template is evaluated against.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    values: HashMap<String, String>,
    flags: HashMap<String, bool>,
}

impl RenderContext {
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn with_flag(mut self, name: impl Into<String>, flag: bool) -> Self {
        self.flags.insert(name.into(), flag);
        self
    }

    pub fn set_flag(&mut self, name: impl Into<String>, flag: bool) {
        self.flags.insert(name.into(), flag);
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        self.flags.get(name).copied()
    }
}

struct Frame {
    condition: Option<Condition>,
    body: Vec<Segment>,
}

impl TemplateAst {
    pub fn parse(source: &str) -> Result<Self> {
        let mut stack = vec![Frame {
            condition: None,
            body: Vec::new(),
        }];
        let mut cursor = 0;

        for caps in TAG.captures_iter(source) {
            let whole = caps.get(0).ok_or_else(|| {
                AppError::Internal("regex capture without a match".to_string())
            })?;
            if whole.start() > cursor {
                push_literal(&mut stack, &source[cursor..whole.start()]);
            }
            cursor = whole.end();

            if let Some(name) = caps.get(1) {
                current(&mut stack)?
                    .body
                    .push(Segment::Placeholder(name.as_str().to_string()));
                continue;
            }

            let tag = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            if tag == "endif" {
                if stack.len() == 1 {
                    return Err(AppError::ConfigurationError(format!(
                        "Unmatched '{{% endif %}}' at offset {}",
                        whole.start()
                    )));
                }
                let frame = stack.pop().ok_or_else(|| {
                    AppError::Internal("template frame stack underflow".to_string())
                })?;
                let condition = frame.condition.ok_or_else(|| {
                    AppError::Internal("conditional frame without condition".to_string())
                })?;
                current(&mut stack)?.body.push(Segment::Conditional {
                    condition,
                    body: frame.body,
                });
            } else if let Some(cond) = IF_TAG.captures(tag) {
                if stack.len() > MAX_DEPTH {
                    return Err(AppError::ConfigurationError(format!(
                        "Conditional blocks nest deeper than one level at offset {}",
                        whole.start()
                    )));
                }
                stack.push(Frame {
                    condition: Some(Condition {
                        name: cond[2].to_string(),
                        negated: cond.get(1).is_some(),
                    }),
                    body: Vec::new(),
                });
            } else {
                return Err(AppError::ConfigurationError(format!(
                    "Unsupported template tag '{{% {} %}}'",
                    tag
                )));
            }
        }

        if cursor < source.len() {
            push_literal(&mut stack, &source[cursor..]);
        }
        if stack.len() != 1 {
            return Err(AppError::ConfigurationError(
                "Unterminated '{% if %}' block".to_string(),
            ));
        }
        let root = stack.pop().ok_or_else(|| {
            AppError::Internal("template frame stack underflow".to_string())
        })?;
        Ok(Self {
            segments: root.body,
        })
    }

    /// Check every placeholder and condition against the known names.
    pub fn check_names(
        &self,
        placeholders: &HashSet<&str>,
        conditions: &HashSet<&str>,
    ) -> Result<()> {
        fn walk(
            segments: &[Segment],
            placeholders: &HashSet<&str>,
            conditions: &HashSet<&str>,
        ) -> Result<()> {
            for segment in segments {
                match segment {
                    Segment::Literal(_) => {}
                    Segment::Placeholder(name) => {
                        if !placeholders.contains(name.as_str()) {
                            return Err(AppError::ConfigurationError(format!(
                                "Unknown placeholder '{{{{{}}}}}'",
                                name
                            )));
                        }
                    }
                    Segment::Conditional { condition, body } => {
                        if !conditions.contains(condition.name.as_str()) {
                            return Err(AppError::ConfigurationError(format!(
                                "Unknown condition '{}'",
                                condition.name
                            )));
                        }
                        walk(body, placeholders, conditions)?;
                    }
                }
            }
            Ok(())
        }
        walk(&self.segments, placeholders, conditions)
    }

    /// Evaluate against `ctx`. Unknown placeholders render empty and unknown
    /// conditions are false; load-time checks reject both beforehand.
    pub fn render(&self, ctx: &RenderContext) -> String {
        let mut out = String::new();
        render_into(&self.segments, ctx, &mut out);
        out
    }

    pub fn has_tags(&self) -> bool {
        self.segments
            .iter()
            .any(|s| !matches!(s, Segment::Literal(_)))
    }
}

fn render_into(segments: &[Segment], ctx: &RenderContext, out: &mut String) {
    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Placeholder(name) => out.push_str(ctx.value(name).unwrap_or_default()),
            Segment::Conditional { condition, body } => {
                let holds = ctx.flag(&condition.name).unwrap_or(false) != condition.negated;
                if holds {
                    render_into(body, ctx, out);
                }
            }
        }
    }
}

fn current(stack: &mut [Frame]) -> Result<&mut Frame> {
    stack
        .last_mut()
        .ok_or_else(|| AppError::Internal("template frame stack underflow".to_string()))
}

fn push_literal(stack: &mut [Frame], text: &str) {
    if let Some(frame) = stack.last_mut() {
        match frame.body.last_mut() {
            Some(Segment::Literal(existing)) => existing.push_str(text),
            _ => frame.body.push(Segment::Literal(text.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_placeholder_and_literal() {
        let ast = TemplateAst::parse("SELECT * FROM {{primary_table}} WHERE id = %(id)s").unwrap();
        assert_eq!(
            ast.segments,
            vec![
                Segment::Literal("SELECT * FROM ".into()),
                Segment::Placeholder("primary_table".into()),
                Segment::Literal(" WHERE id = %(id)s".into()),
            ]
        );
    }

    #[test]
    fn test_conditional_dropped_when_false() {
        let ast = TemplateAst::parse(
            "SELECT p.* FROM {{primary_table}} p{% if has_secondary_entity %} JOIN {{secondary_table}} s ON s.pid = p.id{% endif %}",
        )
        .unwrap();
        let ctx = RenderContext::default()
            .with_value("primary_table", "patients")
            .with_value("secondary_table", "")
            .with_flag("has_secondary_entity", false);
        assert_eq!(ast.render(&ctx), "SELECT p.* FROM patients p");
    }

    #[test]
    fn test_negated_and_nested() {
        let ast = TemplateAst::parse(
            "{% if not since %}ALL{% endif %}{% if has_secondary_entity %}J{% if since %} AND d >= %(since)s{% endif %}{% endif %}",
        )
        .unwrap();
        let ctx = RenderContext::default()
            .with_flag("has_secondary_entity", true)
            .with_flag("since", true);
        assert_eq!(ast.render(&ctx), "J AND d >= %(since)s");
        let ctx = RenderContext::default().with_flag("since", false);
        assert_eq!(ast.render(&ctx), "ALL");
    }

    #[test]
    fn test_nesting_limit() {
        let err = TemplateAst::parse(
            "{% if a %}{% if b %}{% if c %}x{% endif %}{% endif %}{% endif %}",
        )
        .unwrap_err();
        assert!(matches!(err, AppError::ConfigurationError(_)));
    }

    #[test]
    fn test_unbalanced_blocks_rejected() {
        assert!(TemplateAst::parse("{% if a %}x").is_err());
        assert!(TemplateAst::parse("x{% endif %}").is_err());
        assert!(TemplateAst::parse("{% for x in y %}{% endif %}").is_err());
    }

    #[test]
    fn test_check_names() {
        let ast = TemplateAst::parse("{{primary_entity}}{% if bogus %}x{% endif %}").unwrap();
        let placeholders: HashSet<&str> = ["primary_entity"].into_iter().collect();
        let conditions: HashSet<&str> = ["has_secondary_entity"].into_iter().collect();
        assert!(ast.check_names(&placeholders, &conditions).is_err());
    }

    #[test]
    fn test_render_is_deterministic() {
        let ast = TemplateAst::parse("A {{x}} {% if f %}B{% endif %} %% C").unwrap();
        let ctx = RenderContext::default().with_value("x", "1").with_flag("f", true);
        assert_eq!(ast.render(&ctx), ast.render(&ctx));
        assert_eq!(ast.render(&ctx), "A 1 B %% C");
    }
}
