//! Prompt templates and the built-in prompts for quiz generation.
//!
//! Templates use `{variable}` placeholders; a literal brace is written
//! `{{` or `}}`. Rendering reports which variables the template actually
//! consumed, which is how the invoker detects a template that ignores every
//! document alias it was given.
//!
//! Callers can override the structured-output instructions via
//! [`crate::config::GenerationConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Name under which [`DEFAULT_TEMPLATE`] is registered in the built-in store.
pub const DEFAULT_PROMPT_NAME: &str = "mcq-generator";

/// Default quiz-generation template.
pub const DEFAULT_TEMPLATE: &str = r#"You are an experienced teacher writing a multiple-choice quiz.

Read the document below and write at most {max_questions} questions that test
understanding of its most important facts and concepts.

Rules:
1. Every question must be answerable from the document alone.
2. Each question has exactly 4 options; exactly one is correct.
3. Distractors must be plausible and of similar length to the correct option.
4. "correct_index" is the 0-based position of the correct option.
5. The explanation says briefly why the correct option is right.
6. If the document has no usable content, write one question stating that.

Document:
"""
{document}
""""#;

/// System message carrying the JSON Schema the reply must satisfy.
///
/// `{schema}` is replaced with the pretty-printed schema.
pub const STRUCTURED_OUTPUT_INSTRUCTIONS: &str = r#"You produce structured data.

Reply with a single JSON object that validates against this JSON Schema:

{schema}

Output ONLY the JSON object: no Markdown fences, no commentary."#;

/// Build the structured-output system message for `schema`.
pub fn structured_output_instructions(schema: &serde_json::Value, override_text: Option<&str>) -> String {
    let pretty = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    override_text
        .unwrap_or(STRUCTURED_OUTPUT_INSTRUCTIONS)
        .replace("{schema}", &pretty)
}

/// Follow-up message sent when a reply did not satisfy the schema.
pub fn repair_message(problem: &str) -> String {
    format!(
        "Your previous reply was rejected: {problem}\n\
         Reply again with ONLY a corrected JSON object that satisfies the schema."
    )
}

/// Variables bound for one render.
pub type Variables = BTreeMap<String, String>;

/// Template syntax or binding failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed '{{' at byte {0}")]
    Unclosed(usize),

    #[error("unmatched '}}' at byte {0}")]
    Unmatched(usize),

    #[error("invalid placeholder '{{{0}}}'")]
    InvalidPlaceholder(String),

    #[error("template expects variable '{0}' which is not bound")]
    Unbound(String),
}

/// A named prompt template as returned by a prompt store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub name: String,
    pub text: String,
}

/// The result of rendering a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub text: String,
    /// Variables the template referenced at least once.
    pub consumed: BTreeSet<String>,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Placeholder names in order of first appearance.
    pub fn placeholders(&self) -> Result<Vec<String>, TemplateError> {
        let mut seen = Vec::new();
        for segment in parse(&self.text)? {
            if let Segment::Var(name) = segment {
                if !seen.iter().any(|s: &String| s == name) {
                    seen.push(name.to_string());
                }
            }
        }
        Ok(seen)
    }

    /// Substitute `variables`. Extra variables are ignored; a placeholder
    /// with no binding is an error.
    pub fn render(&self, variables: &Variables) -> Result<RenderedPrompt, TemplateError> {
        let mut text = String::with_capacity(self.text.len());
        let mut consumed = BTreeSet::new();

        for segment in parse(&self.text)? {
            match segment {
                Segment::Literal(s) => text.push_str(s),
                Segment::Brace(c) => text.push(c),
                Segment::Var(name) => {
                    let value = variables
                        .get(name)
                        .ok_or_else(|| TemplateError::Unbound(name.to_string()))?;
                    text.push_str(value);
                    consumed.insert(name.to_string());
                }
            }
        }

        Ok(RenderedPrompt { text, consumed })
    }
}

enum Segment<'a> {
    Literal(&'a str),
    Brace(char),
    Var(&'a str),
}

fn parse(template: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let bytes = template.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'}' if bytes.get(i + 1) == Some(&bytes[i]) => {
                push_literal(&mut segments, template, literal_start, i);
                segments.push(Segment::Brace(bytes[i] as char));
                i += 2;
                literal_start = i;
            }
            b'{' => {
                push_literal(&mut segments, template, literal_start, i);
                let close = template[i + 1..]
                    .find('}')
                    .map(|off| i + 1 + off)
                    .ok_or(TemplateError::Unclosed(i))?;
                let name = template[i + 1..close].trim();
                if !is_identifier(name) {
                    return Err(TemplateError::InvalidPlaceholder(
                        template[i + 1..close].to_string(),
                    ));
                }
                segments.push(Segment::Var(name));
                i = close + 1;
                literal_start = i;
            }
            b'}' => return Err(TemplateError::Unmatched(i)),
            _ => i += 1,
        }
    }
    push_literal(&mut segments, template, literal_start, bytes.len());
    Ok(segments)
}

fn push_literal<'a>(segments: &mut Vec<Segment<'a>>, template: &'a str, start: usize, end: usize) {
    if start < end {
        segments.push(Segment::Literal(&template[start..end]));
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn renders_and_reports_consumed() {
        let t = PromptTemplate::new("t", "Write {max_questions} questions about:\n{context}");
        let r = t
            .render(&vars(&[
                ("context", "the heart"),
                ("document", "the heart"),
                ("max_questions", "3"),
            ]))
            .unwrap();
        assert_eq!(r.text, "Write 3 questions about:\nthe heart");
        assert!(r.consumed.contains("context"));
        assert!(r.consumed.contains("max_questions"));
        assert!(!r.consumed.contains("document"));
    }

    #[test]
    fn doubled_braces_are_literals() {
        let t = PromptTemplate::new("t", r#"Return {{"items": []}} for {text}"#);
        let r = t.render(&vars(&[("text", "x")])).unwrap();
        assert_eq!(r.text, r#"Return {"items": []} for x"#);
    }

    #[test]
    fn unbound_placeholder_is_an_error() {
        let t = PromptTemplate::new("t", "Topic: {subject}");
        assert_eq!(
            t.render(&Variables::new()).unwrap_err(),
            TemplateError::Unbound("subject".into())
        );
    }

    #[test]
    fn syntax_errors() {
        assert!(matches!(
            PromptTemplate::new("t", "oops {document").render(&Variables::new()),
            Err(TemplateError::Unclosed(5))
        ));
        assert!(matches!(
            PromptTemplate::new("t", "oops }").render(&Variables::new()),
            Err(TemplateError::Unmatched(5))
        ));
        assert!(matches!(
            PromptTemplate::new("t", "{not valid}").render(&Variables::new()),
            Err(TemplateError::InvalidPlaceholder(_))
        ));
    }

    #[test]
    fn placeholders_in_order_without_duplicates() {
        let t = PromptTemplate::new("t", "{b} {a} {b} {{c}}");
        assert_eq!(t.placeholders().unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn default_template_uses_document_and_bound() {
        let t = PromptTemplate::new(DEFAULT_PROMPT_NAME, DEFAULT_TEMPLATE);
        let names = t.placeholders().unwrap();
        assert!(names.contains(&"document".to_string()));
        assert!(names.contains(&"max_questions".to_string()));
    }

    #[test]
    fn instructions_embed_schema() {
        let schema = serde_json::json!({"type": "object"});
        let s = structured_output_instructions(&schema, None);
        assert!(s.contains("\"type\": \"object\""));
        assert!(!s.contains("{schema}"));

        let custom = structured_output_instructions(&schema, Some("Schema: {schema}"));
        assert!(custom.starts_with("Schema: {"));
    }
}
