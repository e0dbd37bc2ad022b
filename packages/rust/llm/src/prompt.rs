//! Prompt templates for the briefing pipeline.
//!
//! A template pairs a fixed system message with a human message containing
//! `{name}` placeholders. `{{` and `}}` render as literal braces.

use debrief_shared::{DebriefError, Result};

use crate::ChatMessage;

/// Marker the relevance prompt asks the model to emit for rejected sources.
const IRRELEVANT_MARKER: &str = "IRRELEVANT";

const RELEVANCE_SYSTEM: &str = "You are an AI system which determines whether a headline, tweet, \
or other source is of interest to an individual based on their stated preferences.";

const RELEVANCE_HUMAN: &str = "Below is the source:
{headline}

Below is the individual's stated preference:
{preference_string}

If the source seems relevant to the individual's preference, say [\"RELEVANT\"]. \
If the source doesn't seem relevant or violates their preferences in any way, say [\"IRRELEVANT\"]";

const SUMMARY_SYSTEM: &str =
    "You are an AI system which writes a summary of an article, tweet, or other source of information.";

const SUMMARY_HUMAN: &str = "Below is the source:
{article}

Write a summary of this source. Do not make up or remove any information from the source. \
The summary should be succinct and no more than 2 sentences.";

const BRIEFING_SYSTEM: &str = "You are an AI system which combines summaries of multiple articles, \
tweets, or other sources of information into a single briefing.";

const BRIEFING_HUMAN: &str = "Below is a list of summaries of information sources:
{summaries}

Combine these summaries into a single briefing. Do not make up any information. \
Only include noteworthy or newsworthy information. The summary should be easily digestible, \
information rich, and no more than 10 sentences.";

/// A system message plus a human message template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    system: String,
    human: String,
}

impl PromptTemplate {
    pub fn new(system: impl Into<String>, human: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            human: human.into(),
        }
    }

    /// Render the human template with `vars` and return the chat messages.
    pub fn render(&self, vars: &[(&str, &str)]) -> Result<Vec<ChatMessage>> {
        let human = render_template(&self.human, vars)?;
        Ok(vec![ChatMessage::system(self.system.clone()), ChatMessage::user(human)])
    }
}

fn render_template(template: &str, vars: &[(&str, &str)]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => {
                            return Err(DebriefError::validation(format!(
                                "unterminated placeholder `{{{name}`"
                            )));
                        }
                    }
                }
                let value = vars
                    .iter()
                    .find(|(k, _)| *k == name)
                    .map(|(_, v)| *v)
                    .ok_or_else(|| {
                        DebriefError::validation(format!("missing prompt variable `{name}`"))
                    })?;
                out.push_str(value);
            }
            '}' => {
                return Err(DebriefError::validation("unmatched `}` in prompt template"));
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

/// Relevance check: vars `headline`, `preference_string`.
pub fn relevance_prompt() -> PromptTemplate {
    PromptTemplate::new(RELEVANCE_SYSTEM, RELEVANCE_HUMAN)
}

/// Single-source summary: var `article`.
pub fn summary_prompt() -> PromptTemplate {
    PromptTemplate::new(SUMMARY_SYSTEM, SUMMARY_HUMAN)
}

/// Combined briefing: var `summaries`.
pub fn briefing_prompt() -> PromptTemplate {
    PromptTemplate::new(BRIEFING_SYSTEM, BRIEFING_HUMAN)
}

/// A relevance answer keeps the source unless it contains the rejection marker.
pub fn is_relevant(response: &str) -> bool {
    !response.contains(IRRELEVANT_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;

    #[test]
    fn render_substitutes_variables() {
        let messages = relevance_prompt()
            .render(&[
                ("headline", "Rust 2.0 released"),
                ("preference_string", "systems programming news"),
            ])
            .unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].content.contains("Rust 2.0 released"));
        assert!(messages[1].content.contains("systems programming news"));
        assert!(messages[1].content.contains(r#"["IRRELEVANT"]"#));
        assert!(!messages[1].content.contains('{'));
    }

    #[test]
    fn values_are_not_reinterpreted() {
        let messages = summary_prompt()
            .render(&[("article", "fn main() { println!(\"{x}\"); }")])
            .unwrap();
        assert!(messages[1].content.contains("fn main() { println!(\"{x}\"); }"));
    }

    #[test]
    fn missing_variable_is_error() {
        let err = briefing_prompt().render(&[("article", "x")]).unwrap_err();
        assert!(err.to_string().contains("summaries"));
    }

    #[test]
    fn escaped_braces_render_literally() {
        let out = render_template("{{json}} {name}", &[("name", "ok")]).unwrap();
        assert_eq!(out, "{json} ok");
    }

    #[test]
    fn malformed_templates_are_rejected() {
        assert!(render_template("{open", &[]).is_err());
        assert!(render_template("close}", &[]).is_err());
    }

    #[test]
    fn relevance_verdicts() {
        assert!(is_relevant(r#"["RELEVANT"]"#));
        assert!(is_relevant("This seems RELEVANT to the reader."));
        assert!(!is_relevant(r#"["IRRELEVANT"]"#));
        assert!(!is_relevant("IRRELEVANT"));
        // Only the exact marker rejects.
        assert!(is_relevant("irrelevant"));
    }
}
