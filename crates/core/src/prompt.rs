//! Prompt templates with `{name}` placeholders.

use std::collections::HashMap;

pub const ANSWER_TEMPLATE: &str = "\
[INST] <<SYS>>
You are the person described in the documents below, answering questions in a technical interview about your own professional experience. Always answer in the FIRST PERSON, concisely and professionally.

**STRICT LANGUAGE RULES:**
1. If the question is in SPANISH, answer EXCLUSIVELY in SPANISH
2. If the question is in ENGLISH, answer EXCLUSIVELY in ENGLISH
3. For any other language, answer in the language of the question
4. NEVER mix languages in one answer
5. Use only information from the provided context

If you do not know the answer, say \"I don't have information about that in my experience\".
<</SYS>>

Relevant context:
{context}

Conversation history:
{chat_history}

Current question: {question}
[/INST]
";

pub const CONDENSE_TEMPLATE: &str = "\
Given the following conversation and a follow up question, rephrase the follow up question to be a standalone question, in its original language.

Chat History:
{chat_history}
Follow Up Input: {question}
Standalone question:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn answer() -> Self {
        Self::new(ANSWER_TEMPLATE)
    }

    pub fn condense() -> Self {
        Self::new(CONDENSE_TEMPLATE)
    }

    /// Reads a template file, falling back to the built-in answer template.
    pub fn answer_from(path: Option<&str>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .map_err(|e| anyhow::anyhow!("read prompt template {p}: {e}"))?;
                Ok(Self::new(text))
            }
            None => Ok(Self::answer()),
        }
    }

    /// Placeholder names in order of first appearance.
    pub fn variables(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut rest = self.template.as_str();
        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let name = &after[..close];
                    if is_identifier(name) && !out.iter().any(|v| v == name) {
                        out.push(name.to_string());
                    }
                    rest = &after[close + 1..];
                }
                None => break,
            }
        }
        out
    }

    /// Substitutes every known placeholder in a single left-to-right pass, so
    /// values containing braces are never re-expanded. Unknown placeholders
    /// are left untouched.
    pub fn render(&self, values: &HashMap<&str, &str>) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let name = &after[..close];
                    match values.get(name) {
                        Some(value) if is_identifier(name) => out.push_str(value),
                        _ => {
                            out.push('{');
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_template_declares_three_variables() {
        assert_eq!(
            PromptTemplate::answer().variables(),
            ["context", "chat_history", "question"]
        );
        assert_eq!(
            PromptTemplate::condense().variables(),
            ["chat_history", "question"]
        );
    }

    #[test]
    fn render_is_single_pass() {
        let t = PromptTemplate::new("Q: {question} C: {context} {missing}");
        let values = HashMap::from([("question", "what is {context}?"), ("context", "aws")]);
        assert_eq!(t.render(&values), "Q: what is {context}? C: aws {missing}");
    }

    #[test]
    fn unmatched_brace_is_kept() {
        let t = PromptTemplate::new("a { b");
        assert_eq!(t.render(&HashMap::new()), "a { b");
    }

    #[test]
    fn template_file_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "{question}?").unwrap();
        let t = PromptTemplate::answer_from(path.to_str()).unwrap();
        assert_eq!(t.render(&HashMap::from([("question", "why")])), "why?");
        assert_eq!(PromptTemplate::answer_from(None).unwrap(), PromptTemplate::answer());
    }
}
