//! Prompt templates for answer synthesis

use std::collections::HashMap;

/// Template with `{{name}}` placeholders
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
    variables: Vec<String>,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let variables = extract_variables(&template);
        Self {
            template,
            variables,
        }
    }

    /// Substitute known placeholders; unknown ones are left as written
    #[must_use]
    pub fn render(&self, values: &HashMap<String, String>) -> String {
        let mut rendered = self.template.clone();
        for var in &self.variables {
            if let Some(value) = values.get(var) {
                rendered = rendered.replace(&format!("{{{{{var}}}}}"), value);
            }
        }
        rendered
    }

    #[must_use]
    pub fn variables(&self) -> &[String] {
        &self.variables
    }
}

fn extract_variables(template: &str) -> Vec<String> {
    let mut variables = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            break;
        };
        let name = &after[..end];
        if !name.trim().is_empty()&& !variables.iter().any(|v| v == name) {
            variables.push(name.to_string());
        }
        rest = &after[end + 2..];
    }

    variables
}

/// Built-in prompts
pub struct RagPrompts;

impl RagPrompts {
    /// Grounded question answering over retrieved documents
    #[must_use]
    pub fn context_qa() -> PromptTemplate {
        PromptTemplate::new(
            r"You are a careful assistant that answers questions using only the documents provided.

Documents:
{{context}}

Question: {{question}}

Instructions:
1. Answer using only the documents above and cite them by their [Document N] label
2. If the documents do not contain enough information, say so plainly
3. Be concise

Answer:",
        )
    }
}
