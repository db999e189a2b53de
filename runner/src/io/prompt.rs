//! Prompt rendering for model executors.
//!
//! The assembled context is split back into its layers by entry kind and rendered
//! through a minijinja template. When the result exceeds the byte budget, the
//! oldest history entries are dropped first, then the outermost static context,
//! and finally the text is truncated.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::types::{Payload, kinds};

const AGENT_TEMPLATE: &str = include_str!("prompts/agent.md");
const TRUNCATION_NOTICE: &str = "\n[truncated]";

#[derive(Debug, Clone, Serialize)]
struct EntryView {
    id: String,
    kind: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct KeyValue {
    key: String,
    value: String,
}

#[derive(Debug, Clone, Serialize)]
struct ArtifactView {
    path: String,
    content: String,
}

/// The context regrouped by layer for rendering.
#[derive(Debug, Clone, Default)]
struct PromptSections {
    persona: Vec<String>,
    instructions: Vec<String>,
    settings: Vec<String>,
    static_context: Vec<KeyValue>,
    conversation: Vec<EntryView>,
    artifacts: Vec<ArtifactView>,
    metadata: Vec<KeyValue>,
}

impl PromptSections {
    fn from_context(context: &Payload) -> Self {
        let mut sections = Self::default();
        for entry in context {
            match entry.kind.as_str() {
                kinds::PERSONA => sections.persona.push(entry.content.clone()),
                kinds::INSTRUCTIONS => sections.instructions.push(entry.content.clone()),
                kinds::EXECUTOR_CONFIG => sections.settings.push(entry.content.clone()),
                kinds::STATIC_CONTEXT => sections.static_context.push(KeyValue {
                    key: strip(&entry.id, "static:"),
                    value: entry.content.clone(),
                }),
                kinds::ARTIFACT => sections.artifacts.push(ArtifactView {
                    path: strip(&entry.id, "artifact:"),
                    content: entry.content.clone(),
                }),
                kinds::METADATA => sections.metadata.push(KeyValue {
                    key: strip(&entry.id, "meta:"),
                    value: entry.content.clone(),
                }),
                _ => sections.conversation.push(EntryView {
                    id: entry.id.clone(),
                    kind: entry.kind.clone(),
                    content: entry.content.clone(),
                }),
            }
        }
        sections
    }

    fn step_id(&self) -> &str {
        self.metadata
            .iter()
            .find(|item| item.key == "step_id")
            .map(|item| item.value.as_str())
            .unwrap_or("unknown")
    }
}

fn strip(id: &str, prefix: &str) -> String {
    id.strip_prefix(prefix).unwrap_or(id).to_string()
}

/// Builds agent prompts within a byte budget.
pub struct PromptBuilder {
    env: Environment<'static>,
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("agent", AGENT_TEMPLATE)
            .context("load agent prompt template")?;
        Ok(Self { env, budget_bytes })
    }

    /// Render `context` for an agent allowed to answer with `outcomes`.
    pub fn build(&self, context: &Payload, outcomes: &[String]) -> Result<String> {
        let mut sections = PromptSections::from_context(context);
        loop {
            let rendered = self.render(&sections, outcomes)?;
            if rendered.len() <= self.budget_bytes {
                return Ok(rendered);
            }
            if !sections.conversation.is_empty() {
                let dropped = sections.conversation.remove(0);
                debug!(entry = %dropped.id, "dropped history entry for budget");
                continue;
            }
            if let Some(dropped) = sections.static_context.pop() {
                debug!(entry = %dropped.key, "dropped static context for budget");
                continue;
            }
            debug!(
                before_len = rendered.len(),
                budget = self.budget_bytes,
                "truncated prompt for budget"
            );
            return Ok(truncate(rendered, self.budget_bytes));
        }
    }

    fn render(&self, sections: &PromptSections, outcomes: &[String]) -> Result<String> {
        let template = self.env.get_template("agent")?;
        let rendered = template.render(context! {
            step_id => sections.step_id(),
            persona => &sections.persona,
            instructions => &sections.instructions,
            settings => &sections.settings,
            static_context => &sections.static_context,
            conversation => &sections.conversation,
            artifacts => &sections.artifacts,
            metadata => &sections.metadata,
            outcomes => outcomes,
        })?;
        Ok(rendered)
    }
}

fn truncate(mut text: String, budget: usize) -> String {
    if budget <= TRUNCATION_NOTICE.len() {
        let mut cut = budget;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        return text;
    }
    let mut cut = budget - TRUNCATION_NOTICE.len();
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str(TRUNCATION_NOTICE);
    text
}
