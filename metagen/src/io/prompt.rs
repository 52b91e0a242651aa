//! Generation prompt builder with a byte budget.

use std::sync::LazyLock;

use anyhow::Result;
use minijinja::{Environment, context};
use regex::Regex;
use tracing::debug;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const GENERATION_TEMPLATE: &str = include_str!("prompts/generation.md");

/// Droppable sections, least valuable first.
const DROP_ORDER: [&str; 3] = ["non_functional", "exemplar", "functional"];

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
        .expect("section marker regex should compile")
});

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .expect("system template should be valid");
        env.add_template("generation", GENERATION_TEMPLATE)
            .expect("generation template should be valid");
        Self { env }
    }

    fn render_system(&self) -> Result<String> {
        Ok(self.env.get_template("system")?.render(context! {})?)
    }

    fn render_generation(&self, input: &GenerationInputs) -> Result<String> {
        let template = self.env.get_template("generation")?;
        let rendered = template.render(context! {
            entry_function => input.entry_function.as_str(),
            models => &input.available_models,
            functional => &input.functional,
            exemplar => input.exemplar.as_deref(),
            non_functional => &input.non_functional,
            task => input.task.trim(),
        })?;
        Ok(rendered)
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    /// Content after the marker, trimmed.
    content: String,
}

/// Split rendered output on `<!-- section:KEY required|droppable -->` markers.
///
/// Empty droppable sections are omitted.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(markers.len());

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |next| next.start());
        let content = rendered[whole.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }

    sections
}

fn total_len(sections: &[ParsedSection]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

/// Largest char boundary not above `index`.
fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Drop sections in [`DROP_ORDER`] until within budget, then truncate the last one.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    if total_len(sections) <= budget {
        return;
    }

    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            break;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    if total_len(sections) <= budget {
        return;
    }
    let Some((last, rest)) = sections.split_last_mut() else {
        return;
    };
    let allowed = budget.saturating_sub(total_len(rest));
    let before_len = last.content.len();
    if before_len > allowed {
        const NOTICE: &str = "\n[truncated]";
        let keep = if allowed > NOTICE.len() {
            allowed - NOTICE.len()
        } else {
            allowed
        };
        let cut = floor_char_boundary(&last.content, keep);
        last.content.truncate(cut);
        if allowed > NOTICE.len() {
            last.content.push_str(NOTICE);
        }
        debug!(
            section = %last.key,
            before_len,
            after_len = last.content.len(),
            "truncated section for budget"
        );
    }
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Everything the generation prompt embeds. Example blocks arrive pre-rendered.
#[derive(Debug, Clone, Default)]
pub struct GenerationInputs {
    pub task: String,
    pub entry_function: String,
    pub available_models: Vec<String>,
    pub functional: Vec<String>,
    pub exemplar: Option<String>,
    pub non_functional: Vec<String>,
}

/// The two prompts sent to the generator model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

/// Builds the generation prompt within a byte budget, dropping examples first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    pub fn build(&self, input: &GenerationInputs) -> Result<PromptPair> {
        let engine = PromptEngine::new();
        let system = engine.render_system()?;
        let rendered = engine.render_generation(input)?;

        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);

        Ok(PromptPair {
            system: system.trim().to_string(),
            user: render_sections(&sections),
        })
    }
}
