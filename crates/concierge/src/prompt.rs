use serde::Serialize;
use tera::{Context, Error as TeraError, Tera};

/// System prompt for the orchestrating agent, parameterized over the bound systems
pub const SYSTEM_PROMPT: &str = include_str!("prompts/system.md");

/// Instructions for the single-shot safety classifier
pub const GUARDIAN_PROMPT: &str = include_str!("prompts/guardian.md");

pub fn render_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    tera.render("inline_template", &context)
}
