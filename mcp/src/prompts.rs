//! Prompt merging and configured prompt templates.

use std::collections::HashSet;

use rmcp::model::{GetPromptResult, PromptMessage, PromptMessageRole};
use serde_json::Value;

use crate::{
    core::config::{PromptDefinition, PromptRole},
    error::{McpError, McpResult},
    inventory::{prompt_argument, prompt_definition, PromptRequest, ServerPrompt},
};

/// Name-keyed, right-biased union of two prompt lists.
///
/// Base prompts not overridden keep their order and come first, followed by
/// every override in its own order. An override replaces the whole base prompt.
pub fn merge_prompts(base: Vec<ServerPrompt>, overrides: Vec<ServerPrompt>) -> Vec<ServerPrompt> {
    let overridden: HashSet<String> = overrides.iter().map(|p| p.name().to_string()).collect();
    base.into_iter()
        .filter(|p| !overridden.contains(p.name()))
        .chain(overrides)
        .collect()
}

/// Build servable prompts from configuration definitions.
pub fn from_definitions(definitions: &[PromptDefinition]) -> Vec<ServerPrompt> {
    definitions.iter().cloned().map(from_definition).collect()
}

fn from_definition(definition: PromptDefinition) -> ServerPrompt {
    let arguments = definition
        .arguments
        .iter()
        .map(|arg| prompt_argument(&arg.name, &arg.description, arg.required))
        .collect();
    let prompt = prompt_definition(
        definition.name.clone(),
        definition.title.clone(),
        definition.description.clone(),
        arguments,
    );

    ServerPrompt::new(prompt, move |request: PromptRequest| {
        let rendered = render(&definition, &request);
        async move { rendered }
    })
}

fn render(definition: &PromptDefinition, request: &PromptRequest) -> McpResult<GetPromptResult> {
    for arg in definition.arguments.iter().filter(|a| a.required) {
        if !request.arguments.contains_key(&arg.name) {
            return Err(McpError::InvalidArguments(format!(
                "prompt '{}' requires argument '{}'",
                definition.name, arg.name
            )));
        }
    }

    let messages = definition
        .messages
        .iter()
        .map(|message| {
            let role = match message.role {
                PromptRole::User => PromptMessageRole::User,
                PromptRole::Assistant => PromptMessageRole::Assistant,
            };
            PromptMessage::new_text(role, substitute(&message.content, request))
        })
        .collect();

    Ok(GetPromptResult {
        description: Some(definition.description.clone()),
        messages,
    })
}

/// Replace `{{name}}` with the argument value. Unknown placeholders render empty.
fn substitute(template: &str, request: &PromptRequest) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = after[..end].trim();
        match request.arguments.get(key) {
            Some(Value::String(s)) => out.push_str(s),
            Some(Value::Null) | None => {}
            Some(other) => out.push_str(&other.to_string()),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}
