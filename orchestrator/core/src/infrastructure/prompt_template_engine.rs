// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Prompt Template Engine
//!
//! Renders phase prompts and optimizer meta-prompts with Handlebars.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Transform templates with placeholders into final prompts
//! - **Integration:** Phase bindings / optimizer → model backend input
//!
//! # Supported Placeholders
//!
//! - `{{input}}` - Material handed to the phase (request input or previous phase output)
//! - `{{phase}}` - Name of the phase being executed
//! - `{{persona}}` - Requested persona, if any
//! - `{{context}}` - Additional context items (iterate with `{{#each context}}`)
//! - `{{task}}` - Task description for optimization
//! - `{{best}}` - Current best candidate during optimization
//! - `{{improvements}}` - Judge's most recent improvement list
//! - `{{iteration_number}}` - Current optimization iteration (1-based)
//!
//! Output is not HTML-escaped; prompts are plain text.

use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::artifact::PhaseName;

// ============================================================================
// Template Context
// ============================================================================

/// Context data for prompt template rendering
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub best: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub improvements: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration_number: Option<u32>,

    /// Additional custom fields
    #[serde(flatten)]
    pub extras: HashMap<String, serde_json::Value>,
}

impl PromptContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn phase(mut self, phase: &PhaseName) -> Self {
        self.phase = Some(phase.to_string());
        self
    }

    pub fn persona(mut self, persona: Option<&str>) -> Self {
        self.persona = persona.map(str::to_string);
        self
    }

    pub fn context(mut self, items: &[String]) -> Self {
        self.context = items.to_vec();
        self
    }

    pub fn task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn best(mut self, best: impl Into<String>) -> Self {
        self.best = Some(best.into());
        self
    }

    pub fn improvements(mut self, improvements: &[String]) -> Self {
        self.improvements = improvements.to_vec();
        self
    }

    pub fn iteration_number(mut self, number: u32) -> Self {
        self.iteration_number = Some(number);
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }
}

// ============================================================================
// Built-in Templates
// ============================================================================

const CONTEXT_BLOCK: &str =
    "{{#if context}}\n\nAdditional Context:\n{{#each context}}- {{this}}\n{{/each}}{{/if}}";

const EXTRACTION_TEMPLATE: &str = "Extract the essential intent, audience, constraints and desired \
output from the material below and restate it as a clear, structured prompt.\n\nMaterial:\n{{input}}";

const REWRITING_TEMPLATE: &str = "Rewrite the prompt below into natural, flowing language while \
preserving every requirement it states.\n\nPrompt:\n{{input}}";

const REFINEMENT_TEMPLATE: &str = "Refine the prompt below into its final, precise, ready-to-use \
form. Remove ambiguity and redundancy.\n\nPrompt:\n{{input}}";

const GENERIC_PHASE_TEMPLATE: &str = "Phase: {{phase}}\n\nTransform the prompt below for this \
phase.\n\nPrompt:\n{{input}}";

const PHASE_SYSTEM_TEMPLATE: &str = "You are an expert prompt engineer performing the {{phase}} \
phase of a multi-stage prompt pipeline.{{#if persona}} Write for the {{persona}} persona.{{/if}} \
Respond with the resulting prompt only.";

const REVISION_SYSTEM_PROMPT: &str =
    "You are an expert prompt engineer who improves prompts based on evaluator feedback.";

const REVISION_TEMPLATE: &str = "Improve the prompt below so it better accomplishes its task.\n\n\
Task:\n{{task}}\n\nCurrent prompt:\n{{best}}\n\
{{#if improvements}}\nEvaluator feedback:\n{{#each improvements}}- {{this}}\n{{/each}}{{/if}}\n\
Respond in exactly this format:\nREASONING: <why the changes help>\nIMPROVED PROMPT: <the full improved prompt>";

// ============================================================================
// Template Engine
// ============================================================================

pub struct PromptTemplateEngine {
    handlebars: Handlebars<'static>,
}

impl PromptTemplateEngine {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars }
    }

    /// Render a template with context
    pub fn render(&self, template: &str, context: &PromptContext) -> Result<String> {
        self.handlebars
            .render_template(template, context)
            .context("Failed to render prompt template")
    }

    /// Render the caller's template if given, else `fallback`
    pub fn render_with_fallback(
        &self,
        template: Option<&str>,
        fallback: &str,
        context: &PromptContext,
    ) -> Result<String> {
        self.render(template.unwrap_or(fallback), context)
    }

    /// Built-in user prompt template for a phase
    pub fn default_phase_template(phase: &PhaseName) -> &'static str {
        match phase.as_str() {
            PhaseName::EXTRACTION => EXTRACTION_TEMPLATE,
            PhaseName::REWRITING => REWRITING_TEMPLATE,
            PhaseName::REFINEMENT => REFINEMENT_TEMPLATE,
            _ => GENERIC_PHASE_TEMPLATE,
        }
    }

    /// Render (system prompt, user prompt) for one phase call. Context items
    /// are appended after the phase body.
    pub fn render_phase(
        &self,
        template: Option<&str>,
        context: &PromptContext,
    ) -> Result<(String, String)> {
        let fallback = context
            .phase
            .as_deref()
            .map(|p| Self::default_phase_template(&PhaseName::new(p)))
            .unwrap_or(GENERIC_PHASE_TEMPLATE);
        let body = self.render_with_fallback(template, fallback, context)?;
        let user = format!("{}{}", body, self.render(CONTEXT_BLOCK, context)?);
        let system = self.render(PHASE_SYSTEM_TEMPLATE, context)?;
        Ok((system, user))
    }

    /// Render (system prompt, user prompt) for an optimizer revision request
    pub fn render_revision(&self, context: &PromptContext) -> Result<(String, String)> {
        Ok((
            REVISION_SYSTEM_PROMPT.to_string(),
            self.render(REVISION_TEMPLATE, context)?,
        ))
    }

    /// Validate template syntax without rendering
    pub fn validate_template(&self, template: &str) -> Result<()> {
        handlebars::template::Template::compile(template)
            .map(|_| ())
            .context("Invalid Handlebars template syntax")
    }
}

impl Default for PromptTemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_rendering_uses_builtin_template() {
        let engine = PromptTemplateEngine::new();
        let context = PromptContext::new()
            .input("write a haiku about rust")
            .phase(&PhaseName::extraction())
            .persona(Some("poet"));

        let (system, user) = engine.render_phase(None, &context).unwrap();
        assert!(system.contains("extraction phase"));
        assert!(system.contains("poet persona"));
        assert!(user.contains("write a haiku about rust"));
        assert!(!user.contains("Additional Context"));
    }

    #[test]
    fn test_context_items_are_appended() {
        let engine = PromptTemplateEngine::new();
        let context = PromptContext::new()
            .input("x")
            .phase(&PhaseName::rewriting())
            .context(&["audience: engineers".to_string(), "tone: terse".to_string()]);

        let (_, user) = engine.render_phase(None, &context).unwrap();
        assert!(user.contains("Additional Context:\n- audience: engineers\n- tone: terse"));
    }

    #[test]
    fn test_custom_template_overrides_default() {
        let engine = PromptTemplateEngine::new();
        let context = PromptContext::new().input("abc").phase(&PhaseName::new("custom"));
        let (_, user) = engine.render_phase(Some("<<{{input}}>> & {{phase}}"), &context).unwrap();
        assert_eq!(user, "<<abc>> & custom");
    }

    #[test]
    fn test_missing_variables() {
        let engine = PromptTemplateEngine::new();
        let result = engine.render("Task: {{task}}|{{input}}", &PromptContext::new().task("t")).unwrap();
        assert_eq!(result, "Task: t|");
    }

    #[test]
    fn test_custom_fields() {
        let engine = PromptTemplateEngine::new();
        let context = PromptContext::new()
            .input("tides")
            .extra("tone", serde_json::json!("playful"));
        let result = engine.render("{{tone}} take on {{input}}", &context).unwrap();
        assert_eq!(result, "playful take on tides");
    }

    #[test]
    fn test_revision_prompt_lists_improvements() {
        let engine = PromptTemplateEngine::new();
        let context = PromptContext::new()
            .task("summarise emails")
            .best("Summarise.")
            .improvements(&["name the audience".to_string()]);
        let (_, user) = engine.render_revision(&context).unwrap();
        assert!(user.contains("summarise emails"));
        assert!(user.contains("- name the audience"));
        assert!(user.contains("IMPROVED PROMPT:"));
    }

    #[test]
    fn test_template_validation() {
        let engine = PromptTemplateEngine::new();
        assert!(engine.validate_template("{{input}}").is_ok());
        assert!(engine.validate_template("{{#if input}}unclosed").is_err());
    }
}
