//! Triage Classifier: ignore / notify / respond.
//!
//! One decision per email. The three rule prompts and the few-shot examples
//! are read once at the start of a call and reused for the retry, so a
//! concurrent optimizer commit never mixes into a half-built decision.

use std::time::Instant;

use mailmem_core::metrics::MailmemCounters;
use mailmem_core::procedural::PromptDefinition;
use mailmem_core::semantic::FewShotExample;
use mailmem_llm::prompt::{self, render_template, PromptId};
use mailmem_llm::types::TriageResponse;
use mailmem_llm::{parse_structured, Message};
use tracing::{debug, info, instrument, warn};

use crate::context::AgentContext;
use crate::email::{Classification, EmailInput, TriageDecision};
use crate::error::{AgentError, Result};

/// Which emails are not worth a reply or tracking.
pub const IGNORE_RULE: PromptDefinition = PromptDefinition {
    name: "ignore_rule",
    default_text: "Marketing newsletters, spam emails, mass company announcements",
    when_to_update: "Update this prompt whenever there is feedback on which emails should be ignored",
    update_instructions: "keep the instructions short and to the point",
};

/// Which emails the owner should only be told about.
pub const NOTIFY_RULE: PromptDefinition = PromptDefinition {
    name: "notify_rule",
    default_text: "Team member out sick, build system notifications, project status updates",
    when_to_update: "Update this prompt whenever there is feedback on which emails the user should be notified of",
    update_instructions: "keep the instructions short and to the point",
};

/// Which emails need a reply.
pub const RESPOND_RULE: PromptDefinition = PromptDefinition {
    name: "respond_rule",
    default_text: "Direct questions from team members, meeting requests, critical bug reports",
    when_to_update: "Update this prompt whenever there is feedback on which emails should be responded to",
    update_instructions: "keep the instructions short and to the point",
};

/// Model calls per classification: the first attempt plus one corrective retry.
const MAX_ATTEMPTS: u32 = 2;

/// Render retrieved examples into the few-shot block of the triage prompt.
///
/// An empty list renders as an explicit "no examples" line.
#[must_use]
pub fn format_few_shot_examples(examples: &[FewShotExample]) -> String {
    if examples.is_empty() {
        return prompt::NO_EXAMPLES.to_owned();
    }
    let mut blocks = Vec::with_capacity(examples.len() + 1);
    blocks.push(prompt::FEW_SHOT_HEADER.to_owned());
    for example in examples {
        let email = EmailInput::from_payload(&example.input);
        let content: String = email.body.chars().take(prompt::FEW_SHOT_CONTENT_CHARS).collect();
        blocks.push(render_template(
            prompt::FEW_SHOT_EXAMPLE,
            &[
                ("subject", email.subject.as_str()),
                ("from_email", email.author.as_str()),
                ("to_email", email.to.as_str()),
                ("content", content.as_str()),
                ("result", example.label.as_str()),
            ],
        ));
    }
    blocks.join(prompt::FEW_SHOT_SEPARATOR)
}

/// Check a raw reply against the router schema.
fn validate(reply: &Message) -> std::result::Result<TriageDecision, String> {
    let raw: TriageResponse = parse_structured(reply).map_err(|e| e.to_string())?;
    let classification = raw.classification.parse::<Classification>()?;
    if raw.reasoning.trim().is_empty() {
        return Err("missing reasoning".into());
    }
    Ok(TriageDecision {
        classification,
        reasoning: raw.reasoning,
    })
}

/// Routes an email to one of the three classes.
#[derive(Debug, Clone)]
pub struct TriageClassifier {
    ctx: AgentContext,
}

impl TriageClassifier {
    /// Create a classifier over the shared context.
    #[must_use]
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }

    /// Classify one email for `tenant`.
    ///
    /// # Errors
    ///
    /// - [`AgentError::Classification`] if both attempts return output that
    ///   fails validation.
    /// - [`AgentError::Llm`] if a model call fails (no retry).
    /// - [`AgentError::Memory`] if prompts or examples cannot be read.
    #[instrument(skip(self, email), fields(subject = %email.subject))]
    pub async fn classify(&self, tenant: &str, email: &EmailInput) -> Result<TriageDecision> {
        let start = Instant::now();
        let counters = &self.ctx.counters;

        // Snapshot: every memory read happens here, before the first call.
        let procedural = &self.ctx.procedural;
        let ignore = procedural.resolve(tenant, &IGNORE_RULE)?;
        let notify = procedural.resolve(tenant, &NOTIFY_RULE)?;
        let respond = procedural.resolve(tenant, &RESPOND_RULE)?;
        let examples = self.ctx.semantic.retrieve_similar(
            tenant,
            &email.as_payload(),
            self.ctx.settings.few_shot_limit,
        )?;
        let examples_block = format_few_shot_examples(&examples);

        let mut vars = self.ctx.profile_vars().to_vec();
        vars.extend([
            ("triage_no", ignore.as_str()),
            ("triage_notify", notify.as_str()),
            ("triage_email", respond.as_str()),
            ("examples", examples_block.as_str()),
            ("author", email.author.as_str()),
            ("to", email.to.as_str()),
            ("subject", email.subject.as_str()),
            ("email_thread", email.body.as_str()),
        ]);
        let (system, user) = self
            .ctx
            .prompts
            .render(PromptId::Triage, &vars)
            .map_err(|e| AgentError::Config(e.to_string()))?;
        let mut messages = vec![Message::system(system), Message::user(user)];

        let mut last_error = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            let request = self
                .ctx
                .request(PromptId::Triage, messages.clone())
                .with_schema(prompt::triage_schema());
            let reply = self.ctx.model.generate(&request).await?;

            match validate(&reply) {
                Ok(decision) => {
                    let counter = match decision.classification {
                        Classification::Ignore => &counters.classified_ignore,
                        Classification::Notify => &counters.classified_notify,
                        Classification::Respond => &counters.classified_respond,
                    };
                    MailmemCounters::incr(counter);
                    info!(
                        tenant,
                        classification = %decision.classification,
                        examples = examples.len(),
                        attempt,
                        elapsed_us = start.elapsed().as_micros(),
                        "Email classified"
                    );
                    return Ok(decision);
                }
                Err(reason) => {
                    warn!(tenant, attempt, %reason, "Rejected triage reply");
                    last_error = reason;
                    if attempt < MAX_ATTEMPTS {
                        MailmemCounters::incr(&counters.classification_retries);
                        messages.push(reply);
                        messages.push(Message::user(render_template(
                            prompt::TRIAGE_CORRECTION,
                            &[("error", last_error.as_str())],
                        )));
                    }
                }
            }
        }

        MailmemCounters::incr(&counters.classification_failures);
        debug!(tenant, elapsed_us = start.elapsed().as_micros(), "Classification failed");
        Err(AgentError::Classification {
            attempts: MAX_ATTEMPTS,
            reason: last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn example(input: Value, label: &str) -> FewShotExample {
        FewShotExample {
            key: "k".into(),
            input,
            label: label.into(),
            score: 1.0,
            created_at: Default::default(),
        }
    }

    #[test]
    fn empty_examples_render_placeholder() {
        assert_eq!(format_few_shot_examples(&[]), "No examples available.");
    }

    #[test]
    fn examples_render_with_header_and_separator() {
        let long_body = "x".repeat(1000);
        let a = EmailInput::new("sarah@company.com", "john@company.com", "Q3 slides", "Resend please");
        let b = EmailInput::new("news@shop.com", "john@company.com", "Sale", long_body);
        let block = format_few_shot_examples(&[
            example(a.as_payload(), "respond"),
            example(b.as_payload(), "ignore"),
        ]);

        assert!(block.starts_with("Here are some previous examples:\n\n------------\n\nEmail Subject: Q3 slides"));
        assert!(block.contains("Email From: sarah@company.com"));
        assert!(block.contains("> Triage Result: respond"));
        assert!(block.contains(&format!("```\n{}\n```", "x".repeat(400))));
        assert!(!block.contains(&"x".repeat(401)));
        assert_eq!(block.matches("------------").count(), 2);
    }

    #[test]
    fn validation_rejects_schema_violations() {
        let ok = Message::assistant(r#"{"reasoning": "build notice", "classification": "notify"}"#);
        assert_eq!(validate(&ok).expect("valid").classification, Classification::Notify);

        for bad in [
            r#"{"reasoning": "r", "classification": "urgent"}"#,
            r#"{"reasoning": "  ", "classification": "ignore"}"#,
            r#"{"classification": "ignore"}"#,
            "respond",
        ] {
            assert!(validate(&Message::assistant(bad)).is_err(), "{bad}");
        }
    }
}
