//! End-to-end pipeline tests against a scripted model.

use std::sync::Arc;
use std::time::Duration;

use mailmem_agent::{
    AgentContext, AgentError, AgentSettings, Classification, EmailAssistant, EmailInput, Trajectory,
    AGENT_INSTRUCTIONS, NOTIFY_RULE, RESPOND_RULE,
};
use mailmem_core::embedding::HashingEmbeddingProvider;
use mailmem_core::metrics::{CountedStore, MailmemCounters};
use mailmem_core::{InMemoryStore, MailmemConfig, MemoryStore};
use mailmem_llm::{LlmError, LlmRequest, Message, Role, ScriptedModel, ToolCall};
use serde_json::{json, Value};

const TENANT: &str = "john";

fn indexed_store() -> InMemoryStore {
    InMemoryStore::indexed(Arc::new(HashingEmbeddingProvider::new(256).expect("provider")))
}

fn assistant_with(model: &ScriptedModel) -> EmailAssistant {
    let store: Arc<dyn MemoryStore> = Arc::new(indexed_store());
    EmailAssistant::new(AgentContext::new(store, Arc::new(model.clone())))
}

fn triage(classification: &str, reasoning: &str) -> Result<Message, LlmError> {
    Ok(Message::assistant(
        json!({ "reasoning": reasoning, "classification": classification }).to_string(),
    ))
}

fn call(id: &str, name: &str, arguments: Value) -> Result<Message, LlmError> {
    Ok(Message::assistant_tool_calls(
        "",
        vec![ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        }],
    ))
}

fn select(names: &[&str]) -> Result<Message, LlmError> {
    Ok(Message::assistant(json!({ "prompt_names": names }).to_string()))
}

fn rewrite(text: &str) -> Result<Message, LlmError> {
    Ok(Message::assistant(json!({ "updated_prompt": text }).to_string()))
}

fn system_of(request: &LlmRequest) -> &str {
    request.system_prompt().unwrap_or_default()
}

fn slides_email() -> EmailInput {
    EmailInput::new(
        "Sarah Lee <sarah.lee@company.com>",
        "John Doe <john.doe@company.com>",
        "Q3 slides",
        "Hi John, could you resend the Q3 slides before Friday's review?",
    )
}

#[tokio::test]
async fn build_failure_is_notify_without_response() {
    let model = ScriptedModel::new();
    model.push(triage("notify", "Build system notification for the team."));
    let assistant = assistant_with(&model);

    let email = EmailInput::new(
        "ci@company.com",
        "john.doe@company.com",
        "Quarterly build failed",
        "The nightly quarterly release build failed at step 4 (integration tests).",
    );
    let outcome = assistant.process(TENANT, &email).await.expect("process");

    assert_eq!(outcome.decision.classification, Classification::Notify);
    assert!(outcome.trajectory.is_none());
    assert_eq!(model.call_count(), 1);

    let request = &model.requests()[0];
    assert_eq!(request.response_schema.as_ref().map(|s| s.name.as_str()), Some("router"));
    assert!(system_of(request).contains(NOTIFY_RULE.default_text));
    assert!(system_of(request).contains("No examples available."));
    assert!(request.messages[1].content.contains("Quarterly build failed"));
    assert_eq!(assistant.counters().snapshot().classified, [0, 1, 0]);
}

#[tokio::test]
async fn feedback_on_a_reply_changes_the_next_reply() {
    let model = ScriptedModel::new();
    let assistant = assistant_with(&model);
    assistant
        .add_example(TENANT, "slides-1", &slides_email(), Classification::Respond)
        .expect("example");

    model.push(triage("respond", "Direct request from a team member."));
    model.push(call(
        "call_0",
        "write_email",
        json!({
            "to": "sarah.lee@company.com",
            "subject": "Re: Q3 slides",
            "content": "Hi Sarah, attached are the Q3 slides.",
        }),
    ));
    model.push(Ok(Message::assistant("I resent the Q3 slides to Sarah.")));

    let outcome = assistant.process(TENANT, &slides_email()).await.expect("first email");
    assert_eq!(outcome.decision.classification, Classification::Respond);
    let trajectory = outcome.trajectory.expect("trajectory");
    assert_eq!(trajectory.final_text(), Some("I resent the Q3 slides to Sarah."));
    assert_eq!(trajectory.tool_names().collect::<Vec<_>>(), ["write_email"]);
    let tool_result = &trajectory.messages()[3];
    assert_eq!(tool_result.role, Role::Tool);
    assert_eq!(tool_result.content, "Email sent to sarah.lee@company.com with subject 'Re: Q3 slides'");

    let requests = model.requests();
    let triage_system = system_of(&requests[0]);
    assert!(triage_system.contains("Email Subject: Q3 slides"));
    assert!(triage_system.contains("> Triage Result: respond"));
    assert!(requests[1].messages[1].content.contains("Triage notes: Direct request from a team member."));
    assert!(requests[1].tools.iter().any(|t| t.name == "manage_memory"));

    let signed = format!("{} Always end emails with 'Thanks, Jordan'.", AGENT_INSTRUCTIONS.default_text);
    model.push(select(&["agent_instructions"]));
    model.push(rewrite(&signed));
    let updated = assistant
        .apply_feedback(TENANT, &trajectory, "always end emails with 'Thanks, Jordan'")
        .await
        .expect("feedback");
    assert_eq!(updated, ["agent_instructions"]);

    for state in assistant.prompts(TENANT).expect("prompts") {
        if state.name() == "agent_instructions" {
            assert_eq!(state.text, signed);
        } else {
            assert_eq!(state.text, state.definition.default_text, "{}", state.name());
        }
    }

    model.push(triage("respond", "Follow-up question."));
    model.push(Ok(Message::assistant("Sent. Thanks, Jordan")));
    let second = EmailInput::new(
        "sarah.lee@company.com",
        "john.doe@company.com",
        "Q3 slides, one more thing",
        "Could you also share the speaker notes?",
    );
    assistant.process(TENANT, &second).await.expect("second email");

    let last = model.requests().pop().expect("request");
    assert!(system_of(&last).contains("Thanks, Jordan"));
}

#[tokio::test]
async fn failed_rewrite_leaves_every_prompt_untouched() {
    let model = ScriptedModel::new();
    let assistant = assistant_with(&model);
    let before = assistant.prompts(TENANT).expect("prompts");

    model.push(select(&["agent_instructions", "respond_rule"]));
    model.push(rewrite("Sign every email with 'Thanks, Jordan'."));
    model.push(Err(LlmError::Unavailable("connection refused".into())));

    let err = assistant
        .apply_feedback(TENANT, &Trajectory::new(), "sign emails and reply to more things")
        .await
        .expect_err("second rewrite fails");
    assert!(matches!(err, AgentError::Optimization(_)), "{err}");
    assert_eq!(assistant.prompts(TENANT).expect("prompts"), before);
}

#[tokio::test]
async fn unusable_selection_fails_without_writing() {
    let model = ScriptedModel::new();
    let assistant = assistant_with(&model);
    model.push(Ok(Message::assistant("agent_instructions, please")));

    let err = assistant
        .apply_feedback(TENANT, &Trajectory::new(), "be brief")
        .await
        .expect_err("no json");
    assert!(matches!(err, AgentError::Optimization(_)));
    assert_eq!(model.call_count(), 1);
    assert_eq!(
        assistant.context().procedural.get(TENANT, "agent_instructions").expect("get"),
        Some(AGENT_INSTRUCTIONS.default_text.to_owned())
    );
}

#[tokio::test]
async fn only_changed_prompts_are_written() {
    let counters = Arc::new(MailmemCounters::new());
    let store: Arc<dyn MemoryStore> = Arc::new(CountedStore::new(indexed_store(), Arc::clone(&counters)));
    let model = ScriptedModel::new();
    let ctx = AgentContext::new(store, Arc::new(model.clone())).with_counters(Arc::clone(&counters));
    let assistant = EmailAssistant::new(ctx);
    assistant.prompts(TENANT).expect("initialise");

    // Identical rewrite: nothing reported, nothing written beyond the snapshot reads.
    let puts = counters.snapshot().store_puts;
    model.push(select(&["notify_rule"]));
    model.push(rewrite(NOTIFY_RULE.default_text));
    let updated = assistant
        .apply_feedback(TENANT, &Trajectory::new(), "build notices are fine as they are")
        .await
        .expect("feedback");
    assert!(updated.is_empty());
    let snapshot_reads = mailmem_agent::REGISTERED_PROMPTS.len() as u64;
    assert_eq!(counters.snapshot().store_puts, puts + snapshot_reads);

    // One real change: exactly one extra write.
    let puts = counters.snapshot().store_puts;
    model.push(select(&["notify_rule", "respond_rule"]));
    model.push(rewrite("Build failures, team members out sick, status updates"));
    model.push(rewrite(RESPOND_RULE.default_text));
    let updated = assistant
        .apply_feedback(TENANT, &Trajectory::new(), "tell me about failed builds")
        .await
        .expect("feedback");
    assert_eq!(updated, ["notify_rule"]);
    assert_eq!(counters.snapshot().store_puts, puts + snapshot_reads + 1);
    assert_eq!(counters.snapshot().optimizer_updates, 1);
}

#[tokio::test]
async fn unregistered_selection_is_ignored() {
    let model = ScriptedModel::new();
    let assistant = assistant_with(&model);
    model.push(select(&["signature_rule", "ignore_rule"]));
    model.push(rewrite("Marketing newsletters, spam, recruiter outreach"));

    let updated = assistant
        .apply_feedback(TENANT, &Trajectory::new(), "ignore recruiters")
        .await
        .expect("feedback");
    assert_eq!(updated, ["ignore_rule"]);
    assert_eq!(model.call_count(), 2);
    assert_eq!(
        assistant.context().procedural.get(TENANT, "signature_rule").expect("get"),
        None
    );
}

#[tokio::test]
async fn feedback_stays_within_its_tenant() {
    let model = ScriptedModel::new();
    let assistant = assistant_with(&model);
    model.push(select(&["ignore_rule"]));
    model.push(rewrite("Everything from recruiters"));
    assistant
        .apply_feedback("alice", &Trajectory::new(), "ignore recruiters")
        .await
        .expect("feedback");

    let bob = assistant.prompts("bob").expect("prompts");
    assert!(bob.iter().all(|s| s.text == s.definition.default_text));
}

#[tokio::test]
async fn endless_tool_calls_hit_the_iteration_cap() {
    let model = ScriptedModel::new().with_responder(|_| {
        Ok(Message::assistant_tool_calls(
            "",
            vec![ToolCall {
                id: "call_0".into(),
                name: "check_calendar_availability".into(),
                arguments: json!({ "day": "Friday" }),
            }],
        ))
    });
    let store: Arc<dyn MemoryStore> = Arc::new(indexed_store());
    let settings = AgentSettings {
        max_iterations: 3,
        ..AgentSettings::default()
    };
    let ctx = AgentContext::new(store, Arc::new(model.clone())).with_settings(settings);
    let assistant = EmailAssistant::new(ctx);

    let err = assistant
        .responder()
        .respond(TENANT, &slides_email(), "needs a reply")
        .await
        .expect_err("loop never ends");
    let AgentError::LoopExceeded { iterations, trajectory } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(*iterations, 3);
    assert_eq!(model.call_count(), 3);
    // system + user, then one assistant and one tool message per iteration.
    assert_eq!(trajectory.len(), 2 + 3 * 2);
    assert_eq!(trajectory.tool_names().count(), 3);
    assert_eq!(assistant.counters().snapshot().loop_overruns, 1);
}

#[tokio::test]
async fn tool_failures_are_fed_back_to_the_model() {
    let model = ScriptedModel::new();
    model.push(call("call_0", "book_flight", json!({ "to": "Lisbon" })));
    model.push(call("call_1", "write_email", json!({ "to": "sarah@company.com" })));
    model.push(call("call_2", "manage_memory", json!({ "content": "Sarah owns the Q3 deck" })));
    model.push(Ok(Message::assistant("Done.")));
    let assistant = assistant_with(&model);

    let trajectory = assistant
        .responder()
        .respond(TENANT, &slides_email(), "")
        .await
        .expect("loop recovers");

    let tool_messages: Vec<&Message> = trajectory.messages().iter().filter(|m| m.role == Role::Tool).collect();
    assert_eq!(tool_messages.len(), 3);
    let unknown: Value = serde_json::from_str(&tool_messages[0].content).expect("json");
    assert_eq!(unknown["error"], "unknown tool 'book_flight'");
    assert!(tool_messages[1].content.contains("\"error\""));
    assert!(tool_messages[2].content.contains("\"status\":\"stored\""));
    assert_eq!(tool_messages[1].tool_call_id.as_deref(), Some("call_1"));

    let notes = assistant
        .context()
        .episodic
        .recall(TENANT, "Q3 deck owner", 5)
        .expect("recall");
    assert_eq!(notes.len(), 1);

    let counters = assistant.counters().snapshot();
    assert_eq!(counters.tool_calls, 3);
    assert_eq!(counters.tool_errors, 2);
}

#[tokio::test]
async fn slow_model_times_out_with_partial_trajectory() {
    let model = ScriptedModel::replies(["too late"]).with_delay(Duration::from_millis(500));
    let store: Arc<dyn MemoryStore> = Arc::new(indexed_store());
    let settings = AgentSettings {
        call_timeout_ms: 20,
        ..AgentSettings::default()
    };
    let assistant = EmailAssistant::new(AgentContext::new(store, Arc::new(model)).with_settings(settings));

    let err = assistant
        .responder()
        .respond(TENANT, &slides_email(), "")
        .await
        .expect_err("timeout");
    assert!(matches!(err, AgentError::Llm { source: LlmError::Timeout(20), .. }), "{err}");
    let partial = err.trajectory().expect("partial trajectory");
    assert_eq!(partial.len(), 2);
    assert_eq!(partial.messages()[0].role, Role::System);
}

#[tokio::test]
async fn invalid_triage_reply_gets_one_corrective_retry() {
    let model = ScriptedModel::new();
    model.push(Ok(Message::assistant("I think this should be answered.")));
    model.push(triage("respond", "Direct question."));
    let assistant = assistant_with(&model);

    let decision = assistant.classify(TENANT, &slides_email()).await.expect("retry succeeds");
    assert_eq!(decision.classification, Classification::Respond);

    let retry = &model.requests()[1];
    assert_eq!(retry.messages.len(), 4);
    assert_eq!(retry.messages[2].role, Role::Assistant);
    assert_eq!(retry.messages[3].role, Role::User);
    assert_eq!(assistant.counters().snapshot().classification_retries, 1);
}

#[tokio::test]
async fn triage_gives_up_after_two_invalid_replies() {
    let model = ScriptedModel::new();
    model.push(triage("urgent", "Looks urgent."));
    model.push(triage("maybe", "Still unsure."));
    let assistant = assistant_with(&model);

    let err = assistant.process(TENANT, &slides_email()).await.expect_err("invalid twice");
    assert!(matches!(err, AgentError::Classification { attempts: 2, .. }), "{err}");
    assert_eq!(model.call_count(), 2);
    assert_eq!(assistant.counters().snapshot().classification_failures, 1);
}

#[tokio::test]
async fn sqlite_configuration_persists_prompts() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db = dir.path().join("mailmem.db");
    let config = MailmemConfig::from_toml(&format!(
        r#"
        [store]
        backend = "sqlite"
        path = "{}"

        [llm]
        provider = "none"
        "#,
        db.display()
    ))?;

    {
        let assistant = EmailAssistant::from_config(&config)?;
        assistant
            .context()
            .procedural
            .set(TENANT, "respond_rule", "Only direct questions")?;

        let err = assistant.process(TENANT, &slides_email()).await.expect_err("no model");
        assert!(matches!(err, AgentError::Llm { source: LlmError::Unavailable(_), trajectory: None }));
    }

    let reopened = EmailAssistant::from_config(&config)?;
    let prompts = reopened.prompts(TENANT)?;
    let respond = prompts.iter().find(|s| s.name() == "respond_rule").expect("respond_rule");
    assert_eq!(respond.text, "Only direct questions");
    Ok(())
}

#[tokio::test]
async fn frozen_prompts_ignore_feedback() {
    let model = ScriptedModel::new();
    let store: Arc<dyn MemoryStore> = Arc::new(indexed_store());
    let settings = AgentSettings {
        learning: false,
        ..AgentSettings::default()
    };
    let assistant = EmailAssistant::new(AgentContext::new(store, Arc::new(model.clone())).with_settings(settings));

    let updated = assistant
        .apply_feedback(TENANT, &Trajectory::new(), "always sign as Jordan")
        .await
        .expect("no-op");
    assert!(updated.is_empty());
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn custom_action_tools_replace_the_defaults() {
    use mailmem_agent::tools::FnTool;
    use mailmem_agent::ToolRegistry;
    use mailmem_llm::ToolSpec;

    let send = FnTool::new(
        ToolSpec {
            name: "write_email".into(),
            description: "Send through the outbox service.".into(),
            parameters: json!({ "type": "object", "properties": { "to": { "type": "string" } } }),
        },
        |args| Ok(format!("queued for {}", args["to"].as_str().unwrap_or("nobody"))),
    );
    let model = ScriptedModel::new();
    model.push(call("call_0", "write_email", json!({ "to": "sarah@company.com" })));
    model.push(Ok(Message::assistant("Queued.")));
    let assistant = assistant_with(&model).with_actions(ToolRegistry::new().with(Arc::new(send)));

    let trajectory = assistant
        .responder()
        .respond(TENANT, &slides_email(), "")
        .await
        .expect("respond");
    assert_eq!(trajectory.messages()[3].content, "queued for sarah@company.com");

    let offered: Vec<String> = model.requests()[0].tools.iter().map(|t| t.name.clone()).collect();
    assert_eq!(offered, ["write_email", "manage_memory", "search_memory"]);
    assert!(system_of(&model.requests()[0]).contains("1. write_email - Send through the outbox service."));
}
