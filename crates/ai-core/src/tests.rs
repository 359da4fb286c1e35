// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Loop-level scenarios driven through a scripted provider and a recording
//! renderer: unlock gating, cancellation, transcript invariants, fallbacks.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use ai_config::Config;
use ai_model::{FinalResponse, Item, OutputItem, ScriptedClient, StreamEvent};
use ai_render::{HotkeyEvent, RecordingRenderer};
use ai_tools::JFDI_REQUIRED_MESSAGE;

use crate::settings::build_engine_settings_with;
use crate::Engine;

fn test_config() -> Config {
    Config {
        openai_api_key: "sk-test".into(),
        model: "test-model".into(),
        dog_whistle: "jfdi".into(),
        show_reasoning: Some(false),
        ..Config::default()
    }
}

fn build_engine(root: &Path) -> (Arc<RecordingRenderer>, Arc<ScriptedClient>, Engine) {
    let renderer = Arc::new(RecordingRenderer::new());
    let client = Arc::new(ScriptedClient::new());
    let config = test_config();
    let settings = build_engine_settings_with(&config, |_| None).unwrap();
    let engine = Engine::new(renderer.clone(), client.clone(), config, settings)
        .with_workspace_root(root.to_path_buf());
    (renderer, client, engine)
}

fn message_response(id: &str, text: &str) -> FinalResponse {
    FinalResponse {
        output: vec![OutputItem::Message {
            id: Some(id.into()),
            text: text.into(),
        }],
    }
}

fn write_call(call_id: &str, path: &str, content: &str) -> FinalResponse {
    FinalResponse {
        output: vec![OutputItem::FunctionCall {
            id: None,
            call_id: call_id.into(),
            name: "write".into(),
            arguments: json!({"filePath": path, "content": content}).to_string(),
        }],
    }
}

/// Every function call in a transcript must be immediately followed by its
/// matching output.
fn assert_tool_pairing(items: &[Item]) {
    for (index, item) in items.iter().enumerate() {
        if let Item::FunctionCall(call) = item {
            match items.get(index + 1) {
                Some(Item::FunctionCallOutput(output)) => {
                    assert_eq!(output.call_id, call.call_id, "output pairs with its call");
                }
                other => panic!(
                    "function_call '{}' not followed by its output: {other:?}",
                    call.call_id
                ),
            }
        }
    }
}

fn user_texts(items: &[Item]) -> Vec<String> {
    items.iter().filter_map(|i| i.as_user_text()).collect()
}

// ── Unlock gating (scenario: write blocked, then approved) ───────────────────

#[tokio::test]
async fn write_is_blocked_until_the_dog_whistle() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), "old\n").unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());

    client.push_completed(write_call("c1", "hello.txt", "hi\n")); // blocked
    client.push_completed(FinalResponse::default());
    client.push_completed(write_call("c2", "hello.txt", "hi\n")); // approved
    client.push_completed(FinalResponse::default());
    renderer.push_follow_up(Some("jfdi"));
    renderer.push_follow_up(None);

    let code = engine
        .run_conversation("rewrite hello.txt to say hi", None, true)
        .await
        .unwrap();
    assert_eq!(code, 0);

    // The file only changed after approval.
    assert_eq!(
        std::fs::read_to_string(dir.path().join("hello.txt")).unwrap(),
        "hi\n"
    );

    // The assistant explained which phrase unlocks execution.
    assert!(
        renderer
            .events()
            .iter()
            .any(|e| e.contains("I need you to say `jfdi`")),
        "{:#?}",
        renderer.events()
    );

    // The transcript records the blocked result, then the applied one.
    let requests = client.requests();
    assert_eq!(requests.len(), 4);
    let final_input = &requests[3].input;
    assert_tool_pairing(final_input);
    let outputs: Vec<&str> = final_input
        .iter()
        .filter_map(|item| match item {
            Item::FunctionCallOutput(out) => Some(out.output.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(outputs, vec![JFDI_REQUIRED_MESSAGE, "applied"]);

    // Approval was narrated to the model as a user message.
    assert!(user_texts(final_input)
        .iter()
        .any(|t| t.contains("signaling approval to execute the existing plan")));
    // The workspace snapshot was refreshed after the mutation.
    assert!(user_texts(final_input)
        .iter()
        .any(|t| t.starts_with("Updated repository snapshot:")));
}

#[tokio::test]
async fn blocked_write_leaves_the_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), "old\n").unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());

    client.push_completed(write_call("c1", "hello.txt", "hi\n"));
    client.push_completed(FinalResponse::default());
    renderer.push_follow_up(None);

    engine
        .run_conversation("rewrite hello.txt to say hi", None, true)
        .await
        .unwrap();
    assert_eq!(
        std::fs::read_to_string(dir.path().join("hello.txt")).unwrap(),
        "old\n"
    );
}

#[tokio::test]
async fn dog_whistle_as_initial_prompt_unlocks_without_a_model_call() {
    let dir = tempfile::tempdir().unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());

    let code = engine.run_conversation("JFDI", None, true).await.unwrap();
    assert_eq!(code, 0);
    assert!(engine.jfdi_enabled);
    assert_eq!(client.call_count(), 0);
    assert!(renderer
        .events()
        .iter()
        .any(|e| e.contains("Mutating tools enabled")));
}

// ── Scope violations ─────────────────────────────────────────────────────────

#[tokio::test]
async fn read_file_outside_root_reports_error_to_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());

    client.push_completed(FinalResponse {
        output: vec![OutputItem::FunctionCall {
            id: None,
            call_id: "c1".into(),
            name: "read_file".into(),
            arguments: json!({"path": "../etc/passwd"}).to_string(),
        }],
    });
    client.push_completed(FinalResponse::default());
    renderer.push_follow_up(None);

    let code = engine.run_conversation("show me", None, true).await.unwrap();
    assert_eq!(code, 0);

    let requests = client.requests();
    let outputs: Vec<&str> = requests[1]
        .input
        .iter()
        .filter_map(|item| match item {
            Item::FunctionCallOutput(out) => Some(out.output.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(outputs.len(), 1);
    assert!(
        outputs[0].starts_with("error: path outside project root"),
        "{}",
        outputs[0]
    );
}

#[tokio::test]
async fn bad_scope_argument_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());

    let code = engine
        .run_conversation("anything", Some("../outside"), true)
        .await
        .unwrap();
    assert_eq!(code, 1);
    assert_eq!(client.call_count(), 0);
    assert!(renderer
        .events()
        .iter()
        .any(|e| e.contains("Scope path must be inside the repository")));
}

#[tokio::test]
async fn empty_prompt_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let (_renderer, client, mut engine) = build_engine(dir.path());
    let code = engine.run_conversation("   ", None, true).await.unwrap();
    assert_eq!(code, 1);
    assert_eq!(client.call_count(), 0);
}

// ── Cancellation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn retry_rolls_back_and_resends_the_same_prompt_once() {
    let dir = tempfile::tempdir().unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());

    client.push_turn(vec![
        StreamEvent::OutputTextDelta {
            key: "m:0".into(),
            delta: "partial".into(),
        },
        StreamEvent::Completed {
            response: message_response("m", "never reached"),
        },
    ]);
    client.push_completed(message_response("m2", "the real answer"));
    renderer.push_hotkey(Some(HotkeyEvent::Retry));
    renderer.push_follow_up(None);

    let code = engine
        .run_conversation("unique prompt marker", None, true)
        .await
        .unwrap();
    assert_eq!(code, 0);

    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        let occurrences = user_texts(&request.input)
            .iter()
            .filter(|t| t.contains("unique prompt marker"))
            .count();
        assert_eq!(occurrences, 1, "the model sees the prompt exactly once");
    }
    assert!(renderer
        .events()
        .iter()
        .any(|e| e.contains("Retrying prompt…")));
}

#[tokio::test]
async fn quit_truncates_the_transcript_and_relatches_the_gate() {
    let dir = tempfile::tempdir().unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());

    // Turn 1 completes; the user then unlocks; turn 2 is cancelled with `q`.
    client.push_completed(FinalResponse::default());
    client.push_turn(vec![
        StreamEvent::OutputTextDelta {
            key: "m:0".into(),
            delta: "will be cancelled".into(),
        },
        StreamEvent::Completed {
            response: message_response("m", "will be cancelled"),
        },
    ]);
    client.push_completed(FinalResponse::default());
    renderer.push_follow_up(Some("jfdi"));
    // Turn 2 (the approval turn) gets cancelled at its first poll.
    renderer.push_hotkey(Some(HotkeyEvent::Quit));
    renderer.push_follow_up(Some("a fresh instruction"));
    renderer.push_follow_up(None);

    let code = engine
        .run_conversation("first prompt", None, true)
        .await
        .unwrap();
    assert_eq!(code, 0);
    assert!(!engine.jfdi_enabled, "quit must re-latch the mutation gate");
    assert!(renderer
        .events()
        .iter()
        .any(|e| e.contains("Prompt cancelled. You can continue the conversation.")));

    // The cancelled approval message was rolled back: the final request
    // contains the fresh instruction but not the approval narration.
    let requests = client.requests();
    let last_input = &requests.last().unwrap().input;
    let texts = user_texts(last_input);
    assert!(texts.iter().any(|t| t.contains("a fresh instruction")));
    assert!(!texts.iter().any(|t| t.contains("signaling approval")));
}

#[tokio::test]
async fn double_quit_produces_a_single_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());

    client.push_turn(vec![
        StreamEvent::OutputTextDelta {
            key: "m:0".into(),
            delta: "x".into(),
        },
        StreamEvent::OutputTextDelta {
            key: "m:0".into(),
            delta: "y".into(),
        },
    ]);
    renderer.push_hotkey(Some(HotkeyEvent::Quit));
    renderer.push_hotkey(Some(HotkeyEvent::Quit));
    renderer.push_follow_up(None);

    engine.run_conversation("prompt", None, true).await.unwrap();
    let notices = renderer
        .events()
        .iter()
        .filter(|e| e.contains("Prompt cancelled"))
        .count();
    assert_eq!(notices, 1);
}

#[tokio::test]
async fn interrupt_exits_with_130() {
    let dir = tempfile::tempdir().unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());

    client.push_turn(vec![StreamEvent::OutputTextDelta {
        key: "m:0".into(),
        delta: "x".into(),
    }]);
    renderer.push_hotkey(Some(HotkeyEvent::Interrupt));

    let code = engine.run_conversation("prompt", None, true).await.unwrap();
    assert_eq!(code, 130);
}

// ── Reasoning ordering ───────────────────────────────────────────────────────

#[tokio::test]
async fn reasoning_item_precedes_its_tool_call_in_the_transcript() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "data").unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());

    client.push_completed(FinalResponse {
        output: vec![
            OutputItem::Reasoning(json!({
                "type": "reasoning",
                "id": "rs_1",
                "summary": [],
                "encrypted_content": "opaque"
            })),
            OutputItem::FunctionCall {
                id: None,
                call_id: "c1".into(),
                name: "read_file".into(),
                arguments: json!({"path": "a.txt"}).to_string(),
            },
        ],
    });
    client.push_completed(FinalResponse::default());
    renderer.push_follow_up(None);

    engine.run_conversation("read it", None, true).await.unwrap();

    let requests = client.requests();
    let input = &requests[1].input;
    let call_index = input
        .iter()
        .position(|item| matches!(item, Item::FunctionCall(_)))
        .expect("transcript contains the tool call");
    match &input[call_index - 1] {
        Item::Reasoning(reasoning) => {
            assert_eq!(reasoning.id.as_deref(), Some("rs_1"));
            // Sanitised: unknown fields are not echoed back.
            let v = serde_json::to_value(&input[call_index - 1]).unwrap();
            assert!(v.get("encrypted_content").is_none());
        }
        other => panic!("expected reasoning before the call, found {other:?}"),
    }
    assert_tool_pairing(input);
}

// ── Generated-file fallback ──────────────────────────────────────────────────

#[tokio::test]
async fn narrated_file_block_is_routed_through_review() {
    let dir = tempfile::tempdir().unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());

    client.push_completed(message_response(
        "m1",
        "Save the following as utils.py:\n```python\nX=1\n```",
    ));
    renderer.push_follow_up(None);

    let code = engine
        .run_conversation("please write utils.py", None, true)
        .await
        .unwrap();
    assert_eq!(code, 0);

    assert!(
        renderer
            .events()
            .iter()
            .any(|e| e.starts_with("review: utils.py")),
        "{:#?}",
        renderer.events()
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("utils.py")).unwrap(),
        "X=1"
    );
}

#[tokio::test]
async fn claimed_write_without_changes_triggers_one_reminder() {
    let dir = tempfile::tempdir().unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());

    client.push_completed(message_response("m1", "I have created the file for you."));
    client.push_completed(message_response("m2", "Understood — it was created already."));
    client.push_completed(FinalResponse::default());
    renderer.push_follow_up(Some("thanks"));
    renderer.push_follow_up(None);

    engine.run_conversation("make a file", None, true).await.unwrap();

    let requests = client.requests();
    // Request 2 carries the reminder; the second claim does not re-trigger it.
    let reminder_count = |items: &[Item]| {
        user_texts(items)
            .iter()
            .filter(|t| t.contains("It appears no files changed"))
            .count()
    };
    assert_eq!(reminder_count(&requests[1].input), 1);
    assert_eq!(
        reminder_count(&requests.last().unwrap().input),
        1,
        "the reminder is injected exactly once"
    );
}

// ── Shell passthrough follow-ups ─────────────────────────────────────────────

#[tokio::test]
async fn bang_follow_up_buffers_output_without_calling_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());

    client.push_completed(FinalResponse::default());
    client.push_completed(FinalResponse::default());
    renderer.push_follow_up(Some("!echo from-shell"));
    renderer.push_follow_up(Some("now explain that output"));
    renderer.push_follow_up(None);

    engine.run_conversation("hello", None, true).await.unwrap();

    let requests = client.requests();
    assert_eq!(requests.len(), 2, "the ! command itself makes no model call");
    let texts = user_texts(&requests[1].input);
    let shell_msg = texts
        .iter()
        .find(|t| t.starts_with("Executed shell command: `echo from-shell`"))
        .expect("buffered shell output becomes a user message");
    assert!(shell_msg.contains("from-shell"));
    assert!(texts
        .iter()
        .any(|t| t.contains("Follow-up instruction:\nnow explain that output")));
}

#[tokio::test]
async fn rejected_bang_command_is_surfaced_not_buffered() {
    let dir = tempfile::tempdir().unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());

    client.push_completed(FinalResponse::default());
    renderer.push_follow_up(Some("!sudo rm -rf thing"));
    renderer.push_follow_up(None);

    engine.run_conversation("hello", None, true).await.unwrap();
    assert_eq!(client.call_count(), 1);
    assert!(renderer
        .events()
        .iter()
        .any(|e| e.starts_with("error: command rejected:")));
}

// ── Conversation reset ───────────────────────────────────────────────────────

#[tokio::test]
async fn new_conversation_token_clears_transcript_and_gate() {
    let dir = tempfile::tempdir().unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());

    client.push_completed(message_response("m1", "first answer"));
    client.push_completed(FinalResponse::default());
    renderer.push_follow_up(Some("<<NEW_CONVERSATION>>"));
    renderer.push_follow_up(Some("second task"));
    renderer.push_follow_up(None);

    engine.run_conversation("first task", None, true).await.unwrap();

    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    let texts = user_texts(&requests[1].input);
    assert!(
        !texts.iter().any(|t| t.contains("first task")),
        "reset must drop the old transcript: {texts:#?}"
    );
    assert!(texts.iter().any(|t| t.contains("second task")));
    // The fresh transcript re-seeds the workspace snapshot.
    assert!(texts
        .iter()
        .any(|t| t.starts_with("Updated repository snapshot:")));
}

// ── Plan tools through the loop ──────────────────────────────────────────────

#[tokio::test]
async fn plan_update_merge_survives_across_turns() {
    let dir = tempfile::tempdir().unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());

    client.push_completed(FinalResponse {
        output: vec![OutputItem::FunctionCall {
            id: None,
            call_id: "p1".into(),
            name: "plan_update".into(),
            arguments: json!({"todos": [
                {"id": "a", "content": "A", "status": "pending"},
                {"id": "b", "content": "B", "status": "pending"}
            ]})
            .to_string(),
        }],
    });
    client.push_completed(FinalResponse {
        output: vec![OutputItem::FunctionCall {
            id: None,
            call_id: "p2".into(),
            name: "plan_update".into(),
            arguments: json!({"todos": [
                {"id": "b", "content": "B2", "status": "in_progress"},
                {"id": "c", "content": "C", "status": "pending"}
            ], "replace": false})
            .to_string(),
        }],
    });
    client.push_completed(FinalResponse::default());
    renderer.push_follow_up(None);

    engine.run_conversation("plan things", None, true).await.unwrap();

    let plans = renderer.events_matching("plan:");
    let merged = plans.last().expect("plan updates were displayed");
    assert!(merged.contains("[ ] a — A"), "{merged}");
    assert!(merged.contains("[~] b — B2"), "{merged}");
    assert!(merged.contains("[ ] c — C"), "{merged}");
}

// ── Streaming reuse ──────────────────────────────────────────────────────────

#[tokio::test]
async fn streamed_text_is_not_printed_twice() {
    let dir = tempfile::tempdir().unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());

    client.push_turn(vec![
        StreamEvent::OutputTextDelta {
            key: "msg_1:0".into(),
            delta: "streamed ".into(),
        },
        StreamEvent::OutputTextDelta {
            key: "msg_1:0".into(),
            delta: "answer".into(),
        },
        StreamEvent::OutputTextDone {
            key: "msg_1:0".into(),
            item_id: Some("msg_1".into()),
            text: "streamed answer".into(),
        },
        StreamEvent::Completed {
            response: message_response("msg_1", "streamed answer"),
        },
    ]);
    renderer.push_follow_up(None);

    engine.run_conversation("talk to me", None, true).await.unwrap();

    let full_displays = renderer.events_matching("assistant: ");
    assert!(
        full_displays.is_empty(),
        "already-streamed text must not re-print: {full_displays:#?}"
    );
    assert!(!renderer.events_matching("stream_delta: ").is_empty());
}

// ── Provider errors ──────────────────────────────────────────────────────────

#[tokio::test]
async fn provider_error_event_terminates_the_turn_with_code_1() {
    let dir = tempfile::tempdir().unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());

    client.push_turn(vec![StreamEvent::Error {
        message: "rate limited".into(),
    }]);

    let code = engine.run_conversation("prompt", None, true).await.unwrap();
    assert_eq!(code, 1);
    assert!(renderer
        .events()
        .iter()
        .any(|e| e.contains("rate limited")));
}

// ── Inline one-shot mode ─────────────────────────────────────────────────────

#[tokio::test]
async fn inline_mode_answers_once_with_readonly_tools() {
    let dir = tempfile::tempdir().unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());

    client.push_completed(message_response("m1", "the inline answer"));
    let code = engine.run_inline("what is this repo?", &[]).await.unwrap();
    assert_eq!(code, 0);
    assert_eq!(client.call_count(), 1);

    let requests = client.requests();
    let tool_names: Vec<&str> = requests[0]
        .tools
        .iter()
        .map(|t| t.name.as_str())
        .collect();
    assert_eq!(tool_names, vec!["read_file", "glob", "search_content"]);
    assert!(renderer
        .events()
        .iter()
        .any(|e| e.contains("the inline answer")));
}

#[tokio::test]
async fn inline_mode_runs_tool_rounds_then_answers() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("target.txt"), "inline payload\n").unwrap();
    let (_renderer, client, mut engine) = build_engine(dir.path());

    client.push_completed(FinalResponse {
        output: vec![OutputItem::FunctionCall {
            id: None,
            call_id: "c1".into(),
            name: "read_file".into(),
            arguments: json!({"path": "target.txt"}).to_string(),
        }],
    });
    client.push_completed(message_response("m1", "summarised"));

    let code = engine.run_inline("summarise target.txt", &[]).await.unwrap();
    assert_eq!(code, 0);
    assert_eq!(client.call_count(), 2);

    let second_input = &client.requests()[1].input;
    assert_tool_pairing(second_input);
    let output = second_input
        .iter()
        .find_map(|item| match item {
            Item::FunctionCallOutput(out) => Some(out.output.clone()),
            _ => None,
        })
        .expect("tool result fed back to the model");
    assert!(output.contains("inline payload"), "{output}");
}

#[tokio::test]
async fn inline_mode_gives_up_after_the_tool_round_limit() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("f.txt"), "x").unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());

    for i in 0..6 {
        client.push_completed(FinalResponse {
            output: vec![OutputItem::FunctionCall {
                id: None,
                call_id: format!("c{i}"),
                name: "read_file".into(),
                arguments: json!({"path": "f.txt"}).to_string(),
            }],
        });
    }

    let code = engine.run_inline("loop forever", &[]).await.unwrap();
    assert_eq!(code, 1);
    assert_eq!(client.call_count(), 6);
    assert!(renderer
        .events()
        .iter()
        .any(|e| e.contains("exceeded tool call limit")));
}

#[tokio::test]
async fn inline_scope_outside_the_repository_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());

    let code = engine
        .run_inline("explain", &[outside.path().to_path_buf()])
        .await
        .unwrap();
    assert_eq!(code, 1);
    assert_eq!(client.call_count(), 0);
    assert!(renderer
        .events()
        .iter()
        .any(|e| e.contains("Inline scope must be inside the repository.")));
}

#[tokio::test]
async fn inline_scoped_context_labels_each_scope() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    std::fs::create_dir(&src).unwrap();
    std::fs::write(src.join("lib.rs"), "pub fn f() {}\n").unwrap();
    std::fs::write(dir.path().join("notes.md"), "remember\n").unwrap();
    let (_renderer, client, mut engine) = build_engine(dir.path());

    client.push_completed(message_response("m1", "ok"));
    let scopes = vec![src.clone(), dir.path().join("notes.md")];
    let code = engine.run_inline("relate these", &scopes).await.unwrap();
    assert_eq!(code, 0);

    let first_user = client.requests()[0].input[0].as_user_text().unwrap();
    assert!(first_user.contains("## Scope: src"), "{first_user}");
    assert!(first_user.contains("## Scope: notes.md"), "{first_user}");
    assert!(first_user.contains("00001| remember"));
    assert!(first_user.contains("Inline mode: read-only"));
}

// ── Edit mode ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn edit_mode_is_blocked_while_locked() {
    let dir = tempfile::tempdir().unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());
    let target = dir.path().join("file.txt");
    std::fs::write(&target, "old").unwrap();

    let code = engine
        .run_edit(target.to_str().unwrap(), "rewrite it", None)
        .await
        .unwrap();
    assert_eq!(code, 1);
    assert_eq!(client.call_count(), 0);
    assert!(renderer
        .events()
        .iter()
        .any(|e| e.contains("I need you to say `jfdi`")));
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "old");
}

#[tokio::test]
async fn edit_mode_rewrites_the_file_after_unlock() {
    let dir = tempfile::tempdir().unwrap();
    let (_renderer, client, mut engine) = build_engine(dir.path());
    let target = dir.path().join("file.txt");
    std::fs::write(&target, "old body\n").unwrap();

    client.push_create_text("```text\nnew body\n```");
    engine.jfdi_enabled = true;
    let code = engine
        .run_edit(target.to_str().unwrap(), "please rewrite the body", None)
        .await
        .unwrap();
    assert_eq!(code, 0);
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "new body");
}

#[tokio::test]
async fn edit_mode_identical_content_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());
    let target = dir.path().join("file.txt");
    std::fs::write(&target, "same").unwrap();

    client.push_create_text("same");
    engine.jfdi_enabled = true;
    let code = engine
        .run_edit(target.to_str().unwrap(), "rewrite", None)
        .await
        .unwrap();
    assert_eq!(code, 0);
    assert!(renderer
        .events()
        .iter()
        .any(|e| e.contains("Nothing to do")));
}

#[tokio::test]
async fn edit_mode_rejection_solicits_context_and_retries_once() {
    let dir = tempfile::tempdir().unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());
    let target = dir.path().join("file.txt");
    std::fs::write(&target, "v1").unwrap();

    client.push_create_text("v2-first-try");
    client.push_create_text("v2-with-context");
    renderer.push_review_outcome(ai_render::ReviewOutcome::UserRejected);
    renderer.push_text_answer(Some("keep the header comment"));
    engine.jfdi_enabled = true;

    let code = engine
        .run_edit(target.to_str().unwrap(), "rewrite", None)
        .await
        .unwrap();
    assert_eq!(code, 0);
    assert_eq!(client.call_count(), 2);
    assert_eq!(
        std::fs::read_to_string(&target).unwrap(),
        "v2-with-context"
    );
    // The retry request carries the added context.
    let second = &client.requests()[1];
    assert!(second.input[0]
        .as_user_text()
        .unwrap()
        .contains("Additional context provided after review:\nkeep the header comment"));
}

#[tokio::test]
async fn edit_mode_empty_response_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let (renderer, _client, mut engine) = build_engine(dir.path());
    let target = dir.path().join("file.txt");
    std::fs::write(&target, "old").unwrap();

    engine.jfdi_enabled = true;
    let code = engine
        .run_edit(target.to_str().unwrap(), "rewrite", None)
        .await
        .unwrap();
    assert_eq!(code, 1);
    assert!(renderer
        .events()
        .iter()
        .any(|e| e.contains("Model returned no content")));
}

#[tokio::test]
async fn edit_mode_refuses_directories() {
    let dir = tempfile::tempdir().unwrap();
    let (renderer, client, mut engine) = build_engine(dir.path());
    engine.jfdi_enabled = true;
    let code = engine
        .run_edit(dir.path().to_str().unwrap(), "rewrite", None)
        .await
        .unwrap();
    assert_eq!(code, 1);
    assert_eq!(client.call_count(), 0);
    assert!(renderer
        .events()
        .iter()
        .any(|e| e.contains("is a directory, not a file")));
}
