//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::transition::*;
use super::*;
use crate::catalog::{StyleCatalog, STYLE_NAMES};
use proptest::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

const USER: UserId = 7;

fn test_context() -> SessionContext {
    SessionContext::new(
        USER,
        70,
        PathBuf::from("/work/7_content.jpg"),
        Arc::new(StyleCatalog::new("/styles")),
    )
}

fn has_effect(effects: &[Effect], pred: impl Fn(&Effect) -> bool) -> bool {
    effects.iter().any(pred)
}

fn position(effects: &[Effect], pred: impl Fn(&Effect) -> bool) -> Option<usize> {
    effects.iter().position(pred)
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        Just(Command::Start),
        Just(Command::Help),
        Just(Command::About),
        Just(Command::Reset),
        Just(Command::Stylization),
        Just(Command::Painting),
        "[a-z]{1,10}".prop_map(|name| Command::parse(&name)),
    ]
}

fn arb_style_name() -> impl Strategy<Value = String> {
    prop_oneof![
        proptest::sample::select(STYLE_NAMES.to_vec()).prop_map(String::from),
        "[a-z_]{1,12}",
    ]
}

fn arb_action() -> impl Strategy<Value = CallbackAction> {
    prop_oneof![
        arb_style_name().prop_map(CallbackAction::Navigate),
        Just(CallbackAction::Ignore),
        Just(CallbackAction::Accept),
        "[a-z:_]{0,12}".prop_map(CallbackAction::Unknown),
    ]
}

fn arb_job_id() -> impl Strategy<Value = String> {
    "[0-9]{1,3}-[0-9]{1,3}-[0-9]{1,4}"
}

fn arb_outcome() -> impl Strategy<Value = JobOutcome> {
    prop_oneof![
        (0.0f64..120.0).prop_map(|elapsed_secs| JobOutcome::Rendered {
            jpeg: vec![0xff, 0xd8, 0xff],
            elapsed_secs,
        }),
        "[a-zA-Z ]{1,30}".prop_map(|error| JobOutcome::Failed { error }),
    ]
}

fn arb_photo() -> impl Strategy<Value = Option<PhotoRef>> {
    proptest::option::of("[A-Za-z0-9_-]{4,16}".prop_map(|file_id| PhotoRef { file_id }))
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        (arb_command(), 1i64..10_000).prop_map(|(command, message_id)| Event::Command {
            command,
            message_id,
        }),
        (
            "[a-z0-9]{4,8}",
            proptest::option::of(1i64..10_000),
            arb_action()
        )
            .prop_map(|(callback_id, message_id, action)| Event::Callback {
                callback_id,
                message_id,
                action,
            }),
        (1i64..10_000, arb_photo())
            .prop_map(|(message_id, photo)| Event::Message { message_id, photo }),
        (arb_job_id(), arb_outcome())
            .prop_map(|(job_id, outcome)| Event::JobFinished { job_id, outcome }),
        "[a-z ]{1,20}".prop_map(|message| Event::StorageFailed { message }),
    ]
}

fn arb_running_state() -> impl Strategy<Value = BotState> {
    prop_oneof![
        arb_job_id().prop_map(|job_id| BotState::RunningStyleJob { job_id }),
        arb_job_id().prop_map(|job_id| BotState::RunningPaintJob { job_id }),
    ]
}

fn arb_state() -> impl Strategy<Value = BotState> {
    prop_oneof![
        Just(BotState::Idle),
        Just(BotState::SelectingStyle),
        Just(BotState::AwaitingContentImage),
        Just(BotState::AwaitingContentImageGnst),
        arb_running_state(),
    ]
}

fn arb_session() -> impl Strategy<Value = Session> {
    (arb_state(), proptest::option::of(arb_style_name())).prop_map(|(state, style)| Session {
        user_id: USER,
        state,
        scratch: Scratch {
            style_path: style.map(|name| PathBuf::from(format!("/styles/{name}.jpg"))),
        },
    })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    // Reset from any state returns to Idle and cleans up exactly this user
    #[test]
    fn prop_reset_always_returns_to_idle(session in arb_session(), message_id in 1i64..10_000) {
        let event = Event::Command { command: Command::Reset, message_id };
        let result = transition(&session, &test_context(), event).unwrap();

        prop_assert_eq!(&result.new_session, &Session::idle(USER));
        prop_assert!(has_effect(&result.effects, |e| matches!(e, Effect::PurgeUserFiles)));
        prop_assert!(matches!(result.effects.last(), Some(Effect::ClearSession)));
    }

    // Job-bearing states never accept another upload
    #[test]
    fn prop_running_rejects_uploads(
        state in arb_running_state(),
        message_id in 1i64..10_000,
        photo in arb_photo()
    ) {
        let session = Session::idle(USER).with_state(state);
        let result = transition(&session, &test_context(), Event::Message { message_id, photo });
        prop_assert_eq!(result.unwrap_err(), TransitionError::JobInFlight);
    }

    // Every state change is written to (or removed from) the store
    #[test]
    fn prop_state_changes_are_stored(session in arb_session(), event in arb_event()) {
        if let Ok(result) = transition(&session, &test_context(), event) {
            if result.new_session != session {
                prop_assert!(
                    has_effect(&result.effects, Effect::is_session_write),
                    "Session changed without a store write: {:?} -> {:?}",
                    session.state,
                    result.new_session.state
                );
            }
        }
    }

    // The session is cleared exactly when a flow ends
    #[test]
    fn prop_clear_only_when_returning_to_idle(session in arb_session(), event in arb_event()) {
        if let Ok(result) = transition(&session, &test_context(), event) {
            let cleared = has_effect(&result.effects, |e| matches!(e, Effect::ClearSession));
            if cleared {
                prop_assert!(result.new_session.is_idle());
            }
            if !session.is_idle() && result.new_session.is_idle() {
                prop_assert!(cleared, "Left {:?} without clearing", session.state);
            }
        }
    }

    // Jobs are only submitted when entering a running state, after the upload is stored
    #[test]
    fn prop_submit_only_when_entering_running(session in arb_session(), event in arb_event()) {
        if let Ok(result) = transition(&session, &test_context(), event) {
            let submit = position(&result.effects, |e| matches!(e, Effect::SubmitJob { .. }));
            let entered_running = !session.state.is_running() && result.new_session.state.is_running();
            prop_assert_eq!(submit.is_some(), entered_running);

            if let Some(submit) = submit {
                prop_assert!(session.state.is_awaiting_content());
                let store = position(&result.effects, |e| matches!(e, Effect::StoreContent { .. }));
                prop_assert!(store.is_some_and(|store| store < submit));
                let Effect::SubmitJob { job } = &result.effects[submit] else { unreachable!() };
                prop_assert_eq!(result.new_session.state.running_job(), Some(job.job_id.as_str()));
                prop_assert_eq!(Some(job.flow), session.state.flow());
            }
        }
    }

    // The matching completion always ends the flow with exactly one report
    #[test]
    fn prop_matching_completion_returns_to_idle(state in arb_running_state(), outcome in arb_outcome()) {
        let job_id = state.running_job().unwrap().to_string();
        let rendered = matches!(outcome, JobOutcome::Rendered { .. });
        let session = Session::idle(USER).with_state(state);

        let result = transition(&session, &test_context(), Event::JobFinished { job_id, outcome }).unwrap();

        prop_assert!(result.new_session.is_idle());
        let deliveries = result.effects.iter().filter(|e| matches!(e, Effect::DeliverResult { .. })).count();
        prop_assert_eq!(deliveries, usize::from(rendered));
        prop_assert_eq!(
            has_effect(&result.effects, |e| matches!(e, Effect::SendText { text, .. } if text == JOB_FAILED_TEXT)),
            !rendered
        );
        prop_assert!(has_effect(&result.effects, |e| matches!(e, Effect::PurgeUserFiles)));
    }

    // Completions for any other job change nothing
    #[test]
    fn prop_other_completions_are_stale(
        session in arb_session(),
        job_id in arb_job_id(),
        outcome in arb_outcome()
    ) {
        prop_assume!(session.state.running_job() != Some(job_id.as_str()));
        let result = transition(&session, &test_context(), Event::JobFinished { job_id: job_id.clone(), outcome });
        prop_assert_eq!(result.unwrap_err(), TransitionError::StaleJob(job_id));
    }

    // Starting from Idle, any event sequence keeps the session consistent
    #[test]
    fn prop_sequences_keep_session_consistent(events in proptest::collection::vec(arb_event(), 0..30)) {
        let ctx = test_context();
        let mut session = Session::idle(USER);

        for event in events {
            if let Ok(result) = transition(&session, &ctx, event) {
                session = result.new_session;
                prop_assert_eq!(session.user_id, USER);

                // Stylization always carries a catalog style once browsing starts
                if session.state.flow() == Some(Flow::Stylization) {
                    let style = session.scratch.style_path.as_ref();
                    prop_assert!(
                        STYLE_NAMES.iter().any(|name| Some(&ctx.catalog.path_of(name)) == style),
                        "Unexpected style {:?} in {:?}",
                        style,
                        session.state
                    );
                }
                if session.is_idle() {
                    prop_assert_eq!(&session.scratch, &Scratch::default());
                }
            }
        }
    }

    // Navigating to a catalog style selects it without leaving the menu
    #[test]
    fn prop_navigation_selects_style(name in proptest::sample::select(STYLE_NAMES.to_vec())) {
        let ctx = test_context();
        let session = Session::idle(USER).with_state(BotState::SelectingStyle);
        let event = Event::Callback {
            callback_id: "cb".to_string(),
            message_id: Some(3),
            action: CallbackAction::Navigate(name.to_string()),
        };

        let result = transition(&session, &ctx, event).unwrap();

        prop_assert_eq!(&result.new_session.state, &BotState::SelectingStyle);
        prop_assert_eq!(result.new_session.scratch.style_path, Some(ctx.catalog.path_of(name)));
        let edited = has_effect(&result.effects, |e| matches!(e, Effect::EditMenu { message_id: 3, .. }));
        prop_assert!(edited);
    }
}
