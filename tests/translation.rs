mod common;

use std::time::Duration;

use common::{identity_backend, prompt_input, MapBackend, RecordingSleeper, ScriptedBackend};
use office_translator::error::{BackendError, TranslateError};
use office_translator::transfer::ExtractedDocument;
use office_translator::translate::{PromptContext, RetryPolicy, Translator};

fn hello_world() -> ExtractedDocument {
    ExtractedDocument::from_json(r#"{"slides":[{"texts":["Hello","World"]}]}"#).expect("json")
}

fn ctx() -> PromptContext {
    PromptContext {
        target_lang: "es".into(),
        ..PromptContext::default()
    }
}

fn rate_limited() -> BackendError {
    BackendError::RateLimited {
        retry_after: None,
        message: "HTTP 429".into(),
    }
}

#[test]
fn identity_backend_keeps_shape() {
    let backend = identity_backend();
    let sleeper = RecordingSleeper::default();
    let translator = Translator::new(&backend, &sleeper, RetryPolicy::default());

    let out = translator.translate(&hello_world(), &ctx()).expect("translate");
    assert_eq!(out, hello_world());
    assert_eq!(*backend.calls.borrow(), 1);
    assert!(sleeper.waits.borrow().is_empty());
}

#[test]
fn mapped_texts_come_back_in_order() {
    let backend = MapBackend::new(|s: &str| format!("[{s}]"));
    let sleeper = RecordingSleeper::default();
    let translator = Translator::new(&backend, &sleeper, RetryPolicy::default());

    let out = translator.translate(&hello_world(), &ctx()).expect("translate");
    assert_eq!(out.units[0].texts, vec!["[Hello]", "[World]"]);
}

#[test]
fn persistent_fragment_mismatch_names_the_unit() {
    let short = r#"{"slides":[{"texts":["Hola"]}]}"#.to_string();
    let backend = ScriptedBackend::new(vec![Ok(short.clone()), Ok(short.clone()), Ok(short)]);
    let sleeper = RecordingSleeper::default();
    let translator = Translator::new(&backend, &sleeper, RetryPolicy::default());

    let err = translator.translate(&hello_world(), &ctx()).expect_err("mismatch");
    match &err {
        TranslateError::FragmentCountMismatch {
            label,
            unit,
            expected,
            actual,
            samples,
            ..
        } => {
            assert_eq!((*label, *unit, *expected, *actual), ("slide", 1, 2, 1));
            assert!(samples.contains("\"Hola\""));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(err.to_string().contains("slide 1"));
    assert_eq!(backend.calls(), 3);

    // Escalating warnings on the retries, none on the first request.
    let prompts = backend.prompts.borrow();
    assert!(!prompts[0].contains("WARNING"));
    assert!(prompts[1].contains("- slide 1: 2 texts"));
    assert!(prompts[2].contains("FINAL WARNING"));
    assert_eq!(*sleeper.waits.borrow(), vec![Duration::from_secs(2); 2]);
}

#[test]
fn structure_retry_can_recover() {
    let backend = ScriptedBackend::new(vec![
        Ok(r#"{"slides":[{"texts":["Hola mundo"]}]}"#.into()),
        Ok(r#"{"slides":[{"texts":["Hola","Mundo"]}]}"#.into()),
    ]);
    let sleeper = RecordingSleeper::default();
    let translator = Translator::new(&backend, &sleeper, RetryPolicy::default());

    let out = translator.translate(&hello_world(), &ctx()).expect("second try");
    assert_eq!(out.units[0].texts, vec!["Hola", "Mundo"]);
}

#[test]
fn unit_count_mismatch_is_never_padded() {
    let empty = r#"{"slides":[]}"#.to_string();
    let backend = ScriptedBackend::new(vec![Ok(empty.clone()), Ok(empty.clone()), Ok(empty)]);
    let sleeper = RecordingSleeper::default();
    let translator = Translator::new(&backend, &sleeper, RetryPolicy::default());

    let err = translator.translate(&hello_world(), &ctx()).expect_err("mismatch");
    assert!(matches!(
        err,
        TranslateError::UnitCountMismatch {
            expected: 1,
            actual: 0,
            attempts: 3,
            ..
        }
    ));
}

#[test]
fn rate_limits_back_off_then_succeed() {
    let reply = r#"{"slides":[{"texts":["Hola","Mundo"]}]}"#.to_string();
    let backend = ScriptedBackend::new(vec![Err(rate_limited()), Err(rate_limited()), Ok(reply)]);
    let sleeper = RecordingSleeper::default();
    let translator = Translator::new(&backend, &sleeper, RetryPolicy::default());

    let out = translator.translate(&hello_world(), &ctx()).expect("third call");
    assert_eq!(out.units[0].texts, vec!["Hola", "Mundo"]);
    assert_eq!(backend.calls(), 3);
    assert_eq!(
        *sleeper.waits.borrow(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
}

#[test]
fn malformed_response_is_retried_once() {
    let backend = ScriptedBackend::new(vec![
        Ok("I'm sorry, here is the translation: Hola, Mundo".into()),
        Ok("still not json".into()),
    ]);
    let sleeper = RecordingSleeper::default();
    let translator = Translator::new(&backend, &sleeper, RetryPolicy::default());

    let err = translator.translate(&hello_world(), &ctx()).expect_err("malformed");
    assert!(matches!(err, TranslateError::MalformedResponse { attempts: 2, .. }));
    assert_eq!(backend.calls(), 2);

    let backend = ScriptedBackend::new(vec![
        Ok("{\"slides\": [".into()),
        Ok("```\n{\"slides\":[{\"texts\":[\"Hola\",\"Mundo\"]}]}\n```".into()),
    ]);
    let translator = Translator::new(&backend, &sleeper, RetryPolicy::default());
    translator.translate(&hello_world(), &ctx()).expect("recovers");
}

#[test]
fn fatal_backend_errors_stop_immediately() {
    let backend = ScriptedBackend::new(vec![Err(BackendError::Fatal("HTTP 403".into()))]);
    let sleeper = RecordingSleeper::default();
    let translator = Translator::new(&backend, &sleeper, RetryPolicy::default());

    let err = translator.translate(&hello_world(), &ctx()).expect_err("fatal");
    assert!(matches!(err, TranslateError::Backend { attempts: 1, .. }));
    assert_eq!(backend.calls(), 1);
    assert!(sleeper.waits.borrow().is_empty());
}

#[test]
fn prompt_embeds_request_json() {
    let backend = ScriptedBackend::new(vec![Ok(r#"{"slides":[{"texts":["a","b"]}]}"#.into())]);
    let sleeper = RecordingSleeper::default();
    let translator = Translator::new(&backend, &sleeper, RetryPolicy::default());
    let context = PromptContext {
        target_lang: "de".into(),
        source_lang: Some("en".into()),
        style_instructions: "STYLE-TEXT".into(),
        topic_instructions: "TOPIC-TEXT".into(),
    };
    translator.translate(&hello_world(), &context).expect("translate");

    let prompt = backend.prompts.borrow()[0].clone();
    assert!(prompt.contains("from en to de"));
    assert!(prompt.contains("STYLE-TEXT"));
    assert!(prompt.contains("TOPIC-TEXT"));
    assert_eq!(prompt_input(&prompt), hello_world());
}
