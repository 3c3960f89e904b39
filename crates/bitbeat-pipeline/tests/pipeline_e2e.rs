//! End-to-end pipeline integration tests.
//!
//! These tests run complete actions through all four stages:
//!
//! 1. Validation - merge, defaults, required/type/validator checks
//! 2. Format - formatter write-back
//! 3. Execution - accept negotiation, before_run hooks, action body
//! 4. Output - after_run hooks, strict output filtering

use bitbeat_core::{
    Action, ActionDefinition, ActionError, ActionMiddleware, ActionResult, BoxFuture,
    ErrorCategory, FieldSchema, FnAction, RequestContext,
};
use bitbeat_pipeline::Pipeline;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts how often the action body ran.
fn counting_action(definition: ActionDefinition, runs: &Arc<AtomicUsize>) -> Arc<dyn Action> {
    let runs = Arc::clone(runs);
    Arc::new(FnAction::from_sync(definition, move |ctx| {
        runs.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Value::Object(ctx.params().clone())))
    }))
}

/// Records the hook sequence into the result under `trail`.
struct Trail(&'static str);

impl Trail {
    fn push(ctx: &mut RequestContext, entry: String) {
        let mut trail = match ctx.result_mut()["trail"].take() {
            Value::Array(items) => items,
            _ => Vec::new(),
        };
        trail.push(json!(entry));
        ctx.result_mut()["trail"] = Value::Array(trail);
    }
}

impl ActionMiddleware for Trail {
    fn name(&self) -> &'static str {
        self.0
    }

    fn before_run<'a>(
        &'a self,
        _action: &'a ActionDefinition,
        ctx: &'a mut RequestContext,
    ) -> BoxFuture<'a, ActionResult<()>> {
        Box::pin(async move {
            Self::push(ctx, format!("before:{}", self.0));
            Ok(())
        })
    }

    fn after_run<'a>(
        &'a self,
        _action: &'a ActionDefinition,
        ctx: &'a mut RequestContext,
    ) -> BoxFuture<'a, ActionResult<()>> {
        Box::pin(async move {
            Self::push(ctx, format!("after:{}", self.0));
            Ok(())
        })
    }
}

#[tokio::test]
async fn missing_required_input_rejects_before_action_body() {
    let runs = Arc::new(AtomicUsize::new(0));
    let action = counting_action(
        ActionDefinition::builder("hello")
            .input("name", FieldSchema::string().required())
            .build(),
        &runs,
    );
    let pipeline = Pipeline::for_action(action);

    let mut ctx = RequestContext::builder().build();
    let err = pipeline.process(&mut ctx).await.unwrap_err();

    assert!(matches!(err, ActionError::MissingRequiredInput { .. }));
    assert_eq!(err.category(), ErrorCategory::ClientInput);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn default_fills_absent_but_keeps_zero() {
    let runs = Arc::new(AtomicUsize::new(0));
    let action = counting_action(
        ActionDefinition::builder("list")
            .input("count", FieldSchema::number().default_value(5))
            .build(),
        &runs,
    );
    let pipeline = Pipeline::for_action(action);

    let mut absent = RequestContext::builder().build();
    pipeline.process(&mut absent).await.unwrap();
    assert_eq!(absent.param("count"), Some(&json!(5)));

    let mut zero = RequestContext::builder().body_param("count", json!(0)).build();
    pipeline.process(&mut zero).await.unwrap();
    assert_eq!(zero.param("count"), Some(&json!(0)));
    assert_eq!(zero.result()["count"], json!(0));

    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rejecting_validator_fails_even_when_types_match() {
    let runs = Arc::new(AtomicUsize::new(0));
    let action = counting_action(
        ActionDefinition::builder("guarded")
            .input(
                "code",
                FieldSchema::string()
                    .required()
                    .validator(|_, _| Err("rejected".to_string())),
            )
            .build(),
        &runs,
    );
    let pipeline = Pipeline::for_action(action);

    let mut ctx = RequestContext::builder().body_param("code", json!("abc")).build();
    let err = pipeline.process(&mut ctx).await.unwrap_err();

    assert_eq!(err.code(), "VALIDATION_FAILED");
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn strict_output_missing_required_field_fails() {
    let action: Arc<dyn Action> = Arc::new(FnAction::from_sync(
        ActionDefinition::builder("login")
            .output_strict(true)
            .output("token", FieldSchema::string().required())
            .build(),
        |_| Ok(None),
    ));
    let pipeline = Pipeline::for_action(action);

    let mut ctx = RequestContext::builder().build();
    let err = pipeline.process(&mut ctx).await.unwrap_err();

    assert!(matches!(err, ActionError::MissingRequiredOutput { ref field } if field == "token"));
    assert_eq!(err.category(), ErrorCategory::ServerProcessing);
}

#[tokio::test]
async fn formatter_failure_is_server_processing_error() {
    let runs = Arc::new(AtomicUsize::new(0));
    let action = counting_action(
        ActionDefinition::builder("fmt")
            .input(
                "value",
                FieldSchema::string().formatter(|_, _| anyhow::bail!("formatter bug")),
            )
            .build(),
        &runs,
    );
    let pipeline = Pipeline::for_action(action);

    let mut ctx = RequestContext::builder().body_param("value", json!("x")).build();
    let err = pipeline.process(&mut ctx).await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::ServerProcessing);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn middleware_wraps_action_in_order() {
    let action: Arc<dyn Action> = Arc::new(FnAction::from_sync(
        ActionDefinition::builder("wrapped")
            .middleware(Trail("auth"))
            .middleware(Trail("audit"))
            .build(),
        |ctx| {
            Trail::push(ctx, "body".to_string());
            Ok(None)
        },
    ));
    let pipeline = Pipeline::for_action(action);

    let mut ctx = RequestContext::builder().build();
    pipeline.process(&mut ctx).await.unwrap();

    assert_eq!(
        ctx.result()["trail"],
        json!([
            "before:auth",
            "before:audit",
            "body",
            "after:auth",
            "after:audit"
        ])
    );
}

#[tokio::test]
async fn returned_payload_replaces_result_before_after_run() {
    let action: Arc<dyn Action> = Arc::new(FnAction::from_sync(
        ActionDefinition::builder("shaped")
            .output_strict(true)
            .output("trail", FieldSchema::object())
            .output("value", FieldSchema::number().required())
            .middleware(Trail("post"))
            .build(),
        |_| Ok(Some(json!({"value": 7, "internal": "hidden"}))),
    ));
    let pipeline = Pipeline::for_action(action);

    let mut ctx = RequestContext::builder().build();
    pipeline.process(&mut ctx).await.unwrap();

    assert_eq!(
        ctx.result(),
        &json!({"trail": ["after:post"], "value": 7})
    );
}

#[tokio::test]
async fn query_values_coerced_and_body_wins() {
    let runs = Arc::new(AtomicUsize::new(0));
    let action = counting_action(
        ActionDefinition::builder("search")
            .input("page", FieldSchema::number().required())
            .input("exact", FieldSchema::boolean().default_value(false))
            .input("q", FieldSchema::string().required())
            .build(),
        &runs,
    );
    let pipeline = Pipeline::for_action(action);

    let mut ctx = RequestContext::builder()
        .path_param("q", json!("from-path"))
        .query_param("page", json!("3"))
        .query_param("exact", json!("true"))
        .query_param("q", json!("from-query"))
        .body_param("q", json!("from-body"))
        .build();
    pipeline.process(&mut ctx).await.unwrap();

    assert_eq!(
        ctx.result(),
        &json!({"q": "from-body", "page": 3, "exact": true})
    );
}

#[tokio::test]
async fn strict_accept_mismatch_is_client_error() {
    let runs = Arc::new(AtomicUsize::new(0));
    let action = counting_action(
        ActionDefinition::builder("json-only").strict(true).build(),
        &runs,
    );
    let pipeline = Pipeline::for_action(action);

    let mut ctx = RequestContext::builder()
        .header("accept", "text/csv")
        .build();
    let err = pipeline.process(&mut ctx).await.unwrap_err();

    assert_eq!(err.code(), "ACCEPT_TYPE_MISMATCH");
    assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}
