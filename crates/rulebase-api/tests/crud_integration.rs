//! End-to-end tests of the record operations against an in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rulebase_api::{ApiConfig, ApiError, ApiResponse, FinalizerFn, RecordService};
use rulebase_core::catalog::{Catalog, Collection, FieldDef, Rule, RuleAction};
use rulebase_core::query::SelectQuery;
use rulebase_core::record::Record;
use rulebase_core::security::{RateLimitRule, RateLimitSettings, RequestInfo};
use rulebase_core::store::Store;
use serde_json::{json, Map, Value as JsonValue};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn body(value: JsonValue) -> Map<String, JsonValue> {
    value.as_object().cloned().unwrap()
}

struct TestContext {
    service: RecordService,
}

impl TestContext {
    fn new(posts: Collection) -> Self {
        Self::with_config(posts, ApiConfig::new().with_throttle_soft_max(Duration::ZERO))
    }

    fn with_config(posts: Collection, config: ApiConfig) -> Self {
        init_tracing();

        let users = Collection::new_auth("users")
            .with_id("_rbc_users")
            .with_field(FieldDef::text("name"))
            .with_rule(RuleAction::View, Rule::expr("id = @request.auth.id"))
            .with_rule(RuleAction::Update, Rule::expr("@request.auth.id != ''"))
            .with_rule(RuleAction::Manage, Rule::expr("@request.auth.verified = true"));
        let posts = posts
            .with_id("_rbc_posts")
            .with_field(FieldDef::text("title"))
            .with_field(FieldDef::number("views"))
            .with_field(FieldDef::relation("owner", "_rbc_users", 1))
            .with_field(FieldDef::text("secret").hidden());
        let catalog = Arc::new(Catalog::new(vec![users, posts]).unwrap());

        let store = Store::open_in_memory().unwrap();
        for collection in catalog.iter() {
            store.sync_collection(collection).unwrap();
        }

        let ctx = Self {
            service: RecordService::new(catalog, store, config),
        };
        ctx.seed();
        ctx
    }

    fn seed(&self) {
        let users = self.collection("users");
        for (id, verified) in [("u1", true), ("u2", false)] {
            let mut user = Record::new(users.clone());
            user.set_id(id);
            user.set("email", format!("{}@example.com", id));
            user.set("verified", verified);
            user.set("password", rulebase_api::hash_password("password123").unwrap());
            user.set("tokenKey", format!("key-{}", id));
            self.store().insert(&user).unwrap();
        }

        let posts = self.collection("posts");
        for (id, title, owner) in [("p1", "Hello", "u1"), ("p2", "World", "u2")] {
            let mut post = Record::new(posts.clone());
            post.set_id(id);
            post.set("title", title);
            post.set("views", 1.0);
            post.set("owner", owner);
            post.set("secret", format!("secret-{}", id));
            self.store().insert(&post).unwrap();
        }
    }

    fn store(&self) -> &Store {
        self.service.store()
    }

    fn collection(&self, name: &str) -> Arc<Collection> {
        self.service.catalog().find(name).unwrap()
    }

    fn find(&self, collection: &str, id: &str) -> Option<Record> {
        let collection = self.collection(collection);
        self.store()
            .find_record_by_id(&collection, id, &SelectQuery::records(&collection))
            .ok()
    }

    fn post_count(&self) -> u64 {
        self.store()
            .count(&SelectQuery::records(&self.collection("posts")))
            .unwrap()
    }

    fn as_user(&self, id: &str) -> RequestInfo {
        RequestInfo::authenticated(self.find("users", id).unwrap())
    }
}

fn counting_finalizer(counter: &Arc<AtomicUsize>) -> Option<FinalizerFn> {
    let counter = counter.clone();
    Some(Box::new(move |_record: &Record| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }))
}

fn items(response: &ApiResponse) -> Vec<String> {
    response.body.as_ref().unwrap()["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_anonymous_list_with_auth_rule_is_empty() {
    let ctx = TestContext::new(
        Collection::new("posts").with_rule(RuleAction::List, Rule::expr("@request.auth.id != ''")),
    );

    let response = ctx.service.list("posts", RequestInfo::anonymous()).unwrap();
    assert_eq!(response.status, 200);
    assert!(items(&response).is_empty());
    assert_eq!(response.body.as_ref().unwrap()["totalItems"], json!(0));

    let response = ctx.service.list("posts", ctx.as_user("u2")).unwrap();
    assert_eq!(items(&response), vec!["p1", "p2"]);
}

#[test]
fn test_superuser_bypasses_locked_view_rule() {
    let ctx = TestContext::new(Collection::new("posts"));

    let response = ctx.service.view("posts", "p1", RequestInfo::superuser()).unwrap();
    assert_eq!(response.status, 200);
    let record = response.body.unwrap();
    assert_eq!(record["title"], json!("Hello"));
    assert_eq!(record["secret"], json!("secret-p1"));

    let err = ctx.service.view("posts", "p1", ctx.as_user("u1")).unwrap_err();
    assert_eq!(err.status_code(), 403);
}

#[test]
fn test_create_rule_checked_against_submitted_data() {
    let ctx = TestContext::new(
        Collection::new("posts")
            .with_rule(RuleAction::Create, Rule::expr("@request.auth.id = owner")),
    );

    let request = ctx
        .as_user("u1")
        .with_body(body(json!({"title": "Mine?", "owner": "u2"})));
    let err = ctx.service.create("posts", request, None).unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert_eq!(err.to_string(), rulebase_api::MSG_CREATE_FAILED);
    assert_eq!(ctx.post_count(), 2);

    let request = ctx
        .as_user("u1")
        .with_body(body(json!({"title": "Mine", "owner": "u1"})));
    let response = ctx.service.create("posts", request, None).unwrap();
    assert_eq!(response.status, 200);
    let created = response.body.unwrap();
    assert_eq!(created["owner"], json!("u1"));
    assert_eq!(created["id"].as_str().unwrap().len(), 15);
    assert_eq!(ctx.post_count(), 3);
}

#[test]
fn test_create_rule_errors_are_generic() {
    let ctx = TestContext::with_config(
        Collection::new("posts").with_rule(RuleAction::Create, Rule::expr("nope = 1")),
        ApiConfig::new().with_dev_mode(true),
    );

    let request = RequestInfo::anonymous().with_body(body(json!({"title": "x"})));
    let err = ctx.service.create("posts", request, None).unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert_eq!(err.to_string(), rulebase_api::MSG_CREATE_FAILED);
    assert_eq!(ctx.post_count(), 2);
}

#[test]
fn test_public_delete_rule() {
    let ctx = TestContext::new(Collection::new("posts").with_rule(RuleAction::Delete, Rule::public()));

    let response = ctx.service.delete("posts", "p2", RequestInfo::anonymous(), None).unwrap();
    assert_eq!(response.status, 204);
    assert!(response.body.is_none());
    assert!(ctx.find("posts", "p2").is_none());

    let err = ctx
        .service
        .delete("posts", "p2", RequestInfo::anonymous(), None)
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[test]
fn test_manage_rule_allows_system_field_updates() {
    let ctx = TestContext::new(Collection::new("posts"));

    let changes = |verified: bool| {
        body(json!({
            "verified": verified,
            "password": "new-password",
            "passwordConfirm": "new-password",
        }))
    };

    // u2 is not verified: no escalation, so old password and verified are rejected
    let request = ctx.as_user("u2").with_body(changes(false));
    let err = ctx.service.update("users", "u1", request, None).unwrap_err();
    match &err {
        ApiError::BadRequest { data, .. } => {
            assert!(data.contains_key("oldPassword"));
            assert!(data.contains_key("verified"));
        }
        other => panic!("unexpected error {:?}", other),
    }

    let request = ctx.as_user("u1").with_body(changes(true));
    let response = ctx.service.update("users", "u2", request, None).unwrap();
    assert_eq!(response.status, 200);
    let updated = ctx.find("users", "u2").unwrap();
    assert!(updated.get_bool("verified"));
    assert!(rulebase_api::verify_password("new-password", updated.get_str("password")));
    assert_ne!(updated.get_str("tokenKey"), "key-u2");
    assert!(response.body.unwrap().get("password").is_none());
}

#[test]
fn test_locked_rules_are_forbidden() {
    let ctx = TestContext::new(Collection::new("posts"));
    let anonymous = RequestInfo::anonymous;

    assert_eq!(ctx.service.list("posts", anonymous()).unwrap_err().status_code(), 403);
    assert_eq!(ctx.service.view("posts", "p1", anonymous()).unwrap_err().status_code(), 403);
    assert_eq!(ctx.service.create("posts", anonymous(), None).unwrap_err().status_code(), 403);
    assert_eq!(
        ctx.service.update("posts", "p1", anonymous(), None).unwrap_err().status_code(),
        403
    );
    assert_eq!(
        ctx.service.delete("posts", "p1", anonymous(), None).unwrap_err().status_code(),
        403
    );
    assert_eq!(ctx.service.list("missing", anonymous()).unwrap_err().status_code(), 404);
}

#[test]
fn test_filtered_and_missing_records_look_the_same() {
    let ctx = TestContext::new(
        Collection::new("posts").with_rule(RuleAction::View, Rule::expr("owner = @request.auth.id")),
    );

    let response = ctx.service.view("posts", "p1", ctx.as_user("u1")).unwrap();
    assert_eq!(response.status, 200);
    assert!(response.body.unwrap().get("secret").is_none());

    let forbidden = ctx.service.view("posts", "p2", ctx.as_user("u1")).unwrap_err();
    let missing = ctx.service.view("posts", "nope", ctx.as_user("u1")).unwrap_err();
    assert_eq!(forbidden.to_response(true), missing.to_response(true));
    assert_eq!(forbidden.status_code(), 404);
}

#[test]
fn test_invalid_client_filters() {
    let ctx = TestContext::new(Collection::new("posts").with_rule(RuleAction::List, Rule::public()));

    for filter in [
        "title = ",
        "unknown = 1",
        "secret = 'secret-p1'",
        "@collection.users.id != ''",
        "@request.auth.id = ''",
    ] {
        let request = RequestInfo::anonymous().with_query_param("filter", filter);
        let err = ctx.service.list("posts", request).unwrap_err();
        assert_eq!(err.status_code(), 400, "filter {:?}", filter);
    }

    let request = RequestInfo::superuser().with_query_param("filter", "secret = 'secret-p1'");
    let response = ctx.service.list("posts", request).unwrap();
    assert_eq!(items(&response), vec!["p1"]);
}

#[test]
fn test_list_paging_and_sorting() {
    let ctx = TestContext::new(Collection::new("posts").with_rule(RuleAction::List, Rule::public()));

    let request = RequestInfo::anonymous()
        .with_query_param("sort", "-title")
        .with_query_param("perPage", "1")
        .with_query_param("page", "2");
    let response = ctx.service.list("posts", request).unwrap();
    let envelope = response.body.as_ref().unwrap();
    assert_eq!(envelope["page"], json!(2));
    assert_eq!(envelope["perPage"], json!(1));
    assert_eq!(envelope["totalItems"], json!(2));
    assert_eq!(envelope["totalPages"], json!(2));
    assert_eq!(items(&response), vec!["p1"]);
}

#[test]
fn test_empty_filtered_list_with_timing_delay() {
    let config = ApiConfig::new()
        .with_throttle_soft_max(Duration::from_millis(5))
        .with_list_timing_rule(1, 60);
    let ctx = TestContext::with_config(
        Collection::new("posts").with_rule(RuleAction::List, Rule::expr("owner = @request.auth.id")),
        config,
    );

    for _ in 0..3 {
        let request = ctx.as_user("u1").with_query_param("filter", "title = 'nothing'");
        let response = ctx.service.list("posts", request).unwrap();
        assert_eq!(response.status, 200);
        assert!(items(&response).is_empty());
    }
}

#[test]
fn test_finalizer_runs_once_on_success() {
    let ctx = TestContext::new(Collection::new("posts").with_all_rules(Rule::public()));
    let calls = Arc::new(AtomicUsize::new(0));

    let request = RequestInfo::anonymous().with_body(body(json!({"title": "new"})));
    ctx.service.create("posts", request, counting_finalizer(&calls)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let request = RequestInfo::anonymous().with_body(body(json!({"views+": 2})));
    let response = ctx.service.update("posts", "p1", request, counting_finalizer(&calls)).unwrap();
    assert_eq!(response.body.unwrap()["views"], json!(3.0));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    ctx.service
        .delete("posts", "p1", RequestInfo::anonymous(), counting_finalizer(&calls))
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_stopped_chain_still_finalizes_once() {
    let ctx = TestContext::new(Collection::new("posts").with_all_rules(Rule::public()));
    let calls = Arc::new(AtomicUsize::new(0));

    ctx.service.hooks().on_record_create_request.bind_fn(|_e, _next| Ok(()));
    ctx.service.hooks().on_record_delete_request.bind_fn(|_e, _next| Ok(()));

    let request = RequestInfo::anonymous().with_body(body(json!({"title": "new"})));
    let response = ctx.service.create("posts", request, counting_finalizer(&calls)).unwrap();
    assert_eq!(response.status, 204);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.post_count(), 2);

    let response = ctx
        .service
        .delete("posts", "p1", RequestInfo::anonymous(), counting_finalizer(&calls))
        .unwrap();
    assert_eq!(response.status, 204);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(ctx.find("posts", "p1").is_some());
}

#[test]
fn test_hook_error_skips_finalizer() {
    let ctx = TestContext::new(Collection::new("posts").with_all_rules(Rule::public()));
    let calls = Arc::new(AtomicUsize::new(0));

    ctx.service
        .hooks()
        .on_record_update_request
        .bind_fn(|_e, _next| Err(ApiError::bad_request("rejected by hook")));

    let request = RequestInfo::anonymous().with_body(body(json!({"title": "changed"})));
    let err = ctx
        .service
        .update("posts", "p1", request, counting_finalizer(&calls))
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(ctx.find("posts", "p1").unwrap().get_str("title"), "Hello");
}

#[test]
fn test_hooks_can_rewrite_the_response() {
    let ctx = TestContext::new(Collection::new("posts").with_all_rules(Rule::public()));

    ctx.service.hooks().on_record_view_request.bind_fn(|e, next| {
        e.record.set("title", "Rewritten");
        next.run(e)
    });
    ctx.service.hooks().on_records_list_request.bind_fn(|e, next| {
        next.run(e)?;
        if let Some(body) = e.response.as_mut().and_then(|r| r.body.as_mut()) {
            body["hooked"] = json!(true);
        }
        Ok(())
    });

    let response = ctx.service.view("posts", "p1", RequestInfo::anonymous()).unwrap();
    assert_eq!(response.body.unwrap()["title"], json!("Rewritten"));

    let response = ctx.service.list("posts", RequestInfo::anonymous()).unwrap();
    assert_eq!(response.body.unwrap()["hooked"], json!(true));
}

#[test]
fn test_hidden_fields_are_not_writable_by_clients() {
    let ctx = TestContext::new(Collection::new("posts").with_all_rules(Rule::public()));

    let request = RequestInfo::anonymous().with_body(body(json!({"title": "t", "secret": "leak"})));
    let response = ctx.service.create("posts", request, None).unwrap();
    let id = response.body.unwrap()["id"].as_str().unwrap().to_string();
    assert_eq!(ctx.find("posts", &id).unwrap().get_str("secret"), "");

    let request = RequestInfo::superuser().with_body(body(json!({"secret": "set"})));
    ctx.service.update("posts", &id, request, None).unwrap();
    assert_eq!(ctx.find("posts", &id).unwrap().get_str("secret"), "set");
}

#[test]
fn test_auth_email_visibility() {
    let ctx = TestContext::new(Collection::new("posts"));

    let response = ctx.service.view("users", "u1", ctx.as_user("u1")).unwrap();
    assert_eq!(response.body.unwrap()["email"], json!("u1@example.com"));

    let response = ctx.service.view("users", "u2", RequestInfo::superuser()).unwrap();
    let user = response.body.unwrap();
    assert_eq!(user["email"], json!("u2@example.com"));
    assert!(user.get("tokenKey").is_some());

    let err = ctx.service.view("users", "u2", ctx.as_user("u1")).unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[test]
fn test_collection_rate_limit() {
    let settings = RateLimitSettings {
        enabled: true,
        rules: vec![RateLimitRule::new("posts:list", 2, 60)],
    };
    let config = ApiConfig::new().with_rate_limits(settings);
    let ctx = TestContext::with_config(
        Collection::new("posts").with_rule(RuleAction::List, Rule::public()),
        config,
    );

    for _ in 0..2 {
        ctx.service.list("posts", RequestInfo::anonymous()).unwrap();
    }
    let err = ctx.service.list("posts", RequestInfo::anonymous()).unwrap_err();
    assert_eq!(err.status_code(), 429);

    let other_ip = RequestInfo::anonymous().with_remote_ip("10.0.0.2");
    assert!(ctx.service.list("posts", other_ip).is_ok());
    assert!(ctx.service.list("posts", RequestInfo::superuser()).is_ok());
}
