//! Record upsert form: loads submitted data into a record, validates it and
//! persists it.

use crate::error::{ApiError, ApiResult};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use rulebase_core::catalog::FieldKind;
use rulebase_core::query::format_datetime;
use rulebase_core::record::{generate_id, random_string, Record, ID_LENGTH};
use rulebase_core::store::Store;
use serde_json::{Map, Value as JsonValue};

/// Message of every validation failure; per-field details go to `data`.
pub const MSG_INVALID_DATA: &str = "Failed to validate the submitted data.";

/// Minimum length of auth record passwords.
pub const MIN_PASSWORD_LENGTH: usize = 8;

const TOKEN_KEY_LENGTH: usize = 50;

/// Loads, validates and saves one record.
#[derive(Debug, Default)]
pub struct RecordUpsert {
    /// Stored state of the record for updates.
    original: Option<Record>,
    password: Option<String>,
    password_confirm: Option<String>,
    old_password: Option<String>,
    superuser: bool,
    manager: bool,
}

impl RecordUpsert {
    pub fn for_create() -> Self {
        Self::default()
    }

    pub fn for_update(original: Record) -> Self {
        Self {
            original: Some(original),
            ..Self::default()
        }
    }

    pub fn is_new(&self) -> bool {
        self.original.is_none()
    }

    /// Allow changing fields reserved for superusers.
    pub fn grant_superuser_access(&mut self) {
        self.superuser = true;
    }

    /// Allow changing auth fields (email, verified, password without the old
    /// one) for callers that satisfy the manage rule.
    pub fn grant_manager_access(&mut self) {
        self.manager = true;
    }

    pub fn has_manage_access(&self) -> bool {
        self.superuser || self.manager
    }

    /// Apply submitted data to `record`.
    ///
    /// Password related keys of auth collections are kept by the form and
    /// never assigned to the record directly.
    pub fn load(&mut self, record: &mut Record, mut data: Map<String, JsonValue>) {
        if record.collection().is_auth() {
            self.password = take_string(&mut data, "password");
            self.password_confirm = take_string(&mut data, "passwordConfirm");
            self.old_password = take_string(&mut data, "oldPassword");
        }
        if !self.is_new() {
            data.remove("id");
        }
        record.load(&data);
    }

    /// Validate `record` against its schema and the access grants.
    pub fn validate(&self, record: &Record) -> ApiResult<()> {
        let mut errors = Vec::new();

        for (field, value) in record.fields() {
            match &field.kind {
                FieldKind::Autodate { .. } | FieldKind::Password => continue,
                _ if field.name == "id" => {
                    if self.is_new() && !value.is_empty() && !is_valid_id(record.id()) {
                        errors.push((
                            "id",
                            "validation_invalid_id",
                            format!("Must be {} lowercase alphanumeric characters.", ID_LENGTH),
                        ));
                    }
                    continue;
                }
                _ if field.name == "tokenKey" => continue,
                FieldKind::Select { values, max_select } => {
                    let items = value.to_list();
                    if let Some(bad) = items.iter().find(|item| !values.contains(item)) {
                        errors.push((
                            field.name.as_str(),
                            "validation_invalid_value",
                            format!("Invalid value {}.", bad),
                        ));
                    } else if items.len() > *max_select {
                        errors.push((
                            field.name.as_str(),
                            "validation_too_many_values",
                            format!("Select no more than {}.", max_select),
                        ));
                    }
                }
                FieldKind::Relation { max_select, .. } | FieldKind::File { max_select, .. } => {
                    if value.to_list().len() > *max_select {
                        errors.push((
                            field.name.as_str(),
                            "validation_too_many_values",
                            format!("Select no more than {}.", max_select),
                        ));
                    }
                }
                FieldKind::Email => {
                    let email = value.as_str().unwrap_or_default();
                    if !email.is_empty() && !is_valid_email(email) {
                        errors.push((
                            field.name.as_str(),
                            "validation_invalid_email",
                            "Must be a valid email address.".to_string(),
                        ));
                    }
                }
                _ => {}
            }

            if field.required && value.is_empty() {
                errors.push((
                    field.name.as_str(),
                    "validation_required",
                    "Missing required value.".to_string(),
                ));
            }
        }

        if record.collection().is_auth() {
            self.validate_auth(record, &mut errors);
        }

        if errors.is_empty() {
            return Ok(());
        }
        Err(errors.into_iter().fold(
            ApiError::bad_request(MSG_INVALID_DATA),
            |err, (field, code, message)| err.with_field_error(field, code, &message),
        ))
    }

    fn validate_auth<'r>(&self, record: &'r Record, errors: &mut Vec<(&'r str, &'static str, String)>) {
        let manage = self.has_manage_access();

        let original_verified = self
            .original
            .as_ref()
            .map(|o| o.get_bool("verified"))
            .unwrap_or(false);
        if !manage && record.get_bool("verified") != original_verified {
            errors.push((
                "verified",
                "validation_manage_only",
                "Only superusers and managers can change the verified state.".to_string(),
            ));
        }

        if let Some(original) = &self.original {
            if !manage && record.get_str("email") != original.get_str("email") {
                errors.push((
                    "email",
                    "validation_manage_only",
                    "Only superusers and managers can change the email directly.".to_string(),
                ));
            }
        }

        let Some(password) = &self.password else {
            if self.is_new() {
                errors.push((
                    "password",
                    "validation_required",
                    "Missing required value.".to_string(),
                ));
            }
            return;
        };

        if password.chars().count() < MIN_PASSWORD_LENGTH {
            errors.push((
                "password",
                "validation_length_out_of_range",
                format!("Must be at least {} characters.", MIN_PASSWORD_LENGTH),
            ));
        }
        if self.password_confirm.as_deref() != Some(password.as_str()) {
            errors.push((
                "passwordConfirm",
                "validation_values_mismatch",
                "Values don't match.".to_string(),
            ));
        }

        if let Some(original) = &self.original {
            let confirmed = self
                .old_password
                .as_deref()
                .is_some_and(|old| verify_password(old, original.get_str("password")));
            if !manage && !confirmed {
                errors.push((
                    "oldPassword",
                    "validation_invalid_old_password",
                    "Missing or invalid old password.".to_string(),
                ));
            }
        }
    }

    /// Validate, fill in server-controlled fields and persist `record`.
    pub fn submit(&self, store: &Store, record: &mut Record) -> ApiResult<()> {
        self.validate(record)?;

        let now = format_datetime(Utc::now());
        if self.is_new() && record.id().is_empty() {
            record.set_id(generate_id());
        }
        let autodates: Vec<String> = record
            .fields()
            .filter(|(field, _)| match field.kind {
                FieldKind::Autodate { on_create, on_update } => {
                    (self.is_new() && on_create) || (!self.is_new() && on_update)
                }
                _ => false,
            })
            .map(|(field, _)| field.name.clone())
            .collect();
        for name in autodates {
            record.set(name, now.clone());
        }

        if record.collection().is_auth() {
            if let Some(password) = &self.password {
                record.set("password", hash_password(password)?);
                record.set("tokenKey", random_string(TOKEN_KEY_LENGTH));
            } else if record.get_str("tokenKey").is_empty() {
                record.set("tokenKey", random_string(TOKEN_KEY_LENGTH));
            }
        }

        if self.is_new() {
            store.insert(record)?;
        } else {
            store.update(record)?;
        }
        Ok(())
    }
}

fn take_string(data: &mut Map<String, JsonValue>, key: &str) -> Option<String> {
    match data.remove(key)? {
        JsonValue::String(s) => Some(s),
        JsonValue::Null => None,
        other => Some(other.to_string()),
    }
}

fn is_valid_id(id: &str) -> bool {
    id.len() == ID_LENGTH
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

/// Hash a password with Argon2id.
pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))
}

/// Check a password against a stored Argon2 hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rulebase_core::catalog::{Collection, FieldDef};
    use serde_json::json;
    use std::sync::Arc;

    fn map(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap()
    }

    fn field_error(err: &ApiError, field: &str) -> Option<String> {
        match err {
            ApiError::BadRequest { data, .. } => data
                .get(field)
                .and_then(|e| e["code"].as_str())
                .map(str::to_string),
            _ => None,
        }
    }

    fn users() -> Arc<Collection> {
        Arc::new(Collection::new_auth("users").with_field(FieldDef::text("name").required()))
    }

    #[test]
    fn test_password_hashing() {
        let hash = hash_password("secret-password").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("secret-password", &hash));
        assert!(!verify_password("wrong-password", &hash));
        assert!(!verify_password("secret-password", "not-a-hash"));
    }

    #[test]
    fn test_select_validation() {
        let posts = Arc::new(
            Collection::new("posts").with_field(FieldDef::select("tags", &["a", "b"], 1)),
        );
        let mut record = Record::new(posts);
        let mut form = RecordUpsert::for_create();
        form.load(&mut record, map(json!({"tags": "z"})));
        let err = form.validate(&record).unwrap_err();
        assert_eq!(field_error(&err, "tags").as_deref(), Some("validation_invalid_value"));
    }

    #[test]
    fn test_custom_id_format() {
        let posts = Arc::new(Collection::new("posts"));
        let mut record = Record::new(posts);
        let mut form = RecordUpsert::for_create();
        form.load(&mut record, map(json!({"id": "Not Valid"})));
        let err = form.validate(&record).unwrap_err();
        assert_eq!(field_error(&err, "id").as_deref(), Some("validation_invalid_id"));
    }

    #[test]
    fn test_auth_create_requirements() {
        let mut record = Record::new(users());
        let mut form = RecordUpsert::for_create();
        form.load(
            &mut record,
            map(json!({"email": "a@example.com", "password": "short", "passwordConfirm": "other", "verified": true})),
        );
        let err = form.validate(&record).unwrap_err();
        assert_eq!(field_error(&err, "name").as_deref(), Some("validation_required"));
        assert_eq!(
            field_error(&err, "password").as_deref(),
            Some("validation_length_out_of_range")
        );
        assert_eq!(
            field_error(&err, "passwordConfirm").as_deref(),
            Some("validation_values_mismatch")
        );
        assert_eq!(field_error(&err, "verified").as_deref(), Some("validation_manage_only"));
        assert_eq!(record.get_str("password"), "");
    }

    #[test]
    fn test_update_requires_old_password_without_manage_access() {
        let mut original = Record::new(users());
        original.set_id("abcdefghijklmno");
        original.set("name", "Ann");
        original.set("email", "ann@example.com");
        original.set("password", hash_password("old-password").unwrap());

        let data = json!({"password": "new-password", "passwordConfirm": "new-password"});

        let mut record = original.clone();
        let mut form = RecordUpsert::for_update(original.clone());
        form.load(&mut record, map(data.clone()));
        let err = form.validate(&record).unwrap_err();
        assert_eq!(
            field_error(&err, "oldPassword").as_deref(),
            Some("validation_invalid_old_password")
        );

        let mut record = original.clone();
        let mut form = RecordUpsert::for_update(original.clone());
        let mut with_old = map(data.clone());
        with_old.insert("oldPassword".into(), json!("old-password"));
        form.load(&mut record, with_old);
        assert!(form.validate(&record).is_ok());

        let mut record = original.clone();
        let mut form = RecordUpsert::for_update(original);
        form.grant_manager_access();
        form.load(&mut record, map(data));
        assert!(form.validate(&record).is_ok());
    }

    #[test]
    fn test_email_change_requires_manage_access() {
        let mut original = Record::new(users());
        original.set_id("abcdefghijklmno");
        original.set("name", "Ann");
        original.set("email", "ann@example.com");

        let mut record = original.clone();
        let mut form = RecordUpsert::for_update(original.clone());
        form.load(&mut record, map(json!({"email": "other@example.com"})));
        let err = form.validate(&record).unwrap_err();
        assert_eq!(field_error(&err, "email").as_deref(), Some("validation_manage_only"));

        let mut record = original.clone();
        let mut form = RecordUpsert::for_update(original);
        form.grant_superuser_access();
        form.load(&mut record, map(json!({"email": "other@example.com", "verified": true})));
        assert!(form.validate(&record).is_ok());
    }

    #[test]
    fn test_submit_fills_server_fields() {
        let store = Store::open_in_memory().unwrap();
        let users = users();
        store.sync_collection(&users).unwrap();

        let mut record = Record::new(users.clone());
        let mut form = RecordUpsert::for_create();
        form.load(
            &mut record,
            map(json!({"name": "Ann", "email": "ann@example.com", "password": "long-enough", "passwordConfirm": "long-enough"})),
        );
        form.submit(&store, &mut record).unwrap();

        assert_eq!(record.id().len(), ID_LENGTH);
        assert!(!record.get_str("created").is_empty());
        assert_eq!(record.get_str("created"), record.get_str("updated"));
        assert_eq!(record.get_str("tokenKey").len(), TOKEN_KEY_LENGTH);
        assert!(verify_password("long-enough", record.get_str("password")));
    }
}
