//! Collection definitions and access rules.

use super::field::{FieldDef, FieldKind};
use serde::{Deserialize, Serialize};

/// Collection flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
    /// Plain record container.
    #[default]
    Base,
    /// Authenticable records (users). Supports the manage rule.
    Auth,
}

/// A collection access rule.
///
/// Rules are tri-state: absent (`None`) allows superusers only, an empty
/// string allows everyone, and any other string is an expression that must
/// evaluate to true for the record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rule(Option<String>);

/// Borrowed view of a [`Rule`]'s state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind<'a> {
    /// No rule set: superusers only.
    Locked,
    /// Empty rule: unconditionally allowed.
    Public,
    /// Non-empty expression.
    Expr(&'a str),
}

impl Rule {
    /// Superusers only.
    pub fn locked() -> Self {
        Rule(None)
    }

    /// Everyone.
    pub fn public() -> Self {
        Rule(Some(String::new()))
    }

    pub fn expr(expr: impl Into<String>) -> Self {
        Rule(Some(expr.into()))
    }

    pub fn kind(&self) -> RuleKind<'_> {
        match self.0.as_deref() {
            None => RuleKind::Locked,
            Some("") => RuleKind::Public,
            Some(s) => RuleKind::Expr(s),
        }
    }

    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl From<Option<&str>> for Rule {
    fn from(value: Option<&str>) -> Self {
        Rule(value.map(str::to_string))
    }
}

/// Operation a rule slot governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleAction {
    List,
    View,
    Create,
    Update,
    Delete,
    Manage,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::List => "list",
            RuleAction::View => "view",
            RuleAction::Create => "create",
            RuleAction::Update => "update",
            RuleAction::Delete => "delete",
            RuleAction::Manage => "manage",
        }
    }
}

/// A collection definition (table schema plus access rules).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    /// Stable collection id.
    pub id: String,
    /// Collection name (unique, also the table name).
    pub name: String,
    /// Collection flavour.
    #[serde(rename = "type", default)]
    pub kind: CollectionType,
    /// Field definitions, including system fields.
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub list_rule: Rule,
    #[serde(default)]
    pub view_rule: Rule,
    #[serde(default)]
    pub create_rule: Rule,
    #[serde(default)]
    pub update_rule: Rule,
    #[serde(default)]
    pub delete_rule: Rule,
    /// Auth collections only: grants elevated write access to the matching callers.
    #[serde(default)]
    pub manage_rule: Rule,
}

impl Collection {
    /// Create a base collection with the `id`, `created` and `updated` system fields.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: format!("_rbc_{}", crate::record::random_string(10)),
            name,
            kind: CollectionType::Base,
            fields: Self::base_system_fields(),
            list_rule: Rule::locked(),
            view_rule: Rule::locked(),
            create_rule: Rule::locked(),
            update_rule: Rule::locked(),
            delete_rule: Rule::locked(),
            manage_rule: Rule::locked(),
        }
    }

    /// Create an auth collection with the identity system fields.
    pub fn new_auth(name: impl Into<String>) -> Self {
        let mut collection = Self::new(name);
        collection.kind = CollectionType::Auth;
        collection.fields.extend([
            FieldDef::new("email", FieldKind::Email).system(),
            FieldDef::bool("emailVisibility").system(),
            FieldDef::bool("verified").system(),
            FieldDef::new("password", FieldKind::Password)
                .system()
                .hidden()
                .required(),
            FieldDef::text("tokenKey").system().hidden().required(),
        ]);
        collection
    }

    fn base_system_fields() -> Vec<FieldDef> {
        vec![
            FieldDef::text("id").system().required(),
            FieldDef::new(
                "created",
                FieldKind::Autodate {
                    on_create: true,
                    on_update: false,
                },
            )
            .system(),
            FieldDef::new(
                "updated",
                FieldKind::Autodate {
                    on_create: true,
                    on_update: true,
                },
            )
            .system(),
        ]
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Set the rule for one action.
    pub fn with_rule(mut self, action: RuleAction, rule: Rule) -> Self {
        *self.rule_mut(action) = rule;
        self
    }

    /// Set all five record rules at once.
    pub fn with_all_rules(mut self, rule: Rule) -> Self {
        for action in [
            RuleAction::List,
            RuleAction::View,
            RuleAction::Create,
            RuleAction::Update,
            RuleAction::Delete,
        ] {
            *self.rule_mut(action) = rule.clone();
        }
        self
    }

    pub fn rule(&self, action: RuleAction) -> &Rule {
        match action {
            RuleAction::List => &self.list_rule,
            RuleAction::View => &self.view_rule,
            RuleAction::Create => &self.create_rule,
            RuleAction::Update => &self.update_rule,
            RuleAction::Delete => &self.delete_rule,
            RuleAction::Manage => &self.manage_rule,
        }
    }

    fn rule_mut(&mut self, action: RuleAction) -> &mut Rule {
        match action {
            RuleAction::List => &mut self.list_rule,
            RuleAction::View => &mut self.view_rule,
            RuleAction::Create => &mut self.create_rule,
            RuleAction::Update => &mut self.update_rule,
            RuleAction::Delete => &mut self.delete_rule,
            RuleAction::Manage => &mut self.manage_rule,
        }
    }

    /// Get a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_auth(&self) -> bool {
        self.kind == CollectionType::Auth
    }
}
