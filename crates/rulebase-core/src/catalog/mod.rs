//! Collection catalog.
//!
//! Collections describe the record schema (typed fields with visibility
//! flags) and the access rule attached to every record operation.

mod catalog;
mod collection;
mod field;

pub use catalog::{validate_identifier, Catalog};
pub use collection::{Collection, CollectionType, Rule, RuleAction, RuleKind};
pub use field::{FieldDef, FieldKind};
