//! Digital certificate business rules: records, upstream source and schema checks

mod rule;
mod schema;
mod source;

pub use rule::{BusinessRule, BusinessRuleSummary, RuleType};
pub use schema::{
    DirectoryResourceLoader, ResourceLoader, SchemaValidator, StaticResourceLoader,
    ValidationError, Violation, CCL_JSON_SCHEMA,
};
pub use source::{FetchError, InMemoryRuleSource, RuleSource};
