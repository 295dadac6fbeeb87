//! Topic naming policy, access control, and the process-local topic catalog.

pub mod catalog;
pub mod validator;

pub use catalog::{CatalogStats, TopicCatalog, TopicInfo};
pub use validator::{
    suggest_topic_name, validate_topic_name, AccessValidator, NameViolation, PermissionLevel,
    TopicNameReport, TopicPermission, TopicType,
};
