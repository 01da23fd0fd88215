pub mod model;
pub mod validate;

/// Current artifact schema version. All artifacts the pipeline writes carry
/// this version, and strict validation requires an exact match.
pub const SCHEMA_VERSION: &str = "2.0.0";
