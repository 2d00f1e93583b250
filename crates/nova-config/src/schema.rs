use schemars::schema::RootSchema;
use schemars::schema_for;

use crate::NovaConfig;

/// JSON schema for the TOML config, for editor completion and CI validation.
pub fn json_schema() -> RootSchema {
    schema_for!(NovaConfig)
}
