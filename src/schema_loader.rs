//! JSON Schema loader for the contribution shape.
//!
//! Schemas come either from the copy embedded at compile time or from a file
//! on disk (CLI `--schema`, `IMPL_MERGE_SCHEMA`). Both paths go through the
//! same version check and compile step so a swapped-in schema cannot silently
//! describe a different payload generation.

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::JSONSchema;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

pub const CONTRIBUTION_SCHEMA_VERSION: &str = "implementors_contribution_v1";
pub const SCHEMA_PATH_ENV: &str = "IMPL_MERGE_SCHEMA";

const EMBEDDED_SCHEMA: &str = include_str!("../schema/contribution.schema.json");

/// Compiled contribution schema plus the version it declared.
#[derive(Clone)]
pub struct ContributionSchema {
    pub schema_version: String,
    compiled: Arc<JSONSchema>,
    raw: Arc<Value>,
}

/// Controls how a schema document is checked before compilation.
pub(crate) struct SchemaLoadOptions<'a> {
    /// Where to find the version marker inside the schema document.
    pub schema_version_pointer: &'a str,
    /// Allowed schema_version values; enforced when present.
    pub allowed_versions: Option<&'a BTreeSet<String>>,
}

impl<'a> Default for SchemaLoadOptions<'a> {
    fn default() -> Self {
        Self {
            schema_version_pointer: "/schema_version",
            allowed_versions: None,
        }
    }
}

impl ContributionSchema {
    /// The schema shipped with the crate.
    pub fn embedded() -> Result<Self> {
        let value: Value =
            serde_json::from_str(EMBEDDED_SCHEMA).context("parsing embedded contribution schema")?;
        let allowed = allowed_schema_versions();
        compile_schema(
            value,
            "embedded contribution schema",
            SchemaLoadOptions {
                allowed_versions: Some(&allowed),
                ..Default::default()
            },
        )
    }

    /// Load a schema from disk, enforcing the known version set.
    pub fn load(path: &Path) -> Result<Self> {
        let allowed = allowed_schema_versions();
        load_json_schema(
            path,
            SchemaLoadOptions {
                allowed_versions: Some(&allowed),
                ..Default::default()
            },
        )
    }

    /// Honor `IMPL_MERGE_SCHEMA` when set, otherwise use the embedded copy.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(SCHEMA_PATH_ENV) {
            Some(path) if !path.is_empty() => Self::load(Path::new(&path))
                .with_context(|| format!("{SCHEMA_PATH_ENV} points at an unusable schema")),
            _ => Self::embedded(),
        }
    }

    /// Validate one candidate contribution, collecting every violation.
    pub fn validate(&self, instance: &Value) -> Result<(), Vec<String>> {
        self.compiled.validate(instance).map_err(|errors| {
            errors
                .map(|err| {
                    let path = err.instance_path.to_string();
                    if path.is_empty() {
                        err.to_string()
                    } else {
                        format!("{path}: {err}")
                    }
                })
                .collect()
        })
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

impl fmt::Debug for ContributionSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContributionSchema")
            .field("schema_version", &self.schema_version)
            .finish_non_exhaustive()
    }
}

pub(crate) fn load_json_schema(
    path: &Path,
    options: SchemaLoadOptions<'_>,
) -> Result<ContributionSchema> {
    let file = File::open(path).with_context(|| format!("opening schema {}", path.display()))?;
    let value: Value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing schema {}", path.display()))?;
    compile_schema(value, &path.display().to_string(), options)
}

fn compile_schema(
    value: Value,
    label: &str,
    options: SchemaLoadOptions<'_>,
) -> Result<ContributionSchema> {
    let schema_version = extract_schema_version(&value, options.schema_version_pointer)
        .ok_or_else(|| {
            anyhow!(
                "schema {label} missing schema_version at {}",
                options.schema_version_pointer
            )
        })?;

    if let Some(allowed) = options.allowed_versions {
        if !allowed.contains(&schema_version) {
            bail!(
                "schema_version '{}' not in allowed set {:?}",
                schema_version,
                allowed
            );
        }
    }

    // ValidationError borrows the schema value, so render it before the
    // value moves into the Arc.
    let compiled =
        JSONSchema::compile(&value).map_err(|err| anyhow!("compiling schema {label}: {err}"))?;

    Ok(ContributionSchema {
        schema_version,
        compiled: Arc::new(compiled),
        raw: Arc::new(value),
    })
}

fn allowed_schema_versions() -> BTreeSet<String> {
    BTreeSet::from_iter([CONTRIBUTION_SCHEMA_VERSION.to_string()])
}

fn extract_schema_version(schema: &Value, pointer: &str) -> Option<String> {
    let version = schema.pointer(pointer).and_then(Value::as_str)?;
    if version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        Some(version.to_string())
    } else {
        None
    }
}
