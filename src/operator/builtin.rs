//! Built-in string operators
//!
//! The three steps of the `clean_string` pipeline: fetch a raw string,
//! normalise its case, replace punctuation. Port and operator names are
//! chosen per instance so the same operator can be wired under any name.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::{debug, info};

use crate::config::ConfigType;
use crate::resource::ResourceKey;

use super::invoke::{Inputs, OpContext, Operator, OperatorError, Outputs};
use super::spec::{OperatorSpec, PortType};

/// Everything that is neither a word character nor whitespace
static NON_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s]").expect("Invalid regex pattern"));

/// Reads one string from a keyed dataset.
///
/// Config: `{data_key: string}`. Requires `connection` and `paths`.
pub struct FetchString {
    spec: OperatorSpec,
    output: String,
    dataset: BTreeMap<String, String>,
}

impl FetchString {
    pub fn new(name: &str, output: &str) -> Self {
        let dataset = [("1", "A#$.or?>)(*@alpha"), ("2", "b!*@Or><@!BeTa(*#@")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Self {
            spec: OperatorSpec::new(name)
                .output(output, PortType::Str)
                .resource(ResourceKey::Connection)
                .resource(ResourceKey::Paths)
                .config_field("data_key", ConfigType::String),
            output: output.to_string(),
            dataset,
        }
    }

    /// Replace the dataset the operator reads from
    pub fn with_dataset<K, V>(mut self, dataset: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.dataset = dataset
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }
}

impl Operator for FetchString {
    fn spec(&self) -> &OperatorSpec {
        &self.spec
    }

    fn invoke(&self, ctx: &OpContext<'_>, _inputs: &Inputs) -> Result<Outputs, OperatorError> {
        let key = ctx.config_str("data_key")?;
        let conn = ctx.resources().connection()?;
        let paths = ctx.resources().paths()?;

        info!(%conn, key, "Fetching data");
        debug!(rundir = %paths.rundir().display());

        let value = self
            .dataset
            .get(key)
            .ok_or_else(|| ctx.fail(format!("no data for key '{}'", key)))?;

        Ok(Outputs::single(&self.output, value.as_str()))
    }
}

/// Case normalisation.
///
/// Config: `{norm: "upper" | "lower", force_error: bool = false}`.
pub struct NormalizeString {
    spec: OperatorSpec,
    input: String,
    output: String,
}

impl NormalizeString {
    pub fn new(name: &str, input: &str, output: &str) -> Self {
        Self {
            spec: OperatorSpec::new(name)
                .input(input, PortType::Str)
                .output(output, PortType::Str)
                .resource(ResourceKey::Paths)
                .config_field("norm", ConfigType::String)
                .config_alias("mode", "norm")
                .config_default("force_error", ConfigType::Bool, json!(false)),
            input: input.to_string(),
            output: output.to_string(),
        }
    }
}

impl Operator for NormalizeString {
    fn spec(&self) -> &OperatorSpec {
        &self.spec
    }

    fn invoke(&self, ctx: &OpContext<'_>, inputs: &Inputs) -> Result<Outputs, OperatorError> {
        if ctx.config_bool("force_error")? {
            return Err(ctx.fail("forced error"));
        }

        let paths = ctx.resources().paths()?;
        debug!(rundir = %paths.rundir().display(), "Normalizing");

        let text = inputs.str(&self.input)?;
        let norm = ctx.config_str("norm")?;
        let normalized = match norm.to_ascii_lowercase().as_str() {
            "upper" => text.to_uppercase(),
            "lower" => text.to_lowercase(),
            _ => return Err(ctx.fail(format!("unknown norm '{}'", norm))),
        };

        Ok(Outputs::single(&self.output, normalized))
    }
}

/// Punctuation replacement: `[^\w\s]` becomes a single space.
///
/// Config: `{hyperparams: map = {}}`. With [`CleanString::with_metrics`]
/// the number of replaced characters is recorded as `chars_replaced`.
pub struct CleanString {
    spec: OperatorSpec,
    input: String,
    output: String,
}

impl CleanString {
    pub fn new(name: &str, input: &str, output: &str) -> Self {
        Self {
            spec: OperatorSpec::new(name)
                .input(input, PortType::Str)
                .output(output, PortType::Str)
                .resource(ResourceKey::Paths)
                .config_default("hyperparams", ConfigType::Map, json!({})),
            input: input.to_string(),
            output: output.to_string(),
        }
    }

    pub fn with_metrics(mut self) -> Self {
        self.spec = self.spec.resource(ResourceKey::Metrics);
        self
    }
}

impl Operator for CleanString {
    fn spec(&self) -> &OperatorSpec {
        &self.spec
    }

    fn invoke(&self, ctx: &OpContext<'_>, inputs: &Inputs) -> Result<Outputs, OperatorError> {
        let paths = ctx.resources().paths()?;
        let hyperparams = ctx.config().map("hyperparams").map_or(0, |m| m.len());
        info!(hyperparams, rundir = %paths.rundir().display(), "Cleaning");

        let text = inputs.str(&self.input)?;
        let replaced = NON_WORD.find_iter(text).count();
        let cleaned = NON_WORD.replace_all(text, " ").into_owned();

        if self.spec.resources().contains(&ResourceKey::Metrics) {
            ctx.resources()
                .metrics()?
                .record("chars_replaced", replaced as u64);
        }

        Ok(Outputs::single(&self.output, cleaned))
    }
}
