//! Option layering for the CLI: built-in defaults, then a TOML file, then `WEBDETECT_*`
//! environment variables, then command-line flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;
use webdetect::{BuildOptions, DetectOptions};

pub const DEFAULT_CONFIG_FILE: &str = "webdetect.toml";

/// Every field is optional. Unset fields leave the layer below alone.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub max_checksums: Option<usize>,
    pub max_apps_per_checksum: Option<usize>,
    /// `false` disables the shared-checksum filter entirely.
    pub filter_shared: Option<bool>,
    pub balancer_iterations: Option<usize>,
    pub exclude_trunk: Option<bool>,
    pub verify: Option<bool>,
    pub required_fraction: Option<f64>,
}

impl ConfigLayer {
    /// Fields set in `other` win.
    pub fn merge(&mut self, other: ConfigLayer) {
        macro_rules! take {
            ($($field:ident),*) => { $(if other.$field.is_some() { self.$field = other.$field; })* };
        }
        take!(max_checksums, max_apps_per_checksum, filter_shared, balancer_iterations, exclude_trunk,
            verify, required_fraction);
    }

    pub fn apply_to_build(&self, opts: &mut BuildOptions) {
        if let Some(max) = self.max_checksums { opts.max_checksums = max; }
        if let Some(max_apps) = self.max_apps_per_checksum { opts.max_apps_per_checksum = Some(max_apps); }
        if self.filter_shared == Some(false) { opts.max_apps_per_checksum = None; }
        if let Some(iterations) = self.balancer_iterations { opts.balancer_iterations = iterations; }
        if let Some(exclude) = self.exclude_trunk { opts.exclude_trunk = exclude; }
        if let Some(verify) = self.verify { opts.verify = verify; }
    }

    pub fn apply_to_detect(&self, opts: &mut DetectOptions) {
        if let Some(fraction) = self.required_fraction { opts.required_fraction = fraction; }
    }
}

fn read_layer(path: &Path) -> anyhow::Result<ConfigLayer> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))
}

/// Load the file layer. An explicitly named file must exist. Otherwise `webdetect.toml` in the
/// working directory is used if there is one.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<ConfigLayer> {
    let mut layer = match explicit {
        Some(path) => read_layer(path)?,
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default.exists() { read_layer(&default)? } else { ConfigLayer::default() }
        }
    };
    apply_env_overrides(&mut layer, |name| std::env::var(name).ok());
    Ok(layer)
}

fn parse_var<T: FromStr>(name: &str, raw: Option<String>) -> Option<T>
    where T::Err: std::fmt::Display
{
    let raw = raw?;
    let trimmed = raw.trim();
    if trimmed.is_empty() { return None; }
    match trimmed.parse() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!("invalid {name}, ignoring: {err}");
            None
        }
    }
}

/// Overlay `WEBDETECT_*` variables, looked up through `var`.
pub fn apply_env_overrides<F: Fn(&str) -> Option<String>>(layer: &mut ConfigLayer, var: F) {
    let env = ConfigLayer {
        max_checksums: parse_var("WEBDETECT_MAX_CHECKSUMS", var("WEBDETECT_MAX_CHECKSUMS")),
        max_apps_per_checksum: parse_var("WEBDETECT_MAX_APPS", var("WEBDETECT_MAX_APPS")),
        filter_shared: parse_var("WEBDETECT_FILTER_SHARED", var("WEBDETECT_FILTER_SHARED")),
        balancer_iterations: parse_var("WEBDETECT_ITERATIONS", var("WEBDETECT_ITERATIONS")),
        exclude_trunk: parse_var("WEBDETECT_EXCLUDE_TRUNK", var("WEBDETECT_EXCLUDE_TRUNK")),
        verify: parse_var("WEBDETECT_VERIFY", var("WEBDETECT_VERIFY")),
        required_fraction: parse_var("WEBDETECT_FRACTION", var("WEBDETECT_FRACTION")),
    };
    layer.merge(env);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_toml_layer() {
        let layer: ConfigLayer = toml::from_str("max_checksums = 8\nexclude_trunk = false\n").unwrap();
        assert_eq!(layer.max_checksums, Some(8));
        assert_eq!(layer.exclude_trunk, Some(false));
        assert_eq!(layer.verify, None);

        assert!(toml::from_str::<ConfigLayer>("max_checksum = 8\n").is_err());
    }

    #[test]
    fn env_overrides_file() {
        let mut layer: ConfigLayer = toml::from_str("max_checksums = 8\nbalancer_iterations = 10\n").unwrap();
        apply_env_overrides(&mut layer, |name| match name {
            "WEBDETECT_MAX_CHECKSUMS" => Some("3".into()),
            "WEBDETECT_ITERATIONS" => Some("lots".into()),
            "WEBDETECT_FILTER_SHARED" => Some("false".into()),
            _ => None,
        });
        assert_eq!(layer.max_checksums, Some(3));
        // Unparseable values are ignored.
        assert_eq!(layer.balancer_iterations, Some(10));

        let mut opts = BuildOptions::default();
        layer.apply_to_build(&mut opts);
        assert_eq!(opts.max_checksums, 3);
        assert_eq!(opts.balancer_iterations, 10);
        assert_eq!(opts.max_apps_per_checksum, None);
        assert!(opts.exclude_trunk);
    }

    #[test]
    fn detect_fraction() {
        let layer = ConfigLayer { required_fraction: Some(0.25), ..ConfigLayer::default() };
        let mut opts = DetectOptions::default();
        layer.apply_to_detect(&mut opts);
        assert_eq!(opts.required_fraction, 0.25);
    }
}
