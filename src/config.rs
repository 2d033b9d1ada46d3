use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Per-source credentials: source name -> one or more secret strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Keys(HashMap<String, Vec<String>>);

impl Keys {
    pub fn get(&self, source: &str) -> &[String] {
        self.0.get(source).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn set(&mut self, source: &str, keys: Vec<String>) {
        self.0.insert(source.to_string(), keys);
    }

    /// Replace keys from `URL_HUNTER_<SOURCE>_KEYS` (comma-separated) where set.
    pub fn apply_env<F>(&mut self, sources: &[&str], lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for source in sources {
            let var = format!("URL_HUNTER_{}_KEYS", source.to_uppercase());
            if let Some(raw) = lookup(&var) {
                let keys: Vec<String> = raw
                    .split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect();
                self.set(source, keys);
            }
        }
    }
}

impl<const N: usize> From<[(&str, Vec<&str>); N]> for Keys {
    fn from(entries: [(&str, Vec<&str>); N]) -> Self {
        let mut keys = Keys::default();
        for (source, values) in entries {
            keys.set(source, values.into_iter().map(String::from).collect());
        }
        keys
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub keys: Keys,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Sources enabled when none are given on the command line. Empty means all.
    pub sources: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self { keys: Keys::default(), timeout_secs: 30, sources: Vec::new() }
    }
}

impl Config {
    /// Load from `path`, or from the default location when it exists. A missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Self::default(),
            },
        };
        config.keys.apply_env(crate::sources::ALL, |var| std::env::var(var).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&data).with_context(|| format!("failed to parse config {}", path.display()))
    }
}

fn default_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".config").join("url_hunter").join("config.json"))
}
