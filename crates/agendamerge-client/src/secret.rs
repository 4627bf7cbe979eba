//! Secret reference resolver.
//!
//! Source URLs usually embed access tokens, so values in `config.toml` can
//! reference secrets stored outside the file:
//!
//! - `pass::path/in/store` - runs `pass show path/in/store`, returns first line
//! - `env::VAR_NAME` - reads `$VAR_NAME` from the environment
//! - `secret::key` - reads `$SECRET_KEY`, then `key` in the secrets file
//! - anything else - returned as-is (plain text)

use std::cell::OnceCell;
use std::path::{Path, PathBuf};

/// Resolves secret references, loading the secrets file at most once.
#[derive(Debug, Default)]
pub struct SecretResolver {
    secrets_file: Option<PathBuf>,
    table: OnceCell<Result<toml::Table, String>>,
}

impl SecretResolver {
    /// Creates a resolver reading `secret::` keys from `secrets_file`.
    pub fn new(secrets_file: Option<PathBuf>) -> Self {
        Self {
            secrets_file,
            table: OnceCell::new(),
        }
    }

    /// Resolves a value that may contain a secret reference prefix.
    pub fn resolve(&self, value: &str) -> Result<String, String> {
        if let Some(path) = value.strip_prefix("pass::") {
            resolve_pass(path)
        } else if let Some(var) = value.strip_prefix("env::") {
            resolve_env(var)
        } else if let Some(key) = value.strip_prefix("secret::") {
            self.resolve_secret(key)
        } else {
            Ok(value.to_string())
        }
    }

    fn resolve_secret(&self, key: &str) -> Result<String, String> {
        let env_key = format!("SECRET_{}", key.to_uppercase());
        if let Ok(value) = std::env::var(&env_key) {
            return Ok(value);
        }

        let table = self
            .table
            .get_or_init(|| load_table(self.secrets_file.as_deref()))
            .as_ref()
            .map_err(|e| format!("secret `{}` is not in ${} and {}", key, env_key, e))?;

        match table.get(key) {
            Some(toml::Value::String(value)) => Ok(value.clone()),
            Some(_) => Err(format!("secret `{}` must be a string", key)),
            None => Err(format!(
                "secret `{}` is neither in ${} nor in the secrets file",
                key, env_key
            )),
        }
    }
}

fn load_table(path: Option<&Path>) -> Result<toml::Table, String> {
    let path = path.ok_or_else(|| "no secrets_file is configured".to_string())?;
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    toml::from_str::<toml::Table>(&content)
        .map_err(|e| format!("failed to parse {}: {}", path.display(), e))
}

/// Runs `pass show <path>` and returns the first line of stdout.
fn resolve_pass(path: &str) -> Result<String, String> {
    let output = std::process::Command::new("pass")
        .arg("show")
        .arg(path)
        .output()
        .map_err(|e| format!("failed to run `pass show {}`: {}", path, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "`pass show {}` failed ({}): {}",
            path,
            output.status,
            stderr.trim()
        ));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
        .ok_or_else(|| format!("`pass show {}` produced no output", path))
}

fn resolve_env(var: &str) -> Result<String, String> {
    std::env::var(var).map_err(|_| format!("environment variable `{}` is not set", var))
}
