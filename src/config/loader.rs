use crate::config::schema::HarvestConfig;
use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use validator::Validate;

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<HarvestConfig> {
        let path = path.as_ref();
        let mut visited = HashSet::new();
        let merged = Self::load_with_inheritance(path, &mut visited)?;
        let config: HarvestConfig = serde_json::from_value(merged)?;
        config.validate()?;
        Ok(config)
    }

    fn load_with_inheritance(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<Value> {
        let path = fs::canonicalize(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        if visited.contains(&path) {
            return Err(Error::Config(format!(
                "Circular inheritance detected involving {}",
                path.display()
            )));
        }
        visited.insert(path.clone());

        let mut config = Self::load_file(&path)?;

        let extends = config
            .as_object_mut()
            .and_then(|map| map.remove("extends"))
            .and_then(|v| v.as_str().map(str::to_owned));

        if let Some(parent_path_str) = extends {
            let parent_path = path
                .parent()
                .ok_or_else(|| {
                    Error::Config(format!(
                        "Cannot determine parent directory for {}",
                        path.display()
                    ))
                })?
                .join(parent_path_str);

            let parent = Self::load_with_inheritance(&parent_path, visited)?;
            Ok(Self::merge_values(parent, config))
        } else {
            Ok(config)
        }
    }

    fn load_file(path: &Path) -> Result<Value> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => {
                let value: Value = serde_json::from_str(&content)?;
                Ok(value)
            }
            Some("yaml") | Some("yml") => {
                let value: Value = serde_yaml::from_str(&content)?;
                Ok(value)
            }
            Some("toml") => {
                let value: Value = toml::from_str(&content)?;
                Ok(value)
            }
            _ => Err(Error::Config(format!(
                "Unsupported file extension: {}",
                path.display()
            ))),
        }
    }

    /// Deep-merge two config trees, child keys winning over parent keys.
    fn merge_values(parent: Value, child: Value) -> Value {
        match (parent, child) {
            (Value::Object(mut parent_map), Value::Object(child_map)) => {
                for (key, child_val) in child_map {
                    let merged = match parent_map.remove(&key) {
                        Some(parent_val) => Self::merge_values(parent_val, child_val),
                        None => child_val,
                    };
                    parent_map.insert(key, merged);
                }
                Value::Object(parent_map)
            }
            (_, child) => child,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        write!(file, "{}", content).unwrap();
        path
    }

    #[test]
    fn loads_json_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "run.json", r#"{"name": "daily"}"#);

        let config = ConfigLoader::load(&path).unwrap();
        assert_eq!(config.name, "daily");
        assert_eq!(config.retry_count, 3);
        assert_eq!(config.concurrency.auto.max_concurrency, 20);
        assert!(config.concurrency.auto.enabled);
    }

    #[test]
    fn child_overrides_parent() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            &dir,
            "base.json",
            r#"{"name": "base", "retry_count": 5, "concurrency": {"initial": 8}}"#,
        );
        let child = write_file(
            &dir,
            "child.json",
            r#"{"extends": "base.json", "name": "child"}"#,
        );

        let config = ConfigLoader::load(&child).unwrap();
        assert_eq!(config.name, "child");
        assert_eq!(config.retry_count, 5);
        assert_eq!(config.concurrency.initial, 8);
    }

    #[test]
    fn nested_merge_keeps_parent_siblings() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            &dir,
            "base.yaml",
            "name: base\nconcurrency:\n  initial: 6\n  auto:\n    max_concurrency: 12\n",
        );
        let child = write_file(
            &dir,
            "child.yaml",
            "extends: base.yaml\nconcurrency:\n  auto:\n    min_concurrency: 2\n",
        );

        let config = ConfigLoader::load(&child).unwrap();
        assert_eq!(config.concurrency.initial, 6);
        assert_eq!(config.concurrency.auto.min_concurrency, 2);
        assert_eq!(config.concurrency.auto.max_concurrency, 12);
    }

    #[test]
    fn circular_inheritance_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir, "a.json", r#"{"extends": "b.json", "name": "a"}"#);
        let b = write_file(&dir, "b.json", r#"{"extends": "a.json", "name": "b"}"#);

        let err = ConfigLoader::load(&b).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn invalid_bounds_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "bad.json",
            r#"{"name": "bad", "concurrency": {"auto": {"min_concurrency": 9, "max_concurrency": 3}}}"#,
        );

        let err = ConfigLoader::load(&path).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn degenerate_fixed_concurrency_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "fixed.toml",
            "name = \"fixed\"\n[concurrency.auto]\nmin_concurrency = 4\nmax_concurrency = 4\n",
        );

        let config = ConfigLoader::load(&path).unwrap();
        assert_eq!(config.concurrency.auto.min_concurrency, 4);
        assert_eq!(config.concurrency.auto.max_concurrency, 4);
    }
}
