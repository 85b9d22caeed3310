//! YAML config loading, grounded on `src/config/store.rs`'s
//! `SuperAgentConfigStoreFile` (`serde_yaml::from_reader` wrapped in a typed
//! error). The outer concerns of that file (remote overlay, secrets) are out
//! of scope here; only local-file loading + the core's own validation
//! remain.

use super::{ConfigError, ConfigSnapshot};
use std::fs::File;
use std::io;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("could not open config file `{path}`: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("could not parse config file `{path}`: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Load and validate a [`ConfigSnapshot`] from a YAML file on disk.
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<ConfigSnapshot, LoaderError> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref).map_err(|source| LoaderError::Open {
        path: path_ref.display().to_string(),
        source,
    })?;
    let snapshot: ConfigSnapshot =
        serde_yaml::from_reader(file).map_err(|source| LoaderError::Parse {
            path: path_ref.display().to_string(),
            source,
        })?;
    snapshot.validate()?;
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_yaml(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_a_minimal_snapshot() {
        let file = write_yaml(
            r#"
processes:
  web:
    command: ["/bin/echo", "hi"]
"#,
        );
        let snap = load_snapshot(file.path()).unwrap();
        assert_eq!(snap.processes.len(), 1);
        assert!(snap.processes.contains_key("web"));
    }

    #[test]
    fn rejects_invalid_structural_config() {
        let file = write_yaml(
            r#"
processes:
  job:
    command: ["/bin/true"]
    kind: one-shot
    scale: 2
"#,
        );
        assert!(matches!(
            load_snapshot(file.path()),
            Err(LoaderError::Invalid(ConfigError::OneShotScale(_)))
        ));
    }

    #[test]
    fn missing_file_is_an_open_error() {
        assert!(matches!(
            load_snapshot("/nonexistent/path/to/config.yaml"),
            Err(LoaderError::Open { .. })
        ));
    }
}
