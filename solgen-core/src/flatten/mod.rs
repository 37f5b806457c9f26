//! Dependency flattening glue.
//!
//! A candidate is written to a uniquely named temporary file, handed to a
//! [`Flattener`] that inlines its imports, then normalized to exactly one
//! SPDX identifier and one `pragma solidity` statement. When flattening fails
//! the original source is used with its pragma rewritten to the target
//! compiler version.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::compiler::CompilerSettings;
use crate::error::{Error, Result};

static SPDX_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*//[ \t]*SPDX-License-Identifier:[ \t]*(.*?)[ \t]*\r?$")
        .expect("invalid regex")
});

static PRAGMA_SOLIDITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*pragma[ \t]+solidity[ \t]+([^;]*);").expect("invalid regex")
});

/// License used when a flattened unit carries none.
const DEFAULT_LICENSE: &str = "MIT";

/// Inlines imports into a single compilation unit.
#[async_trait]
pub trait Flattener: Send + Sync {
    /// Flatten the file at `path` (holding `source`). `original_path` is the
    /// caller's own location for the source, when it has one.
    async fn flatten(
        &self,
        source: &str,
        path: &Path,
        original_path: Option<&Path>,
    ) -> Result<String>;

    /// Name reported in logs and capability listings.
    fn name(&self) -> &str;
}

/// Runs `<binary> flatten <path>`, the `forge flatten` interface.
#[derive(Debug, Clone)]
pub struct CommandFlattener {
    binary: PathBuf,
}

impl CommandFlattener {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl Flattener for CommandFlattener {
    async fn flatten(
        &self,
        _source: &str,
        path: &Path,
        original_path: Option<&Path>,
    ) -> Result<String> {
        let working_dir = original_path
            .and_then(Path::parent)
            .or_else(|| path.parent())
            .filter(|dir| !dir.as_os_str().is_empty());

        let mut command = Command::new(&self.binary);
        command
            .arg("flatten")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|e| {
            Error::Flatten(format!("Failed to run {}: {}", self.binary.display(), e))
        })?;

        if !output.status.success() {
            return Err(Error::Flatten(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let flattened = String::from_utf8(output.stdout)
            .map_err(|e| Error::Flatten(format!("Flattened output is not UTF-8: {}", e)))?;
        if flattened.trim().is_empty() {
            return Err(Error::Flatten("Flattener produced no output".to_string()));
        }
        Ok(flattened)
    }

    fn name(&self) -> &str {
        "command"
    }
}

/// Used when no flatten tool is available; normalization still applies.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughFlattener;

#[async_trait]
impl Flattener for PassthroughFlattener {
    async fn flatten(
        &self,
        source: &str,
        _path: &Path,
        _original_path: Option<&Path>,
    ) -> Result<String> {
        Ok(source.to_string())
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

/// Keep the first SPDX identifier and the first `pragma solidity` statement;
/// later ones are replaced by comment markers. A unit without any SPDX
/// identifier gets one prepended.
pub fn normalize_flattened(source: &str) -> String {
    let mut seen_license = false;
    let licensed = SPDX_LINE.replace_all(source, |caps: &regex::Captures<'_>| {
        if seen_license {
            format!("// [flattened] duplicate license identifier: {}", &caps[1])
        } else {
            seen_license = true;
            caps[0].to_string()
        }
    });

    let mut seen_pragma = false;
    let normalized = PRAGMA_SOLIDITY.replace_all(&licensed, |caps: &regex::Captures<'_>| {
        if seen_pragma {
            format!("// [flattened] duplicate pragma: solidity {}", caps[1].trim())
        } else {
            seen_pragma = true;
            caps[0].to_string()
        }
    });

    if seen_license {
        normalized.into_owned()
    } else {
        format!(
            "// SPDX-License-Identifier: {}\n{}",
            DEFAULT_LICENSE, normalized
        )
    }
}

/// Replace the first `pragma solidity` statement with `pragma_line`, or
/// insert it after the SPDX line (or at the top) when there is none.
pub fn rewrite_pragma(source: &str, pragma_line: &str) -> String {
    if PRAGMA_SOLIDITY.is_match(source) {
        return PRAGMA_SOLIDITY
            .replace(source, regex::NoExpand(pragma_line))
            .into_owned();
    }

    match SPDX_LINE.find(source) {
        Some(m) => format!(
            "{}\n{}{}",
            &source[..m.end()],
            pragma_line,
            &source[m.end()..]
        ),
        None => format!("{}\n{}", pragma_line, source),
    }
}

/// A compilation unit ready for the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSource {
    pub source: String,
    /// Whether the flattener succeeded (otherwise the pragma fallback applied)
    pub flattened: bool,
}

/// Write `source` to a temporary `contract-<uuid>.sol` in `work_dir`, flatten
/// and normalize it. `original_path` is where the caller keeps the source, if
/// anywhere; relative imports resolve from its directory. Any failure falls
/// back to the original source with its pragma rewritten. The temporary file
/// is removed on every path.
pub async fn prepare_compilation_unit(
    flattener: &dyn Flattener,
    source: &str,
    settings: &CompilerSettings,
    work_dir: &Path,
    original_path: Option<&Path>,
) -> PreparedSource {
    let fallback = || PreparedSource {
        source: rewrite_pragma(source, &settings.pragma_line()),
        flattened: false,
    };

    let temp = match write_temp_source(source, work_dir) {
        Ok(temp) => temp,
        Err(err) => {
            warn!(error = %err, "could not stage source for flattening, using pragma fallback");
            return fallback();
        }
    };

    match flattener.flatten(source, temp.path(), original_path).await {
        Ok(flattened) => {
            debug!(
                flattener = flattener.name(),
                path = %temp.path().display(),
                "flattened compilation unit"
            );
            PreparedSource {
                source: normalize_flattened(&flattened),
                flattened: true,
            }
        }
        Err(err) => {
            warn!(
                flattener = flattener.name(),
                error = %err,
                "flattening failed, using pragma fallback"
            );
            fallback()
        }
    }
}

fn write_temp_source(source: &str, work_dir: &Path) -> Result<tempfile::NamedTempFile> {
    let mut temp = tempfile::Builder::new()
        .prefix(&format!("contract-{}", Uuid::new_v4()))
        .suffix(".sol")
        .rand_bytes(0)
        .tempfile_in(work_dir)?;
    temp.write_all(source.as_bytes())?;
    temp.flush()?;
    Ok(temp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedFlattener;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_neutralizes_duplicates() {
        let flattened = "\
// SPDX-License-Identifier: MIT
pragma solidity ^0.8.19;

// SPDX-License-Identifier: Apache-2.0
pragma solidity >=0.8.0 <0.9.0;
library SafeMath {}

contract Token {}
";
        let normalized = normalize_flattened(flattened);
        assert_eq!(
            normalized,
            "\
// SPDX-License-Identifier: MIT
pragma solidity ^0.8.19;

// [flattened] duplicate license identifier: Apache-2.0
// [flattened] duplicate pragma: solidity >=0.8.0 <0.9.0
library SafeMath {}

contract Token {}
"
        );
        assert_eq!(PRAGMA_SOLIDITY.find_iter(&normalized).count(), 1);
        assert_eq!(SPDX_LINE.find_iter(&normalized).count(), 1);
    }

    #[test]
    fn test_normalize_adds_missing_license() {
        let normalized = normalize_flattened("pragma solidity ^0.8.19;\ncontract A {}");
        assert!(normalized.starts_with("// SPDX-License-Identifier: MIT\n"));
        assert_eq!(normalize_flattened(&normalized), normalized);
    }

    #[test]
    fn test_rewrite_pragma() {
        let source = "// SPDX-License-Identifier: MIT\npragma solidity 0.7.6;\ncontract A {}";
        assert_eq!(
            rewrite_pragma(source, "pragma solidity ^0.8.19;"),
            "// SPDX-License-Identifier: MIT\npragma solidity ^0.8.19;\ncontract A {}"
        );

        assert_eq!(
            rewrite_pragma(
                "// SPDX-License-Identifier: MIT\ncontract A {}",
                "pragma solidity ^0.8.19;"
            ),
            "// SPDX-License-Identifier: MIT\npragma solidity ^0.8.19;\ncontract A {}"
        );
        assert_eq!(
            rewrite_pragma("contract A {}", "pragma solidity ^0.8.19;"),
            "pragma solidity ^0.8.19;\ncontract A {}"
        );
    }

    #[tokio::test]
    async fn test_prepare_flattens_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let flattener = ScriptedFlattener::succeeding(
            "// SPDX-License-Identifier: MIT\npragma solidity ^0.8.19;\n// SPDX-License-Identifier: MIT\ncontract A {}",
        );

        let prepared = prepare_compilation_unit(
            &flattener,
            "import \"./B.sol\";\ncontract A {}",
            &CompilerSettings::default(),
            dir.path(),
            None,
        )
        .await;

        assert!(prepared.flattened);
        assert!(prepared.source.contains("// [flattened] duplicate license identifier: MIT"));

        let seen = flattener.paths();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            flattener.staged_contents(),
            vec![Some("import \"./B.sol\";\ncontract A {}".to_string())]
        );
        let file_name = seen[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(file_name.starts_with("contract-"));
        assert!(file_name.ends_with(".sol"));
        assert!(!seen[0].exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(flattener.original_paths(), vec![None]);
    }

    #[tokio::test]
    async fn test_prepare_forwards_original_path() {
        let dir = tempfile::tempdir().unwrap();
        let flattener = ScriptedFlattener::succeeding("contract A {}");
        let original = Path::new("/work/project/src/A.sol");

        let prepared = prepare_compilation_unit(
            &flattener,
            "import \"./B.sol\";\ncontract A {}",
            &CompilerSettings::default(),
            dir.path(),
            Some(original),
        )
        .await;

        assert!(prepared.flattened);
        assert_eq!(flattener.original_paths(), vec![Some(original.to_path_buf())]);
    }

    #[tokio::test]
    async fn test_prepare_falls_back_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let flattener = ScriptedFlattener::failing("forge: command not found");

        let prepared = prepare_compilation_unit(
            &flattener,
            "pragma solidity ^0.6.0;\ncontract A {}",
            &CompilerSettings::default(),
            dir.path(),
            None,
        )
        .await;

        assert!(!prepared.flattened);
        assert_eq!(prepared.source, "pragma solidity ^0.8.19;\ncontract A {}");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_prepare_unwritable_work_dir_falls_back() {
        let prepared = prepare_compilation_unit(
            &PassthroughFlattener,
            "contract A {}",
            &CompilerSettings::default(),
            Path::new("/nonexistent/solgen/work"),
            None,
        )
        .await;

        assert!(!prepared.flattened);
        assert_eq!(prepared.source, "pragma solidity ^0.8.19;\ncontract A {}");
    }

    #[tokio::test]
    async fn test_passthrough_keeps_source() {
        let dir = tempfile::tempdir().unwrap();
        let prepared = prepare_compilation_unit(
            &PassthroughFlattener,
            "// SPDX-License-Identifier: MIT\npragma solidity ^0.8.19;\ncontract A {}",
            &CompilerSettings::default(),
            dir.path(),
            None,
        )
        .await;

        assert!(prepared.flattened);
        assert_eq!(
            prepared.source,
            "// SPDX-License-Identifier: MIT\npragma solidity ^0.8.19;\ncontract A {}"
        );
    }
}
