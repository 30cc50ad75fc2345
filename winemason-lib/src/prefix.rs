//! Wine prefix identity and architecture
//!
//! A prefix is re-derived from the user-supplied path or bare name on every
//! operation. The only hard rule is the ownership boundary: a prefix must
//! live strictly inside the owning user's home directory, because every
//! mutating operation later runs chown/rm against it with elevation.

use crate::error::{Result, WinemasonError};
use crate::users::UserLookup;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Marker line inside system.reg that records the prefix architecture
const ARCH_MARKER: &str = "#arch=";

/// A validated, home-rooted wine prefix path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinePrefix {
    path: PathBuf,
}

impl WinePrefix {
    /// Resolve a path or bare name into a validated prefix.
    ///
    /// An absolute input is kept as given (after lexical normalization); a
    /// bare name like `wine_test_32` is joined under the user's home
    /// directory. Either way the result must stay strictly inside that home
    /// tree or the call fails with `BoundaryViolation`.
    pub fn resolve(
        path_or_name: &str,
        username: &str,
        users: &dyn UserLookup,
    ) -> Result<Self> {
        let home = users.home_dir(username)?;
        let candidate = Path::new(path_or_name);
        let resolved = if candidate.is_absolute() {
            normalize(candidate)
        } else {
            normalize(&home.join(candidate))
        };

        if resolved == home || !resolved.starts_with(&home) {
            return Err(WinemasonError::BoundaryViolation {
                path: resolved,
                home,
            });
        }

        Ok(Self { path: resolved })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the prefix's system registry file
    pub fn system_reg(&self) -> PathBuf {
        self.path.join("system.reg")
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

impl fmt::Display for WinePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Fold `.` and `..` components without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                match parts.last() {
                    Some(Component::Normal(_)) => {
                        parts.pop();
                    }
                    Some(Component::RootDir) | None => {}
                    _ => parts.push(component),
                }
            }
            other => parts.push(other),
        }
    }
    parts.iter().map(|c| c.as_os_str()).collect()
}

/// Prefix word-size variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WineArch {
    Win32,
    Win64,
}

impl WineArch {
    /// Validate a caller-supplied architecture token.
    ///
    /// Input is trimmed and lowercased; empty input defaults to `Win32`.
    /// Anything outside `win32`/`win64` is rejected.
    pub fn validate(value: &str) -> Result<Self> {
        let token = value.trim().to_lowercase();
        match token.as_str() {
            "" | "win32" => Ok(WineArch::Win32),
            "win64" => Ok(WineArch::Win64),
            other => Err(WinemasonError::InvalidArgument(format!(
                "wine architecture must be win32 or win64, got {:?}",
                other
            ))),
        }
    }

    /// Derive the architecture recorded in the prefix's system.reg.
    ///
    /// The file only exists once winecfg has initialized the prefix.
    pub fn from_prefix(prefix: &WinePrefix) -> Result<Self> {
        let reg_file = prefix.system_reg();
        if !reg_file.is_file() {
            return Err(WinemasonError::NotFound(reg_file));
        }

        let content = std::fs::read_to_string(&reg_file)?;
        for line in content.lines() {
            if let Some(value) = line.trim().strip_prefix(ARCH_MARKER) {
                if value.trim().is_empty() {
                    return Err(WinemasonError::InvalidArgument(format!(
                        "empty architecture marker in {}",
                        reg_file.display()
                    )));
                }
                return Self::validate(value);
            }
        }

        Err(WinemasonError::CorruptState(format!(
            "no {}<value> line in {}",
            ARCH_MARKER,
            reg_file.display()
        )))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WineArch::Win32 => "win32",
            WineArch::Win64 => "win64",
        }
    }
}

impl fmt::Display for WineArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    struct FakeUsers {
        homes: HashMap<String, PathBuf>,
    }

    impl FakeUsers {
        fn new() -> Self {
            let mut homes = HashMap::new();
            homes.insert("alice".to_string(), PathBuf::from("/home/alice"));
            homes.insert("root".to_string(), PathBuf::from("/root"));
            Self { homes }
        }
    }

    impl UserLookup for FakeUsers {
        fn home_dir(&self, username: &str) -> Result<PathBuf> {
            self.homes
                .get(username)
                .cloned()
                .ok_or_else(|| WinemasonError::User(username.to_string()))
        }
    }

    #[test]
    fn bare_name_resolves_under_home() {
        let prefix = WinePrefix::resolve("wine_test_32", "alice", &FakeUsers::new()).unwrap();
        assert_eq!(prefix.path(), Path::new("/home/alice/wine_test_32"));
    }

    #[test]
    fn absolute_path_inside_home_is_kept() {
        let prefix = WinePrefix::resolve("/home/alice/.wine", "alice", &FakeUsers::new()).unwrap();
        assert_eq!(prefix.path(), Path::new("/home/alice/.wine"));
    }

    #[test]
    fn root_user_prefix_under_root_home() {
        let prefix = WinePrefix::resolve(".wine", "root", &FakeUsers::new()).unwrap();
        assert_eq!(prefix.path(), Path::new("/root/.wine"));
    }

    #[test]
    fn absolute_path_outside_home_is_rejected() {
        let err = WinePrefix::resolve("/opt/wine", "alice", &FakeUsers::new()).unwrap_err();
        assert!(matches!(err, WinemasonError::BoundaryViolation { .. }));
    }

    #[test]
    fn escaping_relative_segments_are_rejected() {
        let err =
            WinePrefix::resolve("../bob/.wine", "alice", &FakeUsers::new()).unwrap_err();
        assert!(matches!(err, WinemasonError::BoundaryViolation { .. }));
    }

    #[test]
    fn home_itself_is_not_a_valid_prefix() {
        let err = WinePrefix::resolve("/home/alice", "alice", &FakeUsers::new()).unwrap_err();
        assert!(matches!(err, WinemasonError::BoundaryViolation { .. }));
    }

    #[test]
    fn dot_segments_are_folded() {
        let prefix =
            WinePrefix::resolve("/home/alice/./x/../.wine", "alice", &FakeUsers::new()).unwrap();
        assert_eq!(prefix.path(), Path::new("/home/alice/.wine"));
    }

    #[test]
    fn arch_validation_defaults_and_normalizes() {
        assert_eq!(WineArch::validate("").unwrap(), WineArch::Win32);
        assert_eq!(WineArch::validate("  WIN64 ").unwrap(), WineArch::Win64);
        assert_eq!(WineArch::validate("win32").unwrap(), WineArch::Win32);
        assert!(matches!(
            WineArch::validate("x"),
            Err(WinemasonError::InvalidArgument(_))
        ));
    }

    fn prefix_with_system_reg(content: Option<&str>) -> (tempfile::TempDir, WinePrefix) {
        let dir = tempfile::tempdir().unwrap();
        let prefix_path = dir.path().join(".wine");
        std::fs::create_dir(&prefix_path).unwrap();
        if let Some(content) = content {
            let mut file = std::fs::File::create(prefix_path.join("system.reg")).unwrap();
            write!(file, "{}", content).unwrap();
        }
        let prefix = WinePrefix {
            path: prefix_path,
        };
        (dir, prefix)
    }

    #[test]
    fn arch_derived_from_system_reg() {
        let (_dir, prefix) = prefix_with_system_reg(Some(
            "WINE REGISTRY Version 2\n;; All keys relative to \\\\Machine\n\n#arch=win64\n",
        ));
        assert_eq!(WineArch::from_prefix(&prefix).unwrap(), WineArch::Win64);
    }

    #[test]
    fn unknown_arch_marker_is_invalid() {
        let (_dir, prefix) = prefix_with_system_reg(Some("#arch=win99\n"));
        assert!(matches!(
            WineArch::from_prefix(&prefix),
            Err(WinemasonError::InvalidArgument(_))
        ));
    }

    #[test]
    fn missing_marker_line_is_corrupt_state() {
        let (_dir, prefix) = prefix_with_system_reg(Some("WINE REGISTRY Version 2\n"));
        assert!(matches!(
            WineArch::from_prefix(&prefix),
            Err(WinemasonError::CorruptState(_))
        ));
    }

    #[test]
    fn missing_system_reg_is_not_found() {
        let (_dir, prefix) = prefix_with_system_reg(None);
        assert!(matches!(
            WineArch::from_prefix(&prefix),
            Err(WinemasonError::NotFound(_))
        ));
    }
}
