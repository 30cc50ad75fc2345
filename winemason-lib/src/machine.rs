//! Wine machine provisioning
//!
//! Creating, deleting and reconfiguring prefixes. Every mutating step runs
//! through wine's or winetricks' own tools as the owning user, followed by a
//! permission fix because elevated steps leave root-owned files inside the
//! prefix tree.

use crate::error::{Result, WinemasonError};
use crate::prefix::{WineArch, WinePrefix};
use crate::shell::{RunOptions, ShellRunner};
use crate::users::UserLookup;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Windows version tokens winetricks accepts
const WINDOWS_VERSIONS: &[&str] = &[
    "nt351", "nt40", "vista", "win10", "win2k", "win2k3", "win31", "win7", "win8", "win81",
    "win95", "win98", "winxp",
];

/// Mode re-asserted on the prefix tree after mutations
const PREFIX_MODE: &str = "u+rwX,g+rwX,o+rX";

/// How long winecfg may take to initialize a fresh prefix
const CREATE_TIMEOUT: Duration = Duration::from_secs(120);

/// Validated windows version token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowsVersion(&'static str);

impl WindowsVersion {
    /// Validate a version token; empty input defaults to win7.
    pub fn validate(token: &str) -> Result<Self> {
        let token = token.trim().to_lowercase();
        if token.is_empty() {
            return Ok(Self("win7"));
        }
        WINDOWS_VERSIONS
            .iter()
            .copied()
            .find(|candidate| *candidate == token)
            .map(Self)
            .ok_or_else(|| {
                WinemasonError::InvalidArgument(format!(
                    "unknown windows version {:?}, expected one of {}",
                    token,
                    WINDOWS_VERSIONS.join(", ")
                ))
            })
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

/// Verify the host tools every machine operation shells out to
pub fn require_host_tools() -> Result<()> {
    for tool in ["wine", "winecfg", "winetricks"] {
        which::which(tool).map_err(|_| {
            WinemasonError::Machine(format!("{} binary not found in PATH", tool))
        })?;
    }
    Ok(())
}

/// Prefix provisioning operations
pub struct Machine<'a> {
    shell: &'a dyn ShellRunner,
    users: &'a dyn UserLookup,
}

impl<'a> Machine<'a> {
    pub fn new(shell: &'a dyn ShellRunner, users: &'a dyn UserLookup) -> Self {
        Self { shell, users }
    }

    /// Hand the prefix tree back to its owning user
    pub fn fix_permissions(&self, prefix: &WinePrefix, username: &str) -> Result<()> {
        let chown = format!(
            "chown -R \"{user}\":\"{user}\" \"{prefix}\"",
            user = username,
            prefix = prefix
        );
        self.shell
            .run(&chown, &RunOptions::shell().sudo().quiet())?;
        let chmod = format!("chmod -R {} \"{}\"", PREFIX_MODE, prefix);
        self.shell
            .run(&chmod, &RunOptions::shell().sudo().quiet())?;
        Ok(())
    }

    /// Create a fresh wine machine.
    ///
    /// Refuses to clobber an existing prefix unless `overwrite` is set.
    /// Initialization is done by winecfg itself; the call returns once the
    /// prefix's system.reg exists and has stopped changing.
    pub fn create(
        &self,
        path_or_name: &str,
        arch: &str,
        username: &str,
        overwrite: bool,
    ) -> Result<WinePrefix> {
        let prefix = WinePrefix::resolve(path_or_name, username, self.users)?;
        let arch = WineArch::validate(arch)?;
        info!(
            "creating wine machine: prefix={} arch={} user={}",
            prefix, arch, username
        );

        if prefix.exists() {
            if !overwrite {
                return Err(WinemasonError::Machine(format!(
                    "prefix already exists and overwrite is disabled: {}",
                    prefix
                )));
            }
            warn!("deleting existing wine machine {}", prefix);
            self.delete_tree(&prefix)?;
        }

        let mkdir = format!("mkdir -p \"{}\"", prefix);
        self.shell
            .run(&mkdir, &RunOptions::shell().sudo().quiet())?;
        self.fix_permissions(&prefix, username)?;

        // DISPLAY is emptied: winecfg must not try to open a window when the
        // caller runs headless under xvfb
        let winecfg = format!(
            "DISPLAY=\"\" WINEPREFIX=\"{}\" WINEARCH=\"{}\" winecfg",
            prefix, arch
        );
        self.shell
            .run(&winecfg, &RunOptions::shell().as_user(username))?;

        wait_for_file_settled(&prefix.system_reg(), CREATE_TIMEOUT)?;
        self.fix_permissions(&prefix, username)?;
        Ok(prefix)
    }

    /// Delete a wine machine; the boundary check runs before the `rm`
    pub fn remove(&self, path_or_name: &str, username: &str) -> Result<()> {
        let prefix = WinePrefix::resolve(path_or_name, username, self.users)?;
        if !prefix.exists() {
            return Ok(());
        }
        warn!("deleting wine machine {}", prefix);
        self.delete_tree(&prefix)
    }

    /// Pin the reported windows version via winetricks
    pub fn set_windows_version(
        &self,
        path_or_name: &str,
        version: &str,
        username: &str,
    ) -> Result<()> {
        let prefix = WinePrefix::resolve(path_or_name, username, self.users)?;
        let version = WindowsVersion::validate(version)?;
        let arch = WineArch::from_prefix(&prefix)?;
        info!("setting windows version on {} to {}", prefix, version.as_str());
        let command = format!(
            "WINEPREFIX=\"{}\" WINEARCH=\"{}\" winetricks -q \"{}\"",
            prefix,
            arch,
            version.as_str()
        );
        self.shell
            .run(&command, &RunOptions::shell().as_user(username))?;
        self.fix_permissions(&prefix, username)
    }

    /// Turn off wine's GUI crash dialogs
    pub fn disable_crash_dialogs(&self, path_or_name: &str, username: &str) -> Result<()> {
        let prefix = WinePrefix::resolve(path_or_name, username, self.users)?;
        let arch = WineArch::from_prefix(&prefix)?;
        info!("disabling GUI crash dialogs on {}", prefix);
        let command = format!(
            "WINEPREFIX=\"{}\" WINEARCH=\"{}\" winetricks nocrashdialog",
            prefix, arch
        );
        self.shell
            .run(&command, &RunOptions::shell().as_user(username))?;
        self.fix_permissions(&prefix, username)
    }

    fn delete_tree(&self, prefix: &WinePrefix) -> Result<()> {
        let command = format!("rm -Rf \"{}\"", prefix);
        self.shell
            .run(&command, &RunOptions::shell().sudo().quiet())?;
        if prefix.exists() {
            return Err(WinemasonError::Machine(format!(
                "prefix could not be deleted: {}",
                prefix
            )));
        }
        Ok(())
    }
}

#[derive(PartialEq, Eq)]
struct FileSnapshot {
    len: u64,
    modified: std::time::SystemTime,
}

fn snapshot(path: &Path) -> Result<FileSnapshot> {
    let metadata = std::fs::metadata(path)?;
    Ok(FileSnapshot {
        len: metadata.len(),
        modified: metadata.modified()?,
    })
}

/// Wait for a file to exist and stop changing; winecfg keeps rewriting
/// system.reg for a while after it exits
fn wait_for_file_settled(path: &Path, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    while !path.is_file() {
        if start.elapsed() > timeout {
            return Err(WinemasonError::Machine(format!(
                "timed out waiting for {} to be created",
                path.display()
            )));
        }
        std::thread::sleep(Duration::from_millis(250));
    }

    let mut last = snapshot(path)?;
    loop {
        std::thread::sleep(Duration::from_millis(500));
        let current = snapshot(path)?;
        if current == last {
            return Ok(());
        }
        if start.elapsed() > timeout {
            return Err(WinemasonError::Machine(format!(
                "timed out waiting for {} to settle",
                path.display()
            )));
        }
        last = current;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::CommandOutput;
    use std::cell::RefCell;
    use std::path::PathBuf;

    /// Executes mkdir/rm for real and fakes winecfg by writing system.reg
    struct ScriptedShell {
        commands: RefCell<Vec<String>>,
        arch_line: &'static str,
    }

    impl ScriptedShell {
        fn new(arch_line: &'static str) -> Self {
            Self {
                commands: RefCell::new(Vec::new()),
                arch_line,
            }
        }

        fn commands(&self) -> Vec<String> {
            self.commands.borrow().clone()
        }
    }

    impl ShellRunner for ScriptedShell {
        fn run(&self, command: &str, _options: &RunOptions) -> Result<CommandOutput> {
            self.commands.borrow_mut().push(command.to_string());
            if let Some(rest) = command.strip_prefix("mkdir -p ") {
                std::fs::create_dir_all(rest.trim_matches('"'))?;
            } else if let Some(rest) = command.strip_prefix("rm -Rf ") {
                let _ = std::fs::remove_dir_all(rest.trim_matches('"'));
            } else if command.contains("winecfg") {
                let prefix = command
                    .split("WINEPREFIX=\"")
                    .nth(1)
                    .and_then(|rest| rest.split('"').next())
                    .unwrap();
                std::fs::write(
                    Path::new(prefix).join("system.reg"),
                    format!("WINE REGISTRY Version 2\n{}\n", self.arch_line),
                )?;
            }
            Ok(CommandOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
            })
        }
    }

    struct TempUsers {
        home: PathBuf,
    }

    impl UserLookup for TempUsers {
        fn home_dir(&self, _username: &str) -> Result<PathBuf> {
            Ok(self.home.clone())
        }
    }

    fn fixture(arch_line: &'static str) -> (tempfile::TempDir, ScriptedShell, TempUsers) {
        let dir = tempfile::tempdir().unwrap();
        let users = TempUsers {
            home: dir.path().to_path_buf(),
        };
        (dir, ScriptedShell::new(arch_line), users)
    }

    #[test]
    fn windows_version_tokens_validate() {
        assert_eq!(WindowsVersion::validate("win7").unwrap().as_str(), "win7");
        assert_eq!(WindowsVersion::validate(" WINXP ").unwrap().as_str(), "winxp");
        assert_eq!(WindowsVersion::validate("").unwrap().as_str(), "win7");
        assert!(matches!(
            WindowsVersion::validate("win2000"),
            Err(WinemasonError::InvalidArgument(_))
        ));
    }

    #[test]
    fn create_initializes_prefix_and_fixes_permissions() {
        let (_dir, shell, users) = fixture("#arch=win32");
        let machine = Machine::new(&shell, &users);
        let prefix = machine.create("wine_test_32", "win32", "alice", false).unwrap();
        assert!(prefix.system_reg().is_file());
        let commands = shell.commands();
        assert!(commands.iter().any(|c| c.contains("winecfg")));
        assert!(commands.iter().filter(|c| c.starts_with("chown -R")).count() >= 2);
    }

    #[test]
    fn create_refuses_to_clobber_without_overwrite() {
        let (_dir, shell, users) = fixture("#arch=win32");
        let machine = Machine::new(&shell, &users);
        machine.create("wine_test_32", "win32", "alice", false).unwrap();
        let err = machine
            .create("wine_test_32", "win32", "alice", false)
            .unwrap_err();
        assert!(matches!(err, WinemasonError::Machine(_)));
    }

    #[test]
    fn create_with_overwrite_replaces_existing() {
        let (_dir, shell, users) = fixture("#arch=win64");
        let machine = Machine::new(&shell, &users);
        machine.create("wine_test_64", "win64", "alice", false).unwrap();
        let prefix = machine.create("wine_test_64", "win64", "alice", true).unwrap();
        assert_eq!(WineArch::from_prefix(&prefix).unwrap(), WineArch::Win64);
        assert!(shell.commands().iter().any(|c| c.starts_with("rm -Rf")));
    }

    #[test]
    fn set_windows_version_uses_prefix_arch() {
        let (_dir, shell, users) = fixture("#arch=win64");
        let machine = Machine::new(&shell, &users);
        machine.create("wine_test_64", "win64", "alice", false).unwrap();
        machine
            .set_windows_version("wine_test_64", "winxp", "alice")
            .unwrap();
        let commands = shell.commands();
        let winetricks = commands
            .iter()
            .find(|c| c.contains("winetricks -q"))
            .unwrap();
        assert!(winetricks.contains("WINEARCH=\"win64\""));
        assert!(winetricks.contains("\"winxp\""));
    }

    #[test]
    fn set_windows_version_rejects_unknown_token() {
        let (_dir, shell, users) = fixture("#arch=win32");
        let machine = Machine::new(&shell, &users);
        machine.create("wine_test_32", "win32", "alice", false).unwrap();
        assert!(matches!(
            machine.set_windows_version("wine_test_32", "win2000", "alice"),
            Err(WinemasonError::InvalidArgument(_))
        ));
    }

    #[test]
    fn remove_of_absent_prefix_is_a_no_op() {
        let (_dir, shell, users) = fixture("#arch=win32");
        let machine = Machine::new(&shell, &users);
        machine.remove("wine_gone", "alice").unwrap();
        assert!(shell.commands().is_empty());
    }

    #[test]
    fn settle_wait_times_out_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = wait_for_file_settled(
            &dir.path().join("system.reg"),
            Duration::from_millis(300),
        )
        .unwrap_err();
        assert!(matches!(err, WinemasonError::Machine(_)));
    }

    #[test]
    fn settle_wait_returns_once_file_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("system.reg");
        std::fs::write(&file, "#arch=win32\n").unwrap();
        wait_for_file_settled(&file, Duration::from_secs(5)).unwrap();
    }
}
