//! Home directory lookup collaborator

use crate::error::{Result, WinemasonError};
use std::path::{Path, PathBuf};

/// Maps a username to its home directory
pub trait UserLookup {
    fn home_dir(&self, username: &str) -> Result<PathBuf>;
}

/// Resolves users against the host's passwd database
#[derive(Debug, Default)]
pub struct SystemUsers {
    passwd_path: PathBuf,
}

impl SystemUsers {
    pub fn new() -> Self {
        Self {
            passwd_path: PathBuf::from("/etc/passwd"),
        }
    }

    /// Use an alternative passwd file (chroots, tests)
    pub fn with_passwd<P: AsRef<Path>>(path: P) -> Self {
        Self {
            passwd_path: path.as_ref().to_path_buf(),
        }
    }

    fn lookup_passwd(&self, username: &str) -> Result<PathBuf> {
        let content = std::fs::read_to_string(&self.passwd_path)?;
        for line in content.lines() {
            let mut fields = line.split(':');
            if fields.next() != Some(username) {
                continue;
            }
            // name:passwd:uid:gid:gecos:home:shell
            if let Some(home) = fields.nth(4) {
                if !home.is_empty() {
                    return Ok(PathBuf::from(home));
                }
            }
        }
        Err(WinemasonError::User(format!(
            "no home directory found for user {:?}",
            username
        )))
    }
}

impl UserLookup for SystemUsers {
    fn home_dir(&self, username: &str) -> Result<PathBuf> {
        // Current user may not appear in /etc/passwd (LDAP etc.), so prefer
        // the environment for them.
        if current_username().as_deref() == Some(username) {
            if let Some(home) = dirs::home_dir() {
                return Ok(home);
            }
        }
        self.lookup_passwd(username)
    }
}

/// Username of the invoking user, if the environment exposes one
pub fn current_username() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .ok()
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn passwd_fixture() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "root:x:0:0:root:/root:/bin/bash").unwrap();
        writeln!(file, "alice:x:1000:1000:Alice:/home/alice:/bin/bash").unwrap();
        writeln!(file, "nohome:x:1001:1001::").unwrap();
        file
    }

    #[test]
    fn resolves_root_home() {
        let passwd = passwd_fixture();
        let users = SystemUsers::with_passwd(passwd.path());
        assert_eq!(users.lookup_passwd("root").unwrap(), PathBuf::from("/root"));
    }

    #[test]
    fn resolves_regular_user_home() {
        let passwd = passwd_fixture();
        let users = SystemUsers::with_passwd(passwd.path());
        assert_eq!(
            users.lookup_passwd("alice").unwrap(),
            PathBuf::from("/home/alice")
        );
    }

    #[test]
    fn unknown_user_fails() {
        let passwd = passwd_fixture();
        let users = SystemUsers::with_passwd(passwd.path());
        assert!(matches!(
            users.lookup_passwd("bob"),
            Err(WinemasonError::User(_))
        ));
    }

    #[test]
    fn missing_home_field_fails() {
        let passwd = passwd_fixture();
        let users = SystemUsers::with_passwd(passwd.path());
        assert!(users.lookup_passwd("nohome").is_err());
    }
}
