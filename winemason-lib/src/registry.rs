//! Registry access through wine's own command line tools
//!
//! Values are never cached in-process. The prefix's registry is mutated
//! out-of-process by wine itself between calls, so every read goes to the
//! live store via `wine reg query` and every write via `wine reg add`.

use crate::error::{Result, WinemasonError};
use crate::prefix::{WineArch, WinePrefix};
use crate::shell::{RunOptions, ShellRunner};
use glob::Pattern;
use tracing::{debug, info};

/// Registry key holding the prefix-wide executable search path
pub const ENVIRONMENT_KEY: &str =
    r"HKEY_LOCAL_MACHINE\System\CurrentControlSet\Control\Session Manager\Environment";

/// Value name of the search path inside [`ENVIRONMENT_KEY`]
pub const PATH_VALUE: &str = "PATH";

/// Registry value types wine's reg tool understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegValueType {
    Sz,
    ExpandSz,
    MultiSz,
    Dword,
    Qword,
    Binary,
}

impl RegValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegValueType::Sz => "REG_SZ",
            RegValueType::ExpandSz => "REG_EXPAND_SZ",
            RegValueType::MultiSz => "REG_MULTI_SZ",
            RegValueType::Dword => "REG_DWORD",
            RegValueType::Qword => "REG_QWORD",
            RegValueType::Binary => "REG_BINARY",
        }
    }

    fn parse(token: &str) -> Option<Self> {
        match token {
            "REG_SZ" => Some(RegValueType::Sz),
            "REG_EXPAND_SZ" => Some(RegValueType::ExpandSz),
            "REG_MULTI_SZ" => Some(RegValueType::MultiSz),
            "REG_DWORD" => Some(RegValueType::Dword),
            "REG_QWORD" => Some(RegValueType::Qword),
            "REG_BINARY" => Some(RegValueType::Binary),
            _ => None,
        }
    }
}

impl std::str::FromStr for RegValueType {
    type Err = WinemasonError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(&s.trim().to_uppercase()).ok_or_else(|| {
            WinemasonError::InvalidArgument(format!("unknown registry value type {:?}", s))
        })
    }
}

/// Type selector for writes
///
/// `Auto` preserves the type of the value being overwritten and fails when
/// there is no existing value to take it from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegWriteType {
    Auto,
    Explicit(RegValueType),
}

/// Registry view of one wine prefix
pub struct Registry<'a> {
    shell: &'a dyn ShellRunner,
    prefix: &'a WinePrefix,
    arch: WineArch,
    username: String,
}

impl<'a> Registry<'a> {
    pub fn new(
        shell: &'a dyn ShellRunner,
        prefix: &'a WinePrefix,
        arch: WineArch,
        username: &str,
    ) -> Self {
        Self {
            shell,
            prefix,
            arch,
            username: username.to_string(),
        }
    }

    fn wine_env(&self) -> String {
        format!(
            "WINEPREFIX=\"{}\" WINEARCH=\"{}\"",
            self.prefix, self.arch
        )
    }

    /// Read a single value.
    ///
    /// A failing query is the expected path for "value absent", reported as
    /// `RegistryRead` rather than a panic.
    pub fn read(&self, key: &str, value_name: &str) -> Result<(RegValueType, String)> {
        let command = format!(
            "{} wine reg query \"{}\" /v \"{}\"",
            self.wine_env(),
            key,
            value_name
        );
        let options = RunOptions::shell().as_user(&self.username).quiet();
        let output = self.shell.run(&command, &options).map_err(|e| {
            WinemasonError::RegistryRead {
                key: key.to_string(),
                value: value_name.to_string(),
                error: e.to_string(),
            }
        })?;

        parse_query_response(&output.stdout, key, value_name).ok_or_else(|| {
            WinemasonError::RegistryRead {
                key: key.to_string(),
                value: value_name.to_string(),
                error: format!("unparsable reg query response: {:?}", output.stdout.trim()),
            }
        })
    }

    /// Write a single value.
    ///
    /// Data is stripped of trailing backslashes before writing; a quoted
    /// value ending in `\` makes the reg tool treat the closing quote as
    /// escaped and corrupts the write.
    pub fn write(
        &self,
        key: &str,
        value_name: &str,
        data: &str,
        write_type: RegWriteType,
    ) -> Result<()> {
        let value_type = match write_type {
            RegWriteType::Explicit(t) => t,
            RegWriteType::Auto => {
                let (existing_type, _) = self.read(key, value_name).map_err(|e| {
                    WinemasonError::RegistryWrite {
                        key: key.to_string(),
                        value: value_name.to_string(),
                        error: format!("no existing value to preserve the type of: {}", e),
                    }
                })?;
                existing_type
            }
        };

        let data = data.trim_end_matches('\\');
        let command = format!(
            "{} wine reg add \"{}\" /t {} /v \"{}\" /d \"{}\" /f",
            self.wine_env(),
            key,
            value_type.as_str(),
            value_name,
            data
        );
        let options = RunOptions::shell().as_user(&self.username).quiet();
        self.shell
            .run(&command, &options)
            .map_err(|e| WinemasonError::RegistryWrite {
                key: key.to_string(),
                value: value_name.to_string(),
                error: e.to_string(),
            })?;

        debug!("registry write {}\\{} = {:?}", key, value_name, data);
        Ok(())
    }

    /// Prepend a segment to the prefix's PATH value.
    ///
    /// Returns whether the stored value changed. An already-present segment
    /// (exact or covered by a stored wildcard) leaves the value untouched.
    pub fn prepend_to_path(&self, segment: &str) -> Result<bool> {
        let (value_type, existing) = self.read(ENVIRONMENT_KEY, PATH_VALUE)?;
        match merge_path_list(segment, &existing) {
            Some(merged) => {
                self.write(
                    ENVIRONMENT_KEY,
                    PATH_VALUE,
                    &merged,
                    RegWriteType::Explicit(value_type),
                )?;
                info!("prepended {:?} to wine PATH on {}", segment, self.prefix);
                Ok(true)
            }
            None => {
                debug!("{:?} already on wine PATH of {}", segment, self.prefix);
                Ok(false)
            }
        }
    }
}

/// Locate key then value name in the response text, then split the remainder
/// once into type token and data. Data keeps its embedded whitespace.
fn parse_query_response(
    stdout: &str,
    key: &str,
    value_name: &str,
) -> Option<(RegValueType, String)> {
    let after_key = stdout.split_once(key)?.1;
    let after_name = after_key.split_once(value_name)?.1;
    let rest = after_name.trim();
    let (type_token, data) = rest.split_once(char::is_whitespace)?;
    let value_type = RegValueType::parse(type_token)?;
    // the data runs to the end of the response line
    let data = data.trim_start().lines().next()?.trim_end();
    Some((value_type, data.to_string()))
}

/// Merge a new segment into a semicolon-delimited path list.
///
/// Existing segments are whitespace-trimmed, stripped of trailing
/// backslashes and de-duplicated in first-seen order. Membership of the new
/// segment is tested against each cleaned segment with glob semantics, so a
/// stored wildcard like `C:\Win*` counts as covering `C:\Windows`. Returns
/// `None` when the segment is already covered, otherwise the merged list
/// with the segment first.
pub fn merge_path_list(segment: &str, existing: &str) -> Option<String> {
    let mut cleaned: Vec<&str> = Vec::new();
    for part in existing.split(';') {
        let part = part.trim().trim_end_matches('\\');
        if part.is_empty() || cleaned.contains(&part) {
            continue;
        }
        cleaned.push(part);
    }

    let present = cleaned.iter().any(|part| {
        *part == segment
            || Pattern::new(part)
                .map(|pattern| pattern.matches(segment))
                .unwrap_or(false)
    });
    if present {
        return None;
    }

    let mut merged = Vec::with_capacity(cleaned.len() + 1);
    merged.push(segment);
    merged.extend(cleaned);
    Some(merged.join(";"))
}
