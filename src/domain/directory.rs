//! Directory (LDAP / Active Directory) domain types

use super::user::DirectoryUser;
use serde::Serialize;
use std::collections::HashMap;

/// userAccountControl bit marking a disabled account
const UAC_ACCOUNTDISABLE: u32 = 0x2;

/// Directory server flavor, selected once from configuration.
///
/// The two flavors store passwords in incompatible representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryFlavor {
    /// OpenLDAP-style directory keyed by `uid`; passwords in `userPassword`
    Posix,
    /// Windows Active Directory; passwords in `unicodePwd`
    ActiveDirectory,
}

impl DirectoryFlavor {
    /// Derive the flavor from the configured username attribute.
    pub fn from_user_attribute(attribute: &str) -> Self {
        if attribute.eq_ignore_ascii_case("uid") {
            DirectoryFlavor::Posix
        } else {
            DirectoryFlavor::ActiveDirectory
        }
    }
}

impl std::str::FromStr for DirectoryFlavor {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "posix" | "openldap" => Ok(DirectoryFlavor::Posix),
            "ad" | "active_directory" | "activedirectory" => Ok(DirectoryFlavor::ActiveDirectory),
            other => Err(format!("unknown directory flavor '{}'", other)),
        }
    }
}

/// One entry returned by a directory search
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attrs: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attrs: HashMap::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    /// First value of an attribute, or "" when absent.
    ///
    /// Attribute names compare case-insensitively, as directories do.
    pub fn attr(&self, name: &str) -> &str {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Map the entry to a local user shape.
    ///
    /// Returns `None` when the entry lacks the username attribute.
    pub fn to_directory_user(&self, user_attribute: &str) -> Option<DirectoryUser> {
        let username = self.attr(user_attribute).trim();
        if username.is_empty() {
            return None;
        }
        Some(DirectoryUser {
            username: username.to_string(),
            name: self.attr("cn").to_string(),
            is_active: account_active(self.attr("userAccountControl")),
            phone_number: self.attr("telephoneNumber").to_string(),
            email: self.attr("mail").to_string(),
        })
    }
}

/// Derive the active flag from an AD `userAccountControl` value.
///
/// 514 (disabled) and 66050 (disabled, password never expires) both carry the
/// ACCOUNTDISABLE bit. Entries without the attribute (POSIX directories) are
/// active.
pub fn account_active(user_account_control: &str) -> bool {
    match user_account_control.trim().parse::<u32>() {
        Ok(uac) => uac & UAC_ACCOUNTDISABLE == 0,
        Err(_) => true,
    }
}
