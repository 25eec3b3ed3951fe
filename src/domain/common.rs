//! Common types for domain models

use serde::{Deserialize, Serialize};

/// Where a user record came from, stored as VARCHAR ("LOCAL" / "LDAP")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserOrigin {
    #[default]
    Local,
    Ldap,
}

impl UserOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserOrigin::Local => "LOCAL",
            UserOrigin::Ldap => "LDAP",
        }
    }
}

impl std::fmt::Display for UserOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserOrigin {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LOCAL" => Ok(UserOrigin::Local),
            "LDAP" => Ok(UserOrigin::Ldap),
            other => Err(format!("unknown user origin '{}'", other)),
        }
    }
}

impl sqlx::Type<sqlx::MySql> for UserOrigin {
    fn type_info() -> sqlx::mysql::MySqlTypeInfo {
        <String as sqlx::Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &sqlx::mysql::MySqlTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::MySql>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::MySql> for UserOrigin {
    fn decode(value: sqlx::mysql::MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::MySql>>::decode(value)?;
        Ok(s.parse::<UserOrigin>()?)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::MySql> for UserOrigin {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<u8>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <String as sqlx::Encode<sqlx::MySql>>::encode_by_ref(&self.as_str().to_string(), buf)
    }
}
