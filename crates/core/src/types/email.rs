//! Normalised email addresses.
//!
//! Emails identify accounts and leads, so two spellings of one address must
//! compare equal. [`Email::parse`] trims and lowercases; everything that
//! stores or looks up an address goes through it.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Why a string is not an acceptable email address.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("email is required")]
    Empty,
    #[error("email must be at most {0} characters")]
    TooLong(usize),
    #[error("email must have exactly one @")]
    AtSign,
    #[error("email must have text on both sides of the @")]
    MissingPart,
    #[error("email must not contain whitespace")]
    Whitespace,
}

/// A trimmed, lowercased email address.
///
/// ```
/// use shelf_core::Email;
///
/// let email = Email::parse("  Buyer@Example.COM ").unwrap();
/// assert_eq!(email.as_str(), "buyer@example.com");
///
/// assert!(Email::parse("no-at-sign").is_err());
/// assert!(Email::parse("two@@x.com").is_err());
/// assert!(Email::parse("a b@x.com").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// RFC 5321 path limit.
    pub const MAX_LENGTH: usize = 254;

    /// Validate and normalise `raw`.
    ///
    /// # Errors
    ///
    /// Returns `EmailError` when the trimmed input is empty, too long, has
    /// other than one `@`, has an empty side, or contains whitespace.
    pub fn parse(raw: &str) -> Result<Self, EmailError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EmailError::Empty);
        }
        if trimmed.len() > Self::MAX_LENGTH {
            return Err(EmailError::TooLong(Self::MAX_LENGTH));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(EmailError::Whitespace);
        }

        let (local, domain) = trimmed.split_once('@').ok_or(EmailError::AtSign)?;
        if domain.contains('@') {
            return Err(EmailError::AtSign);
        }
        if local.is_empty() || domain.is_empty() {
            return Err(EmailError::MissingPart);
        }

        Ok(Self(trimmed.to_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Email {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Email {
    type Error = EmailError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Email {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Email {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        // Rows were normalised on the way in.
        Ok(Self(<String as sqlx::Decode<sqlx::Postgres>>::decode(value)?))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Email {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_common_shapes() {
        for raw in [
            "a@x.com",
            "first.last+tag@mail.example.co.uk",
            "UPPER@CASE.IO",
        ] {
            assert!(Email::parse(raw).is_ok(), "{raw}");
        }
    }

    #[test]
    fn test_normalises() {
        let email = Email::parse("\tA@X.com  ").unwrap();
        assert_eq!(email.as_str(), "a@x.com");
        assert_eq!(email, "a@x.com".parse().unwrap());
    }

    #[test]
    fn test_rejections() {
        assert_eq!(Email::parse("   "), Err(EmailError::Empty));
        assert_eq!(Email::parse("plain"), Err(EmailError::AtSign));
        assert_eq!(Email::parse("a@b@c"), Err(EmailError::AtSign));
        assert_eq!(Email::parse("@x.com"), Err(EmailError::MissingPart));
        assert_eq!(Email::parse("a@"), Err(EmailError::MissingPart));
        assert_eq!(Email::parse("a b@x.com"), Err(EmailError::Whitespace));

        let long = format!("{}@x.com", "a".repeat(Email::MAX_LENGTH));
        assert_eq!(
            Email::parse(&long),
            Err(EmailError::TooLong(Email::MAX_LENGTH))
        );
    }

    #[test]
    fn test_json_goes_through_parse() {
        let email: Email = serde_json::from_str("\" Mixed@Case.com \"").unwrap();
        assert_eq!(email.as_str(), "mixed@case.com");
        assert_eq!(serde_json::to_string(&email).unwrap(), "\"mixed@case.com\"");
        assert!(serde_json::from_str::<Email>("\"nope\"").is_err());
    }
}
