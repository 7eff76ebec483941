//! Identifier validation and quoting.
//!
//! Table and column names cannot be bound as statement parameters, so every
//! name that ends up in generated SQL goes through [`quote_mysql`].

use crate::error::{CopyError, Result};

/// MySQL limits identifiers to 64 characters.
const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Reject empty names, names with NUL bytes, and names over the length limit.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CopyError::Config("identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(CopyError::Config(format!(
            "identifier contains a null byte: {:?}",
            name
        )));
    }

    if name.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(CopyError::Config(format!(
            "identifier exceeds {} characters: {:?}",
            MAX_IDENTIFIER_LENGTH, name
        )));
    }

    Ok(())
}

/// Quote a MySQL identifier with backticks, doubling embedded backticks.
///
/// ```ignore
/// assert_eq!(quote_mysql("client_bu")?, "`client_bu`");
/// assert_eq!(quote_mysql("odd`name")?, "`odd``name`");
/// ```
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_mysql() {
        assert_eq!(quote_mysql("client_bu").unwrap(), "`client_bu`");
        assert_eq!(quote_mysql("odd`name").unwrap(), "`odd``name`");
    }

    #[test]
    fn test_validate_identifier_rejects() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("bad\0name").is_err());
        assert!(validate_identifier(&"x".repeat(65)).is_err());
        assert!(validate_identifier(&"x".repeat(64)).is_ok());
    }
}
