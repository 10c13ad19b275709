//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest server identifier accepted from clients.
pub const MAX_SERVER_ID_LEN: usize = 64;

/// Validates that a server ID is 1 to 64 characters without whitespace or control characters.
///
/// # Examples
///
/// ```ignore
/// validate_server_id("eu-1")     // Ok
/// validate_server_id("")         // Err - empty
/// validate_server_id("eu 1")     // Err - whitespace
/// ```
pub fn validate_server_id(id: &str) -> Result<(), ValidationError> {
    let len = id.chars().count();
    if len == 0 || len > MAX_SERVER_ID_LEN {
        let mut err = ValidationError::new("server_id_length");
        err.message = Some(
            format!("Server ID must be between 1 and {MAX_SERVER_ID_LEN} characters (got {len})")
                .into(),
        );
        return Err(err);
    }

    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        let mut err = ValidationError::new("server_id_format");
        err.message = Some("Server ID must not contain whitespace or control characters".into());
        return Err(err);
    }

    Ok(())
}
