//! Hand-rolled validators shared by REST DTOs.

use validator::ValidationError;

/// Longest accepted player or room identifier.
const MAX_ID_LENGTH: usize = 64;

/// Validate a client-generated player identifier.
///
/// Identifiers must be non-empty, at most [`MAX_ID_LENGTH`] characters, and
/// free of whitespace and control characters.
pub fn validate_player_id(id: &str) -> Result<(), ValidationError> {
    validate_identifier(id, "invalid_player_id")
}

/// Validate a room identifier taken from the request path.
pub fn validate_room_id(id: &str) -> Result<(), ValidationError> {
    validate_identifier(id, "invalid_room_id")
}

fn validate_identifier(id: &str, code: &'static str) -> Result<(), ValidationError> {
    if id.is_empty() || id.chars().count() > MAX_ID_LENGTH {
        return Err(ValidationError::new(code));
    }
    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::new(code));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        assert!(validate_player_id("p1").is_ok());
        assert!(validate_room_id("arena").is_ok());
        assert!(validate_player_id("player-42_x").is_ok());
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert!(validate_player_id("").is_err());
        let long = "x".repeat(MAX_ID_LENGTH + 1);
        assert!(validate_player_id(&long).is_err());
    }

    #[test]
    fn rejects_whitespace_and_control_characters() {
        assert!(validate_player_id("p 1").is_err());
        assert!(validate_room_id("room\n").is_err());
    }
}
