//! Validation helpers for DTOs.

use validator::ValidationError;

/// Guild ids are snowflakes: 17 to 20 ASCII digits.
///
/// ```ignore
/// validate_guild_id("100000000000000001") // Ok
/// validate_guild_id("guild-1")            // Err - not numeric
/// ```
pub fn validate_guild_id(id: &str) -> Result<(), ValidationError> {
    if !(17..=20).contains(&id.len()) {
        let mut err = ValidationError::new("guild_id_length");
        err.message = Some(format!("Guild ID must be 17 to 20 digits (got {})", id.len()).into());
        return Err(err);
    }

    if !id.chars().all(|c| c.is_ascii_digit()) {
        let mut err = ValidationError::new("guild_id_format");
        err.message = Some("Guild ID must only contain digits".into());
        return Err(err);
    }

    Ok(())
}

/// The three sides must be named and distinct.
pub fn validate_sides(sides: &[String; 3]) -> Result<(), ValidationError> {
    if sides.iter().any(|side| side.trim().is_empty()) {
        let mut err = ValidationError::new("sides_empty");
        err.message = Some("Every side needs a name".into());
        return Err(err);
    }

    let [first, second, third] = sides;
    if first == second || second == third || first == third {
        let mut err = ValidationError::new("sides_duplicate");
        err.message = Some("Side names must be distinct".into());
        return Err(err);
    }

    Ok(())
}

/// Festival windows must end strictly after they start.
pub fn validate_window(start_time_ms: u64, end_time_ms: u64) -> Result<(), ValidationError> {
    if end_time_ms <= start_time_ms {
        let mut err = ValidationError::new("window_order");
        err.message = Some("end_time_ms must be after start_time_ms".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_guild_id_valid() {
        assert!(validate_guild_id("100000000000000001").is_ok());
        assert!(validate_guild_id("12345678901234567890").is_ok());
    }

    #[test]
    fn test_validate_guild_id_invalid() {
        assert!(validate_guild_id("1234").is_err()); // too short
        assert!(validate_guild_id("123456789012345678901").is_err()); // too long
        assert!(validate_guild_id("10000000000000000a").is_err()); // not a digit
        assert!(validate_guild_id("").is_err());
    }

    #[test]
    fn test_validate_sides() {
        let sides = |a: &str, b: &str, c: &str| [a.to_owned(), b.to_owned(), c.to_owned()];
        assert!(validate_sides(&sides("Rock", "Paper", "Scissors")).is_ok());
        assert!(validate_sides(&sides("Rock", " ", "Scissors")).is_err());
        assert!(validate_sides(&sides("Rock", "Rock", "Scissors")).is_err());
    }

    #[test]
    fn test_validate_window() {
        assert!(validate_window(1_000, 2_000).is_ok());
        assert!(validate_window(2_000, 2_000).is_err());
        assert!(validate_window(3_000, 2_000).is_err());
    }
}
