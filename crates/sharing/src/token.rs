//! Random port and access token generation

use rand::Rng;

use crate::constants::{EPHEMERAL_PORT_END, EPHEMERAL_PORT_START, TOKEN_MAX, TOKEN_MIN};

/// Draw a random port from the dynamic/private range (49152-65535)
pub fn generate_port() -> u16 {
    rand::thread_rng().gen_range(EPHEMERAL_PORT_START..=EPHEMERAL_PORT_END)
}

/// Draw a random 6-digit numeric access token
pub fn generate_token() -> String {
    rand::thread_rng().gen_range(TOKEN_MIN..=TOKEN_MAX).to_string()
}

/// Check that a string has the shape of an access token
///
/// Used to reject garbage early; it says nothing about whether the token
/// belongs to an active session.
pub fn is_well_formed_token(token: &str) -> bool {
    token.len() == 6 && token.bytes().all(|b| b.is_ascii_digit()) && !token.starts_with('0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_in_dynamic_range() {
        for _ in 0..1_000 {
            let port = generate_port();
            assert!(port >= EPHEMERAL_PORT_START);
        }
    }

    #[test]
    fn test_token_shape() {
        for _ in 0..1_000 {
            let token = generate_token();
            assert_eq!(token.len(), 6);
            let value: u32 = token.parse().unwrap();
            assert!((TOKEN_MIN..=TOKEN_MAX).contains(&value));
            assert!(is_well_formed_token(&token));
        }
    }

    #[test]
    fn test_malformed_tokens() {
        assert!(!is_well_formed_token(""));
        assert!(!is_well_formed_token("12345"));
        assert!(!is_well_formed_token("1234567"));
        assert!(!is_well_formed_token("012345"));
        assert!(!is_well_formed_token("12a456"));
        assert!(!is_well_formed_token("１２３４５６"));
    }
}
