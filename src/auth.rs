use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use uuid::Uuid;

const PBKDF2_ROUNDS: u32 = 10_000;

fn derive_hex(password: &str, salt: &[u8], rounds: u32) -> String {
    let mut out = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, rounds, &mut out);
    out.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Salted PBKDF2-HMAC-SHA256, stored as `pbkdf2-sha256$<rounds>$<salt>$<hash>`
/// so the rounds can change without invalidating existing hashes.
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    let hash = derive_hex(password, salt.as_bytes(), PBKDF2_ROUNDS);
    format!("pbkdf2-sha256${}${}${}", PBKDF2_ROUNDS, salt, hash)
}

pub fn verify_password(stored: &str, attempt: &str) -> bool {
    let parts: Vec<&str> = stored.split('$').collect();
    if parts.len() != 4 || parts[0] != "pbkdf2-sha256" {
        return false;
    }
    let Ok(rounds) = parts[1].parse::<u32>() else {
        return false;
    };
    derive_hex(attempt, parts[2].as_bytes(), rounds) == parts[3]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_verifies() {
        let stored = hash_password("hunter2");
        assert!(verify_password(&stored, "hunter2"));
        assert!(!verify_password(&stored, "hunter3"));
        assert!(!verify_password(&stored, ""));
    }

    #[test]
    fn hashes_are_salted() {
        assert_ne!(hash_password("same"), hash_password("same"));
    }

    #[test]
    fn garbage_stored_value_never_verifies() {
        assert!(!verify_password("", "x"));
        assert!(!verify_password("plaintext", "plaintext"));
        assert!(!verify_password("pbkdf2-sha256$abc$salt$hash", "x"));
    }
}
