//! TOTP engine for multi-factor authentication
//!
//! Generates and validates time-based one-time codes and builds the
//! otpauth enrollment URI / QR code. Compatible with Google Authenticator,
//! Authy, and other TOTP apps.
//!
//! Algorithm, digit count, and period are fixed constants: they are baked
//! into the provisioning URI at enrollment, so changing them invalidates
//! every enrolled secret.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use subtle::ConstantTimeEq;
use totp_rs::{Algorithm, Secret, TOTP};

/// TOTP code length
pub const TOTP_DIGITS: usize = 6;

/// Time step in seconds
pub const TOTP_STEP: u64 = 30;

/// Accepted clock drift, in steps either side of now
pub const TOTP_SKEW: u8 = 1;

#[derive(Debug, thiserror::Error)]
pub enum TotpError {
    #[error("Invalid TOTP secret")]
    InvalidSecret,
    #[error("Failed to create TOTP instance")]
    Creation,
    #[error("Failed to generate QR code")]
    QrGeneration,
}

/// Generate a new TOTP secret (20 random bytes, base32 encoded)
pub fn generate_secret() -> String {
    let secret = Secret::generate_secret();
    secret.to_encoded().to_string()
}

/// Create a TOTP instance bound to an account label
fn create_totp(secret: &str, issuer: &str, email: &str) -> Result<TOTP, TotpError> {
    let secret_bytes = Secret::Encoded(secret.to_string())
        .to_bytes()
        .map_err(|_| TotpError::InvalidSecret)?;

    TOTP::new(
        Algorithm::SHA512,
        TOTP_DIGITS,
        TOTP_SKEW,
        TOTP_STEP,
        secret_bytes,
        Some(issuer.to_string()),
        email.to_string(),
    )
    .map_err(|_| TotpError::Creation)
}

/// Verify a TOTP code against a secret using constant-time comparison.
///
/// Accepts codes from the current period plus/minus one step for clock
/// drift. Malformed input is simply invalid, never an error.
pub fn verify_code(secret: &str, code: &str, issuer: &str, email: &str) -> Result<bool, TotpError> {
    let totp = create_totp(secret, issuer, email)?;

    if code.len() != TOTP_DIGITS || !code.chars().all(|c| c.is_ascii_digit()) {
        return Ok(false);
    }

    let current_time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|_| TotpError::Creation)?
        .as_secs();

    let time_steps = [
        current_time.saturating_sub(TOTP_STEP),
        current_time,
        current_time.saturating_add(TOTP_STEP),
    ];

    let code_bytes = code.as_bytes();

    for time_step in time_steps {
        let expected_code = totp.generate(time_step);
        let expected_bytes = expected_code.as_bytes();
        if code_bytes.len() == expected_bytes.len() && code_bytes.ct_eq(expected_bytes).into() {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Get the otpauth URI for enrollment (QR target or manual entry)
pub fn provisioning_uri(secret: &str, issuer: &str, email: &str) -> Result<String, TotpError> {
    let totp = create_totp(secret, issuer, email)?;
    Ok(totp.get_url())
}

/// Render the enrollment URI as a base64 PNG data URL
pub fn qr_code_data_url(secret: &str, issuer: &str, email: &str) -> Result<String, TotpError> {
    let uri = provisioning_uri(secret, issuer, email)?;

    let qr = qrcode::QrCode::new(uri.as_bytes()).map_err(|_| TotpError::QrGeneration)?;
    let qr_image = qr.render::<image::Luma<u8>>().build();

    let dynamic_image = image::DynamicImage::ImageLuma8(qr_image);
    let mut png_data = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut png_data);
    dynamic_image
        .write_to(&mut cursor, image::ImageFormat::Png)
        .map_err(|_| TotpError::QrGeneration)?;

    Ok(format!("data:image/png;base64,{}", BASE64.encode(&png_data)))
}

/// Generate the code for an arbitrary unix timestamp (test helper)
#[cfg(test)]
fn generate_code_at(secret: &str, issuer: &str, email: &str, time: u64) -> Result<String, TotpError> {
    let totp = create_totp(secret, issuer, email)?;
    Ok(totp.generate(time))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ISSUER: &str = "Huddle";
    const EMAIL: &str = "test@example.com";

    fn now() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    #[test]
    fn test_generate_secret_is_base32() {
        let secret = generate_secret();
        assert!(!secret.is_empty());
        assert!(secret
            .chars()
            .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)));
    }

    #[test]
    fn test_current_code_is_valid() {
        let secret = generate_secret();
        let code = generate_code_at(&secret, ISSUER, EMAIL, now()).unwrap();

        assert!(verify_code(&secret, &code, ISSUER, EMAIL).unwrap());
    }

    #[test]
    fn test_adjacent_window_is_tolerated() {
        let secret = generate_secret();

        let previous = generate_code_at(&secret, ISSUER, EMAIL, now() - TOTP_STEP).unwrap();
        assert!(verify_code(&secret, &previous, ISSUER, EMAIL).unwrap());

        let next = generate_code_at(&secret, ISSUER, EMAIL, now() + TOTP_STEP).unwrap();
        assert!(verify_code(&secret, &next, ISSUER, EMAIL).unwrap());
    }

    #[test]
    fn test_distant_window_is_rejected() {
        let secret = generate_secret();
        let stale = generate_code_at(&secret, ISSUER, EMAIL, now() - 3 * TOTP_STEP).unwrap();

        // A three-step-old code can only collide with an accepted window by chance
        let accepted: Vec<String> = [now() - TOTP_STEP, now(), now() + TOTP_STEP]
            .iter()
            .map(|t| generate_code_at(&secret, ISSUER, EMAIL, *t).unwrap())
            .collect();
        if !accepted.contains(&stale) {
            assert!(!verify_code(&secret, &stale, ISSUER, EMAIL).unwrap());
        }
    }

    #[test]
    fn test_malformed_codes_are_invalid_not_errors() {
        let secret = generate_secret();

        assert!(!verify_code(&secret, "", ISSUER, EMAIL).unwrap());
        assert!(!verify_code(&secret, "12345", ISSUER, EMAIL).unwrap());
        assert!(!verify_code(&secret, "1234567", ISSUER, EMAIL).unwrap());
        assert!(!verify_code(&secret, "12345a", ISSUER, EMAIL).unwrap());
    }

    #[test]
    fn test_provisioning_uri_pins_the_constants() {
        let secret = generate_secret();
        let uri = provisioning_uri(&secret, ISSUER, EMAIL).unwrap();

        assert!(uri.starts_with("otpauth://totp/"));
        assert!(uri.contains("issuer=Huddle"));
        assert!(uri.contains("algorithm=SHA512"));
        assert!(uri.contains("digits=6"));
    }

    #[test]
    fn test_qr_code_is_a_png_data_url() {
        let secret = generate_secret();
        let data_url = qr_code_data_url(&secret, ISSUER, EMAIL).unwrap();

        assert!(data_url.starts_with("data:image/png;base64,"));
    }
}
