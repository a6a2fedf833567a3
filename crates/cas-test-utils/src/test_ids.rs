//! Fixed test ids for deterministic tests
//!
//! Ticket ids here are well-formed (valid prefix) but were never issued by a
//! generator, so they never collide with ids minted during a test.

// Users
pub const TEST_USER: &str = "casuser";
pub const TEST_USER_BOB: &str = "bob";
pub const TEST_PASSWORD: &str = "Mellon";
pub const TEST_PASSWORD_BOB: &str = "correct-horse-battery-staple";

// Services (relying parties)
pub const TEST_SERVICE_APP: &str = "https://app.example.org";
pub const TEST_SERVICE_MAIL: &str = "https://mail.example.org";
pub const TEST_SERVICE_PROXY: &str = "https://proxy.example.org/callback";
pub const TEST_SERVICE_BACKEND: &str = "https://backend.example.org";
pub const TEST_SERVICE_UNREGISTERED: &str = "https://evil.example.com";

// Ticket ids
pub const TEST_TGT_ID: &str = "TGT-1-test-granting-ticket";
pub const TEST_PGT_ID: &str = "PGT-1-test-proxy-granting-ticket";
pub const TEST_ST_ID: &str = "ST-1-test-service-ticket";
pub const TEST_PT_ID: &str = "PT-1-test-proxy-ticket";
pub const TEST_TST_ID: &str = "TST-1-test-transient-session";

// Multifactor
pub const TEST_MFA_PROVIDER: &str = "mfa-otp";
