//! Shared test utilities for domain testing.
//!
//! `TestDataBuilder` produces deterministic, valid identifiers so tests are
//! reproducible: the same seed (or test name) always yields the same user
//! id, notification id, and email address.

use uuid::Uuid;

/// Builder for test data with deterministic randomization.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    /// Create a new builder with an explicit seed.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from a test name (seed derived from the name's hash).
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_create_preferences");
    /// assert_eq!(builder.user_id().len(), 32);
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Expand the seed into 16 bytes, perturbed by a domain tag so the
    /// different id kinds don't collide.
    fn seed_bytes(&self, tag: u8) -> [u8; 16] {
        let bytes = self.seed.to_le_bytes();
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&bytes);
        out[8..16].copy_from_slice(&bytes);
        out[0] ^= tag;
        out
    }

    /// Deterministic 32-character lowercase hex user id.
    pub fn user_id(&self) -> String {
        Uuid::from_bytes(self.seed_bytes(0x01)).simple().to_string()
    }

    /// Deterministic 32-character lowercase hex notification id.
    pub fn notification_id(&self) -> String {
        Uuid::from_bytes(self.seed_bytes(0x02)).simple().to_string()
    }

    /// Deterministic email address under example.com.
    pub fn email(&self, local_part: &str) -> String {
        format!("{}-{}@example.com", local_part, self.seed)
    }
}

/// Test assertion helpers
pub mod assertions {
    /// Assert that an optional value is Some, with context in the panic.
    pub fn assert_some<T>(value: Option<T>, context: &str) -> T {
        value.unwrap_or_else(|| panic!("{}: expected Some, got None", context))
    }

    /// Assert a string is a well-formed 32-hex identifier.
    pub fn assert_hex_id(value: &str, context: &str) {
        assert_eq!(value.len(), 32, "{}: id has wrong length: {:?}", context, value);
        assert!(
            value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')),
            "{}: id is not lowercase hex: {:?}",
            context,
            value
        );
    }
}
