// persona-core/tests/masking.rs
// ============================================================================
// Module: Masking Tests
// Description: Masking strategies and their idempotence properties.
// Purpose: Pin partial, hash, and redact behavior.
// Dependencies: persona-core
// ============================================================================
//! ## Overview
//! Validates the three masking strategies: partial keeps two characters per
//! side, hash is a deterministic hex SHA-256, redact replaces outright.
//! Partial and redact are idempotent; hashing twice changes the value but
//! stays deterministic.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use persona_core::apply_masking;
use persona_core::MaskingStrategy;

// ============================================================================
// SECTION: Partial
// ============================================================================

/// Short values collapse to three stars.
#[test]
fn partial_short_values() {
    assert_eq!(apply_masking("abcd", MaskingStrategy::Partial), "***");
    assert_eq!(apply_masking("a", MaskingStrategy::Partial), "***");
    assert_eq!(apply_masking("", MaskingStrategy::Partial), "***");
}

/// Longer values keep the first and last two characters.
#[test]
fn partial_keeps_edges() {
    assert_eq!(apply_masking("a@x.com", MaskingStrategy::Partial), "a@***om");
    assert_eq!(apply_masking("abcdef", MaskingStrategy::Partial), "ab**ef");
}

/// Partial masking is idempotent: the masked form masks to itself.
#[test]
fn partial_is_idempotent() {
    let once = apply_masking("someone@example.com", MaskingStrategy::Partial);
    let twice = apply_masking(&once, MaskingStrategy::Partial);
    assert_eq!(once, twice);
}

// ============================================================================
// SECTION: Hash
// ============================================================================

/// Hashing is deterministic hex SHA-256.
#[test]
fn hash_is_deterministic() {
    let first = apply_masking("a@x.com", MaskingStrategy::Hash);
    let second = apply_masking("a@x.com", MaskingStrategy::Hash);
    assert_eq!(first, second);
    assert_eq!(first.len(), 64);
    assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
}

/// Hashing twice yields a different but deterministic value.
#[test]
fn hash_is_not_idempotent() {
    let once = apply_masking("a@x.com", MaskingStrategy::Hash);
    let twice = apply_masking(&once, MaskingStrategy::Hash);
    assert_ne!(once, twice);
    assert_eq!(twice, apply_masking(&once, MaskingStrategy::Hash));
}

// ============================================================================
// SECTION: Redact
// ============================================================================

/// Redact replaces the value and is idempotent.
#[test]
fn redact_is_idempotent() {
    let once = apply_masking("secret", MaskingStrategy::Redact);
    assert_eq!(once, "REDACTED");
    assert_eq!(apply_masking(&once, MaskingStrategy::Redact), "REDACTED");
}
