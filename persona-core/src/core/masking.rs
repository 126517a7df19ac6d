// persona-core/src/core/masking.rs
// ============================================================================
// Module: Persona Masking
// Description: Masking strategies for sensitive trait values.
// Purpose: Redact string results before they are merged into a profile.
// Dependencies: crate::core::rules, sha2
// ============================================================================

//! ## Overview
//! Masking applies only to string results of enrichment rules that set
//! `masking_required`. `partial` keeps the first and last two characters,
//! `hash` produces a hex-encoded SHA-256 digest, and `redact` replaces the
//! value outright. `partial` and `redact` are idempotent; `hash` is
//! deterministic but not idempotent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use sha2::Digest;
use sha2::Sha256;

use crate::core::rules::MaskingStrategy;

// ============================================================================
// SECTION: Masking
// ============================================================================

/// Replacement emitted by the redact strategy.
const REDACTED: &str = "REDACTED";
/// Number of characters kept on each side by partial masking.
const PARTIAL_VISIBLE: usize = 2;

/// Applies the masking strategy to a string value.
#[must_use]
pub fn apply_masking(value: &str, strategy: MaskingStrategy) -> String {
    match strategy {
        MaskingStrategy::Partial => mask_partial(value),
        MaskingStrategy::Hash => hash_value(value),
        MaskingStrategy::Redact => REDACTED.to_string(),
    }
}

/// Masks the middle of a string, keeping two characters on each side.
fn mask_partial(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 2 * PARTIAL_VISIBLE {
        return "***".to_string();
    }
    let head: String = chars[..PARTIAL_VISIBLE].iter().collect();
    let tail: String = chars[chars.len() - PARTIAL_VISIBLE..].iter().collect();
    let masked = "*".repeat(chars.len() - 2 * PARTIAL_VISIBLE);
    format!("{head}{masked}{tail}")
}

/// Hex-encoded SHA-256 digest of the value.
fn hash_value(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
