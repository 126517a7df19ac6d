// persona-config/tests/config.rs
// ============================================================================
// Module: Configuration Tests
// Description: Defaults, parsing, and fail-closed validation.
// Purpose: Pin the documented defaults and the validation envelope.
// Dependencies: persona-config
// ============================================================================
//! ## Overview
//! Validates that an empty config yields the documented pipeline defaults,
//! that TOML sections override them, and that out-of-range values and
//! unknown fields fail closed.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::time::Duration;

use persona_config::ConfigError;
use persona_config::PersonaConfig;
use persona_config::StoreBackend;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// An empty config reproduces the documented defaults.
#[test]
fn empty_config_uses_defaults() {
    let config = PersonaConfig::parse("").expect("parses");
    assert_eq!(config.pipeline.workers, 1);
    assert_eq!(config.pipeline.queue_capacity, 1000);
    assert_eq!(config.locks.profile_ttl_ms, 1_000);
    assert_eq!(config.locks.unify_ttl_ms, 5_000);
    assert_eq!(config.locks.max_attempts, 10);
    assert_eq!(config.locks.retry_delay_ms, 100);
    assert_eq!(config.store.backend, StoreBackend::Memory);
    assert_eq!(config.server.bind_addr.port(), 8080);
}

/// The lock section converts into the runtime lock config.
#[test]
fn lock_section_converts() {
    let config = PersonaConfig::parse(
        "[locks]\nprofile_ttl_ms = 2000\nunify_ttl_ms = 8000\nmax_attempts = 5\nretry_delay_ms = 50\n",
    )
    .expect("parses");
    let locks = config.locks.to_lock_config();
    assert_eq!(locks.profile_ttl, Duration::from_millis(2000));
    assert_eq!(locks.unify_ttl, Duration::from_millis(8000));
    assert_eq!(locks.max_attempts, 5);
    assert_eq!(locks.retry_delay, Duration::from_millis(50));
}

// ============================================================================
// SECTION: Overrides
// ============================================================================

/// Sections override individual fields, keeping the rest at defaults.
#[test]
fn sections_override_defaults() {
    let config = PersonaConfig::parse(
        "[server]\nbind_addr = \"0.0.0.0:9090\"\n\n[pipeline]\nworkers = 4\n",
    )
    .expect("parses");
    assert_eq!(config.server.bind_addr.port(), 9090);
    assert_eq!(config.pipeline.workers, 4);
    assert_eq!(config.pipeline.queue_capacity, 1000);
}

/// The sqlite backend requires a path.
#[test]
fn sqlite_backend_requires_path() {
    let missing = PersonaConfig::parse("[store]\nbackend = \"sqlite\"\n");
    assert!(matches!(missing, Err(ConfigError::Invalid(_))));

    let config = PersonaConfig::parse("[store]\nbackend = \"sqlite\"\npath = \"persona.db\"\n")
        .expect("parses");
    assert_eq!(config.store.backend, StoreBackend::Sqlite);
}

// ============================================================================
// SECTION: Fail-Closed Validation
// ============================================================================

/// Out-of-range pipeline and lock values are rejected.
#[test]
fn rejects_out_of_range_values() {
    assert!(matches!(
        PersonaConfig::parse("[pipeline]\nworkers = 0\n"),
        Err(ConfigError::Invalid(_))
    ));
    assert!(matches!(
        PersonaConfig::parse("[pipeline]\nqueue_capacity = 0\n"),
        Err(ConfigError::Invalid(_))
    ));
    assert!(matches!(
        PersonaConfig::parse("[locks]\nprofile_ttl_ms = 1\n"),
        Err(ConfigError::Invalid(_))
    ));
    assert!(matches!(
        PersonaConfig::parse("[locks]\nmax_attempts = 0\n"),
        Err(ConfigError::Invalid(_))
    ));
}

/// Unknown fields fail closed rather than being ignored.
#[test]
fn rejects_unknown_fields() {
    assert!(matches!(
        PersonaConfig::parse("[server]\nlisten = \"0.0.0.0:1\"\n"),
        Err(ConfigError::Parse(_))
    ));
    assert!(matches!(
        PersonaConfig::parse("[surprise]\nx = 1\n"),
        Err(ConfigError::Parse(_))
    ));
}

/// Malformed TOML is a parse error.
#[test]
fn rejects_malformed_toml() {
    assert!(matches!(PersonaConfig::parse("not toml ["), Err(ConfigError::Parse(_))));
}
