//! Browser session adapter for the Gauntlet flow.
//!
//! The core consumes the [`session::PageSession`] capability; this crate
//! provides the fantoccini/WebDriver implementation together with stealth
//! and behavioral helpers.
//!
//! - [`driver::GauntletDriver`]: WebDriver bootstrap with stealth capabilities
//! - [`page::WebDriverSession`]: fallback-chain selector operations
//! - [`behavioral::BehavioralEngine`]: human-like timings and typing
//! - [`stealth`]: Chrome arguments and JS evasions

pub mod behavioral;
pub mod driver;
pub mod fingerprint;
pub mod page;
pub mod session;
pub mod stealth;
