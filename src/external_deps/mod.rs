//! Integrations that rely on third-party software.
//!
//! Currently this is the browser automation binding that the challenge
//! session drives; the concrete Chromium engine sits behind the `chromium`
//! feature.

pub mod browser;

pub use browser::{
    BrowserEngine, BrowserError, BrowserPage, BrowserProfile, BrowserResult, LaunchOptions,
    ProbeOutcome,
};

#[cfg(feature = "chromium")]
pub use browser::ChromiumEngine;
