//! Marker-code bookkeeping for stored XSS detection.
//!
//! The reflected-XSS module registers a fresh random code for every probe it
//! sends. The stored-XSS sweep later looks for those codes (or their
//! confirmed payloads) in unrelated pages; the correlator owns the code
//! table and enforces the state machine, so a stored hit is reported exactly
//! once per code.

use std::collections::HashMap;

use rand::Rng;

use crate::models::Resource;

/// Payload placeholder replaced by the marker code.
pub const PLACEHOLDER: &str = "__XSS__";

const DEFAULT_TEMPLATES: &[&str] = &[
    "<script>alert('__XSS__')</script>",
    "\"><script>alert('__XSS__')</script>",
    "<img src=\"x\" onerror=\"alert('__XSS__')\">",
    "</textarea><script>alert('__XSS__')</script>",
];

/// Fresh marker: `w` plus 10 hex characters, unique per probe for any
/// realistic scan length.
pub fn generate_code() -> String {
    let value: u64 = rand::thread_rng().gen();
    format!("w{:010x}", value & 0xff_ffff_ffff)
}

/// Case-insensitive payload search, matching how browsers treat markup.
pub fn payload_present(body: &str, payload: &str) -> bool {
    body.to_lowercase().contains(&payload.to_lowercase())
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkerState {
    /// Injected, nothing confirmed yet.
    Probed,
    /// A payload built from this code reflected; the payload is kept so the
    /// stored sweep knows what to look for.
    ConfirmedReflected(String),
    /// Terminal. The finding for this code has been emitted.
    ConfirmedStored,
}

#[derive(Debug, Clone)]
pub struct MarkerEntry {
    pub origin: Resource,
    pub parameter: String,
    pub state: MarkerState,
}

pub struct XssCorrelator {
    entries: HashMap<String, MarkerEntry>,
    templates: Vec<String>,
}

impl Default for XssCorrelator {
    fn default() -> Self {
        XssCorrelator {
            entries: HashMap::new(),
            templates: DEFAULT_TEMPLATES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl XssCorrelator {
    pub fn templates(&self) -> &[String] {
        &self.templates
    }

    pub fn instantiate(template: &str, code: &str) -> String {
        template.replace(PLACEHOLDER, code)
    }

    /// Start tracking a code. The origin resource and parameter are what the
    /// stored sweep re-attacks.
    pub fn register(&mut self, code: String, origin: Resource, parameter: String) {
        self.entries.insert(
            code,
            MarkerEntry {
                origin,
                parameter,
                state: MarkerState::Probed,
            },
        );
    }

    pub fn get(&self, code: &str) -> Option<&MarkerEntry> {
        self.entries.get(code)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &MarkerEntry)> {
        self.entries.iter().map(|(c, e)| (c.as_str(), e))
    }

    /// Probed -> ConfirmedReflected. Ignored in any other state.
    pub fn confirm_reflected(&mut self, code: &str, payload: String) {
        if let Some(entry) = self.entries.get_mut(code) {
            if entry.state == MarkerState::Probed {
                entry.state = MarkerState::ConfirmedReflected(payload);
            }
        }
    }

    /// Every template failed for this code; forget it silently.
    pub fn exhaust(&mut self, code: &str) {
        if let Some(entry) = self.entries.get(code) {
            if entry.state == MarkerState::Probed {
                self.entries.remove(code);
            }
        }
    }

    /// ConfirmedReflected -> ConfirmedStored. True exactly once per code;
    /// repeats and wrong-state calls return false so the caller never emits
    /// a duplicate finding.
    pub fn confirm_stored(&mut self, code: &str) -> bool {
        match self.entries.get_mut(code) {
            Some(entry) => match entry.state {
                MarkerState::ConfirmedReflected(_) => {
                    entry.state = MarkerState::ConfirmedStored;
                    true
                }
                _ => false,
            },
            None => false,
        }
    }

    /// Codes whose marker text or confirmed payload appears in `body`.
    pub fn codes_in(&self, body: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(code, entry)| match &entry.state {
                MarkerState::Probed => body.contains(code.as_str()),
                MarkerState::ConfirmedReflected(payload) => payload_present(body, payload),
                MarkerState::ConfirmedStored => false,
            })
            .map(|(code, _)| code.clone())
            .collect()
    }
}
