//! Suggested prompts derived from the current check-in.
//!
//! Pure and deterministic: no network, no session state.

use crate::checkin::CheckinSnapshot;
use serde::Serialize;

const MAX_SUGGESTIONS: usize = 3;
const MIN_SUGGESTIONS: usize = 2;

/// One suggested prompt. The renderer maps the key to localized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Prompt {
    Overwhelmed,
    CalmDown,
    NeedEnergy,
    PoorSleep,
    NeedMoment,
    Uplifting,
}

impl Prompt {
    /// Stable key (e.g. `"calmDown"`), as used by the localization tables.
    pub fn key(&self) -> &'static str {
        match self {
            Prompt::Overwhelmed => "overwhelmed",
            Prompt::CalmDown => "calmDown",
            Prompt::NeedEnergy => "needEnergy",
            Prompt::PoorSleep => "poorSleep",
            Prompt::NeedMoment => "needMoment",
            Prompt::Uplifting => "uplifting",
        }
    }
}

impl std::fmt::Display for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Up to three prompts for the given check-in.
pub fn suggest(checkin: &CheckinSnapshot) -> Vec<Prompt> {
    let mut out = Vec::with_capacity(4);
    if checkin.stress.is_some_and(|s| s >= 4) {
        out.push(Prompt::Overwhelmed);
        out.push(Prompt::CalmDown);
    }
    if checkin.energy.is_some_and(|e| e <= 2) {
        out.push(Prompt::NeedEnergy);
    }
    if checkin.sleep.is_some_and(|s| s <= 2) {
        out.push(Prompt::PoorSleep);
    }
    for fallback in [Prompt::NeedMoment, Prompt::Uplifting] {
        if out.len() >= MIN_SUGGESTIONS {
            break;
        }
        if !out.contains(&fallback) {
            out.push(fallback);
        }
    }
    out.truncate(MAX_SUGGESTIONS);
    out
}
