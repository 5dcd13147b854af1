//! Caregiver check-in snapshot (energy / stress / sleep ratings).
//!
//! Supplied by the surrounding app and read-only to the controller. Each rating is an
//! ordinal 1–5 or absent.

use serde::{Deserialize, Serialize};

/// Lowest and highest accepted rating.
pub const RATING_MIN: u8 = 1;
pub const RATING_MAX: u8 = 5;

/// Current self-reported ratings. Absent fields serialize as `null`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckinSnapshot {
    pub energy: Option<u8>,
    pub stress: Option<u8>,
    pub sleep: Option<u8>,
}

impl CheckinSnapshot {
    pub fn new(energy: Option<u8>, stress: Option<u8>, sleep: Option<u8>) -> Self {
        Self {
            energy,
            stress,
            sleep,
        }
    }

    /// True when no rating has been given yet.
    pub fn is_empty(&self) -> bool {
        self.energy.is_none() && self.stress.is_none() && self.sleep.is_none()
    }

    /// Composite key used to detect changes; equal keys mean equal snapshots.
    pub fn key(&self) -> (Option<u8>, Option<u8>, Option<u8>) {
        (self.energy, self.stress, self.sleep)
    }

    /// Copy with every out-of-range rating dropped to absent.
    pub fn clamped(self) -> Self {
        let keep = |v: Option<u8>| v.filter(|r| (RATING_MIN..=RATING_MAX).contains(r));
        Self {
            energy: keep(self.energy),
            stress: keep(self.stress),
            sleep: keep(self.sleep),
        }
    }
}

/// Parse `energy=3 stress=4 sleep=-` style arguments onto an existing snapshot.
/// `-` or `none` clears a field. Unknown keys and bad values are errors.
pub fn parse_assignments(base: CheckinSnapshot, input: &str) -> Result<CheckinSnapshot, String> {
    let mut out = base;
    for part in input.split_whitespace() {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got `{}`", part))?;
        let value = match value.trim() {
            "-" | "none" | "" => None,
            v => {
                let n: u8 = v
                    .parse()
                    .map_err(|_| format!("`{}` is not a rating", v))?;
                if !(RATING_MIN..=RATING_MAX).contains(&n) {
                    return Err(format!(
                        "{} must be between {} and {}",
                        key, RATING_MIN, RATING_MAX
                    ));
                }
                Some(n)
            }
        };
        match key.trim().to_lowercase().as_str() {
            "energy" => out.energy = value,
            "stress" => out.stress = value,
            "sleep" => out.sleep = value,
            other => return Err(format!("unknown check-in field `{}`", other)),
        }
    }
    Ok(out)
}
