//! Optimistic values: a confirmed value plus a local override.

/// A value confirmed by the authority, optionally shadowed by a local guess.
///
/// Reads prefer the override. The override is dropped by [`confirm`] or
/// [`reset`], and can be rolled back with [`revert`] when the command that
/// produced it is rejected.
///
/// [`confirm`]: Optimistic::confirm
/// [`reset`]: Optimistic::reset
/// [`revert`]: Optimistic::revert
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Optimistic<T> {
    confirmed: T,
    optimistic_override: Option<T>,
}

impl<T: Clone + PartialEq> Optimistic<T> {
    pub fn new(confirmed: T) -> Self {
        Self {
            confirmed,
            optimistic_override: None,
        }
    }

    /// The value to display.
    pub fn get(&self) -> &T {
        self.optimistic_override.as_ref().unwrap_or(&self.confirmed)
    }

    /// The last value confirmed by the authority.
    pub fn confirmed(&self) -> &T {
        &self.confirmed
    }

    /// Returns `true` while a local override is in effect.
    pub fn is_pending(&self) -> bool {
        self.optimistic_override.is_some()
    }

    /// Shadow the confirmed value. Returns the override that was replaced,
    /// which is what [`revert`](Self::revert) needs for a rollback.
    pub fn propose(&mut self, value: T) -> Option<T> {
        self.optimistic_override.replace(value)
    }

    /// Accept an authoritative value and drop any override.
    pub fn confirm(&mut self, value: T) {
        self.confirmed = value;
        self.optimistic_override = None;
    }

    /// Discard everything known and start over from `value`.
    pub fn reset(&mut self, value: T) {
        self.confirm(value);
    }

    /// Undo a rejected proposal.
    ///
    /// Only applies when the override still holds `proposed`; if an event or a
    /// later proposal replaced it meanwhile, that newer state wins and this
    /// returns `false`.
    pub fn revert(&mut self, proposed: &T, previous: Option<T>) -> bool {
        if self.optimistic_override.as_ref() != Some(proposed) {
            return false;
        }
        self.optimistic_override = previous;
        true
    }
}
