//! Allocator configuration.
//!
//! Two knobs, both readable from the environment:
//! - `ARENALLOC_FREE_POLICY`: `compat` (default) keeps the permissive free
//!   semantics, where any in-range address is accepted and clears the
//!   countdown from that byte onward. `checked` only accepts block bases.
//! - `ARENALLOC_JOURNAL_CAPACITY`: how many lifecycle records an allocator
//!   keeps before dropping the oldest.

/// Environment variable selecting the [`FreePolicy`].
pub const FREE_POLICY_ENV: &str = "ARENALLOC_FREE_POLICY";

/// Environment variable overriding [`HeapConfig::journal_capacity`].
pub const JOURNAL_CAPACITY_ENV: &str = "ARENALLOC_JOURNAL_CAPACITY";

/// How `free` treats addresses that are in range but not a block base.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FreePolicy {
    /// Any in-range address is accepted. An interior address clears only the
    /// tail of its block and leaves the head orphaned; an already-free byte
    /// is a zero-length success.
    #[default]
    Compat,
    /// Only the base of a live block is accepted. Everything else is
    /// rejected without touching the heap.
    Checked,
}

impl FreePolicy {
    /// Parse from string (case-insensitive). Unknown values fall back to
    /// [`FreePolicy::Compat`].
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "checked" | "strict" | "base-only" | "base_only" => Self::Checked,
            _ => Self::Compat,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Compat => "compat",
            Self::Checked => "checked",
        }
    }

    /// Returns true if interior and already-free addresses are rejected.
    #[must_use]
    pub const fn requires_base(self) -> bool {
        matches!(self, Self::Checked)
    }
}

/// Per-instance allocator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    pub free_policy: FreePolicy,
    /// Maximum number of retained lifecycle records. Zero disables the journal.
    pub journal_capacity: usize,
}

impl HeapConfig {
    pub const DEFAULT_JOURNAL_CAPACITY: usize = 4096;

    /// Read the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// Missing keys keep their defaults; an unparsable journal capacity is
    /// ignored.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(raw) = lookup(FREE_POLICY_ENV) {
            config.free_policy = FreePolicy::from_str_loose(&raw);
        }
        if let Some(capacity) = lookup(JOURNAL_CAPACITY_ENV).and_then(|raw| raw.trim().parse().ok()) {
            config.journal_capacity = capacity;
        }
        config
    }

    #[must_use]
    pub fn with_free_policy(mut self, free_policy: FreePolicy) -> Self {
        self.free_policy = free_policy;
        self
    }

    #[must_use]
    pub fn with_journal_capacity(mut self, journal_capacity: usize) -> Self {
        self.journal_capacity = journal_capacity;
        self
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            free_policy: FreePolicy::default(),
            journal_capacity: Self::DEFAULT_JOURNAL_CAPACITY,
        }
    }
}
