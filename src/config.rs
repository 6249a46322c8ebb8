//! Runtime settings read from the environment
//!
//! Every entry point streams large sections in bounded chunks. The chunk
//! size, the paging granularity of [`crate::paged::PagedVec`] and the
//! optional memory log are read **once** from the environment:
//!
//! | variable               | default | meaning                                   |
//! |------------------------|---------|-------------------------------------------|
//! | `ZKFORGE_CHUNK_POINTS` | 65536   | max points resident per streamed chunk     |
//! | `ZKFORGE_PAGE_BITS`    | 16      | `log2` of the `PagedVec` page length       |
//! | `ZKFORGE_MEMLOG`       | off     | `1`/`true` emits buffer-size debug lines   |
//!
//! Invalid values fall back to the default with a `warn!`.

#![forbid(unsafe_code)]

use std::sync::OnceLock;

use tracing::warn;

/// Default number of points held in memory per streamed chunk.
pub const DEFAULT_CHUNK_POINTS: usize = 1 << 16;
/// Default `log2` page length for paged vectors.
pub const DEFAULT_PAGE_BITS: u32 = 16;

/// Process-wide tunables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Max points per streamed chunk (ceremony, setup).
    pub chunk_points: usize,
    /// `log2` of the page length used by `PagedVec`.
    pub page_bits: u32,
    /// Emit buffer-size diagnostics at `debug!` level.
    pub memlog: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_points: DEFAULT_CHUNK_POINTS,
            page_bits: DEFAULT_PAGE_BITS,
            memlog: false,
        }
    }
}

impl Settings {
    /// Build settings from `ZKFORGE_*` variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build settings from an arbitrary key lookup (used by tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut s = Self::default();
        if let Some(v) = lookup("ZKFORGE_CHUNK_POINTS") {
            match v.parse::<usize>() {
                Ok(n) if n > 0 => s.chunk_points = n,
                _ => warn!("ignoring ZKFORGE_CHUNK_POINTS={v:?}: expected a positive integer"),
            }
        }
        if let Some(v) = lookup("ZKFORGE_PAGE_BITS") {
            match v.parse::<u32>() {
                Ok(b) if (4..=30).contains(&b) => s.page_bits = b,
                _ => warn!("ignoring ZKFORGE_PAGE_BITS={v:?}: expected 4..=30"),
            }
        }
        if let Some(v) = lookup("ZKFORGE_MEMLOG") {
            s.memlog = matches!(v.as_str(), "1" | "true" | "True" | "TRUE" | "yes");
        }
        s
    }
}

/// Global settings, initialised from the environment on first use.
pub fn settings() -> &'static Settings {
    static SETTINGS: OnceLock<Settings> = OnceLock::new();
    SETTINGS.get_or_init(Settings::from_env)
}

/// Log a buffer size when `ZKFORGE_MEMLOG` is set.
#[inline]
pub(crate) fn memlog(what: &str, elems: usize) {
    if settings().memlog {
        tracing::debug!(target: "zkforge::mem", "{what}: {elems} element(s) resident");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| m.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(Settings::from_lookup(|_| None), Settings::default());
    }

    #[test]
    fn parses_overrides() {
        let s = Settings::from_lookup(lookup(&[
            ("ZKFORGE_CHUNK_POINTS", "1024"),
            ("ZKFORGE_PAGE_BITS", "8"),
            ("ZKFORGE_MEMLOG", "1"),
        ]));
        assert_eq!(s.chunk_points, 1024);
        assert_eq!(s.page_bits, 8);
        assert!(s.memlog);
    }

    #[test]
    fn rejects_bad_values() {
        let s = Settings::from_lookup(lookup(&[
            ("ZKFORGE_CHUNK_POINTS", "0"),
            ("ZKFORGE_PAGE_BITS", "99"),
        ]));
        assert_eq!(s.chunk_points, DEFAULT_CHUNK_POINTS);
        assert_eq!(s.page_bits, DEFAULT_PAGE_BITS);
    }
}
