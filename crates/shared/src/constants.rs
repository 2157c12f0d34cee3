/// Maximum length of a page or alias title, in characters.
pub const TITLE_LENGTH_LIMIT: usize = 200;

/// Maximum length of a page body, in characters. Derived from the chat
/// platform's 2000-character message ceiling minus the worst-case edit
/// command overhead, rounded down to a multiple of 50.
pub const CONTENT_LENGTH_LIMIT: usize = round_down(2000 - 215, 50);

/// Default lookback window for usage and editor statistics.
pub const RECENT_CUTOFF_WEEKS: i64 = 4;

/// Lookback window for the recent-revisions listing.
pub const RECENT_REVISIONS_CUTOFF_WEEKS: i64 = 2;

/// How many entries top-pages and top-editors listings return.
pub const TOP_LIMIT: i64 = 3;

/// Round `n` down to the nearest multiple of `multiple`.
pub const fn round_down(n: usize, multiple: usize) -> usize {
    n / multiple * multiple
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_limit_is_1750() {
        assert_eq!(CONTENT_LENGTH_LIMIT, 1750);
    }

    #[test]
    fn round_down_to_multiple() {
        assert_eq!(round_down(1785, 50), 1750);
        assert_eq!(round_down(1800, 50), 1800);
        assert_eq!(round_down(49, 50), 0);
    }

    #[test]
    fn limits_are_positive() {
        assert!(TITLE_LENGTH_LIMIT > 0);
        assert!(CONTENT_LENGTH_LIMIT > 0);
        assert!(RECENT_CUTOFF_WEEKS > 0);
        assert!(RECENT_REVISIONS_CUTOFF_WEEKS > 0);
        assert!(TOP_LIMIT > 0);
    }
}
