use std::cmp::Ordering;
use std::fmt::Debug;

/// A user-supplied (or default) total order over byte strings, plus the two "shortening"
/// operations used to compress the table's index block.
///
/// `name()` is recorded in the manifest and compared on reopen; a mismatch is a fatal
/// [`Corruption`](crate::TableError::Corruption) error, since it would silently reinterpret an
/// already-ordered file under a different order.
pub trait Comparator: Debug + Send + Sync {
    fn cmp(&self, a: &[u8], b: &[u8]) -> Ordering;

    fn name(&self) -> &'static str;

    /// Writes into `separator` some `r` with `from <= r < to`, preferring a short `r` so that
    /// index blocks can store less data. `from` must compare strictly less than `to`.
    fn find_shortest_separator(&self, from: &[u8], to: &[u8], separator: &mut Vec<u8>);

    /// Writes into `successor` some `r >= key`, preferring a short `r`.
    fn find_short_successor(&self, key: &[u8], successor: &mut Vec<u8>);
}

/// Plain byte-lexicographic order: the default comparator, and the comparator always used for
/// the metaindex block regardless of the table's configured comparator.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl Comparator for BytewiseComparator {
    #[inline]
    fn cmp(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn name(&self) -> &'static str {
        "lsmkv.BytewiseComparator"
    }

    fn find_shortest_separator(&self, from: &[u8], to: &[u8], separator: &mut Vec<u8>) {
        separator.clear();
        let min_len = from.len().min(to.len());
        let common_len = crate::coding::common_prefix_len(from, to);

        // If one is a prefix of the other, there's no shorter separator than `from` itself.
        if common_len < min_len {
            let from_byte = from[common_len];
            if from_byte < 0xff && from_byte + 1 < to[common_len] {
                separator.extend_from_slice(&from[..common_len]);
                separator.push(from_byte + 1);
                return;
            }
        }
        separator.extend_from_slice(from);
    }

    fn find_short_successor(&self, key: &[u8], successor: &mut Vec<u8>) {
        successor.clear();
        let first_non_max = key.iter().take_while(|&&b| b == 0xff).count();
        successor.extend_from_slice(&key[..first_non_max]);
        if let Some(&byte) = key.get(first_non_max) {
            successor.push(byte + 1);
        } else {
            // `key` is all 0xff bytes (or empty); there is no shorter successor, so `key`
            // itself is returned.
            successor.extend_from_slice(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortest_separator_is_between_bounds() {
        let cmp = BytewiseComparator;
        let cases: &[(&[u8], &[u8])] =
            &[(b"abc", b"abd"), (b"abc", b"abcd"), (b"", b"a"), (b"abc", b"abce")];
        for (from, to) in cases {
            let mut sep = Vec::new();
            cmp.find_shortest_separator(from, to, &mut sep);
            assert_ne!(cmp.cmp(from, &sep), Ordering::Greater, "{from:?} <= {sep:?}");
            assert_eq!(cmp.cmp(&sep, to), Ordering::Less, "{sep:?} < {to:?}");
        }
    }

    #[test]
    fn short_successor_is_at_least_key() {
        let cmp = BytewiseComparator;
        for key in [&b""[..], b"abc", b"\xff\xff", b"a\xff"] {
            let mut succ = Vec::new();
            cmp.find_short_successor(key, &mut succ);
            assert_ne!(cmp.cmp(&succ, key), Ordering::Less);
        }
    }
}
