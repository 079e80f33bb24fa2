//! Internal keys: `UK || pack(S, T)`.
//!
//! `pack(S, T) = (S << 8) | T`, stored little-endian as the last 8 bytes of every internal key.
//! Ordering is UK ascending (user comparator), then `pack` descending — larger sequence wins
//! ties, and for equal sequence, larger value type wins, matching `ValueTypeForSeek`'s role as a
//! sentinel that sorts before every real entry at the same (UK, S).

use std::cmp::Ordering;
use std::sync::Arc;

use lsmkv_sstable::Comparator;

/// 56-bit monotone sequence number; the top byte of a packed `(seq, type)` is the value type.
pub const MAX_SEQUENCE_NUMBER: u64 = (1 << 56) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ValueType {
    Deletion = 0,
    Value = 1,
    Merge = 2,
}

impl ValueType {
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Deletion),
            1 => Some(Self::Value),
            2 => Some(Self::Merge),
            _ => None,
        }
    }
}

/// The sentinel type used when building a seek target: larger than every real value type, so
/// that at equal sequence numbers the seek target sorts before (i.e. "newer than") any real
/// entry.
pub const VALUE_TYPE_FOR_SEEK: u8 = ValueType::Merge as u8;

#[must_use]
pub fn pack_seq_and_type(seq: u64, value_type: u8) -> u64 {
    debug_assert!(seq <= MAX_SEQUENCE_NUMBER);
    (seq << 8) | u64::from(value_type)
}

#[must_use]
pub fn unpack_seq_and_type(packed: u64) -> (u64, u8) {
    (packed >> 8, (packed & 0xff) as u8)
}

/// Appends `pack(seq, value_type)` as 8 little-endian bytes after `user_key`, producing a
/// complete internal key.
pub fn append_internal_key(out: &mut Vec<u8>, user_key: &[u8], seq: u64, value_type: u8) {
    out.extend_from_slice(user_key);
    out.extend_from_slice(&pack_seq_and_type(seq, value_type).to_le_bytes());
}

#[must_use]
pub fn make_internal_key(user_key: &[u8], seq: u64, value_type: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(user_key.len() + 8);
    append_internal_key(&mut out, user_key, seq, value_type);
    out
}

/// Splits a well-formed internal key into its user-key prefix and `(seq, type)` suffix.
///
/// # Panics
/// Panics if `internal_key` is shorter than 8 bytes; every internal key produced by this crate
/// carries the 8-byte packed suffix.
#[must_use]
pub fn split_internal_key(internal_key: &[u8]) -> (&[u8], u64, u8) {
    let split = internal_key.len() - 8;
    let packed = u64::from_le_bytes(internal_key[split..].try_into().expect("8-byte suffix"));
    let (seq, value_type) = unpack_seq_and_type(packed);
    (&internal_key[..split], seq, value_type)
}

#[must_use]
pub fn extract_user_key(internal_key: &[u8]) -> &[u8] {
    &internal_key[..internal_key.len() - 8]
}

/// Wraps a user comparator to order internal keys: UK ascending, then `pack`
/// descending. `find_shortest_separator`/`find_short_successor` shorten only the user-key
/// portion, padding the result with `(MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK)` so the shortened
/// key still sorts before every real entry at the truncation point.
#[derive(Debug)]
pub struct InternalKeyComparator {
    pub user_comparator: Arc<dyn Comparator>,
    name: &'static str,
}

impl InternalKeyComparator {
    #[must_use]
    pub fn new(user_comparator: Arc<dyn Comparator>) -> Self {
        let name = format!("lsmkv.InternalKeyComparator({})", user_comparator.name());
        let name: &'static str = Box::leak(name.into_boxed_str());
        Self { user_comparator, name }
    }
}

impl Comparator for InternalKeyComparator {
    fn cmp(&self, a: &[u8], b: &[u8]) -> Ordering {
        let (ua, sa, ta) = split_internal_key(a);
        let (ub, sb, tb) = split_internal_key(b);
        match self.user_comparator.cmp(ua, ub) {
            Ordering::Equal => (sb, tb).cmp(&(sa, ta)),
            other => other,
        }
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn find_shortest_separator(&self, from: &[u8], to: &[u8], separator: &mut Vec<u8>) {
        let user_from = extract_user_key(from);
        let user_to = extract_user_key(to);
        let mut shortened = Vec::new();
        self.user_comparator.find_shortest_separator(user_from, user_to, &mut shortened);

        if shortened.len() < user_from.len()
            && self.user_comparator.cmp(user_from, &shortened) == Ordering::Less
        {
            separator.clear();
            append_internal_key(separator, &shortened, MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK);
        } else {
            separator.clear();
            separator.extend_from_slice(from);
        }
    }

    fn find_short_successor(&self, key: &[u8], successor: &mut Vec<u8>) {
        let user_key = extract_user_key(key);
        let mut shortened = Vec::new();
        self.user_comparator.find_short_successor(user_key, &mut shortened);

        if shortened.len() < user_key.len()
            && self.user_comparator.cmp(user_key, &shortened) == Ordering::Less
        {
            successor.clear();
            append_internal_key(successor, &shortened, MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK);
        } else {
            successor.clear();
            successor.extend_from_slice(key);
        }
    }
}

/// Wraps a user's [`FilterPolicy`] so filter blocks are built and probed against user keys,
/// never the full internal key. Internal keys embed a sequence number that differs between the
/// key a filter was built from and the key a later point lookup seeks with, so hashing/probing
/// the raw internal key would make every filter miss.
#[derive(Debug)]
pub struct InternalKeyFilterPolicy {
    inner: Arc<dyn lsmkv_sstable::FilterPolicy>,
    name: &'static str,
}

impl InternalKeyFilterPolicy {
    #[must_use]
    pub fn new(inner: Arc<dyn lsmkv_sstable::FilterPolicy>) -> Self {
        Self { name: inner.name(), inner }
    }
}

impl lsmkv_sstable::FilterPolicy for InternalKeyFilterPolicy {
    fn name(&self) -> &'static str {
        self.name
    }

    fn create_filter(&self, keys: &[&[u8]]) -> Vec<u8> {
        let user_keys: Vec<&[u8]> = keys.iter().map(|k| extract_user_key(k)).collect();
        self.inner.create_filter(&user_keys)
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        self.inner.key_may_match(extract_user_key(key), filter)
    }
}

/// Wraps a user-supplied filter policy in [`InternalKeyFilterPolicy`], the one place every
/// table-building and table-opening call site should go through.
#[must_use]
pub fn wrap_filter_policy(
    policy: Option<Arc<dyn lsmkv_sstable::FilterPolicy>>,
) -> Option<Arc<dyn lsmkv_sstable::FilterPolicy>> {
    policy.map(|p| Arc::new(InternalKeyFilterPolicy::new(p)) as Arc<dyn lsmkv_sstable::FilterPolicy>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsmkv_sstable::BytewiseComparator;

    fn cmp() -> InternalKeyComparator {
        InternalKeyComparator::new(Arc::new(BytewiseComparator))
    }

    #[test]
    fn orders_by_user_key_then_sequence_descending() {
        let c = cmp();
        let a = make_internal_key(b"k", 5, ValueType::Value as u8);
        let b = make_internal_key(b"k", 7, ValueType::Value as u8);
        assert_eq!(c.cmp(&b, &a), Ordering::Less, "higher sequence sorts first");

        let k1 = make_internal_key(b"a", 1, ValueType::Value as u8);
        let k2 = make_internal_key(b"b", 1, ValueType::Value as u8);
        assert_eq!(c.cmp(&k1, &k2), Ordering::Less);
    }

    #[test]
    fn ties_break_on_type_descending() {
        let c = cmp();
        let del = make_internal_key(b"k", 5, ValueType::Deletion as u8);
        let val = make_internal_key(b"k", 5, ValueType::Value as u8);
        assert_eq!(c.cmp(&val, &del), Ordering::Less);
    }

    #[test]
    fn seek_target_sorts_before_real_entries_at_same_sequence() {
        let c = cmp();
        let seek = make_internal_key(b"k", 5, VALUE_TYPE_FOR_SEEK);
        let real = make_internal_key(b"k", 5, ValueType::Value as u8);
        assert_ne!(c.cmp(&seek, &real), Ordering::Greater);
    }

    #[test]
    fn split_roundtrips() {
        let ik = make_internal_key(b"hello", 42, ValueType::Merge as u8);
        let (uk, seq, t) = split_internal_key(&ik);
        assert_eq!(uk, b"hello");
        assert_eq!(seq, 42);
        assert_eq!(t, ValueType::Merge as u8);
    }
}
