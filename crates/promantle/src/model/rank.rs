//! Rank descriptors: the granularity levels of the aggregation hierarchy.

/// Maps a key to its bucket position at one rank.
pub type PositionFn<K> = Box<dyn Fn(&K) -> i64 + Send + Sync>;

/// One granularity level of the aggregation hierarchy.
///
/// Rank 1 is the finest user-defined level; higher numbers are coarser.
/// Rank 0 (individual items) is implicit and has no `Rank` descriptor: its
/// positions come from a monotonic counter, not from the key.
pub struct Rank<K> {
    number: u32,
    name: String,
    position: PositionFn<K>,
}

impl<K> Rank<K> {
    /// Creates a rank with its internal number, query name and position
    /// function.
    pub(crate) fn new(number: u32, name: String, position: PositionFn<K>) -> Self {
        Self {
            number,
            name,
            position,
        }
    }

    /// The internal rank number, in `1..=N`.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// The name this rank is queried by.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Computes the bucket position of `key` at this rank.
    pub fn position_of(&self, key: &K) -> i64 {
        (self.position)(key)
    }
}
