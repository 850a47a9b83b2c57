//! Random passage selection for the "surprise me" flow.
//!
//! Draws a book uniformly, then a chapter of that book uniformly, then a verse
//! of that chapter uniformly. The result is book-uniform, not verse-uniform:
//! a verse of Obadiah is far more likely than any single verse of Psalms.
//! Only the anchor verse is chosen here; the generative service picks the
//! surrounding range.

use lectio_core::{books, Book, PassageAnchor};
use rand::rngs::{StdRng, ThreadRng};
use rand::{Rng, SeedableRng};

/// A drawn passage: book, chapter and anchor verse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassageSelection {
    pub book: &'static str,
    pub chapter: u32,
    pub anchor_verse: u32,
}

impl PassageSelection {
    /// An open-range anchor for the resolver.
    pub fn into_anchor(self) -> PassageAnchor {
        PassageAnchor::anchor_only(self.book, self.chapter, self.anchor_verse)
    }
}

/// Book-uniform random passage selector over the canon tables.
#[derive(Debug)]
pub struct RandomPassageSelector<R: Rng> {
    rng: R,
    books: &'static [Book],
}

impl RandomPassageSelector<ThreadRng> {
    /// Selector backed by the thread-local generator.
    pub fn new() -> Self {
        Self::with_rng(rand::rng())
    }
}

impl Default for RandomPassageSelector<ThreadRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomPassageSelector<StdRng> {
    /// Reproducible selector.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> RandomPassageSelector<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng, books: books() }
    }

    pub fn select(&mut self) -> PassageSelection {
        let book = &self.books[self.rng.random_range(0..self.books.len())];
        let chapter = self.rng.random_range(1..=book.chapters());
        // Every canon chapter has at least one verse
        let verses = book.verses_in(chapter).unwrap_or(1);
        let anchor_verse = self.rng.random_range(1..=verses);

        tracing::debug!(book = book.name(), chapter, anchor_verse, "Selected random passage");
        PassageSelection {
            book: book.name(),
            chapter,
            anchor_verse,
        }
    }

    /// Draw and convert straight into a resolver input.
    pub fn select_anchor(&mut self) -> PassageAnchor {
        self.select().into_anchor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectio_core::find_book;
    use proptest::prelude::*;
    use std::collections::HashMap;

    #[test]
    fn test_ten_thousand_draws_are_valid() {
        let mut selector = RandomPassageSelector::new();
        for _ in 0..10_000 {
            let selection = selector.select();
            let book = find_book(selection.book).expect("drawn book is in the canon");
            assert!(selection.chapter >= 1 && selection.chapter <= book.chapters());
            let verses = book.verses_in(selection.chapter).expect("chapter exists");
            assert!(selection.anchor_verse >= 1 && selection.anchor_verse <= verses);
        }
    }

    #[test]
    fn test_seeded_selector_is_reproducible() {
        let first: Vec<_> = {
            let mut selector = RandomPassageSelector::seeded(7);
            (0..20).map(|_| selector.select()).collect()
        };
        let second: Vec<_> = {
            let mut selector = RandomPassageSelector::seeded(7);
            (0..20).map(|_| selector.select()).collect()
        };
        assert_eq!(first, second);
    }

    #[test]
    fn test_distribution_is_book_uniform() {
        let mut selector = RandomPassageSelector::seeded(42);
        let mut per_book: HashMap<&str, u32> = HashMap::new();
        let draws = 66_000;
        for _ in 0..draws {
            *per_book.entry(selector.select().book).or_default() += 1;
        }

        assert_eq!(per_book.len(), 66);
        // Expected 1000 per book; Psalms (150 chapters) gets no extra weight
        for (book, count) in &per_book {
            assert!(
                (800..=1200).contains(count),
                "{} drawn {} times",
                book,
                count
            );
        }
    }

    #[test]
    fn test_selection_becomes_open_anchor() {
        let anchor = PassageSelection {
            book: "Jonah",
            chapter: 2,
            anchor_verse: 9,
        }
        .into_anchor();
        assert!(anchor.open_range);
        assert_eq!(anchor.anchor_verse, Some(9));
        assert_eq!((anchor.start_verse, anchor.end_verse), (9, 9));
        assert!(anchor.validate().is_ok());
    }

    proptest! {
        #[test]
        fn prop_any_seed_yields_valid_anchor(seed in any::<u64>()) {
            let mut selector = RandomPassageSelector::seeded(seed);
            let anchor = selector.select_anchor();
            prop_assert!(anchor.validate().is_ok());
        }
    }
}
