use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticSuggestionEntry {
    pub title: &'static str,
    pub description: &'static str,
    pub image_keyword: &'static str,
}

const fn entry(
    title: &'static str,
    description: &'static str,
    image_keyword: &'static str,
) -> StaticSuggestionEntry {
    StaticSuggestionEntry {
        title,
        description,
        image_keyword,
    }
}

pub const STATIC_SUGGESTIONS: &[StaticSuggestionEntry] = &[
    entry(
        "Morning walk",
        "Take a 20 minute walk outside before checking your phone.",
        "morning,walk",
    ),
    entry(
        "Read a chapter",
        "Pick up the book on your nightstand and finish one chapter.",
        "book,reading",
    ),
    entry(
        "Cook something new",
        "Try a recipe with an ingredient you have never used before.",
        "cooking,kitchen",
    ),
    entry(
        "Stretch for ten minutes",
        "A short mobility routine for your neck, back and hips.",
        "yoga,stretching",
    ),
    entry(
        "Call a friend",
        "Reach out to someone you have not talked to in a while.",
        "friends,phone",
    ),
    entry(
        "Tidy your desk",
        "Clear everything off, wipe it down and put back only what you need.",
        "desk,workspace",
    ),
    entry(
        "Sketch something",
        "Draw whatever is in front of you for fifteen minutes, no erasing.",
        "sketch,drawing",
    ),
    entry(
        "Learn ten words",
        "Study ten new words in a language you want to learn.",
        "language,notebook",
    ),
    entry(
        "Water the plants",
        "Check the soil of every plant and give the dry ones a drink.",
        "houseplants,garden",
    ),
    entry(
        "Journal for a bit",
        "Write down three things that went well today and one to improve.",
        "journal,writing",
    ),
    entry(
        "Go for a bike ride",
        "Ride a loop around the neighbourhood at an easy pace.",
        "bicycle,street",
    ),
    entry(
        "Listen to an album",
        "Play one album start to finish without skipping a track.",
        "vinyl,music",
    ),
];

#[derive(Debug, Clone, Copy)]
pub struct StaticCatalog {
    entries: &'static [StaticSuggestionEntry],
}

impl StaticCatalog {
    pub fn builtin() -> Self {
        Self::new(STATIC_SUGGESTIONS)
    }

    pub fn new(entries: &'static [StaticSuggestionEntry]) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn sample<R: Rng + ?Sized>(
        &self,
        count: usize,
        rng: &mut R,
    ) -> Vec<&'static StaticSuggestionEntry> {
        let entries: &'static [StaticSuggestionEntry] = self.entries;
        entries.choose_multiple(rng, count).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn titles_are_unique() {
        let titles: HashSet<_> = STATIC_SUGGESTIONS.iter().map(|e| e.title).collect();
        assert_eq!(titles.len(), STATIC_SUGGESTIONS.len());
    }

    #[test]
    fn sample_has_no_duplicates() {
        let catalog = StaticCatalog::builtin();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let picked = catalog.sample(5, &mut rng);
            let titles: HashSet<_> = picked.iter().map(|e| e.title).collect();
            assert_eq!(picked.len(), 5);
            assert_eq!(titles.len(), 5);
        }
    }

    #[test]
    fn same_seed_same_sample() {
        let catalog = StaticCatalog::builtin();
        let first = catalog.sample(5, &mut StdRng::seed_from_u64(3));
        let second = catalog.sample(5, &mut StdRng::seed_from_u64(3));
        assert_eq!(first, second);
    }

    #[test]
    fn sample_is_capped_by_table_size() {
        const SMALL: &[StaticSuggestionEntry] = &[entry("A", "a", "a"), entry("B", "b", "b")];
        let catalog = StaticCatalog::new(SMALL);
        let picked = catalog.sample(5, &mut StdRng::seed_from_u64(1));
        assert_eq!(picked.len(), 2);
    }
}
