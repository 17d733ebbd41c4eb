//! Transfer token generation.
//!
//! A token is two words drawn uniformly and independently from a fixed
//! vocabulary, joined by a hyphen (`ocean-tiger`). It is spoken or typed
//! by the humans on each end, then salted into the session KDF. Words are
//! short, lowercase, and visually distinct to survive being read over a
//! voice call or copied from a screenshot.

use rand::rngs::OsRng;
use rand::Rng;

/// Token vocabulary. Alphabetical, lowercase ASCII, 3-6 letters each.
/// Drawing two words independently allows repeats.
pub const WORDS: &[&str] = &[
    "acorn", "amber", "anchor", "apple", "arrow", "atlas", "attic", "autumn", "award", "azure",
    "badge", "bagel", "bamboo", "barn", "basil", "beach", "beacon", "berry", "bison", "blade",
    "cabin", "cactus", "camel", "candle", "canoe", "canyon", "cedar", "cello", "chalk", "cherry",
    "daisy", "dawn", "delta", "denim", "desk", "dice", "dingo", "dome", "donut", "dragon",
    "eagle", "early", "earth", "echo", "elbow", "elder", "elm", "ember", "emblem", "engine",
    "fable", "falcon", "fern", "fiddle", "field", "flame", "flint", "forest", "fossil", "fox",
    "galaxy", "garden", "garlic", "gecko", "geyser", "ginger", "globe", "goose", "grape", "green",
    "hammer", "harbor", "hawk", "hazel", "heron", "hill", "honey", "horse", "hotel", "husky",
    "icing", "igloo", "index", "indigo", "inlet", "iris", "iron", "island", "ivory", "ivy",
    "jacket", "jade", "jaguar", "jasper", "jelly", "jigsaw", "jolly", "judge", "juice", "jungle",
    "karma", "kayak", "kelp", "kernel", "kettle", "kiosk", "kite", "kiwi", "knight", "koala",
    "ladder", "lagoon", "laser", "lemon", "lilac", "linen", "lizard", "llama", "lotus", "lunar",
    "magnet", "mango", "maple", "marble", "meadow", "melon", "mesa", "mint", "mocha", "mural",
    "napkin", "nectar", "needle", "nickel", "night", "nimble", "noble", "north", "nutmeg", "nylon",
    "oasis", "ocean", "olive", "onion", "onyx", "opal", "orbit", "orchid", "otter", "owl",
    "palace", "panda", "pantry", "paper", "pebble", "pecan", "pepper", "piano", "pigeon", "pine",
    "quail", "quartz", "quest", "quick", "quiet", "quill", "quilt", "quince", "quiver", "quota",
    "rabbit", "radar", "radish", "raft", "raven", "reef", "ribbon", "river", "rocket", "rustic",
    "saddle", "salmon", "sandal", "satin", "shadow", "sierra", "silver", "sonnet", "spruce",
    "summit", "tango", "tartan", "teapot", "temple", "tiger", "timber", "topaz", "tulip", "tundra",
    "turtle", "ultra", "umber", "umpire", "union", "unity", "upland", "urban", "urchin", "usher",
    "utopia", "valley", "vapor", "velvet", "verse", "vessel", "violet", "violin", "vivid",
    "vortex", "voyage", "waffle", "wagon", "walnut", "walrus", "water", "weasel", "willow",
    "window", "winter", "wizard", "xenon", "yacht", "yarn", "yellow", "yogurt", "yonder", "zebra",
    "zenith", "zephyr", "zigzag", "zinc", "zircon",
];

/// Generate a two-word transfer token.
///
/// Both draws come from the OS CSPRNG via `gen_range`, which samples
/// uniformly without modulo bias. Equal words are allowed.
#[must_use]
pub fn generate_token() -> String {
    let mut rng = OsRng;
    let first = WORDS[rng.gen_range(0..WORDS.len())];
    let second = WORDS[rng.gen_range(0..WORDS.len())];
    format!("{first}-{second}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_vocabulary_size_and_uniqueness() {
        assert!(WORDS.len() >= 200, "vocabulary too small: {}", WORDS.len());
        let unique: HashSet<&&str> = WORDS.iter().collect();
        assert_eq!(unique.len(), WORDS.len(), "duplicate words in vocabulary");
    }

    #[test]
    fn test_vocabulary_words_are_short_lowercase_ascii() {
        for word in WORDS {
            assert!(
                word.len() >= 3 && word.len() <= 6,
                "word length out of range: {word}"
            );
            assert!(
                word.bytes().all(|b| b.is_ascii_lowercase()),
                "word not lowercase ascii: {word}"
            );
        }
    }

    #[test]
    fn test_token_shape() {
        for _ in 0..64 {
            let token = generate_token();
            let parts: Vec<&str> = token.split('-').collect();
            assert_eq!(parts.len(), 2, "token not two words: {token}");
            assert!(WORDS.contains(&parts[0]));
            assert!(WORDS.contains(&parts[1]));
        }
    }

    #[test]
    fn test_tokens_vary() {
        let tokens: HashSet<String> = (0..32).map(|_| generate_token()).collect();
        // 32 draws from >40k combinations colliding down to one value
        // would mean a broken RNG.
        assert!(tokens.len() > 1);
    }
}
