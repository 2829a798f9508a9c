//! Topic exchange routing-key matching

/// Whether `routing_key` matches the binding `pattern`.
///
/// Both are dot-separated words. In the pattern `*` stands for exactly one
/// word and `#` for zero or more words.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let mut pattern: Vec<&str> = pattern.split('.').collect();
    pattern.dedup_by(|a, b| *a == "#" && *b == "#");
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern, &key)
}

/// Single pass over the pattern, O(pattern × key)
fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    // reachable[j]: the pattern words seen so far match the first j key words
    let mut reachable = vec![false; key.len() + 1];
    reachable[0] = true;

    for &word in pattern {
        if word == "#" {
            for j in 1..=key.len() {
                reachable[j] = reachable[j] || reachable[j - 1];
            }
        } else {
            for j in (1..=key.len()).rev() {
                reachable[j] = reachable[j - 1] && (word == "*" || key[j - 1] == word);
            }
            reachable[0] = false;
        }
    }

    reachable[key.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(topic_matches("livingroom.light", "livingroom.light"));
        assert!(!topic_matches("livingroom.light", "livingroom.lamp"));
        assert!(!topic_matches("livingroom.light", "livingroom.light.status"));
        assert!(!topic_matches("livingroom", "livingroom.light"));
    }

    #[test]
    fn test_star_matches_one_word() {
        assert!(topic_matches("*.light", "kitchen.light"));
        assert!(topic_matches("house.*.temperature", "house.attic.temperature"));
        assert!(!topic_matches("*.light", "light"));
        assert!(!topic_matches("*.light", "house.kitchen.light"));
    }

    #[test]
    fn test_hash_matches_any_words() {
        assert!(topic_matches("#", "anything.at.all"));
        assert!(topic_matches("#", ""));
        assert!(topic_matches("house.#", "house"));
        assert!(topic_matches("house.#", "house.kitchen.light"));
        assert!(topic_matches("#.light", "kitchen.light"));
        assert!(topic_matches("house.#.light", "house.light"));
        assert!(topic_matches("house.#.light", "house.a.b.light"));
        assert!(!topic_matches("house.#.light", "house.a.b.lamp"));
    }

    #[test]
    fn test_many_hashes_against_long_key() {
        let pattern = vec!["#"; 40].join(".") + ".x";
        let miss = vec!["w"; 500].join(".");
        let hit = miss.clone() + ".x";

        assert!(!topic_matches(&pattern, &miss));
        assert!(topic_matches(&pattern, &hit));

        let interleaved = vec!["#.w"; 30].join(".") + ".#";
        assert!(topic_matches(&interleaved, &miss));
        assert!(!topic_matches(&interleaved, &vec!["w"; 29].join(".")));
    }

    #[test]
    fn test_repeated_hashes_collapse() {
        assert!(topic_matches("#.#", "a"));
        assert!(topic_matches("house.#.#.light", "house.light"));
        assert!(topic_matches("house.#.#.light", "house.a.b.c.light"));
        assert!(!topic_matches("#.#.x", "a.b"));
    }
}
