use std::sync::Arc;

use spawnwatch_contracts::cache::BoundedCache;

use crate::pokeapi::SpeciesLookup;

pub const FALLBACK_COLOR: u32 = 0xFF5252;

/// Display color for an elemental type name.
pub fn type_color(type_name: &str) -> Option<u32> {
    let color = match type_name {
        "normal" => 0xA8A77A,
        "fire" => 0xEE8130,
        "water" => 0x6390F0,
        "electric" => 0xF7D02C,
        "grass" => 0x7AC74C,
        "ice" => 0x96D9D6,
        "fighting" => 0xC22E28,
        "poison" => 0xA33EA1,
        "ground" => 0xE2BF65,
        "flying" => 0xA98FF3,
        "psychic" => 0xF95587,
        "bug" => 0xA6B91A,
        "rock" => 0xB6A136,
        "ghost" => 0x735797,
        "dragon" => 0x6F35FC,
        "dark" => 0x705746,
        "steel" => 0xB7B7CE,
        "fairy" => 0xD685AD,
        _ => return None,
    };
    Some(color)
}

/// Species → card color, memoized. Only successful lookups are cached, so a
/// transient failure is retried on the next spawn of that species.
pub struct TypeColorResolver {
    lookup: Arc<dyn SpeciesLookup>,
    cache: BoundedCache<String, u32>,
}

impl TypeColorResolver {
    pub fn new(lookup: Arc<dyn SpeciesLookup>, capacity: usize) -> Self {
        Self {
            lookup,
            cache: BoundedCache::new(capacity),
        }
    }

    pub fn resolve(&mut self, species: &str) -> u32 {
        let key = species.trim().to_lowercase();
        if let Some(color) = self.cache.get(&key) {
            return *color;
        }
        let type_name = match self.lookup.primary_type(&key) {
            Ok(Some(type_name)) => type_name,
            Ok(None) => {
                tracing::debug!(species = %key, "species has no known type");
                return FALLBACK_COLOR;
            }
            Err(err) => {
                tracing::warn!(species = %key, failure = err.failure_kind(), "type lookup failed: {err}");
                return FALLBACK_COLOR;
            }
        };
        let Some(color) = type_color(&type_name) else {
            tracing::debug!(species = %key, type_name = %type_name, "type has no color entry");
            return FALLBACK_COLOR;
        };
        self.cache.insert(key, color);
        color
    }

    pub fn cached(&self, species: &str) -> Option<u32> {
        self.cache.peek(&species.trim().to_lowercase()).copied()
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StaticLookup;

    #[test]
    fn table_covers_the_eighteen_types() {
        let types = [
            "normal", "fire", "water", "electric", "grass", "ice", "fighting", "poison", "ground",
            "flying", "psychic", "bug", "rock", "ghost", "dragon", "dark", "steel", "fairy",
        ];
        assert!(types.iter().all(|name| type_color(name).is_some()));
        assert_eq!(type_color("fire"), Some(0xEE8130));
        assert_eq!(type_color("shadow"), None);
    }

    #[test]
    fn successful_lookups_are_cached() {
        let lookup = Arc::new(StaticLookup::with_types([("charmander", "fire")]));
        let mut resolver = TypeColorResolver::new(lookup.clone(), 8);

        assert_eq!(resolver.resolve("Charmander"), 0xEE8130);
        assert_eq!(resolver.resolve("charmander"), 0xEE8130);
        assert_eq!(lookup.call_count(), 1);
        assert_eq!(resolver.cached("charmander"), Some(0xEE8130));
    }

    #[test]
    fn failures_fall_back_without_caching() {
        let lookup =
            Arc::new(StaticLookup::with_types([("missingno", "bird")]).failing_for("pikachu"));
        let mut resolver = TypeColorResolver::new(lookup.clone(), 8);

        assert_eq!(resolver.resolve("pikachu"), FALLBACK_COLOR);
        assert_eq!(resolver.resolve("unknownmon"), FALLBACK_COLOR);
        assert_eq!(resolver.resolve("missingno"), FALLBACK_COLOR);
        assert_eq!(resolver.cached_len(), 0);
    }

    #[test]
    fn later_success_replaces_an_earlier_fallback() {
        let lookup = Arc::new(
            StaticLookup::with_types([("pikachu", "electric")]).failing_once_for("pikachu"),
        );
        let mut resolver = TypeColorResolver::new(lookup.clone(), 8);

        assert_eq!(resolver.resolve("pikachu"), FALLBACK_COLOR);
        assert_eq!(resolver.cached("pikachu"), None);
        assert_eq!(resolver.resolve("pikachu"), 0xF7D02C);
        assert_eq!(resolver.cached("pikachu"), Some(0xF7D02C));
        assert_eq!(resolver.resolve("pikachu"), 0xF7D02C);
        assert_eq!(lookup.call_count(), 2);
    }

    #[test]
    fn cache_is_bounded() {
        let lookup = Arc::new(StaticLookup::with_types([
            ("squirtle", "water"),
            ("pidgey", "normal"),
            ("gastly", "ghost"),
        ]));
        let mut resolver = TypeColorResolver::new(lookup, 2);
        resolver.resolve("squirtle");
        resolver.resolve("pidgey");
        resolver.resolve("gastly");
        assert_eq!(resolver.cached_len(), 2);
        assert_eq!(resolver.cached("squirtle"), None);
    }
}
