//! Property tests for content hashing.

use hotswap_remote::core::{ConfigurationResource, HashProvider, Sha256HashProvider};
use proptest::prelude::*;

proptest! {
    #[test]
    fn hash_is_a_pure_function_of_content(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let hasher = Sha256HashProvider;
        prop_assert_eq!(hasher.hash(&bytes), hasher.hash(&bytes.clone()));
    }

    #[test]
    fn changed_content_changes_hash(
        bytes in proptest::collection::vec(any::<u8>(), 1..512),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let hasher = Sha256HashProvider;
        let mut changed = bytes.clone();
        let i = index.index(changed.len());
        changed[i] ^= flip;
        prop_assert_ne!(hasher.hash(&bytes), hasher.hash(&changed));
    }

    #[test]
    fn resource_hash_matches_provider(name in "[a-z]{1,12}\\.json", content in ".{0,256}") {
        let hasher = Sha256HashProvider;
        let resource = ConfigurationResource::new(name.clone(), content.clone().into_bytes(), &hasher);
        prop_assert_eq!(resource.name(), name.as_str());
        let expected = hasher.hash(content.as_bytes());
        prop_assert_eq!(resource.hash(), expected.as_str());
    }
}
