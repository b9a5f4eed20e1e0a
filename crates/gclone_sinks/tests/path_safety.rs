//! Property tests for output path sanitization.
//!
//! Whatever a tree hands us as a logical path, the sanitized result must be
//! a relative path made only of normal components.

use gclone_sinks::sanitize_relative_path;
use proptest::prelude::*;
use std::path::Component;

fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => "[a-zA-Z0-9_-]{1,8}(\\.[a-z]{1,3})?",
        1 => Just(".".to_string()),
        1 => Just("..".to_string()),
        1 => Just(String::new()),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn sanitized_paths_stay_under_root(
        segments in prop::collection::vec(segment(), 1..6),
        leading_slash in any::<bool>(),
    ) {
        let mut raw = segments.join("/");
        if leading_slash {
            raw.insert(0, '/');
        }

        if let Ok(clean) = sanitize_relative_path(&raw) {
            prop_assert!(clean.is_relative(), "{:?} -> {:?}", raw, clean);
            prop_assert!(
                clean.components().all(|c| matches!(c, Component::Normal(_))),
                "{:?} -> {:?}",
                raw,
                clean
            );
            prop_assert!(!leading_slash, "absolute path {:?} was accepted", raw);
            prop_assert!(!segments.iter().any(|s| s == ".."), "{:?} was accepted", raw);
        }
    }

    #[test]
    fn plain_relative_paths_are_kept(
        segments in prop::collection::vec("[a-zA-Z0-9_-]{1,8}", 1..6),
    ) {
        let raw = segments.join("/");
        let clean = sanitize_relative_path(&raw).unwrap();
        let parts: Vec<String> = clean
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        prop_assert_eq!(parts, segments);
    }
}
