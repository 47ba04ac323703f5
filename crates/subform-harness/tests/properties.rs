#![forbid(unsafe_code)]

//! Property tests over the mounted subtitles page.

use proptest::prelude::*;
use serde_json::json;
use subform::prelude::*;
use subform::subtitles::keys;
use subform_harness::strategies::{Answer, answer, setting_value};
use subform_harness::{Fixture, key};

const TOGGLES: [&str; 4] = [
    keys::MULTITHREADING,
    keys::SKIP_HASHING,
    keys::UTF8_ENCODE,
    keys::SUBSYNC_FORCE_AUDIO,
];

proptest! {
    /// A control shows its own write immediately, whatever happened to
    /// earlier commits.
    #[test]
    fn read_your_write(ops in proptest::collection::vec((0usize..4, any::<bool>(), answer()), 1..40)) {
        let fixture = Fixture::new(json!({ "general": {} }));
        for (index, value, reply) in ops {
            let id = fixture.control(TOGGLES[index]);
            fixture.form.change(id, DisplayValue::Bool(value)).unwrap();
            prop_assert_eq!(fixture.form.display(id), Ok(DisplayValue::Bool(value)));
            match reply {
                Answer::Accept => {
                    fixture.settle();
                    prop_assert_eq!(fixture.committed(TOGGLES[index]), Some(SettingValue::Bool(value)));
                }
                Answer::Reject => {
                    fixture.settle_with(|_| CommitOutcome::Failure("rejected".into()));
                }
                Answer::Hold => {}
            }
        }
    }

    /// Raw store writes are visible through every resolver immediately.
    #[test]
    fn store_reads_own_writes(values in proptest::collection::vec(setting_value(), 1..20)) {
        let fixture = Fixture::new(json!({}));
        let target = key("settings-general-scratch");
        for value in values {
            fixture.store.write(target.clone(), value.clone());
            prop_assert_eq!(fixture.store.resolve(&target).value, Some(value.clone()));
            prop_assert_eq!(fixture.store.snapshot().resolve(&target).value, Some(value));
        }
    }

    /// The embedded-subtitles group flips exactly once per change of the toggle.
    #[test]
    fn embedded_group_flips_once_per_change(values in proptest::collection::vec(any::<bool>(), 1..30)) {
        let fixture = Fixture::new(json!({ "general": { "use_embedded_subs": false } }));
        let toggle = fixture.control(keys::USE_EMBEDDED_SUBS);
        let mut previous = false;
        let mut flips = 0;
        for value in values {
            fixture.form.change(toggle, DisplayValue::Bool(value)).unwrap();
            if value != previous {
                flips += 1;
            }
            previous = value;
            prop_assert_eq!(fixture.view().shows(keys::IGNORE_PGS_SUBS), value);
        }
        let info = fixture
            .form
            .collapse_boxes()
            .into_iter()
            .find(|b| b.key.as_str() == keys::USE_EMBEDDED_SUBS)
            .unwrap();
        prop_assert_eq!(info.transitions, flips);
    }

    /// Subzero list order never depends on the order toggles were flipped.
    #[test]
    fn subzero_export_order_is_stable(
        order in Just(vec![
            keys::SUBZERO_REMOVE_HI,
            keys::SUBZERO_REMOVE_TAGS,
            keys::SUBZERO_OCR_FIXES,
            keys::SUBZERO_COMMON,
            keys::SUBZERO_FIX_UPPERCASE,
            keys::SUBZERO_REVERSE_RTL,
        ]).prop_shuffle(),
    ) {
        let fixture = Fixture::new(json!({ "general": { "subzero_mods": [] } }));
        for text in &order {
            fixture.change(text, DisplayValue::Bool(true)).unwrap();
        }
        fixture.settle();
        prop_assert_eq!(
            fixture.committed(keys::SUBZERO_MODS),
            Some(SettingValue::List(vec![
                "remove_HI".into(),
                "remove_tags".into(),
                "OCR_fixes".into(),
                "common".into(),
                "fix_uppercase".into(),
                "reverse_rtl".into(),
            ]))
        );
    }

    /// Slider edits are clamped to the declared range before they are stored.
    #[test]
    fn upgrade_days_are_clamped(days in -100.0f64..200.0) {
        let fixture = Fixture::new(json!({ "general": { "upgrade_subs": true } }));
        fixture.change(keys::DAYS_TO_UPGRADE_SUBS, DisplayValue::Number(days)).unwrap();
        let sent = fixture.persistence.pending().remove(0).value;
        let stored = sent.as_f64().unwrap();
        prop_assert!((0.0..=30.0).contains(&stored));
        prop_assert_eq!(fixture.shown(keys::DAYS_TO_UPGRADE_SUBS), Some(DisplayValue::Number(stored)));
    }
}
