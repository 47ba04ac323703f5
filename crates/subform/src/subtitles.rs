//! The subtitles settings page.
//!
//! Static data (option lists, labels, help text, the command placeholder
//! table) plus the page tree that wires them to key paths.

use subform_core::{KeyPath, LoadTransform, SaveTransform};
use subform_widgets::{ControlSpec, FormNode, ModificationRegistry, OptionSet, Predicate};

/// Key paths bound by the page.
pub mod keys {
    pub const SUBFOLDER: &str = "settings-general-subfolder";
    pub const SUBFOLDER_CUSTOM: &str = "settings-general-subfolder_custom";
    pub const UPGRADE_SUBS: &str = "settings-general-upgrade_subs";
    pub const DAYS_TO_UPGRADE_SUBS: &str = "settings-general-days_to_upgrade_subs";
    pub const UPGRADE_MANUAL: &str = "settings-general-upgrade_manual";
    pub const HI_EXTENSION: &str = "settings-general-hi_extension";

    pub const ANTI_CAPTCHA_PROVIDER: &str = "settings-general-anti_captcha_provider";
    pub const ANTI_CAPTCHA_KEY: &str = "settings-anticaptcha-anti_captcha_key";
    pub const DBC_USERNAME: &str = "settings-deathbycaptcha-username";
    pub const DBC_PASSWORD: &str = "settings-deathbycaptcha-password";

    pub const ADAPTIVE_SEARCHING: &str = "settings-general-adaptive_searching";
    pub const ADAPTIVE_SEARCHING_DELAY: &str = "settings-general-adaptive_searching_delay";
    pub const ADAPTIVE_SEARCHING_DELTA: &str = "settings-general-adaptive_searching_delta";
    pub const MULTITHREADING: &str = "settings-general-multithreading";
    pub const USE_EMBEDDED_SUBS: &str = "settings-general-use_embedded_subs";
    pub const IGNORE_PGS_SUBS: &str = "settings-general-ignore_pgs_subs";
    pub const IGNORE_VOBSUB_SUBS: &str = "settings-general-ignore_vobsub_subs";
    pub const IGNORE_ASS_SUBS: &str = "settings-general-ignore_ass_subs";
    pub const EMBEDDED_SUBS_SHOW_DESIRED: &str = "settings-general-embedded_subs_show_desired";
    pub const EMBEDDED_SUBTITLES_PARSER: &str = "settings-general-embedded_subtitles_parser";
    pub const SKIP_HASHING: &str = "settings-general-skip_hashing";

    pub const UTF8_ENCODE: &str = "settings-general-utf8_encode";
    pub const SUBZERO_MODS: &str = "settings-general-subzero_mods";
    pub const SUBZERO_REMOVE_HI: &str = "subzero-remove_HI";
    pub const SUBZERO_REMOVE_TAGS: &str = "subzero-remove_tags";
    pub const SUBZERO_OCR_FIXES: &str = "subzero-OCR_fixes";
    pub const SUBZERO_COMMON: &str = "subzero-common";
    pub const SUBZERO_FIX_UPPERCASE: &str = "subzero-fix_uppercase";
    pub const SUBZERO_COLOR: &str = "subzero-color";
    pub const SUBZERO_REVERSE_RTL: &str = "subzero-reverse_rtl";
    pub const CHMOD_ENABLED: &str = "settings-general-chmod_enabled";
    pub const CHMOD: &str = "settings-general-chmod";

    pub const SUBSYNC_FORCE_AUDIO: &str = "settings-subsync-force_audio";
    pub const USE_SUBSYNC: &str = "settings-subsync-use_subsync";
    pub const SUBSYNC_DEBUG: &str = "settings-subsync-debug";
    pub const USE_SUBSYNC_THRESHOLD: &str = "settings-subsync-use_subsync_threshold";
    pub const SUBSYNC_THRESHOLD: &str = "settings-subsync-subsync_threshold";
    pub const USE_SUBSYNC_MOVIE_THRESHOLD: &str = "settings-subsync-use_subsync_movie_threshold";
    pub const SUBSYNC_MOVIE_THRESHOLD: &str = "settings-subsync-subsync_movie_threshold";

    pub const USE_POSTPROCESSING: &str = "settings-general-use_postprocessing";
    pub const USE_POSTPROCESSING_THRESHOLD: &str = "settings-general-use_postprocessing_threshold";
    pub const POSTPROCESSING_THRESHOLD: &str = "settings-general-postprocessing_threshold";
    pub const USE_POSTPROCESSING_THRESHOLD_MOVIE: &str =
        "settings-general-use_postprocessing_threshold_movie";
    pub const POSTPROCESSING_THRESHOLD_MOVIE: &str =
        "settings-general-postprocessing_threshold_movie";
    pub const POSTPROCESSING_CMD: &str = "settings-general-postprocessing_cmd";
}

/// Placeholders accepted in the post-processing command.
pub const COMMAND_PLACEHOLDERS: &[(&str, &str)] = &[
    ("directory", "Full path of the episode file parent directory"),
    ("episode", "Full path of the episode file"),
    (
        "episode_name",
        "Filename of the episode without parent directory or extension",
    ),
    ("subtitles", "Full path of the subtitles file"),
    (
        "subtitles_language",
        "Language of the subtitles file (may include HI or forced)",
    ),
    (
        "subtitles_language_code2",
        "2-letter ISO-639 language code of the subtitles language (may include :hi or :forced)",
    ),
    (
        "subtitles_language_code2_dot",
        "2-letter ISO-639 language code of the subtitles language (same as previous but with dot separator instead of colon)",
    ),
    (
        "subtitles_language_code3",
        "3-letter ISO-639 language code of the subtitles language (may include :hi or :forced)",
    ),
    (
        "subtitles_language_code3_dot",
        "3-letter ISO-639 language code of the subtitles language (same as previous but with dot separator instead of colon)",
    ),
    ("episode_language", "Audio language of the episode file"),
    (
        "episode_language_code2",
        "2-letter ISO-639 language code of the episode audio language",
    ),
    (
        "episode_language_code3",
        "3-letter ISO-639 language code of the episode audio language",
    ),
    ("score", "Score of the subtitle file"),
    ("subtitle_id", "Provider ID of the subtitle file"),
    ("provider", "Provider of the subtitle file"),
    ("series_id", "Sonarr series ID (Empty if movie)"),
    ("episode_id", "Sonarr episode ID or Radarr movie ID"),
];

pub const DEFAULT_ADAPTIVE_DELAY: &str = "3w";
pub const DEFAULT_ADAPTIVE_DELTA: &str = "1w";
pub const DEFAULT_SUBTITLES_PARSER: &str = "ffprobe";
/// Stored when the anti-captcha provider is cleared.
pub const NO_PROVIDER: &str = "None";

pub fn folder_options() -> OptionSet {
    OptionSet::from_pairs(&[
        ("current", "AlongSide Media File"),
        ("relative", "Relative Path to Media File"),
        ("absolute", "Absolute Path"),
    ])
}

pub fn hi_extension_options() -> OptionSet {
    OptionSet::from_pairs(&[
        ("hi", ".hi (Hearing-Impaired)"),
        ("sdh", ".sdh (Subtitles for the Deaf and Hard-of-Hearing)"),
        ("cc", ".cc (Closed Captions)"),
    ])
}

pub fn anti_captcha_options() -> OptionSet {
    OptionSet::from_pairs(&[
        ("anti-captcha", "Anti-Captcha"),
        ("death-by-captcha", "Death by Captcha"),
    ])
}

pub fn adaptive_delay_options() -> OptionSet {
    OptionSet::from_pairs(&[
        ("1w", "1 week"),
        ("2w", "2 weeks"),
        ("3w", "3 weeks"),
        ("4w", "4 weeks"),
        ("5w", "5 weeks"),
        ("6w", "6 weeks"),
        ("7w", "7 weeks"),
        ("8w", "8 weeks"),
    ])
}

pub fn adaptive_delta_options() -> OptionSet {
    OptionSet::from_pairs(&[
        ("3d", "3 days"),
        ("1w", "1 week"),
        ("2w", "2 weeks"),
        ("3w", "3 weeks"),
        ("4w", "4 weeks"),
    ])
}

pub fn subtitles_parser_options() -> OptionSet {
    OptionSet::from_pairs(&[("ffprobe", "ffprobe (faster)"), ("mediainfo", "mediainfo")])
}

/// Color tokens in the form the post-processor expects.
pub fn color_options() -> OptionSet {
    OptionSet::from_pairs(&[
        ("color(name=white)", "White"),
        ("color(name=light-grey)", "Light Grey"),
        ("color(name=red)", "Red"),
        ("color(name=green)", "Green"),
        ("color(name=yellow)", "Yellow"),
        ("color(name=blue)", "Blue"),
        ("color(name=magenta)", "Magenta"),
        ("color(name=cyan)", "Cyan"),
        ("color(name=black)", "Black"),
        ("color(name=dark-red)", "Dark Red"),
        ("color(name=dark-green)", "Dark Green"),
        ("color(name=dark-yellow)", "Dark Yellow"),
        ("color(name=dark-blue)", "Dark Blue"),
        ("color(name=dark-magenta)", "Dark Magenta"),
        ("color(name=dark-cyan)", "Dark Cyan"),
        ("color(name=dark-grey)", "Dark Grey"),
    ])
}

fn key(text: &'static str) -> KeyPath {
    KeyPath::from_static(text)
}

fn check(text: &'static str, label: &str) -> FormNode {
    ControlSpec::toggle(key(text), label).into()
}

fn when_on(text: &'static str, children: Vec<FormNode>) -> FormNode {
    FormNode::collapse_flat(key(text), Predicate::Truthy, children)
}

fn when_on_indented(text: &'static str, children: Vec<FormNode>) -> FormNode {
    FormNode::collapse(key(text), Predicate::Truthy, children)
}

fn score_slider(text: &'static str, label: &str) -> FormNode {
    ControlSpec::slider(key(text), label, 0.0, 100.0).into()
}

/// Subtitle text modifications, in application order.
pub fn modifications() -> ModificationRegistry {
    ModificationRegistry::new(key(keys::SUBZERO_MODS))
        .flag("remove_HI", key(keys::SUBZERO_REMOVE_HI))
        .flag("remove_tags", key(keys::SUBZERO_REMOVE_TAGS))
        .flag("OCR_fixes", key(keys::SUBZERO_OCR_FIXES))
        .flag("common", key(keys::SUBZERO_COMMON))
        .flag("fix_uppercase", key(keys::SUBZERO_FIX_UPPERCASE))
        .parameter("color", key(keys::SUBZERO_COLOR), "color")
        .flag("reverse_rtl", key(keys::SUBZERO_REVERSE_RTL))
}

/// Attach the registry's seeding transform when `spec` binds an entry key.
fn seeded(spec: ControlSpec, registry: &ModificationRegistry) -> ControlSpec {
    match registry.entries().iter().find(|e| &e.key == spec.key()) {
        Some(entry) => {
            let seeded = spec.on_load(entry.load_transform(registry.list_key()));
            match entry.save_transform() {
                Some(save) => seeded.on_save(save),
                None => seeded,
            }
        }
        None => spec,
    }
}

fn subtitles_options() -> FormNode {
    FormNode::section(
        "Subtitles Options",
        vec![
            ControlSpec::select(key(keys::SUBFOLDER), "Subtitle Folder", folder_options()).into(),
            FormNode::message("Choose the folder you wish to store/read the subtitles"),
            FormNode::collapse_flat(
                key(keys::SUBFOLDER),
                Predicate::NonEmptyExcept(vec!["current".to_owned()]),
                vec![ControlSpec::text(key(keys::SUBFOLDER_CUSTOM), "Custom Subtitles Folder").into()],
            ),
            check(keys::UPGRADE_SUBS, "Upgrade Previously Downloaded Subtitles"),
            FormNode::message(
                "Schedule a task to upgrade subtitles previously downloaded by Bazarr.",
            ),
            when_on(
                keys::UPGRADE_SUBS,
                vec![
                    ControlSpec::slider(key(keys::DAYS_TO_UPGRADE_SUBS), "Days", 0.0, 30.0).into(),
                    FormNode::message("Number of days to go back in history to upgrade subtitles"),
                    check(
                        keys::UPGRADE_MANUAL,
                        "Upgrade Manually Downloaded or Translated Subtitles",
                    ),
                    FormNode::message(
                        "Enable or disable upgrade of manually downloaded or translated subtitles.",
                    ),
                ],
            ),
            ControlSpec::select(
                key(keys::HI_EXTENSION),
                "Hearing-impaired subtitles extension",
                hi_extension_options(),
            )
            .into(),
            FormNode::message(
                "What file extension to use when saving hearing-impaired subtitles to disk (e.g., video.en.sdh.srt).",
            ),
        ],
    )
}

fn anti_captcha() -> FormNode {
    let provider = key(keys::ANTI_CAPTCHA_PROVIDER);
    FormNode::section(
        "Anti-Captcha Options",
        vec![
            ControlSpec::select(provider.clone(), "Provider", anti_captcha_options())
                .clearable()
                .with_placeholder("Select a provider")
                .on_save(SaveTransform::AbsentAs(NO_PROVIDER.into()))
                .into(),
            FormNode::message("Choose the anti-captcha provider you want to use"),
            FormNode::collapse_flat(
                provider.clone(),
                Predicate::equals("anti-captcha"),
                vec![
                    FormNode::link("Anti-Captcha.com", "http://getcaptchasolution.com/eixxo1rsnw"),
                    ControlSpec::text(key(keys::ANTI_CAPTCHA_KEY), "Account Key").into(),
                ],
            ),
            FormNode::collapse_flat(
                provider,
                Predicate::equals("death-by-captcha"),
                vec![
                    FormNode::link("DeathByCaptcha.com", "https://www.deathbycaptcha.com"),
                    ControlSpec::text(key(keys::DBC_USERNAME), "Username").into(),
                    ControlSpec::password(key(keys::DBC_PASSWORD), "Password").into(),
                ],
            ),
        ],
    )
}

fn performance() -> FormNode {
    FormNode::section(
        "Performance / Optimization",
        vec![
            check(keys::ADAPTIVE_SEARCHING, "Adaptive Searching"),
            FormNode::message(
                "When searching for subtitles, Bazarr will reduce search frequency to limit call to providers.",
            ),
            when_on(
                keys::ADAPTIVE_SEARCHING,
                vec![
                    ControlSpec::select(
                        key(keys::ADAPTIVE_SEARCHING_DELAY),
                        "Delay",
                        adaptive_delay_options(),
                    )
                    .on_load(LoadTransform::DefaultIfAbsent(DEFAULT_ADAPTIVE_DELAY.into()))
                    .into(),
                    FormNode::message(
                        "In order to reduce search frequency, how many weeks must Bazarr wait after initial search.",
                    ),
                    ControlSpec::select(
                        key(keys::ADAPTIVE_SEARCHING_DELTA),
                        "Delta",
                        adaptive_delta_options(),
                    )
                    .on_load(LoadTransform::DefaultIfAbsent(DEFAULT_ADAPTIVE_DELTA.into()))
                    .into(),
                    FormNode::message(
                        "How often should Bazarr search for subtitles when in adaptive search mode.",
                    ),
                ],
            ),
            check(keys::MULTITHREADING, "Search Enabled Providers Simultaneously"),
            FormNode::message(
                "Search multiple providers at once (Don't choose this on low powered devices)",
            ),
            check(keys::USE_EMBEDDED_SUBS, "Use Embedded Subtitles"),
            FormNode::message("Use embedded subtitles in media files when determining missing ones."),
            when_on_indented(
                keys::USE_EMBEDDED_SUBS,
                vec![
                    check(keys::IGNORE_PGS_SUBS, "Ignore Embedded PGS Subtitles"),
                    FormNode::message("Ignores PGS Subtitles in Embedded Subtitles detection."),
                    check(keys::IGNORE_VOBSUB_SUBS, "Ignore Embedded VobSub Subtitles"),
                    FormNode::message("Ignores VobSub Subtitles in Embedded Subtitles detection."),
                    check(keys::IGNORE_ASS_SUBS, "Ignore Embedded ASS Subtitles"),
                    FormNode::message("Ignores ASS Subtitles in Embedded Subtitles detection."),
                    check(keys::EMBEDDED_SUBS_SHOW_DESIRED, "Show Only Desired Languages"),
                    FormNode::message(
                        "Hide embedded subtitles for languages that are not currently desired.",
                    ),
                    ControlSpec::select(
                        key(keys::EMBEDDED_SUBTITLES_PARSER),
                        "Parser",
                        subtitles_parser_options(),
                    )
                    .on_load(LoadTransform::DefaultIfAbsent(DEFAULT_SUBTITLES_PARSER.into()))
                    .into(),
                    FormNode::message("Embedded subtitles video parser"),
                ],
            ),
            check(keys::SKIP_HASHING, "Skip video file hash calculation"),
            FormNode::message(
                "Skip video file hashing during search process to prevent sleeping hard disk drive from waking-up. On the other hand, this may decrease your search results scores.",
            ),
        ],
    )
}

fn post_processing(registry: &ModificationRegistry) -> FormNode {
    let modification = |spec: ControlSpec, help: &str| -> [FormNode; 2] {
        [seeded(spec, registry).into(), FormNode::message(help)]
    };
    let mut children = vec![
        check(keys::UTF8_ENCODE, "Encode Subtitles To UTF8"),
        FormNode::message("Re-encode downloaded Subtitles to UTF8. Should be left enabled in most case."),
    ];
    children.extend(modification(
        ControlSpec::toggle(key(keys::SUBZERO_REMOVE_HI), "Hearing Impaired"),
        "Removes tags, text and characters from subtitles that are meant for hearing impaired people.",
    ));
    children.extend(modification(
        ControlSpec::toggle(key(keys::SUBZERO_REMOVE_TAGS), "Remove Tags"),
        "Removes all possible style tags from the subtitle, such as font, bold, color etc.",
    ));
    children.extend(modification(
        ControlSpec::toggle(key(keys::SUBZERO_OCR_FIXES), "OCR Fixes"),
        "Fix issues that happen when a subtitle gets converted from bitmap to text through OCR.",
    ));
    children.extend(modification(
        ControlSpec::toggle(key(keys::SUBZERO_COMMON), "Common Fixes"),
        "Fix common and whitespace/punctuation issues in subtitles.",
    ));
    children.extend(modification(
        ControlSpec::toggle(key(keys::SUBZERO_FIX_UPPERCASE), "Fix Uppercase"),
        "Tries to make subtitles that are completely uppercase readable.",
    ));
    children.extend(modification(
        ControlSpec::select(key(keys::SUBZERO_COLOR), "Color", color_options())
            .clearable()
            .with_placeholder("Select a color..."),
        "Adds color to your subtitles (for playback devices/software that don't ship their own color modes; only works for players that support color tags).",
    ));
    children.extend(modification(
        ControlSpec::toggle(key(keys::SUBZERO_REVERSE_RTL), "Reverse RTL"),
        "Reverses the punctuation in right-to-left subtitles for problematic playback devices.",
    ));
    children.extend([
        check(keys::CHMOD_ENABLED, "Permission (chmod)"),
        when_on_indented(
            keys::CHMOD_ENABLED,
            vec![
                ControlSpec::text(key(keys::CHMOD), "Permission")
                    .with_placeholder("0777")
                    .on_save(SaveTransform::Trim)
                    .into(),
                FormNode::message("Must be 4 digit octal"),
            ],
        ),
        check(keys::SUBSYNC_FORCE_AUDIO, "Always use Audio Track as Reference for Syncing"),
        FormNode::message(
            "Use the audio track as reference for syncing, instead of using the embedded subtitle.",
        ),
        check(keys::USE_SUBSYNC, "Automatic Subtitles Synchronization"),
        FormNode::message(
            "Enable the automatic subtitles synchronization after downloading a subtitles.",
        ),
        when_on_indented(
            keys::USE_SUBSYNC,
            vec![
                check(keys::SUBSYNC_DEBUG, "Debug"),
                FormNode::message(
                    "Do not actually sync the subtitles but generate a .tar.gz file to be able to open an issue for ffsubsync. This file will reside alongside the media file.",
                ),
                check(keys::USE_SUBSYNC_THRESHOLD, "Series Score Threshold"),
                when_on(
                    keys::USE_SUBSYNC_THRESHOLD,
                    vec![score_slider(keys::SUBSYNC_THRESHOLD, "Series Threshold")],
                ),
                check(keys::USE_SUBSYNC_MOVIE_THRESHOLD, "Movies Score Threshold"),
                when_on(
                    keys::USE_SUBSYNC_MOVIE_THRESHOLD,
                    vec![score_slider(keys::SUBSYNC_MOVIE_THRESHOLD, "Movies Threshold")],
                ),
            ],
        ),
        check(keys::USE_POSTPROCESSING, "Custom Post-Processing"),
        FormNode::message("Enable the post-processing execution after downloading a subtitles."),
        when_on_indented(
            keys::USE_POSTPROCESSING,
            vec![
                check(keys::USE_POSTPROCESSING_THRESHOLD, "Series Score Threshold"),
                when_on(
                    keys::USE_POSTPROCESSING_THRESHOLD,
                    vec![score_slider(keys::POSTPROCESSING_THRESHOLD, "Series Threshold")],
                ),
                check(keys::USE_POSTPROCESSING_THRESHOLD_MOVIE, "Movies Score Threshold"),
                when_on(
                    keys::USE_POSTPROCESSING_THRESHOLD_MOVIE,
                    vec![score_slider(keys::POSTPROCESSING_THRESHOLD_MOVIE, "Movies Threshold")],
                ),
                ControlSpec::text(key(keys::POSTPROCESSING_CMD), "Command").into(),
                command_table(),
            ],
        ),
    ]);
    FormNode::section("Post-Processing", children)
}

fn command_table() -> FormNode {
    FormNode::table(
        &["Placeholder", "Description"],
        COMMAND_PLACEHOLDERS
            .iter()
            .map(|(name, description)| vec![(*name).to_owned(), (*description).to_owned()])
            .collect(),
    )
}

/// The full page tree.
pub fn page() -> Vec<FormNode> {
    let registry = modifications();
    vec![
        subtitles_options(),
        anti_captcha(),
        performance(),
        post_processing(&registry),
    ]
}
