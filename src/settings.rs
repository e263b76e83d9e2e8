//! Settings: the TOML file handed to the binary on the command line.
//!
//! The raw deserialized form ([`SettingsData`]) keeps exactly what the file
//! said; the resolved [`Settings`] has key names parsed into key codes, the
//! compose table built into a trie, and durations parsed. Malformed settings
//! are fatal at startup.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::touchscreen::MultitouchVariant;
use crate::durations::{format_duration, parse_duration};
use crate::input::keycode::KeyCode;
use crate::input::trie::SequenceTrie;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("could not read settings from {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse settings from {path}")]
    Parse {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },
    #[error("could not write settings to {path}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("unknown key name {0:?}")]
    UnknownKey(String),
    #[error("keymap for {key:?} must have exactly two single-character levels")]
    BadKeymap { key: String },
    #[error("compose sequence {sequence:?} must produce a single character, got {output:?}")]
    BadComposeOutput { sequence: String, output: String },
    #[error("bad duration in settings: {0}")]
    BadDuration(#[from] crate::durations::DurationParseError),
}

/// The on-disk shape of the settings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsData {
    /// Font family currently used on the drafting screen.
    #[serde(default = "defaults::current_font")]
    pub current_font: String,

    /// Font families offered by the font menu.
    #[serde(default = "defaults::drafting_fonts")]
    pub drafting_fonts: Vec<String>,

    /// Point size per drafting font family.
    #[serde(default = "defaults::font_sizes")]
    pub font_sizes: BTreeMap<String, u32>,

    /// Durations offered by the sprint dialog, as Go-style strings.
    #[serde(default = "defaults::sprint_lengths")]
    pub sprint_lengths: Vec<String>,

    /// Key that starts a compose sequence.
    #[serde(default = "defaults::compose_key")]
    pub compose_key: String,

    /// Space-joined input characters to composed output.
    #[serde(default = "defaults::compose_sequences")]
    pub compose_sequences: BTreeMap<String, String>,

    /// Key name to [unshifted, shifted] characters.
    #[serde(default = "defaults::keymaps")]
    pub keymaps: BTreeMap<String, Vec<String>>,

    #[serde(default = "defaults::db_path")]
    pub db_path: PathBuf,

    #[serde(default = "defaults::export_path")]
    pub export_path: PathBuf,

    /// Sessions older than this can only be exported, not edited.
    #[serde(default = "defaults::max_editable_age")]
    pub max_editable_age: String,

    /// Input device node of the touchscreen.
    #[serde(default = "defaults::touch_device")]
    pub touch_device: PathBuf,

    /// Which multitouch wire protocol the touchscreen speaks.
    #[serde(default)]
    pub multitouch_variant: MultitouchVariant,
}

impl Default for SettingsData {
    fn default() -> Self {
        toml::from_str("").expect("defaults deserialize")
    }
}

mod defaults {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    pub fn current_font() -> String {
        "Tabula Quattro".to_string()
    }

    pub fn drafting_fonts() -> Vec<String> {
        ["Tabula Quattro", "Comic Neue", "Special Elite"]
            .map(String::from)
            .to_vec()
    }

    pub fn font_sizes() -> BTreeMap<String, u32> {
        drafting_fonts().into_iter().map(|f| (f, 8)).collect()
    }

    pub fn sprint_lengths() -> Vec<String> {
        ["5m", "10m", "15m", "20m", "30m"].map(String::from).to_vec()
    }

    pub fn compose_key() -> String {
        "KEY_RIGHTMETA".to_string()
    }

    pub fn db_path() -> PathBuf {
        PathBuf::from("tabula.db")
    }

    pub fn export_path() -> PathBuf {
        PathBuf::from("exports")
    }

    pub fn max_editable_age() -> String {
        "1h".to_string()
    }

    pub fn touch_device() -> PathBuf {
        PathBuf::from("/dev/input/event1")
    }

    pub fn compose_sequences() -> BTreeMap<String, String> {
        COMPOSE_SEQUENCES
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    pub fn keymaps() -> BTreeMap<String, Vec<String>> {
        KEYMAPS
            .iter()
            .map(|(k, lower, upper)| (k.to_string(), vec![lower.to_string(), upper.to_string()]))
            .collect()
    }

    const COMPOSE_SEQUENCES: &[(&str, &str)] = &[
        ("< <", "«"),
        ("> >", "»"),
        ("< '", "‘"),
        ("' <", "‘"),
        ("> '", "’"),
        ("' >", "’"),
        ("< \"", "“"),
        ("\" <", "“"),
        ("> \"", "”"),
        ("\" >", "”"),
        ("' '", "ʼ"),
        (". .", "…"),
        ("- - -", "—"),
        ("- - .", "–"),
        ("! !", "¡"),
        ("? ?", "¿"),
        ("1 4", "¼"),
        ("1 2", "½"),
        ("3 4", "¾"),
        ("o x", "¤"),
        ("x o", "¤"),
        ("o c", "©"),
        ("o C", "©"),
        ("O c", "©"),
        ("O C", "©"),
        ("p !", "¶"),
        ("P !", "¶"),
        ("P P", "¶"),
        ("A E", "Æ"),
        ("a e", "æ"),
        ("O E", "Œ"),
        ("o e", "œ"),
        ("` A", "À"),
        ("' A", "Á"),
        ("- A", "Ā"),
        ("` a", "à"),
        ("' a", "á"),
        ("- a", "ā"),
        (", C", "Ç"),
        (", c", "ç"),
        ("` E", "È"),
        ("' E", "É"),
        ("- E", "Ē"),
        ("` e", "è"),
        ("' e", "é"),
        ("- e", "ē"),
        ("` I", "Ì"),
        ("' I", "Í"),
        ("- I", "Ī"),
        ("` i", "ì"),
        ("' i", "í"),
        ("- i", "ī"),
        ("~ N", "Ñ"),
        ("~ n", "ñ"),
        ("` O", "Ò"),
        ("' O", "Ó"),
        ("- O", "Ō"),
        ("` o", "ò"),
        ("' o", "ó"),
        ("- o", "ō"),
        ("` U", "Ù"),
        ("' U", "Ú"),
        ("- U", "Ū"),
        ("` u", "ù"),
        ("' u", "ú"),
        ("- u", "ū"),
        ("\" u", "ü"),
        ("' Y", "Ý"),
        ("' y", "ý"),
    ];

    const KEYMAPS: &[(&str, &str, &str)] = &[
        ("KEY_GRAVE", "`", "~"),
        ("KEY_1", "1", "!"),
        ("KEY_2", "2", "@"),
        ("KEY_3", "3", "#"),
        ("KEY_4", "4", "$"),
        ("KEY_5", "5", "%"),
        ("KEY_6", "6", "^"),
        ("KEY_7", "7", "&"),
        ("KEY_8", "8", "*"),
        ("KEY_9", "9", "("),
        ("KEY_0", "0", ")"),
        ("KEY_MINUS", "-", "_"),
        ("KEY_EQUAL", "=", "+"),
        ("KEY_Q", "q", "Q"),
        ("KEY_W", "w", "W"),
        ("KEY_E", "e", "E"),
        ("KEY_R", "r", "R"),
        ("KEY_T", "t", "T"),
        ("KEY_Y", "y", "Y"),
        ("KEY_U", "u", "U"),
        ("KEY_I", "i", "I"),
        ("KEY_O", "o", "O"),
        ("KEY_P", "p", "P"),
        ("KEY_LEFTBRACE", "[", "{"),
        ("KEY_RIGHTBRACE", "]", "}"),
        ("KEY_BACKSLASH", "\\", "|"),
        ("KEY_A", "a", "A"),
        ("KEY_S", "s", "S"),
        ("KEY_D", "d", "D"),
        ("KEY_F", "f", "F"),
        ("KEY_G", "g", "G"),
        ("KEY_H", "h", "H"),
        ("KEY_J", "j", "J"),
        ("KEY_K", "k", "K"),
        ("KEY_L", "l", "L"),
        ("KEY_SEMICOLON", ";", ":"),
        ("KEY_APOSTROPHE", "'", "\""),
        ("KEY_Z", "z", "Z"),
        ("KEY_X", "x", "X"),
        ("KEY_C", "c", "C"),
        ("KEY_V", "v", "V"),
        ("KEY_B", "b", "B"),
        ("KEY_N", "n", "N"),
        ("KEY_M", "m", "M"),
        ("KEY_COMMA", ",", "<"),
        ("KEY_DOT", ".", ">"),
        ("KEY_SLASH", "/", "?"),
        ("KEY_SPACE", " ", " "),
    ];
}

/// Settings with everything parsed into the forms the pipelines use. The
/// record is immutable; font changes produce a new value.
#[derive(Debug, Clone)]
pub struct Settings {
    data: SettingsData,
    path: PathBuf,
    pub current_font: String,
    pub drafting_fonts: Vec<String>,
    pub font_sizes: HashMap<String, u32>,
    pub sprint_lengths: Vec<Duration>,
    pub compose_key: KeyCode,
    pub compose_sequences: SequenceTrie<char, char>,
    pub keymaps: HashMap<KeyCode, [char; 2]>,
    pub db_path: PathBuf,
    pub export_path: PathBuf,
    pub max_editable_age: Duration,
    pub touch_device: PathBuf,
    pub multitouch_variant: MultitouchVariant,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let data: SettingsData = toml::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        log::info!("loaded settings from {}", path.display());
        Self::resolve(data, path.to_path_buf())
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        let serialized = toml::to_string_pretty(&self.data).map_err(|e| SettingsError::Write {
            path: self.path.clone(),
            source: std::io::Error::other(e),
        })?;
        std::fs::write(&self.path, serialized).map_err(|source| SettingsError::Write {
            path: self.path.clone(),
            source,
        })?;
        log::info!("saved settings to {}", self.path.display());
        Ok(())
    }

    /// A new record with a different drafting font; everything else carries
    /// over.
    pub fn with_current_font(&self, font: &str) -> Result<Self, SettingsError> {
        let mut data = self.data.clone();
        data.current_font = font.to_string();
        Self::resolve(data, self.path.clone())
    }

    /// The compose table as written in the settings file, for the help page.
    pub fn raw_compose_sequences(&self) -> &BTreeMap<String, String> {
        &self.data.compose_sequences
    }

    /// The Pango font spec for the drafting screen, e.g. `Tabula Quattro 8`.
    pub fn current_font_spec(&self) -> String {
        let size = self.font_sizes.get(&self.current_font).copied().unwrap_or(8);
        format!("{} {}", self.current_font, size)
    }

    pub fn for_test() -> Self {
        Self::resolve(SettingsData::default(), PathBuf::from("test.settings.toml"))
            .expect("default settings resolve")
    }

    fn resolve(data: SettingsData, path: PathBuf) -> Result<Self, SettingsError> {
        let compose_key = KeyCode::from_str(&data.compose_key)
            .map_err(|_| SettingsError::UnknownKey(data.compose_key.clone()))?;

        let mut keymaps = HashMap::new();
        for (name, levels) in &data.keymaps {
            let key =
                KeyCode::from_str(name).map_err(|_| SettingsError::UnknownKey(name.clone()))?;
            let chars: Vec<char> = levels
                .iter()
                .map(|level| {
                    let mut it = level.chars();
                    match (it.next(), it.next()) {
                        (Some(c), None) => Ok(c),
                        _ => Err(SettingsError::BadKeymap { key: name.clone() }),
                    }
                })
                .collect::<Result<_, _>>()?;
            let [lower, upper] = chars.as_slice() else {
                return Err(SettingsError::BadKeymap { key: name.clone() });
            };
            keymaps.insert(key, [*lower, *upper]);
        }

        let mut compose_sequences = SequenceTrie::new();
        for (sequence, output) in &data.compose_sequences {
            let keys: Vec<char> = sequence
                .split_whitespace()
                .map(|part| {
                    let mut it = part.chars();
                    match (it.next(), it.next()) {
                        (Some(c), None) => Ok(c),
                        _ => Err(SettingsError::BadComposeOutput {
                            sequence: sequence.clone(),
                            output: output.clone(),
                        }),
                    }
                })
                .collect::<Result<_, _>>()?;
            let mut out_chars = output.chars();
            let (Some(resolved), None) = (out_chars.next(), out_chars.next()) else {
                return Err(SettingsError::BadComposeOutput {
                    sequence: sequence.clone(),
                    output: output.clone(),
                });
            };
            compose_sequences.insert(keys, resolved);
        }

        let sprint_lengths = data
            .sprint_lengths
            .iter()
            .map(|s| parse_duration(s))
            .collect::<Result<Vec<_>, _>>()?;
        let max_editable_age = parse_duration(&data.max_editable_age)?;

        Ok(Self {
            current_font: data.current_font.clone(),
            drafting_fonts: data.drafting_fonts.clone(),
            font_sizes: data.font_sizes.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            sprint_lengths,
            compose_key,
            compose_sequences,
            keymaps,
            db_path: data.db_path.clone(),
            export_path: data.export_path.clone(),
            max_editable_age,
            touch_device: data.touch_device.clone(),
            multitouch_variant: data.multitouch_variant,
            data,
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve() {
        let settings = Settings::for_test();
        assert_eq!(settings.compose_key, KeyCode::KEY_RIGHTMETA);
        assert_eq!(settings.keymaps[&KeyCode::KEY_A], ['a', 'A']);
        assert_eq!(settings.compose_sequences.get(&['<', '<']), Some(&'«'));
        assert_eq!(settings.max_editable_age, Duration::from_secs(3600));
        assert_eq!(settings.current_font_spec(), "Tabula Quattro 8");
    }

    #[test]
    fn load_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            r#"
current_font = "Comic Neue"
compose_key = "KEY_COMPOSE"
max_editable_age = "2h30m"

[keymaps]
KEY_A = ["a", "A"]

[compose_sequences]
"- -" = "—"
"#,
        )
        .unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.current_font, "Comic Neue");
        assert_eq!(settings.compose_key, KeyCode::KEY_COMPOSE);
        assert_eq!(
            settings.max_editable_age,
            Duration::from_secs(2 * 3600 + 30 * 60)
        );
        assert_eq!(settings.compose_sequences.get(&['-', '-']), Some(&'—'));
        // unspecified tables fall back wholesale
        assert_eq!(settings.keymaps.len(), 1);

        settings.save().unwrap();
        let reloaded = Settings::load(&path).unwrap();
        assert_eq!(reloaded.current_font, "Comic Neue");
    }

    #[test]
    fn unknown_key_name_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "compose_key = \"KEY_NOPE\"\n").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(SettingsError::UnknownKey(_))
        ));
    }

    #[test]
    fn multi_char_compose_output_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            "[compose_sequences]\n\"a b\" = \"too long\"\n",
        )
        .unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(SettingsError::BadComposeOutput { .. })
        ));
    }

    #[test]
    fn font_change_returns_new_record() {
        let settings = Settings::for_test();
        let changed = settings.with_current_font("Comic Neue").unwrap();
        assert_eq!(changed.current_font, "Comic Neue");
        assert_eq!(settings.current_font, "Tabula Quattro");
    }
}
