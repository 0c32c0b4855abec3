//! Style catalog and its paged inline menu
//!
//! The catalog is a fixed, ordered list of 21 styles. Each style's menu page
//! links to its neighbours; navigation wraps around at both ends.

use crate::state_machine::CallbackAction;
use crate::state_machine::event::{ACCEPT_PAYLOAD, IGNORE_PAYLOAD};
use crate::transport::{InlineButton, InlineKeyboard};
use std::path::{Path, PathBuf};

/// Style shown when the menu first opens
pub const DEFAULT_STYLE: &str = "oil_painting";

/// Style image file extension
const STYLE_EXT: &str = "jpg";

pub const STYLE_NAMES: [&str; 21] = [
    "oil_painting",
    "candy",
    "composition_vii",
    "escher_sphere",
    "feathers",
    "frida_kahlo",
    "la_muse",
    "mosaic",
    "mosaic_ducks_massimo",
    "pencil",
    "picasso_selfportrait",
    "rain_princess",
    "robert_delaunay",
    "seated_nude",
    "shipwreck",
    "starry_night",
    "strip",
    "the_scream",
    "udnie",
    "wave",
    "woman_with_hat",
];

/// Immutable set of selectable styles
#[derive(Debug, Clone)]
pub struct StyleCatalog {
    dir: PathBuf,
}

/// One rendered page of the style menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleMenu {
    pub style: String,
    pub photo: PathBuf,
    pub caption: String,
    pub keyboard: InlineKeyboard,
}

impl StyleCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[allow(clippy::unused_self)] // Fixed list today
    pub fn style_count(&self) -> usize {
        STYLE_NAMES.len()
    }

    #[allow(clippy::unused_self)]
    pub fn position(&self, name: &str) -> Option<usize> {
        STYLE_NAMES.iter().position(|s| *s == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Image path of a style; does not check membership
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{STYLE_EXT}"))
    }

    /// Previous and next style, wrapping around
    pub fn neighbors(&self, name: &str) -> Option<(&'static str, &'static str)> {
        let idx = self.position(name)?;
        let len = self.style_count();
        Some((STYLE_NAMES[(idx + len - 1) % len], STYLE_NAMES[(idx + 1) % len]))
    }

    /// Menu page centred on `name`, or `None` if it isn't a catalog style
    pub fn menu(&self, name: &str) -> Option<StyleMenu> {
        let idx = self.position(name)?;
        let (prev, next) = self.neighbors(name)?;

        let keyboard = InlineKeyboard::new(vec![
            vec![
                InlineButton::new(
                    format!("◀ {}", display_name(prev)),
                    CallbackAction::navigate_payload(prev),
                ),
                InlineButton::new(format!("{}/{}", idx + 1, self.style_count()), IGNORE_PAYLOAD),
                InlineButton::new(
                    format!("{} ▶", display_name(next)),
                    CallbackAction::navigate_payload(next),
                ),
            ],
            vec![InlineButton::new("Accept ✅", ACCEPT_PAYLOAD)],
        ]);

        Some(StyleMenu {
            style: name.to_string(),
            photo: self.path_of(name),
            caption: format!("1️⃣ Select one of {} styles...", self.style_count()),
            keyboard,
        })
    }

    /// Style images that are missing on disk
    pub fn missing_images(&self) -> Vec<PathBuf> {
        STYLE_NAMES
            .iter()
            .map(|name| self.path_of(name))
            .filter(|path| !path.is_file())
            .collect()
    }
}

/// "starry_night" -> "Starry night"
fn display_name(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
