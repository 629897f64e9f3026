//! Form state for a storybook request and its validation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::downscale::downscale;
use crate::error::{Error, Result};

/// Minimum length of a text description used instead of a photo
pub const MIN_TRAITS_LEN: usize = 6;

/// Validation message for a missing text description
pub const MSG_TRAITS_OR_PHOTO: &str =
    "Describe the child in at least 6 characters or upload a photo.";

/// Validation message for photo mode without a photo
pub const MSG_PHOTO_MISSING: &str =
    "Upload a photo or describe the child in at least 6 characters.";

/// How the main character's look is conveyed to the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceMode {
    Photo,
    #[default]
    Description,
}

/// Allowed book lengths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageCount {
    Twelve,
    Sixteen,
    Twenty,
}

impl PageCount {
    pub const ALL: [Self; 3] = [Self::Twelve, Self::Sixteen, Self::Twenty];

    pub const fn get(self) -> u32 {
        match self {
            Self::Twelve => 12,
            Self::Sixteen => 16,
            Self::Twenty => 20,
        }
    }
}

impl TryFrom<u32> for PageCount {
    type Error = u32;

    fn try_from(value: u32) -> std::result::Result<Self, u32> {
        match value {
            12 => Ok(Self::Twelve),
            16 => Ok(Self::Sixteen),
            20 => Ok(Self::Twenty),
            other => Err(other),
        }
    }
}

impl fmt::Display for PageCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Book category, derived from the reading age
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    PictureBook,
    EarlyReader,
    ChapterBook,
}

impl Category {
    pub const fn for_reading_age(reading_age: u32) -> Self {
        match reading_age {
            0..=5 => Self::PictureBook,
            6..=8 => Self::EarlyReader,
            _ => Self::ChapterBook,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PictureBook => "picture_book",
            Self::EarlyReader => "early_reader",
            Self::ChapterBook => "chapter_book",
        }
    }
}

/// The active character reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Downscaled photo as a `data:` URL
    Photo(String),
    /// Free-text description of the child
    Description(String),
}

/// Fields entered by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormState {
    #[serde(default)]
    pub name: String,

    #[serde(default = "default_age")]
    pub age: u32,

    #[serde(default = "default_reading_age")]
    pub reading_age: u32,

    #[serde(default = "default_page_count")]
    pub page_count: u32,

    #[serde(default = "default_style")]
    pub style: String,

    #[serde(default)]
    pub theme: String,

    #[serde(default)]
    pub traits: String,

    #[serde(default)]
    pub reference_mode: ReferenceMode,

    /// Photo as a `data:` URL, only meaningful in photo mode
    #[serde(default)]
    pub photo_data: Option<String>,
}

const fn default_age() -> u32 {
    5
}

const fn default_reading_age() -> u32 {
    5
}

const fn default_page_count() -> u32 {
    12
}

fn default_style() -> String {
    "watercolor".to_string()
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            name: String::new(),
            age: default_age(),
            reading_age: default_reading_age(),
            page_count: default_page_count(),
            style: default_style(),
            theme: String::new(),
            traits: String::new(),
            reference_mode: ReferenceMode::default(),
            photo_data: None,
        }
    }
}

impl FormState {
    /// Load a form from a `.toml` or `.json` file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        if is_toml {
            toml::from_str(&content).map_err(|e| {
                Error::ConfigLoad(format!("Failed to parse form {}: {e}", path.display()))
            })
        } else {
            serde_json::from_str(&content).map_err(|e| {
                Error::ConfigLoad(format!("Failed to parse form {}: {e}", path.display()))
            })
        }
    }

    /// Downscale a photo, store it and switch to photo mode.
    pub fn attach_photo(&mut self, bytes: &[u8], max_dimension: u32) -> Result<()> {
        let encoded = downscale(bytes, max_dimension)?;
        self.photo_data = Some(encoded.to_data_url());
        self.reference_mode = ReferenceMode::Photo;
        Ok(())
    }

    /// Whichever of traits/photo the reference mode selects
    pub fn active_reference(&self) -> Option<Reference> {
        match self.reference_mode {
            ReferenceMode::Photo => self
                .photo_data
                .as_ref()
                .filter(|data| !data.trim().is_empty())
                .map(|data| Reference::Photo(data.clone())),
            ReferenceMode::Description => {
                let traits = self.traits.trim();
                (traits.chars().count() >= MIN_TRAITS_LEN)
                    .then(|| Reference::Description(traits.to_string()))
            }
        }
    }

    /// Check every field, reporting all problems at once.
    pub fn validate(&self) -> Result<ValidForm> {
        let mut problems = Vec::new();

        let name = self.name.trim();
        if name.is_empty() {
            problems.push("Enter the child's name.".to_string());
        }
        if !(1..=120).contains(&self.age) {
            problems.push("Age must be between 1 and 120.".to_string());
        }
        if !(3..=12).contains(&self.reading_age) {
            problems.push("Reading age must be between 3 and 12.".to_string());
        }
        let pages = PageCount::try_from(self.page_count).ok();
        if pages.is_none() {
            problems.push("Page count must be 12, 16, or 20.".to_string());
        }
        let style = self.style.trim();
        if style.is_empty() {
            problems.push("Choose an illustration style.".to_string());
        }
        let reference = self.active_reference();
        if reference.is_none() {
            problems.push(
                match self.reference_mode {
                    ReferenceMode::Description => MSG_TRAITS_OR_PHOTO,
                    ReferenceMode::Photo => MSG_PHOTO_MISSING,
                }
                .to_string(),
            );
        }

        match (pages, reference) {
            (Some(pages), Some(reference)) if problems.is_empty() => Ok(ValidForm {
                name: name.to_string(),
                age: self.age,
                reading_age: self.reading_age,
                pages,
                style: style.to_string(),
                theme: self.theme.trim().to_string(),
                reference,
            }),
            _ => Err(Error::Validation(problems)),
        }
    }
}

/// A form that passed validation; the only input a generation run accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidForm {
    name: String,
    age: u32,
    reading_age: u32,
    pages: PageCount,
    style: String,
    theme: String,
    reference: Reference,
}

impl ValidForm {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn age(&self) -> u32 {
        self.age
    }

    pub const fn reading_age(&self) -> u32 {
        self.reading_age
    }

    pub const fn pages(&self) -> PageCount {
        self.pages
    }

    pub fn style(&self) -> &str {
        &self.style
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }

    pub const fn category(&self) -> Category {
        Category::for_reading_age(self.reading_age)
    }

    pub const fn reference(&self) -> &Reference {
        &self.reference
    }

    /// Traits sent to the backend; empty in photo mode
    pub fn traits(&self) -> &str {
        match &self.reference {
            Reference::Description(traits) => traits,
            Reference::Photo(_) => "",
        }
    }

    pub fn photo(&self) -> Option<&str> {
        match &self.reference {
            Reference::Photo(data) => Some(data),
            Reference::Description(_) => None,
        }
    }
}
