//! Portfolio content model, fetching and chunking.
//!
//! - `fetcher`: content sources and the never-failing fetch entry point
//! - `parse`: section extraction from page markup
//! - `chunker`: sliding-window chunking of section text

pub mod chunker;
pub mod fetcher;
pub mod parse;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use chunker::{chunk, Chunk, ChunkerConfig};
pub use fetcher::{ContentFetcher, ContentSource, FetchError, HttpSource, StaticSource};

/// Named portfolio section.
///
/// Declaration order is the enumeration order used by the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    About,
    Skills,
    Experience,
    Education,
    Projects,
    Certificates,
    Contact,
}

impl Section {
    pub const ALL: [Section; 7] = [
        Section::About,
        Section::Skills,
        Section::Experience,
        Section::Education,
        Section::Projects,
        Section::Certificates,
        Section::Contact,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Section::About => "about",
            Section::Skills => "skills",
            Section::Experience => "experience",
            Section::Education => "education",
            Section::Projects => "projects",
            Section::Certificates => "certificates",
            Section::Contact => "contact",
        }
    }

    pub fn priority(&self) -> Priority {
        match self {
            Section::About | Section::Skills | Section::Experience | Section::Projects => {
                Priority::Priority
            }
            Section::Education | Section::Certificates | Section::Contact => Priority::Secondary,
        }
    }

    /// Element ids that mark this section in portfolio markup.
    pub fn anchors(&self) -> &'static [&'static str] {
        match self {
            Section::About => &["about"],
            Section::Skills => &["skills"],
            Section::Experience => &["experience", "work"],
            Section::Education => &["education"],
            Section::Projects => &["projects"],
            Section::Certificates => &["certificates", "certifications"],
            Section::Contact => &["contact"],
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Priority,
    Secondary,
}

/// Where a `PortfolioContent` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentOrigin {
    Remote,
    Fallback,
}

/// Extracted portfolio text, one entry per section.
///
/// Never mutated after construction; a refresh builds a new value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioContent {
    sections: BTreeMap<Section, String>,
    pub full_text: String,
    pub created_at: DateTime<Utc>,
    pub origin: ContentOrigin,
}

impl PortfolioContent {
    pub fn new(
        sections: BTreeMap<Section, String>,
        full_text: String,
        origin: ContentOrigin,
    ) -> Self {
        let mut sections = sections;
        for section in Section::ALL {
            sections.entry(section).or_default();
        }

        Self {
            sections,
            full_text,
            created_at: Utc::now(),
            origin,
        }
    }

    /// Text of a section, or "" when the section was not found.
    pub fn section(&self, section: Section) -> &str {
        self.sections.get(&section).map(String::as_str).unwrap_or("")
    }

    pub fn is_blank(&self) -> bool {
        Section::ALL
            .iter()
            .all(|section| self.section(*section).trim().is_empty())
    }

    /// Canned content used when the portfolio source cannot be read.
    ///
    /// Every section is long enough to survive the chunker's noise filter.
    pub fn fallback(owner: &str) -> Self {
        let text = |section: Section| -> String {
            match section {
                Section::About => format!(
                    "{owner} is a software developer focused on data-driven applications, \
                     machine learning and building reliable backend services."
                ),
                Section::Skills => format!(
                    "{owner} works with Python, machine learning, data analysis, SQL, \
                     web development and cloud deployment tooling."
                ),
                Section::Experience => format!(
                    "{owner} has hands-on experience delivering software projects, \
                     internships and freelance work across data and web engineering."
                ),
                Section::Education => format!(
                    "{owner} holds a university degree in a computing-related field \
                     and keeps learning through courses and self-study."
                ),
                Section::Projects => format!(
                    "{owner} has built portfolio projects including data analysis \
                     dashboards, machine learning models and web applications."
                ),
                Section::Certificates => format!(
                    "{owner} has completed professional certificates in data science, \
                     machine learning and software development."
                ),
                Section::Contact => format!(
                    "{owner} can be reached through the contact form on the portfolio \
                     website, by email, or on LinkedIn and GitHub."
                ),
            }
        };

        let sections: BTreeMap<Section, String> =
            Section::ALL.iter().map(|s| (*s, text(*s))).collect();
        let full_text = sections.values().cloned().collect::<Vec<_>>().join(" ");

        Self::new(sections, full_text, ContentOrigin::Fallback)
    }
}
