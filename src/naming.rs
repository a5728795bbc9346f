//! Output file stems: Chinese names become Pinyin, then anything a
//! filesystem would reject is replaced.

use pinyin::ToPinyin;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameFormat {
    /// `Xiaoming Li`
    #[default]
    #[serde(rename = "givenname_surname")]
    GivenNameSurname,
    /// `Li Xiaoming`
    #[serde(rename = "surname_givenname")]
    SurnameGivenName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Convert stems containing Chinese characters to Pinyin.
    pub convert_chinese: bool,
    pub name_format: NameFormat,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            convert_chinese: true,
            name_format: NameFormat::GivenNameSurname,
        }
    }
}

fn is_han(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

pub fn has_chinese(stem: &str) -> bool {
    stem.chars().any(is_han)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Romanize a Chinese name. The first character is the surname.
///
/// Characters outside the CJK unified block are dropped. Returns `None` when
/// nothing convertible is left.
pub fn convert_chinese_name(name: &str, format: NameFormat) -> Option<String> {
    let syllables: Vec<&str> = name
        .chars()
        .filter(|c| is_han(*c))
        .filter_map(|c| c.to_pinyin())
        .map(|p| p.plain())
        .collect();

    let (surname, given) = syllables.split_first()?;
    if given.is_empty() {
        return Some(capitalize(surname));
    }
    let surname = capitalize(surname);
    let given = capitalize(&given.concat());
    Some(match format {
        NameFormat::GivenNameSurname => format!("{given} {surname}"),
        NameFormat::SurnameGivenName => format!("{surname} {given}"),
    })
}

/// Replace characters illegal in Windows file names and trim spaces and dots.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Final output stem for a source file stem.
pub fn output_stem(stem: &str, cfg: &NamingConfig) -> String {
    let mut name = stem.to_string();
    if cfg.convert_chinese && has_chinese(stem) {
        match convert_chinese_name(stem, cfg.name_format) {
            Some(english) => {
                log::debug!("renamed '{}' -> '{}'", stem, english);
                name = english;
            }
            None => log::warn!("could not convert Chinese name '{}'", stem),
        }
    }
    sanitize_filename(&name)
}
