//! Section/key-value text files that can be rewritten in place.
//!
//! The format is the one used by front-end configuration files:
//!
//! ```text
//! ; comment
//! # comment
//! [SECTION]
//! key = value
//! ```
//!
//! Every value remembers the line it came from and the byte span of its
//! text on that line. [`ConfigStore::write`] only splices changed values
//! back into their original lines, so comments, blank lines, ordering and
//! formatting of everything else are kept byte for byte.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, error};
use winnow::ascii::space0;
use winnow::combinator::{delimited, preceded, terminated};
use winnow::prelude::*;
use winnow::token::take_while;

use crate::error::{Error, Result};

/// Section holding keys that appear before the first header.
pub const DEFAULT_SECTION: &str = "MAIN";

/// Recognized boolean words, `(true, false)`.
const BOOLEAN_PAIRS: [(&str, &str); 6] = [
    ("true", "false"),
    ("1", "0"),
    ("on", "off"),
    ("yes", "no"),
    ("ja", "nein"),
    ("wahr", "falsch"),
];

/// A value together with where it lives in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    text: String,
    original: String,
    line: usize,
    span: Range<usize>,
    boolean: Option<bool>,
}

impl Value {
    fn new(text: &str, line: usize, span: Range<usize>) -> Self {
        Value {
            text: text.to_string(),
            original: text.to_string(),
            line,
            span,
            boolean: classify_boolean(text),
        }
    }

    /// Current text.
    pub fn get(&self) -> &str {
        &self.text
    }

    /// 0-based index of the owning line.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Boolean reading of the value, if its text is a boolean word.
    pub fn boolean(&self) -> Option<bool> {
        self.boolean
    }

    /// `true` iff the text differs from what was parsed.
    pub fn is_dirty(&self) -> bool {
        self.text != self.original
    }

    fn set(&mut self, text: &str) {
        self.text = text.to_string();
    }
}

/// An ordered key to [`Value`] mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    /// Line of the `[NAME]` header; `None` for [`DEFAULT_SECTION`].
    header: Option<usize>,
    values: IndexMap<String, Value>,
}

impl Section {
    /// Iterate over `(key, value)` pairs in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether the section holds no keys.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A parsed structured-text file.
///
/// Sections are addressed case-insensitively (stored upper case), keys
/// likewise (stored lower case).
///
/// # Examples
///
/// ```no_run
/// use portage_overrides::ConfigStore;
///
/// let mut store = ConfigStore::open("/etc/portato.cfg").unwrap();
/// if store.get_boolean("MAIN", "useperversion").unwrap() {
///     store.set_boolean("MAIN", "useperversion", false).unwrap();
/// }
/// store.write().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    lines: Vec<String>,
    sections: IndexMap<String, Section>,
}

impl ConfigStore {
    /// Create an empty store bound to `path`. Nothing is read yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let mut store = ConfigStore {
            path: path.into(),
            lines: Vec::new(),
            sections: IndexMap::new(),
        };
        store.reset();
        store
    }

    /// Create a store for `path` and parse it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let mut store = ConfigStore::new(path);
        store.parse()?;
        Ok(store)
    }

    /// The file this store reads from and writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reset(&mut self) {
        self.lines.clear();
        self.sections.clear();
        self.sections
            .insert(DEFAULT_SECTION.to_string(), Section::default());
    }

    /// (Re)read the file, replacing all in-memory state.
    ///
    /// Lines that are neither blank, a comment, a section header nor a
    /// `key = value` expression are logged and skipped.
    pub fn parse(&mut self) -> Result<()> {
        let content = fs::read_to_string(&self.path).map_err(|e| Error::io(&self.path, e))?;

        self.reset();
        self.lines = content.split_inclusive('\n').map(str::to_string).collect();

        let mut current = DEFAULT_SECTION.to_string();
        for (idx, line) in self.lines.iter().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with([';', '#']) {
                continue;
            }

            let body = strip_terminator(line);

            if let Ok(name) = section_header.parse(body) {
                current = name.to_uppercase();
                self.sections.entry(current.clone()).or_insert(Section {
                    header: Some(idx),
                    values: IndexMap::new(),
                });
                continue;
            }

            let mut rest = body;
            match assignment.parse_next(&mut rest) {
                Ok(key) => {
                    let text = rest.trim_end();
                    let start = body.len() - rest.len();
                    let value = Value::new(text, idx, start..start + text.len());
                    self.sections
                        .entry(current.clone())
                        .or_default()
                        .values
                        .insert(key.to_lowercase(), value);
                }
                Err(_) => {
                    error!(
                        file = %self.path.display(),
                        line = idx + 1,
                        "unrecognized line in configuration: {}",
                        body
                    );
                }
            }
        }

        debug!(file = %self.path.display(), sections = self.sections.len(), "parsed configuration");
        Ok(())
    }

    fn section(&self, section: &str) -> Result<&Section> {
        self.sections
            .get(section)
            .ok_or_else(|| Error::SectionNotFound {
                section: section.to_string(),
                file: self.path.clone(),
            })
    }

    fn access(&self, section: &str, key: &str) -> Result<&Value> {
        let (section, key) = (section.to_uppercase(), key.to_lowercase());
        self.section(&section)?
            .values
            .get(&key)
            .ok_or_else(|| Error::KeyNotFound {
                key,
                section: section.clone(),
                file: self.path.clone(),
            })
    }

    fn access_mut(&mut self, section: &str, key: &str) -> Result<&mut Value> {
        let (section, key) = (section.to_uppercase(), key.to_lowercase());
        let file = self.path.clone();
        let values = &mut self
            .sections
            .get_mut(&section)
            .ok_or_else(|| Error::SectionNotFound {
                section: section.clone(),
                file: file.clone(),
            })?
            .values;
        values.get_mut(&key).ok_or(Error::KeyNotFound { key, section, file })
    }

    /// Whether a section exists.
    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(&section.to_uppercase())
    }

    /// Section names in file order, [`DEFAULT_SECTION`] first.
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Keys and values of one section.
    pub fn section_values(&self, section: &str) -> Result<&Section> {
        self.section(&section.to_uppercase())
    }

    /// Key names of one section in file order.
    pub fn keys(&self, section: &str) -> Result<Vec<&str>> {
        Ok(self.section_values(section)?.iter().map(|(key, _)| key).collect())
    }

    /// Text of `key` in `section`.
    pub fn get(&self, section: &str, key: &str) -> Result<&str> {
        self.access(section, key).map(Value::get)
    }

    /// Boolean reading of `key` in `section`.
    pub fn get_boolean(&self, section: &str, key: &str) -> Result<bool> {
        let value = self.access(section, key)?;
        value.boolean.ok_or_else(|| Error::NotBoolean {
            key: key.to_lowercase(),
            value: value.text.clone(),
        })
    }

    /// Replace the text of an existing key.
    pub fn set(&mut self, section: &str, key: &str, text: &str) -> Result<()> {
        let value = self.access_mut(section, key)?;
        value.set(text);
        value.boolean = classify_boolean(text);
        Ok(())
    }

    /// Set a boolean key by switching to the paired word of its vocabulary.
    ///
    /// Setting a value to what it already means does nothing, so the value
    /// does not turn dirty.
    pub fn set_boolean(&mut self, section: &str, key: &str, flag: bool) -> Result<()> {
        let value = self.access_mut(section, key)?;
        match value.boolean {
            Some(current) if current == flag => Ok(()),
            Some(_) => {
                let inverted = invert_boolean(&value.text).ok_or_else(|| Error::NotBoolean {
                    key: key.to_lowercase(),
                    value: value.text.clone(),
                })?;
                value.set(&inverted);
                value.boolean = Some(flag);
                Ok(())
            }
            None => Err(Error::NotBoolean {
                key: key.to_lowercase(),
                value: value.text.clone(),
            }),
        }
    }

    fn ensure_trailing_newline(&mut self) {
        if let Some(last) = self.lines.last_mut() {
            if !last.ends_with('\n') {
                last.push('\n');
            }
        }
    }

    /// Append a new section at the end of the file.
    ///
    /// `comment` lines are written as a `#` block above the header. Adding
    /// a section that already exists does nothing. Takes effect on disk
    /// with the next [`write`](Self::write).
    pub fn add_section(&mut self, section: &str, comment: Option<&str>, with_blank_line: bool) {
        let section = section.to_uppercase();
        if self.sections.contains_key(&section) {
            return;
        }

        self.ensure_trailing_newline();
        if with_blank_line && !self.lines.is_empty() {
            self.lines.push("\n".to_string());
        }

        if let Some(comment) = comment {
            self.lines.push("#\n".to_string());
            for line in comment.lines() {
                self.lines.push(format!("# {line}\n"));
            }
            self.lines.push("#\n".to_string());
        }

        let header = self.lines.len();
        self.lines.push(format!("[{section}]\n"));
        self.sections.insert(
            section,
            Section {
                header: Some(header),
                values: IndexMap::new(),
            },
        );
    }

    /// Add `key = text` at the end of `section`, or update it if present.
    ///
    /// Pending changes are flushed first so line positions stay valid, and
    /// the file is written again afterwards.
    pub fn add(
        &mut self,
        section: &str,
        key: &str,
        text: &str,
        comment: Option<&str>,
        with_blank_line: bool,
    ) -> Result<()> {
        let section = section.to_uppercase();
        let key = key.to_lowercase();

        if self.section(&section)?.values.contains_key(&key) {
            return self.set(&section, &key, text);
        }

        self.write()?;

        let owner = self.section(&section)?;
        let mut at = match owner.values.values().map(|v| v.line).max() {
            Some(last) => last + 1,
            None => owner.header.map_or(0, |h| h + 1),
        };

        if at == self.lines.len() {
            self.ensure_trailing_newline();
        }

        if with_blank_line && at > 0 {
            self.lines.insert(at, "\n".to_string());
            at += 1;
        }

        if let Some(comment) = comment {
            for line in comment.lines() {
                self.lines.insert(at, format!("; {line}\n"));
                at += 1;
            }
        }

        self.lines.insert(at, format!("{key} = {text}\n"));
        self.write()
    }

    /// Write changed values back to the file and re-parse it.
    ///
    /// Only lines owning a dirty value are rebuilt, from the text before
    /// the value span, the new value and the text after it. Every other
    /// line is written back untouched. A store that never read any line
    /// writes nothing.
    pub fn write(&mut self) -> Result<()> {
        if self.lines.is_empty() {
            return Ok(());
        }

        for section in self.sections.values() {
            for value in section.values.values().filter(|v| v.is_dirty()) {
                let line = &self.lines[value.line];
                // The span never covers the line terminator, so an empty
                // value is spliced in right before it.
                let spliced = format!(
                    "{}{}{}",
                    &line[..value.span.start],
                    value.text,
                    &line[value.span.end..]
                );
                self.lines[value.line] = spliced;
            }
        }

        fs::write(&self.path, self.lines.concat()).map_err(|e| Error::io(&self.path, e))?;
        debug!(file = %self.path.display(), "wrote configuration");

        self.parse()
    }
}

fn strip_terminator(line: &str) -> &str {
    match line.strip_suffix('\n') {
        Some(line) => line.strip_suffix('\r').unwrap_or(line),
        None => line,
    }
}

fn classify_boolean(text: &str) -> Option<bool> {
    let lower = text.trim().to_lowercase();
    BOOLEAN_PAIRS.iter().find_map(|(t, f)| {
        if lower == *t {
            Some(true)
        } else if lower == *f {
            Some(false)
        } else {
            None
        }
    })
}

/// The paired word, in the case style of `word`.
fn invert_boolean(word: &str) -> Option<String> {
    let lower = word.trim().to_lowercase();
    let partner = BOOLEAN_PAIRS.iter().find_map(|(t, f)| {
        if lower == *t {
            Some(*f)
        } else if lower == *f {
            Some(*t)
        } else {
            None
        }
    })?;

    let has_letters = word.chars().any(char::is_alphabetic);
    if has_letters && !word.chars().any(char::is_lowercase) {
        Some(partner.to_uppercase())
    } else if word.starts_with(char::is_uppercase) {
        let mut chars = partner.chars();
        Some(match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        })
    } else {
        Some(partner.to_string())
    }
}

// Winnow parsers

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_section_char(c: char) -> bool {
    is_word_char(c) || c == '-'
}

fn is_key_char(c: char) -> bool {
    is_word_char(c) || c == '-' || c == ':'
}

fn section_header<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    delimited(
        (space0, '['),
        take_while(1.., is_section_char).verify(|name: &str| name.starts_with(is_word_char)),
        (']', space0),
    )
    .parse_next(input)
}

fn assignment<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    terminated(
        preceded(
            space0,
            take_while(1.., is_key_char).verify(|key: &str| key.starts_with(is_word_char)),
        ),
        (space0, '=', space0),
    )
    .parse_next(input)
}
