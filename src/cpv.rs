use std::fmt;
use std::str::FromStr;

use winnow::ascii::digit1;
use winnow::combinator::{alt, opt, preceded, repeat};
use winnow::prelude::*;
use winnow::token::one_of;

use crate::error::{Error, Result};

/// A fully versioned package identifier, `category/name-version[-rN]`.
///
/// This is the key every pending override is filed under. Revision `0` is
/// implicit and never printed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cpv {
    /// Category, e.g. `dev-python`.
    pub category: String,
    /// Package name, e.g. `requests`.
    pub name: String,
    /// Version without revision, e.g. `2.31.0_rc1`.
    pub version: String,
    /// Revision number (`-r2` is `2`, absent is `0`).
    pub revision: u32,
}

impl Cpv {
    /// Split an identifier into category, name, version and revision.
    ///
    /// # Examples
    ///
    /// ```
    /// use portage_overrides::Cpv;
    ///
    /// let cpv = Cpv::parse("dev-python/requests-2.31.0-r1").unwrap();
    /// assert_eq!(cpv.category, "dev-python");
    /// assert_eq!(cpv.name, "requests");
    /// assert_eq!(cpv.version, "2.31.0");
    /// assert_eq!(cpv.revision, 1);
    /// assert_eq!(cpv.cp(), "dev-python/requests");
    /// ```
    pub fn parse(input: &str) -> Result<Cpv> {
        let invalid = || Error::InvalidCpv(input.to_string());

        let (category, rest) = input.split_once('/').ok_or_else(invalid)?;
        if !is_valid_name(category) {
            return Err(invalid());
        }

        // The name ends at the first hyphen followed by a complete version.
        for (idx, _) in rest.match_indices('-') {
            let name = &rest[..idx];
            if !is_valid_name(name) {
                continue;
            }
            if let Ok((version, revision)) = version_and_revision.parse(&rest[idx + 1..]) {
                let revision = match revision {
                    Some(digits) => digits.parse::<u32>().map_err(|_| invalid())?,
                    None => 0,
                };
                return Ok(Cpv {
                    category: category.to_string(),
                    name: name.to_string(),
                    version: version.to_string(),
                    revision,
                });
            }
        }

        Err(invalid())
    }

    /// `category/name` without any version.
    pub fn cp(&self) -> String {
        format!("{}/{}", self.category, self.name)
    }

    /// The version including `-rN` when the revision is not `r0`.
    pub fn version_with_revision(&self) -> String {
        if self.revision == 0 {
            self.version.clone()
        } else {
            format!("{}-r{}", self.version, self.revision)
        }
    }
}

impl FromStr for Cpv {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Cpv::parse(s)
    }
}

impl fmt::Display for Cpv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}/{}-{}",
            self.category,
            self.name,
            self.version_with_revision()
        )
    }
}

fn is_valid_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '_' | '.' | '-'))
}

// Winnow parsers

fn parse_version<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    (
        digit1,
        repeat::<_, _, (), _, _>(0.., ('.', digit1)),
        opt(one_of('a'..='z')),
        repeat::<_, _, (), _, _>(
            0..,
            (
                alt(("_alpha", "_beta", "_pre", "_rc", "_p")),
                opt(digit1),
            ),
        ),
    )
        .take()
        .parse_next(input)
}

fn version_and_revision<'s>(input: &mut &'s str) -> ModalResult<(&'s str, Option<&'s str>)> {
    (parse_version, opt(preceded("-r", digit1))).parse_next(input)
}
