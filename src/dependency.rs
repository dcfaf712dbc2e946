use std::slice;

use indexmap::{IndexMap, IndexSet};
use winnow::ascii::multispace0;
use winnow::combinator::{alt, cut_err, delimited, preceded, repeat};
use winnow::error::StrContext;
use winnow::prelude::*;
use winnow::token::take_while;

use crate::error::{Error, Result};
use crate::package::PackageDatabase;

/// One element of a flattened dependency string.
///
/// A parenthesized clause becomes a nested [`DepToken::Group`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepToken {
    /// Any whitespace-delimited word: an atom, `flag?`, `!flag?` or `||`.
    Atom(String),
    /// The contents of a `( ... )` clause.
    Group(Vec<DepToken>),
}

impl DepToken {
    /// Split a raw `DEPEND`-style string into nested tokens.
    ///
    /// # Examples
    ///
    /// ```
    /// use portage_overrides::DepToken;
    ///
    /// let tokens = DepToken::parse_str("a/b ssl? ( c/d )").unwrap();
    /// assert_eq!(tokens.len(), 3);
    /// assert!(matches!(tokens[2], DepToken::Group(_)));
    /// ```
    pub fn parse_str(input: &str) -> Result<Vec<DepToken>> {
        tokens_string
            .parse(input)
            .map_err(|e| Error::InvalidDependency(format!("{e}")))
    }

    fn as_body(&self) -> &[DepToken] {
        match self {
            DepToken::Group(tokens) => tokens,
            atom => slice::from_ref(atom),
        }
    }
}

impl From<&str> for DepToken {
    fn from(atom: &str) -> Self {
        DepToken::Atom(atom.to_string())
    }
}

impl<T: Into<DepToken>> From<Vec<T>> for DepToken {
    fn from(tokens: Vec<T>) -> Self {
        DepToken::Group(tokens.into_iter().map(Into::into).collect())
    }
}

/// A plain package atom inside a [`DependencyTree`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Dependency {
    atom: String,
}

impl Dependency {
    /// Wrap an atom string.
    pub fn new(atom: impl Into<String>) -> Self {
        Dependency { atom: atom.into() }
    }

    /// The atom text.
    pub fn atom(&self) -> &str {
        &self.atom
    }

    /// Whether an installed package satisfies the atom.
    pub fn is_satisfied<D: PackageDatabase>(&self, db: &D) -> bool {
        db.is_installed(&self.atom)
    }
}

/// Tree form of a dependency token stream.
///
/// Plain atoms are collected in a set, USE-conditional clauses are keyed by
/// their flag (one subtree per flag, shared by every clause naming it),
/// `||` clauses and bare groups become child trees. The tree is built once
/// and only read afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyTree {
    deps: IndexSet<Dependency>,
    flags: IndexMap<String, DependencyTree>,
    ors: Vec<DependencyTree>,
    subs: Vec<DependencyTree>,
}

impl DependencyTree {
    /// Build a tree from a token stream.
    ///
    /// # Examples
    ///
    /// ```
    /// use portage_overrides::{DepToken, DependencyTree};
    ///
    /// let tokens: Vec<DepToken> = vec![
    ///     "a/b".into(),
    ///     "flag?".into(),
    ///     vec!["c/d"].into(),
    ///     "||".into(),
    ///     vec!["e/f", "g/h"].into(),
    /// ];
    /// let tree = DependencyTree::parse(&tokens).unwrap();
    /// assert_eq!(tree.atoms().count(), 1);
    /// assert!(tree.flag("flag").is_some());
    /// assert_eq!(tree.ors().count(), 1);
    /// ```
    pub fn parse(tokens: &[DepToken]) -> Result<Self> {
        let mut tree = DependencyTree::default();
        tree.extend(tokens)?;
        Ok(tree)
    }

    /// Tokenize and parse a raw dependency string.
    pub fn parse_str(input: &str) -> Result<Self> {
        DependencyTree::parse(&DepToken::parse_str(input)?)
    }

    fn extend(&mut self, tokens: &[DepToken]) -> Result<()> {
        let mut it = tokens.iter();
        while let Some(token) = it.next() {
            match token {
                DepToken::Atom(word) if word.len() > 1 && word.ends_with('?') => {
                    let body = it.next().ok_or_else(|| {
                        Error::InvalidDependency(format!("'{word}' is not followed by a clause"))
                    })?;
                    let flag = &word[..word.len() - 1];
                    self.flags
                        .entry(flag.to_string())
                        .or_default()
                        .extend(body.as_body())?;
                }
                DepToken::Atom(word) if word == "||" => {
                    let body = it.next().ok_or_else(|| {
                        Error::InvalidDependency("'||' is not followed by a clause".to_string())
                    })?;
                    self.ors.push(DependencyTree::parse(body.as_body())?);
                }
                DepToken::Group(group) => {
                    self.subs.push(DependencyTree::parse(group)?);
                }
                DepToken::Atom(atom) => {
                    self.deps.insert(Dependency::new(atom.as_str()));
                }
            }
        }
        Ok(())
    }

    /// Whether the tree holds nothing at all.
    pub fn is_empty(&self) -> bool {
        self.deps.is_empty() && self.flags.is_empty() && self.ors.is_empty() && self.subs.is_empty()
    }

    /// Plain atoms at this level.
    pub fn atoms(&self) -> impl Iterator<Item = &Dependency> {
        self.deps.iter()
    }

    /// The subtree guarded by `flag` (`"!flag"` for a negated conditional).
    pub fn flag(&self, flag: &str) -> Option<&DependencyTree> {
        self.flags.get(flag)
    }

    /// All USE-conditional subtrees with their flags.
    pub fn flags(&self) -> impl Iterator<Item = (&str, &DependencyTree)> {
        self.flags.iter().map(|(flag, tree)| (flag.as_str(), tree))
    }

    /// Non-empty `||` groups.
    pub fn ors(&self) -> impl Iterator<Item = &DependencyTree> {
        self.ors.iter().filter(|tree| !tree.is_empty())
    }

    /// Non-empty plain groups.
    pub fn subs(&self) -> impl Iterator<Item = &DependencyTree> {
        self.subs.iter().filter(|tree| !tree.is_empty())
    }
}

// Winnow parsers

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && c != '(' && c != ')'
}

fn parse_group(input: &mut &str) -> ModalResult<DepToken> {
    delimited(
        '(',
        parse_tokens,
        cut_err((multispace0, ')')).context(StrContext::Label("closing ')'")),
    )
    .map(DepToken::Group)
    .parse_next(input)
}

fn parse_word(input: &mut &str) -> ModalResult<DepToken> {
    take_while(1.., is_word_char)
        .map(|s: &str| DepToken::Atom(s.to_string()))
        .parse_next(input)
}

fn parse_tokens(input: &mut &str) -> ModalResult<Vec<DepToken>> {
    repeat(0.., preceded(multispace0, alt((parse_group, parse_word)))).parse_next(input)
}

fn tokens_string(input: &mut &str) -> ModalResult<Vec<DepToken>> {
    let tokens = parse_tokens(input)?;
    multispace0.parse_next(input)?;
    Ok(tokens)
}
