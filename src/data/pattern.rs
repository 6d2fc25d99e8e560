//! Lookup of zones and variables by index, name pattern, regex or handle.
//!
//! Name patterns are shell-style globs (`*`, `?`, `[abc]`, `[!abc]`) matched
//! case-insensitively against the whole name. The first match in dataset
//! order wins. Names are not unique, so which of several equally named items
//! a pattern returns is unspecified; pass a handle or an index when it matters.

use regex::{Regex, RegexBuilder};

use super::index::resolve_index;
use crate::data_error::{DataError, ItemKind};
use crate::handle::{DatasetId, VariableId, ZoneId};

/// Reference to a zone (`I = ZoneId`) or variable (`I = VariableId`).
#[derive(Clone, Debug)]
pub enum ItemRef<'a, I> {
    /// Position; negative counts from the end.
    Index(i64),
    /// Case-insensitive glob over names.
    Pattern(&'a str),
    /// Regular expression over names, used as given.
    Regex(&'a Regex),
    /// Existing handle; `dataset` is checked when known.
    Handle { dataset: Option<DatasetId>, id: I },
}

impl<I> From<i64> for ItemRef<'_, I> {
    fn from(i: i64) -> Self {
        ItemRef::Index(i)
    }
}

impl<I> From<i32> for ItemRef<'_, I> {
    fn from(i: i32) -> Self {
        ItemRef::Index(i64::from(i))
    }
}

impl<I> From<usize> for ItemRef<'_, I> {
    fn from(i: usize) -> Self {
        ItemRef::Index(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl<'a, I> From<&'a str> for ItemRef<'a, I> {
    fn from(p: &'a str) -> Self {
        ItemRef::Pattern(p)
    }
}

impl<'a, I> From<&'a String> for ItemRef<'a, I> {
    fn from(p: &'a String) -> Self {
        ItemRef::Pattern(p.as_str())
    }
}

impl<'a, I> From<&'a Regex> for ItemRef<'a, I> {
    fn from(r: &'a Regex) -> Self {
        ItemRef::Regex(r)
    }
}

impl From<ZoneId> for ItemRef<'_, ZoneId> {
    fn from(id: ZoneId) -> Self {
        ItemRef::Handle { dataset: None, id }
    }
}

impl From<VariableId> for ItemRef<'_, VariableId> {
    fn from(id: VariableId) -> Self {
        ItemRef::Handle { dataset: None, id }
    }
}

/// Translate a glob into an anchored regex source.
pub(crate) fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');
    let chars: Vec<char> = glob.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                let negated = chars.get(i + 1) == Some(&'!');
                let body = if negated { i + 2 } else { i + 1 };
                // A `]` first in the class is a member, not the end.
                let close = chars
                    .get(body + 1..)
                    .and_then(|rest| rest.iter().position(|&c| c == ']'))
                    .map(|p| body + 1 + p);
                match close {
                    Some(end) => {
                        out.push('[');
                        if negated {
                            out.push('^');
                        }
                        for &c in &chars[body..end] {
                            if matches!(c, '[' | ']' | '\\' | '^' | '&' | '~') {
                                out.push('\\');
                            }
                            out.push(c);
                        }
                        out.push(']');
                        i = end;
                    }
                    None => out.push_str(r"\["),
                }
            }
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
        i += 1;
    }
    out.push('$');
    out
}

/// Compiled name matcher.
#[derive(Clone, Debug)]
pub(crate) struct NameMatcher(Regex);

impl NameMatcher {
    pub(crate) fn glob(pattern: &str) -> Result<Self, DataError> {
        RegexBuilder::new(&glob_to_regex(pattern))
            .case_insensitive(true)
            .build()
            .map(NameMatcher)
            .map_err(|e| DataError::InvalidPattern {
                pattern: pattern.to_owned(),
                reason: e.to_string(),
            })
    }

    pub(crate) fn regex(re: &Regex) -> Self {
        NameMatcher(re.clone())
    }

    pub(crate) fn is_match(&self, name: &str) -> bool {
        self.0.is_match(name)
    }
}

/// How to look items up in one dataset.
pub(crate) struct Lookup<F, N, E> {
    pub(crate) owner: DatasetId,
    pub(crate) kind: ItemKind,
    pub(crate) len: usize,
    pub(crate) id_at: F,
    pub(crate) name_at: N,
    pub(crate) exists: E,
}

impl<I, F, N, E> Lookup<F, N, E>
where
    I: Copy,
    F: Fn(usize) -> Result<I, DataError>,
    N: Fn(usize) -> Result<String, DataError>,
    E: Fn(I) -> Result<(), DataError>,
{
    pub(crate) fn resolve(&self, item: &ItemRef<'_, I>) -> Result<I, DataError> {
        match item {
            ItemRef::Index(i) => {
                let what = match self.kind {
                    ItemKind::Zone => "zone",
                    ItemKind::Variable => "variable",
                };
                (self.id_at)(resolve_index(what, *i, self.len)?)
            }
            ItemRef::Handle { dataset, id } => {
                if let Some(found) = dataset.filter(|d| *d != self.owner) {
                    return Err(DataError::DatasetMismatch {
                        expected: self.owner,
                        found,
                    });
                }
                (self.exists)(*id)?;
                Ok(*id)
            }
            ItemRef::Pattern(p) => self.first_match(&NameMatcher::glob(p)?, p),
            ItemRef::Regex(re) => self.first_match(&NameMatcher::regex(re), re.as_str()),
        }
    }

    fn first_match(&self, matcher: &NameMatcher, shown: &str) -> Result<I, DataError> {
        for i in 0..self.len {
            if matcher.is_match(&(self.name_at)(i)?) {
                return (self.id_at)(i);
            }
        }
        Err(DataError::NotFound {
            kind: self.kind,
            pattern: shown.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globs_translate_and_anchor() {
        assert_eq!(glob_to_regex("x*"), "^x.*$");
        assert_eq!(glob_to_regex("a?c"), "^a.c$");
        assert_eq!(glob_to_regex("v[!xy]"), "^v[^xy]$");
        assert_eq!(glob_to_regex("p.q"), r"^p\.q$");
        assert_eq!(glob_to_regex("[x"), r"^\[x$");
        assert_eq!(glob_to_regex("[[]"), r"^[\[]$");
        assert_eq!(glob_to_regex("[]a]"), r"^[\]a]$");
        assert_eq!(glob_to_regex("[!]]x"), r"^[^\]]x$");
    }

    #[test]
    fn matching_is_case_insensitive_and_whole_name() {
        let m = NameMatcher::glob("Press*").unwrap();
        assert!(m.is_match("pressure"));
        assert!(!m.is_match("total pressure"));
        let m = NameMatcher::glob("X").unwrap();
        assert!(m.is_match("x"));
        assert!(!m.is_match("xy"));
    }

    #[test]
    fn bracket_members_compile() {
        let m = NameMatcher::glob("[[]*").unwrap();
        assert!(m.is_match("[tag] u"));
        assert!(!m.is_match("u"));
        let m = NameMatcher::glob("v[&~^]").unwrap();
        assert!(m.is_match("v&"));
        assert!(m.is_match("v^"));
        assert!(!m.is_match("vx"));
    }

    #[test]
    fn first_match_wins() {
        let names = ["x", "y", "Y"];
        let cat = Lookup {
            owner: DatasetId::new(1).unwrap(),
            kind: ItemKind::Variable,
            len: names.len(),
            id_at: |i: usize| Ok(i),
            name_at: |i: usize| Ok(names[i].to_string()),
            exists: |_: usize| Ok(()),
        };
        assert_eq!(cat.resolve(&ItemRef::Pattern("y")).unwrap(), 1);
        assert_eq!(cat.resolve(&ItemRef::Index(-1)).unwrap(), 2);
        assert!(matches!(
            cat.resolve(&ItemRef::Pattern("z")),
            Err(DataError::NotFound { .. })
        ));
    }
}
