//! Virtual path cleaning and manipulation.
//!
//! A [`VPath`] is always absolute, forward-slash separated, and free of `.`
//! and `..` components. Cleaning is idempotent: `clean(clean(p)) == clean(p)`.

use std::fmt;

/// An absolute, cleaned, forward-slash virtual path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VPath(String);

pub const SEPARATOR: char = '/';

impl VPath {
    /// Cleans an arbitrary path string into canonical form: backslashes
    /// become forward slashes, `.`/`..`/repeated separators collapse, and a
    /// leading `/` is forced.
    pub fn clean(raw: &str) -> VPath {
        VPath(clean_str(raw))
    }

    pub fn root() -> VPath {
        VPath("/".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Non-empty path components, in order.
    pub fn components(&self) -> Vec<&str> {
        self.0.split(SEPARATOR).filter(|c| !c.is_empty()).collect()
    }

    pub fn name(&self) -> &str {
        self.components().last().copied().unwrap_or("/")
    }

    /// Joins a relative child name onto this path and re-cleans.
    pub fn join(&self, child: &str) -> VPath {
        if self.is_root() {
            VPath::clean(&format!("/{}", child))
        } else {
            VPath::clean(&format!("{}/{}", self.0, child))
        }
    }

    pub fn parent(&self) -> VPath {
        let comps = self.components();
        if comps.len() <= 1 {
            return VPath::root();
        }
        VPath::clean(&format!("/{}", comps[..comps.len() - 1].join("/")))
    }

    /// Returns the remainder of `self` after stripping the `prefix` mount
    /// point, re-rooted to `/`. `prefix` must be a cleaned ancestor path.
    pub fn strip_mount(&self, prefix: &VPath) -> VPath {
        if prefix.is_root() {
            return self.clone();
        }
        let stripped = self.0.strip_prefix(prefix.as_str()).unwrap_or("");
        if stripped.is_empty() {
            VPath::root()
        } else {
            VPath::clean(stripped)
        }
    }
}

impl fmt::Display for VPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VPath {
    fn from(s: &str) -> Self {
        VPath::clean(s)
    }
}

impl From<String> for VPath {
    fn from(s: String) -> Self {
        VPath::clean(&s)
    }
}

fn clean_str(raw: &str) -> String {
    let normalized = raw.replace('\\', "/");
    let mut stack: Vec<&str> = Vec::new();
    for part in normalized.split(SEPARATOR) {
        match part {
            "" | "." => continue,
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    if stack.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", stack.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_is_idempotent() {
        let cases = ["/folder/file.txt", "//.//", "a/b/../c", "\\a\\b", "", "/../.."];
        for c in cases {
            let once = VPath::clean(c);
            let twice = VPath::clean(once.as_str());
            assert_eq!(once, twice, "not idempotent for {c:?}");
        }
    }

    #[test]
    fn backslashes_normalise() {
        assert_eq!(VPath::clean("a\\b\\c").as_str(), "/a/b/c");
    }

    #[test]
    fn dot_dot_collapses() {
        assert_eq!(VPath::clean("/a/b/../c").as_str(), "/a/c");
        assert_eq!(VPath::clean("/../..").as_str(), "/");
    }

    #[test]
    fn repeated_separators_collapse() {
        assert_eq!(VPath::clean("//.//").as_str(), "/");
        assert_eq!(VPath::clean("/a//b///c").as_str(), "/a/b/c");
    }

    #[test]
    fn components_and_name() {
        let p = VPath::clean("/a/b/c.txt");
        assert_eq!(p.components(), vec!["a", "b", "c.txt"]);
        assert_eq!(p.name(), "c.txt");
        assert_eq!(VPath::root().name(), "/");
    }

    #[test]
    fn join_reroots_and_cleans() {
        let root = VPath::root();
        assert_eq!(root.join("a").as_str(), "/a");
        let sub = VPath::clean("/a/b");
        assert_eq!(sub.join("../c").as_str(), "/a/c");
    }

    #[test]
    fn strip_mount_reroots_remainder() {
        let mount = VPath::clean("/movie.torrent");
        let full = VPath::clean("/movie.torrent/disc.iso/inner.mkv");
        assert_eq!(full.strip_mount(&mount).as_str(), "/disc.iso/inner.mkv");

        let root = VPath::root();
        assert_eq!(full.strip_mount(&root).as_str(), full.as_str());
    }

    proptest::proptest! {
        #[test]
        fn clean_is_idempotent_for_arbitrary_input(raw in "[a-zA-Z0-9/.\\\\]{0,64}") {
            let once = VPath::clean(&raw);
            let twice = VPath::clean(once.as_str());
            proptest::prop_assert_eq!(once, twice);
        }

        #[test]
        fn clean_always_starts_with_a_separator(raw in "[a-zA-Z0-9/.\\\\]{0,64}") {
            proptest::prop_assert!(VPath::clean(&raw).as_str().starts_with('/'));
        }
    }
}
