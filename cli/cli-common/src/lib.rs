#![cfg_attr(not(debug_assertions), deny(warnings))]

use std::{
    env::VarError,
    fmt::Display,
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
    str::FromStr,
};

use shellexpand::LookupError;

pub mod logger;
pub mod rpc_staking;
pub mod ss58;

/// Filesystem path given on the command line, with `~` and `$VAR` expanded.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ExpandedPath(PathBuf);

impl Deref for ExpandedPath {
    type Target = PathBuf;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for ExpandedPath {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromStr for ExpandedPath {
    type Err = LookupError<VarError>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        shellexpand::full(s).map(|expanded| ExpandedPath(PathBuf::from(expanded.as_ref())))
    }
}

impl AsRef<Path> for ExpandedPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for ExpandedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.display().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_is_kept() {
        let path = ExpandedPath::from_str("info_waiting_lists").unwrap();
        assert_eq!(path.as_path(), Path::new("info_waiting_lists"));
        assert_eq!(path.to_string(), "info_waiting_lists");
    }

    #[test]
    fn variables_are_expanded() {
        std::env::set_var("WAITING_LIST_TEST_DIR", "/tmp/waiting");
        let path = ExpandedPath::from_str("$WAITING_LIST_TEST_DIR/lists").unwrap();
        assert_eq!(path.as_path(), Path::new("/tmp/waiting/lists"));
    }

    #[test]
    fn unknown_variable_is_an_error() {
        assert!(ExpandedPath::from_str("$WAITING_LIST_SURELY_UNSET_VARIABLE/x").is_err());
    }
}
