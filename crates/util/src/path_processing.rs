//! Filesystem path helpers for configuration values.

use std::path::PathBuf;

use dirs_next::home_dir;

/// Expands a leading `~` to the current user's home directory.
///
/// Both `~/` and `~\` prefixes are recognised. When no home directory can be
/// determined the `~` is kept as a literal path component.
pub fn expand_tilde(path: &str) -> PathBuf {
    let trimmed = path.trim();
    let Some(rest) = trimmed.strip_prefix('~') else {
        return PathBuf::from(trimmed);
    };
    let home = || home_dir().unwrap_or_else(|| PathBuf::from("~"));
    if rest.is_empty() {
        return home();
    }
    match rest.strip_prefix(['/', '\\']) {
        Some(relative) => home().join(relative),
        // `~user` style paths are left alone.
        None => PathBuf::from(trimmed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_plain_paths_untouched() {
        assert_eq!(expand_tilde("./storage"), PathBuf::from("./storage"));
        assert_eq!(expand_tilde("  /var/lib/fnhost "), PathBuf::from("/var/lib/fnhost"));
    }

    #[test]
    fn expands_home_prefix() {
        temp_env::with_var("HOME", Some("/home/tester"), || {
            assert_eq!(expand_tilde("~/blobs"), PathBuf::from("/home/tester/blobs"));
            assert_eq!(expand_tilde("~"), PathBuf::from("/home/tester"));
        });
    }
}
