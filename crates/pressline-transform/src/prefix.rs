//! Table-prefix rewriting over SQL identifiers.

use crate::TransformError;
use regex::Regex;
use std::borrow::Cow;

fn validate_prefix(prefix: &str) -> Result<(), TransformError> {
    if prefix.is_empty()
        || !prefix
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
    {
        return Err(TransformError::InvalidPrefix(prefix.to_owned()));
    }
    Ok(())
}

/// Rewrites `old_prefix` to `new_prefix` wherever the prefix is used as a
/// SQL identifier: backtick-quoted table names in `CREATE TABLE`,
/// `INSERT INTO`, and constraint/index references. Occurrences of the
/// prefix string outside backticked identifiers are left untouched.
#[derive(Debug)]
pub struct PrefixRewriter {
    ident: Regex,
    replacement: String,
}

impl PrefixRewriter {
    pub fn new(old_prefix: &str, new_prefix: &str) -> Result<Self, TransformError> {
        validate_prefix(old_prefix)?;
        validate_prefix(new_prefix)?;
        let ident = Regex::new(&format!("`{}([A-Za-z0-9_]*)`", regex::escape(old_prefix)))
            .map_err(|_| TransformError::InvalidPrefix(old_prefix.to_owned()))?;
        Ok(Self {
            ident,
            replacement: format!("`{new_prefix}$1`"),
        })
    }

    pub fn rewrite<'a>(&self, line: &'a str) -> Cow<'a, str> {
        self.ident.replace_all(line, self.replacement.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rw(old: &str, new: &str, line: &str) -> String {
        PrefixRewriter::new(old, new)
            .unwrap()
            .rewrite(line)
            .into_owned()
    }

    #[test]
    fn rewrites_create_table() {
        assert_eq!(
            rw("wp_", "wpdev_", "CREATE TABLE `wp_posts` (`ID` bigint);"),
            "CREATE TABLE `wpdev_posts` (`ID` bigint);"
        );
    }

    #[test]
    fn rewrites_insert_into() {
        assert_eq!(
            rw("wp_", "wpdev_", "INSERT INTO `wp_options` VALUES (1,'siteurl');"),
            "INSERT INTO `wpdev_options` VALUES (1,'siteurl');"
        );
    }

    #[test]
    fn rewrites_constraint_references() {
        assert_eq!(
            rw(
                "wp_",
                "s2_",
                "CONSTRAINT `fk` FOREIGN KEY (`post_id`) REFERENCES `wp_posts` (`ID`)"
            ),
            "CONSTRAINT `fk` FOREIGN KEY (`post_id`) REFERENCES `s2_posts` (`ID`)"
        );
    }

    #[test]
    fn leaves_non_identifier_occurrences_alone() {
        let line = "INSERT INTO `wp_options` VALUES (1,'prefix is wp_ in text');";
        assert_eq!(
            rw("wp_", "wpdev_", line),
            "INSERT INTO `wpdev_options` VALUES (1,'prefix is wp_ in text');"
        );
    }

    #[test]
    fn noop_rewrite_is_byte_identical() {
        let lines = [
            "CREATE TABLE `wp_posts` (`ID` bigint);",
            "INSERT INTO `wp_usermeta` VALUES (1,1,'nickname','x');",
            "-- comment mentioning wp_",
        ];
        let rewriter = PrefixRewriter::new("wp_", "wp_").unwrap();
        for line in lines {
            assert_eq!(rewriter.rewrite(line), line);
        }
    }

    #[test]
    fn bare_identifier_matching_prefix_only() {
        // `wp_` as the whole identifier still rewrites
        assert_eq!(rw("wp_", "x_", "SELECT * FROM `wp_`;"), "SELECT * FROM `x_`;");
    }

    #[test]
    fn invalid_prefix_rejected() {
        assert!(PrefixRewriter::new("", "wp_").is_err());
        assert!(PrefixRewriter::new("wp_", "bad prefix").is_err());
        assert!(PrefixRewriter::new("wp.", "wp_").is_err());
    }
}
