//! The streaming transform pass.

use crate::anonymize::anonymize_line;
use crate::options::TransformOptions;
use crate::prefix::PrefixRewriter;
use crate::serialized::search_replace_line;
use crate::TransformError;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransformStats {
    pub lines_in: u64,
    pub lines_out: u64,
    pub skipped_inserts: u64,
}

/// A compiled transform over dump lines: prefix rewrite, then
/// search/replace pairs, then anonymization, then truncation-skip.
pub struct TransformEngine {
    opts: TransformOptions,
    prefix: Option<PrefixRewriter>,
    /// Fully-prefixed table names whose INSERTs are dropped.
    truncate: BTreeSet<String>,
}

impl TransformEngine {
    pub fn new(opts: TransformOptions) -> Result<Self, TransformError> {
        let prefix = match (&opts.old_prefix, &opts.new_prefix) {
            (Some(old), Some(new)) if old != new => Some(PrefixRewriter::new(old, new)?),
            _ => None,
        };

        // Logical names resolve against both prefixes; by the time the
        // truncation check runs the line already carries the new prefix.
        let mut truncate = BTreeSet::new();
        for table in &opts.truncate_tables {
            truncate.insert(table.clone());
            if let Some(old) = &opts.old_prefix {
                truncate.insert(format!("{old}{table}"));
            }
            if let Some(new) = &opts.new_prefix {
                truncate.insert(format!("{new}{table}"));
            }
        }

        Ok(Self {
            opts,
            prefix,
            truncate,
        })
    }

    /// Transform one line. `None` means the line is dropped (truncated
    /// table INSERT).
    pub fn transform_line(&self, line: &str) -> Option<String> {
        let mut out = match &self.prefix {
            Some(rewriter) => rewriter.rewrite(line).into_owned(),
            None => line.to_owned(),
        };

        for pair in &self.opts.search_replace {
            out = search_replace_line(&out, &pair.search, &pair.replace);
        }

        if self.opts.anonymize || self.opts.anonymize_names || self.opts.reset_passwords {
            out = anonymize_line(
                &out,
                self.opts.anonymize,
                self.opts.anonymize_names,
                self.opts.reset_passwords,
            );
        }

        if self.is_truncated_insert(&out) {
            return None;
        }
        Some(out)
    }

    fn is_truncated_insert(&self, line: &str) -> bool {
        if self.truncate.is_empty() {
            return false;
        }
        let Some(rest) = line.strip_prefix("INSERT INTO `") else {
            return false;
        };
        let Some((table, _)) = rest.split_once('`') else {
            return false;
        };
        self.truncate.contains(table)
    }

    /// Run the full pass: read `input` line by line, write the transformed
    /// dump to `output`. Pure aside from these two files.
    pub fn run(&self, input: &Path, output: &Path) -> Result<TransformStats, TransformError> {
        let reader = BufReader::new(File::open(input)?);
        let mut writer = BufWriter::new(File::create(output)?);
        let mut stats = TransformStats::default();

        for line in reader.lines() {
            let line = line?;
            stats.lines_in += 1;
            match self.transform_line(&line) {
                Some(out) => {
                    writer.write_all(out.as_bytes())?;
                    writer.write_all(b"\n")?;
                    stats.lines_out += 1;
                }
                None => stats.skipped_inserts += 1,
            }
        }
        writer.flush()?;
        Ok(stats)
    }
}
