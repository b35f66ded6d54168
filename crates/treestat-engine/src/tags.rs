//! File-category tags.
//!
//! Every node gets `*`, a type tag, and either its matched categories or
//! `other`. Matching runs on the lower-cased node name (the absolute path):
//! suffix rules cannot cross a `/`, while the `temporary` substring rule
//! deliberately catches anything under a tmp directory. The returned set is
//! deduplicated and lexicographically sorted, which is the canonical order
//! for stored mappings.

use std::collections::BTreeSet;

pub const FILE_TYPE_FILE: u8 = b'f';
pub const FILE_TYPE_DIRECTORY: u8 = b'd';
pub const FILE_TYPE_SYMLINK: u8 = b'l';

const CRAM_SUFFIXES: &[&str] = &[".cram"];
const BAM_SUFFIXES: &[&str] = &[".bam"];
const INDEX_SUFFIXES: &[&str] = &[".crai", ".bai", ".sai", ".fai", ".csi"];
const COMPRESSED_SUFFIXES: &[&str] = &[".bzip2", ".gz", ".tgz", ".zip", ".xz", ".bgz", ".bcf"];
const UNCOMPRESSED_SUFFIXES: &[&str] = &[
    ".sam", ".fasta", ".fastq", ".fa", ".fq", ".vcf", ".csv", ".tsv", ".txt", ".text", "readme",
];
const CHECKPOINT_SUFFIXES: &[&str] = &["jobstate.context"];
const TEMPORARY_SUBSTRINGS: &[&str] = &["tmp", "temp"];

/// The fixed category rule table, in declaration order.
const CATEGORY_SUFFIX_RULES: &[(&str, &[&str])] = &[
    ("cram", CRAM_SUFFIXES),
    ("bam", BAM_SUFFIXES),
    ("index", INDEX_SUFFIXES),
    ("compressed", COMPRESSED_SUFFIXES),
    ("uncompressed", UNCOMPRESSED_SUFFIXES),
    ("checkpoint", CHECKPOINT_SUFFIXES),
];

/// Compute the full tag set for a node name and file type.
pub fn node_tags(name: &str, file_type: u8) -> BTreeSet<String> {
    let lower = name.to_lowercase();
    let mut tags = BTreeSet::new();

    for (category, suffixes) in CATEGORY_SUFFIX_RULES {
        if suffixes.iter().any(|s| lower.ends_with(s)) {
            tags.insert((*category).to_string());
        }
    }
    if TEMPORARY_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
        tags.insert("temporary".to_string());
    }
    if tags.is_empty() {
        tags.insert("other".to_string());
    }

    tags.insert("*".to_string());

    match file_type {
        FILE_TYPE_FILE => {
            tags.insert("file".to_string());
        }
        FILE_TYPE_DIRECTORY => {
            tags.insert("directory".to_string());
        }
        FILE_TYPE_SYMLINK => {
            tags.insert("link".to_string());
        }
        other => {
            tags.insert("other".to_string());
            tags.insert(format!("type_{}", other as char));
        }
    }

    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(name: &str, ft: u8) -> Vec<String> {
        node_tags(name, ft).into_iter().collect()
    }

    #[test]
    fn test_plain_file_gets_star_file_other() {
        assert_eq!(tags("/a", FILE_TYPE_FILE), vec!["*", "file", "other"]);
    }

    #[test]
    fn test_bam_and_cram() {
        assert_eq!(tags("/d/x.bam", FILE_TYPE_FILE), vec!["*", "bam", "file"]);
        assert_eq!(tags("/d/y.cram", FILE_TYPE_FILE), vec!["*", "cram", "file"]);
    }

    #[test]
    fn test_index_suffixes() {
        for name in ["/p/a.crai", "/p/a.bai", "/p/a.sai", "/p/a.fai", "/p/a.csi"] {
            assert!(node_tags(name, FILE_TYPE_FILE).contains("index"), "{name}");
        }
    }

    #[test]
    fn test_compressed_and_uncompressed() {
        assert!(node_tags("/p/data.gz", FILE_TYPE_FILE).contains("compressed"));
        assert!(node_tags("/p/data.vcf", FILE_TYPE_FILE).contains("uncompressed"));
        assert!(node_tags("/p/README", FILE_TYPE_FILE).contains("uncompressed"));
    }

    #[test]
    fn test_readme_requires_suffix_match() {
        // "readme_notes" does not end with "readme": no category matches.
        assert_eq!(
            tags("/r/readme_notes", FILE_TYPE_FILE),
            vec!["*", "file", "other"]
        );
    }

    #[test]
    fn test_checkpoint() {
        assert!(node_tags("/j/x.jobstate.context", FILE_TYPE_FILE).contains("checkpoint"));
    }

    #[test]
    fn test_temporary_matches_anywhere_in_path() {
        assert!(node_tags("/work/tmp/job.out", FILE_TYPE_FILE).contains("temporary"));
        assert!(node_tags("/work/TempData/x", FILE_TYPE_FILE).contains("temporary"));
        assert!(!node_tags("/work/job.out", FILE_TYPE_FILE).contains("temporary"));
    }

    #[test]
    fn test_other_only_when_no_category_matched() {
        // A matched category suppresses the fallback tag.
        assert!(!node_tags("/d/x.bam", FILE_TYPE_FILE).contains("other"));
        assert!(node_tags("/d/x.dat", FILE_TYPE_FILE).contains("other"));
    }

    #[test]
    fn test_directory_and_link_type_tags() {
        assert_eq!(tags("/e", FILE_TYPE_DIRECTORY), vec!["*", "directory", "other"]);
        assert_eq!(tags("/e/ln", FILE_TYPE_SYMLINK), vec!["*", "link", "other"]);
    }

    #[test]
    fn test_unknown_file_type() {
        let t = node_tags("/dev/sda", b's');
        assert!(t.contains("other"));
        assert!(t.contains("type_s"));
        assert!(!t.contains("file"));
    }

    #[test]
    fn test_sorted_and_deduplicated() {
        let t = tags("/u/x.dat", b's');
        let mut sorted = t.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(t, sorted);
    }
}
