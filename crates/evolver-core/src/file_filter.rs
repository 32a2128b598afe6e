//! Path eligibility rules for mutation and knowledge ingestion.

use std::sync::OnceLock;

use regex::Regex;

use crate::source_control::TreeEntry;

/// Files at or above this size are never mutated.
pub const MAX_MUTATION_FILE_SIZE: u64 = 60_000;
/// Files at or above this size are never ingested by repository sync.
pub const MAX_KNOWLEDGE_FILE_SIZE: u64 = 100_000;
/// Directory fragment excluded from mutation.
pub const VENDORED_DIR: &str = "node_modules";

const LANGUAGES: &[(&str, &str)] = &[
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("py", "python"),
    ("java", "java"),
    ("go", "go"),
    ("rs", "rust"),
    ("cpp", "cpp"),
    ("c", "c"),
    ("cs", "csharp"),
    ("php", "php"),
    ("rb", "ruby"),
    ("swift", "swift"),
    ("kt", "kotlin"),
    ("scala", "scala"),
    ("sh", "shell"),
    ("bash", "shell"),
    ("json", "json"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("xml", "xml"),
    ("md", "markdown"),
    ("html", "html"),
    ("css", "css"),
    ("scss", "scss"),
    ("sql", "sql"),
];

fn source_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\.(js|jsx|ts|tsx)$").expect("static pattern"))
}

fn knowledge_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let alternation = LANGUAGES
            .iter()
            .map(|(ext, _)| *ext)
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"\.({alternation})$")).expect("static pattern")
    })
}

/// Whether a tree entry may be chosen as a mutation target.
pub fn is_mutation_candidate(entry: &TreeEntry) -> bool {
    entry.is_blob()
        && source_pattern().is_match(&entry.path)
        && entry.size < MAX_MUTATION_FILE_SIZE
        && !entry.path.contains(VENDORED_DIR)
}

/// Mutation candidates in listing order.
pub fn eligible_files(tree: &[TreeEntry]) -> Vec<&TreeEntry> {
    tree.iter().filter(|e| is_mutation_candidate(e)).collect()
}

/// Whether a tree entry is ingested by repository sync.
pub fn is_knowledge_file(entry: &TreeEntry) -> bool {
    entry.is_blob()
        && knowledge_pattern().is_match(&entry.path)
        && entry.size < MAX_KNOWLEDGE_FILE_SIZE
}

/// Language tag for a path, from its (case-insensitive) extension.
///
/// Returns `"unknown"` when the extension is not recognised.
pub fn detect_language(path: &str) -> &'static str {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let Some((_, ext)) = file_name.rsplit_once('.') else {
        return "unknown";
    };
    let ext = ext.to_ascii_lowercase();
    LANGUAGES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, lang)| *lang)
        .unwrap_or("unknown")
}

/// Final path segment.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
