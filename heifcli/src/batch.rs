//! Input expansion and batch reporting.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Expand patterns into a deduplicated list of HEIF-family files.
///
/// Accepts glob patterns, plain paths and directories (searched
/// recursively). Results are sorted by file size, largest first, so the
/// parallel workers finish at roughly the same time.
pub fn expand_inputs(patterns: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for pattern in patterns {
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            for entry in glob::glob(pattern)? {
                let path = entry?;
                if path.is_file() && is_heif(&path) {
                    push_unique(path, &mut seen, &mut files);
                }
            }
        } else {
            let path = PathBuf::from(pattern);
            if path.is_dir() {
                collect_dir(&path, &mut seen, &mut files);
            } else if path.is_file() {
                // Explicit paths are taken whatever their extension
                push_unique(path, &mut seen, &mut files);
            } else {
                anyhow::bail!("not a file or directory: {}", path.display());
            }
        }
    }

    files.sort_by_key(|path| std::cmp::Reverse(path.metadata().map(|m| m.len()).unwrap_or(0)));
    Ok(files)
}

/// Whether a path has a HEIF-family extension.
pub fn is_heif(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(heifkit::is_heif_extension)
}

fn push_unique(path: PathBuf, seen: &mut HashSet<PathBuf>, files: &mut Vec<PathBuf>) {
    if let Ok(canonical) = path.canonicalize() {
        if seen.insert(canonical) {
            files.push(path);
        }
    }
}

fn collect_dir(dir: &Path, seen: &mut HashSet<PathBuf>, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_dir(&path, seen, files);
        } else if path.is_file() && is_heif(&path) {
            push_unique(path, seen, files);
        }
    }
}

/// Outcome of converting one file.
#[derive(Debug)]
pub struct FileResult {
    pub input_path: PathBuf,
    pub input_size: u64,
    pub output_path: Option<PathBuf>,
    pub output_size: Option<u64>,
    pub images: usize,
    pub error: Option<String>,
    pub duration: Duration,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub results: Vec<FileResult>,
}

impl BatchSummary {
    pub fn push(&mut self, result: FileResult) {
        self.results.push(result);
    }

    pub fn error_count(&self) -> usize {
        self.results.iter().filter(|r| r.error.is_some()).count()
    }

    pub fn success_count(&self) -> usize {
        self.results.len() - self.error_count()
    }

    pub fn print_report(&self) {
        if self.results.is_empty() {
            println!("No files converted.");
            return;
        }

        println!(
            "{:<40} {:>7} {:>10} {:>10} {:>8}",
            "File", "Images", "Input", "Output", "Time"
        );
        println!("{}", "-".repeat(79));

        for r in &self.results {
            let name = r
                .input_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("?");
            let name = if name.len() > 38 {
                format!("..{}", &name[name.len() - 36..])
            } else {
                name.to_string()
            };

            match (&r.error, r.output_size) {
                (Some(err), _) => {
                    println!("{:<40} {:>7} {:>10} {}", name, "-", format_size(r.input_size), err)
                }
                (None, Some(out_size)) => println!(
                    "{:<40} {:>7} {:>10} {:>10} {:>8}",
                    name,
                    r.images,
                    format_size(r.input_size),
                    format_size(out_size),
                    format_duration(r.duration),
                ),
                (None, None) => {}
            }
        }

        println!("{}", "-".repeat(79));
        let total_in: u64 = self.results.iter().map(|r| r.input_size).sum();
        let total_out: u64 = self.results.iter().filter_map(|r| r.output_size).sum();
        println!(
            "{} converted, {} errors | {} -> {}",
            self.success_count(),
            self.error_count(),
            format_size(total_in),
            format_size(total_out),
        );
    }
}

/// Format a byte size into a human-readable string.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{ms}ms")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn heif_extensions() {
        assert!(is_heif(Path::new("a/b.HEIC")));
        assert!(is_heif(Path::new("c.hkit")));
        assert!(!is_heif(Path::new("d.png")));
        assert!(!is_heif(Path::new("noext")));
    }
}
