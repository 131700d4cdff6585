use std::fs;
use std::path::{Path, PathBuf};

/// Library sources must stay free of file I/O, data loading and console output.
const FORBIDDEN: &[&str] = &[
    "std::fs",
    "File::open",
    "CsvReader",
    "read_csv(",
    "println!",
    "eprintln!",
];

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");

    let mut sources = Vec::new();
    collect_rust_sources(Path::new("src"), &mut sources);

    let violations: Vec<String> = sources
        .iter()
        .filter_map(|path| fs::read_to_string(path).ok().map(|text| (path, text)))
        .flat_map(|(path, text)| {
            text.lines()
                .enumerate()
                .flat_map(|(idx, line)| {
                    FORBIDDEN
                        .iter()
                        .filter(move |token| line.contains(**token))
                        .map(move |token| {
                            format!("{}:{} uses '{}'", path.display(), idx + 1, token)
                        })
                })
                .collect::<Vec<_>>()
        })
        .collect();

    if !violations.is_empty() {
        for v in &violations {
            println!("cargo:warning={v}");
        }
        panic!("hierbasis library sources must not perform I/O");
    }
}

fn collect_rust_sources(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for path in entries.flatten().map(|e| e.path()) {
        if path.is_dir() {
            collect_rust_sources(&path, out);
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            out.push(path);
        }
    }
}
