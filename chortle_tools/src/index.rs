use anyhow::{Context, Result};
use chortle_core::Label;
use chortle_core::labels::CATEGORIES;
use serde::Serialize;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

const AUDIO_EXTENSIONS: [&str; 5] = ["wav", "mp3", "flac", "ogg", "wave"];

#[derive(Debug, Serialize)]
struct ManifestLine {
    audio_path: String,
    category: &'static str,
    label: usize,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub kept: usize,
    pub skipped_not_audio: usize,
    pub missing_categories: Vec<&'static str>,
}

/// Relative clip paths (`category/file`) under `dataset_root`, sorted per
/// category, in vocabulary order.
pub fn collect_clips(dataset_root: &Path) -> Result<(Vec<(Label, String)>, IndexSummary)> {
    let mut clips = Vec::new();
    let mut summary = IndexSummary::default();

    for label in Label::ALL {
        let dir = dataset_root.join(label.category());
        if !dir.is_dir() {
            summary.missing_categories.push(label.category());
            continue;
        }

        let mut names: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&dir).with_context(|| format!("Failed to list {}", dir.display()))? {
            let path = entry?.path();
            if !is_audio(&path) {
                summary.skipped_not_audio += 1;
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();

        summary.kept += names.len();
        clips.extend(names.into_iter().map(|n| (label, format!("{}/{n}", label.category()))));
    }

    Ok((clips, summary))
}

fn is_audio(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Write the clip list (and optionally a JSONL manifest) for `dataset_root`.
pub fn index(dataset_root: &Path, output: &Path, manifest: Option<&PathBuf>) -> Result<IndexSummary> {
    println!("Indexing {} ({} categories)", dataset_root.display(), CATEGORIES.len());
    let (clips, summary) = collect_clips(dataset_root)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let list_file = File::create(output)
        .with_context(|| format!("Failed to create output: {}", output.display()))?;
    let mut list = BufWriter::new(list_file);
    for (_, rel) in &clips {
        writeln!(list, "{rel}")?;
    }
    list.flush()?;
    println!("Wrote: {}", output.display());

    if let Some(manifest_path) = manifest {
        let out_file = File::create(manifest_path)
            .with_context(|| format!("Failed to create manifest: {}", manifest_path.display()))?;
        let mut writer = BufWriter::new(out_file);
        for (label, rel) in &clips {
            let line = ManifestLine {
                audio_path: dataset_root.join(rel).to_string_lossy().to_string(),
                category: label.category(),
                label: label.index(),
            };
            serde_json::to_writer(&mut writer, &line)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        println!("Wrote: {}", manifest_path.display());
    }

    println!("Kept: {}", summary.kept);
    println!("Skipped (not audio): {}", summary.skipped_not_audio);
    for category in &summary.missing_categories {
        println!("Missing category folder: {category}");
    }

    Ok(summary)
}
