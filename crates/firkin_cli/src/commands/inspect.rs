//! Inspect command implementation.

use firkin_core::{Config, Store};
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Number of live keys.
    pub live_keys: usize,
    /// Number of registered segments.
    pub segment_count: usize,
    /// How many of those are sealed.
    pub sealed_segments: usize,
    /// Total size of all segment files in bytes.
    pub total_bytes: u64,
    /// Whether the sealed-segment count has reached the compaction threshold.
    pub needs_compaction: bool,
    /// Per-segment details (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<SegmentDetail>>,
}

/// Details for a single segment file.
#[derive(Debug, Serialize)]
pub struct SegmentDetail {
    /// Segment id.
    pub id: u64,
    /// Rewrite generation.
    pub generation: u32,
    /// File name inside the store directory.
    pub file: String,
    /// Whether the segment is sealed.
    pub sealed: bool,
    /// File size in bytes.
    pub size: u64,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_segments: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open_with_config(path, Config::default().create_if_missing(false))?;
    let infos = store.segments();

    let result = InspectResult {
        path: path.display().to_string(),
        live_keys: store.len(),
        segment_count: infos.len(),
        sealed_segments: infos.iter().filter(|s| s.sealed).count(),
        total_bytes: infos.iter().map(|s| s.size).sum(),
        needs_compaction: store.needs_compaction(),
        segments: show_segments.then(|| {
            infos
                .iter()
                .map(|s| SegmentDetail {
                    id: s.id.as_u64(),
                    generation: s.generation,
                    file: s.file_name.clone(),
                    sealed: s.sealed,
                    size: s.size,
                })
                .collect()
        }),
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Firkin Store Inspection");
    println!("=======================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Keys:");
    println!("  Live keys: {}", result.live_keys);
    println!();
    println!("Segments:");
    println!(
        "  Count: {} ({} sealed)",
        result.segment_count, result.sealed_segments
    );
    println!("  Size:  {}", format_size(result.total_bytes));
    println!(
        "  Compaction: {}",
        if result.needs_compaction {
            "recommended"
        } else {
            "not yet needed"
        }
    );

    if let Some(segments) = &result.segments {
        println!();
        println!("Segment files:");
        for seg in segments {
            println!(
                "  [{}] {} gen {} {} {}",
                seg.id,
                seg.file,
                seg.generation,
                if seg.sealed { "sealed" } else { "active" },
                format_size(seg.size)
            );
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
