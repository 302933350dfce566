//! Artifact writers for dedupe and quality runs.

use crate::core::duplicate::ExactDuplicateGroup;
use crate::core::geo::GeoGroups;
use crate::core::hash::{HashMethod, PerceptualHash};
use crate::core::image::ImageId;
use crate::core::pipeline::{PipelineReport, QualityReport};
use crate::core::similarity::SimilarityEdge;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const GROUPS_FILE: &str = "groups.csv";
pub const GROUP_SUMMARY_FILE: &str = "group_summary.csv";
pub const EXACT_FILE: &str = "exact.csv";
pub const SIMILAR_FILE: &str = "similar.csv";
pub const SUMMARY_FILE: &str = "summary.txt";
pub const REPORT_FILE: &str = "report.json";
pub const QUALITY_FILE: &str = "quality.csv";
pub const DELETE_FILE: &str = "delete.txt";

const EXAMPLE_GROUPS: usize = 10;
const EXAMPLE_MEMBERS: usize = 5;

fn csv_writer(path: &Path) -> Result<csv::Writer<File>> {
    csv::Writer::from_path(path).with_context(|| format!("Failed to create {}", path.display()))
}

/// `id,group_id` for every node, grouped by group id.
pub fn write_groups(path: &Path, groups: &GeoGroups) -> Result<()> {
    let mut writer = csv_writer(path)?;
    writer.write_record(["id", "group_id"])?;
    for (group_id, members) in groups.groups.iter().enumerate() {
        let mut members: Vec<&ImageId> = members.iter().collect();
        members.sort();
        for id in members {
            writer.write_record([id.as_str(), group_id.to_string().as_str()])?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn write_group_summary(path: &Path, groups: &GeoGroups) -> Result<()> {
    let mut writer = csv_writer(path)?;
    for row in groups.summary() {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_exact<'a>(
    path: &Path,
    groups: impl IntoIterator<Item = &'a ExactDuplicateGroup>,
    method: HashMethod,
    hash_size: u32,
) -> Result<()> {
    let mut writer = csv_writer(path)?;
    writer.write_record(["hash_hex", "count", "hash_method", "hash_size"])?;
    for group in groups {
        writer.write_record([
            group.hash.to_hex(),
            group.len().to_string().as_str(),
            method.name(),
            hash_size.to_string().as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_similar<'a>(
    path: &Path,
    edges: impl IntoIterator<Item = &'a SimilarityEdge>,
    method: HashMethod,
    hash_size: u32,
) -> Result<()> {
    let mut writer = csv_writer(path)?;
    writer.write_record(["img_a", "img_b", "distance", "relation", "hash_method", "hash_size"])?;
    for edge in edges {
        let relation = if edge.is_exact() { "exact" } else { "similar" };
        writer.write_record([
            edge.a.as_str(),
            edge.b.as_str(),
            edge.distance.to_string().as_str(),
            relation,
            method.name(),
            hash_size.to_string().as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_hashes(path: &Path, hashes: &BTreeMap<ImageId, PerceptualHash>) -> Result<()> {
    let mut writer = csv_writer(path)?;
    writer.write_record(["id", "hash"])?;
    for (id, hash) in hashes {
        writer.write_record([id.as_str(), hash.to_hex()])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_quality(path: &Path, report: &QualityReport) -> Result<()> {
    let mut writer = csv_writer(path)?;
    writer.write_record(["id", "sharpness"])?;
    for (id, score) in &report.scores.scores {
        writer.write_record([id.as_str(), format!("{score:.4}").as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

/// One external id per line; the consumer applies the deletions.
pub fn write_delete_list(path: &Path, ids: &[String]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for id in ids {
        writeln!(out, "{id}")?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

/// Human readable run summary with a handful of example exact groups.
pub fn render_summary(report: &PipelineReport) -> String {
    let config = &report.config;
    let counts = &report.counts;
    let mut text = String::new();

    text.push_str(&format!("Generated: {}\n", report.generated_at));
    text.push_str(&format!("Hash method: {}, size={}\n", config.hash_method, config.hash_size));
    if counts.candidate_edges > 0 {
        text.push_str(&format!(
            "Candidate edges: {} in {} geo-groups\n",
            counts.candidate_edges, counts.geo_groups
        ));
    }
    text.push_str(&format!(
        "Scanned images: {} ({} unscored)\n",
        counts.unique_ids, counts.unscored
    ));
    text.push_str(&format!(
        "Exact duplicate groups: {} (images in dup groups: {})\n",
        counts.exact_groups, counts.exact_images
    ));
    text.push_str(&format!(
        "Similar pairs (distance <= {}): {}\n",
        config.similar_threshold, counts.similar_pairs
    ));
    text.push_str(&format!("Clusters: {}\n", counts.clusters));
    text.push_str(&format!(
        "Keep: {}, delete: {} ({} without external id)\n",
        counts.kept, counts.deleted, counts.untranslatable
    ));

    let mut examples = report.exact_groups().take(EXAMPLE_GROUPS).peekable();
    if examples.peek().is_some() {
        text.push_str("\nExample exact-duplicate groups:\n");
        for (i, group) in examples.enumerate() {
            text.push_str(&format!("  {:02}  hash={}  count={}\n", i + 1, group.hash, group.len()));
            for id in group.members.iter().take(EXAMPLE_MEMBERS) {
                text.push_str(&format!("       - {id}\n"));
            }
            if group.len() > EXAMPLE_MEMBERS {
                text.push_str("       - ...\n");
            }
        }
    }
    text
}

/// Write every dedupe artifact into `dir`, returning the paths written.
pub fn write_pipeline_artifacts(dir: &Path, report: &PipelineReport) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    let config = &report.config;
    let mut written = Vec::new();

    if !report.geo_groups.is_empty() {
        let path = dir.join(GROUPS_FILE);
        write_groups(&path, &report.geo_groups)?;
        written.push(path);
    }

    let path = dir.join(EXACT_FILE);
    write_exact(&path, report.exact_groups(), config.hash_method, config.hash_size)?;
    written.push(path);

    let path = dir.join(SIMILAR_FILE);
    write_similar(&path, report.similarity_edges(), config.hash_method, config.hash_size)?;
    written.push(path);

    let path = dir.join(SUMMARY_FILE);
    fs::write(&path, render_summary(report))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    written.push(path);

    let path = dir.join(REPORT_FILE);
    write_json(&path, report)?;
    written.push(path);

    let path = dir.join(DELETE_FILE);
    write_delete_list(&path, &report.outcome.delete_external)?;
    written.push(path);

    Ok(written)
}

pub fn write_quality_artifacts(dir: &Path, report: &QualityReport) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    let mut written = Vec::new();

    let path = dir.join(QUALITY_FILE);
    write_quality(&path, report)?;
    written.push(path);

    let path = dir.join(REPORT_FILE);
    write_json(&path, report)?;
    written.push(path);

    let path = dir.join(DELETE_FILE);
    write_delete_list(&path, &report.outcome.delete_external)?;
    written.push(path);

    Ok(written)
}
