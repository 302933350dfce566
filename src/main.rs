use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use geocull::config::{ClusterScope, PipelineConfig};
use geocull::core::deletion::{IdTranslator, IdentityTranslator};
use geocull::core::geo::GeoClusterBuilder;
use geocull::core::hash::HashMethod;
use geocull::core::image::{ImageId, ImageSource};
use geocull::core::pipeline::{DedupePipeline, PipelineCounts, PipelineReport, run_quality};
use geocull::core::quality::{QualityPruner, SharpnessCutoff};
use geocull::services::io::{load_edges, load_hashes, load_id_map};
use geocull::services::report::{self, GROUP_SUMMARY_FILE, GROUPS_FILE};
use geocull::services::source::ImageDirectory;
use std::path::{Path, PathBuf};
use std::time::Instant;

const SUMMARY_GROUPS: usize = 10;

#[derive(Parser, Debug)]
#[command(
    name = "geocull",
    version,
    about = "Find and cull duplicate geotagged street-level images"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(flatten)]
    tuning: Tuning,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// JSON config file; flags below override its values
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory receiving the artifacts
    #[arg(long, global = true, value_name = "DIR", default_value = "geocull-out")]
    out_dir: PathBuf,

    /// Worker threads (0 = one per core)
    #[arg(long, global = true, default_value_t = 0)]
    threads: usize,

    /// Only print what would be deleted; write nothing
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct Tuning {
    /// Longest admitted camera distance in metres
    #[arg(long, global = true)]
    max_distance_m: Option<f64>,

    /// Largest admitted heading difference in degrees
    #[arg(long, global = true)]
    max_heading_delta_deg: Option<f64>,

    #[arg(long, global = true, value_enum)]
    hash_method: Option<HashMethod>,

    /// Hash grid side; the bit count depends on the method
    #[arg(long, global = true)]
    hash_size: Option<u32>,

    /// Largest Hamming distance counted as similar
    #[arg(long, global = true)]
    similar_threshold: Option<u32>,

    /// Hex prefix length used to bucket comparisons (0 = compare all pairs)
    #[arg(long, global = true)]
    bucket_prefix_len: Option<usize>,

    #[arg(long, global = true, value_enum)]
    scope: Option<ClusterScope>,

    /// Do not keep a representative of each exact-duplicate group
    #[arg(long, global = true)]
    no_keep_exact: bool,

    /// Do not keep a representative of each similarity cluster
    #[arg(long, global = true)]
    no_keep_clusters: bool,

    /// Do not keep images that match nothing
    #[arg(long, global = true)]
    no_keep_singletons: bool,
}

impl Tuning {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(v) = self.max_distance_m {
            config.max_distance_m = v;
        }
        if let Some(v) = self.max_heading_delta_deg {
            config.max_heading_delta_deg = v;
        }
        if let Some(v) = self.hash_method {
            config.hash_method = v;
        }
        if let Some(v) = self.hash_size {
            config.hash_size = v;
        }
        if let Some(v) = self.similar_threshold {
            config.similar_threshold = v;
        }
        if let Some(v) = self.bucket_prefix_len {
            config.bucket_prefix_len = v;
        }
        if let Some(v) = self.scope {
            config.scope = v;
        }
        if self.no_keep_exact {
            config.keep.keep_exact_representatives = false;
        }
        if self.no_keep_clusters {
            config.keep.keep_cluster_representatives = false;
        }
        if self.no_keep_singletons {
            config.keep.keep_singletons = false;
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Group candidate edges into geo-groups
    Groups {
        /// Candidate edge CSV
        #[arg(short, long, value_name = "FILE")]
        edges: PathBuf,
        /// Output CSV (default: `<out-dir>/groups.csv`)
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Compute perceptual hashes for a directory of images
    Hash {
        #[arg(short, long, value_name = "DIR")]
        images: PathBuf,
        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
        /// Output CSV (default: `<out-dir>/hashes.csv`)
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Find near duplicates across a whole directory, ignoring location
    Scan {
        #[arg(short, long, value_name = "DIR")]
        images: PathBuf,
        #[arg(short, long)]
        recursive: bool,
        /// `internal_id,external_id` CSV used for the delete list
        #[arg(long, value_name = "FILE")]
        id_map: Option<PathBuf>,
    },

    /// Geo-group candidate edges, then cull visual duplicates inside each group
    Dedupe {
        #[arg(short, long, value_name = "FILE")]
        edges: PathBuf,
        #[arg(short, long, value_name = "DIR", required_unless_present = "hashes")]
        images: Option<PathBuf>,
        #[arg(short, long)]
        recursive: bool,
        #[arg(long, value_name = "FILE")]
        id_map: Option<PathBuf>,
        /// Precomputed `id,hash` CSV from the `hash` command
        #[arg(long, value_name = "FILE")]
        hashes: Option<PathBuf>,
    },

    /// Cull the blurriest images by Laplacian sharpness
    Quality {
        #[arg(short, long, value_name = "DIR")]
        images: PathBuf,
        #[arg(short, long)]
        recursive: bool,
        #[arg(long, value_name = "FILE")]
        id_map: Option<PathBuf>,
        /// Drop images below this percentile of the population
        #[arg(long, conflicts_with = "min_sharpness")]
        percentile: Option<f64>,
        /// Drop images below this absolute sharpness
        #[arg(long)]
        min_sharpness: Option<f64>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if cli.global.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.global.threads)
            .build_global()
            .context("Failed to configure worker threads")?;
    }

    let mut config = match &cli.global.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    cli.tuning.apply(&mut config);

    let global = &cli.global;
    match cli.command {
        Commands::Groups { edges, out } => {
            config.validate()?;
            println!("▶ Building geo-groups from: {}", edges.display());
            let load = load_edges(&edges, Some(&config.admission()))?;
            let groups = benchmark("geo grouping", || GeoClusterBuilder::new().build(&load.edges));

            println!(
                "Admitted {} edges ({} rejected) → {} nodes in {} geo-group(s)",
                load.edges.len(),
                load.rejected,
                groups.node_count(),
                groups.len()
            );
            for row in groups.largest(SUMMARY_GROUPS) {
                println!(
                    "   📍 group {:>6}: {} images, {} edges",
                    row.group_id, row.n_nodes, row.n_edges
                );
            }

            if global.dry_run {
                println!("\n⚠️  Dry-run only; no files were written.");
                return Ok(());
            }
            let out = out.unwrap_or_else(|| global.out_dir.join(GROUPS_FILE));
            ensure_parent(&out)?;
            report::write_groups(&out, &groups)?;
            let summary = out.with_file_name(GROUP_SUMMARY_FILE);
            report::write_group_summary(&summary, &groups)?;
            println!("\n✅ Wrote {} and {}", out.display(), summary.display());
        }

        Commands::Hash { images, recursive, out } => {
            config.validate()?;
            println!("▶ Hashing images in: {}", images.display());
            let source = ImageDirectory::scan(&images, recursive)?;
            let pipeline = DedupePipeline::new(config).with_progress(true);
            let ids = source.ids();
            let outcome =
                benchmark("hashing all images", || pipeline.hasher().hash_source(&source, &ids));

            println!(
                "Hashed {} image(s) with {} ({} unreadable)",
                outcome.hashes.len(),
                pipeline.config().hash_method,
                outcome.failed.len()
            );
            if global.dry_run {
                println!("\n⚠️  Dry-run only; no files were written.");
                return Ok(());
            }
            let out = out.unwrap_or_else(|| global.out_dir.join("hashes.csv"));
            ensure_parent(&out)?;
            report::write_hashes(&out, &outcome.hashes.into_iter().collect())?;
            println!("\n✅ Wrote {}", out.display());
        }

        Commands::Scan { images, recursive, id_map } => {
            config.scope = ClusterScope::Global;
            config.validate()?;
            println!("▶ Scanning for near duplicates in: {}", images.display());
            let source = ImageDirectory::scan(&images, recursive)?;
            let translator = translator(id_map.as_deref())?;
            let pipeline = DedupePipeline::new(config).with_progress(true);

            let ids = source.ids();
            let report = benchmark("near-duplicate scan", || {
                pipeline.run_population(&ids, &source, translator.as_ref(), None)
            });
            finish_pipeline(&report, global)?;
        }

        Commands::Dedupe {
            edges,
            images,
            recursive,
            id_map,
            hashes,
        } => {
            config.validate()?;
            println!("▶ Deduplicating candidate edges from: {}", edges.display());
            let load = load_edges(&edges, Some(&config.admission()))?;
            let source = match &images {
                Some(dir) => ImageDirectory::scan(dir, recursive)?,
                None => ImageDirectory::default(),
            };
            let precomputed = hashes.as_deref().map(load_hashes).transpose()?;
            let translator = translator(id_map.as_deref())?;
            let pipeline = DedupePipeline::new(config).with_progress(true);

            let report = benchmark("two-stage dedupe", || {
                pipeline.run(&load.edges, &source, translator.as_ref(), precomputed.as_ref())
            });
            if load.rejected > 0 {
                println!(
                    "Rejected {} candidate edge(s) outside the admission limits",
                    load.rejected
                );
            }
            finish_pipeline(&report, global)?;
        }

        Commands::Quality {
            images,
            recursive,
            id_map,
            percentile,
            min_sharpness,
        } => {
            if let Some(percentile) = percentile {
                config.quality.cutoff = SharpnessCutoff::Percentile { percentile };
            }
            if let Some(min_sharpness) = min_sharpness {
                config.quality.cutoff = SharpnessCutoff::Absolute { min_sharpness };
            }
            config.validate()?;

            println!("▶ Scoring sharpness in: {}", images.display());
            let source = ImageDirectory::scan(&images, recursive)?;
            let translator = translator(id_map.as_deref())?;
            let pruner = QualityPruner::new(config.quality).with_progress(true);

            let ids: Vec<ImageId> = source.ids();
            let report = benchmark("sharpness scoring", || {
                run_quality(&pruner, &ids, &source, translator.as_ref())
            });

            match report.decision.threshold {
                Some(threshold) => println!(
                    "Threshold {:.2}: keep {}, delete {}, unscored {}",
                    threshold,
                    report.outcome.keep.len(),
                    report.outcome.delete.len(),
                    report.outcome.unscored_count()
                ),
                None => println!("No image could be scored."),
            }

            if global.dry_run {
                print_delete_preview(&report.outcome.delete_external);
                println!("\n⚠️  Dry-run only; no files were written.");
                return Ok(());
            }
            let written = report::write_quality_artifacts(&global.out_dir, &report)?;
            print_written(&written);
        }
    }

    Ok(())
}

fn translator(id_map: Option<&Path>) -> Result<Box<dyn IdTranslator>> {
    let translator: Box<dyn IdTranslator> = match id_map {
        Some(path) => Box::new(load_id_map(path)?),
        None => Box::new(IdentityTranslator),
    };
    Ok(translator)
}

fn finish_pipeline(report: &PipelineReport, global: &GlobalArgs) -> Result<()> {
    print_counts(&report.counts);

    if global.dry_run {
        print_delete_preview(&report.outcome.delete_external);
        println!("\n⚠️  Dry-run only; no files were written.");
        return Ok(());
    }
    let written = report::write_pipeline_artifacts(&global.out_dir, report)?;
    print_written(&written);
    Ok(())
}

fn print_counts(counts: &PipelineCounts) {
    if counts.candidate_edges > 0 {
        println!(
            "Candidate edges: {} → {} geo-group(s)",
            counts.candidate_edges, counts.geo_groups
        );
    }
    println!("Images: {} hashed, {} unscored", counts.hashed, counts.unscored);
    println!(
        "Exact duplicate groups: {} ({} images), similar pairs: {}, clusters: {}",
        counts.exact_groups, counts.exact_images, counts.similar_pairs, counts.clusters
    );
    println!("   🏆 Keeping {} image(s)", counts.kept);
    println!("   🗑️  Deleting {} image(s)", counts.deleted);
    if counts.untranslatable > 0 {
        println!(
            "⚠️  {} deleted id(s) have no external id and were left out",
            counts.untranslatable
        );
    }
}

fn print_delete_preview(ids: &[String]) {
    const PREVIEW: usize = 20;
    for id in ids.iter().take(PREVIEW) {
        println!("   🗑️  [dry-run] DELETE {id}");
    }
    if ids.len() > PREVIEW {
        println!("   … and {} more", ids.len() - PREVIEW);
    }
}

fn print_written(paths: &[PathBuf]) {
    println!();
    for path in paths {
        println!("✅ Wrote {}", path.display());
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

/// Run `f()`, print how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    println!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
