//! photonpack batch command-line tool.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use photonpack_codebook::{Codebook, CodebookBuilder, KMeansClusterer, NearestCentroid};
use photonpack_core::CompressionConfig;
use photonpack_quantizer::{quantize, QuantizedTable};
use photonpack_storage::{
    ensure_writable, write_chi2_table, write_template_map, LoadedTemplateMap, Matrix,
};
use photonpack_table::TableStore;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "photonpack")]
#[command(about = "Compress 5-D photon tables into a template codebook and per-bin index/weight map")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a codebook from a raw table and reduced-feature matrix
    BuildCodebook {
        /// Raw 5-D table file
        #[arg(long)]
        table: PathBuf,
        /// Reduced-feature matrix (one row per unmasked training bin)
        #[arg(long)]
        features: PathBuf,
        /// Precomputed centroid matrix; skips in-process k-means
        #[arg(long)]
        centroids: Option<PathBuf>,
        /// Codebook size K when running k-means
        #[arg(long, default_value = "4000")]
        num_templates: usize,
        /// K-means random seed
        #[arg(long)]
        seed: Option<u64>,
        /// K-means iteration budget
        #[arg(long, default_value = "20")]
        max_iterations: usize,
        /// Minimum marginal for a bin to enter training
        #[arg(long, default_value = "1000.0")]
        min_marginal: f32,
        /// Output codebook path
        #[arg(long)]
        output: PathBuf,
        /// Replace existing output artifacts
        #[arg(long)]
        overwrite: bool,
    },
    /// Quantize a table against an existing codebook
    Quantize {
        /// Raw 5-D table file
        #[arg(long)]
        table: PathBuf,
        /// Trained codebook file
        #[arg(long)]
        codebook: PathBuf,
        /// Output template-map path
        #[arg(long)]
        out_map: PathBuf,
        /// Output chi2 diagnostic path
        #[arg(long)]
        out_chi2: PathBuf,
        /// Normalize templates before the chi-squared search
        #[arg(long)]
        normalize_templates: bool,
        /// Replace existing output artifacts
        #[arg(long)]
        overwrite: bool,
    },
    /// Run the full pipeline: train a codebook, then quantize
    Compress {
        /// Raw 5-D table file
        #[arg(long)]
        table: PathBuf,
        /// Reduced-feature matrix (one row per unmasked training bin)
        #[arg(long)]
        features: PathBuf,
        /// Precomputed centroid matrix; skips in-process k-means
        #[arg(long)]
        centroids: Option<PathBuf>,
        /// Codebook size K when running k-means
        #[arg(long, default_value = "4000")]
        num_templates: usize,
        /// K-means random seed
        #[arg(long)]
        seed: Option<u64>,
        /// K-means iteration budget
        #[arg(long, default_value = "20")]
        max_iterations: usize,
        /// Minimum marginal for a bin to enter training
        #[arg(long, default_value = "1000.0")]
        min_marginal: f32,
        /// Normalize templates before the chi-squared search
        #[arg(long)]
        normalize_templates: bool,
        /// Output codebook path
        #[arg(long)]
        out_codebook: PathBuf,
        /// Output template-map path
        #[arg(long)]
        out_map: PathBuf,
        /// Output chi2 diagnostic path
        #[arg(long)]
        out_chi2: PathBuf,
        /// Replace existing output artifacts
        #[arg(long)]
        overwrite: bool,
    },
    /// Print shapes, artifact sizes, and the achieved compression ratio
    Stats {
        /// Raw 5-D table file
        #[arg(long)]
        table: PathBuf,
        /// Trained codebook file
        #[arg(long)]
        codebook: PathBuf,
        /// Template-map file
        #[arg(long)]
        map: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "photonpack_storage=info,photonpack_codebook=info,photonpack_quantizer=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    match args.command {
        Commands::BuildCodebook {
            table,
            features,
            centroids,
            num_templates,
            seed,
            max_iterations,
            min_marginal,
            output,
            overwrite,
        } => {
            let config = build_config(num_templates, seed, max_iterations, min_marginal, false)?;
            precheck_outputs(&[output.as_path()], overwrite)?;

            let store = TableStore::open(&table)?;
            let codebook = train_codebook(&store, &features, centroids.as_deref(), &config)?;
            codebook.save(&output, overwrite)?;
        }
        Commands::Quantize {
            table,
            codebook,
            out_map,
            out_chi2,
            normalize_templates,
            overwrite,
        } => {
            precheck_outputs(&[out_map.as_path(), out_chi2.as_path()], overwrite)?;

            let store = TableStore::open(&table)?;
            let codebook = Codebook::load(&codebook)?;

            let mut config = CompressionConfig::default();
            config.quantize.normalize_templates = normalize_templates;

            let quantized = quantize(&store, &codebook, &config.quantize)?;
            write_outputs(&quantized, &out_map, &out_chi2, overwrite)?;
        }
        Commands::Compress {
            table,
            features,
            centroids,
            num_templates,
            seed,
            max_iterations,
            min_marginal,
            normalize_templates,
            out_codebook,
            out_map,
            out_chi2,
            overwrite,
        } => {
            let config = build_config(
                num_templates,
                seed,
                max_iterations,
                min_marginal,
                normalize_templates,
            )?;
            // Every destination is checked before any compute or write, so
            // a refusal can never leave a half-written artifact set.
            precheck_outputs(
                &[out_codebook.as_path(), out_map.as_path(), out_chi2.as_path()],
                overwrite,
            )?;

            let store = TableStore::open(&table)?;
            let codebook = train_codebook(&store, &features, centroids.as_deref(), &config)?;
            let quantized = quantize(&store, &codebook, &config.quantize)?;

            codebook.save(&out_codebook, overwrite)?;
            write_outputs(&quantized, &out_map, &out_chi2, overwrite)?;
        }
        Commands::Stats {
            table,
            codebook,
            map,
        } => {
            print_stats(&table, &codebook, &map)?;
        }
    }

    Ok(())
}

fn build_config(
    num_templates: usize,
    seed: Option<u64>,
    max_iterations: usize,
    min_marginal: f32,
    normalize_templates: bool,
) -> Result<CompressionConfig> {
    let mut config = CompressionConfig::default()
        .with_num_templates(num_templates)
        .with_max_iterations(max_iterations)
        .with_min_marginal(min_marginal);
    config.templates.seed = seed;
    config.quantize.normalize_templates = normalize_templates;
    config.validate().map_err(anyhow::Error::msg)?;
    Ok(config)
}

fn precheck_outputs(paths: &[&Path], overwrite: bool) -> Result<()> {
    for path in paths {
        ensure_writable(path, overwrite)
            .context("refusing to overwrite existing artifacts (pass --overwrite)")?;
    }
    Ok(())
}

fn train_codebook(
    store: &TableStore,
    features: &Path,
    centroids: Option<&Path>,
    config: &CompressionConfig,
) -> Result<Codebook> {
    let features = Matrix::load(features)?;
    let builder = CodebookBuilder::new(store, config.mask.min_marginal);

    let codebook = match centroids {
        Some(path) => {
            let clusterer = NearestCentroid::new(Matrix::load_sanitized(path)?);
            tracing::info!("seeding codebook from {} precomputed centroids", clusterer.num_clusters());
            builder.build(&features, &clusterer)?
        }
        None => {
            let clusterer = KMeansClusterer::new((&config.templates).into());
            builder.build(&features, &clusterer)?
        }
    };
    Ok(codebook)
}

fn write_outputs(
    quantized: &QuantizedTable,
    out_map: &Path,
    out_chi2: &Path,
    overwrite: bool,
) -> Result<()> {
    write_template_map(
        out_map,
        quantized.spatial_dims(),
        &quantized.index,
        &quantized.weight,
        overwrite,
    )?;
    write_chi2_table(out_chi2, quantized.spatial_dims(), &quantized.chi2, overwrite)?;
    Ok(())
}

fn print_stats(table: &Path, codebook_path: &Path, map_path: &Path) -> Result<()> {
    let store = TableStore::open(table)?;
    let codebook = Codebook::load(codebook_path)?;
    let map = LoadedTemplateMap::open(map_path)?;

    let shape = store.shape();
    let raw_bytes = shape.total_cells() * 4;
    let map_bytes = std::fs::metadata(map_path)?.len() as usize;

    println!("table shape:        {}", shape);
    println!("spatial bins:       {}", shape.spatial_bins());
    println!("angular cells/bin:  {}", shape.angular_cells());
    println!("templates (K):      {}", codebook.num_templates());
    println!("map records:        {}", map.len());
    println!("raw payload:        {} bytes", raw_bytes);
    println!("codebook artifact:  {} bytes", codebook.byte_size());
    println!("template map:       {} bytes", map_bytes);

    let compressed = codebook.byte_size() + map_bytes;
    println!(
        "compression ratio:  {:.1}x",
        raw_bytes as f64 / compressed as f64
    );
    Ok(())
}
