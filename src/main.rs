use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use oar_volume::{
    config::{Config, DEFAULT_CONFIG_PATH, read_config},
    enums::Plane,
    naming::case_prefix,
    nrrd::{self, Encoding},
    plotting::plot_sample,
    sample_loader::SampleLoader,
    segmentation::merge_case,
};

#[derive(Parser, Debug)]
#[command(version, about = "Inspect, merge and plot OAR segmentation cases")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, short, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the header of a NRRD file.
    Info { file: PathBuf },
    /// Merge the per-organ masks of a case into one labeled volume.
    Merge {
        #[arg(long)]
        case: u32,
        /// Output NRRD file; a `.json` label dictionary is written beside it.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Render CT, segmentation, overlay and MR panels for one slice.
    Plot {
        #[arg(long)]
        case: u32,
        #[arg(long)]
        slice: usize,
        /// a (axial), c (coronal) or s (sagittal); defaults to the config.
        #[arg(long)]
        plane: Option<Plane>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Info { file } => {
            let header = nrrd::read_header(&file)
                .with_context(|| format!("reading header of {}", file.display()))?;
            println!("type:     {}", header.kind.name());
            println!("sizes:    {:?}", header.sizes);
            println!("encoding: {:?}", header.encoding);
            if let Some(spacings) = &header.spacings {
                println!("spacings: {spacings:?}");
            }
            for (key, value) in &header.key_values {
                println!("{key}:={value}");
            }
        }
        Command::Merge { case, out } => {
            let config = load_config(&cli.config)?;
            let loader = SampleLoader::from(&config);
            let (merged, labels) = merge_case(loader.labels_tr_folder(), case)
                .with_context(|| format!("merging masks of case {case}"))?;
            let out = out.unwrap_or_else(|| {
                output_dir(&config).join(format!("{}_segmentation.nrrd", case_prefix(case)))
            });
            nrrd::write_nrrd(&out, &merged.view(), Encoding::Gzip)
                .with_context(|| format!("writing {}", out.display()))?;
            let dictionary = out.with_extension("json");
            fs::write(&dictionary, serde_json::to_string_pretty(&labels)?)
                .with_context(|| format!("writing {}", dictionary.display()))?;
            log::info!(
                "wrote {} labels to {} and {}",
                labels.len(),
                out.display(),
                dictionary.display()
            );
        }
        Command::Plot {
            case,
            slice,
            plane,
            out,
        } => {
            let config = load_config(&cli.config)?;
            let plane = plane.unwrap_or(config.plane);
            let sample = SampleLoader::from(&config)
                .load(case)
                .with_context(|| format!("loading case {case}"))?;
            let figure = plot_sample(&sample, plane, slice, config.overlay_alpha)?;
            let out = out.unwrap_or_else(|| {
                output_dir(&config).join(format!("{}_{plane}_{slice}.png", case_prefix(case)))
            });
            figure
                .save(&out)
                .with_context(|| format!("saving {}", out.display()))?;
            log::info!("saved figure to {}", out.display());
        }
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<Config> {
    read_config(path).with_context(|| format!("loading config {}", path.display()))
}

fn output_dir(config: &Config) -> PathBuf {
    config.output_folder.clone().unwrap_or_else(|| PathBuf::from("."))
}
