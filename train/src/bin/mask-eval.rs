use anyhow::Result;
use std::{env, path::PathBuf};
use structopt::StructOpt;
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};
use train::{
    config::ProjectionConfig, data::MaskDirectory, evaluate::evaluate_masks,
};

#[derive(Debug, Clone, StructOpt)]
/// Evaluate precomputed segmentation masks against class masks
struct Args {
    /// directory with images/, predicted/ and class_masks/ sub-directories
    pub dir: PathBuf,
    #[structopt(long)]
    /// drop small regions before matching
    pub filter_masks: bool,
    #[structopt(long)]
    /// minimum region area in pixels when filtering
    pub min_area: Option<usize>,
    #[structopt(long)]
    /// minimum region side length in pixels when filtering
    pub min_side: Option<usize>,
}

fn main() -> Result<()> {
    // setup tracing
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true).compact();
    let filter_layer = {
        let filter = EnvFilter::from_default_env();
        if env::var("RUST_LOG").is_err() {
            filter.add_directive(LevelFilter::INFO.into())
        } else {
            filter
        }
    };
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    // parse arguments
    let Args {
        dir,
        filter_masks,
        min_area,
        min_side,
    } = Args::from_args();

    let projection_config = {
        let default = ProjectionConfig::default();
        ProjectionConfig {
            min_area: min_area.unwrap_or(default.min_area),
            min_side: min_side.unwrap_or(default.min_side),
            ..default
        }
    };
    let projector = projection_config.build_projector()?;

    let dataset = MaskDirectory::open(&dir)?;
    let evaluation = evaluate_masks(&dataset, &projector, filter_masks)?;
    println!("{}", serde_json::to_string_pretty(&evaluation)?);

    Ok(())
}
