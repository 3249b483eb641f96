use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use sfm_data_association::io::{
    DataAssociationInput, object_from_json, object_to_json, write_report, write_scene,
};
use sfm_data_association::triangulation::{SamplingMode, TriangulationMode};
use sfm_data_association::{DataAssociation, DataAssociationConfig};

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Direct,
    Ransac,
}

#[derive(Parser)]
#[command(version, about, author)]
struct SfmdaCli {
    /// input json with cameras, keypoints and correspondences
    input: PathBuf,

    /// data association config json
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// output folder for scene.json, metrics.json and report.txt
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// max reprojection error in pixels, used when no config is given
    #[arg(long, default_value = "5.0")]
    reproj_error_thresh: f64,

    /// min supporting views, used when no config is given
    #[arg(long, default_value = "2")]
    min_track_len: usize,

    /// overrides the triangulation mode of the config
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// overrides the number of ransac hypotheses of the config
    #[arg(long)]
    num_ransac_hypotheses: Option<usize>,

    /// overrides the random seed of the config
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = SfmdaCli::parse();

    let mut config: DataAssociationConfig = match &cli.config {
        Some(path) => object_from_json(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => DataAssociationConfig::direct(cli.reproj_error_thresh, cli.min_track_len),
    };
    if let Some(mode) = cli.mode {
        config.mode = match mode {
            ModeArg::Direct => TriangulationMode::Direct,
            ModeArg::Ransac => TriangulationMode::Ransac,
        };
    }
    if cli.num_ransac_hypotheses.is_some() {
        config.num_ransac_hypotheses = cli.num_ransac_hypotheses;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if config.mode == TriangulationMode::Direct && config.sampling_mode != SamplingMode::Uniform {
        log::warn!("sampling mode is ignored in direct mode");
    }

    let input: DataAssociationInput = object_from_json(&cli.input)
        .with_context(|| format!("reading input {}", cli.input.display()))?;
    let cameras = input.cameras()?;
    let corr_idxs = input.correspondence_map();

    let now = Instant::now();
    let data_association = DataAssociation::new(config)?;
    let (scene, metrics) = data_association.run(cameras, &corr_idxs, &input.keypoints)?;
    let duration_sec = now.elapsed().as_secs_f64();
    log::info!("data association took {:.6} sec", duration_sec);
    log::info!(
        "accepted {} of {} tracks",
        metrics.num_accepted_tracks,
        metrics.num_input_tracks
    );

    std::fs::create_dir_all(&cli.output)
        .with_context(|| format!("creating {}", cli.output.display()))?;
    write_scene(cli.output.join("scene.json"), &scene)?;
    object_to_json(cli.output.join("metrics.json"), &metrics)?;
    write_report(cli.output.join("report.txt"), &scene, &metrics)?;
    Ok(())
}
