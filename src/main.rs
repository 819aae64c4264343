use anyhow::{bail, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt};

use bag2scene::cli::{Cli, Commands, SceneArgs};
use bag2scene::convert::{self, ConvertOptions};
use bag2scene::mappings::pointcloud::PointRotation;
use bag2scene::{extract, rosbags_io, schema, validate};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn convert_options(out_dir: String, scene: SceneArgs, jobs: usize) -> Result<ConvertOptions> {
    let options = ConvertOptions {
        output_dir: PathBuf::from(out_dir),
        batch_size: scene.batch_size,
        reference_topic: scene.reference_topic,
        include_topics: scene.include,
        exclude_topics: scene.exclude,
        pointcloud_rotation: match scene.pointcloud_rotation {
            Some(rotation_str) => Some(PointRotation::parse(&rotation_str)?),
            None => None,
        },
        show_progress: !scene.no_progress,
        jobs,
    };
    options.validate()?;
    Ok(options)
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Inspect { bag } => rosbags_io::inspect_bag(&bag),
        Commands::Convert {
            bag,
            out_dir,
            scene,
        } => {
            let options = convert_options(out_dir, scene, 1)?;
            let report = convert::convert_bag(Path::new(&bag), &options)?;
            println!("{}", report.scene_dir.display());
            Ok(())
        }
        Commands::Batch {
            bags_dir,
            out_dir,
            scene,
            jobs,
        } => {
            let options = convert_options(out_dir, scene, jobs)?;
            let report = convert::convert_dir(Path::new(&bags_dir), &options)?;
            for r in &report.converted {
                println!("{}", r.scene_dir.display());
            }
            if !report.failed.is_empty() {
                for (bag, err) in &report.failed {
                    eprintln!("[ERROR] {}: {}", bag.display(), err);
                }
                bail!(
                    "{} of {} bag files failed",
                    report.failed.len(),
                    report.failed.len() + report.converted.len()
                );
            }
            Ok(())
        }
        Commands::Extract {
            input,
            topics,
            output_dir,
        } => {
            let input = Path::new(&input);
            let output_dir = Path::new(&output_dir);
            if !input.is_dir() {
                let report = extract::extract_bag(input, &topics, output_dir)?;
                for (topic, path) in &report.metadata_files {
                    println!("{topic}: {}", path.display());
                }
                return Ok(());
            }
            if !topics.is_empty() {
                bail!("--topic cannot be combined with a directory input");
            }
            let results = extract::extract_dir(input, output_dir)?;
            let total = results.len();
            let mut failed = 0;
            for (bag, result) in &results {
                match result {
                    Ok(report) => println!("{}", report.output_dir.display()),
                    Err(err) => {
                        failed += 1;
                        eprintln!("[ERROR] {}: {}", bag.display(), err);
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} of {total} bag files failed");
            }
            Ok(())
        }
        Commands::Schema {} => schema::print_schema(),
        Commands::Validate { scene_dir } => validate::validate_scene(&scene_dir),
    }
}
