mod import;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::info;
use lume_geom::{Descriptor, GeomCompiler};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "lume-geom-compiler", version, about = "Compiles a mesh scene into a clustered static geometry resource")]
struct Args {
    /// Descriptor with merge, LOD, pre-transform and material settings (TOML)
    #[arg(short, long)]
    descriptor: PathBuf,

    /// Compiled geometry resource to write
    #[arg(short, long)]
    output: PathBuf,

    /// Source asset, overrides `import_asset` from the descriptor
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Writes a TOML summary of the imported scene
    #[arg(long)]
    details: Option<PathBuf>,
}

/// `import_asset` is relative to the descriptor's directory.
fn resolve_input(args: &Args, descriptor: &Descriptor) -> Result<PathBuf> {
    if let Some(input) = &args.input {
        return Ok(input.clone());
    }
    if descriptor.import_asset.as_os_str().is_empty() {
        bail!("No input asset: pass --input or set import_asset in {}", args.descriptor.display());
    }
    let base = args.descriptor.parent().unwrap_or(Path::new(""));
    Ok(base.join(&descriptor.import_asset))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let start_total = Instant::now();
    let descriptor = Descriptor::load(&args.descriptor)
        .with_context(|| format!("Failed to load descriptor: {}", args.descriptor.display()))?;
    let input = resolve_input(&args, &descriptor)?;

    info!("Importing {}...", input.display());
    let import_start = Instant::now();
    let scene = import::import_obj(&input)?;
    info!(
        "Imported {} meshes, {} vertices, {} faces in {:.2}s",
        scene.meshes.len(),
        scene.vertices.len(),
        scene.facets.len(),
        import_start.elapsed().as_secs_f32()
    );

    let compiler = GeomCompiler::new(descriptor, scene);
    if let Some(path) = &args.details {
        let details = compiler.details().with_context(|| format!("Invalid scene in {}", input.display()))?;
        let text = details.to_toml().context("Failed to serialize scene details")?;
        std::fs::write(path, text).with_context(|| format!("Failed to write details: {}", path.display()))?;
        info!("Details written to {}", path.display());
    }

    let build_start = Instant::now();
    let geom = compiler.compile().with_context(|| format!("Failed to compile {}", input.display()))?;
    info!("Compiled in {:.2}s", build_start.elapsed().as_secs_f32());

    let save_start = Instant::now();
    geom.save_to_file(&args.output)
        .with_context(|| format!("Failed to write resource: {}", args.output.display()))?;
    info!("Saved to {} in {:.2}s", args.output.display(), save_start.elapsed().as_secs_f32());
    info!("Total execution time: {:.2}s", start_total.elapsed().as_secs_f32());

    Ok(())
}
