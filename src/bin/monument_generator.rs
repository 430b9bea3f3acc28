use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use monument_mixer::cli::GeminiOptions;
use monument_mixer::codec::{ImageFile, decode_to_binary};
use monument_mixer::config::setup_logging;
use monument_mixer::gemini::{ApiKey, GeminiClient};
use monument_mixer::proxy::ProxyClient;
use monument_mixer::studio::{MonumentService, Studio};
use monument_mixer::workflow::{MonumentSource, SceneSource, Workflow};
use std::path::PathBuf;
use std::time::Duration;

/// Run the monument wizard from the command line.
///
/// Minimal UX:
///   monument_generator --monument "a bronze lion" --scene "a city park"
#[derive(Parser, Debug)]
#[command(name = "monument_generator")]
#[command(about = "Generate a monument, place it in a scene and save the composite")]
struct Args {
    /// Describe the monument to generate
    #[arg(long, conflicts_with = "monument_image")]
    monument: Option<String>,

    /// Build the monument from this image instead
    #[arg(long)]
    monument_image: Option<PathBuf>,

    /// Style applied to --monument-image
    #[arg(long)]
    style: Option<String>,

    /// Describe the scene to generate
    #[arg(long, conflicts_with = "scene_image")]
    scene: Option<String>,

    /// Place the monument in this photo instead
    #[arg(long)]
    scene_image: Option<PathBuf>,

    /// Placement instruction. Uploaded scenes get one from their description when omitted.
    #[arg(long)]
    placement: Option<String>,

    /// Send requests through a running monument-mixer server instead of calling Gemini directly
    #[arg(long, env = "MONUMENT_PROXY_URL")]
    proxy_url: Option<String>,

    #[clap(flatten)]
    gemini: GeminiOptions,

    /// Output directory for monument.<ext> and composite.<ext>
    #[arg(long, default_value = "./monuments", env = "MONUMENT_OUTPUT_DIR")]
    out_dir: PathBuf,

    /// Enable debug logging
    #[arg(long, env = "MONUMENT_DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if let Err(err) = setup_logging(args.debug) {
        eprintln!("Logging unavailable: {err}");
    }

    let written = match args.proxy_url.as_deref() {
        Some(url) => {
            let timeout = Duration::from_secs(args.gemini.request_timeout);
            let client = ProxyClient::new(url, timeout)?;
            run(Workflow::new(client), &args).await?
        }
        None => {
            let key = args
                .gemini
                .api_key
                .as_deref()
                .ok_or_else(|| anyhow!("Set GEMINI_API_KEY or pass --api-key / --proxy-url"))?;
            let client = GeminiClient::new(args.gemini.settings()?, Some(ApiKey::new(key)?))?;
            run(Workflow::new(Studio::new(client)), &args).await?
        }
    };

    for path in written {
        println!("Saved {}", path.display());
    }
    Ok(())
}

async fn run<S: MonumentService>(workflow: Workflow<S>, args: &Args) -> Result<Vec<PathBuf>> {
    match (&args.monument, &args.monument_image) {
        (Some(prompt), None) => workflow.set_monument_prompt(prompt.as_str()).await?,
        (None, Some(path)) => {
            workflow.set_monument_source(MonumentSource::Upload).await?;
            if let Some(style) = &args.style {
                workflow.set_monument_prompt(style.as_str()).await?;
            }
            let file = ImageFile::open(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            workflow.select_monument_file(file).await?;
        }
        _ => bail!("Pass either --monument or --monument-image"),
    }

    workflow
        .generate_monument()
        .await
        .context("Monument generation failed")?;
    workflow.advance().await?;

    match (&args.scene, &args.scene_image) {
        (Some(prompt), None) => {
            workflow.set_scene_source(SceneSource::Prompt).await?;
            workflow.set_scene_prompt(prompt.as_str()).await?;
        }
        (None, Some(path)) => {
            let file = ImageFile::open(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            workflow.upload_scene(file).await?;
            let state = workflow.snapshot().await;
            if let Some(notice) = state.notice {
                eprintln!("{notice}");
            }
            if let Some(description) = state.scene_description {
                eprintln!("Scene: {description}");
            }
        }
        _ => bail!("Pass either --scene or --scene-image"),
    }
    if let Some(placement) = &args.placement {
        workflow.set_placement_instruction(placement.as_str()).await?;
    }

    workflow
        .place_monument()
        .await
        .context("Placing the monument failed")?;

    let state = workflow.snapshot().await;
    tokio::fs::create_dir_all(&args.out_dir)
        .await
        .with_context(|| format!("Failed to create {}", args.out_dir.display()))?;

    let mut written = Vec::new();
    for (stem, image) in [("monument", state.monument), ("composite", state.composite)] {
        let image = image.ok_or_else(|| anyhow!("No {stem} image was produced"))?;
        let file = decode_to_binary(
            &image.to_data_url(),
            &format!("{stem}.{}", image.file_extension()),
        )?;
        let path = args.out_dir.join(&file.name);
        tokio::fs::write(&path, &file.bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}
