use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::backend::wgpu::WgpuDevice;
use clap::Args;
use rand::SeedableRng;
use rand::rngs::StdRng;
use steel_defect_unet::overlay::{OverlayStyle, defect_label, probability_heatmap, render_overlay};
use steel_defect_unet::training::{load_model, predict};
use steel_defect_unet::{
    BatchGenerator, DefectClass, DefectTable, FolderSource, GeneratorConfig, Normalize,
    SOURCE_SHAPE, Subset,
};

use super::common::{MyBackend, TRAIN_CSV, load_table};

#[derive(Args)]
pub struct InspectArgs {
    #[arg(short, long)]
    pub data_dir: PathBuf,

    #[arg(short, long, default_value = "inspect")]
    pub out_dir: PathBuf,

    /// Images sampled for each defect class
    #[arg(long, default_value_t = 5)]
    pub per_class: usize,

    /// Also render predictions of the model saved in this directory
    #[arg(short, long)]
    pub artifact_dir: Option<PathBuf>,

    #[arg(long, default_value_t = 0.5)]
    pub threshold: f32,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

pub fn run(args: &InspectArgs) -> Result<()> {
    let table = load_table(&args.data_dir, TRAIN_CSV)?;
    let mut rng = StdRng::seed_from_u64(args.seed);

    let mut indices = Vec::new();
    for class in DefectClass::ALL {
        indices.extend(table.sample_indices_with_defect(class, args.per_class, &mut rng));
    }
    let sampled = table.subset(&indices);

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("Failed to create {}", args.out_dir.display()))?;

    render_ground_truth(args, &sampled)?;
    if let Some(artifact_dir) = &args.artifact_dir {
        render_predictions(args, artifact_dir, &sampled)?;
    }

    println!("Wrote {} overlays to {}", sampled.len(), args.out_dir.display());
    Ok(())
}

fn render_ground_truth(args: &InspectArgs, table: &DefectTable) -> Result<()> {
    let subset = Subset::Train;
    let source = FolderSource::new(&args.data_dir, &subset);
    let config = GeneratorConfig::new(subset)
        .with_batch_size(1)
        .with_resize_shape(SOURCE_SHAPE)
        .with_source_shape(SOURCE_SHAPE);
    let generator = BatchGenerator::new(table.clone(), config, source)?;

    for record in generator.iter() {
        let record = record?;
        let Some(masks) = &record.masks else {
            continue;
        };
        let masks = masks.sample(0);
        let image_id = record.image_id(0).unwrap_or_default();

        let image = record
            .images
            .to_rgb_image(0)
            .with_context(|| format!("Batch {} holds no image", record.index))?;

        let overlay = render_overlay(&image, masks, OverlayStyle::INSPECTION);
        let path = args.out_dir.join(format!("{image_id}.png"));
        overlay
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        log::info!("{}: {}", image_id, defect_label(masks));
    }

    Ok(())
}

fn render_predictions(args: &InspectArgs, artifact_dir: &Path, table: &DefectTable) -> Result<()> {
    let device = WgpuDevice::default();
    let (model, model_config) = load_model::<MyBackend, _>(artifact_dir, &device)
        .with_context(|| format!("Failed to load model from {}", artifact_dir.display()))?;

    let subset = Subset::Train;
    let source = FolderSource::new(&args.data_dir, &subset);
    let config = GeneratorConfig::new(subset)
        .with_batch_size(1)
        .with_resize_shape(model_config.input_size);
    let normalize = Normalize::unit_range();
    let generator = BatchGenerator::new(table.clone(), config, source.clone())?
        .with_preprocess(move |images| normalize.apply(images));

    let predictions = predict(&model, &generator, &device)?;
    let shape = predictions.shape();

    for map in predictions.iter() {
        let image = image::open(source.dir().join(map.image_id()))
            .with_context(|| format!("Failed to open {}", map.image_id()))?
            .into_rgb8();
        let masks = DefectClass::ALL
            .map(|class| map.threshold(class, args.threshold).upsample(SOURCE_SHAPE));

        let overlay = render_overlay(&image, &masks, OverlayStyle::PREDICTION);
        let path = args.out_dir.join(format!("{}_pred.png", map.image_id()));
        overlay
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        for class in DefectClass::ALL {
            let path = args.out_dir.join(format!("{}_p{}.png", map.image_id(), class));
            probability_heatmap(&map, class, shape)
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }

        log::info!(
            "{}: max probability {:?}, predicted {}",
            map.image_id(),
            DefectClass::ALL.map(|class| map.max(class)),
            defect_label(&masks)
        );
    }

    Ok(())
}
