use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use steel_defect_unet::DefectClass;

use super::common::{TRAIN_CSV, load_table};

const RESTRUCTURED_CSV: &str = "train_restructured.csv";

#[derive(Args)]
pub struct PrepareArgs {
    #[arg(short, long)]
    pub data_dir: PathBuf,
}

pub fn run(args: &PrepareArgs) -> Result<()> {
    let table = load_table(&args.data_dir, TRAIN_CSV)?;

    let defective = table.filter(|row| row.count() > 0);
    log::info!("{} of {} images have at least one defect", defective.len(), table.len());
    for class in DefectClass::ALL {
        let n = table.iter().filter(|row| row.has_defect(class)).count();
        log::info!("Defect {}: {} images", class, n);
    }

    let out = args.data_dir.join(RESTRUCTURED_CSV);
    let file = File::create(&out).with_context(|| format!("Failed to create {}", out.display()))?;
    table.write_csv(file)?;

    println!("Wrote {}", out.display());
    Ok(())
}
