use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::{info, trace, warn};

use resforge::database::{RemoveResourceOutcome, ResourceDatabase};
use resforge::importer::{AssetImporter, Decoders};
use resforge::runtime::Runtime;
use resforge::settings::{CliArgs, Command};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = CliArgs::parse();
    trace!("Starting with args: {:?}", args);

    std::fs::create_dir_all(&args.root).with_context(|| format!("Creating the database root \"{}\"", args.root))?;
    let database = Arc::new(ResourceDatabase::open(&args.root)?);
    let num_threads = args.num_threads();

    match args.command {
        Command::List => {
            for entry in database.entries()? {
                println!(
                    "{} {:<10} {} [{}+{}]",
                    entry.uuid,
                    entry.resource_type.name(),
                    entry.location.file,
                    entry.location.offset,
                    entry.location.size
                );
            }
        }
        Command::Locate { uuid } => match database.locate(&uuid)? {
            Some(location) => println!(
                "{} [{}+{}]",
                database.resolve_path(&location.file).display(),
                location.offset,
                location.size
            ),
            None => anyhow::bail!("{} is not in the database", uuid),
        },
        Command::Remove { uuid } => match database.try_remove_resource(&uuid)? {
            RemoveResourceOutcome::Success => info!("Removed {}", uuid),
            RemoveResourceOutcome::FileKept => info!("Removed {}, its file is still referenced", uuid),
            RemoveResourceOutcome::FileNotFound => warn!("Removed {}, its file was already gone", uuid),
            RemoveResourceOutcome::UuidNotFound => anyhow::bail!("{} is not in the database", uuid),
        },
        Command::Unlink { uuid } => {
            if !database.try_unlink_record(&uuid)? {
                anyhow::bail!("{} is not in the database", uuid);
            }
            info!("Unlinked {}", uuid);
        }
        Command::ImportModel {
            path,
            no_mips,
            encoding,
            collapse_graph,
            merge_meshes,
        } => {
            let params = Command::model_params(no_mips, encoding, collapse_graph, merge_meshes);
            let runtime = Runtime::new(database.clone(), num_threads)?;
            let importer = AssetImporter::new(database.clone(), runtime.handles(), Decoders::default());
            let uuid = runtime.block_on(importer.import_model(path, params))?;
            println!("{}", uuid);
        }
        Command::ImportTexture {
            path,
            no_mips,
            encoding,
            colorspace,
        } => {
            let params = Command::texture_params(no_mips, encoding, colorspace);
            let runtime = Runtime::new(database.clone(), num_threads)?;
            let importer = AssetImporter::new(database.clone(), runtime.handles(), Decoders::default());
            let uuid = runtime.block_on(importer.import_texture(path, params))?;
            println!("{}", uuid);
        }
    }

    Ok(())
}
