use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use resforge_files::texture::Colorspace;

use crate::importer::{ImportModelParams, ImportTextureParams, TextureEncoding};

#[derive(Parser, Debug)]
#[command(name = "resforge")]
#[command(version = concat!(env!("VERGEN_GIT_BRANCH"), "/",env!("VERGEN_GIT_SHA")))]
#[command(about = "Imports external assets into a UUID addressed resource database")]
pub struct CliArgs {
    #[arg(long, env = "RESFORGE_ROOT", default_value_t = default_root())]
    pub root: String,

    /// Worker threads of the import pool, defaults to the available parallelism.
    #[arg(long, env = "RESFORGE_THREADS")]
    pub threads: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

pub fn default_root() -> String {
    std::env::current_dir()
        .map(|dir| dir.join("_resources"))
        .unwrap_or_else(|_| PathBuf::from("_resources"))
        .to_string_lossy()
        .to_string()
}

impl CliArgs {
    pub fn num_threads(&self) -> usize {
        self.threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4))
    }
}

#[derive(ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
pub enum EncodingArg {
    Raw,
    Png,
}

impl From<EncodingArg> for TextureEncoding {
    fn from(value: EncodingArg) -> Self {
        match value {
            EncodingArg::Raw => TextureEncoding::Raw,
            EncodingArg::Png => TextureEncoding::Png,
        }
    }
}

#[derive(ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ColorspaceArg {
    Srgb,
    Linear,
}

impl From<ColorspaceArg> for Colorspace {
    fn from(value: ColorspaceArg) -> Self {
        match value {
            ColorspaceArg::Srgb => Colorspace::Srgb,
            ColorspaceArg::Linear => Colorspace::Linear,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Imports a model with its meshes, skeletons, animations, materials and textures.
    ImportModel {
        path: PathBuf,
        #[arg(long)]
        no_mips: bool,
        #[arg(long, value_enum, default_value = "png")]
        encoding: EncodingArg,
        #[arg(long)]
        collapse_graph: bool,
        #[arg(long)]
        merge_meshes: bool,
    },
    /// Imports a single image as a texture.
    ImportTexture {
        path: PathBuf,
        #[arg(long)]
        no_mips: bool,
        #[arg(long, value_enum, default_value = "png")]
        encoding: EncodingArg,
        #[arg(long, value_enum, default_value = "srgb")]
        colorspace: ColorspaceArg,
    },
    /// Lists every resource of the database.
    List,
    /// Prints where a resource is stored.
    Locate { uuid: Uuid },
    /// Removes a resource and, once nothing else references it, its file.
    Remove { uuid: Uuid },
    /// Forgets a resource but keeps its file.
    Unlink { uuid: Uuid },
}

impl Command {
    pub fn model_params(
        no_mips: bool,
        encoding: EncodingArg,
        collapse_graph: bool,
        merge_meshes: bool,
    ) -> ImportModelParams {
        ImportModelParams {
            generate_mips: !no_mips,
            encoding: encoding.into(),
            collapse_graph,
            merge_meshes,
        }
    }

    pub fn texture_params(no_mips: bool, encoding: EncodingArg, colorspace: ColorspaceArg) -> ImportTextureParams {
        ImportTextureParams {
            generate_mips: !no_mips,
            encoding: encoding.into(),
            colorspace: colorspace.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn import_model_flags_are_parsed() {
        let args = CliArgs::parse_from([
            "resforge",
            "--root",
            "/tmp/store",
            "--threads",
            "3",
            "import-model",
            "model.obj",
            "--no-mips",
            "--encoding",
            "raw",
            "--merge-meshes",
        ]);

        assert_eq!(args.root, "/tmp/store");
        assert_eq!(args.num_threads(), 3);
        let Command::ImportModel {
            path,
            no_mips,
            encoding,
            collapse_graph,
            merge_meshes,
        } = args.command
        else {
            panic!("expected import-model");
        };

        assert_eq!(path, PathBuf::from("model.obj"));
        let params = Command::model_params(no_mips, encoding, collapse_graph, merge_meshes);
        assert!(!params.generate_mips);
        assert_eq!(params.encoding, TextureEncoding::Raw);
        assert!(params.merge_meshes && !params.collapse_graph);
    }

    #[test]
    pub fn uuids_are_validated() {
        assert!(CliArgs::try_parse_from(["resforge", "locate", "not-a-uuid"]).is_err());
        let uuid = Uuid::new_v4();
        let uuid_arg = uuid.to_string();
        let args = CliArgs::parse_from(["resforge", "remove", uuid_arg.as_str()]);
        assert!(matches!(args.command, Command::Remove { uuid: parsed } if parsed == uuid));
    }
}
