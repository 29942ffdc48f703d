use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::{Mat4, Quat, Vec2, Vec3};
use serde_json::Value;
use uuid::Uuid;

use resforge::database::ResourceDatabase;
use resforge::importer::external::{
    DecodedImage, ExternalAnimation, ExternalBone, ExternalJoint, ExternalMaterial, ExternalMesh, ExternalNode,
    ExternalSkeleton, ExternalSkin, ExternalTrack, Transform,
};
use resforge::importer::{
    AssetImporter, DecodeFlags, Decoders, ExternalScene, ImageDecoder, ImageFileDecoder, ImportError,
    ImportModelParams, ImportTextureParams, SceneDecoder, TextureEncoding,
};
use resforge::runtime::Runtime;
use resforge_files::animation::Animation;
use resforge_files::mesh::{Mesh, MeshVertices};
use resforge_files::skeleton::Skeleton;
use resforge_files::texture::{Colorspace, MipFormat, Texture};
use resforge_files::{ResourceFile, ResourceType};

/// Every image is the same 4x4 RGBA gradient.
struct GradientImages;

fn gradient() -> DecodedImage {
    DecodedImage {
        width: 4,
        height: 4,
        num_channels: 4,
        pixels: (0..16u8).flat_map(|idx| [idx * 16, 255 - idx * 16, 7, 255]).collect(),
    }
}

impl ImageDecoder for GradientImages {
    fn decode_image(&self, _path: &Path) -> Result<DecodedImage, ImportError> {
        Ok(gradient())
    }
}

/// A character with one skeleton, a skinned and a static mesh and an animation.
struct RiggedScene {
    with_normals: bool,
}

fn triangle(name: &str) -> ExternalMesh {
    ExternalMesh {
        name: name.to_string(),
        positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
        normals: Some(vec![Vec3::Z; 3]),
        uvs: Some(vec![Vec2::ZERO, Vec2::X, Vec2::Y]),
        tangents: None,
        indices: vec![0, 1, 2],
        material: Some(0),
        skin: None,
    }
}

fn joint(name: &str, parent: Option<usize>) -> ExternalJoint {
    ExternalJoint {
        name: name.to_string(),
        parent,
        inv_bind: Mat4::IDENTITY,
    }
}

fn node(name: &str, parent: Option<usize>, meshes: Vec<usize>) -> ExternalNode {
    ExternalNode {
        name: name.to_string(),
        parent,
        transform: Transform::default(),
        meshes,
    }
}

impl SceneDecoder for RiggedScene {
    fn decode_scene(&self, _path: &Path, _flags: DecodeFlags) -> Result<ExternalScene, ImportError> {
        let mut body = triangle("body");
        if !self.with_normals {
            body.normals = None;
        }
        body.skin = Some(ExternalSkin {
            skeleton: 0,
            bones: vec![
                ExternalBone {
                    joint: 0,
                    weights: vec![(0, 1.0), (1, 1.0), (2, 0.5)],
                },
                ExternalBone {
                    joint: 2,
                    weights: vec![(2, 0.5)],
                },
            ],
        });

        let mut crate_mesh = triangle("crate");
        crate_mesh.material = Some(1);

        Ok(ExternalScene {
            nodes: vec![
                node("root", None, vec![]),
                node("body", Some(0), vec![0]),
                node("props", Some(0), vec![0, 1]),
            ],
            meshes: vec![body, crate_mesh],
            materials: vec![
                ExternalMaterial {
                    name: "skin".to_string(),
                    diffuse: Some(PathBuf::from("shared.png")),
                    specular: None,
                    normal: Some(PathBuf::from("skin_n.png")),
                },
                ExternalMaterial {
                    name: "wood".to_string(),
                    diffuse: Some(PathBuf::from("shared.png")),
                    specular: None,
                    normal: None,
                },
            ],
            skeletons: vec![
                ExternalSkeleton {
                    name: "Armature".to_string(),
                    joints: vec![joint("root", None), joint("spine", Some(0)), joint("head", Some(1))],
                },
                ExternalSkeleton {
                    name: "Unused".to_string(),
                    joints: vec![joint("root", None)],
                },
            ],
            animations: vec![
                ExternalAnimation {
                    name: "wave".to_string(),
                    skeleton: 0,
                    duration: 30.0,
                    ticks_per_second: 30.0,
                    tracks: vec![ExternalTrack {
                        joint: 1,
                        positions: vec![],
                        rotations: vec![(0.0, Quat::IDENTITY), (15.0, Quat::from_rotation_z(0.5))],
                        scalings: vec![],
                    }],
                },
                ExternalAnimation {
                    name: "orphan".to_string(),
                    skeleton: 1,
                    duration: 1.0,
                    ticks_per_second: 1.0,
                    tracks: vec![],
                },
            ],
        })
    }
}

struct Fixture {
    // Dropped before the directory goes away.
    runtime: Runtime,
    database: Arc<ResourceDatabase>,
    _dir: tempfile::TempDir,
}

fn fixture() -> Result<Fixture, anyhow::Error> {
    let dir = tempfile::tempdir()?;
    let database = Arc::new(ResourceDatabase::open(dir.path())?);
    let runtime = Runtime::new(database.clone(), 4)?;
    Ok(Fixture {
        runtime,
        database,
        _dir: dir,
    })
}

fn importer(fixture: &Fixture, decoders: Decoders) -> AssetImporter {
    AssetImporter::new(fixture.database.clone(), fixture.runtime.handles(), decoders)
}

fn rigged_decoders(with_normals: bool) -> Decoders {
    Decoders {
        scene: Arc::new(RiggedScene { with_normals }),
        image: Arc::new(GradientImages),
    }
}

fn read_json(database: &ResourceDatabase, uuid: &Uuid) -> Result<Value, anyhow::Error> {
    let bytes = database.map_resource(uuid)?;
    let value: Value = serde_json::from_slice(&bytes)?;
    assert_eq!(value["self_uuid"], Value::String(uuid.to_string()));
    Ok(value)
}

fn uuid_at(value: &Value, key: &str) -> Result<Uuid, anyhow::Error> {
    let text = value[key]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("\"{}\" is not a string", key))?;
    Ok(Uuid::parse_str(text)?)
}

fn count_of(database: &ResourceDatabase, resource_type: ResourceType) -> Result<usize, anyhow::Error> {
    Ok(database
        .entries()?
        .iter()
        .filter(|entry| entry.resource_type == resource_type)
        .count())
}

#[test]
pub fn rigged_model_is_imported_in_dependency_order() -> Result<(), anyhow::Error> {
    let fixture = fixture()?;
    let importer = importer(&fixture, rigged_decoders(true));
    let database = fixture.database.clone();

    let job = importer.import_model("rigged.fake", ImportModelParams::default());
    let scene_uuid = fixture.runtime.block_on(job)?;

    assert_eq!(database.type_of(&scene_uuid)?, Some(ResourceType::Scene));
    assert_eq!(count_of(&database, ResourceType::Skeleton)?, 1);
    assert_eq!(count_of(&database, ResourceType::Mesh)?, 2);
    assert_eq!(count_of(&database, ResourceType::Animation)?, 1);
    assert_eq!(count_of(&database, ResourceType::Texture)?, 2);
    assert_eq!(count_of(&database, ResourceType::Material)?, 2);
    assert_eq!(count_of(&database, ResourceType::MeshDesc)?, 2);

    let scene = read_json(&database, &scene_uuid)?;
    assert_eq!(scene["resource_type"], Value::from(1));
    let entities = scene["entities"]
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("entities missing"))?;
    let names = entities
        .iter()
        .map(|entity| entity["name"].as_str().unwrap_or_default())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["root", "body", "props", "body", "crate"]);
    assert_eq!(entities[3]["parent"], Value::from(2));

    // The skinned mesh references a skeleton that resolves.
    let body_desc_uuid = uuid_at(&entities[1], "uuid")?;
    assert_eq!(entities[1]["type"], Value::from("Mesh"));
    assert!(database.locate(&body_desc_uuid)?.is_some());

    let body_desc = read_json(&database, &body_desc_uuid)?;
    let mesh_uuid = uuid_at(&body_desc, "mesh")?;
    let (_, mesh) = Mesh::parse(&database.map_resource(&mesh_uuid)?)?;
    assert!(matches!(mesh.lods[0].vertices, MeshVertices::Skinned(_)));
    assert_eq!(database.type_of(&mesh.skeleton_uuid)?, Some(ResourceType::Skeleton));
    let (_, skeleton) = Skeleton::parse(&database.map_resource(&mesh.skeleton_uuid)?)?;
    assert_eq!(skeleton.joints.len(), 3);

    // Textures keep the colorspace of the first material slot using them.
    let normal_uuid = uuid_at(&body_desc, "normal")?;
    let (_, normal) = Texture::parse(&database.map_resource(&normal_uuid)?)?;
    assert_eq!(normal.colorspace, Colorspace::Linear);
    assert_eq!(normal.mips.len(), 3);
    assert!(normal.mips.iter().all(|mip| mip.format == MipFormat::Png));

    let crate_desc = read_json(&database, &uuid_at(&entities[4], "uuid")?)?;
    assert_eq!(crate_desc["diffuse"], body_desc["diffuse"]);
    let material = read_json(&database, &uuid_at(&crate_desc, "material")?)?;
    assert_eq!(material["specpower"], Value::from(128.0));
    assert_eq!(material["diffuse"], body_desc["diffuse"]);

    let animation_uuid = database
        .entries()?
        .into_iter()
        .find(|entry| entry.resource_type == ResourceType::Animation)
        .map(|entry| entry.uuid)
        .ok_or_else(|| anyhow::anyhow!("no animation"))?;
    let (_, animation) = Animation::parse(&database.map_resource(&animation_uuid)?)?;
    assert_eq!(animation.skeleton_uuid, mesh.skeleton_uuid);
    assert_eq!(animation.tracks.len(), 3);
    assert_eq!(animation.tracks[1].rotations[1].time, 0.5);

    assert!(!fixture.runtime.task_counter().any_tasks_in_flight());
    Ok(())
}

#[test]
pub fn texture_import_round_trips_through_png() -> Result<(), anyhow::Error> {
    let fixture = fixture()?;
    let importer = importer(
        &fixture,
        Decoders {
            scene: Arc::new(RiggedScene { with_normals: true }),
            image: Arc::new(GradientImages),
        },
    );

    let uuid = fixture
        .runtime
        .block_on(importer.import_texture("gradient.png", ImportTextureParams::default()))?;

    let location = fixture
        .database
        .locate(&uuid)?
        .ok_or_else(|| anyhow::anyhow!("texture not committed"))?;
    assert!(location.file.as_str().starts_with("textures/gradient"));

    let (_, texture) = Texture::parse(&fixture.database.map_resource(&uuid)?)?;
    assert_eq!(texture.num_channels, 4);
    assert_eq!(texture.colorspace, Colorspace::Srgb);
    let sizes = texture
        .mips
        .iter()
        .map(|mip| (mip.width, mip.height))
        .collect::<Vec<_>>();
    assert_eq!(sizes, vec![(4, 4), (2, 2), (1, 1)]);

    let decoded = image::load_from_memory(&texture.mips[0].bytes)?.into_rgba8();
    assert_eq!(decoded.into_raw(), gradient().pixels);
    Ok(())
}

#[test]
pub fn raw_textures_keep_their_pixels() -> Result<(), anyhow::Error> {
    let fixture = fixture()?;
    let importer = importer(&fixture, rigged_decoders(true));
    let params = ImportTextureParams {
        generate_mips: false,
        encoding: TextureEncoding::Raw,
        colorspace: Colorspace::Linear,
    };

    let uuid = fixture.runtime.block_on(importer.import_texture("raw.png", params))?;
    let (_, texture) = Texture::parse(&fixture.database.map_resource(&uuid)?)?;
    assert_eq!(texture.mips.len(), 1);
    assert_eq!(texture.mips[0].format, MipFormat::Raw);
    assert_eq!(texture.mips[0].bytes, gradient().pixels);
    Ok(())
}

#[test]
pub fn failures_name_the_stage_and_keep_committed_siblings() -> Result<(), anyhow::Error> {
    let fixture = fixture()?;
    let importer = importer(&fixture, rigged_decoders(false));
    let database = fixture.database.clone();

    let result = fixture
        .runtime
        .block_on(importer.import_model("broken.fake", ImportModelParams::default()));
    let err = anyhow::Error::from(result.err().ok_or_else(|| anyhow::anyhow!("import should fail"))?);
    let message = format!("{:#}", err);
    assert!(message.contains("Importing model"), "{}", message);
    assert!(message.contains("Importing mesh 'body'"), "{}", message);
    assert!(message.contains("has no normals"), "{}", message);

    // Sibling jobs the failed import didn't wait for still finish.
    while fixture.runtime.task_counter().any_tasks_in_flight() {
        if fixture.runtime.update() == 0 {
            std::thread::yield_now();
        }
    }

    // No rollback: the skeleton was committed before the mesh failed.
    let skeletons = database
        .entries()?
        .into_iter()
        .filter(|entry| entry.resource_type == ResourceType::Skeleton)
        .collect::<Vec<_>>();
    assert_eq!(skeletons.len(), 1);
    assert_eq!(count_of(&database, ResourceType::Scene)?, 0);

    let skeleton_file = database.resolve_path(&skeletons[0].location.file);
    assert!(skeleton_file.exists());

    for entry in database.entries()? {
        database.remove_resource_later(entry.uuid);
    }
    fixture.runtime.update();
    assert_eq!(database.num_entries(), 0);
    assert!(!skeleton_file.exists());
    Ok(())
}

#[test]
pub fn unreadable_images_fail_the_texture_job() -> Result<(), anyhow::Error> {
    let fixture = fixture()?;
    let importer = importer(
        &fixture,
        Decoders {
            scene: Arc::new(RiggedScene { with_normals: true }),
            image: Arc::new(ImageFileDecoder),
        },
    );

    let result = fixture
        .runtime
        .block_on(importer.import_texture("/nonexistent/albedo.png", ImportTextureParams::default()));
    let err = anyhow::Error::from(result.err().ok_or_else(|| anyhow::anyhow!("import should fail"))?);
    let message = format!("{:#}", err);
    assert!(message.contains("Importing texture"), "{}", message);
    assert!(message.contains("Failed to import"), "{}", message);
    assert_eq!(fixture.database.num_entries(), 0);
    Ok(())
}
