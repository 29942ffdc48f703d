use uuid::Uuid;

use crate::animation::{Animation, JointTrack, QuatKey, Vec3Key};
use crate::mesh::{Aabb, Mesh, MeshLod, MeshVertices, VertexSkinned, VertexStatic};
use crate::skeleton::{NO_PARENT, Skeleton, SkeletonJoint};
use crate::texture::{Colorspace, MipFormat, Texture, TextureMip};
use crate::{FileError, Preamble, ResourceFile, ResourceType};

const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
];

fn joint(name: &str, parent: u32) -> SkeletonJoint {
    SkeletonJoint {
        name: name.to_string(),
        inv_bind: IDENTITY,
        parent,
    }
}

fn write_to_vec<F: ResourceFile>(file: &F, uuid: Uuid) -> Result<Vec<u8>, FileError> {
    let mut buf = vec![0u8; file.required_size()];
    file.write_into(uuid, &mut buf)?;
    Ok(buf)
}

#[test]
fn skeleton_survives_a_write_and_keeps_preorder() -> Result<(), anyhow::Error> {
    let skeleton = Skeleton {
        joints: vec![joint("root", NO_PARENT), joint("spine", 0), joint("head", 1)],
    };

    let uuid = Uuid::from_u128(0x1234);
    let bytes = write_to_vec(&skeleton, uuid)?;
    let (preamble, parsed) = Skeleton::parse(&bytes)?;

    assert_eq!(preamble, Preamble::new(ResourceType::Skeleton, uuid));
    assert_eq!(parsed, skeleton);
    Ok(())
}

#[test]
fn skeleton_joint_names_are_truncated_on_char_boundaries() -> Result<(), anyhow::Error> {
    // 62 ascii bytes + a 2 byte char would exceed the 63 byte name capacity by one.
    let long_name = format!("{}é", "a".repeat(62));
    let skeleton = Skeleton {
        joints: vec![joint(&long_name, NO_PARENT)],
    };

    let bytes = write_to_vec(&skeleton, Uuid::nil())?;
    let (_, parsed) = Skeleton::parse(&bytes)?;
    assert_eq!(parsed.joints[0].name, "a".repeat(62));
    Ok(())
}

#[test]
fn skeleton_rejects_too_many_joints() {
    let mut joints = vec![joint("root", NO_PARENT)];
    joints.extend((1..256).map(|idx| joint("bone", idx - 1)));
    let skeleton = Skeleton { joints };

    let result = write_to_vec(&skeleton, Uuid::nil());
    assert!(matches!(result, Err(FileError::FormatError { .. })));
}

#[test]
fn skinned_mesh_requires_a_skeleton() {
    let mesh = Mesh {
        skeleton_uuid: Uuid::nil(),
        aabb: Aabb::default(),
        lods: vec![MeshLod {
            vertices: MeshVertices::Skinned(vec![VertexSkinned::default(); 3]),
            elements: vec![0, 1, 2],
        }],
    };

    assert!(matches!(
        write_to_vec(&mesh, Uuid::new_v4()),
        Err(FileError::FormatError { .. })
    ));
}

#[test]
fn mesh_lods_are_laid_out_coarsest_first() -> Result<(), anyhow::Error> {
    let vertex = |x: f32| VertexStatic {
        position: [x, 0.0, 0.0],
        ..Default::default()
    };

    let mesh = Mesh {
        skeleton_uuid: Uuid::nil(),
        aabb: Aabb::from_positions(&[[0.0, 0.0, 0.0], [2.0, 1.0, -1.0]]),
        lods: vec![
            MeshLod {
                vertices: MeshVertices::Static(vec![vertex(0.0), vertex(1.0), vertex(2.0), vertex(3.0)]),
                elements: vec![0, 1, 2, 2, 3, 0],
            },
            MeshLod {
                vertices: MeshVertices::Static(vec![vertex(0.0), vertex(1.0), vertex(2.0)]),
                elements: vec![0, 1, 2],
            },
        ],
    };

    let bytes = write_to_vec(&mesh, Uuid::new_v4())?;
    let (_, parsed) = Mesh::parse(&bytes)?;
    assert_eq!(parsed, mesh);
    assert_eq!(parsed.aabb.min, [0.0, 0.0, -1.0]);
    assert_eq!(parsed.aabb.max, [2.0, 1.0, 0.0]);

    // The first LOD span (the finest level) has to start after the coarse one.
    let lod_spans = 24 + 8 + 16 + 32;
    let lod0_offset = u64::from_le_bytes(bytes[lod_spans..lod_spans + 8].try_into()?);
    let lod1_offset = u64::from_le_bytes(bytes[lod_spans + 24..lod_spans + 32].try_into()?);
    assert!(lod1_offset < lod0_offset);
    Ok(())
}

#[test]
fn texture_payloads_start_with_the_smallest_mip() -> Result<(), anyhow::Error> {
    let texture = Texture {
        num_channels: 4,
        colorspace: Colorspace::Srgb,
        mips: vec![
            TextureMip {
                width: 4,
                height: 4,
                format: MipFormat::Raw,
                bytes: vec![1; 64],
            },
            TextureMip {
                width: 2,
                height: 2,
                format: MipFormat::Raw,
                bytes: vec![2; 16],
            },
            TextureMip {
                width: 1,
                height: 1,
                format: MipFormat::Raw,
                bytes: vec![3; 4],
            },
        ],
    };

    let offsets = texture.payload_offsets();
    assert!(offsets[2] < offsets[1] && offsets[1] < offsets[0]);

    let bytes = write_to_vec(&texture, Uuid::new_v4())?;
    assert_eq!(bytes[offsets[2] as usize], 3);
    assert_eq!(*bytes.last().expect("non-empty"), 1);

    let (_, parsed) = Texture::parse(&bytes)?;
    assert_eq!(parsed, texture);
    Ok(())
}

#[test]
fn animation_keeps_its_skeleton_reference() -> Result<(), anyhow::Error> {
    let skeleton_uuid = Uuid::new_v4();
    let animation = Animation {
        skeleton_uuid,
        duration: 1.5,
        ticks_per_second: 24.0,
        tracks: vec![JointTrack {
            positions: vec![Vec3Key {
                time: 0.0,
                value: [0.0, 1.0, 0.0],
            }],
            rotations: vec![
                QuatKey {
                    time: 0.0,
                    value: [0.0, 0.0, 0.0, 1.0],
                },
                QuatKey {
                    time: 1.5,
                    value: [0.0, 1.0, 0.0, 0.0],
                },
            ],
            scalings: vec![],
        }],
    };

    let bytes = write_to_vec(&animation, Uuid::new_v4())?;
    let (_, parsed) = Animation::parse(&bytes)?;
    assert_eq!(parsed.skeleton_uuid, skeleton_uuid);
    assert_eq!(parsed, animation);
    Ok(())
}

#[test]
fn parsing_checks_magic_and_type() -> Result<(), anyhow::Error> {
    let skeleton = Skeleton {
        joints: vec![joint("root", NO_PARENT)],
    };
    let mut bytes = write_to_vec(&skeleton, Uuid::new_v4())?;

    assert!(matches!(
        Texture::parse(&bytes),
        Err(FileError::WrongResourceType { expected: 3, found: 5 })
    ));

    bytes[0] = b'x';
    assert!(matches!(
        Skeleton::parse(&bytes),
        Err(FileError::InvalidMagicValue { .. })
    ));
    Ok(())
}

#[test]
fn writing_into_a_wrongly_sized_region_fails() {
    let skeleton = Skeleton {
        joints: vec![joint("root", NO_PARENT)],
    };
    let mut buf = vec![0u8; skeleton.required_size() + 1];

    assert!(matches!(
        skeleton.write_into(Uuid::nil(), &mut buf),
        Err(FileError::SizeMismatch { .. })
    ));
}

#[test]
fn unknown_resource_types_are_preserved() {
    assert_eq!(ResourceType::from(42u32), ResourceType::Unknown(42));
    assert_eq!(u32::from(ResourceType::Unknown(42)), 42);
    assert_eq!(u32::from(ResourceType::MeshDesc), 7);
}
