use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use itertools::Itertools;
use log::debug;
use uuid::Uuid;

use resforge_files::texture::{MipFormat, Texture, TextureMip};

use crate::async_core::{Job, reschedule_to, until_all_ready};
use crate::database::ResourcePathHint;
use crate::importer::commit::commit_file;
use crate::importer::external::DecodedImage;
use crate::importer::{ImportContext, ImportError, ImportTextureParams, TextureEncoding};

fn check_image(image: &DecodedImage) -> Result<(), ImportError> {
    if !matches!(image.num_channels, 3 | 4) {
        return Err(ImportError::AssetContent(format!(
            "images need 3 or 4 channels, got {}",
            image.num_channels
        )));
    }

    let max = u16::MAX as u32;
    if image.width == 0 || image.height == 0 || image.width > max || image.height > max {
        return Err(ImportError::AssetContent(format!(
            "unsupported image resolution {}x{}",
            image.width, image.height
        )));
    }

    let expected = image.width as usize * image.height as usize * image.num_channels as usize;
    if image.pixels.len() != expected {
        return Err(ImportError::AssetContent(format!(
            "expected {} bytes of pixels, got {}",
            expected,
            image.pixels.len()
        )));
    }

    Ok(())
}

/// Box filters `image` down to half its size, rounding down but never below one pixel. Odd edges
/// reuse their last row or column.
pub(crate) fn downsample(image: &DecodedImage) -> DecodedImage {
    let width = (image.width / 2).max(1);
    let height = (image.height / 2).max(1);
    let channels = image.num_channels as usize;
    let src_width = image.width as usize;

    let texel = |x: u32, y: u32, c: usize| -> u32 {
        let x = x.min(image.width - 1) as usize;
        let y = y.min(image.height - 1) as usize;
        image.pixels[(y * src_width + x) * channels + c] as u32
    };

    let mut pixels = Vec::with_capacity(width as usize * height as usize * channels);
    for y in 0..height {
        for x in 0..width {
            let (sx, sy) = (x * 2, y * 2);
            for c in 0..channels {
                let sum = texel(sx, sy, c) + texel(sx + 1, sy, c) + texel(sx, sy + 1, c) + texel(sx + 1, sy + 1, c);
                pixels.push(((sum + 2) / 4) as u8);
            }
        }
    }

    DecodedImage {
        width,
        height,
        num_channels: image.num_channels,
        pixels,
    }
}

/// Full mip chain, the original image first and a 1x1 image last.
pub(crate) fn mip_chain(image: DecodedImage) -> Vec<DecodedImage> {
    let mut chain = vec![image];
    while let Some(last) = chain.last().filter(|last| last.width > 1 || last.height > 1) {
        let next = downsample(last);
        chain.push(next);
    }
    chain
}

async fn encode_mip(
    context: Arc<ImportContext>,
    image: DecodedImage,
    encoding: TextureEncoding,
) -> anyhow::Result<TextureMip> {
    let _guard = context.task_counter.obtain_task_guard();
    reschedule_to(&context.thread_pool).await;

    let (format, bytes) = match encoding {
        TextureEncoding::Raw => (MipFormat::Raw, image.pixels),
        TextureEncoding::Png => {
            let color_type = match image.num_channels {
                3 => ExtendedColorType::Rgb8,
                _ => ExtendedColorType::Rgba8,
            };

            let mut bytes = Vec::new();
            PngEncoder::new(&mut bytes)
                .write_image(&image.pixels, image.width, image.height, color_type)
                .with_context(|| format!("Encoding a {}x{} mip as png", image.width, image.height))?;
            (MipFormat::Png, bytes)
        }
    };

    Ok(TextureMip {
        width: image.width as u16,
        height: image.height as u16,
        format,
        bytes,
    })
}

fn texture_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn build_and_commit(
    context: Arc<ImportContext>,
    path: PathBuf,
    params: ImportTextureParams,
) -> anyhow::Result<Uuid> {
    reschedule_to(&context.thread_pool).await;
    debug!("Importing texture \"{}\"", path.display());

    let image = context.decoders.image.decode_image(&path)?;
    check_image(&image)?;
    let num_channels = image.num_channels;

    let levels = if params.generate_mips {
        reschedule_to(&context.offscreen_context).await;
        let levels = mip_chain(image);
        reschedule_to(&context.thread_pool).await;
        levels
    } else {
        vec![image]
    };

    let encode_jobs = levels
        .into_iter()
        .map(|level| Job::spawn(encode_mip(context.clone(), level, params.encoding)))
        .collect_vec();

    until_all_ready(&encode_jobs).await;

    let mips = encode_jobs
        .into_iter()
        .map(Job::get_result)
        .collect::<Result<Vec<_>, _>>()?;

    let texture = Texture {
        num_channels,
        colorspace: params.colorspace,
        mips,
    };

    let hint = ResourcePathHint::new("textures", texture_name(&path), "jtxtr");
    let uuid = commit_file(&context, &texture, &hint).await?;
    debug!("Imported texture \"{}\" as {}", path.display(), uuid);
    Ok(uuid)
}

pub(crate) async fn import_texture(
    context: Arc<ImportContext>,
    path: PathBuf,
    params: ImportTextureParams,
) -> anyhow::Result<Uuid> {
    let _guard = context.task_counter.obtain_task_guard();
    let description = format!("Importing texture \"{}\"", path.display());
    build_and_commit(context, path, params).await.context(description)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> DecodedImage {
        let pixels = (0..width * height)
            .flat_map(|idx| [(idx % 256) as u8, 0, 255])
            .collect();
        DecodedImage {
            width,
            height,
            num_channels: 3,
            pixels,
        }
    }

    #[test]
    pub fn mip_chain_ends_at_one_pixel() {
        let chain = mip_chain(gradient(8, 3));
        let sizes = chain.iter().map(|mip| (mip.width, mip.height)).collect_vec();
        assert_eq!(sizes, vec![(8, 3), (4, 1), (2, 1), (1, 1)]);
        assert!(chain.iter().all(|mip| check_image(mip).is_ok()));
    }

    #[test]
    pub fn box_filter_averages_quads() {
        let image = DecodedImage {
            width: 2,
            height: 2,
            num_channels: 3,
            pixels: vec![0, 0, 0, 100, 100, 100, 200, 200, 200, 100, 100, 100],
        };
        let half = downsample(&image);
        assert_eq!((half.width, half.height), (1, 1));
        assert_eq!(half.pixels, vec![100, 100, 100]);
    }

    #[test]
    pub fn malformed_images_are_rejected() {
        let mut image = gradient(2, 2);
        image.pixels.pop();
        assert!(matches!(check_image(&image), Err(ImportError::AssetContent(_))));

        let mut image = gradient(2, 2);
        image.num_channels = 2;
        assert!(matches!(check_image(&image), Err(ImportError::AssetContent(_))));
    }
}
