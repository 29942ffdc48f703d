use anyhow::{Context, anyhow};
use serde::Serialize;
use uuid::Uuid;

use resforge_files::{ResourceFile, ResourceType};

use crate::async_core::reschedule_to;
use crate::database::ResourcePathHint;
use crate::importer::ImportContext;

/// Allocates the resource on the owner thread, then writes `file` into it from the thread pool.
pub(crate) async fn commit_file<F: ResourceFile + Sync>(
    context: &ImportContext,
    file: &F,
    hint: &ResourcePathHint,
) -> anyhow::Result<Uuid> {
    let size = file.required_size();

    reschedule_to(&context.local_context).await;
    let mut generated = context
        .database
        .generate_resource(F::RESOURCE_TYPE, hint, size)?;
    reschedule_to(&context.thread_pool).await;

    file.write_into(generated.uuid, &mut generated.mregion)?;
    Ok(generated.finish()?)
}

#[derive(Serialize)]
struct JsonResource<'a, T> {
    resource_type: u32,
    self_uuid: Uuid,
    #[serde(flatten)]
    body: &'a T,
}

fn to_json<T: Serialize>(resource_type: ResourceType, self_uuid: Uuid, body: &T) -> anyhow::Result<Vec<u8>> {
    let resource = JsonResource {
        resource_type: resource_type.into(),
        self_uuid,
        body,
    };
    Ok(serde_json::to_vec_pretty(&resource)?)
}

/// Commits `body` as pretty printed json. The size is taken from a dump with the nil UUID, every
/// UUID prints with the same length, so the real dump fits exactly.
pub(crate) async fn commit_json<T: Serialize + Sync>(
    context: &ImportContext,
    resource_type: ResourceType,
    body: &T,
    hint: &ResourcePathHint,
) -> anyhow::Result<Uuid> {
    let size = to_json(resource_type, Uuid::nil(), body)?.len();

    reschedule_to(&context.local_context).await;
    let mut generated = context
        .database
        .generate_resource(resource_type, hint, size)?;
    reschedule_to(&context.thread_pool).await;

    let bytes = to_json(resource_type, generated.uuid, body)?;
    if bytes.len() != generated.mregion.len() {
        return Err(anyhow!(
            "{} json changed size from {} to {} bytes",
            resource_type.name(),
            size,
            bytes.len()
        ))
        .with_context(|| format!("Writing \"{}\"", generated.path));
    }

    generated.mregion.copy_from_slice(&bytes);
    Ok(generated.finish()?)
}
