//! Rewrites container images in a Kubernetes deployment manifest.
//!
//! CI publishes the freshly built image reference to the parameter store;
//! the deploy step reads it back and stamps it into every container under
//! `spec.template.spec.containers`.

use anyhow::{Context, Result, anyhow, bail};
use serde_yaml::Value;
use std::path::Path;
use tracing::info;

use crate::services::ParameterStore;

/// Replaces the `image` of every container that already declares one.
/// Returns the number of containers updated.
///
/// # Errors
///
/// Returns an error if the document has no `spec.template.spec.containers`
/// sequence.
pub fn replace_container_images(doc: &mut Value, image: &str) -> Result<usize> {
    let containers = doc
        .get_mut("spec")
        .and_then(|v| v.get_mut("template"))
        .and_then(|v| v.get_mut("spec"))
        .and_then(|v| v.get_mut("containers"))
        .and_then(Value::as_sequence_mut)
        .ok_or_else(|| anyhow!("manifest has no spec.template.spec.containers list"))?;

    let mut updated = 0;
    for container in containers.iter_mut() {
        if let Some(mapping) = container.as_mapping_mut() {
            if let Some(slot) = mapping.get_mut("image") {
                *slot = Value::String(image.to_string());
                updated += 1;
            }
        }
    }

    Ok(updated)
}

/// Reads the image name from `parameter`, patches `src` and writes the
/// result to `dest`. Returns the number of containers updated.
#[tracing::instrument(skip(store, src, dest), fields(src = %src.as_ref().display(), dest = %dest.as_ref().display()))]
pub async fn patch_manifest<S: ParameterStore>(
    store: &S,
    src: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    parameter: &str,
) -> Result<usize> {
    info!("Fetching image name from parameter store");
    let image = store
        .get(parameter)
        .await?
        .ok_or_else(|| anyhow!("parameter '{parameter}' not found"))?
        .value;
    let image = image.trim();
    if image.is_empty() {
        bail!("parameter '{parameter}' holds an empty image name");
    }
    info!(image, "Got image name");

    let src = src.as_ref();
    let content = std::fs::read_to_string(src)
        .with_context(|| format!("failed to read manifest '{}'", src.display()))?;
    let mut doc: Value = serde_yaml::from_str(&content)
        .with_context(|| format!("manifest '{}' is not valid YAML", src.display()))?;

    let updated = replace_container_images(&mut doc, image)?;

    let dest = dest.as_ref();
    std::fs::write(dest, serde_yaml::to_string(&doc)?)
        .with_context(|| format!("failed to write manifest '{}'", dest.display()))?;

    info!(updated, "Updated manifest saved");
    Ok(updated)
}
