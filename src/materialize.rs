//! Dataset materialization
//!
//! Builds the image folders TCAV reads: one for the target class, one per
//! texture concept and a set of random baseline folders. Each folder is built
//! in a staging directory and swapped in only once it is complete, so a failed
//! run never leaves a previously valid folder half-overwritten.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::context::{random_folder_name, RunContext};
use crate::error::DatasetError;
use crate::imagenet::{list_files, BackgroundCorpus};

/// Attempts allowed per requested image when filling a random folder
pub const RANDOM_ATTEMPT_FACTOR: usize = 20;

/// Extension given to every copied background image
const NORMALIZED_EXTENSION: &str = "jpg";

/// Broden ships colour-suffixed variants that TCAV must not see
const COLOR_MARKER: &str = "color";

/// What a materialization run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializeSummary {
    /// Images copied for the target (may be short of the request)
    pub target_images: usize,
    /// Concept folders written
    pub concept_folders: usize,
    /// Random folders written
    pub random_folders: usize,
}

/// A folder under construction; removed on drop unless committed
struct StagedFolder {
    staging: PathBuf,
    destination: PathBuf,
    committed: bool,
}

impl StagedFolder {
    fn create(destination: PathBuf) -> Result<Self, DatasetError> {
        let name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let parent = destination.parent().unwrap_or_else(|| Path::new("."));
        let staging = parent.join(format!(".{name}.staging"));

        if staging.exists() {
            std::fs::remove_dir_all(&staging).map_err(|e| DatasetError::io(&staging, e))?;
        }
        std::fs::create_dir_all(&staging).map_err(|e| DatasetError::io(&staging, e))?;

        Ok(Self {
            staging,
            destination,
            committed: false,
        })
    }

    fn path(&self) -> &Path {
        &self.staging
    }

    fn commit(mut self) -> Result<(), DatasetError> {
        if self.destination.exists() {
            std::fs::remove_dir_all(&self.destination)
                .map_err(|e| DatasetError::io(&self.destination, e))?;
        }
        std::fs::rename(&self.staging, &self.destination)
            .map_err(|e| DatasetError::io(&self.destination, e))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedFolder {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_dir_all(&self.staging);
        }
    }
}

/// Destination file name with the extension normalized to `.jpg`
fn normalized_name(source: &Path) -> Option<String> {
    let file_name = source.file_name()?.to_str()?;
    let stem = file_name.split('.').next().filter(|s| !s.is_empty())?;
    Some(format!("{stem}.{NORMALIZED_EXTENSION}"))
}

/// Copy `source` into `folder` under its normalized name
fn copy_image(folder: &Path, source: &Path) -> Result<PathBuf, DatasetError> {
    let name = normalized_name(source).ok_or_else(|| {
        DatasetError::NotFound(format!("Invalid image file name {}", source.display()))
    })?;
    let destination = folder.join(name);
    std::fs::copy(source, &destination).map_err(|e| DatasetError::io(source, e))?;
    Ok(destination)
}

/// Builds target, concept and random folders from the local corpora
pub struct Materializer<'a> {
    ctx: &'a RunContext,
    corpus: BackgroundCorpus,
    rng: StdRng,
}

impl<'a> Materializer<'a> {
    /// Load the background corpus index and seed the sampler
    pub fn new(ctx: &'a RunContext, seed: u64) -> Result<Self, DatasetError> {
        let corpus = BackgroundCorpus::load(&ctx.background_dir)?;
        Ok(Self {
            ctx,
            corpus,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Copy up to `count` images of the target class
    ///
    /// A short fill is logged rather than treated as an error.
    pub fn fetch_target_class(&self, target: &str, count: usize) -> Result<usize, DatasetError> {
        info!("Fetching imagenet data for {}", target);
        let images = self.corpus.image_paths(target)?;

        let folder = StagedFolder::create(self.ctx.image_folder(target))?;
        let mut copied = 0;
        for image in &images {
            if copied >= count {
                break;
            }
            match copy_image(folder.path(), image) {
                Ok(_) => copied += 1,
                Err(e) => warn!("Problem copying imagenet image {}: {}", image.display(), e),
            }
        }
        folder.commit()?;

        if copied < count {
            warn!(
                "You requested {} but we were only able to find {} good images for {}",
                count, copied, target
            );
        } else {
            info!("Copied {} images for {}", copied, target);
        }
        Ok(copied)
    }

    /// Copy exactly `count` Broden images of a texture concept
    pub fn copy_texture_concept(&self, concept: &str, count: usize) -> Result<(), DatasetError> {
        let textures_dir = self.ctx.texture_images_dir();
        if !textures_dir.is_dir() {
            return Err(DatasetError::NotFound(format!(
                "Broden texture directory {}",
                textures_dir.display()
            )));
        }

        let files: Vec<PathBuf> = list_files(&textures_dir)?
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(concept) && !n.contains(COLOR_MARKER))
            })
            .collect();
        debug!("We have {} images for the concept {}", files.len(), concept);

        if files.is_empty() {
            return Err(DatasetError::NotFound(format!(
                "No Broden images for concept '{concept}'"
            )));
        }
        if count > files.len() {
            return Err(DatasetError::InsufficientData {
                concept: concept.to_string(),
                available: files.len(),
                requested: count,
            });
        }

        let folder = StagedFolder::create(self.ctx.image_folder(concept))?;
        for file in files.iter().take(count) {
            let name = file.file_name().unwrap_or_default();
            let destination = folder.path().join(name);
            std::fs::copy(file, &destination).map_err(|e| DatasetError::io(file, e))?;
        }
        folder.commit()
    }

    /// Fill `folder_count` random folders with `count` distinct background images each
    pub fn generate_random_folders(
        &mut self,
        folder_count: usize,
        count: usize,
    ) -> Result<(), DatasetError> {
        let mut listings: HashMap<String, Vec<PathBuf>> = HashMap::new();
        for index in 0..folder_count {
            let name = random_folder_name(index);
            self.fill_random_folder(&name, count, &mut listings)?;
        }
        Ok(())
    }

    fn fill_random_folder(
        &mut self,
        name: &str,
        count: usize,
        listings: &mut HashMap<String, Vec<PathBuf>>,
    ) -> Result<(), DatasetError> {
        let folder = StagedFolder::create(self.ctx.image_folder(name))?;
        let max_attempts = count * RANDOM_ATTEMPT_FACTOR;
        let mut taken: HashSet<String> = HashSet::new();
        let mut attempts = 0;

        while taken.len() < count {
            if attempts >= max_attempts {
                return Err(DatasetError::RandomExhausted {
                    folder: name.to_string(),
                    collected: taken.len(),
                    requested: count,
                    attempts,
                });
            }
            attempts += 1;

            let Some(class) = self.corpus.classes().choose(&mut self.rng) else {
                continue;
            };
            if !listings.contains_key(&class.wnid) {
                let dir = self.corpus.class_image_dir(class);
                let files = list_files(&dir).unwrap_or_else(|e| {
                    debug!("Skipping class {}: {}", class.wnid, e);
                    Vec::new()
                });
                listings.insert(class.wnid.clone(), files);
            }
            let Some(image) = listings
                .get(&class.wnid)
                .and_then(|files| files.choose(&mut self.rng))
            else {
                continue;
            };

            let Some(dest_name) = normalized_name(image) else {
                continue;
            };
            if taken.contains(&dest_name) {
                continue;
            }
            match copy_image(folder.path(), image) {
                Ok(_) => {
                    taken.insert(dest_name);
                    if taken.len() % 10 == 0 {
                        info!("Copied {}/{} images for {}", taken.len(), count, name);
                    }
                }
                Err(e) => debug!("Random copy failed, trying another image: {}", e),
            }
        }

        folder.commit()
    }
}

/// Materialize every folder a run needs
///
/// The target is resolved first so that an unknown class fails before any
/// concept or random folder is touched.
pub fn materialize(
    ctx: &RunContext,
    target: &str,
    concepts: &[String],
    images_per_folder: usize,
    random_folder_count: usize,
    seed: u64,
) -> Result<MaterializeSummary, DatasetError> {
    std::fs::create_dir_all(&ctx.source_dir).map_err(|e| DatasetError::io(&ctx.source_dir, e))?;

    let mut materializer = Materializer::new(ctx, seed)?;
    let target_images = materializer.fetch_target_class(target, images_per_folder)?;

    for concept in concepts {
        materializer.copy_texture_concept(concept, images_per_folder)?;
    }
    info!("Created {} concept folders", concepts.len());

    materializer.generate_random_folders(random_folder_count, images_per_folder)?;
    info!("Created {} random folders", random_folder_count);

    Ok(MaterializeSummary {
        target_images,
        concept_folders: concepts.len(),
        random_folders: random_folder_count,
    })
}
