//! The dataset aggregate.
//!
//! A [`Dataset`] owns the class taxonomy, the image registry, the
//! annotation registry and the annotation → image ownership map. The
//! image → annotations index is derived from the ownership map and is
//! rebuilt from scratch whenever ownership changes; it is never patched
//! incrementally and never persisted.
//!
//! Datasets are built whole from [`DatasetParts`], either by a format
//! adapter or by a transform that derives a new dataset (see
//! [`Dataset::split_dataset`]).

mod crop;
mod diagnostics;
mod ids;
mod split;
mod taxonomy;

pub use ids::{AnnotationId, ClassId, ImageId};
pub use split::{DatasetSplit, SplitRatios, RATIO_EPSILON};
pub use taxonomy::{ClassTaxonomy, TaxonomyConflict};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use image::DynamicImage;

use crate::annotation::{Annotation, Mask};
use crate::error::LabelsetError;
use crate::store::ImageStore;

/// Registry entry for one image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRecord {
    /// Path of the payload relative to the dataset's data path.
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

impl ImageRecord {
    pub fn new(file_name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            file_name: file_name.into(),
            width,
            height,
        }
    }
}

/// Everything needed to construct a [`Dataset`].
///
/// Adapters fill this in while reading a source file and hand it to
/// [`Dataset::from_parts`], which checks uniqueness and builds the index.
#[derive(Clone, Debug, Default)]
pub struct DatasetParts {
    pub taxonomy: ClassTaxonomy,
    pub data_path: PathBuf,
    pub images: Vec<(ImageId, ImageRecord)>,
    pub annotations: Vec<(AnnotationId, ImageId, Annotation)>,
}

impl DatasetParts {
    pub fn new(taxonomy: ClassTaxonomy, data_path: impl Into<PathBuf>) -> Self {
        Self {
            taxonomy,
            data_path: data_path.into(),
            ..Default::default()
        }
    }

    pub fn add_image(&mut self, id: impl Into<ImageId>, record: ImageRecord) {
        self.images.push((id.into(), record));
    }

    pub fn add_annotation(
        &mut self,
        id: impl Into<AnnotationId>,
        image_id: impl Into<ImageId>,
        annotation: Annotation,
    ) {
        self.annotations
            .push((id.into(), image_id.into(), annotation));
    }
}

/// The aggregate root: taxonomy, image and annotation registries, and the
/// derived image → annotations index.
#[derive(Clone, Debug)]
pub struct Dataset {
    taxonomy: ClassTaxonomy,
    data_path: PathBuf,
    images: BTreeMap<ImageId, ImageRecord>,
    annotations: BTreeMap<AnnotationId, Annotation>,
    owners: BTreeMap<AnnotationId, ImageId>,
    index: BTreeMap<ImageId, BTreeSet<AnnotationId>>,
}

impl Dataset {
    /// Builds a dataset, checking id and file name uniqueness.
    ///
    /// Annotations that reference an image id missing from `parts.images`
    /// are kept; [`Dataset::find_orphan_annotations`] reports them.
    ///
    /// # Errors
    /// `InvalidDataset` on a duplicate image id, duplicate file name or
    /// duplicate annotation id.
    pub fn from_parts(parts: DatasetParts) -> Result<Self, LabelsetError> {
        let DatasetParts {
            taxonomy,
            data_path,
            images: image_rows,
            annotations: annotation_rows,
        } = parts;

        let mut images = BTreeMap::new();
        let mut file_names: HashMap<String, ImageId> = HashMap::new();
        for (id, record) in image_rows {
            if let Some(first) = file_names.insert(record.file_name.clone(), id) {
                return Err(LabelsetError::InvalidDataset {
                    message: format!(
                        "file name '{}' is registered for both image {} and image {}",
                        record.file_name, first, id
                    ),
                });
            }
            if images.insert(id, record).is_some() {
                return Err(LabelsetError::InvalidDataset {
                    message: format!("duplicate image id {id}"),
                });
            }
        }

        let mut annotations = BTreeMap::new();
        let mut owners = BTreeMap::new();
        for (id, image_id, annotation) in annotation_rows {
            if annotations.insert(id, annotation).is_some() {
                return Err(LabelsetError::InvalidDataset {
                    message: format!("duplicate annotation id {id}"),
                });
            }
            owners.insert(id, image_id);
        }

        let mut dataset = Self {
            taxonomy,
            data_path,
            images,
            annotations,
            owners,
            index: BTreeMap::new(),
        };
        dataset.rebuild_index();
        Ok(dataset)
    }

    /// An empty dataset rooted at `data_path`.
    pub fn empty(taxonomy: ClassTaxonomy, data_path: impl Into<PathBuf>) -> Self {
        Self {
            taxonomy,
            data_path: data_path.into(),
            images: BTreeMap::new(),
            annotations: BTreeMap::new(),
            owners: BTreeMap::new(),
            index: BTreeMap::new(),
        }
    }

    /// Recomputes the image → annotations index from the ownership map.
    fn rebuild_index(&mut self) {
        let mut index: BTreeMap<ImageId, BTreeSet<AnnotationId>> = self
            .images
            .keys()
            .map(|id| (*id, BTreeSet::new()))
            .collect();
        for (annotation_id, image_id) in &self.owners {
            if let Some(ids) = index.get_mut(image_id) {
                ids.insert(*annotation_id);
            }
        }
        self.index = index;
    }

    pub fn taxonomy(&self) -> &ClassTaxonomy {
        &self.taxonomy
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Name of a class in the taxonomy.
    pub fn class_name(&self, id: ClassId) -> Result<&str, LabelsetError> {
        self.taxonomy
            .name(id)
            .ok_or_else(|| LabelsetError::unknown_class(id))
    }

    /// Id of the class called `name`, if any.
    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.taxonomy.id(name)
    }

    /// Number of registered images.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }

    /// Registered image ids in ascending order.
    pub fn image_ids(&self) -> impl Iterator<Item = ImageId> + '_ {
        self.images.keys().copied()
    }

    /// Registered images in ascending id order.
    pub fn images(&self) -> impl Iterator<Item = (ImageId, &ImageRecord)> + '_ {
        self.images.iter().map(|(id, record)| (*id, record))
    }

    pub fn image(&self, id: ImageId) -> Result<&ImageRecord, LabelsetError> {
        self.images
            .get(&id)
            .ok_or_else(|| LabelsetError::unknown_image(id))
    }

    /// Location of an image payload: `data_path` joined with its file name.
    pub fn image_path(&self, id: ImageId) -> Result<PathBuf, LabelsetError> {
        Ok(self.data_path.join(&self.image(id)?.file_name))
    }

    /// Decodes an image through `store`.
    ///
    /// # Errors
    /// `UnknownId` if the id is not registered, `ImageNotFound` if the
    /// payload is absent.
    pub fn get_image<S: ImageStore + ?Sized>(
        &self,
        store: &S,
        id: ImageId,
    ) -> Result<DynamicImage, LabelsetError> {
        let path = self.image_path(id)?;
        if !store.exists(&path) {
            return Err(LabelsetError::ImageNotFound { path });
        }
        store.decode(&path)
    }

    /// All annotations with their owning image id, in ascending id order.
    pub fn annotations(&self) -> impl Iterator<Item = (AnnotationId, ImageId, &Annotation)> + '_ {
        self.annotations.iter().filter_map(|(id, annotation)| {
            self.owners
                .get(id)
                .map(|image_id| (*id, *image_id, annotation))
        })
    }

    pub fn get_annotation(&self, id: AnnotationId) -> Result<&Annotation, LabelsetError> {
        self.annotations
            .get(&id)
            .ok_or_else(|| LabelsetError::unknown_annotation(id))
    }

    pub fn annotation_owner(&self, id: AnnotationId) -> Result<ImageId, LabelsetError> {
        self.owners
            .get(&id)
            .copied()
            .ok_or_else(|| LabelsetError::unknown_annotation(id))
    }

    /// Annotation ids owned by an image, in ascending order.
    pub fn annotation_ids_for_image(
        &self,
        id: ImageId,
    ) -> Result<&BTreeSet<AnnotationId>, LabelsetError> {
        self.index
            .get(&id)
            .ok_or_else(|| LabelsetError::unknown_image(id))
    }

    /// Annotations owned by an image, in ascending annotation id order.
    pub fn annotations_for_image(
        &self,
        id: ImageId,
    ) -> Result<Vec<(AnnotationId, &Annotation)>, LabelsetError> {
        self.annotation_ids_for_image(id)?
            .iter()
            .map(|ann_id| Ok((*ann_id, self.get_annotation(*ann_id)?)))
            .collect()
    }

    /// Rasterizes an annotation at the size of its owning image.
    pub fn annotation_mask(&self, id: AnnotationId) -> Result<Mask, LabelsetError> {
        let annotation = self.get_annotation(id)?;
        let image = self.image(self.annotation_owner(id)?)?;
        annotation.derive_mask(image.width, image.height)
    }

    /// Number of annotations per class.
    ///
    /// Every class in the taxonomy is present, with zero if it has no
    /// instances. Annotations whose class is missing from the taxonomy are
    /// counted under their own id rather than dropped.
    pub fn count_instances_per_class(&self) -> BTreeMap<ClassId, usize> {
        let mut counts: BTreeMap<ClassId, usize> =
            self.taxonomy.ids().map(|id| (id, 0)).collect();
        for annotation in self.annotations.values() {
            *counts.entry(annotation.class_id).or_insert(0) += 1;
        }
        counts
    }

    /// Removes an image together with every annotation it owns.
    ///
    /// The id is checked before anything is touched, so on error the
    /// dataset is unchanged. The image payload itself is left in place.
    pub fn remove_image(&mut self, id: ImageId) -> Result<ImageRecord, LabelsetError> {
        let record = self
            .images
            .remove(&id)
            .ok_or_else(|| LabelsetError::unknown_image(id))?;

        let owned: Vec<AnnotationId> = self
            .owners
            .iter()
            .filter(|(_, owner)| **owner == id)
            .map(|(ann_id, _)| *ann_id)
            .collect();
        for ann_id in &owned {
            self.owners.remove(ann_id);
            self.annotations.remove(ann_id);
        }
        self.rebuild_index();

        tracing::debug!(
            image_id = id.as_u64(),
            removed_annotations = owned.len(),
            "removed image"
        );
        Ok(record)
    }

    /// Copies every image payload to `destination` and returns a dataset
    /// rooted there with the same registries.
    pub fn copy_dataset<S: ImageStore + ?Sized>(
        &self,
        store: &S,
        destination: impl Into<PathBuf>,
    ) -> Result<Dataset, LabelsetError> {
        let destination = destination.into();
        for record in self.images.values() {
            let from = self.data_path.join(&record.file_name);
            let to = destination.join(&record.file_name);
            store.copy(&from, &to)?;
        }

        tracing::info!(
            images = self.images.len(),
            destination = %destination.display(),
            "copied dataset"
        );
        let mut copy = self.clone();
        copy.data_path = destination;
        Ok(copy)
    }

    /// Builds a new dataset holding only `keep` and the annotations they
    /// own, through the same constructor path as a load.
    pub(crate) fn subset(&self, keep: &[ImageId]) -> Result<Dataset, LabelsetError> {
        let mut parts = DatasetParts::new(self.taxonomy.clone(), self.data_path.clone());
        for image_id in keep {
            let record = self.image(*image_id)?;
            parts.add_image(*image_id, record.clone());
            for ann_id in self.annotation_ids_for_image(*image_id)? {
                parts.add_annotation(*ann_id, *image_id, self.get_annotation(*ann_id)?.clone());
            }
        }
        Dataset::from_parts(parts)
    }
}
