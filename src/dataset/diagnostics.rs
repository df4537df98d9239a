//! Consistency checks over the aggregate.
//!
//! These never fail. Each returns the offending ids and leaves remediation
//! to the caller.

use std::collections::BTreeSet;

use super::{AnnotationId, Dataset, ImageId};
use crate::store::ImageStore;

impl Dataset {
    /// Images registered in the dataset whose payload is absent.
    pub fn find_missing_images<S: ImageStore + ?Sized>(&self, store: &S) -> BTreeSet<ImageId> {
        self.images
            .iter()
            .filter(|(_, record)| !store.exists(&self.data_path.join(&record.file_name)))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Annotations owned by an image id that is not registered.
    pub fn find_orphan_annotations(&self) -> BTreeSet<AnnotationId> {
        self.owners
            .iter()
            .filter(|(_, image_id)| !self.images.contains_key(image_id))
            .map(|(ann_id, _)| *ann_id)
            .collect()
    }

    /// Images that own no annotations.
    pub fn find_unused_images(&self) -> BTreeSet<ImageId> {
        self.index
            .iter()
            .filter(|(_, ann_ids)| ann_ids.is_empty())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Polygon annotations whose box no longer encloses every point.
    pub fn find_inconsistent_boxes(&self) -> BTreeSet<AnnotationId> {
        self.annotations
            .iter()
            .filter(|(_, annotation)| !annotation.box_encloses_points())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Annotations whose class id is missing from the taxonomy.
    pub fn find_unknown_classes(&self) -> BTreeSet<AnnotationId> {
        self.annotations
            .iter()
            .filter(|(_, annotation)| !self.taxonomy.contains(annotation.class_id))
            .map(|(id, _)| *id)
            .collect()
    }
}
