//! Dataset check reports.
//!
//! [`check_dataset`] runs every diagnostic on a [`Dataset`] and gathers the
//! findings into a [`CheckReport`] with stable issue codes, which can be
//! printed as text or serialized to JSON.

use std::fmt;

use serde::Serialize;

use crate::dataset::Dataset;
use crate::store::ImageStore;

/// Everything found by [`check_dataset`].
#[derive(Clone, Debug, Default, Serialize)]
pub struct CheckReport {
    pub issues: Vec<CheckIssue>,
}

impl CheckReport {
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    pub fn add(&mut self, issue: CheckIssue) {
        self.issues.push(issue);
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    /// True if there are no errors. Warnings are allowed.
    pub fn is_ok(&self) -> bool {
        self.error_count() == 0
    }

    /// True if there are no issues at all.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Number of issues carrying `code`.
    pub fn count(&self, code: IssueCode) -> usize {
        self.issues.iter().filter(|i| i.code == code).count()
    }

    /// The report as a JSON document with counts and the issue list.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        struct Summary<'a> {
            error_count: usize,
            warning_count: usize,
            issues: &'a [CheckIssue],
        }
        serde_json::to_string_pretty(&Summary {
            error_count: self.error_count(),
            warning_count: self.warning_count(),
            issues: &self.issues,
        })
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.is_empty() {
            return writeln!(f, "Check passed: no issues found");
        }

        writeln!(
            f,
            "Check completed with {} error(s) and {} warning(s):",
            self.error_count(),
            self.warning_count()
        )?;
        writeln!(f)?;

        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }

        Ok(())
    }
}

/// A single finding.
#[derive(Clone, Debug, Serialize)]
pub struct CheckIssue {
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
    pub context: IssueContext,
}

impl CheckIssue {
    pub fn error(code: IssueCode, message: impl Into<String>, context: IssueContext) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            context,
        }
    }

    pub fn warning(code: IssueCode, message: impl Into<String>, context: IssueContext) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            context,
        }
    }
}

impl fmt::Display for CheckIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARN ",
        };
        write!(
            f,
            "[{}] {:?} in {}: {}",
            severity, self.code, self.context, self.message
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Severity {
    Warning,
    Error,
}

/// Stable identifiers for each kind of finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum IssueCode {
    /// A registered image has no payload on disk.
    MissingImage,
    /// An annotation points at an image id that is not registered.
    OrphanAnnotation,
    /// An annotation's class is not in the taxonomy.
    UnknownClass,
    /// A polygon has a vertex outside its box.
    InconsistentBox,
    /// An image owns no annotations.
    UnusedImage,
}

/// Where an issue was found.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueContext {
    Image { id: u64 },
    Annotation { id: u64 },
}

impl fmt::Display for IssueContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueContext::Image { id } => write!(f, "image {}", id),
            IssueContext::Annotation { id } => write!(f, "annotation {}", id),
        }
    }
}

/// Runs every diagnostic and collects the findings.
///
/// Missing payloads, orphans and unknown classes are errors; stale boxes
/// and unannotated images are warnings.
pub fn check_dataset<S: ImageStore + ?Sized>(dataset: &Dataset, store: &S) -> CheckReport {
    let mut report = CheckReport::new();

    for id in dataset.find_missing_images(store) {
        let path = dataset
            .image_path(id)
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        report.add(CheckIssue::error(
            IssueCode::MissingImage,
            format!("file '{path}' does not exist"),
            IssueContext::Image { id: id.as_u64() },
        ));
    }

    for id in dataset.find_orphan_annotations() {
        let owner = dataset
            .annotation_owner(id)
            .map(|owner| owner.to_string())
            .unwrap_or_default();
        report.add(CheckIssue::error(
            IssueCode::OrphanAnnotation,
            format!("references unregistered image {owner}"),
            IssueContext::Annotation { id: id.as_u64() },
        ));
    }

    for id in dataset.find_unknown_classes() {
        let class = dataset
            .get_annotation(id)
            .map(|ann| ann.class_id.to_string())
            .unwrap_or_default();
        report.add(CheckIssue::error(
            IssueCode::UnknownClass,
            format!("class {class} is not in the taxonomy"),
            IssueContext::Annotation { id: id.as_u64() },
        ));
    }

    for id in dataset.find_inconsistent_boxes() {
        report.add(CheckIssue::warning(
            IssueCode::InconsistentBox,
            "box does not enclose every polygon point",
            IssueContext::Annotation { id: id.as_u64() },
        ));
    }

    for id in dataset.find_unused_images() {
        report.add(CheckIssue::warning(
            IssueCode::UnusedImage,
            "image has no annotations",
            IssueContext::Image { id: id.as_u64() },
        ));
    }

    tracing::debug!(
        errors = report.error_count(),
        warnings = report.warning_count(),
        "checked dataset"
    );
    report
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::annotation::Annotation;
    use crate::dataset::{ClassId, ClassTaxonomy, DatasetParts, ImageRecord};
    use crate::error::LabelsetError;
    use crate::geometry::{BBox, Point};

    struct OnlyA;

    impl ImageStore for OnlyA {
        fn exists(&self, path: &Path) -> bool {
            path.ends_with("a.png")
        }
        fn dimensions(&self, _: &Path) -> Result<(u32, u32), LabelsetError> {
            Ok((10, 10))
        }
        fn decode(&self, path: &Path) -> Result<image::DynamicImage, LabelsetError> {
            Err(LabelsetError::ImageNotFound {
                path: path.to_path_buf(),
            })
        }
        fn write(&self, _: &Path, _: &image::DynamicImage) -> Result<(), LabelsetError> {
            Ok(())
        }
        fn copy(&self, _: &Path, _: &Path) -> Result<(), LabelsetError> {
            Ok(())
        }
    }

    fn troubled_dataset() -> Dataset {
        let taxonomy = ClassTaxonomy::from_pairs([(ClassId(0), "cat")]).unwrap();
        let mut parts = DatasetParts::new(taxonomy, "/data");
        parts.add_image(0u64, ImageRecord::new("a.png", 10, 10));
        parts.add_image(1u64, ImageRecord::new("b.png", 10, 10));
        parts.add_annotation(
            0u64,
            0u64,
            Annotation::segmentation_with_bbox(
                0u64,
                vec![
                    Point::new(0.0, 0.0),
                    Point::new(8.0, 0.0),
                    Point::new(8.0, 8.0),
                ],
                BBox::new(0.0, 0.0, 2.0, 2.0),
            )
            .unwrap(),
        );
        parts.add_annotation(1u64, 0u64, Annotation::classification(5u64));
        parts.add_annotation(2u64, 9u64, Annotation::classification(0u64));
        Dataset::from_parts(parts).unwrap()
    }

    #[test]
    fn collects_every_diagnostic() {
        let report = check_dataset(&troubled_dataset(), &OnlyA);

        assert_eq!(report.count(IssueCode::MissingImage), 1);
        assert_eq!(report.count(IssueCode::OrphanAnnotation), 1);
        assert_eq!(report.count(IssueCode::UnknownClass), 1);
        assert_eq!(report.count(IssueCode::InconsistentBox), 1);
        assert_eq!(report.count(IssueCode::UnusedImage), 1);
        assert_eq!(report.error_count(), 3);
        assert_eq!(report.warning_count(), 2);
        assert!(!report.is_ok());
    }

    #[test]
    fn text_and_json_output() {
        let report = check_dataset(&troubled_dataset(), &OnlyA);
        let text = report.to_string();
        assert!(text.contains("3 error(s) and 2 warning(s)"));
        assert!(text.contains("[ERROR] MissingImage in image 1"));

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["error_count"], 3);
        assert_eq!(json["issues"][0]["code"], "MissingImage");
        assert_eq!(json["issues"][0]["context"]["kind"], "image");
    }

    #[test]
    fn clean_dataset_passes() {
        let taxonomy = ClassTaxonomy::from_pairs([(ClassId(0), "cat")]).unwrap();
        let mut parts = DatasetParts::new(taxonomy, "/data");
        parts.add_image(0u64, ImageRecord::new("a.png", 10, 10));
        parts.add_annotation(0u64, 0u64, Annotation::classification(0u64));
        let report = check_dataset(&Dataset::from_parts(parts).unwrap(), &OnlyA);
        assert!(report.is_clean());
        assert_eq!(report.to_string(), "Check passed: no issues found\n");
    }
}
